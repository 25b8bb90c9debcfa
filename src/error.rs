use thiserror::Error;

use crate::decoder::DecodeError;
use crate::eval::EvalError;

/// Unified app errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("Eval: {0}")]
    Eval(#[from] EvalError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Decode(err) => err.user_message(),
            Self::Eval(err) => err.user_message(),
            Self::Io(_) => "Could not read or write the requested files.",
        }
    }
}
