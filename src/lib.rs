pub mod decoder;
pub mod eval;

mod app;
mod error;

pub use app::run;
pub use error::AppError;
