pub mod bleu;
pub mod translate;
pub mod vocab;

pub use bleu::{bleu_partial, bleu_tokenize, complete_bleu, corpus_bleu, BleuStats};
pub use translate::{
    make_batch, pad_examples, read_id_lines, translate_corpus, EvalExample, TranslationReport,
};
pub use vocab::{decode_tokens, Vocab};

use crate::decoder::DecodeError;

#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{references} references but {hypotheses} hypotheses")]
    LineCount {
        references: usize,
        hypotheses: usize,
    },
    #[error("Vocabulary file {0} has no entries")]
    EmptyVocab(String),
    #[error("Vocabulary id {id} is out of range for {entries} entries")]
    VocabId { id: usize, entries: usize },
    #[error("Line {line}: invalid token id {token:?}")]
    Parse { line: usize, token: String },
}

impl EvalError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Decode(err) => err.user_message(),
            Self::Io(_) => "Could not read the evaluation files. Check the paths and permissions.",
            Self::LineCount { .. } => {
                "The reference and hypothesis files must have the same number of lines."
            }
            Self::EmptyVocab(_) | Self::VocabId { .. } | Self::Parse { .. } => {
                "An input file is malformed. Check its format and try again."
            }
        }
    }
}
