use ndarray::ShapeError;
use num_cpus::get_physical;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type ScorerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Beam size must be positive, got {0}")]
    InvalidBeamSize(usize),
    #[error("Max decode length must be positive, got {0}")]
    InvalidMaxDecodeLen(usize),
    #[error("Length penalty alpha must be finite, got {0}")]
    InvalidAlpha(f32),
    #[error("{name} id {id} is outside the vocabulary of size {vocab_size}")]
    TokenOutOfVocab {
        name: &'static str,
        id: i32,
        vocab_size: usize,
    },
    #[error("Scorer returned {actual} rows of logits, expected {expected}")]
    ScoreShape { expected: usize, actual: usize },
    #[error("Cache leading axis mismatch: expected {expected}, got {actual}")]
    CacheShape { expected: usize, actual: usize },
    #[error("ndarray shape error: {0}")]
    Shape(#[from] ShapeError),
    #[error("Scorer failed: {0}")]
    Scorer(#[from] ScorerError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Beam search has no steps left to run")]
    SearchExhausted,
}

impl DecodeError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidBeamSize(_)
            | Self::InvalidMaxDecodeLen(_)
            | Self::InvalidAlpha(_)
            | Self::TokenOutOfVocab { .. } => {
                "The decoding configuration is invalid. Check beam size, length and token ids."
            }
            Self::ScoreShape { .. } | Self::CacheShape { .. } | Self::Shape(_) => {
                "The scoring model returned data of an unexpected shape."
            }
            Self::Scorer(_) => "The scoring model failed while decoding.",
            Self::Io(_) | Self::Json(_) => {
                "Could not read the configuration or model file. Check the path and its contents."
            }
            Self::SearchExhausted => "The search was stepped past its configured length.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub beam_size: usize,
    pub alpha: f32,
    pub eos_id: i32,
    pub pad_id: i32,
    pub start_id: i32,
    pub max_decode_len: usize,
    /// Candidate-selection workers; 0 means one per physical core.
    pub threads: usize,
    /// Rows per prediction batch in the translation loop.
    pub batch_size: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            beam_size: 4,
            alpha: 0.6,
            eos_id: 2,
            pad_id: 0,
            start_id: 0,
            max_decode_len: 512,
            threads: 0,
            batch_size: 32,
        }
    }
}

impl DecodeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides("LAINT_");
        config
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        log::debug!("Loaded decode config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();

        if let Some(v) = parse_env("BEAM_SIZE").and_then(|s| s.parse().ok()) {
            self.beam_size = v;
        }
        if let Some(v) = parse_env("ALPHA").and_then(|s| s.parse().ok()) {
            self.alpha = v;
        }
        if let Some(v) = parse_env("MAX_DECODE_LEN").and_then(|s| s.parse().ok()) {
            self.max_decode_len = v;
        }
        if let Some(v) = parse_env("THREADS").and_then(|s| s.parse().ok()) {
            self.threads = v;
        }
        if let Some(v) = parse_env("BATCH_SIZE").and_then(|s| s.parse::<usize>().ok()) {
            self.batch_size = v.max(1);
        }

        let apply_id = |suffix: &str, target: &mut i32| {
            if let Some(v) = parse_env(suffix).and_then(|s| s.parse().ok()) {
                *target = v;
            }
        };
        apply_id("EOS_ID", &mut self.eos_id);
        apply_id("PAD_ID", &mut self.pad_id);
        apply_id("START_ID", &mut self.start_id);
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.beam_size == 0 {
            return Err(DecodeError::InvalidBeamSize(self.beam_size));
        }
        if self.max_decode_len == 0 {
            return Err(DecodeError::InvalidMaxDecodeLen(self.max_decode_len));
        }
        if !self.alpha.is_finite() {
            return Err(DecodeError::InvalidAlpha(self.alpha));
        }
        Ok(())
    }

    /// Checks the special token ids against the vocabulary the scorer reports.
    pub fn check_vocab(&self, vocab_size: usize) -> Result<(), DecodeError> {
        for (name, id) in [
            ("EOS", self.eos_id),
            ("Padding", self.pad_id),
            ("Start", self.start_id),
        ] {
            if id < 0 || id as usize >= vocab_size {
                return Err(DecodeError::TokenOutOfVocab {
                    name,
                    id,
                    vocab_size,
                });
            }
        }
        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            get_physical().max(1)
        } else {
            self.threads
        }
    }
}
