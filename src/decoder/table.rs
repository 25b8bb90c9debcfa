use std::path::Path;

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::cache::LayerCache;
use super::config::DecodeError;
use super::scorer::Scorer;

/// On-disk form of a [`TableScorer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableModel {
    /// `transitions[prev][next]` is the logit of `next` after `prev`.
    pub transitions: Vec<Vec<f32>>,
    #[serde(default)]
    pub source_bonus: f32,
    #[serde(default)]
    pub pad_id: i32,
    #[serde(default = "default_eos_id")]
    pub eos_id: i32,
}

fn default_eos_id() -> i32 {
    2
}

/// Bigram scorer with an optional bias towards copying the source.
///
/// At position `t` the source token `t` gets `source_bonus` added to its
/// logit; once the source runs out (or hits padding) the bonus goes to EOS.
/// The cache records every token fed to the scorer, one row per hypothesis.
#[derive(Debug, Clone)]
pub struct TableScorer {
    transitions: Array2<f32>,
    source_bonus: f32,
    pad_id: i32,
    eos_id: i32,
}

impl TableScorer {
    pub fn new(
        transitions: Array2<f32>,
        source_bonus: f32,
        pad_id: i32,
        eos_id: i32,
    ) -> Result<Self, DecodeError> {
        let vocab_size = transitions.nrows();
        if transitions.ncols() != vocab_size {
            return Err(DecodeError::ScoreShape {
                expected: vocab_size,
                actual: transitions.ncols(),
            });
        }
        for (name, id) in [("Padding", pad_id), ("EOS", eos_id)] {
            if id < 0 || id as usize >= vocab_size {
                return Err(DecodeError::TokenOutOfVocab {
                    name,
                    id,
                    vocab_size,
                });
            }
        }
        Ok(Self {
            transitions,
            source_bonus,
            pad_id,
            eos_id,
        })
    }

    pub fn from_model(model: TableModel) -> Result<Self, DecodeError> {
        let vocab_size = model.transitions.len();
        let flat: Vec<f32> = model.transitions.into_iter().flatten().collect();
        if flat.len() != vocab_size * vocab_size {
            return Err(DecodeError::ScoreShape {
                expected: vocab_size * vocab_size,
                actual: flat.len(),
            });
        }
        let transitions = Array2::from_shape_vec((vocab_size, vocab_size), flat)?;
        Self::new(transitions, model.source_bonus, model.pad_id, model.eos_id)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let model: TableModel = serde_json::from_str(&content)?;
        log::info!(
            "Loaded table scorer with {} tokens from {}",
            model.transitions.len(),
            path.as_ref().display()
        );
        Self::from_model(model)
    }

    pub fn vocab_size(&self) -> usize {
        self.transitions.nrows()
    }

    fn bonus_target(&self, source: ArrayView1<i32>, pos: usize) -> i32 {
        match source.get(pos) {
            Some(&tok)
                if tok >= 0
                    && (tok as usize) < self.vocab_size()
                    && tok != self.pad_id
                    && tok != self.eos_id =>
            {
                tok
            }
            _ => self.eos_id,
        }
    }
}

impl Scorer for TableScorer {
    type Encoded = Array2<i32>;
    type Cache = Vec<LayerCache>;

    fn encode(&mut self, inputs: ArrayView2<i32>) -> Result<Self::Encoded, DecodeError> {
        Ok(inputs.to_owned())
    }

    fn init_cache(
        &mut self,
        inputs: ArrayView2<i32>,
        max_decode_len: usize,
    ) -> Result<Self::Cache, DecodeError> {
        Ok(vec![LayerCache::zeros(inputs.nrows(), max_decode_len, 1)])
    }

    fn score(
        &mut self,
        flat_ids: ArrayView1<i32>,
        mut cache: Self::Cache,
        encoded: &Self::Encoded,
        _inputs: ArrayView2<i32>,
    ) -> Result<(Array2<f32>, Self::Cache), DecodeError> {
        let rows = flat_ids.len();
        if encoded.nrows() != rows {
            return Err(DecodeError::ScoreShape {
                expected: rows,
                actual: encoded.nrows(),
            });
        }
        let vocab_size = self.vocab_size();
        let mut logits = Array2::zeros((rows, vocab_size));

        for layer in cache.iter_mut() {
            let pos = layer.index;
            let max_len = layer.key.shape().get(1).copied().unwrap_or(0);
            if pos >= max_len {
                return Err(DecodeError::CacheShape {
                    expected: max_len,
                    actual: pos,
                });
            }

            for (r, &prev) in flat_ids.iter().enumerate() {
                if prev < 0 || prev as usize >= vocab_size {
                    return Err(DecodeError::TokenOutOfVocab {
                        name: "Previous",
                        id: prev,
                        vocab_size,
                    });
                }
                let target = self.bonus_target(encoded.row(r), pos);
                layer.key[[r, pos, 0]] = prev as f32;
                layer.value[[r, pos, 0]] = target as f32;

                let mut row = logits.slice_mut(s![r, ..]);
                row.assign(&self.transitions.row(prev as usize));
                row[target as usize] += self.source_bonus;
            }
            layer.index += 1;
        }

        Ok((logits, cache))
    }
}
