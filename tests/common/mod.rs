#![allow(dead_code)]

use laint_lib::decoder::{DecodeConfig, DecodeError, TableScorer};
use ndarray::{Array2, ArrayView1};

pub const PAD: i32 = 0;
pub const A: i32 = 1;
pub const EOS: i32 = 2;

pub fn config(beam_size: usize, max_decode_len: usize) -> DecodeConfig {
    DecodeConfig {
        beam_size,
        max_decode_len,
        threads: 1,
        ..Default::default()
    }
}

/// Token history cache: row `r` column `t` is the token fed at step `t`.
pub fn history_cache(rows: usize, max_len: usize) -> Array2<i32> {
    Array2::from_elem((rows, max_len), -1)
}

type StepResult = Result<(Array2<f32>, Array2<i32>), DecodeError>;

/// Step function whose logits come from `logits_for(step, previous_token)`.
/// It writes every fed token into the history cache.
pub fn scripted<F>(mut logits_for: F) -> impl FnMut(ArrayView1<i32>, Array2<i32>) -> StepResult
where
    F: FnMut(usize, i32) -> Vec<f32>,
{
    let mut step = 0;
    move |ids, mut cache| {
        let rows: Vec<Vec<f32>> = ids.iter().map(|&prev| logits_for(step, prev)).collect();
        let vocab = rows.first().map(Vec::len).unwrap_or(0);
        for (r, &prev) in ids.iter().enumerate() {
            cache[[r, step]] = prev;
        }
        step += 1;
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Ok((Array2::from_shape_vec((ids.len(), vocab), flat)?, cache))
    }
}

/// Deterministic bigram table over `vocab` tokens with no exact ties per row.
pub fn mixed_table(vocab: usize) -> Array2<f32> {
    Array2::from_shape_fn((vocab, vocab), |(i, j)| {
        -(((i * 7 + j * 13) % 11) as f32) * 0.3 - j as f32 * 0.001
    })
}

pub fn mixed_scorer(vocab: usize) -> TableScorer {
    TableScorer::new(mixed_table(vocab), 0.0, PAD, EOS).unwrap()
}
