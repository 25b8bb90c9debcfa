use std::cmp::Ordering;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

/// `((5 + length) / 6) ^ alpha`, the divisor applied to a finished
/// hypothesis' cumulative log-probability.
pub fn length_penalty(length: usize, alpha: f32) -> f32 {
    ((5.0 + length as f32) / 6.0).powf(alpha)
}

/// Row-wise log-softmax of a `rows x vocab` logit matrix.
pub fn log_softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        if !max.is_finite() {
            continue;
        }
        let log_sum_exp = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
        row.mapv_inplace(|v| v - log_sum_exp);
    }
    out
}

/// One continuation of a live hypothesis. `index` is `parent * vocab + token`
/// within a single batch element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub score: f32,
    pub index: usize,
}

impl Candidate {
    /// Higher score first, lower index first on equal scores.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.index.cmp(&other.index))
    }
}

/// Picks the `beam_size` best continuations of one batch element.
///
/// `log_probs` holds the `beam_size x vocab` next-token log-probabilities of
/// the element's hypotheses. A finished parent contributes one padding
/// continuation at `-inf` so it can never be chosen over a finite candidate.
pub fn select_candidates(
    live_logprobs: ArrayView1<f32>,
    finished: ArrayView1<bool>,
    log_probs: ArrayView2<f32>,
    pad_id: usize,
    beam_size: usize,
) -> Vec<Candidate> {
    let vocab = log_probs.ncols();
    let mut candidates = Vec::with_capacity(beam_size * vocab);
    for (parent, row) in log_probs.axis_iter(Axis(0)).enumerate() {
        if finished[parent] {
            candidates.push(Candidate {
                score: f32::NEG_INFINITY,
                index: parent * vocab + pad_id,
            });
            continue;
        }
        let base = live_logprobs[parent];
        candidates.extend(row.iter().enumerate().map(|(token, &lp)| Candidate {
            score: base + lp,
            index: parent * vocab + token,
        }));
    }

    if candidates.len() > beam_size {
        candidates.select_nth_unstable_by(beam_size - 1, Candidate::rank);
        candidates.truncate(beam_size);
    }
    candidates.sort_by(Candidate::rank);
    candidates
}

/// Live search state of one decode call.
///
/// Sequences keep the start token in column 0, so column `t` holds the token
/// generated at step `t`. Finished sequences store generated tokens only.
#[derive(Debug, Clone)]
pub struct BeamState<C> {
    pub(crate) cur_index: usize,
    pub(crate) live_seqs: Array3<i32>,
    pub(crate) live_logprobs: Array2<f32>,
    pub(crate) finished_flags: Array2<bool>,
    pub(crate) finished_scores: Array1<f32>,
    pub(crate) finished_seqs: Array2<i32>,
    pub(crate) cache: Option<C>,
}

impl<C> BeamState<C> {
    pub(crate) fn new(
        batch_size: usize,
        beam_size: usize,
        max_decode_len: usize,
        start_id: i32,
        pad_id: i32,
        cache: C,
    ) -> Self {
        let mut live_seqs = Array3::from_elem((batch_size, beam_size, max_decode_len + 1), pad_id);
        live_seqs.slice_mut(s![.., .., 0]).fill(start_id);

        let mut live_logprobs = Array2::from_elem((batch_size, beam_size), f32::NEG_INFINITY);
        live_logprobs.slice_mut(s![.., 0]).fill(0.0);

        Self {
            cur_index: 0,
            live_seqs,
            live_logprobs,
            finished_flags: Array2::from_elem((batch_size, beam_size), false),
            finished_scores: Array1::from_elem(batch_size, f32::NEG_INFINITY),
            finished_seqs: Array2::from_elem((batch_size, max_decode_len), pad_id),
            cache: Some(cache),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.live_logprobs.nrows()
    }

    pub fn beam_size(&self) -> usize {
        self.live_logprobs.ncols()
    }

    /// Number of tokens generated so far.
    pub fn decoded_len(&self) -> usize {
        self.cur_index
    }

    /// Generated tokens of every live hypothesis, `batch x beam x decoded_len`.
    pub fn current_tokens(&self) -> ArrayView3<'_, i32> {
        self.live_seqs.slice(s![.., .., 1..=self.cur_index])
    }

    /// Token each hypothesis feeds to the scorer next, flattened batch-major.
    pub fn last_tokens(&self) -> Array1<i32> {
        self.live_seqs
            .slice(s![.., .., self.cur_index])
            .iter()
            .copied()
            .collect()
    }

    pub fn log_probabilities(&self) -> ArrayView2<'_, f32> {
        self.live_logprobs.view()
    }

    pub fn finished_flags(&self) -> ArrayView2<'_, bool> {
        self.finished_flags.view()
    }

    pub fn finished_scores(&self) -> ArrayView1<'_, f32> {
        self.finished_scores.view()
    }

    pub fn finished_sequences(&self) -> ArrayView2<'_, i32> {
        self.finished_seqs.view()
    }

    pub fn cache(&self) -> Option<&C> {
        self.cache.as_ref()
    }

    pub fn has_finished(&self, batch: usize) -> bool {
        self.finished_scores[batch] > f32::NEG_INFINITY
    }
}
