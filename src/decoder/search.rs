use std::time::Instant;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use super::cache::BeamCache;
use super::config::{DecodeConfig, DecodeError};
use super::state::{length_penalty, log_softmax, select_candidates, BeamState, Candidate};

/// Best sequence per input and its length-normalized score.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutput {
    /// `batch x max_decode_len` token ids, padded after the sequence ends.
    pub tokens: Array2<i32>,
    pub scores: Array1<f32>,
    /// Whether the chosen sequence emitted EOS within the length budget.
    pub finished: Array1<bool>,
}

/// Step-by-step beam search over a batch.
///
/// Each call to [`BeamSearch::step`] feeds the last token of every flattened
/// hypothesis to the scorer, keeps the `beam_size` best continuations per
/// input, records newly finished hypotheses and reorders the cache after the
/// surviving parents. The search always runs `max_decode_len` steps.
pub struct BeamSearch {
    config: DecodeConfig,
    workers: usize,
}

impl BeamSearch {
    pub fn new(config: &DecodeConfig) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            workers: config.worker_threads(),
        })
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn init_state<C>(&self, batch_size: usize, cache: C) -> BeamState<C> {
        BeamState::new(
            batch_size,
            self.config.beam_size,
            self.config.max_decode_len,
            self.config.start_id,
            self.config.pad_id,
            cache,
        )
    }

    pub fn is_done<C>(&self, state: &BeamState<C>) -> bool {
        state.cur_index >= self.config.max_decode_len
    }

    /// Advances every hypothesis by one token.
    ///
    /// Both the cache handed in and the cache the scorer returns must have
    /// `batch * beam` rows in every leaf. Nothing is committed to `state`
    /// unless the whole step succeeds.
    pub fn step<C, F>(&self, state: &mut BeamState<C>, score: &mut F) -> Result<(), DecodeError>
    where
        C: BeamCache,
        F: FnMut(ArrayView1<i32>, C) -> Result<(Array2<f32>, C), DecodeError>,
    {
        if self.is_done(state) {
            return Err(DecodeError::SearchExhausted);
        }
        let batch_size = state.batch_size();
        let beam_size = state.beam_size();
        let rows = batch_size * beam_size;

        state
            .cache
            .as_ref()
            .ok_or(DecodeError::SearchExhausted)?
            .check_rows(rows)?;
        let cache = state.cache.take().ok_or(DecodeError::SearchExhausted)?;

        let flat_ids = state.last_tokens();
        let (logits, new_cache) = score(flat_ids.view(), cache)?;
        new_cache.check_rows(rows)?;

        if logits.nrows() != rows {
            return Err(DecodeError::ScoreShape {
                expected: rows,
                actual: logits.nrows(),
            });
        }
        let vocab = logits.ncols();
        self.config.check_vocab(vocab)?;

        let log_probs = log_softmax(logits.view());
        let selected = self.select_all(
            state.live_logprobs.view(),
            state.finished_flags.view(),
            log_probs.view(),
        );

        let length = state.cur_index + 1;
        let penalty = length_penalty(length, self.config.alpha);
        let eos = self.config.eos_id;

        let mut live_seqs = state.live_seqs.clone();
        let mut live_logprobs = Array2::from_elem((batch_size, beam_size), f32::NEG_INFINITY);
        let mut finished_flags = Array2::from_elem((batch_size, beam_size), false);
        let mut finished_scores = state.finished_scores.clone();
        let mut finished_seqs = state.finished_seqs.clone();
        let mut parents = Vec::with_capacity(rows);

        for (b, candidates) in selected.iter().enumerate() {
            for (slot, cand) in candidates.iter().enumerate() {
                let parent = cand.index / vocab;
                let token = (cand.index % vocab) as i32;
                let parent_finished = state.finished_flags[[b, parent]];

                live_seqs
                    .slice_mut(s![b, slot, ..])
                    .assign(&state.live_seqs.slice(s![b, parent, ..]));
                live_seqs[[b, slot, length]] = token;
                live_logprobs[[b, slot]] = cand.score;
                finished_flags[[b, slot]] = parent_finished || token == eos;
                parents.push(b * beam_size + parent);

                if token == eos && !parent_finished {
                    let normalized = cand.score / penalty;
                    if normalized > finished_scores[b] {
                        finished_scores[b] = normalized;
                        finished_seqs
                            .row_mut(b)
                            .assign(&live_seqs.slice(s![b, slot, 1..]));
                    }
                }
            }
        }

        let cache = new_cache.gather(&parents)?;
        state.live_seqs = live_seqs;
        state.live_logprobs = live_logprobs;
        state.finished_flags = finished_flags;
        state.finished_scores = finished_scores;
        state.finished_seqs = finished_seqs;
        state.cache = Some(cache);
        state.cur_index = length;
        Ok(())
    }

    /// Final answer per input: the best finished hypothesis, or the best live
    /// one when nothing emitted EOS.
    pub fn finalize<C>(&self, state: &BeamState<C>) -> DecodeOutput {
        let batch_size = state.batch_size();
        let max_len = self.config.max_decode_len;
        let penalty = length_penalty(state.cur_index, self.config.alpha);

        let mut tokens = Array2::from_elem((batch_size, max_len), self.config.pad_id);
        let mut scores = Array1::from_elem(batch_size, f32::NEG_INFINITY);
        let mut finished = Array1::from_elem(batch_size, false);

        for b in 0..batch_size {
            if state.has_finished(b) {
                tokens.row_mut(b).assign(&state.finished_seqs.row(b));
                scores[b] = state.finished_scores[b];
                finished[b] = true;
                continue;
            }

            let mut best = 0;
            for k in 1..state.beam_size() {
                if state.live_logprobs[[b, k]] > state.live_logprobs[[b, best]] {
                    best = k;
                }
            }
            let generated = state.live_seqs.slice(s![b, best, 1..=state.cur_index]);
            tokens
                .slice_mut(s![b, ..state.cur_index])
                .assign(&generated);
            scores[b] = state.live_logprobs[[b, best]] / penalty;
        }

        DecodeOutput {
            tokens,
            scores,
            finished,
        }
    }

    fn select_all(
        &self,
        live_logprobs: ArrayView2<f32>,
        finished_flags: ArrayView2<bool>,
        log_probs: ArrayView2<f32>,
    ) -> Vec<Vec<Candidate>> {
        let batch_size = live_logprobs.nrows();
        let beam_size = live_logprobs.ncols();
        let pad_id = self.config.pad_id as usize;

        let select_one = |b: usize| {
            select_candidates(
                live_logprobs.row(b),
                finished_flags.row(b),
                log_probs.slice(s![b * beam_size..(b + 1) * beam_size, ..]),
                pad_id,
                beam_size,
            )
        };

        let workers = self.workers.min(batch_size);
        if workers <= 1 {
            return (0..batch_size).map(select_one).collect();
        }

        // Batch elements are independent; chunk order keeps the output order.
        let chunk = batch_size.div_ceil(workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..batch_size)
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(batch_size);
                    let select_one = &select_one;
                    scope.spawn(move || (start..end).map(select_one).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(part) => part,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

/// Runs a full search for `batch_size` inputs whose flattened cache already
/// holds `batch_size * beam_size` rows.
pub fn beam_search<C, F>(
    batch_size: usize,
    cache: C,
    mut score: F,
    config: &DecodeConfig,
) -> Result<DecodeOutput, DecodeError>
where
    C: BeamCache,
    F: FnMut(ArrayView1<i32>, C) -> Result<(Array2<f32>, C), DecodeError>,
{
    let search = BeamSearch::new(config)?;
    if batch_size == 0 {
        return Ok(DecodeOutput {
            tokens: Array2::from_elem((0, config.max_decode_len), config.pad_id),
            scores: Array1::zeros(0),
            finished: Array1::from_elem(0, false),
        });
    }

    let decode_start = Instant::now();
    let mut state = search.init_state(batch_size, cache);
    while !search.is_done(&state) {
        search.step(&mut state, &mut score)?;
    }
    let output = search.finalize(&state);

    log::debug!(
        "beam_search completed in {:?} (batch: {}, beam: {}, steps: {}, finished: {})",
        decode_start.elapsed(),
        batch_size,
        config.beam_size,
        state.decoded_len(),
        output.finished.iter().filter(|&&f| f).count()
    );
    Ok(output)
}
