use std::time::Instant;

use ndarray::{Array2, ArrayView1, ArrayView2};

use super::cache::{expand_beams, BeamCache};
use super::config::{DecodeConfig, DecodeError};
use super::search::{beam_search, DecodeOutput};

/// The model side of decoding.
///
/// Implementations own the network; the decoder only sees token ids, logits
/// and opaque caches. Every method works on flattened `batch * beam` rows
/// except [`Scorer::encode`], which sees the original batch.
pub trait Scorer {
    type Encoded: BeamCache;
    type Cache: BeamCache;

    fn encode(&mut self, inputs: ArrayView2<i32>) -> Result<Self::Encoded, DecodeError>;

    /// Fresh cache for already beam-expanded `inputs`.
    fn init_cache(
        &mut self,
        inputs: ArrayView2<i32>,
        max_decode_len: usize,
    ) -> Result<Self::Cache, DecodeError>;

    /// Next-token logits (`rows x vocab`) for the last token of every row.
    ///
    /// `inputs` are the beam-expanded source ids, for padding masks.
    fn score(
        &mut self,
        flat_ids: ArrayView1<i32>,
        cache: Self::Cache,
        encoded: &Self::Encoded,
        inputs: ArrayView2<i32>,
    ) -> Result<(Array2<f32>, Self::Cache), DecodeError>;
}

/// Translates one batch of source ids with beam search.
pub fn predict_step<S: Scorer>(
    scorer: &mut S,
    inputs: ArrayView2<i32>,
    config: &DecodeConfig,
) -> Result<DecodeOutput, DecodeError> {
    config.validate()?;
    let start = Instant::now();
    let batch_size = inputs.nrows();
    let beam_size = config.beam_size;

    let encoded = expand_beams(&scorer.encode(inputs)?, batch_size, beam_size)?;
    let raw_inputs = expand_beams(&inputs.to_owned(), batch_size, beam_size)?;
    let cache = scorer.init_cache(raw_inputs.view(), config.max_decode_len)?;
    log::debug!(
        "Prepared {} flattened hypotheses in {:?}",
        raw_inputs.nrows(),
        start.elapsed()
    );

    beam_search(
        batch_size,
        cache,
        |flat_ids, flat_cache| scorer.score(flat_ids, flat_cache, &encoded, raw_inputs.view()),
        config,
    )
}
