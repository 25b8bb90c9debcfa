use std::path::Path;
use std::time::{Duration, Instant};

use ndarray::{s, Array2, ArrayView2};

use super::bleu::{bleu_partial, complete_bleu, BleuStats};
use super::vocab::{decode_tokens, Vocab};
use super::EvalError;
use crate::decoder::{predict_step, DecodeConfig, Scorer};

/// Source and reference token ids of one evaluation pair.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalExample {
    pub source: Vec<i32>,
    pub target: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct TranslationReport {
    pub sources: Vec<String>,
    pub references: Vec<String>,
    pub predictions: Vec<String>,
    pub stats: BleuStats,
    pub bleu: f32,
    pub elapsed: Duration,
}

/// Reads one whitespace-separated id sequence per line.
pub fn read_id_lines<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<i32>>, EvalError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .map(|(n, line)| {
            line.split_whitespace()
                .map(|tok| {
                    tok.parse().map_err(|_| EvalError::Parse {
                        line: n + 1,
                        token: tok.to_string(),
                    })
                })
                .collect::<Result<Vec<i32>, EvalError>>()
        })
        .collect()
}

/// Stacks sequences into one `rows x longest` array, padding on the right.
pub fn make_batch(rows: &[Vec<i32>], pad_id: i32) -> Array2<i32> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut batch = Array2::from_elem((rows.len(), width), pad_id);
    for (i, row) in rows.iter().enumerate() {
        for (j, &tok) in row.iter().enumerate() {
            batch[[i, j]] = tok;
        }
    }
    batch
}

/// Grows a batch to `desired_batch_size` rows by repeating its last row.
pub fn pad_examples(x: ArrayView2<i32>, desired_batch_size: usize) -> Array2<i32> {
    let rows = x.nrows();
    if rows == 0 || rows >= desired_batch_size {
        return x.to_owned();
    }
    let mut out = Array2::zeros((desired_batch_size, x.ncols()));
    out.slice_mut(s![..rows, ..]).assign(&x);
    let last = x.row(rows - 1);
    for mut row in out.rows_mut().into_iter().skip(rows) {
        row.assign(&last);
    }
    out
}

/// Translates every example, detokenizes sources, references and predictions,
/// and scores the predictions with corpus BLEU.
///
/// The final short batch is padded to the configured batch size so every
/// decode call sees the same shape; predictions for padding rows are dropped.
pub fn translate_corpus<S: Scorer>(
    scorer: &mut S,
    examples: &[EvalExample],
    vocab: &Vocab,
    config: &DecodeConfig,
) -> Result<TranslationReport, EvalError> {
    let start = Instant::now();
    let batch_size = config.batch_size.max(1);
    let mut sources = Vec::with_capacity(examples.len());
    let mut references = Vec::with_capacity(examples.len());
    let mut predictions = Vec::with_capacity(examples.len());
    let mut stats = BleuStats::default();

    log::info!("Translating evaluation dataset.");
    for (batch_idx, chunk) in examples.chunks(batch_size).enumerate() {
        let batch_start = Instant::now();
        let real_rows = chunk.len();
        let source_rows: Vec<Vec<i32>> = chunk.iter().map(|e| e.source.clone()).collect();
        let inputs = pad_examples(make_batch(&source_rows, config.pad_id).view(), batch_size);

        let output = predict_step(scorer, inputs.view(), config)?;

        let mut batch_refs = Vec::with_capacity(real_rows);
        let mut batch_preds = Vec::with_capacity(real_rows);
        for (example, predicted) in chunk.iter().zip(output.tokens.rows()) {
            let predicted = predicted.to_vec();
            sources.push(vocab.detokenize(decode_tokens(&example.source, config.eos_id)));
            batch_refs.push(vocab.detokenize(decode_tokens(&example.target, config.eos_id)));
            batch_preds.push(vocab.detokenize(decode_tokens(&predicted, config.eos_id)));
        }

        stats += bleu_partial(&batch_refs, &batch_preds, false)?;
        references.extend(batch_refs);
        predictions.extend(batch_preds);
        log::debug!(
            "Batch {} ({} of {} rows real) translated in {:?}",
            batch_idx,
            real_rows,
            inputs.nrows(),
            batch_start.elapsed()
        );
    }

    if let (Some(src), Some(tgt), Some(hyp)) =
        (sources.first(), references.first(), predictions.first())
    {
        log::info!("Source : {src}");
        log::info!("Target : {tgt}");
        log::info!("Hypothesis : {hyp}");
    }

    let bleu = complete_bleu(&stats, true);
    let elapsed = start.elapsed();
    log::info!(
        "Translation: {} predictions {} references {} sources.",
        predictions.len(),
        references.len(),
        sources.len()
    );
    log::info!("Translation time: {:?}, BLEU score {:.4}", elapsed, bleu);

    Ok(TranslationReport {
        sources,
        references,
        predictions,
        stats,
        bleu,
        elapsed,
    })
}
