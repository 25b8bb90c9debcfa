use std::collections::HashMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::EvalError;

pub const MAX_ORDER: usize = 4;

static NONDIGIT_PUNCT_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"([^\d])(\p{P})"));
static PUNCT_NONDIGIT_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(\p{P})([^\d])"));
static SYMBOL_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(\p{S})"));

/// Splits punctuation away from non-digits and isolates symbols, so "3.5"
/// stays one token while "end." becomes two.
pub fn bleu_tokenize(text: &str) -> Vec<String> {
    let mut s = text.to_string();
    if let Ok(re) = &*NONDIGIT_PUNCT_RE {
        s = re.replace_all(&s, "$1 $2 ").into_owned();
    }
    if let Ok(re) = &*PUNCT_NONDIGIT_RE {
        s = re.replace_all(&s, " $1 $2").into_owned();
    }
    if let Ok(re) = &*SYMBOL_RE {
        s = re.replace_all(&s, " $1 ").into_owned();
    }
    s.split_whitespace().map(String::from).collect()
}

fn ngram_counts(words: &[String], max_order: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for order in 1..=max_order {
        for gram in words.windows(order) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// Sufficient statistics for corpus BLEU.
///
/// Partial statistics of disjoint corpus shards add up to the statistics of
/// the whole corpus, in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleuStats {
    pub matches_by_order: [u64; MAX_ORDER],
    pub possible_matches_by_order: [u64; MAX_ORDER],
    pub reference_length: u64,
    pub translation_length: u64,
}

impl AddAssign for BleuStats {
    fn add_assign(&mut self, other: Self) {
        for i in 0..MAX_ORDER {
            self.matches_by_order[i] += other.matches_by_order[i];
            self.possible_matches_by_order[i] += other.possible_matches_by_order[i];
        }
        self.reference_length += other.reference_length;
        self.translation_length += other.translation_length;
    }
}

impl Add for BleuStats {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl Sum for BleuStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Match statistics of `hypotheses` against `references`, line by line.
pub fn bleu_partial<R, H>(
    references: &[R],
    hypotheses: &[H],
    case_sensitive: bool,
) -> Result<BleuStats, EvalError>
where
    R: AsRef<str>,
    H: AsRef<str>,
{
    if references.len() != hypotheses.len() {
        return Err(EvalError::LineCount {
            references: references.len(),
            hypotheses: hypotheses.len(),
        });
    }

    let prepare = |line: &str| {
        if case_sensitive {
            bleu_tokenize(line)
        } else {
            bleu_tokenize(&line.to_lowercase())
        }
    };

    let mut stats = BleuStats::default();
    for (reference, hypothesis) in references.iter().zip(hypotheses) {
        let ref_words = prepare(reference.as_ref());
        let hyp_words = prepare(hypothesis.as_ref());
        stats.reference_length += ref_words.len() as u64;
        stats.translation_length += hyp_words.len() as u64;

        let ref_counts = ngram_counts(&ref_words, MAX_ORDER);
        let hyp_counts = ngram_counts(&hyp_words, MAX_ORDER);
        for (gram, &count) in &hyp_counts {
            let order = gram.len() - 1;
            stats.possible_matches_by_order[order] += count as u64;
            if let Some(&ref_count) = ref_counts.get(gram) {
                stats.matches_by_order[order] += count.min(ref_count) as u64;
            }
        }
    }
    Ok(stats)
}

/// Corpus BLEU in `[0, 100]` from accumulated statistics.
///
/// Orders with candidates but no matches are smoothed to
/// `1 / (2^k * possible)`, `k` counting such orders so far.
pub fn complete_bleu(stats: &BleuStats, use_brevity_penalty: bool) -> f32 {
    let mut precisions = [0.0_f64; MAX_ORDER];
    let mut smooth = 1.0_f64;
    for i in 0..MAX_ORDER {
        let possible = stats.possible_matches_by_order[i];
        if possible == 0 {
            continue;
        }
        let matches = stats.matches_by_order[i];
        precisions[i] = if matches > 0 {
            matches as f64 / possible as f64
        } else {
            smooth *= 2.0;
            1.0 / (smooth * possible as f64)
        };
    }

    let geo_mean = if precisions.iter().any(|&p| p > 0.0) {
        let log_sum: f64 = precisions.iter().filter(|&&p| p > 0.0).map(|p| p.ln()).sum();
        (log_sum / MAX_ORDER as f64).exp()
    } else {
        0.0
    };

    let brevity = if !use_brevity_penalty || stats.reference_length == 0 {
        1.0
    } else {
        let ratio = stats.translation_length as f64 / stats.reference_length as f64;
        if ratio <= 0.0 {
            0.0
        } else if ratio < 1.0 {
            (1.0 - 1.0 / ratio).exp()
        } else {
            1.0
        }
    };

    (geo_mean * brevity * 100.0) as f32
}

/// Case-insensitive corpus BLEU with brevity penalty.
pub fn corpus_bleu<R, H>(references: &[R], hypotheses: &[H]) -> Result<f32, EvalError>
where
    R: AsRef<str>,
    H: AsRef<str>,
{
    let stats = bleu_partial(references, hypotheses, false)?;
    Ok(complete_bleu(&stats, true))
}
