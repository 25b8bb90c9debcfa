use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::EvalError;

static DECODE_SPACE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\A\s|\s\B|(\s)\b"));

/// Cuts a decoded sequence after its first EOS, keeping the EOS itself.
/// Sequences without EOS are returned whole.
pub fn decode_tokens(ids: &[i32], eos_id: i32) -> &[i32] {
    match ids.iter().position(|&id| id == eos_id) {
        Some(pos) => &ids[..=pos],
        None => ids,
    }
}

/// Id to piece table loaded from a `piece id` per line file.
#[derive(Debug, Clone)]
pub struct Vocab {
    pieces: Vec<String>,
    specials: Vec<i32>,
}

impl Vocab {
    pub fn new(pieces: Vec<String>, specials: Vec<i32>) -> Self {
        Self { pieces, specials }
    }

    pub fn load<P: AsRef<Path>>(path: P, specials: Vec<i32>) -> Result<Self, EvalError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<_> = content
            .lines()
            .filter_map(|l| {
                let mut p = l.split_whitespace();
                let piece = p.next()?.replace('\u{2581}', " ");
                let id: usize = p.next()?.parse().ok()?;
                Some((piece, id))
            })
            .collect();
        if entries.is_empty() {
            return Err(EvalError::EmptyVocab(path.as_ref().display().to_string()));
        }

        // Ids are dense, so none can reach the entry count.
        let entry_count = entries.len();
        if let Some(&(_, id)) = entries.iter().find(|(_, id)| *id >= entry_count) {
            return Err(EvalError::VocabId {
                id,
                entries: entry_count,
            });
        }

        let size = entries.iter().map(|(_, i)| *i).max().map_or(0, |max| max + 1);
        let mut pieces = vec![String::new(); size];
        for (piece, id) in entries {
            pieces[id] = piece;
        }
        log::debug!(
            "Loaded vocabulary of {} pieces from {}",
            size,
            path.as_ref().display()
        );
        Ok(Self::new(pieces, specials))
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn piece(&self, id: i32) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.pieces.get(i))
            .map(String::as_str)
    }

    /// Joins pieces into text, dropping special and unknown ids and folding
    /// the word-boundary spaces of the pieces.
    pub fn detokenize(&self, ids: &[i32]) -> String {
        let joined: String = ids
            .iter()
            .filter(|&&id| !self.specials.contains(&id))
            .filter_map(|&id| self.piece(id))
            .collect();
        match &*DECODE_SPACE_RE {
            Ok(re) => re
                .replace_all(
                    &joined,
                    |c: &regex::Captures| if c.get(1).is_some() { " " } else { "" },
                )
                .to_string(),
            Err(_) => joined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_tokens_keeps_first_eos() {
        assert_eq!(decode_tokens(&[5, 6, 2, 7, 2], 2), &[5, 6, 2]);
        assert_eq!(decode_tokens(&[5, 6, 7], 2), &[5, 6, 7]);
        assert_eq!(decode_tokens(&[2, 0, 0], 2), &[2]);
    }

    #[test]
    fn detokenize_folds_boundaries() {
        let vocab = Vocab::new(
            vec![
                "<pad>".into(),
                "<unk>".into(),
                "</s>".into(),
                " hello".into(),
                " world".into(),
                "s".into(),
            ],
            vec![0, 1, 2],
        );
        assert_eq!(vocab.detokenize(&[3, 4, 5, 2, 0]), "hello worlds");
    }
}
