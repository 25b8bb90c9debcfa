use ndarray::{Array, ArrayD, Axis, RemoveAxis};

use super::config::DecodeError;

/// State indexed by flattened hypothesis along its leading axis.
///
/// The decoder never looks inside a cache. It only reorders rows so that each
/// surviving hypothesis carries the state of the parent it was expanded from.
/// Containers forward the gather to every leaf and keep their own shape.
pub trait BeamCache: Sized {
    fn gather(&self, indices: &[usize]) -> Result<Self, DecodeError>;

    /// Fails unless every leaf has exactly `rows` entries on its leading axis.
    fn check_rows(&self, rows: usize) -> Result<(), DecodeError>;
}

fn expect_rows(expected: usize, actual: usize) -> Result<(), DecodeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DecodeError::CacheShape { expected, actual })
    }
}

impl<A, D> BeamCache for Array<A, D>
where
    A: Clone,
    D: RemoveAxis,
{
    fn gather(&self, indices: &[usize]) -> Result<Self, DecodeError> {
        let rows = self.len_of(Axis(0));
        if let Some(&bad) = indices.iter().find(|&&i| i >= rows) {
            return Err(DecodeError::CacheShape {
                expected: rows,
                actual: bad,
            });
        }
        Ok(self.select(Axis(0), indices))
    }

    fn check_rows(&self, rows: usize) -> Result<(), DecodeError> {
        expect_rows(rows, self.len_of(Axis(0)))
    }
}

impl<T: BeamCache> BeamCache for Vec<T> {
    fn gather(&self, indices: &[usize]) -> Result<Self, DecodeError> {
        self.iter().map(|leaf| leaf.gather(indices)).collect()
    }

    fn check_rows(&self, rows: usize) -> Result<(), DecodeError> {
        self.iter().try_for_each(|leaf| leaf.check_rows(rows))
    }
}

impl<T: BeamCache> BeamCache for Option<T> {
    fn gather(&self, indices: &[usize]) -> Result<Self, DecodeError> {
        self.as_ref().map(|leaf| leaf.gather(indices)).transpose()
    }

    fn check_rows(&self, rows: usize) -> Result<(), DecodeError> {
        match self {
            Some(leaf) => leaf.check_rows(rows),
            None => Ok(()),
        }
    }
}

impl<A: BeamCache, B: BeamCache> BeamCache for (A, B) {
    fn gather(&self, indices: &[usize]) -> Result<Self, DecodeError> {
        Ok((self.0.gather(indices)?, self.1.gather(indices)?))
    }

    fn check_rows(&self, rows: usize) -> Result<(), DecodeError> {
        self.0.check_rows(rows)?;
        self.1.check_rows(rows)
    }
}

impl BeamCache for () {
    fn gather(&self, _indices: &[usize]) -> Result<Self, DecodeError> {
        Ok(())
    }

    fn check_rows(&self, _rows: usize) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Attention history of one decoder layer.
///
/// `key` and `value` hold one row per flattened hypothesis; `index` is the
/// next write position and is shared by every row.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCache {
    pub key: ArrayD<f32>,
    pub value: ArrayD<f32>,
    pub index: usize,
}

impl LayerCache {
    /// Zeroed cache for `rows` hypotheses and `max_len` positions of width `dim`.
    pub fn zeros(rows: usize, max_len: usize, dim: usize) -> Self {
        Self {
            key: ArrayD::zeros(vec![rows, max_len, dim]),
            value: ArrayD::zeros(vec![rows, max_len, dim]),
            index: 0,
        }
    }
}

impl BeamCache for LayerCache {
    fn gather(&self, indices: &[usize]) -> Result<Self, DecodeError> {
        Ok(Self {
            key: self.key.gather(indices)?,
            value: self.value.gather(indices)?,
            index: self.index,
        })
    }

    fn check_rows(&self, rows: usize) -> Result<(), DecodeError> {
        self.key.check_rows(rows)?;
        self.value.check_rows(rows)
    }
}

/// Repeats every row of a `batch_size`-row cache `beam_size` times in place:
/// `[e0, e1] -> [e0, e0, e1, e1]` for a beam of two.
pub fn expand_beams<T: BeamCache>(
    value: &T,
    batch_size: usize,
    beam_size: usize,
) -> Result<T, DecodeError> {
    let indices: Vec<usize> = (0..batch_size)
        .flat_map(|b| std::iter::repeat(b).take(beam_size))
        .collect();
    value.gather(&indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn gather_follows_indices() {
        let x = array![[1, 1], [2, 2], [3, 3]];
        let g = x.gather(&[2, 0, 0]).unwrap();
        assert_eq!(g, array![[3, 3], [1, 1], [1, 1]]);
    }

    #[test]
    fn gather_rejects_out_of_range() {
        let x: Array2<f32> = Array2::zeros((2, 3));
        match x.gather(&[0, 2]) {
            Err(DecodeError::CacheShape { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn check_rows_reports_first_bad_leaf() {
        let cache = (array![1, 2], array![[1], [2], [3]]);
        assert!(cache.check_rows(2).is_err());
        match cache.check_rows(3) {
            Err(DecodeError::CacheShape { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn expand_is_interleaved_not_tiled() {
        let x = array![10, 20, 30];
        let e = expand_beams(&x, 3, 2).unwrap();
        assert_eq!(e, array![10, 10, 20, 20, 30, 30]);
    }
}
