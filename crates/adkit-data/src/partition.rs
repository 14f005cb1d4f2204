//! Disjoint subset partitions of a dataset's index range.

use std::ops::Range;

use rand::{seq::SliceRandom, Rng};

use crate::error::{DataError, DataResult};

/// Splits `0..len` into `parts` contiguous ranges.
///
/// Every range but the last holds `len / parts` positions; the last one
/// absorbs the remainder. When `parts > len` the leading ranges are empty.
///
/// # Errors
///
/// Returns `DataError::InvalidConfig` when `parts` is zero.
pub fn partition_ranges(len: usize, parts: usize) -> DataResult<Vec<Range<usize>>> {
    if parts == 0 {
        return Err(DataError::InvalidConfig {
            reason: "cannot partition into zero subsets".into(),
        });
    }
    let size = len / parts;
    Ok((0..parts)
        .map(|j| {
            let start = j * size;
            let end = if j + 1 < parts { start + size } else { len };
            start..end
        })
        .collect())
}

/// A uniformly random permutation of `0..len` and its partition into
/// `parts` slices as laid out by [`partition_ranges`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffledPartition {
    /// The permutation.
    pub order: Vec<usize>,
    /// `order` cut into consecutive slices.
    pub parts: Vec<Vec<usize>>,
}

/// Permutes `0..len` with `rng` and cuts it into `parts` slices.
///
/// # Errors
///
/// Returns `DataError::InvalidConfig` when `parts` is zero.
pub fn shuffled_partition<R: Rng + ?Sized>(
    len: usize,
    parts: usize,
    rng: &mut R,
) -> DataResult<ShuffledPartition> {
    let ranges = partition_ranges(len, parts)?;
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    let parts = ranges.into_iter().map(|r| order[r].to_vec()).collect();
    Ok(ShuffledPartition { order, parts })
}
