//! Deterministic work partitioning.
//!
//! Per-bin statistics, candidate scoring and per-texel sampling are all
//! independent across indices. [`map_ranges`] splits an index space into
//! contiguous ranges, processes them (in parallel with rayon, or
//! sequentially), and returns the per-range results in range order. Since
//! each range is processed by the same closure either way, the merged output
//! does not depend on the number of threads.

use std::ops::Range;

use rayon::prelude::*;

/// Split `0..len` into contiguous ranges of at most `chunk` indices.
///
/// The last range may be shorter. A `chunk` of zero is treated as one.
pub fn ranges(len: usize, chunk: usize) -> impl Iterator<Item = Range<usize>> {
    let chunk = chunk.max(1);
    (0..len.div_ceil(chunk)).map(move |i| {
        let start = i * chunk;
        start..(start + chunk).min(len)
    })
}

/// Apply `f` to every range of `0..len` and collect the results in order.
pub fn map_ranges<T, F>(len: usize, chunk: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(Range<usize>) -> T + Sync + Send,
{
    let parts: Vec<Range<usize>> = ranges(len, chunk).collect();
    if parallel {
        parts.into_par_iter().map(f).collect()
    } else {
        parts.into_iter().map(f).collect()
    }
}

/// Apply `f` to every index of `0..len` and collect the results in order.
///
/// Convenience wrapper over [`map_ranges`] for per-item work.
pub fn map_indices<T, F>(len: usize, chunk: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    map_ranges(len, chunk, parallel, |r| r.map(&f).collect::<Vec<T>>())
        .into_iter()
        .flatten()
        .collect()
}

/// Chunk size giving each worker a handful of ranges to balance load.
pub fn default_chunk(len: usize) -> usize {
    let workers = rayon::current_num_threads().max(1);
    len.div_ceil(workers * 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_cover_exactly() {
        let parts: Vec<_> = ranges(10, 3).collect();
        assert_eq!(parts, vec![0..3, 3..6, 6..9, 9..10]);
        assert_eq!(ranges(0, 3).count(), 0);
        assert_eq!(ranges(4, 0).count(), 4);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let f = |i: usize| (i as f64).sqrt().sin();
        let seq = map_indices(1000, 7, false, f);
        let par = map_indices(1000, 7, true, f);
        assert_eq!(seq, par);
        assert_eq!(seq.len(), 1000);
    }

    #[test]
    fn test_range_results_in_order() {
        let starts = map_ranges(20, 6, true, |r| r.start);
        assert_eq!(starts, vec![0, 6, 12, 18]);
    }
}
