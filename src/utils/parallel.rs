//! Parallel processing utilities.

use rayon::prelude::*;

/// Number of workers a parallel-for splits its data into.
#[inline]
pub fn available_workers() -> usize {
    rayon::current_num_threads().max(1)
}

/// Elements per chunk when `len` elements are split over `workers`
/// contiguous chunks. Minimum of 1.
#[inline]
pub fn chunk_size(len: usize, workers: usize) -> usize {
    len.div_ceil(workers.max(1)).max(1)
}

/// Splits `data` into at most `workers` contiguous chunks and hands each to
/// `f` together with the index of its first element.
///
/// Every element belongs to exactly one chunk, so `f` can keep per-worker
/// state without synchronization.
pub fn for_each_chunk<T, F>(data: &mut [T], workers: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if data.is_empty() {
        return;
    }

    let chunk_size = chunk_size(data.len(), workers);
    data.par_chunks_mut(chunk_size)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| f(chunk_idx * chunk_size, chunk));
}
