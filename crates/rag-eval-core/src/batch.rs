//! Fixed-size batching.
//!
//! [`batch_items`] lazily groups any iterator into `Vec`s of `size` items.
//! Every batch is full except possibly the last; an empty input yields no
//! batches at all.

/// Default number of texts sent to a provider per call.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Lazy iterator returned by [`batch_items`].
pub struct Batches<I: Iterator> {
    inner: I,
    size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

/// Group `items` into batches of `size`. A `size` of 0 is treated as 1.
pub fn batch_items<I: IntoIterator>(items: I, size: usize) -> Batches<I::IntoIter> {
    Batches {
        inner: items.into_iter(),
        size: size.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_batches() {
        let batches: Vec<Vec<i32>> = batch_items(Vec::<i32>::new(), 20).collect();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_batches_reassemble_input() {
        for len in [1usize, 19, 20, 21, 40, 57] {
            let items: Vec<usize> = (0..len).collect();
            let batches: Vec<Vec<usize>> = batch_items(items.clone(), 20).collect();

            let (last, full) = batches.split_last().unwrap();
            assert!(full.iter().all(|b| b.len() == 20));
            assert!((1..=20).contains(&last.len()));

            let flat: Vec<usize> = batches.into_iter().flatten().collect();
            assert_eq!(flat, items, "len {}", len);
        }
    }

    #[test]
    fn test_batches_are_lazy() {
        let mut pulled = 0;
        let source = (0..100).inspect(|_| pulled += 1);
        let first = batch_items(source, 10).next().unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(pulled, 10);
    }

    #[test]
    fn test_zero_size_treated_as_one() {
        let batches: Vec<Vec<char>> = batch_items("ab".chars(), 0).collect();
        assert_eq!(batches, vec![vec!['a'], vec!['b']]);
    }
}
