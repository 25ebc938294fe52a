use std::num::NonZeroUsize;

/// Groups an iterator into vectors of `size` items; only the last group may be shorter.
pub struct Batches<I: Iterator> {
    inner: I,
    size: NonZeroUsize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let size = self.size.get();
        let mut batch = Vec::with_capacity(size.min(16 * 1024));
        batch.extend(self.inner.by_ref().take(size));
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

pub fn batches<I: IntoIterator>(items: I, size: NonZeroUsize) -> Batches<I::IntoIter> {
    Batches {
        inner: items.into_iter(),
        size,
    }
}
