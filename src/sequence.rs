//! Lazy sequence helpers.
use std::iter::{FusedIterator, Skip, Take};

/// Inclusive range that counts up or down depending on its bounds.
#[derive(Debug, Clone)]
pub struct Enumeration {
    next: Option<i64>,
    end: i64,
    step: i64,
}

/// Every integer from `start` to `end` inclusive, descending when
/// `start > end`.
pub fn enumeration(start: i64, end: i64) -> Enumeration {
    Enumeration {
        next: Some(start),
        end,
        step: if start <= end { 1 } else { -1 },
    }
}

impl Iterator for Enumeration {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let current = self.next?;
        self.next = if current == self.end {
            None
        } else {
            Some(current + self.step)
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            None => (0, Some(0)),
            Some(next) => {
                let remaining = usize::try_from(self.end.abs_diff(next))
                    .ok()
                    .and_then(|n| n.checked_add(1));
                (remaining.unwrap_or(usize::MAX), remaining)
            }
        }
    }
}

impl FusedIterator for Enumeration {}

/// Flattens `items` one level, dropping missing entries along the way since
/// `Option` iterates as zero or one element.
pub fn sequence_of<I, T>(items: I) -> impl Iterator<Item = T>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = T>,
{
    items.into_iter().flatten()
}

/// `length` elements of `sequence` starting at `start`; unbounded when
/// `length` is `None`.
pub fn sub_sequence<I>(sequence: I, start: usize, length: Option<usize>) -> Take<Skip<I::IntoIter>>
where
    I: IntoIterator,
{
    sequence
        .into_iter()
        .skip(start)
        .take(length.unwrap_or(usize::MAX))
}

/// Maps each element together with its zero-based index.
pub fn mapped_sequence<I, F, U>(sequence: I, mut f: F) -> impl Iterator<Item = U>
where
    I: IntoIterator,
    F: FnMut(I::Item, usize) -> U,
{
    sequence
        .into_iter()
        .enumerate()
        .map(move |(index, item)| f(item, index))
}
