//! Bounded top-k selection.
//!
//! A fixed-capacity min-heap keeps the k best-scoring items seen so far:
//! an incoming item only displaces the current minimum when it scores
//! strictly higher, so n pushes cost O(n log k) time and O(k) space —
//! no full sort of the candidate set ever happens.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// An item paired with its sanitized score.
#[derive(Debug, Clone)]
struct Scored<T> {
    score: f64,
    item: T,
}

impl<T> PartialEq for Scored<T> {
    fn eq(&self, other: &Self) -> bool {
        self.score.total_cmp(&other.score) == Ordering::Equal
    }
}

impl<T> Eq for Scored<T> {}

impl<T> PartialOrd for Scored<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scored<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

/// Fixed-capacity "best k of n" selector.
///
/// Scores are taken as given per push; non-finite scores are coerced to
/// negative infinity so they can never evict a valid entry. Ties between
/// equal scores are broken arbitrarily — callers needing determinism for
/// ties must add a secondary key to the score.
#[derive(Debug)]
pub struct TopK<T> {
    capacity: usize,
    heap: BinaryHeap<Reverse<Scored<T>>>,
}

impl<T> TopK<T> {
    /// Creates a selector that retains at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    /// Offers an item with its score. Below-minimum items at capacity are
    /// discarded; otherwise the current minimum is evicted.
    pub fn push(&mut self, item: T, score: f64) {
        if self.capacity == 0 {
            return;
        }
        let score = if score.is_finite() {
            score
        } else {
            f64::NEG_INFINITY
        };
        let entry = Reverse(Scored { score, item });

        if self.heap.len() < self.capacity {
            self.heap.push(entry);
            return;
        }

        // peek_mut sifts the replacement down on drop, restoring the
        // min-heap invariant without a separate pop+push.
        if let Some(mut root) = self.heap.peek_mut() {
            if entry.0.score > root.0.score {
                *root = entry;
            }
        }
    }

    /// Number of items currently retained.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drains the selector into a vector sorted by score descending.
    pub fn into_sorted_desc(self) -> Vec<T> {
        // Ascending order of Reverse<Scored> is descending score.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(scored)| scored.item)
            .collect()
    }

    /// Like [`TopK::into_sorted_desc`], but keeps the scores.
    pub fn into_sorted_desc_with_scores(self) -> Vec<(T, f64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(scored)| (scored.item, scored.score))
            .collect()
    }
}
