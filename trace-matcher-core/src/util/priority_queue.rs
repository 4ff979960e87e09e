use std::{
    collections::hash_map::RandomState,
    hash::Hash,
    ops::{Deref, DerefMut},
};

use priority_queue::PriorityQueue;

/// Thin wrapper so the search module can name its open set without
/// depending on the `priority-queue` crate's own type directly.
pub struct InternalPriorityQueue<I: Hash + Eq, P: Ord, S = RandomState>(pub PriorityQueue<I, P, S>);

impl<H: Hash + Eq, I: Ord, S> Deref for InternalPriorityQueue<H, I, S> {
    type Target = PriorityQueue<H, I, S>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<H: Hash + Eq, I: Ord, S> DerefMut for InternalPriorityQueue<H, I, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<I: Hash + Eq, P: Ord> Default for InternalPriorityQueue<I, P, RandomState> {
    fn default() -> InternalPriorityQueue<I, P, RandomState> {
        InternalPriorityQueue(PriorityQueue::new())
    }
}
