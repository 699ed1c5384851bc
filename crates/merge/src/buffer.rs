use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::RankedItem;

/// Priority structure holding the items consumed from the stream but not yet
/// yielded to the caller.
///
/// Max-oriented on rank; equal ranks pop in arrival order.
#[derive(Debug)]
pub struct MergeBuffer<T> {
    heap: BinaryHeap<BufferedItem<T>>,
    seq: u64,
}

#[derive(Debug)]
struct BufferedItem<T> {
    rank: f32,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for BufferedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rank.to_bits() == other.rank.to_bits() && self.seq == other.seq
    }
}
impl<T> Eq for BufferedItem<T> {}
impl<T> PartialOrd for BufferedItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for BufferedItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed seq so the earliest arrival wins rank ties
        self.rank
            .total_cmp(&other.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> MergeBuffer<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn push(&mut self, item: RankedItem<T>) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(BufferedItem {
            rank: item.rank,
            seq,
            payload: item.payload,
        });
    }

    /// Remove and return the highest-ranked buffered item.
    pub fn pop(&mut self) -> Option<RankedItem<T>> {
        self.heap
            .pop()
            .map(|e| RankedItem::new(e.rank, e.payload))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<T> Default for MergeBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
