use std::fmt;
use std::num::NonZeroUsize;

use rfq_common::{Result, RfqError};

/// Stream geometry snapshotted once at engine construction, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct StreamShape {
    /// Max items one node ships per page.
    pub page_size: usize,
    /// Number of participating nodes.
    pub node_count: usize,
    /// Configured global result cap; `None` = unbounded.
    pub limit: Option<usize>,
}

/// Strategy deciding how much of the underlying stream must be consumed
/// before merged output may be produced, and how many items may be yielded
/// overall. Injected into the engine at construction.
pub trait BoundingPolicy: fmt::Debug + Send {
    /// Cap on items yielded to the caller; `None` = unbounded.
    fn effective_limit(&self, shape: &StreamShape) -> Option<usize>;

    /// True once `drained` items are enough to stop pulling from the stream.
    fn drain_complete(&self, drained: usize, shape: &StreamShape) -> bool;
}

/// Consume the whole stream before yielding anything.
///
/// Correct for any distribution of results across nodes; drain latency and
/// memory are bounded only by the stream itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitForAll;

impl BoundingPolicy for WaitForAll {
    fn effective_limit(&self, shape: &StreamShape) -> Option<usize> {
        shape.limit
    }

    fn drain_complete(&self, _drained: usize, _shape: &StreamShape) -> bool {
        false
    }
}

/// Stop draining once one page per participating node was consumed
/// (`page_size * node_count` items).
///
/// Bounds memory when no limit is configured but the fan-out is known.
/// Higher-ranked items arriving past the cap are lost; that loss is the
/// accepted price of the bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstPageBounded;

impl BoundingPolicy for FirstPageBounded {
    fn effective_limit(&self, shape: &StreamShape) -> Option<usize> {
        shape.limit
    }

    fn drain_complete(&self, drained: usize, shape: &StreamShape) -> bool {
        let cap = shape.page_size.saturating_mul(shape.node_count);
        cap > 0 && drained >= cap
    }
}

/// Divide the global limit among contributing nodes before merging.
///
/// Each node's share is `limit / contributing`, clamped to at least one so a
/// limit smaller than the fan-out still returns results. Globally correct
/// top-k is guaranteed only when every node contributes close to its share;
/// unevenly distributed results can push qualifying items out of the answer.
#[derive(Debug, Clone, Copy)]
pub struct PerNodeShare {
    contributing: NonZeroUsize,
}

impl PerNodeShare {
    /// Build from an explicitly supplied contributing-node count.
    pub fn new(contributing: NonZeroUsize) -> Self {
        Self { contributing }
    }

    /// Historical divisor: every cluster member except the coordinator.
    ///
    /// Approximation only; prefer [`PerNodeShare::new`] with the real
    /// contributing count when the caller knows it.
    pub fn excluding_coordinator(node_count: usize) -> Result<Self> {
        NonZeroUsize::new(node_count.saturating_sub(1))
            .map(Self::new)
            .ok_or_else(|| {
                RfqError::InvalidConfig(
                    "per-node share needs at least one contributing node besides the coordinator"
                        .to_string(),
                )
            })
    }

    pub fn contributing(&self) -> usize {
        self.contributing.get()
    }

    fn share(&self, shape: &StreamShape) -> Option<usize> {
        shape.limit.map(|l| (l / self.contributing).max(1))
    }
}

impl BoundingPolicy for PerNodeShare {
    fn effective_limit(&self, shape: &StreamShape) -> Option<usize> {
        self.share(shape)
    }

    fn drain_complete(&self, drained: usize, shape: &StreamShape) -> bool {
        match self.share(shape) {
            Some(share) => drained >= share.saturating_mul(self.contributing.get()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(page_size: usize, node_count: usize, limit: Option<usize>) -> StreamShape {
        StreamShape {
            page_size,
            node_count,
            limit,
        }
    }

    #[test]
    fn wait_for_all_never_stops_the_drain() {
        let s = shape(1024, 4, Some(10));
        assert_eq!(WaitForAll.effective_limit(&s), Some(10));
        assert!(!WaitForAll.drain_complete(usize::MAX, &s));
    }

    #[test]
    fn first_page_cap_is_page_size_times_nodes() {
        let s = shape(2, 3, None);
        assert_eq!(FirstPageBounded.effective_limit(&s), None);
        assert!(!FirstPageBounded.drain_complete(5, &s));
        assert!(FirstPageBounded.drain_complete(6, &s));
    }

    #[test]
    fn per_node_share_divides_the_limit() {
        let policy = PerNodeShare::excluding_coordinator(3).expect("two contributors");
        let s = shape(1024, 3, Some(10));
        assert_eq!(policy.contributing(), 2);
        assert_eq!(policy.effective_limit(&s), Some(5));
        assert!(!policy.drain_complete(9, &s));
        assert!(policy.drain_complete(10, &s));
    }

    #[test]
    fn per_node_share_clamps_to_one() {
        let policy = PerNodeShare::new(NonZeroUsize::new(8).expect("nonzero"));
        let s = shape(1024, 8, Some(3));
        assert_eq!(policy.effective_limit(&s), Some(1));
    }

    #[test]
    fn per_node_share_without_limit_is_unbounded() {
        let policy = PerNodeShare::new(NonZeroUsize::new(2).expect("nonzero"));
        let s = shape(1024, 2, None);
        assert_eq!(policy.effective_limit(&s), None);
        assert!(!policy.drain_complete(1_000_000, &s));
    }

    #[test]
    fn single_member_cluster_cannot_divide() {
        assert!(matches!(
            PerNodeShare::excluding_coordinator(1),
            Err(RfqError::InvalidConfig(_))
        ));
    }
}
