//! Top-k merge engine: the ranked fan-in core.
//!
//! Wraps a [`PagedResultSource`], consumes its arrival-ordered item stream
//! into a max-oriented merge buffer, and re-exposes the same pull contract
//! yielding items in globally descending rank order, truncated to the
//! effective limit computed by the injected [`BoundingPolicy`].
//!
//! The engine reshapes only the data path. Every lifecycle operation
//! (`cancel`, `close`, `get`, waits, metadata) forwards verbatim to the
//! wrapped source, which owns cancellation semantics and remote cursors.

use std::time::{Duration, Instant};

use rfq_common::{NodeId, QueryId, Result, RfqError, global_metrics};
use tracing::debug;

use crate::buffer::MergeBuffer;
use crate::policy::{BoundingPolicy, StreamShape};
use crate::ranked::RankedItem;
use crate::source::PagedResultSource;

/// Drain/yield lifecycle of one engine instance.
///
/// Transitions: `Pending -> Draining` on the first pull, `Draining -> Primed`
/// once the policy's stopping condition fires or the stream ends,
/// `Primed -> Exhausted` when the buffer empties or the limit is reached.
/// A failed drain stays in `Draining`; the next pull resumes where it
/// stopped, so no underlying item is ever consumed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Pending,
    Draining,
    Primed,
    Exhausted,
}

/// Merges one distributed stream of ranked items into a limited,
/// rank-descending sequence.
///
/// Single-consumer, like the source it wraps. The engine owns only the merge
/// buffer and its counters; everything else belongs to the source.
pub struct TopKMergeEngine<S: PagedResultSource> {
    source: S,
    policy: Box<dyn BoundingPolicy>,
    shape: StreamShape,
    effective_limit: Option<usize>,
    buffer: MergeBuffer<S::Payload>,
    state: MergeState,
    drained: usize,
    yielded: usize,
}

impl<S: PagedResultSource> TopKMergeEngine<S> {
    /// Wrap `source`, computing the effective limit from `policy` and the
    /// stream shape. The source must not have been consumed yet.
    pub fn new(source: S, policy: impl BoundingPolicy + 'static) -> Self {
        let shape = StreamShape {
            page_size: source.page_size(),
            node_count: source.nodes().len(),
            limit: source.limit(),
        };
        let effective_limit = policy.effective_limit(&shape);
        debug!(
            query_id = %source.query_id(),
            page_size = shape.page_size,
            node_count = shape.node_count,
            limit = ?shape.limit,
            effective_limit = ?effective_limit,
            policy = ?policy,
            operator = "TopKMergeNew",
            "merge engine constructed"
        );
        Self {
            source,
            policy: Box::new(policy),
            shape,
            effective_limit,
            buffer: MergeBuffer::new(),
            state: MergeState::Pending,
            drained: 0,
            yielded: 0,
        }
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Cap on items this engine will yield; `None` = unbounded.
    pub fn effective_limit(&self) -> Option<usize> {
        self.effective_limit
    }

    /// Items yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Items consumed from the source so far.
    pub fn drained(&self) -> usize {
        self.drained
    }

    /// Shared view of the wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Pull the whole source into the buffer, up to the policy's stopping
    /// condition. Runs at most once per instance; a failed pass resumes on
    /// the caller's next attempt without re-reading consumed items.
    fn drain_source(&mut self) -> Result<()> {
        self.state = MergeState::Draining;
        let started = Instant::now();
        let before = self.drained;
        while !self.policy.drain_complete(self.drained, &self.shape) {
            let Some(item) = self.source.next()? else {
                break;
            };
            self.buffer.push(item);
            self.drained += 1;
        }
        self.state = MergeState::Primed;
        let query_id = self.source.query_id().to_string();
        global_metrics().record_merge_drain(
            &query_id,
            (self.drained - before) as u64,
            self.buffer.len() as u64,
            started.elapsed().as_secs_f64(),
        );
        debug!(
            query_id = %query_id,
            drained = self.drained,
            buffered = self.buffer.len(),
            operator = "TopKMergeDrain",
            "source drained into merge buffer"
        );
        Ok(())
    }

    fn exhaust(&mut self) {
        self.state = MergeState::Exhausted;
        self.buffer.clear();
        global_metrics().set_merge_buffer_items(&self.source.query_id().to_string(), 0);
    }

    fn pull_merged(&mut self) -> Result<Option<RankedItem<S::Payload>>> {
        match self.state {
            MergeState::Pending | MergeState::Draining => self.drain_source()?,
            MergeState::Primed => {}
            MergeState::Exhausted => return Ok(None),
        }
        if self.effective_limit.is_some_and(|l| self.yielded >= l) {
            self.exhaust();
            return Ok(None);
        }
        match self.buffer.pop() {
            Some(item) => {
                self.yielded += 1;
                global_metrics().inc_merge_items_yielded(&self.source.query_id().to_string());
                Ok(Some(item))
            }
            None => {
                self.exhaust();
                Ok(None)
            }
        }
    }
}

impl<S: PagedResultSource> PagedResultSource for TopKMergeEngine<S> {
    type Payload = S::Payload;

    fn await_first_page(&self, timeout: Option<Duration>) -> Result<()> {
        self.source.await_first_page(timeout)
    }

    /// Merged pull: globally descending rank order, truncated at the
    /// effective limit. `None` is sticky once returned.
    fn next(&mut self) -> Result<Option<RankedItem<Self::Payload>>> {
        self.pull_merged()
    }

    fn get(&mut self, timeout: Option<Duration>) -> Result<Vec<RankedItem<Self::Payload>>> {
        self.source.get(timeout)
    }

    fn cancel(&self) -> Result<bool> {
        self.source.cancel()
    }

    fn close(&mut self) {
        self.exhaust();
        self.source.close();
    }

    fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    fn failure(&self) -> Option<RfqError> {
        self.source.failure()
    }

    fn query_id(&self) -> QueryId {
        self.source.query_id()
    }

    fn page_size(&self) -> usize {
        self.source.page_size()
    }

    fn nodes(&self) -> &[NodeId] {
        self.source.nodes()
    }

    fn limit(&self) -> Option<usize> {
        self.source.limit()
    }
}
