//! Query submission and merged-cursor composition.
//!
//! The coordinator owns the fan-out side of one process: it opens the
//! blocking fan-in source over the supplied per-node page streams, spawns
//! the pumps, wraps the source with the top-k merge engine, and hands the
//! caller a [`RankedQueryCursor`]. Cancellation requested on the cursor (or
//! its detached [`CancelHandle`]) propagates to every in-flight pump.

use rfq_common::{NodeId, QueryConfig, QueryId, Result, RfqError};
use rfq_merge::{BoundingPolicy, MergeState, PagedResultSource, RankedItem, TopKMergeEngine};
use tokio::task::JoinHandle;
use tracing::info;

use crate::fanout::spawn_node_pumps;
use crate::source::{CancelHandle, DistributedResultSource};
use crate::stream::SendablePageStream;

/// Fans ranked queries out and returns merged, limited, rank-descending
/// cursors over the combined result stream.
pub struct RankedQueryCoordinator {
    config: QueryConfig,
    runtime: tokio::runtime::Handle,
}

impl RankedQueryCoordinator {
    pub fn new(config: QueryConfig, runtime: tokio::runtime::Handle) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, runtime })
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Fan `streams` in under `policy` and return the merged cursor.
    ///
    /// The cursor is blocking; consume it off the runtime's worker threads
    /// (e.g. inside `spawn_blocking`).
    pub fn submit<T: Send + 'static>(
        &self,
        query_id: QueryId,
        streams: Vec<SendablePageStream<T>>,
        policy: impl BoundingPolicy + 'static,
    ) -> Result<RankedQueryCursor<T>> {
        let nodes: Vec<NodeId> = streams.iter().map(|s| s.node()).collect();
        let (source, sink, cancel) =
            DistributedResultSource::open(query_id, &self.config, nodes)?;
        let pumps = spawn_node_pumps(&self.runtime, &sink, streams);
        info!(
            query_id = %query_id,
            nodes = pumps.len(),
            operator = "CoordinatorSubmit",
            "ranked query submitted"
        );
        let engine = TopKMergeEngine::new(source, policy);
        Ok(RankedQueryCursor {
            engine,
            cancel,
            pumps,
        })
    }
}

/// Blocking cursor over one query's merged result sequence.
pub struct RankedQueryCursor<T> {
    engine: TopKMergeEngine<DistributedResultSource<T>>,
    cancel: CancelHandle<T>,
    pumps: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> RankedQueryCursor<T> {
    /// Block until every node delivered its first page or completed/failed,
    /// bounded by the configured first-page timeout.
    pub fn await_first_page(&self) -> Result<()> {
        let timeout = self.engine.source().first_page_timeout();
        self.engine.await_first_page(Some(timeout))
    }

    /// Next merged item, highest rank first; `None` once exhausted.
    pub fn next(&mut self) -> Result<Option<RankedItem<T>>> {
        self.engine.next()
    }

    /// Cancel the query; stops every in-flight per-node fetch.
    pub fn cancel(&self) -> Result<bool> {
        self.cancel.cancel()
    }

    /// Detached relay for cancelling while a consumer owns the cursor.
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        self.cancel.clone()
    }

    /// Release the stream and stop outstanding pumps.
    pub fn close(&mut self) {
        self.engine.close();
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.engine.is_cancelled()
    }

    pub fn failure(&self) -> Option<RfqError> {
        self.engine.failure()
    }

    pub fn state(&self) -> MergeState {
        self.engine.state()
    }

    /// Cap on items this cursor will yield; `None` = unbounded.
    pub fn effective_limit(&self) -> Option<usize> {
        self.engine.effective_limit()
    }
}

impl<T> Drop for RankedQueryCursor<T> {
    fn drop(&mut self) {
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}
