//! Blocking fan-in over concurrent per-node page deliveries.
//!
//! The consumer half ([`DistributedResultSource`]) implements
//! [`PagedResultSource`]: arrival-ordered blocking pulls, the first-page
//! latch, timed drains, one-shot cancellation, and idempotent release. The
//! producer half ([`PageSink`]) is `Arc`-shared with one async pump per node.
//!
//! All consumer waits park on a single condvar; every producer-side
//! transition (page delivered, node completed, node failed, cancel, close)
//! wakes the waiters so a blocked consumer observes it promptly.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rfq_common::{NodeId, QueryConfig, QueryId, Result, RfqError, global_metrics};
use rfq_merge::{PagedResultSource, RankedItem};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::stream::Page;

struct StreamState<T> {
    buffered: VecDeque<RankedItem<T>>,
    first_page: HashSet<NodeId>,
    completed: HashSet<NodeId>,
    failure: Option<RfqError>,
    cancelled: bool,
    closed: bool,
}

struct SharedState<T> {
    state: Mutex<StreamState<T>>,
    wakeup: Condvar,
    cancel_tx: watch::Sender<bool>,
    query_id: QueryId,
    nodes: Vec<NodeId>,
}

impl<T> SharedState<T> {
    fn lock(&self) -> MutexGuard<'_, StreamState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn all_completed(&self, state: &StreamState<T>) -> bool {
        self.nodes.iter().all(|n| state.completed.contains(n))
    }

    fn first_page_latch_open(&self, state: &StreamState<T>) -> bool {
        self.nodes
            .iter()
            .all(|n| state.first_page.contains(n) || state.completed.contains(n))
    }

    fn cancel(&self) -> Result<bool> {
        let mut state = self.lock();
        let terminal = state.cancelled
            || state.closed
            || state.failure.is_some()
            || self.all_completed(&state);
        if terminal {
            return Ok(false);
        }
        state.cancelled = true;
        state.failure = Some(RfqError::cancelled());
        drop(state);
        let _ = self.cancel_tx.send(true);
        self.wakeup.notify_all();
        global_metrics().inc_source_cancellation(&self.query_id.to_string());
        debug!(
            query_id = %self.query_id,
            operator = "SourceCancel",
            "result stream cancelled"
        );
        Ok(true)
    }

    fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.buffered.clear();
        drop(state);
        let _ = self.cancel_tx.send(true);
        self.wakeup.notify_all();
        debug!(
            query_id = %self.query_id,
            operator = "SourceClose",
            "result stream released"
        );
    }
}

/// Producer handle shared by the per-node pumps. Cheap to clone.
pub struct PageSink<T> {
    shared: Arc<SharedState<T>>,
}

impl<T> Clone for PageSink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> PageSink<T> {
    /// Append one node page in arrival order and wake blocked consumers.
    /// Pages arriving after cancel/close are dropped.
    pub fn deliver(&self, page: Page<T>) {
        let query_id = self.shared.query_id;
        let items = page.items.len();
        {
            let mut state = self.shared.lock();
            if state.closed || state.cancelled {
                debug!(
                    query_id = %query_id,
                    node_id = %page.node,
                    operator = "SourceDeliver",
                    "dropping page for terminal stream"
                );
                return;
            }
            state.first_page.insert(page.node);
            if page.last {
                state.completed.insert(page.node);
            }
            state.buffered.extend(page.items);
        }
        global_metrics().record_source_page(
            &query_id.to_string(),
            &page.node.to_string(),
            items as u64,
        );
        self.shared.wakeup.notify_all();
    }

    /// Record a node's completion without a final page (its stream simply
    /// ended). Opens the first-page latch for that node.
    pub fn complete(&self, node: NodeId) {
        {
            let mut state = self.shared.lock();
            state.completed.insert(node);
        }
        self.shared.wakeup.notify_all();
    }

    /// Record a node failure. The first failure wins and is surfaced to
    /// every subsequent consumer call; the node counts as completed so the
    /// stream can still reach a terminal state.
    pub fn fail(&self, node: NodeId, err: RfqError) {
        let query_id = self.shared.query_id;
        warn!(
            query_id = %query_id,
            node_id = %node,
            error = %err,
            operator = "SourceNodeFailure",
            "node stream failed"
        );
        {
            let mut state = self.shared.lock();
            if state.failure.is_none() {
                state.failure = Some(err);
            }
            state.completed.insert(node);
        }
        global_metrics().inc_source_node_failure(&query_id.to_string(), &node.to_string());
        self.shared.wakeup.notify_all();
    }

    /// Cancel broadcast observed by every pump.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.shared.cancel_tx.subscribe()
    }
}

/// Cross-thread cancellation relay for a stream whose consumer half is
/// blocked elsewhere. Cheap to clone.
pub struct CancelHandle<T> {
    shared: Arc<SharedState<T>>,
}

impl<T> Clone for CancelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> CancelHandle<T> {
    pub fn cancel(&self) -> Result<bool> {
        self.shared.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().cancelled
    }
}

/// Consumer half of one distributed ranked query's result stream.
///
/// Single consumer; blocking. Dropping the source releases the stream and
/// stops the pumps feeding it.
pub struct DistributedResultSource<T> {
    shared: Arc<SharedState<T>>,
    page_size: usize,
    limit: Option<usize>,
    first_page_timeout: Duration,
    opened_at: Instant,
}

impl<T> DistributedResultSource<T> {
    /// Open the fan-in for `nodes`, returning the consumer half, the
    /// producer sink, and a cancellation relay.
    pub fn open(
        query_id: QueryId,
        config: &QueryConfig,
        nodes: Vec<NodeId>,
    ) -> Result<(Self, PageSink<T>, CancelHandle<T>)> {
        config.validate()?;
        if nodes.is_empty() {
            return Err(RfqError::InvalidConfig(
                "a ranked query needs at least one participating node".to_string(),
            ));
        }
        let (cancel_tx, _) = watch::channel(false);
        let shared = Arc::new(SharedState {
            state: Mutex::new(StreamState {
                buffered: VecDeque::new(),
                first_page: HashSet::new(),
                completed: HashSet::new(),
                failure: None,
                cancelled: false,
                closed: false,
            }),
            wakeup: Condvar::new(),
            cancel_tx,
            query_id,
            nodes,
        });
        let source = Self {
            shared: Arc::clone(&shared),
            page_size: config.page_size,
            limit: config.effective_limit(),
            first_page_timeout: Duration::from_millis(config.first_page_timeout_ms),
            opened_at: Instant::now(),
        };
        let sink = PageSink {
            shared: Arc::clone(&shared),
        };
        let handle = CancelHandle { shared };
        Ok((source, sink, handle))
    }

    /// Configured upper bound for the first-page wait.
    pub fn first_page_timeout(&self) -> Duration {
        self.first_page_timeout
    }

    /// Park on the stream condvar, honoring an optional deadline.
    ///
    /// `requested` is only used to build the timeout error.
    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, StreamState<T>>,
        deadline: Option<Instant>,
        requested: Option<Duration>,
    ) -> Result<MutexGuard<'a, StreamState<T>>> {
        match deadline {
            None => Ok(self
                .shared
                .wakeup
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner())),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RfqError::Timeout(requested.unwrap_or_default()));
                }
                let (guard, _) = self
                    .shared
                    .wakeup
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(|e| e.into_inner());
                Ok(guard)
            }
        }
    }
}

impl<T> PagedResultSource for DistributedResultSource<T> {
    type Payload = T;

    fn await_first_page(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut state = self.shared.lock();
        loop {
            if let Some(err) = &state.failure {
                return Err(err.clone());
            }
            if state.closed {
                return Err(RfqError::Interrupted(
                    "result stream closed while awaiting first page".to_string(),
                ));
            }
            if self.shared.first_page_latch_open(&state) {
                global_metrics().observe_first_page_wait(
                    &self.shared.query_id.to_string(),
                    self.opened_at.elapsed().as_secs_f64(),
                );
                return Ok(());
            }
            state = self.wait(state, deadline, timeout)?;
        }
    }

    fn next(&mut self) -> Result<Option<RankedItem<T>>> {
        let mut state = self.shared.lock();
        loop {
            if let Some(err) = &state.failure {
                return Err(err.clone());
            }
            if state.closed {
                return Err(RfqError::Interrupted(
                    "result stream closed while awaiting items".to_string(),
                ));
            }
            if let Some(item) = state.buffered.pop_front() {
                return Ok(Some(item));
            }
            if self.shared.all_completed(&state) {
                return Ok(None);
            }
            state = self.wait(state, None, None)?;
        }
    }

    fn get(&mut self, timeout: Option<Duration>) -> Result<Vec<RankedItem<T>>> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut out = Vec::new();
        let mut state = self.shared.lock();
        loop {
            if let Some(err) = &state.failure {
                return Err(err.clone());
            }
            if state.closed {
                return Err(RfqError::Interrupted(
                    "result stream closed while draining".to_string(),
                ));
            }
            while let Some(item) = state.buffered.pop_front() {
                out.push(item);
            }
            if self.shared.all_completed(&state) {
                return Ok(out);
            }
            state = self.wait(state, deadline, timeout)?;
        }
    }

    fn cancel(&self) -> Result<bool> {
        self.shared.cancel()
    }

    fn close(&mut self) {
        self.shared.close();
    }

    fn is_cancelled(&self) -> bool {
        self.shared.lock().cancelled
    }

    fn failure(&self) -> Option<RfqError> {
        self.shared.lock().failure.clone()
    }

    fn query_id(&self) -> QueryId {
        self.shared.query_id
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn nodes(&self) -> &[NodeId] {
        &self.shared.nodes
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl<T> Drop for DistributedResultSource<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}
