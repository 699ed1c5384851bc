use std::time::Duration;

use rfq_common::{NodeId, QueryId, Result, RfqError};

use crate::RankedItem;

/// Pull-side contract of one distributed ranked query's paginated,
/// cancellable result stream.
///
/// Implementations deliver items in arrival order; global rank order is the
/// merge engine's job. Exactly one consumer thread may drive `next`/`get` at
/// a time (encoded by `&mut self`); lifecycle and metadata accessors are safe
/// to call from other threads holding a shared reference.
pub trait PagedResultSource {
    /// Caller-defined result value carried by each item.
    type Payload;

    /// Block until every participating node has delivered its first page,
    /// reported completion, or failed. A bounded wait fails with
    /// [`RfqError::Timeout`] when it expires.
    fn await_first_page(&self, timeout: Option<Duration>) -> Result<()>;

    /// Blocking pull of the next item in arrival order; `None` once every
    /// node has completed.
    fn next(&mut self) -> Result<Option<RankedItem<Self::Payload>>>;

    /// Drain every remaining item in arrival order, optionally bounded by
    /// `timeout`.
    fn get(&mut self, timeout: Option<Duration>) -> Result<Vec<RankedItem<Self::Payload>>>;

    /// Request cancellation of every in-flight per-node fetch. Returns
    /// `false` when the stream already reached a terminal state.
    fn cancel(&self) -> Result<bool>;

    /// Release the stream and any cursors behind it. Idempotent.
    fn close(&mut self);

    fn is_cancelled(&self) -> bool;

    /// Terminal failure recorded on the stream, if any.
    fn failure(&self) -> Option<RfqError>;

    /// Identifier of the query this stream answers.
    fn query_id(&self) -> QueryId;

    /// Max items one node ships per page.
    fn page_size(&self) -> usize;

    /// Participating nodes.
    fn nodes(&self) -> &[NodeId];

    /// Configured global result cap; `None` = unbounded.
    fn limit(&self) -> Option<usize>;
}
