//! Per-node page stream abstractions and channel adapters.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::channel::mpsc;
use rfq_common::{NodeId, Result, RfqError};
use rfq_merge::RankedItem;
use serde::{Deserialize, Serialize};

/// One bounded batch of ranked results from a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Node that produced this page.
    pub node: NodeId,
    /// Ranked results in node-local order.
    pub items: Vec<RankedItem<T>>,
    /// Completion report: no further pages follow from this node.
    pub last: bool,
}

/// A stream of result pages that also knows which node produces it.
pub trait NodePageStream<T>: Stream<Item = Result<Page<T>>> + Send {
    /// Producing node for every page yielded by this stream.
    fn node(&self) -> NodeId;
}

/// The standard "stream you can hand to the fan-in".
pub type SendablePageStream<T> = Pin<Box<dyn NodePageStream<T>>>;

/// Adapter that attaches a node id to any `Stream<Item = Result<Page<T>>>`.
pub struct PageStreamAdapter<S> {
    node: NodeId,
    inner: S,
}

impl<S> PageStreamAdapter<S> {
    /// Create a new node-attributed stream adapter.
    pub fn new(node: NodeId, inner: S) -> Self {
        Self { node, inner }
    }
}

impl<T, S> NodePageStream<T> for PageStreamAdapter<S>
where
    S: Stream<Item = Result<Page<T>>> + Send + Unpin + 'static,
{
    fn node(&self) -> NodeId {
        self.node
    }
}

impl<T, S> Stream for PageStreamAdapter<S>
where
    S: Stream<Item = Result<Page<T>>> + Unpin,
{
    type Item = Result<Page<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Create an empty stream (a node that participates but holds no matches).
pub fn empty_page_stream<T: Send + 'static>(node: NodeId) -> SendablePageStream<T> {
    let inner = futures::stream::empty::<Result<Page<T>>>();
    Box::pin(PageStreamAdapter::new(node, inner))
}

/// Create a node stream backed by a bounded channel.
///
/// Backpressure: when the fan-in is slow and the buffer fills up,
/// `sender.send_page(..).await` will wait until there is capacity again.
pub fn bounded_page_channel<T: Send + 'static>(
    node: NodeId,
    capacity: usize,
) -> (PageSender<T>, SendablePageStream<T>) {
    let (tx, rx) = mpsc::channel::<Result<Page<T>>>(capacity);
    let stream = Box::pin(PageStreamAdapter::new(node, rx));
    (PageSender { tx }, stream)
}

/// Sender side for [`bounded_page_channel`].
pub struct PageSender<T> {
    tx: mpsc::Sender<Result<Page<T>>>,
}

impl<T> Clone for PageSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> PageSender<T> {
    /// Send a page (awaits if the channel buffer is full).
    pub async fn send_page(&mut self, page: Page<T>) -> Result<()> {
        use futures::SinkExt;
        self.tx
            .send(Ok(page))
            .await
            .map_err(|e| RfqError::QueryExecution(format!("page channel closed: {e}")))
    }

    /// Send a node failure and terminate downstream consumption.
    pub async fn send_error(&mut self, err: RfqError) -> Result<()> {
        use futures::SinkExt;
        self.tx
            .send(Err(err))
            .await
            .map_err(|e| RfqError::QueryExecution(format!("page channel closed: {e}")))
    }
}
