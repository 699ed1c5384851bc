//! Per-node pump tasks feeding the blocking fan-in.

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::source::PageSink;
use crate::stream::SendablePageStream;

/// Spawn one pump per node stream.
///
/// Each pump forwards pages into `sink` until the node's last page, the end
/// of its stream, a stream failure, or the cancel broadcast.
pub fn spawn_node_pumps<T: Send + 'static>(
    runtime: &tokio::runtime::Handle,
    sink: &PageSink<T>,
    streams: Vec<SendablePageStream<T>>,
) -> Vec<JoinHandle<()>> {
    streams
        .into_iter()
        .map(|stream| {
            let sink = sink.clone();
            let cancel = sink.cancel_signal();
            runtime.spawn(pump_node_stream(stream, sink, cancel))
        })
        .collect()
}

async fn pump_node_stream<T: Send>(
    mut stream: SendablePageStream<T>,
    sink: PageSink<T>,
    mut cancel: watch::Receiver<bool>,
) {
    let node = stream.node();
    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    debug!(node_id = %node, operator = "NodePump", "pump stopped by cancel");
                    return;
                }
            }
            page = stream.next() => match page {
                Some(Ok(page)) => {
                    let last = page.last;
                    sink.deliver(page);
                    if last {
                        return;
                    }
                }
                Some(Err(err)) => {
                    sink.fail(node, err);
                    return;
                }
                None => {
                    sink.complete(node);
                    return;
                }
            }
        }
    }
}
