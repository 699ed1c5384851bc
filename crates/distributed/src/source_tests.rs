use std::thread;
use std::time::Duration;

use rfq_common::{NodeId, QueryConfig, QueryId, Result, RfqError};
use rfq_merge::{PagedResultSource, RankedItem};

use crate::source::{CancelHandle, DistributedResultSource, PageSink};
use crate::stream::Page;

fn small_config() -> QueryConfig {
    QueryConfig {
        page_size: 2,
        limit: 0,
        first_page_timeout_ms: 1_000,
        page_channel_capacity: 2,
    }
}

fn open_stream(
    nodes: &[u64],
) -> (
    DistributedResultSource<u64>,
    PageSink<u64>,
    CancelHandle<u64>,
) {
    DistributedResultSource::open(
        QueryId(1),
        &small_config(),
        nodes.iter().copied().map(NodeId).collect(),
    )
    .expect("open stream")
}

fn page(node: u64, ranks: &[f32], last: bool) -> Page<u64> {
    Page {
        node: NodeId(node),
        items: ranks
            .iter()
            .enumerate()
            .map(|(i, &r)| RankedItem::new(r, i as u64))
            .collect(),
        last,
    }
}

#[test]
fn next_blocks_until_a_page_arrives() {
    let (mut source, sink, _cancel) = open_stream(&[1]);
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        sink.deliver(page(1, &[2.5, 1.5], true));
    });

    let first = source.next().expect("next").expect("item");
    assert_eq!(first.rank, 2.5);
    let second = source.next().expect("next").expect("item");
    assert_eq!(second.rank, 1.5);
    assert!(source.next().expect("end of stream").is_none());
    producer.join().expect("producer thread");
}

#[test]
fn items_arrive_in_delivery_order_across_nodes() {
    let (mut source, sink, _cancel) = open_stream(&[1, 2]);
    sink.deliver(page(2, &[1.0], false));
    sink.deliver(page(1, &[9.0], true));
    sink.deliver(page(2, &[5.0], true));

    let ranks: Vec<f32> = source
        .get(None)
        .expect("drain")
        .into_iter()
        .map(|i| i.rank)
        .collect();
    assert_eq!(ranks, vec![1.0, 9.0, 5.0]);
}

#[test]
fn first_page_latch_times_out_on_a_silent_node() {
    let (source, sink, _cancel) = open_stream(&[1, 2]);
    sink.deliver(page(1, &[1.0], false));

    let err = source
        .await_first_page(Some(Duration::from_millis(40)))
        .expect_err("latch must time out");
    assert!(matches!(err, RfqError::Timeout(_)));
}

#[test]
fn first_page_latch_opens_on_completion_without_results() {
    let (source, sink, _cancel) = open_stream(&[1, 2]);
    sink.deliver(page(1, &[1.0], false));
    sink.complete(NodeId(2));

    source
        .await_first_page(Some(Duration::from_millis(200)))
        .expect("latch open");
}

#[test]
fn cancel_unblocks_a_blocked_consumer() {
    let (mut source, _sink, cancel) = open_stream(&[1]);
    let consumer = thread::spawn(move || source.next());

    thread::sleep(Duration::from_millis(30));
    assert!(cancel.cancel().expect("first cancel"));
    assert!(cancel.is_cancelled());

    let err = consumer
        .join()
        .expect("consumer thread")
        .expect_err("cancelled stream fails the pull");
    assert!(matches!(err, RfqError::QueryExecution(_)));

    // second cancel reports the already-terminal stream
    assert!(!cancel.cancel().expect("second cancel"));
}

#[test]
fn node_failure_is_sticky() {
    let (mut source, sink, _cancel) = open_stream(&[1, 2]);
    sink.deliver(page(1, &[3.0], true));
    sink.fail(NodeId(2), RfqError::QueryExecution("node 2 lost".to_string()));

    for _ in 0..2 {
        let err = source.next().expect_err("failure surfaces");
        match err {
            RfqError::QueryExecution(msg) => assert!(msg.contains("node 2 lost")),
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(source.failure().is_some());
}

#[test]
fn timed_get_expires_while_nodes_are_outstanding() {
    let (mut source, sink, _cancel) = open_stream(&[1, 2]);
    sink.deliver(page(1, &[1.0], true));

    let err = source
        .get(Some(Duration::from_millis(40)))
        .expect_err("drain must time out");
    assert!(matches!(err, RfqError::Timeout(_)));
}

#[test]
fn timed_get_returns_everything_once_nodes_complete() {
    let (mut source, sink, _cancel) = open_stream(&[1, 2]);
    let producer = thread::spawn(move || {
        sink.deliver(page(1, &[1.0, 2.0], true));
        thread::sleep(Duration::from_millis(20));
        sink.deliver(page(2, &[3.0], true));
    });

    let items = source.get(Some(Duration::from_secs(2))).expect("drain");
    assert_eq!(items.len(), 3);
    producer.join().expect("producer thread");
}

#[test]
fn close_drops_buffered_items_and_interrupts_the_consumer() {
    let (mut source, sink, _cancel) = open_stream(&[1]);
    sink.deliver(page(1, &[1.0], false));
    source.close();

    let err = source.next().expect_err("closed stream");
    assert!(matches!(err, RfqError::Interrupted(_)));

    // late deliveries for a released stream are dropped silently
    sink.deliver(page(1, &[2.0], true));
    assert!(matches!(
        source.next().expect_err("still closed"),
        RfqError::Interrupted(_)
    ));
}

#[test]
fn metadata_reflects_the_submitted_query() {
    let (source, _sink, _cancel) = open_stream(&[4, 5, 6]);
    assert_eq!(source.query_id(), QueryId(1));
    assert_eq!(source.page_size(), 2);
    assert_eq!(source.limit(), None);
    assert_eq!(
        source.nodes(),
        &[NodeId(4), NodeId(5), NodeId(6)]
    );
    assert!(!source.is_cancelled());
}

#[test]
fn empty_node_set_is_rejected() {
    let result: Result<_> = DistributedResultSource::<u64>::open(QueryId(9), &small_config(), Vec::new());
    assert!(matches!(result, Err(RfqError::InvalidConfig(_))));
}
