//! Distributed fan-in for ranked queries.
//!
//! Responsibilities:
//! - per-node page stream plumbing (the transport seam);
//! - the blocking [`DistributedResultSource`] that turns N concurrent page
//!   streams into one arrival-ordered, cancellable pull surface;
//! - async pumps bridging the node streams into that surface;
//! - the [`RankedQueryCoordinator`] composition root returning merged
//!   top-k cursors.
//!
//! Key modules:
//! - [`stream`]
//! - [`source`]
//! - [`fanout`]
//! - [`coordinator`]

pub mod coordinator;
pub mod fanout;
pub mod source;
pub mod stream;

pub use coordinator::{RankedQueryCoordinator, RankedQueryCursor};
pub use fanout::spawn_node_pumps;
pub use source::{CancelHandle, DistributedResultSource, PageSink};
pub use stream::{
    NodePageStream, Page, PageSender, PageStreamAdapter, SendablePageStream, bounded_page_channel,
    empty_page_stream,
};

#[cfg(test)]
mod source_tests;
