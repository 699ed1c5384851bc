//! Bounded top-k merge over concurrent paginated ranked-result streams.
//!
//! Architecture role:
//! - defines [`RankedItem`] and its rank-only total-ordering contract
//! - defines [`PagedResultSource`], the narrow pull/lifecycle interface the
//!   engine consumes (and itself implements, as a transparent decorator)
//! - hosts the [`TopKMergeEngine`] and the injectable [`BoundingPolicy`]
//!   strategies that trade completeness for latency and memory bounds
//!
//! Key modules:
//! - [`ranked`]
//! - [`buffer`]
//! - [`policy`]
//! - [`source`]
//! - [`engine`]

pub mod buffer;
pub mod engine;
pub mod policy;
pub mod ranked;
pub mod source;

pub use buffer::MergeBuffer;
pub use engine::{MergeState, TopKMergeEngine};
pub use policy::{BoundingPolicy, FirstPageBounded, PerNodeShare, StreamShape, WaitForAll};
pub use ranked::RankedItem;
pub use source::PagedResultSource;
