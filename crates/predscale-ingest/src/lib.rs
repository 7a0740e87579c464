//! predscale-ingest — forecast validation and input feeds.
//!
//! # Architecture
//!
//! ```text
//! producers (HTTP push, sidecars)
//!   ├── ForecastFeed::publish()     ← latest raw record per horizon
//!   └── UtilizationFeed::publish()  ← latest observed utilization
//!
//! tick start
//!   └── Ingestor::ingest_batch(feed.snapshot(), now) → IngestReport
//! ```
//!
//! The feeds only reject records that can never become valid (NaN, bounds
//! out of order). Staleness depends on the tick time, so it is checked by
//! the ingestor when the loop takes its snapshot.

pub mod feed;
pub mod ingestor;

pub use feed::{FeedError, ForecastFeed, PublishReport, UtilizationFeed};
pub use ingestor::{IngestReport, Ingestor};
