//! # rrdkv
//!
//! Round-robin time-series buckets on top of an embedded transactional
//! key-value store.
//!
//! rrdkv keeps fixed-capacity time series in a single [redb] database file.
//! Each bucket samples a fixed set of data sources at a nominal interval and
//! keeps a bounded number of samples, evicting the oldest ones as new
//! samples arrive. Think rrdtool's round-robin archives, stored in an
//! ordinary ACID key-value database.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Bounded storage per bucket: `capacity` samples, enforced on every write
//! - Each write is one atomic transaction (evict + insert)
//! - Queries read one consistent snapshot and resample on the fly, either
//!   averaging windows or interpolating between samples
//! - Results are shaped for charting libraries (labels + one series per source)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rrdkv::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open or create a database
//! let mut store = Store::open("./metrics.redb")?;
//!
//! // One sample every 10s, one hour of history
//! let network = store.create_bucket("network", 10, 360, &["in", "out"])?;
//!
//! // Record the current readings
//! network.save(&[1200.0, 300.0])?;
//!
//! // Last hour, one point per minute
//! let now = 1_700_000_000;
//! let stats = network.get_stats(now - 3600, now, 60)?;
//! for (label, value) in stats.labels.iter().zip(&stats.datasets[0].data) {
//!     println!("{label}: {value}");
//! }
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`]: Top-level handle; owns the database connection and the bucket registry
//! - [`Bucket`]: Lightweight handle to one bucket; write path and queries
//! - [`BucketDescriptor`]: Persisted bucket configuration (step, capacity, data sources)
//! - [`Stats`]: Resampled query result
//!
//! ## Modules
//!
//! - [`store`]: Store lifecycle, bucket creation, lookup and listing
//! - [`bucket`]: Bucket handle and capacity-bounded writes
//! - [`query`]: Range queries and resampling
//! - [`descriptor`]: Bucket configuration and validation
//! - [`codec`]: Key and value encodings
//! - [`error`]: Error types
//!
//! [redb]: https://docs.rs/redb

pub mod bucket;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod query;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use bucket::Bucket;
pub use descriptor::BucketDescriptor;
pub use error::{ConnectionError, DataError, ParamsError, Result, RrdError};
pub use query::{Dataset, QueryMode, Stats};
pub use store::Store;
