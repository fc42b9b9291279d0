//! Range queries with resampling.
//!
//! [`Bucket::get_stats`] reads a time range from a bucket and resamples it
//! to a caller-chosen output step. The output step is compared with the
//! bucket's native step to pick one of two modes:
//!
//! - **Aggregation** (`output_step >= step`): the range is cut into windows
//!   of `output_step` seconds and each non-empty window becomes one point,
//!   the mean of every sample inside it, labeled with the window midpoint.
//! - **Interpolation** (`output_step < step`): the range is walked in
//!   increments of `output_step`, and each instant becomes the mean of the
//!   nearest stored sample before it and the first sample at or after it.
//!
//! ```text
//! samples        *       *       *       *
//! aggregation  [---a---][---b---][---c---]        one point per window
//! interpolate  ^   ^   ^   ^   ^   ^   ^          one point per instant
//! ```
//!
//! The whole query runs in one read transaction, so it sees a single
//! consistent snapshot. Any malformed stored entry fails the query; partial
//! results are never returned.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! # use rrdkv::Store;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let store = Store::open("./metrics.redb")?;
//! let now = 1_700_000_000;
//! // Last hour in 5 minute buckets.
//! let stats = store.bucket("network").get_stats(now - 3600, now, 300)?;
//! for dataset in &stats.datasets {
//!     println!("{}: {:?}", dataset.label, dataset.data);
//! }
//! # Ok(())
//! # }
//! ```

use redb::{AccessGuard, ReadableTable, StorageError};
use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;
use crate::codec::{self, EntryKey};
use crate::descriptor::BucketDescriptor;
use crate::error::{ConnectionError, ParamsError, Result};
use crate::store::bucket_table;

/// A resampled point: its timestamp and one value per data source.
type Row = (i64, Vec<f64>);

/// A raw entry as yielded by a table range.
type RawEntry<'a> = std::result::Result<(RawGuard<'a>, RawGuard<'a>), StorageError>;

/// A borrowed key or value of a bucket table.
type RawGuard<'a> = AccessGuard<'a, &'static [u8]>;

/// Resampling strategy chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Average all samples inside each output window.
    Aggregate,
    /// Average the samples around each output instant.
    Interpolate,
}

impl QueryMode {
    /// Picks the mode for a bucket with native step `step` queried at
    /// `output_step`.
    pub fn select(step: u32, output_step: u32) -> Self {
        if output_step >= step {
            Self::Aggregate
        } else {
            Self::Interpolate
        }
    }
}

/// Result of a range query, shaped for charting libraries.
///
/// `labels`, `timestamps` and every dataset's `data` are aligned by
/// position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Formatted time of each point.
    pub labels: Vec<String>,
    /// Unix timestamp (seconds) of each point.
    pub timestamps: Vec<i64>,
    /// One series per data source, in declared order.
    pub datasets: Vec<Dataset>,
    /// Which resampling strategy produced the points.
    pub mode: QueryMode,
}

/// Values of a single data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// The data-source label.
    pub label: String,
    /// One value per point.
    pub data: Vec<f64>,
}

impl Stats {
    fn from_rows(descriptor: &BucketDescriptor, mode: QueryMode, rows: Vec<Row>) -> Self {
        let mut datasets: Vec<Dataset> = descriptor
            .data_sources
            .iter()
            .map(|label| Dataset {
                label: label.clone(),
                data: Vec::with_capacity(rows.len()),
            })
            .collect();

        let mut labels = Vec::with_capacity(rows.len());
        let mut timestamps = Vec::with_capacity(rows.len());
        for (timestamp, values) in rows {
            labels.push(codec::format_label(timestamp));
            timestamps.push(timestamp);
            for (dataset, value) in datasets.iter_mut().zip(values) {
                dataset.data.push(value);
            }
        }

        Self {
            labels,
            timestamps,
            datasets,
            mode,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if no window or instant had data.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the dataset for a data source by label.
    pub fn dataset(&self, label: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|dataset| dataset.label == label)
    }
}

/// One side of an interpolation instant.
enum Neighbour {
    Missing,
    Descriptor,
    Sample(Vec<f64>),
}

impl Bucket<'_> {
    /// Returns the data in `[from, to)` resampled to `output_step` seconds.
    ///
    /// Uses aggregation when `output_step` is at least the bucket's step and
    /// interpolation otherwise (see [`crate::query`]). `from == to`
    /// yields an empty result.
    ///
    /// # Errors
    ///
    /// - [`ParamsError::BucketNotFound`] if the bucket doesn't exist
    /// - [`ParamsError::InvalidRange`] if `to` is before `from`
    /// - [`ParamsError::InvalidOutputStep`] if `output_step` is zero
    /// - [`DataError`](crate::error::DataError) if a stored entry is malformed
    /// - [`ConnectionError`] if the store is closed or the engine fails
    pub fn get_stats(&self, from: i64, to: i64, output_step: u32) -> Result<Stats> {
        let descriptor = self.require_descriptor()?;
        let db = self.store().database()?;
        if to < from {
            return Err(ParamsError::InvalidRange { from, to }.into());
        }
        if output_step == 0 {
            return Err(ParamsError::InvalidOutputStep.into());
        }

        let txn = db
            .begin_read()
            .map_err(ConnectionError::engine("begin read transaction"))?;
        let table = txn
            .open_table(bucket_table(self.name()))
            .map_err(|e| self.table_error(e))?;

        let mode = QueryMode::select(descriptor.step, output_step);
        let rows = match mode {
            QueryMode::Aggregate => self.aggregate(&table, descriptor, from, to, output_step)?,
            QueryMode::Interpolate => self.interpolate(&table, descriptor, from, to, output_step)?,
        };

        Ok(Stats::from_rows(descriptor, mode, rows))
    }

    /// Averages the samples of every window `[start, start + output_step)`.
    fn aggregate<T>(
        &self,
        table: &T,
        descriptor: &BucketDescriptor,
        from: i64,
        to: i64,
        output_step: u32,
    ) -> Result<Vec<Row>>
    where
        T: ReadableTable<&'static [u8], &'static [u8]>,
    {
        let width = i64::from(output_step);
        let mut rows = Vec::new();

        for start in steps(from, to, output_step) {
            let end = start.saturating_add(width);
            let lo = codec::encode_timestamp(start);
            let hi = codec::encode_timestamp(end);

            let mut window = Vec::new();
            for entry in table
                .range::<&[u8]>(lo.as_slice()..hi.as_slice())
                .map_err(ConnectionError::engine("scan window"))?
            {
                let (key, value) = entry.map_err(ConnectionError::engine("scan window"))?;
                let timestamp = match codec::classify_key(key.value()) {
                    EntryKey::Sample(timestamp) => timestamp,
                    EntryKey::Descriptor => break,
                    EntryKey::Unknown => return Err(self.malformed_key(key.value())),
                };
                let readings = self.decode_sample(descriptor, timestamp, value.value())?;
                window.push(readings);
            }

            if window.is_empty() {
                continue;
            }
            let midpoint = start + (end - start) / 2;
            rows.push((midpoint, average(&window, descriptor.arity())));
        }

        Ok(rows)
    }

    /// Averages the samples on both sides of every instant.
    fn interpolate<T>(
        &self,
        table: &T,
        descriptor: &BucketDescriptor,
        from: i64,
        to: i64,
        output_step: u32,
    ) -> Result<Vec<Row>>
    where
        T: ReadableTable<&'static [u8], &'static [u8]>,
    {
        let mut rows = Vec::new();

        for instant in steps(from, to, output_step) {
            let key = codec::encode_timestamp(instant);

            let next = table
                .range::<&[u8]>(key.as_slice()..)
                .map_err(ConnectionError::engine("seek sample"))?
                .next();
            let prev = table
                .range::<&[u8]>(..key.as_slice())
                .map_err(ConnectionError::engine("seek sample"))?
                .next_back();
            let next = self.neighbour(descriptor, next)?;
            let prev = self.neighbour(descriptor, prev)?;

            let mut around = Vec::with_capacity(2);
            for side in [prev, next] {
                match side {
                    Neighbour::Sample(values) => around.push(values),
                    Neighbour::Missing => {}
                    Neighbour::Descriptor => {
                        around.clear();
                        break;
                    }
                }
            }

            if around.is_empty() {
                continue;
            }
            rows.push((instant, average(&around, descriptor.arity())));
        }

        Ok(rows)
    }

    fn neighbour(
        &self,
        descriptor: &BucketDescriptor,
        entry: Option<RawEntry<'_>>,
    ) -> Result<Neighbour> {
        let Some(entry) = entry else {
            return Ok(Neighbour::Missing);
        };
        let (key, value) = entry.map_err(ConnectionError::engine("seek sample"))?;
        match codec::classify_key(key.value()) {
            EntryKey::Sample(timestamp) => {
                let readings = self.decode_sample(descriptor, timestamp, value.value())?;
                Ok(Neighbour::Sample(readings))
            }
            EntryKey::Descriptor => Ok(Neighbour::Descriptor),
            EntryKey::Unknown => Err(self.malformed_key(key.value())),
        }
    }
}

/// `from, from + step, ...` up to but excluding `to`.
fn steps(from: i64, to: i64, step: u32) -> impl Iterator<Item = i64> {
    let step = i64::from(step);
    std::iter::successors(Some(from), move |&t| t.checked_add(step))
        .take_while(move |&t| t < to)
}

/// Component-wise mean of equally long rows.
#[allow(clippy::cast_precision_loss)] // row counts are tiny compared to 2^52
fn average(rows: &[Vec<f64>], arity: usize) -> Vec<f64> {
    let mut sums = vec![0.0; arity];
    for row in rows {
        for (sum, value) in sums.iter_mut().zip(row) {
            *sum += value;
        }
    }

    let count = rows.len() as f64;
    for sum in &mut sums {
        *sum /= count;
    }
    sums
}
