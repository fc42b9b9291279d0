//! Round-robin bucket handle and its write path.
//!
//! A [`Bucket`] is a lightweight view over one bucket table: the bucket's
//! name, a copy of its descriptor, and a borrow of the [`Store`] that owns
//! the connection. Persisted state lives entirely in the database.
//!
//! # Write Path
//!
//! Each write runs in one read-write transaction:
//!
//! ```text
//! count samples ──► full? ──yes──► evict keys <= t - capacity*step
//!                    │                  │
//!                    │            still full? ──yes──► give up the oldest of
//!                    │                  │              retained + incoming
//!                    ▼                  ▼
//!                  insert <t> = "v1|v2|..." ──► commit
//! ```
//!
//! Eviction and insertion commit together, so no reader ever sees the
//! bucket over capacity.

use std::ops::Bound;

use chrono::Utc;
use redb::{ReadableTable, ReadableTableMetadata, TableError};
use tracing::debug;

use crate::codec::{self, DESCRIPTOR_KEY, EntryKey};
use crate::descriptor::BucketDescriptor;
use crate::error::{ConnectionError, DataError, ParamsError, Result, RrdError};
use crate::store::{Store, bucket_table};

/// Handle to a single round-robin bucket.
///
/// Obtained from [`Store::create_bucket`], [`Store::bucket`] or
/// [`Store::get_bucket`]. A handle for an unknown name has no descriptor;
/// every operation on it fails with [`ParamsError::BucketNotFound`]. So does
/// every operation on a handle whose bucket was since removed with
/// [`Store::remove_bucket`].
#[derive(Debug, Clone)]
pub struct Bucket<'s> {
    store: &'s Store,
    name: String,
    descriptor: Option<BucketDescriptor>,
}

/// Outcome of making room for one incoming sample.
struct Room {
    /// Samples removed from the table.
    evicted: u64,
    /// Whether the incoming sample gets inserted.
    admit: bool,
}

impl<'s> Bucket<'s> {
    pub(crate) fn new(store: &'s Store, name: &str, descriptor: Option<BucketDescriptor>) -> Self {
        Self {
            store,
            name: name.to_string(),
            descriptor,
        }
    }

    /// Returns the bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the descriptor, or `None` if the bucket was not found.
    pub fn descriptor(&self) -> Option<&BucketDescriptor> {
        self.descriptor.as_ref()
    }

    /// Returns `true` if the handle refers to a known bucket.
    pub fn exists(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Returns the descriptor, or `BucketNotFound` for an empty handle.
    pub(crate) fn require_descriptor(&self) -> Result<&BucketDescriptor> {
        self.descriptor.as_ref().ok_or_else(|| self.not_found())
    }

    pub(crate) fn store(&self) -> &'s Store {
        self.store
    }

    fn not_found(&self) -> RrdError {
        ParamsError::BucketNotFound {
            name: self.name.clone(),
        }
        .into()
    }

    /// Maps a failure to open the bucket table for reading. A missing table
    /// means the bucket was removed after this handle was obtained.
    pub(crate) fn table_error(&self, error: TableError) -> RrdError {
        match error {
            TableError::TableDoesNotExist(_) => self.not_found(),
            other => ConnectionError::engine("open bucket table")(other),
        }
    }

    /// Saves one reading per data source, stamped with the current time.
    ///
    /// # Errors
    ///
    /// - [`ParamsError::BucketNotFound`] if the bucket doesn't exist
    /// - [`ParamsError::WrongArity`] if `readings.len()` differs from the
    ///   number of data sources
    /// - [`ParamsError::InvalidReading`] for NaN or infinite readings
    /// - [`ConnectionError`] if the store is closed or the engine fails
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use rrdkv::Store;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let store = Store::open("./metrics.redb")?;
    /// let network = store.bucket("network");
    /// network.save(&[1200.0, 300.0])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn save(&self, readings: &[f64]) -> Result<()> {
        self.write_at(Utc::now().timestamp(), readings)
    }

    /// Saves one reading per data source at an explicit Unix timestamp
    /// (seconds).
    ///
    /// An existing sample at the same second is overwritten. When the bucket
    /// is full and `timestamp` is older than every retained sample, the
    /// reading is dropped and the bucket is left as it was.
    ///
    /// # Errors
    ///
    /// Same as [`Bucket::save`].
    pub fn write_at(&self, timestamp: i64, readings: &[f64]) -> Result<()> {
        let descriptor = self.require_descriptor()?;
        validate_readings(descriptor, readings)?;
        let db = self.store.database()?;

        let key = codec::encode_timestamp(timestamp);
        let value = codec::encode_readings(readings);

        let txn = db
            .begin_write()
            .map_err(ConnectionError::engine("begin write transaction"))?;
        {
            let mut table = txn
                .open_table(bucket_table(&self.name))
                .map_err(ConnectionError::engine("open bucket table"))?;

            // Opening creates missing tables, so a removed bucket shows up
            // here as a table without a descriptor entry.
            let registered = table
                .get(DESCRIPTOR_KEY)
                .map_err(ConnectionError::engine("read descriptor"))?
                .is_some();
            if !registered {
                return Err(self.not_found());
            }

            let overwrite = table
                .get(key.as_slice())
                .map_err(ConnectionError::engine("read sample"))?
                .is_some();

            let mut admit = true;
            if !overwrite {
                let room = make_room(&mut table, descriptor, timestamp)?;
                if room.evicted > 0 {
                    debug!(bucket = %self.name, evicted = room.evicted, "evicted samples");
                }
                if !room.admit {
                    debug!(bucket = %self.name, timestamp, "dropped stale sample");
                }
                admit = room.admit;
            }

            if admit {
                table
                    .insert(key.as_slice(), value.as_bytes())
                    .map_err(ConnectionError::engine("write sample"))?;
            }
        }
        txn.commit()
            .map_err(ConnectionError::engine("commit sample"))?;

        Ok(())
    }

    /// Returns the number of retained samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket doesn't exist or the store is closed.
    pub fn sample_count(&self) -> Result<u64> {
        self.require_descriptor()?;
        let db = self.store.database()?;

        let txn = db
            .begin_read()
            .map_err(ConnectionError::engine("begin read transaction"))?;
        let table = txn
            .open_table(bucket_table(&self.name))
            .map_err(|e| self.table_error(e))?;

        count_samples(&table)
    }

    /// Returns the raw samples with `from <= timestamp < to`, oldest first.
    ///
    /// # Errors
    ///
    /// - [`ParamsError`] if the bucket doesn't exist or `to < from`
    /// - [`DataError`] if a stored sample can't be decoded
    /// - [`ConnectionError`] if the store is closed or the engine fails
    pub fn samples(&self, from: i64, to: i64) -> Result<Vec<(i64, Vec<f64>)>> {
        let descriptor = self.require_descriptor()?;
        let db = self.store.database()?;
        if to < from {
            return Err(ParamsError::InvalidRange { from, to }.into());
        }

        let txn = db
            .begin_read()
            .map_err(ConnectionError::engine("begin read transaction"))?;
        let table = txn
            .open_table(bucket_table(&self.name))
            .map_err(|e| self.table_error(e))?;

        let start = codec::encode_timestamp(from);
        let end = codec::encode_timestamp(to);
        let range = table
            .range::<&[u8]>(start.as_slice()..end.as_slice())
            .map_err(ConnectionError::engine("scan samples"))?;

        let mut samples = Vec::new();
        for entry in range {
            let (key, value) = entry.map_err(ConnectionError::engine("scan samples"))?;
            let Some(timestamp) = codec::decode_timestamp(key.value()) else {
                return Err(self.malformed_key(key.value()));
            };
            let readings = self.decode_sample(descriptor, timestamp, value.value())?;
            samples.push((timestamp, readings));
        }
        Ok(samples)
    }

    /// Decodes a stored sample value.
    pub(crate) fn decode_sample(
        &self,
        descriptor: &BucketDescriptor,
        timestamp: i64,
        raw: &[u8],
    ) -> Result<Vec<f64>> {
        codec::decode_readings(raw, descriptor.arity())
            .map_err(|reason| self.malformed_sample(timestamp, reason))
    }

    fn malformed_sample(&self, timestamp: i64, reason: String) -> RrdError {
        DataError::MalformedSample {
            bucket: self.name.clone(),
            timestamp,
            reason,
        }
        .into()
    }

    pub(crate) fn malformed_key(&self, key: &[u8]) -> RrdError {
        DataError::MalformedKey {
            bucket: self.name.clone(),
            key: key.to_vec(),
        }
        .into()
    }
}

/// Checks reading arity and finiteness before any transaction is opened.
fn validate_readings(descriptor: &BucketDescriptor, readings: &[f64]) -> Result<()> {
    if readings.len() != descriptor.arity() {
        return Err(ParamsError::WrongArity {
            expected: descriptor.arity(),
            actual: readings.len(),
        }
        .into());
    }
    for (index, &value) in readings.iter().enumerate() {
        if !value.is_finite() {
            return Err(ParamsError::InvalidReading { index, value }.into());
        }
    }
    Ok(())
}

/// Counts sample entries, leaving out the descriptor entry.
fn count_samples<T>(table: &T) -> Result<u64>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let entries = table
        .len()
        .map_err(ConnectionError::engine("count samples"))?;
    let has_descriptor = table
        .get(DESCRIPTOR_KEY)
        .map_err(ConnectionError::engine("read descriptor"))?
        .is_some();
    Ok(entries - u64::from(has_descriptor))
}

/// Evicts samples until one more fits within the bucket capacity.
///
/// Expired samples (at or before `timestamp - capacity * step`) go first.
/// If writes arrive faster than the declared step that alone can leave the
/// bucket full. Then the oldest of the retained samples and the incoming one
/// is given up: either the oldest retained sample is evicted, or the
/// incoming sample is not admitted.
fn make_room(
    table: &mut redb::Table<'_, &'static [u8], &'static [u8]>,
    descriptor: &BucketDescriptor,
    timestamp: i64,
) -> Result<Room> {
    let capacity = u64::from(descriptor.capacity);
    let count = count_samples(&*table)?;
    if count < capacity {
        return Ok(Room {
            evicted: 0,
            admit: true,
        });
    }

    let retention = descriptor.retention_secs();
    let cutoff = codec::encode_timestamp(timestamp.saturating_sub(retention));
    let mut doomed = Vec::new();
    for entry in table
        .range::<&[u8]>(..=cutoff.as_slice())
        .map_err(ConnectionError::engine("scan expired"))?
    {
        let (key, _) = entry.map_err(ConnectionError::engine("scan expired"))?;
        if let EntryKey::Sample(_) = codec::classify_key(key.value()) {
            doomed.push(key.value().to_vec());
        }
    }

    let mut admit = true;
    let expired = doomed.len() as u64;
    if count - expired >= capacity {
        let incoming = codec::encode_timestamp(timestamp);
        let retained = (Bound::Excluded(cutoff.as_slice()), Bound::Unbounded);
        let mut oldest = None;
        for entry in table
            .range::<&[u8]>(retained)
            .map_err(ConnectionError::engine("scan retained"))?
        {
            let (key, _) = entry.map_err(ConnectionError::engine("scan retained"))?;
            if let EntryKey::Sample(_) = codec::classify_key(key.value()) {
                oldest = Some(key.value().to_vec());
                break;
            }
        }

        match oldest {
            Some(key) if key.as_slice() < incoming.as_slice() => doomed.push(key),
            _ => admit = false,
        }
    }

    for key in &doomed {
        table
            .remove(key.as_slice())
            .map_err(ConnectionError::engine("evict sample"))?;
    }

    Ok(Room {
        evicted: doomed.len() as u64,
        admit,
    })
}
