//! Store module: the connection to the database and the bucket registry.
//!
//! The Store owns the single [`redb::Database`] connection shared by every
//! bucket, and an in-memory map from bucket name to [`BucketDescriptor`]
//! rebuilt from disk each time the store opens.
//!
//! # Database Layout
//!
//! ```text
//! metrics.redb
//! ├── table "cpu"                  <- one table per bucket
//! │   ├── <ts 1700000000> 12.5|3   <- sample entries, ordered by time
//! │   ├── <ts 1700000010> 11|4
//! │   └── INFO                     <- descriptor entry, always last
//! └── table "network"
//!     └── ...
//! ```
//!
//! Opening is all-or-nothing: a single table with a missing or invalid
//! descriptor fails [`Store::open`].
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use rrdkv::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = Store::open("./metrics.redb")?;
//!
//! store.create_bucket("network", 10, 360, &["in", "out"])?;
//! store.bucket("network").save(&[1200.0, 300.0])?;
//!
//! for name in store.list_buckets()? {
//!     println!("{name}");
//! }
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use redb::{Database, ReadableTable, TableDefinition, TableHandle};
use tracing::{debug, info, warn};

use crate::bucket::Bucket;
use crate::codec::DESCRIPTOR_KEY;
use crate::descriptor::BucketDescriptor;
use crate::error::{ConnectionError, DataError, ParamsError, Result};

/// Table definition for the bucket called `name`.
pub(crate) fn bucket_table(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

/// Top-level handle over a database of round-robin buckets.
///
/// # Thread Safety
///
/// `Store` is `Send + Sync`. Bucket handles borrow it, so they can be used
/// from scoped threads; the engine serializes write transactions and gives
/// every read transaction its own snapshot.
pub struct Store {
    /// Path to the database file.
    path: PathBuf,
    /// The connection; `None` once closed.
    db: Option<Database>,
    /// Descriptors of every known bucket, keyed by bucket name.
    buckets: RwLock<HashMap<String, BucketDescriptor>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("connected", &self.is_connected())
            .field("buckets", &*self.read_buckets())
            .finish()
    }
}

impl Store {
    /// Opens (creating if absent) the database at `path` and loads every
    /// bucket descriptor.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Open`] if the database can't be opened
    /// - [`DataError`] if any table lacks a valid descriptor entry
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use rrdkv::Store;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = Store::open("./metrics.redb")?;
    /// println!("{} buckets", store.list_buckets()?.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let db = Database::create(&path).map_err(|e| ConnectionError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        let buckets = Self::load(&db)?;
        debug!(path = %path.display(), buckets = buckets.len(), "opened store");

        Ok(Self {
            path,
            db: Some(db),
            buckets: RwLock::new(buckets),
        })
    }

    /// Reads and validates the descriptor of every table in the database.
    fn load(db: &Database) -> Result<HashMap<String, BucketDescriptor>> {
        let txn = db
            .begin_read()
            .map_err(ConnectionError::engine("begin read transaction"))?;

        let tables = txn
            .list_tables()
            .map_err(ConnectionError::engine("list tables"))?;

        let mut buckets = HashMap::new();
        for handle in tables {
            let name = handle.name().to_string();
            let descriptor = Self::read_descriptor(&txn, &name).inspect_err(|e| {
                warn!(bucket = %name, error = %e, "can't load bucket");
            })?;
            buckets.insert(name, descriptor);
        }

        Ok(buckets)
    }

    /// Reads the descriptor entry of one table.
    fn read_descriptor(txn: &redb::ReadTransaction, name: &str) -> Result<BucketDescriptor> {
        let table = txn
            .open_table(bucket_table(name))
            .map_err(|e| DataError::UnreadableBucket {
                bucket: name.to_string(),
                source: e,
            })?;

        let raw = table
            .get(DESCRIPTOR_KEY)
            .map_err(ConnectionError::engine("read descriptor"))?
            .ok_or_else(|| DataError::MissingDescriptor {
                bucket: name.to_string(),
            })?;

        let descriptor =
            BucketDescriptor::decode(raw.value()).map_err(|e| DataError::MalformedDescriptor {
                bucket: name.to_string(),
                source: e,
            })?;

        descriptor
            .validate()
            .map_err(|e| DataError::InvalidDescriptor {
                bucket: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(descriptor)
    }

    /// Closes the connection.
    ///
    /// Every later operation on this store, or on handles obtained after
    /// the call, fails with [`ConnectionError::NotConnected`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] if the store is already
    /// closed.
    pub fn close(&mut self) -> Result<()> {
        match self.db.take() {
            Some(db) => {
                drop(db);
                debug!(path = %self.path.display(), "closed store");
                Ok(())
            }
            None => Err(ConnectionError::NotConnected.into()),
        }
    }

    /// Returns `true` until [`Store::close`] is called.
    pub fn is_connected(&self) -> bool {
        self.db.is_some()
    }

    /// Returns the database connection.
    pub(crate) fn database(&self) -> Result<&Database> {
        self.db
            .as_ref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Creates a new bucket and returns a handle to it.
    ///
    /// Creation is not idempotent: a name already used by any table is
    /// rejected.
    ///
    /// # Arguments
    ///
    /// * `name` - Bucket name (non-empty, unique)
    /// * `step` - Seconds between intended samples
    /// * `capacity` - Maximum number of retained samples
    /// * `data_sources` - Ordered labels of the readings in every sample
    ///
    /// # Errors
    ///
    /// - [`ParamsError`] for an empty name, zero step or capacity, no data
    ///   sources, or an existing bucket of the same name
    /// - [`ConnectionError`] if the store is closed or the engine fails
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use rrdkv::Store;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let store = Store::open("./metrics.redb")?;
    /// // 1s samples, 10 minutes of history
    /// let cpu = store.create_bucket("cpu", 1, 600, &["user", "system"])?;
    /// cpu.save(&[12.5, 3.0])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_bucket<S: AsRef<str>>(
        &self,
        name: &str,
        step: u32,
        capacity: u32,
        data_sources: &[S],
    ) -> Result<Bucket<'_>> {
        if name.is_empty() {
            return Err(ParamsError::InvalidBucketName.into());
        }
        let descriptor = BucketDescriptor::new(step, capacity, data_sources)?;
        let db = self.database()?;

        if self.read_buckets().contains_key(name) {
            return Err(ParamsError::BucketExists {
                name: name.to_string(),
            }
            .into());
        }

        let encoded = descriptor
            .encode()
            .map_err(|e| DataError::MalformedDescriptor {
                bucket: name.to_string(),
                source: e,
            })?;

        let txn = db
            .begin_write()
            .map_err(ConnectionError::engine("begin write transaction"))?;

        let exists = txn
            .list_tables()
            .map_err(ConnectionError::engine("list tables"))?
            .any(|handle| handle.name() == name);
        if exists {
            return Err(ParamsError::BucketExists {
                name: name.to_string(),
            }
            .into());
        }

        {
            let mut table = txn
                .open_table(bucket_table(name))
                .map_err(ConnectionError::engine("create bucket table"))?;
            table
                .insert(DESCRIPTOR_KEY, encoded.as_slice())
                .map_err(ConnectionError::engine("write descriptor"))?;
        }
        txn.commit()
            .map_err(ConnectionError::engine("commit bucket creation"))?;

        info!(
            bucket = name,
            step,
            capacity,
            data_sources = ?descriptor.data_sources,
            "created bucket"
        );

        self.write_buckets()
            .insert(name.to_string(), descriptor.clone());

        Ok(Bucket::new(self, name, Some(descriptor)))
    }

    /// Returns a handle to the bucket called `name`.
    ///
    /// Never fails: for an unknown name the handle has no descriptor and
    /// every operation on it returns [`ParamsError::BucketNotFound`]. Use
    /// [`Store::get_bucket`] to test for existence up front.
    pub fn bucket(&self, name: &str) -> Bucket<'_> {
        let descriptor = self.read_buckets().get(name).cloned();
        Bucket::new(self, name, descriptor)
    }

    /// Returns a handle to the bucket called `name`, or `None` if unknown.
    pub fn get_bucket(&self, name: &str) -> Option<Bucket<'_>> {
        let descriptor = self.read_buckets().get(name).cloned()?;
        Some(Bucket::new(self, name, Some(descriptor)))
    }

    /// Returns the names of all known buckets, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] if the store is closed.
    pub fn list_buckets(&self) -> Result<Vec<String>> {
        self.database()?;
        Ok(self.read_buckets().keys().cloned().collect())
    }

    /// Deletes a bucket and all of its samples.
    ///
    /// # Errors
    ///
    /// - [`ParamsError::BucketNotFound`] if no such bucket is known
    /// - [`ConnectionError`] if the store is closed or the engine fails
    pub fn remove_bucket(&self, name: &str) -> Result<()> {
        let db = self.database()?;
        if !self.read_buckets().contains_key(name) {
            return Err(ParamsError::BucketNotFound {
                name: name.to_string(),
            }
            .into());
        }

        let txn = db
            .begin_write()
            .map_err(ConnectionError::engine("begin write transaction"))?;
        txn.delete_table(bucket_table(name))
            .map_err(ConnectionError::engine("delete bucket table"))?;
        txn.commit()
            .map_err(ConnectionError::engine("commit bucket removal"))?;

        self.write_buckets().remove(name);
        info!(bucket = name, "removed bucket");
        Ok(())
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_buckets(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, BucketDescriptor>> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_buckets(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, BucketDescriptor>> {
        self.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }
}
