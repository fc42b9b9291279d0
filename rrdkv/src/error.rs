//! Error types for rrdkv.

use thiserror::Error;

/// The main error type for all rrdkv operations.
///
/// Every failure falls into one of three kinds: the connection to the
/// underlying database, the persisted data, or the arguments supplied by the
/// caller.
#[derive(Error, Debug)]
pub enum RrdError {
    /// The database connection is missing or the engine failed.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Persisted state is structurally invalid.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// The caller supplied invalid arguments.
    #[error("params error: {0}")]
    Params(#[from] ParamsError),
}

impl RrdError {
    /// Returns `true` for [`RrdError::Connection`].
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` for [`RrdError::Data`].
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    /// Returns `true` for [`RrdError::Params`].
    pub fn is_params(&self) -> bool {
        matches!(self, Self::Params(_))
    }
}

/// Errors concerning the database connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The database file could not be opened or created.
    #[error("can't connect to db '{path}': {source}")]
    Open {
        /// The database path.
        path: String,
        /// The underlying engine error.
        #[source]
        source: redb::DatabaseError,
    },

    /// The store was closed (or never connected).
    #[error("connection not established")]
    NotConnected,

    /// The engine failed while running a transaction.
    #[error("failed to {context}: {source}")]
    Engine {
        /// What the store was doing when the engine failed.
        context: &'static str,
        /// The underlying engine error.
        #[source]
        source: redb::Error,
    },
}

impl ConnectionError {
    /// Returns a `map_err` adapter wrapping any engine error with `context`.
    pub(crate) fn engine<E: Into<redb::Error>>(
        context: &'static str,
    ) -> impl FnOnce(E) -> RrdError {
        move |e| {
            ConnectionError::Engine {
                context,
                source: e.into(),
            }
            .into()
        }
    }
}

/// Errors describing invalid persisted state.
#[derive(Error, Debug)]
pub enum DataError {
    /// A bucket table has no descriptor entry.
    #[error("no descriptor entry in bucket '{bucket}'")]
    MissingDescriptor {
        /// The bucket name.
        bucket: String,
    },

    /// The descriptor entry is not valid JSON for a descriptor.
    #[error("bad format of descriptor entry in bucket '{bucket}': {source}")]
    MalformedDescriptor {
        /// The bucket name.
        bucket: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The descriptor parsed but violates the descriptor invariants.
    #[error("invalid descriptor in bucket '{bucket}': {reason}")]
    InvalidDescriptor {
        /// The bucket name.
        bucket: String,
        /// Which invariant was violated.
        reason: String,
    },

    /// A table could not be opened as a bucket.
    #[error("can't open bucket '{bucket}': {source}")]
    UnreadableBucket {
        /// The bucket name.
        bucket: String,
        /// The underlying engine error.
        #[source]
        source: redb::TableError,
    },

    /// A stored sample could not be decoded.
    #[error("bad sample at {timestamp} in bucket '{bucket}': {reason}")]
    MalformedSample {
        /// The bucket name.
        bucket: String,
        /// The sample timestamp (Unix seconds).
        timestamp: i64,
        /// What was wrong with the encoding.
        reason: String,
    },

    /// A key is neither a timestamp key nor the descriptor key.
    #[error("unexpected key {key:02x?} in bucket '{bucket}'")]
    MalformedKey {
        /// The bucket name.
        bucket: String,
        /// The raw key bytes.
        key: Vec<u8>,
    },
}

/// Errors caused by invalid caller arguments.
#[derive(Error, Debug)]
pub enum ParamsError {
    /// Bucket names must be non-empty.
    #[error("bucket name must not be empty")]
    InvalidBucketName,

    /// Step must be at least one second.
    #[error("step must be greater than 0")]
    InvalidStep,

    /// Capacity must be at least one sample.
    #[error("capacity must be greater than 0")]
    InvalidCapacity,

    /// At least one data source is required.
    #[error("no data sources specified")]
    NoDataSources,

    /// The reading count does not match the bucket's data sources.
    #[error("wrong number of readings: {actual}, must be: {expected}")]
    WrongArity {
        /// The number of data sources in the bucket.
        expected: usize,
        /// The number of readings supplied.
        actual: usize,
    },

    /// A reading is NaN or infinite.
    #[error("reading {index} is not finite: {value}")]
    InvalidReading {
        /// Position of the reading.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// A bucket with this name already exists.
    #[error("bucket '{name}' already exists")]
    BucketExists {
        /// The bucket name.
        name: String,
    },

    /// The bucket handle does not refer to a known bucket.
    #[error("bucket '{name}' not found")]
    BucketNotFound {
        /// The bucket name.
        name: String,
    },

    /// The query range ends before it begins.
    #[error("end of interval {to} is before its beginning {from}")]
    InvalidRange {
        /// Start of the range (Unix seconds).
        from: i64,
        /// End of the range (Unix seconds).
        to: i64,
    },

    /// The query output step must be at least one second.
    #[error("output step must be greater than 0")]
    InvalidOutputStep,
}

/// Type alias for `Result<T, RrdError>`.
pub type Result<T> = std::result::Result<T, RrdError>;
