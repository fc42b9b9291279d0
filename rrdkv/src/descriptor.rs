//! Bucket descriptor: the persisted configuration of a bucket.
//!
//! A descriptor fixes how often a bucket is expected to be written (`step`),
//! how many samples it retains (`capacity`) and the ordered set of data
//! sources every sample carries. It is written once, when the bucket is
//! created, under [`DESCRIPTOR_KEY`](crate::codec::DESCRIPTOR_KEY), and read
//! back for every bucket when the store opens.

use serde::{Deserialize, Serialize};

use crate::error::ParamsError;

/// Configuration of a single round-robin bucket.
///
/// # Example
///
/// ```rust
/// use rrdkv::BucketDescriptor;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // One sample every 10s, one hour of history, two data sources.
/// let descriptor = BucketDescriptor::new(10, 360, &["in", "out"])?;
/// assert_eq!(descriptor.retention_secs(), 3600);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    /// Seconds between intended samples.
    pub step: u32,

    /// Maximum number of retained samples.
    pub capacity: u32,

    /// Ordered data-source labels; fixes the arity of every sample.
    pub data_sources: Vec<String>,
}

impl BucketDescriptor {
    /// Creates a validated descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ParamsError`] if `step` or `capacity` is zero or no data
    /// sources are given.
    pub fn new<S: AsRef<str>>(
        step: u32,
        capacity: u32,
        data_sources: &[S],
    ) -> Result<Self, ParamsError> {
        let descriptor = Self {
            step,
            capacity,
            data_sources: data_sources
                .iter()
                .map(|source| source.as_ref().to_string())
                .collect(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Checks the descriptor invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ParamsError`] naming the first violated invariant.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.step == 0 {
            return Err(ParamsError::InvalidStep);
        }
        if self.capacity == 0 {
            return Err(ParamsError::InvalidCapacity);
        }
        if self.data_sources.is_empty() {
            return Err(ParamsError::NoDataSources);
        }
        Ok(())
    }

    /// Number of readings in every sample.
    pub fn arity(&self) -> usize {
        self.data_sources.len()
    }

    /// Seconds of history the bucket holds at its nominal cadence.
    pub fn retention_secs(&self) -> i64 {
        i64::from(self.step) * i64::from(self.capacity)
    }

    /// Serializes the descriptor for storage.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a stored descriptor. Does not validate.
    pub(crate) fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid() {
        let descriptor = BucketDescriptor::new(2, 5, &["a", "b"]).unwrap();
        assert_eq!(descriptor.step, 2);
        assert_eq!(descriptor.capacity, 5);
        assert_eq!(descriptor.data_sources, vec!["a", "b"]);
        assert_eq!(descriptor.arity(), 2);
        assert_eq!(descriptor.retention_secs(), 10);
    }

    #[test]
    fn test_new_rejects_invalid() {
        assert!(matches!(
            BucketDescriptor::new(0, 5, &["a"]),
            Err(ParamsError::InvalidStep)
        ));
        assert!(matches!(
            BucketDescriptor::new(1, 0, &["a"]),
            Err(ParamsError::InvalidCapacity)
        ));
        assert!(matches!(
            BucketDescriptor::new::<&str>(1, 1, &[]),
            Err(ParamsError::NoDataSources)
        ));
    }

    #[test]
    fn test_encode_decode() {
        let descriptor = BucketDescriptor::new(60, 1440, &["temperature"]).unwrap();
        let raw = descriptor.encode().unwrap();
        assert_eq!(
            std::str::from_utf8(&raw).unwrap(),
            r#"{"step":60,"capacity":1440,"data_sources":["temperature"]}"#
        );
        assert_eq!(BucketDescriptor::decode(&raw).unwrap(), descriptor);
    }

    #[test]
    fn test_decode_does_not_validate() {
        let descriptor =
            BucketDescriptor::decode(br#"{"step":1,"capacity":0,"data_sources":["a"]}"#).unwrap();
        assert!(matches!(
            descriptor.validate(),
            Err(ParamsError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(BucketDescriptor::decode(b"not json").is_err());
        assert!(BucketDescriptor::decode(br#"{"step":1}"#).is_err());
    }
}
