//! On-disk encoding of bucket entries.
//!
//! Every bucket is one table in the database. Keys and values are raw byte
//! strings and the engine orders keys lexicographically, so the encodings
//! here are chosen to make byte order match time order.
//!
//! # Key Layout
//!
//! ```text
//! sample key      8 bytes   big-endian (timestamp as u64 ^ 1 << 63)
//! descriptor key 12 bytes   ff ff ff ff ff ff ff ff 'I' 'N' 'F' 'O'
//! ```
//!
//! Flipping the sign bit maps `i64::MIN..=i64::MAX` onto `0..=u64::MAX`
//! monotonically, so negative, zero and positive timestamps all sort
//! numerically. The descriptor key has every sample key as a proper prefix
//! or is greater at the first differing byte, so it always sorts last.
//!
//! # Sample Values
//!
//! A sample value is its readings in declared data-source order, rendered as
//! decimal text and joined by [`DELIMITER`]: `12.5|0|-3`.

use std::fmt::Write;

use chrono::DateTime;

/// Length of an encoded sample key.
pub const TIMESTAMP_KEY_LEN: usize = 8;

/// Reserved key of the descriptor entry, sorting after every sample key.
pub const DESCRIPTOR_KEY: &[u8] = b"\xff\xff\xff\xff\xff\xff\xff\xffINFO";

/// Separator between readings in a sample value.
pub const DELIMITER: char = '|';

/// Label format for query results, e.g. `Nov 14 22:13:20`.
pub const LABEL_FORMAT: &str = "%b %e %H:%M:%S";

const SIGN_BIT: u64 = 1 << 63;

/// What a raw key in a bucket table refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKey {
    /// A sample stored at this Unix timestamp.
    Sample(i64),
    /// The bucket's descriptor entry.
    Descriptor,
    /// Anything else; never written by this crate.
    Unknown,
}

/// Encodes a Unix timestamp (seconds) as an order-preserving key.
pub fn encode_timestamp(timestamp: i64) -> [u8; TIMESTAMP_KEY_LEN] {
    (timestamp.cast_unsigned() ^ SIGN_BIT).to_be_bytes()
}

/// Decodes a sample key, returning `None` if `key` is not 8 bytes long.
pub fn decode_timestamp(key: &[u8]) -> Option<i64> {
    let raw: [u8; TIMESTAMP_KEY_LEN] = key.try_into().ok()?;
    Some((u64::from_be_bytes(raw) ^ SIGN_BIT).cast_signed())
}

/// Classifies a raw key read back from a bucket table.
pub fn classify_key(key: &[u8]) -> EntryKey {
    if key == DESCRIPTOR_KEY {
        return EntryKey::Descriptor;
    }
    match decode_timestamp(key) {
        Some(timestamp) => EntryKey::Sample(timestamp),
        None => EntryKey::Unknown,
    }
}

/// Renders readings as a delimited sample value.
pub fn encode_readings(readings: &[f64]) -> String {
    let mut out = String::with_capacity(readings.len() * 8);
    for (i, value) in readings.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        // Writing to a String cannot fail.
        let _ = write!(out, "{value}");
    }
    out
}

/// Parses a sample value holding exactly `arity` readings.
///
/// # Errors
///
/// Returns a description of the problem if the value is not UTF-8, has the
/// wrong number of fields, or a field is not a number.
pub fn decode_readings(raw: &[u8], arity: usize) -> Result<Vec<f64>, String> {
    let text = std::str::from_utf8(raw).map_err(|e| format!("not utf-8: {e}"))?;

    let mut readings = Vec::with_capacity(arity);
    for field in text.split(DELIMITER) {
        let value = field
            .parse::<f64>()
            .map_err(|_| format!("bad format: '{text}'"))?;
        readings.push(value);
    }

    if readings.len() != arity {
        return Err(format!(
            "entry has {} values, bucket has {arity} data sources",
            readings.len()
        ));
    }
    Ok(readings)
}

/// Formats a Unix timestamp as a chart label (UTC).
pub fn format_label(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(time) => time.format(LABEL_FORMAT).to_string(),
        None => timestamp.to_string(),
    }
}
