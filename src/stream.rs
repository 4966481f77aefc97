//! Versioned binary streams used to ship aggregation definitions between nodes.
//!
//! [`StreamOutput`] and [`StreamInput`] expose ordered primitive operations
//! (strings, varint integers, booleans, floats, optional values, enum tags).
//! Every primitive is encoded with `postcard`: integers as varints, strings and
//! sequences length-prefixed. Framing is the transport's job; a stream is just the
//! ordered payload plus the [`WireVersion`] negotiated for it.
//!
//! ```
//! use shardagg::stream::{StreamInput, StreamOutput, WireVersion};
//!
//! let mut out = StreamOutput::new(WireVersion::CURRENT);
//! out.write_string("latency_ms").unwrap();
//! out.write_vu64(300).unwrap();
//!
//! let bytes = out.into_bytes();
//! let mut input = StreamInput::new(&bytes, WireVersion::CURRENT);
//! assert_eq!(input.read_string().unwrap(), "latency_ms");
//! assert_eq!(input.read_vu64().unwrap(), 300);
//! assert!(input.is_exhausted());
//! ```

use crate::error::{AggregationError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Display, Formatter, Result as FormatResult};

/// Version of the wire protocol a stream is written with.
///
/// Writers omit fields introduced after the stream's version; readers fill them
/// with defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WireVersion(u32);

impl WireVersion {
    /// Initial protocol.
    pub const V1: Self = Self(1);
    /// Adds `keyed` to percentiles state.
    pub const V2: Self = Self(2);
    /// Version spoken by this build.
    pub const CURRENT: Self = Self::V2;

    /// Wrap a raw version id.
    #[must_use]
    pub const fn from_id(id: u32) -> Self {
        Self(id)
    }

    /// Raw version id.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Whether this build can decode streams of this version.
    #[must_use]
    pub fn is_supported(self) -> bool {
        self >= Self::V1 && self <= Self::CURRENT
    }
}

impl Display for WireVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "v{}", self.0)
    }
}

/// Append-only binary output.
#[derive(Debug, Clone)]
pub struct StreamOutput {
    buf: Vec<u8>,
    version: WireVersion,
}

impl StreamOutput {
    /// Create an empty stream written at `version`.
    #[must_use]
    pub fn new(version: WireVersion) -> Self {
        Self {
            buf: Vec::new(),
            version,
        }
    }

    /// The version this stream is written at.
    #[must_use]
    pub fn version(&self) -> WireVersion {
        self.version
    }

    /// Encode any serde value with postcard and append it.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`] if the value cannot be encoded.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = postcard::to_allocvec(value).map_err(|e| {
            AggregationError::invalid_request(format!("value cannot be written to the wire ({e})"))
        })?;
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    /// Length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// See [`StreamOutput::write`].
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write(value)
    }

    /// Variable-length unsigned integer.
    ///
    /// # Errors
    ///
    /// See [`StreamOutput::write`].
    pub fn write_vu64(&mut self, value: u64) -> Result<()> {
        self.write(&value)
    }

    /// # Errors
    ///
    /// See [`StreamOutput::write`].
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write(&value)
    }

    /// # Errors
    ///
    /// See [`StreamOutput::write`].
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write(&value)
    }

    /// Presence flag followed by the value when present.
    ///
    /// # Errors
    ///
    /// Propagates errors from `write_value`.
    pub fn write_optional<T, F>(&mut self, value: Option<&T>, write_value: F) -> Result<()>
    where
        T: ?Sized,
        F: FnOnce(&mut Self, &T) -> Result<()>,
    {
        match value {
            Some(v) => {
                self.write_bool(true)?;
                write_value(self, v)
            }
            None => self.write_bool(false),
        }
    }

    /// Optional string, the most common optional on the wire.
    ///
    /// # Errors
    ///
    /// See [`StreamOutput::write`].
    pub fn write_optional_string(&mut self, value: Option<&str>) -> Result<()> {
        self.write_optional(value, |out, v| out.write_string(v))
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish the stream and return its payload.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received payload.
#[derive(Debug)]
pub struct StreamInput<'a> {
    buf: &'a [u8],
    pos: usize,
    version: WireVersion,
}

impl<'a> StreamInput<'a> {
    /// Read `buf`, which was written at `version`.
    #[must_use]
    pub fn new(buf: &'a [u8], version: WireVersion) -> Self {
        Self {
            buf,
            pos: 0,
            version,
        }
    }

    /// The version the payload was written at.
    #[must_use]
    pub fn version(&self) -> WireVersion {
        self.version
    }

    /// Switch the version once a leading version header has been consumed.
    pub(crate) fn set_version(&mut self, version: WireVersion) {
        self.version = version;
    }

    /// Decode the next postcard value.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Deserialization`] on truncated or corrupt input.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T> {
        let remaining = &self.buf[self.pos..];
        let (value, rest) = postcard::take_from_bytes::<T>(remaining).map_err(|e| {
            AggregationError::deserialization(format!(
                "corrupt wire state at byte {} ({e})",
                self.pos
            ))
        })?;
        self.pos += remaining.len() - rest.len();
        Ok(value)
    }

    /// # Errors
    ///
    /// See [`StreamInput::read`].
    pub fn read_string(&mut self) -> Result<String> {
        self.read()
    }

    /// # Errors
    ///
    /// See [`StreamInput::read`].
    pub fn read_vu64(&mut self) -> Result<u64> {
        self.read()
    }

    /// # Errors
    ///
    /// See [`StreamInput::read`].
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read()
    }

    /// # Errors
    ///
    /// See [`StreamInput::read`].
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read()
    }

    /// Inverse of [`StreamOutput::write_optional`].
    ///
    /// # Errors
    ///
    /// Propagates errors from the presence flag or `read_value`.
    pub fn read_optional<T, F>(&mut self, read_value: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.read_bool()? {
            read_value(self).map(Some)
        } else {
            Ok(None)
        }
    }

    /// # Errors
    ///
    /// See [`StreamInput::read`].
    pub fn read_optional_string(&mut self) -> Result<Option<String>> {
        self.read_optional(StreamInput::read_string)
    }

    /// Whether every byte has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Fail unless the payload was consumed exactly.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Deserialization`] when trailing bytes remain.
    pub fn expect_exhausted(&self) -> Result<()> {
        if self.is_exhausted() {
            Ok(())
        } else {
            Err(AggregationError::deserialization(format!(
                "{} trailing bytes after payload",
                self.buf.len() - self.pos
            )))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn primitives_read_back_in_order() {
        let mut out = StreamOutput::new(WireVersion::CURRENT);
        out.write_string("stats").unwrap();
        out.write_vu64(u64::MAX).unwrap();
        out.write_bool(false).unwrap();
        out.write_f64(-0.5).unwrap();
        out.write_optional_string(None).unwrap();
        out.write_optional_string(Some("0.0")).unwrap();
        let bytes = out.into_bytes();

        let mut input = StreamInput::new(&bytes, WireVersion::CURRENT);
        assert_eq!(input.read_string().unwrap(), "stats");
        assert_eq!(input.read_vu64().unwrap(), u64::MAX);
        assert!(!input.read_bool().unwrap());
        assert_eq!(input.read_f64().unwrap(), -0.5);
        assert_eq!(input.read_optional_string().unwrap(), None);
        assert_eq!(input.read_optional_string().unwrap().as_deref(), Some("0.0"));
        input.expect_exhausted().unwrap();
    }

    #[test]
    fn small_integers_use_one_byte() {
        let mut out = StreamOutput::new(WireVersion::CURRENT);
        out.write_vu64(127).unwrap();
        assert_eq!(out.len(), 1);
        out.write_vu64(128).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn truncated_input_is_a_deserialization_error() {
        let mut out = StreamOutput::new(WireVersion::CURRENT);
        out.write_string("latency_ms").unwrap();
        let bytes = out.into_bytes();

        let mut input = StreamInput::new(&bytes[..4], WireVersion::CURRENT);
        let err = input.read_string().unwrap_err();
        assert!(matches!(err, AggregationError::Deserialization { .. }));
    }

    #[test]
    fn trailing_bytes_are_reported() {
        let bytes = [1u8, 2, 3];
        let mut input = StreamInput::new(&bytes, WireVersion::CURRENT);
        assert!(input.read_bool().unwrap());
        assert!(input.expect_exhausted().is_err());
    }

    #[test]
    fn version_support_window() {
        assert!(WireVersion::V1.is_supported());
        assert!(WireVersion::CURRENT.is_supported());
        assert!(!WireVersion::from_id(0).is_supported());
        assert!(!WireVersion::from_id(WireVersion::CURRENT.id() + 1).is_supported());
        assert_eq!(WireVersion::V2.to_string(), "v2");
    }
}
