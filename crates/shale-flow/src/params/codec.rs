//! Low-level blob encoding helpers.
//!
//! Parameter blobs are ordered field layouts: little-endian scalars,
//! `u32`-length-prefixed strings and arrays, and an explicit `u8`
//! presence flag preceding every nullable field (0 = absent, 1 =
//! present; anything else is a decode error). There is no
//! self-description on the wire: each parameter type owns its layout
//! and the task record's type tag selects the decoder.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Append-only blob writer.
#[derive(Debug, Default)]
pub struct BlobWriter {
    buf: BytesMut,
}

impl BlobWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes the accumulated bytes.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Writes a `u64` scalar.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Writes a `u32` scalar.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Writes a nullable `u64` behind a presence flag.
    pub fn put_opt_u64(&mut self, value: Option<u64>) {
        match value {
            Some(v) => {
                self.buf.put_u8(1);
                self.buf.put_u64_le(v);
            }
            None => self.buf.put_u8(0),
        }
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn put_string(&mut self, value: &str) {
        self.put_u32(u32::try_from(value.len()).unwrap_or(u32::MAX));
        self.buf.put_slice(value.as_bytes());
    }

    /// Writes a nullable string behind a presence flag.
    pub fn put_opt_string(&mut self, value: Option<&str>) {
        match value {
            Some(v) => {
                self.buf.put_u8(1);
                self.put_string(v);
            }
            None => self.buf.put_u8(0),
        }
    }

    /// Writes a length-prefixed array of `u64` scalars.
    pub fn put_u64_array(&mut self, values: &[u64]) {
        self.put_u32(u32::try_from(values.len()).unwrap_or(u32::MAX));
        for &value in values {
            self.buf.put_u64_le(value);
        }
    }

    /// Writes a length-prefixed array of strings.
    pub fn put_string_array(&mut self, values: &[String]) {
        self.put_u32(u32::try_from(values.len()).unwrap_or(u32::MAX));
        for value in values {
            self.put_string(value);
        }
    }
}

/// Consuming blob reader with bounds checking.
#[derive(Debug)]
pub struct BlobReader {
    buf: Bytes,
}

impl BlobReader {
    /// Wraps a blob for decoding.
    #[must_use]
    pub fn new(blob: &Bytes) -> Self {
        Self { buf: blob.clone() }
    }

    /// Fails unless every byte of the blob was consumed.
    ///
    /// # Errors
    ///
    /// Returns a decode error naming the number of trailing bytes.
    pub fn expect_end(&self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(Error::param_decode(format!(
                "{} trailing bytes after last field",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn need(&self, bytes: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < bytes {
            return Err(Error::param_decode(format!(
                "truncated blob: need {bytes} bytes for {what}, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    /// Reads a `u64` scalar.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation.
    pub fn get_u64(&mut self) -> Result<u64> {
        self.need(8, "u64")?;
        Ok(self.buf.get_u64_le())
    }

    /// Reads a `u32` scalar.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation.
    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32_le())
    }

    fn get_presence(&mut self) -> Result<bool> {
        self.need(1, "presence flag")?;
        match self.buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::param_decode(format!(
                "invalid presence flag {other}"
            ))),
        }
    }

    /// Reads a nullable `u64` behind a presence flag.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation or an invalid flag.
    pub fn get_opt_u64(&mut self) -> Result<Option<u64>> {
        if self.get_presence()? {
            Ok(Some(self.get_u64()?))
        } else {
            Ok(None)
        }
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation or invalid UTF-8.
    pub fn get_string(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        self.need(len, "string payload")?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::param_decode(format!("invalid utf-8 in string field: {e}")))
    }

    /// Reads a nullable string behind a presence flag.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation or an invalid flag.
    pub fn get_opt_string(&mut self) -> Result<Option<String>> {
        if self.get_presence()? {
            Ok(Some(self.get_string()?))
        } else {
            Ok(None)
        }
    }

    /// Reads a length-prefixed array of `u64` scalars.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation.
    pub fn get_u64_array(&mut self) -> Result<Vec<u64>> {
        let len = self.get_u32()? as usize;
        // Bound the allocation by what the blob can actually hold.
        self.need(len.saturating_mul(8), "u64 array payload")?;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.buf.get_u64_le());
        }
        Ok(values)
    }

    /// Reads a length-prefixed array of strings.
    ///
    /// # Errors
    ///
    /// Returns a decode error on truncation or invalid UTF-8.
    pub fn get_string_array(&mut self) -> Result<Vec<String>> {
        let len = self.get_u32()? as usize;
        let mut values = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            values.push(self.get_string()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_roundtrip() -> Result<()> {
        let mut writer = BlobWriter::new();
        writer.put_u64(u64::MAX);
        writer.put_u32(7);
        let blob = writer.finish();

        let mut reader = BlobReader::new(&blob);
        assert_eq!(reader.get_u64()?, u64::MAX);
        assert_eq!(reader.get_u32()?, 7);
        reader.expect_end()?;
        Ok(())
    }

    #[test]
    fn presence_flags_roundtrip() -> Result<()> {
        let mut writer = BlobWriter::new();
        writer.put_opt_u64(None);
        writer.put_opt_u64(Some(9));
        writer.put_opt_string(None);
        writer.put_opt_string(Some("hello"));
        let blob = writer.finish();

        let mut reader = BlobReader::new(&blob);
        assert_eq!(reader.get_opt_u64()?, None);
        assert_eq!(reader.get_opt_u64()?, Some(9));
        assert_eq!(reader.get_opt_string()?, None);
        assert_eq!(reader.get_opt_string()?, Some("hello".to_string()));
        reader.expect_end()?;
        Ok(())
    }

    #[test]
    fn invalid_presence_flag_is_rejected() {
        let blob = Bytes::from_static(&[2]);
        let mut reader = BlobReader::new(&blob);
        assert!(reader.get_opt_u64().is_err());
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let blob = Bytes::from_static(&[1, 2, 3]);
        let mut reader = BlobReader::new(&blob);
        assert!(reader.get_u64().is_err());
    }

    #[test]
    fn oversized_array_length_is_rejected() {
        // Claims u32::MAX entries but carries none.
        let mut writer = BlobWriter::new();
        writer.put_u32(u32::MAX);
        let blob = writer.finish();
        let mut reader = BlobReader::new(&blob);
        assert!(reader.get_u64_array().is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut writer = BlobWriter::new();
        writer.put_u32(1);
        writer.put_u32(2);
        let blob = writer.finish();
        let mut reader = BlobReader::new(&blob);
        reader.get_u32().unwrap();
        assert!(reader.expect_end().is_err());
    }
}
