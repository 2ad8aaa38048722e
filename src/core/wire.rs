//! # Wire Primitives
//!
//! Big-endian primitive encoding shared by every message body.
//!
//! ```text
//! boolean     [u8 0|1]
//! byte        [i8]
//! int         [i32 BE]                     universal length prefix
//! string      [int len] [UTF-8 bytes]       len 0 => ""
//! byte array  [int len] [bytes]             len 0 => absent
//! uuid        [16 bytes, GUID byte layout]
//! int set     [int count] [int]*count       count 0 => absent
//! ```
//!
//! [`WireReader`] parses from a borrowed buffer that may hold only part of a
//! frame. Running out of bytes yields [`ProtocolError::Truncated`], which the
//! frame decoder treats as "wait for more input" until the stream ends.

use std::collections::BTreeSet;

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Default ceiling for any single length prefix (16 MB).
pub const DEFAULT_MAX_FIELD_LENGTH: usize = 16 * 1024 * 1024;

/// Cursor over a possibly incomplete frame.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    max_field_length: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_field_length(buf, DEFAULT_MAX_FIELD_LENGTH)
    }

    pub fn with_max_field_length(buf: &'a [u8], max_field_length: usize) -> Self {
        Self {
            buf,
            pos: 0,
            max_field_length,
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated(self.buf.len()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a length or count prefix, rejecting negative and oversized values.
    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_int()?;
        if len < 0 {
            return Err(ProtocolError::InvalidLength(len));
        }
        let len = len as usize;
        if len > self.max_field_length {
            return Err(ProtocolError::OversizedField(len));
        }
        Ok(len)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_byte(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let raw = self.take(4)?;
        Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn read_byte_array(&mut self) -> Result<Option<Bytes>> {
        let len = self.read_len()?;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(self.take(len)?)))
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let raw = self.take(16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(raw);
        Ok(Uuid::from_bytes_le(bytes))
    }

    /// Duplicate entries collapse into one.
    pub fn read_int_set(&mut self) -> Result<Option<BTreeSet<i32>>> {
        let count = self.read_len()?;
        if count == 0 {
            return Ok(None);
        }
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(self.read_int()?);
        }
        Ok(Some(set))
    }

    /// Read a count prefix for a list of composite records; 0 means absent.
    pub fn read_count(&mut self) -> Result<usize> {
        self.read_len()
    }
}

/// Appends primitives to an outbound buffer.
#[derive(Debug)]
pub struct WireWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    fn put_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| ProtocolError::OversizedField(len))?;
        self.put_int(len);
        Ok(())
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn put_byte(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn put_int(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_string(&mut self, value: &str) -> Result<()> {
        self.put_len(value.len())?;
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// `None` and an empty slice both encode as length 0.
    pub fn put_byte_array(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            Some(bytes) => {
                self.put_len(bytes.len())?;
                self.buf.put_slice(bytes);
            }
            None => self.put_int(0),
        }
        Ok(())
    }

    pub fn put_uuid(&mut self, value: &Uuid) {
        self.buf.put_slice(&value.to_bytes_le());
    }

    pub fn put_int_set(&mut self, value: Option<&BTreeSet<i32>>) -> Result<()> {
        match value {
            Some(set) => {
                self.put_len(set.len())?;
                for item in set {
                    self.put_int(*item);
                }
            }
            None => self.put_int(0),
        }
        Ok(())
    }

    pub fn put_count(&mut self, count: usize) -> Result<()> {
        self.put_len(count)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn int_is_big_endian() {
        let mut buf = BytesMut::new();
        WireWriter::new(&mut buf).put_int(0x0102_0304);
        assert_eq!(&buf[..], &[1, 2, 3, 4]);
        assert_eq!(WireReader::new(&buf).read_int().unwrap(), 0x0102_0304);
    }

    #[test]
    fn string_prefix_counts_utf8_bytes() {
        let mut buf = BytesMut::new();
        WireWriter::new(&mut buf).put_string("héllo").unwrap();
        assert_eq!(&buf[..4], &6i32.to_be_bytes());
        assert_eq!(WireReader::new(&buf).read_string().unwrap(), "héllo");
    }

    #[test]
    fn empty_string_reads_back_empty() {
        let mut buf = BytesMut::new();
        WireWriter::new(&mut buf).put_string("").unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
        assert_eq!(WireReader::new(&buf).read_string().unwrap(), "");
    }

    #[test]
    fn empty_byte_array_reads_back_absent() {
        let mut buf = BytesMut::new();
        WireWriter::new(&mut buf).put_byte_array(Some(&[])).unwrap();
        assert_eq!(WireReader::new(&buf).read_byte_array().unwrap(), None);
    }

    #[test]
    fn uuid_uses_guid_byte_layout() {
        let id = Uuid::parse_str("12345678-1234-5678-1234-567812345678").unwrap();
        let mut buf = BytesMut::new();
        WireWriter::new(&mut buf).put_uuid(&id);
        // First group is little-endian in the GUID layout.
        assert_eq!(&buf[..4], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(WireReader::new(&buf).read_uuid().unwrap(), id);
    }

    #[test]
    fn duplicate_set_entries_collapse() {
        let mut buf = BytesMut::new();
        let mut writer = WireWriter::new(&mut buf);
        writer.put_int(3);
        writer.put_int(7);
        writer.put_int(7);
        writer.put_int(1);
        let set = WireReader::new(&buf).read_int_set().unwrap().unwrap();
        assert_eq!(set, BTreeSet::from([1, 7]));
    }

    #[test]
    fn short_buffer_is_truncated() {
        let buf = [0u8, 0, 0, 5, b'a', b'b'];
        let err = WireReader::new(&buf).read_string().unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated(6)));
    }

    #[test]
    fn negative_length_is_rejected() {
        let buf = (-2i32).to_be_bytes();
        let err = WireReader::new(&buf).read_byte_array().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength(-2)));
    }

    #[test]
    fn oversized_length_is_rejected_before_payload_arrives() {
        let buf = 1024i32.to_be_bytes();
        let err = WireReader::with_max_field_length(&buf, 16)
            .read_string()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedField(1024)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let buf = [0u8, 0, 0, 2, 0xC3, 0x28];
        let err = WireReader::new(&buf).read_string().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8));
    }
}
