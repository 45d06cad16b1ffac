// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Little-endian wire codec and the [`BusData`] trait for typed topics.
//!
//! A deliberately small CDR-flavoured format: fixed-width integers in
//! little-endian order, strings as a `u32` byte length followed by UTF-8
//! bytes, GUIDs as 16 raw bytes. Decoding is strict - truncation, invalid
//! UTF-8 and over-capacity strings produce errors, never panics.

use crate::bus::guid::Guid;
use crate::{Error, Result};

/// Wire encoder appending to an owned buffer.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed UTF-8 string, unbounded.
    pub fn put_str(&mut self, s: &str) {
        self.put_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Length-prefixed UTF-8 string with a capacity bound.
    ///
    /// Rejects (rather than truncates) values over `max` bytes so the
    /// decoder side never sees a mangled field.
    pub fn put_str_bounded(&mut self, field: &'static str, s: &str, max: usize) -> Result<()> {
        if s.len() > max {
            return Err(Error::FieldTooLong {
                field,
                len: s.len(),
                max,
            });
        }
        self.put_str(s);
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_guid(&mut self, guid: &Guid) {
        self.buf.extend_from_slice(&guid.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire decoder over a borrowed buffer.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(Error::Decode(format!(
                "truncated frame: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn get_str(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Decode("invalid UTF-8 in string field".into()))
    }

    /// Length-prefixed string with a capacity bound; over-capacity input is
    /// a decode error (mirrors the encoder's reject policy).
    pub fn get_str_bounded(&mut self, field: &'static str, max: usize) -> Result<String> {
        let s = self.get_str()?;
        if s.len() > max {
            return Err(Error::Decode(format!(
                "field '{}' over capacity: {} bytes (max {})",
                field,
                s.len(),
                max
            )));
        }
        Ok(s)
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn get_guid(&mut self) -> Result<Guid> {
        let b = self.take(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(b);
        Ok(Guid::from_bytes(raw))
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Types that can travel over a bus topic.
///
/// The type name participates in endpoint matching: a writer and a reader
/// only match when both topic name and type name agree.
pub trait BusData: Sized + Send + 'static {
    /// Stable type name announced during discovery.
    fn type_name() -> &'static str;

    /// Append the wire representation to `enc`.
    fn encode(&self, enc: &mut Encoder) -> Result<()>;

    /// Parse one value from `dec`.
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;
}
