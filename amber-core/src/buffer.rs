// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Byte buffer primitives.
//!
//! Fixed-width values are little-endian. Variable-length integers are LEB128
//! for unsigned values and zig-zag + LEB128 for signed values. Strings and
//! byte arrays are length-prefixed with a zig-zag varint; length -1 denotes
//! null. Every `Reader` access is bounds-checked and reports
//! `StreamTruncated` instead of panicking; malformed varints report
//! `StreamCorrupted`.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::Error;

#[derive(Default)]
pub struct Writer {
    bf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dump(&self) -> Vec<u8> {
        self.bf.clone()
    }

    /// Moves the staged bytes out, leaving the buffer empty but with its
    /// capacity intact.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bf)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bf
    }

    pub fn len(&self) -> usize {
        self.bf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bf.is_empty()
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.bf.extend_from_slice(v);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bf.write_u8(value).unwrap();
    }

    pub fn write_i8(&mut self, value: i8) {
        self.bf.write_i8(value).unwrap();
    }

    pub fn write_u16(&mut self, value: u16) {
        self.bf.write_u16::<LittleEndian>(value).unwrap();
    }

    pub fn write_i16(&mut self, value: i16) {
        self.bf.write_i16::<LittleEndian>(value).unwrap();
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bf.write_u32::<LittleEndian>(value).unwrap();
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bf.write_i32::<LittleEndian>(value).unwrap();
    }

    pub fn write_u64(&mut self, value: u64) {
        self.bf.write_u64::<LittleEndian>(value).unwrap();
    }

    pub fn write_i64(&mut self, value: i64) {
        self.bf.write_i64::<LittleEndian>(value).unwrap();
    }

    pub fn write_f32(&mut self, value: f32) {
        self.bf.write_f32::<LittleEndian>(value).unwrap();
    }

    pub fn write_f64(&mut self, value: f64) {
        self.bf.write_f64::<LittleEndian>(value).unwrap();
    }

    pub fn write_varuint32(&mut self, value: u32) {
        self.write_varuint64(value as u64);
    }

    pub fn write_varuint64(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.write_u8((value as u8) | 0x80);
            value >>= 7;
        }
        self.write_u8(value as u8);
    }

    pub fn write_varint32(&mut self, value: i32) {
        let zigzag = ((value as i64) << 1) ^ ((value as i64) >> 31);
        self.write_varuint64(zigzag as u64);
    }

    pub fn write_varint64(&mut self, value: i64) {
        let zigzag = ((value << 1) ^ (value >> 63)) as u64;
        self.write_varuint64(zigzag);
    }

    /// Length-prefixed UTF-8 string; `None` encodes as length -1.
    pub fn write_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                self.write_varint64(s.len() as i64);
                self.write_bytes(s.as_bytes());
            }
            None => self.write_varint64(-1),
        }
    }

    /// Length-prefixed byte array; `None` encodes as length -1.
    pub fn write_opt_bytes(&mut self, value: Option<&[u8]>) {
        match value {
            Some(b) => {
                self.write_varint64(b.len() as i64);
                self.write_bytes(b);
            }
            None => self.write_varint64(-1),
        }
    }
}

pub struct Reader<'bf> {
    bf: &'bf [u8],
    cursor: usize,
}

impl<'bf> Reader<'bf> {
    pub fn new(bf: &'bf [u8]) -> Reader<'bf> {
        Reader { bf, cursor: 0 }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    pub fn remaining(&self) -> usize {
        self.bf.len().saturating_sub(self.cursor)
    }

    #[inline]
    fn need(&self, n: usize) -> Result<(), Error> {
        if self.cursor + n > self.bf.len() {
            return Err(Error::stream_truncated(format!(
                "needed {} bytes at offset {}, stream holds {}",
                n,
                self.cursor,
                self.bf.len()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.need(1)?;
        let result = self.bf[self.cursor];
        self.cursor += 1;
        Ok(result)
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        self.need(2)?;
        let result = LittleEndian::read_u16(&self.bf[self.cursor..]);
        self.cursor += 2;
        Ok(result)
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.need(4)?;
        let result = LittleEndian::read_u32(&self.bf[self.cursor..]);
        self.cursor += 4;
        Ok(result)
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        self.need(8)?;
        let result = LittleEndian::read_u64(&self.bf[self.cursor..]);
        self.cursor += 8;
        Ok(result)
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.need(4)?;
        let result = LittleEndian::read_f32(&self.bf[self.cursor..]);
        self.cursor += 4;
        Ok(result)
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.need(8)?;
        let result = LittleEndian::read_f64(&self.bf[self.cursor..]);
        self.cursor += 8;
        Ok(result)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'bf [u8], Error> {
        self.need(len)?;
        let result = &self.bf[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(result)
    }

    pub fn read_varuint64(&mut self) -> Result<u64, Error> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.read_u8()?;
            if shift == 63 && b > 1 {
                return Err(Error::stream_corrupted(
                    "variable-length integer overflows 64 bits",
                ));
            }
            result |= ((b & 0x7F) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::stream_corrupted(
                    "variable-length integer overflows 64 bits",
                ));
            }
        }
    }

    pub fn read_varuint32(&mut self) -> Result<u32, Error> {
        let v = self.read_varuint64()?;
        u32::try_from(v)
            .map_err(|_| Error::stream_corrupted("variable-length integer overflows 32 bits"))
    }

    pub fn read_varint64(&mut self) -> Result<i64, Error> {
        let encoded = self.read_varuint64()?;
        Ok(((encoded >> 1) as i64) ^ -((encoded & 1) as i64))
    }

    pub fn read_varint32(&mut self) -> Result<i32, Error> {
        let v = self.read_varint64()?;
        i32::try_from(v)
            .map_err(|_| Error::stream_corrupted("variable-length integer overflows 32 bits"))
    }

    /// Reads a zig-zag length prefix. `None` means the encoded value was the
    /// null marker (-1); lengths below -1 or beyond the remaining bytes are
    /// corruption.
    pub fn read_len(&mut self) -> Result<Option<usize>, Error> {
        let len = self.read_varint64()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(Error::stream_corrupted(format!(
                "negative length prefix {}",
                len
            )));
        }
        let len = len as u64;
        if len > self.remaining() as u64 {
            return Err(Error::stream_truncated(format!(
                "length prefix {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        Ok(Some(len as usize))
    }

    pub fn read_opt_str(&mut self) -> Result<Option<String>, Error> {
        let Some(len) = self.read_len()? else {
            return Ok(None);
        };
        let bytes = self.read_bytes(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Error::stream_corrupted("string payload is not valid UTF-8"))?;
        Ok(Some(s.to_owned()))
    }

    pub fn read_opt_bytes(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let Some(len) = self.read_len()? else {
            return Ok(None);
        };
        Ok(Some(self.read_bytes(len)?.to_vec()))
    }
}
