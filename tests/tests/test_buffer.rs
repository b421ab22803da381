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

use amber_core::buffer::{Reader, Writer};
use amber_core::error::Error;

#[test]
fn fixed_width_roundtrip() {
    let mut writer = Writer::new();
    writer.write_u8(0xA5);
    writer.write_i8(-7);
    writer.write_u16(0xBEEF);
    writer.write_i32(-123_456);
    writer.write_u64(u64::MAX - 3);
    writer.write_f32(1.5);
    writer.write_f64(-2.25);

    let bytes = writer.dump();
    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_u8().unwrap(), 0xA5);
    assert_eq!(reader.read_i8().unwrap(), -7);
    assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
    assert_eq!(reader.read_i32().unwrap(), -123_456);
    assert_eq!(reader.read_u64().unwrap(), u64::MAX - 3);
    assert_eq!(reader.read_f32().unwrap(), 1.5);
    assert_eq!(reader.read_f64().unwrap(), -2.25);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn varint_roundtrip() {
    let unsigned: [u64; 8] = [0, 1, 127, 128, 0x3FFF, 0x4000, u32::MAX as u64, u64::MAX];
    let signed: [i64; 8] = [0, -1, 1, -64, 64, i32::MIN as i64, i64::MAX, i64::MIN];

    let mut writer = Writer::new();
    for v in unsigned {
        writer.write_varuint64(v);
    }
    for v in signed {
        writer.write_varint64(v);
    }
    let bytes = writer.dump();
    let mut reader = Reader::new(&bytes);
    for v in unsigned {
        assert_eq!(reader.read_varuint64().unwrap(), v);
    }
    for v in signed {
        assert_eq!(reader.read_varint64().unwrap(), v);
    }
}

#[test]
fn small_varints_are_compact() {
    let mut writer = Writer::new();
    writer.write_varuint32(5);
    assert_eq!(writer.len(), 1);
    writer.write_varuint32(300);
    assert_eq!(writer.len(), 3);
}

#[test]
fn truncated_read_reports_stream_truncated() {
    let bytes = [1u8, 2];
    let mut reader = Reader::new(&bytes);
    assert!(matches!(reader.read_u32(), Err(Error::StreamTruncated(_))));

    let mut reader = Reader::new(&[]);
    assert!(matches!(reader.read_u8(), Err(Error::StreamTruncated(_))));
}

#[test]
fn varint_overflow_reports_stream_corrupted() {
    // Eleven continuation bytes cannot fit in 64 bits.
    let bytes = [0xFFu8; 11];
    let mut reader = Reader::new(&bytes);
    assert!(matches!(
        reader.read_varuint64(),
        Err(Error::StreamCorrupted(_))
    ));
}

#[test]
fn string_roundtrip_preserves_null() {
    let mut writer = Writer::new();
    writer.write_opt_str(Some("grün"));
    writer.write_opt_str(None);
    writer.write_opt_str(Some(""));

    let bytes = writer.dump();
    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_opt_str().unwrap().as_deref(), Some("grün"));
    assert_eq!(reader.read_opt_str().unwrap(), None);
    assert_eq!(reader.read_opt_str().unwrap().as_deref(), Some(""));
}

#[test]
fn negative_length_prefix_is_corruption() {
    let mut writer = Writer::new();
    writer.write_varint64(-2);
    let bytes = writer.dump();
    let mut reader = Reader::new(&bytes);
    assert!(matches!(reader.read_len(), Err(Error::StreamCorrupted(_))));
}

#[test]
fn oversized_length_prefix_is_truncation() {
    let mut writer = Writer::new();
    writer.write_varint64(1_000_000);
    let bytes = writer.dump();
    let mut reader = Reader::new(&bytes);
    assert!(matches!(reader.read_len(), Err(Error::StreamTruncated(_))));
}
