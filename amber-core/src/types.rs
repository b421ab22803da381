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

//! Core wire-level type definitions: field kinds and their tags, the time
//! kind byte, the 128-bit decimal layout and tick-count time conversion.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::buffer::{Reader, Writer};
use crate::error::Error;

/// Type-id 0 denotes a null reference in any type-stamped slot.
pub const NULL_TYPE_ID: u32 = 0;

/// The first stream type-id handed out to a record type.
pub const FIRST_TYPE_ID: u32 = 1;

/// Nesting limit for recursive kind encodings read off the wire.
const MAX_KIND_DEPTH: u32 = 16;

/// One-byte wire tags for field kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum KindTag {
    Bool = 1,
    I8 = 2,
    I16 = 3,
    I32 = 4,
    I64 = 5,
    U8 = 6,
    U16 = 7,
    U32 = 8,
    U64 = 9,
    F32 = 10,
    F64 = 11,
    Str = 12,
    Bytes = 13,
    Time = 14,
    Decimal = 15,
    Object = 16,
    Sequence = 17,
    Mapping = 18,
    Set = 19,
    Delegate = 20,
}

/// Statically declared kind of a field slot.
///
/// Collection kinds carry their element kinds so element framing can be
/// re-synthesised without a separate stamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bytes,
    Time,
    Decimal,
    Object,
    Sequence(Box<FieldKind>),
    Mapping(Box<FieldKind>, Box<FieldKind>),
    Set(Box<FieldKind>),
    Delegate,
}

impl FieldKind {
    pub fn tag(&self) -> KindTag {
        match self {
            FieldKind::Bool => KindTag::Bool,
            FieldKind::I8 => KindTag::I8,
            FieldKind::I16 => KindTag::I16,
            FieldKind::I32 => KindTag::I32,
            FieldKind::I64 => KindTag::I64,
            FieldKind::U8 => KindTag::U8,
            FieldKind::U16 => KindTag::U16,
            FieldKind::U32 => KindTag::U32,
            FieldKind::U64 => KindTag::U64,
            FieldKind::F32 => KindTag::F32,
            FieldKind::F64 => KindTag::F64,
            FieldKind::Str => KindTag::Str,
            FieldKind::Bytes => KindTag::Bytes,
            FieldKind::Time => KindTag::Time,
            FieldKind::Decimal => KindTag::Decimal,
            FieldKind::Object => KindTag::Object,
            FieldKind::Sequence(_) => KindTag::Sequence,
            FieldKind::Mapping(_, _) => KindTag::Mapping,
            FieldKind::Set(_) => KindTag::Set,
            FieldKind::Delegate => KindTag::Delegate,
        }
    }

    /// Value-typed per the codec: encoded inline, never assigned an object id
    /// and never stamped.
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            FieldKind::Object
                | FieldKind::Sequence(_)
                | FieldKind::Mapping(_, _)
                | FieldKind::Set(_)
                | FieldKind::Delegate
        )
    }

    /// Recursive wire encoding: one tag byte per level, element kinds nested
    /// for sequence/set (one) and mapping (two).
    pub fn write_to(&self, writer: &mut Writer) {
        writer.write_u8(self.tag().into());
        match self {
            FieldKind::Sequence(elem) | FieldKind::Set(elem) => elem.write_to(writer),
            FieldKind::Mapping(key, value) => {
                key.write_to(writer);
                value.write_to(writer);
            }
            _ => {}
        }
    }

    pub fn read_from(reader: &mut Reader) -> Result<FieldKind, Error> {
        Self::read_at_depth(reader, 0)
    }

    fn read_at_depth(reader: &mut Reader, depth: u32) -> Result<FieldKind, Error> {
        if depth > MAX_KIND_DEPTH {
            return Err(Error::stream_corrupted("field kind nesting too deep"));
        }
        let raw = reader.read_u8()?;
        let tag = KindTag::try_from(raw)
            .map_err(|_| Error::stream_corrupted(format!("unknown field kind tag {}", raw)))?;
        Ok(match tag {
            KindTag::Bool => FieldKind::Bool,
            KindTag::I8 => FieldKind::I8,
            KindTag::I16 => FieldKind::I16,
            KindTag::I32 => FieldKind::I32,
            KindTag::I64 => FieldKind::I64,
            KindTag::U8 => FieldKind::U8,
            KindTag::U16 => FieldKind::U16,
            KindTag::U32 => FieldKind::U32,
            KindTag::U64 => FieldKind::U64,
            KindTag::F32 => FieldKind::F32,
            KindTag::F64 => FieldKind::F64,
            KindTag::Str => FieldKind::Str,
            KindTag::Bytes => FieldKind::Bytes,
            KindTag::Time => FieldKind::Time,
            KindTag::Decimal => FieldKind::Decimal,
            KindTag::Object => FieldKind::Object,
            KindTag::Sequence => {
                FieldKind::Sequence(Box::new(Self::read_at_depth(reader, depth + 1)?))
            }
            KindTag::Mapping => FieldKind::Mapping(
                Box::new(Self::read_at_depth(reader, depth + 1)?),
                Box::new(Self::read_at_depth(reader, depth + 1)?),
            ),
            KindTag::Set => FieldKind::Set(Box::new(Self::read_at_depth(reader, depth + 1)?)),
            KindTag::Delegate => FieldKind::Delegate,
        })
    }

    /// Whether a value of `stream` kind may be read into a slot of `self`
    /// kind: identical kinds, or integer widening of the same signedness.
    pub fn accepts(&self, stream: &FieldKind) -> bool {
        if self == stream {
            return true;
        }
        match (signed_rank(stream), signed_rank(self)) {
            (Some(from), Some(to)) => from <= to,
            _ => match (unsigned_rank(stream), unsigned_rank(self)) {
                (Some(from), Some(to)) => from <= to,
                _ => match (self, stream) {
                    (FieldKind::Sequence(a), FieldKind::Sequence(b))
                    | (FieldKind::Set(a), FieldKind::Set(b)) => a.accepts(b),
                    (FieldKind::Mapping(ka, va), FieldKind::Mapping(kb, vb)) => {
                        ka.accepts(kb) && va.accepts(vb)
                    }
                    _ => false,
                },
            },
        }
    }
}

fn signed_rank(kind: &FieldKind) -> Option<u8> {
    match kind {
        FieldKind::I8 => Some(0),
        FieldKind::I16 => Some(1),
        FieldKind::I32 => Some(2),
        FieldKind::I64 => Some(3),
        _ => None,
    }
}

fn unsigned_rank(kind: &FieldKind) -> Option<u8> {
    match kind {
        FieldKind::U8 => Some(0),
        FieldKind::U16 => Some(1),
        FieldKind::U32 => Some(2),
        FieldKind::U64 => Some(3),
        _ => None,
    }
}

/// Kind byte accompanying a tick-count timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TimeKind {
    #[default]
    Unspecified = 0,
    Utc = 1,
    Local = 2,
}

/// 100-nanosecond units per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

fn tick_epoch() -> NaiveDateTime {
    // 0001-01-01T00:00:00 is always representable.
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Converts a timestamp to 100 ns ticks since 0001-01-01.
pub fn datetime_to_ticks(dt: &NaiveDateTime) -> Result<i64, Error> {
    let delta = dt.signed_duration_since(tick_epoch());
    let secs = delta.num_seconds();
    let subsec_nanos = (delta - Duration::seconds(secs)).num_nanoseconds().unwrap_or(0);
    secs.checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(subsec_nanos / 100))
        .ok_or_else(|| Error::argument_out_of_range("timestamp outside the tick range"))
}

pub fn datetime_from_ticks(ticks: i64) -> Result<NaiveDateTime, Error> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let sub_ticks = ticks.rem_euclid(TICKS_PER_SECOND);
    tick_epoch()
        .checked_add_signed(Duration::seconds(secs))
        .and_then(|dt| dt.checked_add_signed(Duration::nanoseconds(sub_ticks * 100)))
        .ok_or_else(|| Error::stream_corrupted(format!("tick count {} outside the supported range", ticks)))
}

const DECIMAL_MAX_SCALE: u8 = 28;
const DECIMAL_MAGNITUDE_BITS: u32 = 96;

/// Scaled decimal in the canonical 128-bit layout: three 32-bit magnitude
/// limbs (96-bit unsigned mantissa) and a flags word carrying the scale in
/// bits 16..24 and the sign in bit 31.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Decimal {
    magnitude: u128,
    scale: u8,
    negative: bool,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: u8) -> Result<Self, Error> {
        if scale > DECIMAL_MAX_SCALE {
            return Err(Error::argument_out_of_range(format!(
                "decimal scale {} exceeds {}",
                scale, DECIMAL_MAX_SCALE
            )));
        }
        let negative = unscaled < 0;
        let magnitude = unscaled.unsigned_abs();
        if magnitude >> DECIMAL_MAGNITUDE_BITS != 0 {
            return Err(Error::argument_out_of_range(
                "decimal magnitude exceeds 96 bits",
            ));
        }
        Ok(Decimal {
            magnitude,
            scale,
            // normalise negative zero
            negative: negative && magnitude != 0,
        })
    }

    pub fn unscaled(&self) -> i128 {
        if self.negative {
            -(self.magnitude as i128)
        } else {
            self.magnitude as i128
        }
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn to_bits(&self) -> [u8; 16] {
        let lo = (self.magnitude & 0xFFFF_FFFF) as u32;
        let mid = ((self.magnitude >> 32) & 0xFFFF_FFFF) as u32;
        let hi = ((self.magnitude >> 64) & 0xFFFF_FFFF) as u32;
        let mut flags = (self.scale as u32) << 16;
        if self.negative {
            flags |= 1 << 31;
        }
        let mut bits = [0u8; 16];
        bits[0..4].copy_from_slice(&lo.to_le_bytes());
        bits[4..8].copy_from_slice(&mid.to_le_bytes());
        bits[8..12].copy_from_slice(&hi.to_le_bytes());
        bits[12..16].copy_from_slice(&flags.to_le_bytes());
        bits
    }

    pub fn from_bits(bits: [u8; 16]) -> Result<Self, Error> {
        let lo = u32::from_le_bytes(bits[0..4].try_into().unwrap()) as u128;
        let mid = u32::from_le_bytes(bits[4..8].try_into().unwrap()) as u128;
        let hi = u32::from_le_bytes(bits[8..12].try_into().unwrap()) as u128;
        let flags = u32::from_le_bytes(bits[12..16].try_into().unwrap());
        if flags & 0x7F00_FFFF != 0 {
            return Err(Error::stream_corrupted("decimal flags carry reserved bits"));
        }
        let scale = ((flags >> 16) & 0xFF) as u8;
        if scale > DECIMAL_MAX_SCALE {
            return Err(Error::stream_corrupted(format!(
                "decimal scale {} exceeds {}",
                scale, DECIMAL_MAX_SCALE
            )));
        }
        let magnitude = lo | (mid << 32) | (hi << 64);
        Ok(Decimal {
            magnitude,
            scale,
            negative: flags >> 31 == 1 && magnitude != 0,
        })
    }
}
