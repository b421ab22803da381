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

//! Collection classification and framing.
//!
//! Containers are structural values, never stamped objects. A container is
//! framed as a zig-zag length (-1 for null) followed by its element kind
//! tags and the elements themselves; mappings iterate in runtime container
//! order. Sealed element kinds need no per-element type information;
//! reference elements are self-describing through their reference tokens.

use crate::buffer::{Reader, Writer};
use crate::error::Error;
use crate::types::FieldKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionKind {
    /// Length + ordered elements.
    Sequence,
    /// Length + ordered key/value pairs.
    Mapping,
    /// Length + ordered elements, uniqueness owned by the runtime container.
    Set,
}

pub fn classify(kind: &FieldKind) -> Option<CollectionKind> {
    match kind {
        FieldKind::Sequence(_) => Some(CollectionKind::Sequence),
        FieldKind::Mapping(_, _) => Some(CollectionKind::Mapping),
        FieldKind::Set(_) => Some(CollectionKind::Set),
        _ => None,
    }
}

/// Element kind of a sequence or set.
pub fn element_kind(kind: &FieldKind) -> Option<&FieldKind> {
    match kind {
        FieldKind::Sequence(elem) | FieldKind::Set(elem) => Some(elem),
        _ => None,
    }
}

/// Key and value kinds of a mapping.
pub fn entry_kinds(kind: &FieldKind) -> Option<(&FieldKind, &FieldKind)> {
    match kind {
        FieldKind::Mapping(key, value) => Some((key, value)),
        _ => None,
    }
}

/// A sealed element kind fully determines its encoding, so element framing
/// carries no per-element type tags.
pub fn is_sealed(kind: &FieldKind) -> bool {
    match kind {
        FieldKind::Object | FieldKind::Delegate => false,
        FieldKind::Sequence(elem) | FieldKind::Set(elem) => is_sealed(elem),
        FieldKind::Mapping(key, value) => is_sealed(key) && is_sealed(value),
        _ => true,
    }
}

/// Writes the preamble of a non-null container: length and element kinds.
pub fn write_preamble(writer: &mut Writer, len: usize, kind: &FieldKind) {
    writer.write_varint64(len as i64);
    match kind {
        FieldKind::Sequence(elem) | FieldKind::Set(elem) => elem.write_to(writer),
        FieldKind::Mapping(key, value) => {
            key.write_to(writer);
            value.write_to(writer);
        }
        _ => {}
    }
}

/// Reads a container preamble. `None` means the container slot was null;
/// otherwise returns the length and the stream-side element kinds (one for
/// sequences and sets, two for mappings).
pub fn read_preamble(
    reader: &mut Reader,
    kind: CollectionKind,
) -> Result<Option<(usize, FieldKind, Option<FieldKind>)>, Error> {
    let Some(len) = reader.read_len()? else {
        return Ok(None);
    };
    let first = FieldKind::read_from(reader)?;
    let second = match kind {
        CollectionKind::Mapping => Some(FieldKind::read_from(reader)?),
        _ => None,
    };
    Ok(Some((len, first, second)))
}
