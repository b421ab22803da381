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

//! Type layouts: the structural descriptor of a record type and its wire
//! form, written once per distinct type per stream.
//!
//! Wire payload: `<name utf8> <module-tag 16B> <fingerprint u64>
//! <base-count varint> <base entries...> <field-count varint>
//! <field entries...>`. A base entry is `<name utf8> <module-tag 16B>`; a
//! field entry is `<name utf8> <declared-by varint> <kind bytes>` where
//! `declared-by` indexes the `[self, bases...]` chain. Field entries are
//! ordered ascending by name regardless of declaration order, so the layout
//! is insensitive to source reordering.

use crate::buffer::{Reader, Writer};
use crate::config::Tolerance;
use crate::error::Error;
use crate::meta::{base_name, murmurhash3_x64_128};
use crate::types::FieldKind;

const FINGERPRINT_SEED: u64 = 47;

/// Shallow reference to a base type in a layout's inheritance chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseRef {
    pub name: String,
    pub module_tag: [u8; 16],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub kind: FieldKind,
    /// Index into the `[self, bases...]` chain of the declaring type.
    pub declared_by: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeLayout {
    name: String,
    module_tag: [u8; 16],
    family: Option<String>,
    bases: Vec<BaseRef>,
    fields: Vec<FieldLayout>,
}

impl TypeLayout {
    pub fn builder(name: &str) -> TypeLayoutBuilder {
        TypeLayoutBuilder {
            name: name.to_owned(),
            module_tag: [0u8; 16],
            family: None,
            bases: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_tag(&self) -> &[u8; 16] {
        &self.module_tag
    }

    /// Open-generic template name, if this layout is an instance of one.
    /// Not part of the wire form; it only drives surrogate template matching.
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn bases(&self) -> &[BaseRef] {
        &self.bases
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
    }

    /// Name of the declaring type for a `declared_by` index (0 = self).
    pub fn declarer_name(&self, declared_by: u32) -> &str {
        if declared_by == 0 {
            &self.name
        } else {
            &self.bases[declared_by as usize - 1].name
        }
    }

    /// Structural fingerprint over the (name-sorted) field list.
    pub fn fingerprint(&self) -> u64 {
        let mut canon = Writer::new();
        for field in &self.fields {
            canon.write_opt_str(Some(&field.name));
            canon.write_varuint32(field.declared_by);
            field.kind.write_to(&mut canon);
        }
        murmurhash3_x64_128(canon.as_slice(), FINGERPRINT_SEED).0
    }

    pub fn to_bytes(&self, writer: &mut Writer) {
        writer.write_opt_str(Some(&self.name));
        writer.write_bytes(&self.module_tag);
        writer.write_u64(self.fingerprint());
        writer.write_varuint32(self.bases.len() as u32);
        for base in &self.bases {
            writer.write_opt_str(Some(&base.name));
            writer.write_bytes(&base.module_tag);
        }
        writer.write_varuint32(self.fields.len() as u32);
        for field in &self.fields {
            writer.write_opt_str(Some(&field.name));
            writer.write_varuint32(field.declared_by);
            field.kind.write_to(writer);
        }
    }

    /// Decodes a wire payload. Returns the layout together with the
    /// fingerprint recorded by the writing side.
    pub fn from_bytes(reader: &mut Reader) -> Result<(TypeLayout, u64), Error> {
        let name = reader
            .read_opt_str()?
            .ok_or_else(|| Error::stream_corrupted("type layout carries a null name"))?;
        let module_tag: [u8; 16] = reader.read_bytes(16)?.try_into().unwrap();
        let fingerprint = reader.read_u64()?;
        let base_count = reader.read_varuint32()? as usize;
        if base_count > reader.remaining() {
            return Err(Error::stream_corrupted(format!(
                "base type count {} exceeds the stream",
                base_count
            )));
        }
        let mut bases = Vec::with_capacity(base_count);
        for _ in 0..base_count {
            let base_name = reader
                .read_opt_str()?
                .ok_or_else(|| Error::stream_corrupted("base type carries a null name"))?;
            let tag: [u8; 16] = reader.read_bytes(16)?.try_into().unwrap();
            bases.push(BaseRef {
                name: base_name,
                module_tag: tag,
            });
        }
        let field_count = reader.read_varuint32()? as usize;
        if field_count > reader.remaining() {
            return Err(Error::stream_corrupted(format!(
                "field count {} exceeds the stream",
                field_count
            )));
        }
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let field_name = reader
                .read_opt_str()?
                .ok_or_else(|| Error::stream_corrupted("field entry carries a null name"))?;
            let declared_by = reader.read_varuint32()?;
            if declared_by as usize > base_count {
                return Err(Error::stream_corrupted(format!(
                    "field {} declared by type index {} beyond the base chain",
                    field_name, declared_by
                )));
            }
            let kind = FieldKind::read_from(reader)?;
            fields.push(FieldLayout {
                name: field_name,
                kind,
                declared_by,
            });
        }
        Ok((
            TypeLayout {
                name,
                module_tag,
                family: None,
                bases,
                fields,
            },
            fingerprint,
        ))
    }
}

pub struct TypeLayoutBuilder {
    name: String,
    module_tag: [u8; 16],
    family: Option<String>,
    bases: Vec<BaseRef>,
    fields: Vec<FieldLayout>,
}

impl TypeLayoutBuilder {
    pub fn module_tag(mut self, tag: [u8; 16]) -> Self {
        self.module_tag = tag;
        self
    }

    pub fn family(mut self, family: &str) -> Self {
        self.family = Some(family.to_owned());
        self
    }

    /// Declares a base type; bases are ordered most-derived first.
    pub fn base(mut self, name: &str, module_tag: [u8; 16]) -> Self {
        self.bases.push(BaseRef {
            name: name.to_owned(),
            module_tag,
        });
        self
    }

    pub fn field(self, name: &str, kind: FieldKind) -> Self {
        self.declared_field(name, kind, 0)
    }

    /// A field declared by base number `declared_by` (1-based into the base
    /// list declared so far).
    pub fn declared_field(mut self, name: &str, kind: FieldKind, declared_by: u32) -> Self {
        debug_assert!(declared_by as usize <= self.bases.len());
        debug_assert!(self.fields.iter().all(|f| f.name != name));
        self.fields.push(FieldLayout {
            name: name.to_owned(),
            kind,
            declared_by,
        });
        self
    }

    pub fn build(mut self) -> TypeLayout {
        self.fields.sort_by(|a, b| a.name.cmp(&b.name));
        TypeLayout {
            name: self.name,
            module_tag: self.module_tag,
            family: self.family,
            bases: self.bases,
            fields: self.fields,
        }
    }
}

/// One stream-side field with its decode plan.
#[derive(Clone, Debug)]
pub struct PlannedField {
    pub name: String,
    pub stream_kind: FieldKind,
    /// Local field to receive the value, or `None` to decode and discard.
    pub target: Option<(String, FieldKind)>,
}

/// Decode plan produced by reconciling a stream layout with a local one.
#[derive(Clone, Debug, Default)]
pub struct FieldMap {
    pub planned: Vec<PlannedField>,
    /// Local fields absent from the stream; they stay at shell defaults.
    pub defaulted: Vec<String>,
}

fn declarer_matches(
    stream: &TypeLayout,
    stream_idx: u32,
    local: &TypeLayout,
    local_idx: u32,
    tolerance: Tolerance,
) -> bool {
    if stream_idx == 0 || local_idx == 0 {
        // The declaring type itself always corresponds across versions even
        // when renamed; a self/base mismatch is a move.
        return stream_idx == local_idx;
    }
    let a = stream.declarer_name(stream_idx);
    let b = local.declarer_name(local_idx);
    if a == b {
        return true;
    }
    tolerance.allows(Tolerance::MODULE_VERSION_CHANGE) && base_name(a) == base_name(b)
}

/// Builds the field map for reading `stream`-shaped data into `local`.
pub fn reconcile(
    stream: &TypeLayout,
    local: &TypeLayout,
    tolerance: Tolerance,
) -> Result<FieldMap, Error> {
    if stream.module_tag != local.module_tag && !tolerance.allows(Tolerance::MODULE_TAG_CHANGE) {
        return Err(Error::type_structure_changed(format!(
            "module tag of type {} changed",
            local.name
        )));
    }
    let mut planned = Vec::with_capacity(stream.fields.len());
    let mut matched = vec![false; local.fields.len()];
    for sf in &stream.fields {
        match local.field_index(&sf.name) {
            Some(li) => {
                let lf = &local.fields[li];
                if !declarer_matches(stream, sf.declared_by, local, lf.declared_by, tolerance)
                    && !tolerance.allows(Tolerance::FIELD_MOVE)
                {
                    return Err(Error::type_structure_changed(format!(
                        "field {} of type {} moved from {} to {}",
                        sf.name,
                        local.name,
                        stream.declarer_name(sf.declared_by),
                        local.declarer_name(lf.declared_by)
                    )));
                }
                if !lf.kind.accepts(&sf.kind) {
                    return Err(Error::type_structure_changed(format!(
                        "field {} of type {} was retyped incompatibly",
                        sf.name, local.name
                    )));
                }
                matched[li] = true;
                planned.push(PlannedField {
                    name: sf.name.clone(),
                    stream_kind: sf.kind.clone(),
                    target: Some((lf.name.clone(), lf.kind.clone())),
                });
            }
            None => {
                if !tolerance.allows(Tolerance::FIELD_REMOVAL) {
                    return Err(Error::type_structure_changed(format!(
                        "stream field {} has no counterpart in type {}",
                        sf.name, local.name
                    )));
                }
                planned.push(PlannedField {
                    name: sf.name.clone(),
                    stream_kind: sf.kind.clone(),
                    target: None,
                });
            }
        }
    }
    let mut defaulted = Vec::new();
    for (li, lf) in local.fields.iter().enumerate() {
        if !matched[li] {
            if !tolerance.allows(Tolerance::FIELD_ADDITION) {
                return Err(Error::type_structure_changed(format!(
                    "local field {} of type {} is absent from the stream",
                    lf.name, local.name
                )));
            }
            defaulted.push(lf.name.clone());
        }
    }
    Ok(FieldMap { planned, defaulted })
}
