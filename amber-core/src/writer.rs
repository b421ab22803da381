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

//! The graph writer state machine.
//!
//! Each root is written as a reference token `<type-id> <ref-id>` followed by
//! the full definitions of every newly discovered object, in id order; the
//! reference table queues objects at first sight and drains in the same
//! order, so an object's definition appears exactly once no matter how many
//! references lead to it. Type layouts are emitted eagerly and inline the
//! first time a type-id is used. With reference preservation disabled, slots
//! are written inline recursively instead and cyclic input is rejected.

use std::collections::HashMap;
use std::io::Write;

use crate::buffer::Writer;
use crate::collection;
use crate::config::Settings;
use crate::error::Error;
use crate::resolver::ref_table::WriteRefTable;
use crate::resolver::registry::SharedRegistry;
use crate::resolver::surrogate::SharedSurrogates;
use crate::session::Hooks;
use crate::types::{datetime_to_ticks, FieldKind, FIRST_TYPE_ID, NULL_TYPE_ID};
use crate::value::{handle_ptr, runtime_key, ObjHandle, Value};

pub struct GraphWriter<W: Write> {
    sink: W,
    buf: Writer,
    settings: Settings,
    registry: SharedRegistry,
    surrogates: SharedSurrogates,
    hooks: Hooks,
    type_ids: HashMap<std::any::TypeId, u32>,
    next_type_id: u32,
    /// Surrogate chosen per original object, so every reference to one
    /// original maps to one surrogate instance and identity survives.
    swapped: HashMap<usize, ObjHandle>,
    refs: WriteRefTable,
    /// Addresses of objects currently being written inline, for cycle
    /// rejection when reference preservation is off.
    in_progress: Vec<usize>,
    committed: u64,
}

impl<W: Write> GraphWriter<W> {
    pub(crate) fn new(
        sink: W,
        settings: Settings,
        registry: SharedRegistry,
        surrogates: SharedSurrogates,
        hooks: Hooks,
    ) -> Self {
        let weak_mode = matches!(
            settings.reference_preservation,
            crate::config::ReferencePreservation::UseWeakReference
        );
        GraphWriter {
            sink,
            buf: Writer::new(),
            settings,
            registry,
            surrogates,
            hooks,
            type_ids: HashMap::new(),
            next_type_id: FIRST_TYPE_ID,
            swapped: HashMap::new(),
            refs: WriteRefTable::new(weak_mode),
            in_progress: Vec::new(),
            committed: 0,
        }
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut Writer {
        &mut self.buf
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Encodes one object graph root. May be called repeatedly; the
    /// reference and type tables persist between calls, so subgraphs shared
    /// with earlier roots are written as references only.
    pub fn write_object(&mut self, root: Option<&ObjHandle>) -> Result<(), Error> {
        if self.settings.preserves_references() {
            self.write_ref_slot(root)?;
            while let Some((_, obj)) = self.refs.take_next_unwritten() {
                self.write_definition(&obj)?;
            }
        } else {
            self.write_inline_slot(root)?;
        }
        if !self.settings.use_buffering {
            self.flush()?;
        }
        Ok(())
    }

    /// Pushes staged bytes to the sink.
    pub fn flush(&mut self) -> Result<(), Error> {
        if !self.buf.is_empty() {
            let bytes = self.buf.take();
            self.committed += bytes.len() as u64;
            self.sink.write_all(&bytes)?;
        }
        self.sink.flush()?;
        Ok(())
    }

    /// Total bytes produced so far, staged or committed.
    pub fn position(&self) -> u64 {
        self.committed + self.buf.len() as u64
    }

    /// Rebinds the sink, preserving reference and type tables. The previous
    /// sink is flushed and handed back.
    pub fn reuse_with_new_stream(&mut self, sink: W) -> Result<W, Error> {
        self.flush()?;
        Ok(std::mem::replace(&mut self.sink, sink))
    }

    fn write_ref_slot(&mut self, target: Option<&ObjHandle>) -> Result<(), Error> {
        let Some(obj) = target else {
            self.buf.write_varuint32(NULL_TYPE_ID);
            return Ok(());
        };
        let obj = self.apply_surrogate(obj)?;
        self.emit_type_id(&obj)?;
        let (id, _fresh) = self.refs.assign_or_fetch(&obj);
        self.buf.write_varuint32(id);
        Ok(())
    }

    fn write_inline_slot(&mut self, target: Option<&ObjHandle>) -> Result<(), Error> {
        let Some(obj) = target else {
            self.buf.write_varuint32(NULL_TYPE_ID);
            return Ok(());
        };
        let obj = self.apply_surrogate(obj)?;
        let ptr = handle_ptr(&obj);
        if self.in_progress.contains(&ptr) {
            return Err(Error::invalid_operation(
                "cyclic graph cannot be written while reference preservation is disabled",
            ));
        }
        self.emit_type_id(&obj)?;
        self.in_progress.push(ptr);
        let result = self.write_body(&obj);
        self.in_progress.pop();
        result
    }

    fn apply_surrogate(&mut self, obj: &ObjHandle) -> Result<ObjHandle, Error> {
        let ptr = handle_ptr(obj);
        if let Some(cached) = self.swapped.get(&ptr) {
            return Ok(cached.clone());
        }
        let key = runtime_key(obj);
        let layout = self
            .registry
            .borrow()
            .lookup_key(key)
            .ok()
            .map(|rt| rt.layout.clone());
        let swap = self.surrogates.borrow().resolve(key, layout.as_deref());
        match swap {
            Some(f) => {
                let swapped = f(obj)?;
                self.swapped.insert(ptr, swapped.clone());
                Ok(swapped)
            }
            None => Ok(obj.clone()),
        }
    }

    /// Writes the type-id of an object, assigning the next id and emitting
    /// the layout payload on first use.
    fn emit_type_id(&mut self, obj: &ObjHandle) -> Result<(), Error> {
        let rt = self.registry.borrow().lookup_handle(obj)?;
        if let Some(&tid) = self.type_ids.get(&rt.key) {
            self.buf.write_varuint32(tid);
            return Ok(());
        }
        if self.settings.disable_type_stamping && !self.type_ids.is_empty() {
            return Err(Error::invalid_operation(
                "type stamping is disabled and the stream already carries a different record type",
            ));
        }
        let tid = self.next_type_id;
        self.next_type_id += 1;
        self.type_ids.insert(rt.key, tid);
        self.buf.write_varuint32(tid);
        if !self.settings.disable_type_stamping {
            rt.layout.to_bytes(&mut self.buf);
        }
        Ok(())
    }

    fn write_definition(&mut self, obj: &ObjHandle) -> Result<(), Error> {
        self.emit_type_id(obj)?;
        self.write_body(obj)
    }

    fn write_body(&mut self, obj: &ObjHandle) -> Result<(), Error> {
        for hook in self.hooks.pre_save.clone() {
            hook(obj)?;
        }
        let rt = self.registry.borrow().lookup_handle(obj)?;
        {
            let rec = obj.borrow();
            for field in rt.layout.fields() {
                let value = rec.get(&field.name);
                self.write_value(&field.kind, value, &field.name)?;
            }
        }
        for hook in self.hooks.post_save.clone() {
            hook(obj)?;
        }
        Ok(())
    }

    fn write_object_slot(&mut self, target: Option<&ObjHandle>) -> Result<(), Error> {
        if self.settings.preserves_references() {
            self.write_ref_slot(target)
        } else {
            self.write_inline_slot(target)
        }
    }

    fn write_value(&mut self, kind: &FieldKind, value: Value, field: &str) -> Result<(), Error> {
        match kind {
            FieldKind::Bool => match value {
                Value::Bool(v) => {
                    self.buf.write_u8(v as u8);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::I8 => match value {
                Value::I8(v) => {
                    self.buf.write_i8(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::I16 => match value {
                Value::I16(v) => {
                    self.buf.write_varint32(v as i32);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::I32 => match value {
                Value::I32(v) => {
                    self.buf.write_varint32(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::I64 => match value {
                Value::I64(v) => {
                    self.buf.write_varint64(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::U8 => match value {
                Value::U8(v) => {
                    self.buf.write_u8(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::U16 => match value {
                Value::U16(v) => {
                    self.buf.write_varuint32(v as u32);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::U32 => match value {
                Value::U32(v) => {
                    self.buf.write_varuint32(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::U64 => match value {
                Value::U64(v) => {
                    self.buf.write_varuint64(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::F32 => match value {
                Value::F32(v) => {
                    self.buf.write_f32(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::F64 => match value {
                Value::F64(v) => {
                    self.buf.write_f64(v);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Str => match value {
                Value::Str(s) => {
                    self.buf.write_opt_str(Some(&s));
                    Ok(())
                }
                Value::Null => {
                    self.buf.write_opt_str(None);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Bytes => match value {
                Value::Bytes(b) => {
                    self.buf.write_opt_bytes(Some(&b));
                    Ok(())
                }
                Value::Null => {
                    self.buf.write_opt_bytes(None);
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Time => match value {
                Value::Time(dt, time_kind) => {
                    let ticks = datetime_to_ticks(&dt)?;
                    self.buf.write_i64(ticks);
                    self.buf.write_u8(time_kind.into());
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Decimal => match value {
                Value::Decimal(d) => {
                    self.buf.write_bytes(&d.to_bits());
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Object => match value {
                Value::Null => self.write_object_slot(None),
                Value::Object(h) => self.write_object_slot(Some(&h)),
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Sequence(elem) => match value {
                Value::Null => {
                    self.buf.write_varint64(-1);
                    Ok(())
                }
                Value::Seq(items) => {
                    collection::write_preamble(&mut self.buf, items.len(), kind);
                    for item in items {
                        self.write_value(elem, item, field)?;
                    }
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Set(elem) => match value {
                Value::Null => {
                    self.buf.write_varint64(-1);
                    Ok(())
                }
                Value::Set(items) => {
                    collection::write_preamble(&mut self.buf, items.len(), kind);
                    for item in items {
                        self.write_value(elem, item, field)?;
                    }
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Mapping(key_kind, value_kind) => match value {
                Value::Null => {
                    self.buf.write_varint64(-1);
                    Ok(())
                }
                Value::Map(entries) => {
                    collection::write_preamble(&mut self.buf, entries.len(), kind);
                    for (k, v) in entries {
                        self.write_value(key_kind, k, field)?;
                        self.write_value(value_kind, v, field)?;
                    }
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
            FieldKind::Delegate => match value {
                Value::Null => {
                    self.buf.write_varint64(-1);
                    Ok(())
                }
                Value::Delegate(slots) => {
                    self.buf.write_varint64(slots.len() as i64);
                    for slot in slots {
                        self.write_object_slot(slot.target.as_ref())?;
                        self.buf.write_opt_str(Some(&slot.method));
                    }
                    Ok(())
                }
                v => Err(value_mismatch(field, kind, &v)),
            },
        }
    }
}

fn value_mismatch(field: &str, kind: &FieldKind, value: &Value) -> Error {
    Error::invalid_operation(format!(
        "field {} is declared {:?} but its record produced a {} value",
        field,
        kind.tag(),
        value.kind_name()
    ))
}
