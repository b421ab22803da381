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

//! The graph reader state machine.
//!
//! Mirrors the writer: a root token is read, every first-mentioned object id
//! allocates an unpopulated shell and joins the pending queue, and the queue
//! is drained in id order against the definitions that follow. Layout
//! payloads are pulled inline the first time a type-id appears and
//! reconciled against the registered local type; field decode then applies
//! the resulting plan (read, coerce or discard). Once the graph is fully
//! populated, surrogates are restored in id order and every handle that
//! pointed at a restored surrogate is rewritten before post-hooks fire, so
//! no resolved reference ever exposes a surrogate instance.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::buffer::Reader;
use crate::collection::{self, CollectionKind};
use crate::config::Settings;
use crate::error::Error;
use crate::meta::{reconcile, FieldMap, TypeLayout};
use crate::resolver::ref_table::ReadRefTable;
use crate::resolver::registry::{RegisteredType, SharedRegistry};
use crate::resolver::surrogate::SharedSurrogates;
use crate::session::Hooks;
use crate::types::{datetime_from_ticks, Decimal, FieldKind, TimeKind, NULL_TYPE_ID};
use crate::value::{downcast, handle_ptr, runtime_key, InvocationSlot, ObjHandle, Record, Value};

/// A stream type reconciled against its local counterpart.
struct ResolvedType {
    local: Rc<RegisteredType>,
    map: FieldMap,
    /// Fingerprints matched: decode straight off the local field list.
    direct: bool,
}

pub struct GraphReader<'bf> {
    reader: Reader<'bf>,
    settings: Settings,
    registry: SharedRegistry,
    surrogates: SharedSurrogates,
    hooks: Hooks,
    types: Vec<Rc<ResolvedType>>,
    refs: ReadRefTable,
    pending: VecDeque<u32>,
    /// Ids populated by the current root call, in id order.
    populated: Vec<u32>,
    /// Objects populated by the current root call in inline mode.
    inline_populated: Vec<ObjHandle>,
    /// Bound local type used for every object when stamping is disabled.
    fallback: Option<Rc<RegisteredType>>,
    last_error: Option<Error>,
}

impl<'bf> GraphReader<'bf> {
    pub(crate) fn new(
        reader: Reader<'bf>,
        settings: Settings,
        registry: SharedRegistry,
        surrogates: SharedSurrogates,
        hooks: Hooks,
    ) -> Self {
        GraphReader {
            reader,
            settings,
            registry,
            surrogates,
            hooks,
            types: Vec::new(),
            refs: ReadRefTable::new(),
            pending: VecDeque::new(),
            populated: Vec::new(),
            inline_populated: Vec::new(),
            fallback: None,
            last_error: None,
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Rebinds the underlying byte slice; the type and reference tables
    /// persist.
    pub(crate) fn rebind(&mut self, reader: Reader<'bf>) {
        self.reader = reader;
    }

    pub fn consumed(&self) -> usize {
        self.reader.cursor()
    }

    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// The failure that stopped the previous root read, if any.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Decodes exactly one root, reusing the mapping tables of any earlier
    /// root on this session.
    pub fn read_root<T: Record>(&mut self) -> Result<Option<Rc<RefCell<T>>>, Error> {
        match self.read_root_inner::<T>() {
            Ok(v) => {
                self.last_error = None;
                Ok(v)
            }
            Err(e) => {
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn read_root_inner<T: Record>(&mut self) -> Result<Option<Rc<RefCell<T>>>, Error> {
        self.populated.clear();
        self.inline_populated.clear();
        if self.settings.disable_type_stamping && self.fallback.is_none() {
            self.fallback = Some(self.registry.borrow().lookup_key(TypeId::of::<T>())?);
        }
        if self.settings.preserves_references() {
            let Some((root_id, _)) = self.read_ref_slot()? else {
                return Ok(None);
            };
            while let Some(id) = self.pending.pop_front() {
                self.read_definition(id)?;
            }
            self.restore_surrogates()?;
            self.fire_post_load()?;
            let root = self.refs.resolve(root_id)?;
            downcast::<T>(root).map(Some)
        } else {
            let root = self.read_inline_slot()?;
            let root = self.restore_inline(root)?;
            for obj in std::mem::take(&mut self.inline_populated) {
                for hook in self.hooks.post_load.clone() {
                    hook(&obj)?;
                }
            }
            match root {
                Some(r) => downcast::<T>(r).map(Some),
                None => Ok(None),
            }
        }
    }

    fn resolve_type(&mut self, tid: u32) -> Result<Rc<ResolvedType>, Error> {
        let idx = tid as usize;
        if idx == 0 {
            return Err(Error::stream_corrupted("type id 0 outside a null slot"));
        }
        if idx <= self.types.len() {
            return Ok(self.types[idx - 1].clone());
        }
        if idx != self.types.len() + 1 {
            return Err(Error::stream_corrupted(format!(
                "type id {} skips ahead of the type table",
                tid
            )));
        }
        let resolved = if self.settings.disable_type_stamping {
            if !self.types.is_empty() {
                return Err(Error::stream_corrupted(
                    "type stamping is disabled but the stream carries more than one type id",
                ));
            }
            let local = self.fallback.clone().ok_or_else(|| {
                Error::invalid_operation("no declared root type to re-synthesise layouts from")
            })?;
            ResolvedType {
                local,
                map: FieldMap::default(),
                direct: true,
            }
        } else {
            let (layout, recorded) = TypeLayout::from_bytes(&mut self.reader)?;
            if layout.fingerprint() != recorded {
                return Err(Error::stream_corrupted(format!(
                    "layout of type {} does not match its recorded fingerprint",
                    layout.name()
                )));
            }
            let local = self
                .registry
                .borrow()
                .bind(layout.name(), self.settings.version_tolerance)?;
            let direct = !self.settings.force_layout_verification
                && recorded == local.layout.fingerprint()
                && layout.module_tag() == local.layout.module_tag();
            let map = if direct {
                FieldMap::default()
            } else {
                reconcile(&layout, &local.layout, self.settings.version_tolerance)?
            };
            ResolvedType { local, map, direct }
        };
        let resolved = Rc::new(resolved);
        self.types.push(resolved.clone());
        Ok(resolved)
    }

    /// Reads a reference token. A first-mentioned id allocates a shell of
    /// the reconciled local type and queues it for population; later
    /// mentions resolve from the table, which is how back-edges land on the
    /// same instance.
    fn read_ref_slot(&mut self) -> Result<Option<(u32, ObjHandle)>, Error> {
        let tid = self.reader.read_varuint32()?;
        if tid == NULL_TYPE_ID {
            return Ok(None);
        }
        let rt = self.resolve_type(tid)?;
        let id = self.reader.read_varuint32()?;
        let high_water = self.refs.high_water();
        if id < high_water {
            Ok(Some((id, self.refs.resolve(id)?)))
        } else if id == high_water {
            let shell = rt.local.make_shell();
            self.refs.reserve(id, shell.clone())?;
            self.pending.push_back(id);
            Ok(Some((id, shell)))
        } else {
            Err(Error::stream_corrupted(format!(
                "reference id {} beyond the high-water mark {}",
                id, high_water
            )))
        }
    }

    fn read_definition(&mut self, id: u32) -> Result<(), Error> {
        let tid = self.reader.read_varuint32()?;
        if tid == NULL_TYPE_ID {
            return Err(Error::stream_corrupted(
                "object definition carries the null type",
            ));
        }
        let rt = self.resolve_type(tid)?;
        let obj = self.refs.resolve(id)?;
        self.populate(&rt, &obj)?;
        self.populated.push(id);
        Ok(())
    }

    fn read_inline_slot(&mut self) -> Result<Option<ObjHandle>, Error> {
        let tid = self.reader.read_varuint32()?;
        if tid == NULL_TYPE_ID {
            return Ok(None);
        }
        let rt = self.resolve_type(tid)?;
        let obj = rt.local.make_shell();
        self.populate(&rt, &obj)?;
        self.inline_populated.push(obj.clone());
        Ok(Some(obj))
    }

    /// Walks the stream-side field list of one object, applying the field
    /// map: decode into the local field, or decode and discard.
    fn populate(&mut self, rt: &ResolvedType, obj: &ObjHandle) -> Result<(), Error> {
        if rt.direct {
            for field in rt.local.layout.fields() {
                let value = self.read_value(&field.kind)?;
                obj.borrow_mut().set(&field.name, value);
            }
        } else {
            for planned in &rt.map.planned {
                let value = self.read_value(&planned.stream_kind)?;
                if let Some((local_name, local_kind)) = &planned.target {
                    let value = value.coerce(local_kind)?;
                    obj.borrow_mut().set(local_name, value);
                }
            }
        }
        Ok(())
    }

    fn read_object_slot(&mut self) -> Result<Option<ObjHandle>, Error> {
        if self.settings.preserves_references() {
            Ok(self.read_ref_slot()?.map(|(_, obj)| obj))
        } else {
            self.read_inline_slot()
        }
    }

    fn read_value(&mut self, kind: &FieldKind) -> Result<Value, Error> {
        Ok(match kind {
            FieldKind::Bool => match self.reader.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(Error::stream_corrupted(format!(
                        "boolean byte holds {}",
                        other
                    )))
                }
            },
            FieldKind::I8 => Value::I8(self.reader.read_i8()?),
            FieldKind::I16 => {
                let v = self.reader.read_varint32()?;
                Value::I16(i16::try_from(v).map_err(|_| {
                    Error::stream_corrupted(format!("value {} overflows a 16-bit field", v))
                })?)
            }
            FieldKind::I32 => Value::I32(self.reader.read_varint32()?),
            FieldKind::I64 => Value::I64(self.reader.read_varint64()?),
            FieldKind::U8 => Value::U8(self.reader.read_u8()?),
            FieldKind::U16 => {
                let v = self.reader.read_varuint32()?;
                Value::U16(u16::try_from(v).map_err(|_| {
                    Error::stream_corrupted(format!("value {} overflows a 16-bit field", v))
                })?)
            }
            FieldKind::U32 => Value::U32(self.reader.read_varuint32()?),
            FieldKind::U64 => Value::U64(self.reader.read_varuint64()?),
            FieldKind::F32 => Value::F32(self.reader.read_f32()?),
            FieldKind::F64 => Value::F64(self.reader.read_f64()?),
            FieldKind::Str => match self.reader.read_opt_str()? {
                Some(s) => Value::Str(s),
                None => Value::Null,
            },
            FieldKind::Bytes => match self.reader.read_opt_bytes()? {
                Some(b) => Value::Bytes(b),
                None => Value::Null,
            },
            FieldKind::Time => {
                let ticks = self.reader.read_i64()?;
                let raw_kind = self.reader.read_u8()?;
                let time_kind = TimeKind::try_from(raw_kind).map_err(|_| {
                    Error::stream_corrupted(format!("unknown time kind byte {}", raw_kind))
                })?;
                Value::Time(datetime_from_ticks(ticks)?, time_kind)
            }
            FieldKind::Decimal => {
                let bits: [u8; 16] = self.reader.read_bytes(16)?.try_into().unwrap();
                Value::Decimal(Decimal::from_bits(bits)?)
            }
            FieldKind::Object => match self.read_object_slot()? {
                Some(obj) => Value::Object(obj),
                None => Value::Null,
            },
            FieldKind::Sequence(_) => {
                match collection::read_preamble(&mut self.reader, CollectionKind::Sequence)? {
                    None => Value::Null,
                    Some((len, elem, _)) => {
                        let mut items = Vec::with_capacity(len);
                        for _ in 0..len {
                            items.push(self.read_value(&elem)?);
                        }
                        Value::Seq(items)
                    }
                }
            }
            FieldKind::Set(_) => {
                match collection::read_preamble(&mut self.reader, CollectionKind::Set)? {
                    None => Value::Null,
                    Some((len, elem, _)) => {
                        let mut items = Vec::with_capacity(len);
                        for _ in 0..len {
                            items.push(self.read_value(&elem)?);
                        }
                        Value::Set(items)
                    }
                }
            }
            FieldKind::Mapping(_, _) => {
                match collection::read_preamble(&mut self.reader, CollectionKind::Mapping)? {
                    None => Value::Null,
                    Some((len, key_kind, value_kind)) => {
                        let value_kind = value_kind.ok_or_else(|| {
                            Error::stream_corrupted("mapping preamble lacks a value kind")
                        })?;
                        let mut entries = Vec::with_capacity(len);
                        for _ in 0..len {
                            let k = self.read_value(&key_kind)?;
                            let v = self.read_value(&value_kind)?;
                            entries.push((k, v));
                        }
                        Value::Map(entries)
                    }
                }
            }
            FieldKind::Delegate => match self.reader.read_len()? {
                None => Value::Null,
                Some(count) => {
                    let mut slots = Vec::with_capacity(count);
                    for _ in 0..count {
                        let target = self.read_object_slot()?;
                        let method = self.reader.read_opt_str()?.ok_or_else(|| {
                            Error::stream_corrupted("delegate slot carries a null method")
                        })?;
                        slots.push(InvocationSlot { target, method });
                    }
                    Value::Delegate(slots)
                }
            },
        })
    }

    /// Id-ordered restoration pass: each surrogate's restore callback runs,
    /// the final object replaces the surrogate at its id, and every handle
    /// slot populated by this call that pointed at a replaced surrogate is
    /// rewritten.
    fn restore_surrogates(&mut self) -> Result<(), Error> {
        let mut replaced: HashMap<usize, ObjHandle> = HashMap::new();
        for &id in &self.populated {
            let obj = self.refs.resolve(id)?;
            if let Some(fresh) = self.restore_one(&obj)? {
                replaced.insert(handle_ptr(&obj), fresh.clone());
                self.refs.replace(id, fresh);
            }
        }
        if replaced.is_empty() {
            return Ok(());
        }
        for &id in &self.populated {
            let obj = self.refs.resolve(id)?;
            self.sweep_object(&obj, &replaced);
        }
        Ok(())
    }

    fn restore_inline(&mut self, root: Option<ObjHandle>) -> Result<Option<ObjHandle>, Error> {
        let mut replaced: HashMap<usize, ObjHandle> = HashMap::new();
        for obj in self.inline_populated.clone() {
            if let Some(fresh) = self.restore_one(&obj)? {
                replaced.insert(handle_ptr(&obj), fresh);
            }
        }
        if replaced.is_empty() {
            return Ok(root);
        }
        for obj in self.inline_populated.clone() {
            self.sweep_object(&obj, &replaced);
        }
        for obj in self.inline_populated.iter_mut() {
            if let Some(fresh) = replaced.get(&handle_ptr(obj)) {
                *obj = fresh.clone();
            }
        }
        Ok(root.map(|r| replaced.get(&handle_ptr(&r)).cloned().unwrap_or(r)))
    }

    fn restore_one(&self, obj: &ObjHandle) -> Result<Option<ObjHandle>, Error> {
        let key = runtime_key(obj);
        let layout = self
            .registry
            .borrow()
            .lookup_key(key)
            .ok()
            .map(|rt| rt.layout.clone());
        let restore = self.surrogates.borrow().resolve(key, layout.as_deref());
        match restore {
            Some(f) => {
                let fresh = f(obj)?;
                if handle_ptr(&fresh) != handle_ptr(obj) {
                    Ok(Some(fresh))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    fn sweep_object(&self, obj: &ObjHandle, replaced: &HashMap<usize, ObjHandle>) {
        let Ok(rt) = self.registry.borrow().lookup_handle(obj) else {
            return;
        };
        for field in rt.layout.fields() {
            if !kind_holds_objects(&field.kind) {
                continue;
            }
            let mut value = obj.borrow().get(&field.name);
            if rewrite_value(&mut value, replaced) {
                obj.borrow_mut().set(&field.name, value);
            }
        }
    }

    fn fire_post_load(&mut self) -> Result<(), Error> {
        let populated = std::mem::take(&mut self.populated);
        for id in populated {
            let obj = self.refs.resolve(id)?;
            for hook in self.hooks.post_load.clone() {
                hook(&obj)?;
            }
        }
        Ok(())
    }
}

fn kind_holds_objects(kind: &FieldKind) -> bool {
    match kind {
        FieldKind::Object | FieldKind::Delegate => true,
        FieldKind::Sequence(elem) | FieldKind::Set(elem) => kind_holds_objects(elem),
        FieldKind::Mapping(key, value) => kind_holds_objects(key) || kind_holds_objects(value),
        _ => false,
    }
}

fn rewrite_value(value: &mut Value, replaced: &HashMap<usize, ObjHandle>) -> bool {
    match value {
        Value::Object(h) => {
            if let Some(fresh) = replaced.get(&handle_ptr(h)) {
                *h = fresh.clone();
                true
            } else {
                false
            }
        }
        Value::Seq(items) | Value::Set(items) => {
            let mut changed = false;
            for item in items.iter_mut() {
                changed |= rewrite_value(item, replaced);
            }
            changed
        }
        Value::Map(entries) => {
            let mut changed = false;
            for (k, v) in entries.iter_mut() {
                changed |= rewrite_value(k, replaced);
                changed |= rewrite_value(v, replaced);
            }
            changed
        }
        Value::Delegate(slots) => {
            let mut changed = false;
            for slot in slots.iter_mut() {
                if let Some(target) = &mut slot.target {
                    if let Some(fresh) = replaced.get(&handle_ptr(target)) {
                        *target = fresh.clone();
                        changed = true;
                    }
                }
            }
            changed
        }
        _ => false,
    }
}
