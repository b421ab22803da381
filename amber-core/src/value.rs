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

//! The object model driven by the engine.
//!
//! A serialisable type implements [`Record`]: it publishes its structural
//! descriptor once and exposes its fields by name through a uniform [`Value`]
//! carrier. Reference-typed values are [`ObjHandle`]s; referential identity
//! is `Rc` pointer identity, which is how shared subgraphs and cycles are
//! expressed and preserved. A freshly `Default`-constructed handle acts as
//! the shell that reifies forward and cyclic references during reads.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::NaiveDateTime;

use crate::error::Error;
use crate::meta::TypeLayout;
use crate::types::{Decimal, FieldKind, TimeKind};

/// A reference-typed value in an object graph.
pub type ObjHandle = Rc<RefCell<dyn Record>>;

/// A serialisable record type.
///
/// `get`/`set` move whole field values; `set` writes the field directly,
/// bypassing any construction logic, which is what allows shells to be
/// populated after allocation.
pub trait Record: 'static {
    /// The structural descriptor of this type. Field order in the descriptor
    /// is name-sorted by the builder; `get`/`set` are keyed by name and are
    /// not affected by declaration order.
    fn describe() -> TypeLayout
    where
        Self: Sized;

    fn get(&self, field: &str) -> Value;

    fn set(&mut self, field: &str, value: Value);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Wraps a record into a graph handle.
pub fn handle<T: Record>(value: T) -> ObjHandle {
    Rc::new(RefCell::new(value))
}

/// Runtime type key of the record behind a handle.
pub fn runtime_key(h: &ObjHandle) -> std::any::TypeId {
    (*h.borrow()).as_any().type_id()
}

/// Address identity of a handle.
pub fn handle_ptr(h: &ObjHandle) -> usize {
    Rc::as_ptr(h) as *const () as usize
}

/// Recovers the concrete type behind a handle, preserving shared ownership.
pub fn downcast<T: Record>(h: ObjHandle) -> Result<Rc<RefCell<T>>, Error> {
    if (*h.borrow()).as_any().type_id() != std::any::TypeId::of::<T>() {
        return Err(Error::invalid_operation(
            "object is not of the requested record type",
        ));
    }
    let raw = Rc::into_raw(h) as *const RefCell<T>;
    // SAFETY: the allocation was created as `Rc<RefCell<T>>` (the concrete
    // type was just checked through `Any`), so the thin pointer refers to a
    // live `RefCell<T>` with the original reference count.
    Ok(unsafe { Rc::from_raw(raw) })
}

/// One invocation slot of a delegate value: a target object (or none for a
/// free function) and an opaque method descriptor.
#[derive(Clone)]
pub struct InvocationSlot {
    pub target: Option<ObjHandle>,
    pub method: String,
}

/// Uniform field-value carrier moved between records and the engine.
///
/// `Null` is admissible wherever the field kind is nullable (strings, byte
/// arrays, references, collections and delegates).
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Time(NaiveDateTime, TimeKind),
    Decimal(Decimal),
    Object(ObjHandle),
    Seq(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Delegate(Vec<InvocationSlot>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::I8(v) => write!(f, "I8({})", v),
            Value::I16(v) => write!(f, "I16({})", v),
            Value::I32(v) => write!(f, "I32({})", v),
            Value::I64(v) => write!(f, "I64({})", v),
            Value::U8(v) => write!(f, "U8({})", v),
            Value::U16(v) => write!(f, "U16({})", v),
            Value::U32(v) => write!(f, "U32({})", v),
            Value::U64(v) => write!(f, "U64({})", v),
            Value::F32(v) => write!(f, "F32({})", v),
            Value::F64(v) => write!(f, "F64({})", v),
            Value::Str(v) => write!(f, "Str({:?})", v),
            Value::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            Value::Time(dt, kind) => write!(f, "Time({}, {:?})", dt, kind),
            Value::Decimal(d) => write!(f, "Decimal({:?})", d),
            Value::Object(h) => write!(f, "Object({:p})", Rc::as_ptr(h)),
            Value::Seq(v) => write!(f, "Seq({} items)", v.len()),
            Value::Set(v) => write!(f, "Set({} items)", v.len()),
            Value::Map(v) => write!(f, "Map({} entries)", v.len()),
            Value::Delegate(v) => write!(f, "Delegate({} slots)", v.len()),
        }
    }
}

impl Value {
    pub fn object(opt: &Option<ObjHandle>) -> Value {
        match opt {
            Some(h) => Value::Object(h.clone()),
            None => Value::Null,
        }
    }

    pub fn opt_string(opt: &Option<String>) -> Value {
        match opt {
            Some(s) => Value::Str(s.clone()),
            None => Value::Null,
        }
    }

    pub fn opt_bytes(opt: &Option<Vec<u8>>) -> Value {
        match opt {
            Some(b) => Value::Bytes(b.clone()),
            None => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn into_object(self) -> Option<ObjHandle> {
        match self {
            Value::Object(h) => Some(h),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_seq(self) -> Option<Vec<Value>> {
        match self {
            Value::Seq(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_set(self) -> Option<Vec<Value>> {
        match self {
            Value::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<Vec<(Value, Value)>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_delegate(self) -> Option<Vec<InvocationSlot>> {
        match self {
            Value::Delegate(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn as_i8(&self) -> i8 {
        match self {
            Value::I8(v) => *v,
            _ => 0,
        }
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            Value::I16(v) => *v,
            _ => 0,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            Value::I32(v) => *v,
            _ => 0,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Value::I64(v) => *v,
            _ => 0,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Value::U8(v) => *v,
            _ => 0,
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Value::U16(v) => *v,
            _ => 0,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Value::U32(v) => *v,
            _ => 0,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match self {
            Value::U64(v) => *v,
            _ => 0,
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self {
            Value::F32(v) => *v,
            _ => 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::F64(v) => *v,
            _ => 0.0,
        }
    }

    pub fn as_time(&self) -> Option<(NaiveDateTime, TimeKind)> {
        match self {
            Value::Time(dt, kind) => Some((*dt, *kind)),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Time(_, _) => "time",
            Value::Decimal(_) => "decimal",
            Value::Object(_) => "object",
            Value::Seq(_) => "sequence",
            Value::Set(_) => "set",
            Value::Map(_) => "mapping",
            Value::Delegate(_) => "delegate",
        }
    }

    /// Converts a decoded stream value into the local field kind. Identical
    /// kinds pass through; integers widen within the same signedness;
    /// collection elements convert recursively. Anything else is stream
    /// corruption, since reconciliation already vetted the kinds.
    pub fn coerce(self, to: &FieldKind) -> Result<Value, Error> {
        if self.is_null() {
            return if to.is_primitive() && !matches!(to, FieldKind::Str | FieldKind::Bytes) {
                Err(coercion_error(&self, to))
            } else {
                Ok(Value::Null)
            };
        }
        match to {
            FieldKind::Bool => match self {
                Value::Bool(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::I8 => match self {
                Value::I8(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::I16 => match self {
                Value::I16(_) => Ok(self),
                Value::I8(x) => Ok(Value::I16(x as i16)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::I32 => match self {
                Value::I32(_) => Ok(self),
                Value::I8(x) => Ok(Value::I32(x as i32)),
                Value::I16(x) => Ok(Value::I32(x as i32)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::I64 => match self {
                Value::I64(_) => Ok(self),
                Value::I8(x) => Ok(Value::I64(x as i64)),
                Value::I16(x) => Ok(Value::I64(x as i64)),
                Value::I32(x) => Ok(Value::I64(x as i64)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::U8 => match self {
                Value::U8(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::U16 => match self {
                Value::U16(_) => Ok(self),
                Value::U8(x) => Ok(Value::U16(x as u16)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::U32 => match self {
                Value::U32(_) => Ok(self),
                Value::U8(x) => Ok(Value::U32(x as u32)),
                Value::U16(x) => Ok(Value::U32(x as u32)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::U64 => match self {
                Value::U64(_) => Ok(self),
                Value::U8(x) => Ok(Value::U64(x as u64)),
                Value::U16(x) => Ok(Value::U64(x as u64)),
                Value::U32(x) => Ok(Value::U64(x as u64)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::F32 => match self {
                Value::F32(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::F64 => match self {
                Value::F64(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Str => match self {
                Value::Str(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Bytes => match self {
                Value::Bytes(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Time => match self {
                Value::Time(_, _) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Decimal => match self {
                Value::Decimal(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Object => match self {
                Value::Object(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Sequence(elem) => match self {
                Value::Seq(items) => Ok(Value::Seq(coerce_items(items, elem)?)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Set(elem) => match self {
                Value::Set(items) => Ok(Value::Set(coerce_items(items, elem)?)),
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Mapping(key, value) => match self {
                Value::Map(entries) => {
                    let mut out = Vec::with_capacity(entries.len());
                    for (k, v) in entries {
                        out.push((k.coerce(key)?, v.coerce(value)?));
                    }
                    Ok(Value::Map(out))
                }
                v => Err(coercion_error(&v, to)),
            },
            FieldKind::Delegate => match self {
                Value::Delegate(_) => Ok(self),
                v => Err(coercion_error(&v, to)),
            },
        }
    }
}

fn coerce_items(items: Vec<Value>, elem: &FieldKind) -> Result<Vec<Value>, Error> {
    items.into_iter().map(|v| v.coerce(elem)).collect()
}

fn coercion_error(value: &Value, to: &FieldKind) -> Error {
    Error::stream_corrupted(format!(
        "a {} value cannot occupy a {:?} slot",
        value.kind_name(),
        to.tag()
    ))
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_owned())
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Value {
        Value::Decimal(v)
    }
}
