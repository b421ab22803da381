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

//! Write-time substitution and read-time restoration.


use std::any::Any;
use std::rc::Rc;

use amber::{
    downcast, handle, handle_ptr, Amber, Error, FieldKind, Record, SwapFn, TypeLayout, Value,
};
use util::Pair;

/// Never registered with a session; always travels as [`Packed`].
#[derive(Default)]
struct Secret {
    token: String,
}

impl Record for Secret {
    fn describe() -> TypeLayout {
        TypeLayout::builder("amber.tests.Secret")
            .field("token", FieldKind::Str)
            .build()
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "token" => Value::Str(self.token.clone()),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) {
        if field == "token" {
            self.token = value.into_string().unwrap_or_default();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct Packed {
    blob: Option<Vec<u8>>,
}

impl Record for Packed {
    fn describe() -> TypeLayout {
        TypeLayout::builder("amber.tests.Packed")
            .field("blob", FieldKind::Bytes)
            .build()
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "blob" => Value::opt_bytes(&self.blob),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) {
        if field == "blob" {
            self.blob = value.into_bytes();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn pack_secret(obj: &amber::ObjHandle) -> Result<amber::ObjHandle, Error> {
    let secret = downcast::<Secret>(obj.clone())?;
    let token = secret.borrow().token.clone();
    Ok(handle(Packed {
        blob: Some(token.into_bytes()),
    }))
}

fn unpack_secret(obj: &amber::ObjHandle) -> Result<amber::ObjHandle, Error> {
    let packed = downcast::<Packed>(obj.clone())?;
    let blob = packed.borrow().blob.clone().unwrap_or_default();
    Ok(handle(Secret {
        token: String::from_utf8(blob)
            .map_err(|_| Error::stream_corrupted("packed token is not UTF-8"))?,
    }))
}

#[test]
fn substitution_and_restoration_commute() {
    let mut writing = Amber::default();
    writing.register::<Packed>().unwrap();
    writing.surrogate_for::<Secret>(pack_secret).unwrap();

    let mut bytes = Vec::new();
    writing
        .serialize(
            Some(&handle(Secret {
                token: "hunter2".to_owned(),
            })),
            &mut bytes,
            None,
        )
        .unwrap();

    let mut reading = Amber::default();
    reading.register::<Packed>().unwrap();
    reading.restore_for::<Packed>(unpack_secret).unwrap();

    let (root, _) = reading.deserialize::<Secret>(&bytes).unwrap();
    assert_eq!(root.unwrap().borrow().token, "hunter2");
}

#[test]
fn shared_surrogate_identity_is_preserved() {
    let mut writing = Amber::default();
    writing.register::<Packed>().unwrap();
    writing.register::<Pair>().unwrap();
    writing.surrogate_for::<Secret>(pack_secret).unwrap();

    let secret = handle(Secret {
        token: "once".to_owned(),
    });
    let root = handle(Pair {
        left: Some(secret.clone()),
        right: Some(secret),
    });
    let mut bytes = Vec::new();
    writing.serialize(Some(&root), &mut bytes, None).unwrap();

    let mut reading = Amber::default();
    reading.register::<Packed>().unwrap();
    reading.register::<Pair>().unwrap();
    reading.restore_for::<Packed>(unpack_secret).unwrap();

    let (out, _) = reading.deserialize::<Pair>(&bytes).unwrap();
    let out = out.unwrap();
    let left = out.borrow().left.clone().unwrap();
    let right = out.borrow().right.clone().unwrap();
    // Both paths resolve to the same restored object, never the surrogate.
    assert_eq!(handle_ptr(&left), handle_ptr(&right));
    let left = downcast::<Secret>(left).unwrap();
    assert_eq!(left.borrow().token, "once");
}

#[test]
fn registration_after_first_use_is_rejected() {
    let mut session = Amber::default();
    session.register::<Packed>().unwrap();

    let mut bytes = Vec::new();
    session
        .serialize(Some(&handle(Packed { blob: None })), &mut bytes, None)
        .unwrap();

    assert!(matches!(
        session.surrogate_for::<Secret>(pack_secret),
        Err(Error::InvalidOperation(_))
    ));

    // The read-side registry stays open until the first read.
    session.restore_for::<Packed>(unpack_secret).unwrap();
    let _ = session.deserialize::<Secret>(&bytes);
    assert!(matches!(
        session.restore_for::<Packed>(unpack_secret),
        Err(Error::InvalidOperation(_))
    ));
}

#[derive(Default)]
struct Derived {
    label: Option<String>,
}

impl Record for Derived {
    fn describe() -> TypeLayout {
        TypeLayout::builder("amber.tests.Derived")
            .base("amber.tests.BaseThing", [0u8; 16])
            .field("label", FieldKind::Str)
            .build()
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "label" => Value::opt_string(&self.label),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) {
        if field == "label" {
            self.label = value.into_string();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn base_registration_applies_and_explicit_null_blocks_it() {
    // With only the base registration, Derived travels as Packed.
    let mut writing = Amber::default();
    writing.register::<Packed>().unwrap();
    writing.register::<Derived>().unwrap();
    writing
        .surrogate_for_base("amber.tests.BaseThing", |obj| {
            let derived = downcast::<Derived>(obj.clone())?;
            let label = derived.borrow().label.clone().unwrap_or_default();
            Ok(handle(Packed {
                blob: Some(label.into_bytes()),
            }))
        })
        .unwrap();

    let mut bytes = Vec::new();
    writing
        .serialize(
            Some(&handle(Derived {
                label: Some("swapped".to_owned()),
            })),
            &mut bytes,
            None,
        )
        .unwrap();

    let mut reading = Amber::default();
    reading.register::<Packed>().unwrap();
    let (root, _) = reading.deserialize::<Packed>(&bytes).unwrap();
    assert_eq!(root.unwrap().borrow().blob.as_deref(), Some(&b"swapped"[..]));

    // An explicit null on the concrete type overrides the base entry.
    let mut blocked = Amber::default();
    blocked.register::<Packed>().unwrap();
    blocked.register::<Derived>().unwrap();
    blocked
        .surrogate_for_base("amber.tests.BaseThing", |obj| {
            let derived = downcast::<Derived>(obj.clone())?;
            let label = derived.borrow().label.clone().unwrap_or_default();
            Ok(handle(Packed {
                blob: Some(label.into_bytes()),
            }))
        })
        .unwrap();
    blocked.block_surrogate_for::<Derived>().unwrap();

    let mut bytes = Vec::new();
    blocked
        .serialize(
            Some(&handle(Derived {
                label: Some("kept".to_owned()),
            })),
            &mut bytes,
            None,
        )
        .unwrap();
    let (root, _) = blocked.deserialize::<Derived>(&bytes).unwrap();
    assert_eq!(root.unwrap().borrow().label.as_deref(), Some("kept"));
}

#[derive(Default)]
struct Wrapper {
    inner: Option<String>,
}

impl Record for Wrapper {
    fn describe() -> TypeLayout {
        TypeLayout::builder("amber.tests.Wrapper_Str")
            .family("amber.tests.Wrapper")
            .field("inner", FieldKind::Str)
            .build()
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "inner" => Value::opt_string(&self.inner),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) {
        if field == "inner" {
            self.inner = value.into_string();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn family_template_synthesises_a_substitution() {
    let mut writing = Amber::default();
    writing.register::<Packed>().unwrap();
    writing.register::<Wrapper>().unwrap();
    writing
        .surrogate_family("amber.tests.Wrapper", |_layout| -> SwapFn {
            Rc::new(|obj| {
                let wrapper = downcast::<Wrapper>(obj.clone())?;
                let inner = wrapper.borrow().inner.clone().unwrap_or_default();
                Ok(handle(Packed {
                    blob: Some(inner.into_bytes()),
                }))
            })
        })
        .unwrap();

    let mut bytes = Vec::new();
    writing
        .serialize(
            Some(&handle(Wrapper {
                inner: Some("templated".to_owned()),
            })),
            &mut bytes,
            None,
        )
        .unwrap();

    let mut reading = Amber::default();
    reading.register::<Packed>().unwrap();
    reading
        .restore_for::<Packed>(|obj| {
            let packed = downcast::<Packed>(obj.clone())?;
            let blob = packed.borrow().blob.clone().unwrap_or_default();
            Ok(handle(Wrapper {
                inner: Some(String::from_utf8(blob).unwrap_or_default()),
            }))
        })
        .unwrap();
    let (root, _) = reading.deserialize::<Wrapper>(&bytes).unwrap();
    assert_eq!(root.unwrap().borrow().inner.as_deref(), Some("templated"));
}
