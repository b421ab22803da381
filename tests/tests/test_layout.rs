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
use amber_core::config::Tolerance;
use amber_core::error::Error;
use amber_core::meta::{reconcile, TypeLayout};
use amber_core::types::FieldKind;

fn sample() -> TypeLayout {
    TypeLayout::builder("amber.tests.Sample")
        .field("age", FieldKind::I32)
        .field("name", FieldKind::Str)
        .field("tags", FieldKind::Sequence(Box::new(FieldKind::Str)))
        .build()
}

#[test]
fn declaration_order_does_not_matter() {
    let reordered = TypeLayout::builder("amber.tests.Sample")
        .field("tags", FieldKind::Sequence(Box::new(FieldKind::Str)))
        .field("name", FieldKind::Str)
        .field("age", FieldKind::I32)
        .build();
    let layout = sample();

    assert_eq!(layout.fingerprint(), reordered.fingerprint());

    let mut a = Writer::new();
    layout.to_bytes(&mut a);
    let mut b = Writer::new();
    reordered.to_bytes(&mut b);
    assert_eq!(a.dump(), b.dump());
}

#[test]
fn fields_are_sorted_by_name() {
    let layout = sample();
    let names: Vec<&str> = layout.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["age", "name", "tags"]);
}

#[test]
fn wire_roundtrip() {
    let layout = TypeLayout::builder("amber.tests.Derived@2")
        .module_tag([7u8; 16])
        .base("amber.tests.Base", [3u8; 16])
        .field("own", FieldKind::Mapping(Box::new(FieldKind::Str), Box::new(FieldKind::I64)))
        .declared_field("inherited", FieldKind::Object, 1)
        .build();

    let mut writer = Writer::new();
    layout.to_bytes(&mut writer);
    let bytes = writer.dump();
    let mut reader = Reader::new(&bytes);
    let (decoded, recorded) = TypeLayout::from_bytes(&mut reader).unwrap();

    assert_eq!(decoded.name(), "amber.tests.Derived@2");
    assert_eq!(decoded.module_tag(), &[7u8; 16]);
    assert_eq!(decoded.bases().len(), 1);
    assert_eq!(decoded.bases()[0].name, "amber.tests.Base");
    assert_eq!(decoded.fields(), layout.fields());
    assert_eq!(recorded, layout.fingerprint());
    assert_eq!(decoded.fingerprint(), layout.fingerprint());
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn distinct_field_lists_have_distinct_fingerprints() {
    let other = TypeLayout::builder("amber.tests.Sample")
        .field("age", FieldKind::I64)
        .field("name", FieldKind::Str)
        .field("tags", FieldKind::Sequence(Box::new(FieldKind::Str)))
        .build();
    assert_ne!(sample().fingerprint(), other.fingerprint());
}

#[test]
fn identical_layouts_reconcile_cleanly() {
    let map = reconcile(&sample(), &sample(), Tolerance::NONE).unwrap();
    assert_eq!(map.planned.len(), 3);
    assert!(map.planned.iter().all(|p| p.target.is_some()));
    assert!(map.defaulted.is_empty());
}

#[test]
fn added_field_needs_tolerance() {
    let stream = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I32)
        .build();
    let local = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I32)
        .field("y", FieldKind::Str)
        .build();

    assert!(matches!(
        reconcile(&stream, &local, Tolerance::NONE),
        Err(Error::TypeStructureChanged(_))
    ));

    let map = reconcile(&stream, &local, Tolerance::FIELD_ADDITION).unwrap();
    assert_eq!(map.defaulted, ["y"]);
}

#[test]
fn removed_field_needs_tolerance() {
    let stream = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I32)
        .field("y", FieldKind::Str)
        .build();
    let local = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I32)
        .build();

    assert!(matches!(
        reconcile(&stream, &local, Tolerance::NONE),
        Err(Error::TypeStructureChanged(_))
    ));

    let map = reconcile(&stream, &local, Tolerance::FIELD_REMOVAL).unwrap();
    let skipped: Vec<&str> = map
        .planned
        .iter()
        .filter(|p| p.target.is_none())
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(skipped, ["y"]);
}

#[test]
fn integer_widening_is_compatible() {
    let stream = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I16)
        .build();
    let local = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I64)
        .build();
    let map = reconcile(&stream, &local, Tolerance::NONE).unwrap();
    assert!(map.planned[0].target.is_some());
}

#[test]
fn narrowing_and_signedness_changes_are_rejected() {
    let narrow_local = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I16)
        .build();
    let wide_stream = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::I64)
        .build();
    assert!(matches!(
        reconcile(&wide_stream, &narrow_local, Tolerance::ALL),
        Err(Error::TypeStructureChanged(_))
    ));

    let unsigned_stream = TypeLayout::builder("amber.tests.Sample")
        .field("x", FieldKind::U32)
        .build();
    assert!(matches!(
        reconcile(
            &unsigned_stream,
            &TypeLayout::builder("amber.tests.Sample")
                .field("x", FieldKind::I64)
                .build(),
            Tolerance::ALL
        ),
        Err(Error::TypeStructureChanged(_))
    ));
}

#[test]
fn module_tag_change_needs_tolerance() {
    let stream = TypeLayout::builder("amber.tests.Sample")
        .module_tag([1u8; 16])
        .field("x", FieldKind::I32)
        .build();
    let local = TypeLayout::builder("amber.tests.Sample")
        .module_tag([2u8; 16])
        .field("x", FieldKind::I32)
        .build();

    assert!(matches!(
        reconcile(&stream, &local, Tolerance::NONE),
        Err(Error::TypeStructureChanged(_))
    ));
    assert!(reconcile(&stream, &local, Tolerance::MODULE_TAG_CHANGE).is_ok());
}

#[test]
fn field_move_between_base_and_self_needs_tolerance() {
    let stream = TypeLayout::builder("amber.tests.Derived")
        .base("amber.tests.Base", [0u8; 16])
        .declared_field("x", FieldKind::I32, 1)
        .build();
    let local = TypeLayout::builder("amber.tests.Derived")
        .base("amber.tests.Base", [0u8; 16])
        .field("x", FieldKind::I32)
        .build();

    assert!(matches!(
        reconcile(&stream, &local, Tolerance::NONE),
        Err(Error::TypeStructureChanged(_))
    ));
    assert!(reconcile(&stream, &local, Tolerance::FIELD_MOVE).is_ok());
}
