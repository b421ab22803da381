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

//! Stream header and metadata block handling.


use amber::{handle, Amber, Error, ReferencePreservation, StreamOutcome, MAGIC, VERSION};
use util::{Leaf, Pair};

fn session() -> Amber {
    let mut session = Amber::default();
    session.register::<Leaf>().unwrap();
    session.register::<Pair>().unwrap();
    session
}

fn valid_stream() -> Vec<u8> {
    let session = session();
    let mut bytes = Vec::new();
    session
        .serialize(Some(&handle(Leaf { value: 1 })), &mut bytes, None)
        .unwrap();
    bytes
}

#[test]
fn header_layout_is_fixed() {
    let bytes = valid_stream();
    assert_eq!(&bytes[0..3], &MAGIC);
    assert_eq!(bytes[3], VERSION);
    assert_eq!(bytes[4], 1); // references preserved
    assert_eq!(bytes[5], 1); // type stamping enabled
}

#[test]
fn wrong_magic_is_classified() {
    let mut bytes = valid_stream();
    bytes[0] = 0x33;
    let session = session();
    assert!(matches!(
        session.try_deserialize::<Leaf>(&bytes),
        StreamOutcome::WrongMagic
    ));
    assert!(matches!(
        session.deserialize::<Leaf>(&bytes),
        Err(Error::WrongMagic)
    ));
}

#[test]
fn wrong_version_is_classified() {
    let mut bytes = valid_stream();
    bytes[3] = VERSION - 1;
    let session = session();
    assert!(matches!(
        session.try_deserialize::<Leaf>(&bytes),
        StreamOutcome::WrongVersion
    ));
    match session.deserialize::<Leaf>(&bytes) {
        Err(Error::WrongVersion { expected, found }) => {
            assert_eq!(expected, VERSION);
            assert_eq!(found, VERSION - 1);
        }
        other => panic!("expected a version error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn configuration_mismatch_is_classified() {
    let bytes = valid_stream();

    let mut inline_session =
        Amber::default().reference_preservation(ReferencePreservation::DoNotPreserve);
    inline_session.register::<Leaf>().unwrap();
    assert!(matches!(
        inline_session.try_deserialize::<Leaf>(&bytes),
        StreamOutcome::WrongStreamConfiguration
    ));

    let mut unstamped_session = Amber::default().disable_type_stamping(true);
    unstamped_session.register::<Leaf>().unwrap();
    assert!(matches!(
        unstamped_session.try_deserialize::<Leaf>(&bytes),
        StreamOutcome::WrongStreamConfiguration
    ));
}

#[test]
fn metadata_roundtrips() {
    let session = session();
    let mut bytes = Vec::new();
    session
        .serialize(
            Some(&handle(Leaf { value: 2 })),
            &mut bytes,
            Some(b"build-77"),
        )
        .unwrap();
    let (root, metadata) = session.deserialize::<Leaf>(&bytes).unwrap();
    assert_eq!(root.unwrap().borrow().value, 2);
    assert_eq!(metadata.as_deref(), Some(&b"build-77"[..]));
}

#[test]
fn metadata_size_limits_are_enforced() {
    let session = session();
    let mut bytes = Vec::new();
    let too_long = [0u8; 256];
    assert!(matches!(
        session.serialize(Some(&handle(Leaf { value: 1 })), &mut bytes, Some(&too_long)),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert!(matches!(
        session.serialize(Some(&handle(Leaf { value: 1 })), &mut bytes, Some(&[])),
        Err(Error::ArgumentOutOfRange(_))
    ));
}

#[test]
fn truncated_metadata_is_treated_as_absent() {
    // Header, then a length byte of 5 with only three payload bytes left.
    let mut bytes = valid_stream()[0..6].to_vec();
    bytes.extend_from_slice(&[5, 1, 2]);

    let session = session();
    let reader = session.reader(&bytes).unwrap();
    assert!(reader.metadata().is_none());
    // The rewound bytes are then parsed as body and fail on their own
    // terms, not as metadata corruption.
    let mut reader = reader;
    let result = reader.read_root::<Leaf>();
    assert!(result.is_err());
    assert!(!matches!(result, Err(Error::MetadataCorrupted(_))));
}

#[test]
fn zero_length_metadata_rewinds_into_a_null_root() {
    // A length byte of 0 is invalid metadata; the rewound byte then reads
    // as a null root. The two streams are indistinguishable by design.
    let mut bytes = valid_stream()[0..6].to_vec();
    bytes.push(0);

    let session = session();
    let (root, metadata) = session.deserialize::<Leaf>(&bytes).unwrap();
    assert!(root.is_none());
    assert!(metadata.is_none());
}

#[test]
fn required_metadata_turns_absence_into_an_error() {
    let mut strict = Amber::default().require_metadata(true);
    strict.register::<Leaf>().unwrap();

    // Null root directly after the header: the root byte parses as a
    // zero-length metadata block.
    let mut bytes = valid_stream()[0..6].to_vec();
    bytes.push(0);
    assert!(matches!(
        strict.try_deserialize::<Leaf>(&bytes),
        StreamOutcome::MetadataCorrupted
    ));
}

#[test]
fn corrupt_checksum_is_rejected_when_metadata_is_required() {
    let writing = session();
    let mut bytes = Vec::new();
    writing
        .serialize(Some(&handle(Leaf { value: 3 })), &mut bytes, Some(b"meta"))
        .unwrap();
    // Flip the checksum byte: header(6) + length(1) + payload(4).
    bytes[6 + 1 + 4] ^= 0xFF;

    let mut strict = Amber::default().require_metadata(true);
    strict.register::<Leaf>().unwrap();
    assert!(matches!(
        strict.try_deserialize::<Leaf>(&bytes),
        StreamOutcome::MetadataCorrupted
    ));
}

#[test]
fn corrupted_reference_stream_is_classified() {
    // A huge varint where the root type-id belongs.
    let mut bytes = valid_stream()[0..6].to_vec();
    bytes.extend_from_slice(&[0xFF; 11]);
    let session = session();
    assert!(matches!(
        session.try_deserialize::<Leaf>(&bytes),
        StreamOutcome::StreamCorrupted
    ));
}

#[test]
fn truncated_body_reports_stream_truncated() {
    let bytes = valid_stream();
    let cut = &bytes[0..bytes.len() - 2];
    let session = session();
    assert!(matches!(
        session.deserialize::<Leaf>(cut),
        Err(Error::StreamTruncated(_))
    ));
}
