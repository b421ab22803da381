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

//! Shared-reference and cycle preservation.


use amber::{downcast, handle, handle_ptr, Amber, Error, ReferencePreservation};
use util::{leaf, node, Leaf, Node, Pair};

fn session() -> Amber {
    let mut session = Amber::default();
    session.register::<Leaf>().unwrap();
    session.register::<Node>().unwrap();
    session.register::<Pair>().unwrap();
    session
}

#[test]
fn shared_leaf_is_written_once_and_stays_shared() {
    let session = session();
    let shared = leaf(7);
    let root = handle(Pair {
        left: Some(shared.clone()),
        right: Some(shared),
    });

    let mut shared_bytes = Vec::new();
    session.serialize(Some(&root), &mut shared_bytes, None).unwrap();

    // The same shape with two distinct leaves must serialise strictly
    // larger: the shared graph carries one leaf body and one back
    // reference.
    let split = handle(Pair {
        left: Some(leaf(7)),
        right: Some(leaf(7)),
    });
    let mut split_bytes = Vec::new();
    session.serialize(Some(&split), &mut split_bytes, None).unwrap();
    assert!(shared_bytes.len() < split_bytes.len());

    let (out, _) = session.deserialize::<Pair>(&shared_bytes).unwrap();
    let out = out.unwrap();
    let left = out.borrow().left.clone().unwrap();
    let right = out.borrow().right.clone().unwrap();
    assert_eq!(handle_ptr(&left), handle_ptr(&right));
    assert_eq!(downcast::<Leaf>(left).unwrap().borrow().value, 7);
}

#[test]
fn two_node_cycle_roundtrips() {
    let session = session();
    let a = node(1, None);
    let b = node(2, Some(a.clone()));
    downcast::<Node>(a.clone()).unwrap().borrow_mut().next = Some(b);

    let mut bytes = Vec::new();
    session.serialize(Some(&a), &mut bytes, None).unwrap();

    let (out, _) = session.deserialize::<Node>(&bytes).unwrap();
    let a2 = out.unwrap();
    assert_eq!(a2.borrow().value, 1);
    let b2 = downcast::<Node>(a2.borrow().next.clone().unwrap()).unwrap();
    assert_eq!(b2.borrow().value, 2);
    let back = b2.borrow().next.clone().unwrap();
    let a2_handle: amber::ObjHandle = a2.clone();
    assert_eq!(handle_ptr(&back), handle_ptr(&a2_handle));
}

#[test]
fn self_loop_roundtrips() {
    let session = session();
    let a = node(5, None);
    downcast::<Node>(a.clone()).unwrap().borrow_mut().next = Some(a.clone());

    let mut bytes = Vec::new();
    session.serialize(Some(&a), &mut bytes, None).unwrap();

    let (out, _) = session.deserialize::<Node>(&bytes).unwrap();
    let a2 = out.unwrap();
    let next = a2.borrow().next.clone().unwrap();
    let a2_handle: amber::ObjHandle = a2.clone();
    assert_eq!(handle_ptr(&next), handle_ptr(&a2_handle));
}

#[test]
fn null_references_roundtrip() {
    let session = session();
    let root = handle(Pair {
        left: None,
        right: Some(leaf(3)),
    });
    let mut bytes = Vec::new();
    session.serialize(Some(&root), &mut bytes, None).unwrap();
    let (out, _) = session.deserialize::<Pair>(&bytes).unwrap();
    let out = out.unwrap();
    assert!(out.borrow().left.is_none());
    assert!(out.borrow().right.is_some());
}

#[test]
fn disabled_preservation_duplicates_shared_subgraphs() {
    let mut session =
        Amber::default().reference_preservation(ReferencePreservation::DoNotPreserve);
    session.register::<Leaf>().unwrap();
    session.register::<Pair>().unwrap();

    let shared = leaf(9);
    let root = handle(Pair {
        left: Some(shared.clone()),
        right: Some(shared),
    });
    let mut bytes = Vec::new();
    session.serialize(Some(&root), &mut bytes, None).unwrap();

    let (out, _) = session.deserialize::<Pair>(&bytes).unwrap();
    let out = out.unwrap();
    let left = out.borrow().left.clone().unwrap();
    let right = out.borrow().right.clone().unwrap();
    // Without preservation the two paths materialise two instances.
    assert_ne!(handle_ptr(&left), handle_ptr(&right));
    assert_eq!(downcast::<Leaf>(left).unwrap().borrow().value, 9);
    assert_eq!(downcast::<Leaf>(right).unwrap().borrow().value, 9);
}

#[test]
fn disabled_preservation_rejects_cycles() {
    let mut session =
        Amber::default().reference_preservation(ReferencePreservation::DoNotPreserve);
    session.register::<Node>().unwrap();

    let a = node(1, None);
    let b = node(2, Some(a.clone()));
    downcast::<Node>(a.clone()).unwrap().borrow_mut().next = Some(b);

    let mut bytes = Vec::new();
    let result = session.serialize(Some(&a), &mut bytes, None);
    assert!(matches!(result, Err(Error::InvalidOperation(_))));
}
