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

//! # Amber
//!
//! A binary object-graph serializer with version tolerance and reference
//! preservation. Amber converts an in-memory object graph (acyclic or
//! cyclic, with shared references, collections and user-defined record
//! types) into a compact self-describing byte stream, and reconstructs an
//! equivalent graph from that stream, including across versions where type
//! definitions have drifted.
//!
//! ## Usage
//!
//! Types implement [`Record`], registering a structural layout and exposing
//! their fields through the uniform [`Value`] carrier; a session then
//! drives the round trip:
//!
//! ```rust,ignore
//! use amber::{Amber, FieldKind, Record, TypeLayout, Value};
//!
//! let mut session = Amber::default();
//! session.register::<Point>()?;
//!
//! let mut bytes = Vec::new();
//! session.serialize(Some(&amber::handle(Point { x: 1, y: 2 })), &mut bytes, None)?;
//! let (point, _meta) = session.deserialize::<Point>(&bytes)?;
//! ```
//!
//! Shared identity round-trips: if two paths into the graph reach the same
//! object, the two paths in the reconstructed graph reach the same object,
//! and cycles re-materialise through shell allocation.

pub use amber_core::collection::{classify, element_kind, entry_kinds, is_sealed, CollectionKind};
pub use amber_core::config::{Backend, ReferencePreservation, Settings, Tolerance};
pub use amber_core::error::Error;
pub use amber_core::meta::{BaseRef, FieldLayout, TypeLayout, TypeLayoutBuilder};
pub use amber_core::resolver::surrogate::{SwapFn, TemplateFactory};
pub use amber_core::session::{
    Amber, HookFn, Hooks, OpenReader, OpenWriter, ReadMany, StreamOutcome, MAGIC,
    MAX_METADATA_LEN, VERSION,
};
pub use amber_core::types::{Decimal, FieldKind, KindTag, TimeKind};
pub use amber_core::value::{
    downcast, handle, handle_ptr, InvocationSlot, ObjHandle, Record, Value,
};
