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

//! # Amber Core
//!
//! Core implementation of the amber object-graph serializer: a compact,
//! self-describing binary format with reference preservation and version
//! tolerance.
//!
//! ## Architecture
//!
//! - **`session`**: the facade: one-shot and open-stream modes, header and
//!   metadata framing, error classification
//! - **`writer`** / **`reader`**: the queue-driven graph traversal state
//!   machines
//! - **`buffer`**: little-endian byte buffer with LEB128 varints
//! - **`meta`**: type layouts, structural fingerprints and cross-version
//!   reconciliation
//! - **`resolver`**: object identity tables, the type registry and the
//!   surrogate registries
//! - **`value`**: the `Record` trait and the uniform field-value carrier
//! - **`collection`**: container classification and framing
//! - **`config`**: session settings
//! - **`types`**: wire tags, decimal layout, tick-count time conversion
//! - **`error`**: the failure taxonomy
//!
//! ## Key concepts
//!
//! Every distinct object is written exactly once and referenced by a
//! stream-local id afterwards, so shared subgraphs and cycles survive a
//! round trip. Each type's structural layout is stamped inline at first
//! use; the reader reconciles it against the locally registered type under
//! a configurable version tolerance, skipping removed fields and
//! defaulting added ones. Surrogates redirect objects to an alternative
//! representation at write time and restore them at read time.
//!
//! The engine is single-threaded and synchronous: sessions and their
//! handles are not `Send`, hold no locks, and block on the caller-supplied
//! stream.

pub mod buffer;
pub mod collection;
pub mod config;
pub mod error;
pub mod meta;
pub mod reader;
pub mod resolver;
pub mod session;
pub mod types;
pub mod value;
pub mod writer;
