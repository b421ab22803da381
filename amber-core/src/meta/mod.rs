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

//! Structural type metadata: layouts, their wire form, fingerprints and
//! cross-version reconciliation.

mod layout;
mod murmur;

pub use layout::{
    reconcile, BaseRef, FieldLayout, FieldMap, PlannedField, TypeLayout, TypeLayoutBuilder,
};
pub use murmur::murmurhash3_x64_128;

/// Strips the optional `@version` suffix from a fully-qualified type name.
pub fn base_name(name: &str) -> &str {
    match name.split_once('@') {
        Some((base, _)) => base,
        None => name,
    }
}
