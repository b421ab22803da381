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

//! Session settings shared by the writer and reader state machines.

use std::ops::BitOr;

/// How shared references are treated during a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReferencePreservation {
    /// References are written inline recursively; shared subgraphs duplicate
    /// and cyclic input is rejected.
    DoNotPreserve,
    /// Every distinct object is written once and referenced by id afterwards.
    #[default]
    Preserve,
    /// Like `Preserve`, but the writer does not extend object lifetimes: an
    /// object dropped by the caller mid-session frees its table entry, and a
    /// later object reusing its address is assigned a fresh id.
    UseWeakReference,
}

/// Engine used to drive field access. `Generated` is accepted for
/// compatibility and behaves identically to `Reflection`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Reflection,
    Generated,
}

/// Bitset of permitted layout differences between the stream-side and the
/// local definition of a type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tolerance(u8);

impl Tolerance {
    pub const NONE: Tolerance = Tolerance(0);
    /// A local field may be absent from the stream (left at its default).
    pub const FIELD_ADDITION: Tolerance = Tolerance(1);
    /// A stream field may be absent locally (decoded and discarded).
    pub const FIELD_REMOVAL: Tolerance = Tolerance(1 << 1);
    /// A field may have moved between a base and the declaring type.
    pub const FIELD_MOVE: Tolerance = Tolerance(1 << 2);
    /// Type names may differ in their `@version` suffix.
    pub const MODULE_VERSION_CHANGE: Tolerance = Tolerance(1 << 3);
    /// The 16-byte module tags may differ.
    pub const MODULE_TAG_CHANGE: Tolerance = Tolerance(1 << 4);
    /// A stream type name may bind to a local type through an alias.
    pub const TYPE_NAME_CHANGE: Tolerance = Tolerance(1 << 5);
    pub const ALL: Tolerance = Tolerance(0b111111);

    pub fn allows(self, flag: Tolerance) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for Tolerance {
    type Output = Tolerance;

    fn bitor(self, rhs: Tolerance) -> Tolerance {
        Tolerance(self.0 | rhs.0)
    }
}

/// All settings recognised by a session.
#[derive(Clone, Debug)]
pub struct Settings {
    pub reference_preservation: ReferencePreservation,
    pub version_tolerance: Tolerance,
    /// Omit layout payloads; restricts the stream to a single record type.
    pub disable_type_stamping: bool,
    /// Build and check the full field map even when fingerprints match.
    pub force_layout_verification: bool,
    /// Stage bytes until an explicit flush instead of flushing every root.
    pub use_buffering: bool,
    /// Treat a corrupt or absent metadata block as an error instead of
    /// rewinding past it.
    pub require_metadata: bool,
    pub write_backend: Backend,
    pub read_backend: Backend,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            reference_preservation: ReferencePreservation::Preserve,
            version_tolerance: Tolerance::NONE,
            disable_type_stamping: false,
            force_layout_verification: false,
            use_buffering: true,
            require_metadata: false,
            write_backend: Backend::Reflection,
            read_backend: Backend::Reflection,
        }
    }
}

impl Settings {
    pub fn preserves_references(&self) -> bool {
        !matches!(
            self.reference_preservation,
            ReferencePreservation::DoNotPreserve
        )
    }
}
