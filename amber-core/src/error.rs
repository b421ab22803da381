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

//! Failure taxonomy of the serializer.
//!
//! Every failure a session can surface maps to exactly one variant here.
//! Variants are created through the static constructor functions, which
//! accept anything convertible into a `Cow<'static, str>` so call sites can
//! pass either a literal or a formatted message without extra `.into()`
//! noise.

use std::borrow::Cow;

use thiserror::Error;

/// Error type for all serialization and deserialization operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The first three header bytes are not the expected magic.
    #[error("stream does not start with the expected magic bytes")]
    WrongMagic,

    /// The header version byte does not match this engine.
    #[error("stream version {found} is not supported (expected {expected})")]
    WrongVersion { expected: u8, found: u8 },

    /// The stream was produced with different reference-preservation or
    /// type-stamping flags than the reading session permits.
    #[error("{0}")]
    WrongStreamConfiguration(Cow<'static, str>),

    /// The optional metadata block has an invalid length or checksum and the
    /// caller required metadata to be present.
    #[error("{0}")]
    MetadataCorrupted(Cow<'static, str>),

    /// A primitive decode crossed end-of-stream.
    #[error("{0}")]
    StreamTruncated(Cow<'static, str>),

    /// A decoded value violates a stream invariant (varint overflow, id past
    /// the high-water mark, negative count, malformed UTF-8, ...).
    #[error("{0}")]
    StreamCorrupted(Cow<'static, str>),

    /// Layout reconciliation failed under the configured version tolerance.
    #[error("{0}")]
    TypeStructureChanged(Cow<'static, str>),

    /// An operation that is illegal in the current session state, e.g.
    /// registration after first use or a byte-count mismatch.
    #[error("{0}")]
    InvalidOperation(Cow<'static, str>),

    /// A caller-supplied argument is outside its permitted range.
    #[error("{0}")]
    ArgumentOutOfRange(Cow<'static, str>),

    /// The underlying sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[cold]
    #[track_caller]
    pub fn wrong_magic() -> Self {
        Error::WrongMagic
    }

    #[cold]
    #[track_caller]
    pub fn wrong_version(expected: u8, found: u8) -> Self {
        Error::WrongVersion { expected, found }
    }

    #[cold]
    #[track_caller]
    pub fn wrong_stream_configuration<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Error::WrongStreamConfiguration(s.into())
    }

    #[cold]
    #[track_caller]
    pub fn metadata_corrupted<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Error::MetadataCorrupted(s.into())
    }

    #[cold]
    #[track_caller]
    pub fn stream_truncated<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Error::StreamTruncated(s.into())
    }

    #[cold]
    #[track_caller]
    pub fn stream_corrupted<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Error::StreamCorrupted(s.into())
    }

    #[cold]
    #[track_caller]
    pub fn type_structure_changed<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Error::TypeStructureChanged(s.into())
    }

    #[cold]
    #[track_caller]
    pub fn invalid_operation<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Error::InvalidOperation(s.into())
    }

    #[cold]
    #[track_caller]
    pub fn argument_out_of_range<S: Into<Cow<'static, str>>>(s: S) -> Self {
        Error::ArgumentOutOfRange(s.into())
    }
}

// `io::Error` is not `Clone`; rebuild it from its kind and rendered message
// so sessions can retain the last failure for inspection.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::WrongMagic => Error::WrongMagic,
            Error::WrongVersion { expected, found } => Error::WrongVersion {
                expected: *expected,
                found: *found,
            },
            Error::WrongStreamConfiguration(s) => Error::WrongStreamConfiguration(s.clone()),
            Error::MetadataCorrupted(s) => Error::MetadataCorrupted(s.clone()),
            Error::StreamTruncated(s) => Error::StreamTruncated(s.clone()),
            Error::StreamCorrupted(s) => Error::StreamCorrupted(s.clone()),
            Error::TypeStructureChanged(s) => Error::TypeStructureChanged(s.clone()),
            Error::InvalidOperation(s) => Error::InvalidOperation(s.clone()),
            Error::ArgumentOutOfRange(s) => Error::ArgumentOutOfRange(s.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

/// Ensures a condition holds; otherwise returns the given [`enum@Error`].
///
/// ```
/// use amber_core::ensure;
/// use amber_core::error::Error;
///
/// fn check(n: i32) -> Result<(), Error> {
///     ensure!(n > 0, Error::argument_out_of_range("value must be positive"));
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

/// Returns early with the given [`enum@Error`].
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($err)
    };
}
