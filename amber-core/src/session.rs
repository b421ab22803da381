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

//! The session facade.
//!
//! An [`Amber`] session owns the settings, the type registry, the two
//! surrogate registries and the event hooks. It offers a one-shot mode
//! (`serialize`/`deserialize`, framing a single root with the stream header
//! and an optional metadata block) and an open-stream mode (`writer`/
//! `reader` handles that share reference and type tables across repeated
//! roots). Every registration gate closes when the session is first used.
//!
//! Sessions are single-threaded and synchronous: no handle may be shared
//! across threads or entered re-entrantly, and hook handlers must not
//! re-enter the session.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::buffer::{Reader, Writer};
use crate::config::{Backend, ReferencePreservation, Settings, Tolerance};
use crate::ensure;
use crate::error::Error;
use crate::meta::TypeLayout;
use crate::reader::GraphReader;
use crate::resolver::registry::{SharedRegistry, TypeRegistry};
use crate::resolver::surrogate::{SharedSurrogates, SurrogateRegistry, SwapFn};
use crate::value::{ObjHandle, Record};
use crate::writer::GraphWriter;

/// First three bytes of every stream.
pub const MAGIC: [u8; 3] = [0x32, 0x66, 0x34];

/// Format version this engine reads and writes.
pub const VERSION: u8 = 9;

/// Upper bound of the one-shot metadata payload.
pub const MAX_METADATA_LEN: usize = 255;

/// A caller-registered event hook. Errors raised by a hook propagate out of
/// the session call unchanged.
pub type HookFn = Rc<dyn Fn(&ObjHandle) -> Result<(), Error>>;

#[derive(Clone, Default)]
pub struct Hooks {
    pub pre_save: Vec<HookFn>,
    pub post_save: Vec<HookFn>,
    pub post_load: Vec<HookFn>,
}

/// Discriminated result of an attempted read, for callers that prefer
/// classification over raised errors.
#[derive(Debug)]
pub enum StreamOutcome<T> {
    Ok(T),
    WrongMagic,
    WrongVersion,
    WrongStreamConfiguration,
    MetadataCorrupted,
    StreamCorrupted,
    TypeStructureChanged,
}

impl<T> StreamOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, StreamOutcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            StreamOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    pub fn from_error(error: &Error) -> StreamOutcome<T> {
        match error {
            Error::WrongMagic => StreamOutcome::WrongMagic,
            Error::WrongVersion { .. } => StreamOutcome::WrongVersion,
            Error::WrongStreamConfiguration(_) => StreamOutcome::WrongStreamConfiguration,
            Error::MetadataCorrupted(_) => StreamOutcome::MetadataCorrupted,
            Error::TypeStructureChanged(_) => StreamOutcome::TypeStructureChanged,
            _ => StreamOutcome::StreamCorrupted,
        }
    }
}

/// A serialization session.
///
/// ```
/// use amber_core::session::Amber;
/// use amber_core::config::Tolerance;
///
/// let mut session = Amber::default()
///     .version_tolerance(Tolerance::FIELD_ADDITION | Tolerance::FIELD_REMOVAL);
/// // session.register::<MyRecord>()?;
/// ```
pub struct Amber {
    settings: Settings,
    registry: SharedRegistry,
    to_surrogate: SharedSurrogates,
    from_surrogate: SharedSurrogates,
    hooks: Hooks,
    write_used: Cell<bool>,
    read_used: Cell<bool>,
}

impl Default for Amber {
    fn default() -> Self {
        Amber {
            settings: Settings::default(),
            registry: Rc::new(RefCell::new(TypeRegistry::new())),
            to_surrogate: Rc::new(RefCell::new(SurrogateRegistry::new())),
            from_surrogate: Rc::new(RefCell::new(SurrogateRegistry::new())),
            hooks: Hooks::default(),
            write_used: Cell::new(false),
            read_used: Cell::new(false),
        }
    }
}

impl Amber {
    pub fn reference_preservation(mut self, mode: ReferencePreservation) -> Self {
        self.settings.reference_preservation = mode;
        self
    }

    pub fn version_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.settings.version_tolerance = tolerance;
        self
    }

    /// Omits layout payloads from the stream; the graph is then restricted
    /// to a single record type, re-synthesised from the declared root type
    /// on read.
    pub fn disable_type_stamping(mut self, disable: bool) -> Self {
        self.settings.disable_type_stamping = disable;
        self
    }

    /// Builds and checks the full field map even when fingerprints match.
    pub fn force_layout_verification(mut self, force: bool) -> Self {
        self.settings.force_layout_verification = force;
        self
    }

    pub fn use_buffering(mut self, buffering: bool) -> Self {
        self.settings.use_buffering = buffering;
        self
    }

    /// Treat a corrupt or absent metadata block as an error instead of
    /// rewinding past it.
    pub fn require_metadata(mut self, require: bool) -> Self {
        self.settings.require_metadata = require;
        self
    }

    pub fn write_backend(mut self, backend: Backend) -> Self {
        self.settings.write_backend = backend;
        self
    }

    pub fn read_backend(mut self, backend: Backend) -> Self {
        self.settings.read_backend = backend;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn ensure_unused(&self) -> Result<(), Error> {
        if self.write_used.get() || self.read_used.get() {
            return Err(Error::invalid_operation(
                "type registration after the session was first used",
            ));
        }
        Ok(())
    }

    /// Registers a record type. Registration is only legal before the
    /// session's first serialisation or deserialisation.
    pub fn register<T: Record + Default>(&mut self) -> Result<(), Error> {
        self.ensure_unused()?;
        self.registry.borrow_mut().register::<T>()
    }

    /// Binds an old stream-side type name to a registered local type; only
    /// consulted under the type-name-change tolerance.
    pub fn alias(&mut self, stream_name: &str, local_name: &str) -> Result<(), Error> {
        self.ensure_unused()?;
        self.registry.borrow_mut().alias(stream_name, local_name);
        Ok(())
    }

    /// Substitutes objects of type `T` at write time.
    pub fn surrogate_for<T: Record>(
        &mut self,
        swap: impl Fn(&ObjHandle) -> Result<ObjHandle, Error> + 'static,
    ) -> Result<(), Error> {
        self.to_surrogate.borrow_mut().register::<T>(Rc::new(swap))
    }

    /// Explicit null registration: objects of type `T` are never
    /// substituted, even when a base or family registration would apply.
    pub fn block_surrogate_for<T: Record>(&mut self) -> Result<(), Error> {
        self.to_surrogate.borrow_mut().block::<T>()
    }

    /// Substitutes every object whose base chain contains the named type.
    pub fn surrogate_for_base(
        &mut self,
        base: &str,
        swap: impl Fn(&ObjHandle) -> Result<ObjHandle, Error> + 'static,
    ) -> Result<(), Error> {
        self.to_surrogate
            .borrow_mut()
            .register_for_base(base, Rc::new(swap))
    }

    /// Open-template substitution: the factory synthesises a callback per
    /// concrete layout carrying the family name.
    pub fn surrogate_family(
        &mut self,
        family: &str,
        factory: impl Fn(&TypeLayout) -> SwapFn + 'static,
    ) -> Result<(), Error> {
        self.to_surrogate
            .borrow_mut()
            .register_family(family, Rc::new(factory))
    }

    /// Restores objects of surrogate type `T` at read time.
    pub fn restore_for<T: Record>(
        &mut self,
        restore: impl Fn(&ObjHandle) -> Result<ObjHandle, Error> + 'static,
    ) -> Result<(), Error> {
        self.from_surrogate
            .borrow_mut()
            .register::<T>(Rc::new(restore))
    }

    pub fn block_restore_for<T: Record>(&mut self) -> Result<(), Error> {
        self.from_surrogate.borrow_mut().block::<T>()
    }

    pub fn restore_for_base(
        &mut self,
        base: &str,
        restore: impl Fn(&ObjHandle) -> Result<ObjHandle, Error> + 'static,
    ) -> Result<(), Error> {
        self.from_surrogate
            .borrow_mut()
            .register_for_base(base, Rc::new(restore))
    }

    pub fn restore_family(
        &mut self,
        family: &str,
        factory: impl Fn(&TypeLayout) -> SwapFn + 'static,
    ) -> Result<(), Error> {
        self.from_surrogate
            .borrow_mut()
            .register_family(family, Rc::new(factory))
    }

    /// Fires once per unique reference, immediately before its body.
    pub fn on_pre_save(&mut self, hook: impl Fn(&ObjHandle) -> Result<(), Error> + 'static) {
        self.hooks.pre_save.push(Rc::new(hook));
    }

    /// Fires immediately after an object's body, in definition order.
    pub fn on_post_save(&mut self, hook: impl Fn(&ObjHandle) -> Result<(), Error> + 'static) {
        self.hooks.post_save.push(Rc::new(hook));
    }

    /// Fires after the entire graph is populated, in id order.
    pub fn on_post_load(&mut self, hook: impl Fn(&ObjHandle) -> Result<(), Error> + 'static) {
        self.hooks.post_load.push(Rc::new(hook));
    }

    /// One-shot write: header, optional metadata block, a single root,
    /// flush. Returns the number of bytes produced.
    pub fn serialize<W: Write>(
        &self,
        root: Option<&ObjHandle>,
        sink: W,
        metadata: Option<&[u8]>,
    ) -> Result<u64, Error> {
        let mut writer = self.writer_with_metadata(sink, metadata)?;
        writer.write_object(root)?;
        writer.flush()?;
        Ok(writer.position())
    }

    /// Open-stream write handle sharing this session's tables.
    pub fn writer<W: Write>(&self, sink: W) -> Result<OpenWriter<W>, Error> {
        self.writer_with_metadata(sink, None)
    }

    fn writer_with_metadata<W: Write>(
        &self,
        sink: W,
        metadata: Option<&[u8]>,
    ) -> Result<OpenWriter<W>, Error> {
        if let Some(meta) = metadata {
            ensure!(
                !meta.is_empty() && meta.len() <= MAX_METADATA_LEN,
                Error::argument_out_of_range(format!(
                    "metadata must be 1..={} bytes, got {}",
                    MAX_METADATA_LEN,
                    meta.len()
                ))
            );
        }
        self.write_used.set(true);
        self.to_surrogate.borrow_mut().seal();
        let mut inner = GraphWriter::new(
            sink,
            self.settings.clone(),
            self.registry.clone(),
            self.to_surrogate.clone(),
            self.hooks.clone(),
        );
        write_header(inner.buffer_mut(), &self.settings);
        if let Some(meta) = metadata {
            write_metadata_block(inner.buffer_mut(), meta);
        }
        Ok(OpenWriter { inner })
    }

    /// One-shot read of a single root plus the optional metadata block.
    /// Asserts byte conservation: the root must consume the stream exactly.
    pub fn deserialize<T: Record>(
        &self,
        bytes: &[u8],
    ) -> Result<(Option<Rc<RefCell<T>>>, Option<Vec<u8>>), Error> {
        let mut reader = self.reader(bytes)?;
        let root = reader.read_root::<T>()?;
        ensure!(
            reader.consumed() == bytes.len(),
            Error::invalid_operation(format!(
                "root consumed {} of {} stream bytes",
                reader.consumed(),
                bytes.len()
            ))
        );
        let metadata = reader.take_metadata();
        Ok((root, metadata))
    }

    /// Like [`deserialize`](Self::deserialize), but classifies failures
    /// instead of raising them.
    pub fn try_deserialize<T: Record>(
        &self,
        bytes: &[u8],
    ) -> StreamOutcome<(Option<Rc<RefCell<T>>>, Option<Vec<u8>>)> {
        match self.deserialize::<T>(bytes) {
            Ok(v) => StreamOutcome::Ok(v),
            Err(e) => StreamOutcome::from_error(&e),
        }
    }

    /// Open-stream read handle over a byte slice. Validates the header and
    /// pulls the metadata block eagerly.
    pub fn reader<'bf>(&self, bytes: &'bf [u8]) -> Result<OpenReader<'bf>, Error> {
        self.read_used.set(true);
        self.from_surrogate.borrow_mut().seal();
        let mut rd = Reader::new(bytes);
        validate_header(&mut rd, &self.settings)?;
        let metadata = read_metadata_block(&mut rd, self.settings.require_metadata)?;
        let inner = GraphReader::new(
            rd,
            self.settings.clone(),
            self.registry.clone(),
            self.from_surrogate.clone(),
            self.hooks.clone(),
        );
        Ok(OpenReader { inner, metadata })
    }
}

fn write_header(buf: &mut Writer, settings: &Settings) {
    buf.write_bytes(&MAGIC);
    buf.write_u8(VERSION);
    buf.write_u8(settings.preserves_references() as u8);
    buf.write_u8(!settings.disable_type_stamping as u8);
}

fn xor_checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

fn write_metadata_block(buf: &mut Writer, metadata: &[u8]) {
    buf.write_u8(metadata.len() as u8);
    buf.write_bytes(metadata);
    buf.write_u8(xor_checksum(metadata));
}

fn validate_header(rd: &mut Reader, settings: &Settings) -> Result<(), Error> {
    let magic = rd.read_bytes(3)?;
    if magic != MAGIC.as_slice() {
        return Err(Error::wrong_magic());
    }
    let version = rd.read_u8()?;
    if version != VERSION {
        // The cursor deliberately stops right after the magic + version.
        return Err(Error::wrong_version(VERSION, version));
    }
    let refs_flag = rd.read_u8()?;
    let stamping_flag = rd.read_u8()?;
    if refs_flag > 1 || stamping_flag > 1 {
        return Err(Error::stream_corrupted("header flag byte out of range"));
    }
    if (refs_flag == 1) != settings.preserves_references() {
        return Err(Error::wrong_stream_configuration(
            "stream and session disagree on reference preservation",
        ));
    }
    if (stamping_flag == 1) == settings.disable_type_stamping {
        return Err(Error::wrong_stream_configuration(
            "stream and session disagree on type stamping",
        ));
    }
    Ok(())
}

/// Reads the optional metadata block. Any corruption (including the
/// length-0 quirk) rewinds the cursor and treats the block as absent,
/// unless the caller required metadata.
fn read_metadata_block(rd: &mut Reader, required: bool) -> Result<Option<Vec<u8>>, Error> {
    let start = rd.cursor();
    let len = match rd.read_u8() {
        Ok(len) => len as usize,
        Err(_) => {
            if required {
                return Err(Error::metadata_corrupted(
                    "stream ends before the metadata block",
                ));
            }
            rd.set_cursor(start);
            return Ok(None);
        }
    };
    if len == 0 || rd.remaining() < len + 1 {
        if required {
            return Err(Error::metadata_corrupted(if len == 0 {
                "metadata block with length 0"
            } else {
                "metadata block truncated"
            }));
        }
        rd.set_cursor(start);
        return Ok(None);
    }
    let payload = rd.read_bytes(len)?.to_vec();
    let checksum = rd.read_u8()?;
    if checksum != xor_checksum(&payload) {
        if required {
            return Err(Error::metadata_corrupted("metadata checksum mismatch"));
        }
        rd.set_cursor(start);
        return Ok(None);
    }
    Ok(Some(payload))
}

/// Open-stream write handle: repeated roots share one reference table and
/// one type table, so consecutive writes deduplicate shared subgraphs.
pub struct OpenWriter<W: Write> {
    inner: GraphWriter<W>,
}

impl<W: Write> OpenWriter<W> {
    pub fn write_object(&mut self, root: Option<&ObjHandle>) -> Result<(), Error> {
        self.inner.write_object(root)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.inner.flush()
    }

    /// Total bytes produced so far, staged or committed.
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    /// Rebinds the sink, preserving the reference and type tables. A fresh
    /// header is emitted for the new stream; the old sink is flushed and
    /// returned.
    pub fn reuse_with_new_stream(&mut self, sink: W) -> Result<W, Error> {
        let old = self.inner.reuse_with_new_stream(sink)?;
        let settings = self.inner.settings().clone();
        write_header(self.inner.buffer_mut(), &settings);
        Ok(old)
    }
}

/// Open-stream read handle mirroring [`OpenWriter`].
pub struct OpenReader<'bf> {
    inner: GraphReader<'bf>,
    metadata: Option<Vec<u8>>,
}

impl<'bf> OpenReader<'bf> {
    pub fn read_root<T: Record>(&mut self) -> Result<Option<Rc<RefCell<T>>>, Error> {
        self.inner.read_root::<T>()
    }

    /// Lazily yields roots until end-of-stream. Requires buffering disabled.
    pub fn read_many<T: Record>(&mut self) -> Result<ReadMany<'_, 'bf, T>, Error> {
        ensure!(
            !self.inner.settings().use_buffering,
            Error::invalid_operation("lazy root iteration requires buffering disabled")
        );
        Ok(ReadMany {
            reader: self,
            done: false,
            _marker: PhantomData,
        })
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    pub fn take_metadata(&mut self) -> Option<Vec<u8>> {
        self.metadata.take()
    }

    /// The failure that stopped the previous root read, left inspectable.
    pub fn last_error(&self) -> Option<&Error> {
        self.inner.last_error()
    }

    pub fn consumed(&self) -> usize {
        self.inner.consumed()
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining()
    }

    /// Rebinds to a new byte slice, revalidating its header; the reference
    /// and type tables persist.
    pub fn reuse_with_new_stream(&mut self, bytes: &'bf [u8]) -> Result<(), Error> {
        let settings = self.inner.settings().clone();
        let mut rd = Reader::new(bytes);
        validate_header(&mut rd, &settings)?;
        self.metadata = read_metadata_block(&mut rd, settings.require_metadata)?;
        self.inner.rebind(rd);
        Ok(())
    }
}

/// Iterator over the remaining roots of an open reader.
pub struct ReadMany<'r, 'bf, T: Record> {
    reader: &'r mut OpenReader<'bf>,
    done: bool,
    _marker: PhantomData<T>,
}

impl<T: Record> Iterator for ReadMany<'_, '_, T> {
    type Item = Result<Option<Rc<RefCell<T>>>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.remaining() == 0 {
            return None;
        }
        match self.reader.read_root::<T>() {
            Ok(root) => Some(Ok(root)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
