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

//! The session type registry.
//!
//! Every record type that can appear in a graph is registered up front; the
//! registry owns the type's layout and its shell constructor and binds
//! stream-side type names back to local types, honouring the version
//! tolerance for name drift.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::Tolerance;
use crate::error::Error;
use crate::meta::{base_name, TypeLayout};
use crate::value::{handle, runtime_key, ObjHandle, Record};

/// A registered record type: its layout and shell constructor.
pub struct RegisteredType {
    pub key: TypeId,
    pub layout: Rc<TypeLayout>,
    make_shell: Box<dyn Fn() -> ObjHandle>,
}

impl RegisteredType {
    /// Allocates an instance without running any construction logic beyond
    /// the type's default state; its fields are populated afterwards.
    pub fn make_shell(&self) -> ObjHandle {
        (self.make_shell)()
    }
}

#[derive(Default)]
pub struct TypeRegistry {
    by_key: HashMap<TypeId, Rc<RegisteredType>>,
    by_name: HashMap<String, Rc<RegisteredType>>,
    by_base_name: HashMap<String, Rc<RegisteredType>>,
    aliases: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Record + Default>(&mut self) -> Result<(), Error> {
        let key = TypeId::of::<T>();
        if self.by_key.contains_key(&key) {
            return Err(Error::invalid_operation(
                "record type is already registered",
            ));
        }
        let layout = Rc::new(T::describe());
        if self.by_name.contains_key(layout.name()) {
            return Err(Error::invalid_operation(format!(
                "type name {} is already registered",
                layout.name()
            )));
        }
        let entry = Rc::new(RegisteredType {
            key,
            layout: layout.clone(),
            make_shell: Box::new(|| handle(T::default())),
        });
        self.by_key.insert(key, entry.clone());
        self.by_base_name
            .entry(base_name(layout.name()).to_owned())
            .or_insert_with(|| entry.clone());
        self.by_name.insert(layout.name().to_owned(), entry);
        Ok(())
    }

    /// Binds an old stream-side type name to a registered local type, for use
    /// with the type-name-change tolerance.
    pub fn alias(&mut self, stream_name: &str, local_name: &str) {
        self.aliases
            .insert(stream_name.to_owned(), local_name.to_owned());
    }

    pub fn lookup_key(&self, key: TypeId) -> Result<Rc<RegisteredType>, Error> {
        self.by_key.get(&key).cloned().ok_or_else(|| {
            Error::invalid_operation("object type is not registered with this session")
        })
    }

    pub fn lookup_handle(&self, obj: &ObjHandle) -> Result<Rc<RegisteredType>, Error> {
        self.lookup_key(runtime_key(obj))
    }

    /// Resolves a stream-side type name against the local registry:
    /// exact name, then the version-insensitive name, then an alias.
    pub fn bind(&self, stream_name: &str, tolerance: Tolerance) -> Result<Rc<RegisteredType>, Error> {
        if let Some(entry) = self.by_name.get(stream_name) {
            return Ok(entry.clone());
        }
        if tolerance.allows(Tolerance::MODULE_VERSION_CHANGE) {
            if let Some(entry) = self.by_base_name.get(base_name(stream_name)) {
                return Ok(entry.clone());
            }
        }
        if tolerance.allows(Tolerance::TYPE_NAME_CHANGE) {
            if let Some(local_name) = self.aliases.get(stream_name) {
                if let Some(entry) = self.by_name.get(local_name) {
                    return Ok(entry.clone());
                }
            }
        }
        Err(Error::type_structure_changed(format!(
            "stream type {} does not bind to any registered type",
            stream_name
        )))
    }
}

/// Shared, interiorly mutable registry handle used by sessions and their
/// open writers/readers.
pub type SharedRegistry = Rc<RefCell<TypeRegistry>>;
