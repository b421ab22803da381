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

//! Object identity tables.
//!
//! The writer table maps object addresses to monotonically assigned ids and
//! queues first-sighted objects for emission in id order. The reader table is
//! the inverse: an id-indexed slot vector that may hold unpopulated shells
//! before their definitions arrive.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use crate::error::Error;
use crate::value::{handle_ptr, ObjHandle, Record};

enum Pin {
    Strong(#[allow(dead_code)] ObjHandle),
    Weak(Weak<RefCell<dyn Record>>),
}

/// Writer-side object → id table with the id-ordered traversal queue.
#[derive(Default)]
pub struct WriteRefTable {
    ids: HashMap<usize, u32>,
    pins: Vec<Pin>,
    queue: VecDeque<(u32, ObjHandle)>,
    next_id: u32,
    weak_mode: bool,
}

impl WriteRefTable {
    pub fn new(weak_mode: bool) -> Self {
        WriteRefTable {
            weak_mode,
            ..Default::default()
        }
    }

    /// Returns the id for an object, assigning the next id and enqueueing the
    /// object on first sight. Identity is referential only.
    pub fn assign_or_fetch(&mut self, obj: &ObjHandle) -> (u32, bool) {
        let ptr = handle_ptr(obj);
        if let Some(&id) = self.ids.get(&ptr) {
            if self.id_is_live(id) {
                return (id, false);
            }
            // The pinned-weak object died and this address was reused; the
            // stale entry must not alias the newcomer.
            self.ids.remove(&ptr);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(ptr, id);
        self.pins.push(if self.weak_mode {
            Pin::Weak(Rc::downgrade(obj))
        } else {
            Pin::Strong(obj.clone())
        });
        self.queue.push_back((id, obj.clone()));
        (id, true)
    }

    fn id_is_live(&self, id: u32) -> bool {
        match &self.pins[id as usize] {
            Pin::Strong(_) => true,
            Pin::Weak(w) => w.strong_count() > 0,
        }
    }

    /// Dequeues the next object awaiting emission, in id order.
    pub fn take_next_unwritten(&mut self) -> Option<(u32, ObjHandle)> {
        self.queue.pop_front()
    }
}

/// Reader-side id → object table.
#[derive(Default)]
pub struct ReadRefTable {
    slots: Vec<Option<ObjHandle>>,
}

impl ReadRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// One past the highest id ever mentioned.
    pub fn high_water(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Stores the shell allocated for an id; legal once per id.
    pub fn reserve(&mut self, id: u32, obj: ObjHandle) -> Result<(), Error> {
        let idx = id as usize;
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, || None);
        }
        if self.slots[idx].is_some() {
            return Err(Error::stream_corrupted(format!(
                "object id {} defined twice",
                id
            )));
        }
        self.slots[idx] = Some(obj);
        Ok(())
    }

    /// Returns the instance behind an id, populated or shell.
    pub fn resolve(&self, id: u32) -> Result<ObjHandle, Error> {
        self.slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or_else(|| {
                Error::stream_corrupted(format!(
                    "reference id {} beyond the high-water mark {}",
                    id,
                    self.slots.len()
                ))
            })
    }

    /// Swaps the instance at an id, used when a surrogate is restored.
    pub fn replace(&mut self, id: u32, obj: ObjHandle) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = Some(obj);
        }
    }
}
