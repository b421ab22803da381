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

//! Surrogate registries.
//!
//! A surrogate substitutes one object for another at write time and is
//! restored at read time; the writer consults an object→surrogate registry,
//! the reader a surrogate→object registry of the same shape. Entries are
//! ordered; lookup prefers an exact type match, then the most-derived
//! registered base, then an open template matched by family name. An entry
//! registered with an explicitly absent callback blocks every more general
//! match. Registries seal on first use; later mutation is an invalid
//! operation.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::meta::TypeLayout;
use crate::value::{ObjHandle, Record};

/// Substitution callback: maps an object to its replacement.
pub type SwapFn = Rc<dyn Fn(&ObjHandle) -> Result<ObjHandle, Error>>;

/// Factory synthesising a substitution callback for one concrete instance of
/// an open template, given that instance's layout.
pub type TemplateFactory = Rc<dyn Fn(&TypeLayout) -> SwapFn>;

enum Matcher {
    Exact(TypeId),
    Base(String),
    Family(String),
}

enum Action {
    Swap(SwapFn),
    Synthesize(TemplateFactory),
    /// Explicit null registration: blocks inheritance from anything more
    /// general.
    Block,
}

struct Entry {
    matcher: Matcher,
    action: Action,
}

#[derive(Default)]
pub struct SurrogateRegistry {
    entries: Vec<Entry>,
    synthesized: RefCell<HashMap<String, SwapFn>>,
    sealed: bool,
}

impl SurrogateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.sealed {
            return Err(Error::invalid_operation(
                "surrogate registration after the session was first used",
            ));
        }
        Ok(())
    }

    /// Flips the registration gate; called on first serialisation or
    /// deserialisation of the owning session.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn register<T: Record>(&mut self, swap: SwapFn) -> Result<(), Error> {
        self.ensure_open()?;
        self.entries.push(Entry {
            matcher: Matcher::Exact(TypeId::of::<T>()),
            action: Action::Swap(swap),
        });
        Ok(())
    }

    /// Registers an explicit null for a concrete type, blocking any base or
    /// family registration from applying to it.
    pub fn block<T: Record>(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.entries.push(Entry {
            matcher: Matcher::Exact(TypeId::of::<T>()),
            action: Action::Block,
        });
        Ok(())
    }

    /// Registers a substitution for every type whose base chain contains the
    /// named type.
    pub fn register_for_base(&mut self, base: &str, swap: SwapFn) -> Result<(), Error> {
        self.ensure_open()?;
        self.entries.push(Entry {
            matcher: Matcher::Base(base.to_owned()),
            action: Action::Swap(swap),
        });
        Ok(())
    }

    /// Registers an open template: the factory is invoked once per concrete
    /// layout carrying the family name, and the synthesised callback is
    /// cached for that layout.
    pub fn register_family(&mut self, family: &str, factory: TemplateFactory) -> Result<(), Error> {
        self.ensure_open()?;
        self.entries.push(Entry {
            matcher: Matcher::Family(family.to_owned()),
            action: Action::Synthesize(factory),
        });
        Ok(())
    }

    /// Finds the substitution for a runtime type, if any. `layout` is the
    /// registered layout of that type when one exists; without it only exact
    /// matches can apply.
    pub fn resolve(&self, key: TypeId, layout: Option<&TypeLayout>) -> Option<SwapFn> {
        // 1. Exact type match wins, first registration first.
        for entry in &self.entries {
            if let Matcher::Exact(k) = &entry.matcher {
                if *k == key {
                    return match &entry.action {
                        Action::Swap(f) => Some(f.clone()),
                        Action::Synthesize(factory) => layout.map(|l| self.synthesize(factory, l)),
                        Action::Block => None,
                    };
                }
            }
        }
        let layout = layout?;
        // 2. Most-derived registered base wins; the base chain is ordered
        //    most-derived first, ties within one base fall to registration
        //    order.
        for base in layout.bases() {
            for entry in &self.entries {
                if let Matcher::Base(name) = &entry.matcher {
                    if name == &base.name {
                        return match &entry.action {
                            Action::Swap(f) => Some(f.clone()),
                            Action::Synthesize(factory) => Some(self.synthesize(factory, layout)),
                            Action::Block => None,
                        };
                    }
                }
            }
        }
        // 3. Open template matched by family name.
        let family = layout.family()?;
        for entry in &self.entries {
            if let Matcher::Family(name) = &entry.matcher {
                if name == family {
                    return match &entry.action {
                        Action::Swap(f) => Some(f.clone()),
                        Action::Synthesize(factory) => Some(self.synthesize(factory, layout)),
                        Action::Block => None,
                    };
                }
            }
        }
        None
    }

    fn synthesize(&self, factory: &TemplateFactory, layout: &TypeLayout) -> SwapFn {
        if let Some(cached) = self.synthesized.borrow().get(layout.name()) {
            return cached.clone();
        }
        let swap = factory(layout);
        self.synthesized
            .borrow_mut()
            .insert(layout.name().to_owned(), swap.clone());
        swap
    }
}

/// Shared, interiorly mutable surrogate registry handle.
pub type SharedSurrogates = Rc<RefCell<SurrogateRegistry>>;
