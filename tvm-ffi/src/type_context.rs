/*
 * Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

//! The process wide table of object types.
//!
//! Every object type is identified by a string key and a dense `u32` index.
//! The first [`TypeIndex::STATIC_INDEX_END`] indices are reserved for the
//! core runtime types; everything else is handed out on first use. A type
//! may reserve a block of child slots right after its own index so that
//! `is_instance` checks for its subtypes reduce to a range comparison.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::debug;
use once_cell::sync::OnceCell;

use crate::errors::{Error, Result};
use crate::object::IsObject;

/// The statically assigned type indices.
pub struct TypeIndex;

impl TypeIndex {
    pub const ROOT: u32 = 0;
    pub const RUNTIME_MODULE: u32 = 1;
    pub const NDARRAY: u32 = 2;
    pub const STRING: u32 = 3;
    pub const ARRAY: u32 = 4;
    pub const MAP: u32 = 5;
    pub const SHAPE_TUPLE: u32 = 6;
    pub const PACKED_FUNC: u32 = 7;
    pub const STATIC_INDEX_END: u32 = 8;
    /// Requests an index from the dynamic range.
    pub const DYNAMIC: u32 = Self::STATIC_INDEX_END;
}

/// Bookkeeping for a single registered type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub index: u32,
    pub parent_index: u32,
    /// Number of slots reserved for this type and its children.
    pub num_slots: u32,
    /// Number of those slots already handed out, counting the type itself.
    pub allocated_slots: u32,
    pub child_slots_can_overflow: bool,
    pub name: String,
    pub name_hash: u64,
}

impl Default for TypeInfo {
    fn default() -> Self {
        TypeInfo {
            index: 0,
            parent_index: 0,
            num_slots: 0,
            allocated_slots: 0,
            child_slots_can_overflow: true,
            name: String::new(),
            name_hash: 0,
        }
    }
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

pub struct TypeContext {
    type_table: Vec<TypeInfo>,
    type_key2index: HashMap<String, u32>,
    type_counter: u32,
}

lazy_static! {
    static ref TYPE_CONTEXT: Mutex<TypeContext> = Mutex::new(TypeContext::new());
}

impl TypeContext {
    fn new() -> TypeContext {
        let mut type_table = vec![TypeInfo::default(); TypeIndex::STATIC_INDEX_END as usize];
        let root = &mut type_table[TypeIndex::ROOT as usize];
        root.name = crate::object::Object::TYPE_KEY.to_string();
        root.name_hash = hash_key(&root.name);
        root.allocated_slots = 1;
        let mut type_key2index = HashMap::new();
        type_key2index.insert(root.name.clone(), TypeIndex::ROOT);
        TypeContext {
            type_table,
            type_key2index,
            type_counter: TypeIndex::STATIC_INDEX_END,
        }
    }

    fn get_or_alloc(
        &mut self,
        key: &str,
        static_index: u32,
        parent_index: u32,
        num_child_slots: u32,
        mut child_slots_can_overflow: bool,
    ) -> Result<u32> {
        if let Some(&index) = self.type_key2index.get(key) {
            return Ok(index);
        }

        let parent = self
            .type_table
            .get(parent_index as usize)
            .filter(|info| info.index == parent_index && info.allocated_slots != 0)
            .ok_or(Error::TypeIndexNotFound(parent_index))?;
        if !parent.child_slots_can_overflow {
            child_slots_can_overflow = false;
        }

        // the slots include the type itself
        let num_slots = num_child_slots + 1;
        let allocated_index = if static_index != TypeIndex::DYNAMIC {
            let slot = self
                .type_table
                .get(static_index as usize)
                .ok_or(Error::TypeIndexNotFound(static_index))?;
            if slot.allocated_slots != 0 {
                return Err(Error::TypeIndexConflict {
                    index: static_index,
                    existing: slot.name.clone(),
                    requested: key.to_string(),
                });
            }
            static_index
        } else if parent.allocated_slots + num_slots <= parent.num_slots {
            let index = parent_index + parent.allocated_slots;
            self.type_table[parent_index as usize].allocated_slots += num_slots;
            index
        } else {
            if !parent.child_slots_can_overflow {
                return Err(Error::TypeSlotsExhausted(parent.name.clone()));
            }
            let index = self.type_counter;
            self.type_counter += num_slots;
            self.type_table
                .resize(self.type_counter as usize, TypeInfo::default());
            index
        };

        debug_assert!(allocated_index > parent_index);
        self.type_table[allocated_index as usize] = TypeInfo {
            index: allocated_index,
            parent_index,
            num_slots,
            allocated_slots: 1,
            child_slots_can_overflow,
            name: key.to_string(),
            name_hash: hash_key(key),
        };
        self.type_key2index
            .insert(key.to_string(), allocated_index);
        debug!(
            "registered object type `{}` with index {} under parent {}",
            key, allocated_index, parent_index
        );
        Ok(allocated_index)
    }

    fn info(&self, index: u32) -> Result<&TypeInfo> {
        self.type_table
            .get(index as usize)
            .filter(|info| info.allocated_slots != 0)
            .ok_or(Error::TypeIndexNotFound(index))
    }

    fn derived_from(&self, mut child: u32, parent: u32) -> bool {
        if child < parent {
            return false;
        }
        while child > parent {
            match self.type_table.get(child as usize) {
                Some(info) if info.allocated_slots != 0 => child = info.parent_index,
                _ => return false,
            }
        }
        child == parent
    }
}

/// Allocates, or looks up, the runtime index of the type `key`.
///
/// The call is idempotent per key. `static_index` claims a fixed slot below
/// [`TypeIndex::STATIC_INDEX_END`]; pass [`TypeIndex::DYNAMIC`] to have one
/// allocated from the parent's reserved range.
pub fn get_or_alloc_runtime_type_index(
    key: &str,
    static_index: u32,
    parent_index: u32,
    num_child_slots: u32,
    child_slots_can_overflow: bool,
) -> Result<u32> {
    crate::lock(&TYPE_CONTEXT).get_or_alloc(
        key,
        static_index,
        parent_index,
        num_child_slots,
        child_slots_can_overflow,
    )
}

/// Whether `child` is `parent` or one of its descendants.
pub fn derived_from(child: u32, parent: u32) -> bool {
    if child == parent {
        return true;
    }
    crate::lock(&TYPE_CONTEXT).derived_from(child, parent)
}

pub fn type_index2key(index: u32) -> Result<String> {
    crate::lock(&TYPE_CONTEXT)
        .info(index)
        .map(|info| info.name.clone())
}

pub fn type_index2key_hash(index: u32) -> Result<u64> {
    crate::lock(&TYPE_CONTEXT)
        .info(index)
        .map(|info| info.name_hash)
}

pub fn type_key2index(key: &str) -> Result<u32> {
    crate::lock(&TYPE_CONTEXT)
        .type_key2index
        .get(key)
        .copied()
        .ok_or_else(|| Error::TypeKeyNotFound(key.to_string()))
}

pub fn type_info(index: u32) -> Result<TypeInfo> {
    crate::lock(&TYPE_CONTEXT).info(index).map(Clone::clone)
}

/// Registers `T` and all of its ancestors.
pub fn register<T: IsObject>() -> Result<u32> {
    // resolve the parent first, the table lock is not reentrant
    let parent_index = T::parent_type_index();
    get_or_alloc_runtime_type_index(
        T::TYPE_KEY,
        T::STATIC_TYPE_INDEX,
        parent_index,
        T::TYPE_CHILD_SLOTS,
        T::TYPE_CHILD_SLOTS_CAN_OVERFLOW,
    )
}

/// Caches the runtime index of one object type.
pub struct TypeIndexCell(OnceCell<u32>);

impl TypeIndexCell {
    pub const fn new() -> TypeIndexCell {
        TypeIndexCell(OnceCell::new())
    }

    /// Returns the index of `T`, registering it on first use.
    ///
    /// Panics if the type cannot be registered, e.g. because its static
    /// index is taken or its parent ran out of child slots.
    pub fn get_or_register<T: IsObject>(&self) -> u32 {
        *self.0.get_or_init(|| match register::<T>() {
            Ok(index) => index,
            Err(err) => panic!("failed to register object type `{}`: {}", T::TYPE_KEY, err),
        })
    }
}

impl Default for TypeIndexCell {
    fn default() -> Self {
        TypeIndexCell::new()
    }
}
