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

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::array::ArrayObj;
use crate::map::MapObj;
use crate::ndarray::NDArrayContainer;
use crate::object::{IsObjectRef, Object, ObjectPtr, ObjectRef};
use crate::shape_tuple::ShapeTupleObj;
use crate::string::StringObj;
use crate::{type_context, RetValue};

use super::{collect_attrs, vtable, SEqualKind};

fn hash_combine(key: u64, value: u64) -> u64 {
    key ^ (value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(key << 6)
        .wrapping_add(key >> 2))
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

struct SHashHandler {
    map_free_vars: bool,
    memo: HashMap<*const Object, u64>,
    free_var_counter: u64,
}

impl SHashHandler {
    fn value(&mut self, value: &RetValue, is_def: bool) -> u64 {
        if let Some(object) = value.as_object() {
            return self.object(object, is_def);
        }
        let code = value.type_code() as u64;
        let payload = match value {
            RetValue::Int(v) => hash_of(v),
            RetValue::Bool(v) => hash_of(v),
            // equality allows a small tolerance; hash at the same scale
            RetValue::Float(v) => hash_of(&((v / crate::config::FLOAT_EQUAL_ATOL).round() as i64)),
            RetValue::Str(v) => hash_of(v.as_str()),
            RetValue::Bytes(v) => hash_of(v),
            RetValue::DataType(v) => hash_of(&(v.code, v.bits, v.lanes)),
            RetValue::Device(v) => hash_of(&(v.device_type, v.device_id)),
            RetValue::Handle(v) => hash_of(&(*v as usize)),
            RetValue::DLTensorHandle(v) => hash_of(&(*v as usize)),
            _ => 0,
        };
        hash_combine(code, payload)
    }

    fn object_ref(&mut self, object: &ObjectRef, is_def: bool) -> u64 {
        match &object.0 {
            Some(ptr) => self.object(ptr, is_def),
            None => 0,
        }
    }

    fn object(&mut self, object: &ObjectPtr<Object>, is_def: bool) -> u64 {
        let address = object.as_raw() as *const Object;
        if let Some(&hash) = self.memo.get(&address) {
            return hash;
        }
        let type_hash = type_context::type_index2key_hash(object.type_index()).unwrap_or(0);

        if let Some(entry) = vtable(object.type_index()) {
            let hash = match entry.sequal_kind {
                SEqualKind::FreeVar if self.map_free_vars || is_def => {
                    let hash = hash_combine(type_hash, self.free_var_counter);
                    self.free_var_counter += 1;
                    self.memo.insert(address, hash);
                    return hash;
                }
                SEqualKind::FreeVar => hash_combine(type_hash, hash_of(&(address as usize))),
                _ => self.attrs(object, type_hash),
            };
            if entry.sequal_kind == SEqualKind::GraphNode {
                self.memo.insert(address, hash);
            }
            return hash;
        }

        if let Some(string) = object.downcast_ref::<StringObj>() {
            return hash_combine(type_hash, hash_of(string.as_str()));
        }
        if let Some(shape) = object.downcast_ref::<ShapeTupleObj>() {
            return hash_combine(type_hash, hash_of(shape.as_slice()));
        }
        if let Some(array) = object.downcast_ref::<ArrayObj>() {
            return array
                .as_slice()
                .iter()
                .fold(hash_combine(type_hash, array.as_slice().len() as u64), |acc, elem| {
                    hash_combine(acc, self.object_ref(elem, is_def))
                });
        }
        if let Some(map) = object.downcast_ref::<MapObj>() {
            // order independent
            let entries = map.iter().fold(0u64, |acc, (key, value)| {
                let entry = hash_combine(self.object_ref(key, false), self.object_ref(value, is_def));
                acc.wrapping_add(entry)
            });
            return hash_combine(hash_combine(type_hash, map.len() as u64), entries);
        }
        if object.is_instance::<NDArrayContainer>() {
            if let Ok(array) = object.clone().downcast::<NDArrayContainer>() {
                let array = crate::NDArray::from_ptr(Some(array));
                let dtype = array.dtype();
                let mut hash = hash_combine(type_hash, hash_of(array.shape()));
                hash = hash_combine(hash, hash_of(&(dtype.code(), dtype.bits(), dtype.lanes())));
                return hash_combine(hash, hash_of(array.as_bytes()));
            }
        }
        hash_combine(type_hash, hash_of(&(address as usize)))
    }

    fn attrs(&mut self, object: &ObjectPtr<Object>, type_hash: u64) -> u64 {
        let attrs = match collect_attrs(object) {
            Ok(attrs) => attrs,
            Err(_) => return type_hash,
        };
        attrs.iter().fold(type_hash, |acc, attr| {
            let acc = hash_combine(acc, hash_of(attr.key.as_str()));
            hash_combine(acc, self.value(&attr.value, attr.is_def))
        })
    }
}

/// Hashes an object graph consistently with [`super::structural_equal`].
///
/// Bound free variables hash by the order in which they are defined, so
/// alpha-equivalent graphs hash alike.
pub fn structural_hash(object: &ObjectRef, map_free_vars: bool) -> u64 {
    let mut handler = SHashHandler {
        map_free_vars,
        memo: HashMap::new(),
        free_var_counter: 0,
    };
    handler.object_ref(object, false)
}
