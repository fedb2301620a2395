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

use std::collections::HashMap;

use crate::array::ArrayObj;
use crate::config::FLOAT_EQUAL_ATOL;
use crate::map::MapObj;
use crate::ndarray::NDArrayContainer;
use crate::object::{IsObjectRef, Object, ObjectPtr, ObjectRef};
use crate::shape_tuple::ShapeTupleObj;
use crate::string::StringObj;
use crate::RetValue;

use super::{collect_attrs, vtable, SEqualKind};

type Address = *const Object;

fn address(object: &ObjectPtr<Object>) -> Address {
    object.as_raw() as Address
}

struct SEqualHandler {
    map_free_vars: bool,
    lhs_to_rhs: HashMap<Address, ObjectPtr<Object>>,
    rhs_to_lhs: HashMap<Address, ObjectPtr<Object>>,
}

impl SEqualHandler {
    fn bind(&mut self, lhs: &ObjectPtr<Object>, rhs: &ObjectPtr<Object>) {
        self.lhs_to_rhs.insert(address(lhs), rhs.clone());
        self.rhs_to_lhs.insert(address(rhs), lhs.clone());
    }

    fn values(&mut self, lhs: &RetValue, rhs: &RetValue, is_def: bool) -> bool {
        match (lhs.as_object(), rhs.as_object()) {
            (Some(lhs), Some(rhs)) => return self.objects(lhs, rhs, is_def),
            (None, None) => {}
            _ => return false,
        }
        match (lhs, rhs) {
            (RetValue::Null, RetValue::Null) => true,
            (RetValue::Int(a), RetValue::Int(b)) => a == b,
            (RetValue::Bool(a), RetValue::Bool(b)) => a == b,
            (RetValue::Float(a), RetValue::Float(b)) => (a - b).abs() <= FLOAT_EQUAL_ATOL,
            (RetValue::Str(a), RetValue::Str(b)) => a == b,
            (RetValue::Bytes(a), RetValue::Bytes(b)) => a == b,
            (RetValue::DataType(a), RetValue::DataType(b)) => a == b,
            (RetValue::Device(a), RetValue::Device(b)) => a == b,
            (RetValue::Handle(a), RetValue::Handle(b)) => a == b,
            (RetValue::DLTensorHandle(a), RetValue::DLTensorHandle(b)) => a == b,
            _ => false,
        }
    }

    fn object_refs(&mut self, lhs: &ObjectRef, rhs: &ObjectRef, is_def: bool) -> bool {
        match (&lhs.0, &rhs.0) {
            (Some(lhs), Some(rhs)) => self.objects(lhs, rhs, is_def),
            (None, None) => true,
            _ => false,
        }
    }

    fn objects(&mut self, lhs: &ObjectPtr<Object>, rhs: &ObjectPtr<Object>, is_def: bool) -> bool {
        if let Some(mapped) = self.lhs_to_rhs.get(&address(lhs)) {
            return address(mapped) == address(rhs);
        }
        if self.rhs_to_lhs.contains_key(&address(rhs)) {
            return false;
        }
        if lhs.type_index() != rhs.type_index() {
            return false;
        }

        if let Some(entry) = vtable(lhs.type_index()) {
            return match entry.sequal_kind {
                SEqualKind::FreeVar => {
                    if address(lhs) == address(rhs) {
                        return true;
                    }
                    if !(self.map_free_vars || is_def) || !self.attrs(lhs, rhs) {
                        return false;
                    }
                    self.bind(lhs, rhs);
                    true
                }
                SEqualKind::GraphNode => {
                    let equal = self.attrs(lhs, rhs);
                    if equal {
                        self.bind(lhs, rhs);
                    }
                    equal
                }
                SEqualKind::TreeNode => address(lhs) == address(rhs) || self.attrs(lhs, rhs),
            };
        }

        if address(lhs) == address(rhs) {
            return true;
        }
        if let (Some(a), Some(b)) = (lhs.downcast_ref::<StringObj>(), rhs.downcast_ref::<StringObj>()) {
            return a.as_str() == b.as_str();
        }
        if let (Some(a), Some(b)) = (
            lhs.downcast_ref::<ShapeTupleObj>(),
            rhs.downcast_ref::<ShapeTupleObj>(),
        ) {
            return a.as_slice() == b.as_slice();
        }
        if let (Some(a), Some(b)) = (lhs.downcast_ref::<ArrayObj>(), rhs.downcast_ref::<ArrayObj>()) {
            return a.as_slice().len() == b.as_slice().len()
                && a
                    .as_slice()
                    .iter()
                    .zip(b.as_slice())
                    .all(|(x, y)| self.object_refs(x, y, is_def));
        }
        if let (Some(a), Some(b)) = (lhs.downcast_ref::<MapObj>(), rhs.downcast_ref::<MapObj>()) {
            return self.maps(a, b, is_def);
        }
        if lhs.is_instance::<NDArrayContainer>() {
            return ndarrays_equal(lhs, rhs);
        }
        false
    }

    fn maps(&mut self, lhs: &MapObj, rhs: &MapObj, is_def: bool) -> bool {
        if lhs.len() != rhs.len() {
            return false;
        }
        for (key, value) in lhs.iter() {
            let rhs_key = match &key.0 {
                Some(ptr) if !ptr.is_instance::<StringObj>() => match self.lhs_to_rhs.get(&address(ptr)) {
                    Some(mapped) => ObjectRef(Some(mapped.clone())),
                    None => key.clone(),
                },
                _ => key.clone(),
            };
            let rhs_value = match rhs.get(&rhs_key) {
                Some(value) => value.clone(),
                None => return false,
            };
            if !self.object_refs(value, &rhs_value, is_def) {
                return false;
            }
        }
        true
    }

    fn attrs(&mut self, lhs: &ObjectPtr<Object>, rhs: &ObjectPtr<Object>) -> bool {
        let (lhs_attrs, rhs_attrs) = match (collect_attrs(lhs), collect_attrs(rhs)) {
            (Ok(l), Ok(r)) => (l, r),
            _ => return false,
        };
        lhs_attrs.len() == rhs_attrs.len()
            && lhs_attrs.iter().zip(rhs_attrs.iter()).all(|(l, r)| {
                l.key == r.key && self.values(&l.value, &r.value, l.is_def)
            })
    }
}

fn ndarrays_equal(lhs: &ObjectPtr<Object>, rhs: &ObjectPtr<Object>) -> bool {
    let lhs = crate::NDArray::from_ptr(lhs.clone().downcast().ok());
    let rhs = crate::NDArray::from_ptr(rhs.clone().downcast().ok());
    if !lhs.defined() || !rhs.defined() {
        return false;
    }
    lhs.dtype() == rhs.dtype() && lhs.shape() == rhs.shape() && lhs.as_bytes() == rhs.as_bytes()
}

/// Compares two object graphs by content.
///
/// Free variables are only equal to themselves unless they are bound at a
/// definition site, or anywhere when `map_free_vars` is set. Once bound,
/// a variable must keep mapping to the same counterpart.
pub fn structural_equal(lhs: &ObjectRef, rhs: &ObjectRef, map_free_vars: bool) -> bool {
    let mut handler = SEqualHandler {
        map_free_vars,
        lhs_to_rhs: HashMap::new(),
        rhs_to_lhs: HashMap::new(),
    };
    handler.object_refs(lhs, rhs, false)
}
