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

use std::ops::Index;

use crate::object::Object;

use tvm_ffi_macros::Object;

/// An immutable tuple of dimensions.
#[repr(C)]
#[derive(Object, Debug)]
#[ref_name = "ShapeTuple"]
#[type_key = "runtime.ShapeTuple"]
#[static_type_index = "SHAPE_TUPLE"]
#[type_final]
pub struct ShapeTupleObj {
    base: Object,
    data: Vec<i64>,
}

impl ShapeTupleObj {
    pub fn new(data: Vec<i64>) -> ShapeTupleObj {
        ShapeTupleObj {
            base: Object::base::<ShapeTupleObj>(),
            data,
        }
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The number of elements a tensor of this shape holds.
    pub fn product(&self) -> i64 {
        self.data.iter().product()
    }
}

impl ShapeTuple {
    pub fn new(data: impl Into<Vec<i64>>) -> ShapeTuple {
        ShapeTupleObj::new(data.into()).into()
    }
}

impl From<Vec<i64>> for ShapeTuple {
    fn from(data: Vec<i64>) -> Self {
        ShapeTuple::new(data)
    }
}

impl From<&[i64]> for ShapeTuple {
    fn from(data: &[i64]) -> Self {
        ShapeTuple::new(data.to_vec())
    }
}

impl std::iter::FromIterator<i64> for ShapeTuple {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        ShapeTuple::new(iter.into_iter().collect::<Vec<_>>())
    }
}

impl Index<usize> for ShapeTupleObj {
    type Output = i64;

    fn index(&self, index: usize) -> &i64 {
        &self.data[index]
    }
}

impl std::fmt::Display for ShapeTupleObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArgValue, IsObjectRef, ObjectRef};
    use std::convert::TryFrom;

    #[test]
    fn shape_basics() {
        let shape = ShapeTuple::new(vec![2, 3, 4]);
        assert_eq!(shape.len(), 3);
        assert_eq!(shape[1], 3);
        assert_eq!(shape.product(), 24);
        assert_eq!(shape.to_string(), "[2, 3, 4]");
    }

    #[test]
    fn through_object_ref() {
        let shape: ShapeTuple = vec![1i64, 5].into();
        let object = ObjectRef::try_from(ArgValue::from(&shape)).unwrap();
        let back: ShapeTuple = object.downcast().unwrap();
        assert!(back.same_as(&shape));
        assert_eq!(back.as_slice(), &[1, 5]);
    }
}
