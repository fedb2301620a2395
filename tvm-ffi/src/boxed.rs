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

//! Boxed primitive objects, used where a plain value has to live inside a
//! container or an object attribute.

use paste::paste;

use crate::object::{IsObjectRef, Object};

use tvm_ffi_macros::{Object, Reflect};

macro_rules! define_box {
    ($name:ident, $ref_name:tt, $ty:ty, $type_key:tt) => {
        paste! {
            #[repr(C)]
            #[derive(Object, Reflect, Debug)]
            #[ref_name = $ref_name]
            #[type_key = $type_key]
            #[type_final]
            pub struct [<Box $name Obj>] {
                base: Object,
                pub value: $ty,
            }

            impl [<Box $name Obj>] {
                pub fn new(value: $ty) -> Self {
                    [<Box $name Obj>] {
                        base: Object::base::<Self>(),
                        value,
                    }
                }
            }

            impl From<$ty> for $name {
                fn from(value: $ty) -> Self {
                    $name::from([<Box $name Obj>]::new(value))
                }
            }

            impl $name {
                /// Replaces the boxed value, copying the box first if it is shared.
                pub fn set_value(&mut self, value: $ty) {
                    match self.0.as_mut() {
                        Some(ptr) => {
                            ptr.make_mut_with(|boxed| [<Box $name Obj>]::new(boxed.value)).value = value
                        }
                        None => *self = $name::from(value),
                    }
                }

                /// The boxed value, or `None` for a null reference.
                pub fn get(&self) -> Option<$ty> {
                    self.as_ptr().map(|ptr| ptr.value)
                }
            }
        }
    };
}

define_box!(Int, "Int", i64, "runtime.BoxInt");
define_box!(Float, "Float", f64, "runtime.BoxFloat");
define_box!(Bool, "Bool", bool, "runtime.BoxBool");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArgValue, RetValue};
    use std::convert::TryFrom;

    #[test]
    fn boxed_bool_unboxes_to_bool() {
        let ret = RetValue::from(Bool::from(true));
        assert!(matches!(ret, RetValue::Bool(true)));
        let back = Bool::try_from(ret).unwrap();
        assert_eq!(back.get(), Some(true));
    }

    #[test]
    fn plain_values_box_on_the_way_in() {
        assert_eq!(Int::try_from(ArgValue::Int(9)).unwrap().value, 9);
        assert_eq!(Float::try_from(ArgValue::Int(2)).unwrap().value, 2.0);
        assert_eq!(Int::try_from(ArgValue::Bool(true)).unwrap().value, 1);
        assert!(Bool::try_from(ArgValue::Float(1.0)).is_err());
    }

    #[test]
    fn set_value_copies_shared_boxes() {
        let original = Int::from(1);
        let mut copy = original.clone();
        copy.set_value(2);
        assert_eq!(original.value, 1);
        assert_eq!(copy.value, 2);
        assert!(!copy.same_as(&original));

        let mut unique = Int::from(3);
        let before = unique.as_ptr().map(|p| p.as_raw());
        unique.set_value(4);
        assert_eq!(unique.as_ptr().map(|p| p.as_raw()), before);
    }
}
