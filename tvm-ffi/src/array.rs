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

use std::convert::TryFrom;
use std::iter::FromIterator;
use std::marker::PhantomData;

use crate::errors::{Error, Result};
use crate::object::{object_ptr_from_arg, IsObject, IsObjectRef, Object, ObjectPtr, ObjectRef};
use crate::type_context::{TypeIndex, TypeIndexCell};
use crate::{ArgValue, RetValue};

/// The untyped storage of every `Array<T>`.
#[repr(C)]
#[derive(Debug)]
pub struct ArrayObj {
    base: Object,
    data: Vec<ObjectRef>,
}

unsafe impl IsObject for ArrayObj {
    const TYPE_KEY: &'static str = "Array";
    const TYPE_FINAL: bool = true;
    const STATIC_TYPE_INDEX: u32 = TypeIndex::ARRAY;

    fn runtime_type_index() -> u32 {
        static TYPE_INDEX: TypeIndexCell = TypeIndexCell::new();
        TYPE_INDEX.get_or_register::<Self>()
    }

    fn parent_type_index() -> u32 {
        Object::runtime_type_index()
    }
}

impl AsRef<Object> for ArrayObj {
    fn as_ref(&self) -> &Object {
        &self.base
    }
}

impl AsRef<ArrayObj> for ArrayObj {
    fn as_ref(&self) -> &ArrayObj {
        self
    }
}

impl ArrayObj {
    pub fn new(data: Vec<ObjectRef>) -> ArrayObj {
        ArrayObj {
            base: Object::base::<ArrayObj>(),
            data,
        }
    }

    pub fn as_slice(&self) -> &[ObjectRef] {
        &self.data
    }
}

/// A copy-on-write array of object references.
#[repr(C)]
pub struct Array<T: IsObjectRef> {
    object: Option<ObjectPtr<ArrayObj>>,
    _data: PhantomData<T>,
}

impl<T: IsObjectRef> Clone for Array<T> {
    fn clone(&self) -> Self {
        Array {
            object: self.object.clone(),
            _data: PhantomData,
        }
    }
}

impl<T: IsObjectRef> IsObjectRef for Array<T> {
    type Object = ArrayObj;

    fn as_ptr(&self) -> Option<&ObjectPtr<Self::Object>> {
        self.object.as_ref()
    }

    fn into_ptr(self) -> Option<ObjectPtr<Self::Object>> {
        self.object
    }

    fn from_ptr(object_ptr: Option<ObjectPtr<Self::Object>>) -> Self {
        Array {
            object: object_ptr,
            _data: PhantomData,
        }
    }

    fn type_name() -> std::string::String {
        format!("Array[{}]", T::type_name())
    }

    fn check_and_get_mismatch(object: Option<&Object>) -> Option<std::string::String> {
        let object = object?;
        let array = match object.downcast_ref::<ArrayObj>() {
            Some(array) => array,
            None => return Some(object.type_key()),
        };
        array
            .data
            .iter()
            .enumerate()
            .find_map(|(i, elem)| {
                T::check_and_get_mismatch(elem.as_object())
                    .map(|mismatch| format!("Array[index {}: {}]", i, mismatch))
            })
    }
}

impl<T: IsObjectRef> Array<T> {
    /// An empty, defined array.
    pub fn new() -> Array<T> {
        Array::from_vec(Vec::new())
    }

    pub fn from_vec(data: Vec<T>) -> Array<T> {
        let data = data.into_iter().map(T::into_object_ref).collect();
        Array::from_ptr(Some(ObjectPtr::new(ArrayObj::new(data))))
    }

    /// The untyped elements. A null array has none.
    pub fn as_slice(&self) -> &[ObjectRef] {
        match &self.object {
            Some(array) => &array.data,
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn checked_index(&self, index: i64) -> Result<usize> {
        let len = self.len();
        if index < 0 || index as usize >= len {
            return Err(Error::IndexOutOfBounds {
                container: "Array",
                index,
                len,
            });
        }
        Ok(index as usize)
    }

    pub fn get(&self, index: i64) -> Result<T> {
        let index = self.checked_index(index)?;
        self.as_slice()[index].clone().downcast()
    }

    fn data_mut(&mut self) -> &mut Vec<ObjectRef> {
        let ptr = self
            .object
            .get_or_insert_with(|| ObjectPtr::new(ArrayObj::new(Vec::new())));
        &mut ptr.make_mut_with(|array| ArrayObj::new(array.data.clone())).data
    }

    /// Appends an element, copying the storage first if it is shared.
    pub fn push(&mut self, value: T) {
        self.data_mut().push(value.into_object_ref());
    }

    /// Replaces an element, copying the storage first if it is shared.
    pub fn set(&mut self, index: i64, value: T) -> Result<()> {
        let index = self.checked_index(index)?;
        self.data_mut()[index] = value.into_object_ref();
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.as_slice().iter().map(|elem| match elem.clone().downcast() {
            Ok(elem) => elem,
            Err(err) => panic!("array element does not match its declared type: {}", err),
        })
    }
}

impl<T: IsObjectRef> Default for Array<T> {
    fn default() -> Self {
        Array::new()
    }
}

impl<T: IsObjectRef + std::fmt::Debug> std::fmt::Debug for Array<T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

impl<T: IsObjectRef> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Array::from_vec(iter.into_iter().collect())
    }
}

impl<T: IsObjectRef> From<Vec<T>> for Array<T> {
    fn from(data: Vec<T>) -> Self {
        Array::from_vec(data)
    }
}

impl<'a, T: IsObjectRef> From<&'a Array<T>> for ArgValue<'a> {
    fn from(array: &'a Array<T>) -> ArgValue<'a> {
        ArgValue::from_object(array.object.clone().map(ObjectPtr::into_base), false)
    }
}

impl<'a, T: IsObjectRef> From<Array<T>> for ArgValue<'a> {
    fn from(array: Array<T>) -> ArgValue<'a> {
        ArgValue::from_object(array.object.map(ObjectPtr::into_base), true)
    }
}

impl<T: IsObjectRef> From<Array<T>> for RetValue {
    fn from(array: Array<T>) -> RetValue {
        RetValue::from_object(array.object.map(ObjectPtr::into_base))
    }
}

impl<T: IsObjectRef> From<Array<T>> for ObjectRef {
    fn from(array: Array<T>) -> ObjectRef {
        array.into_object_ref()
    }
}

/// Elements that fail the type check are converted one by one through
/// `T`'s own conversion, so for example boxed integers can become floats.
impl<'a, T> TryFrom<ArgValue<'a>> for Array<T>
where
    T: IsObjectRef + for<'b> TryFrom<ArgValue<'b>, Error = Error>,
{
    type Error = Error;

    fn try_from(arg: ArgValue<'a>) -> Result<Array<T>> {
        let array = match object_ptr_from_arg::<Object>(arg)? {
            Some(object) => object.downcast::<ArrayObj>()?,
            None => return Ok(Array::from_ptr(None)),
        };
        let mismatch = match Self::check_and_get_mismatch(Some(array.as_object())) {
            Some(mismatch) => mismatch,
            None => return Ok(Array::from_ptr(Some(array))),
        };
        let converted = array
            .data
            .iter()
            .map(|elem| T::try_from(ArgValue::from(elem)))
            .collect::<Result<Vec<T>>>()
            .map_err(|_| Error::downcast(mismatch, Self::type_name()))?;
        Ok(Array::from_vec(converted))
    }
}

impl<T> TryFrom<RetValue> for Array<T>
where
    T: IsObjectRef + for<'b> TryFrom<ArgValue<'b>, Error = Error>,
{
    type Error = Error;

    fn try_from(ret: RetValue) -> Result<Array<T>> {
        Array::try_from(ArgValue::from(ret))
    }
}

#[cfg(test)]
mod tests {
    use super::Array;
    use crate::boxed::{Float, Int};
    use crate::errors::{Error, Result};
    use crate::ndarray::NDArray;
    use crate::object::{IsObjectRef, ObjectRef};
    use crate::string::String;
    use crate::{external, ArgValue, DataType, Device};
    use std::convert::TryFrom;

    external! {
        #[name("runtime.ArraySize")]
        fn array_size(array: ObjectRef) -> i64;
    }

    #[test]
    fn create_array_and_get() -> Result<()> {
        let vec: Vec<String> = vec!["foo".into(), "bar".into(), "baz".into()];
        let array = Array::from_vec(vec);
        assert_eq!(array.get(0)?.to_string(), "foo");
        assert_eq!(array.get(1)?.to_string(), "bar");
        assert_eq!(array.get(2)?.to_string(), "baz");
        assert_eq!(array_size(array.clone().into())?, 3);
        assert!(matches!(
            array.get(3),
            Err(Error::IndexOutOfBounds { index: 3, len: 3, .. })
        ));
        assert!(array.get(-1).is_err());
        Ok(())
    }

    #[test]
    fn downcast() -> Result<()> {
        let vec: Vec<String> = vec!["foo".into(), "bar".into(), "baz".into()];
        let array: ObjectRef = Array::from_vec(vec).into();
        let array: Array<ObjectRef> = array.downcast::<Array<ObjectRef>>()?;
        assert_eq!(array.get(1)?.downcast::<String>()?, "bar");
        Ok(())
    }

    #[test]
    fn mismatch_reports_first_offending_index() {
        let tensor = NDArray::empty(&[1], DataType::float32(), Device::cpu(0)).unwrap();
        let elems: Vec<ObjectRef> = vec![
            String::from("a").into(),
            String::from("b").into(),
            tensor.into(),
        ];
        let array = Array::from_vec(elems);
        let err = Array::<String>::try_from(ArgValue::from(&array)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected type `Array[runtime.String]` but found `Array[index 2: runtime.NDArray]`"
        );
    }

    #[test]
    fn elementwise_conversion() -> Result<()> {
        let ints = Array::from_vec(vec![Int::from(1), Int::from(2)]);
        let floats = Array::<Float>::try_from(ArgValue::from(&ints))?;
        let values: Vec<f64> = floats.iter().map(|f| f.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn copy_on_write() -> Result<()> {
        let original = Array::from_vec(vec![Int::from(1)]);
        let mut copy = original.clone();
        copy.push(Int::from(2));
        copy.set(0, Int::from(10))?;
        assert_eq!(original.len(), 1);
        assert_eq!(original.get(0)?.value, 1);
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.get(0)?.value, 10);

        let mut unique = Array::<Int>::new();
        let before = unique.as_ptr().map(|p| p.as_raw());
        unique.push(Int::from(5));
        assert_eq!(unique.as_ptr().map(|p| p.as_raw()), before);
        Ok(())
    }

    #[test]
    fn null_array_is_empty() {
        let array = Array::<String>::null();
        assert!(array.is_empty());
        assert!(matches!(ArgValue::from(&array), ArgValue::Null));
    }
}
