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

//! The object system: reference counted objects, the [`ObjectRef`] handle
//! and the [`IsObjectRef`] trait shared by every typed reference.

use std::convert::TryFrom;

use crate::boxed::{BoxBoolObj, BoxFloatObj, BoxIntObj};
use crate::errors::{Error, Result};
use crate::string::StringObj;
use crate::type_context;
use crate::{ArgValue, RetValue};

mod object_ptr;

pub use object_ptr::{IsObject, Object, ObjectPtr};

/// An untyped, possibly null, reference to any object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub Option<ObjectPtr<Object>>);

impl ObjectRef {
    pub fn null() -> ObjectRef {
        ObjectRef(None)
    }
}

/// A typed reference to an object of type `Self::Object` (or a subtype).
pub trait IsObjectRef: Sized + Clone + 'static {
    type Object: IsObject;

    fn as_ptr(&self) -> Option<&ObjectPtr<Self::Object>>;
    fn into_ptr(self) -> Option<ObjectPtr<Self::Object>>;
    fn from_ptr(object_ptr: Option<ObjectPtr<Self::Object>>) -> Self;

    fn null() -> Self {
        Self::from_ptr(None)
    }

    fn defined(&self) -> bool {
        self.as_ptr().is_some()
    }

    /// Whether both references point at the same object.
    fn same_as<U: IsObjectRef>(&self, other: &U) -> bool {
        match (self.as_ptr(), other.as_ptr()) {
            (Some(lhs), Some(rhs)) => lhs.as_raw() == rhs.as_raw(),
            (None, None) => true,
            _ => false,
        }
    }

    fn as_object(&self) -> Option<&Object> {
        self.as_ptr().map(|ptr| ptr.as_object())
    }

    fn upcast<U: IsObjectRef>(self) -> U
    where
        Self::Object: AsRef<U::Object>,
    {
        U::from_ptr(self.into_ptr().map(|ptr| ptr.upcast()))
    }

    fn into_object_ref(self) -> ObjectRef {
        ObjectRef(self.into_ptr().map(ObjectPtr::into_base))
    }

    /// Checked conversion to another reference type. A null reference
    /// converts to a null `U`.
    fn downcast<U: IsObjectRef>(self) -> Result<U> {
        match self.into_object_ref().0 {
            None => Ok(U::null()),
            Some(ptr) => match U::check_and_get_mismatch(Some(ptr.as_object())) {
                None => Ok(U::from_ptr(Some(unsafe { ptr.cast_unchecked() }))),
                Some(actual) => Err(Error::downcast(actual, U::type_name())),
            },
        }
    }

    /// Like `downcast`, but returns `None` for null references and
    /// mismatching types.
    fn as_<U: IsObjectRef>(&self) -> Option<U> {
        let object = self.as_object()?;
        if U::check_and_get_mismatch(Some(object)).is_some() {
            return None;
        }
        self.clone().downcast().ok()
    }

    /// The name used for this reference type in error messages.
    fn type_name() -> std::string::String {
        Self::Object::TYPE_KEY.to_string()
    }

    /// Returns a description of the first part of `object` that is not
    /// compatible with `Self`, or `None` if it converts cleanly.
    fn check_and_get_mismatch(object: Option<&Object>) -> Option<std::string::String> {
        match object {
            Some(object) if !object.is_instance::<Self::Object>() => Some(object.type_key()),
            _ => None,
        }
    }
}

impl IsObjectRef for ObjectRef {
    type Object = Object;

    fn as_ptr(&self) -> Option<&ObjectPtr<Self::Object>> {
        self.0.as_ref()
    }

    fn into_ptr(self) -> Option<ObjectPtr<Self::Object>> {
        self.0
    }

    fn from_ptr(object_ptr: Option<ObjectPtr<Self::Object>>) -> Self {
        ObjectRef(object_ptr)
    }
}

fn accepts<B: IsObject, P: IsObject>() -> bool {
    type_context::derived_from(B::runtime_type_index(), P::runtime_type_index())
}

/// Extracts an object of type `P` from an argument.
///
/// Object handles are checked against `P`. Plain values are boxed when `P`
/// accepts the corresponding box type, and strings become `runtime.String`
/// objects. `Null` yields `None`.
pub fn object_ptr_from_arg<P: IsObject>(arg: ArgValue<'_>) -> Result<Option<ObjectPtr<P>>> {
    let object = match arg {
        ArgValue::Null => return Ok(None),
        ArgValue::ObjectHandle(ptr)
        | ArgValue::ObjectRValueRef(ptr)
        | ArgValue::ModuleHandle(ptr)
        | ArgValue::FuncHandle(ptr)
        | ArgValue::NDArrayHandle(ptr) => ptr,
        ArgValue::Int(value) if accepts::<BoxIntObj, P>() => {
            ObjectPtr::new(BoxIntObj::new(value)).into_base()
        }
        ArgValue::Int(value) if accepts::<BoxFloatObj, P>() => {
            ObjectPtr::new(BoxFloatObj::new(value as f64)).into_base()
        }
        ArgValue::Bool(value) if accepts::<BoxBoolObj, P>() => {
            ObjectPtr::new(BoxBoolObj::new(value)).into_base()
        }
        ArgValue::Bool(value) if accepts::<BoxIntObj, P>() => {
            ObjectPtr::new(BoxIntObj::new(value as i64)).into_base()
        }
        ArgValue::Float(value) if accepts::<BoxFloatObj, P>() => {
            ObjectPtr::new(BoxFloatObj::new(value)).into_base()
        }
        ArgValue::Str(value) if accepts::<StringObj, P>() => {
            ObjectPtr::new(StringObj::new(value)).into_base()
        }
        other => return Err(Error::downcast(other.type_name(), P::TYPE_KEY)),
    };
    object.downcast::<P>().map(Some)
}

impl<'a> TryFrom<ArgValue<'a>> for ObjectRef {
    type Error = Error;

    fn try_from(arg_value: ArgValue<'a>) -> Result<ObjectRef> {
        object_ptr_from_arg::<Object>(arg_value).map(ObjectRef)
    }
}

impl TryFrom<RetValue> for ObjectRef {
    type Error = Error;

    fn try_from(ret_val: RetValue) -> Result<ObjectRef> {
        ObjectRef::try_from(ArgValue::from(ret_val))
    }
}

impl<'a> From<&'a ObjectRef> for ArgValue<'a> {
    fn from(object_ref: &'a ObjectRef) -> ArgValue<'a> {
        ArgValue::from_object(object_ref.0.clone(), false)
    }
}

impl<'a> From<ObjectRef> for ArgValue<'a> {
    fn from(object_ref: ObjectRef) -> ArgValue<'a> {
        ArgValue::from_object(object_ref.0, true)
    }
}

impl From<ObjectRef> for RetValue {
    fn from(object_ref: ObjectRef) -> RetValue {
        RetValue::from_object(object_ref.0)
    }
}

impl<T: IsObject> From<ObjectPtr<T>> for ObjectRef {
    fn from(ptr: ObjectPtr<T>) -> ObjectRef {
        ObjectRef(Some(ptr.into_base()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use crate::boxed::Int;
    use crate::string::String;
    use std::convert::TryInto;

    #[test]
    fn null_reference() {
        let null = ObjectRef::null();
        assert!(!null.defined());
        assert!(null.same_as(&ObjectRef::null()));
        let as_string: String = null.clone().downcast().unwrap();
        assert!(!as_string.defined());
        assert!(null.as_::<String>().is_none());
        let arg: ArgValue = null.into();
        assert!(matches!(arg, ArgValue::Null));
    }

    #[test]
    fn upcast_then_downcast() {
        let s = String::from("foo");
        let object_ref: ObjectRef = s.clone().upcast();
        assert!(object_ref.same_as(&s));
        assert_eq!(ObjectRef::type_name(), "runtime.Object");
        let back: String = object_ref.downcast().unwrap();
        assert_eq!(back, "foo");
    }

    #[test]
    fn as_never_fails() {
        let object_ref = String::from("foo").into_object_ref();
        assert!(object_ref.as_::<Int>().is_none());
        assert!(object_ref.as_::<String>().is_some());
        let err = object_ref.downcast::<Array<String>>().unwrap_err();
        assert!(err.to_string().contains("runtime.String"));
    }

    #[test]
    fn pod_values_are_boxed() {
        let boxed: ObjectRef = ArgValue::Int(3).try_into().unwrap();
        assert_eq!(boxed.as_::<Int>().unwrap().value, 3);
        let string: ObjectRef = ArgValue::from("hello").try_into().unwrap();
        assert_eq!(string.as_::<String>().unwrap(), "hello");
        let err = ObjectRef::try_from(ArgValue::Device(Default::default())).unwrap_err();
        assert!(err.to_string().contains("runtime.Object"));
    }
}
