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

//! The tagged values passed into and returned from packed functions.
//!
//! [`ArgValue`] is the argument cell: strings and bytes may borrow from the
//! caller. [`RetValue`] is the owning return cell. Both hold a reference to
//! any object they carry, so a value can never outlive its object.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_void};

use tvm_ffi_sys::ffi::{self, DLDataType, DLDevice, DLTensor, TVMByteArray, TVMValue};
use tvm_ffi_sys::ByteArray;

use crate::boxed::{BoxBoolObj, BoxFloatObj, BoxIntObj};
use crate::errors::{Error, Result};
use crate::function::PackedFuncObj;
use crate::module::ModuleNode;
use crate::ndarray::{self, NDArrayContainer};
use crate::object::{Object, ObjectPtr};

/// A borrowed argument. Can be constructed using `into()` but the preferred
/// way to obtain an `ArgValue` is automatically via `call_packed!`.
#[derive(Clone, Debug)]
pub enum ArgValue<'a> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    DataType(DLDataType),
    Device(DLDevice),
    Handle(*mut c_void),
    DLTensorHandle(*mut DLTensor),
    ObjectHandle(ObjectPtr<Object>),
    /// An object passed by value; a C callee may take over the reference.
    ObjectRValueRef(ObjectPtr<Object>),
    ModuleHandle(ObjectPtr<Object>),
    FuncHandle(ObjectPtr<Object>),
    NDArrayHandle(ObjectPtr<Object>),
    Str(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
}

/// An owned value returned from a packed function.
///
/// # Example
///
/// ```
/// use std::convert::{TryFrom, TryInto};
/// use tvm_ffi::RetValue;
///
/// let a = 42u32;
/// let b: u32 = RetValue::from(a).try_into().unwrap();
///
/// let s = "hello, world!";
/// let t: RetValue = s.to_string().into();
/// assert_eq!(String::try_from(t).unwrap(), s);
/// ```
#[derive(Clone, Debug)]
pub enum RetValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    DataType(DLDataType),
    Device(DLDevice),
    Handle(*mut c_void),
    DLTensorHandle(*mut DLTensor),
    ObjectHandle(ObjectPtr<Object>),
    ModuleHandle(ObjectPtr<Object>),
    FuncHandle(ObjectPtr<Object>),
    NDArrayHandle(ObjectPtr<Object>),
    Str(String),
    Bytes(Vec<u8>),
}

impl Default for RetValue {
    fn default() -> Self {
        RetValue::Null
    }
}

/// How an object travels in a value cell.
enum ObjectClass {
    Null,
    NDArray(ObjectPtr<Object>),
    Module(ObjectPtr<Object>),
    Func(ObjectPtr<Object>),
    Bool(bool),
    Int(i64),
    Float(f64),
    Other(ObjectPtr<Object>),
}

fn classify(object: Option<ObjectPtr<Object>>) -> ObjectClass {
    let object = match object {
        Some(object) => object,
        None => return ObjectClass::Null,
    };
    if object.is_instance::<NDArrayContainer>() {
        ObjectClass::NDArray(object)
    } else if object.is_instance::<ModuleNode>() {
        ObjectClass::Module(object)
    } else if object.is_instance::<PackedFuncObj>() {
        ObjectClass::Func(object)
    } else if let Some(boxed) = object.downcast_ref::<BoxBoolObj>() {
        ObjectClass::Bool(boxed.value)
    } else if let Some(boxed) = object.downcast_ref::<BoxIntObj>() {
        ObjectClass::Int(boxed.value)
    } else if let Some(boxed) = object.downcast_ref::<BoxFloatObj>() {
        ObjectClass::Float(boxed.value)
    } else {
        ObjectClass::Other(object)
    }
}

impl<'a> ArgValue<'a> {
    /// Wraps an object, choosing the most specific tag for it. Boxed
    /// primitives travel unboxed. `rvalue` marks an object whose reference
    /// the callee may take over.
    pub fn from_object(object: Option<ObjectPtr<Object>>, rvalue: bool) -> ArgValue<'static> {
        match classify(object) {
            ObjectClass::Null => ArgValue::Null,
            ObjectClass::NDArray(ptr) => ArgValue::NDArrayHandle(ptr),
            ObjectClass::Module(ptr) => ArgValue::ModuleHandle(ptr),
            ObjectClass::Func(ptr) => ArgValue::FuncHandle(ptr),
            ObjectClass::Bool(value) => ArgValue::Bool(value),
            ObjectClass::Int(value) => ArgValue::Int(value),
            ObjectClass::Float(value) => ArgValue::Float(value),
            ObjectClass::Other(ptr) if rvalue => ArgValue::ObjectRValueRef(ptr),
            ObjectClass::Other(ptr) => ArgValue::ObjectHandle(ptr),
        }
    }

    /// The object carried by this value, if any.
    pub fn as_object(&self) -> Option<&ObjectPtr<Object>> {
        match self {
            ArgValue::ObjectHandle(ptr)
            | ArgValue::ObjectRValueRef(ptr)
            | ArgValue::ModuleHandle(ptr)
            | ArgValue::FuncHandle(ptr)
            | ArgValue::NDArrayHandle(ptr) => Some(ptr),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null)
    }

    pub fn type_code(&self) -> ffi::TVMArgTypeCode {
        match self {
            ArgValue::Int(_) => ffi::TVMArgTypeCode_kTVMArgInt,
            ArgValue::Float(_) => ffi::TVMArgTypeCode_kTVMArgFloat,
            ArgValue::Bool(_) => ffi::TVMArgTypeCode_kTVMArgBool,
            ArgValue::Null => ffi::TVMArgTypeCode_kTVMNullptr,
            ArgValue::DataType(_) => ffi::TVMArgTypeCode_kTVMDataType,
            ArgValue::Device(_) => ffi::TVMArgTypeCode_kDLDevice,
            ArgValue::Handle(_) => ffi::TVMArgTypeCode_kTVMOpaqueHandle,
            ArgValue::DLTensorHandle(_) => ffi::TVMArgTypeCode_kTVMDLTensorHandle,
            ArgValue::ObjectHandle(_) => ffi::TVMArgTypeCode_kTVMObjectHandle,
            ArgValue::ObjectRValueRef(_) => ffi::TVMArgTypeCode_kTVMObjectRValueRefArg,
            ArgValue::ModuleHandle(_) => ffi::TVMArgTypeCode_kTVMModuleHandle,
            ArgValue::FuncHandle(_) => ffi::TVMArgTypeCode_kTVMPackedFuncHandle,
            ArgValue::NDArrayHandle(_) => ffi::TVMArgTypeCode_kTVMNDArrayHandle,
            ArgValue::Str(_) => ffi::TVMArgTypeCode_kTVMStr,
            ArgValue::Bytes(_) => ffi::TVMArgTypeCode_kTVMBytes,
        }
    }

    /// A human readable name of the carried type: the type key for objects,
    /// the type code name otherwise.
    pub fn type_name(&self) -> String {
        match self.as_object() {
            Some(object) => object.type_key(),
            None => tvm_ffi_sys::value::type_code_to_str(self.type_code() as i64).to_string(),
        }
    }

    /// Reads an argument passed from C.
    ///
    /// Object handles gain a reference for the lifetime of the value. An
    /// rvalue reference is taken over and its slot cleared.
    ///
    /// # Safety
    ///
    /// `value` must hold a live payload of kind `type_code`; strings and
    /// byte arrays must stay valid for `'a`.
    pub unsafe fn from_tvm_value(value: TVMValue, type_code: c_int) -> Result<ArgValue<'a>> {
        let code = u32::try_from(type_code).map_err(|_| Error::UnknownTypeCode(type_code))?;
        let borrowed = |handle: *mut c_void, wrap: fn(ObjectPtr<Object>) -> ArgValue<'a>| {
            match ObjectPtr::from_borrowed_raw(handle as *mut Object) {
                Some(ptr) => wrap(ptr),
                None => ArgValue::Null,
            }
        };
        #[allow(non_upper_case_globals)]
        let arg = match code {
            ffi::TVMArgTypeCode_kTVMArgInt | ffi::DLDataTypeCode_kDLUInt => {
                ArgValue::Int(value.v_int64)
            }
            ffi::TVMArgTypeCode_kTVMArgFloat => ArgValue::Float(value.v_float64),
            ffi::TVMArgTypeCode_kTVMArgBool => ArgValue::Bool(value.v_int64 != 0),
            ffi::TVMArgTypeCode_kTVMNullptr => ArgValue::Null,
            ffi::TVMArgTypeCode_kTVMDataType => ArgValue::DataType(value.v_type),
            ffi::TVMArgTypeCode_kDLDevice => ArgValue::Device(value.v_device),
            ffi::TVMArgTypeCode_kTVMOpaqueHandle => ArgValue::Handle(value.v_handle),
            ffi::TVMArgTypeCode_kTVMDLTensorHandle => {
                ArgValue::DLTensorHandle(value.v_handle as *mut DLTensor)
            }
            ffi::TVMArgTypeCode_kTVMObjectHandle => {
                borrowed(value.v_handle, ArgValue::ObjectHandle)
            }
            ffi::TVMArgTypeCode_kTVMModuleHandle => {
                borrowed(value.v_handle, ArgValue::ModuleHandle)
            }
            ffi::TVMArgTypeCode_kTVMPackedFuncHandle => {
                borrowed(value.v_handle, ArgValue::FuncHandle)
            }
            ffi::TVMArgTypeCode_kTVMNDArrayHandle => borrowed(
                ndarray::object_from_handle(value.v_handle as *mut DLTensor) as *mut c_void,
                ArgValue::NDArrayHandle,
            ),
            ffi::TVMArgTypeCode_kTVMObjectRValueRefArg => {
                let slot = value.v_handle as *mut *mut Object;
                if slot.is_null() {
                    ArgValue::Null
                } else {
                    let taken = std::mem::replace(&mut *slot, std::ptr::null_mut());
                    match ObjectPtr::from_raw(taken) {
                        Some(ptr) => ArgValue::ObjectRValueRef(ptr),
                        None => ArgValue::Null,
                    }
                }
            }
            ffi::TVMArgTypeCode_kTVMStr => {
                if value.v_str.is_null() {
                    ArgValue::Null
                } else {
                    ArgValue::Str(Cow::Borrowed(CStr::from_ptr(value.v_str).to_str()?))
                }
            }
            ffi::TVMArgTypeCode_kTVMBytes => {
                let array = value.v_handle as *const TVMByteArray;
                if array.is_null() {
                    ArgValue::Null
                } else {
                    ArgValue::Bytes(Cow::Borrowed(ByteArray::from_raw(*array).data()))
                }
            }
            _ => return Err(Error::UnknownTypeCode(type_code)),
        };
        Ok(arg)
    }
}

impl RetValue {
    pub fn from_object(object: Option<ObjectPtr<Object>>) -> RetValue {
        ArgValue::from_object(object, false).into()
    }

    /// Reads a value returned from C. The reference carried by a returned
    /// object handle is taken over.
    ///
    /// # Safety
    ///
    /// Same contract as [`ArgValue::from_tvm_value`].
    pub unsafe fn from_returned_tvm_value(value: TVMValue, type_code: c_int) -> Result<RetValue> {
        let ret = RetValue::from(ArgValue::from_tvm_value(value, type_code)?);
        if let Some(object) = ret.as_object() {
            // the value above holds its own reference now
            Object::dec_ref(object.as_raw());
        }
        Ok(ret)
    }

    pub fn as_object(&self) -> Option<&ObjectPtr<Object>> {
        match self {
            RetValue::ObjectHandle(ptr)
            | RetValue::ModuleHandle(ptr)
            | RetValue::FuncHandle(ptr)
            | RetValue::NDArrayHandle(ptr) => Some(ptr),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RetValue::Null)
    }

    pub fn type_code(&self) -> ffi::TVMArgTypeCode {
        match self {
            RetValue::Int(_) => ffi::TVMArgTypeCode_kTVMArgInt,
            RetValue::Float(_) => ffi::TVMArgTypeCode_kTVMArgFloat,
            RetValue::Bool(_) => ffi::TVMArgTypeCode_kTVMArgBool,
            RetValue::Null => ffi::TVMArgTypeCode_kTVMNullptr,
            RetValue::DataType(_) => ffi::TVMArgTypeCode_kTVMDataType,
            RetValue::Device(_) => ffi::TVMArgTypeCode_kDLDevice,
            RetValue::Handle(_) => ffi::TVMArgTypeCode_kTVMOpaqueHandle,
            RetValue::DLTensorHandle(_) => ffi::TVMArgTypeCode_kTVMDLTensorHandle,
            RetValue::ObjectHandle(_) => ffi::TVMArgTypeCode_kTVMObjectHandle,
            RetValue::ModuleHandle(_) => ffi::TVMArgTypeCode_kTVMModuleHandle,
            RetValue::FuncHandle(_) => ffi::TVMArgTypeCode_kTVMPackedFuncHandle,
            RetValue::NDArrayHandle(_) => ffi::TVMArgTypeCode_kTVMNDArrayHandle,
            RetValue::Str(_) => ffi::TVMArgTypeCode_kTVMStr,
            RetValue::Bytes(_) => ffi::TVMArgTypeCode_kTVMBytes,
        }
    }

    pub fn type_name(&self) -> String {
        match self.as_object() {
            Some(object) => object.type_key(),
            None => tvm_ffi_sys::value::type_code_to_str(self.type_code() as i64).to_string(),
        }
    }
}

impl<'a> From<RetValue> for ArgValue<'a> {
    fn from(val: RetValue) -> ArgValue<'a> {
        match val {
            RetValue::Int(v) => ArgValue::Int(v),
            RetValue::Float(v) => ArgValue::Float(v),
            RetValue::Bool(v) => ArgValue::Bool(v),
            RetValue::Null => ArgValue::Null,
            RetValue::DataType(v) => ArgValue::DataType(v),
            RetValue::Device(v) => ArgValue::Device(v),
            RetValue::Handle(v) => ArgValue::Handle(v),
            RetValue::DLTensorHandle(v) => ArgValue::DLTensorHandle(v),
            RetValue::ObjectHandle(v) => ArgValue::ObjectHandle(v),
            RetValue::ModuleHandle(v) => ArgValue::ModuleHandle(v),
            RetValue::FuncHandle(v) => ArgValue::FuncHandle(v),
            RetValue::NDArrayHandle(v) => ArgValue::NDArrayHandle(v),
            RetValue::Str(v) => ArgValue::Str(Cow::Owned(v)),
            RetValue::Bytes(v) => ArgValue::Bytes(Cow::Owned(v)),
        }
    }
}

impl<'a> From<ArgValue<'a>> for RetValue {
    fn from(val: ArgValue<'a>) -> RetValue {
        match val {
            ArgValue::Int(v) => RetValue::Int(v),
            ArgValue::Float(v) => RetValue::Float(v),
            ArgValue::Bool(v) => RetValue::Bool(v),
            ArgValue::Null => RetValue::Null,
            ArgValue::DataType(v) => RetValue::DataType(v),
            ArgValue::Device(v) => RetValue::Device(v),
            ArgValue::Handle(v) => RetValue::Handle(v),
            ArgValue::DLTensorHandle(v) => RetValue::DLTensorHandle(v),
            ArgValue::ObjectHandle(v) | ArgValue::ObjectRValueRef(v) => RetValue::ObjectHandle(v),
            ArgValue::ModuleHandle(v) => RetValue::ModuleHandle(v),
            ArgValue::FuncHandle(v) => RetValue::FuncHandle(v),
            ArgValue::NDArrayHandle(v) => RetValue::NDArrayHandle(v),
            ArgValue::Str(v) => RetValue::Str(v.into_owned()),
            ArgValue::Bytes(v) => RetValue::Bytes(v.into_owned()),
        }
    }
}

/// The C representation of an argument list, kept alive for one call.
///
/// Objects passed by value are moved into rvalue slots that the callee may
/// empty; whatever is left in a slot is released when the buffer drops.
pub struct ArgsBuffer<'a> {
    values: Vec<TVMValue>,
    type_codes: Vec<c_int>,
    objects: Vec<ObjectPtr<Object>>,
    strings: Vec<CString>,
    bytes: Vec<(Cow<'a, [u8]>, Box<TVMByteArray>)>,
    rvalue_slots: Vec<Box<*mut Object>>,
}

impl<'a> ArgsBuffer<'a> {
    pub fn new(args: Vec<ArgValue<'a>>) -> Result<ArgsBuffer<'a>> {
        let mut buffer = ArgsBuffer {
            values: Vec::with_capacity(args.len()),
            type_codes: Vec::with_capacity(args.len()),
            objects: Vec::new(),
            strings: Vec::new(),
            bytes: Vec::new(),
            rvalue_slots: Vec::new(),
        };
        for arg in args {
            let type_code = arg.type_code() as c_int;
            let value = buffer.push_payload(arg)?;
            buffer.values.push(value);
            buffer.type_codes.push(type_code);
        }
        Ok(buffer)
    }

    fn push_payload(&mut self, arg: ArgValue<'a>) -> Result<TVMValue> {
        let value = match arg {
            ArgValue::Int(v) => TVMValue { v_int64: v },
            ArgValue::Float(v) => TVMValue { v_float64: v },
            ArgValue::Bool(v) => TVMValue { v_int64: v as i64 },
            ArgValue::Null => TVMValue::default(),
            ArgValue::DataType(v) => TVMValue { v_type: v },
            ArgValue::Device(v) => TVMValue { v_device: v },
            ArgValue::Handle(v) => TVMValue { v_handle: v },
            ArgValue::DLTensorHandle(v) => TVMValue {
                v_handle: v as *mut c_void,
            },
            ArgValue::ObjectHandle(ptr) | ArgValue::ModuleHandle(ptr) | ArgValue::FuncHandle(ptr) => {
                let value = TVMValue {
                    v_handle: ptr.as_raw() as *mut c_void,
                };
                self.objects.push(ptr);
                value
            }
            ArgValue::NDArrayHandle(ptr) => {
                let value = TVMValue {
                    v_handle: ndarray::handle_from_object(ptr.as_raw()) as *mut c_void,
                };
                self.objects.push(ptr);
                value
            }
            ArgValue::ObjectRValueRef(ptr) => {
                let mut slot = Box::new(ptr.into_raw());
                let value = TVMValue {
                    v_handle: &mut *slot as *mut *mut Object as *mut c_void,
                };
                self.rvalue_slots.push(slot);
                value
            }
            ArgValue::Str(s) => {
                let c_string = CString::new(s.as_bytes())?;
                let value = TVMValue {
                    v_str: c_string.as_ptr(),
                };
                self.strings.push(c_string);
                value
            }
            ArgValue::Bytes(data) => {
                let mut array = Box::new(TVMByteArray {
                    data: data.as_ptr() as *const _,
                    size: data.len(),
                });
                let value = TVMValue {
                    v_handle: &mut *array as *mut TVMByteArray as *mut c_void,
                };
                self.bytes.push((data, array));
                value
            }
        };
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values_mut_ptr(&mut self) -> *mut TVMValue {
        self.values.as_mut_ptr()
    }

    pub fn type_codes_mut_ptr(&mut self) -> *mut c_int {
        self.type_codes.as_mut_ptr()
    }
}

impl<'a> Drop for ArgsBuffer<'a> {
    fn drop(&mut self) {
        for slot in self.rvalue_slots.drain(..) {
            // a callee that took the object cleared the slot
            drop(unsafe { ObjectPtr::from_raw(*slot) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxed::{Bool, Int};
    use crate::object::{IsObjectRef, ObjectRef};
    use crate::string::String as TString;

    #[test]
    fn boxed_objects_travel_unboxed() {
        assert!(matches!(ArgValue::from(Bool::from(true)), ArgValue::Bool(true)));
        assert!(matches!(RetValue::from(Int::from(5)), RetValue::Int(5)));
        assert!(matches!(ArgValue::from(TString::null()), ArgValue::Null));
    }

    #[test]
    fn rvalue_and_lvalue_tags() {
        let s = TString::from("x");
        assert!(matches!(ArgValue::from(&s), ArgValue::ObjectHandle(_)));
        assert!(matches!(ArgValue::from(s), ArgValue::ObjectRValueRef(_)));
    }

    #[test]
    fn args_buffer_round_trip() {
        let object = ObjectRef::from(TString::from("kept"));
        let args = vec![
            ArgValue::Int(7),
            ArgValue::from("text"),
            ArgValue::Bytes(Cow::Owned(vec![1, 2, 3])),
            ArgValue::from(&object),
        ];
        let mut buffer = ArgsBuffer::new(args).unwrap();
        assert_eq!(buffer.len(), 4);
        let values = unsafe { std::slice::from_raw_parts(buffer.values_mut_ptr(), 4) }.to_vec();
        let codes = unsafe { std::slice::from_raw_parts(buffer.type_codes_mut_ptr(), 4) }.to_vec();
        let decoded: Vec<ArgValue> = values
            .into_iter()
            .zip(codes)
            .map(|(value, code)| unsafe { ArgValue::from_tvm_value(value, code) }.unwrap())
            .collect();
        assert!(matches!(decoded[0], ArgValue::Int(7)));
        assert!(matches!(&decoded[1], ArgValue::Str(s) if s == "text"));
        assert!(matches!(&decoded[2], ArgValue::Bytes(b) if b.as_ref() == [1u8, 2, 3]));
        // the buffer and the decoded argument each hold a reference
        assert_eq!(object.as_object().map(|o| o.count()), Some(3));
        drop(decoded);
        drop(buffer);
        assert_eq!(object.as_object().map(|o| o.count()), Some(1));
    }

    #[test]
    fn unclaimed_rvalue_is_released() {
        let s = TString::from("moved");
        let keep = s.clone();
        let buffer = ArgsBuffer::new(vec![ArgValue::from(s)]).unwrap();
        assert_eq!(keep.as_object().map(|o| o.count()), Some(2));
        drop(buffer);
        assert_eq!(keep.as_object().map(|o| o.count()), Some(1));
    }

    #[test]
    fn unknown_type_code() {
        let err = unsafe { ArgValue::from_tvm_value(TVMValue::default(), 99) }.unwrap_err();
        assert!(matches!(err, Error::UnknownTypeCode(99)));
    }
}
