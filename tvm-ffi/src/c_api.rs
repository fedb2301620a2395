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

//! The C ABI exported to other languages.
//!
//! Every entry point returns 0 on success and -1 on failure, with the
//! message available from [`TVMGetLastError`]. Errors and panics are both
//! caught here and never unwind into the caller.
//!
//! Handles returned to C carry one reference that the caller releases with
//! the matching `Free` function. Returned strings stay valid until the next
//! call on the same thread.

#![allow(non_snake_case)]

use std::any::Any;
use std::cell::RefCell;
use std::convert::TryFrom;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};

use log::trace;

use tvm_ffi_sys::ffi::{
    self, BackendPackedCFunc, DLDataType, DLDevice, DLManagedTensor, DLTensor, TVMArrayHandle,
    TVMByteArray, TVMFunctionHandle, TVMModuleHandle, TVMObjectHandle, TVMPackedCFunc,
    TVMPackedCFuncFinalizer, TVMRetValueHandle, TVMStreamHandle, TVMValue,
};

use crate::errors::{Error, NDArrayError, Result};
use crate::function::{Function, PackedFuncObj};
use crate::module::{self, Module, ModuleNode};
use crate::ndarray::{self as nd, NDArrayContainer};
use crate::object::{IsObjectRef, Object, ObjectPtr};
use crate::packed_func::ArgsBuffer;
use crate::{env_api, get_last_error, registry, set_last_error, type_context};
use crate::{ArgValue, DataType, Device, NDArray, RetValue};

/// Storage for values handed out by pointer.
#[derive(Default)]
struct ReturnStore {
    string: CString,
    bytes: Vec<u8>,
    byte_array: Option<Box<TVMByteArray>>,
    names: Vec<CString>,
    name_ptrs: Vec<*const c_char>,
}

thread_local! {
    static RETURN_STORE: RefCell<ReturnStore> = RefCell::new(ReturnStore::default());
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn safe_call<F>(name: &'static str, body: F) -> c_int
where
    F: FnOnce() -> Result<()>,
{
    trace!("{}", name);
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            set_last_error(&err);
            -1
        }
        Err(payload) => {
            set_last_error(&Error::Panic(panic_message(payload)));
            -1
        }
    }
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::Null);
    }
    Ok(CStr::from_ptr(ptr).to_str()?)
}

unsafe fn out_ptr<'a, T>(ptr: *mut T) -> Result<&'a mut T> {
    ptr.as_mut().ok_or(Error::Null)
}

unsafe fn borrow_object(handle: *mut c_void, kind: &str) -> Result<ObjectPtr<Object>> {
    ObjectPtr::from_borrowed_raw(handle as *mut Object)
        .ok_or_else(|| Error::NullHandle(kind.to_string()))
}

unsafe fn borrow_function(handle: TVMFunctionHandle) -> Result<Function> {
    let ptr = borrow_object(handle, "TVMFunctionHandle")?;
    Ok(Function::from(ptr.downcast::<PackedFuncObj>()?))
}

unsafe fn borrow_module(handle: TVMModuleHandle) -> Result<Module> {
    let ptr = borrow_object(handle, "TVMModuleHandle")?;
    Ok(Module::from(ptr.downcast::<ModuleNode>()?))
}

unsafe fn borrow_ndarray(handle: TVMArrayHandle) -> Result<NDArray> {
    let object = nd::object_from_handle(handle);
    let ptr = borrow_object(object as *mut c_void, "TVMArrayHandle")?;
    Ok(NDArray::from(ptr.downcast::<NDArrayContainer>()?))
}

fn export_function(func: Option<Function>) -> TVMFunctionHandle {
    match func.and_then(|f| f.into_ptr()) {
        Some(ptr) => ptr.into_raw() as TVMFunctionHandle,
        None => std::ptr::null_mut(),
    }
}

/// Converts a value for C, handing the carried object reference over.
fn export_value(value: RetValue) -> Result<(TVMValue, c_int)> {
    let type_code = value.type_code() as c_int;
    let payload = match value {
        RetValue::Int(v) => TVMValue { v_int64: v },
        RetValue::Float(v) => TVMValue { v_float64: v },
        RetValue::Bool(v) => TVMValue { v_int64: v as i64 },
        RetValue::Null => TVMValue::default(),
        RetValue::DataType(v) => TVMValue { v_type: v },
        RetValue::Device(v) => TVMValue { v_device: v },
        RetValue::Handle(v) => TVMValue { v_handle: v },
        RetValue::DLTensorHandle(v) => TVMValue {
            v_handle: v as *mut c_void,
        },
        RetValue::ObjectHandle(ptr) | RetValue::ModuleHandle(ptr) | RetValue::FuncHandle(ptr) => {
            TVMValue {
                v_handle: ptr.into_raw() as *mut c_void,
            }
        }
        RetValue::NDArrayHandle(ptr) => TVMValue {
            v_handle: nd::handle_from_object(ptr.into_raw()) as *mut c_void,
        },
        RetValue::Str(s) => {
            let c_string = CString::new(s)?;
            RETURN_STORE.with(|store| {
                let mut store = store.borrow_mut();
                store.string = c_string;
                TVMValue {
                    v_str: store.string.as_ptr(),
                }
            })
        }
        RetValue::Bytes(bytes) => RETURN_STORE.with(|store| {
            let mut store = store.borrow_mut();
            store.bytes = bytes;
            let array = Box::new(TVMByteArray {
                data: store.bytes.as_ptr() as *const c_char,
                size: store.bytes.len(),
            });
            let array = store.byte_array.insert(array);
            TVMValue {
                v_handle: &mut **array as *mut TVMByteArray as *mut c_void,
            }
        }),
    };
    Ok((payload, type_code))
}

unsafe fn import_args<'a>(
    values: *const TVMValue,
    type_codes: *const c_int,
    num_args: c_int,
) -> Result<Vec<ArgValue<'a>>> {
    let len = usize::try_from(num_args).map_err(|_| Error::out_of_range(num_args, "usize"))?;
    if len == 0 {
        return Ok(Vec::new());
    }
    if values.is_null() || type_codes.is_null() {
        return Err(Error::Null);
    }
    let values = std::slice::from_raw_parts(values, len);
    let type_codes = std::slice::from_raw_parts(type_codes, len);
    values
        .iter()
        .zip(type_codes)
        .map(|(&value, &code)| ArgValue::from_tvm_value(value, code))
        .collect()
}

#[no_mangle]
pub extern "C" fn TVMGetLastError() -> *const c_char {
    crate::last_error_ptr()
}

#[no_mangle]
pub unsafe extern "C" fn TVMAPISetLastError(msg: *const c_char) {
    if msg.is_null() {
        return;
    }
    set_last_error(&*CStr::from_ptr(msg).to_string_lossy());
}

#[no_mangle]
pub unsafe extern "C" fn TVMFuncCall(
    func: TVMFunctionHandle,
    arg_values: *mut TVMValue,
    type_codes: *mut c_int,
    num_args: c_int,
    ret_val: *mut TVMValue,
    ret_type_code: *mut c_int,
) -> c_int {
    safe_call("TVMFuncCall", || {
        let ret_val = out_ptr(ret_val)?;
        let ret_type_code = out_ptr(ret_type_code)?;
        let func = borrow_function(func)?;
        let args = import_args(arg_values, type_codes, num_args)?;
        let (value, code) = export_value(func.invoke(args)?)?;
        *ret_val = value;
        *ret_type_code = code;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMFuncFree(func: TVMFunctionHandle) -> c_int {
    TVMObjectFree(func)
}

#[no_mangle]
pub unsafe extern "C" fn TVMFuncGetGlobal(name: *const c_char, out: *mut TVMFunctionHandle) -> c_int {
    safe_call("TVMFuncGetGlobal", || {
        let name = c_str(name)?;
        *out_ptr(out)? = export_function(registry::get(name).cloned());
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMFuncRegisterGlobal(
    name: *const c_char,
    func: TVMFunctionHandle,
    override_: c_int,
) -> c_int {
    safe_call("TVMFuncRegisterGlobal", || {
        let name = c_str(name)?;
        registry::register(name, borrow_function(func)?, override_ != 0)
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMFuncRemoveGlobal(name: *const c_char) -> c_int {
    safe_call("TVMFuncRemoveGlobal", || {
        registry::remove(c_str(name)?);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMFuncListGlobalNames(
    out_size: *mut c_int,
    out_array: *mut *const *const c_char,
) -> c_int {
    safe_call("TVMFuncListGlobalNames", || {
        let names = registry::list_names()
            .into_iter()
            .map(CString::new)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        RETURN_STORE.with(|store| {
            let mut store = store.borrow_mut();
            store.name_ptrs = names.iter().map(|name| name.as_ptr()).collect();
            store.names = names;
            *out_ptr(out_size)? = store.name_ptrs.len() as c_int;
            *out_ptr(out_array)? = store.name_ptrs.as_ptr();
            Ok(())
        })
    })
}

/// A C callback and the resource it closes over.
struct CFunc {
    func: unsafe extern "C" fn(*mut TVMValue, *mut c_int, c_int, TVMRetValueHandle, *mut c_void) -> c_int,
    resource: *mut c_void,
    finalizer: TVMPackedCFuncFinalizer,
}

// The resource is owned by the function object from here on.
unsafe impl Send for CFunc {}
unsafe impl Sync for CFunc {}

impl CFunc {
    fn call(&self, args: Vec<ArgValue<'_>>) -> Result<RetValue> {
        let mut buffer = ArgsBuffer::new(args)?;
        let mut ret = RetValue::Null;
        let num_args = buffer.len() as c_int;
        let code = unsafe {
            (self.func)(
                buffer.values_mut_ptr(),
                buffer.type_codes_mut_ptr(),
                num_args,
                &mut ret as *mut RetValue as TVMRetValueHandle,
                self.resource,
            )
        };
        match code {
            0 => Ok(ret),
            -2 => Err(Error::EnvErrorAlreadySet),
            _ => Err(Error::CallFailed(get_last_error())),
        }
    }
}

impl Drop for CFunc {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer {
            unsafe { finalizer(self.resource) };
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn TVMFuncCreateFromCFunc(
    func: TVMPackedCFunc,
    resource_handle: *mut c_void,
    fin: TVMPackedCFuncFinalizer,
    out: *mut TVMFunctionHandle,
) -> c_int {
    safe_call("TVMFuncCreateFromCFunc", || {
        let out = out_ptr(out)?;
        let func = func.ok_or_else(|| Error::NullHandle("TVMPackedCFunc".to_string()))?;
        let cfunc = CFunc {
            func,
            resource: resource_handle,
            finalizer: fin,
        };
        let function = Function::from_packed(move |args| cfunc.call(args));
        *out = export_function(Some(function));
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMCFuncSetReturn(
    ret: TVMRetValueHandle,
    value: *mut TVMValue,
    type_code: *mut c_int,
    num_ret: c_int,
) -> c_int {
    safe_call("TVMCFuncSetReturn", || {
        assert_eq!(num_ret, 1, "TVMCFuncSetReturn expects exactly one value");
        let ret = out_ptr(ret as *mut RetValue)?;
        // the callee keeps its own reference, the return value takes a new one
        *ret = RetValue::from(ArgValue::from_tvm_value(*out_ptr(value)?, *out_ptr(type_code)?)?);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMCbArgToReturn(value: *mut TVMValue, code: *mut c_int) -> c_int {
    safe_call("TVMCbArgToReturn", || {
        let value = out_ptr(value)?;
        let code = out_ptr(code)?;
        let arg = ArgValue::from_tvm_value(*value, *code)?;
        if arg.as_object().is_some() {
            let (exported, exported_code) = export_value(RetValue::from(arg))?;
            *value = exported;
            *code = exported_code;
        }
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMObjectGetTypeIndex(obj: TVMObjectHandle, out_tindex: *mut c_uint) -> c_int {
    safe_call("TVMObjectGetTypeIndex", || {
        let object = (obj as *const Object)
            .as_ref()
            .ok_or_else(|| Error::NullHandle("TVMObjectHandle".to_string()))?;
        *out_ptr(out_tindex)? = object.type_index();
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMObjectRetain(obj: TVMObjectHandle) -> c_int {
    safe_call("TVMObjectRetain", || {
        if let Some(object) = (obj as *const Object).as_ref() {
            object.inc_ref();
        }
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMObjectFree(obj: TVMObjectHandle) -> c_int {
    safe_call("TVMObjectFree", || {
        if !obj.is_null() {
            Object::dec_ref(obj as *mut Object);
        }
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMObjectTypeKey2Index(
    type_key: *const c_char,
    out_tindex: *mut c_uint,
) -> c_int {
    safe_call("TVMObjectTypeKey2Index", || {
        *out_ptr(out_tindex)? = type_context::type_key2index(c_str(type_key)?)?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMObjectTypeIndex2Key(tindex: c_uint, out_type_key: *mut *mut c_char) -> c_int {
    safe_call("TVMObjectTypeIndex2Key", || {
        let key = CString::new(type_context::type_index2key(tindex)?)?;
        let out = out_ptr(out_type_key)?;
        RETURN_STORE.with(|store| {
            let mut store = store.borrow_mut();
            store.string = key;
            *out = store.string.as_ptr() as *mut c_char;
        });
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMObjectDerivedFrom(
    child_type_index: c_uint,
    parent_type_index: c_uint,
    is_derived: *mut c_int,
) -> c_int {
    safe_call("TVMObjectDerivedFrom", || {
        *out_ptr(is_derived)? = type_context::derived_from(child_type_index, parent_type_index) as c_int;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMArrayAlloc(
    shape: *const i64,
    ndim: c_int,
    dtype_code: c_int,
    dtype_bits: c_int,
    dtype_lanes: c_int,
    device_type: c_int,
    device_id: c_int,
    out: *mut TVMArrayHandle,
) -> c_int {
    safe_call("TVMArrayAlloc", || {
        let out = out_ptr(out)?;
        let ndim = usize::try_from(ndim).map_err(|_| Error::out_of_range(ndim, "usize"))?;
        let shape = if ndim == 0 {
            &[][..]
        } else if shape.is_null() {
            return Err(Error::Null);
        } else {
            std::slice::from_raw_parts(shape, ndim)
        };
        let dtype = DataType::from(DLDataType {
            code: dtype_code as u8,
            bits: dtype_bits as u8,
            lanes: dtype_lanes as u16,
        });
        let device = Device::try_from(DLDevice {
            device_type: device_type as ffi::DLDeviceType,
            device_id,
        })?;
        let array = NDArray::empty(shape, dtype, device)?;
        let ptr = array.into_ptr().ok_or(Error::Null)?;
        *out = nd::handle_from_object(ptr.into_base().into_raw());
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMArrayFree(handle: TVMArrayHandle) -> c_int {
    safe_call("TVMArrayFree", || {
        let object = nd::object_from_handle(handle);
        if !object.is_null() {
            Object::dec_ref(object);
        }
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMArrayCopyFromTo(
    from: TVMArrayHandle,
    to: TVMArrayHandle,
    _stream: TVMStreamHandle,
) -> c_int {
    safe_call("TVMArrayCopyFromTo", || {
        let from = (from as *const DLTensor).as_ref().ok_or(Error::Null)?;
        let to = (to as *const DLTensor).as_ref().ok_or(Error::Null)?;
        for tensor in &[from, to] {
            if tensor.device.device_type != ffi::DLDeviceType_kDLCPU {
                let device = Device::try_from(tensor.device)?;
                return Err(NDArrayError::UnsupportedDevice(device.to_string()).into());
            }
            if !tvm_ffi_sys::array::is_contiguous(tensor) {
                return Err(NDArrayError::NotContiguous.into());
            }
        }
        let (from_size, to_size) = (
            tvm_ffi_sys::array::data_size(from),
            tvm_ffi_sys::array::data_size(to),
        );
        if from_size != to_size {
            return Err(NDArrayError::SizeMismatch {
                expected: to_size,
                actual: from_size,
            }
            .into());
        }
        let src = (from.data as *const u8).add(from.byte_offset as usize);
        let dst = (to.data as *mut u8).add(to.byte_offset as usize);
        std::ptr::copy(src, dst, from_size);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMArrayFromDLPack(from: *mut DLManagedTensor, out: *mut TVMArrayHandle) -> c_int {
    safe_call("TVMArrayFromDLPack", || {
        let out = out_ptr(out)?;
        if from.is_null() {
            return Err(Error::Null);
        }
        let array = NDArray::from_dlpack(from)?;
        let ptr = array.into_ptr().ok_or(Error::Null)?;
        *out = nd::handle_from_object(ptr.into_base().into_raw());
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMArrayToDLPack(from: TVMArrayHandle, out: *mut *mut DLManagedTensor) -> c_int {
    safe_call("TVMArrayToDLPack", || {
        *out_ptr(out)? = borrow_ndarray(from)?.to_dlpack();
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMDLManagedTensorCallDeleter(dltensor: *mut DLManagedTensor) {
    if let Some(tensor) = dltensor.as_ref() {
        if let Some(deleter) = tensor.deleter {
            deleter(dltensor);
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn TVMModGetFunction(
    module: TVMModuleHandle,
    func_name: *const c_char,
    query_imports: c_int,
    out: *mut TVMFunctionHandle,
) -> c_int {
    safe_call("TVMModGetFunction", || {
        let module = borrow_module(module)?;
        let name = c_str(func_name)?;
        *out_ptr(out)? = export_function(module.get_function(name, query_imports != 0));
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMModFree(module: TVMModuleHandle) -> c_int {
    TVMObjectFree(module)
}

#[no_mangle]
pub unsafe extern "C" fn TVMBackendRegisterSystemLibSymbol(
    name: *const c_char,
    func: BackendPackedCFunc,
) -> c_int {
    safe_call("TVMBackendRegisterSystemLibSymbol", || {
        module::register_system_lib_symbol(c_str(name)?, func);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn TVMBackendRegisterEnvCAPI(name: *const c_char, ptr: *mut c_void) -> c_int {
    safe_call("TVMBackendRegisterEnvCAPI", || {
        env_api::register_symbol(c_str(name)?, ptr)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{call_packed, String as TString};
    use std::convert::TryInto;

    fn last_error() -> String {
        unsafe { CStr::from_ptr(TVMGetLastError()) }
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn errors_become_return_codes() {
        let name = CString::new("c_api.test.missing").unwrap();
        let mut handle: TVMFunctionHandle = std::ptr::null_mut();
        assert_eq!(unsafe { TVMFuncGetGlobal(name.as_ptr(), &mut handle) }, 0);
        assert!(handle.is_null());

        let code = unsafe { TVMFuncRegisterGlobal(name.as_ptr(), std::ptr::null_mut(), 0) };
        assert_eq!(code, -1);
        assert!(last_error().contains("TVMFunctionHandle"), "{}", last_error());

        let message = CString::new("set from C").unwrap();
        unsafe { TVMAPISetLastError(message.as_ptr()) };
        assert_eq!(last_error(), "set from C");
    }

    #[test]
    fn panics_are_caught() {
        let func = Function::from_packed(|_| panic!("boom"));
        let handle = export_function(Some(func));
        let mut ret = TVMValue::default();
        let mut code = 0;
        let status = unsafe {
            TVMFuncCall(handle, std::ptr::null_mut(), std::ptr::null_mut(), 0, &mut ret, &mut code)
        };
        assert_eq!(status, -1);
        assert!(last_error().contains("boom"));
        assert_eq!(unsafe { TVMFuncFree(handle) }, 0);
    }

    #[test]
    fn string_results_use_thread_local_storage() {
        let func = Function::from_packed(|_| Ok(RetValue::from("hello")));
        let handle = export_function(Some(func));
        let mut ret = TVMValue::default();
        let mut code = 0;
        let status = unsafe {
            TVMFuncCall(handle, std::ptr::null_mut(), std::ptr::null_mut(), 0, &mut ret, &mut code)
        };
        assert_eq!(status, 0);
        assert_eq!(code, ffi::TVMArgTypeCode_kTVMStr as c_int);
        assert_eq!(unsafe { CStr::from_ptr(ret.v_str) }.to_str().unwrap(), "hello");
        unsafe { TVMFuncFree(handle) };
    }

    #[test]
    fn object_handles_carry_a_reference() {
        let s = TString::from("held");
        let func = Function::from_packed({
            let s = s.clone();
            move |_| Ok(RetValue::from(s.clone()))
        });
        let handle = export_function(Some(func));
        let mut ret = TVMValue::default();
        let mut code = 0;
        unsafe {
            assert_eq!(
                TVMFuncCall(handle, std::ptr::null_mut(), std::ptr::null_mut(), 0, &mut ret, &mut code),
                0
            );
        }
        assert_eq!(code, ffi::TVMArgTypeCode_kTVMObjectHandle as c_int);
        // `s`, the closure's copy and the returned handle
        assert_eq!(s.as_object().map(|o| o.count()), Some(3));

        let mut tindex = 0;
        unsafe { TVMObjectGetTypeIndex(ret.v_handle, &mut tindex) };
        let mut key: *mut c_char = std::ptr::null_mut();
        unsafe { TVMObjectTypeIndex2Key(tindex, &mut key) };
        assert_eq!(unsafe { CStr::from_ptr(key) }.to_str().unwrap(), "runtime.String");

        unsafe {
            TVMObjectRetain(ret.v_handle);
            TVMObjectFree(ret.v_handle);
            TVMObjectFree(ret.v_handle);
            TVMFuncFree(handle);
        }
        assert_eq!(s.as_object().map(|o| o.count()), Some(1));
    }

    #[test]
    fn type_queries() {
        let key = CString::new("runtime.String").unwrap();
        let mut index = 0;
        assert_eq!(unsafe { TVMObjectTypeKey2Index(key.as_ptr(), &mut index) }, 0);
        let mut derived = 0;
        unsafe { TVMObjectDerivedFrom(index, 0, &mut derived) };
        assert_eq!(derived, 1);
        unsafe { TVMObjectDerivedFrom(0, index, &mut derived) };
        assert_eq!(derived, 0);
        let unknown = CString::new("c_api.test.NoSuchType").unwrap();
        assert_eq!(unsafe { TVMObjectTypeKey2Index(unknown.as_ptr(), &mut index) }, -1);
    }

    unsafe extern "C" fn add_callback(
        args: *mut TVMValue,
        type_codes: *mut c_int,
        num_args: c_int,
        ret: TVMRetValueHandle,
        resource: *mut c_void,
    ) -> c_int {
        if num_args != 2 {
            let message = CString::new("add expects two arguments").unwrap();
            TVMAPISetLastError(message.as_ptr());
            return -1;
        }
        let offset = *(resource as *const i64);
        let (a, b) = ((*args).v_int64, (*args.add(1)).v_int64);
        let _ = type_codes;
        let mut value = TVMValue {
            v_int64: a + b + offset,
        };
        let mut code = ffi::TVMArgTypeCode_kTVMArgInt as c_int;
        TVMCFuncSetReturn(ret, &mut value, &mut code, 1)
    }

    unsafe extern "C" fn free_resource(resource: *mut c_void) {
        drop(Box::from_raw(resource as *mut i64));
    }

    #[test]
    fn functions_from_c_callbacks() {
        let resource = Box::into_raw(Box::new(100i64)) as *mut c_void;
        let mut handle: TVMFunctionHandle = std::ptr::null_mut();
        let status = unsafe {
            TVMFuncCreateFromCFunc(Some(add_callback), resource, Some(free_resource), &mut handle)
        };
        assert_eq!(status, 0);
        let func = unsafe { borrow_function(handle) }.unwrap();
        unsafe { TVMFuncFree(handle) };

        let sum: i64 = call_packed!(func, 1, 2).unwrap().try_into().unwrap();
        assert_eq!(sum, 103);
        let err = call_packed!(func, 1).unwrap_err();
        assert!(err.to_string().contains("add expects two arguments"), "{}", err);
    }

    unsafe extern "C" fn owned_string_callback(
        _args: *mut TVMValue,
        _type_codes: *mut c_int,
        _num_args: c_int,
        ret: TVMRetValueHandle,
        _resource: *mut c_void,
    ) -> c_int {
        let owned = TString::from("from C").into_ptr().unwrap().into_base().into_raw();
        let mut value = TVMValue {
            v_handle: owned as *mut c_void,
        };
        let mut code = ffi::TVMArgTypeCode_kTVMObjectHandle as c_int;
        let status = TVMCFuncSetReturn(ret, &mut value, &mut code, 1);
        // the callback still owns its handle and releases it here
        TVMObjectFree(owned as TVMObjectHandle);
        status
    }

    #[test]
    fn returned_objects_keep_a_reference() {
        let mut handle: TVMFunctionHandle = std::ptr::null_mut();
        let status = unsafe {
            TVMFuncCreateFromCFunc(Some(owned_string_callback), std::ptr::null_mut(), None, &mut handle)
        };
        assert_eq!(status, 0);
        let func = unsafe { borrow_function(handle) }.unwrap();
        unsafe { TVMFuncFree(handle) };

        let ret = call_packed!(func).unwrap();
        assert_eq!(ret.as_object().map(|o| o.count()), Some(1));
        let s: TString = ret.try_into().unwrap();
        assert_eq!(s, "from C");
        assert_eq!(s.as_object().map(|o| o.count()), Some(1));
    }

    #[test]
    fn callback_args_become_owned_returns() {
        let s = TString::from("argument");
        let raw = s.as_ptr().unwrap().as_raw();
        let mut value = TVMValue {
            v_handle: raw as *mut c_void,
        };
        let mut code = ffi::TVMArgTypeCode_kTVMObjectHandle as c_int;
        assert_eq!(unsafe { TVMCbArgToReturn(&mut value, &mut code) }, 0);
        assert_eq!(code, ffi::TVMArgTypeCode_kTVMObjectHandle as c_int);
        assert_eq!(unsafe { value.v_handle }, raw as *mut c_void);
        assert_eq!(s.as_object().map(|o| o.count()), Some(2));
        unsafe { TVMObjectFree(value.v_handle) };
        assert_eq!(s.as_object().map(|o| o.count()), Some(1));
    }

    #[test]
    fn null_out_pointers_do_not_leak() {
        let s = TString::from("kept");
        let func = Function::from_packed({
            let s = s.clone();
            move |_| Ok(RetValue::from(s.clone()))
        });
        let handle = export_function(Some(func));
        let mut code = 0;
        let status = unsafe {
            TVMFuncCall(
                handle,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                &mut code,
            )
        };
        assert_eq!(status, -1);
        // `s` and the closure's copy only
        assert_eq!(s.as_object().map(|o| o.count()), Some(2));
        unsafe { TVMFuncFree(handle) };
        assert_eq!(s.as_object().map(|o| o.count()), Some(1));
    }

    #[test]
    fn arrays_through_handles() {
        let shape = [2i64, 3];
        let mut a: TVMArrayHandle = std::ptr::null_mut();
        let mut b: TVMArrayHandle = std::ptr::null_mut();
        unsafe {
            assert_eq!(TVMArrayAlloc(shape.as_ptr(), 2, 2, 32, 1, 1, 0, &mut a), 0);
            assert_eq!(TVMArrayAlloc(shape.as_ptr(), 2, 2, 32, 1, 1, 0, &mut b), 0);
        }
        let mut src = unsafe { borrow_ndarray(a) }.unwrap();
        src.copy_from_buffer(&[1f32, 2., 3., 4., 5., 6.]).unwrap();
        assert_eq!(unsafe { TVMArrayCopyFromTo(a, b, std::ptr::null_mut()) }, 0);
        let dst = unsafe { borrow_ndarray(b) }.unwrap();
        assert_eq!(dst.copy_to_vec::<f32>().unwrap(), vec![1., 2., 3., 4., 5., 6.]);

        let mut managed: *mut DLManagedTensor = std::ptr::null_mut();
        assert_eq!(unsafe { TVMArrayToDLPack(a, &mut managed) }, 0);
        let mut imported: TVMArrayHandle = std::ptr::null_mut();
        assert_eq!(unsafe { TVMArrayFromDLPack(managed, &mut imported) }, 0);
        let view = unsafe { borrow_ndarray(imported) }.unwrap();
        assert_eq!(view.copy_to_vec::<f32>().unwrap()[5], 6.);

        let on_gpu = unsafe { TVMArrayAlloc(shape.as_ptr(), 2, 2, 32, 1, 2, 0, &mut b) };
        assert_eq!(on_gpu, -1);

        drop((src, dst, view));
        unsafe {
            TVMArrayFree(imported);
            TVMArrayFree(a);
            TVMArrayFree(b);
        }
    }

    #[test]
    fn module_functions() {
        let module = Module::new("c_api_test");
        module.register_function("one", Function::from_packed(|_| Ok(RetValue::Int(1))));
        let handle = module.clone().into_ptr().unwrap().into_base().into_raw() as TVMModuleHandle;
        let name = CString::new("one").unwrap();
        let mut func: TVMFunctionHandle = std::ptr::null_mut();
        assert_eq!(unsafe { TVMModGetFunction(handle, name.as_ptr(), 0, &mut func) }, 0);
        assert!(!func.is_null());
        unsafe {
            TVMFuncFree(func);
            TVMModFree(handle);
        }
        assert_eq!(module.as_object().map(|o| o.count()), Some(1));
    }

    #[test]
    fn list_and_remove_globals() {
        let name = CString::new("c_api.test.listed").unwrap();
        let func = export_function(Some(Function::from_packed(|_| Ok(RetValue::Null))));
        assert_eq!(unsafe { TVMFuncRegisterGlobal(name.as_ptr(), func, 1) }, 0);
        unsafe { TVMFuncFree(func) };

        let mut size = 0;
        let mut array: *const *const c_char = std::ptr::null();
        assert_eq!(unsafe { TVMFuncListGlobalNames(&mut size, &mut array) }, 0);
        let names: Vec<&str> = unsafe { std::slice::from_raw_parts(array, size as usize) }
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_str().unwrap())
            .collect();
        assert!(names.contains(&"c_api.test.listed"));

        assert_eq!(unsafe { TVMFuncRemoveGlobal(name.as_ptr()) }, 0);
        assert!(registry::get("c_api.test.listed").is_none());
    }

    #[test]
    fn unknown_env_symbol() {
        let name = CString::new("c_api_test_symbol").unwrap();
        let status = unsafe { TVMBackendRegisterEnvCAPI(name.as_ptr(), 1usize as *mut c_void) };
        assert_eq!(status, -1);
        assert!(last_error().contains("c_api_test_symbol"));
    }
}
