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

//! [TVM](https://github.com/apache/tvm) is a compiler stack for deep learning systems.
//!
//! This crate implements the TVM object system and the PackedFunc calling
//! convention natively in Rust: reference counted objects with a runtime
//! type hierarchy, tagged argument and return values, a global function
//! registry, the core containers, reflection and the C ABI that other
//! languages use to talk to all of the above.

extern crate self as tvm_ffi;

use std::cell::RefCell;
use std::convert::TryFrom;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Calls a packed function, converting every argument with `Into<ArgValue>`.
///
/// # Example
///
/// `call_packed!(my_func, &arg1, arg2)`
#[macro_export]
macro_rules! call_packed {
    ($fn:expr $(, $args:expr)* $(,)?) => {
        $fn.invoke(vec![$($crate::ArgValue::from($args),)*])
    };
}

#[macro_export]
macro_rules! tvm_call {
    ($e:expr) => {{
        if unsafe { $e } != 0 {
            Err($crate::errors::Error::CallFailed($crate::get_last_error()))
        } else {
            Ok(())
        }
    }};
}

pub mod array;
pub mod boxed;
mod builtins;
pub mod c_api;
pub mod config;
pub mod env_api;
pub mod errors;
pub mod function;
pub mod map;
pub mod module;
pub mod ndarray;
pub mod object;
pub mod optional;
pub mod packed_func;
pub mod params;
pub mod reflection;
pub mod registry;
pub mod shape_tuple;
pub mod string;
pub mod to_boxed_fn;
pub mod to_function;
pub mod type_context;
pub mod value;
pub mod variant;

pub use crate::{
    array::Array,
    boxed::{Bool, Float, Int},
    errors::*,
    function::Function,
    map::Map,
    module::Module,
    ndarray::NDArray,
    object::{IsObject, IsObjectRef, Object, ObjectPtr, ObjectRef},
    packed_func::{ArgValue, RetValue},
    shape_tuple::ShapeTuple,
    string::String,
    variant::Variant,
};

pub use tvm_ffi_sys::{ffi, ByteArray, DataType, Device, DeviceType};

pub use tvm_ffi_macros::{external, Object, Reflect};

#[doc(hidden)]
pub use once_cell;

thread_local! {
    static LAST_ERROR: RefCell<std::ffi::CString> = RefCell::new(std::ffi::CString::default());
}

/// Gets the last error message recorded on this thread.
pub fn get_last_error() -> std::string::String {
    LAST_ERROR.with(|err| err.borrow().to_string_lossy().into_owned())
}

pub(crate) fn last_error_ptr() -> *const std::os::raw::c_char {
    LAST_ERROR.with(|err| err.borrow().as_ptr())
}

pub(crate) fn set_last_error<E: std::fmt::Display + ?Sized>(err: &E) {
    let message = err.to_string().replace('\0', "\\0");
    LAST_ERROR.with(|last| {
        *last.borrow_mut() = std::ffi::CString::new(message).unwrap_or_default();
    });
}

/// Outputs the current TVM version.
pub fn version() -> &'static str {
    config::TVM_VERSION
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> TryFrom<std::result::Result<T, E>> for RetValue
where
    RetValue: TryFrom<T>,
    Error: From<E> + From<<RetValue as TryFrom<T>>::Error>,
{
    type Error = Error;

    fn try_from(val: std::result::Result<T, E>) -> Result<RetValue> {
        Ok(<RetValue as TryFrom<T>>::try_from(val?)?)
    }
}
