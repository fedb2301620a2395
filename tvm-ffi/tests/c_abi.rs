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

use std::convert::TryInto;
use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::{ensure, Result};
use tvm_ffi::c_api::*;
use tvm_ffi::ffi::{self, TVMFunctionHandle, TVMValue};
use tvm_ffi::{call_packed, function, Function, Module};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn last_error() -> String {
    unsafe { CStr::from_ptr(TVMGetLastError()) }
        .to_string_lossy()
        .into_owned()
}

fn add(a: i64, b: i64) -> i64 {
    a + b
}

#[test]
fn call_global_through_c() -> Result<()> {
    init_logging();
    function::register(add, "test.add")?;

    let name = CString::new("test.add")?;
    let mut handle: TVMFunctionHandle = ptr::null_mut();
    ensure!(unsafe { TVMFuncGetGlobal(name.as_ptr(), &mut handle) } == 0);
    ensure!(!handle.is_null(), "test.add was not found");

    let mut values = [TVMValue { v_int64: 3 }, TVMValue { v_int64: 4 }];
    let mut codes = [ffi::TVMArgTypeCode_kTVMArgInt as c_int; 2];
    let mut ret = TVMValue::default();
    let mut ret_code: c_int = -1;
    let status = unsafe {
        TVMFuncCall(
            handle,
            values.as_mut_ptr(),
            codes.as_mut_ptr(),
            2,
            &mut ret,
            &mut ret_code,
        )
    };
    ensure!(status == 0, "call failed: {}", last_error());
    ensure!(ret_code == ffi::TVMArgTypeCode_kTVMArgInt as c_int);
    ensure!(unsafe { ret.v_int64 } == 7);

    // one argument short
    let status = unsafe {
        TVMFuncCall(
            handle,
            values.as_mut_ptr(),
            codes.as_mut_ptr(),
            1,
            &mut ret,
            &mut ret_code,
        )
    };
    ensure!(status == -1);
    ensure!(last_error().contains("expects 2 arguments"), "{}", last_error());

    unsafe { TVMFuncFree(handle) };
    Ok(())
}

#[test]
fn missing_global_is_null() -> Result<()> {
    let name = CString::new("test.c_abi.does_not_exist")?;
    let mut handle: TVMFunctionHandle = 1 as TVMFunctionHandle;
    ensure!(unsafe { TVMFuncGetGlobal(name.as_ptr(), &mut handle) } == 0);
    ensure!(handle.is_null());
    Ok(())
}

extern "C" fn backend_double(
    args: *const TVMValue,
    type_codes: *const c_int,
    num_args: c_int,
    out_ret_value: *mut TVMValue,
    out_ret_tcode: *mut c_int,
    _resource_handle: *mut c_void,
) -> c_int {
    unsafe {
        if num_args != 1 || *type_codes != ffi::TVMArgTypeCode_kTVMArgInt as c_int {
            let msg = CString::new("double expects one integer").unwrap();
            TVMAPISetLastError(msg.as_ptr());
            return -1;
        }
        (*out_ret_value).v_int64 = (*args).v_int64 * 2;
        *out_ret_tcode = ffi::TVMArgTypeCode_kTVMArgInt as c_int;
    }
    0
}

#[test]
fn system_lib_symbols() -> Result<()> {
    init_logging();
    let name = CString::new("c_abi_double")?;
    ensure!(unsafe { TVMBackendRegisterSystemLibSymbol(name.as_ptr(), backend_double) } == 0);

    let lib = Module::system_lib();
    let double = lib
        .get_function("c_abi_double", false)
        .ok_or_else(|| anyhow::anyhow!("symbol not in the system library"))?;
    let out: i64 = call_packed!(double, 21)?.try_into()?;
    ensure!(out == 42);

    let err = call_packed!(double, "x").unwrap_err();
    ensure!(err.to_string().contains("double expects one integer"), "{}", err);

    let through_global: Option<Function> = call_packed!(
        Function::get("runtime.ModuleGetFunction").unwrap(),
        &lib,
        "c_abi_double",
        false
    )?
    .try_into()?;
    ensure!(through_global.is_some());
    Ok(())
}

static SIGNALS: AtomicI32 = AtomicI32::new(0);
static LOCKS_HELD: AtomicI32 = AtomicI32::new(0);

unsafe extern "C" fn check_signals() -> c_int {
    SIGNALS.swap(0, Ordering::SeqCst)
}

unsafe extern "C" fn gil_ensure() -> c_int {
    LOCKS_HELD.fetch_add(1, Ordering::SeqCst)
}

unsafe extern "C" fn gil_release(_: c_int) {
    LOCKS_HELD.fetch_sub(1, Ordering::SeqCst);
}

#[test]
fn env_callbacks_through_c() -> Result<()> {
    init_logging();
    let symbols: [(&str, *mut c_void); 3] = [
        ("PyErr_CheckSignals", check_signals as *mut c_void),
        ("PyGILState_Ensure", gil_ensure as *mut c_void),
        ("PyGILState_Release", gil_release as *mut c_void),
    ];
    for (name, ptr) in symbols.iter() {
        let name = CString::new(*name)?;
        ensure!(unsafe { TVMBackendRegisterEnvCAPI(name.as_ptr(), *ptr) } == 0, "{}", last_error());
    }

    tvm_ffi::env_api::check_signals()?;
    SIGNALS.store(-1, Ordering::SeqCst);
    ensure!(matches!(
        tvm_ffi::env_api::check_signals(),
        Err(tvm_ffi::Error::EnvErrorAlreadySet)
    ));
    ensure!(LOCKS_HELD.load(Ordering::SeqCst) == 0);

    let other = CString::new("PyErr_CheckSignals")?;
    let status = unsafe { TVMBackendRegisterEnvCAPI(other.as_ptr(), gil_ensure as *mut c_void) };
    ensure!(status == -1);
    ensure!(last_error().contains("PyErr_CheckSignals"), "{}", last_error());
    Ok(())
}
