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

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use std::os::raw::{c_char, c_int, c_void};

pub const TVM_VERSION: &str = "0.19.dev0";

pub const DLPACK_MAJOR_VERSION: u32 = 1;
pub const DLPACK_MINOR_VERSION: u32 = 0;

pub const DLPACK_FLAG_BITMASK_READ_ONLY: u64 = 1;
pub const DLPACK_FLAG_BITMASK_IS_COPIED: u64 = 1 << 1;

pub type DLDeviceType = u32;
pub const DLDeviceType_kDLCPU: DLDeviceType = 1;
pub const DLDeviceType_kDLCUDA: DLDeviceType = 2;
pub const DLDeviceType_kDLCUDAHost: DLDeviceType = 3;
pub const DLDeviceType_kDLOpenCL: DLDeviceType = 4;
pub const DLDeviceType_kDLVulkan: DLDeviceType = 7;
pub const DLDeviceType_kDLMetal: DLDeviceType = 8;
pub const DLDeviceType_kDLVPI: DLDeviceType = 9;
pub const DLDeviceType_kDLROCM: DLDeviceType = 10;
pub const DLDeviceType_kDLROCMHost: DLDeviceType = 11;
pub const DLDeviceType_kDLExtDev: DLDeviceType = 12;

pub type DLDataTypeCode = u32;
pub const DLDataTypeCode_kDLInt: DLDataTypeCode = 0;
pub const DLDataTypeCode_kDLUInt: DLDataTypeCode = 1;
pub const DLDataTypeCode_kDLFloat: DLDataTypeCode = 2;
pub const DLDataTypeCode_kDLOpaqueHandle: DLDataTypeCode = 3;
pub const DLDataTypeCode_kDLBfloat: DLDataTypeCode = 4;
pub const DLDataTypeCode_kDLComplex: DLDataTypeCode = 5;
pub const DLDataTypeCode_kDLBool: DLDataTypeCode = 6;

/// The type code carried next to every `TVMValue`.
pub type TVMArgTypeCode = u32;
pub const TVMArgTypeCode_kTVMArgInt: TVMArgTypeCode = DLDataTypeCode_kDLInt;
pub const TVMArgTypeCode_kTVMArgFloat: TVMArgTypeCode = DLDataTypeCode_kDLFloat;
pub const TVMArgTypeCode_kTVMOpaqueHandle: TVMArgTypeCode = 3;
pub const TVMArgTypeCode_kTVMNullptr: TVMArgTypeCode = 4;
pub const TVMArgTypeCode_kTVMDataType: TVMArgTypeCode = 5;
pub const TVMArgTypeCode_kDLDevice: TVMArgTypeCode = 6;
pub const TVMArgTypeCode_kTVMDLTensorHandle: TVMArgTypeCode = 7;
pub const TVMArgTypeCode_kTVMObjectHandle: TVMArgTypeCode = 8;
pub const TVMArgTypeCode_kTVMModuleHandle: TVMArgTypeCode = 9;
pub const TVMArgTypeCode_kTVMPackedFuncHandle: TVMArgTypeCode = 10;
pub const TVMArgTypeCode_kTVMStr: TVMArgTypeCode = 11;
pub const TVMArgTypeCode_kTVMBytes: TVMArgTypeCode = 12;
pub const TVMArgTypeCode_kTVMNDArrayHandle: TVMArgTypeCode = 13;
pub const TVMArgTypeCode_kTVMObjectRValueRefArg: TVMArgTypeCode = 14;
pub const TVMArgTypeCode_kTVMArgBool: TVMArgTypeCode = 15;
pub const TVMArgTypeCode_kTVMExtBegin: TVMArgTypeCode = 16;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DLDevice {
    pub device_type: DLDeviceType,
    pub device_id: c_int,
}

impl Default for DLDevice {
    fn default() -> Self {
        DLDevice {
            device_type: DLDeviceType_kDLCPU,
            device_id: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct DLDataType {
    pub code: u8,
    pub bits: u8,
    pub lanes: u16,
}

/// A plain tensor descriptor. The memory is owned elsewhere.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct DLTensor {
    pub data: *mut c_void,
    pub device: DLDevice,
    pub ndim: c_int,
    pub dtype: DLDataType,
    pub shape: *mut i64,
    /// Null for a compact row-major tensor.
    pub strides: *mut i64,
    pub byte_offset: u64,
}

impl Default for DLTensor {
    fn default() -> Self {
        DLTensor {
            data: std::ptr::null_mut(),
            device: DLDevice::default(),
            ndim: 0,
            dtype: DLDataType::default(),
            shape: std::ptr::null_mut(),
            strides: std::ptr::null_mut(),
            byte_offset: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensor {
    pub dl_tensor: DLTensor,
    pub manager_ctx: *mut c_void,
    pub deleter: Option<unsafe extern "C" fn(self_: *mut DLManagedTensor)>,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DLPackVersion {
    pub major: u32,
    pub minor: u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensorVersioned {
    pub version: DLPackVersion,
    pub manager_ctx: *mut c_void,
    pub deleter: Option<unsafe extern "C" fn(self_: *mut DLManagedTensorVersioned)>,
    pub flags: u64,
    pub dl_tensor: DLTensor,
}

/// The union stored in every argument and return slot.
#[repr(C)]
#[derive(Copy, Clone)]
pub union TVMValue {
    pub v_int64: i64,
    pub v_float64: f64,
    pub v_handle: *mut c_void,
    pub v_str: *const c_char,
    pub v_type: DLDataType,
    pub v_device: DLDevice,
}

impl Default for TVMValue {
    fn default() -> Self {
        TVMValue { v_int64: 0 }
    }
}

impl std::fmt::Debug for TVMValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Without the type code only the raw bits are meaningful.
        write!(f, "TVMValue({:#x})", unsafe { self.v_int64 })
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TVMByteArray {
    pub data: *const c_char,
    pub size: usize,
}

pub type TVMFunctionHandle = *mut c_void;
pub type TVMModuleHandle = *mut c_void;
pub type TVMObjectHandle = *mut c_void;
pub type TVMRetValueHandle = *mut c_void;
pub type TVMStreamHandle = *mut c_void;
pub type TVMArrayHandle = *mut DLTensor;

/// The signature of a packed function implemented in C.
pub type TVMPackedCFunc = Option<
    unsafe extern "C" fn(
        args: *mut TVMValue,
        type_codes: *mut c_int,
        num_args: c_int,
        ret: TVMRetValueHandle,
        resource_handle: *mut c_void,
    ) -> c_int,
>;

pub type TVMPackedCFuncFinalizer = Option<unsafe extern "C" fn(resource_handle: *mut c_void)>;

/// The signature of functions exported by a compiled system library.
pub type BackendPackedCFunc = extern "C" fn(
    args: *const TVMValue,
    type_codes: *const c_int,
    num_args: c_int,
    out_ret_value: *mut TVMValue,
    out_ret_tcode: *mut c_int,
    resource_handle: *mut c_void,
) -> c_int;
