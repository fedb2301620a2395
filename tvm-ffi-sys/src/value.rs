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

use crate::ffi::*;

macro_rules! impl_pod_tvm_value {
    ($field:ident, $field_ty:ty, $( $ty:ty ),+) => {
        $(
            impl From<$ty> for TVMValue {
                fn from(val: $ty) -> Self {
                    TVMValue { $field: val as $field_ty }
                }
            }

            impl From<TVMValue> for $ty {
                fn from(val: TVMValue) -> Self {
                    unsafe { val.$field as $ty }
                }
            }
        )+
    };
    ($field:ident, $ty:ty) => {
        impl_pod_tvm_value!($field, $ty, $ty);
    }
}

impl_pod_tvm_value!(v_int64, i64, i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);
impl_pod_tvm_value!(v_float64, f64, f32, f64);
impl_pod_tvm_value!(v_type, DLDataType);
impl_pod_tvm_value!(v_device, DLDevice);

impl From<bool> for TVMValue {
    fn from(val: bool) -> Self {
        TVMValue {
            v_int64: val as i64,
        }
    }
}

impl From<TVMValue> for bool {
    fn from(val: TVMValue) -> Self {
        unsafe { val.v_int64 != 0 }
    }
}

/// Returns the name of a type code for diagnostics.
pub fn type_code_to_str(type_code: i64) -> &'static str {
    match type_code as u32 {
        TVMArgTypeCode_kTVMArgInt => "int",
        DLDataTypeCode_kDLUInt => "uint",
        TVMArgTypeCode_kTVMArgFloat => "float",
        TVMArgTypeCode_kTVMStr => "str",
        TVMArgTypeCode_kTVMBytes => "bytes",
        TVMArgTypeCode_kTVMOpaqueHandle => "handle",
        TVMArgTypeCode_kTVMNullptr => "NULL",
        TVMArgTypeCode_kTVMDLTensorHandle => "ArrayHandle",
        TVMArgTypeCode_kTVMDataType => "DLDataType",
        TVMArgTypeCode_kDLDevice => "DLDevice",
        TVMArgTypeCode_kTVMPackedFuncHandle => "FunctionHandle",
        TVMArgTypeCode_kTVMModuleHandle => "ModuleHandle",
        TVMArgTypeCode_kTVMNDArrayHandle => "NDArrayContainer",
        TVMArgTypeCode_kTVMObjectHandle => "Object",
        TVMArgTypeCode_kTVMObjectRValueRefArg => "ObjectRValueRefArg",
        TVMArgTypeCode_kTVMArgBool => "bool",
        _ => "unknown type_code",
    }
}
