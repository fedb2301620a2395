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

//! Conversions between Rust values and [`ArgValue`]/[`RetValue`].
//!
//! Plain values coerce the way the C++ runtime does: integers accept
//! booleans, floats accept integers and booleans, and boxed primitives are
//! unboxed before any check. Narrow integers are range-checked.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::os::raw::c_void;

use tvm_ffi_sys::ffi::{DLDataType, DLDevice, DLTensor};
use tvm_ffi_sys::{ByteArray, DataType, Device};

use crate::errors::{Error, Result};
use crate::string::StringObj;
use crate::{ArgValue, RetValue};

macro_rules! try_downcast {
    ($val:ident -> $into:ty, $( |$pat:pat| { $converter:expr } ),+ ) => {
        match $val {
            $( $pat => { Ok($converter) } )+
            other => Err(Error::downcast(other.type_name(), stringify!($into))),
        }
    };
}

/// Replaces a boxed primitive by the plain value it holds.
fn unboxed(val: ArgValue<'_>) -> ArgValue<'_> {
    if let Some(object) = val.as_object() {
        return ArgValue::from_object(Some(object.clone()), false);
    }
    val
}

fn to_i64(val: ArgValue<'_>, target: &'static str) -> Result<i64> {
    match unboxed(val) {
        ArgValue::Int(v) => Ok(v),
        ArgValue::Bool(v) => Ok(v as i64),
        other => Err(Error::downcast(other.type_name(), target)),
    }
}

/// Plain values that go in as their own variant.
macro_rules! impl_pod_into {
    ($variant:ident, $inner_ty:ty, [ $( $type:ty ),+ ]) => {
        $(
            impl<'a> From<$type> for ArgValue<'a> {
                fn from(val: $type) -> Self {
                    ArgValue::$variant(val as $inner_ty)
                }
            }

            impl<'a> From<&'a $type> for ArgValue<'a> {
                fn from(val: &'a $type) -> Self {
                    ArgValue::$variant(*val as $inner_ty)
                }
            }

            impl From<$type> for RetValue {
                fn from(val: $type) -> Self {
                    RetValue::$variant(val as $inner_ty)
                }
            }
        )+
    };
}

impl_pod_into!(Int, i64, [i8, i16, i32, i64, isize, u8, u16, u32]);
impl_pod_into!(Float, f64, [f32, f64]);
impl_pod_into!(Bool, bool, [bool]);

/// Unsigned 64-bit values must fit the signed slot.
macro_rules! impl_wide_unsigned_into {
    ($( $type:ty ),+) => {
        $(
            impl<'a> From<$type> for ArgValue<'a> {
                fn from(val: $type) -> Self {
                    ArgValue::Int(checked_i64(val as u64))
                }
            }

            impl<'a> From<&'a $type> for ArgValue<'a> {
                fn from(val: &'a $type) -> Self {
                    ArgValue::Int(checked_i64(*val as u64))
                }
            }

            impl From<$type> for RetValue {
                fn from(val: $type) -> Self {
                    RetValue::Int(checked_i64(val as u64))
                }
            }
        )+
    };
}

fn checked_i64(val: u64) -> i64 {
    match i64::try_from(val) {
        Ok(val) => val,
        Err(_) => panic!("value {} does not fit into a signed 64-bit integer", val),
    }
}

impl_wide_unsigned_into!(u64, usize);

macro_rules! impl_int_from_value {
    ($( $type:ty ),+) => {
        $(
            impl<'a> TryFrom<ArgValue<'a>> for $type {
                type Error = Error;

                fn try_from(val: ArgValue<'a>) -> Result<$type> {
                    let v = to_i64(val, stringify!($type))?;
                    <$type>::try_from(v).map_err(|_| Error::out_of_range(v, stringify!($type)))
                }
            }

            impl TryFrom<RetValue> for $type {
                type Error = Error;

                fn try_from(val: RetValue) -> Result<$type> {
                    <$type>::try_from(ArgValue::from(val))
                }
            }
        )+
    };
}

impl_int_from_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<'a> TryFrom<ArgValue<'a>> for f64 {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<f64> {
        let val = unboxed(val);
        try_downcast!(val -> f64,
            |ArgValue::Float(v)| { v },
            |ArgValue::Int(v)| { v as f64 },
            |ArgValue::Bool(v)| { v as i64 as f64 })
    }
}

impl<'a> TryFrom<ArgValue<'a>> for f32 {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<f32> {
        f64::try_from(val).map(|v| v as f32)
    }
}

impl<'a> TryFrom<ArgValue<'a>> for bool {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<bool> {
        let val = unboxed(val);
        try_downcast!(val -> bool,
            |ArgValue::Bool(v)| { v },
            |ArgValue::Int(v)| { v != 0 })
    }
}

impl<'a> From<&'a str> for ArgValue<'a> {
    fn from(s: &'a str) -> Self {
        ArgValue::Str(Cow::Borrowed(s))
    }
}

impl<'a> From<&'a std::string::String> for ArgValue<'a> {
    fn from(s: &'a std::string::String) -> Self {
        ArgValue::Str(Cow::Borrowed(s.as_str()))
    }
}

impl<'a> From<std::string::String> for ArgValue<'a> {
    fn from(s: std::string::String) -> Self {
        ArgValue::Str(Cow::Owned(s))
    }
}

impl From<&str> for RetValue {
    fn from(s: &str) -> Self {
        RetValue::Str(s.to_owned())
    }
}

impl From<std::string::String> for RetValue {
    fn from(s: std::string::String) -> Self {
        RetValue::Str(s)
    }
}

impl<'a> TryFrom<ArgValue<'a>> for std::string::String {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<std::string::String> {
        if let Some(s) = val.as_object().and_then(|o| o.downcast_ref::<StringObj>()) {
            return Ok(s.as_str().to_owned());
        }
        match val {
            ArgValue::Str(s) => Ok(s.into_owned()),
            ArgValue::Bytes(b) => std::string::String::from_utf8(b.into_owned())
                .map_err(|err| Error::Utf8(err.utf8_error())),
            ArgValue::DataType(dtype) => Ok(DataType::from(dtype).to_string()),
            other => Err(Error::downcast(other.type_name(), "String")),
        }
    }
}

impl<'a> From<ByteArray<'a>> for ArgValue<'a> {
    fn from(arr: ByteArray<'a>) -> Self {
        ArgValue::Bytes(Cow::Borrowed(arr.data()))
    }
}

impl<'a> From<&'a [u8]> for ArgValue<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ArgValue::Bytes(Cow::Borrowed(bytes))
    }
}

impl<'a> From<Vec<u8>> for ArgValue<'a> {
    fn from(bytes: Vec<u8>) -> Self {
        ArgValue::Bytes(Cow::Owned(bytes))
    }
}

impl<'a> From<ByteArray<'a>> for RetValue {
    fn from(arr: ByteArray<'a>) -> Self {
        RetValue::Bytes(arr.to_vec())
    }
}

impl From<Vec<u8>> for RetValue {
    fn from(bytes: Vec<u8>) -> Self {
        RetValue::Bytes(bytes)
    }
}

impl<'a> TryFrom<ArgValue<'a>> for Vec<u8> {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<Vec<u8>> {
        try_downcast!(val -> Vec<u8>,
            |ArgValue::Bytes(b)| { b.into_owned() },
            |ArgValue::Str(s)| { s.into_owned().into_bytes() })
    }
}

impl<'a> From<DataType> for ArgValue<'a> {
    fn from(dtype: DataType) -> Self {
        ArgValue::DataType(dtype.into())
    }
}

impl<'a> From<DLDataType> for ArgValue<'a> {
    fn from(dtype: DLDataType) -> Self {
        ArgValue::DataType(dtype)
    }
}

impl From<DataType> for RetValue {
    fn from(dtype: DataType) -> Self {
        RetValue::DataType(dtype.into())
    }
}

impl From<DLDataType> for RetValue {
    fn from(dtype: DLDataType) -> Self {
        RetValue::DataType(dtype)
    }
}

impl<'a> TryFrom<ArgValue<'a>> for DataType {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<DataType> {
        if let Some(s) = val.as_object().and_then(|o| o.downcast_ref::<StringObj>()) {
            return Ok(s.as_str().parse()?);
        }
        match val {
            ArgValue::DataType(dtype) => Ok(dtype.into()),
            ArgValue::Str(s) => Ok(s.parse()?),
            other => Err(Error::downcast(other.type_name(), "DataType")),
        }
    }
}

impl<'a> TryFrom<ArgValue<'a>> for DLDataType {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<DLDataType> {
        DataType::try_from(val).map(DLDataType::from)
    }
}

impl<'a> From<Device> for ArgValue<'a> {
    fn from(dev: Device) -> Self {
        ArgValue::Device(dev.into())
    }
}

impl<'a> From<DLDevice> for ArgValue<'a> {
    fn from(dev: DLDevice) -> Self {
        ArgValue::Device(dev)
    }
}

impl From<Device> for RetValue {
    fn from(dev: Device) -> Self {
        RetValue::Device(dev.into())
    }
}

impl From<DLDevice> for RetValue {
    fn from(dev: DLDevice) -> Self {
        RetValue::Device(dev)
    }
}

impl<'a> TryFrom<ArgValue<'a>> for DLDevice {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<DLDevice> {
        try_downcast!(val -> DLDevice, |ArgValue::Device(dev)| { dev })
    }
}

impl<'a> TryFrom<ArgValue<'a>> for Device {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<Device> {
        Ok(Device::try_from(DLDevice::try_from(val)?)?)
    }
}

/// Converts an unspecialized handle to a ArgValue.
impl<'a, T> From<*const T> for ArgValue<'a> {
    fn from(ptr: *const T) -> Self {
        ArgValue::Handle(ptr as *mut c_void)
    }
}

/// Converts an unspecialized mutable handle to a ArgValue.
impl<'a, T> From<*mut T> for ArgValue<'a> {
    fn from(ptr: *mut T) -> Self {
        ArgValue::Handle(ptr as *mut c_void)
    }
}

impl<T> From<*mut T> for RetValue {
    fn from(ptr: *mut T) -> Self {
        RetValue::Handle(ptr as *mut c_void)
    }
}

impl<'a> From<&'a mut DLTensor> for ArgValue<'a> {
    fn from(arr: &'a mut DLTensor) -> Self {
        ArgValue::DLTensorHandle(arr as *mut DLTensor)
    }
}

impl<'a> From<&'a DLTensor> for ArgValue<'a> {
    fn from(arr: &'a DLTensor) -> Self {
        ArgValue::DLTensorHandle(arr as *const DLTensor as *mut DLTensor)
    }
}

impl<'a> TryFrom<ArgValue<'a>> for *mut c_void {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<*mut c_void> {
        try_downcast!(val -> *mut c_void,
            |ArgValue::Handle(ptr)| { ptr },
            |ArgValue::Null| { std::ptr::null_mut() })
    }
}

impl<'a> TryFrom<ArgValue<'a>> for *mut DLTensor {
    type Error = Error;

    fn try_from(val: ArgValue<'a>) -> Result<*mut DLTensor> {
        try_downcast!(val -> *mut DLTensor, |ArgValue::DLTensorHandle(ptr)| { ptr })
    }
}

impl<'a> From<()> for ArgValue<'a> {
    fn from(_: ()) -> Self {
        ArgValue::Null
    }
}

impl From<()> for RetValue {
    fn from(_: ()) -> Self {
        RetValue::Null
    }
}

/// A unit result discards whatever the callee returned.
impl TryFrom<RetValue> for () {
    type Error = Error;

    fn try_from(_: RetValue) -> Result<()> {
        Ok(())
    }
}

macro_rules! impl_from_ret_via_arg {
    ($( $type:ty ),+) => {
        $(
            impl TryFrom<RetValue> for $type {
                type Error = Error;

                fn try_from(val: RetValue) -> Result<$type> {
                    <$type>::try_from(ArgValue::from(val))
                }
            }
        )+
    };
}

impl_from_ret_via_arg!(
    f32,
    f64,
    bool,
    std::string::String,
    Vec<u8>,
    DataType,
    DLDataType,
    Device,
    DLDevice,
    *mut c_void,
    *mut DLTensor
);

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::*;
    use crate::boxed::{Bool, Float, Int};
    use crate::ndarray::NDArray;

    #[test]
    fn bytearray() {
        let w = vec![1u8, 2, 3, 4, 5];
        let v = ByteArray::from(w.as_slice());
        let tvm: Vec<u8> = RetValue::from(v).try_into().unwrap();
        assert_eq!(tvm, w);
    }

    #[test]
    fn pod_coercions() {
        assert_eq!(i64::try_from(ArgValue::Bool(true)).unwrap(), 1);
        assert!(bool::try_from(ArgValue::Int(2)).unwrap());
        assert_eq!(f64::try_from(ArgValue::Int(3)).unwrap(), 3.0);
        assert!(bool::try_from(ArgValue::Float(1.0)).is_err());
        assert!(i64::try_from(ArgValue::Float(1.0)).is_err());
    }

    #[test]
    fn narrow_integers_are_range_checked() {
        assert_eq!(u8::try_from(ArgValue::Int(255)).unwrap(), 255);
        let err = u8::try_from(ArgValue::Int(256)).unwrap_err();
        assert!(matches!(err, Error::ValueOutOfRange { target: "u8", .. }));
        assert!(u64::try_from(ArgValue::Int(-1)).is_err());
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn huge_unsigned_panics() {
        let _ = ArgValue::from(u64::MAX);
    }

    #[test]
    fn boxed_values_unbox() {
        assert_eq!(i64::try_from(ArgValue::from(&Int::from(4))).unwrap(), 4);
        assert_eq!(f64::try_from(ArgValue::from(&Float::from(0.5))).unwrap(), 0.5);
        assert!(bool::try_from(ArgValue::from(&Bool::from(true))).unwrap());
    }

    #[test]
    fn strings() {
        let s: std::string::String = ArgValue::from("hi").try_into().unwrap();
        assert_eq!(s, "hi");
        let object = crate::String::from("obj");
        let s: std::string::String = ArgValue::from(&object).try_into().unwrap();
        assert_eq!(s, "obj");
        let dtype = DataType::int(32, 1);
        let s: std::string::String = ArgValue::from(dtype).try_into().unwrap();
        assert_eq!(s, "int32");
        assert_eq!(DataType::try_from(ArgValue::from("float32")).unwrap(), DataType::float32());
    }

    #[test]
    fn mismatch_names_both_types() {
        let array = NDArray::empty(&[2], DataType::float32(), Device::cpu(0)).unwrap();
        let err = std::string::String::try_from(ArgValue::from(&array)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("runtime.NDArray"), "{}", message);
        assert!(message.contains("String"), "{}", message);
    }

    #[test]
    fn handles_accept_only_their_own_arm() {
        let dev = Device::cpu(0);
        assert_eq!(Device::try_from(ArgValue::from(dev)).unwrap(), dev);
        assert!(Device::try_from(ArgValue::Int(1)).is_err());
        assert!(<*mut c_void>::try_from(ArgValue::Int(1)).is_err());
    }

    #[test]
    fn null_is_a_null_handle() {
        let ptr = <*mut c_void>::try_from(ArgValue::Null).unwrap();
        assert!(ptr.is_null());
        let ptr: *mut c_void = RetValue::Null.try_into().unwrap();
        assert!(ptr.is_null());
        assert!(<*mut DLTensor>::try_from(ArgValue::Null).is_err());
    }
}
