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

use std::{
    mem,
    os::raw::{c_int, c_void},
};

use crate::ffi::{
    DLDataType, DLDataTypeCode_kDLFloat, DLDataTypeCode_kDLInt, DLDataTypeCode_kDLUInt, DLDevice,
    DLDeviceType_kDLCPU, DLTensor,
};

/// `From` conversions to `DLTensor` for `ndarray::Array`.
/// Takes a reference to the `ndarray` since `DLTensor` is not owned.
///
/// The shape and strides of an `ndarray` are `usize`/`isize`, which share the
/// layout of `i64` on 64-bit targets only.
macro_rules! impl_dltensor_from_ndarray {
    ($type:ty, $typecode:expr) => {
        #[cfg(target_pointer_width = "64")]
        impl<'a, D: ndarray::Dimension> From<&'a mut ndarray::Array<$type, D>> for DLTensor {
            fn from(arr: &'a mut ndarray::Array<$type, D>) -> Self {
                DLTensor {
                    data: arr.as_mut_ptr() as *mut c_void,
                    device: DLDevice {
                        device_type: DLDeviceType_kDLCPU,
                        device_id: 0,
                    },
                    ndim: arr.ndim() as c_int,
                    dtype: DLDataType {
                        code: $typecode as u8,
                        bits: 8 * mem::size_of::<$type>() as u8,
                        lanes: 1,
                    },
                    shape: arr.shape().as_ptr() as *const i64 as *mut i64,
                    strides: arr.strides().as_ptr() as *const i64 as *mut i64,
                    byte_offset: 0,
                }
            }
        }
    };
}

impl_dltensor_from_ndarray!(f32, DLDataTypeCode_kDLFloat);
impl_dltensor_from_ndarray!(f64, DLDataTypeCode_kDLFloat);
impl_dltensor_from_ndarray!(i8, DLDataTypeCode_kDLInt);
impl_dltensor_from_ndarray!(i16, DLDataTypeCode_kDLInt);
impl_dltensor_from_ndarray!(i32, DLDataTypeCode_kDLInt);
impl_dltensor_from_ndarray!(i64, DLDataTypeCode_kDLInt);
impl_dltensor_from_ndarray!(u8, DLDataTypeCode_kDLUInt);
impl_dltensor_from_ndarray!(u16, DLDataTypeCode_kDLUInt);
impl_dltensor_from_ndarray!(u32, DLDataTypeCode_kDLUInt);
impl_dltensor_from_ndarray!(u64, DLDataTypeCode_kDLUInt);

/// Returns the number of elements described by `shape`.
pub fn num_elements(shape: &[i64]) -> i64 {
    shape.iter().product()
}

/// Returns whether the tensor is compact and row-major.
///
/// Dimensions of extent 1 may carry any stride.
///
/// # Safety
/// `tensor.shape` (and `tensor.strides` when non-null) must point to `ndim` values.
pub unsafe fn is_contiguous(tensor: &DLTensor) -> bool {
    if tensor.strides.is_null() {
        return true;
    }
    let ndim = tensor.ndim as usize;
    let shape = std::slice::from_raw_parts(tensor.shape, ndim);
    let strides = std::slice::from_raw_parts(tensor.strides, ndim);
    let mut expected_stride = 1;
    for i in (0..ndim).rev() {
        if shape[i] == 1 {
            continue;
        }
        if strides[i] != expected_stride {
            return false;
        }
        expected_stride *= shape[i];
    }
    true
}

/// Returns the number of bytes spanned by the tensor data.
///
/// # Safety
/// `tensor.shape` must point to `ndim` values.
pub unsafe fn data_size(tensor: &DLTensor) -> usize {
    let shape = std::slice::from_raw_parts(tensor.shape, tensor.ndim as usize);
    let bits = tensor.dtype.bits as usize * tensor.dtype.lanes as usize;
    (num_elements(shape) as usize * bits + 7) / 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndarray_view() {
        let mut arr = ndarray::Array::from_shape_vec((2, 3), vec![1f32, 2., 3., 4., 5., 6.]).unwrap();
        let tensor = DLTensor::from(&mut arr);
        assert_eq!(tensor.ndim, 2);
        assert_eq!(tensor.dtype.bits, 32);
        unsafe {
            assert!(is_contiguous(&tensor));
            assert_eq!(data_size(&tensor), 24);
        }
    }

    #[test]
    fn strided_is_not_contiguous() {
        let mut shape = [2i64, 3];
        let mut strides = [1i64, 2];
        let tensor = DLTensor {
            ndim: 2,
            shape: shape.as_mut_ptr(),
            strides: strides.as_mut_ptr(),
            ..Default::default()
        };
        assert!(!unsafe { is_contiguous(&tensor) });
        strides = [3, 1];
        let tensor = DLTensor {
            strides: strides.as_mut_ptr(),
            ..tensor
        };
        assert!(unsafe { is_contiguous(&tensor) });
    }
}
