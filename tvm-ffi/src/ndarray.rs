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

//! This module implements the [`NDArray`] type, a CPU tensor living inside
//! the object system, and its conversions to Rust's `ndarray` and DLPack.
//!
//! One can create a zero-filled NDArray given the shape, dtype and device
//! using [`NDArray::empty`], fill it with [`NDArray::copy_from_buffer`] and
//! read it back with [`NDArray::copy_to_vec`].
//!
//! # Example
//!
//! ```
//! # use tvm_ffi::{NDArray, DataType, Device};
//! # use ndarray::{Array, ArrayD};
//! use std::convert::TryFrom;
//!
//! let a = Array::from_shape_vec((2, 2), vec![1f32, 2., 3., 4.])
//!     .unwrap()
//!     .into_dyn(); // Rust's ndarray
//! let nd = NDArray::from_rust_ndarray(&a, Device::cpu(0)).unwrap();
//! assert_eq!(nd.shape(), &[2, 2]);
//! let rnd: ArrayD<f32> = ArrayD::try_from(&nd).unwrap();
//! assert_eq!(rnd, a);
//! ```

use std::alloc::{self, Layout};
use std::convert::TryFrom;
use std::fmt;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};
use std::slice;

use ::ndarray::{Array, ArrayD, Dimension, IxDyn};
use num_traits::Num;

use tvm_ffi_sys::ffi::{self, DLManagedTensor, DLManagedTensorVersioned, DLTensor};

use crate::config::{ALLOC_ALIGNMENT, DLPACK_VERSION};
use crate::errors::{NDArrayError, Result};
use crate::object::{IsObjectRef, Object, ObjectPtr};
use crate::{DataType, Device};

use tvm_ffi_macros::Object;

/// Who owns the bytes behind `dl_tensor.data`.
enum Storage {
    /// Allocated here, zeroed and aligned to `ALLOC_ALIGNMENT`.
    Owned { data: NonNull<u8>, layout: Layout },
    /// Borrowed from a DLPack producer, released through its deleter.
    Legacy(*mut DLManagedTensor),
    Versioned(*mut DLManagedTensorVersioned),
}

impl Drop for Storage {
    fn drop(&mut self) {
        unsafe {
            match *self {
                Storage::Owned { data, layout } => alloc::dealloc(data.as_ptr(), layout),
                Storage::Legacy(managed) => {
                    if let Some(deleter) = (*managed).deleter {
                        deleter(managed);
                    }
                }
                Storage::Versioned(managed) => {
                    if let Some(deleter) = (*managed).deleter {
                        deleter(managed);
                    }
                }
            }
        }
    }
}

/// See the [`module-level documentation`](../ndarray/index.html) for more details.
///
/// The `DLTensor` directly follows the object header, so a handle to the
/// tensor and a handle to the object are a fixed offset apart.
#[repr(C)]
#[derive(Object)]
#[ref_name = "NDArray"]
#[type_key = "runtime.NDArray"]
#[static_type_index = "NDARRAY"]
#[type_final]
#[no_derive]
pub struct NDArrayContainer {
    base: Object,
    dl_tensor: DLTensor,
    // backing storage for `dl_tensor.shape`
    shape: Vec<i64>,
    storage: Storage,
}

// The tensor data is only reached through the raw pointers above, whose
// lifetime is tied to `storage`.
unsafe impl Send for NDArrayContainer {}
unsafe impl Sync for NDArrayContainer {}

impl NDArrayContainer {
    fn new(shape: Vec<i64>, mut dl_tensor: DLTensor, storage: Storage) -> NDArrayContainer {
        let mut container = NDArrayContainer {
            base: Object::base::<NDArrayContainer>(),
            dl_tensor: DLTensor::default(),
            shape,
            storage,
        };
        dl_tensor.ndim = container.shape.len() as c_int;
        dl_tensor.shape = container.shape.as_mut_ptr();
        dl_tensor.strides = ptr::null_mut();
        container.dl_tensor = dl_tensor;
        container
    }

    pub fn as_dltensor(&self) -> &DLTensor {
        &self.dl_tensor
    }
}

/// Converts a `DLTensor` handle created by this runtime back into the
/// object it is embedded in. Null maps to null.
pub fn object_from_handle(handle: *mut DLTensor) -> *mut Object {
    if handle.is_null() {
        return ptr::null_mut();
    }
    let offset = memoffset::offset_of!(NDArrayContainer, dl_tensor);
    unsafe { (handle as *mut u8).sub(offset) as *mut Object }
}

/// The inverse of [`object_from_handle`]. `object` must be an NDArray.
pub fn handle_from_object(object: *mut Object) -> *mut DLTensor {
    if object.is_null() {
        return ptr::null_mut();
    }
    let offset = memoffset::offset_of!(NDArrayContainer, dl_tensor);
    unsafe { (object as *mut u8).add(offset) as *mut DLTensor }
}

fn check_shape(shape: &[i64]) -> Result<()> {
    match shape.iter().find(|&&dim| dim < 0) {
        Some(&dim) => Err(NDArrayError::NegativeDimension(dim).into()),
        None => Ok(()),
    }
}

fn check_cpu(device: ffi::DLDevice) -> Result<()> {
    if device.device_type == ffi::DLDeviceType_kDLCPU {
        return Ok(());
    }
    let name = Device::try_from(device)
        .map(|dev| dev.to_string())
        .unwrap_or_else(|_| device.device_type.to_string());
    Err(NDArrayError::UnsupportedDevice(name).into())
}

/// Validates a foreign tensor before it is aliased zero-copy.
unsafe fn check_importable(tensor: &DLTensor) -> Result<()> {
    check_cpu(tensor.device)?;
    if !tvm_ffi_sys::array::is_contiguous(tensor) {
        return Err(NDArrayError::NotContiguous.into());
    }
    let address = (tensor.data as usize).wrapping_add(tensor.byte_offset as usize);
    if address % ALLOC_ALIGNMENT != 0 {
        return Err(NDArrayError::NotAligned(ALLOC_ALIGNMENT).into());
    }
    Ok(())
}

unsafe fn shape_of(tensor: &DLTensor) -> Vec<i64> {
    if tensor.ndim == 0 || tensor.shape.is_null() {
        Vec::new()
    } else {
        slice::from_raw_parts(tensor.shape, tensor.ndim as usize).to_vec()
    }
}

impl NDArray {
    /// Allocates a zero-filled array of the given shape.
    ///
    /// Only CPU memory is managed by this runtime.
    pub fn empty(shape: &[i64], dtype: DataType, device: Device) -> Result<NDArray> {
        check_shape(shape)?;
        let dl_device = ffi::DLDevice::from(device);
        check_cpu(dl_device)?;
        let num_elements = tvm_ffi_sys::array::num_elements(shape) as usize;
        let nbytes = num_elements * dtype.itemsize();
        let layout = Layout::from_size_align(nbytes.max(1), ALLOC_ALIGNMENT)
            .map_err(|_| NDArrayError::SizeMismatch {
                expected: isize::MAX as usize,
                actual: nbytes,
            })?;
        let data = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .unwrap_or_else(|| alloc::handle_alloc_error(layout));
        let dl_tensor = DLTensor {
            data: data.as_ptr().cast(),
            device: dl_device,
            dtype: dtype.into(),
            ..DLTensor::default()
        };
        let container = NDArrayContainer::new(shape.to_vec(), dl_tensor, Storage::Owned { data, layout });
        Ok(NDArray::from(container))
    }

    fn container(&self) -> &NDArrayContainer {
        self
    }

    pub fn as_dltensor(&self) -> &DLTensor {
        self.container().as_dltensor()
    }

    /// The raw handle handed to C. It stays valid while `self` is alive.
    pub fn as_raw_dltensor(&self) -> *mut DLTensor {
        match self.as_ptr() {
            Some(ptr) => handle_from_object(ptr.as_raw()),
            None => ptr::null_mut(),
        }
    }

    /// Returns the shape of the NDArray.
    pub fn shape(&self) -> &[i64] {
        &self.container().shape
    }

    /// Returns the shape of the NDArray as a `Vec<usize>`.
    pub fn shape_usize(&self) -> Vec<usize> {
        self.shape().iter().map(|&dim| dim as usize).collect()
    }

    /// Returns the strides of the underlying tensor, `None` when compact.
    pub fn strides(&self) -> Option<&[i64]> {
        let tensor = self.as_dltensor();
        if tensor.strides.is_null() {
            None
        } else {
            Some(unsafe { slice::from_raw_parts(tensor.strides, self.ndim()) })
        }
    }

    pub fn is_contiguous(&self) -> bool {
        unsafe { tvm_ffi_sys::array::is_contiguous(self.as_dltensor()) }
    }

    /// Returns the number of dimensions of the NDArray.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Returns the total number of entries of the NDArray.
    pub fn len(&self) -> usize {
        tvm_ffi_sys::array::num_elements(self.shape()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total bytes taken up by the data.
    pub fn size(&self) -> usize {
        self.len() * self.dtype().itemsize()
    }

    pub fn dtype(&self) -> DataType {
        self.as_dltensor().dtype.into()
    }

    /// Returns the device the data lives on, always a CPU.
    pub fn device(&self) -> Device {
        Device::cpu(self.as_dltensor().device.device_id as usize)
    }

    pub fn byte_offset(&self) -> usize {
        self.as_dltensor().byte_offset as usize
    }

    /// The raw contents in row-major order.
    pub fn as_bytes(&self) -> &[u8] {
        let tensor = self.as_dltensor();
        let size = self.size();
        if size == 0 || tensor.data.is_null() {
            return &[];
        }
        unsafe {
            let data = (tensor.data as *const u8).add(self.byte_offset());
            slice::from_raw_parts(data, size)
        }
    }

    fn data_mut_ptr(&mut self) -> *mut u8 {
        let tensor = self.as_dltensor();
        unsafe { (tensor.data as *mut u8).add(self.byte_offset()) }
    }

    /// Overwrites the contents with raw bytes; the length must match exactly.
    pub fn copy_from_bytes(&mut self, data: &[u8]) -> Result<()> {
        let size = self.size();
        if size != data.len() {
            return Err(NDArrayError::SizeMismatch {
                expected: size,
                actual: data.len(),
            }
            .into());
        }
        if size > 0 {
            unsafe { ptr::copy(data.as_ptr(), self.data_mut_ptr(), size) };
        }
        Ok(())
    }

    /// Fills the array from a buffer of its own element type.
    ///
    /// ## Example
    ///
    /// ```
    /// # use tvm_ffi::{Device, DataType, NDArray};
    /// let mut ndarray = NDArray::empty(&[2], DataType::int(32, 1), Device::cpu(0)).unwrap();
    /// ndarray.copy_from_buffer(&[1i32, 2]).unwrap();
    /// assert_eq!(ndarray.copy_to_vec::<i32>().unwrap(), vec![1, 2]);
    /// ```
    pub fn copy_from_buffer<T: DLElement>(&mut self, data: &[T]) -> Result<()> {
        self.check_dtype::<T>()?;
        let bytes = unsafe {
            slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };
        self.copy_from_bytes(bytes)
    }

    /// Flattens the NDArray to a `Vec` of its element type.
    pub fn copy_to_vec<T: DLElement>(&self) -> Result<Vec<T>> {
        self.check_dtype::<T>()?;
        let bytes = self.as_bytes();
        let len = bytes.len() / std::mem::size_of::<T>();
        let mut vec = Vec::with_capacity(len);
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), vec.as_mut_ptr() as *mut u8, bytes.len());
            vec.set_len(len);
        }
        Ok(vec)
    }

    /// Copies the contents of `other` into `self`. Both arrays must hold
    /// the same number of bytes.
    pub fn copy_from(&mut self, other: &NDArray) -> Result<()> {
        if self.same_as(other) {
            return Ok(());
        }
        self.copy_from_bytes(other.as_bytes())
    }

    fn check_dtype<T: DLElement>(&self) -> Result<()> {
        if self.dtype() != T::DTYPE {
            return Err(NDArrayError::DataTypeMismatch {
                expected: T::DTYPE,
                actual: self.dtype(),
            }
            .into());
        }
        Ok(())
    }

    /// Converts a Rust's ndarray to an NDArray on `device`.
    pub fn from_rust_ndarray<T, D>(input: &Array<T, D>, device: Device) -> Result<NDArray>
    where
        T: DLElement,
        D: Dimension,
    {
        let shape: Vec<i64> = input.shape().iter().map(|&dim| dim as i64).collect();
        let mut nd = NDArray::empty(&shape, T::DTYPE, device)?;
        let data: Vec<T> = input.iter().copied().collect();
        nd.copy_from_buffer(&data)?;
        Ok(nd)
    }

    /// Adopts a legacy DLPack tensor without copying.
    ///
    /// On success the returned array owns `tensor` and calls its deleter
    /// once the last reference is dropped. On failure the caller keeps
    /// ownership.
    ///
    /// # Safety
    ///
    /// `tensor` must point to a valid `DLManagedTensor`.
    pub unsafe fn from_dlpack(tensor: *mut DLManagedTensor) -> Result<NDArray> {
        if tensor.is_null() {
            return Err(crate::Error::NullHandle("DLManagedTensor".into()));
        }
        let dl_tensor = (*tensor).dl_tensor;
        check_importable(&dl_tensor)?;
        let shape = shape_of(&dl_tensor);
        check_shape(&shape)?;
        let container = NDArrayContainer::new(shape, dl_tensor, Storage::Legacy(tensor));
        Ok(NDArray::from(container))
    }

    /// Adopts a versioned DLPack tensor without copying. Ownership follows
    /// the same rules as [`NDArray::from_dlpack`].
    ///
    /// # Safety
    ///
    /// `tensor` must point to a valid `DLManagedTensorVersioned`.
    pub unsafe fn from_dlpack_versioned(tensor: *mut DLManagedTensorVersioned) -> Result<NDArray> {
        if tensor.is_null() {
            return Err(crate::Error::NullHandle("DLManagedTensorVersioned".into()));
        }
        let version = (*tensor).version;
        if version.major != DLPACK_VERSION.major {
            return Err(NDArrayError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
            }
            .into());
        }
        let dl_tensor = (*tensor).dl_tensor;
        check_importable(&dl_tensor)?;
        let shape = shape_of(&dl_tensor);
        check_shape(&shape)?;
        let container = NDArrayContainer::new(shape, dl_tensor, Storage::Versioned(tensor));
        Ok(NDArray::from(container))
    }

    /// Exports a new reference as a legacy DLPack tensor. The consumer
    /// must call its deleter exactly once.
    pub fn to_dlpack(&self) -> *mut DLManagedTensor {
        let ptr = match self.as_ptr() {
            Some(ptr) => ptr.clone(),
            None => return ptr::null_mut(),
        };
        let managed = DLManagedTensor {
            dl_tensor: *ptr.as_dltensor(),
            manager_ctx: ptr.into_base().into_raw().cast(),
            deleter: Some(delete_exported),
        };
        Box::into_raw(Box::new(managed))
    }

    /// Exports a new reference as a versioned DLPack tensor.
    pub fn to_dlpack_versioned(&self) -> *mut DLManagedTensorVersioned {
        let ptr = match self.as_ptr() {
            Some(ptr) => ptr.clone(),
            None => return ptr::null_mut(),
        };
        let managed = DLManagedTensorVersioned {
            version: DLPACK_VERSION,
            dl_tensor: *ptr.as_dltensor(),
            manager_ctx: ptr.into_base().into_raw().cast(),
            deleter: Some(delete_exported_versioned),
            flags: 0,
        };
        Box::into_raw(Box::new(managed))
    }
}

unsafe extern "C" fn delete_exported(tensor: *mut DLManagedTensor) {
    if tensor.is_null() {
        return;
    }
    let managed = Box::from_raw(tensor);
    Object::dec_ref(managed.manager_ctx.cast());
}

unsafe extern "C" fn delete_exported_versioned(tensor: *mut DLManagedTensorVersioned) {
    if tensor.is_null() {
        return;
    }
    let managed = Box::from_raw(tensor);
    Object::dec_ref(managed.manager_ctx.cast());
}

impl fmt::Debug for NDArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.defined() {
            return write!(f, "NDArray(null)");
        }
        write!(
            f,
            "NDArray(shape={:?}, dtype={}, device={})",
            self.shape(),
            self.dtype(),
            self.device()
        )
    }
}

impl<'a, T: DLElement> TryFrom<&'a NDArray> for ArrayD<T> {
    type Error = crate::Error;

    fn try_from(nd: &NDArray) -> Result<ArrayD<T>> {
        let data = nd.copy_to_vec::<T>()?;
        let array = Array::from_shape_vec(IxDyn(&nd.shape_usize()), data)
            .map_err(NDArrayError::from)?;
        Ok(array)
    }
}

mod sealed {
    /// Private trait to prevent other traits from being implemeneted in downstream crates.
    pub trait Sealed {}
}

/// The primitive element types an NDArray can be read or written as.
pub trait DLElement: Num + Copy + 'static + sealed::Sealed {
    const DTYPE: DataType;
}

macro_rules! impl_dl_element {
    ($($type:ty => $dtype:expr),+ $(,)?) => {
        $(
            impl sealed::Sealed for $type {}
            impl DLElement for $type {
                const DTYPE: DataType = $dtype;
            }
        )+
    };
}

impl_dl_element!(
    i8 => DataType::int(8, 1),
    i16 => DataType::int(16, 1),
    i32 => DataType::int(32, 1),
    i64 => DataType::int(64, 1),
    u8 => DataType::uint(8, 1),
    u16 => DataType::uint(16, 1),
    u32 => DataType::uint(32, 1),
    u64 => DataType::uint(64, 1),
    f32 => DataType::float(32, 1),
    f64 => DataType::float(64, 1),
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn basics() {
        let shape = &[1, 2, 3];
        let ndarray = NDArray::empty(shape, DataType::int(32, 1), Device::cpu(0)).unwrap();
        assert_eq!(ndarray.shape(), shape);
        assert_eq!(ndarray.len(), 6);
        assert_eq!(ndarray.size(), 24);
        assert_eq!(ndarray.ndim(), 3);
        assert!(ndarray.strides().is_none());
        assert!(ndarray.is_contiguous());
        assert_eq!(ndarray.byte_offset(), 0);
        assert_eq!(ndarray.as_bytes(), &[0u8; 24][..]);
        assert_eq!(ndarray.as_bytes().as_ptr() as usize % ALLOC_ALIGNMENT, 0);
    }

    #[test]
    fn rejects_bad_shapes_and_devices() {
        assert!(NDArray::empty(&[2, -1], DataType::float32(), Device::cpu(0)).is_err());
        let err = NDArray::empty(&[2], DataType::float32(), Device::cuda(0)).unwrap_err();
        assert!(err.to_string().contains("cuda:0"), "{}", err);
    }

    #[test]
    fn copy() {
        let data = vec![1i32, 2, 3, 4];
        let mut ndarray = NDArray::empty(&[4], DataType::int(32, 1), Device::cpu(0)).unwrap();
        ndarray.copy_from_buffer(&data).unwrap();
        assert_eq!(ndarray.copy_to_vec::<i32>().unwrap(), data);

        let mut other = NDArray::empty(&[2, 2], DataType::int(32, 1), Device::cpu(0)).unwrap();
        other.copy_from(&ndarray).unwrap();
        assert_eq!(other.copy_to_vec::<i32>().unwrap(), data);
    }

    #[test]
    fn copy_wrong_dtype() {
        let mut ndarray = NDArray::empty(&[4], DataType::float32(), Device::cpu(0)).unwrap();
        assert!(ndarray.copy_from_buffer(&[1i32, 2, 3, 4]).is_err());
        assert!(ndarray.copy_from_buffer(&[1f32, 2.]).is_err());
        assert!(ndarray.copy_to_vec::<f64>().is_err());
    }

    #[test]
    fn rust_ndarray() {
        let a = Array::from_shape_vec((2, 3), vec![1f64, 2., 3., 4., 5., 6.])
            .unwrap()
            .into_dyn();
        let nd = NDArray::from_rust_ndarray(&a, Device::cpu(0)).unwrap();
        assert_eq!(nd.shape(), &[2, 3]);
        assert_eq!(nd.dtype(), DataType::float(64, 1));
        let back = ArrayD::<f64>::try_from(&nd).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn handle_offsets() {
        let nd = NDArray::empty(&[1], DataType::float32(), Device::cpu(0)).unwrap();
        let handle = nd.as_raw_dltensor();
        let object = object_from_handle(handle);
        assert_eq!(object, nd.as_ptr().unwrap().as_raw());
        assert_eq!(handle_from_object(object), handle);
        assert!(object_from_handle(ptr::null_mut()).is_null());
    }

    #[test]
    fn dlpack_export_keeps_array_alive() {
        let mut nd = NDArray::empty(&[3], DataType::float32(), Device::cpu(0)).unwrap();
        nd.copy_from_buffer(&[1f32, 2., 3.]).unwrap();
        let exported = nd.to_dlpack();
        assert_eq!(nd.as_object().unwrap().count(), 2);
        let imported = unsafe { NDArray::from_dlpack(exported) }.unwrap();
        assert_eq!(imported.copy_to_vec::<f32>().unwrap(), vec![1., 2., 3.]);
        drop(imported);
        assert_eq!(nd.as_object().unwrap().count(), 1);
    }

    static FOREIGN_DELETED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn count_delete(_tensor: *mut DLManagedTensor) {
        FOREIGN_DELETED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn dlpack_rejects_strided_tensors() {
        let owner = NDArray::empty(&[2, 3], DataType::float32(), Device::cpu(0)).unwrap();
        let mut shape = [2i64, 3];
        let mut strides = [1i64, 2];
        let mut managed = DLManagedTensor {
            dl_tensor: DLTensor {
                data: owner.as_dltensor().data,
                ndim: 2,
                dtype: DataType::float32().into(),
                shape: shape.as_mut_ptr(),
                strides: strides.as_mut_ptr(),
                ..DLTensor::default()
            },
            manager_ctx: ptr::null_mut(),
            deleter: Some(count_delete),
        };
        let err = unsafe { NDArray::from_dlpack(&mut managed) }.unwrap_err();
        assert!(err.to_string().contains("contiguous"), "{}", err);

        strides = [3, 1];
        managed.dl_tensor.strides = strides.as_mut_ptr();
        let imported = unsafe { NDArray::from_dlpack(&mut managed) }.unwrap();
        assert!(imported.strides().is_none());
        assert_eq!(imported.shape(), &[2, 3]);
        drop(imported);
        assert_eq!(FOREIGN_DELETED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dlpack_versioned_round_trip() {
        let nd = NDArray::empty(&[2, 2], DataType::uint(8, 1), Device::cpu(0)).unwrap();
        let exported = nd.to_dlpack_versioned();
        unsafe {
            assert_eq!((*exported).version, DLPACK_VERSION);
            let imported = NDArray::from_dlpack_versioned(exported).unwrap();
            assert_eq!(imported.as_dltensor().data, nd.as_dltensor().data);
        }
        assert_eq!(nd.as_object().unwrap().count(), 1);
    }
}
