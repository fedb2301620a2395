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

use std::marker::PhantomData;
use std::os::raw::c_char;

use crate::ffi::TVMByteArray;

/// A byte-array view borrowed for the lifetime `'a`, laid out as a
/// `TVMByteArray` so it can be handed across the C boundary.
///
/// ## Example
///
/// ```
/// let v = b"hello";
/// let barr = tvm_ffi_sys::ByteArray::from(&v[..]);
/// assert_eq!(barr.len(), v.len());
/// assert_eq!(barr.data(), &[104u8, 101, 108, 108, 111]);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ByteArray<'a> {
    /// The raw FFI ByteArray.
    array: TVMByteArray,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> ByteArray<'a> {
    /// Wraps a raw byte-array received from C.
    ///
    /// # Safety
    /// `array.data` must point to `array.size` readable bytes that stay alive for `'a`.
    pub unsafe fn from_raw(array: TVMByteArray) -> ByteArray<'a> {
        ByteArray {
            array,
            _marker: PhantomData,
        }
    }

    /// Gets the underlying byte-array
    pub fn data(&self) -> &'a [u8] {
        if self.array.size == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.array.data as *const u8, self.array.size) }
    }

    /// Gets the length of the underlying byte-array
    pub fn len(&self) -> usize {
        self.array.size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the underlying byte-array to `Vec<u8>`
    pub fn to_vec(&self) -> Vec<u8> {
        self.data().to_vec()
    }

    /// The raw descriptor, valid while `'a` lasts.
    pub fn as_raw(&self) -> &TVMByteArray {
        &self.array
    }
}

impl<'a> From<&'a [u8]> for ByteArray<'a> {
    fn from(arg: &'a [u8]) -> Self {
        ByteArray {
            array: TVMByteArray {
                data: arg.as_ptr() as *const c_char,
                size: arg.len(),
            },
            _marker: PhantomData,
        }
    }
}

impl<'a> From<&'a Vec<u8>> for ByteArray<'a> {
    fn from(arg: &'a Vec<u8>) -> Self {
        ByteArray::from(arg.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert() {
        let v = vec![1u8, 2, 3];
        let barr = ByteArray::from(&v);
        assert_eq!(barr.len(), v.len());
        assert_eq!(barr.to_vec(), vec![1u8, 2, 3]);
        let v = b"hello";
        let barr = ByteArray::from(&v[..]);
        assert_eq!(barr.len(), v.len());
        assert_eq!(barr.data(), &[104u8, 101, 108, 108, 111]);
        let raw = unsafe { ByteArray::from_raw(*barr.as_raw()) };
        assert_eq!(raw.data(), b"hello");
    }

    #[test]
    fn empty() {
        let barr = ByteArray::from(&[] as &[u8]);
        assert!(barr.is_empty());
        assert_eq!(barr.data(), &[] as &[u8]);
    }
}
