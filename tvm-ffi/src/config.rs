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

//! Compile-time settings of the runtime.

use tvm_ffi_sys::ffi;

/// The TVM release these bindings track.
pub const TVM_VERSION: &str = ffi::TVM_VERSION;

/// Alignment in bytes of every NDArray buffer allocated here, and the
/// minimum alignment required of buffers imported through DLPack.
pub const ALLOC_ALIGNMENT: usize = 64;

/// The DLPack version written into exported versioned tensors.
pub const DLPACK_VERSION: ffi::DLPackVersion = ffi::DLPackVersion {
    major: ffi::DLPACK_MAJOR_VERSION,
    minor: ffi::DLPACK_MINOR_VERSION,
};

/// Absolute tolerance used when structurally comparing floats.
pub const FLOAT_EQUAL_ATOL: f64 = 1e-9;
