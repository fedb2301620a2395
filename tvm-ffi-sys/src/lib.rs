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

//! This crate contains the raw C ABI of the TVM object system and
//! the DLPack tensor descriptors it exchanges.
//!
//! The layouts here are written by hand rather than generated, so that
//! the runtime in `tvm-ffi` can both consume and *export* the ABI without
//! linking against a C++ build.

/// The low-level C ABI types shared with every host language.
#[path = "c_runtime_api.rs"]
pub mod ffi;

pub mod array;
pub mod byte_array;
pub mod datatype;
pub mod device;
pub mod errors;
pub mod value;

pub use byte_array::ByteArray;
pub use datatype::DataType;
pub use device::{Device, DeviceType};
pub use errors::*;
