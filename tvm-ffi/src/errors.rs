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

use crate::DataType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NDArrayError {
    #[error("Cannot convert from an empty array.")]
    EmptyArray,
    #[error("Invalid datatype when attempting to convert ndarray.")]
    InvalidDatatype(#[from] tvm_ffi_sys::errors::ParseDataTypeError),
    #[error("a shape error occurred in the Rust ndarray library")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("Expected type `{expected}` but found `{actual}`")]
    DataTypeMismatch {
        expected: DataType,
        actual: DataType,
    },
    #[error("NDArray on device `{0}` is not supported, only cpu memory is managed here")]
    UnsupportedDevice(String),
    #[error("DLManagedTensor must be contiguous.")]
    NotContiguous,
    #[error("Data in DLManagedTensor is not aligned as required ({0} bytes)")]
    NotAligned(usize),
    #[error("Shape mismatch: expected {expected:?} but found {actual:?}")]
    ShapeMismatch { expected: Vec<i64>, actual: Vec<i64> },
    #[error("Cannot copy {actual} bytes into an array of {expected} bytes")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Negative dimension {0} in shape")]
    NegativeDimension(i64),
    #[error("Unsupported DLPack version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Expected type `{expected}` but found `{actual}`")]
    TypeMismatch { expected: String, actual: String },
    #[error("Function was not set in `to_boxed_fn::Builder`")]
    FunctionNotSet,
    #[error("raw pointer passed across boundary was null")]
    Null,
    #[error("failed to convert String into CString due to embedded nul character")]
    ToCString(#[from] std::ffi::NulError),
    #[error("string passed across boundary is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Handle `{0}` is null.")]
    NullHandle(String),
    #[error("{0}")]
    NDArray(#[from] NDArrayError),
    #[error("{0}")]
    DataType(#[from] tvm_ffi_sys::errors::ParseDataTypeError),
    #[error("{0}")]
    Device(#[from] tvm_ffi_sys::errors::UnsupportedDeviceError),
    #[error("{0}")]
    CallFailed(String),
    #[error("this case will never occur")]
    Infallible(#[from] std::convert::Infallible),
    #[error("a panic occurred while executing a Rust packed function: {0}")]
    Panic(String),
    #[error("Function {function}{signature} expects {expected} arguments, but {actual} were provided.")]
    ArgCountMismatch {
        function: String,
        signature: String,
        expected: usize,
        actual: usize,
    },
    #[error("In function {function}{signature}: error while converting argument {index}: {source}")]
    ArgConversion {
        function: String,
        signature: String,
        index: usize,
        source: Box<Error>,
    },
    #[error("Global Function `{0}` is already registered")]
    FunctionAlreadyRegistered(String),
    #[error("Global Function `{0}` is not registered")]
    FunctionNotFound(String),
    #[error("Cannot find type `{0}`. Did you forget to register the node by TVM_REGISTER_NODE_TYPE?")]
    TypeKeyNotFound(String),
    #[error("Unknown type index {0}")]
    TypeIndexNotFound(u32),
    #[error("Type `{requested}` cannot claim static type index {index}, it is taken by `{existing}`")]
    TypeIndexConflict {
        index: u32,
        existing: String,
        requested: String,
    },
    #[error("Reach maximum number of sub-classes for `{0}`")]
    TypeSlotsExhausted(String),
    #[error("Index {index} out of bounds for {container} of size {len}")]
    IndexOutOfBounds {
        container: &'static str,
        index: i64,
        len: usize,
    },
    #[error("Key `{0}` does not exist")]
    KeyNotFound(String),
    #[error("Value {value} is out of range for `{target}`")]
    ValueOutOfRange { value: String, target: &'static str },
    #[error("Unknown type code {0}")]
    UnknownTypeCode(i32),
    #[error("`{type_key}` does not have attribute `{key}`")]
    AttrNotFound { type_key: String, key: String },
    #[error("`{type_key}` does not accept attribute `{key}`")]
    UnknownAttr { type_key: String, key: String },
    #[error("Failed to read attribute `{key}` of `{type_key}`: {source}")]
    AttrConversion {
        type_key: String,
        key: String,
        source: Box<Error>,
    },
    #[error("Type `{0}` does not support reflection")]
    NotReflectable(String),
    #[error("Invalid JSON graph: {0}")]
    JsonFormat(String),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid parameter blob: {0}")]
    ParamsFormat(String),
    #[error("The host environment has already set an error")]
    EnvErrorAlreadySet,
    #[error("Unknown environment symbol `{0}`")]
    UnknownEnvSymbol(String),
    #[error("Duplicated environment symbol `{0}`")]
    DuplicatedEnvSymbol(String),
    #[error("{0}")]
    Raw(String),
}

impl Error {
    pub fn downcast(actual: impl Into<String>, expected: impl Into<String>) -> Error {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn out_of_range(value: impl ToString, target: &'static str) -> Error {
        Self::ValueOutOfRange {
            value: value.to_string(),
            target,
        }
    }
}

impl From<tvm_ffi_sys::errors::ValueDowncastError> for Error {
    fn from(err: tvm_ffi_sys::errors::ValueDowncastError) -> Error {
        Error::downcast(err.actual_type, err.expected_type)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
