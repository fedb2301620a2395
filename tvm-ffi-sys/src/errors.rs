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

use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid header (expected {expected_type:?}, found {actual_type:?})")]
pub struct ValueDowncastError {
    pub actual_type: String,
    pub expected_type: &'static str,
}

#[derive(Debug, Error)]
pub enum ParseDataTypeError {
    #[error("invalid number: {0}")]
    InvalidNumber(std::num::ParseIntError),
    #[error("missing data type specifier (e.g., int32, float64)")]
    MissingDataType,
    #[error("unknown type: {0}")]
    UnknownType(String),
}

#[derive(Debug, Error)]
#[error("unsupported device: {0}")]
pub struct UnsupportedDeviceError(pub String);
