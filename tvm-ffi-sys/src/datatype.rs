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

use std::any::TypeId;
use std::str::FromStr;

use crate::errors::ParseDataTypeError;
use crate::ffi::DLDataType;

const DL_INT_CODE: u8 = 0;
const DL_UINT_CODE: u8 = 1;
const DL_FLOAT_CODE: u8 = 2;
const DL_HANDLE: u8 = 3;
const DL_BFLOAT_CODE: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct DataType {
    code: u8,
    bits: u8,
    lanes: u16,
}

impl DataType {
    pub const fn new(code: u8, bits: u8, lanes: u16) -> DataType {
        DataType { code, bits, lanes }
    }

    /// Returns the number of bytes occupied by an element of this `DataType`.
    pub fn itemsize(&self) -> usize {
        (self.bits as usize * self.lanes as usize + 7) >> 3
    }

    /// Returns whether this `DataType` represents primitive type `T`.
    pub fn is_type<T: 'static>(&self) -> bool {
        if self.lanes != 1 {
            return false;
        }
        let typ = TypeId::of::<T>();
        (typ == TypeId::of::<i8>() && self.code == DL_INT_CODE && self.bits == 8)
            || (typ == TypeId::of::<i16>() && self.code == DL_INT_CODE && self.bits == 16)
            || (typ == TypeId::of::<i32>() && self.code == DL_INT_CODE && self.bits == 32)
            || (typ == TypeId::of::<i64>() && self.code == DL_INT_CODE && self.bits == 64)
            || (typ == TypeId::of::<u8>() && self.code == DL_UINT_CODE && self.bits == 8)
            || (typ == TypeId::of::<u16>() && self.code == DL_UINT_CODE && self.bits == 16)
            || (typ == TypeId::of::<u32>() && self.code == DL_UINT_CODE && self.bits == 32)
            || (typ == TypeId::of::<u64>() && self.code == DL_UINT_CODE && self.bits == 64)
            || (typ == TypeId::of::<f32>() && self.code == DL_FLOAT_CODE && self.bits == 32)
            || (typ == TypeId::of::<f64>() && self.code == DL_FLOAT_CODE && self.bits == 64)
            || (typ == TypeId::of::<bool>() && self.is_bool())
    }

    /// Returns the `DataType` matching the primitive type `T`, if any.
    pub fn of<T: 'static>() -> Option<DataType> {
        [
            DataType::int(8, 1),
            DataType::int(16, 1),
            DataType::int(32, 1),
            DataType::int(64, 1),
            DataType::uint(8, 1),
            DataType::uint(16, 1),
            DataType::uint(32, 1),
            DataType::uint(64, 1),
            DataType::float(32, 1),
            DataType::float(64, 1),
            DataType::bool(),
        ]
        .iter()
        .copied()
        .find(|dtype| dtype.is_type::<T>())
    }

    pub fn code(&self) -> usize {
        self.code as usize
    }

    pub fn bits(&self) -> usize {
        self.bits as usize
    }

    pub fn lanes(&self) -> usize {
        self.lanes as usize
    }

    pub fn is_bool(&self) -> bool {
        self.code == DL_UINT_CODE && self.bits == 1
    }

    pub fn is_handle(&self) -> bool {
        self.code == DL_HANDLE
    }

    pub const fn int(bits: u8, lanes: u16) -> DataType {
        DataType::new(DL_INT_CODE, bits, lanes)
    }

    pub const fn float(bits: u8, lanes: u16) -> DataType {
        DataType::new(DL_FLOAT_CODE, bits, lanes)
    }

    pub const fn float32() -> DataType {
        Self::float(32, 1)
    }

    pub const fn uint(bits: u8, lanes: u16) -> DataType {
        DataType::new(DL_UINT_CODE, bits, lanes)
    }

    pub const fn bool() -> DataType {
        DataType::new(DL_UINT_CODE, 1, 1)
    }

    pub const fn handle() -> DataType {
        DataType::new(DL_HANDLE, 64, 1)
    }
}

impl<'a> From<&'a DataType> for DLDataType {
    fn from(dtype: &'a DataType) -> Self {
        Self {
            code: dtype.code,
            bits: dtype.bits,
            lanes: dtype.lanes,
        }
    }
}

impl From<DLDataType> for DataType {
    fn from(dtype: DLDataType) -> Self {
        Self {
            code: dtype.code,
            bits: dtype.bits,
            lanes: dtype.lanes,
        }
    }
}

impl From<DataType> for DLDataType {
    fn from(dtype: DataType) -> Self {
        (&dtype).into()
    }
}

/// Implements TVMType conversion from `&str` of general format `{dtype}{bits}x{lanes}`
/// such as "int32", "float32" or with lane "float32x4".
impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(type_str: &str) -> Result<Self, Self::Err> {
        use ParseDataTypeError::*;

        if type_str == "bool" {
            return Ok(DataType::bool());
        }
        if type_str.is_empty() {
            return Err(MissingDataType);
        }

        let mut type_lanes = type_str.split('x');
        let typ = type_lanes.next().ok_or(MissingDataType)?;
        let lanes = type_lanes
            .next()
            .map(|l| l.parse::<u16>())
            .unwrap_or(Ok(1))
            .map_err(InvalidNumber)?;
        let (type_name, bits) = match typ.find(char::is_numeric) {
            Some(idx) => {
                let (name, bits_str) = typ.split_at(idx);
                (name, bits_str.parse::<u8>().map_err(InvalidNumber)?)
            }
            None if typ == "handle" => (typ, 64),
            None => (typ, 32),
        };

        let type_code = match type_name {
            "int" => DL_INT_CODE,
            "uint" => DL_UINT_CODE,
            "float" => DL_FLOAT_CODE,
            "bfloat" => DL_BFLOAT_CODE,
            "handle" => DL_HANDLE,
            _ => return Err(UnknownType(type_name.to_string())),
        };

        Ok(DataType::new(type_code, bits, lanes))
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_bool() && self.lanes == 1 {
            return write!(f, "bool");
        }
        let type_str = match self.code {
            DL_INT_CODE => "int",
            DL_UINT_CODE => "uint",
            DL_FLOAT_CODE => "float",
            DL_BFLOAT_CODE => "bfloat",
            DL_HANDLE => "handle",
            _ => "unknown",
        };
        write!(f, "{}{}", type_str, self.bits)?;
        if self.lanes > 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_print() {
        for repr in &["int32", "uint8", "float16x4", "bool", "handle64", "bfloat16"] {
            let dtype: DataType = repr.parse().unwrap();
            assert_eq!(&dtype.to_string(), repr);
        }
        assert_eq!("float".parse::<DataType>().unwrap(), DataType::float32());
        assert!("quux8".parse::<DataType>().is_err());
        assert!("".parse::<DataType>().is_err());
    }

    #[test]
    fn primitive_types() {
        assert!(DataType::int(32, 1).is_type::<i32>());
        assert!(!DataType::int(32, 4).is_type::<i32>());
        assert_eq!(DataType::of::<f64>(), Some(DataType::float(64, 1)));
        assert_eq!(DataType::of::<bool>(), Some(DataType::bool()));
        assert_eq!(DataType::bool().itemsize(), 1);
        assert_eq!(DataType::float(32, 4).itemsize(), 16);
    }
}
