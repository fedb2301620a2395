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

//! The binary parameter blob written by `runtime.SaveParams`: a list of
//! names followed by a list of tensors, all little-endian.

use nom::{
    bytes::complete::tag,
    combinator::{all_consuming, map_res},
    multi::{count, length_count, length_data},
    number::complete::{le_i32, le_i64, le_u16, le_u32, le_u64, le_u8},
    sequence::tuple,
    IResult,
};

use tvm_ffi_sys::ffi::{DLDataType, DLDevice};

use crate::errors::{Error, Result};
use crate::{DataType, Device, Map, NDArray, String};

// @see `kTVMNDArrayListMagic` in `ndarray.h`
pub const NDARRAY_LIST_MAGIC: u64 = 0xF7E5_8D4F_0504_9CB7;
// @see `kTVMNDArrayMagic` in `ndarray.h`
pub const NDARRAY_MAGIC: u64 = 0xDD5E_40F0_96B4_A13F;

fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Appends one tensor in the `SaveDLTensor` layout.
pub fn save_dltensor(array: &NDArray, out: &mut Vec<u8>) {
    write_u64(out, NDARRAY_MAGIC);
    write_u64(out, 0);
    // the data is always written from host memory
    out.extend_from_slice(&tvm_ffi_sys::ffi::DLDeviceType_kDLCPU.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&(array.ndim() as i32).to_le_bytes());
    let dtype = DLDataType::from(array.dtype());
    out.push(dtype.code);
    out.push(dtype.bits);
    out.extend_from_slice(&dtype.lanes.to_le_bytes());
    for dim in array.shape() {
        out.extend_from_slice(&dim.to_le_bytes());
    }
    let data = array.as_bytes();
    out.extend_from_slice(&(data.len() as i64).to_le_bytes());
    out.extend_from_slice(data);
}

/// Serializes a name to array dictionary.
pub fn save_params(params: &Map<String, NDArray>) -> Vec<u8> {
    let mut out = Vec::new();
    write_u64(&mut out, NDARRAY_LIST_MAGIC);
    write_u64(&mut out, 0);
    write_u64(&mut out, params.len() as u64);
    for (name, _) in params.iter() {
        write_u64(&mut out, name.len() as u64);
        out.extend_from_slice(name.as_bytes());
    }
    write_u64(&mut out, params.len() as u64);
    for (_, array) in params.iter() {
        save_dltensor(&array, &mut out);
    }
    out
}

struct RawTensor<'a> {
    device: DLDevice,
    dtype: DLDataType,
    shape: Vec<i64>,
    data: &'a [u8],
}

fn name(input: &[u8]) -> IResult<&[u8], std::string::String> {
    map_res(length_data(le_u64), |data: &[u8]| {
        std::str::from_utf8(data).map(str::to_owned)
    })(input)
}

fn device(input: &[u8]) -> IResult<&[u8], DLDevice> {
    let (input, (device_type, device_id)) = tuple((le_u32, le_i32))(input)?;
    Ok((input, DLDevice { device_type, device_id }))
}

fn data_type(input: &[u8]) -> IResult<&[u8], DLDataType> {
    let (input, (code, bits, lanes)) = tuple((le_u8, le_u8, le_u16))(input)?;
    Ok((input, DLDataType { code, bits, lanes }))
}

fn tensor(input: &[u8]) -> IResult<&[u8], RawTensor<'_>> {
    let magic = NDARRAY_MAGIC.to_le_bytes();
    let (input, _) = tag(&magic[..])(input)?;
    let (input, _reserved) = le_u64(input)?;
    let (input, device) = device(input)?;
    let (input, ndim) = le_i32(input)?;
    let (input, dtype) = data_type(input)?;
    let (input, shape) = count(le_i64, ndim.max(0) as usize)(input)?;
    let (input, data) = length_data(le_u64)(input)?;
    Ok((
        input,
        RawTensor {
            device,
            dtype,
            shape,
            data,
        },
    ))
}

fn param_dict(input: &[u8]) -> IResult<&[u8], (Vec<std::string::String>, Vec<RawTensor<'_>>)> {
    let magic = NDARRAY_LIST_MAGIC.to_le_bytes();
    let (input, _) = tag(&magic[..])(input)?;
    let (input, _reserved) = le_u64(input)?;
    let (input, names) = length_count(le_u64, name)(input)?;
    let (input, tensors) = length_count(le_u64, tensor)(input)?;
    Ok((input, (names, tensors)))
}

fn describe(bytes: &[u8], err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    let message = match err {
        nom::Err::Incomplete(_) => "unexpected end of input".to_string(),
        nom::Err::Error(e) | nom::Err::Failure(e) => format!(
            "{} at byte {}",
            e.code.description(),
            bytes.len() - e.input.len()
        ),
    };
    Error::ParamsFormat(message)
}

fn to_ndarray(raw: RawTensor<'_>) -> Result<NDArray> {
    if raw.device.device_type != tvm_ffi_sys::ffi::DLDeviceType_kDLCPU {
        return Err(Error::ParamsFormat(format!(
            "tensor saved from device type {}",
            raw.device.device_type
        )));
    }
    let mut array = NDArray::empty(&raw.shape, DataType::from(raw.dtype), Device::cpu(0))?;
    if array.size() != raw.data.len() {
        return Err(Error::ParamsFormat(format!(
            "expected {} data bytes for shape {:?}, found {}",
            array.size(),
            raw.shape,
            raw.data.len()
        )));
    }
    array.copy_from_bytes(raw.data)?;
    Ok(array)
}

/// Reads one tensor written by [`save_dltensor`]. The whole input must be
/// consumed.
pub fn load_dltensor(bytes: &[u8]) -> Result<NDArray> {
    let (_, raw) = all_consuming(tensor)(bytes).map_err(|err| describe(bytes, err))?;
    to_ndarray(raw)
}

/// Loads a dictionary written by [`save_params`].
pub fn load_params(bytes: &[u8]) -> Result<Map<String, NDArray>> {
    let (_, (names, tensors)) =
        all_consuming(param_dict)(bytes).map_err(|err| describe(bytes, err))?;
    if names.len() != tensors.len() {
        return Err(Error::ParamsFormat(format!(
            "{} names but {} tensors",
            names.len(),
            tensors.len()
        )));
    }
    let mut params = Map::new();
    for (name, raw) in names.into_iter().zip(tensors) {
        params.insert(String::from(name), to_ndarray(raw)?);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Map<String, NDArray> {
        let mut weight = NDArray::empty(&[2, 2], DataType::float32(), Device::cpu(0)).unwrap();
        weight.copy_from_buffer(&[1f32, 2., 3., 4.]).unwrap();
        let mut bias = NDArray::empty(&[3], DataType::int(64, 1), Device::cpu(0)).unwrap();
        bias.copy_from_buffer(&[7i64, 8, 9]).unwrap();
        let mut params = Map::new();
        params.insert(String::from("weight"), weight);
        params.insert(String::from("bias"), bias);
        params
    }

    #[test]
    fn round_trip() {
        let bytes = save_params(&params());
        assert_eq!(&bytes[..8], &NDARRAY_LIST_MAGIC.to_le_bytes());
        let loaded = load_params(&bytes).unwrap();
        assert_eq!(loaded.len(), 2);
        let weight = loaded.get(&String::from("weight")).unwrap();
        assert_eq!(weight.shape(), &[2, 2]);
        assert_eq!(weight.copy_to_vec::<f32>().unwrap(), vec![1., 2., 3., 4.]);
        let bias = loaded.get(&String::from("bias")).unwrap();
        assert_eq!(bias.copy_to_vec::<i64>().unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn single_tensor_layout() {
        let mut array = NDArray::empty(&[2], DataType::uint(8, 1), Device::cpu(0)).unwrap();
        array.copy_from_buffer(&[5u8, 6]).unwrap();
        let mut out = Vec::new();
        save_dltensor(&array, &mut out);
        // magic, reserved, device, ndim, dtype, shape, byte count, data
        assert_eq!(out.len(), 8 + 8 + 8 + 4 + 4 + 8 + 8 + 2);
        assert_eq!(&out[out.len() - 2..], &[5, 6]);
        let back = load_dltensor(&out).unwrap();
        assert_eq!(back.copy_to_vec::<u8>().unwrap(), vec![5, 6]);
    }

    #[test]
    fn rejects_corrupt_input() {
        let bytes = save_params(&params());
        assert!(matches!(load_params(&bytes[..bytes.len() - 1]), Err(Error::ParamsFormat(_))));
        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xff;
        let err = load_params(&bad_magic).unwrap_err();
        assert!(err.to_string().contains("byte 0"), "{}", err);
        let mut trailing = bytes;
        trailing.push(0);
        assert!(load_params(&trailing).is_err());
    }
}
