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

//! Provides [`Device`] and related device queries.
//!
//! Create a new device for device type and device id.
//!
//! # Example
//!
//! ```
//! # use tvm_ffi_sys::{DeviceType, Device};
//! let cpu: DeviceType = "cpu".parse().unwrap();
//! let dev = Device::new(cpu, 0);
//! let cpu0 = Device::cpu(0);
//! assert_eq!(dev, cpu0);
//! ```

use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::errors::UnsupportedDeviceError;
use crate::ffi::{self, *};

use enumn::N;

/// Device type represents the set of devices a tensor may live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, N)]
#[repr(u32)]
pub enum DeviceType {
    CPU = 1,
    CUDA = 2,
    CUDAHost = 3,
    OpenCL = 4,
    Vulkan = 7,
    Metal = 8,
    VPI = 9,
    ROCM = 10,
    ROCMHost = 11,
    ExtDev = 12,
}

impl Default for DeviceType {
    /// default device is cpu.
    fn default() -> Self {
        DeviceType::CPU
    }
}

impl From<DeviceType> for ffi::DLDeviceType {
    fn from(device_type: DeviceType) -> Self {
        device_type as Self
    }
}

impl TryFrom<ffi::DLDeviceType> for DeviceType {
    type Error = UnsupportedDeviceError;

    fn try_from(device_type: ffi::DLDeviceType) -> Result<Self, Self::Error> {
        Self::n(device_type).ok_or_else(|| UnsupportedDeviceError(device_type.to_string()))
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                DeviceType::CPU => "cpu",
                DeviceType::CUDA => "cuda",
                DeviceType::CUDAHost => "cuda_host",
                DeviceType::OpenCL => "opencl",
                DeviceType::Vulkan => "vulkan",
                DeviceType::Metal => "metal",
                DeviceType::VPI => "vpi",
                DeviceType::ROCM => "rocm",
                DeviceType::ROCMHost => "rocm_host",
                DeviceType::ExtDev => "ext_dev",
            }
        )
    }
}

impl FromStr for DeviceType {
    type Err = UnsupportedDeviceError;

    fn from_str(type_str: &str) -> Result<Self, Self::Err> {
        Ok(match type_str {
            "cpu" | "llvm" | "stackvm" => DeviceType::CPU,
            "cuda" | "nvptx" => DeviceType::CUDA,
            "cuda_host" => DeviceType::CUDAHost,
            "cl" | "opencl" => DeviceType::OpenCL,
            "vulkan" => DeviceType::Vulkan,
            "metal" => DeviceType::Metal,
            "vpi" => DeviceType::VPI,
            "rocm" => DeviceType::ROCM,
            "rocm_host" => DeviceType::ROCMHost,
            "ext_dev" => DeviceType::ExtDev,
            _ => return Err(UnsupportedDeviceError(type_str.to_string())),
        })
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default)]
pub struct Device {
    pub device_type: DeviceType,
    pub device_id: usize,
}

impl Device {
    pub fn new(device_type: DeviceType, device_id: usize) -> Device {
        Device {
            device_type,
            device_id,
        }
    }

    pub fn is_cpu(&self) -> bool {
        self.device_type == DeviceType::CPU
    }
}

macro_rules! impl_tvm_device {
    ( $( $dev_type:ident : [ $( $dev_name:ident ),+ ] ),+ ) => {
        impl Device {
            $(
                $(
                    pub fn $dev_name(device_id: usize) -> Self {
                        Self {
                            device_type: DeviceType::$dev_type,
                            device_id,
                        }
                    }
                )+
            )+
        }
    };
}

impl_tvm_device!(
    CPU: [cpu],
    CUDA: [cuda],
    OpenCL: [opencl],
    Vulkan: [vulkan],
    Metal: [metal],
    ROCM: [rocm],
    ExtDev: [ext_dev]
);

/// Parses `"cuda"` or `"cuda:1"`.
impl FromStr for Device {
    type Err = UnsupportedDeviceError;

    fn from_str(repr: &str) -> Result<Self, Self::Err> {
        let mut parts = repr.splitn(2, ':');
        let device_type = parts.next().unwrap_or_default().parse()?;
        let device_id = match parts.next() {
            Some(id) => id
                .parse()
                .map_err(|_| UnsupportedDeviceError(repr.to_string()))?,
            None => 0,
        };
        Ok(Device::new(device_type, device_id))
    }
}

impl<'a> From<&'a Device> for DLDevice {
    fn from(dev: &'a Device) -> Self {
        Self {
            device_type: dev.device_type.into(),
            device_id: dev.device_id as i32,
        }
    }
}

impl From<Device> for DLDevice {
    fn from(dev: Device) -> Self {
        (&dev).into()
    }
}

impl TryFrom<DLDevice> for Device {
    type Error = UnsupportedDeviceError;

    fn try_from(dev: DLDevice) -> Result<Self, Self::Error> {
        Ok(Device {
            device_type: DeviceType::try_from(dev.device_type)?,
            device_id: dev.device_id as usize,
        })
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.device_type, self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device() {
        let dev = Device::cpu(0);
        let default_dev = Device::new(DeviceType::CPU, 0);
        assert_eq!(dev, default_dev);
        assert_eq!(dev, Device::default());
        assert_ne!(dev, Device::cuda(0));
        assert_eq!(dev.to_string(), "cpu:0");
    }

    #[test]
    fn parse() {
        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::cuda(1));
        assert_eq!("llvm".parse::<Device>().unwrap(), Device::cpu(0));
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn dl_device() {
        let raw = DLDevice::from(Device::rocm(2));
        assert_eq!(raw.device_type, DLDeviceType_kDLROCM);
        assert_eq!(Device::try_from(raw).unwrap(), Device::rocm(2));
        let bogus = DLDevice {
            device_type: 99,
            device_id: 0,
        };
        assert!(Device::try_from(bogus).is_err());
    }
}
