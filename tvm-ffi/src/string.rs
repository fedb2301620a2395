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

use std::cmp::{Ordering, PartialEq};
use std::hash::{Hash, Hasher};

use crate::object::Object;

use tvm_ffi_macros::Object;

/// An immutable UTF-8 string object.
#[repr(C)]
#[derive(Object, Debug)]
#[ref_name = "String"]
#[type_key = "runtime.String"]
#[static_type_index = "STRING"]
#[type_final]
#[no_derive]
pub struct StringObj {
    base: Object,
    data: Box<str>,
}

impl StringObj {
    pub fn new(data: impl AsRef<str>) -> StringObj {
        StringObj {
            base: Object::base::<StringObj>(),
            data: data.as_ref().into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}

impl From<std::string::String> for String {
    fn from(s: std::string::String) -> Self {
        StringObj {
            base: Object::base::<StringObj>(),
            data: s.into_boxed_str(),
        }
        .into()
    }
}

impl From<&str> for String {
    fn from(s: &str) -> Self {
        StringObj::new(s).into()
    }
}

impl AsRef<[u8]> for String {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Display for String {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl String {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }
}

impl<T: AsRef<[u8]>> PartialEq<T> for String {
    fn eq(&self, other: &T) -> bool {
        self.as_bytes() == other.as_ref()
    }
}

impl<T: AsRef<[u8]>> PartialOrd<T> for String {
    fn partial_cmp(&self, other: &T) -> Option<Ordering> {
        self.as_bytes().partial_cmp(other.as_ref())
    }
}

impl Eq for String {}

impl Ord for String {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for String {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl std::fmt::Debug for String {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => formatter.write_fmt(format_args!("{:?}", self.as_str())),
            None => formatter.write_str("String(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::String;
    use crate::{call_packed, Function, IsObjectRef};
    use anyhow::{ensure, Result};
    use std::convert::TryInto;

    #[test]
    fn test_string_debug() -> Result<()> {
        let s = String::from("foo");
        ensure!(format!("{:?}", s) == "\"foo\"", "debug output is invalid");
        ensure!(format!("{:?}", String::null()) == "String(null)");
        Ok(())
    }

    #[test]
    fn compare_by_content() {
        let a = String::from("abc");
        let b = String::from(std::string::String::from("abc"));
        assert!(!a.same_as(&b));
        assert_eq!(a, b);
        assert!(a < String::from("abd"));
        assert_eq!(a, "abc");
    }

    #[test]
    fn through_packed_function() -> Result<()> {
        let func = Function::get("runtime.GetFFIString").expect("builtin registered");
        let s: std::string::String = call_packed!(func, String::from("round"))?.try_into()?;
        ensure!(s == "round");
        Ok(())
    }
}
