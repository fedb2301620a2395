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

//! This module provides an idiomatic Rust API for creating and working with TVM functions.
//!
//! For calling an already registered TVM function use [`to_boxed_fn::Builder`](crate::to_boxed_fn::Builder).
//! To register a TVM packed function from Rust side use [`function::register`](register).

use crate::errors::{Error, Result};
use crate::object::{IsObjectRef, Object};
use crate::registry;
use crate::to_boxed_fn::ToBoxedFn;
use crate::to_function::ToFunction;
use crate::{ArgValue, RetValue};

use tvm_ffi_macros::Object;

/// The type-erased body of a packed function.
pub type PackedCallable = Box<dyn Fn(Vec<ArgValue<'_>>) -> Result<RetValue> + Send + Sync>;

#[repr(C)]
#[derive(Object)]
#[ref_name = "Function"]
#[type_key = "runtime.PackedFunc"]
#[static_type_index = "PACKED_FUNC"]
#[type_final]
#[no_derive]
pub struct PackedFuncObj {
    base: Object,
    callable: PackedCallable,
}

impl PackedFuncObj {
    pub fn new(callable: PackedCallable) -> PackedFuncObj {
        PackedFuncObj {
            base: Object::base::<PackedFuncObj>(),
            callable,
        }
    }
}

impl Function {
    /// Wraps a closure over raw arguments as a packed function.
    pub fn from_packed<F>(f: F) -> Function
    where
        F: for<'a> Fn(Vec<ArgValue<'a>>) -> Result<RetValue> + Send + Sync + 'static,
    {
        Function::from(PackedFuncObj::new(Box::new(f)))
    }

    /// For a given function, it returns a function by name.
    pub fn get<S: AsRef<str>>(name: S) -> Option<&'static Function> {
        registry::get(name.as_ref())
    }

    /// Calls the function with already converted arguments.
    pub fn invoke<'a>(&self, args: Vec<ArgValue<'a>>) -> Result<RetValue> {
        match &self.0 {
            Some(func) => (func.callable)(args),
            None => Err(Error::NullHandle("Function".to_string())),
        }
    }

    /// Turns the function into a typed Rust closure, for example
    /// `func.to_boxed_fn::<dyn Fn(i64, i64) -> Result<i64>>()`.
    pub fn to_boxed_fn<F: ?Sized>(&self) -> Box<F>
    where
        F: ToBoxedFn,
    {
        F::to_boxed_fn(self.clone())
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(ptr) => write!(f, "Function({:?})", ptr),
            None => write!(f, "Function(null)"),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Function) -> bool {
        self.same_as(other)
    }
}

/// Registers a Rust function with an arbitrary type signature in
/// the global registry.
///
/// A function is convertible if and only if its arguments and return types are convertible
/// to and from TVM values respectively.
///
/// Use [`register_override`] if control of overriding existing global TVM function
/// is required, this function will fail if a function is already registered.
///
/// ## Example
///
/// ```
/// # use tvm_ffi::{ArgValue, RetValue};
/// # use tvm_ffi::function::{Function, register};
/// # use tvm_ffi::errors::Result;
///
/// fn sum(x: i64, y: i64, z: i64) -> i64 {
///     x + y + z
/// }
///
/// register(sum, "mysum".to_owned()).unwrap();
/// let func = Function::get("mysum").unwrap();
/// let boxed_fn = func.to_boxed_fn::<dyn Fn(i64, i64, i64) -> Result<i64>>();
/// let ret = boxed_fn(10, 20, 30).unwrap();
/// assert_eq!(ret, 60);
/// ```
pub fn register<F, I, O, S: Into<std::string::String>>(f: F, name: S) -> Result<()>
where
    F: ToFunction<I, O>,
{
    register_override(f, name, false)
}

/// Register a function with explicit control over whether to override an existing registration or not.
///
/// See `register` for more details on how to use the registration API.
pub fn register_override<F, I, O, S: Into<std::string::String>>(
    f: F,
    name: S,
    override_: bool,
) -> Result<()>
where
    F: ToFunction<I, O>,
{
    let name = name.into();
    let func = f.to_function_named(Some(name.clone()));
    registry::register(&name, func, override_)
}
