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

//! Provides the [`Module`] type: a named table of functions with imported
//! modules, and the process-wide system library.

use std::collections::HashMap;
use std::os::raw::c_int;
use std::sync::RwLock;

use lazy_static::lazy_static;
use log::debug;

use tvm_ffi_sys::ffi::{self, BackendPackedCFunc, TVMValue};

use crate::errors::{Error, Result};
use crate::function::Function;
use crate::object::Object;
use crate::packed_func::ArgsBuffer;
use crate::{get_last_error, read, write, RetValue};

use tvm_ffi_macros::Object;

/// The name of the entry function of a module.
pub const MODULE_MAIN: &str = "__tvm_main__";

#[repr(C)]
#[derive(Object, Debug)]
#[ref_name = "Module"]
#[type_key = "runtime.Module"]
#[static_type_index = "RUNTIME_MODULE"]
pub struct ModuleNode {
    base: Object,
    kind: String,
    functions: RwLock<HashMap<String, Function>>,
    imports: RwLock<Vec<Module>>,
}

impl ModuleNode {
    pub fn new(kind: impl Into<String>) -> ModuleNode {
        ModuleNode {
            base: Object::base::<ModuleNode>(),
            kind: kind.into(),
            functions: RwLock::new(HashMap::new()),
            imports: RwLock::new(Vec::new()),
        }
    }

    /// The kind of module, e.g. `system_lib`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Adds or replaces a function of this module.
    pub fn register_function(&self, name: impl Into<String>, func: Function) {
        write(&self.functions).insert(name.into(), func);
    }

    pub fn import(&self, module: Module) {
        write(&self.imports).push(module);
    }

    pub fn imports(&self) -> Vec<Module> {
        read(&self.imports).clone()
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.functions).keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks a function up in this module and, if `query_imports` is set,
    /// depth first in its imports.
    pub fn get_function(&self, name: &str, query_imports: bool) -> Option<Function> {
        if let Some(func) = read(&self.functions).get(name) {
            return Some(func.clone());
        }
        if !query_imports {
            return None;
        }
        self.imports()
            .iter()
            .find_map(|module| module.get_function(name, true))
    }
}

impl Module {
    pub fn new(kind: impl Into<String>) -> Module {
        Module::from(ModuleNode::new(kind))
    }

    /// The entry function, if the module has one.
    pub fn entry_func(&self) -> Option<Function> {
        self.get_function(MODULE_MAIN, false)
    }

    /// The module holding every symbol registered with
    /// `TVMBackendRegisterSystemLibSymbol`.
    pub fn system_lib() -> Module {
        SYSTEM_LIB.clone()
    }
}

lazy_static! {
    static ref SYSTEM_LIB: Module = Module::new("system_lib");
}

/// Wraps a function compiled against the backend calling convention.
pub fn wrap_backend_func(func: BackendPackedCFunc) -> Function {
    Function::from_packed(move |args| {
        let mut buffer = ArgsBuffer::new(args)?;
        let mut ret_value = TVMValue::default();
        let mut ret_code = ffi::TVMArgTypeCode_kTVMNullptr as c_int;
        let num_args = buffer.len() as c_int;
        let code = func(
            buffer.values_mut_ptr(),
            buffer.type_codes_mut_ptr(),
            num_args,
            &mut ret_value,
            &mut ret_code,
            std::ptr::null_mut(),
        );
        if code != 0 {
            return Err(Error::CallFailed(get_last_error()));
        }
        unsafe { RetValue::from_returned_tvm_value(ret_value, ret_code) }
    })
}

/// Adds a backend symbol to the system library.
pub fn register_system_lib_symbol(name: &str, func: BackendPackedCFunc) {
    debug!("registering system library symbol `{}`", name);
    SYSTEM_LIB.register_function(name, wrap_backend_func(func));
}

/// Looks up `name` in `module`, failing if it does not exist.
pub fn get_function_checked(module: &Module, name: &str, query_imports: bool) -> Result<Function> {
    module
        .get_function(name, query_imports)
        .ok_or_else(|| Error::FunctionNotFound(name.to_string()))
}
