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

//! The process-wide table of global functions.
//!
//! Registered functions are leaked and live until the process exits, so a
//! lookup hands out a `&'static Function` and releases the lock before the
//! caller invokes it.

use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::{debug, warn};

use crate::builtins;
use crate::errors::{Error, Result};
use crate::function::Function;
use crate::lock;

lazy_static! {
    static ref GLOBAL_FUNCTIONS: Mutex<HashMap<String, &'static Function>> = {
        let functions = builtins::builtin_functions()
            .into_iter()
            .map(|(name, func)| (name.to_string(), &*Box::leak(Box::new(func))))
            .collect();
        Mutex::new(functions)
    };
}

/// Registers `func` under `name`. An existing entry is replaced only when
/// `can_override` is set.
pub fn register(name: &str, func: Function, can_override: bool) -> Result<()> {
    let mut globals = lock(&GLOBAL_FUNCTIONS);
    if globals.contains_key(name) {
        if !can_override {
            return Err(Error::FunctionAlreadyRegistered(name.to_string()));
        }
        warn!("overriding global function `{}`", name);
    } else {
        debug!("registering global function `{}`", name);
    }
    globals.insert(name.to_string(), Box::leak(Box::new(func)));
    Ok(())
}

pub fn get(name: &str) -> Option<&'static Function> {
    lock(&GLOBAL_FUNCTIONS).get(name).copied()
}

/// Removes `name` from the table. The function itself stays alive.
pub fn remove(name: &str) -> bool {
    lock(&GLOBAL_FUNCTIONS).remove(name).is_some()
}

/// All registered names, sorted.
pub fn list_names() -> Vec<String> {
    let mut names: Vec<String> = lock(&GLOBAL_FUNCTIONS).keys().cloned().collect();
    names.sort();
    names
}
