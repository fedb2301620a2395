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

//! Callbacks into the host language runtime.
//!
//! A host such as Python registers its signal check, interpreter lock and
//! reference counting entry points through `TVMBackendRegisterEnvCAPI`.
//! Until a symbol is registered the corresponding operation does nothing.

use std::os::raw::{c_int, c_void};
use std::sync::RwLock;

use lazy_static::lazy_static;
use log::debug;

use crate::errors::{Error, Result};
use crate::{read, write};

type CheckSignalsFn = unsafe extern "C" fn() -> c_int;
type GilEnsureFn = unsafe extern "C" fn() -> c_int;
type GilReleaseFn = unsafe extern "C" fn(c_int);
type RefCountFn = unsafe extern "C" fn(*mut c_void);

/// Symbol addresses, zero when unset.
#[derive(Default, Clone, Copy)]
struct EnvSymbols {
    check_signals: usize,
    gil_ensure: usize,
    gil_release: usize,
    inc_ref: usize,
    dec_ref: usize,
}

lazy_static! {
    static ref ENV_SYMBOLS: RwLock<EnvSymbols> = RwLock::new(EnvSymbols::default());
}

fn symbols() -> EnvSymbols {
    *read(&ENV_SYMBOLS)
}

/// Registers the host entry point `name`. The same pointer may be
/// registered again; a different one is rejected.
///
/// # Safety
///
/// `ptr` must be a function with the C signature of the named symbol and
/// stay valid for the rest of the process.
pub unsafe fn register_symbol(name: &str, ptr: *mut c_void) -> Result<()> {
    if ptr.is_null() {
        return Err(Error::NullHandle(name.to_string()));
    }
    let mut symbols = write(&ENV_SYMBOLS);
    let slot = match name {
        "PyErr_CheckSignals" => &mut symbols.check_signals,
        "PyGILState_Ensure" => &mut symbols.gil_ensure,
        "PyGILState_Release" => &mut symbols.gil_release,
        "Py_IncRef" => &mut symbols.inc_ref,
        "Py_DecRef" => &mut symbols.dec_ref,
        _ => return Err(Error::UnknownEnvSymbol(name.to_string())),
    };
    let address = ptr as usize;
    if *slot != 0 && *slot != address {
        return Err(Error::DuplicatedEnvSymbol(name.to_string()));
    }
    *slot = address;
    debug!("registered environment symbol `{}`", name);
    Ok(())
}

/// Holds the host interpreter lock while alive. Without registered lock
/// functions it is a no-op.
pub struct WithGil {
    release: Option<(GilReleaseFn, c_int)>,
}

impl WithGil {
    pub fn acquire() -> WithGil {
        let symbols = symbols();
        if symbols.gil_ensure == 0 || symbols.gil_release == 0 {
            return WithGil { release: None };
        }
        unsafe {
            let ensure: GilEnsureFn = std::mem::transmute(symbols.gil_ensure);
            let release: GilReleaseFn = std::mem::transmute(symbols.gil_release);
            let state = ensure();
            WithGil {
                release: Some((release, state)),
            }
        }
    }
}

impl Drop for WithGil {
    fn drop(&mut self) {
        if let Some((release, state)) = self.release.take() {
            unsafe { release(state) };
        }
    }
}

/// Lets the host process pending signals, such as a keyboard interrupt,
/// during a long running call.
///
/// Fails with [`Error::EnvErrorAlreadySet`] if the host raised; the host
/// error itself stays pending on the host side.
pub fn check_signals() -> Result<()> {
    let address = symbols().check_signals;
    if address == 0 {
        return Ok(());
    }
    let _gil = WithGil::acquire();
    let check: CheckSignalsFn = unsafe { std::mem::transmute(address) };
    if unsafe { check() } != 0 {
        return Err(Error::EnvErrorAlreadySet);
    }
    Ok(())
}

unsafe fn call_ref_count(address: usize, handle: *mut c_void) {
    if address == 0 || handle.is_null() {
        return;
    }
    let _gil = WithGil::acquire();
    let func: RefCountFn = std::mem::transmute(address);
    func(handle);
}

/// Adds a host reference to `handle`.
///
/// # Safety
///
/// `handle` must be a live host object.
pub unsafe fn inc_ref(handle: *mut c_void) {
    call_ref_count(symbols().inc_ref, handle)
}

/// Drops a host reference to `handle`.
///
/// # Safety
///
/// `handle` must be a live host object that the caller holds a reference to.
pub unsafe fn dec_ref(handle: *mut c_void) {
    call_ref_count(symbols().dec_ref, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);
    static GIL_DEPTH: AtomicI32 = AtomicI32::new(0);
    static MAX_GIL_DEPTH: AtomicI32 = AtomicI32::new(0);
    static HOST_REFS: AtomicI32 = AtomicI32::new(0);

    unsafe extern "C" fn check() -> c_int {
        assert!(GIL_DEPTH.load(Ordering::SeqCst) > 0, "signal check without the lock");
        PENDING_SIGNAL.swap(0, Ordering::SeqCst)
    }

    unsafe extern "C" fn ensure() -> c_int {
        let depth = GIL_DEPTH.fetch_add(1, Ordering::SeqCst) + 1;
        MAX_GIL_DEPTH.fetch_max(depth, Ordering::SeqCst);
        depth
    }

    unsafe extern "C" fn release(state: c_int) {
        assert_eq!(GIL_DEPTH.fetch_sub(1, Ordering::SeqCst), state);
    }

    unsafe extern "C" fn inc(_: *mut c_void) {
        HOST_REFS.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn dec(_: *mut c_void) {
        HOST_REFS.fetch_sub(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn other_check() -> c_int {
        0
    }

    #[test]
    fn host_callbacks() {
        unsafe {
            register_symbol("PyErr_CheckSignals", check as *mut c_void).unwrap();
            register_symbol("PyGILState_Ensure", ensure as *mut c_void).unwrap();
            register_symbol("PyGILState_Release", release as *mut c_void).unwrap();
            register_symbol("Py_IncRef", inc as *mut c_void).unwrap();
            register_symbol("Py_DecRef", dec as *mut c_void).unwrap();

            // same pointer again is fine, a different one is not
            register_symbol("PyErr_CheckSignals", check as *mut c_void).unwrap();
            let dup = register_symbol("PyErr_CheckSignals", other_check as *mut c_void);
            assert!(matches!(dup, Err(Error::DuplicatedEnvSymbol(_))));
            let unknown = register_symbol("Py_Finalize", inc as *mut c_void);
            assert!(matches!(unknown, Err(Error::UnknownEnvSymbol(_))));
            assert!(register_symbol("Py_IncRef", std::ptr::null_mut()).is_err());
        }

        check_signals().unwrap();
        PENDING_SIGNAL.store(1, Ordering::SeqCst);
        assert!(matches!(check_signals(), Err(Error::EnvErrorAlreadySet)));
        check_signals().unwrap();

        let mut host_object = 0u8;
        let handle = &mut host_object as *mut u8 as *mut c_void;
        unsafe {
            inc_ref(handle);
            inc_ref(handle);
            dec_ref(handle);
            inc_ref(std::ptr::null_mut());
        }
        assert_eq!(HOST_REFS.load(Ordering::SeqCst), 1);

        {
            let _outer = WithGil::acquire();
            let _inner = WithGil::acquire();
            assert_eq!(GIL_DEPTH.load(Ordering::SeqCst), 2);
        }
        assert_eq!(GIL_DEPTH.load(Ordering::SeqCst), 0);
        assert!(MAX_GIL_DEPTH.load(Ordering::SeqCst) >= 2);
    }
}
