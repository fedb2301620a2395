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

use proc_macro2::TokenStream;
use proc_macro_error::abort;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, DeriveInput, Lit, LitStr, Meta, MetaNameValue};

/// Paths in generated code always go through `tvm_ffi`; inside the runtime
/// crate itself this resolves through `extern crate self as tvm_ffi`.
pub fn get_tvm_ffi_crate() -> TokenStream {
    quote!(tvm_ffi)
}

pub(crate) fn get_attr<'a>(derive_input: &'a DeriveInput, name: &str) -> Option<&'a Attribute> {
    derive_input.attrs.iter().find(|a| a.path.is_ident(name))
}

fn attr_lit(attr: &Attribute) -> Lit {
    match attr.parse_meta() {
        Ok(Meta::NameValue(MetaNameValue { lit, .. })) => lit,
        Ok(m) => abort!(m.span(), "expected `#[name = value]`"),
        Err(e) => abort!(e.span(), "{}", e),
    }
}

pub(crate) fn attr_to_str(attr: &Attribute) -> LitStr {
    match attr_lit(attr) {
        Lit::Str(s) => s,
        other => abort!(other.span(), "expected a string literal"),
    }
}

pub(crate) fn attr_to_u32(attr: &Attribute) -> u32 {
    match attr_lit(attr) {
        Lit::Int(i) => match i.base10_parse() {
            Ok(v) => v,
            Err(e) => abort!(i.span(), "{}", e),
        },
        other => abort!(other.span(), "expected an integer literal"),
    }
}

pub(crate) fn attr_to_bool(attr: &Attribute) -> bool {
    match attr_lit(attr) {
        Lit::Bool(b) => b.value,
        other => abort!(other.span(), "expected `true` or `false`"),
    }
}
