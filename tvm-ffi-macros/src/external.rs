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

use proc_macro2::Span;
use proc_macro_error::abort;
use quote::quote;
use syn::parse::{Parse, ParseStream, Result};
use syn::spanned::Spanned;

use syn::{
    token::Semi, Attribute, FnArg, Generics, Ident, Lit, Meta, NestedMeta, Pat, ReturnType,
    Signature, Type, Visibility,
};

struct ExternalItem {
    attrs: Vec<Attribute>,
    visibility: Visibility,
    sig: Signature,
}

impl Parse for ExternalItem {
    fn parse(input: ParseStream) -> Result<Self> {
        let item = ExternalItem {
            attrs: input.call(Attribute::parse_outer)?,
            visibility: input.parse()?,
            sig: input.parse()?,
        };
        let _semi: Semi = input.parse()?;
        Ok(item)
    }
}

struct External {
    visibility: Visibility,
    tvm_name: String,
    ident: Ident,
    generics: Generics,
    inputs: Vec<FnArg>,
    ret_type: ReturnType,
}

impl Parse for External {
    fn parse(input: ParseStream) -> Result<Self> {
        let method: ExternalItem = input.parse()?;
        let visibility = method.visibility;
        let sig = method.sig;
        let name_attr = match method.attrs.as_slice() {
            [attr] => attr,
            _ => {
                return Err(syn::Error::new(
                    sig.ident.span(),
                    "expected exactly one `#[name(\"...\")]` attribute",
                ))
            }
        };
        let tvm_name = match name_attr.parse_meta()? {
            Meta::List(meta_list) if meta_list.path.is_ident("name") => {
                match meta_list.nested.first() {
                    Some(NestedMeta::Lit(Lit::Str(lit))) => lit.value(),
                    _ => {
                        return Err(syn::Error::new(
                            meta_list.span(),
                            "expected a global function name string",
                        ))
                    }
                }
            }
            other => return Err(syn::Error::new(other.span(), "expected `#[name(\"...\")]`")),
        };

        let ident = sig.ident;
        let generics = sig.generics;
        let inputs = sig.inputs.iter().cloned().collect();
        let ret_type = sig.output;

        Ok(External {
            visibility,
            tvm_name,
            ident,
            generics,
            inputs,
            ret_type,
        })
    }
}

struct ExternalInput {
    externs: Vec<External>,
}

impl Parse for ExternalInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut externs: Vec<External> = Vec::new();

        loop {
            if input.is_empty() {
                break;
            }
            externs.push(input.parse()?);
        }

        Ok(ExternalInput { externs })
    }
}

pub fn macro_impl(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ext_input = syn::parse_macro_input!(input as ExternalInput);

    let tvm_ffi_crate = crate::util::get_tvm_ffi_crate();

    let result_type = quote! { #tvm_ffi_crate::errors::Result };

    let mut items = Vec::new();

    for external in &ext_input.externs {
        let visibility = &external.visibility;
        let name = &external.ident;
        let global_name = format!("global_{}", external.ident);
        let global_name = Ident::new(&global_name, Span::call_site());
        let ext_name = &external.tvm_name;

        let ty_params: Vec<syn::TypeParam> = external
            .generics
            .params
            .iter()
            .map(|ty_param| match ty_param {
                syn::GenericParam::Type(param) => param.clone(),
                _ => abort! { ty_param,
                    "Only supports type parameters."
                },
            })
            .collect();

        let args = &external.inputs;

        let (args, tys): (Vec<Ident>, Vec<Type>) = args
            .iter()
            .map(|arg| match arg {
                FnArg::Typed(pat_type) => match &*pat_type.pat {
                    Pat::Ident(pat_ident) => {
                        let ident: Ident = pat_ident.ident.clone();
                        let ty: Type = *pat_type.ty.clone();
                        (ident, ty)
                    }
                    _ => abort! { pat_type,
                        "Only supports type parameters."
                    },
                },
                pat => abort! {
                    pat, "invalid pattern type for function";

                    note = "{:?} is not allowed here", pat;
                },
            })
            .unzip();

        let ret_type = match &external.ret_type {
            ReturnType::Type(_, rtype) => quote! { #rtype },
            ReturnType::Default => quote! { () },
        };

        // Only a successful lookup is cached, so a global registered after the
        // first failed call is still found later.
        let global = quote! {
            #[allow(non_upper_case_globals)]
            static #global_name: #tvm_ffi_crate::once_cell::sync::OnceCell<&'static #tvm_ffi_crate::Function> =
                #tvm_ffi_crate::once_cell::sync::OnceCell::new();
        };

        items.push(global);

        let wrapper = quote! {
            #visibility fn #name<#(#ty_params),*>(#(#args : #tys),*) -> #result_type<#ret_type> {
                let func_ref: &'static #tvm_ffi_crate::Function = *#global_name.get_or_try_init(|| {
                    #tvm_ffi_crate::Function::get(#ext_name)
                        .ok_or_else(|| #tvm_ffi_crate::errors::Error::FunctionNotFound(#ext_name.to_string()))
                })?;
                let res: #tvm_ffi_crate::RetValue = func_ref.invoke(vec![#(#args.into()),*])?;
                let res: #ret_type = std::convert::TryFrom::try_from(res)?;
                Ok(res)
            }
        };

        items.push(wrapper);
    }

    proc_macro::TokenStream::from(quote! {
        #(#items
        )*
    })
}
