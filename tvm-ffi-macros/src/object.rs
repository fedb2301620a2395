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

use proc_macro::TokenStream;
use proc_macro2::Span;
use proc_macro_error::abort;
use quote::quote;
use syn::DeriveInput;
use syn::Ident;

use crate::util::*;

pub fn macro_impl(input: proc_macro::TokenStream) -> TokenStream {
    let tvm_ffi_crate = get_tvm_ffi_crate();
    let result = quote! { #tvm_ffi_crate::errors::Result };
    let error = quote! { #tvm_ffi_crate::errors::Error };
    let derive_input = syn::parse_macro_input!(input as DeriveInput);
    let payload_id = derive_input.ident.clone();
    let vis = derive_input.vis.clone();

    let type_key = match get_attr(&derive_input, "type_key") {
        Some(attr) => attr_to_str(attr),
        None => abort!(payload_id, "objects need a `#[type_key = \"...\"]` attribute"),
    };

    let derive = get_attr(&derive_input, "no_derive")
        .map(|_| false)
        .unwrap_or(true);

    let type_final = get_attr(&derive_input, "type_final").is_some();

    let child_slots = get_attr(&derive_input, "type_child_slots")
        .map(attr_to_u32)
        .unwrap_or(0);

    let can_overflow = get_attr(&derive_input, "type_child_slots_can_overflow")
        .map(attr_to_bool)
        .unwrap_or(true);

    let static_index = get_attr(&derive_input, "static_type_index")
        .map(|a| Ident::new(attr_to_str(a).value().as_str(), Span::call_site()))
        .unwrap_or_else(|| Ident::new("DYNAMIC", Span::call_site()));

    let ref_id = get_attr(&derive_input, "ref_name")
        .map(|a| Ident::new(attr_to_str(a).value().as_str(), Span::call_site()))
        .unwrap_or_else(|| {
            let id = payload_id.to_string();
            let suffixes = ["Node", "Obj"];
            if let Some(suf) = suffixes
                .iter()
                .find(|&suf| id.len() > suf.len() && id.ends_with(suf))
            {
                Ident::new(&id[..id.len() - suf.len()], payload_id.span())
            } else {
                abort!(
                    payload_id,
                    "Either 'ref_name' must be given, or the struct name must end one of {:?}",
                    suffixes
                )
            }
        });

    let base_ty = match &derive_input.data {
        syn::Data::Struct(s) => match s.fields.iter().next() {
            Some(field) if field.ident.as_ref().map_or(false, |id| id == "base") => {
                field.ty.clone()
            }
            _ => abort!(
                payload_id,
                "the first field of an object must be `base`, holding its parent object"
            ),
        },
        _ => abort!(payload_id, "derive only works for structs"),
    };

    let ref_derives = if derive {
        quote! { #[derive(Debug, Clone)]}
    } else {
        quote! { #[derive(Clone)] }
    };

    let mut expanded = quote! {
        unsafe impl #tvm_ffi_crate::object::IsObject for #payload_id {
            const TYPE_KEY: &'static str = #type_key;
            const TYPE_FINAL: bool = #type_final;
            const TYPE_CHILD_SLOTS: u32 = #child_slots;
            const TYPE_CHILD_SLOTS_CAN_OVERFLOW: bool = #can_overflow;
            const STATIC_TYPE_INDEX: u32 = #tvm_ffi_crate::type_context::TypeIndex::#static_index;

            fn runtime_type_index() -> u32 {
                static TYPE_INDEX: #tvm_ffi_crate::type_context::TypeIndexCell =
                    #tvm_ffi_crate::type_context::TypeIndexCell::new();
                TYPE_INDEX.get_or_register::<Self>()
            }

            fn parent_type_index() -> u32 {
                <#base_ty as #tvm_ffi_crate::object::IsObject>::runtime_type_index()
            }
        }

        // a silly AsRef impl is necessary for subtyping to work
        impl AsRef<#payload_id> for #payload_id {
            fn as_ref(&self) -> &Self {
                self
            }
        }

        // The transitive case of subtyping
        impl<O> AsRef<O> for #payload_id
            where #base_ty: AsRef<O>
        {
            fn as_ref(&self) -> &O {
                self.base.as_ref()
            }
        }

        #ref_derives
        #vis struct #ref_id(Option<#tvm_ffi_crate::object::ObjectPtr<#payload_id>>);

        impl #tvm_ffi_crate::object::IsObjectRef for #ref_id {
            type Object = #payload_id;

            fn as_ptr(&self) -> Option<&#tvm_ffi_crate::object::ObjectPtr<Self::Object>> {
                self.0.as_ref()
            }

            fn into_ptr(self) -> Option<#tvm_ffi_crate::object::ObjectPtr<Self::Object>> {
                self.0
            }

            fn from_ptr(object_ptr: Option<#tvm_ffi_crate::object::ObjectPtr<Self::Object>>) -> Self {
                #ref_id(object_ptr)
            }
        }

        impl std::ops::Deref for #ref_id {
            type Target = #payload_id;

            fn deref(&self) -> &Self::Target {
                match &self.0 {
                    Some(ptr) => ptr,
                    None => panic!("attempted to dereference a null `{}`", stringify!(#ref_id)),
                }
            }
        }

        impl std::convert::From<#payload_id> for #ref_id {
            fn from(payload: #payload_id) -> Self {
                #ref_id(Some(#tvm_ffi_crate::object::ObjectPtr::new(payload)))
            }
        }

        impl std::convert::From<#tvm_ffi_crate::object::ObjectPtr<#payload_id>> for #ref_id {
            fn from(ptr: #tvm_ffi_crate::object::ObjectPtr<#payload_id>) -> Self {
                #ref_id(Some(ptr))
            }
        }

        impl std::convert::From<#ref_id> for #tvm_ffi_crate::object::ObjectRef {
            fn from(object_ref: #ref_id) -> Self {
                #tvm_ffi_crate::object::ObjectRef(object_ref.0.map(|ptr| ptr.into_base()))
            }
        }

        impl<'a> std::convert::TryFrom<#tvm_ffi_crate::ArgValue<'a>> for #ref_id {
            type Error = #error;

            fn try_from(arg_value: #tvm_ffi_crate::ArgValue<'a>) -> #result<#ref_id> {
                #tvm_ffi_crate::object::object_ptr_from_arg::<#payload_id>(arg_value).map(#ref_id)
            }
        }

        impl std::convert::TryFrom<#tvm_ffi_crate::RetValue> for #ref_id {
            type Error = #error;

            fn try_from(ret_val: #tvm_ffi_crate::RetValue) -> #result<#ref_id> {
                #tvm_ffi_crate::object::object_ptr_from_arg::<#payload_id>(ret_val.into()).map(#ref_id)
            }
        }

        impl<'a> From<&'a #ref_id> for #tvm_ffi_crate::ArgValue<'a> {
            fn from(object_ref: &'a #ref_id) -> #tvm_ffi_crate::ArgValue<'a> {
                #tvm_ffi_crate::ArgValue::from_object(
                    object_ref.0.clone().map(|ptr| ptr.into_base()),
                    false,
                )
            }
        }

        impl<'a> From<#ref_id> for #tvm_ffi_crate::ArgValue<'a> {
            fn from(object_ref: #ref_id) -> #tvm_ffi_crate::ArgValue<'a> {
                #tvm_ffi_crate::ArgValue::from_object(object_ref.0.map(|ptr| ptr.into_base()), true)
            }
        }

        impl From<#ref_id> for #tvm_ffi_crate::RetValue {
            fn from(object_ref: #ref_id) -> #tvm_ffi_crate::RetValue {
                #tvm_ffi_crate::RetValue::from_object(object_ref.0.map(|ptr| ptr.into_base()))
            }
        }
    };

    if derive {
        let derives = quote! {
            impl std::hash::Hash for #ref_id {
                fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                    self.0.hash(state)
                }
            }

            impl std::cmp::PartialEq for #ref_id {
                fn eq(&self, other: &Self) -> bool {
                    self.0 == other.0
                }
            }

            impl std::cmp::Eq for #ref_id {}
        };

        expanded.extend(derives);
    }

    TokenStream::from(expanded)
}
