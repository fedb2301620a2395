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
use syn::spanned::Spanned;
use syn::{DeriveInput, Field, Ident, Lit, LitStr, Meta, NestedMeta};

use crate::util::*;

#[derive(Default)]
struct FieldOptions {
    def: bool,
    skip: bool,
    name: Option<LitStr>,
}

fn field_options(field: &Field) -> FieldOptions {
    let mut options = FieldOptions::default();
    for attr in field.attrs.iter().filter(|a| a.path.is_ident("reflect")) {
        let list = match attr.parse_meta() {
            Ok(Meta::List(list)) => list,
            Ok(other) => abort!(other.span(), "expected `#[reflect(...)]`"),
            Err(e) => abort!(e.span(), "{}", e),
        };
        for nested in list.nested.iter() {
            match nested {
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("def") => options.def = true,
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("skip") => options.skip = true,
                NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => {
                    match &nv.lit {
                        Lit::Str(s) => options.name = Some(s.clone()),
                        other => abort!(other.span(), "expected a string literal"),
                    }
                }
                other => abort!(other.span(), "unknown reflect option"; help = "expected `def`, `skip` or `name = \"...\"`"),
            }
        }
    }
    options
}

pub fn macro_impl(input: proc_macro::TokenStream) -> TokenStream {
    let tvm_ffi_crate = get_tvm_ffi_crate();
    let result = quote! { #tvm_ffi_crate::errors::Result };
    let derive_input = syn::parse_macro_input!(input as DeriveInput);
    let payload_id = derive_input.ident.clone();

    let sequal_kind = get_attr(&derive_input, "sequal_kind")
        .map(|a| {
            let kind = attr_to_str(a);
            match kind.value().as_str() {
                "TreeNode" | "GraphNode" | "FreeVar" => Ident::new(&kind.value(), Span::call_site()),
                _ => abort!(kind.span(), "sequal_kind must be one of TreeNode, GraphNode, FreeVar"),
            }
        })
        .unwrap_or_else(|| Ident::new("TreeNode", Span::call_site()));

    let fields: Vec<Field> = match &derive_input.data {
        syn::Data::Struct(s) => s.fields.iter().cloned().collect(),
        _ => abort!(payload_id, "derive only works for structs"),
    };

    let base_ty = match fields.first() {
        Some(field) if field.ident.as_ref().map_or(false, |id| id == "base") => field.ty.clone(),
        _ => abort!(payload_id, "the first field of an object must be `base`"),
    };

    let mut visits = Vec::new();
    let mut reads = Vec::new();
    for field in fields.iter().skip(1) {
        let ident = match &field.ident {
            Some(ident) => ident.clone(),
            None => abort!(field.span(), "reflected objects need named fields"),
        };
        let options = field_options(field);
        if options.skip {
            reads.push(quote! { #ident: Default::default() });
            continue;
        }
        let key = options
            .name
            .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
        let visit = if options.def {
            quote! { visitor.visit_def(#key, #tvm_ffi_crate::reflection::AttrField::to_attr(&self.#ident)); }
        } else {
            quote! { visitor.visit(#key, #tvm_ffi_crate::reflection::AttrField::to_attr(&self.#ident)); }
        };
        visits.push(visit);
        reads.push(quote! { #ident: reader.get(#key)? });
    }

    let expanded = quote! {
        impl #tvm_ffi_crate::reflection::ReflectBase for #payload_id {
            fn visit_base_attrs(&self, visitor: &mut dyn #tvm_ffi_crate::reflection::AttrVisitor) {
                #tvm_ffi_crate::reflection::ReflectBase::visit_base_attrs(&self.base, visitor);
                #(#visits)*
            }

            fn base_from_attrs<T: #tvm_ffi_crate::object::IsObject>(
                reader: &mut #tvm_ffi_crate::reflection::AttrReader<'_>,
            ) -> #result<Self> {
                Ok(#payload_id {
                    base: <#base_ty as #tvm_ffi_crate::reflection::ReflectBase>::base_from_attrs::<T>(reader)?,
                    #(#reads,)*
                })
            }
        }

        impl #tvm_ffi_crate::reflection::Reflect for #payload_id {
            const SEQUAL_KIND: #tvm_ffi_crate::reflection::SEqualKind =
                #tvm_ffi_crate::reflection::SEqualKind::#sequal_kind;
        }
    };

    TokenStream::from(expanded)
}
