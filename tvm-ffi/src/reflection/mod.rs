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

//! Attribute reflection for objects.
//!
//! Types opt in with `#[derive(Reflect)]` and [`register_node`]. Once
//! registered, their attributes can be listed, read and used to construct
//! new instances by type key, and they take part in structural equality,
//! structural hashing and JSON serialization.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::RwLock;

use lazy_static::lazy_static;
use log::debug;

use crate::boxed::{BoxBoolObj, BoxFloatObj, BoxIntObj};
use crate::errors::{Error, Result};
use crate::object::{IsObject, IsObjectRef, Object, ObjectPtr, ObjectRef};
use crate::{type_context, DataType, Device, RetValue};

mod json;
mod structural_equal;
mod structural_hash;

pub use json::{load_json, save_json};
pub use structural_equal::structural_equal;
pub use structural_hash::structural_hash;

/// How an object takes part in structural equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SEqualKind {
    /// Compared by content. Repeated occurrences are compared again.
    TreeNode,
    /// Compared by content once; later occurrences must map to the same node.
    GraphNode,
    /// Only equal to itself, unless bound at a definition site.
    FreeVar,
}

/// Receives the attributes of an object one by one.
pub trait AttrVisitor {
    fn visit(&mut self, key: &str, value: RetValue);

    /// Visits a field that defines the variables it holds, such as the
    /// parameters of a function.
    fn visit_def(&mut self, key: &str, value: RetValue) {
        self.visit(key, value)
    }
}

/// A field type that can be exposed as an attribute.
pub trait AttrField {
    fn to_attr(&self) -> RetValue;
}

macro_rules! impl_attr_field_pod {
    ($($type:ty),+) => {
        $(
            impl AttrField for $type {
                fn to_attr(&self) -> RetValue {
                    RetValue::from(self.clone())
                }
            }
        )+
    };
}

impl_attr_field_pod!(
    i8, i16, i32, i64, u8, u16, u32, f32, f64, bool, std::string::String, DataType, Device
);

// Object attributes stay objects, boxed primitives included, so that their
// identity survives serialization.
fn object_attr(object: Option<ObjectPtr<Object>>) -> RetValue {
    match object {
        None => RetValue::Null,
        Some(ptr) => match RetValue::from_object(Some(ptr.clone())) {
            RetValue::Int(_) | RetValue::Float(_) | RetValue::Bool(_) => RetValue::ObjectHandle(ptr),
            other => other,
        },
    }
}

impl<T: IsObjectRef> AttrField for T {
    fn to_attr(&self) -> RetValue {
        object_attr(self.clone().into_object_ref().0)
    }
}

impl<T: IsObjectRef> AttrField for Option<T> {
    fn to_attr(&self) -> RetValue {
        object_attr(self.clone().and_then(|v| v.into_object_ref().0))
    }
}

/// Resolves node references while an object graph is being rebuilt.
pub(crate) trait NodeResolver {
    fn resolve(&mut self, index: usize) -> Result<ObjectRef>;
}

/// The attributes an object is constructed from.
///
/// Every attribute must be consumed exactly once; leftovers are reported
/// as unknown attributes.
pub struct AttrReader<'a> {
    type_key: std::string::String,
    values: HashMap<std::string::String, RetValue>,
    reprs: HashMap<std::string::String, std::string::String>,
    resolver: Option<&'a mut dyn NodeResolver>,
}

impl<'a> AttrReader<'a> {
    pub fn new<I>(type_key: &str, attrs: I) -> AttrReader<'a>
    where
        I: IntoIterator<Item = (std::string::String, RetValue)>,
    {
        AttrReader {
            type_key: type_key.to_string(),
            values: attrs.into_iter().collect(),
            reprs: HashMap::new(),
            resolver: None,
        }
    }

    /// A reader over attributes in their JSON string form.
    pub(crate) fn from_reprs(
        type_key: &str,
        reprs: HashMap<std::string::String, std::string::String>,
        resolver: &'a mut dyn NodeResolver,
    ) -> AttrReader<'a> {
        AttrReader {
            type_key: type_key.to_string(),
            values: HashMap::new(),
            reprs,
            resolver: Some(resolver),
        }
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Takes the attribute `key`, converted to `T`.
    pub fn get<T>(&mut self, key: &str) -> Result<T>
    where
        T: TryFrom<RetValue>,
        Error: From<<T as TryFrom<RetValue>>::Error>,
    {
        let wrap = |type_key: &str, source: Error| Error::AttrConversion {
            type_key: type_key.to_string(),
            key: key.to_string(),
            source: Box::new(source),
        };
        if let Some(value) = self.values.remove(key) {
            return T::try_from(value).map_err(|err| wrap(&self.type_key, err.into()));
        }
        if let Some(repr) = self.reprs.remove(key) {
            return self
                .decode_repr::<T>(&repr)
                .map_err(|err| wrap(&self.type_key, err));
        }
        Err(Error::AttrNotFound {
            type_key: self.type_key.clone(),
            key: key.to_string(),
        })
    }

    fn decode_repr<T>(&mut self, repr: &str) -> Result<T>
    where
        T: TryFrom<RetValue>,
        Error: From<<T as TryFrom<RetValue>>::Error>,
    {
        // Only object-like fields accept null; for them the string is a node index.
        if T::try_from(RetValue::Null).is_ok() {
            let index: usize = repr
                .parse()
                .map_err(|_| Error::JsonFormat(format!("invalid node index `{}`", repr)))?;
            let node = match (index, self.resolver.as_mut()) {
                (0, _) => ObjectRef::null(),
                (_, Some(resolver)) => resolver.resolve(index)?,
                (_, None) => return Err(Error::JsonFormat("no node table to resolve from".into())),
            };
            return Ok(T::try_from(RetValue::from(node))?);
        }
        let mut candidates = vec![RetValue::Str(repr.to_string())];
        if let Ok(int) = repr.parse::<i64>() {
            candidates.push(RetValue::Int(int));
        }
        if let Ok(float) = repr.parse::<f64>() {
            candidates.push(RetValue::Float(float));
        }
        if let Ok(device) = repr.parse::<Device>() {
            candidates.push(RetValue::from(device));
        }
        let mut last_error = None;
        for candidate in candidates {
            match T::try_from(candidate) {
                Ok(value) => return Ok(value),
                Err(err) => last_error = Some(Error::from(err)),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::JsonFormat(repr.to_string())))
    }

    /// Fails if any attribute was not consumed.
    pub fn finish(self) -> Result<()> {
        let mut leftover: Vec<_> = self.values.keys().chain(self.reprs.keys()).collect();
        leftover.sort();
        match leftover.first() {
            Some(key) => Err(Error::UnknownAttr {
                type_key: self.type_key.clone(),
                key: key.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// The per-level part of reflection, generated by `#[derive(Reflect)]`.
pub trait ReflectBase: Sized {
    /// Visits the attributes of this level and of every ancestor.
    fn visit_base_attrs(&self, visitor: &mut dyn AttrVisitor);

    /// Builds this level for an object whose concrete type is `T`.
    fn base_from_attrs<T: IsObject>(reader: &mut AttrReader<'_>) -> Result<Self>;
}

impl ReflectBase for Object {
    fn visit_base_attrs(&self, _visitor: &mut dyn AttrVisitor) {}

    fn base_from_attrs<T: IsObject>(_reader: &mut AttrReader<'_>) -> Result<Object> {
        Ok(Object::base::<T>())
    }
}

/// A concrete object type with reflected attributes.
pub trait Reflect: IsObject + ReflectBase {
    const SEQUAL_KIND: SEqualKind;

    fn visit_attrs(&self, visitor: &mut dyn AttrVisitor) {
        self.visit_base_attrs(visitor)
    }

    fn from_attrs(reader: &mut AttrReader<'_>) -> Result<Self> {
        Self::base_from_attrs::<Self>(reader)
    }
}

#[derive(Clone, Copy)]
pub(crate) struct NodeVTable {
    pub(crate) sequal_kind: SEqualKind,
    visit_attrs: fn(&Object, &mut dyn AttrVisitor),
    create: fn(&mut AttrReader<'_>) -> Result<ObjectRef>,
}

fn visit_attrs_of<T: Reflect>(object: &Object, visitor: &mut dyn AttrVisitor) {
    if let Some(node) = object.downcast_ref::<T>() {
        node.visit_attrs(visitor);
    }
}

fn create_of<T: Reflect>(reader: &mut AttrReader<'_>) -> Result<ObjectRef> {
    let node = T::from_attrs(reader)?;
    Ok(ObjectRef::from(ObjectPtr::new(node)))
}

fn vtable_entry<T: Reflect>() -> (u32, NodeVTable) {
    let entry = NodeVTable {
        sequal_kind: T::SEQUAL_KIND,
        visit_attrs: visit_attrs_of::<T>,
        create: create_of::<T>,
    };
    (T::runtime_type_index(), entry)
}

lazy_static! {
    static ref VTABLES: RwLock<HashMap<u32, NodeVTable>> = {
        let builtin = vec![
            vtable_entry::<BoxIntObj>(),
            vtable_entry::<BoxFloatObj>(),
            vtable_entry::<BoxBoolObj>(),
        ];
        RwLock::new(builtin.into_iter().collect())
    };
}

/// Makes `T` available to the generic reflection operations. Registering
/// twice is harmless.
pub fn register_node<T: Reflect>() -> u32 {
    let (index, entry) = vtable_entry::<T>();
    let mut vtables = crate::write(&VTABLES);
    if !vtables.contains_key(&index) {
        debug!("registering reflection for `{}` (index {})", T::TYPE_KEY, index);
        vtables.insert(index, entry);
    }
    index
}

pub(crate) fn vtable(type_index: u32) -> Option<NodeVTable> {
    crate::read(&VTABLES).get(&type_index).copied()
}

fn vtable_of(object: &Object) -> Result<NodeVTable> {
    vtable(object.type_index()).ok_or_else(|| Error::NotReflectable(object.type_key()))
}

/// Visits the attributes of a reflected object.
pub fn visit_attrs(object: &Object, visitor: &mut dyn AttrVisitor) -> Result<()> {
    let entry = vtable_of(object)?;
    (entry.visit_attrs)(object, visitor);
    Ok(())
}

/// One visited attribute.
pub(crate) struct Attr {
    pub(crate) key: std::string::String,
    pub(crate) value: RetValue,
    pub(crate) is_def: bool,
}

#[derive(Default)]
struct AttrCollector(Vec<Attr>);

impl AttrVisitor for AttrCollector {
    fn visit(&mut self, key: &str, value: RetValue) {
        self.0.push(Attr {
            key: key.to_string(),
            value,
            is_def: false,
        });
    }

    fn visit_def(&mut self, key: &str, value: RetValue) {
        self.0.push(Attr {
            key: key.to_string(),
            value,
            is_def: true,
        });
    }
}

pub(crate) fn collect_attrs(object: &Object) -> Result<Vec<Attr>> {
    let mut collector = AttrCollector::default();
    visit_attrs(object, &mut collector)?;
    Ok(collector.0)
}

/// Reads one attribute of a reflected object.
pub fn get_attr(object: &ObjectRef, key: &str) -> Result<RetValue> {
    let object = object
        .as_object()
        .ok_or_else(|| Error::NullHandle("ObjectRef".into()))?;
    collect_attrs(object)?
        .into_iter()
        .find(|attr| attr.key == key)
        .map(|attr| attr.value)
        .ok_or_else(|| Error::AttrNotFound {
            type_key: object.type_key(),
            key: key.to_string(),
        })
}

/// Lists the attribute names of a reflected object in declaration order.
pub fn list_attr_names(object: &ObjectRef) -> Result<Vec<std::string::String>> {
    let object = object
        .as_object()
        .ok_or_else(|| Error::NullHandle("ObjectRef".into()))?;
    Ok(collect_attrs(object)?.into_iter().map(|attr| attr.key).collect())
}

pub(crate) fn create_with_reader(mut reader: AttrReader<'_>) -> Result<ObjectRef> {
    let index = type_context::type_key2index(reader.type_key())?;
    let entry = vtable(index).ok_or_else(|| Error::NotReflectable(reader.type_key().to_string()))?;
    let object = (entry.create)(&mut reader)?;
    reader.finish()?;
    Ok(object)
}

/// Constructs a registered object from its type key and attributes.
pub fn create_object<I>(type_key: &str, attrs: I) -> Result<ObjectRef>
where
    I: IntoIterator<Item = (std::string::String, RetValue)>,
{
    create_with_reader(AttrReader::new(type_key, attrs))
}
