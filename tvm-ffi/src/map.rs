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

use std::convert::TryFrom;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::errors::{Error, Result};
use crate::object::{object_ptr_from_arg, IsObject, IsObjectRef, Object, ObjectPtr, ObjectRef};
use crate::string::StringObj;
use crate::type_context::{TypeIndex, TypeIndexCell};
use crate::{ArgValue, RetValue};

/// A map key. String keys compare by content, every other object by
/// identity.
#[derive(Clone, Debug)]
pub struct MapKey(pub ObjectRef);

impl MapKey {
    fn as_str(&self) -> Option<&str> {
        self.0
            .as_object()
            .and_then(|object| object.downcast_ref::<StringObj>())
            .map(StringObj::as_str)
    }

    /// A printable form for error messages.
    pub fn repr(&self) -> std::string::String {
        match (self.as_str(), &self.0 .0) {
            (Some(s), _) => s.to_string(),
            (None, Some(ptr)) => format!("{:?}", ptr),
            (None, None) => "null".to_string(),
        }
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        match (self.as_str(), other.as_str()) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => self.0 == other.0,
        }
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.as_str() {
            Some(s) => s.hash(state),
            None => self.0.hash(state),
        }
    }
}

/// The untyped storage of every `Map<K, V>`. Iteration follows insertion
/// order.
#[repr(C)]
#[derive(Debug)]
pub struct MapObj {
    base: Object,
    data: IndexMap<MapKey, ObjectRef>,
}

unsafe impl IsObject for MapObj {
    const TYPE_KEY: &'static str = "Map";
    const TYPE_FINAL: bool = true;
    const STATIC_TYPE_INDEX: u32 = TypeIndex::MAP;

    fn runtime_type_index() -> u32 {
        static TYPE_INDEX: TypeIndexCell = TypeIndexCell::new();
        TYPE_INDEX.get_or_register::<Self>()
    }

    fn parent_type_index() -> u32 {
        Object::runtime_type_index()
    }
}

impl AsRef<Object> for MapObj {
    fn as_ref(&self) -> &Object {
        &self.base
    }
}

impl AsRef<MapObj> for MapObj {
    fn as_ref(&self) -> &MapObj {
        self
    }
}

impl MapObj {
    pub fn new(data: IndexMap<MapKey, ObjectRef>) -> MapObj {
        MapObj {
            base: Object::base::<MapObj>(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &ObjectRef) -> Option<&ObjectRef> {
        self.data.get(&MapKey(key.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectRef, &ObjectRef)> + '_ {
        self.data.iter().map(|(key, value)| (&key.0, value))
    }
}

/// A copy-on-write map between object references.
#[repr(C)]
pub struct Map<K: IsObjectRef, V: IsObjectRef> {
    object: Option<ObjectPtr<MapObj>>,
    _data: PhantomData<(K, V)>,
}

impl<K: IsObjectRef, V: IsObjectRef> Clone for Map<K, V> {
    fn clone(&self) -> Self {
        Map {
            object: self.object.clone(),
            _data: PhantomData,
        }
    }
}

impl<K: IsObjectRef, V: IsObjectRef> IsObjectRef for Map<K, V> {
    type Object = MapObj;

    fn as_ptr(&self) -> Option<&ObjectPtr<Self::Object>> {
        self.object.as_ref()
    }

    fn into_ptr(self) -> Option<ObjectPtr<Self::Object>> {
        self.object
    }

    fn from_ptr(object_ptr: Option<ObjectPtr<Self::Object>>) -> Self {
        Map {
            object: object_ptr,
            _data: PhantomData,
        }
    }

    fn type_name() -> std::string::String {
        format!("Map[{}, {}]", K::type_name(), V::type_name())
    }

    fn check_and_get_mismatch(object: Option<&Object>) -> Option<std::string::String> {
        let object = object?;
        let map = match object.downcast_ref::<MapObj>() {
            Some(map) => map,
            None => return Some(object.type_key()),
        };
        map.iter().find_map(|(key, value)| {
            if let Some(mismatch) = K::check_and_get_mismatch(key.as_object()) {
                return Some(format!("Map[{}, {}]", mismatch, V::type_name()));
            }
            V::check_and_get_mismatch(value.as_object())
                .map(|mismatch| format!("Map[{}, {}]", K::type_name(), mismatch))
        })
    }
}

impl<K: IsObjectRef, V: IsObjectRef> Map<K, V> {
    /// An empty, defined map.
    pub fn new() -> Map<K, V> {
        Map::from_ptr(Some(ObjectPtr::new(MapObj::new(IndexMap::new()))))
    }

    fn storage(&self) -> Option<&MapObj> {
        self.object.as_deref()
    }

    pub fn len(&self) -> usize {
        self.storage().map_or(0, MapObj::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let key = MapKey(key.clone().into_object_ref());
        self.storage().map_or(false, |map| map.data.contains_key(&key))
    }

    pub fn get(&self, key: &K) -> Result<V> {
        let key = MapKey(key.clone().into_object_ref());
        match self.storage().and_then(|map| map.data.get(&key)) {
            Some(value) => value.clone().downcast(),
            None => Err(Error::KeyNotFound(key.repr())),
        }
    }

    fn data_mut(&mut self) -> &mut IndexMap<MapKey, ObjectRef> {
        let ptr = self
            .object
            .get_or_insert_with(|| ObjectPtr::new(MapObj::new(IndexMap::new())));
        &mut ptr.make_mut_with(|map| MapObj::new(map.data.clone())).data
    }

    /// Inserts or replaces an entry, copying the storage first if it is
    /// shared.
    pub fn insert(&mut self, key: K, value: V) {
        self.data_mut()
            .insert(MapKey(key.into_object_ref()), value.into_object_ref());
    }

    /// Removes an entry, copying the storage first if it is shared.
    /// Returns whether the key was present.
    pub fn remove(&mut self, key: &K) -> bool {
        if !self.contains_key(key) {
            return false;
        }
        let key = MapKey(key.clone().into_object_ref());
        self.data_mut().shift_remove(&key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.storage()
            .into_iter()
            .flat_map(|map| map.iter())
            .map(|(key, value)| match (key.clone().downcast(), value.clone().downcast()) {
                (Ok(key), Ok(value)) => (key, value),
                (Err(err), _) | (_, Err(err)) => {
                    panic!("map entry does not match its declared type: {}", err)
                }
            })
    }
}

impl<K: IsObjectRef, V: IsObjectRef> Default for Map<K, V> {
    fn default() -> Self {
        Map::new()
    }
}

impl<K, V> std::fmt::Debug for Map<K, V>
where
    K: IsObjectRef + std::fmt::Debug,
    V: IsObjectRef + std::fmt::Debug,
{
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: IsObjectRef, V: IsObjectRef> FromIterator<(K, V)> for Map<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let data = iter
            .into_iter()
            .map(|(key, value)| (MapKey(key.into_object_ref()), value.into_object_ref()))
            .collect();
        Map::from_ptr(Some(ObjectPtr::new(MapObj::new(data))))
    }
}

impl<'a, K: IsObjectRef, V: IsObjectRef> From<&'a Map<K, V>> for ArgValue<'a> {
    fn from(map: &'a Map<K, V>) -> ArgValue<'a> {
        ArgValue::from_object(map.object.clone().map(ObjectPtr::into_base), false)
    }
}

impl<'a, K: IsObjectRef, V: IsObjectRef> From<Map<K, V>> for ArgValue<'a> {
    fn from(map: Map<K, V>) -> ArgValue<'a> {
        ArgValue::from_object(map.object.map(ObjectPtr::into_base), true)
    }
}

impl<K: IsObjectRef, V: IsObjectRef> From<Map<K, V>> for RetValue {
    fn from(map: Map<K, V>) -> RetValue {
        RetValue::from_object(map.object.map(ObjectPtr::into_base))
    }
}

impl<K: IsObjectRef, V: IsObjectRef> From<Map<K, V>> for ObjectRef {
    fn from(map: Map<K, V>) -> ObjectRef {
        map.into_object_ref()
    }
}

impl<'a, K, V> TryFrom<ArgValue<'a>> for Map<K, V>
where
    K: IsObjectRef + for<'b> TryFrom<ArgValue<'b>, Error = Error>,
    V: IsObjectRef + for<'b> TryFrom<ArgValue<'b>, Error = Error>,
{
    type Error = Error;

    fn try_from(arg: ArgValue<'a>) -> Result<Map<K, V>> {
        let map = match object_ptr_from_arg::<Object>(arg)? {
            Some(object) => object.downcast::<MapObj>()?,
            None => return Ok(Map::from_ptr(None)),
        };
        let mismatch = match Self::check_and_get_mismatch(Some(map.as_object())) {
            Some(mismatch) => mismatch,
            None => return Ok(Map::from_ptr(Some(map))),
        };
        map.iter()
            .map(|(key, value)| Ok((K::try_from(ArgValue::from(key))?, V::try_from(ArgValue::from(value))?)))
            .collect::<Result<Map<K, V>>>()
            .map_err(|_| Error::downcast(mismatch, Self::type_name()))
    }
}

impl<K, V> TryFrom<RetValue> for Map<K, V>
where
    K: IsObjectRef + for<'b> TryFrom<ArgValue<'b>, Error = Error>,
    V: IsObjectRef + for<'b> TryFrom<ArgValue<'b>, Error = Error>,
{
    type Error = Error;

    fn try_from(ret: RetValue) -> Result<Map<K, V>> {
        Map::try_from(ArgValue::from(ret))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::boxed::Int;
    use crate::string::String;

    #[test]
    fn test_from_iter() {
        let data = vec![(String::from("foo"), Int::from(1)), (String::from("bar"), Int::from(2))];
        let map: Map<String, Int> = data.into_iter().collect();
        assert_eq!(map.len(), 2);
        // lookups compare string keys by content
        assert_eq!(map.get(&String::from("bar")).unwrap().value, 2);
        assert!(map.contains_key(&String::from("foo")));
        let err = map.get(&String::from("baz")).unwrap_err();
        assert_eq!(err.to_string(), "Key `baz` does not exist");
        let keys: Vec<std::string::String> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["foo", "bar"]);
    }

    #[test]
    fn copy_on_write() {
        let mut original: Map<String, Int> = Map::new();
        original.insert(String::from("a"), Int::from(1));
        let mut copy = original.clone();
        copy.insert(String::from("b"), Int::from(2));
        assert!(copy.remove(&String::from("a")));
        assert!(!copy.remove(&String::from("zzz")));
        assert_eq!(original.len(), 1);
        assert!(original.contains_key(&String::from("a")));
        assert_eq!(copy.len(), 1);
    }

    #[test]
    fn mismatch_names_the_entry() {
        let map: Map<String, ObjectRef> =
            vec![(String::from("k"), String::from("v").into())].into_iter().collect();
        let err = Map::<String, Int>::try_from(ArgValue::from(&map)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected type `Map[runtime.String, runtime.BoxInt]` but found `Map[runtime.String, runtime.String]`"
        );
        let same = Map::<String, ObjectRef>::try_from(RetValue::from(map.clone())).unwrap();
        assert!(same.same_as(&map));
    }
}
