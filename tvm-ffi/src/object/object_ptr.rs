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

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicI32, Ordering};

use crate::errors::{Error, Result};
use crate::type_context::{self, TypeIndex};

type Deleter = unsafe extern "C" fn(object: *mut Object) -> ();

/// The header shared by every object.
///
/// Its layout matches the C++ `tvm::runtime::Object` so that handles can
/// cross the C ABI unchanged.
#[repr(C)]
pub struct Object {
    /// The index into the type table, fixed at construction.
    type_index: u32,
    /// Number of live `ObjectPtr`s (or C handles) to this object.
    ref_count: AtomicI32,
    /// Frees the concrete object once the count drops to zero.
    fdeleter: Deleter,
}

unsafe extern "C" fn delete<T: IsObject>(object: *mut Object) {
    T::typed_delete(object as *mut T);
}

impl Object {
    fn new(type_index: u32, deleter: Deleter) -> Object {
        Object {
            type_index,
            // ObjectPtr::new takes the first reference
            ref_count: AtomicI32::new(0),
            fdeleter: deleter,
        }
    }

    /// Builds the header for an object of concrete type `T`, registering
    /// the type on first use.
    pub fn base<T: IsObject>() -> Object {
        Object::new(T::runtime_type_index(), delete::<T>)
    }

    pub fn type_index(&self) -> u32 {
        self.type_index
    }

    pub fn type_key(&self) -> String {
        type_context::type_index2key(self.type_index)
            .unwrap_or_else(|_| format!("<unregistered type {}>", self.type_index))
    }

    /// The current reference count. Only a hint under concurrency.
    pub fn count(&self) -> i32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn derived_from(&self, parent_index: u32) -> bool {
        type_context::derived_from(self.type_index, parent_index)
    }

    /// Whether this object is a `T` or one of its subtypes.
    pub fn is_instance<T: IsObject>(&self) -> bool {
        let begin = T::runtime_type_index();
        if begin == TypeIndex::ROOT {
            return true;
        }
        if T::TYPE_FINAL {
            return self.type_index == begin;
        }
        if self.type_index >= begin && self.type_index - begin <= T::TYPE_CHILD_SLOTS {
            return true;
        }
        if !T::TYPE_CHILD_SLOTS_CAN_OVERFLOW || self.type_index < begin {
            return false;
        }
        self.derived_from(begin)
    }

    pub fn downcast_ref<T: IsObject>(&self) -> Option<&T> {
        if self.is_instance::<T>() {
            Some(unsafe { &*(self as *const Object as *const T) })
        } else {
            None
        }
    }

    pub(crate) fn inc_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops one reference, destroying the object when it was the last.
    pub(crate) unsafe fn dec_ref(object: *mut Object) {
        if (*object).ref_count.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            let deleter = (*object).fdeleter;
            deleter(object);
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type_key", &self.type_key())
            .field("type_index", &self.type_index)
            .field("ref_count", &self.count())
            .finish()
    }
}

/// A type that can live behind an [`ObjectPtr`].
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with their parent object as the first
/// field, so that a pointer to the object is also a valid pointer to every
/// ancestor and to the [`Object`] header. Use `#[derive(Object)]`.
pub unsafe trait IsObject: AsRef<Object> + Sized + Send + Sync + 'static {
    const TYPE_KEY: &'static str;
    const TYPE_FINAL: bool = false;
    const TYPE_CHILD_SLOTS: u32 = 0;
    const TYPE_CHILD_SLOTS_CAN_OVERFLOW: bool = true;
    const STATIC_TYPE_INDEX: u32 = TypeIndex::DYNAMIC;

    fn runtime_type_index() -> u32;

    fn parent_type_index() -> u32;

    unsafe extern "C" fn typed_delete(object: *mut Self) {
        drop(Box::from_raw(object));
    }
}

unsafe impl IsObject for Object {
    const TYPE_KEY: &'static str = "runtime.Object";
    const STATIC_TYPE_INDEX: u32 = TypeIndex::ROOT;

    fn runtime_type_index() -> u32 {
        TypeIndex::ROOT
    }

    fn parent_type_index() -> u32 {
        TypeIndex::ROOT
    }
}

impl AsRef<Object> for Object {
    fn as_ref(&self) -> &Object {
        self
    }
}

/// An owning, reference counted pointer to an object.
#[repr(transparent)]
pub struct ObjectPtr<T: IsObject> {
    ptr: NonNull<T>,
}

unsafe impl<T: IsObject> Send for ObjectPtr<T> {}
unsafe impl<T: IsObject> Sync for ObjectPtr<T> {}

impl ObjectPtr<Object> {
    /// Takes ownership of one reference held by `object_ptr`.
    ///
    /// # Safety
    ///
    /// `object_ptr` must be null or point to a live object whose count
    /// includes the reference being adopted.
    pub unsafe fn from_raw(object_ptr: *mut Object) -> Option<ObjectPtr<Object>> {
        NonNull::new(object_ptr).map(|ptr| ObjectPtr { ptr })
    }

    /// Creates a new reference to an object owned elsewhere.
    ///
    /// # Safety
    ///
    /// `object_ptr` must be null or point to a live object.
    pub unsafe fn from_borrowed_raw(object_ptr: *mut Object) -> Option<ObjectPtr<Object>> {
        let ptr = NonNull::new(object_ptr)?;
        ptr.as_ref().inc_ref();
        Some(ObjectPtr { ptr })
    }
}

impl<T: IsObject> ObjectPtr<T> {
    pub fn new(object: T) -> ObjectPtr<T> {
        let ptr = NonNull::from(Box::leak(Box::new(object)));
        let object_ptr = ObjectPtr { ptr };
        debug_assert_eq!(object_ptr.as_object().count(), 0);
        object_ptr.as_object().inc_ref();
        object_ptr
    }

    pub fn as_object(&self) -> &Object {
        unsafe { self.ptr.as_ref().as_ref() }
    }

    pub fn count(&self) -> i32 {
        self.as_object().count()
    }

    pub fn is_unique(&self) -> bool {
        self.count() == 1
    }

    /// The raw object pointer; the reference stays with `self`.
    pub fn as_raw(&self) -> *mut Object {
        self.ptr.as_ptr().cast()
    }

    /// Releases ownership of the reference to the caller.
    pub fn into_raw(self) -> *mut Object {
        let raw = self.as_raw();
        std::mem::forget(self);
        raw
    }

    pub fn into_base(self) -> ObjectPtr<Object> {
        unsafe { self.cast_unchecked() }
    }

    /// Converts to a pointer to one of `T`'s ancestors.
    pub fn upcast<U: IsObject>(self) -> ObjectPtr<U>
    where
        T: AsRef<U>,
    {
        unsafe { self.cast_unchecked() }
    }

    /// Checked conversion to a pointer to `U`.
    pub fn downcast<U: IsObject>(self) -> Result<ObjectPtr<U>> {
        if self.as_object().is_instance::<U>() {
            Ok(unsafe { self.cast_unchecked() })
        } else {
            Err(Error::downcast(self.as_object().type_key(), U::TYPE_KEY))
        }
    }

    /// # Safety
    ///
    /// The pointee must actually be a `U`.
    pub(crate) unsafe fn cast_unchecked<U: IsObject>(self) -> ObjectPtr<U> {
        let ptr = self.ptr.cast();
        std::mem::forget(self);
        ObjectPtr { ptr }
    }

    /// Mutable access for copy-on-write updates. The object is mutated in
    /// place when this is the only reference, otherwise `clone` builds a
    /// private copy first.
    pub fn make_mut_with<F>(&mut self, clone: F) -> &mut T
    where
        F: FnOnce(&T) -> T,
    {
        if !self.is_unique() {
            *self = ObjectPtr::new(clone(&**self));
        }
        unsafe { self.ptr.as_mut() }
    }

    /// Mutable access if this is the only reference.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.is_unique() {
            Some(unsafe { self.ptr.as_mut() })
        } else {
            None
        }
    }
}

impl<T: IsObject> Clone for ObjectPtr<T> {
    fn clone(&self) -> Self {
        self.as_object().inc_ref();
        ObjectPtr { ptr: self.ptr }
    }
}

impl<T: IsObject> Drop for ObjectPtr<T> {
    fn drop(&mut self) {
        unsafe { Object::dec_ref(self.as_raw()) }
    }
}

impl<T: IsObject> std::ops::Deref for ObjectPtr<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: IsObject> fmt::Debug for ObjectPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.as_object().type_key(), self.ptr)
    }
}

impl<T: IsObject> PartialEq for ObjectPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: IsObject> Eq for ObjectPtr<T> {}

impl<T: IsObject> Hash for ObjectPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state)
    }
}

#[cfg(test)]
mod tests {
    use super::{Object, ObjectPtr};
    use crate::string::StringObj;

    #[test]
    fn test_new_object() {
        let ptr = ObjectPtr::new(Object::base::<Object>());
        assert_eq!(ptr.count(), 1);
        assert_eq!(ptr.type_index(), 0);
        assert_eq!(ptr.type_key(), "runtime.Object");
    }

    #[test]
    fn clone_and_drop_track_count() {
        let ptr = ObjectPtr::new(Object::base::<Object>());
        let other = ptr.clone();
        assert_eq!(ptr.count(), 2);
        assert_eq!(ptr, other);
        drop(other);
        assert_eq!(ptr.count(), 1);
        assert!(ptr.is_unique());
    }

    #[test]
    fn raw_round_trip() {
        let ptr = ObjectPtr::new(Object::base::<Object>());
        let keep = ptr.clone();
        let raw = ptr.into_raw();
        assert_eq!(keep.count(), 2);
        let borrowed = unsafe { ObjectPtr::from_borrowed_raw(raw) }.unwrap();
        assert_eq!(keep.count(), 3);
        drop(borrowed);
        let owned = unsafe { ObjectPtr::from_raw(raw) }.unwrap();
        drop(owned);
        assert_eq!(keep.count(), 1);
        assert!(unsafe { ObjectPtr::from_raw(std::ptr::null_mut()) }.is_none());
    }

    #[test]
    fn downcast_checks_type() {
        let string = ObjectPtr::new(StringObj::new("hi")).into_base();
        assert!(string.is_instance::<StringObj>());
        assert!(string.is_instance::<Object>());
        let back = string.clone().downcast::<StringObj>().unwrap();
        assert_eq!(back.as_str(), "hi");

        let plain = ObjectPtr::new(Object::base::<Object>());
        let err = plain.downcast::<StringObj>().unwrap_err();
        assert!(err.to_string().contains("runtime.String"));
        assert!(err.to_string().contains("runtime.Object"));
    }
}
