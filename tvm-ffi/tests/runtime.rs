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

use std::convert::{TryFrom, TryInto};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{ensure, Result};
use tvm_ffi::object::{IsObject, IsObjectRef, Object, ObjectRef};
use tvm_ffi::{
    call_packed, function, type_context, Array, DataType, Device, Error, Function, Int, Map,
    NDArray, RetValue, String,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

static DROPPED: AtomicUsize = AtomicUsize::new(0);

#[repr(C)]
#[derive(tvm_ffi::Object, Debug)]
#[ref_name = "Counted"]
#[type_key = "test.runtime.Counted"]
struct CountedNode {
    base: Object,
    value: i64,
}

impl Drop for CountedNode {
    fn drop(&mut self) {
        DROPPED.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted(value: i64) -> Counted {
    Counted::from(CountedNode {
        base: Object::base::<CountedNode>(),
        value,
    })
}

#[repr(C)]
#[derive(tvm_ffi::Object, Debug)]
#[ref_name = "SpecialCounted"]
#[type_key = "test.runtime.SpecialCounted"]
struct SpecialCountedNode {
    base: CountedNode,
}

#[test]
fn type_registration_is_idempotent() -> Result<()> {
    init_logging();
    let index = CountedNode::runtime_type_index();
    ensure!(CountedNode::runtime_type_index() == index);
    ensure!(type_context::type_key2index("test.runtime.Counted")? == index);
    ensure!(type_context::type_index2key(index)? == "test.runtime.Counted");

    let child = SpecialCountedNode::runtime_type_index();
    ensure!(type_context::derived_from(child, child));
    ensure!(type_context::derived_from(child, index));
    ensure!(type_context::derived_from(child, Object::runtime_type_index()));
    ensure!(!type_context::derived_from(index, child));
    ensure!(type_context::type_key2index("test.runtime.NoSuchType").is_err());
    Ok(())
}

#[test]
fn references_are_conserved() -> Result<()> {
    let before = DROPPED.load(Ordering::SeqCst);
    {
        let a = counted(1);
        let array = Array::from_vec(vec![a.clone(), a.clone()]);
        let object = ObjectRef::from(a.clone());
        ensure!(a.as_object().map(|o| o.count()) == Some(4));

        let f = Function::from_packed(|args| Ok(RetValue::from(args[0].clone())));
        let back: Counted = call_packed!(f, &a)?.try_into()?;
        ensure!(back.same_as(&a));
        ensure!(back.value == 1);
        drop((array, object, back));
        ensure!(a.as_object().map(|o| o.count()) == Some(1));
    }
    ensure!(DROPPED.load(Ordering::SeqCst) == before + 1);
    Ok(())
}

#[test]
fn values_round_trip_through_functions() -> Result<()> {
    let identity = Function::from_packed(|args| Ok(RetValue::from(args[0].clone())));

    let i: i64 = call_packed!(identity, -5i64)?.try_into()?;
    ensure!(i == -5);
    let f: f64 = call_packed!(identity, 2.5)?.try_into()?;
    ensure!(f == 2.5);
    let b: bool = call_packed!(identity, true)?.try_into()?;
    ensure!(b);
    let s: String = call_packed!(identity, String::from("hello"))?.try_into()?;
    ensure!(s == "hello");

    let array = Array::from_vec(vec![Int::from(1), Int::from(2)]);
    let back: Array<Int> = call_packed!(identity, &array)?.try_into()?;
    ensure!(back.same_as(&array));

    let mut map: Map<String, Int> = Map::new();
    map.insert("k".into(), Int::from(3));
    let back: Map<String, Int> = call_packed!(identity, &map)?.try_into()?;
    ensure!(back.get(&"k".into())?.value == 3);

    let some: Option<String> = call_packed!(identity, Some(String::from("x")))?.try_into()?;
    ensure!(some.is_some());
    let none: Option<String> = call_packed!(identity, None::<String>)?.try_into()?;
    ensure!(none.is_none());
    Ok(())
}

#[test]
fn mismatches_name_both_types() -> Result<()> {
    let array = NDArray::empty(&[1], DataType::float32(), Device::cpu(0))?;
    let err = String::try_from(RetValue::from(array)).unwrap_err();
    let message = err.to_string();
    ensure!(message.contains("String"), "{}", message);
    ensure!(message.contains("NDArray"), "{}", message);

    let array = Array::from_vec(vec![Int::from(1)]);
    match array.get(3) {
        Err(Error::IndexOutOfBounds { index, len, .. }) => ensure!(index == 3 && len == 1),
        other => anyhow::bail!("unexpected result {:?}", other),
    }
    Ok(())
}

fn sub(a: i64, b: i64) -> i64 {
    a - b
}

#[test]
fn arity_is_enforced() -> Result<()> {
    function::register(sub, "test.runtime.sub")?;
    let f = Function::get("test.runtime.sub").ok_or_else(|| anyhow::anyhow!("not registered"))?;
    let out: i64 = call_packed!(f, 5, 3)?.try_into()?;
    ensure!(out == 2);
    for err in [call_packed!(f, 5).unwrap_err(), call_packed!(f, 1, 2, 3).unwrap_err()].iter() {
        ensure!(
            matches!(err, Error::ArgCountMismatch { expected: 2, .. }),
            "unexpected error {}",
            err
        );
    }
    Ok(())
}

#[test]
fn override_requires_permission() -> Result<()> {
    init_logging();
    function::register(|| 1i64, "test.runtime.answer")?;
    ensure!(matches!(
        function::register(|| 2i64, "test.runtime.answer"),
        Err(Error::FunctionAlreadyRegistered(_))
    ));
    function::register_override(|| 42i64, "test.runtime.answer", true)?;
    let f = Function::get("test.runtime.answer").ok_or_else(|| anyhow::anyhow!("not registered"))?;
    let out: i64 = call_packed!(f)?.try_into()?;
    ensure!(out == 42);
    Ok(())
}

#[test]
fn boxed_bool_stays_bool() -> Result<()> {
    let boxed = Function::get("runtime.BoxBool").ok_or_else(|| anyhow::anyhow!("missing"))?;
    let ret = call_packed!(boxed, true)?;
    ensure!(matches!(ret, RetValue::Bool(true)), "got {:?}", ret.type_name());
    Ok(())
}

#[test]
fn copy_on_write_leaves_original() -> Result<()> {
    let original = Array::from_vec(vec![Int::from(1), Int::from(2)]);
    let mut copy = original.clone();
    copy.push(Int::from(3));
    copy.set(0, Int::from(10))?;
    ensure!(original.len() == 2);
    ensure!(original.get(0)?.value == 1);
    ensure!(copy.len() == 3);
    ensure!(copy.get(0)?.value == 10);
    ensure!(!copy.same_as(&original));

    let mut map: Map<String, Int> = Map::new();
    map.insert("a".into(), Int::from(1));
    let snapshot = map.clone();
    map.insert("b".into(), Int::from(2));
    ensure!(snapshot.len() == 1 && map.len() == 2);
    Ok(())
}
