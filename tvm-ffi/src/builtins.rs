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

//! The global functions installed in every registry: constructors and
//! accessors for the core containers, parameter blobs, modules and the
//! generic reflection operations.

use std::convert::TryFrom;

use crate::errors::{Error, Result};
use crate::function::Function;
use crate::module::Module;
use crate::object::{IsObjectRef, ObjectRef};
use crate::to_function::ToFunction;
use crate::{params, reflection};
use crate::{ArgValue, Array, Bool, Float, Int, Map, NDArray, RetValue, ShapeTuple, String};

type AnyMap = Map<ObjectRef, ObjectRef>;

fn typed<F, I, O>(name: &'static str, f: F) -> (&'static str, Function)
where
    F: ToFunction<I, O>,
{
    (name, f.to_function_named(Some(name.to_string())))
}

fn packed<F>(name: &'static str, f: F) -> (&'static str, Function)
where
    F: for<'a> Fn(Vec<ArgValue<'a>>) -> Result<RetValue> + Send + Sync + 'static,
{
    (name, Function::from_packed(f))
}

fn pairs<'a>(
    function: &str,
    args: Vec<ArgValue<'a>>,
) -> Result<Vec<(ArgValue<'a>, ArgValue<'a>)>> {
    if args.len() % 2 != 0 {
        return Err(Error::Raw(format!(
            "{} expects key value pairs, but {} arguments were provided",
            function,
            args.len()
        )));
    }
    let mut args = args.into_iter();
    let mut out = Vec::new();
    while let (Some(key), Some(value)) = (args.next(), args.next()) {
        out.push((key, value));
    }
    Ok(out)
}

fn make_array(args: Vec<ArgValue<'_>>) -> Result<RetValue> {
    let elems = args
        .into_iter()
        .map(ObjectRef::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(Array::from_vec(elems).into())
}

fn make_map(args: Vec<ArgValue<'_>>) -> Result<RetValue> {
    let mut map = AnyMap::new();
    for (key, value) in pairs("runtime.Map", args)? {
        map.insert(ObjectRef::try_from(key)?, ObjectRef::try_from(value)?);
    }
    Ok(map.into())
}

fn make_shape_tuple(args: Vec<ArgValue<'_>>) -> Result<RetValue> {
    let dims = args
        .into_iter()
        .map(i64::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(ShapeTuple::new(dims).into())
}

fn make_node(args: Vec<ArgValue<'_>>) -> Result<RetValue> {
    let mut args = args.into_iter();
    let type_key = match args.next() {
        Some(arg) => std::string::String::try_from(arg)?,
        None => {
            return Err(Error::ArgCountMismatch {
                function: "node.MakeNode".to_string(),
                signature: "(type_key, key, value, ...)".to_string(),
                expected: 1,
                actual: 0,
            })
        }
    };
    let attrs = pairs("node.MakeNode", args.collect())?
        .into_iter()
        .map(|(key, value)| Ok((std::string::String::try_from(key)?, RetValue::from(value))))
        .collect::<Result<Vec<_>>>()?;
    Ok(reflection::create_object(&type_key, attrs)?.into())
}

fn map_items(map: AnyMap) -> Array<ObjectRef> {
    map.iter().flat_map(|(key, value)| vec![key, value]).collect()
}

fn shape_tuple_elem(shape: ShapeTuple, index: i64) -> Result<i64> {
    let len = shape.len();
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .map(|i| shape[i])
        .ok_or(Error::IndexOutOfBounds {
            container: "ShapeTuple",
            index,
            len,
        })
}

fn object_ptr_hash(object: ObjectRef) -> i64 {
    object
        .as_ptr()
        .map(|ptr| ptr.as_raw() as usize as i64)
        .unwrap_or(0)
}

fn structural_equal(lhs: ObjectRef, rhs: ObjectRef, assert_mode: bool, map_free_vars: bool) -> Result<bool> {
    let equal = reflection::structural_equal(&lhs, &rhs, map_free_vars);
    if assert_mode && !equal {
        return Err(Error::Raw(format!(
            "StructuralEqual check failed between `{}` and `{}`",
            lhs.as_object().map(|o| o.type_key()).unwrap_or_default(),
            rhs.as_object().map(|o| o.type_key()).unwrap_or_default()
        )));
    }
    Ok(equal)
}

fn list_attr_names(object: ObjectRef) -> Result<Array<String>> {
    Ok(reflection::list_attr_names(&object)?
        .into_iter()
        .map(String::from)
        .collect())
}

pub(crate) fn builtin_functions() -> Vec<(&'static str, Function)> {
    vec![
        typed("runtime.String", |s: std::string::String| String::from(s)),
        typed("runtime.GetFFIString", |s: String| s.to_string()),
        packed("runtime.Array", make_array),
        typed("runtime.ArrayGetItem", |array: Array<ObjectRef>, index: i64| {
            array.get(index)
        }),
        typed("runtime.ArraySize", |array: Array<ObjectRef>| array.len() as i64),
        packed("runtime.Map", make_map),
        typed("runtime.MapSize", |map: AnyMap| map.len() as i64),
        typed("runtime.MapGetItem", |map: AnyMap, key: ObjectRef| map.get(&key)),
        typed("runtime.MapCount", |map: AnyMap, key: ObjectRef| {
            map.contains_key(&key) as i64
        }),
        typed("runtime.MapItems", map_items),
        packed("runtime.ShapeTuple", make_shape_tuple),
        typed("runtime.GetShapeTupleSize", |shape: ShapeTuple| shape.len() as i64),
        typed("runtime.GetShapeTupleElem", shape_tuple_elem),
        typed("runtime.BoxInt", |value: i64| Int::from(value)),
        typed("runtime.BoxFloat", |value: f64| Float::from(value)),
        typed("runtime.BoxBool", |value: bool| Bool::from(value)),
        typed("runtime.ObjectPtrHash", object_ptr_hash),
        typed("runtime.SaveParams", |params: Map<String, NDArray>| {
            params::save_params(&params)
        }),
        typed("runtime.LoadParams", |bytes: Vec<u8>| params::load_params(&bytes)),
        typed(
            "runtime.ModuleGetFunction",
            |module: Module, name: std::string::String, query_imports: bool| {
                module.get_function(&name, query_imports)
            },
        ),
        typed("runtime.SystemLib", Module::system_lib),
        typed("node.StructuralEqual", structural_equal),
        typed("node.StructuralHash", |object: ObjectRef, map_free_vars: bool| {
            reflection::structural_hash(&object, map_free_vars) as i64
        }),
        typed("node.SaveJSON", |object: ObjectRef| reflection::save_json(&object)),
        typed("node.LoadJSON", |json: std::string::String| reflection::load_json(&json)),
        typed("node.NodeGetAttr", |object: ObjectRef, key: std::string::String| {
            reflection::get_attr(&object, &key)
        }),
        typed("node.NodeListAttrNames", list_attr_names),
        packed("node.MakeNode", make_node),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_packed;
    use crate::registry;
    use std::convert::TryInto;

    fn global(name: &str) -> &'static Function {
        registry::get(name).unwrap_or_else(|| panic!("`{}` is not registered", name))
    }

    #[test]
    fn strings() -> Result<()> {
        let s: String = call_packed!(global("runtime.String"), "abc")?.try_into()?;
        assert_eq!(s, "abc");
        let back: std::string::String = call_packed!(global("runtime.GetFFIString"), s)?.try_into()?;
        assert_eq!(back, "abc");
        Ok(())
    }

    #[test]
    fn arrays() -> Result<()> {
        let array: Array<ObjectRef> = call_packed!(global("runtime.Array"), 1, "two", 3.5)?.try_into()?;
        let size: i64 = call_packed!(global("runtime.ArraySize"), &array)?.try_into()?;
        assert_eq!(size, 3);
        let second: std::string::String =
            call_packed!(global("runtime.ArrayGetItem"), &array, 1)?.try_into()?;
        assert_eq!(second, "two");
        let first: i64 = call_packed!(global("runtime.ArrayGetItem"), &array, 0)?.try_into()?;
        assert_eq!(first, 1);
        assert!(call_packed!(global("runtime.ArrayGetItem"), &array, 3).is_err());
        Ok(())
    }

    #[test]
    fn maps() -> Result<()> {
        let map: AnyMap = call_packed!(global("runtime.Map"), "a", 1, "b", 2)?.try_into()?;
        let size: i64 = call_packed!(global("runtime.MapSize"), &map)?.try_into()?;
        assert_eq!(size, 2);
        let b: i64 = call_packed!(global("runtime.MapGetItem"), &map, "b")?.try_into()?;
        assert_eq!(b, 2);
        let count: i64 = call_packed!(global("runtime.MapCount"), &map, "c")?.try_into()?;
        assert_eq!(count, 0);
        let items: Array<ObjectRef> = call_packed!(global("runtime.MapItems"), &map)?.try_into()?;
        assert_eq!(items.len(), 4);
        assert!(call_packed!(global("runtime.Map"), "a").is_err());
        assert!(call_packed!(global("runtime.MapGetItem"), &map, "missing").is_err());
        Ok(())
    }

    #[test]
    fn shape_tuples() -> Result<()> {
        let shape: ShapeTuple = call_packed!(global("runtime.ShapeTuple"), 2, 3, 4)?.try_into()?;
        let size: i64 = call_packed!(global("runtime.GetShapeTupleSize"), &shape)?.try_into()?;
        assert_eq!(size, 3);
        let elem: i64 = call_packed!(global("runtime.GetShapeTupleElem"), &shape, 2)?.try_into()?;
        assert_eq!(elem, 4);
        assert!(call_packed!(global("runtime.GetShapeTupleElem"), &shape, -1).is_err());
        Ok(())
    }

    #[test]
    fn boxed_values_come_back_unboxed() -> Result<()> {
        let ret = call_packed!(global("runtime.BoxBool"), true)?;
        assert!(matches!(ret, RetValue::Bool(true)));
        let ret = call_packed!(global("runtime.BoxInt"), 5)?;
        assert!(matches!(ret, RetValue::Int(5)));
        let ret = call_packed!(global("runtime.BoxFloat"), 0.5)?;
        assert!(matches!(ret, RetValue::Float(v) if v == 0.5));
        Ok(())
    }

    #[test]
    fn object_hash_is_identity() -> Result<()> {
        let s = String::from("x");
        let h1: i64 = call_packed!(global("runtime.ObjectPtrHash"), &s)?.try_into()?;
        let h2: i64 = call_packed!(global("runtime.ObjectPtrHash"), s.clone())?.try_into()?;
        assert_eq!(h1, h2);
        Ok(())
    }

    #[test]
    fn params_through_globals() -> Result<()> {
        let mut array = NDArray::empty(&[2], crate::DataType::int(32, 1), crate::Device::cpu(0))?;
        array.copy_from_buffer(&[4i32, 5])?;
        let mut params: Map<String, NDArray> = Map::new();
        params.insert("w".into(), array);
        let bytes: Vec<u8> = call_packed!(global("runtime.SaveParams"), &params)?.try_into()?;
        let loaded: Map<String, NDArray> =
            call_packed!(global("runtime.LoadParams"), bytes)?.try_into()?;
        assert_eq!(loaded.get(&"w".into())?.copy_to_vec::<i32>()?, vec![4, 5]);
        Ok(())
    }

    #[test]
    fn modules() -> Result<()> {
        let module = Module::new("builtins_test");
        module.register_function("f", Function::from_packed(|_| Ok(RetValue::Int(9))));
        let func: Option<Function> =
            call_packed!(global("runtime.ModuleGetFunction"), &module, "f", false)?.try_into()?;
        assert!(func.is_some());
        let missing: Option<Function> =
            call_packed!(global("runtime.ModuleGetFunction"), &module, "g", true)?.try_into()?;
        assert!(missing.is_none());
        let lib: Module = call_packed!(global("runtime.SystemLib"))?.try_into()?;
        assert!(lib.same_as(&Module::system_lib()));
        Ok(())
    }

    #[test]
    fn reflection_globals() -> Result<()> {
        use crate::reflection::tests::{func, var};
        let x = var("x");
        let f = func(vec![x.clone()], vec![x], 1.0);
        let names: Array<String> = call_packed!(global("node.NodeListAttrNames"), &f)?.try_into()?;
        assert_eq!(names.len(), 4);
        let weight: f64 = call_packed!(global("node.NodeGetAttr"), &f, "weight")?.try_into()?;
        assert_eq!(weight, 1.0);

        let json: std::string::String = call_packed!(global("node.SaveJSON"), &f)?.try_into()?;
        let loaded: ObjectRef = call_packed!(global("node.LoadJSON"), json)?.try_into()?;
        let equal: bool =
            call_packed!(global("node.StructuralEqual"), &f, &loaded, false, false)?.try_into()?;
        assert!(equal);
        let h1: i64 = call_packed!(global("node.StructuralHash"), &f, false)?.try_into()?;
        let h2: i64 = call_packed!(global("node.StructuralHash"), &loaded, false)?.try_into()?;
        assert_eq!(h1, h2);

        let other = func(vec![], vec![], 2.0);
        assert!(call_packed!(global("node.StructuralEqual"), &f, &other, true, false).is_err());

        let made: ObjectRef =
            call_packed!(global("node.MakeNode"), "test.reflection.Var", "name", "y")?.try_into()?;
        let name: std::string::String = call_packed!(global("node.NodeGetAttr"), &made, "name")?.try_into()?;
        assert_eq!(name, "y");
        assert!(call_packed!(global("node.MakeNode")).is_err());
        Ok(())
    }
}
