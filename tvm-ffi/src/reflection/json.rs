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

//! The JSON node graph used to save and load object trees.
//!
//! Every object becomes one entry of `nodes`, numbered in pre-order with
//! node 0 reserved for null. References between objects are node indices.

use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::array::ArrayObj;
use crate::errors::{Error, Result};
use crate::map::{MapKey, MapObj};
use crate::ndarray::NDArrayContainer;
use crate::object::{IsObject, IsObjectRef, Object, ObjectPtr, ObjectRef};
use crate::shape_tuple::ShapeTupleObj;
use crate::string::StringObj;
use crate::{config, params, DataType, Device, NDArray, RetValue};

use super::{collect_attrs, create_with_reader, vtable, AttrReader, NodeResolver};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct JsonNode {
    type_key: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    data: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repr_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repr_b64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonGraph {
    root: usize,
    nodes: Vec<JsonNode>,
    #[serde(default)]
    b64ndarrays: Vec<String>,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
}

struct Saver {
    indices: HashMap<*const Object, usize>,
    nodes: Vec<JsonNode>,
}

impl Saver {
    fn index_of(&mut self, object: &ObjectRef) -> Result<usize> {
        let ptr = match &object.0 {
            Some(ptr) => ptr,
            None => return Ok(0),
        };
        let address = ptr.as_raw() as *const Object;
        if let Some(&index) = self.indices.get(&address) {
            return Ok(index);
        }
        let index = self.nodes.len();
        self.indices.insert(address, index);
        self.nodes.push(JsonNode::default());
        let node = self.encode(ptr)?;
        self.nodes[index] = node;
        Ok(index)
    }

    fn encode(&mut self, object: &ObjectPtr<Object>) -> Result<JsonNode> {
        let mut node = JsonNode {
            type_key: object.type_key(),
            ..JsonNode::default()
        };
        if let Some(string) = object.downcast_ref::<StringObj>() {
            node.repr_str = Some(string.as_str().to_string());
        } else if let Some(shape) = object.downcast_ref::<ShapeTupleObj>() {
            node.repr_str = Some(shape.to_string());
        } else if let Some(array) = object.downcast_ref::<ArrayObj>() {
            for elem in array.as_slice() {
                node.data.push(self.index_of(elem)?);
            }
        } else if let Some(map) = object.downcast_ref::<MapObj>() {
            let string_keys: Option<Vec<String>> = map
                .iter()
                .map(|(key, _)| {
                    key.as_object()
                        .and_then(|k| k.downcast_ref::<StringObj>())
                        .map(|k| k.as_str().to_string())
                })
                .collect();
            match string_keys {
                Some(keys) => {
                    node.keys = keys;
                    for (_, value) in map.iter() {
                        node.data.push(self.index_of(value)?);
                    }
                }
                None => {
                    for (key, value) in map.iter() {
                        node.data.push(self.index_of(key)?);
                        node.data.push(self.index_of(value)?);
                    }
                }
            }
        } else if object.is_instance::<NDArrayContainer>() {
            let array = NDArray::from_ptr(Some(object.clone().downcast()?));
            let mut bytes = Vec::new();
            params::save_dltensor(&array, &mut bytes);
            node.repr_b64 = Some(STANDARD.encode(&bytes));
        } else if vtable(object.type_index()).is_some() {
            for attr in collect_attrs(object)? {
                let repr = self.attr_repr(&node.type_key, &attr.key, attr.value)?;
                node.attrs.insert(attr.key, repr);
            }
        } else {
            return Err(Error::NotReflectable(node.type_key));
        }
        Ok(node)
    }

    fn attr_repr(&mut self, type_key: &str, key: &str, value: RetValue) -> Result<String> {
        if let Some(object) = value.as_object() {
            let object = ObjectRef(Some(object.clone()));
            return Ok(self.index_of(&object)?.to_string());
        }
        let repr = match value {
            RetValue::Null => "0".to_string(),
            RetValue::Int(v) => v.to_string(),
            RetValue::Float(v) => v.to_string(),
            RetValue::Bool(v) => (v as i32).to_string(),
            RetValue::Str(v) => v,
            RetValue::DataType(v) => DataType::from(v).to_string(),
            RetValue::Device(v) => Device::try_from(v)?.to_string(),
            other => {
                return Err(Error::JsonFormat(format!(
                    "cannot save attribute `{}` of `{}` holding {}",
                    key,
                    type_key,
                    other.type_name()
                )))
            }
        };
        Ok(repr)
    }
}

/// Serializes an object graph to JSON. Shared objects are written once.
pub fn save_json(object: &ObjectRef) -> Result<String> {
    let mut saver = Saver {
        indices: HashMap::new(),
        nodes: vec![JsonNode::default()],
    };
    let root = saver.index_of(object)?;
    let mut attrs = BTreeMap::new();
    attrs.insert("tvm_version".to_string(), config::TVM_VERSION.to_string());
    let graph = JsonGraph {
        root,
        nodes: saver.nodes,
        b64ndarrays: Vec::new(),
        attrs,
    };
    Ok(serde_json::to_string_pretty(&graph)?)
}

struct Loader {
    nodes: Vec<JsonNode>,
    memo: Vec<Option<ObjectRef>>,
    in_progress: Vec<bool>,
}

fn missing(index: usize, field: &str) -> Error {
    Error::JsonFormat(format!("node {} has no `{}`", index, field))
}

impl Loader {
    fn decode(&mut self, index: usize, node: JsonNode) -> Result<ObjectRef> {
        let object = if node.type_key == StringObj::TYPE_KEY {
            let repr = node.repr_str.ok_or_else(|| missing(index, "repr_str"))?;
            ObjectRef::from(ObjectPtr::new(StringObj::new(repr)))
        } else if node.type_key == ShapeTupleObj::TYPE_KEY {
            let repr = node.repr_str.ok_or_else(|| missing(index, "repr_str"))?;
            ObjectRef::from(ObjectPtr::new(ShapeTupleObj::new(parse_shape(&repr)?)))
        } else if node.type_key == ArrayObj::TYPE_KEY {
            let elems = node
                .data
                .iter()
                .map(|&child| self.resolve(child))
                .collect::<Result<Vec<_>>>()?;
            ObjectRef::from(ObjectPtr::new(ArrayObj::new(elems)))
        } else if node.type_key == MapObj::TYPE_KEY {
            let mut data = IndexMap::new();
            if !node.keys.is_empty() {
                if node.keys.len() != node.data.len() {
                    return Err(Error::JsonFormat(format!(
                        "map node {} has {} keys and {} values",
                        index,
                        node.keys.len(),
                        node.data.len()
                    )));
                }
                for (key, &value) in node.keys.iter().zip(&node.data) {
                    let key = ObjectRef::from(ObjectPtr::new(StringObj::new(key)));
                    data.insert(MapKey(key), self.resolve(value)?);
                }
            } else {
                if node.data.len() % 2 != 0 {
                    return Err(Error::JsonFormat(format!(
                        "map node {} has an odd number of entries",
                        index
                    )));
                }
                for pair in node.data.chunks(2) {
                    let key = self.resolve(pair[0])?;
                    data.insert(MapKey(key), self.resolve(pair[1])?);
                }
            }
            ObjectRef::from(ObjectPtr::new(MapObj::new(data)))
        } else if node.type_key == NDArrayContainer::TYPE_KEY {
            let repr = node.repr_b64.ok_or_else(|| missing(index, "repr_b64"))?;
            let bytes = STANDARD.decode(repr)?;
            params::load_dltensor(&bytes)?.into_object_ref()
        } else {
            let reprs = node.attrs.into_iter().collect();
            create_with_reader(AttrReader::from_reprs(&node.type_key, reprs, self))?
        };
        Ok(object)
    }
}

impl NodeResolver for Loader {
    fn resolve(&mut self, index: usize) -> Result<ObjectRef> {
        if index == 0 {
            return Ok(ObjectRef::null());
        }
        if let Some(Some(object)) = self.memo.get(index) {
            return Ok(object.clone());
        }
        let node = self
            .nodes
            .get(index)
            .cloned()
            .ok_or_else(|| Error::JsonFormat(format!("node index {} out of range", index)))?;
        if self.in_progress[index] {
            return Err(Error::JsonFormat(format!("node {} refers to itself", index)));
        }
        self.in_progress[index] = true;
        let object = self.decode(index, node)?;
        self.in_progress[index] = false;
        self.memo[index] = Some(object.clone());
        Ok(object)
    }
}

fn parse_shape(repr: &str) -> Result<Vec<i64>> {
    let inner = repr
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::JsonFormat(format!("invalid shape `{}`", repr)))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.parse()
                .map_err(|_| Error::JsonFormat(format!("invalid shape `{}`", repr)))
        })
        .collect()
}

/// Rebuilds an object graph saved by [`save_json`].
pub fn load_json(json: &str) -> Result<ObjectRef> {
    let graph: JsonGraph = serde_json::from_str(json)?;
    if let Some(version) = graph.attrs.get("tvm_version") {
        if version != config::TVM_VERSION {
            debug!("loading JSON saved by version {}", version);
        }
    }
    let count = graph.nodes.len();
    if graph.root >= count.max(1) {
        return Err(Error::JsonFormat(format!("root {} out of range", graph.root)));
    }
    let mut loader = Loader {
        nodes: graph.nodes,
        memo: vec![None; count],
        in_progress: vec![false; count],
    };
    loader.resolve(graph.root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::tests::{func, var, TestFunc};
    use crate::reflection::{get_attr, structural_equal};
    use crate::{Array, Map, ShapeTuple};

    #[test]
    fn reflected_graph_round_trip() {
        let x = var("x");
        let f = func(vec![x.clone()], vec![x.clone(), x], 0.25);
        let json = save_json(&f.clone().into_object_ref()).unwrap();
        let loaded = load_json(&json).unwrap();
        assert!(structural_equal(&f.clone().into_object_ref(), &loaded, false));

        // the shared variable is still shared
        let g: TestFunc = loaded.downcast().unwrap();
        assert!(g.params.get(0).unwrap().same_as(&g.body.get(1).unwrap()));
        assert_eq!(g.cache, 0);
        assert!(matches!(get_attr(&g.into_object_ref(), "weight").unwrap(), RetValue::Float(w) if w == 0.25));
    }

    #[test]
    fn container_round_trip() {
        let mut map: Map<crate::String, ShapeTuple> = Map::new();
        map.insert("a".into(), ShapeTuple::new(vec![2, 3, 4]));
        map.insert("b".into(), ShapeTuple::new(Vec::<i64>::new()));
        let array: Array<crate::String> = vec!["p".into(), "q".into()].into();
        let mut outer: Map<crate::String, ObjectRef> = Map::new();
        outer.insert("shapes".into(), map.into_object_ref());
        outer.insert("names".into(), array.into_object_ref());
        let object = outer.into_object_ref();

        let json = save_json(&object).unwrap();
        assert!(json.contains("[2, 3, 4]"));
        assert!(json.contains("tvm_version"));
        assert!(structural_equal(&object, &load_json(&json).unwrap(), false));
    }

    #[test]
    fn ndarray_round_trip() {
        let mut array = NDArray::empty(&[3], DataType::float32(), Device::cpu(0)).unwrap();
        array.copy_from_buffer(&[1f32, 2., 3.]).unwrap();
        let json = save_json(&array.clone().into_object_ref()).unwrap();
        let loaded: NDArray = load_json(&json).unwrap().downcast().unwrap();
        assert_eq!(loaded.copy_to_vec::<f32>().unwrap(), vec![1., 2., 3.]);
    }

    #[test]
    fn null_and_malformed() {
        let json = save_json(&ObjectRef::null()).unwrap();
        assert!(!load_json(&json).unwrap().defined());
        assert!(matches!(load_json("{"), Err(Error::Json(_))));
        let bad_root = r#"{"root": 5, "nodes": [{"type_key": ""}]}"#;
        assert!(matches!(load_json(bad_root), Err(Error::JsonFormat(_))));
        let cyclic = r#"{"root": 1, "nodes": [{"type_key": ""}, {"type_key": "Array", "data": [1]}]}"#;
        assert!(matches!(load_json(cyclic), Err(Error::JsonFormat(_))));
    }

    #[test]
    fn functions_are_not_serializable() {
        let f = crate::Function::from_packed(|_| Ok(RetValue::Null));
        assert!(save_json(&f.into_object_ref()).is_err());
    }
}
