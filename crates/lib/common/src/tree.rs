// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Structured property tree.
//!
//! A navigable document of maps, ordered sequences and scalar leaves, with
//! YAML as the on-disk form. Map entries keep insertion order.

use std::collections::HashMap;
use std::hash::Hash;

use log::error;

use crate::{Error, IoContext};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TreeNode {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<TreeNode>),
    Map(Vec<(String, TreeNode)>),
}

impl TreeNode {
    pub fn is_empty(&self) -> bool {
        matches!(self, TreeNode::Null)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.find_child(name).is_some()
    }

    pub fn find_child(&self, name: &str) -> Option<&TreeNode> {
        match self {
            TreeNode::Map(entries) => entries
                .iter()
                .find_map(|(key, value)| (key == name).then_some(value)),
            _ => None,
        }
    }

    /// Insert (or replace) a map entry, returning the value slot.
    pub fn write_key(&mut self, key: &str) -> &mut TreeNode {
        if !matches!(self, TreeNode::Map(_)) {
            self.as_map();
        }
        let TreeNode::Map(entries) = self else {
            unreachable!()
        };
        if let Some(index) = entries.iter().position(|(name, _)| name == key) {
            entries[index].1 = TreeNode::Null;
            return &mut entries[index].1;
        }
        entries.push((key.to_owned(), TreeNode::Null));
        &mut entries.last_mut().unwrap().1
    }

    /// Append a list element, returning the new slot.
    pub fn append_child(&mut self) -> &mut TreeNode {
        if !matches!(self, TreeNode::List(_)) {
            self.as_list(0);
        }
        let TreeNode::List(children) = self else {
            unreachable!()
        };
        children.push(TreeNode::Null);
        children.last_mut().unwrap()
    }

    pub fn as_map(&mut self) {
        *self = TreeNode::Map(Vec::new());
    }

    pub fn as_list(&mut self, capacity: usize) {
        *self = TreeNode::List(Vec::with_capacity(capacity));
    }

    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::List(children) => children,
            _ => &[],
        }
    }

    pub fn entries(&self) -> &[(String, TreeNode)] {
        match self {
            TreeNode::Map(entries) => entries,
            _ => &[],
        }
    }

    pub fn num_children(&self) -> usize {
        match self {
            TreeNode::List(children) => children.len(),
            TreeNode::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn read_bool(&self) -> Result<bool, Error> {
        match self {
            TreeNode::Bool(value) => Ok(*value),
            _ => Err(Error::FailedParse),
        }
    }

    pub fn read_i64(&self) -> Result<i64, Error> {
        match self {
            TreeNode::Int(value) => Ok(*value),
            TreeNode::UInt(value) => i64::try_from(*value).map_err(|_| Error::FailedParse),
            _ => Err(Error::FailedParse),
        }
    }

    pub fn read_u64(&self) -> Result<u64, Error> {
        match self {
            TreeNode::UInt(value) => Ok(*value),
            TreeNode::Int(value) => u64::try_from(*value).map_err(|_| Error::FailedParse),
            _ => Err(Error::FailedParse),
        }
    }

    pub fn read_f64(&self) -> Result<f64, Error> {
        match self {
            TreeNode::Float(value) => Ok(*value),
            TreeNode::Int(value) => Ok(*value as f64),
            TreeNode::UInt(value) => Ok(*value as f64),
            _ => Err(Error::FailedParse),
        }
    }

    pub fn read_str(&self) -> Result<&str, Error> {
        match self {
            TreeNode::Str(value) => Ok(value),
            _ => Err(Error::FailedParse),
        }
    }

    pub fn parse_yaml(text: &str) -> Result<TreeNode, Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|err| {
            error!("yaml parsing failed: {}", err);
            Error::FailedParse
        })?;
        Self::from_yaml(&value)
    }

    pub fn emit_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(&self.to_yaml()).map_err(|err| {
            error!("yaml emission failed: {}", err);
            Error::FailedWrite
        })
    }

    fn from_yaml(value: &serde_yaml::Value) -> Result<TreeNode, Error> {
        Ok(match value {
            serde_yaml::Value::Null => TreeNode::Null,
            serde_yaml::Value::Bool(value) => TreeNode::Bool(*value),
            serde_yaml::Value::Number(number) => {
                if let Some(value) = number.as_u64() {
                    TreeNode::UInt(value)
                } else if let Some(value) = number.as_i64() {
                    TreeNode::Int(value)
                } else {
                    TreeNode::Float(number.as_f64().unwrap_or_default())
                }
            }
            serde_yaml::Value::String(value) => TreeNode::Str(value.clone()),
            serde_yaml::Value::Sequence(children) => TreeNode::List(
                children
                    .iter()
                    .map(Self::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            serde_yaml::Value::Mapping(mapping) => {
                let mut entries = Vec::with_capacity(mapping.len());
                for (key, value) in mapping {
                    let key = key.as_str().ok_or(Error::FailedParse)?;
                    entries.push((key.to_owned(), Self::from_yaml(value)?));
                }
                TreeNode::Map(entries)
            }
            serde_yaml::Value::Tagged(_) => return Err(Error::FailedParse),
        })
    }

    fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            TreeNode::Null => serde_yaml::Value::Null,
            TreeNode::Bool(value) => serde_yaml::Value::Bool(*value),
            TreeNode::Int(value) => serde_yaml::Value::Number((*value).into()),
            TreeNode::UInt(value) => serde_yaml::Value::Number((*value).into()),
            TreeNode::Float(value) => serde_yaml::Value::Number((*value).into()),
            TreeNode::Str(value) => serde_yaml::Value::String(value.clone()),
            TreeNode::List(children) => {
                serde_yaml::Value::Sequence(children.iter().map(Self::to_yaml).collect())
            }
            TreeNode::Map(entries) => {
                let mut mapping = serde_yaml::Mapping::with_capacity(entries.len());
                for (key, value) in entries {
                    mapping.insert(serde_yaml::Value::String(key.clone()), value.to_yaml());
                }
                serde_yaml::Value::Mapping(mapping)
            }
        }
    }
}

impl From<bool> for TreeNode {
    fn from(value: bool) -> Self {
        TreeNode::Bool(value)
    }
}

impl From<i32> for TreeNode {
    fn from(value: i32) -> Self {
        TreeNode::Int(value as i64)
    }
}

impl From<i64> for TreeNode {
    fn from(value: i64) -> Self {
        TreeNode::Int(value)
    }
}

impl From<u32> for TreeNode {
    fn from(value: u32) -> Self {
        TreeNode::UInt(value as u64)
    }
}

impl From<u64> for TreeNode {
    fn from(value: u64) -> Self {
        TreeNode::UInt(value)
    }
}

impl From<f32> for TreeNode {
    fn from(value: f32) -> Self {
        TreeNode::Float(value as f64)
    }
}

impl From<f64> for TreeNode {
    fn from(value: f64) -> Self {
        TreeNode::Float(value)
    }
}

impl From<&str> for TreeNode {
    fn from(value: &str) -> Self {
        TreeNode::Str(value.to_owned())
    }
}

impl From<String> for TreeNode {
    fn from(value: String) -> Self {
        TreeNode::Str(value)
    }
}

pub trait TreeWrite {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error>;
}

pub trait TreeRead: Sized {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error>;
}

macro_rules! impl_tree_scalar {
    ($ty:ty, $read:ident, $conv:expr) => {
        impl TreeWrite for $ty {
            fn tree_write(&self, _context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
                *node = TreeNode::from(*self);
                Ok(())
            }
        }

        impl TreeRead for $ty {
            fn tree_read(_context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
                let value = node.$read()?;
                ($conv)(value)
            }
        }
    };
}

impl_tree_scalar!(bool, read_bool, |v| Ok(v));
impl_tree_scalar!(i64, read_i64, |v| Ok(v));
impl_tree_scalar!(u64, read_u64, |v| Ok(v));
impl_tree_scalar!(i32, read_i64, |v| i32::try_from(v)
    .map_err(|_| Error::FailedParse));
impl_tree_scalar!(u32, read_u64, |v| u32::try_from(v)
    .map_err(|_| Error::FailedParse));
impl_tree_scalar!(f64, read_f64, |v| Ok(v));

impl TreeWrite for String {
    fn tree_write(&self, _context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        *node = TreeNode::Str(self.clone());
        Ok(())
    }
}

impl TreeRead for String {
    fn tree_read(_context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(node.read_str()?.to_owned())
    }
}

impl<T: TreeWrite> TreeWrite for Vec<T> {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        node.as_list(self.len());
        for entry in self {
            entry.tree_write(context, node.append_child())?;
        }
        Ok(())
    }
}

impl<T: TreeRead> TreeRead for Vec<T> {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        if node.is_empty() {
            return Ok(Vec::new());
        }
        node.children()
            .iter()
            .map(|child| T::tree_read(context, child))
            .collect()
    }
}

impl<K: AsRef<str>, V: TreeWrite> TreeWrite for HashMap<K, V> {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        node.as_map();
        for (key, value) in self {
            value.tree_write(context, node.write_key(key.as_ref()))?;
        }
        Ok(())
    }
}

impl<K: Eq + Hash + From<String>, V: TreeRead> TreeRead for HashMap<K, V> {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        if node.is_empty() {
            return Ok(HashMap::new());
        }
        let mut map = HashMap::with_capacity(node.num_children());
        for (key, value) in node.entries() {
            map.insert(K::from(key.clone()), V::tree_read(context, value)?);
        }
        Ok(map)
    }
}

impl TreeWrite for TreeNode {
    fn tree_write(&self, _context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        *node = self.clone();
        Ok(())
    }
}

impl TreeRead for TreeNode {
    fn tree_read(_context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(node.clone())
    }
}

// Opaque subtrees embedded in binary streams travel as their YAML text.
impl crate::stream::StreamWrite for TreeNode {
    fn stream_write(
        &self,
        context: &IoContext,
        stream: &mut crate::stream::Stream,
    ) -> Result<(), Error> {
        self.emit_yaml()?.stream_write(context, stream)
    }
}

impl crate::stream::StreamRead for TreeNode {
    fn stream_read(context: &IoContext, stream: &mut crate::stream::Stream) -> Result<Self, Error> {
        let text = String::stream_read(context, stream)?;
        TreeNode::parse_yaml(&text)
    }
}

/// Write one named field of a map node.
pub fn write_field<T: TreeWrite>(
    context: &IoContext,
    node: &mut TreeNode,
    key: &str,
    value: &T,
) -> Result<(), Error> {
    value.tree_write(context, node.write_key(key))
}

/// Read one named field, failing when the field is missing.
pub fn read_field<T: TreeRead>(
    context: &IoContext,
    node: &TreeNode,
    key: &str,
) -> Result<T, Error> {
    let child = node.find_child(key).ok_or_else(|| {
        error!("missing tree field \"{}\"", key);
        Error::FailedRead
    })?;
    T::tree_read(context, child)
}

/// Read one named field, returning `None` when the field is missing.
pub fn read_field_opt<T: TreeRead>(
    context: &IoContext,
    node: &TreeNode,
    key: &str,
) -> Result<Option<T>, Error> {
    match node.find_child(key) {
        Some(child) => Ok(Some(T::tree_read(context, child)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use crate::IoContext;

    use super::{read_field, write_field, TreeNode, TreeRead, TreeWrite};

    #[test]
    fn map_navigation() {
        let mut node = TreeNode::default();
        *node.write_key("name") = TreeNode::from("tile");
        *node.write_key("size") = TreeNode::from(16u32);
        assert!(node.has_child("name"));
        assert_eq!("tile", node.find_child("name").unwrap().read_str().unwrap());
        assert_eq!(16, node.find_child("size").unwrap().read_u64().unwrap());
        assert!(node.find_child("missing").is_none());
    }

    #[test]
    fn write_key_replaces() {
        let mut node = TreeNode::default();
        *node.write_key("value") = TreeNode::from(1u32);
        *node.write_key("value") = TreeNode::from(2u32);
        assert_eq!(1, node.num_children());
        assert_eq!(2, node.find_child("value").unwrap().read_u64().unwrap());
    }

    #[test]
    fn yaml_round_trip() {
        let context = IoContext::default();
        let mut node = TreeNode::default();
        write_field(&context, &mut node, "name", &"cube".to_owned()).unwrap();
        write_field(&context, &mut node, "lods", &vec![1u32, 2, 4]).unwrap();
        write_field(&context, &mut node, "visible", &true).unwrap();

        let text = node.emit_yaml().unwrap();
        let parsed = TreeNode::parse_yaml(&text).unwrap();
        assert_eq!(node, parsed);
        assert_eq!(
            vec![1u32, 2, 4],
            read_field::<Vec<u32>>(&context, &parsed, "lods").unwrap()
        );
    }

    #[test]
    fn value_round_trip() {
        let context = IoContext::default();
        let values = vec![-5i64, 0, 12];
        let mut node = TreeNode::default();
        values.tree_write(&context, &mut node).unwrap();
        assert_eq!(values, Vec::<i64>::tree_read(&context, &node).unwrap());
    }

    #[test]
    fn missing_field_fails() {
        let node = TreeNode::parse_yaml("name: x\n").unwrap();
        assert!(read_field::<String>(&IoContext::default(), &node, "other").is_err());
    }
}
