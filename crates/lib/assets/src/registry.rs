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

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Display};

use ember_common::stream::{Stream, StreamRead, StreamWrite};
use ember_common::tree::{TreeNode, TreeRead, TreeWrite};
use ember_common::{Error, IoContext};
use parking_lot::Mutex;
use smol_str::SmolStr;

/// Runtime type tag persisted next to serialized payloads.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct ClassTag(SmolStr);

impl ClassTag {
    pub fn new(name: &str) -> Self {
        Self(SmolStr::new(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StreamWrite for ClassTag {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.0.to_string().stream_write(context, stream)
    }
}

impl StreamRead for ClassTag {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self(SmolStr::new(String::stream_read(context, stream)?)))
    }
}

impl TreeWrite for ClassTag {
    fn tree_write(&self, _context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        *node = TreeNode::from(self.0.as_str());
        Ok(())
    }
}

impl TreeRead for ClassTag {
    fn tree_read(_context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(Self(SmolStr::new(node.read_str()?)))
    }
}

/// A typed payload that can live in the artifact cache. Implementations
/// stream their whole state; the cache stores the class tag alongside the
/// bytes and dispatches through the [`ClassRegistry`] on load.
pub trait ArtifactObject: Any + Send + Sync {
    fn class_tag(&self) -> ClassTag;
    fn write_to_stream(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error>;
    fn read_from_stream(&mut self, context: &IoContext, stream: &mut Stream) -> Result<(), Error>;
    fn as_any(&self) -> &dyn Any;
}

/// Artifact types registered by tag, each with a default constructor.
pub trait ArtifactClass: ArtifactObject + Default {
    const CLASS: &'static str;
}

fn construct_default<T: ArtifactClass>() -> Box<dyn ArtifactObject> {
    Box::<T>::default()
}

/// Service mapping class tags to constructors. Registered once at startup,
/// consumed through the serialization context.
#[derive(Default)]
pub struct ClassRegistry {
    classes: Mutex<HashMap<ClassTag, fn() -> Box<dyn ArtifactObject>>>,
}

impl ClassRegistry {
    pub fn register<T: ArtifactClass>(&self) {
        self.classes
            .lock()
            .insert(ClassTag::new(T::CLASS), construct_default::<T>);
    }

    pub fn contains(&self, tag: &ClassTag) -> bool {
        self.classes.lock().contains_key(tag)
    }

    pub fn construct(&self, tag: &ClassTag) -> Option<Box<dyn ArtifactObject>> {
        self.classes.lock().get(tag).map(|construct| construct())
    }
}
