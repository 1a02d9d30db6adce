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

use std::fmt::{self, Display};

use ember_common::stream::{Stream, StreamRead, StreamWrite};
use ember_common::tree::{read_field_opt, write_field, TreeNode, TreeRead, TreeWrite};
use ember_common::{Error, IoContext, Uuid};

use crate::AssetResolver;

/// Asset reference. Binary form is the bare id; the tree form carries an
/// additional path annotation so that documents stay readable and ids can
/// be recovered from paths when a resolver is in the context.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(Uuid);

impl AssetId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(self) -> Uuid {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl From<Uuid> for AssetId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TreeWrite for AssetId {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        // The path is a readable hint, not authoritative.
        let mut path = String::new();
        if let Some(resolver) = context.get::<AssetResolver>() {
            if let Some(resolved) = resolver.resolve_uuid(self.0) {
                path = resolved;
            }
        }
        node.as_map();
        write_field(context, node, "id", &self.0)?;
        write_field(context, node, "path", &path)?;
        Ok(())
    }
}

impl TreeRead for AssetId {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        if node.is_empty() {
            return Ok(Self::default());
        }
        let mut id = read_field_opt::<Uuid>(context, node, "id")?.unwrap_or_default();
        let path = read_field_opt::<String>(context, node, "path")?.unwrap_or_default();
        if !path.is_empty() && id.is_null() {
            if let Some(resolver) = context.get::<AssetResolver>() {
                id = resolver.resolve_path(&path).ok_or(Error::NoAsset)?;
            }
        }
        Ok(Self(id))
    }
}

impl StreamWrite for AssetId {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.0.stream_write(context, stream)
    }
}

impl StreamRead for AssetId {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self(Uuid::stream_read(context, stream)?))
    }
}
