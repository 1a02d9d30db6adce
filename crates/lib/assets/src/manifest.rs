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

use ember_common::tree::{read_field, write_field, TreeNode, TreeRead, TreeWrite};
use ember_common::{Error, IoContext};

/// Manifest document listing asset paths relative to its own folder.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssetManifest {
    pub assets: Vec<String>,
}

impl TreeWrite for AssetManifest {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        node.as_map();
        write_field(context, node, "assets", &self.assets)
    }
}

impl TreeRead for AssetManifest {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(Self {
            assets: read_field(context, node, "assets")?,
        })
    }
}
