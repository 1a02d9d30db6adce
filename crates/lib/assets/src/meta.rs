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

use ember_common::tree::{read_field, read_field_opt, write_field, TreeNode, TreeRead, TreeWrite};
use ember_common::{Error, IoContext, Uuid};

use crate::{AssetFlags, AssetImportEnv, ClassTag};

/// Suffix of the meta document saved next to a source asset.
pub const ASSET_META_EXT: &str = ".asset";

pub fn asset_meta_file(asset_path: &str) -> String {
    format!("{}{}", asset_path, ASSET_META_EXT)
}

/// Meta document stored next to a source asset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssetMetaData {
    pub uuid: Uuid,
    pub flags: AssetFlags,
    pub cls: ClassTag,
    pub importer: ClassTag,
    pub import_env: AssetImportEnv,
    pub import_settings: TreeNode,
}

impl TreeWrite for AssetMetaData {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        node.as_map();
        write_field(context, node, "uuid", &self.uuid)?;
        write_field(context, node, "flags", &self.flags)?;
        write_field(context, node, "cls", &self.cls)?;
        write_field(context, node, "importer", &self.importer)?;
        write_field(context, node, "import_env", &self.import_env)?;
        write_field(context, node, "import_settings", &self.import_settings)?;
        Ok(())
    }
}

impl TreeRead for AssetMetaData {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(Self {
            uuid: read_field_opt(context, node, "uuid")?.unwrap_or_default(),
            flags: read_field(context, node, "flags")?,
            cls: read_field(context, node, "cls")?,
            importer: read_field(context, node, "importer")?,
            import_env: read_field_opt(context, node, "import_env")?.unwrap_or_default(),
            import_settings: read_field_opt(context, node, "import_settings")?.unwrap_or_default(),
        })
    }
}
