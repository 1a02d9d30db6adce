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

use std::collections::HashMap;

use bitflags::bitflags;
use ember_common::stream::{Stream, StreamRead, StreamWrite};
use ember_common::tree::{read_field_opt, write_field, TreeNode, TreeRead, TreeWrite};
use ember_common::{Error, IoContext, Sha256, Uuid};
use ember_vfs::FileTimestamp;

use crate::{ArtifactObject, ClassTag};

bitflags! {
    /// Per-asset behavior switches.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AssetFlags: u32 {
        /// Produced by a script rather than an on-disk source.
        const SCRIPTED = 1 << 0;
        /// Never persisted between runs.
        const TRANSIENT = 1 << 1;
    }
}

impl StreamWrite for AssetFlags {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.bits().stream_write(context, stream)
    }
}

impl StreamRead for AssetFlags {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self::from_bits_retain(u32::stream_read(context, stream)?))
    }
}

// Flag sets travel through documents as a fixed-width array of booleans.
impl TreeWrite for AssetFlags {
    fn tree_write(&self, _context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        node.as_list(u32::BITS as usize);
        for bit in 0..u32::BITS {
            *node.append_child() = TreeNode::Bool(self.bits() & (1 << bit) != 0);
        }
        Ok(())
    }
}

impl TreeRead for AssetFlags {
    fn tree_read(_context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        let mut bits = 0u32;
        for (index, child) in node.children().iter().enumerate().take(u32::BITS as usize) {
            if child.read_bool()? {
                bits |= 1 << index;
            }
        }
        Ok(Self::from_bits_retain(bits))
    }
}

/// One cached derived payload of an asset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetArtifact {
    pub uuid: Uuid,
    pub cls: ClassTag,
    pub size: u64,
    pub hash: Sha256,
}

impl StreamWrite for AssetArtifact {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.uuid.stream_write(context, stream)?;
        self.cls.stream_write(context, stream)?;
        self.size.stream_write(context, stream)?;
        self.hash.stream_write(context, stream)
    }
}

impl StreamRead for AssetArtifact {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self {
            uuid: Uuid::stream_read(context, stream)?,
            cls: ClassTag::stream_read(context, stream)?,
            size: u64::stream_read(context, stream)?,
            hash: Sha256::stream_read(context, stream)?,
        })
    }
}

/// One source file that contributed to an import, captured at import time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetSource {
    pub path: String,
    pub hash: Sha256,
    pub timestamp: FileTimestamp,
}

impl StreamWrite for AssetSource {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.path.stream_write(context, stream)?;
        self.hash.stream_write(context, stream)?;
        self.timestamp.stream_write(context, stream)
    }
}

impl StreamRead for AssetSource {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self {
            path: String::stream_read(context, stream)?,
            hash: Sha256::stream_read(context, stream)?,
            timestamp: FileTimestamp::stream_read(context, stream)?,
        })
    }
}

/// Side-channel state produced and consumed by importers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetImportEnv {
    pub file_to_id: HashMap<String, Uuid>,
    pub vars: HashMap<String, String>,
}

impl StreamWrite for AssetImportEnv {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.file_to_id.stream_write(context, stream)?;
        self.vars.stream_write(context, stream)
    }
}

impl StreamRead for AssetImportEnv {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self {
            file_to_id: HashMap::stream_read(context, stream)?,
            vars: HashMap::stream_read(context, stream)?,
        })
    }
}

impl TreeWrite for AssetImportEnv {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        node.as_map();
        write_field(context, node, "file_to_id", &self.file_to_id)?;
        write_field(context, node, "vars", &self.vars)?;
        Ok(())
    }
}

impl TreeRead for AssetImportEnv {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(Self {
            file_to_id: read_field_opt(context, node, "file_to_id")?.unwrap_or_default(),
            vars: read_field_opt(context, node, "vars")?.unwrap_or_default(),
        })
    }
}

/// Database row describing one asset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssetData {
    pub uuid: Uuid,
    pub path: String,
    pub cls: ClassTag,
    pub loader: ClassTag,
    pub importer: ClassTag,
    pub flags: AssetFlags,
    pub parent: Uuid,
    pub children: Vec<Uuid>,
    pub deps: Vec<Uuid>,
    pub sources: Vec<AssetSource>,
    pub artifacts: Vec<AssetArtifact>,
    pub import_settings: TreeNode,
    pub import_env: AssetImportEnv,
    pub timestamp: FileTimestamp,
}

impl StreamWrite for AssetData {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.uuid.stream_write(context, stream)?;
        self.path.stream_write(context, stream)?;
        self.cls.stream_write(context, stream)?;
        self.loader.stream_write(context, stream)?;
        self.importer.stream_write(context, stream)?;
        self.flags.stream_write(context, stream)?;
        self.parent.stream_write(context, stream)?;
        self.children.stream_write(context, stream)?;
        self.deps.stream_write(context, stream)?;
        self.sources.stream_write(context, stream)?;
        self.artifacts.stream_write(context, stream)?;
        self.import_settings.stream_write(context, stream)?;
        self.import_env.stream_write(context, stream)?;
        self.timestamp.stream_write(context, stream)
    }
}

impl StreamRead for AssetData {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self {
            uuid: Uuid::stream_read(context, stream)?,
            path: String::stream_read(context, stream)?,
            cls: ClassTag::stream_read(context, stream)?,
            loader: ClassTag::stream_read(context, stream)?,
            importer: ClassTag::stream_read(context, stream)?,
            flags: AssetFlags::stream_read(context, stream)?,
            parent: Uuid::stream_read(context, stream)?,
            children: Vec::stream_read(context, stream)?,
            deps: Vec::stream_read(context, stream)?,
            sources: Vec::stream_read(context, stream)?,
            artifacts: Vec::stream_read(context, stream)?,
            import_settings: TreeNode::stream_read(context, stream)?,
            import_env: AssetImportEnv::stream_read(context, stream)?,
            timestamp: FileTimestamp::stream_read(context, stream)?,
        })
    }
}

/// One in-memory payload produced by an importer, paired with a readable
/// name for diagnostics.
pub struct AssetImportArtifact {
    pub name: String,
    pub object: Box<dyn ArtifactObject>,
}

/// Importer output for one asset (the main one or a child).
#[derive(Default)]
pub struct AssetImportAssetInfo {
    pub uuid: Uuid,
    pub path: String,
    pub flags: AssetFlags,
    pub cls: ClassTag,
    pub loader: ClassTag,
    pub deps: Vec<Uuid>,
    pub artifacts: Vec<AssetImportArtifact>,
}

/// Complete importer output: the main asset, its children, the source
/// files that were consumed and the import side-channel.
#[derive(Default)]
pub struct AssetImportResult {
    pub main: AssetImportAssetInfo,
    pub children: Vec<AssetImportAssetInfo>,
    pub sources: Vec<String>,
    pub env: AssetImportEnv,
    pub timestamp: FileTimestamp,
}
