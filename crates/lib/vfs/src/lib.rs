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

mod async_fs;
mod mount;

pub use async_fs::*;
pub use mount::*;

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use ember_common::stream::{Stream, StreamRead, StreamWrite};
use ember_common::tree::{TreeNode, TreeRead, TreeWrite};
use ember_common::{Error, IoContext, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub kind: FileEntryKind,
}

/// File modification time, microseconds since the unix epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTimestamp(pub u64);

impl From<SystemTime> for FileTimestamp {
    fn from(time: SystemTime) -> Self {
        Self(
            time.duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_micros() as u64)
                .unwrap_or_default(),
        )
    }
}

impl FileTimestamp {
    pub fn now() -> Self {
        SystemTime::now().into()
    }
}

impl StreamWrite for FileTimestamp {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.0.stream_write(context, stream)
    }
}

impl StreamRead for FileTimestamp {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(Self(u64::stream_read(context, stream)?))
    }
}

impl TreeWrite for FileTimestamp {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        self.0.tree_write(context, node)
    }
}

impl TreeRead for FileTimestamp {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(Self(u64::tree_read(context, node)?))
    }
}

/// File access behind logical paths. Implementations decide how a logical
/// path maps onto physical storage.
pub trait FileSystem: Send + Sync {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, Error>;
    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, Error>;
    fn save_file(&self, path: &str, bytes: &[u8]) -> Result<(), Error>;
    fn remove_file(&self, path: &str) -> Result<(), Error>;
    fn exists(&self, path: &str) -> bool;
    fn list_directory(&self, path: &str) -> Result<Vec<FileEntry>, Error>;
    fn hash_file(&self, path: &str) -> Result<Sha256, Error>;
    fn file_timestamp(&self, path: &str) -> Result<FileTimestamp, Error>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>, Error> {
        let mut reader = self.open_read(path)?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|_| Error::FailedRead)?;
        Ok(bytes)
    }
}
