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

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use ember_common::{Error, Sha256, Sha256Builder};
use log::error;
use parking_lot::Mutex;

use crate::{FileEntry, FileEntryKind, FileSystem, FileTimestamp};

struct MountVolume {
    prefix: String,
    root: PathBuf,
}

/// Physical file system behind logical mount prefixes. A logical path must
/// match a mounted prefix; the remainder is resolved inside the volume's
/// root directory. Volumes are searched in mount order.
#[derive(Default)]
pub struct MountFileSystem {
    volumes: Mutex<Vec<MountVolume>>,
}

impl MountFileSystem {
    pub fn mount(&self, prefix: &str, root: impl Into<PathBuf>) {
        self.volumes.lock().push(MountVolume {
            prefix: prefix.to_owned(),
            root: root.into(),
        });
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let volumes = self.volumes.lock();
        for volume in volumes.iter() {
            if let Some(remainder) = path.strip_prefix(&volume.prefix) {
                return Some(volume.root.join(remainder.trim_start_matches('/')));
            }
        }
        None
    }

    fn resolve_or_open_error(&self, path: &str) -> Result<PathBuf, Error> {
        self.resolve(path).ok_or_else(|| {
            error!("no mounted volume for {}", path);
            Error::FailedOpenFile
        })
    }
}

impl FileSystem for MountFileSystem {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, Error> {
        let physical = self.resolve_or_open_error(path)?;
        let file = File::open(physical).map_err(|_| Error::FailedOpenFile)?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, Error> {
        let physical = self.resolve_or_open_error(path)?;
        let file = File::create(physical).map_err(|_| Error::FailedOpenFile)?;
        Ok(Box::new(file))
    }

    fn save_file(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        let physical = self.resolve_or_open_error(path)?;
        fs::write(physical, bytes).map_err(|err| {
            error!("failed to save {}: {}", path, err);
            Error::FailedWrite
        })
    }

    fn remove_file(&self, path: &str) -> Result<(), Error> {
        let physical = self.resolve(path).ok_or(Error::FailedRemoveFile)?;
        fs::remove_file(physical).map_err(|err| {
            error!("failed to remove {}: {}", path, err);
            Error::FailedRemoveFile
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|physical| physical.exists())
            .unwrap_or(false)
    }

    fn list_directory(&self, path: &str) -> Result<Vec<FileEntry>, Error> {
        let physical = self.resolve(path).ok_or(Error::FailedFindFile)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(physical).map_err(|_| Error::FailedFindFile)? {
            let entry = entry.map_err(|_| Error::FailedFindFile)?;
            let kind = if entry.path().is_dir() {
                FileEntryKind::Directory
            } else {
                FileEntryKind::File
            };
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(entries)
    }

    fn hash_file(&self, path: &str) -> Result<Sha256, Error> {
        let mut reader = self.open_read(path)?;
        let mut builder = Sha256Builder::default();
        let mut chunk = [0u8; 64 * 1024];
        loop {
            let read = reader.read(&mut chunk).map_err(|_| Error::FailedRead)?;
            if read == 0 {
                break;
            }
            builder.update(&chunk[..read]);
        }
        Ok(builder.finish())
    }

    fn file_timestamp(&self, path: &str) -> Result<FileTimestamp, Error> {
        let physical = self.resolve(path).ok_or(Error::FailedFindFile)?;
        let metadata = fs::metadata(physical).map_err(|_| Error::FailedFindFile)?;
        let modified = metadata.modified().map_err(|_| Error::FailedFindFile)?;
        Ok(modified.into())
    }
}
