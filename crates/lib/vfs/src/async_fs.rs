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

use std::io::Read;
use std::sync::Arc;

use ember_common::{Async, Error, TaskPool};
use log::error;

use crate::FileSystem;

/// Asynchronous reads on top of a [`FileSystem`], served by a dedicated
/// I/O pool. Completions chain into further tasks via [`Async::then`].
pub struct AsyncFileSystem {
    file_system: Arc<dyn FileSystem>,
    io_pool: TaskPool,
}

impl AsyncFileSystem {
    pub fn new(file_system: Arc<dyn FileSystem>, io_pool: TaskPool) -> Self {
        Self {
            file_system,
            io_pool,
        }
    }

    /// Fill the caller-supplied buffer with the file contents. The buffer
    /// length must equal the file size; the filled buffer is the
    /// completion value.
    pub fn read_file(&self, path: &str, mut buffer: Vec<u8>) -> Async<Vec<u8>> {
        let file_system = self.file_system.clone();
        let path = path.to_owned();
        self.io_pool.spawn(move || {
            let mut reader = file_system.open_read(&path)?;
            reader.read_exact(&mut buffer).map_err(|err| {
                error!("failed to read {}: {}", path, err);
                Error::FailedRead
            })?;
            Ok(buffer)
        })
    }
}
