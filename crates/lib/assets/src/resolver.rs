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

use ember_common::Uuid;
use parking_lot::Mutex;

#[derive(Default)]
struct ResolverMaps {
    path_to_uuid: HashMap<String, Uuid>,
    uuid_to_path: HashMap<Uuid, String>,
}

/// Bidirectional mapping between asset paths and ids. `remove` withdraws
/// only the forward direction: an id's last known path stays available as
/// diagnostic data until overwritten by a later `add`.
#[derive(Default)]
pub struct AssetResolver {
    maps: Mutex<ResolverMaps>,
}

impl AssetResolver {
    pub fn add(&self, path: &str, uuid: Uuid) {
        let mut maps = self.maps.lock();
        maps.uuid_to_path.insert(uuid, path.to_owned());
        maps.path_to_uuid.insert(path.to_owned(), uuid);
    }

    pub fn remove(&self, path: &str) {
        self.maps.lock().path_to_uuid.remove(path);
    }

    pub fn resolve_path(&self, path: &str) -> Option<Uuid> {
        self.maps.lock().path_to_uuid.get(path).copied()
    }

    pub fn resolve_uuid(&self, uuid: Uuid) -> Option<String> {
        self.maps.lock().uuid_to_path.get(&uuid).cloned()
    }
}
