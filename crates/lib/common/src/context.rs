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

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Capability handles carried into every (de)serialization call, keyed by
/// type. Values that don't need a capability ignore the context.
#[derive(Default, Clone)]
pub struct IoContext {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl IoContext {
    pub fn with<T: Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.put(value);
        self
    }

    pub fn put<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.entries.insert(TypeId::of::<T>(), value);
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    pub fn has<T: Send + Sync + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::IoContext;

    struct Capability(u32);

    #[test]
    fn put_get() {
        let context = IoContext::default().with(Arc::new(Capability(7)));
        assert!(context.has::<Capability>());
        assert_eq!(7, context.get::<Capability>().unwrap().0);
        assert!(context.get::<String>().is_none());
    }
}
