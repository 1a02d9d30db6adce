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
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;
use smol_str::SmolStr;

/// Interned string handle. Identity comparisons go through the id; the
/// original text stays available without a table lookup.
#[derive(Debug, Clone)]
pub struct Strid {
    id: u32,
    text: SmolStr,
}

impl Strid {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl PartialEq for Strid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Strid {}

impl Hash for Strid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for Strid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Interning service. Constructed once at application start and shared;
/// handles stay valid for the table's lifetime.
#[derive(Default)]
pub struct StringTable {
    inner: RwLock<StringTableInner>,
}

#[derive(Default)]
struct StringTableInner {
    lookup: HashMap<SmolStr, u32>,
    strings: Vec<SmolStr>,
}

impl StringTable {
    pub fn intern(&self, text: &str) -> Strid {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.lookup.get(text) {
                return Strid {
                    id,
                    text: inner.strings[id as usize].clone(),
                };
            }
        }
        let mut inner = self.inner.write();
        if let Some(&id) = inner.lookup.get(text) {
            return Strid {
                id,
                text: inner.strings[id as usize].clone(),
            };
        }
        let id = inner.strings.len() as u32;
        let text = SmolStr::new(text);
        inner.strings.push(text.clone());
        inner.lookup.insert(text.clone(), id);
        Strid { id, text }
    }

    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().strings.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::StringTable;

    #[test]
    fn intern_is_stable() {
        let table = StringTable::default();
        let a = table.intern("main");
        let b = table.intern("shadow");
        let c = table.intern("main");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!("main", a.text());
        assert_eq!(2, table.len());
    }
}
