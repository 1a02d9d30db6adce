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
use std::str::FromStr;

use rand::{rngs::OsRng, RngCore};

use crate::stream::{Stream, StreamRead, StreamWrite};
use crate::tree::{TreeNode, TreeRead, TreeWrite};
use crate::{Error, IoContext};

/// 64-bit opaque identifier. Zero is reserved for "absent".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(u64);

impl Uuid {
    pub const NULL: Uuid = Uuid(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Fresh non-null identifier from an OS random source.
    pub fn generate() -> Self {
        loop {
            let value = OsRng.next_u64();
            if value != 0 {
                return Self(value);
            }
        }
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn is_not_null(self) -> bool {
        self.0 != 0
    }

    pub fn to_str(self) -> String {
        self.0.to_string()
    }

    pub fn parse(text: &str, base: u32) -> Result<Self, Error> {
        u64::from_str_radix(text, base)
            .map(Self)
            .map_err(|_| Error::FailedParse)
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Uuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, 10)
    }
}

impl StreamWrite for Uuid {
    fn stream_write(&self, _context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        stream.nwrite(&self.0.to_le_bytes())
    }
}

impl StreamRead for Uuid {
    fn stream_read(_context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        let mut bytes = [0u8; 8];
        stream.nread(&mut bytes)?;
        Ok(Self(u64::from_le_bytes(bytes)))
    }
}

impl TreeWrite for Uuid {
    fn tree_write(&self, _context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        *node = TreeNode::from(self.to_str());
        Ok(())
    }
}

impl TreeRead for Uuid {
    fn tree_read(_context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Self::parse(node.read_str()?, 10)
    }
}
