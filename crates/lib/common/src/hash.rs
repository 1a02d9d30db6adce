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

use crc::{Crc, CRC_32_ISO_HDLC};
use sha2::{Digest, Sha256 as Sha256Digest};

use crate::stream::{Stream, StreamRead, StreamWrite};
use crate::tree::{TreeNode, TreeRead, TreeWrite};
use crate::{Error, IoContext};

/// 32-byte SHA-256 digest. Tree form is lowercase hex.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256(pub [u8; 32]);

impl Sha256 {
    pub fn from_hex(text: &str) -> Result<Self, Error> {
        if text.len() != 64 {
            return Err(Error::FailedParse);
        }
        let mut bytes = [0u8; 32];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&text[index * 2..index * 2 + 2], 16)
                .map_err(|_| Error::FailedParse)?;
        }
        Ok(Self(bytes))
    }
}

impl Display for Sha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Streaming SHA-256 accumulator.
#[derive(Default)]
pub struct Sha256Builder {
    digest: Sha256Digest,
}

impl Sha256Builder {
    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.digest.update(bytes);
        self
    }

    pub fn finish(self) -> Sha256 {
        Sha256(self.digest.finalize().into())
    }
}

pub fn sha256(bytes: &[u8]) -> Sha256 {
    let mut builder = Sha256Builder::default();
    builder.update(bytes);
    builder.finish()
}

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Quick fingerprint for change detection, not for content addressing.
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

impl StreamWrite for Sha256 {
    fn stream_write(&self, _context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        stream.nwrite(&self.0)
    }
}

impl StreamRead for Sha256 {
    fn stream_read(_context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        let mut bytes = [0u8; 32];
        stream.nread(&mut bytes)?;
        Ok(Self(bytes))
    }
}

impl TreeWrite for Sha256 {
    fn tree_write(&self, _context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        *node = TreeNode::from(self.to_string());
        Ok(())
    }
}

impl TreeRead for Sha256 {
    fn tree_read(_context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Self::from_hex(node.read_str()?)
    }
}

#[cfg(test)]
mod test {
    use super::{crc32, sha256, Sha256, Sha256Builder};

    #[test]
    fn streaming_matches_one_shot() {
        let data = (0..=255u8).collect::<Vec<_>>();
        let mut builder = Sha256Builder::default();
        builder.update(&data[..100]);
        builder.update(&data[100..]);
        assert_eq!(sha256(&data), builder.finish());
    }

    #[test]
    fn known_digest() {
        // SHA-256 of the empty input.
        assert_eq!(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            sha256(b"").to_string()
        );
    }

    #[test]
    fn hex_round_trip() {
        let hash = sha256(b"ember");
        assert_eq!(hash, Sha256::from_hex(&hash.to_string()).unwrap());
        assert!(Sha256::from_hex("too short").is_err());
    }

    #[test]
    fn crc_differs_on_change() {
        assert_ne!(crc32(b"asset a"), crc32(b"asset b"));
        assert_eq!(crc32(b"asset a"), crc32(b"asset a"));
    }
}
