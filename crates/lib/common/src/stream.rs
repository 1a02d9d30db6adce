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

//! Binary serialization stream.
//!
//! Little-endian native widths, `u64`-prefixed collections and strings,
//! 32-bit signed enums, 1-byte booleans, bool-prefixed optionals. A stream
//! is either readable or writable, never both.

use std::collections::HashMap;
use std::hash::Hash;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::error;

use crate::{Error, IoContext};

enum StreamIo<'a> {
    Read(Box<dyn Read + 'a>),
    Write(Box<dyn Write + 'a>),
}

/// Byte stream with optional nested LZ4 regions. Data written inside a
/// region is buffered and flushed on close of the outermost region as
/// `[i32 source_size, i32 compressed_size, bytes]`; a zero source size
/// encodes an empty region with no further header fields.
pub struct Stream<'a> {
    io: StreamIo<'a>,
    region_depth: u32,
    buffer_raw: Vec<u8>,
    buffer_size: usize,
    offset: usize,
}

impl<'a> Stream<'a> {
    pub fn reader<R: Read + 'a>(reader: R) -> Self {
        Self {
            io: StreamIo::Read(Box::new(reader)),
            region_depth: 0,
            buffer_raw: Vec::new(),
            buffer_size: 0,
            offset: 0,
        }
    }

    pub fn writer<W: Write + 'a>(writer: W) -> Self {
        Self {
            io: StreamIo::Write(Box::new(writer)),
            region_depth: 0,
            buffer_raw: Vec::new(),
            buffer_size: 0,
            offset: 0,
        }
    }

    pub fn can_read(&self) -> bool {
        matches!(self.io, StreamIo::Read(_))
    }

    pub fn can_write(&self) -> bool {
        matches!(self.io, StreamIo::Write(_))
    }

    pub fn nwrite(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.region_depth > 0 {
            self.append_raw(bytes);
            Ok(())
        } else {
            self.append_io(bytes).map_err(|err| {
                error!("stream write failed: {}", err);
                Error::FailedWrite
            })
        }
    }

    pub fn nread(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        if self.region_depth > 0 {
            self.fetch_raw(bytes)
        } else {
            self.fetch_io(bytes).map_err(|err| {
                error!("stream read failed: {}", err);
                Error::FailedRead
            })
        }
    }

    /// Enter a compressed region. Regions nest; only the outermost one
    /// touches the underlying stream.
    pub fn begin_region(&mut self) -> Result<(), Error> {
        if self.region_depth == 0 {
            if self.can_read() {
                self.fetch_region()?;
            } else {
                self.offset = 0;
            }
        }
        self.region_depth += 1;
        Ok(())
    }

    pub fn end_region(&mut self) -> Result<(), Error> {
        if self.region_depth == 0 {
            return Err(Error::InvalidState);
        }
        self.region_depth -= 1;
        if self.region_depth == 0 && self.can_write() {
            self.flush_region()?;
        }
        Ok(())
    }

    fn append_raw(&mut self, bytes: &[u8]) {
        if self.buffer_raw.len() < self.offset + bytes.len() {
            self.buffer_raw.resize(self.offset + bytes.len(), 0);
        }
        self.buffer_raw[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
    }

    fn append_io(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.io {
            StreamIo::Write(writer) => writer.write_all(bytes),
            StreamIo::Read(_) => Err(io::Error::from(io::ErrorKind::Unsupported)),
        }
    }

    fn fetch_raw(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        if self.buffer_size < self.offset + bytes.len() {
            error!("read past the end of a compressed region");
            return Err(Error::FailedRead);
        }
        bytes.copy_from_slice(&self.buffer_raw[self.offset..self.offset + bytes.len()]);
        self.offset += bytes.len();
        Ok(())
    }

    fn fetch_io(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        match &mut self.io {
            StreamIo::Read(reader) => reader.read_exact(bytes),
            StreamIo::Write(_) => Err(io::Error::from(io::ErrorKind::Unsupported)),
        }
    }

    fn flush_region(&mut self) -> Result<(), Error> {
        let source_size = self.offset as i32;
        self.nwrite(&source_size.to_le_bytes())?;

        if source_size > 0 {
            let compressed = lz4_flex::block::compress(&self.buffer_raw[..self.offset]);
            let compressed_size = compressed.len() as i32;
            self.nwrite(&compressed_size.to_le_bytes())?;
            self.nwrite(&compressed)?;
        }

        self.offset = 0;
        Ok(())
    }

    fn fetch_region(&mut self) -> Result<(), Error> {
        let mut header = [0u8; 4];
        self.nread(&mut header)?;
        let source_size = i32::from_le_bytes(header);

        if source_size > 0 {
            self.nread(&mut header)?;
            let compressed_size = i32::from_le_bytes(header);

            let mut compressed = vec![0u8; compressed_size as usize];
            self.nread(&mut compressed)?;

            self.buffer_raw = lz4_flex::block::decompress(&compressed, source_size as usize)
                .map_err(|err| {
                    error!("lz4 decompression failed: {}", err);
                    Error::FailedRead
                })?;
        }

        self.offset = 0;
        self.buffer_size = source_size as usize;
        Ok(())
    }
}

impl<'a> Write for Stream<'a> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.nwrite(buf)
            .map_err(|_| io::Error::from(io::ErrorKind::Other))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> Read for Stream<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.nread(buf)
            .map_err(|_| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        Ok(buf.len())
    }
}

pub trait StreamWrite {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error>;
}

pub trait StreamRead: Sized {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error>;
}

macro_rules! impl_stream_primitive {
    ($ty:ty, $write:ident, $read:ident) => {
        impl StreamWrite for $ty {
            fn stream_write(&self, _context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
                stream
                    .$write::<LittleEndian>(*self)
                    .map_err(|_| Error::FailedWrite)
            }
        }

        impl StreamRead for $ty {
            fn stream_read(_context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
                stream.$read::<LittleEndian>().map_err(|_| Error::FailedRead)
            }
        }
    };
}

impl_stream_primitive!(u16, write_u16, read_u16);
impl_stream_primitive!(u32, write_u32, read_u32);
impl_stream_primitive!(u64, write_u64, read_u64);
impl_stream_primitive!(i16, write_i16, read_i16);
impl_stream_primitive!(i32, write_i32, read_i32);
impl_stream_primitive!(i64, write_i64, read_i64);
impl_stream_primitive!(f32, write_f32, read_f32);
impl_stream_primitive!(f64, write_f64, read_f64);

impl StreamWrite for u8 {
    fn stream_write(&self, _context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        stream.write_u8(*self).map_err(|_| Error::FailedWrite)
    }
}

impl StreamRead for u8 {
    fn stream_read(_context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        stream.read_u8().map_err(|_| Error::FailedRead)
    }
}

impl StreamWrite for i8 {
    fn stream_write(&self, _context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        stream.write_i8(*self).map_err(|_| Error::FailedWrite)
    }
}

impl StreamRead for i8 {
    fn stream_read(_context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        stream.read_i8().map_err(|_| Error::FailedRead)
    }
}

impl StreamWrite for bool {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        (*self as u8).stream_write(context, stream)
    }
}

impl StreamRead for bool {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(u8::stream_read(context, stream)? != 0)
    }
}

impl StreamWrite for String {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        (self.len() as u64).stream_write(context, stream)?;
        stream.nwrite(self.as_bytes())
    }
}

impl StreamRead for String {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        let length = u64::stream_read(context, stream)?;
        let mut bytes = vec![0u8; length as usize];
        stream.nread(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| Error::FailedParse)
    }
}

impl StreamWrite for PathBuf {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.to_str()
            .unwrap_or_default()
            .to_owned()
            .stream_write(context, stream)
    }
}

impl StreamRead for PathBuf {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        Ok(PathBuf::from(String::stream_read(context, stream)?))
    }
}

impl<T: StreamWrite> StreamWrite for Vec<T> {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        (self.len() as u64).stream_write(context, stream)?;
        for entry in self {
            entry.stream_write(context, stream)?;
        }
        Ok(())
    }
}

impl<T: StreamRead> StreamRead for Vec<T> {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        let count = u64::stream_read(context, stream)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(T::stream_read(context, stream)?);
        }
        Ok(entries)
    }
}

impl<T: StreamWrite> StreamWrite for Option<T> {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        self.is_some().stream_write(context, stream)?;
        if let Some(value) = self {
            value.stream_write(context, stream)?;
        }
        Ok(())
    }
}

impl<T: StreamRead> StreamRead for Option<T> {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        let has_value = bool::stream_read(context, stream)?;
        if has_value {
            Ok(Some(T::stream_read(context, stream)?))
        } else {
            Ok(None)
        }
    }
}

impl<K: StreamWrite, V: StreamWrite> StreamWrite for HashMap<K, V> {
    fn stream_write(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
        (self.len() as u64).stream_write(context, stream)?;
        for (key, value) in self {
            key.stream_write(context, stream)?;
            value.stream_write(context, stream)?;
        }
        Ok(())
    }
}

impl<K: StreamRead + Eq + Hash, V: StreamRead> StreamRead for HashMap<K, V> {
    fn stream_read(context: &IoContext, stream: &mut Stream) -> Result<Self, Error> {
        let count = u64::stream_read(context, stream)?;
        let mut map = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let key = K::stream_read(context, stream)?;
            let value = V::stream_read(context, stream)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

/// Enums travel as signed 32-bit integers.
pub fn write_enum<T: Into<i32>>(
    context: &IoContext,
    stream: &mut Stream,
    value: T,
) -> Result<(), Error> {
    value.into().stream_write(context, stream)
}

pub fn read_enum<T: TryFrom<i32>>(context: &IoContext, stream: &mut Stream) -> Result<T, Error> {
    T::try_from(i32::stream_read(context, stream)?).map_err(|_| Error::FailedParse)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::io::Cursor;

    use crate::{Error, IoContext};

    use super::{Stream, StreamRead, StreamWrite};

    fn round_trip<T: StreamWrite + StreamRead>(value: &T) -> T {
        let context = IoContext::default();
        let mut bytes = Vec::new();
        {
            let mut stream = Stream::writer(Cursor::new(&mut bytes));
            value.stream_write(&context, &mut stream).unwrap();
        }
        let mut stream = Stream::reader(bytes.as_slice());
        T::stream_read(&context, &mut stream).unwrap()
    }

    #[test]
    fn primitives() {
        assert_eq!(42u8, round_trip(&42u8));
        assert_eq!(-7i32, round_trip(&-7i32));
        assert_eq!(u64::MAX, round_trip(&u64::MAX));
        assert_eq!(1.5f32, round_trip(&1.5f32));
        assert!(round_trip(&true));
    }

    #[test]
    fn strings_and_collections() {
        assert_eq!("ember".to_owned(), round_trip(&"ember".to_owned()));
        assert_eq!(vec![1u32, 2, 3], round_trip(&vec![1u32, 2, 3]));
        assert_eq!(Some(9u16), round_trip(&Some(9u16)));
        assert_eq!(None::<String>, round_trip(&None::<String>));

        let mut map = HashMap::new();
        map.insert("a".to_owned(), 1u32);
        map.insert("b".to_owned(), 2u32);
        assert_eq!(map, round_trip(&map));
    }

    #[test]
    fn enums_travel_as_i32() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Mode {
            Linear,
            Nearest,
        }

        impl From<Mode> for i32 {
            fn from(value: Mode) -> Self {
                value as i32
            }
        }

        impl TryFrom<i32> for Mode {
            type Error = ();

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    0 => Ok(Mode::Linear),
                    1 => Ok(Mode::Nearest),
                    _ => Err(()),
                }
            }
        }

        let context = IoContext::default();
        let mut bytes = Vec::new();
        {
            let mut stream = Stream::writer(Cursor::new(&mut bytes));
            super::write_enum(&context, &mut stream, Mode::Nearest).unwrap();
        }
        assert_eq!(4, bytes.len());
        let mut stream = Stream::reader(bytes.as_slice());
        assert_eq!(
            Mode::Nearest,
            super::read_enum::<Mode>(&context, &mut stream).unwrap()
        );
    }

    #[test]
    fn read_on_writer_fails() {
        let mut sink = Vec::new();
        let mut stream = Stream::writer(Cursor::new(&mut sink));
        let mut buf = [0u8; 1];
        assert_eq!(Err(Error::FailedRead), stream.nread(&mut buf));
    }

    #[test]
    fn region_round_trip() {
        let context = IoContext::default();
        let mut bytes = Vec::new();
        {
            let mut stream = Stream::writer(Cursor::new(&mut bytes));
            let mut expected = 0u64;
            stream.begin_region().unwrap();
            for value in 0..10_000u32 {
                value.stream_write(&context, &mut stream).unwrap();
                expected += value as u64;
            }
            stream.end_region().unwrap();
            expected.stream_write(&context, &mut stream).unwrap();
        }

        let mut stream = Stream::reader(bytes.as_slice());
        stream.begin_region().unwrap();
        let mut sum = 0u64;
        for value in 0..10_000u32 {
            assert_eq!(value, u32::stream_read(&context, &mut stream).unwrap());
            sum += value as u64;
        }
        stream.end_region().unwrap();
        assert_eq!(sum, u64::stream_read(&context, &mut stream).unwrap());
    }

    #[test]
    fn region_nesting_flushes_once() {
        let context = IoContext::default();
        let mut bytes = Vec::new();
        {
            let mut stream = Stream::writer(Cursor::new(&mut bytes));
            stream.begin_region().unwrap();
            1u32.stream_write(&context, &mut stream).unwrap();
            stream.begin_region().unwrap();
            2u32.stream_write(&context, &mut stream).unwrap();
            stream.end_region().unwrap();
            3u32.stream_write(&context, &mut stream).unwrap();
            stream.end_region().unwrap();
        }

        let mut stream = Stream::reader(bytes.as_slice());
        stream.begin_region().unwrap();
        assert_eq!(1, u32::stream_read(&context, &mut stream).unwrap());
        stream.begin_region().unwrap();
        assert_eq!(2, u32::stream_read(&context, &mut stream).unwrap());
        stream.end_region().unwrap();
        assert_eq!(3, u32::stream_read(&context, &mut stream).unwrap());
        stream.end_region().unwrap();
    }

    #[test]
    fn empty_region() {
        let mut bytes = Vec::new();
        {
            let mut stream = Stream::writer(Cursor::new(&mut bytes));
            stream.begin_region().unwrap();
            stream.end_region().unwrap();
        }
        // Just the zero source size header.
        assert_eq!(4, bytes.len());

        let mut stream = Stream::reader(bytes.as_slice());
        stream.begin_region().unwrap();
        stream.end_region().unwrap();
    }

    #[test]
    fn region_read_past_end_fails() {
        let context = IoContext::default();
        let mut bytes = Vec::new();
        {
            let mut stream = Stream::writer(Cursor::new(&mut bytes));
            stream.begin_region().unwrap();
            7u32.stream_write(&context, &mut stream).unwrap();
            stream.end_region().unwrap();
        }

        let mut stream = Stream::reader(bytes.as_slice());
        stream.begin_region().unwrap();
        assert_eq!(7, u32::stream_read(&context, &mut stream).unwrap());
        assert_eq!(
            Err(Error::FailedRead),
            u32::stream_read(&context, &mut stream)
        );
    }
}
