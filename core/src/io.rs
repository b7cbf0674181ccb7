// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Endian-aware binary streams.

The binary formats handled by Rubbl declare their byte order either
explicitly (an attribute in a header) or implicitly (a heuristic applied to a
known field). Either way, once the order is known every multi-byte value in
the stream is read or written in that order. The [`EndianReader`] and
[`EndianWriter`] types wrap a byte stream with that declared order and keep
track of how far into the stream they have progressed, so that errors can
report the byte offset where they happened.

 */

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;
use std::io::{self, Read, Write};

use crate::errors::{CodecError, Result};

/// The byte order of a binary stream.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Endianness {
    /// Most significant byte first.
    Big,

    /// Least significant byte first.
    Little,
}

impl Endianness {
    /// The byte order of the machine we are running on.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// The opposite byte order.
    pub fn swapped(self) -> Self {
        match self {
            Endianness::Big => Endianness::Little,
            Endianness::Little => Endianness::Big,
        }
    }

    /// Whether values in this order can be used without byte-swapping.
    pub fn is_native(self) -> bool {
        self == Endianness::native()
    }

    /// The spelling used in ASDM `byteOrder` attributes.
    pub fn asdm_name(self) -> &'static str {
        match self {
            Endianness::Big => "Big_Endian",
            Endianness::Little => "Little_Endian",
        }
    }

    /// Parse the spelling used in ASDM `byteOrder` attributes.
    pub fn from_asdm_name(name: &str) -> Option<Self> {
        match name {
            "Big_Endian" => Some(Endianness::Big),
            "Little_Endian" => Some(Endianness::Little),
            _ => None,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match *self {
            Endianness::Big => "big-endian",
            Endianness::Little => "little-endian",
        })
    }
}

macro_rules! impl_endian_reads {
    ($($(#[$attr:meta])* $name:ident, $ty:ty, $size:expr, $func:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(&mut self) -> Result<$ty> {
                let mut buf = [0u8; $size];
                self.fill(&mut buf)?;
                Ok(match self.order {
                    Endianness::Big => BigEndian::$func(&buf),
                    Endianness::Little => LittleEndian::$func(&buf),
                })
            }
        )*
    };
}

macro_rules! impl_endian_writes {
    ($($(#[$attr:meta])* $name:ident, $ty:ty, $size:expr, $func:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(&mut self, value: $ty) -> Result<()> {
                let mut buf = [0u8; $size];
                match self.order {
                    Endianness::Big => BigEndian::$func(&mut buf, value),
                    Endianness::Little => LittleEndian::$func(&mut buf, value),
                }
                self.put(&buf)
            }
        )*
    };
}

/// This struct wraps a Read type to decode values in a declared byte order,
/// tracking how many bytes into the stream the reads have progressed.
#[derive(Debug)]
pub struct EndianReader<R: Read> {
    inner: R,
    order: Endianness,
    offset: u64,
}

impl<R: Read> EndianReader<R> {
    /// Create a new EndianReader that wraps the argument *inner* and decodes
    /// values in the byte order *order*.
    pub fn new(inner: R, order: Endianness) -> Self {
        EndianReader {
            inner,
            order,
            offset: 0,
        }
    }

    /// Consume this struct, returning the underlying inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Get a reference to the underlying inner reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Get a mutable reference to the underlying inner reader.
    ///
    /// Reading or seeking the inner reader directly will desynchronize the
    /// offset tracked by this struct; see [`Self::reset_offset`].
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// The byte order in which values are decoded.
    pub fn order(&self) -> Endianness {
        self.order
    }

    /// Change the byte order in which subsequent values are decoded.
    pub fn set_order(&mut self, order: Endianness) {
        self.order = order;
    }

    /// Return how many bytes we have read since this struct was created.
    ///
    /// As with all of the offset-tracking streams in Rubbl, the offset is
    /// tracked internally and is relative to the creation of this struct or
    /// the last call to [`Self::reset_offset`].
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Declare the current position of the inner stream, e.g. after seeking
    /// it through [`Self::get_mut`].
    pub fn reset_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Fill *buf* completely, or fail with a `TruncatedRead` error that says
    /// how many bytes were actually available.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.offset;
        let mut ofs = 0;

        while ofs < buf.len() {
            let n_read = match self.inner.read(&mut buf[ofs..]) {
                Ok(n) => n,
                Err(e) => {
                    if e.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }

                    return Err(e.into());
                }
            };

            if n_read == 0 {
                self.offset += ofs as u64;
                return Err(CodecError::TruncatedRead {
                    offset: start,
                    needed: buf.len(),
                    available: ofs,
                });
            }

            ofs += n_read;
        }

        self.offset += ofs as u64;
        Ok(())
    }

    /// Read exactly *n* raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read and discard exactly *n* bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        let mut buf = [0u8; 256];
        let mut left = n;

        while left > 0 {
            let chunk = left.min(buf.len());

            if let Err(e) = self.fill(&mut buf[..chunk]) {
                return Err(match e {
                    CodecError::TruncatedRead { available, .. } => CodecError::TruncatedRead {
                        offset: self.offset - available as u64 - (n - left) as u64,
                        needed: n,
                        available: n - left + available,
                    },
                    other => other,
                });
            }

            left -= chunk;
        }

        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a one-byte boolean. Any nonzero value is true.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    impl_endian_reads! {
        read_i16, i16, 2, read_i16;
        read_i32, i32, 4, read_i32;
        read_i64, i64, 8, read_i64;
        read_f32, f32, 4, read_f32;
        read_f64, f64, 8, read_f64;
    }

    /// Read a non-negative int32 length or count prefix.
    pub fn read_length(&mut self) -> Result<usize> {
        let n = self.read_i32()?;

        if n < 0 {
            return Err(CodecError::InvalidLength(n as i64));
        }

        Ok(n as usize)
    }

    /// Read a string stored as an int32 byte count followed by UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let n = self.read_length()?;
        let buf = self.read_bytes(n)?;
        Ok(std::str::from_utf8(&buf)?.to_owned())
    }

    /// Read a fixed-width text field of *width* bytes.
    ///
    /// The field is NUL-padded or NUL-terminated: everything from the first
    /// NUL byte onward is dropped. Bytes are interpreted as ISO-8859-1, so
    /// this never fails on content, only on a short read.
    pub fn read_fixed_string(&mut self, width: usize) -> Result<String> {
        let buf = self.read_bytes(width)?;
        let end = buf.iter().position(|b| *b == 0).unwrap_or(width);
        Ok(buf[..end].iter().map(|b| *b as char).collect())
    }
}

impl<R: Read> Read for EndianReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf);

        if let Ok(n) = result {
            self.offset += n as u64;
        }

        result
    }
}

/// In analogy with [`EndianReader`], this struct wraps a Write type to
/// encode values in a declared byte order, tracking how many bytes have been
/// written.
#[derive(Debug)]
pub struct EndianWriter<W: Write> {
    inner: W,
    order: Endianness,
    offset: u64,
}

impl<W: Write> EndianWriter<W> {
    /// Create a new EndianWriter that wraps the argument *inner* and encodes
    /// values in the byte order *order*.
    pub fn new(inner: W, order: Endianness) -> Self {
        EndianWriter {
            inner,
            order,
            offset: 0,
        }
    }

    /// Consume this struct, returning the underlying inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// The byte order in which values are encoded.
    pub fn order(&self) -> Endianness {
        self.order
    }

    /// Return how many bytes we have written since this struct was created.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn put(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.put(buf)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.put(&[value as u8])
    }

    impl_endian_writes! {
        write_i16, i16, 2, write_i16;
        write_i32, i32, 4, write_i32;
        write_i64, i64, 8, write_i64;
        write_f32, f32, 4, write_f32;
        write_f64, f64, 8, write_f64;
    }

    /// Write an int32 length or count prefix.
    pub fn write_length(&mut self, n: usize) -> Result<()> {
        if n > i32::MAX as usize {
            return Err(CodecError::InvalidLength(n as i64));
        }

        self.write_i32(n as i32)
    }

    /// Write a string as an int32 byte count followed by UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_length(value.len())?;
        self.put(value.as_bytes())
    }

    /// Write a fixed-width, NUL-padded text field. Text longer than *width*
    /// bytes is truncated; characters outside ISO-8859-1 are written as `?`.
    pub fn write_fixed_string(&mut self, value: &str, width: usize) -> Result<()> {
        let mut buf = vec![0u8; width];

        for (slot, c) in buf.iter_mut().zip(value.chars()) {
            *slot = if (c as u32) < 256 { c as u8 } else { b'?' };
        }

        self.put(&buf)
    }
}

impl<W: Write> Write for EndianWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);

        if let Ok(n) = result {
            self.offset += n as u64;
        }

        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn scalars_honor_declared_order() {
        let bytes = [0u8, 0, 0, 7];
        let mut r = EndianReader::new(Cursor::new(&bytes[..]), Endianness::Big);
        assert_eq!(r.read_i32().unwrap(), 7);

        let mut r = EndianReader::new(Cursor::new(&bytes[..]), Endianness::Little);
        assert_eq!(r.read_i32().unwrap(), 7 << 24);
    }

    #[test]
    fn writer_mirrors_reader() {
        for order in &[Endianness::Big, Endianness::Little] {
            let mut w = EndianWriter::new(Vec::new(), *order);
            w.write_i16(-3).unwrap();
            w.write_i64(1 << 40).unwrap();
            w.write_f32(1.5).unwrap();
            w.write_f64(-0.1).unwrap();
            w.write_bool(true).unwrap();
            w.write_string("héllo").unwrap();
            w.write_fixed_string("ABC", 6).unwrap();
            assert_eq!(w.offset(), 2 + 8 + 4 + 8 + 1 + 4 + 6 + 6);
            let buf = w.into_inner();

            let mut r = EndianReader::new(Cursor::new(buf), *order);
            assert_eq!(r.read_i16().unwrap(), -3);
            assert_eq!(r.read_i64().unwrap(), 1 << 40);
            assert_eq!(r.read_f32().unwrap(), 1.5);
            assert_eq!(r.read_f64().unwrap(), -0.1);
            assert!(r.read_bool().unwrap());
            assert_eq!(r.read_string().unwrap(), "héllo");
            assert_eq!(r.read_fixed_string(6).unwrap(), "ABC");
        }
    }

    #[test]
    fn short_read_is_truncated() {
        let bytes = [1u8, 2, 3];
        let mut r = EndianReader::new(Cursor::new(&bytes[..]), Endianness::Big);
        r.read_u8().unwrap();

        match r.read_i32() {
            Err(CodecError::TruncatedRead {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn fixed_string_stops_at_nul() {
        let bytes = b"RX1\0junk";
        let mut r = EndianReader::new(Cursor::new(&bytes[..]), Endianness::Little);
        assert_eq!(r.read_fixed_string(8).unwrap(), "RX1");
        assert_eq!(r.offset(), 8);

        let mut r = EndianReader::new(Cursor::new(&bytes[..]), Endianness::Little);
        assert!(r.read_fixed_string(9).is_err());
    }

    #[test]
    fn negative_length_rejected() {
        let mut w = EndianWriter::new(Vec::new(), Endianness::Little);
        w.write_i32(-2).unwrap();
        let mut r = EndianReader::new(Cursor::new(w.into_inner()), Endianness::Little);
        assert!(matches!(
            r.read_string(),
            Err(CodecError::InvalidLength(-2))
        ));
    }

    #[test]
    fn skip_reports_truncation() {
        let bytes = [0u8; 10];
        let mut r = EndianReader::new(Cursor::new(&bytes[..]), Endianness::Big);
        r.skip(4).unwrap();
        assert_eq!(r.offset(), 4);
        assert!(matches!(
            r.skip(7),
            Err(CodecError::TruncatedRead { needed: 7, available: 6, .. })
        ));
    }

    #[test]
    fn asdm_names() {
        assert_eq!(Endianness::from_asdm_name("Big_Endian"), Some(Endianness::Big));
        assert_eq!(
            Endianness::from_asdm_name(Endianness::Little.asdm_name()),
            Some(Endianness::Little)
        );
        assert_eq!(Endianness::from_asdm_name("little"), None);
        assert_eq!(Endianness::native().swapped().swapped(), Endianness::native());
    }
}
