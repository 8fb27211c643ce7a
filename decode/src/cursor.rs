//! Forward-only byte cursor over an argument buffer

use byteorder::{ByteOrder, LittleEndian};

use crate::error::DecodeError;
use crate::format::FieldWidth;
use crate::value::Value;

/// Read position into an immutable buffer
///
/// The cursor only moves forward. A read that would run past the end fails
/// with [`DecodeError::BufferUnderrun`] and leaves the position unchanged.
/// Positions reported by [`ByteCursor::position`] are absolute, so a child
/// cursor created with [`ByteCursor::split`] reports offsets in terms of the
/// outermost buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteCursor<'a> {
    /// Cursor at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Cursor positioned at `offset` within `data`
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self, DecodeError> {
        if offset > data.len() {
            return Err(DecodeError::BufferUnderrun {
                offset: data.len(),
                needed: offset - data.len(),
                available: 0,
            });
        }
        Ok(Self {
            data,
            pos: offset,
            base: 0,
        })
    }

    /// Absolute offset of the next byte
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes left before the end of this cursor's range
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread bytes, without advancing
    pub fn peek_remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn underrun(&self, needed: usize) -> DecodeError {
        DecodeError::BufferUnderrun {
            offset: self.position(),
            needed,
            available: self.remaining(),
        }
    }

    /// Take the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(self.underrun(len));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Split off a bounded cursor over the next `len` bytes and advance past them
    pub fn split(&mut self, len: usize) -> Result<ByteCursor<'a>, DecodeError> {
        let base = self.position();
        let data = self.read_bytes(len)?;
        Ok(ByteCursor { data, pos: 0, base })
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    /// Read one fixed-width primitive
    pub fn read_value<T: Value>(&mut self) -> Result<T, DecodeError> {
        Ok(T::from_le(self.read_bytes(T::WIDTH)?))
    }

    /// Read an unsigned framing field of the given width
    pub fn read_field(&mut self, width: FieldWidth) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(width.bytes())?;
        Ok(LittleEndian::read_uint(bytes, bytes.len()))
    }

    /// Read a length field and convert it to `usize`
    pub fn read_length(&mut self, width: FieldWidth) -> Result<usize, DecodeError> {
        let offset = self.position();
        let value = self.read_field(width)?;
        usize::try_from(value).map_err(|_| DecodeError::LengthOverflow { offset, value })
    }
}
