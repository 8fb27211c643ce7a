//! Fixed-width primitive decoding and the `Decode` trait

use byteorder::{ByteOrder, LittleEndian};

use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::DecodeError;

/// A fixed-width little-endian primitive
pub trait Value: Copy + std::fmt::Debug {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Decode from exactly `WIDTH` bytes
    fn from_le(bytes: &[u8]) -> Self;

    /// Append the encoded form to `out`
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_value {
    ($($ty:ty => $width:expr, $read:expr;)*) => {
        $(
            impl Value for $ty {
                const WIDTH: usize = $width;

                fn from_le(bytes: &[u8]) -> Self {
                    $read(bytes)
                }

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_value! {
    u8 => 1, |b: &[u8]| b[0];
    i8 => 1, |b: &[u8]| b[0] as i8;
    u16 => 2, LittleEndian::read_u16;
    i16 => 2, LittleEndian::read_i16;
    u32 => 4, LittleEndian::read_u32;
    i32 => 4, LittleEndian::read_i32;
    u64 => 8, LittleEndian::read_u64;
    i64 => 8, LittleEndian::read_i64;
    f32 => 4, LittleEndian::read_f32;
    f64 => 8, LittleEndian::read_f64;
}

/// Decode one primitive at `offset`
///
/// Returns the value and the number of bytes consumed.
pub fn decode_value<T: Value>(buffer: &[u8], offset: usize) -> Result<(T, usize), DecodeError> {
    let mut cursor = ByteCursor::at(buffer, offset)?;
    let value = cursor.read_value::<T>()?;
    Ok((value, T::WIDTH))
}

/// A type that can be reconstructed from an argument buffer
///
/// Generated per-type decoders implement this by decoding their members in
/// declaration order. Every [`Value`] is a `Decode` type.
pub trait Decode: Sized {
    /// Smallest number of bytes one encoded value can occupy
    ///
    /// Used to reject array lengths that cannot possibly fit the remaining
    /// buffer before any element is read.
    const MIN_WIRE_SIZE: usize = 0;

    fn decode(cursor: &mut ByteCursor<'_>, ctx: &mut DecodeContext<'_>) -> Result<Self, DecodeError>;
}

impl<T: Value> Decode for T {
    const MIN_WIRE_SIZE: usize = T::WIDTH;

    fn decode(cursor: &mut ByteCursor<'_>, _ctx: &mut DecodeContext<'_>) -> Result<Self, DecodeError> {
        cursor.read_value()
    }
}
