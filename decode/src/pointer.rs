//! Pointer decoding: presence / length / address framing around elements
//!
//! ```text
//! [presence]                                   Null
//! [presence][length][address]                  PresentNoData
//! [presence][length][address][element * N]     PresentWithData
//! ```

use serde::{Deserialize, Serialize};

use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, PartialDecode};
use crate::format::WireFormat;
use crate::value::Decode;

/// Pointer presence tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    /// Null pointer
    Null,
    /// Non-null pointer whose contents are produced by replay (output parameter)
    PresentNoData,
    /// Non-null pointer with its contents recorded in the trace
    PresentWithData,
}

impl Presence {
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(Self::Null),
            1 => Some(Self::PresentNoData),
            2 => Some(Self::PresentWithData),
            _ => None,
        }
    }

    pub fn tag(self) -> u64 {
        match self {
            Self::Null => 0,
            Self::PresentNoData => 1,
            Self::PresentWithData => 2,
        }
    }

    pub fn is_present(self) -> bool {
        self != Self::Null
    }
}

/// Framing header of one pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerHeader {
    pub presence: Presence,
    /// Element count as written by capture (0 for `Null`)
    pub length: usize,
    /// Capture-time address (0 for `Null`)
    pub capture_address: u64,
}

impl PointerHeader {
    /// Read the presence tag, then length and address for non-null pointers
    pub fn read(cursor: &mut ByteCursor<'_>, format: &WireFormat) -> Result<Self, DecodeError> {
        let offset = cursor.position();
        let tag = cursor.read_field(format.presence)?;
        let presence =
            Presence::from_tag(tag).ok_or(DecodeError::InvalidPresence { offset, value: tag })?;

        if presence == Presence::Null {
            return Ok(Self {
                presence,
                length: 0,
                capture_address: 0,
            });
        }

        let length = cursor.read_length(format.length)?;
        let capture_address = cursor.read_field(format.address)?;
        Ok(Self {
            presence,
            length,
            capture_address,
        })
    }
}

/// A decoded pointer argument
///
/// `elements.len()` is the decoded length. An empty present pointer is
/// distinct from a null one.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPointer<T> {
    presence: Presence,
    capture_address: u64,
    declared_length: usize,
    elements: Vec<T>,
}

impl<T> Default for DecodedPointer<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> DecodedPointer<T> {
    pub fn null() -> Self {
        Self {
            presence: Presence::Null,
            capture_address: 0,
            declared_length: 0,
            elements: Vec::new(),
        }
    }

    fn from_parts(header: PointerHeader, elements: Vec<T>) -> Self {
        Self {
            presence: header.presence,
            capture_address: header.capture_address,
            declared_length: header.length,
            elements,
        }
    }

    /// Decode with an explicit element decoder
    ///
    /// `min_element_width` is the smallest encoded size of one element; a
    /// length that cannot fit the remaining bytes fails before any element
    /// is read.
    pub fn decode_with<F>(
        cursor: &mut ByteCursor<'_>,
        ctx: &mut DecodeContext<'_>,
        min_element_width: usize,
        decode_element: F,
    ) -> Result<Self, DecodeError>
    where
        F: FnMut(&mut ByteCursor<'_>, &mut DecodeContext<'_>) -> Result<T, DecodeError>,
    {
        Ok(Self::decode_partial_with(cursor, ctx, min_element_width, decode_element)?)
    }

    /// Like [`decode_with`](Self::decode_with), but a fatal error inside
    /// element `i` still returns elements `0..i`
    pub fn decode_partial_with<F>(
        cursor: &mut ByteCursor<'_>,
        ctx: &mut DecodeContext<'_>,
        min_element_width: usize,
        decode_element: F,
    ) -> Result<Self, PartialDecode<Self>>
    where
        F: FnMut(&mut ByteCursor<'_>, &mut DecodeContext<'_>) -> Result<T, DecodeError>,
    {
        let header = PointerHeader::read(cursor, ctx.format())
            .map_err(|error| PartialDecode::new(Self::null(), error))?;

        match decode_elements(cursor, ctx, &header, min_element_width, decode_element) {
            Ok(elements) => Ok(Self::from_parts(header, elements)),
            Err(partial) => Err(partial.map(|elements| Self::from_parts(header, elements))),
        }
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn is_null(&self) -> bool {
        self.presence == Presence::Null
    }

    /// Capture-time address, used to relate arguments that aliased in the capture
    pub fn capture_address(&self) -> Option<u64> {
        self.presence.is_present().then_some(self.capture_address)
    }

    /// Number of decoded elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element count recorded by capture
    ///
    /// For output-only pointers this sizes the allocation replay must
    /// provide; it equals [`len`](Self::len) for pointers with data.
    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [T] {
        &mut self.elements
    }

    pub fn first(&self) -> Option<&T> {
        self.elements.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elements.iter()
    }

    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }
}

impl<T: Decode> DecodedPointer<T> {
    /// Decode at `offset` in `buffer`, returning the pointer and bytes consumed
    pub fn decode_at(
        buffer: &[u8],
        offset: usize,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<(Self, usize), DecodeError> {
        let mut cursor = ByteCursor::at(buffer, offset)?;
        let pointer = Self::decode(&mut cursor, ctx)?;
        Ok((pointer, cursor.position() - offset))
    }

    /// Decode through `T`'s [`Decode`] impl, keeping partial elements on error
    pub fn decode_partial(
        cursor: &mut ByteCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<Self, PartialDecode<Self>> {
        Self::decode_partial_with(cursor, ctx, T::MIN_WIRE_SIZE, T::decode)
    }

    /// Decode a pointer to one value
    ///
    /// `None` for a null or output-only pointer.
    pub fn decode_single(
        cursor: &mut ByteCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<Option<T>, DecodeError> {
        let pointer = Self::decode(cursor, ctx)?;
        Ok(pointer.into_elements().into_iter().next())
    }
}

impl<T: Decode> Decode for DecodedPointer<T> {
    const MIN_WIRE_SIZE: usize = 1;

    fn decode(cursor: &mut ByteCursor<'_>, ctx: &mut DecodeContext<'_>) -> Result<Self, DecodeError> {
        Self::decode_with(cursor, ctx, T::MIN_WIRE_SIZE, T::decode)
    }
}

impl<'p, T> IntoIterator for &'p DecodedPointer<T> {
    type Item = &'p T;
    type IntoIter = std::slice::Iter<'p, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Decode the elements described by `header`
///
/// Each element is decoded one nesting level deeper. On a fatal error the
/// elements decoded so far are returned with the error.
fn decode_elements<T, F>(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
    header: &PointerHeader,
    min_element_width: usize,
    mut decode_element: F,
) -> Result<Vec<T>, PartialDecode<Vec<T>>>
where
    F: FnMut(&mut ByteCursor<'_>, &mut DecodeContext<'_>) -> Result<T, DecodeError>,
{
    if header.presence != Presence::PresentWithData {
        return Ok(Vec::new());
    }

    let offset = cursor.position();
    let needed = header
        .length
        .checked_mul(min_element_width)
        .ok_or_else(|| {
            PartialDecode::new(
                Vec::new(),
                DecodeError::LengthOverflow {
                    offset,
                    value: header.length as u64,
                },
            )
        })?;
    if needed > cursor.remaining() {
        return Err(PartialDecode::new(
            Vec::new(),
            DecodeError::BufferUnderrun {
                offset,
                needed,
                available: cursor.remaining(),
            },
        ));
    }

    let mut elements = Vec::with_capacity(header.length.min(cursor.remaining()));
    for _ in 0..header.length {
        let offset = cursor.position();
        match ctx.nested(offset, |ctx| decode_element(cursor, ctx)) {
            Ok(element) => elements.push(element),
            Err(error) => return Err(PartialDecode::new(elements, error)),
        }
    }
    Ok(elements)
}
