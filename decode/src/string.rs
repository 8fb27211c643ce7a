//! String and string-array decoders
//!
//! A string uses pointer framing with a byte payload. The length counts
//! payload bytes; a trailing NUL terminator, when capture recorded one, is
//! stripped and not counted in the decoded value.

use std::borrow::Cow;
use std::str::Utf8Error;

use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::DecodeError;
use crate::pointer::{DecodedPointer, PointerHeader, Presence};
use crate::value::Decode;

/// A decoded character-data pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedString {
    presence: Presence,
    capture_address: u64,
    bytes: Vec<u8>,
}

impl Default for DecodedString {
    fn default() -> Self {
        Self {
            presence: Presence::Null,
            capture_address: 0,
            bytes: Vec::new(),
        }
    }
}

impl DecodedString {
    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn is_null(&self) -> bool {
        self.presence == Presence::Null
    }

    pub fn capture_address(&self) -> Option<u64> {
        self.presence.is_present().then_some(self.capture_address)
    }

    /// Text length in bytes, terminator excluded
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Decode for DecodedString {
    const MIN_WIRE_SIZE: usize = 1;

    fn decode(cursor: &mut ByteCursor<'_>, ctx: &mut DecodeContext<'_>) -> Result<Self, DecodeError> {
        let header = PointerHeader::read(cursor, ctx.format())?;
        if header.presence != Presence::PresentWithData {
            return Ok(Self {
                presence: header.presence,
                capture_address: header.capture_address,
                bytes: Vec::new(),
            });
        }

        // Validate before touching the payload so a corrupt length never
        // reads past the buffer
        if header.length > cursor.remaining() {
            return Err(DecodeError::BufferUnderrun {
                offset: cursor.position(),
                needed: header.length,
                available: cursor.remaining(),
            });
        }

        let mut payload = cursor.read_bytes(header.length)?;
        if let Some((&0, text)) = payload.split_last() {
            payload = text;
        }

        Ok(Self {
            presence: header.presence,
            capture_address: header.capture_address,
            bytes: payload.to_vec(),
        })
    }
}

/// Pointer to an array of strings
pub type StringArray = DecodedPointer<DecodedString>;

/// Decode a string pointer
pub fn decode_string(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<DecodedString, DecodeError> {
    DecodedString::decode(cursor, ctx)
}

/// Decode a pointer to an array of string pointers
pub fn decode_string_array(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<StringArray, DecodeError> {
    StringArray::decode(cursor, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::format::WireFormat;
    use crate::registry::ExtensionRegistry;
    use crate::remap::HandleRemapContext;
    use crate::writer::ArgumentWriter;

    fn with_ctx<T>(f: impl FnOnce(&mut DecodeContext<'_>) -> T) -> T {
        let registry = ExtensionRegistry::empty();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(WireFormat::default(), &registry, &remap);
        f(&mut ctx)
    }

    #[test]
    fn test_terminator_stripped() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_string(0x10, "VK_LAYER_test");
        let bytes = writer.into_bytes();

        let string = with_ctx(|ctx| decode_string(&mut ByteCursor::new(&bytes), ctx)).unwrap();
        assert_eq!(string.as_str(), Ok("VK_LAYER_test"));
        assert_eq!(string.len(), 13);
        assert_eq!(string.capture_address(), Some(0x10));
    }

    #[test]
    fn test_unterminated_payload_kept_whole() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_array(0x10, b"abc".as_slice());
        let bytes = writer.into_bytes();

        let string = with_ctx(|ctx| decode_string(&mut ByteCursor::new(&bytes), ctx)).unwrap();
        assert_eq!(string.as_bytes(), b"abc");
    }

    #[test]
    fn test_null_and_empty_are_distinct() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_null();
        writer.write_string(0x20, "");
        let bytes = writer.into_bytes();

        let (null, empty) = with_ctx(|ctx| {
            let mut cursor = ByteCursor::new(&bytes);
            let null = decode_string(&mut cursor, ctx).unwrap();
            let empty = decode_string(&mut cursor, ctx).unwrap();
            assert!(cursor.is_empty());
            (null, empty)
        });
        assert!(null.is_null());
        assert!(!empty.is_null());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_lossy_view() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_array(0x10, &[b'o', b'k', 0xFF]);
        let bytes = writer.into_bytes();

        let string = with_ctx(|ctx| decode_string(&mut ByteCursor::new(&bytes), ctx)).unwrap();
        assert!(string.as_str().is_err());
        assert_eq!(string.to_string_lossy(), "ok\u{FFFD}");
    }

    #[test]
    fn test_string_array() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_string_array(0x30, &["VK_KHR_surface", "VK_KHR_swapchain"]);
        let bytes = writer.into_bytes();

        let array =
            with_ctx(|ctx| decode_string_array(&mut ByteCursor::new(&bytes), ctx)).unwrap();
        let names: Vec<_> = array.iter().map(|s| s.to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["VK_KHR_surface", "VK_KHR_swapchain"]);
        assert_eq!(array.capture_address(), Some(0x30));
    }

    #[test]
    fn test_string_length_past_end() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_string_array(0x30, &["first", "second"]);
        let mut bytes = writer.into_bytes();
        bytes.truncate(bytes.len() - 3);

        let err = with_ctx(|ctx| decode_string_array(&mut ByteCursor::new(&bytes), ctx)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferUnderrun);
        assert_eq!(
            err,
            DecodeError::BufferUnderrun {
                offset: bytes.len() - 4,
                needed: 7,
                available: 4,
            }
        );
    }
}
