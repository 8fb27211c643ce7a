//! Trace file header and wire-format field widths
//!
//! # File Structure
//!
//! ```text
//! Header (20 bytes, little-endian)
//!   magic: [u8; 4]            "GFXT"
//!   version: u16
//!   flags: u16
//!   presence_width: u8        pointer presence tag
//!   length_width: u8          pointer / string / node lengths
//!   address_width: u8         capture-time addresses
//!   tag_width: u8             extension type tags (max 4)
//!   handle_width: u8          captured handle ids
//!   call_id_width: u8
//!   thread_id_width: u8
//!   call_length_width: u8
//!   chain_terminator: u32
//! Call entries, repeated until end of file
//!   [call_id][thread_id][total_byte_length][argument bytes]
//! ```
//!
//! Every decoder reads framing fields through [`WireFormat`], so a new
//! format version only changes the header, never the decoders.

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::cursor::ByteCursor;
use crate::error::StreamError;

/// Trace file magic
pub const FORMAT_MAGIC: &[u8; 4] = b"GFXT";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Size of the encoded file header
pub const FILE_HEADER_SIZE: usize = 20;

/// Width of one framing field on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldWidth {
    U8,
    U16,
    U32,
    U64,
}

impl FieldWidth {
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    pub fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            _ => None,
        }
    }

    /// Largest value representable in this width
    pub const fn max_value(self) -> u64 {
        match self {
            Self::U8 => u8::MAX as u64,
            Self::U16 => u16::MAX as u64,
            Self::U32 => u32::MAX as u64,
            Self::U64 => u64::MAX,
        }
    }
}

bitflags::bitflags! {
    /// Format feature flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FormatFlags: u16 {
        /// Argument bytes of every call are an LZ4 block with the size prepended
        const COMPRESSED_CALLS = 0b0000_0001;
    }
}

/// Widths of every framing field plus the extension chain sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFormat {
    pub presence: FieldWidth,
    pub length: FieldWidth,
    pub address: FieldWidth,
    pub tag: FieldWidth,
    pub handle: FieldWidth,
    pub call_id: FieldWidth,
    pub thread_id: FieldWidth,
    pub call_length: FieldWidth,
    /// Extension tag that ends a chain
    pub chain_terminator: u32,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            presence: FieldWidth::U32,
            length: FieldWidth::U64,
            address: FieldWidth::U64,
            tag: FieldWidth::U32,
            handle: FieldWidth::U64,
            call_id: FieldWidth::U32,
            thread_id: FieldWidth::U64,
            call_length: FieldWidth::U64,
            chain_terminator: 0,
        }
    }
}

impl WireFormat {
    /// Bytes consumed by a `Null` pointer
    pub fn null_pointer_len(&self) -> usize {
        self.presence.bytes()
    }

    /// Bytes consumed by a present pointer's framing header
    pub fn pointer_header_len(&self) -> usize {
        self.presence.bytes() + self.length.bytes() + self.address.bytes()
    }

    /// Bytes consumed by one extension node header
    pub fn node_header_len(&self) -> usize {
        self.tag.bytes() + self.length.bytes()
    }

    /// Bytes consumed by one call entry header
    pub fn call_header_len(&self) -> usize {
        self.call_id.bytes() + self.thread_id.bytes() + self.call_length.bytes()
    }
}

/// Decoded file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub flags: FormatFlags,
    pub format: WireFormat,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            flags: FormatFlags::empty(),
            format: WireFormat::default(),
        }
    }
}

impl FileHeader {
    /// Read and validate the header at the cursor
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self, StreamError> {
        let bytes = cursor
            .read_bytes(FILE_HEADER_SIZE)
            .map_err(|_| StreamError::TruncatedHeader)?;
        let mut header = ByteCursor::new(bytes);
        let mut read = |len: usize| {
            header
                .read_bytes(len)
                .map_err(|_| StreamError::TruncatedHeader)
        };

        let mut magic = [0u8; 4];
        magic.copy_from_slice(read(4)?);
        if &magic != FORMAT_MAGIC {
            return Err(StreamError::BadMagic(magic));
        }

        let version = LittleEndian::read_u16(read(2)?);
        if version == 0 || version > FORMAT_VERSION {
            return Err(StreamError::UnsupportedVersion(version));
        }

        let flags = FormatFlags::from_bits_truncate(LittleEndian::read_u16(read(2)?));

        let widths = read(8)?;
        let width = |index: usize, field: &'static str| {
            FieldWidth::from_bytes(widths[index]).ok_or(StreamError::InvalidWidth {
                field,
                value: widths[index],
            })
        };

        let tag = width(3, "tag")?;
        if tag == FieldWidth::U64 {
            return Err(StreamError::InvalidWidth {
                field: "tag",
                value: widths[3],
            });
        }

        let chain_terminator = LittleEndian::read_u32(read(4)?);
        if u64::from(chain_terminator) > tag.max_value() {
            return Err(StreamError::InvalidTerminator {
                terminator: chain_terminator,
                width: tag.bytes(),
            });
        }

        let format = WireFormat {
            presence: width(0, "presence")?,
            length: width(1, "length")?,
            address: width(2, "address")?,
            tag,
            handle: width(4, "handle")?,
            call_id: width(5, "call_id")?,
            thread_id: width(6, "thread_id")?,
            call_length: width(7, "call_length")?,
            chain_terminator,
        };

        Ok(Self {
            version,
            flags,
            format,
        })
    }

    /// Write the 20-byte header
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let format = &self.format;
        writer.write_all(FORMAT_MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u16::<LittleEndian>(self.flags.bits())?;
        for width in [
            format.presence,
            format.length,
            format.address,
            format.tag,
            format.handle,
            format.call_id,
            format.thread_id,
            format.call_length,
        ] {
            writer.write_u8(width.bytes() as u8)?;
        }
        writer.write_u32::<LittleEndian>(format.chain_terminator)?;
        Ok(())
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(FormatFlags::COMPRESSED_CALLS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(header: &FileHeader) -> Vec<u8> {
        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_header_size() {
        assert_eq!(encode(&FileHeader::default()).len(), FILE_HEADER_SIZE);
    }

    #[test]
    fn test_header_roundtrip_custom_widths() {
        let header = FileHeader {
            version: FORMAT_VERSION,
            flags: FormatFlags::COMPRESSED_CALLS,
            format: WireFormat {
                presence: FieldWidth::U8,
                length: FieldWidth::U32,
                address: FieldWidth::U64,
                tag: FieldWidth::U16,
                handle: FieldWidth::U32,
                call_id: FieldWidth::U16,
                thread_id: FieldWidth::U32,
                call_length: FieldWidth::U32,
                chain_terminator: 0xFFFF,
            },
        };
        let bytes = encode(&header);
        let parsed = FileHeader::read(&mut ByteCursor::new(&bytes)).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.is_compressed());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&FileHeader::default());
        bytes[0] = b'X';
        assert_eq!(
            FileHeader::read(&mut ByteCursor::new(&bytes)),
            Err(StreamError::BadMagic(*b"XFXT"))
        );
    }

    #[test]
    fn test_unsupported_version() {
        let header = FileHeader {
            version: FORMAT_VERSION + 1,
            ..FileHeader::default()
        };
        let bytes = encode(&header);
        assert_eq!(
            FileHeader::read(&mut ByteCursor::new(&bytes)),
            Err(StreamError::UnsupportedVersion(FORMAT_VERSION + 1))
        );
    }

    #[test]
    fn test_invalid_width() {
        let mut bytes = encode(&FileHeader::default());
        bytes[8] = 3; // presence width
        assert_eq!(
            FileHeader::read(&mut ByteCursor::new(&bytes)),
            Err(StreamError::InvalidWidth {
                field: "presence",
                value: 3
            })
        );
    }

    #[test]
    fn test_terminator_must_fit_tag() {
        let header = FileHeader {
            format: WireFormat {
                tag: FieldWidth::U8,
                chain_terminator: 0x100,
                ..WireFormat::default()
            },
            ..FileHeader::default()
        };
        let bytes = encode(&header);
        assert_eq!(
            FileHeader::read(&mut ByteCursor::new(&bytes)),
            Err(StreamError::InvalidTerminator {
                terminator: 0x100,
                width: 1
            })
        );
    }

    #[test]
    fn test_truncated_header() {
        let bytes = encode(&FileHeader::default());
        assert_eq!(
            FileHeader::read(&mut ByteCursor::new(&bytes[..10])),
            Err(StreamError::TruncatedHeader)
        );
    }

    #[test]
    fn test_default_lengths() {
        let format = WireFormat::default();
        assert_eq!(format.null_pointer_len(), 4);
        assert_eq!(format.pointer_header_len(), 20);
        assert_eq!(format.node_header_len(), 12);
        assert_eq!(format.call_header_len(), 20);
    }
}
