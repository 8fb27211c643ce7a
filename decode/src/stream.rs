//! Call-stream reader
//!
//! Splits a trace into self-delimited call entries. Argument bytes are not
//! interpreted here, so a call whose arguments fail to decode never affects
//! the framing of the calls after it.

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::cursor::ByteCursor;
use crate::error::{DecodeError, StreamError};
use crate::format::FileHeader;

/// Most output bytes one LZ4 block byte can produce
const MAX_LZ4_EXPANSION: usize = 255;

/// Length of the uncompressed-size prefix of a compressed call block
const SIZE_PREFIX_LEN: usize = 4;

/// One recorded API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEntry<'a> {
    pub call_id: u64,
    pub thread_id: u64,
    /// Offset of the call header in the trace
    pub offset: usize,
    /// Argument bytes as stored (compressed when `compressed` is set)
    pub payload: &'a [u8],
    pub compressed: bool,
}

impl<'a> CallEntry<'a> {
    /// Byte length of the stored argument block
    pub fn total_len(&self) -> usize {
        self.payload.len()
    }

    /// Argument bytes ready for decoding
    pub fn arguments(&self) -> Result<Cow<'a, [u8]>, DecodeError> {
        if !self.compressed {
            return Ok(Cow::Borrowed(self.payload));
        }

        let failed =
            |detail: String| DecodeError::Decompression(format!("call {}: {detail}", self.call_id));
        if self.payload.len() < SIZE_PREFIX_LEN {
            return Err(failed("missing size prefix".to_string()));
        }

        // Size prefix is bounded by the block's maximum expansion before allocating
        let (prefix, block) = self.payload.split_at(SIZE_PREFIX_LEN);
        let declared = LittleEndian::read_u32(prefix) as usize;
        let limit = block.len().saturating_mul(MAX_LZ4_EXPANSION);
        if declared > limit {
            return Err(failed(format!(
                "declared size {declared} exceeds the {limit} bytes a {}-byte block can hold",
                block.len()
            )));
        }

        let arguments =
            lz4_flex::block::decompress(block, declared).map_err(|e| failed(e.to_string()))?;
        if arguments.len() != declared {
            return Err(failed(format!(
                "block expanded to {} bytes, {declared} declared",
                arguments.len()
            )));
        }
        Ok(Cow::Owned(arguments))
    }
}

/// Iterator over the call entries of a trace
///
/// Yields `Err` once and then stops if a call header or body runs past the
/// end of the data; nothing after a truncated call can be framed.
#[derive(Debug, Clone)]
pub struct CallStream<'a> {
    cursor: ByteCursor<'a>,
    header: FileHeader,
    finished: bool,
}

impl<'a> CallStream<'a> {
    /// Parse the file header and position at the first call
    pub fn new(data: &'a [u8]) -> Result<Self, StreamError> {
        let mut cursor = ByteCursor::new(data);
        let header = FileHeader::read(&mut cursor)?;
        debug!(
            version = header.version,
            compressed = header.is_compressed(),
            "trace header parsed"
        );
        Ok(Self {
            cursor,
            header,
            finished: false,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Offset of the next call header
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    fn read_entry(&mut self) -> Result<CallEntry<'a>, StreamError> {
        let format = self.header.format;
        let offset = self.cursor.position();
        if self.cursor.remaining() < format.call_header_len() {
            return Err(StreamError::TruncatedCallHeader { offset });
        }

        let truncated = |_: DecodeError| StreamError::TruncatedCallHeader { offset };
        let call_id = self.cursor.read_field(format.call_id).map_err(truncated)?;
        let thread_id = self.cursor.read_field(format.thread_id).map_err(truncated)?;
        let declared = self.cursor.read_field(format.call_length).map_err(truncated)?;

        let available = self.cursor.remaining();
        let payload = usize::try_from(declared)
            .ok()
            .and_then(|len| self.cursor.read_bytes(len).ok())
            .ok_or(StreamError::TruncatedCall {
                offset,
                call_id,
                declared,
                available,
            })?;

        Ok(CallEntry {
            call_id,
            thread_id,
            offset,
            payload,
            compressed: self.header.is_compressed(),
        })
    }
}

impl<'a> Iterator for CallStream<'a> {
    type Item = Result<CallEntry<'a>, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.cursor.is_empty() {
            return None;
        }
        let entry = self.read_entry();
        if entry.is_err() {
            self.finished = true;
        }
        Some(entry)
    }
}
