//! Trace encoder
//!
//! Produces the byte layout the decoders read. Used by capture-side tooling
//! to synthesize traces and by tests to build fixtures.

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use lz4_flex::compress_prepend_size;

use crate::format::{FieldWidth, FileHeader, WireFormat};
use crate::pointer::Presence;
use crate::value::Value;

/// Encoder for the argument bytes of one call
#[derive(Debug, Clone)]
pub struct ArgumentWriter {
    format: WireFormat,
    buffer: Vec<u8>,
}

impl ArgumentWriter {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buffer: Vec::new(),
        }
    }

    pub fn format(&self) -> &WireFormat {
        &self.format
    }

    /// Write a framing field, truncated to `width`
    pub fn write_field(&mut self, width: FieldWidth, value: u64) {
        let mut bytes = [0u8; 8];
        let len = width.bytes();
        LittleEndian::write_uint(&mut bytes, value & width.max_value(), len);
        self.buffer.extend_from_slice(&bytes[..len]);
    }

    pub fn write_value<T: Value>(&mut self, value: T) {
        value.write_le(&mut self.buffer);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn write_pointer_header(&mut self, presence: Presence, length: usize, address: u64) {
        self.write_field(self.format.presence, presence.tag());
        self.write_field(self.format.length, length as u64);
        self.write_field(self.format.address, address);
    }

    pub fn write_null(&mut self) {
        self.write_field(self.format.presence, Presence::Null.tag());
    }

    /// Output-only pointer: framing without contents
    pub fn write_no_data(&mut self, address: u64, declared_length: usize) {
        self.write_pointer_header(Presence::PresentNoData, declared_length, address);
    }

    /// Pointer to `values`
    pub fn write_array<T: Value>(&mut self, address: u64, values: &[T]) {
        self.write_pointer_header(Presence::PresentWithData, values.len(), address);
        for &value in values {
            self.write_value(value);
        }
    }

    /// Pointer to `length` elements written by `write_elements`
    pub fn write_pointer<F>(&mut self, address: u64, length: usize, write_elements: F)
    where
        F: FnOnce(&mut Self),
    {
        self.write_pointer_header(Presence::PresentWithData, length, address);
        write_elements(self);
    }

    /// NUL-terminated string; the length counts the terminator
    pub fn write_string(&mut self, address: u64, text: &str) {
        self.write_pointer_header(Presence::PresentWithData, text.len() + 1, address);
        self.buffer.extend_from_slice(text.as_bytes());
        self.buffer.push(0);
    }

    /// Array of strings, each string placed after the previous one
    pub fn write_string_array(&mut self, address: u64, strings: &[&str]) {
        self.write_pointer_header(Presence::PresentWithData, strings.len(), address);
        let mut string_address = address + 8 * strings.len() as u64;
        for text in strings {
            self.write_string(string_address, text);
            string_address += text.len() as u64 + 1;
        }
    }

    pub fn write_handle(&mut self, id: u64) {
        self.write_field(self.format.handle, id);
    }

    pub fn write_handles(&mut self, address: u64, ids: &[u64]) {
        self.write_pointer_header(Presence::PresentWithData, ids.len(), address);
        for &id in ids {
            self.write_handle(id);
        }
    }

    /// Extension node whose body is written by `write_body`
    pub fn write_extension<F>(&mut self, tag: u32, write_body: F)
    where
        F: FnOnce(&mut Self),
    {
        let mut body = Self::new(self.format);
        write_body(&mut body);
        self.write_raw_extension(tag, &body.buffer);
    }

    pub fn write_raw_extension(&mut self, tag: u32, body: &[u8]) {
        self.write_field(self.format.tag, u64::from(tag));
        self.write_field(self.format.length, body.len() as u64);
        self.buffer.extend_from_slice(body);
    }

    pub fn end_chain(&mut self) {
        self.write_field(self.format.tag, u64::from(self.format.chain_terminator));
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Writer for a complete trace: header, then call entries
pub struct TraceWriter<W: Write> {
    writer: W,
    header: FileHeader,
}

impl<W: Write> TraceWriter<W> {
    /// Write the file header and return the writer
    pub fn new(mut writer: W, header: FileHeader) -> io::Result<Self> {
        header.write(&mut writer)?;
        Ok(Self { writer, header })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Append one call entry, compressing the arguments when the header says so
    pub fn push_call(&mut self, call_id: u64, thread_id: u64, arguments: &[u8]) -> io::Result<()> {
        let format = self.header.format;
        let compressed;
        let payload = if self.header.is_compressed() {
            compressed = compress_prepend_size(arguments);
            compressed.as_slice()
        } else {
            arguments
        };

        if payload.len() as u64 > format.call_length.max_value() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "call {call_id} arguments ({} bytes) exceed the call length width",
                    payload.len()
                ),
            ));
        }

        self.write_field(format.call_id, call_id)?;
        self.write_field(format.thread_id, thread_id)?;
        self.write_field(format.call_length, payload.len() as u64)?;
        self.writer.write_all(payload)
    }

    fn write_field(&mut self, width: FieldWidth, value: u64) -> io::Result<()> {
        self.writer
            .write_uint::<LittleEndian>(value & width.max_value(), width.bytes())
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
