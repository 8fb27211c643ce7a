//! Trace file loading shared by the commands

use std::path::Path;

use anyhow::{Context, Result};
use capture_decode::CallStream;

/// Read a whole trace file into memory
pub fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read trace: {}", path.display()))
}

/// Validate the header and open a call stream over `bytes`
pub fn open<'a>(path: &Path, bytes: &'a [u8]) -> Result<CallStream<'a>> {
    CallStream::new(bytes).with_context(|| format!("Not a valid trace: {}", path.display()))
}
