//! Error and diagnostic types for call decoding
//!
//! Fatal conditions are [`DecodeError`]s and abort the current call entry.
//! Recoverable conditions are recorded as [`Diagnostic`]s on the decode
//! context and decoding carries on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification shared by fatal errors and recoverable diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Fewer bytes remain than a field or element requires
    BufferUnderrun,
    /// Framing values that cannot be valid (bad presence tag, depth limit, ...)
    Malformed,
    /// Captured handle id absent from the remap context
    UnmappedHandle,
    /// Extension tag not present in the registry
    UnknownExtension,
    /// Extension node decoder disagreed with the node's declared length
    TypeMismatch,
}

impl ErrorKind {
    /// Whether this kind aborts the current call entry
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::BufferUnderrun | Self::Malformed)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BufferUnderrun => "buffer underrun",
            Self::Malformed => "malformed data",
            Self::UnmappedHandle => "unmapped handle",
            Self::UnknownExtension => "unknown extension",
            Self::TypeMismatch => "type mismatch",
        };
        f.write_str(name)
    }
}

/// Fatal decode error for one call entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer underrun at offset {offset}: needed {needed} bytes, {available} available")]
    BufferUnderrun {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid pointer presence tag {value} at offset {offset}")]
    InvalidPresence { offset: usize, value: u64 },

    #[error("extension tag {value:#x} at offset {offset} does not fit in 32 bits")]
    InvalidTag { offset: usize, value: u64 },

    #[error("length {value} at offset {offset} does not fit in memory")]
    LengthOverflow { offset: usize, value: u64 },

    #[error("nesting depth limit {limit} exceeded at offset {offset}")]
    DepthLimit { offset: usize, limit: usize },

    #[error("call block decompression failed: {0}")]
    Decompression(String),
}

impl DecodeError {
    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BufferUnderrun { .. } => ErrorKind::BufferUnderrun,
            _ => ErrorKind::Malformed,
        }
    }

    /// Absolute offset in the argument buffer, when known
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::BufferUnderrun { offset, .. }
            | Self::InvalidPresence { offset, .. }
            | Self::InvalidTag { offset, .. }
            | Self::LengthOverflow { offset, .. }
            | Self::DepthLimit { offset, .. } => Some(*offset),
            Self::Decompression(_) => None,
        }
    }
}

/// A recoverable condition encountered while decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    /// Absolute offset in the argument buffer
    pub offset: usize,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, offset: usize, detail: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}: {}", self.kind, self.offset, self.detail)
    }
}

/// A composite decode that stopped on a fatal error
///
/// `partial` holds everything decoded before the failing member. Converts
/// into the underlying [`DecodeError`] so `?` works in decode functions.
#[derive(Debug)]
pub struct PartialDecode<T> {
    pub partial: T,
    pub error: DecodeError,
}

impl<T> PartialDecode<T> {
    pub fn new(partial: T, error: DecodeError) -> Self {
        Self { partial, error }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PartialDecode<U> {
        PartialDecode {
            partial: f(self.partial),
            error: self.error,
        }
    }
}

impl<T> From<PartialDecode<T>> for DecodeError {
    fn from(partial: PartialDecode<T>) -> Self {
        partial.error
    }
}

impl<T> fmt::Display for PartialDecode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partial decode: {}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for PartialDecode<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Framing errors at the call-stream level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("invalid magic bytes {0:?} (expected 'GFXT')")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid width {value} for field '{field}' (must be 1, 2, 4 or 8)")]
    InvalidWidth { field: &'static str, value: u8 },

    #[error("chain terminator {terminator:#x} does not fit in a {width}-byte tag")]
    InvalidTerminator { terminator: u32, width: usize },

    #[error("file header truncated")]
    TruncatedHeader,

    #[error("call header truncated at offset {offset}")]
    TruncatedCallHeader { offset: usize },

    #[error(
        "call {call_id} at offset {offset} declares {declared} argument bytes, {available} available"
    )]
    TruncatedCall {
        offset: usize,
        call_id: u64,
        declared: u64,
        available: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::BufferUnderrun.is_fatal());
        assert!(ErrorKind::Malformed.is_fatal());
        assert!(!ErrorKind::UnmappedHandle.is_fatal());
        assert!(!ErrorKind::UnknownExtension.is_fatal());
        assert!(!ErrorKind::TypeMismatch.is_fatal());
    }

    #[test]
    fn test_decode_error_kind_and_offset() {
        let err = DecodeError::BufferUnderrun {
            offset: 12,
            needed: 4,
            available: 1,
        };
        assert_eq!(err.kind(), ErrorKind::BufferUnderrun);
        assert_eq!(err.offset(), Some(12));

        let err = DecodeError::DepthLimit {
            offset: 3,
            limit: 64,
        };
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(DecodeError::Decompression("x".into()).offset(), None);
    }

    #[test]
    fn test_partial_decode_converts() {
        fn inner() -> Result<(), PartialDecode<Vec<u32>>> {
            Err(PartialDecode::new(
                vec![1, 2],
                DecodeError::InvalidPresence {
                    offset: 0,
                    value: 9,
                },
            ))
        }
        fn outer() -> Result<(), DecodeError> {
            inner()?;
            Ok(())
        }
        assert_eq!(
            outer(),
            Err(DecodeError::InvalidPresence {
                offset: 0,
                value: 9
            })
        );
    }
}
