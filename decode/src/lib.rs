//! Capture Decode - decode runtime for captured graphics API call streams
//!
//! Reconstructs the arguments of recorded API calls (pointers, arrays,
//! strings, handles, nested structures and extension chains) from a flat
//! byte stream so they can be replayed against a live implementation.
//!
//! # Architecture
//!
//! - [`CallStream`] - Splits a trace into self-delimited [`CallEntry`]s
//! - [`DecodeContext`] - Per-call state: wire format, nesting depth, diagnostics
//! - [`Decode`] - Implemented by every decodable type; generated per-type
//!   decoders compose the leaf decoders below
//! - [`DecodedPointer`], [`DecodedString`], [`DecodedHandle`] - Leaf decoders
//! - [`StructPointerDecoder`] - Pointers to composite types
//! - [`ExtensionChain`] + [`ExtensionRegistry`] - Tagged extension chains
//! - [`HandleRemapContext`] - Captured to live handle translation, per session
//! - [`ReplaySession`] - Skip-on-error replay loop and parallel decode

pub mod chain;
pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod format;
pub mod handle;
pub mod pointer;
pub mod registry;
pub mod remap;
pub mod session;
pub mod settings;
pub mod stream;
pub mod string;
pub mod structs;
pub mod value;
pub mod writer;

/// Default limit on nested pointers, structures and extension nodes
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

pub use chain::{ExtensionChain, ExtensionNode};
pub use config::DecodeConfig;
pub use context::DecodeContext;
pub use cursor::ByteCursor;
pub use error::{DecodeError, Diagnostic, ErrorKind, PartialDecode, StreamError};
pub use format::{FieldWidth, FileHeader, FormatFlags, WireFormat};
pub use handle::{
    DecodedHandle, HandleId, HandleType, LiveHandle, Resolved, decode_handle, decode_handle_id,
    decode_handle_pointer, decode_output_handle_pointer,
};
pub use pointer::{DecodedPointer, PointerHeader, Presence};
pub use registry::{ExtensionRegistration, ExtensionRegistry, ExtensionStruct, register};
pub use remap::{HandleRemapContext, RemapError};
pub use session::{CallConsumer, DecodedCall, ReplayReport, ReplaySession};
pub use stream::{CallEntry, CallStream};
pub use string::{DecodedString, StringArray, decode_string, decode_string_array};
pub use structs::{StructPointerDecoder, decode_struct_pointer};
pub use value::{Decode, Value, decode_value};
pub use writer::{ArgumentWriter, TraceWriter};
