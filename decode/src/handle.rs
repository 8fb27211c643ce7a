//! Handle identifiers and the handle pointer decoder

use serde::{Deserialize, Serialize};

use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::DecodeError;
use crate::pointer::DecodedPointer;

/// API object type of a handle (e.g. buffer, image, device)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleType(pub u32);

/// Handle identifier as recorded at capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl HandleId {
    /// The API's null handle
    pub const NULL: HandleId = HandleId(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Handle value in the live replay implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LiveHandle(pub u64);

impl LiveHandle {
    pub const NULL: LiveHandle = LiveHandle(0);
}

/// Outcome of looking a captured handle up in the remap context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolved {
    Live(LiveHandle),
    /// No mapping existed when the handle was decoded
    Unresolved,
}

/// A decoded handle argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedHandle {
    pub captured_id: HandleId,
    pub handle_type: HandleType,
    pub resolved: Resolved,
}

impl DecodedHandle {
    pub fn live(&self) -> Option<LiveHandle> {
        match self.resolved {
            Resolved::Live(handle) => Some(handle),
            Resolved::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.resolved, Resolved::Live(_))
    }
}

/// Decode a handle passed by value
pub fn decode_handle(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
    handle_type: HandleType,
) -> Result<DecodedHandle, DecodeError> {
    let offset = cursor.position();
    let raw = cursor.read_field(ctx.format().handle)?;
    Ok(ctx.resolve_handle(handle_type, HandleId(raw), offset))
}

/// Decode a pointer to one or more handles of `handle_type`
///
/// Only framing can fail. Every unmapped id becomes [`Resolved::Unresolved`]
/// with one diagnostic per occurrence.
pub fn decode_handle_pointer(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
    handle_type: HandleType,
) -> Result<DecodedPointer<DecodedHandle>, DecodeError> {
    let width = ctx.format().handle.bytes();
    DecodedPointer::decode_with(cursor, ctx, width, |cursor, ctx| {
        decode_handle(cursor, ctx, handle_type)
    })
}

/// Decode a handle the call creates
///
/// Output handles have no live mapping until the call is dispatched, so the
/// captured id is returned without consulting the remap context.
pub fn decode_handle_id(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<HandleId, DecodeError> {
    Ok(HandleId(cursor.read_field(ctx.format().handle)?))
}

/// Decode a pointer to handles the call creates (e.g. an array of new buffers)
pub fn decode_output_handle_pointer(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<DecodedPointer<HandleId>, DecodeError> {
    let width = ctx.format().handle.bytes();
    DecodedPointer::decode_with(cursor, ctx, width, decode_handle_id)
}
