//! Struct pointer decoder
//!
//! Composite types are decoded by per-type functions (generated in a real
//! deployment) that call the leaf decoders for each member in wire order.
//! This module owns the pointer framing around them and hands back whatever
//! was decoded before a fatal error.

use std::fmt;

use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, PartialDecode};
use crate::pointer::DecodedPointer;
use crate::value::Decode;

/// Uniform signature of a per-type structure decode function
pub type StructDecodeFn<T> =
    fn(&mut ByteCursor<'_>, &mut DecodeContext<'_>) -> Result<T, DecodeError>;

/// Result of a struct pointer decode; the error side keeps the elements
/// decoded before the failure
pub type StructPointerResult<T> = Result<DecodedPointer<T>, PartialDecode<DecodedPointer<T>>>;

/// Decodes pointers to arrays of `T` through a per-type decode function
pub struct StructPointerDecoder<T> {
    decode_struct: StructDecodeFn<T>,
    min_wire_size: usize,
}

impl<T> fmt::Debug for StructPointerDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructPointerDecoder")
            .field("type", &std::any::type_name::<T>())
            .field("min_wire_size", &self.min_wire_size)
            .finish()
    }
}

impl<T> StructPointerDecoder<T> {
    /// `min_wire_size` is the smallest encoding of one `T`, used to reject
    /// lengths that cannot fit before any element is decoded
    pub fn new(decode_struct: StructDecodeFn<T>, min_wire_size: usize) -> Self {
        Self {
            decode_struct,
            min_wire_size,
        }
    }

    pub fn decode(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> StructPointerResult<T> {
        DecodedPointer::decode_partial_with(cursor, ctx, self.min_wire_size, self.decode_struct)
    }

    /// Decode at `offset` in `buffer`, returning the pointer and bytes consumed
    pub fn decode_at(
        &self,
        buffer: &[u8],
        offset: usize,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<(DecodedPointer<T>, usize), PartialDecode<DecodedPointer<T>>> {
        let mut cursor = ByteCursor::at(buffer, offset)
            .map_err(|error| PartialDecode::new(DecodedPointer::null(), error))?;
        let pointer = self.decode(&mut cursor, ctx)?;
        Ok((pointer, cursor.position() - offset))
    }
}

impl<T: Decode> StructPointerDecoder<T> {
    /// Decoder driven by `T`'s [`Decode`] impl
    pub fn for_type() -> Self {
        Self::new(T::decode, T::MIN_WIRE_SIZE)
    }
}

/// Decode a pointer to structures of type `T`
pub fn decode_struct_pointer<T: Decode>(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> StructPointerResult<T> {
    StructPointerDecoder::<T>::for_type().decode(cursor, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ExtensionChain;
    use crate::error::ErrorKind;
    use crate::format::WireFormat;
    use crate::handle::{DecodedHandle, HandleId, HandleType, LiveHandle, decode_handle};
    use crate::pointer::Presence;
    use crate::registry::{ExtensionRegistry, register};
    use crate::remap::HandleRemapContext;
    use crate::string::{DecodedString, decode_string};
    use crate::writer::ArgumentWriter;

    const QUEUE: HandleType = HandleType(4);
    const PRIORITY_TAG: u32 = 77;

    #[derive(Debug, PartialEq)]
    struct QueuePriority(f32);

    impl Decode for QueuePriority {
        fn decode(
            cursor: &mut ByteCursor<'_>,
            _ctx: &mut DecodeContext<'_>,
        ) -> Result<Self, DecodeError> {
            Ok(Self(cursor.read_value()?))
        }
    }

    #[derive(Debug)]
    struct QueueInfo {
        next: ExtensionChain,
        family: u32,
        label: DecodedString,
        queue: DecodedHandle,
        priorities: DecodedPointer<f32>,
    }

    impl Decode for QueueInfo {
        const MIN_WIRE_SIZE: usize = 4 + 4 + 4 + 8 + 4;

        fn decode(
            cursor: &mut ByteCursor<'_>,
            ctx: &mut DecodeContext<'_>,
        ) -> Result<Self, DecodeError> {
            Ok(Self {
                next: ExtensionChain::decode(cursor, ctx)?,
                family: cursor.read_u32()?,
                label: decode_string(cursor, ctx)?,
                queue: decode_handle(cursor, ctx, QUEUE)?,
                priorities: DecodedPointer::decode(cursor, ctx)?,
            })
        }
    }

    fn write_info(writer: &mut ArgumentWriter, family: u32, label: &str, queue: u64) {
        writer.write_extension(PRIORITY_TAG, |w| w.write_value(0.5f32));
        writer.end_chain();
        writer.write_value(family);
        writer.write_string(0x9000 + u64::from(family), label);
        writer.write_handle(queue);
        writer.write_array(0xA000, &[1.0f32, 0.25]);
    }

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::new(&[register::<QueuePriority>(PRIORITY_TAG, "QueuePriority")])
            .unwrap()
    }

    #[test]
    fn test_struct_array() {
        let format = WireFormat::default();
        let mut writer = ArgumentWriter::new(format);
        writer.write_pointer(0x8000, 2, |w| {
            write_info(w, 0, "graphics", 0x51);
            write_info(w, 1, "transfer", 0x52);
        });
        let bytes = writer.into_bytes();

        let registry = registry();
        let remap = HandleRemapContext::new();
        remap.insert(QUEUE, HandleId(0x51), LiveHandle(0xF1)).unwrap();
        let mut ctx = DecodeContext::new(format, &registry, &remap);

        let (infos, consumed) = StructPointerDecoder::<QueueInfo>::for_type()
            .decode_at(&bytes, 0, &mut ctx)
            .unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(infos.capture_address(), Some(0x8000));
        assert_eq!(infos.len(), 2);

        let first = &infos.elements()[0];
        assert_eq!(first.family, 0);
        assert_eq!(first.label.as_str(), Ok("graphics"));
        assert_eq!(first.queue.live(), Some(LiveHandle(0xF1)));
        assert_eq!(first.priorities.elements(), &[1.0, 0.25]);
        assert_eq!(
            first.next.find_known::<QueuePriority>(),
            Some(&QueuePriority(0.5))
        );

        let second = &infos.elements()[1];
        assert_eq!(second.label.as_str(), Ok("transfer"));
        assert!(!second.queue.is_resolved());

        let kinds: Vec<ErrorKind> = ctx.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::UnmappedHandle]);
    }

    #[test]
    fn test_partial_on_truncation() {
        let format = WireFormat::default();
        let mut writer = ArgumentWriter::new(format);
        writer.write_pointer(0x8000, 3, |w| {
            write_info(w, 0, "a", 0);
            write_info(w, 1, "b", 0);
            write_info(w, 2, "c", 0);
        });
        let mut bytes = writer.into_bytes();
        bytes.truncate(bytes.len() - 5);

        let registry = registry();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(format, &registry, &remap);
        let partial = decode_struct_pointer::<QueueInfo>(&mut ByteCursor::new(&bytes), &mut ctx)
            .unwrap_err();

        assert_eq!(partial.error.kind(), ErrorKind::BufferUnderrun);
        assert_eq!(partial.partial.presence(), Presence::PresentWithData);
        assert_eq!(partial.partial.declared_length(), 3);
        let families: Vec<u32> = partial.partial.iter().map(|info| info.family).collect();
        assert_eq!(families, vec![0, 1]);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_null_and_output_only() {
        let format = WireFormat::default();
        let mut writer = ArgumentWriter::new(format);
        writer.write_null();
        writer.write_no_data(0x7000, 4);
        let bytes = writer.into_bytes();

        let registry = registry();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(format, &registry, &remap);
        let mut cursor = ByteCursor::new(&bytes);

        let null = decode_struct_pointer::<QueueInfo>(&mut cursor, &mut ctx).unwrap();
        assert!(null.is_null());

        let output = decode_struct_pointer::<QueueInfo>(&mut cursor, &mut ctx).unwrap();
        assert_eq!(output.presence(), Presence::PresentNoData);
        assert!(output.is_empty());
        assert_eq!(output.declared_length(), 4);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_custom_decode_fn() {
        fn decode_pair(
            cursor: &mut ByteCursor<'_>,
            _ctx: &mut DecodeContext<'_>,
        ) -> Result<(u16, u16), DecodeError> {
            Ok((cursor.read_u16()?, cursor.read_u16()?))
        }

        let format = WireFormat::default();
        let mut writer = ArgumentWriter::new(format);
        writer.write_pointer(0x10, 2, |w| {
            w.write_value(1u16);
            w.write_value(2u16);
            w.write_value(3u16);
            w.write_value(4u16);
        });
        let bytes = writer.into_bytes();

        let registry = ExtensionRegistry::empty();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(format, &registry, &remap);
        let pairs = StructPointerDecoder::new(decode_pair, 4)
            .decode(&mut ByteCursor::new(&bytes), &mut ctx)
            .unwrap();
        assert_eq!(pairs.elements(), &[(1, 2), (3, 4)]);
    }

    #[test]
    fn test_length_larger_than_buffer() {
        let format = WireFormat::default();
        let mut writer = ArgumentWriter::new(format);
        writer.write_pointer(0x10, 1_000_000, |w| write_info(w, 0, "x", 0));
        let bytes = writer.into_bytes();

        let registry = registry();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(format, &registry, &remap);
        let partial = decode_struct_pointer::<QueueInfo>(&mut ByteCursor::new(&bytes), &mut ctx)
            .unwrap_err();
        assert_eq!(partial.error.kind(), ErrorKind::BufferUnderrun);
        assert!(partial.partial.is_empty());
    }
}
