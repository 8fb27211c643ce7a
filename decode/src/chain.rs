//! Extension chain decoder
//!
//! An extension chain is a linear list of optional structures hanging off a
//! call argument, each identified by a numeric type tag:
//!
//! ```text
//! [tag][node_byte_length][node bytes] ... [terminator tag]
//! ```
//!
//! Registered tags decode to typed nodes. Unregistered tags are kept
//! verbatim so a decoder older than the trace can still pass the data
//! through. A registered node whose decoder disagrees with the declared
//! length is also kept verbatim.

use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Diagnostic, ErrorKind, PartialDecode};
use crate::registry::ExtensionStruct;

/// One node of an extension chain
#[derive(Debug)]
pub enum ExtensionNode {
    /// Decoded through the registry
    Known {
        tag: u32,
        node: Box<dyn ExtensionStruct>,
    },
    /// Raw node bytes, exactly as recorded
    Opaque { tag: u32, raw: Vec<u8> },
}

impl ExtensionNode {
    pub fn tag(&self) -> u32 {
        match self {
            Self::Known { tag, .. } | Self::Opaque { tag, .. } => *tag,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    /// The decoded structure, if this node is known and of type `T`
    pub fn downcast_ref<T: ExtensionStruct>(&self) -> Option<&T> {
        match self {
            Self::Known { node, .. } => {
                let node: &dyn ExtensionStruct = node.as_ref();
                node.as_any().downcast_ref::<T>()
            }
            Self::Opaque { .. } => None,
        }
    }

    /// Raw bytes of an opaque node
    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            Self::Opaque { raw, .. } => Some(raw),
            Self::Known { .. } => None,
        }
    }
}

/// Decoded extension chain, in wire order
#[derive(Debug, Default)]
pub struct ExtensionChain {
    nodes: Vec<ExtensionNode>,
}

impl ExtensionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode nodes until the terminator tag
    ///
    /// Running out of bytes is fatal for the chain; the nodes decoded so far
    /// are returned with the error.
    pub fn decode(
        cursor: &mut ByteCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<Self, PartialDecode<Self>> {
        let mut chain = Self::new();
        loop {
            match decode_next(cursor, ctx) {
                Ok(Some(node)) => chain.nodes.push(node),
                Ok(None) => return Ok(chain),
                Err(error) => return Err(PartialDecode::new(chain, error)),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ExtensionNode] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtensionNode> {
        self.nodes.iter()
    }

    /// First node with `tag`
    pub fn find(&self, tag: u32) -> Option<&ExtensionNode> {
        self.nodes.iter().find(|node| node.tag() == tag)
    }

    /// First known node of type `T`
    pub fn find_known<T: ExtensionStruct>(&self) -> Option<&T> {
        self.nodes.iter().find_map(|node| node.downcast_ref::<T>())
    }

    pub fn push(&mut self, node: ExtensionNode) {
        self.nodes.push(node);
    }

    pub fn into_nodes(self) -> Vec<ExtensionNode> {
        self.nodes
    }
}

impl<'c> IntoIterator for &'c ExtensionChain {
    type Item = &'c ExtensionNode;
    type IntoIter = std::slice::Iter<'c, ExtensionNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Read one node, or `None` at the terminator
fn decode_next(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<Option<ExtensionNode>, DecodeError> {
    let format = *ctx.format();
    let offset = cursor.position();
    let tag = cursor.read_field(format.tag)?;
    if tag == u64::from(format.chain_terminator) {
        return Ok(None);
    }
    let tag = u32::try_from(tag).map_err(|_| DecodeError::InvalidTag { offset, value: tag })?;

    let length = cursor.read_length(format.length)?;
    let body = cursor.split(length)?;
    decode_node(tag, body, ctx).map(Some)
}

fn decode_node(
    tag: u32,
    mut body: ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<ExtensionNode, DecodeError> {
    let start = body.position();
    let raw = body.peek_remaining();

    let Some(registration) = ctx.registry().get(tag).copied() else {
        ctx.report(Diagnostic::new(
            ErrorKind::UnknownExtension,
            start,
            format!("unregistered extension tag {tag}, {} bytes preserved", raw.len()),
        ));
        return Ok(ExtensionNode::Opaque {
            tag,
            raw: raw.to_vec(),
        });
    };

    let mark = ctx.diagnostic_mark();
    let result = ctx.nested(start, |ctx| (registration.decode)(&mut body, ctx));

    let detail = match result {
        Ok(node) if body.is_empty() => return Ok(ExtensionNode::Known { tag, node }),
        Ok(_) => format!(
            "{} decoder consumed {} of {} declared bytes",
            registration.name,
            raw.len() - body.remaining(),
            raw.len()
        ),
        // Depth exhaustion is a property of the whole call, not of this node
        Err(error @ DecodeError::DepthLimit { .. }) => return Err(error),
        Err(error) => format!("{} decoder failed inside declared length: {error}", registration.name),
    };

    ctx.rewind_diagnostics(mark);
    ctx.report(Diagnostic::new(ErrorKind::TypeMismatch, start, detail));
    Ok(ExtensionNode::Opaque {
        tag,
        raw: raw.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::WireFormat;
    use crate::handle::{HandleType, decode_handle};
    use crate::registry::{ExtensionRegistry, register};
    use crate::remap::HandleRemapContext;
    use crate::value::Decode;
    use crate::writer::ArgumentWriter;

    const PRIORITY_TAG: u32 = 1000174000;
    const NESTED_TAG: u32 = 1000174001;
    const HANDLE_TAG: u32 = 1000174002;

    #[derive(Debug, PartialEq)]
    struct GlobalPriority {
        priority: u32,
    }

    impl Decode for GlobalPriority {
        fn decode(
            cursor: &mut ByteCursor<'_>,
            _ctx: &mut DecodeContext<'_>,
        ) -> Result<Self, DecodeError> {
            Ok(Self {
                priority: cursor.read_u32()?,
            })
        }
    }

    #[derive(Debug)]
    struct Nested {
        inner: ExtensionChain,
    }

    impl Decode for Nested {
        fn decode(
            cursor: &mut ByteCursor<'_>,
            ctx: &mut DecodeContext<'_>,
        ) -> Result<Self, DecodeError> {
            Ok(Self {
                inner: ExtensionChain::decode(cursor, ctx)?,
            })
        }
    }

    #[derive(Debug)]
    struct WithHandle;

    impl Decode for WithHandle {
        fn decode(
            cursor: &mut ByteCursor<'_>,
            ctx: &mut DecodeContext<'_>,
        ) -> Result<Self, DecodeError> {
            decode_handle(cursor, ctx, HandleType(3))?;
            // Reads past the node to force a mismatch
            cursor.read_u64()?;
            Ok(Self)
        }
    }

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::new(&[
            register::<GlobalPriority>(PRIORITY_TAG, "GlobalPriority"),
            register::<Nested>(NESTED_TAG, "Nested"),
            register::<WithHandle>(HANDLE_TAG, "WithHandle"),
        ])
        .unwrap()
    }

    fn decode_with(
        registry: &ExtensionRegistry,
        bytes: &[u8],
    ) -> (Result<ExtensionChain, PartialDecode<ExtensionChain>>, Vec<Diagnostic>, usize) {
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(WireFormat::default(), registry, &remap);
        let mut cursor = ByteCursor::new(bytes);
        let result = ExtensionChain::decode(&mut cursor, &mut ctx);
        (result, ctx.take_diagnostics(), cursor.position())
    }

    #[test]
    fn test_unknown_node_preserved() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_raw_extension(100, &[1, 2, 3, 4, 5, 6, 7, 8]);
        writer.end_chain();
        let bytes = writer.into_bytes();

        let (result, diagnostics, consumed) = decode_with(&ExtensionRegistry::empty(), &bytes);
        let chain = result.unwrap();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain.nodes()[0].tag(), 100);
        assert_eq!(chain.nodes()[0].raw(), Some([1, 2, 3, 4, 5, 6, 7, 8].as_slice()));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::UnknownExtension);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_empty_chain() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.end_chain();
        let bytes = writer.into_bytes();

        let (result, diagnostics, consumed) = decode_with(&registry(), &bytes);
        assert!(result.unwrap().is_empty());
        assert!(diagnostics.is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_known_and_unknown_keep_order() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_raw_extension(7, &[0xAA]);
        writer.write_extension(PRIORITY_TAG, |w| w.write_value(512u32));
        writer.write_raw_extension(8, &[]);
        writer.end_chain();
        let bytes = writer.into_bytes();

        let (result, diagnostics, _) = decode_with(&registry(), &bytes);
        let chain = result.unwrap();

        let tags: Vec<u32> = chain.iter().map(ExtensionNode::tag).collect();
        assert_eq!(tags, vec![7, PRIORITY_TAG, 8]);
        assert_eq!(
            chain.find_known::<GlobalPriority>(),
            Some(&GlobalPriority { priority: 512 })
        );
        assert!(chain.find(PRIORITY_TAG).unwrap().is_known());
        assert_eq!(chain.find(8).unwrap().raw(), Some([].as_slice()));
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_length_mismatch_falls_back_to_opaque() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        // Declares 6 bytes where the decoder reads 4
        writer.write_raw_extension(PRIORITY_TAG, &[1, 0, 0, 0, 9, 9]);
        writer.write_extension(PRIORITY_TAG, |w| w.write_value(3u32));
        writer.end_chain();
        let bytes = writer.into_bytes();

        let (result, diagnostics, consumed) = decode_with(&registry(), &bytes);
        let chain = result.unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.nodes()[0].raw(), Some([1, 0, 0, 0, 9, 9].as_slice()));
        assert_eq!(
            chain.nodes()[1].downcast_ref::<GlobalPriority>(),
            Some(&GlobalPriority { priority: 3 })
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::TypeMismatch);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_overlong_decoder_is_contained() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_extension(HANDLE_TAG, |w| w.write_handle(0x77));
        writer.write_raw_extension(55, &[1]);
        writer.end_chain();
        let bytes = writer.into_bytes();

        let (result, diagnostics, _) = decode_with(&registry(), &bytes);
        let chain = result.unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.nodes()[0].raw(), Some(0x77u64.to_le_bytes().as_slice()));
        // The unmapped-handle diagnostic of the discarded node is dropped
        let kinds: Vec<ErrorKind> = diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::TypeMismatch, ErrorKind::UnknownExtension]);
    }

    #[test]
    fn test_truncated_chain_returns_partial() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_raw_extension(100, &[1, 2]);
        writer.write_raw_extension(101, &[3, 4, 5, 6]);
        writer.end_chain();
        let mut bytes = writer.into_bytes();
        bytes.truncate(bytes.len() - 6);

        let (result, _, consumed) = decode_with(&registry(), &bytes);
        let partial = result.unwrap_err();

        assert_eq!(partial.error.kind(), ErrorKind::BufferUnderrun);
        assert_eq!(partial.partial.len(), 1);
        assert_eq!(partial.partial.nodes()[0].tag(), 100);
        assert!(consumed <= bytes.len());
    }

    #[test]
    fn test_nested_chain() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_extension(NESTED_TAG, |w| {
            w.write_extension(PRIORITY_TAG, |w| w.write_value(1u32));
            w.end_chain();
        });
        writer.end_chain();
        let bytes = writer.into_bytes();

        let (result, diagnostics, _) = decode_with(&registry(), &bytes);
        let chain = result.unwrap();
        let nested = chain.find_known::<Nested>().unwrap();
        assert_eq!(
            nested.inner.find_known::<GlobalPriority>(),
            Some(&GlobalPriority { priority: 1 })
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_depth_limit_is_fatal() {
        let mut writer = ArgumentWriter::new(WireFormat::default());
        writer.write_extension(NESTED_TAG, |w| {
            w.write_extension(NESTED_TAG, |w| w.end_chain());
            w.end_chain();
        });
        writer.end_chain();
        let bytes = writer.into_bytes();

        let registry = registry();
        let remap = HandleRemapContext::new();
        let mut ctx =
            DecodeContext::new(WireFormat::default(), &registry, &remap).with_max_depth(1);
        let partial = ExtensionChain::decode(&mut ByteCursor::new(&bytes), &mut ctx).unwrap_err();
        assert!(matches!(partial.error, DecodeError::DepthLimit { limit: 1, .. }));
    }
}
