//! Per-call decode state threaded through every decoder

use std::time::Duration;

use tracing::{debug, warn};

use crate::DEFAULT_MAX_NESTING_DEPTH;
use crate::config::DecodeConfig;
use crate::error::{DecodeError, Diagnostic, ErrorKind};
use crate::format::WireFormat;
use crate::handle::{DecodedHandle, HandleId, HandleType, LiveHandle, Resolved};
use crate::registry::ExtensionRegistry;
use crate::remap::HandleRemapContext;

/// State for decoding one call entry
///
/// Borrows the session-wide registry and remap context, and owns the
/// per-call nesting depth and diagnostics. One context per call; never
/// shared across threads.
#[derive(Debug)]
pub struct DecodeContext<'a> {
    format: WireFormat,
    registry: &'a ExtensionRegistry,
    remap: &'a HandleRemapContext,
    depth: usize,
    max_depth: usize,
    handle_wait: Option<Duration>,
    quiet_unmapped: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(
        format: WireFormat,
        registry: &'a ExtensionRegistry,
        remap: &'a HandleRemapContext,
    ) -> Self {
        Self {
            format,
            registry,
            remap,
            depth: 0,
            max_depth: DEFAULT_MAX_NESTING_DEPTH,
            handle_wait: None,
            quiet_unmapped: false,
            diagnostics: Vec::new(),
        }
    }

    /// Apply limits and handle-resolution policy from configuration
    pub fn with_config(mut self, config: &DecodeConfig) -> Self {
        self.max_depth = config.max_nesting_depth;
        self.handle_wait = config.handle_wait();
        self.quiet_unmapped = config.quiet_unmapped_handles;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Wait up to `timeout` for unmapped handles to be inserted
    pub fn with_handle_wait(mut self, timeout: Duration) -> Self {
        self.handle_wait = Some(timeout);
        self
    }

    pub fn format(&self) -> &WireFormat {
        &self.format
    }

    pub fn registry(&self) -> &'a ExtensionRegistry {
        self.registry
    }

    pub fn remap(&self) -> &'a HandleRemapContext {
        self.remap
    }

    /// Current nesting depth (0 at the call's top level)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Run `f` one nesting level deeper
    ///
    /// Fails with [`DecodeError::DepthLimit`] instead of recursing past the
    /// configured maximum.
    pub fn nested<T, E>(
        &mut self,
        offset: usize,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DecodeError>,
    {
        if self.depth >= self.max_depth {
            return Err(DecodeError::DepthLimit {
                offset,
                limit: self.max_depth,
            }
            .into());
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Record a recoverable condition
    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            ErrorKind::UnmappedHandle if !self.quiet_unmapped => {
                warn!(offset = diagnostic.offset, "{}", diagnostic.detail)
            }
            _ => debug!(
                kind = %diagnostic.kind,
                offset = diagnostic.offset,
                "{}",
                diagnostic.detail
            ),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn diagnostic_mark(&self) -> usize {
        self.diagnostics.len()
    }

    /// Drop diagnostics raised after `mark` (by a node that was discarded)
    pub(crate) fn rewind_diagnostics(&mut self, mark: usize) {
        self.diagnostics.truncate(mark);
    }

    /// Translate a captured handle id into its live handle
    ///
    /// Never fails: an unmapped id yields [`Resolved::Unresolved`] and one
    /// `UnmappedHandle` diagnostic.
    pub fn resolve_handle(
        &mut self,
        handle_type: HandleType,
        captured_id: HandleId,
        offset: usize,
    ) -> DecodedHandle {
        if captured_id.is_null() {
            return DecodedHandle {
                captured_id,
                handle_type,
                resolved: Resolved::Live(LiveHandle::NULL),
            };
        }

        let found = match self.handle_wait {
            Some(timeout) => self.remap.wait_for(handle_type, captured_id, timeout),
            None => self.remap.resolve(handle_type, captured_id),
        };

        let resolved = match found {
            Some(live) => Resolved::Live(live),
            None => {
                self.report(Diagnostic::new(
                    ErrorKind::UnmappedHandle,
                    offset,
                    format!(
                        "captured handle {:#x} of type {} has no live mapping",
                        captured_id.0, handle_type.0
                    ),
                ));
                Resolved::Unresolved
            }
        };

        DecodedHandle {
            captured_id,
            handle_type,
            resolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_depth_limit() {
        let registry = ExtensionRegistry::empty();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(WireFormat::default(), &registry, &remap).with_max_depth(2);

        let result: Result<usize, DecodeError> =
            ctx.nested(0, |ctx| ctx.nested(1, |ctx| Ok(ctx.depth())));
        assert_eq!(result, Ok(2));
        assert_eq!(ctx.depth(), 0);

        let result: Result<(), DecodeError> =
            ctx.nested(0, |ctx| ctx.nested(1, |ctx| ctx.nested(7, |_| Ok(()))));
        assert_eq!(result, Err(DecodeError::DepthLimit { offset: 7, limit: 2 }));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_null_handle_resolves_without_diagnostic() {
        let registry = ExtensionRegistry::empty();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(WireFormat::default(), &registry, &remap);

        let handle = ctx.resolve_handle(HandleType(1), HandleId::NULL, 0);
        assert_eq!(handle.resolved, Resolved::Live(LiveHandle::NULL));
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_unmapped_handle_reports_once() {
        let registry = ExtensionRegistry::empty();
        let remap = HandleRemapContext::new();
        let mut ctx = DecodeContext::new(WireFormat::default(), &registry, &remap);

        let handle = ctx.resolve_handle(HandleType(1), HandleId(0x42), 16);
        assert_eq!(handle.resolved, Resolved::Unresolved);
        assert_eq!(ctx.diagnostics().len(), 1);
        assert_eq!(ctx.diagnostics()[0].kind, ErrorKind::UnmappedHandle);
        assert_eq!(ctx.diagnostics()[0].offset, 16);

        let taken = ctx.take_diagnostics();
        assert_eq!(taken.len(), 1);
        assert!(ctx.diagnostics().is_empty());
    }
}
