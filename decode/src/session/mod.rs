//! Replay session: drives call decoding and dispatch over a trace
//!
//! Decoding a call never depends on how the previous call went. A fatal
//! error skips the rest of that call's argument bytes and replay resumes at
//! the next call boundary.

mod report;


pub use report::{CallDiagnostic, CallFailure, ReplayReport, ReportSummary};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::DecodeConfig;
use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Diagnostic};
use crate::format::WireFormat;
use crate::registry::ExtensionRegistry;
use crate::remap::HandleRemapContext;
use crate::stream::{CallEntry, CallStream};

/// Consumer of decoded calls
///
/// `decode_call` is the generated per-call argument decoder; `dispatch`
/// executes the call and must insert every handle it creates into `remap`
/// before returning.
pub trait CallConsumer {
    type Args;

    fn decode_call(
        &mut self,
        call: &CallEntry<'_>,
        arguments: &mut ByteCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<Self::Args, DecodeError>;

    fn dispatch(&mut self, call: &CallEntry<'_>, args: Self::Args, remap: &HandleRemapContext);
}

/// Decode result for one call entry
#[derive(Debug)]
pub struct DecodedCall<T> {
    pub call_id: u64,
    pub thread_id: u64,
    /// Offset of the call header in the trace
    pub stream_offset: usize,
    pub result: Result<T, DecodeError>,
    pub diagnostics: Vec<Diagnostic>,
}

/// State shared by every call of one replay
///
/// Owns the handle remap context; several sessions can run side by side
/// with the same registry.
#[derive(Debug)]
pub struct ReplaySession<'r> {
    remap: HandleRemapContext,
    registry: &'r ExtensionRegistry,
    config: DecodeConfig,
}

impl<'r> ReplaySession<'r> {
    pub fn new(registry: &'r ExtensionRegistry, config: DecodeConfig) -> Self {
        Self {
            remap: HandleRemapContext::new(),
            registry,
            config,
        }
    }

    pub fn remap(&self) -> &HandleRemapContext {
        &self.remap
    }

    pub fn registry(&self) -> &'r ExtensionRegistry {
        self.registry
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Fresh decode context for one call
    pub fn context(&self, format: WireFormat) -> DecodeContext<'_> {
        DecodeContext::new(format, self.registry, &self.remap).with_config(&self.config)
    }

    /// Decode one call entry's arguments with `decode`
    pub fn decode_entry<T, F>(
        &self,
        entry: &CallEntry<'_>,
        format: WireFormat,
        decode: F,
    ) -> DecodedCall<T>
    where
        F: FnOnce(&mut ByteCursor<'_>, &mut DecodeContext<'_>) -> Result<T, DecodeError>,
    {
        let mut ctx = self.context(format);
        let result = entry.arguments().and_then(|arguments| {
            let mut cursor = ByteCursor::new(&arguments);
            let args = decode(&mut cursor, &mut ctx)?;
            if !cursor.is_empty() {
                debug!(
                    call_id = entry.call_id,
                    trailing = cursor.remaining(),
                    "call arguments not fully consumed"
                );
            }
            Ok(args)
        });

        DecodedCall {
            call_id: entry.call_id,
            thread_id: entry.thread_id,
            stream_offset: entry.offset,
            result,
            diagnostics: ctx.take_diagnostics(),
        }
    }

    /// Decode and dispatch every call of `stream` in capture order
    pub fn run<C: CallConsumer>(&self, stream: CallStream<'_>, consumer: &mut C) -> ReplayReport {
        let format = stream.header().format;
        let mut report = ReplayReport::new();

        for item in stream {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("trace framing error, stopping: {e}");
                    report.stream_error = Some(e.to_string());
                    break;
                }
            };
            report.calls_total += 1;

            let decoded = self.decode_entry(&entry, format, |cursor, ctx| {
                consumer.decode_call(&entry, cursor, ctx)
            });
            report.record_diagnostics(entry.call_id, decoded.diagnostics);

            match decoded.result {
                Ok(args) => {
                    consumer.dispatch(&entry, args, &self.remap);
                    report.calls_dispatched += 1;
                }
                Err(e) => {
                    warn!(
                        call_id = entry.call_id,
                        offset = entry.offset,
                        "skipping call: {e}"
                    );
                    report.calls_skipped += 1;
                    report.failures.push(CallFailure {
                        call_id: entry.call_id,
                        thread_id: entry.thread_id,
                        stream_offset: entry.offset,
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                    if self.config.stop_on_fatal {
                        report.stopped_early = true;
                        break;
                    }
                }
            }
        }

        report.finish();
        info!(
            calls = report.calls_total,
            dispatched = report.calls_dispatched,
            skipped = report.calls_skipped,
            status = %report.summary.status,
            "replay finished"
        );
        report
    }

    /// Decode a batch of call entries on the rayon pool
    ///
    /// Each entry gets its own cursor and context; results come back in
    /// the order of `entries`. Handles created by calls in the batch are only
    /// resolved if the dispatcher inserts them while decoding runs and
    /// `handle_wait_ms` gives the workers time to wait for them.
    pub fn decode_parallel<T, F>(
        &self,
        entries: &[CallEntry<'_>],
        format: WireFormat,
        decode: F,
    ) -> Vec<DecodedCall<T>>
    where
        T: Send,
        F: Fn(&CallEntry<'_>, &mut ByteCursor<'_>, &mut DecodeContext<'_>) -> Result<T, DecodeError>
            + Sync,
    {
        entries
            .par_iter()
            .map(|entry| self.decode_entry(entry, format, |cursor, ctx| decode(entry, cursor, ctx)))
            .collect()
    }
}
