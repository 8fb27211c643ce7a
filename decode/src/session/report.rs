//! Replay report types and serialization

use crate::error::{Diagnostic, ErrorKind};

/// Outcome of replaying one trace
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ReplayReport {
    /// Report format version
    #[serde(default = "default_version")]
    pub version: String,
    /// Call entries framed from the stream
    pub calls_total: u64,
    /// Calls decoded and handed to the dispatcher
    pub calls_dispatched: u64,
    /// Calls skipped after a fatal decode error
    pub calls_skipped: u64,
    /// One entry per skipped call
    pub failures: Vec<CallFailure>,
    /// Recoverable conditions, in stream order
    pub diagnostics: Vec<CallDiagnostic>,
    /// Framing error that ended the stream early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_error: Option<String>,
    /// Replay stopped at the first failure (`stop_on_fatal`)
    #[serde(default)]
    pub stopped_early: bool,
    /// Summary statistics
    pub summary: ReportSummary,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A call that was skipped
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallFailure {
    pub call_id: u64,
    pub thread_id: u64,
    /// Offset of the call header in the trace
    pub stream_offset: usize,
    pub kind: ErrorKind,
    pub error: String,
}

/// A recoverable condition raised while decoding a call
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallDiagnostic {
    pub call_id: u64,
    pub kind: ErrorKind,
    /// Offset within the call's argument bytes
    pub offset: usize,
    pub detail: String,
}

/// Report summary
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ReportSummary {
    pub unmapped_handles: usize,
    pub unknown_extensions: usize,
    pub type_mismatches: usize,
    /// "ok", "degraded" (diagnostics only) or "failed"
    pub status: String,
}

impl ReplayReport {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Self::default()
        }
    }

    pub(crate) fn record_diagnostics(&mut self, call_id: u64, diagnostics: Vec<Diagnostic>) {
        for diagnostic in diagnostics {
            match diagnostic.kind {
                ErrorKind::UnmappedHandle => self.summary.unmapped_handles += 1,
                ErrorKind::UnknownExtension => self.summary.unknown_extensions += 1,
                ErrorKind::TypeMismatch => self.summary.type_mismatches += 1,
                ErrorKind::BufferUnderrun | ErrorKind::Malformed => {}
            }
            self.diagnostics.push(CallDiagnostic {
                call_id,
                kind: diagnostic.kind,
                offset: diagnostic.offset,
                detail: diagnostic.detail,
            });
        }
    }

    pub(crate) fn finish(&mut self) {
        self.summary.status = if !self.failures.is_empty() || self.stream_error.is_some() {
            "failed"
        } else if !self.diagnostics.is_empty() {
            "degraded"
        } else {
            "ok"
        }
        .to_string();
    }

    /// Whether every call was framed and decoded without a fatal error
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.stream_error.is_none()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
