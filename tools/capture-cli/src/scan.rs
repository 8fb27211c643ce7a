//! Scan command - frame every call and check its payload
//!
//! Argument bytes are only decompressed, not decoded: decoding needs the
//! generated per-call decoders. A scan still catches framing damage and
//! corrupt compressed blocks.

use std::path::PathBuf;

use anyhow::{Context, Result};
use capture_decode::{CallEntry, CallStream};
use clap::Args;
use hashbrown::HashMap;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::trace;

/// Arguments for the scan command
#[derive(Args)]
pub struct ScanArgs {
    /// Trace file to scan
    pub trace: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Number of most frequent call ids to list
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

/// Scan results
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub calls: usize,
    pub compressed_calls: usize,
    /// Argument bytes after decompression
    pub argument_bytes: usize,
    pub threads: usize,
    /// Call ids by frequency, most frequent first
    pub call_counts: Vec<CallCount>,
    pub payload_errors: Vec<PayloadError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallCount {
    pub call_id: u64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadError {
    pub call_id: u64,
    pub offset: usize,
    pub error: String,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.payload_errors.is_empty() && self.stream_error.is_none()
    }
}

/// Execute the scan command
pub fn execute(args: ScanArgs) -> Result<()> {
    let bytes = trace::read(&args.trace)?;
    let stream = trace::open(&args.trace, &bytes)?;
    let report = scan(stream);

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        print_report(&args, &report);
    }

    if !report.is_clean() {
        anyhow::bail!("Trace has damaged calls");
    }
    Ok(())
}

/// Frame the whole stream, then check payloads in parallel
pub fn scan(stream: CallStream<'_>) -> ScanReport {
    let mut report = ScanReport::default();
    let mut entries: Vec<CallEntry<'_>> = Vec::new();
    for item in stream {
        match item {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!("trace framing error: {e}");
                report.stream_error = Some(e.to_string());
                break;
            }
        }
    }
    debug!(calls = entries.len(), "framed trace");

    let checked: Vec<Result<usize, PayloadError>> = entries
        .par_iter()
        .map(|entry| {
            entry
                .arguments()
                .map(|arguments| arguments.len())
                .map_err(|e| PayloadError {
                    call_id: entry.call_id,
                    offset: entry.offset,
                    error: e.to_string(),
                })
        })
        .collect();

    let mut counts: HashMap<u64, usize> = HashMap::new();
    let mut threads: HashMap<u64, usize> = HashMap::new();
    for (entry, result) in entries.iter().zip(checked) {
        *counts.entry(entry.call_id).or_default() += 1;
        *threads.entry(entry.thread_id).or_default() += 1;
        if entry.compressed {
            report.compressed_calls += 1;
        }
        match result {
            Ok(len) => report.argument_bytes += len,
            Err(e) => report.payload_errors.push(e),
        }
    }

    report.calls = entries.len();
    report.threads = threads.len();
    report.call_counts = counts
        .into_iter()
        .map(|(call_id, count)| CallCount { call_id, count })
        .collect();
    report
        .call_counts
        .sort_by(|a, b| b.count.cmp(&a.count).then(a.call_id.cmp(&b.call_id)));
    report
}

fn print_report(args: &ScanArgs, report: &ScanReport) {
    println!("=== Scan: {} ===", args.trace.display());
    println!("  Calls:           {}", report.calls);
    println!("  Compressed:      {}", report.compressed_calls);
    println!("  Argument bytes:  {}", report.argument_bytes);
    println!("  Threads:         {}", report.threads);

    if !report.call_counts.is_empty() {
        println!();
        println!("Most frequent calls:");
        for count in report.call_counts.iter().take(args.top) {
            println!("  {:>10}  x{}", count.call_id, count.count);
        }
    }

    if !report.payload_errors.is_empty() {
        println!();
        println!("Damaged calls:");
        for failure in &report.payload_errors {
            println!(
                "  call {} at offset {}: {}",
                failure.call_id, failure.offset, failure.error
            );
        }
    }

    if let Some(e) = &report.stream_error {
        println!();
        println!("Stream ends early: {e}");
    }
}
