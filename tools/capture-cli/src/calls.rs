//! Calls command - list call entries

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::trace;

/// Arguments for the calls command
#[derive(Args)]
pub struct CallsArgs {
    /// Trace file to list
    pub trace: PathBuf,

    /// Stop after this many calls
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Only list calls recorded on this thread
    #[arg(long)]
    pub thread: Option<u64>,
}

/// Execute the calls command
pub fn execute(args: CallsArgs) -> Result<()> {
    let bytes = trace::read(&args.trace)?;
    let stream = trace::open(&args.trace, &bytes)?;
    let limit = args.limit.unwrap_or(usize::MAX);

    println!(
        "{:>10}  {:>10}  {:>8}  {:>8}  flags",
        "offset", "call", "thread", "bytes"
    );

    let mut listed = 0;
    for entry in stream {
        if listed >= limit {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => anyhow::bail!("Trace framing error: {e}"),
        };
        if args.thread.is_some_and(|thread| thread != entry.thread_id) {
            continue;
        }

        println!(
            "{:>10}  {:>10}  {:>8}  {:>8}  {}",
            entry.offset,
            entry.call_id,
            entry.thread_id,
            entry.payload.len(),
            if entry.compressed { "lz4" } else { "-" }
        );
        listed += 1;
    }

    Ok(())
}
