//! Info command - print the trace header

use std::path::PathBuf;

use anyhow::Result;
use capture_decode::FieldWidth;
use clap::Args;

use crate::trace;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Trace file to inspect
    pub trace: PathBuf,
}

/// Execute the info command
pub fn execute(args: InfoArgs) -> Result<()> {
    let bytes = trace::read(&args.trace)?;
    let stream = trace::open(&args.trace, &bytes)?;
    let header = stream.header().clone();

    let mut calls = 0usize;
    let mut framing_error = None;
    for entry in stream {
        match entry {
            Ok(_) => calls += 1,
            Err(e) => {
                framing_error = Some(e);
                break;
            }
        }
    }

    let format = &header.format;
    println!("=== {} ===", args.trace.display());
    println!("  Size:        {} bytes", bytes.len());
    println!("  Version:     {}", header.version);
    println!(
        "  Compressed:  {}",
        if header.is_compressed() { "yes (lz4)" } else { "no" }
    );
    println!("  Calls:       {calls}");
    println!();
    println!("Wire format:");
    print_width("presence", format.presence);
    print_width("length", format.length);
    print_width("address", format.address);
    print_width("tag", format.tag);
    print_width("handle", format.handle);
    print_width("call id", format.call_id);
    print_width("thread id", format.thread_id);
    print_width("call length", format.call_length);
    println!("  chain end    {}", format.chain_terminator);

    if let Some(e) = framing_error {
        println!();
        println!("Stream ends early: {e}");
    }

    Ok(())
}

fn print_width(name: &str, width: FieldWidth) {
    println!("  {name:<12} {} bytes", width.bytes());
}
