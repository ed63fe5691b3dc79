//! Garbage collection command implementation.

use super::open_store;
use std::path::Path;

/// Runs the gc command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Collecting garbage at {:?}", path);
    println!();

    let store = open_store(path)?;
    let before = store.server.context().blobs.hashes()?.len();
    let report = store.server.collect_garbage()?;

    println!("Garbage Collection:");
    println!("  Blobs before:     {}", before);
    println!("  Referenced:       {}", report.referenced);
    println!("  Removed:          {}", report.removed);
    println!("  Blobs after:      {}", before.saturating_sub(report.removed));

    Ok(())
}
