//! Verify command implementation.

use super::{open_store, Store};
use appvault_protocol::{ContentHash, Manifest};
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Number of corrupt records.
    pub corrupt_records: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            records_checked: 0,
            valid_records: 0,
            corrupt_records: 0,
            errors: Vec::new(),
        }
    }

    /// Returns true if nothing was found wrong.
    pub fn is_ok(&self) -> bool {
        self.corrupt_records == 0 && self.errors.is_empty()
    }

    fn fail(&mut self, error: String) {
        self.corrupt_records += 1;
        self.errors.push(error);
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying data directory at {:?}", path);
    println!();

    let store = open_store(path)?;

    println!("Checking blobs...");
    let blobs = verify_blobs(&store)?;
    print_result("Blobs", &blobs);

    println!("Checking manifests and submissions...");
    let references = verify_references(&store)?;
    print_result("References", &references);

    println!();
    if blobs.is_ok() && references.is_ok() {
        println!("✓ Data directory verification passed");
        Ok(())
    } else {
        println!("✗ Data directory verification failed");
        Err("Verification failed".into())
    }
}

/// Re-hashes every blob.
pub fn verify_blobs(store: &Store) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::new();
    let blobs = &store.server.context().blobs;

    for hash in blobs.hashes()? {
        result.records_checked += 1;
        match blobs.get(&hash) {
            Ok(_) => result.valid_records += 1,
            Err(e) => result.fail(format!("Blob {}: {}", hash, e)),
        }
    }

    Ok(result)
}

/// Checks that every manifest and submission decodes and that every hash
/// they reference is stored.
pub fn verify_references(store: &Store) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::new();
    let context = store.server.context();

    let check = |result: &mut VerifyResult, owner: &str, manifest: &Manifest| {
        let mut missing: Vec<&ContentHash> = Vec::new();
        for hash in manifest.hashes() {
            match context.blobs.exists(hash) {
                Ok(true) => {}
                _ => missing.push(hash),
            }
        }
        if missing.is_empty() {
            result.valid_records += 1;
        } else {
            for hash in missing {
                result.fail(format!("{} references missing blob {}", owner, hash));
            }
        }
    };

    for app_id in context.manifests.apps()? {
        result.records_checked += 1;
        match context.manifests.get_hashes(&app_id) {
            Ok(manifest) => check(&mut result, &format!("App {}", app_id), &manifest),
            Err(e) => result.fail(format!("App {}: {}", app_id, e)),
        }
    }

    for id in context.submissions.ids()? {
        result.records_checked += 1;
        match context.submissions.get(&id) {
            Ok(Some(submission)) => check(
                &mut result,
                &format!("Submission {}", id),
                &submission.manifest,
            ),
            Ok(None) => result.fail(format!("Submission {} vanished during verify", id)),
            Err(e) => result.fail(format!("Submission {}: {}", id, e)),
        }
    }

    Ok(result)
}

fn print_result(name: &str, result: &VerifyResult) {
    println!("  {} records checked: {}", name, result.records_checked);
    println!("  {} valid: {}", name, result.valid_records);
    if result.corrupt_records > 0 {
        println!("  {} corrupt: {}", name, result.corrupt_records);
    }
    for error in &result.errors {
        println!("    - {}", error);
    }
}
