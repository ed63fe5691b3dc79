//! Inspect command implementation.

use super::open_store;
use appvault_protocol::AppId;
use appvault_storage::KeyValueBackend;
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Number of stored blobs.
    pub blob_count: usize,
    /// Total blob size in bytes.
    pub blob_bytes: u64,
    /// Number of submissions.
    pub submission_count: usize,
    /// Per-application statistics.
    pub apps: Vec<AppStats>,
}

/// Statistics for a single application.
#[derive(Debug, Serialize)]
pub struct AppStats {
    /// Application ID.
    pub app_id: String,
    /// Files in the live manifest.
    pub file_count: usize,
    /// Submissions frozen from this application.
    pub submissions: Vec<String>,
    /// Manifest entries, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<(String, String)>>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    app_filter: Option<&str>,
    show_files: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let context = store.server.context();

    let mut blob_bytes = 0u64;
    let blob_keys = store.backend.keys("blobs/")?;
    for key in &blob_keys {
        let mut file = store.backend.root().to_path_buf();
        file.extend(key.split('/'));
        blob_bytes += std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
    }

    let submission_ids = context.submissions.ids()?;
    let mut submissions = Vec::with_capacity(submission_ids.len());
    for id in &submission_ids {
        if let Some(submission) = context.submissions.get(id)? {
            submissions.push(submission);
        }
    }

    let filter = app_filter.map(AppId::parse).transpose()?;
    let mut apps = Vec::new();
    for app_id in context.manifests.apps()? {
        if filter.as_ref().is_some_and(|f| *f != app_id) {
            continue;
        }
        let manifest = context.manifests.get_hashes(&app_id)?;
        apps.push(AppStats {
            app_id: app_id.to_string(),
            file_count: manifest.len(),
            submissions: submissions
                .iter()
                .filter(|s| s.app_id == app_id)
                .map(|s| s.submission_id.to_string())
                .collect(),
            files: show_files.then(|| {
                manifest
                    .iter()
                    .map(|(path, hash)| (path.to_string(), hash.to_string()))
                    .collect()
            }),
        });
    }
    if let Some(app_id) = filter {
        if apps.is_empty() {
            return Err(format!("App {} not found", app_id).into());
        }
    }

    let result = InspectResult {
        path: path.display().to_string(),
        blob_count: blob_keys.len(),
        blob_bytes,
        submission_count: submissions.len(),
        apps,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }

    Ok(())
}

fn print_text(result: &InspectResult) {
    println!("AppVault Data Directory: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Blobs:       {}", result.blob_count);
    println!("  Blob bytes:  {}", result.blob_bytes);
    println!("  Submissions: {}", result.submission_count);
    println!();
    println!("Applications ({}):", result.apps.len());
    for app in &result.apps {
        println!(
            "  {}: {} files, {} submissions",
            app.app_id,
            app.file_count,
            app.submissions.len()
        );
        for id in &app.submissions {
            println!("    submission {}", id);
        }
        if let Some(files) = &app.files {
            for (path, hash) in files {
                println!("    {}  {}", hash, path);
            }
        }
    }
}
