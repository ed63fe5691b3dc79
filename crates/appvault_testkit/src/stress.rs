//! Stress tests for AppVault.
//!
//! These tests verify behavior under heavy load and concurrent access.

use crate::fixtures::{dev_query, pull_body, push_archive};
use appvault_protocol::Action;
use appvault_server::{Request, SyncServer};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of each file in bytes.
    pub file_size: usize,
    /// Number of files per pushed tree.
    pub file_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            file_size: 256,
            file_count: 8,
        }
    }
}

/// The tree pushed by `writer` on its `round`-th operation.
///
/// Every file in one tree carries the same stamp, so a manifest that mixes
/// two trees is detectable by [`is_single_tree`].
pub fn stamped_tree(config: &StressConfig, writer: usize, round: usize) -> Vec<(String, Vec<u8>)> {
    let stamp = format!("writer-{writer}-round-{round};");
    let mut content = stamp.into_bytes();
    content.resize(config.file_size.max(content.len()), b'.');
    (0..config.file_count)
        .map(|i| (format!("src/file-{i}.js"), content.clone()))
        .collect()
}

/// Returns true when every entry of `hashes` points at the same content,
/// as it does for any tree built by [`stamped_tree`].
pub fn is_single_tree(hashes: &BTreeMap<String, String>) -> bool {
    let mut values = hashes.values();
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

fn push_tree(server: &SyncServer, app: &str, tree: &[(String, Vec<u8>)]) -> bool {
    let files: Vec<(&str, &[u8])> = tree
        .iter()
        .map(|(path, content)| (path.as_str(), content.as_slice()))
        .collect();
    let response = server.handle(&Request::post(
        &format!("/push/{app}/?{}", dev_query(Action::Push, app)),
        push_archive(&files),
    ));
    response.status == 200
}

/// Run a sequential push stress test against one application.
pub fn stress_sequential_pushes(server: &SyncServer, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for round in 0..config.operations {
        if push_tree(server, "stress-seq", &stamped_tree(config, 0, round)) {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent full-tree pushes against a single application.
///
/// Afterwards the live manifest must be exactly one writer's tree.
pub fn stress_concurrent_pushes(server: Arc<SyncServer>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let server = Arc::clone(&server);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                for round in 0..ops_per_thread {
                    let tree = stamped_tree(&config, t, round);
                    if push_tree(&server, "stress-shared", &tree) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run concurrent pushes while garbage collection runs in a loop.
///
/// Each writer pulls right after its push; a pull fails if collection
/// removed a blob the fresh manifest references.
pub fn stress_pushes_with_gc(server: Arc<SyncServer>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let writers_done = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let collector = {
        let server = Arc::clone(&server);
        let writers_done = Arc::clone(&writers_done);
        let threads = config.threads;
        thread::spawn(move || {
            let mut runs = 0usize;
            while writers_done.load(Ordering::Acquire) < threads {
                if server.collect_garbage().is_ok() {
                    runs += 1;
                }
                thread::yield_now();
            }
            runs
        })
    };

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let server = Arc::clone(&server);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let writers_done = Arc::clone(&writers_done);
            let config = config.clone();

            thread::spawn(move || {
                let app = format!("stress-gc-{t}");
                for round in 0..ops_per_thread {
                    let tree = stamped_tree(&config, t, round);
                    let pulled = push_tree(&server, &app, &tree)
                        && server
                            .handle(&Request::post(
                                &format!("/pull/{app}/?{}", dev_query(Action::Pull, &app)),
                                pull_body(&[]),
                            ))
                            .status
                            == 200;
                    if pulled {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                writers_done.fetch_add(1, Ordering::Release);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    collector.join().expect("Collector panicked");

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run pulls against one application while a writer keeps replacing its
/// tree and garbage collection runs in a loop.
///
/// Every push orphans the previous tree's blobs, so a pull fails if
/// collection deletes blobs between the pull reading its manifest and
/// assembling the bundle. Only pulls are counted.
pub fn stress_pulls_with_gc(server: Arc<SyncServer>, config: &StressConfig) -> StressTestResult {
    const APP: &str = "stress-pull-gc";
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let pullers_done = Arc::new(AtomicUsize::new(0));

    if !push_tree(&server, APP, &stamped_tree(config, 0, 0)) {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let start = Instant::now();

    let background = |work: fn(&SyncServer, &StressConfig, usize)| {
        let server = Arc::clone(&server);
        let pullers_done = Arc::clone(&pullers_done);
        let threads = config.threads;
        let config = config.clone();
        thread::spawn(move || {
            let mut round = 1usize;
            while pullers_done.load(Ordering::Acquire) < threads {
                work(&server, &config, round);
                round += 1;
                thread::yield_now();
            }
        })
    };
    let writer = background(|server, config, round| {
        push_tree(server, APP, &stamped_tree(config, 0, round));
    });
    let collector = background(|server, _, _| {
        let _ = server.collect_garbage();
    });

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let server = Arc::clone(&server);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let pullers_done = Arc::clone(&pullers_done);

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let response = server.handle(&Request::post(
                        &format!("/pull/{APP}/?{}", dev_query(Action::Pull, APP)),
                        pull_body(&[]),
                    ));
                    if response.status == 200 {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                pullers_done.fetch_add(1, Ordering::Release);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    writer.join().expect("Writer panicked");
    collector.join().expect("Collector panicked");

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
