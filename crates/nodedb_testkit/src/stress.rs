//! Concurrent insert stress harness.

use nodedb_core::{NewSegment, NodeDatabase, NodeDbError, SegmentId};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Ids returned by successful inserts, in no particular order.
    pub ids: Vec<SegmentId>,
    /// Errors returned by failed inserts.
    pub errors: Vec<String>,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    fn new(ids: Vec<SegmentId>, errors: Vec<String>, duration: Duration) -> Self {
        let total = ids.len() + errors.len();
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            ids,
            errors,
            duration,
            ops_per_second,
        }
    }

    /// Number of successful inserts.
    pub fn successful_ops(&self) -> usize {
        self.ids.len()
    }

    /// Number of failed inserts.
    pub fn failed_ops(&self) -> usize {
        self.errors.len()
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops());
        println!("Failed: {}", self.failed_ops());
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Inserts performed by each thread.
    pub inserts_per_thread: usize,
    /// Collection every segment is recorded under.
    pub collection_id: i32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            inserts_per_thread: 10,
            collection_id: 1,
        }
    }
}

/// The segment thread `thread` records on its `n`th insert.
///
/// Every `(thread, n)` pair yields a distinct key and unified id.
pub fn stress_segment(config: &StressConfig, thread: usize, n: usize) -> NewSegment {
    let unified_id = (thread * config.inserts_per_thread + n) as i64 + 1;
    NewSegment::new(
        config.collection_id,
        format!("stress/{thread}/{n}"),
        unified_id,
        (n % 10) as i32 + 1,
        thread as i32,
    )
}

/// Inserts from `config.threads` threads at once and collects every outcome.
pub fn concurrent_insert(db: &NodeDatabase, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();

    let outcomes: Vec<Result<SegmentId, NodeDbError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                scope.spawn(move || {
                    (0..config.inserts_per_thread)
                        .map(|n| db.insert_new_segment(&stress_segment(config, t, n)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().expect("Insert thread panicked"))
            .collect()
    });

    let duration = start.elapsed();
    let mut ids = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(id) => ids.push(id),
            Err(e) => errors.push(e.to_string()),
        }
    }

    StressTestResult::new(ids, errors, duration)
}
