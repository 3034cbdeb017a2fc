//! Demo and benchmark runners that drive a [`Server`] from producer threads.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, ServerError};
use crate::ops::{Operation, TaskRecord};
use crate::server::{Server, ServerConfig};
use crate::types::TaskId;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let usage = unsafe { usage.assume_init() };
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

#[derive(Clone, Debug)]
pub struct DemoConfig {
    pub tasks_per_client: usize,
    pub out_dir: PathBuf,
    /// Fixed seed for reproducible arguments; each client offsets it by its index.
    pub seed: Option<u64>,
    pub idle_wait: Duration,
}

#[derive(Debug)]
pub struct DemoSummary {
    pub tasks_total: usize,
    pub executed: u64,
    pub failed: u64,
    pub written: usize,
    pub files: Vec<PathBuf>,
}

struct ClientReport {
    path: PathBuf,
    written: usize,
}

/// Submit every call first, then collect the results in submission order.
fn run_client(
    server: &Server<f64>,
    op: Operation,
    tasks: usize,
    rng: &mut StdRng,
    path: &Path,
) -> Result<ClientReport, HarnessError> {
    let file = File::create(path).map_err(|e| HarnessError::io(path, e))?;
    let mut out = BufWriter::new(file);

    let mut submitted = Vec::with_capacity(tasks);
    for _ in 0..tasks {
        let call = op.random_call(rng);
        let id = server.submit(move || call.evaluate())?;
        submitted.push((id, call));
    }
    debug!(op = op.name(), tasks, "client submitted all tasks");

    let mut written = 0;
    for (id, call) in submitted {
        let result = match server.await_result(id) {
            Ok(result) => result,
            Err(ServerError::ComputationFailed { id, message }) => {
                warn!(task = id, %message, "skipping failed task");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        writeln!(out, "{}", TaskRecord { id, call, result })
            .map_err(|e| HarnessError::io(path, e))?;
        written += 1;
    }
    out.flush().map_err(|e| HarnessError::io(path, e))?;
    Ok(ClientReport {
        path: path.to_path_buf(),
        written,
    })
}

/// Run one producer per operation against a shared server and write result files.
pub fn run_demo(config: &DemoConfig) -> Result<DemoSummary, HarnessError> {
    info!(
        tasks_per_client = config.tasks_per_client,
        out_dir = %config.out_dir.display(),
        "demo start"
    );
    fs::create_dir_all(&config.out_dir).map_err(|e| HarnessError::io(&config.out_dir, e))?;

    let server = Arc::new(Server::<f64>::with_config(
        ServerConfig::default()
            .idle_wait(config.idle_wait)
            .worker_name("demo-dispatcher"),
    ));
    server.start()?;

    let mut handles = Vec::new();
    for (index, op) in Operation::ALL.into_iter().enumerate() {
        let server = Arc::clone(&server);
        let tasks = config.tasks_per_client;
        let path = config.out_dir.join(format!("{}_results.txt", op.name()));
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        };
        let name = format!("client-{}", op.name());
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_client(&server, op, tasks, &mut rng, &path))
            .map_err(|source| HarnessError::Spawn {
                name: name.clone(),
                source,
            })?;
        handles.push((name, handle));
    }

    let start = Instant::now();
    let mut files = Vec::new();
    let mut written = 0;
    for (name, handle) in handles {
        let report = handle.join().map_err(|_| HarnessError::Producer(name))??;
        written += report.written;
        files.push(report.path);
    }
    let stats = server.stop()?;
    info!(elapsed_ms = start.elapsed().as_secs_f64() * 1000.0, "demo finished");

    let summary = DemoSummary {
        tasks_total: config.tasks_per_client * Operation::ALL.len(),
        executed: stats.executed,
        failed: stats.failed,
        written,
        files,
    };
    println!("DEMO SUMMARY");
    println!("tasks_total={}", summary.tasks_total);
    println!("executed={}", summary.executed);
    println!("failed={}", summary.failed);
    println!("records_written={}", summary.written);
    for file in &summary.files {
        println!("file={}", file.display());
    }
    Ok(summary)
}

/// Aggregated metrics from a single benchmark run.
#[derive(Debug)]
pub struct BenchResult {
    pub producers: usize,
    pub tasks_per_producer: usize,
    pub total_tasks: usize,
    pub elapsed_ms: f64,
    pub throughput: f64,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
    pub executed: u64,
    pub failed: u64,
    /// Execution order matched id order with no task run twice.
    pub fifo_ok: bool,
}

pub const BENCH_CSV_HEADER: &str =
    "producers,tasks_per_producer,total_tasks,elapsed_ms,throughput_tasks_per_s,cpu_user_s,cpu_sys_s,executed,failed,fifo_ok";

impl BenchResult {
    pub fn csv_row(&self) -> String {
        let cpu_user = self
            .cpu_user_s
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "NA".to_string());
        let cpu_sys = self
            .cpu_sys_s
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "NA".to_string());
        format!(
            "{},{},{},{:.2},{:.2},{},{},{},{},{}",
            self.producers,
            self.tasks_per_producer,
            self.total_tasks,
            self.elapsed_ms,
            self.throughput,
            cpu_user,
            cpu_sys,
            self.executed,
            self.failed,
            self.fifo_ok
        )
    }
}

/// Check that ordinals sorted by id are exactly 0, 1, 2, ...
fn fifo_holds(mut observed: Vec<(TaskId, u64)>) -> bool {
    observed.sort_unstable_by_key(|&(id, _)| id);
    observed
        .iter()
        .enumerate()
        .all(|(expected, &(_, ordinal))| ordinal == expected as u64)
}

pub fn benchmark_once(
    producers: usize,
    tasks_per_producer: usize,
    work: Duration,
    idle_wait: Duration,
) -> Result<BenchResult, HarnessError> {
    debug_assert!(producers > 0, "producers must be > 0");
    debug_assert!(tasks_per_producer > 0, "tasks_per_producer must be > 0");
    let server = Arc::new(Server::<u64>::with_config(
        ServerConfig::default().idle_wait(idle_wait),
    ));
    // Each task records the position it ran at.
    let ordinal = Arc::new(AtomicU64::new(0));

    let cpu_start = cpu_times_seconds();
    let start = Instant::now();
    server.start()?;

    let mut handles = Vec::new();
    for producer in 0..producers {
        let server = Arc::clone(&server);
        let ordinal = Arc::clone(&ordinal);
        let name = format!("producer-{producer}");
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || -> Result<Vec<(TaskId, u64)>, ServerError> {
                let mut ids = Vec::with_capacity(tasks_per_producer);
                for _ in 0..tasks_per_producer {
                    let ordinal = Arc::clone(&ordinal);
                    ids.push(server.submit(move || {
                        if !work.is_zero() {
                            thread::sleep(work);
                        }
                        ordinal.fetch_add(1, Ordering::SeqCst)
                    })?);
                }
                ids.into_iter()
                    .map(|id| server.await_result(id).map(|ran_at| (id, ran_at)))
                    .collect()
            })
            .map_err(|source| HarnessError::Spawn {
                name: name.clone(),
                source,
            })?;
        handles.push((name, handle));
    }

    let mut observed = Vec::with_capacity(producers * tasks_per_producer);
    for (name, handle) in handles {
        observed.extend(handle.join().map_err(|_| HarnessError::Producer(name))??);
    }
    let stats = server.stop()?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let total_tasks = producers * tasks_per_producer;
    let throughput = if elapsed_ms > 0.0 {
        (total_tasks as f64) / (elapsed_ms / 1000.0)
    } else {
        0.0
    };
    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };

    Ok(BenchResult {
        producers,
        tasks_per_producer,
        total_tasks,
        elapsed_ms,
        throughput,
        cpu_user_s,
        cpu_sys_s,
        executed: stats.executed,
        failed: stats.failed,
        fifo_ok: observed.len() == total_tasks && fifo_holds(observed),
    })
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub producer_sets: Vec<usize>,
    pub tasks_per_producer: usize,
    pub work: Duration,
    pub idle_wait: Duration,
}

/// Sweep the producer counts and print one CSV row per run.
pub fn run_benchmark(config: &BenchConfig) -> Result<Vec<BenchResult>, HarnessError> {
    if config.producer_sets.is_empty() || config.producer_sets.contains(&0) {
        return Err(HarnessError::Config("producer counts must be > 0".to_string()));
    }
    if config.tasks_per_producer == 0 {
        return Err(HarnessError::Config("tasks_per_producer must be > 0".to_string()));
    }

    println!("{BENCH_CSV_HEADER}");
    let mut results = Vec::new();
    for &producers in &config.producer_sets {
        let result = benchmark_once(
            producers,
            config.tasks_per_producer,
            config.work,
            config.idle_wait,
        )?;
        println!("{}", result.csv_row());
        if !result.fifo_ok {
            eprintln!("# violation,fifo_order");
        }
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{DEFAULT_TOLERANCE, run_verify};

    #[test]
    fn fifo_check_detects_reordering() {
        assert!(fifo_holds(vec![(2, 1), (1, 0), (3, 2)]));
        assert!(!fifo_holds(vec![(1, 1), (2, 0)]));
        assert!(!fifo_holds(vec![(1, 0), (2, 0)]));
    }

    #[test]
    fn demo_writes_verifiable_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DemoConfig {
            tasks_per_client: 20,
            out_dir: dir.path().join("out"),
            seed: Some(42),
            idle_wait: Duration::from_millis(5),
        };
        let summary = run_demo(&config).expect("demo");
        assert_eq!(summary.tasks_total, 60);
        assert_eq!(summary.executed, 60);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.written, 60);
        assert_eq!(summary.files.len(), 3);

        let report = run_verify(&summary.files, DEFAULT_TOLERANCE).expect("verify");
        assert!(report.is_clean());
        assert_eq!(report.matched, 60);
    }

    #[test]
    fn benchmark_rejects_empty_workloads() {
        let mut config = BenchConfig {
            producer_sets: vec![1, 0],
            tasks_per_producer: 5,
            work: Duration::ZERO,
            idle_wait: Duration::from_millis(5),
        };
        assert!(matches!(run_benchmark(&config), Err(HarnessError::Config(_))));

        config.producer_sets = vec![2];
        config.tasks_per_producer = 0;
        assert!(matches!(run_benchmark(&config), Err(HarnessError::Config(_))));
    }

    #[test]
    fn benchmark_preserves_fifo_across_producers() {
        let result = benchmark_once(3, 40, Duration::ZERO, Duration::from_millis(5))
            .expect("benchmark");
        assert_eq!(result.total_tasks, 120);
        assert_eq!(result.executed, 120);
        assert_eq!(result.failed, 0);
        assert!(result.fifo_ok);
        assert_eq!(result.csv_row().split(',').count(), BENCH_CSV_HEADER.split(',').count());
    }
}
