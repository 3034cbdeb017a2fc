use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::error;

use task_server::logging;
use task_server::sim::{self, BenchConfig, DemoConfig};
use task_server::verify;

#[derive(Parser, Debug)]
#[command(
    name = "task_server",
    version,
    about = "Single-worker task server demo, verifier and benchmark"
)]
struct Cli {
    /// Dispatcher idle wait between shutdown checks, in milliseconds.
    #[arg(long, global = true, env = "TASK_SERVER_IDLE_WAIT_MS", default_value_t = 50)]
    idle_wait_ms: u64,

    /// Log everything down to trace level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Three producers submit sin/sqrt/pow tasks and write result files (default).
    Demo {
        /// Tasks submitted by each producer.
        #[arg(long, default_value_t = 50)]
        per_client: usize,

        /// Directory receiving `<op>_results.txt`.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Seed for reproducible arguments.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Recompute every record in the given result files.
    Verify {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, default_value_t = verify::DEFAULT_TOLERANCE)]
        tolerance: f64,
    },
    /// Measure throughput for one or more producer counts and print CSV.
    Bench {
        /// Comma-separated producer counts, e.g. 1,2,4.
        #[arg(long, value_delimiter = ',', default_values_t = [1usize, 2, 4, 8])]
        producers: Vec<usize>,

        #[arg(long, default_value_t = 250)]
        tasks_per_producer: usize,

        /// Simulated work per task, in microseconds.
        #[arg(long, default_value_t = 100)]
        work_us: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let idle_wait = Duration::from_millis(cli.idle_wait_ms.max(1));

    let command = cli.command.unwrap_or(Command::Demo {
        per_client: 50,
        out_dir: PathBuf::from("."),
        seed: None,
    });
    let outcome = match command {
        Command::Demo {
            per_client,
            out_dir,
            seed,
        } => sim::run_demo(&DemoConfig {
            tasks_per_client: per_client,
            out_dir,
            seed,
            idle_wait,
        })
        .map(|_| ExitCode::SUCCESS),
        Command::Verify { files, tolerance } => verify::run_verify(&files, tolerance).map(|report| {
            if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }),
        Command::Bench {
            producers,
            tasks_per_producer,
            work_us,
        } => sim::run_benchmark(&BenchConfig {
            producer_sets: producers,
            tasks_per_producer,
            work: Duration::from_micros(work_us),
            idle_wait,
        })
        .map(|_| ExitCode::SUCCESS),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
