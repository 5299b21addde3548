use anyhow::{Context, Result};
use bulk_check::{JobConfig, JobController, JobStatus, RunHandle, RunSummary, SqliteStore, UrlList};
use clap::{Parser, Subcommand, ValueEnum};
use results_sqlite::Db;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

const DEFAULT_DB: &str = "results.db";
const DEFAULT_PROGRESS_MS: u64 = 1000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Parser)]
#[command(name = "reachcheck", version, about = "Bulk URL reachability checker with pause/resume")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./reachcheck.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Check every URL in a file (one per line; blanks and # comments ignored)
    Check {
        /// Newline-delimited URL file
        file: PathBuf,
        /// Max checks in flight [default: 50]
        #[arg(long)]
        concurrency: Option<usize>,
        /// Request rate cap across all workers, retries included [default: 100]
        #[arg(long)]
        rps: Option<f64>,
        /// Per-attempt timeout in seconds [default: 10]
        #[arg(long)]
        timeout: Option<f64>,
        /// Extra attempts for URLs that get no response [default: 1]
        #[arg(long)]
        retries: Option<u32>,
        /// Skip URLs already recorded in the results db instead of clearing it
        #[arg(long, default_value_t = false)]
        resume: bool,
        /// Results database [default: results.db]
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
        /// Write all results as CSV when the run ends
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
        /// Progress report interval in milliseconds [default: 1000]
        #[arg(long)]
        progress_ms: Option<u64>,
        /// Progress output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Export recorded results as CSV
    Export {
        /// Results database [default: results.db]
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
        /// Output CSV file (overwrites)
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Summarize recorded results and the last run
    Summary {
        /// Results database [default: results.db]
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref())?;
    let file_cfg = loaded_cfg.and_then(|c| c.check).unwrap_or_default();
    match cli.command {
        Commands::Version => {
            println!("reachcheck {} (core {})", env!("CARGO_PKG_VERSION"), reach_core::version());
        }
        Commands::Check { file, concurrency, rps, timeout, retries, resume, db, export, progress_ms, format } => {
            let defaults = JobConfig::default();
            let job = JobConfig {
                concurrency: concurrency.or(file_cfg.concurrency).unwrap_or(defaults.concurrency),
                requests_per_second: rps.or(file_cfg.requests_per_second).unwrap_or(defaults.requests_per_second),
                timeout_seconds: timeout.or(file_cfg.timeout_seconds).unwrap_or(defaults.timeout_seconds),
                retries: retries.or(file_cfg.retries).unwrap_or(defaults.retries),
                resume,
            };
            let db_path = db.or(file_cfg.db).unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
            let progress = Duration::from_millis(
                progress_ms.or(file_cfg.progress_interval_ms).unwrap_or(DEFAULT_PROGRESS_MS).max(50),
            );

            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let urls = UrlList::parse(&text);

            let rt = tokio::runtime::Runtime::new()?;
            let summary = rt.block_on(run_check(urls, job, &db_path, progress, format))?;

            if let Some(path) = export {
                let n = Db::open_or_create(&db_path)?.export_csv_file(&path)?;
                info!(rows = n, out = %path.display(), "exported results");
            }
            if summary.stopped {
                eprintln!(
                    "stopped after {} of the pending URLs; rerun with --resume to continue",
                    summary.dispatched
                );
            }
        }
        Commands::Export { db, out } => {
            let db_path = db.or(file_cfg.db).unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
            let n = Db::open_or_create(&db_path)?.export_csv_file(&out)?;
            println!("wrote {} rows to {}", n, out.display());
        }
        Commands::Summary { db, format } => {
            let db_path = db.or(file_cfg.db).unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
            let db = Db::open_or_create(&db_path)?;
            let summary = db.summary()?;
            let last_run = db.last_run()?;
            match format {
                OutputFormat::Json => {
                    let obj = serde_json::json!({ "results": summary, "last_run": last_run });
                    println!("{}", serde_json::to_string(&obj)?);
                }
                OutputFormat::Text => {
                    println!(
                        "{} results ({} errors, {} distinct URLs) in {}",
                        summary.total,
                        summary.errors,
                        summary.distinct_urls,
                        db_path.display()
                    );
                    if let Some(r) = last_run {
                        println!(
                            "last run {} started {} finished {} resumed={} stopped={} checked={} errors={}",
                            r.run_id,
                            r.started_at,
                            r.finished_at.as_deref().unwrap_or("-"),
                            r.resumed,
                            r.stopped,
                            r.checked,
                            r.error_count
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

/// Run one job to completion, reporting progress. Ctrl-C pauses the job.
async fn run_check(
    urls: UrlList,
    job: JobConfig,
    db_path: &Path,
    progress: Duration,
    format: OutputFormat,
) -> Result<RunSummary> {
    let store = Arc::new(SqliteStore::open(db_path)?);
    let ctrl = JobController::http(store)?;
    let n = ctrl.load_urls(urls)?;
    info!(urls = n, db = %db_path.display(), "loaded targets");

    let run = ctrl.start(job).await?;
    supervise(&ctrl, run, tokio::signal::ctrl_c, progress, format).await
}

/// Wait for `run` to drain, printing status every `progress`. Each completion
/// of `interrupt` stops the job: no new URLs are dispatched and in-flight
/// checks are allowed to finish.
async fn supervise<I, F>(
    ctrl: &JobController,
    run: RunHandle,
    mut interrupt: I,
    progress: Duration,
    format: OutputFormat,
) -> Result<RunSummary>
where
    I: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    let mut ticker = tokio::time::interval(progress);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let done = run.wait();
    tokio::pin!(done);
    // Kept across iterations so a signal landing between polls is not lost.
    let signal = interrupt();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            res = &mut done => {
                let summary = res?;
                print_status(&ctrl.status(), format)?;
                return Ok(summary);
            }
            res = &mut signal => {
                res.context("listening for interrupt")?;
                warn!("interrupt received, finishing in-flight checks");
                ctrl.stop();
                signal.set(interrupt());
            }
            _ = ticker.tick() => print_status(&ctrl.status(), format)?,
        }
    }
}

fn print_status(s: &JobStatus, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(s)?),
        OutputFormat::Text => {
            let pct = if s.total > 0 { s.checked as f64 * 100.0 / s.total as f64 } else { 0.0 };
            println!(
                "[{:?}] {}/{} ({:.1}%) errors={} rate={:.1}/s elapsed={:.0}s",
                s.phase, s.checked, s.total, pct, s.errors, s.rate_per_sec, s.elapsed_secs
            );
            if let Some(last) = s.recent_errors.last() {
                println!("  last error: {}", last);
            }
        }
    }
    Ok(())
}
