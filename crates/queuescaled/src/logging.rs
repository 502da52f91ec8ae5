//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{LogArgs, LogFormat};

const LOG_FILE_PREFIX: &str = "autoscaling";
const LOG_FILE_SUFFIX: &str = "log";
const LOG_FILES_KEPT: usize = 10;

const CRATES: &[&str] = &[
    "queuescaled",
    "queuescale_autoscale",
    "queuescale_sqs",
    "queuescale_kube",
];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. The returned guard flushes the log
/// file on drop and must live as long as the process.
pub fn init(args: &LogArgs) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives(&args.level)?)
            .with_context(|| format!("invalid log level {:?}", args.level))?,
    };

    let mut layers: Vec<BoxedLayer> = vec![match args.format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    }];

    let mut guard = None;
    if let Some(dir) = &args.dir {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix(LOG_FILE_SUFFIX)
            .max_log_files(LOG_FILES_KEPT)
            .build(dir)
            .with_context(|| format!("cannot open log directory {}", dir.display()))?;
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        guard = Some(worker);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(guard)
}

/// Filter directives for a level name. Our crates log at `level`;
/// dependencies are held at warn unless `level` is quieter still.
fn directives(level: &str) -> Result<String> {
    let level = normalize(level)?;
    let base = match level {
        "error" => "error",
        _ => "warn",
    };
    let ours: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    Ok(format!("{base},{}", ours.join(",")))
}

fn normalize(level: &str) -> Result<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "critical" | "fatal" => Ok("error"),
        other => anyhow::bail!("unknown log level {other:?}"),
    }
}
