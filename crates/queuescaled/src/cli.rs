//! Command-line and environment surface.
//!
//! Every flag can also be set through the environment variable named
//! next to it, and overrides the same key from the optional TOML file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use queuescale_core::{ApiGeneration, ConfigResult, ScalerConfig};

#[derive(Parser)]
#[command(
    name = "queuescaled",
    about = "Scale a Kubernetes deployment on SQS queue depth",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the queue and scale the deployment until interrupted.
    Run(ScalerArgs),
    /// Validate the configuration, print the effective settings, and exit.
    Check(ScalerArgs),
}

#[derive(Args, Debug, Default)]
pub struct ScalerArgs {
    /// Optional queuescale.toml; flags and environment override it.
    #[arg(long, env = "QUEUESCALE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Queue URL. Takes precedence over --sqs-queue-name.
    #[arg(long, env = "SQS_QUEUE_URL")]
    pub sqs_queue_url: Option<String>,

    /// Queue name, resolved to a URL once at startup.
    #[arg(long, env = "SQS_QUEUE_NAME")]
    pub sqs_queue_name: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    #[arg(long, env = "KUBERNETES_NAMESPACE")]
    pub kubernetes_namespace: Option<String>,

    /// Deployment name.
    #[arg(long, env = "KUBERNETES_DEPLOYMENT")]
    pub kubernetes_deployment: Option<String>,

    /// Label selector, e.g. `app=worker`. Takes precedence over the name.
    #[arg(long, env = "KUBERNETES_DEPLOYMENT_SELECTOR")]
    pub kubernetes_deployment_selector: Option<String>,

    /// apps/v1, apps/v1beta2, apps/v1beta1 or extensions/v1beta1.
    #[arg(long, env = "KUBERNETES_API")]
    pub kubernetes_api: Option<ApiGeneration>,

    /// Visible messages at or above which to add a replica.
    #[arg(long, env = "SCALE_UP_MESSAGES")]
    pub scale_up_messages: Option<u64>,

    /// Visible messages at or below which to remove a replica.
    #[arg(long, env = "SCALE_DOWN_MESSAGES")]
    pub scale_down_messages: Option<u64>,

    /// e.g. "10s", "2m", or plain seconds.
    #[arg(long, env = "SCALE_UP_COOL_DOWN")]
    pub scale_up_cool_down: Option<String>,

    #[arg(long, env = "SCALE_DOWN_COOL_DOWN")]
    pub scale_down_cool_down: Option<String>,

    #[arg(long, env = "MIN_PODS")]
    pub min_pods: Option<u32>,

    #[arg(long, env = "MAX_PODS")]
    pub max_pods: Option<u32>,

    #[arg(long, env = "POLL_PERIOD")]
    pub poll_period: Option<String>,

    /// Per-call timeout for queue and orchestrator requests.
    #[arg(long, env = "IO_TIMEOUT")]
    pub io_timeout: Option<String>,

    #[arg(long, env = "RETRY_INITIAL_INTERVAL")]
    pub retry_initial_interval: Option<String>,

    /// Give up retrying a failed call after this long.
    #[arg(long, env = "RETRY_MAX_ELAPSED")]
    pub retry_max_elapsed: Option<String>,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// debug, info, warning, error (RUST_LOG wins when set).
    #[arg(long = "log-level", env = "LOGGING_LEVEL", default_value = "info")]
    pub level: String,

    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub format: LogFormat,

    /// Also write a daily-rotated autoscaling log into this directory.
    #[arg(long = "log-dir", env = "LOG_DIR")]
    pub dir: Option<PathBuf>,
}

impl Default for LogArgs {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl ScalerArgs {
    /// Defaults, then the TOML file, then flags and environment.
    pub fn load(&self) -> ConfigResult<ScalerConfig> {
        let mut config = match &self.config {
            Some(path) => ScalerConfig::from_file(path)?,
            None => ScalerConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut ScalerConfig) {
        overlay_opt(&mut config.queue.url, &self.sqs_queue_url);
        overlay_opt(&mut config.queue.name, &self.sqs_queue_name);
        overlay_opt(&mut config.queue.region, &self.aws_region);

        let k8s = &mut config.kubernetes;
        overlay(&mut k8s.namespace, &self.kubernetes_namespace);
        overlay_opt(&mut k8s.deployment, &self.kubernetes_deployment);
        overlay_opt(&mut k8s.deployment_selector, &self.kubernetes_deployment_selector);
        overlay(&mut k8s.api, &self.kubernetes_api);

        let scaling = &mut config.scaling;
        overlay(&mut scaling.scale_up_messages, &self.scale_up_messages);
        overlay(&mut scaling.scale_down_messages, &self.scale_down_messages);
        overlay(&mut scaling.scale_up_cool_down, &self.scale_up_cool_down);
        overlay(&mut scaling.scale_down_cool_down, &self.scale_down_cool_down);
        overlay(&mut scaling.min_pods, &self.min_pods);
        overlay(&mut scaling.max_pods, &self.max_pods);
        overlay(&mut scaling.poll_period, &self.poll_period);

        overlay(&mut config.io.timeout, &self.io_timeout);
        overlay(&mut config.io.retry_initial_interval, &self.retry_initial_interval);
        overlay(&mut config.io.retry_max_elapsed, &self.retry_max_elapsed);
    }
}

fn overlay<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn overlay_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *target = value.clone();
    }
}
