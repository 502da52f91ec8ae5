//! queuescaled — the queuescale daemon.
//!
//! Polls an SQS queue and moves a Kubernetes deployment's replica count
//! one step at a time toward the backlog.
//!
//! # Usage
//!
//! ```text
//! queuescaled run --sqs-queue-name jobs --kubernetes-deployment worker --max-pods 10
//! queuescaled check --config /etc/queuescale.toml
//! ```

mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use queuescale_autoscale::{PollDriver, Resilient};
use queuescale_sqs::SqsMetricSource;

use crate::cli::{Cli, Command, ScalerArgs};

// One cycle runs at a time; a single-threaded runtime keeps it that way.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let _guard = logging::init(&args.log)?;
            run(args).await
        }
        Command::Check(args) => {
            let _guard = logging::init(&args.log)?;
            check(&args)
        }
    }
}

async fn run(args: ScalerArgs) -> anyhow::Result<()> {
    let config = args
        .load()?
        .validate()
        .context("invalid configuration")?;

    info!(
        queue = ?config.queue,
        namespace = %config.namespace,
        deployment = %config.selector,
        api = %config.api,
        scale_up_messages = config.policy.scale_up_threshold,
        scale_down_messages = config.policy.scale_down_threshold,
        min_pods = config.policy.min_replicas,
        max_pods = config.policy.max_replicas,
        poll_period = ?config.policy.poll_period,
        "starting queuescale"
    );

    let source = SqsMetricSource::connect(&config.queue, config.region.as_deref(), config.io.timeout)
        .await
        .context("failed to set up the SQS metric source")?;

    let client = kube::Client::try_default()
        .await
        .context("failed to build a Kubernetes client")?;
    let store = queuescale_kube::replica_store(
        client,
        &config.namespace,
        config.selector.clone(),
        config.api,
    );

    let mut driver = PollDriver::new(
        Resilient::new(source, config.io),
        Resilient::new(store, config.io),
        config.policy,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    driver.run(shutdown_rx).await;
    info!("queuescale stopped");
    Ok(())
}

fn check(args: &ScalerArgs) -> anyhow::Result<()> {
    let config = args.load()?;
    let validated = config.validate().context("invalid configuration")?;

    print!("{}", config.to_toml_string()?);
    info!(
        queue = ?validated.queue,
        deployment = %validated.selector,
        "configuration is valid"
    );
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
