//! queuescale-sqs — Amazon SQS metric source.
//!
//! Reports `ApproximateNumberOfMessages` as visible and
//! `ApproximateNumberOfMessagesNotVisible` as in-flight. Credentials come
//! from the AWS SDK default provider chain, which also covers web-identity
//! role assumption (`AWS_ROLE_ARN` + `AWS_WEB_IDENTITY_TOKEN_FILE`) with
//! automatic session refresh. The SDK's own retries are disabled; the
//! caller wraps this source in `Resilient`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::QueueAttributeName;
use tracing::{debug, info, warn};

use queuescale_autoscale::MetricSource;
use queuescale_core::{FetchError, FetchResult, QueueMetrics, QueueTarget};

/// Counts messages on one SQS queue.
#[derive(Debug, Clone)]
pub struct SqsMetricSource {
    client: Client,
    queue_url: String,
}

impl SqsMetricSource {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Build a client from the environment and resolve the queue URL.
    ///
    /// A queue name is resolved exactly once, here.
    pub async fn connect(
        target: &QueueTarget,
        region: Option<&str>,
        timeout: Duration,
    ) -> FetchResult<Self> {
        if std::env::var_os("AWS_WEB_IDENTITY_TOKEN_FILE").is_some() {
            debug!("using web identity credentials");
        }
        for (var, hint) in ignored_session_vars(|var| std::env::var(var).ok()) {
            warn!(var, "{var} is not read by the AWS credential chain; {hint}");
        }

        let timeouts = TimeoutConfig::builder()
            .operation_attempt_timeout(timeout)
            .connect_timeout(timeout)
            .build();
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .timeout_config(timeouts)
            .retry_config(RetryConfig::disabled());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;
        let client = Client::new(&config);

        let queue_url = resolve_queue_url(&client, target).await?;
        info!(queue_url = %queue_url, "sqs metric source ready");
        Ok(Self::new(client, queue_url))
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

/// Session variables older deployments set for web-identity role
/// assumption, with what to do about each.
const LEGACY_SESSION_VARS: &[(&str, &str)] = &[
    ("AWS_SESSION_NAME", "set AWS_ROLE_SESSION_NAME instead"),
    (
        "SESSION_DURATION",
        "sessions use the STS default duration and refresh before expiry",
    ),
];

fn ignored_session_vars(
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(&'static str, &'static str)> {
    LEGACY_SESSION_VARS
        .iter()
        .copied()
        .filter(|(var, _)| lookup(var).is_some_and(|v| !v.is_empty()))
        .collect()
}

/// Turn a [`QueueTarget`] into a queue URL.
pub async fn resolve_queue_url(client: &Client, target: &QueueTarget) -> FetchResult<String> {
    let name = match target {
        QueueTarget::Url(url) => return Ok(url.clone()),
        QueueTarget::Name(name) => name,
    };

    let output = client
        .get_queue_url()
        .queue_name(name)
        .send()
        .await
        .map_err(|e| {
            let missing = e
                .as_service_error()
                .is_some_and(|se| se.is_queue_does_not_exist());
            if missing {
                FetchError::NotFound(format!("queue {name}"))
            } else {
                FetchError::Transport(DisplayErrorContext(&e).to_string())
            }
        })?;

    let url = output
        .queue_url()
        .ok_or_else(|| FetchError::Malformed(format!("no URL returned for queue {name}")))?;
    debug!(queue = %name, queue_url = %url, "resolved queue name");
    Ok(url.to_string())
}

#[async_trait]
impl MetricSource for SqsMetricSource {
    async fn get_counts(&self) -> FetchResult<QueueMetrics> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .map_err(|e| FetchError::Transport(DisplayErrorContext(&e).to_string()))?;

        parse_counts(output.attributes())
    }
}

fn parse_counts(attributes: Option<&HashMap<QueueAttributeName, String>>) -> FetchResult<QueueMetrics> {
    let attributes =
        attributes.ok_or_else(|| FetchError::Malformed("no queue attributes returned".to_string()))?;

    Ok(QueueMetrics {
        visible: count(attributes, QueueAttributeName::ApproximateNumberOfMessages)?,
        invisible: count(
            attributes,
            QueueAttributeName::ApproximateNumberOfMessagesNotVisible,
        )?,
    })
}

fn count(
    attributes: &HashMap<QueueAttributeName, String>,
    name: QueueAttributeName,
) -> FetchResult<u64> {
    let raw = attributes
        .get(&name)
        .ok_or_else(|| FetchError::Malformed(format!("missing attribute {}", name.as_str())))?;
    raw.trim().parse::<u64>().map_err(|_| {
        FetchError::Malformed(format!("attribute {} is not a count: {raw:?}", name.as_str()))
    })
}
