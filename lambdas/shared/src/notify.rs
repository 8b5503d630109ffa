//! Outbound notifications
//!
//! SNS messages for new pattern versions, SQS requests to sync attribute
//! changes into AppRegistry, and anonymous usage metrics. Sync requests and
//! usage metrics are best-effort: failures are logged and never reach the
//! caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::UsageConfig;
use crate::errors::{Error, Result};
use crate::models::Attribute;
use crate::validation::attribute_group_name;

pub const SYNC_MESSAGE_GROUP_ID: &str = "appregistry-sync";
/// SNS rejects longer subjects
const MAX_SUBJECT_LEN: usize = 100;
const METRICS_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<()>;
}

pub struct SnsNotifier {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: aws_sdk_sns::Client, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<()> {
        let subject: String = subject.chars().take(MAX_SUBJECT_LEN).collect();
        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to publish notification: {}", aws_sdk_sns::error::DisplayErrorContext(&e))))?;

        info!(message_id = ?output.message_id, "Published notification");
        Ok(())
    }
}

#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn send(&self, body: &str, deduplication_id: &str) -> Result<()>;
}

pub struct SqsSyncQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsSyncQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl SyncQueue for SqsSyncQueue {
    async fn send(&self, body: &str, deduplication_id: &str) -> Result<()> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .message_group_id(SYNC_MESSAGE_GROUP_ID)
            .message_deduplication_id(deduplication_id)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to enqueue sync request: {}", aws_sdk_sqs::error::DisplayErrorContext(&e))))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

/// Request for the AppRegistry sync consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRegistrySyncMessage {
    pub action: SyncAction,
    pub attribute_group_name: String,
    pub attribute: Attribute,
    pub requested_at: DateTime<Utc>,
}

impl AppRegistrySyncMessage {
    pub fn new(action: SyncAction, attribute: &Attribute) -> Self {
        Self {
            action,
            attribute_group_name: attribute_group_name(&attribute.key, &attribute.value),
            attribute: attribute.clone(),
            requested_at: Utc::now(),
        }
    }
}

fn deduplication_id(body: &str) -> String {
    Sha256::digest(body.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Ask the sync consumer to mirror an attribute change
///
/// Returns `None` when no queue is configured or the send failed.
pub async fn enqueue_attribute_sync(
    queue: Option<&dyn SyncQueue>,
    action: SyncAction,
    attribute: &Attribute,
) -> Option<()> {
    let queue = queue?;
    let body = match serde_json::to_string(&AppRegistrySyncMessage::new(action, attribute)) {
        Ok(body) => body,
        Err(e) => {
            warn!(attribute_id = %attribute.id, error = %e, "Failed to encode sync request");
            return None;
        }
    };

    match queue.send(&body, &deduplication_id(&body)).await {
        Ok(()) => {
            debug!(attribute_id = %attribute.id, action = ?action, "Enqueued AppRegistry sync");
            Some(())
        }
        Err(e) => {
            warn!(attribute_id = %attribute.id, action = ?action, error = %e, "AppRegistry sync not enqueued");
            None
        }
    }
}

#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn report(&self, data: Value) -> Result<()>;
}

/// Anonymous metric envelope
#[derive(Debug, Clone, Serialize)]
pub struct UsageMetric {
    #[serde(rename = "Solution")]
    pub solution: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
    #[serde(rename = "Data")]
    pub data: Value,
}

pub struct HttpUsageReporter {
    client: reqwest::Client,
    config: UsageConfig,
}

impl HttpUsageReporter {
    pub fn new(config: UsageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(METRICS_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build metrics client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn metric(&self, data: Value) -> UsageMetric {
        UsageMetric {
            solution: self.config.solution_id.clone(),
            version: self.config.solution_version.clone(),
            uuid: self.config.anonymous_data_uuid.clone(),
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            data,
        }
    }
}

#[async_trait]
impl UsageReporter for HttpUsageReporter {
    async fn report(&self, data: Value) -> Result<()> {
        let response = self
            .client
            .post(&self.config.metrics_url)
            .json(&self.metric(data))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Failed to send usage metric: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "Usage metric rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Send a usage metric if reporting is configured; failures are swallowed
pub async fn report_usage(reporter: Option<&dyn UsageReporter>, data: Value) -> Option<()> {
    match reporter?.report(data).await {
        Ok(()) => Some(()),
        Err(e) => {
            warn!(error = %e, "Usage metric not sent");
            None
        }
    }
}
