//! Environment configuration
//!
//! Every Lambda reads its settings once at start-up. Each struct takes a
//! lookup function so tests can supply values without touching the process
//! environment.

use std::path::PathBuf;

use crate::errors::{Error, Result};
use crate::repo::RepoBuilderKind;

const DEFAULT_GITHUB_URL: &str = "https://api.github.com";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_TEMPLATE_ROOT: &str = "./initial-repo";

/// Read a variable from the process environment, treating empty as unset
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name).ok_or_else(|| Error::Config(format!("{} environment variable not set", name)))
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> bool {
    lookup(name)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// DynamoDB table names
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub pattern_meta_table: String,
    pub pattern_publish_table: String,
    pub attributes_table: String,
    pub subscriptions_table: String,
}

impl TableConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            pattern_meta_table: required(&lookup, "PATTERN_META_TABLE")?,
            pattern_publish_table: required(&lookup, "PATTERN_PUBLISH_TABLE")?,
            attributes_table: required(&lookup, "ATTRIBUTES_TABLE")?,
            subscriptions_table: required(&lookup, "SUBSCRIPTIONS_TABLE")?,
        })
    }
}

/// Source repository provisioning settings
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub kind: RepoBuilderKind,
    pub github_url: String,
    pub github_org: Option<String>,
    /// SSM SecureString holding the GitHub token
    pub github_token_parameter: Option<String>,
    pub github_token: Option<String>,
    pub github_webhook_url: Option<String>,
    pub github_webhook_secret: Option<String>,
    pub template_root: PathBuf,
    pub default_branch: String,
    pub code_owners: Vec<String>,
}

impl RepoConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let kind = match lookup("REPO_TYPE") {
            Some(value) => value.parse()?,
            None => RepoBuilderKind::GitHub,
        };

        let code_owners = lookup("CODE_OWNERS")
            .map(|owners| {
                owners
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            kind,
            github_url: lookup("GITHUB_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GITHUB_URL.to_string()),
            github_org: lookup("GITHUB_ORG"),
            github_token_parameter: lookup("GITHUB_TOKEN_PARAMETER"),
            github_token: lookup("GITHUB_TOKEN"),
            github_webhook_url: lookup("GITHUB_WEBHOOK_URL"),
            github_webhook_secret: lookup("GITHUB_WEBHOOK_SECRET"),
            template_root: lookup("BLUEPRINT_TEMPLATE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_ROOT)),
            default_branch: lookup("DEFAULT_BRANCH").unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            code_owners,
        };

        if config.kind == RepoBuilderKind::GitHub && config.github_org.is_none() {
            return Err(Error::Config("GITHUB_ORG environment variable not set".to_string()));
        }

        Ok(config)
    }
}

/// CodeBuild project that provisions a pattern's pipeline
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub project_name: String,
}

impl BuildConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            project_name: required(&lookup, "BLUEPRINT_BUILD_PROJECT")?,
        })
    }
}

/// Settings for publishing CFN packages to Service Catalog
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub artifact_bucket: String,
    pub portfolio_id: String,
    pub appregistry_enabled: bool,
}

impl PublishConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            artifact_bucket: required(&lookup, "ARTIFACT_BUCKET")?,
            portfolio_id: required(&lookup, "PORTFOLIO_ID")?,
            appregistry_enabled: flag(&lookup, "APPREGISTRY_ENABLED"),
        })
    }
}

/// SNS topic receiving version-published notifications
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub topic_arn: String,
}

impl NotificationConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            topic_arn: required(&lookup, "NOTIFICATION_TOPIC_ARN")?,
        })
    }
}

/// FIFO queue receiving AppRegistry sync requests for attribute changes
///
/// Optional: without it attribute changes are not propagated.
#[derive(Debug, Clone)]
pub struct SyncQueueConfig {
    pub queue_url: String,
}

impl SyncQueueConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        lookup("APPREGISTRY_SYNC_QUEUE_URL").map(|queue_url| Self { queue_url })
    }
}

/// Anonymous usage reporting; present only when every variable is set
#[derive(Debug, Clone)]
pub struct UsageConfig {
    pub solution_id: String,
    pub solution_version: String,
    pub anonymous_data_uuid: String,
    pub metrics_url: String,
}

impl UsageConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            solution_id: lookup("SOLUTION_ID")?,
            solution_version: lookup("SOLUTION_VERSION")?,
            anonymous_data_uuid: lookup("ANONYMOUS_DATA_UUID")?,
            metrics_url: lookup("METRICS_URL")?,
        })
    }
}
