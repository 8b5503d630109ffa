//! Domain models for the blueprint governance service
//!
//! These types represent the core entities in the system:
//! - Patterns: Reusable infrastructure templates (CDK apps or CloudFormation)
//! - Pattern versions: One published build of a pattern per commit
//! - Attributes: Normalized key:value tags used to classify patterns
//! - Subscriptions: Email addresses interested in new versions of a pattern

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// CloudFormation-style stack statuses recorded on a pattern
pub mod stack_status {
    pub const CREATE_IN_PROGRESS: &str = "CREATE_IN_PROGRESS";
    pub const CREATE_FAILED: &str = "CREATE_FAILED";
    pub const UPDATE_IN_PROGRESS: &str = "UPDATE_IN_PROGRESS";
    pub const UPDATE_FAILED: &str = "UPDATE_FAILED";
}

/// Kind of infrastructure template a pattern publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternType {
    #[serde(rename = "CDK")]
    Cdk,
    #[serde(rename = "CFN")]
    Cfn,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Cdk => "CDK",
            PatternType::Cfn => "CFN",
        }
    }

    /// Directory holding the seed files for a new repository of this type
    pub fn seed_dir(&self) -> &'static str {
        match self {
            PatternType::Cdk => "cdk",
            PatternType::Cfn => "cfn",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source repository hosting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    GitHub,
    CodeCommit,
}

impl RepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::GitHub => "github",
            RepositoryType::CodeCommit => "codecommit",
        }
    }
}

/// Where the source of a pattern lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRepository {
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
    /// GitHub organization or user; the AWS account for CodeCommit
    pub repo_owner: String,
    pub branch_name: String,
    pub repo_name: String,
}

/// Pattern metadata record, one per pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    /// Slug of the pattern name, primary key
    pub pattern_id: String,
    pub name: String,
    pub description: String,
    pub pattern_type: PatternType,
    pub owner: String,
    pub email: String,
    pub infrastructure_stack_status: String,
    pub pattern_repo_url: String,
    pub code_repository: CodeRepository,
    /// Attribute references (key -> value)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_id: Option<String>,
    pub created_timestamp: DateTime<Utc>,
    pub updated_timestamp: DateTime<Utc>,
}

/// Request to create a new pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatternRequest {
    pub name: String,
    pub description: String,
    pub pattern_type: PatternType,
    pub owner: String,
    pub email: String,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, String>>,
    /// Use an existing repository instead of creating one
    #[serde(default)]
    pub code_repository_details: Option<CodeRepository>,
}

/// Request to update pattern metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatternRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, String>>,
}

/// Pattern metadata together with its published versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDetails {
    pub metadata: Pattern,
    pub versions: Vec<PatternVersion>,
}

/// One page of patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPatternsResponse {
    pub results: Vec<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// npm package descriptor emitted by the build stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpmPackage {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Kind of published artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactType {
    Control,
    Image,
    Markdown,
}

/// Artifact produced by a pattern build (controls, images, docs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub location: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub name: String,
}

/// CodeArtifact repository that received the npm packages of a CDK pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifactDetails {
    pub region: String,
    pub account: String,
    pub domain: String,
    pub repository: String,
}

/// Service Catalog product backing one package of a CFN pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCatalogProduct {
    /// `{patternId}_{packageName}`
    pub name: String,
    pub account: String,
    pub region: String,
    pub product_id: String,
    pub provisioning_artifact_id: String,
}

/// Published version of a pattern, one per (patternId, commitId)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternVersion {
    pub pattern_id: String,
    pub commit_id: String,
    pub commit_message: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub changed_packages: Vec<NpmPackage>,
    #[serde(default)]
    pub all_packages: Vec<NpmPackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_artifact_details: Option<CodeArtifactDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_service_catalog_products: Option<Vec<ServiceCatalogProduct>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_service_catalog_products: Option<Vec<ServiceCatalogProduct>>,
    pub created_timestamp: DateTime<Utc>,
}

/// Normalized key:value tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    /// `KEY:VALUE`, uppercased
    pub id: String,
    /// `key:value` in original case
    pub name: String,
    pub key: String,
    pub value: String,
    /// Uppercased key, used for range queries
    pub key_index: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub create_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

/// Request to create an attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttributeRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// Request to update an attribute; key and value must not change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAttributeRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// One page of attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAttributesResponse {
    pub results: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Email subscription to new versions of a pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub pattern_id: String,
    pub email: String,
    pub created_timestamp: DateTime<Utc>,
}

impl Subscription {
    pub fn new(pattern_id: String, email: String) -> Self {
        Self {
            pattern_id,
            email,
            created_timestamp: Utc::now(),
        }
    }
}

/// Request to subscribe to or unsubscribe from a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub pattern_id: String,
    pub email: String,
}

/// List of subscriptions for a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSubscriptionsResponse {
    pub results: Vec<Subscription>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, retryable: bool) -> Self {
        Self {
            error: error.into(),
            retryable,
        }
    }
}

impl From<&crate::errors::Error> for ErrorResponse {
    fn from(err: &crate::errors::Error) -> Self {
        Self::new(err.to_string(), err.retryable())
    }
}
