//! Error types for the blueprint governance service

use thiserror::Error;

/// Result type alias using the governance Error
pub type Result<T> = std::result::Result<T, Error>;

/// Governance error types
///
/// Every variant carries an HTTP status, a stable code and a retryable flag so
/// that API handlers can translate it straight into an error envelope.
#[derive(Error, Debug)]
pub enum Error {
    /// Request had no body
    #[error("Request body is missing")]
    MissingBody,

    /// Validation error (one or more problems joined together)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced attributes do not exist
    #[error("Invalid attributes: {}", .0.join(", "))]
    InvalidAttributes(Vec<String>),

    /// Pattern not found
    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    /// Pattern already exists
    #[error("Pattern already exists: {0}")]
    PatternAlreadyExists(String),

    /// Attribute not found
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// Attribute already exists
    #[error("Attribute already exists: {0}")]
    AttributeAlreadyExists(String),

    /// Attempt to change the key or value of an attribute
    #[error("Attribute key and value cannot be changed: {0}")]
    AttributeKeyImmutable(String),

    /// Attribute still referenced by a pattern
    #[error("Attribute is in use by pattern {pattern_id}: {attribute_id}")]
    AttributeInUse {
        attribute_id: String,
        pattern_id: String,
    },

    /// Subscription not found
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Pattern has no code repository details
    #[error("No code repository details for pattern: {0}")]
    RepositoryMissing(String),

    /// Repository hosting error (GitHub / CodeCommit)
    #[error("Repository error: {0}")]
    Repository(String),

    /// Build pipeline error (CodeBuild / CodePipeline)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// DynamoDB error
    #[error("Database error: {0}")]
    Database(String),

    /// JSON Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// DynamoDB serialization error
    #[error("DynamoDB serialization error: {0}")]
    DynamoSerialization(String),

    /// CloudFormation template could not be parsed or rewritten
    #[error("Template error: {0}")]
    Template(String),

    /// Other AWS service error
    #[error("AWS service error: {0}")]
    Aws(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a validation error from a list of collected problems
    pub fn validation(problems: Vec<String>) -> Self {
        Error::Validation(problems.join("; "))
    }

    /// Returns the error code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingBody => "missing_body",
            Error::Validation(_) => "validation_error",
            Error::InvalidAttributes(_) => "invalid_attributes",
            Error::PatternNotFound(_) => "pattern_not_found",
            Error::PatternAlreadyExists(_) => "pattern_already_exists",
            Error::AttributeNotFound(_) => "attribute_not_found",
            Error::AttributeAlreadyExists(_) => "attribute_already_exists",
            Error::AttributeKeyImmutable(_) => "attribute_key_immutable",
            Error::AttributeInUse { .. } => "attribute_in_use",
            Error::SubscriptionNotFound(_) => "subscription_not_found",
            Error::RepositoryMissing(_) => "repository_missing",
            Error::Repository(_) => "repository_error",
            Error::Pipeline(_) => "pipeline_error",
            Error::Database(_) => "database_error",
            Error::Serialization(_) => "serialization_error",
            Error::DynamoSerialization(_) => "serialization_error",
            Error::Template(_) => "template_error",
            Error::Aws(_) => "aws_error",
            Error::Config(_) => "configuration_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MissingBody => 400,
            Error::Validation(_) => 400,
            Error::InvalidAttributes(_) => 400,
            Error::PatternNotFound(_) => 404,
            Error::PatternAlreadyExists(_) => 409,
            Error::AttributeNotFound(_) => 404,
            Error::AttributeAlreadyExists(_) => 409,
            Error::AttributeKeyImmutable(_) => 404,
            Error::AttributeInUse { .. } => 400,
            Error::SubscriptionNotFound(_) => 404,
            Error::RepositoryMissing(_) => 410,
            Error::Repository(_) => 500,
            Error::Pipeline(_) => 500,
            Error::Database(_) => 500,
            Error::Serialization(_) => 400,
            Error::DynamoSerialization(_) => 500,
            Error::Template(_) => 500,
            Error::Aws(_) => 500,
            Error::Config(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn retryable(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Aws(_) | Error::Pipeline(_))
    }
}
