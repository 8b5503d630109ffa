//! Blueprint Governance Core Library
//!
//! Shared functionality for the blueprint governance Lambda functions including:
//! - Domain models and request validation
//! - DynamoDB persistence
//! - Repository provisioning (GitHub / CodeCommit)
//! - CodeBuild, CodePipeline, Service Catalog, SNS and SQS adapters
//! - The pattern, attribute, subscription, publish and register workflows
//! - Error types

pub mod attributes;
pub mod blueprints;
pub mod catalog;
pub mod compensation;
pub mod config;
pub mod dynamo;
pub mod errors;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod register;
pub mod repo;
pub mod store;
pub mod subscriptions;
pub mod template;
pub mod validation;

#[cfg(test)]
mod testing;

pub use dynamo::DynamoClient;
pub use errors::{Error, Result};
pub use models::*;
