//! Build pipeline plumbing
//!
//! - CodePipeline custom-action job events and their `UserParameters`
//! - Job result reporting (`PutJobSuccessResult` / `PutJobFailureResult`)
//! - Starting the CodeBuild project that provisions a pattern's pipeline

use async_trait::async_trait;
use aws_sdk_codebuild::types::{Build, EnvironmentVariable, EnvironmentVariableType};
use aws_sdk_codepipeline::types::{FailureDetails, FailureType};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info};

use crate::errors::{Error, Result};
use crate::models::Pattern;

/// CodePipeline failure messages are capped by the service
const MAX_FAILURE_MESSAGE_LEN: usize = 5000;

/// Lambda payload for a CodePipeline custom action
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodePipelineEvent {
    #[serde(rename = "CodePipeline.job")]
    pub job: CodePipelineJob,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePipelineJob {
    pub id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub data: JobData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    pub action_configuration: ActionConfiguration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionConfiguration {
    pub configuration: ActionSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionSettings {
    #[serde(rename = "FunctionName", default)]
    pub function_name: Option<String>,
    #[serde(rename = "UserParameters", default)]
    pub user_parameters: Option<String>,
}

impl CodePipelineEvent {
    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// Parse the action's `UserParameters` JSON string
    pub fn user_parameters<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self
            .job
            .data
            .action_configuration
            .configuration
            .user_parameters
            .as_deref()
            .ok_or_else(|| Error::Validation("UserParameters missing from job".to_string()))?;
        Ok(serde_json::from_str(raw)?)
    }
}

/// Decode a base64-encoded JSON value
pub fn decode_b64_json<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Validation(format!("Invalid base64 value: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode a value as base64 JSON
pub fn encode_b64_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(STANDARD.encode(serde_json::to_vec(value)?))
}

/// Decode an optional base64 JSON value; absent or blank means `None`
pub fn decode_optional_b64_json<T: DeserializeOwned>(encoded: Option<&str>) -> Result<Option<T>> {
    match encoded.map(str::trim) {
        Some(value) if !value.is_empty() => decode_b64_json(value).map(Some),
        _ => Ok(None),
    }
}

#[async_trait]
pub trait PipelineReporter: Send + Sync {
    async fn put_job_success(
        &self,
        job_id: &str,
        output_variables: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn put_job_failure(&self, job_id: &str, message: &str) -> Result<()>;
}

/// Reports job results back to CodePipeline
pub struct CodePipelineReporter {
    client: aws_sdk_codepipeline::Client,
}

impl CodePipelineReporter {
    pub fn new(client: aws_sdk_codepipeline::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineReporter for CodePipelineReporter {
    async fn put_job_success(
        &self,
        job_id: &str,
        output_variables: &BTreeMap<String, String>,
    ) -> Result<()> {
        let variables: HashMap<String, String> = output_variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.client
            .put_job_success_result()
            .job_id(job_id)
            .set_output_variables(if variables.is_empty() { None } else { Some(variables) })
            .send()
            .await
            .map_err(|e| {
                Error::Pipeline(aws_sdk_codepipeline::error::DisplayErrorContext(&e).to_string())
            })?;

        info!(job_id = %job_id, "Reported job success");
        Ok(())
    }

    async fn put_job_failure(&self, job_id: &str, message: &str) -> Result<()> {
        let message: String = message.chars().take(MAX_FAILURE_MESSAGE_LEN).collect();

        let details = FailureDetails::builder()
            .r#type(FailureType::JobFailed)
            .message(message)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.client
            .put_job_failure_result()
            .job_id(job_id)
            .failure_details(details)
            .send()
            .await
            .map_err(|e| {
                Error::Pipeline(aws_sdk_codepipeline::error::DisplayErrorContext(&e).to_string())
            })?;

        info!(job_id = %job_id, "Reported job failure");
        Ok(())
    }
}

/// Report a failed job to CodePipeline and hand the error back
pub async fn fail_job(reporter: &dyn PipelineReporter, job_id: &str, e: Error) -> Error {
    error!(job_id = %job_id, error = %e, "Pipeline job failed");
    if let Err(report_error) = reporter.put_job_failure(job_id, &e.to_string()).await {
        error!(job_id = %job_id, error = %report_error, "Failed to report job failure");
    }
    e
}

/// Report a finished job to CodePipeline
///
/// A failed job is reported and its error returned so the invocation fails too.
pub async fn report_job_outcome(
    reporter: &dyn PipelineReporter,
    job_id: &str,
    outcome: Result<BTreeMap<String, String>>,
) -> Result<()> {
    match outcome {
        Ok(output_variables) => reporter.put_job_success(job_id, &output_variables).await,
        Err(e) => Err(fail_job(reporter, job_id, e).await),
    }
}

/// Starts the build that provisions a pattern's pipeline
#[async_trait]
pub trait BuildLauncher: Send + Sync {
    /// Returns the build id
    async fn start_build(&self, pattern: &Pattern) -> Result<String>;
}

/// Environment handed to the pattern build
pub fn build_environment(pattern: &Pattern) -> Vec<(&'static str, String)> {
    let repo = &pattern.code_repository;
    vec![
        ("PATTERN_NAME", pattern.pattern_id.clone()),
        ("PATTERN_TYPE", pattern.pattern_type.as_str().to_string()),
        ("PATTERN_REPO_TYPE", repo.repo_type.as_str().to_string()),
        ("PATTERN_REPO_OWNER", repo.repo_owner.clone()),
        ("PATTERN_REPO_NAME", repo.repo_name.clone()),
        ("PATTERN_REPO_BRANCH", repo.branch_name.clone()),
    ]
}

fn started_build_id(build: Option<Build>, pattern_id: &str) -> Result<String> {
    build
        .and_then(|b| b.id)
        .ok_or_else(|| Error::Pipeline(format!("Build for {} started without an id", pattern_id)))
}

pub struct CodeBuildLauncher {
    client: aws_sdk_codebuild::Client,
    project_name: String,
}

impl CodeBuildLauncher {
    pub fn new(client: aws_sdk_codebuild::Client, project_name: impl Into<String>) -> Self {
        Self {
            client,
            project_name: project_name.into(),
        }
    }
}

#[async_trait]
impl BuildLauncher for CodeBuildLauncher {
    async fn start_build(&self, pattern: &Pattern) -> Result<String> {
        let variables = build_environment(pattern)
            .into_iter()
            .map(|(name, value)| {
                EnvironmentVariable::builder()
                    .name(name)
                    .value(value)
                    .r#type(EnvironmentVariableType::Plaintext)
                    .build()
                    .map_err(|e| Error::Internal(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .start_build()
            .project_name(&self.project_name)
            .set_environment_variables_override(Some(variables))
            .send()
            .await
            .map_err(|e| {
                Error::Pipeline(aws_sdk_codebuild::error::DisplayErrorContext(&e).to_string())
            })?;

        let build_id = started_build_id(output.build_value, &pattern.pattern_id)?;
        info!(pattern_id = %pattern.pattern_id, build_id = %build_id, "Started pattern build");
        Ok(build_id)
    }
}
