//! Registering a published pattern version
//!
//! The version row and the pattern's `lastCommitId` are written in one
//! transaction, then subscribers of the notification topic are told about it.

use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{info, warn};

use crate::errors::Result;
use crate::models::{
    Artifact, ArtifactType, CodeArtifactDetails, NpmPackage, Pattern, PatternVersion, ServiceCatalogProduct,
};
use crate::notify::Notifier;
use crate::pipeline::{decode_b64_json, decode_optional_b64_json, fail_job, CodePipelineEvent, PipelineReporter};
use crate::store::PatternStore;

/// `UserParameters` of the register action
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RegisterParameters {
    pub pattern_name: String,
    pub commit_id: String,
    #[serde(default)]
    pub commit_message: String,
    pub changed_packages: String,
    pub all_packages: String,
    #[serde(default)]
    pub control_artifacts_location: Option<String>,
    #[serde(default)]
    pub control_artifacts_names: Option<String>,
    #[serde(default)]
    pub image_artifacts_location: Option<String>,
    #[serde(default)]
    pub image_artifacts_names: Option<String>,
    #[serde(default)]
    pub markdown_artifacts_location: Option<String>,
    #[serde(default)]
    pub markdown_artifacts_names: Option<String>,
    #[serde(default)]
    pub codeartifact_domain: Option<String>,
    #[serde(default)]
    pub codeartifact_repository: Option<String>,
    #[serde(default)]
    pub codeartifact_account: Option<String>,
    #[serde(default)]
    pub codeartifact_region: Option<String>,
    #[serde(default)]
    pub changed_service_catalog_products: Option<String>,
    #[serde(default)]
    pub all_service_catalog_products: Option<String>,
}

impl RegisterParameters {
    /// Artifacts of every type, each name joined onto its type's location
    pub fn artifacts(&self) -> Vec<Artifact> {
        let groups = [
            (ArtifactType::Control, &self.control_artifacts_location, &self.control_artifacts_names),
            (ArtifactType::Image, &self.image_artifacts_location, &self.image_artifacts_names),
            (ArtifactType::Markdown, &self.markdown_artifacts_location, &self.markdown_artifacts_names),
        ];

        groups
            .into_iter()
            .flat_map(|(artifact_type, location, names)| {
                join_artifacts(artifact_type, location.as_deref(), names.as_deref())
            })
            .collect()
    }

    /// Present only when every CodeArtifact parameter is set
    pub fn code_artifact_details(&self) -> Option<CodeArtifactDetails> {
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        Some(CodeArtifactDetails {
            region: non_empty(&self.codeartifact_region)?,
            account: non_empty(&self.codeartifact_account)?,
            domain: non_empty(&self.codeartifact_domain)?,
            repository: non_empty(&self.codeartifact_repository)?,
        })
    }
}

fn join_artifacts(artifact_type: ArtifactType, location: Option<&str>, names: Option<&str>) -> Vec<Artifact> {
    let (location, names) = match (location, names) {
        (Some(location), Some(names)) if !location.trim().is_empty() => (location.trim().trim_end_matches('/'), names),
        _ => return Vec::new(),
    };

    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| Artifact {
            location: format!("{}/{}", location, name),
            artifact_type,
            name: name.to_string(),
        })
        .collect()
}

/// Result of a register run
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// No package changed; nothing was written
    NoChanges,
    Registered { notified: bool },
}

pub struct RegisterService<'a> {
    pub patterns: &'a dyn PatternStore,
    pub notifier: &'a dyn Notifier,
}

impl<'a> RegisterService<'a> {
    /// Handle one CodePipeline job end to end, reporting its outcome
    pub async fn run_job(&self, reporter: &dyn PipelineReporter, event: &CodePipelineEvent) -> Result<RegisterOutcome> {
        let outcome = match event.user_parameters::<RegisterParameters>() {
            Ok(params) => self.register(&params).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => {
                reporter.put_job_success(event.job_id(), &BTreeMap::new()).await?;
                Ok(outcome)
            }
            Err(e) => Err(fail_job(reporter, event.job_id(), e).await),
        }
    }

    pub async fn register(&self, params: &RegisterParameters) -> Result<RegisterOutcome> {
        let changed_packages: Vec<NpmPackage> = decode_b64_json(&params.changed_packages)?;
        if changed_packages.is_empty() {
            info!(pattern = %params.pattern_name, commit = %params.commit_id, "No changed packages, nothing to register");
            return Ok(RegisterOutcome::NoChanges);
        }

        let version = PatternVersion {
            pattern_id: params.pattern_name.clone(),
            commit_id: params.commit_id.clone(),
            commit_message: params.commit_message.clone(),
            artifacts: params.artifacts(),
            changed_packages,
            all_packages: decode_b64_json(&params.all_packages)?,
            code_artifact_details: params.code_artifact_details(),
            changed_service_catalog_products: decode_optional_b64_json(
                params.changed_service_catalog_products.as_deref(),
            )?,
            all_service_catalog_products: decode_optional_b64_json(params.all_service_catalog_products.as_deref())?,
            created_timestamp: Utc::now(),
        };

        self.patterns.register_version(&version).await?;
        info!(
            pattern = %version.pattern_id,
            commit = %version.commit_id,
            packages = version.changed_packages.len(),
            "Registered pattern version"
        );

        let pattern = match self.patterns.get_pattern(&version.pattern_id).await? {
            Some(pattern) => pattern,
            None => {
                warn!(pattern = %version.pattern_id, "Pattern metadata not found, skipping notification");
                return Ok(RegisterOutcome::Registered { notified: false });
            }
        };

        let (subject, message) = version_notification(&pattern, &version);
        self.notifier.publish(&subject, &message).await?;
        Ok(RegisterOutcome::Registered { notified: true })
    }
}

fn product_lines(out: &mut String, products: &[ServiceCatalogProduct]) {
    for product in products {
        let _ = writeln!(
            out,
            "  - {} (product {}, provisioning artifact {}, {} {})",
            product.name, product.product_id, product.provisioning_artifact_id, product.account, product.region
        );
    }
}

/// Subject and body of the new-version notification
pub fn version_notification(pattern: &Pattern, version: &PatternVersion) -> (String, String) {
    let subject = format!("New version of pattern {} published", pattern.name);

    let mut body = String::new();
    let _ = writeln!(body, "A new version of pattern {} has been published.", pattern.name);
    let _ = writeln!(body);
    let _ = writeln!(body, "Description: {}", pattern.description);
    let _ = writeln!(body, "Repository: {}", pattern.pattern_repo_url);
    let _ = writeln!(body, "Commit: {}", version.commit_id);
    let _ = writeln!(body, "Commit message: {}", version.commit_message);

    if !pattern.attributes.is_empty() {
        let attributes: Vec<String> = pattern
            .attributes
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        let _ = writeln!(body, "Attributes: {}", attributes.join(", "));
    }

    let _ = writeln!(body, "Modified packages:");
    for package in &version.changed_packages {
        let _ = writeln!(body, "  - {}@{}", package.name, package.version);
    }

    if let Some(details) = &version.code_artifact_details {
        let _ = writeln!(
            body,
            "CodeArtifact: {}/{} ({} {})",
            details.domain, details.repository, details.account, details.region
        );
    }
    if let Some(products) = version.changed_service_catalog_products.as_deref().filter(|p| !p.is_empty()) {
        let _ = writeln!(body, "Service Catalog products:");
        product_lines(&mut body, products);
    }

    (subject, body)
}
