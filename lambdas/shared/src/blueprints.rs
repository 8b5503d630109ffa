//! Pattern lifecycle: creation, lookup, metadata updates and pipeline re-runs

use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::errors::{Error, Result};
use crate::models::{
    stack_status, CodeRepository, CreatePatternRequest, ListPatternsResponse, Pattern,
    PatternDetails, UpdatePatternRequest,
};
use crate::notify::{report_usage, UsageReporter};
use crate::pipeline::BuildLauncher;
use crate::repo::{BlueprintRepoBuilder, NewRepository};
use crate::store::{AttributeStore, PatternStore};
use crate::validation::{make_attribute_id, validate_create_pattern, validate_update_pattern};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`
pub fn page_limit(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Collaborators of the pattern endpoints
pub struct BlueprintService<'a> {
    pub patterns: &'a dyn PatternStore,
    pub attributes: &'a dyn AttributeStore,
    pub repo_builder: &'a dyn BlueprintRepoBuilder,
    pub builds: &'a dyn BuildLauncher,
    pub usage: Option<&'a dyn UsageReporter>,
    pub code_owners: &'a [String],
}

impl<'a> BlueprintService<'a> {
    /// Create a pattern, provisioning its repository unless one is supplied
    ///
    /// A build that cannot be started still persists the pattern, with
    /// `CREATE_FAILED`, before the error is returned. The repository is kept.
    pub async fn create(&self, request: CreatePatternRequest) -> Result<Pattern> {
        let pattern_id = validate_create_pattern(&request)?;

        if self.patterns.get_pattern(&pattern_id).await?.is_some() {
            return Err(Error::PatternAlreadyExists(pattern_id));
        }

        let attributes = request.attributes.clone().unwrap_or_default();
        self.check_attributes_exist(&attributes).await?;

        let code_repository = match &request.code_repository_details {
            Some(existing) => {
                info!(pattern_id = %pattern_id, repo = %existing.repo_name, "Using existing repository");
                CodeRepository {
                    repo_name: if existing.repo_name.trim().is_empty() {
                        pattern_id.clone()
                    } else {
                        existing.repo_name.clone()
                    },
                    ..existing.clone()
                }
            }
            None => self.provision_repository(&pattern_id, &request).await?,
        };

        if code_repository.repo_name.trim().is_empty() {
            return Err(Error::RepositoryMissing(pattern_id));
        }

        let now = Utc::now();
        let mut pattern = Pattern {
            pattern_id: pattern_id.clone(),
            name: request.name.trim().to_string(),
            description: request.description,
            pattern_type: request.pattern_type,
            owner: request.owner,
            email: request.email,
            infrastructure_stack_status: stack_status::CREATE_IN_PROGRESS.to_string(),
            pattern_repo_url: self.repo_builder.repo_url(&code_repository),
            code_repository,
            attributes,
            last_commit_id: None,
            created_timestamp: now,
            updated_timestamp: now,
        };

        if let Err(e) = self.builds.start_build(&pattern).await {
            error!(pattern_id = %pattern_id, error = %e, "Failed to start pattern build");
            pattern.infrastructure_stack_status = stack_status::CREATE_FAILED.to_string();
            self.patterns.put_pattern(&pattern).await?;
            return Err(e);
        }

        self.patterns.put_pattern(&pattern).await?;
        info!(pattern_id = %pattern_id, pattern_type = %pattern.pattern_type, "Created pattern");

        report_usage(
            self.usage,
            json!({
                "event": "CreatePattern",
                "patternType": pattern.pattern_type.as_str(),
                "repositoryType": pattern.code_repository.repo_type.as_str(),
                "attributeCount": pattern.attributes.len(),
            }),
        )
        .await;

        Ok(pattern)
    }

    async fn check_attributes_exist(&self, attributes: &BTreeMap<String, String>) -> Result<()> {
        let mut invalid = Vec::new();
        for (key, value) in attributes {
            if self
                .attributes
                .get_attribute(&make_attribute_id(key, value))
                .await?
                .is_none()
            {
                invalid.push(format!("{}:{}", key, value));
            }
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidAttributes(invalid))
        }
    }

    async fn provision_repository(
        &self,
        pattern_id: &str,
        request: &CreatePatternRequest,
    ) -> Result<CodeRepository> {
        let repo = self
            .repo_builder
            .create_and_initialize_repo(&NewRepository {
                pattern_id: pattern_id.to_string(),
                description: request.description.clone(),
                pattern_type: request.pattern_type,
            })
            .await?;

        // CODEOWNERS goes in before protection locks the branch
        if !self.code_owners.is_empty() {
            self.repo_builder.add_codeowners(&repo, self.code_owners).await?;
        }
        self.repo_builder.enable_branch_protection(&repo).await?;

        Ok(repo)
    }

    pub async fn get(&self, pattern_id: &str) -> Result<PatternDetails> {
        let metadata = self
            .patterns
            .get_pattern(pattern_id)
            .await?
            .ok_or_else(|| Error::PatternNotFound(pattern_id.to_string()))?;
        let versions = self.patterns.list_versions(pattern_id).await?;

        Ok(PatternDetails { metadata, versions })
    }

    pub async fn list(&self, limit: Option<u32>, next_token: Option<&str>) -> Result<ListPatternsResponse> {
        let page = self.patterns.list_patterns(page_limit(limit), next_token).await?;
        Ok(ListPatternsResponse {
            results: page.items,
            next_token: page.next_token,
        })
    }

    pub async fn update(&self, pattern_id: &str, request: UpdatePatternRequest) -> Result<Pattern> {
        validate_update_pattern(&request)?;

        let mut pattern = self
            .patterns
            .get_pattern(pattern_id)
            .await?
            .ok_or_else(|| Error::PatternNotFound(pattern_id.to_string()))?;

        if let Some(attributes) = &request.attributes {
            self.check_attributes_exist(attributes).await?;
        }

        if let Some(description) = request.description {
            pattern.description = description;
        }
        if let Some(owner) = request.owner {
            pattern.owner = owner;
        }
        if let Some(email) = request.email {
            pattern.email = email;
        }
        if let Some(attributes) = request.attributes {
            pattern.attributes = attributes;
        }
        pattern.updated_timestamp = Utc::now();

        self.patterns.put_pattern(&pattern).await?;
        info!(pattern_id = %pattern_id, "Updated pattern metadata");
        Ok(pattern)
    }

    /// Start the pattern's build again
    pub async fn rerun_pipeline(&self, pattern_id: &str) -> Result<Pattern> {
        let mut pattern = self
            .patterns
            .get_pattern(pattern_id)
            .await?
            .ok_or_else(|| Error::PatternNotFound(pattern_id.to_string()))?;

        if pattern.code_repository.repo_name.trim().is_empty() {
            return Err(Error::RepositoryMissing(pattern_id.to_string()));
        }

        let outcome = self.builds.start_build(&pattern).await;
        pattern.infrastructure_stack_status = match &outcome {
            Ok(_) => stack_status::UPDATE_IN_PROGRESS,
            Err(_) => stack_status::UPDATE_FAILED,
        }
        .to_string();
        pattern.updated_timestamp = Utc::now();
        self.patterns.put_pattern(&pattern).await?;

        match outcome {
            Ok(build_id) => {
                info!(pattern_id = %pattern_id, build_id = %build_id, "Restarted pattern pipeline");
                Ok(pattern)
            }
            Err(e) => {
                warn!(pattern_id = %pattern_id, error = %e, "Failed to restart pattern pipeline");
                Err(e)
            }
        }
    }
}
