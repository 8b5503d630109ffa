//! CodeCommit repository builder
//!
//! CodeCommit has no atomic create-and-populate call, so a repository that
//! fails to initialize is deleted again.

use async_trait::async_trait;
use aws_sdk_codecommit::error::DisplayErrorContext;
use aws_sdk_codecommit::primitives::Blob;
use aws_sdk_codecommit::types::PutFileEntry;
use aws_sdk_codecommit::Client;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::seed::{load_seed_files, SeedFile};
use super::{
    codeowners_content, retry_fixed, BlueprintRepoBuilder, NewRepository, RepoBuilderKind,
    BRANCH_HEAD_ATTEMPTS, BRANCH_HEAD_DELAY,
};
use crate::compensation::{Compensate, CompensationStack, UndoAction};
use crate::config::RepoConfig;
use crate::errors::{Error, Result};
use crate::models::{CodeRepository, RepositoryType};

const AUTHOR_NAME: &str = "blueprint-governance";
const INITIAL_COMMIT_MESSAGE: &str = "Initial commit from blueprint template";
const MAX_TEMPLATE_NAME_LEN: usize = 100;

/// Repository builder backed by AWS CodeCommit
pub struct CodeCommitRepoBuilder {
    client: Client,
    region: String,
    template_root: PathBuf,
    default_branch: String,
    head_delay: Duration,
}

fn repo_error<E>(context: &str, e: E) -> Error
where
    E: std::error::Error + 'static,
{
    Error::Repository(format!("{}: {}", context, DisplayErrorContext(&e)))
}

impl CodeCommitRepoBuilder {
    pub fn new(client: Client, region: impl Into<String>, config: &RepoConfig) -> Self {
        Self {
            client,
            region: region.into(),
            template_root: config.template_root.clone(),
            default_branch: config.default_branch.clone(),
            head_delay: BRANCH_HEAD_DELAY,
        }
    }

    async fn initial_commit(&self, repo: &CodeRepository, files: &[SeedFile]) -> Result<String> {
        let put_files = files
            .iter()
            .map(|file| {
                PutFileEntry::builder()
                    .file_path(&file.path)
                    .file_content(Blob::new(file.content.clone()))
                    .build()
                    .map_err(|e| Error::Internal(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .create_commit()
            .repository_name(&repo.repo_name)
            .branch_name(&repo.branch_name)
            .author_name(AUTHOR_NAME)
            .commit_message(INITIAL_COMMIT_MESSAGE)
            .set_put_files(Some(put_files))
            .send()
            .await
            .map_err(|e| repo_error("Failed to create initial commit", e))?;

        Ok(output.commit_id.unwrap_or_default())
    }

    async fn branch_head(&self, repo: &CodeRepository) -> Result<String> {
        retry_fixed(BRANCH_HEAD_ATTEMPTS, self.head_delay, || async move {
            let output = self
                .client
                .get_branch()
                .repository_name(&repo.repo_name)
                .branch_name(&repo.branch_name)
                .send()
                .await
                .map_err(|e| repo_error("Failed to read branch", e))?;

            output
                .branch
                .and_then(|b| b.commit_id)
                .ok_or_else(|| Error::Repository(format!("Branch {} has no commit yet", repo.branch_name)))
        })
        .await
    }

    /// Template names are capped at `MAX_TEMPLATE_NAME_LEN` characters
    fn approval_template_name(repo: &CodeRepository) -> String {
        format!("{}-{}-protection", repo.repo_name, repo.branch_name)
            .chars()
            .take(MAX_TEMPLATE_NAME_LEN)
            .collect()
    }
}

#[async_trait]
impl Compensate for CodeCommitRepoBuilder {
    async fn compensate(&self, action: &UndoAction) -> Result<()> {
        match action {
            UndoAction::DeleteRepository { name } => {
                self.client
                    .delete_repository()
                    .repository_name(name)
                    .send()
                    .await
                    .map_err(|e| repo_error("Failed to delete repository", e))?;
                Ok(())
            }
            UndoAction::DeleteWebhook { .. } => Ok(()),
        }
    }
}

#[async_trait]
impl BlueprintRepoBuilder for CodeCommitRepoBuilder {
    fn kind(&self) -> RepoBuilderKind {
        RepoBuilderKind::CodeCommit
    }

    async fn create_and_initialize_repo(&self, request: &NewRepository) -> Result<CodeRepository> {
        let output = self
            .client
            .create_repository()
            .repository_name(&request.pattern_id)
            .repository_description(&request.description)
            .send()
            .await
            .map_err(|e| repo_error("Failed to create repository", e))?;

        let account = output
            .repository_metadata
            .as_ref()
            .and_then(|m| m.account_id())
            .unwrap_or_default()
            .to_string();

        let repo = CodeRepository {
            repo_type: RepositoryType::CodeCommit,
            repo_owner: account,
            branch_name: self.default_branch.clone(),
            repo_name: request.pattern_id.clone(),
        };
        info!(repo = %repo.repo_name, "Created CodeCommit repository");

        let mut compensations = CompensationStack::new();
        compensations.push(UndoAction::DeleteRepository {
            name: repo.repo_name.clone(),
        });

        let outcome = match load_seed_files(&self.template_root, request.pattern_type, &repo.branch_name) {
            Ok(files) => self.initial_commit(&repo, &files).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(commit_id) => {
                info!(repo = %repo.repo_name, commit = %commit_id, "Initialized repository");
                Ok(repo)
            }
            Err(e) => {
                compensations.unwind(self).await;
                Err(e)
            }
        }
    }

    async fn enable_branch_protection(&self, repo: &CodeRepository) -> Result<()> {
        let template_name = Self::approval_template_name(repo);
        let content = json!({
            "Version": "2018-11-08",
            "DestinationReferences": [format!("refs/heads/{}", repo.branch_name)],
            "Statements": [{
                "Type": "Approvers",
                "NumberOfApprovalsNeeded": 1,
            }],
        });

        self.client
            .create_approval_rule_template()
            .approval_rule_template_name(&template_name)
            .approval_rule_template_description(format!(
                "Require one approval on {} of {}",
                repo.branch_name, repo.repo_name
            ))
            .approval_rule_template_content(content.to_string())
            .send()
            .await
            .map_err(|e| repo_error("Failed to create approval rule template", e))?;

        self.client
            .associate_approval_rule_template_with_repository()
            .approval_rule_template_name(&template_name)
            .repository_name(&repo.repo_name)
            .send()
            .await
            .map_err(|e| repo_error("Failed to associate approval rule template", e))?;

        info!(repo = %repo.repo_name, template = %template_name, "Enabled branch protection");
        Ok(())
    }

    async fn add_codeowners(&self, repo: &CodeRepository, owners: &[String]) -> Result<()> {
        let parent = self.branch_head(repo).await?;

        self.client
            .put_file()
            .repository_name(&repo.repo_name)
            .branch_name(&repo.branch_name)
            .file_path("CODEOWNERS")
            .file_content(Blob::new(codeowners_content(owners).into_bytes()))
            .parent_commit_id(parent)
            .commit_message("Add CODEOWNERS")
            .name(AUTHOR_NAME)
            .send()
            .await
            .map_err(|e| repo_error("Failed to add CODEOWNERS", e))?;

        info!(repo = %repo.repo_name, owners = owners.len(), "Added CODEOWNERS");
        Ok(())
    }

    fn repo_url(&self, repo: &CodeRepository) -> String {
        format!(
            "https://git-codecommit.{}.amazonaws.com/v1/repos/{}",
            self.region, repo.repo_name
        )
    }
}
