//! GitHub repository builder
//!
//! Talks to the GitHub REST API (github.com or Enterprise). The seed tree is
//! committed through the git data API so the initial content lands as a single
//! commit on top of the auto-initialised branch.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use super::seed::{load_seed_files, SeedFile};
use super::{
    codeowners_content, retry_fixed, BlueprintRepoBuilder, NewRepository, RepoBuilderKind,
    BRANCH_HEAD_ATTEMPTS, BRANCH_HEAD_DELAY,
};
use crate::compensation::{Compensate, CompensationStack, UndoAction};
use crate::config::RepoConfig;
use crate::errors::{Error, Result};
use crate::models::{CodeRepository, RepositoryType};

const USER_AGENT: &str = "blueprint-governance";
const GITHUB_API_VERSION: &str = "2022-11-28";
const INITIAL_COMMIT_MESSAGE: &str = "Initial commit from blueprint template";

#[derive(Debug, Deserialize)]
struct CreatedRepo {
    name: String,
    default_branch: Option<String>,
    owner: RepoOwner,
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CreatedHook {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    sha: String,
    tree: GitObject,
}

/// Repository builder backed by the GitHub REST API
pub struct GitHubRepoBuilder {
    client: Client,
    api_url: String,
    org: String,
    token: String,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    template_root: PathBuf,
    default_branch: String,
    head_delay: Duration,
}

impl GitHubRepoBuilder {
    pub fn new(config: &RepoConfig, token: String) -> Result<Self> {
        let org = config
            .github_org
            .clone()
            .ok_or_else(|| Error::Config("GITHUB_ORG environment variable not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.github_url.trim_end_matches('/').to_string(),
            org,
            token,
            webhook_url: config.github_webhook_url.clone(),
            webhook_secret: config.github_webhook_secret.clone(),
            template_root: config.template_root.clone(),
            default_branch: config.default_branch.clone(),
            head_delay: BRANCH_HEAD_DELAY,
        })
    }

    /// Override the delay between branch-head polls (for testing)
    pub fn with_head_delay(mut self, delay: Duration) -> Self {
        self.head_delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| Error::Repository(format!("GitHub request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Repository(format!("GitHub returned {}: {}", status, body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::Repository(format!("Unexpected GitHub response: {}", e)))
    }

    async fn create_repo(&self, request: &NewRepository) -> Result<CreatedRepo> {
        let body = json!({
            "name": request.pattern_id,
            "description": request.description,
            "private": true,
            "auto_init": true,
        });

        self.send_json(
            self.client
                .post(self.url(&format!("/orgs/{}/repos", self.org)))
                .json(&body),
        )
        .await
    }

    async fn create_webhook(&self, owner: &str, repo: &str, url: &str) -> Result<u64> {
        let mut config = json!({ "url": url, "content_type": "json", "insecure_ssl": "0" });
        if let Some(secret) = &self.webhook_secret {
            config["secret"] = Value::String(secret.clone());
        }
        let body = json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": config,
        });

        let hook: CreatedHook = self
            .send_json(
                self.client
                    .post(self.url(&format!("/repos/{}/{}/hooks", owner, repo)))
                    .json(&body),
            )
            .await?;
        Ok(hook.id)
    }

    async fn branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        let url = self.url(&format!("/repos/{}/{}/git/ref/heads/{}", owner, repo, branch));
        let url = url.as_str();
        retry_fixed(BRANCH_HEAD_ATTEMPTS, self.head_delay, || async move {
            let git_ref: GitRef = self.send_json(self.client.get(url)).await?;
            Ok::<_, Error>(git_ref.object.sha)
        })
        .await
    }

    async fn commit_files(
        &self,
        repo: &CodeRepository,
        files: &[SeedFile],
        message: &str,
    ) -> Result<String> {
        let owner = &repo.repo_owner;
        let name = &repo.repo_name;

        let head_sha = self.branch_head(owner, name, &repo.branch_name).await?;
        let head: GitCommit = self
            .send_json(
                self.client
                    .get(self.url(&format!("/repos/{}/{}/git/commits/{}", owner, name, head_sha))),
            )
            .await?;

        let mut entries: Vec<Value> = Vec::with_capacity(files.len());
        for file in files {
            let entry = match std::str::from_utf8(&file.content) {
                Ok(text) => json!({
                    "path": file.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": text,
                }),
                Err(_) => {
                    // Binary content has to go through a base64 blob
                    let blob: GitObject = self
                        .send_json(
                            self.client
                                .post(self.url(&format!("/repos/{}/{}/git/blobs", owner, name)))
                                .json(&json!({
                                    "content": STANDARD.encode(&file.content),
                                    "encoding": "base64",
                                })),
                        )
                        .await?;
                    json!({
                        "path": file.path,
                        "mode": "100644",
                        "type": "blob",
                        "sha": blob.sha,
                    })
                }
            };
            entries.push(entry);
        }

        let tree: GitObject = self
            .send_json(
                self.client
                    .post(self.url(&format!("/repos/{}/{}/git/trees", owner, name)))
                    .json(&json!({ "base_tree": head.tree.sha, "tree": entries })),
            )
            .await?;

        let commit: GitObject = self
            .send_json(
                self.client
                    .post(self.url(&format!("/repos/{}/{}/git/commits", owner, name)))
                    .json(&json!({
                        "message": message,
                        "tree": tree.sha,
                        "parents": [head.sha],
                    })),
            )
            .await?;

        self.send(
            self.client
                .patch(self.url(&format!(
                    "/repos/{}/{}/git/refs/heads/{}",
                    owner, name, repo.branch_name
                )))
                .json(&json!({ "sha": commit.sha, "force": false })),
        )
        .await?;

        Ok(commit.sha)
    }

    /// Browser URL derived from the API URL
    fn web_url(&self) -> String {
        if self.api_url == "https://api.github.com" {
            "https://github.com".to_string()
        } else {
            self.api_url.trim_end_matches("/api/v3").to_string()
        }
    }
}

#[async_trait]
impl Compensate for GitHubRepoBuilder {
    async fn compensate(&self, action: &UndoAction) -> Result<()> {
        match action {
            UndoAction::DeleteWebhook {
                owner,
                repo,
                hook_id,
            } => {
                let response = self
                    .authorized(
                        self.client
                            .delete(self.url(&format!("/repos/{}/{}/hooks/{}", owner, repo, hook_id))),
                    )
                    .send()
                    .await
                    .map_err(|e| Error::Repository(format!("GitHub request failed: {}", e)))?;

                // Already gone is as good as deleted
                if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
                    Ok(())
                } else {
                    Err(Error::Repository(format!(
                        "Failed to delete webhook {}: {}",
                        hook_id,
                        response.status()
                    )))
                }
            }
            UndoAction::DeleteRepository { name } => {
                warn!(repo = %name, "GitHub repositories are not deleted on rollback");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BlueprintRepoBuilder for GitHubRepoBuilder {
    fn kind(&self) -> RepoBuilderKind {
        RepoBuilderKind::GitHub
    }

    async fn create_and_initialize_repo(&self, request: &NewRepository) -> Result<CodeRepository> {
        let created = self.create_repo(request).await?;
        let repo = CodeRepository {
            repo_type: RepositoryType::GitHub,
            repo_owner: created.owner.login,
            branch_name: created
                .default_branch
                .unwrap_or_else(|| self.default_branch.clone()),
            repo_name: created.name,
        };
        info!(owner = %repo.repo_owner, repo = %repo.repo_name, "Created GitHub repository");

        let mut compensations = CompensationStack::new();
        let outcome: Result<()> = async {
            if let Some(url) = &self.webhook_url {
                let hook_id = self
                    .create_webhook(&repo.repo_owner, &repo.repo_name, url)
                    .await?;
                compensations.push(UndoAction::DeleteWebhook {
                    owner: repo.repo_owner.clone(),
                    repo: repo.repo_name.clone(),
                    hook_id,
                });
            }

            let files = load_seed_files(&self.template_root, request.pattern_type, &repo.branch_name)?;
            let sha = self
                .commit_files(&repo, &files, INITIAL_COMMIT_MESSAGE)
                .await?;
            info!(repo = %repo.repo_name, commit = %sha, files = files.len(), "Initialized repository");
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = outcome {
            compensations.unwind(self).await;
            return Err(e);
        }

        Ok(repo)
    }

    async fn enable_branch_protection(&self, repo: &CodeRepository) -> Result<()> {
        let body = json!({
            "required_status_checks": null,
            "enforce_admins": true,
            "required_pull_request_reviews": {
                "dismiss_stale_reviews": true,
                "require_code_owner_reviews": true,
                "required_approving_review_count": 1,
            },
            "restrictions": null,
        });

        self.send(
            self.client
                .put(self.url(&format!(
                    "/repos/{}/{}/branches/{}/protection",
                    repo.repo_owner, repo.repo_name, repo.branch_name
                )))
                .json(&body),
        )
        .await?;

        info!(repo = %repo.repo_name, branch = %repo.branch_name, "Enabled branch protection");
        Ok(())
    }

    async fn add_codeowners(&self, repo: &CodeRepository, owners: &[String]) -> Result<()> {
        let body = json!({
            "message": "Add CODEOWNERS",
            "content": STANDARD.encode(codeowners_content(owners)),
            "branch": repo.branch_name,
        });

        self.send(
            self.client
                .put(self.url(&format!(
                    "/repos/{}/{}/contents/.github/CODEOWNERS",
                    repo.repo_owner, repo.repo_name
                )))
                .json(&body),
        )
        .await?;

        info!(repo = %repo.repo_name, owners = owners.len(), "Added CODEOWNERS");
        Ok(())
    }

    fn repo_url(&self, repo: &CodeRepository) -> String {
        format!("{}/{}/{}", self.web_url(), repo.repo_owner, repo.repo_name)
    }
}

/// Resolve the GitHub token: SSM SecureString first, then `GITHUB_TOKEN`
pub async fn resolve_token(ssm: &aws_sdk_ssm::Client, config: &RepoConfig) -> Result<String> {
    if let Some(parameter) = &config.github_token_parameter {
        match ssm
            .get_parameter()
            .name(parameter)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(resp) => {
                if let Some(value) = resp.parameter.and_then(|p| p.value) {
                    return Ok(value);
                }
                warn!(parameter = %parameter, "GitHub token parameter has no value");
            }
            Err(e) => {
                warn!(
                    parameter = %parameter,
                    error = %aws_sdk_ssm::error::DisplayErrorContext(&e),
                    "Failed to read GitHub token from SSM, falling back to GITHUB_TOKEN"
                );
            }
        }
    }

    config
        .github_token
        .clone()
        .ok_or_else(|| Error::Config("No GitHub token configured".to_string()))
}
