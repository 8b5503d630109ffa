//! Source repository provisioning
//!
//! A new pattern gets a repository seeded from a per-pattern-type template
//! tree. GitHub and CodeCommit are interchangeable behind
//! `BlueprintRepoBuilder`; the implementation is chosen once at start-up.

pub mod codecommit;
pub mod github;
pub mod seed;

use async_trait::async_trait;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::errors::{Error, Result};
use crate::models::{CodeRepository, PatternType};

pub use codecommit::CodeCommitRepoBuilder;
pub use github::GitHubRepoBuilder;

/// Attempts made when polling for a branch head after repository creation
pub const BRANCH_HEAD_ATTEMPTS: u32 = 3;
pub const BRANCH_HEAD_DELAY: Duration = Duration::from_secs(1);

/// Which repository hosting backs new patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoBuilderKind {
    GitHub,
    CodeCommit,
}

impl FromStr for RepoBuilderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(RepoBuilderKind::GitHub),
            "codecommit" => Ok(RepoBuilderKind::CodeCommit),
            other => Err(Error::Config(format!("Unknown REPO_TYPE: {}", other))),
        }
    }
}

/// Repository to create for a new pattern
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub pattern_id: String,
    pub description: String,
    pub pattern_type: PatternType,
}

#[async_trait]
pub trait BlueprintRepoBuilder: Send + Sync {
    fn kind(&self) -> RepoBuilderKind;

    /// Create the repository and commit the rendered seed tree as its first commit
    ///
    /// Partial work is compensated before an error is returned.
    async fn create_and_initialize_repo(&self, request: &NewRepository) -> Result<CodeRepository>;

    /// Require reviews on the repository's branch
    async fn enable_branch_protection(&self, repo: &CodeRepository) -> Result<()>;

    /// Commit a CODEOWNERS file naming the given owners
    async fn add_codeowners(&self, repo: &CodeRepository, owners: &[String]) -> Result<()>;

    /// Browsable or clonable URL of the repository
    fn repo_url(&self, repo: &CodeRepository) -> String;
}

/// CODEOWNERS content assigning every path to the owners
pub fn codeowners_content(owners: &[String]) -> String {
    let handles: Vec<String> = owners
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(|o| {
            if o.starts_with('@') || o.contains('@') {
                o.to_string()
            } else {
                format!("@{}", o)
            }
        })
        .collect();
    format!("* {}\n", handles.join(" "))
}

/// Run `op` up to `attempts` times, sleeping `delay` between failures
pub async fn retry_fixed<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(attempt, error = %e, "Attempt failed, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
