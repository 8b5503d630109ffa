//! In-memory collaborators for unit tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::catalog::{
    ArtifactSummary, CatalogService, CreatedProduct, ExistingProduct, ProductVersion, TemplateBucket,
    TemplateValidator,
};
use crate::errors::{Error, Result};
use crate::models::{
    stack_status, Attribute, CodeRepository, Pattern, PatternType, PatternVersion, RepositoryType,
    Subscription,
};
use crate::notify::{Notifier, SyncQueue};
use crate::pipeline::{BuildLauncher, PipelineReporter};
use crate::repo::{BlueprintRepoBuilder, NewRepository, RepoBuilderKind};
use crate::store::{AttributeStore, Page, PatternStore, SubscriptionStore};
use crate::validation::make_attribute_id;

pub fn sample_pattern(pattern_id: &str) -> Pattern {
    let now = Utc::now();
    Pattern {
        pattern_id: pattern_id.to_string(),
        name: pattern_id.to_string(),
        description: format!("{} pattern", pattern_id),
        pattern_type: PatternType::Cfn,
        owner: "platform".to_string(),
        email: "platform@example.com".to_string(),
        infrastructure_stack_status: stack_status::CREATE_IN_PROGRESS.to_string(),
        pattern_repo_url: format!("https://github.com/acme/{}", pattern_id),
        code_repository: CodeRepository {
            repo_type: RepositoryType::GitHub,
            repo_owner: "acme".to_string(),
            branch_name: "main".to_string(),
            repo_name: pattern_id.to_string(),
        },
        attributes: BTreeMap::new(),
        last_commit_id: None,
        created_timestamp: now,
        updated_timestamp: now,
    }
}

pub fn sample_attribute(key: &str, value: &str) -> Attribute {
    let now = Utc::now();
    Attribute {
        id: make_attribute_id(key, value),
        name: format!("{}:{}", key, value),
        key: key.to_string(),
        value: value.to_string(),
        key_index: key.to_uppercase(),
        description: String::new(),
        metadata: BTreeMap::new(),
        create_time: now,
        last_update_time: now,
    }
}

/// Pattern and version tables with transactional version registration
pub struct InMemoryPatternStore {
    patterns: Mutex<BTreeMap<String, Pattern>>,
    versions: Mutex<Vec<PatternVersion>>,
    /// Ids whose meta row holds only the last commit pointer
    pointers: Mutex<BTreeMap<String, String>>,
    undecodable: Mutex<HashSet<String>>,
    writes: Mutex<usize>,
    page_size: usize,
}

impl Default for InMemoryPatternStore {
    fn default() -> Self {
        Self::with_page_size(usize::MAX)
    }
}

impl InMemoryPatternStore {
    /// Listings return at most `page_size` rows regardless of the requested limit
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            patterns: Mutex::new(BTreeMap::new()),
            versions: Mutex::new(Vec::new()),
            pointers: Mutex::new(BTreeMap::new()),
            undecodable: Mutex::new(HashSet::new()),
            writes: Mutex::new(0),
            page_size,
        }
    }

    pub fn insert(&self, pattern: Pattern) {
        self.patterns.lock().unwrap().insert(pattern.pattern_id.clone(), pattern);
    }

    pub fn pattern(&self, pattern_id: &str) -> Option<Pattern> {
        self.patterns.lock().unwrap().get(pattern_id).cloned()
    }

    pub fn versions(&self, pattern_id: &str) -> Vec<PatternVersion> {
        self.versions
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.pattern_id == pattern_id)
            .cloned()
            .collect()
    }

    /// Commit recorded for an id that has no metadata row
    pub fn commit_pointer(&self, pattern_id: &str) -> Option<String> {
        self.pointers.lock().unwrap().get(pattern_id).cloned()
    }

    /// Store a pattern whose row no longer decodes; listings covering it fail
    pub fn insert_undecodable(&self, pattern: Pattern) {
        self.undecodable.lock().unwrap().insert(pattern.pattern_id.clone());
        self.insert(pattern);
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn get_pattern(&self, pattern_id: &str) -> Result<Option<Pattern>> {
        Ok(self.pattern(pattern_id))
    }

    async fn put_pattern(&self, pattern: &Pattern) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        self.insert(pattern.clone());
        Ok(())
    }

    async fn list_patterns(&self, limit: u32, next_token: Option<&str>) -> Result<Page<Pattern>> {
        let size = self.page_size.min(limit as usize);
        let patterns = self.patterns.lock().unwrap();
        let items: Vec<Pattern> = patterns
            .values()
            .filter(|p| next_token.map(|t| p.pattern_id.as_str() > t).unwrap_or(true))
            .take(size)
            .cloned()
            .collect();

        let undecodable = self.undecodable.lock().unwrap();
        if let Some(broken) = items.iter().find(|p| undecodable.contains(&p.pattern_id)) {
            return Err(Error::DynamoSerialization(format!(
                "pattern row {} does not match the model",
                broken.pattern_id
            )));
        }

        let next_token = match items.last() {
            Some(last) if patterns.keys().any(|k| k > &last.pattern_id) => Some(last.pattern_id.clone()),
            _ => None,
        };
        Ok(Page { items, next_token })
    }

    async fn list_versions(&self, pattern_id: &str) -> Result<Vec<PatternVersion>> {
        let mut versions = self.versions(pattern_id);
        versions.sort_by(|a, b| b.created_timestamp.cmp(&a.created_timestamp));
        Ok(versions)
    }

    async fn register_version(&self, version: &PatternVersion) -> Result<()> {
        let mut patterns = self.patterns.lock().unwrap();
        let mut versions = self.versions.lock().unwrap();

        let duplicate = versions
            .iter()
            .any(|v| v.pattern_id == version.pattern_id && v.commit_id == version.commit_id);
        if duplicate {
            return Err(Error::Database("Transaction cancelled: ConditionalCheckFailed".to_string()));
        }

        // The meta update is an upsert: a missing pattern gets a pointer-only row
        match patterns.get_mut(&version.pattern_id) {
            Some(pattern) => {
                pattern.last_commit_id = Some(version.commit_id.clone());
                pattern.updated_timestamp = version.created_timestamp;
            }
            None => {
                self.pointers
                    .lock()
                    .unwrap()
                    .insert(version.pattern_id.clone(), version.commit_id.clone());
            }
        }
        versions.push(version.clone());
        *self.writes.lock().unwrap() += 2;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAttributeStore {
    attributes: Mutex<BTreeMap<String, Attribute>>,
}

impl InMemoryAttributeStore {
    pub fn insert(&self, attribute: Attribute) {
        self.attributes.lock().unwrap().insert(attribute.id.clone(), attribute);
    }

    pub fn attribute(&self, id: &str) -> Option<Attribute> {
        self.attributes.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl AttributeStore for InMemoryAttributeStore {
    async fn get_attribute(&self, id: &str) -> Result<Option<Attribute>> {
        Ok(self.attribute(id))
    }

    async fn create_attribute(&self, attribute: &Attribute) -> Result<()> {
        let mut attributes = self.attributes.lock().unwrap();
        if attributes.contains_key(&attribute.id) {
            return Err(Error::AttributeAlreadyExists(attribute.id.clone()));
        }
        attributes.insert(attribute.id.clone(), attribute.clone());
        Ok(())
    }

    async fn update_attribute(&self, attribute: &Attribute) -> Result<()> {
        let mut attributes = self.attributes.lock().unwrap();
        match attributes.get_mut(&attribute.id) {
            Some(existing) => {
                *existing = attribute.clone();
                Ok(())
            }
            None => Err(Error::AttributeNotFound(attribute.id.clone())),
        }
    }

    async fn delete_attribute(&self, id: &str) -> Result<()> {
        self.attributes.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_attributes(
        &self,
        key: Option<&str>,
        limit: u32,
        _next_token: Option<&str>,
    ) -> Result<Page<Attribute>> {
        let items = self
            .attributes
            .lock()
            .unwrap()
            .values()
            .filter(|a| key.map(|k| a.key_index == k).unwrap_or(true))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(Page {
            items,
            next_token: None,
        })
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<BTreeMap<(String, String), Subscription>>,
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.subscriptions.lock().unwrap().insert(
            (subscription.pattern_id.clone(), subscription.email.clone()),
            subscription.clone(),
        );
        Ok(())
    }

    async fn delete_subscription(&self, pattern_id: &str, email: &str) -> Result<()> {
        self.subscriptions
            .lock()
            .unwrap()
            .remove(&(pattern_id.to_string(), email.to_string()));
        Ok(())
    }

    async fn get_subscription(&self, pattern_id: &str, email: &str) -> Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(&(pattern_id.to_string(), email.to_string()))
            .cloned())
    }

    async fn list_subscriptions(&self, pattern_id: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.pattern_id == pattern_id)
            .cloned()
            .collect())
    }
}

/// Records calls as `create:`, `codeowners:` and `protect:` entries
#[derive(Default)]
pub struct FakeRepoBuilder {
    calls: Mutex<Vec<String>>,
    fail_create: bool,
}

impl FakeRepoBuilder {
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlueprintRepoBuilder for FakeRepoBuilder {
    fn kind(&self) -> RepoBuilderKind {
        RepoBuilderKind::GitHub
    }

    async fn create_and_initialize_repo(&self, request: &NewRepository) -> Result<CodeRepository> {
        if self.fail_create {
            return Err(Error::Repository("repository creation refused".to_string()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("create:{}", request.pattern_id));
        Ok(CodeRepository {
            repo_type: RepositoryType::GitHub,
            repo_owner: "acme".to_string(),
            branch_name: "main".to_string(),
            repo_name: request.pattern_id.clone(),
        })
    }

    async fn enable_branch_protection(&self, repo: &CodeRepository) -> Result<()> {
        self.calls.lock().unwrap().push(format!("protect:{}", repo.repo_name));
        Ok(())
    }

    async fn add_codeowners(&self, repo: &CodeRepository, _owners: &[String]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("codeowners:{}", repo.repo_name));
        Ok(())
    }

    fn repo_url(&self, repo: &CodeRepository) -> String {
        format!("https://github.com/{}/{}", repo.repo_owner, repo.repo_name)
    }
}

#[derive(Default)]
pub struct FakeBuildLauncher {
    started: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeBuildLauncher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildLauncher for FakeBuildLauncher {
    async fn start_build(&self, pattern: &Pattern) -> Result<String> {
        if self.fail {
            return Err(Error::Pipeline("build project unavailable".to_string()));
        }
        let mut started = self.started.lock().unwrap();
        started.push(pattern.pattern_id.clone());
        Ok(format!("build-{}", started.len()))
    }
}

/// Records calls as `find:`, `create:`, `associate:` and `version:` entries
#[derive(Default)]
pub struct FakeCatalog {
    products: Mutex<BTreeMap<String, ExistingProduct>>,
    calls: Mutex<Vec<String>>,
    counter: Mutex<u32>,
}

impl FakeCatalog {
    pub fn insert(&self, name: &str, product: ExistingProduct) {
        self.products.lock().unwrap().insert(name.to_string(), product);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_id(&self) -> u32 {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        *counter
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn find_product(&self, name: &str) -> Result<Option<ExistingProduct>> {
        self.record(format!("find:{}", name));
        Ok(self.products.lock().unwrap().get(name).cloned())
    }

    async fn create_product(&self, product: &ProductVersion) -> Result<CreatedProduct> {
        self.record(format!("create:{}", product.name));
        let n = self.next_id();
        let created = CreatedProduct {
            product_id: format!("prod-{}", n),
            provisioning_artifact_id: format!("pa-{}", n),
        };
        self.insert(
            &product.name,
            ExistingProduct {
                product_id: created.product_id.clone(),
                artifacts: vec![ArtifactSummary {
                    id: created.provisioning_artifact_id.clone(),
                    name: product.version.clone(),
                }],
            },
        );
        Ok(created)
    }

    async fn associate_product_with_portfolio(&self, product_id: &str, portfolio_id: &str) -> Result<()> {
        self.record(format!("associate:{}:{}", product_id, portfolio_id));
        Ok(())
    }

    async fn create_provisioning_artifact(&self, product_id: &str, product: &ProductVersion) -> Result<String> {
        self.record(format!("version:{}:{}", product_id, product.version));
        Ok(format!("pa-{}", self.next_id()))
    }
}

#[derive(Default)]
pub struct FakeTemplateBucket {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl FakeTemplateBucket {
    pub fn insert(&self, key: &str, body: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), body.as_bytes().to_vec());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl TemplateBucket for FakeTemplateBucket {
    async fn first_key(&self, prefix: &str) -> Result<Option<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .find(|k| k.starts_with(prefix))
            .cloned())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.object(key)
            .ok_or_else(|| Error::Aws(format!("NoSuchKey: {}", key)))
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://artifacts.s3.us-east-1.amazonaws.com/{}", key)
    }
}

#[derive(Default)]
pub struct FakeValidator {
    validated: Mutex<usize>,
}

impl FakeValidator {
    pub fn validated(&self) -> usize {
        *self.validated.lock().unwrap()
    }
}

#[async_trait]
impl TemplateValidator for FakeValidator {
    async fn validate(&self, template_body: &str) -> Result<()> {
        if template_body.trim().is_empty() {
            return Err(Error::Template("empty template".to_string()));
        }
        *self.validated.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeReporter {
    successes: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    failures: Mutex<Vec<(String, String)>>,
}

impl FakeReporter {
    pub fn successes(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.successes.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<(String, String)> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineReporter for FakeReporter {
    async fn put_job_success(&self, job_id: &str, output_variables: &BTreeMap<String, String>) -> Result<()> {
        self.successes
            .lock()
            .unwrap()
            .push((job_id.to_string(), output_variables.clone()));
        Ok(())
    }

    async fn put_job_failure(&self, job_id: &str, message: &str) -> Result<()> {
        self.failures
            .lock()
            .unwrap()
            .push((job_id.to_string(), message.to_string()));
        Ok(())
    }
}

/// Collects `(subject, message)` pairs
#[derive(Default)]
pub struct FakeNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl FakeNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((subject.to_string(), message.to_string()));
        Ok(())
    }
}

/// Collects `(body, deduplication id)` pairs
#[derive(Default)]
pub struct FakeSyncQueue {
    messages: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl FakeSyncQueue {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncQueue for FakeSyncQueue {
    async fn send(&self, body: &str, deduplication_id: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Aws("queue does not exist".to_string()));
        }
        self.messages
            .lock()
            .unwrap()
            .push((body.to_string(), deduplication_id.to_string()));
        Ok(())
    }
}
