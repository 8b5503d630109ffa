//! Publishing CFN pattern packages to Service Catalog
//!
//! Each changed package becomes a new product, or a new provisioning artifact
//! of an existing one. Unchanged packages are only looked up so the pipeline
//! gets the full product list for the version.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::catalog::{CatalogService, ProductVersion, TemplateBucket, TemplateValidator};
use crate::errors::{Error, Result};
use crate::models::{NpmPackage, PatternType, ServiceCatalogProduct};
use crate::pipeline::{decode_b64_json, encode_b64_json, report_job_outcome, CodePipelineEvent, PipelineReporter};
use crate::store::PatternStore;
use crate::template::{embed_appregistry, ParsedTemplate};

pub const CHANGED_PACKAGES: &str = "CHANGED_PACKAGES";
pub const ALL_PACKAGES: &str = "ALL_PACKAGES";
pub const CHANGED_SERVICE_CATALOG_PRODUCTS: &str = "CHANGED_SERVICE_CATALOG_PRODUCTS";
pub const ALL_SERVICE_CATALOG_PRODUCTS: &str = "ALL_SERVICE_CATALOG_PRODUCTS";

/// `UserParameters` of the publish action
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PublishParameters {
    pub pattern_name: String,
    pub pattern_type: PatternType,
    pub changed_packages: String,
    pub all_packages: String,
    #[serde(default)]
    pub artifact_prefix: String,
}

/// Service Catalog product name for a package of a pattern
pub fn product_name(pattern_id: &str, package_name: &str) -> String {
    format!("{}_{}", pattern_id, package_name)
}

/// Key prefix under which a package's built template lives
pub fn template_prefix(artifact_prefix: &str, package_name: &str) -> String {
    let artifact_prefix = artifact_prefix.trim_matches('/');
    if artifact_prefix.is_empty() {
        format!("{}/", package_name)
    } else {
        format!("{}/{}/", artifact_prefix, package_name)
    }
}

/// Products produced by one publish run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOutcome {
    pub changed_products: Vec<ServiceCatalogProduct>,
    pub all_products: Vec<ServiceCatalogProduct>,
}

pub struct PublishService<'a> {
    pub patterns: &'a dyn PatternStore,
    pub catalog: &'a dyn CatalogService,
    pub bucket: &'a dyn TemplateBucket,
    pub validator: &'a dyn TemplateValidator,
    pub portfolio_id: &'a str,
    pub appregistry_enabled: bool,
    pub region: &'a str,
}

struct PatternContext {
    owner: String,
    description: String,
    attributes: BTreeMap<String, String>,
}

impl<'a> PublishService<'a> {
    /// Handle one CodePipeline job end to end, reporting its outcome
    pub async fn run_job(&self, reporter: &dyn PipelineReporter, event: &CodePipelineEvent) -> Result<()> {
        let outcome = match event.user_parameters::<PublishParameters>() {
            Ok(params) => {
                let account = event.job.account_id.clone().unwrap_or_default();
                self.output_variables(&account, &params).await
            }
            Err(e) => Err(e),
        };
        report_job_outcome(reporter, event.job_id(), outcome).await
    }

    /// Publish and encode the job's output variables
    pub async fn output_variables(
        &self,
        account: &str,
        params: &PublishParameters,
    ) -> Result<BTreeMap<String, String>> {
        let changed: Vec<NpmPackage> = decode_b64_json(&params.changed_packages)?;
        let all: Vec<NpmPackage> = decode_b64_json(&params.all_packages)?;

        let outcome = match params.pattern_type {
            PatternType::Cfn => self.publish(account, params, &changed, &all).await?,
            PatternType::Cdk => {
                info!(pattern = %params.pattern_name, "CDK pattern, nothing to publish to Service Catalog");
                PublishOutcome::default()
            }
        };

        Ok(BTreeMap::from([
            (CHANGED_PACKAGES.to_string(), encode_b64_json(&changed)?),
            (ALL_PACKAGES.to_string(), encode_b64_json(&all)?),
            (
                CHANGED_SERVICE_CATALOG_PRODUCTS.to_string(),
                encode_b64_json(&outcome.changed_products)?,
            ),
            (
                ALL_SERVICE_CATALOG_PRODUCTS.to_string(),
                encode_b64_json(&outcome.all_products)?,
            ),
        ]))
    }

    pub async fn publish(
        &self,
        account: &str,
        params: &PublishParameters,
        changed: &[NpmPackage],
        all: &[NpmPackage],
    ) -> Result<PublishOutcome> {
        let context = self.pattern_context(&params.pattern_name).await?;

        let mut outcome = PublishOutcome::default();
        for package in changed {
            let product = self
                .publish_package(account, params, &context, package)
                .await?;
            outcome.changed_products.push(product);
        }

        let changed_names: HashSet<&str> = changed.iter().map(|p| p.name.as_str()).collect();
        for package in all {
            if changed_names.contains(package.name.as_str()) {
                if let Some(product) = outcome
                    .changed_products
                    .iter()
                    .find(|p| p.name == product_name(&params.pattern_name, &package.name))
                {
                    outcome.all_products.push(product.clone());
                }
                continue;
            }

            match self.lookup_product(account, &params.pattern_name, package).await? {
                Some(product) => outcome.all_products.push(product),
                None => warn!(package = %package.name, "No Service Catalog product for unchanged package"),
            }
        }

        info!(
            pattern = %params.pattern_name,
            changed = outcome.changed_products.len(),
            all = outcome.all_products.len(),
            "Published Service Catalog products"
        );
        Ok(outcome)
    }

    async fn pattern_context(&self, pattern_id: &str) -> Result<PatternContext> {
        Ok(match self.patterns.get_pattern(pattern_id).await? {
            Some(pattern) => PatternContext {
                owner: pattern.owner,
                description: pattern.description,
                attributes: pattern.attributes,
            },
            None => {
                warn!(pattern = %pattern_id, "Pattern metadata not found, publishing without it");
                PatternContext {
                    owner: pattern_id.to_string(),
                    description: String::new(),
                    attributes: BTreeMap::new(),
                }
            }
        })
    }

    async fn publish_package(
        &self,
        account: &str,
        params: &PublishParameters,
        context: &PatternContext,
        package: &NpmPackage,
    ) -> Result<ServiceCatalogProduct> {
        let prefix = template_prefix(&params.artifact_prefix, &package.name);
        let key = self
            .bucket
            .first_key(&prefix)
            .await?
            .ok_or_else(|| Error::Template(format!("No template found under {}", prefix)))?;

        if self.appregistry_enabled && !context.attributes.is_empty() {
            self.rewrite_template(&key, &context.attributes).await?;
        }

        let name = product_name(&params.pattern_name, &package.name);
        let version = ProductVersion {
            name: name.clone(),
            owner: context.owner.clone(),
            description: context.description.clone(),
            version: package.version.clone(),
            template_url: self.bucket.object_url(&key),
        };

        let (product_id, provisioning_artifact_id) = match self.catalog.find_product(&name).await? {
            None => {
                let created = self.catalog.create_product(&version).await?;
                self.catalog
                    .associate_product_with_portfolio(&created.product_id, self.portfolio_id)
                    .await?;
                (created.product_id, created.provisioning_artifact_id)
            }
            Some(existing) => {
                let artifact_id = self
                    .catalog
                    .create_provisioning_artifact(&existing.product_id, &version)
                    .await?;
                (existing.product_id, artifact_id)
            }
        };

        Ok(ServiceCatalogProduct {
            name,
            account: account.to_string(),
            region: self.region.to_string(),
            product_id,
            provisioning_artifact_id,
        })
    }

    /// Embed attribute-group associations into the template in place
    async fn rewrite_template(&self, key: &str, attributes: &BTreeMap<String, String>) -> Result<()> {
        let raw = self.bucket.get_object(key).await?;
        let body = String::from_utf8(raw)
            .map_err(|e| Error::Template(format!("Template {} is not UTF-8: {}", key, e)))?;

        let mut template = ParsedTemplate::parse(&body)?;
        embed_appregistry(template.body_mut(), attributes)?;
        let rendered = template.render()?;

        self.validator.validate(&rendered).await?;
        self.bucket.put_object(key, rendered.into_bytes()).await?;
        info!(key = %key, yaml = template.is_yaml(), associations = attributes.len(), "Embedded AppRegistry associations");
        Ok(())
    }

    async fn lookup_product(
        &self,
        account: &str,
        pattern_id: &str,
        package: &NpmPackage,
    ) -> Result<Option<ServiceCatalogProduct>> {
        let name = product_name(pattern_id, &package.name);
        let existing = match self.catalog.find_product(&name).await? {
            Some(existing) => existing,
            None => return Ok(None),
        };

        Ok(existing
            .artifact_for_version(&package.version)
            .map(|artifact_id| ServiceCatalogProduct {
                name,
                account: account.to_string(),
                region: self.region.to_string(),
                product_id: existing.product_id.clone(),
                provisioning_artifact_id: artifact_id.to_string(),
            }))
    }
}
