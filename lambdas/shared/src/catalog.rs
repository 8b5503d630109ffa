//! Service Catalog publishing seams
//!
//! Products, their provisioning artifacts, the S3 bucket holding built
//! templates, and CloudFormation template validation.

use async_trait::async_trait;
use aws_sdk_servicecatalog::types::{
    ProductType, ProductViewDetail, ProvisioningArtifactDetail, ProvisioningArtifactProperties,
    ProvisioningArtifactType,
};
use tracing::{debug, info};

use crate::errors::{Error, Result};

fn aws_error<E>(context: &str, e: E) -> Error
where
    E: std::error::Error + 'static,
{
    Error::Aws(format!(
        "{}: {}",
        context,
        aws_sdk_servicecatalog::error::DisplayErrorContext(&e)
    ))
}

fn product_id_of(detail: Option<ProductViewDetail>, name: &str) -> Result<String> {
    detail
        .and_then(|d| d.product_view_summary)
        .and_then(|s| s.product_id)
        .ok_or_else(|| Error::Aws(format!("Product {} has no id", name)))
}

fn artifact_id_of(detail: Option<ProvisioningArtifactDetail>, name: &str) -> Result<String> {
    detail
        .and_then(|d| d.id)
        .ok_or_else(|| Error::Aws(format!("Provisioning artifact of {} has no id", name)))
}

/// Provisioning artifact of an existing product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub id: String,
    pub name: String,
}

/// Product found by name, with its artifacts oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingProduct {
    pub product_id: String,
    pub artifacts: Vec<ArtifactSummary>,
}

impl ExistingProduct {
    /// Artifact named after `version`, otherwise the newest one
    pub fn artifact_for_version(&self, version: &str) -> Option<&str> {
        self.artifacts
            .iter()
            .find(|a| a.name == version)
            .or_else(|| self.artifacts.last())
            .map(|a| a.id.as_str())
    }
}

/// New product or product version backed by a template in S3
#[derive(Debug, Clone)]
pub struct ProductVersion {
    pub name: String,
    pub owner: String,
    pub description: String,
    pub version: String,
    pub template_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProduct {
    pub product_id: String,
    pub provisioning_artifact_id: String,
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn find_product(&self, name: &str) -> Result<Option<ExistingProduct>>;

    async fn create_product(&self, product: &ProductVersion) -> Result<CreatedProduct>;

    async fn associate_product_with_portfolio(&self, product_id: &str, portfolio_id: &str) -> Result<()>;

    /// Add a version to an existing product, returning the artifact id
    async fn create_provisioning_artifact(&self, product_id: &str, product: &ProductVersion) -> Result<String>;
}

fn artifact_properties(product: &ProductVersion) -> ProvisioningArtifactProperties {
    ProvisioningArtifactProperties::builder()
        .name(&product.version)
        .description(&product.description)
        .info("LoadTemplateFromURL", &product.template_url)
        .r#type(ProvisioningArtifactType::CloudFormationTemplate)
        .build()
}

pub struct ServiceCatalogClient {
    client: aws_sdk_servicecatalog::Client,
}

impl ServiceCatalogClient {
    pub fn new(client: aws_sdk_servicecatalog::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CatalogService for ServiceCatalogClient {
    async fn find_product(&self, name: &str) -> Result<Option<ExistingProduct>> {
        let output = match self.client.describe_product_as_admin().name(name).send().await {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_resource_not_found_exception())
                    .unwrap_or(false) =>
            {
                debug!(product = %name, "Product does not exist yet");
                return Ok(None);
            }
            Err(e) => return Err(aws_error("Failed to describe product", e)),
        };

        let product_id = product_id_of(output.product_view_detail, name)?;

        let mut summaries = output.provisioning_artifact_summaries.unwrap_or_default();
        summaries.sort_by_key(|s| s.created_time.as_ref().map(|t| (t.secs(), t.subsec_nanos())));
        let artifacts = summaries
            .into_iter()
            .filter_map(|s| {
                Some(ArtifactSummary {
                    id: s.id?,
                    name: s.name.unwrap_or_default(),
                })
            })
            .collect();

        Ok(Some(ExistingProduct {
            product_id,
            artifacts,
        }))
    }

    async fn create_product(&self, product: &ProductVersion) -> Result<CreatedProduct> {
        let output = self
            .client
            .create_product()
            .name(&product.name)
            .owner(&product.owner)
            .description(&product.description)
            .product_type(ProductType::CloudFormationTemplate)
            .provisioning_artifact_parameters(artifact_properties(product))
            .idempotency_token(uuid::Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| aws_error("Failed to create product", e))?;

        let product_id = product_id_of(output.product_view_detail, &product.name)?;
        let provisioning_artifact_id = artifact_id_of(output.provisioning_artifact_detail, &product.name)?;

        info!(product = %product.name, product_id = %product_id, "Created Service Catalog product");
        Ok(CreatedProduct {
            product_id,
            provisioning_artifact_id,
        })
    }

    async fn associate_product_with_portfolio(&self, product_id: &str, portfolio_id: &str) -> Result<()> {
        self.client
            .associate_product_with_portfolio()
            .product_id(product_id)
            .portfolio_id(portfolio_id)
            .send()
            .await
            .map_err(|e| aws_error("Failed to associate product with portfolio", e))?;

        info!(product_id = %product_id, portfolio_id = %portfolio_id, "Associated product with portfolio");
        Ok(())
    }

    async fn create_provisioning_artifact(&self, product_id: &str, product: &ProductVersion) -> Result<String> {
        let output = self
            .client
            .create_provisioning_artifact()
            .product_id(product_id)
            .parameters(artifact_properties(product))
            .idempotency_token(uuid::Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| aws_error("Failed to create provisioning artifact", e))?;

        let artifact_id = artifact_id_of(output.provisioning_artifact_detail, &product.name)?;
        info!(product_id = %product_id, version = %product.version, artifact_id = %artifact_id, "Created provisioning artifact");
        Ok(artifact_id)
    }
}

/// Bucket holding built templates and other artifacts
#[async_trait]
pub trait TemplateBucket: Send + Sync {
    /// First object key under a prefix, if any
    async fn first_key(&self, prefix: &str) -> Result<Option<String>>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// HTTPS URL Service Catalog can load the object from
    fn object_url(&self, key: &str) -> String;
}

pub struct S3TemplateBucket {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3TemplateBucket {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
        }
    }
}

fn s3_error<E>(context: &str, e: E) -> Error
where
    E: std::error::Error + 'static,
{
    Error::Aws(format!("{}: {}", context, aws_sdk_s3::error::DisplayErrorContext(&e)))
}

#[async_trait]
impl TemplateBucket for S3TemplateBucket {
    async fn first_key(&self, prefix: &str) -> Result<Option<String>> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| s3_error("Failed to list artifacts", e))?;

        Ok(output
            .contents
            .unwrap_or_default()
            .into_iter()
            .find_map(|object| object.key))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("Failed to read artifact", e))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Aws(format!("Failed to read artifact body: {}", e)))?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .map_err(|e| s3_error("Failed to write artifact", e))?;

        debug!(bucket = %self.bucket, key = %key, "Wrote artifact");
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key)
    }
}

#[async_trait]
pub trait TemplateValidator: Send + Sync {
    async fn validate(&self, template_body: &str) -> Result<()>;
}

pub struct CloudFormationValidator {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormationValidator {
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TemplateValidator for CloudFormationValidator {
    async fn validate(&self, template_body: &str) -> Result<()> {
        self.client
            .validate_template()
            .template_body(template_body)
            .send()
            .await
            .map_err(|e| {
                Error::Template(format!(
                    "Template failed validation: {}",
                    aws_sdk_cloudformation::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
