//! Blueprint Publish Lambda
//!
//! CodePipeline custom action that publishes a CFN pattern's changed packages
//! to Service Catalog, embedding AppRegistry associations when enabled, and
//! reports the resulting product lists back as pipeline output variables.

use std::sync::Arc;

use aws_config::BehaviorVersion;
use blueprint_governance_core::catalog::{CloudFormationValidator, S3TemplateBucket, ServiceCatalogClient};
use blueprint_governance_core::config::{PublishConfig, TableConfig};
use blueprint_governance_core::pipeline::{CodePipelineEvent, CodePipelineReporter};
use blueprint_governance_core::publish::PublishService;
use blueprint_governance_core::{DynamoClient, Error};
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

struct App {
    dynamo: DynamoClient,
    catalog: ServiceCatalogClient,
    bucket: S3TemplateBucket,
    validator: CloudFormationValidator,
    reporter: CodePipelineReporter,
    config: PublishConfig,
    region: String,
}

async fn handler(app: Arc<App>, event: LambdaEvent<CodePipelineEvent>) -> Result<(), LambdaError> {
    let (payload, context) = event.into_parts();
    let span = info_span!(
        "job",
        request_id = %context.request_id,
        job_id = %payload.job_id(),
    );

    async {
        info!("Processing publish job");

        let service = PublishService {
            patterns: &app.dynamo,
            catalog: &app.catalog,
            bucket: &app.bucket,
            validator: &app.validator,
            portfolio_id: &app.config.portfolio_id,
            appregistry_enabled: app.config.appregistry_enabled,
            region: &app.region,
        };

        service.run_job(&app.reporter, &payload).await?;
        info!("Publish job succeeded");
        Ok::<(), LambdaError>(())
    }
    .instrument(span)
    .await
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let publish_config = PublishConfig::from_env()?;
    let region = config
        .region()
        .map(|r| r.to_string())
        .ok_or_else(|| Error::Config("AWS region not configured".to_string()))?;

    let app = Arc::new(App {
        dynamo: DynamoClient::with_tables(aws_sdk_dynamodb::Client::new(&config), TableConfig::from_env()?),
        catalog: ServiceCatalogClient::new(aws_sdk_servicecatalog::Client::new(&config)),
        bucket: S3TemplateBucket::new(
            aws_sdk_s3::Client::new(&config),
            publish_config.artifact_bucket.clone(),
            region.clone(),
        ),
        validator: CloudFormationValidator::new(aws_sdk_cloudformation::Client::new(&config)),
        reporter: CodePipelineReporter::new(aws_sdk_codepipeline::Client::new(&config)),
        config: publish_config,
        region,
    });

    run(service_fn(move |event: LambdaEvent<CodePipelineEvent>| {
        let app = app.clone();
        async move { handler(app, event).await }
    }))
    .await
}
