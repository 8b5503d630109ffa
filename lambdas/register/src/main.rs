//! Blueprint Register Lambda
//!
//! CodePipeline custom action that records a new pattern version and
//! announces it to subscribers over SNS.

use std::sync::Arc;

use aws_config::BehaviorVersion;
use blueprint_governance_core::config::{NotificationConfig, TableConfig};
use blueprint_governance_core::notify::SnsNotifier;
use blueprint_governance_core::pipeline::{CodePipelineEvent, CodePipelineReporter};
use blueprint_governance_core::register::{RegisterOutcome, RegisterService};
use blueprint_governance_core::DynamoClient;
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

struct App {
    dynamo: DynamoClient,
    notifier: SnsNotifier,
    reporter: CodePipelineReporter,
}

async fn handler(app: Arc<App>, event: LambdaEvent<CodePipelineEvent>) -> Result<(), LambdaError> {
    let (payload, context) = event.into_parts();
    let span = info_span!(
        "job",
        request_id = %context.request_id,
        job_id = %payload.job_id(),
    );

    async {
        info!("Processing register job");

        let service = RegisterService {
            patterns: &app.dynamo,
            notifier: &app.notifier,
        };

        match service.run_job(&app.reporter, &payload).await? {
            RegisterOutcome::NoChanges => info!("Register job succeeded without changes"),
            RegisterOutcome::Registered { notified } => {
                info!(notified = notified, "Register job succeeded")
            }
        }
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
    let notification_config = NotificationConfig::from_env()?;

    let app = Arc::new(App {
        dynamo: DynamoClient::with_tables(aws_sdk_dynamodb::Client::new(&config), TableConfig::from_env()?),
        notifier: SnsNotifier::new(aws_sdk_sns::Client::new(&config), notification_config.topic_arn),
        reporter: CodePipelineReporter::new(aws_sdk_codepipeline::Client::new(&config)),
    });

    run(service_fn(move |event: LambdaEvent<CodePipelineEvent>| {
        let app = app.clone();
        async move { handler(app, event).await }
    }))
    .await
}
