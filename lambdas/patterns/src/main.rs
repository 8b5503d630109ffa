//! Blueprint Patterns Lambda
//!
//! Handles pattern lifecycle requests:
//! - POST /patterns - Create pattern (provisions repository, starts pipeline build)
//! - GET /patterns - List patterns
//! - GET /patterns/{id} - Get pattern with its published versions
//! - PUT /patterns/{id} - Update pattern metadata
//! - PUT /patterns/pipeline/{id} - Re-run pattern pipeline

use std::sync::Arc;

use aws_config::BehaviorVersion;
use blueprint_governance_core::blueprints::BlueprintService;
use blueprint_governance_core::config::{BuildConfig, RepoConfig, TableConfig, UsageConfig};
use blueprint_governance_core::notify::{HttpUsageReporter, UsageReporter};
use blueprint_governance_core::pipeline::CodeBuildLauncher;
use blueprint_governance_core::repo::github::resolve_token;
use blueprint_governance_core::repo::{
    BlueprintRepoBuilder, CodeCommitRepoBuilder, GitHubRepoBuilder, RepoBuilderKind,
};
use blueprint_governance_core::validation::parse_body;
use blueprint_governance_core::{
    CreatePatternRequest, DynamoClient, Error, ErrorResponse, UpdatePatternRequest,
};
use lambda_http::{run, service_fn, Body, Error as LambdaError, Request, RequestExt, Response};
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

struct App {
    dynamo: DynamoClient,
    repo_builder: Box<dyn BlueprintRepoBuilder>,
    builds: CodeBuildLauncher,
    usage: Option<HttpUsageReporter>,
    code_owners: Vec<String>,
}

impl App {
    fn service(&self) -> BlueprintService<'_> {
        BlueprintService {
            patterns: &self.dynamo,
            attributes: &self.dynamo,
            repo_builder: self.repo_builder.as_ref(),
            builds: &self.builds,
            usage: self.usage.as_ref().map(|u| u as &dyn UsageReporter),
            code_owners: &self.code_owners,
        }
    }
}

async fn handler(app: Arc<App>, event: Request) -> Result<Response<Body>, LambdaError> {
    let request_id = event
        .lambda_context_ref()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let span = info_span!("request", request_id = %request_id);

    route(&app, event).instrument(span).await
}

async fn route(app: &App, event: Request) -> Result<Response<Body>, LambdaError> {
    let method = event.method().as_str().to_string();
    let path = event.uri().path().to_string();

    info!(method = %method, path = %path, "Processing patterns request");

    let service = app.service();
    let query = event.query_string_parameters();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method.as_str(), segments.as_slice()) {
        // POST /patterns - Create pattern
        ("POST", ["patterns"]) => match parse_body::<CreatePatternRequest>(event.body()) {
            Ok(req) => respond(201, service.create(req).await),
            Err(e) => error_response(e),
        },

        // GET /patterns - List patterns
        ("GET", ["patterns"]) => match parse_limit(query.first("limit")) {
            Ok(limit) => respond(200, service.list(limit, query.first("nextToken")).await),
            Err(e) => error_response(e),
        },

        // PUT /patterns/pipeline/{id} - Re-run pipeline
        ("PUT", ["patterns", "pipeline", id]) => {
            let id = path_id(&event, id);
            respond(200, service.rerun_pipeline(&id).await)
        }

        // GET /patterns/{id} - Get pattern
        ("GET", ["patterns", id]) => {
            let id = path_id(&event, id);
            respond(200, service.get(&id).await)
        }

        // PUT /patterns/{id} - Update pattern metadata
        ("PUT", ["patterns", id]) => {
            let id = path_id(&event, id);
            match parse_body::<UpdatePatternRequest>(event.body()) {
                Ok(req) => respond(200, service.update(&id, req).await),
                Err(e) => error_response(e),
            }
        }

        _ => json_response(404, &ErrorResponse::new("Endpoint not found", false)),
    }
}

/// Prefer the API Gateway path parameter, which arrives decoded
fn path_id(event: &Request, segment: &str) -> String {
    event
        .path_parameters()
        .first("id")
        .unwrap_or(segment)
        .to_string()
}

fn parse_limit(value: Option<&str>) -> Result<Option<u32>, Error> {
    value
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| Error::Validation(format!("limit '{}' is not a positive integer", v)))
        })
        .transpose()
}

fn respond<T: Serialize>(status: u16, result: Result<T, Error>) -> Result<Response<Body>, LambdaError> {
    match result {
        Ok(body) => json_response(status, &body),
        Err(e) => error_response(e),
    }
}

fn json_response<T: Serialize>(status: u16, body: &T) -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(body)?))?)
}

fn error_response(e: Error) -> Result<Response<Body>, LambdaError> {
    error!(code = e.code(), error = %e, "Request failed");
    json_response(e.status_code(), &ErrorResponse::from(&e))
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let repo_config = RepoConfig::from_env()?;
    let build_config = BuildConfig::from_env()?;

    let repo_builder: Box<dyn BlueprintRepoBuilder> = match repo_config.kind {
        RepoBuilderKind::GitHub => {
            let ssm = aws_sdk_ssm::Client::new(&config);
            let token = resolve_token(&ssm, &repo_config).await?;
            Box::new(GitHubRepoBuilder::new(&repo_config, token)?)
        }
        RepoBuilderKind::CodeCommit => {
            let region = config
                .region()
                .map(|r| r.to_string())
                .ok_or_else(|| Error::Config("AWS region not configured".to_string()))?;
            Box::new(CodeCommitRepoBuilder::new(
                aws_sdk_codecommit::Client::new(&config),
                region,
                &repo_config,
            ))
        }
    };

    let usage = UsageConfig::from_env().map(HttpUsageReporter::new).transpose()?;

    let app = Arc::new(App {
        dynamo: DynamoClient::with_tables(aws_sdk_dynamodb::Client::new(&config), TableConfig::from_env()?),
        repo_builder,
        builds: CodeBuildLauncher::new(aws_sdk_codebuild::Client::new(&config), build_config.project_name),
        usage,
        code_owners: repo_config.code_owners.clone(),
    });

    info!(repo_type = ?repo_config.kind, "Patterns lambda initialised");

    run(service_fn(move |event: Request| {
        let app = app.clone();
        async move { handler(app, event).await }
    }))
    .await
}
