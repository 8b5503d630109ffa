//! Blueprint Attributes Lambda
//!
//! Handles attribute catalogue requests:
//! - POST /attributes - Create attribute
//! - GET /attributes - List attributes, optionally filtered by key
//! - GET /attributes/{id} - Get attribute
//! - PUT /attributes/{id} - Update attribute description/metadata
//! - DELETE /attributes/{id} - Delete attribute not referenced by any pattern
//!
//! Changes are mirrored to AppRegistry through the sync queue when one is configured.

use std::sync::Arc;

use aws_config::BehaviorVersion;
use blueprint_governance_core::attributes::AttributeService;
use blueprint_governance_core::config::{SyncQueueConfig, TableConfig};
use blueprint_governance_core::notify::{SqsSyncQueue, SyncQueue};
use blueprint_governance_core::validation::parse_body;
use blueprint_governance_core::{
    CreateAttributeRequest, DynamoClient, Error, ErrorResponse, UpdateAttributeRequest,
};
use lambda_http::{run, service_fn, Body, Error as LambdaError, Request, RequestExt, Response};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

struct App {
    dynamo: DynamoClient,
    sync_queue: Option<SqsSyncQueue>,
}

impl App {
    fn service(&self) -> AttributeService<'_> {
        AttributeService {
            attributes: &self.dynamo,
            patterns: &self.dynamo,
            sync_queue: self.sync_queue.as_ref().map(|q| q as &dyn SyncQueue),
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

    info!(method = %method, path = %path, "Processing attributes request");

    let service = app.service();
    let query = event.query_string_parameters();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method.as_str(), segments.as_slice()) {
        // POST /attributes - Create attribute
        ("POST", ["attributes"]) => match parse_body::<CreateAttributeRequest>(event.body()) {
            Ok(req) => respond(201, service.create(req).await),
            Err(e) => error_response(e),
        },

        // GET /attributes?key=&limit=&nextToken= - List attributes
        ("GET", ["attributes"]) => match parse_limit(query.first("limit")) {
            Ok(limit) => respond(
                200,
                service
                    .list(query.first("key"), limit, query.first("nextToken"))
                    .await,
            ),
            Err(e) => error_response(e),
        },

        // GET /attributes/{id} - Get attribute
        ("GET", ["attributes", id]) => {
            let id = path_id(&event, id);
            respond(200, service.get(&id).await)
        }

        // PUT /attributes/{id} - Update attribute
        ("PUT", ["attributes", id]) => {
            let id = path_id(&event, id);
            match parse_body::<UpdateAttributeRequest>(event.body()) {
                Ok(req) => respond(200, service.update(&id, req).await),
                Err(e) => error_response(e),
            }
        }

        // DELETE /attributes/{id} - Delete attribute
        ("DELETE", ["attributes", id]) => {
            let id = path_id(&event, id);
            respond(200, service.delete(&id).await)
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

    let sync_queue = match SyncQueueConfig::from_env() {
        Some(queue) => Some(SqsSyncQueue::new(aws_sdk_sqs::Client::new(&config), queue.queue_url)),
        None => {
            warn!("APPREGISTRY_SYNC_QUEUE_URL not set, AppRegistry sync disabled");
            None
        }
    };

    let app = Arc::new(App {
        dynamo: DynamoClient::with_tables(aws_sdk_dynamodb::Client::new(&config), TableConfig::from_env()?),
        sync_queue,
    });

    run(service_fn(move |event: Request| {
        let app = app.clone();
        async move { handler(app, event).await }
    }))
    .await
}
