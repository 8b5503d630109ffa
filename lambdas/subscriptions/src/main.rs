//! Blueprint Subscriptions Lambda
//!
//! Handles pattern update subscriptions:
//! - POST /subscriptions - Subscribe an email to a pattern
//! - DELETE /subscriptions - Remove a subscription
//! - GET /subscriptions?patternId=&email= - Look up one subscription or list a pattern's

use std::sync::Arc;

use aws_config::BehaviorVersion;
use blueprint_governance_core::config::TableConfig;
use blueprint_governance_core::subscriptions::SubscriptionService;
use blueprint_governance_core::validation::parse_body;
use blueprint_governance_core::{DynamoClient, Error, ErrorResponse, SubscriptionRequest};
use lambda_http::{run, service_fn, Body, Error as LambdaError, Request, RequestExt, Response};
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

async fn handler(dynamo: Arc<DynamoClient>, event: Request) -> Result<Response<Body>, LambdaError> {
    let request_id = event
        .lambda_context_ref()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let span = info_span!("request", request_id = %request_id);

    route(&dynamo, event).instrument(span).await
}

async fn route(dynamo: &DynamoClient, event: Request) -> Result<Response<Body>, LambdaError> {
    let method = event.method().as_str().to_string();
    let path = event.uri().path().to_string();

    info!(method = %method, path = %path, "Processing subscriptions request");

    let service = SubscriptionService {
        subscriptions: dynamo,
        patterns: dynamo,
    };

    match method.as_str() {
        // POST /subscriptions - Subscribe
        "POST" => match parse_body::<SubscriptionRequest>(event.body()) {
            Ok(req) => respond(201, service.subscribe(req).await),
            Err(e) => error_response(e),
        },

        // DELETE /subscriptions - Unsubscribe
        "DELETE" => match parse_body::<SubscriptionRequest>(event.body()) {
            Ok(req) => respond(
                200,
                service
                    .unsubscribe(req)
                    .await
                    .map(|_| DeleteResponse { success: true }),
            ),
            Err(e) => error_response(e),
        },

        // GET /subscriptions - Query
        "GET" => {
            let query = event.query_string_parameters();
            match query.first("patternId") {
                Some(pattern_id) => respond(200, service.query(pattern_id, query.first("email")).await),
                None => error_response(Error::Validation("patternId query parameter is required".to_string())),
            }
        }

        _ => json_response(404, &ErrorResponse::new("Endpoint not found", false)),
    }
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
    let dynamo = Arc::new(DynamoClient::with_tables(
        aws_sdk_dynamodb::Client::new(&config),
        TableConfig::from_env()?,
    ));

    run(service_fn(move |event: Request| {
        let dynamo = dynamo.clone();
        async move { handler(dynamo, event).await }
    }))
    .await
}
