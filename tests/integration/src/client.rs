//! Blueprint Governance API client for testing

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// API client for the blueprint governance endpoints
pub struct BlueprintClient {
    client: Client,
    base_url: String,
}

// Request/Response types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatternRequest {
    pub name: String,
    pub description: String,
    pub pattern_type: String,
    pub owner: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub pattern_id: String,
    pub name: String,
    pub pattern_type: String,
    pub infrastructure_stack_status: String,
    pub pattern_repo_url: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternDetails {
    pub metadata: Pattern,
    pub versions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPatternsResponse {
    pub results: Vec<Pattern>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAttributeRequest {
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateAttributeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: String,
    pub name: String,
    pub key: String,
    pub value: String,
    pub key_index: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAttributesResponse {
    pub results: Vec<Attribute>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub pattern_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub pattern_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListSubscriptionsResponse {
    pub results: Vec<Subscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Result type for API responses
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// HTTP error with status code and body
    Http { status: StatusCode, body: String },
    /// Network or serialization error
    Request(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(status.as_u16()),
            ApiError::Request(_) => None,
        }
    }

    /// Decoded `{error, retryable}` body, when the API produced one
    pub fn error_body(&self) -> Option<ErrorResponse> {
        match self {
            ApiError::Http { body, .. } => serde_json::from_str(body).ok(),
            ApiError::Request(_) => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ApiError::Request(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl BlueprintClient {
    /// Create a new client with the given base URL
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from environment variable (or `.env`)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("BLUEPRINT_API_URL")
            .expect("BLUEPRINT_API_URL environment variable not set");
        Self::new(&base_url)
    }

    // =========================================================================
    // Pattern Operations
    // =========================================================================

    /// Create a pattern
    pub async fn create_pattern(&self, req: &CreatePatternRequest) -> ApiResult<Pattern> {
        self.send_json(reqwest::Method::POST, "/patterns", req).await
    }

    /// List one page of patterns
    pub async fn list_patterns(&self, limit: Option<u32>) -> ApiResult<ListPatternsResponse> {
        match limit {
            Some(l) => self.get(&format!("/patterns?limit={}", l)).await,
            None => self.get("/patterns").await,
        }
    }

    /// Get a pattern with its versions
    pub async fn get_pattern(&self, pattern_id: &str) -> ApiResult<PatternDetails> {
        self.get(&format!("/patterns/{}", pattern_id)).await
    }

    /// Restart a pattern's pipeline
    pub async fn rerun_pipeline(&self, pattern_id: &str) -> ApiResult<Pattern> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/patterns/pipeline/{}", pattern_id),
            &serde_json::json!({}),
        )
        .await
    }

    // =========================================================================
    // Attribute Operations
    // =========================================================================

    /// Create an attribute
    pub async fn create_attribute(&self, req: &CreateAttributeRequest) -> ApiResult<Attribute> {
        self.send_json(reqwest::Method::POST, "/attributes", req).await
    }

    /// List attributes, optionally restricted to one key
    pub async fn list_attributes(&self, key: Option<&str>) -> ApiResult<ListAttributesResponse> {
        match key {
            Some(k) => self.get(&format!("/attributes?key={}", k)).await,
            None => self.get("/attributes").await,
        }
    }

    /// Get an attribute by id
    pub async fn get_attribute(&self, id: &str) -> ApiResult<Attribute> {
        self.get(&format!("/attributes/{}", id)).await
    }

    /// Update an attribute
    pub async fn update_attribute(&self, id: &str, req: &UpdateAttributeRequest) -> ApiResult<Attribute> {
        self.send_json(reqwest::Method::PUT, &format!("/attributes/{}", id), req)
            .await
    }

    /// Delete an attribute
    pub async fn delete_attribute(&self, id: &str) -> ApiResult<Attribute> {
        self.delete(&format!("/attributes/{}", id)).await
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Subscribe an email to a pattern
    pub async fn subscribe(&self, req: &SubscriptionRequest) -> ApiResult<Subscription> {
        self.send_json(reqwest::Method::POST, "/subscriptions", req).await
    }

    /// Remove a subscription
    pub async fn unsubscribe(&self, req: &SubscriptionRequest) -> ApiResult<DeleteResponse> {
        self.send_json(reqwest::Method::DELETE, "/subscriptions", req).await
    }

    /// List the subscriptions of a pattern
    pub async fn list_subscriptions(&self, pattern_id: &str) -> ApiResult<ListSubscriptionsResponse> {
        self.get(&format!("/subscriptions?patternId={}", pattern_id)).await
    }

    // =========================================================================
    // HTTP Helpers
    // =========================================================================

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .request(method, &url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> ApiResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| ApiError::Request(e.to_string()))
        } else {
            Err(ApiError::Http { status, body })
        }
    }
}
