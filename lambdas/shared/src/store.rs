//! Persistence seams
//!
//! Handlers depend on these traits; `DynamoClient` is the production
//! implementation of all three.

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{Attribute, Pattern, PatternVersion, Subscription};

/// One page of a listing plus the opaque token for the next one
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn get_pattern(&self, pattern_id: &str) -> Result<Option<Pattern>>;

    /// Insert or replace a pattern row
    async fn put_pattern(&self, pattern: &Pattern) -> Result<()>;

    async fn list_patterns(&self, limit: u32, next_token: Option<&str>) -> Result<Page<Pattern>>;

    /// All versions of a pattern, newest first
    async fn list_versions(&self, pattern_id: &str) -> Result<Vec<PatternVersion>>;

    /// Insert the version row and point the pattern's `lastCommitId` at it
    ///
    /// Both writes succeed or neither does. A pattern without a metadata row
    /// gets one holding only the pointer, which `get_pattern` reports as absent.
    async fn register_version(&self, version: &PatternVersion) -> Result<()>;
}

#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn get_attribute(&self, id: &str) -> Result<Option<Attribute>>;

    /// Insert a new attribute; fails with `AttributeAlreadyExists` if the id is taken
    async fn create_attribute(&self, attribute: &Attribute) -> Result<()>;

    /// Replace an existing attribute; fails with `AttributeNotFound` if missing
    async fn update_attribute(&self, attribute: &Attribute) -> Result<()>;

    async fn delete_attribute(&self, id: &str) -> Result<()>;

    /// List attributes, restricted to one key when given
    async fn list_attributes(
        &self,
        key: Option<&str>,
        limit: u32,
        next_token: Option<&str>,
    ) -> Result<Page<Attribute>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn put_subscription(&self, subscription: &Subscription) -> Result<()>;

    async fn delete_subscription(&self, pattern_id: &str, email: &str) -> Result<()>;

    async fn get_subscription(&self, pattern_id: &str, email: &str) -> Result<Option<Subscription>>;

    async fn list_subscriptions(&self, pattern_id: &str) -> Result<Vec<Subscription>>;
}
