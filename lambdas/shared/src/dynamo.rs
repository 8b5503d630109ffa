//! DynamoDB operations for the blueprint governance service
//!
//! Four tables, names supplied through `TableConfig`:
//!
//! | Table          | PK          | SK          | Purpose                          |
//! |----------------|-------------|-------------|----------------------------------|
//! | pattern meta   | patternId   | -           | Pattern metadata                 |
//! | pattern publish| patternId   | commitId    | Published pattern versions       |
//! | attributes     | id          | -           | Attributes (GSI `keyIndex-index`)|
//! | subscriptions  | patternId   | email       | Email subscriptions              |

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_dynamo::{from_item, to_item};
use std::collections::HashMap;
use tracing::warn;

use crate::config::TableConfig;
use crate::errors::{Error, Result};
use crate::models::*;
use crate::store::{AttributeStore, Page, PatternStore, SubscriptionStore};

/// Global secondary index on the attributes table
const KEY_INDEX_NAME: &str = "keyIndex-index";

/// Attribute present on every pattern row written by create or update
const METADATA_MARKER: &str = "name";

type Item = HashMap<String, AttributeValue>;

/// DynamoDB client for governance operations
pub struct DynamoClient {
    client: Client,
    tables: TableConfig,
}

impl DynamoClient {
    pub fn with_tables(client: Client, tables: TableConfig) -> Self {
        Self { client, tables }
    }

    fn db_error<E>(e: E) -> Error
    where
        E: std::error::Error + 'static,
    {
        Error::Database(DisplayErrorContext(&e).to_string())
    }

    fn to_row<T: serde::Serialize>(value: &T) -> Result<Item> {
        to_item(value).map_err(|e| Error::DynamoSerialization(e.to_string()))
    }

    fn from_row<T: serde::de::DeserializeOwned>(item: Item) -> Result<T> {
        from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string()))
    }

    /// Decode every row; one row that no longer matches the model fails the whole read
    fn decode_rows<T: serde::de::DeserializeOwned>(items: Vec<Item>) -> Result<Vec<T>> {
        items.into_iter().map(Self::from_row).collect()
    }
}

/// Meta rows written by version registration alone carry no pattern metadata
fn has_metadata(item: &Item) -> bool {
    item.contains_key(METADATA_MARKER)
}

/// Encode a `LastEvaluatedKey` into an opaque page token
pub fn encode_page_token(key: &Item) -> Result<String> {
    let plain: HashMap<&str, &str> = key
        .iter()
        .filter_map(|(k, v)| v.as_s().ok().map(|s| (k.as_str(), s.as_str())))
        .collect();
    let json = serde_json::to_string(&plain)?;
    Ok(URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Decode a page token back into an `ExclusiveStartKey`
pub fn decode_page_token(token: &str) -> Result<Item> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| Error::Validation("nextToken is not valid base64".to_string()))?;
    let plain: HashMap<String, String> = serde_json::from_slice(&bytes)
        .map_err(|_| Error::Validation("nextToken is malformed".to_string()))?;
    Ok(plain
        .into_iter()
        .map(|(k, v)| (k, AttributeValue::S(v)))
        .collect())
}

fn next_page_token(last_key: Option<&Item>) -> Result<Option<String>> {
    match last_key {
        Some(key) if !key.is_empty() => Ok(Some(encode_page_token(key)?)),
        _ => Ok(None),
    }
}

fn start_key(next_token: Option<&str>) -> Result<Option<Item>> {
    next_token.map(decode_page_token).transpose()
}

#[async_trait]
impl PatternStore for DynamoClient {
    async fn get_pattern(&self, pattern_id: &str) -> Result<Option<Pattern>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.tables.pattern_meta_table)
            .key("patternId", AttributeValue::S(pattern_id.to_string()))
            .send()
            .await
            .map_err(Self::db_error)?;

        match result.item {
            Some(item) if has_metadata(&item) => Self::from_row(item).map(Some),
            Some(_) => {
                warn!(pattern_id = %pattern_id, "Pattern row has versions but no metadata");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_pattern(&self, pattern: &Pattern) -> Result<()> {
        let item = Self::to_row(pattern)?;

        self.client
            .put_item()
            .table_name(&self.tables.pattern_meta_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(Self::db_error)?;

        Ok(())
    }

    async fn list_patterns(&self, limit: u32, next_token: Option<&str>) -> Result<Page<Pattern>> {
        let result = self
            .client
            .scan()
            .table_name(&self.tables.pattern_meta_table)
            .filter_expression("attribute_exists(#marker)")
            .expression_attribute_names("#marker", METADATA_MARKER)
            .limit(limit as i32)
            .set_exclusive_start_key(start_key(next_token)?)
            .send()
            .await
            .map_err(Self::db_error)?;

        Ok(Page {
            next_token: next_page_token(result.last_evaluated_key.as_ref())?,
            items: Self::decode_rows(result.items.unwrap_or_default())?,
        })
    }

    async fn list_versions(&self, pattern_id: &str) -> Result<Vec<PatternVersion>> {
        let mut versions: Vec<PatternVersion> = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.tables.pattern_publish_table)
                .key_condition_expression("patternId = :pid")
                .expression_attribute_values(":pid", AttributeValue::S(pattern_id.to_string()))
                .set_exclusive_start_key(exclusive_start_key.take())
                .send()
                .await
                .map_err(Self::db_error)?;

            versions.extend(Self::decode_rows::<PatternVersion>(
                result.items.unwrap_or_default(),
            )?);

            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                _ => break,
            }
        }

        versions.sort_by(|a, b| b.created_timestamp.cmp(&a.created_timestamp));
        Ok(versions)
    }

    async fn register_version(&self, version: &PatternVersion) -> Result<()> {
        let item = Self::to_row(version)?;

        let put = Put::builder()
            .table_name(&self.tables.pattern_publish_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(commitId)")
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        let update = Update::builder()
            .table_name(&self.tables.pattern_meta_table)
            .key("patternId", AttributeValue::S(version.pattern_id.clone()))
            .update_expression("SET lastCommitId = :cid, updatedTimestamp = :ts")
            .expression_attribute_values(":cid", AttributeValue::S(version.commit_id.clone()))
            .expression_attribute_values(
                ":ts",
                AttributeValue::S(version.created_timestamp.to_rfc3339()),
            )
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put).build())
            .transact_items(TransactWriteItem::builder().update(update).build())
            .send()
            .await
            .map_err(Self::db_error)?;

        Ok(())
    }
}

#[async_trait]
impl AttributeStore for DynamoClient {
    async fn get_attribute(&self, id: &str) -> Result<Option<Attribute>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.tables.attributes_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(Self::db_error)?;

        result.item.map(Self::from_row).transpose()
    }

    async fn create_attribute(&self, attribute: &Attribute) -> Result<()> {
        let item = Self::to_row(attribute)?;

        // Use condition to prevent overwriting an existing attribute
        self.client
            .put_item()
            .table_name(&self.tables.attributes_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    Error::AttributeAlreadyExists(attribute.id.clone())
                } else {
                    Self::db_error(e)
                }
            })?;

        Ok(())
    }

    async fn update_attribute(&self, attribute: &Attribute) -> Result<()> {
        let item = Self::to_row(attribute)?;

        self.client
            .put_item()
            .table_name(&self.tables.attributes_table)
            .set_item(Some(item))
            .condition_expression("attribute_exists(id)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    Error::AttributeNotFound(attribute.id.clone())
                } else {
                    Self::db_error(e)
                }
            })?;

        Ok(())
    }

    async fn delete_attribute(&self, id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.tables.attributes_table)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(id)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    Error::AttributeNotFound(id.to_string())
                } else {
                    Self::db_error(e)
                }
            })?;

        Ok(())
    }

    async fn list_attributes(
        &self,
        key: Option<&str>,
        limit: u32,
        next_token: Option<&str>,
    ) -> Result<Page<Attribute>> {
        let exclusive_start_key = start_key(next_token)?;

        let (items, last_key) = match key {
            Some(key) => {
                let result = self
                    .client
                    .query()
                    .table_name(&self.tables.attributes_table)
                    .index_name(KEY_INDEX_NAME)
                    .key_condition_expression("keyIndex = :k")
                    .expression_attribute_values(":k", AttributeValue::S(key.trim().to_uppercase()))
                    .limit(limit as i32)
                    .set_exclusive_start_key(exclusive_start_key)
                    .send()
                    .await
                    .map_err(Self::db_error)?;
                (result.items, result.last_evaluated_key)
            }
            None => {
                let result = self
                    .client
                    .scan()
                    .table_name(&self.tables.attributes_table)
                    .limit(limit as i32)
                    .set_exclusive_start_key(exclusive_start_key)
                    .send()
                    .await
                    .map_err(Self::db_error)?;
                (result.items, result.last_evaluated_key)
            }
        };

        Ok(Page {
            next_token: next_page_token(last_key.as_ref())?,
            items: Self::decode_rows(items.unwrap_or_default())?,
        })
    }
}

#[async_trait]
impl SubscriptionStore for DynamoClient {
    async fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let item = Self::to_row(subscription)?;

        self.client
            .put_item()
            .table_name(&self.tables.subscriptions_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(Self::db_error)?;

        Ok(())
    }

    async fn delete_subscription(&self, pattern_id: &str, email: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.tables.subscriptions_table)
            .key("patternId", AttributeValue::S(pattern_id.to_string()))
            .key("email", AttributeValue::S(email.to_string()))
            .send()
            .await
            .map_err(Self::db_error)?;

        Ok(())
    }

    async fn get_subscription(&self, pattern_id: &str, email: &str) -> Result<Option<Subscription>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.tables.subscriptions_table)
            .key("patternId", AttributeValue::S(pattern_id.to_string()))
            .key("email", AttributeValue::S(email.to_string()))
            .send()
            .await
            .map_err(Self::db_error)?;

        result.item.map(Self::from_row).transpose()
    }

    async fn list_subscriptions(&self, pattern_id: &str) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.tables.subscriptions_table)
                .key_condition_expression("patternId = :pid")
                .expression_attribute_values(":pid", AttributeValue::S(pattern_id.to_string()))
                .set_exclusive_start_key(exclusive_start_key.take())
                .send()
                .await
                .map_err(Self::db_error)?;

            subscriptions.extend(Self::decode_rows::<Subscription>(
                result.items.unwrap_or_default(),
            )?);

            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                _ => break,
            }
        }

        Ok(subscriptions)
    }
}
