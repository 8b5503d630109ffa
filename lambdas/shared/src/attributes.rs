//! Attribute CRUD
//!
//! Every successful mutation also asks the AppRegistry sync consumer to mirror
//! the change. That request is best-effort and never fails the operation.

use chrono::Utc;
use tracing::info;

use crate::blueprints::{page_limit, MAX_PAGE_SIZE};
use crate::errors::{Error, Result};
use crate::models::{Attribute, CreateAttributeRequest, ListAttributesResponse, UpdateAttributeRequest};
use crate::notify::{enqueue_attribute_sync, SyncAction, SyncQueue};
use crate::store::{AttributeStore, PatternStore};
use crate::validation::{make_attribute_id, validate_create_attribute, MAX_DESCRIPTION_LEN};

pub struct AttributeService<'a> {
    pub attributes: &'a dyn AttributeStore,
    pub patterns: &'a dyn PatternStore,
    pub sync_queue: Option<&'a dyn SyncQueue>,
}

impl<'a> AttributeService<'a> {
    pub async fn create(&self, request: CreateAttributeRequest) -> Result<Attribute> {
        validate_create_attribute(&request)?;

        let now = Utc::now();
        let attribute = Attribute {
            id: make_attribute_id(&request.key, &request.value),
            name: format!("{}:{}", request.key, request.value),
            key_index: request.key.to_uppercase(),
            key: request.key,
            value: request.value,
            description: request.description.unwrap_or_default(),
            metadata: request.metadata.unwrap_or_default(),
            create_time: now,
            last_update_time: now,
        };

        self.attributes.create_attribute(&attribute).await?;
        info!(attribute_id = %attribute.id, "Created attribute");

        enqueue_attribute_sync(self.sync_queue, SyncAction::Create, &attribute).await;
        Ok(attribute)
    }

    pub async fn get(&self, id: &str) -> Result<Attribute> {
        let id = id.to_uppercase();
        self.attributes
            .get_attribute(&id)
            .await?
            .ok_or(Error::AttributeNotFound(id))
    }

    pub async fn list(
        &self,
        key: Option<&str>,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<ListAttributesResponse> {
        let key = key.map(str::to_uppercase);
        let page = self
            .attributes
            .list_attributes(key.as_deref(), page_limit(limit), next_token)
            .await?;

        Ok(ListAttributesResponse {
            results: page.items,
            next_token: page.next_token,
        })
    }

    /// Update description and metadata; key and value are fixed once created
    pub async fn update(&self, id: &str, request: UpdateAttributeRequest) -> Result<Attribute> {
        let mut attribute = self.get(id).await?;

        let key = request.key.as_deref().unwrap_or(&attribute.key);
        let value = request.value.as_deref().unwrap_or(&attribute.value);
        if make_attribute_id(key, value) != attribute.id {
            return Err(Error::AttributeKeyImmutable(attribute.id));
        }

        if let Some(description) = request.description {
            if description.len() > MAX_DESCRIPTION_LEN {
                return Err(Error::Validation(format!(
                    "description must be at most {} characters",
                    MAX_DESCRIPTION_LEN
                )));
            }
            attribute.description = description;
        }
        if let Some(metadata) = request.metadata {
            attribute.metadata = metadata;
        }
        attribute.last_update_time = Utc::now();

        self.attributes.update_attribute(&attribute).await?;
        info!(attribute_id = %attribute.id, "Updated attribute");

        enqueue_attribute_sync(self.sync_queue, SyncAction::Update, &attribute).await;
        Ok(attribute)
    }

    /// Delete an attribute no pattern refers to
    ///
    /// Every page of patterns is checked before anything is deleted.
    pub async fn delete(&self, id: &str) -> Result<Attribute> {
        let attribute = self.get(id).await?;

        if let Some(pattern_id) = self.find_referencing_pattern(&attribute.id).await? {
            return Err(Error::AttributeInUse {
                attribute_id: attribute.id,
                pattern_id,
            });
        }

        self.attributes.delete_attribute(&attribute.id).await?;
        info!(attribute_id = %attribute.id, "Deleted attribute");

        enqueue_attribute_sync(self.sync_queue, SyncAction::Delete, &attribute).await;
        Ok(attribute)
    }

    async fn find_referencing_pattern(&self, attribute_id: &str) -> Result<Option<String>> {
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .patterns
                .list_patterns(MAX_PAGE_SIZE, next_token.as_deref())
                .await?;

            let found = page.items.into_iter().find(|pattern| {
                pattern
                    .attributes
                    .iter()
                    .any(|(key, value)| make_attribute_id(key, value) == attribute_id)
            });
            if let Some(pattern) = found {
                return Ok(Some(pattern.pattern_id));
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(None),
            }
        }
    }
}
