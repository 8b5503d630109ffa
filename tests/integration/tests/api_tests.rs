//! Integration tests for the blueprint governance API
//!
//! Run with: BLUEPRINT_API_URL=https://your-api.execute-api.us-west-2.amazonaws.com/prod cargo test
//!
//! These tests require a deployed instance. Pattern creation provisions real
//! repositories and builds, so only its rejection paths are exercised here.

use blueprint_governance_integration_tests::{
    client::{
        BlueprintClient, CreateAttributeRequest, CreatePatternRequest, SubscriptionRequest,
        UpdateAttributeRequest,
    },
    fixtures::{unique_attribute_key, unique_email, unique_pattern_name},
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

/// Helper to get client or skip test
fn get_client() -> Option<BlueprintClient> {
    dotenvy::dotenv().ok();
    match std::env::var("BLUEPRINT_API_URL") {
        Ok(url) => Some(BlueprintClient::new(&url)),
        Err(_) => {
            eprintln!("Skipping: BLUEPRINT_API_URL not set");
            None
        }
    }
}

fn attribute_request(key: &str, value: &str) -> CreateAttributeRequest {
    CreateAttributeRequest {
        key: key.to_string(),
        value: value.to_string(),
        description: Some("integration test attribute".to_string()),
    }
}

// ============================================================================
// Attribute Tests
// ============================================================================

#[tokio::test]
async fn test_attribute_lifecycle() {
    let Some(client) = get_client() else { return };

    let key = unique_attribute_key();

    let created = client
        .create_attribute(&attribute_request(&key, "Prod"))
        .await
        .expect("Failed to create attribute");

    assert_eq!(created.id, format!("{}:PROD", key.to_uppercase()));
    assert_eq!(created.name, format!("{}:Prod", key));
    assert_eq!(created.key_index, key.to_uppercase());

    let fetched = client
        .get_attribute(&created.id)
        .await
        .expect("Failed to get attribute");
    assert_eq!(fetched.name, created.name);

    let updated = client
        .update_attribute(
            &created.id,
            &UpdateAttributeRequest {
                description: Some("updated".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update attribute");
    assert_eq!(updated.description, "updated");

    let listed = client
        .list_attributes(Some(&key))
        .await
        .expect("Failed to list attributes");
    assert_eq!(listed.results.len(), 1);

    client
        .delete_attribute(&created.id)
        .await
        .expect("Failed to delete attribute");

    let err = client.get_attribute(&created.id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_create_duplicate_attribute_fails() {
    let Some(client) = get_client() else { return };

    let key = unique_attribute_key();
    let created = client
        .create_attribute(&attribute_request(&key, "dev"))
        .await
        .expect("Failed to create attribute");

    let err = client
        .create_attribute(&attribute_request(&key, "DEV"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(409));

    // Cleanup
    let _ = client.delete_attribute(&created.id).await;
}

#[tokio::test]
async fn test_create_attribute_reports_all_problems() {
    let Some(client) = get_client() else { return };

    let err = client
        .create_attribute(&CreateAttributeRequest {
            key: "bad key".to_string(),
            value: "bad value!".to_string(),
            description: Some("x".repeat(1025)),
        })
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    let body = err.error_body().expect("error body");
    assert!(!body.retryable);
    assert!(body.error.contains("key"));
    assert!(body.error.contains("value"));
    assert!(body.error.contains("description"));
}

#[tokio::test]
async fn test_attribute_key_cannot_change() {
    let Some(client) = get_client() else { return };

    let key = unique_attribute_key();
    let created = client
        .create_attribute(&attribute_request(&key, "blue"))
        .await
        .expect("Failed to create attribute");

    let result = client
        .update_attribute(
            &created.id,
            &UpdateAttributeRequest {
                value: Some("green".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(result.is_err());

    // Cleanup
    let _ = client.delete_attribute(&created.id).await;
}

// ============================================================================
// Pattern Tests
// ============================================================================

#[tokio::test]
async fn test_get_missing_pattern() {
    let Some(client) = get_client() else { return };

    let err = client.get_pattern("itest-does-not-exist").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_rerun_missing_pattern() {
    let Some(client) = get_client() else { return };

    let err = client.rerun_pipeline("itest-does-not-exist").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_list_patterns_respects_limit() {
    let Some(client) = get_client() else { return };

    let page = client
        .list_patterns(Some(1))
        .await
        .expect("Failed to list patterns");
    assert!(page.results.len() <= 1);
}

#[tokio::test]
async fn test_create_pattern_with_unknown_attribute_fails() {
    let Some(client) = get_client() else { return };

    let mut attributes = BTreeMap::new();
    attributes.insert(unique_attribute_key(), "missing".to_string());

    let err = client
        .create_pattern(&CreatePatternRequest {
            name: unique_pattern_name(),
            description: "integration test pattern".to_string(),
            pattern_type: "CFN".to_string(),
            owner: "itest".to_string(),
            email: unique_email(),
            attributes: Some(attributes),
        })
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_create_pattern_rejects_bad_name() {
    let Some(client) = get_client() else { return };

    let err = client
        .create_pattern(&CreatePatternRequest {
            name: "no/slashes/allowed".to_string(),
            description: "integration test pattern".to_string(),
            pattern_type: "CDK".to_string(),
            owner: "itest".to_string(),
            email: "not-an-email".to_string(),
            attributes: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
}

// ============================================================================
// Subscription Tests
// ============================================================================

#[tokio::test]
async fn test_subscribe_to_missing_pattern() {
    let Some(client) = get_client() else { return };

    let err = client
        .subscribe(&SubscriptionRequest {
            pattern_id: "itest-does-not-exist".to_string(),
            email: unique_email(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let Some(client) = get_client() else { return };

    // Needs an existing pattern to subscribe to
    let page = client
        .list_patterns(Some(1))
        .await
        .expect("Failed to list patterns");
    let Some(pattern) = page.results.first() else {
        eprintln!("Skipping: no patterns deployed");
        return;
    };

    let request = SubscriptionRequest {
        pattern_id: pattern.pattern_id.clone(),
        email: unique_email(),
    };

    let created = client.subscribe(&request).await.expect("Failed to subscribe");
    assert_eq!(created.email, request.email);

    let listed = client
        .list_subscriptions(&pattern.pattern_id)
        .await
        .expect("Failed to list subscriptions");
    assert!(listed.results.iter().any(|s| s.email == request.email));

    let deleted = client.unsubscribe(&request).await.expect("Failed to unsubscribe");
    assert!(deleted.success);

    let err = client.unsubscribe(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}
