//! Test fixtures and utilities

use uuid::Uuid;

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Generate a unique attribute key for testing
pub fn unique_attribute_key() -> String {
    format!("itest_{}", short_id())
}

/// Generate a pattern name whose slug will not collide with real patterns
pub fn unique_pattern_name() -> String {
    format!("itest pattern {}", short_id())
}

/// Generate a unique subscriber email for testing
pub fn unique_email() -> String {
    format!("itest+{}@example.com", short_id())
}

/// Check if API URL is configured
pub fn api_url_configured() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("BLUEPRINT_API_URL").is_ok()
}

/// Skip test if API URL is not configured
#[macro_export]
macro_rules! skip_if_no_api {
    () => {
        if !$crate::fixtures::api_url_configured() {
            eprintln!("Skipping test: BLUEPRINT_API_URL not set");
            return;
        }
    };
}
