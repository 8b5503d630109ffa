//! Identifier derivation and request validation
//!
//! Pattern ids are slugs of the pattern name. Attribute ids are derived from
//! (key, value) case-insensitively so the same tag always maps to one row.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::errors::{Error, Result};
use crate::models::{CreateAttributeRequest, CreatePatternRequest, UpdatePatternRequest};

pub const MAX_DESCRIPTION_LEN: usize = 1024;

fn pattern_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9\-_]{1,40}$").expect("valid regex"))
}

fn attribute_part_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]{1,120}$").expect("valid regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

/// Decode a JSON request body; an empty body is `MissingBody`
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::MissingBody);
    }
    serde_json::from_slice(body).map_err(|e| Error::Validation(format!("Invalid request body: {}", e)))
}

/// Turn a pattern name into its id: trimmed, lowercased, whitespace runs become `-`
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Whether a slug is a valid pattern id
pub fn is_valid_pattern_id(id: &str) -> bool {
    pattern_id_regex().is_match(id)
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Derive the attribute id for a (key, value) pair
///
/// The same pair in any letter case yields the same id.
pub fn make_attribute_id(key: &str, value: &str) -> String {
    format!("{}:{}", key.trim().to_uppercase(), value.trim().to_uppercase())
}

/// AppRegistry attribute group name for a (key, value) pair
pub fn attribute_group_name(key: &str, value: &str) -> String {
    format!("{}_{}", key.trim(), value.trim())
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Validate a create-pattern request and return the derived pattern id
///
/// All problems are collected before failing.
pub fn validate_create_pattern(req: &CreatePatternRequest) -> Result<String> {
    let pattern_id = slugify(&req.name);
    let mut problems = Vec::new();

    if !is_valid_pattern_id(&pattern_id) {
        problems.push(format!(
            "name '{}' must contain only lowercase letters, digits, '-' or '_' and be 1-40 characters long",
            req.name
        ));
    }
    if req.description.trim().is_empty() {
        problems.push("description is required".to_string());
    }
    if req.description.len() > MAX_DESCRIPTION_LEN {
        problems.push(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        ));
    }
    if req.owner.trim().is_empty() {
        problems.push("owner is required".to_string());
    }
    if !is_valid_email(&req.email) {
        problems.push(format!("email '{}' is invalid", req.email));
    }
    if let Some(repo) = &req.code_repository_details {
        if repo.repo_owner.trim().is_empty() || repo.branch_name.trim().is_empty() {
            problems.push("codeRepositoryDetails requires repoOwner and branchName".to_string());
        }
    }

    if problems.is_empty() {
        Ok(pattern_id)
    } else {
        Err(Error::validation(problems))
    }
}

pub fn validate_update_pattern(req: &UpdatePatternRequest) -> Result<()> {
    let mut problems = Vec::new();

    if let Some(description) = &req.description {
        if description.trim().is_empty() {
            problems.push("description must not be empty".to_string());
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            problems.push(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            ));
        }
    }
    if let Some(email) = &req.email {
        if !is_valid_email(email) {
            problems.push(format!("email '{}' is invalid", email));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(problems))
    }
}

pub fn validate_create_attribute(req: &CreateAttributeRequest) -> Result<()> {
    let mut problems = Vec::new();

    if !attribute_part_regex().is_match(&req.key) {
        problems.push(format!(
            "key '{}' must match {}",
            req.key,
            attribute_part_regex().as_str()
        ));
    }
    if !attribute_part_regex().is_match(&req.value) {
        problems.push(format!(
            "value '{}' must match {}",
            req.value,
            attribute_part_regex().as_str()
        ));
    }
    if let Some(description) = &req.description {
        if description.len() > MAX_DESCRIPTION_LEN {
            problems.push(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(problems))
    }
}
