//! Blueprint Governance Integration Tests
//!
//! These tests run against a deployed API (set the BLUEPRINT_API_URL
//! environment variable, or put it in a `.env` file). Without it every test
//! returns early.
//!
//! Run with: cargo test --package blueprint-governance-integration-tests

pub mod client;
pub mod fixtures;

pub use client::BlueprintClient;
pub use fixtures::*;
