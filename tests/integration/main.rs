// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Integration tests for upgrade-test
//!
//! These tests require a running Kubernetes cluster accessible via kubeconfig.
//! Tests are marked with #[ignore] and must be run explicitly:
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration -- --ignored
//!
//! # Run specific test
//! cargo test --test integration test_namespace_round_trip -- --ignored
//! ```
//!
//! The tests use your existing kubeconfig (~/.kube/config or KUBECONFIG env var).
//! Tests that install an operator additionally need OLM and the artifact
//! CRDs, plus these environment variables:
//!
//! - `UPGRADE_TEST_OPERATOR`: package name of an operator in the catalog
//! - `UPGRADE_TEST_BUNDLE_TAG`: a tag of its pre-provisioned artifact
//!
//! ## Design Principles
//!
//! - **Isolation**: Each test gets its own operator namespace
//! - **RAII Cleanup**: TestNamespace implements Drop for automatic cleanup even on panic

// Shared test fixtures (used by unit, integration, and proptest)
#[path = "../common/mod.rs"]
mod common;



pub use namespace::*;

/// Client from the ambient kubeconfig, resolved the way the binary does.
pub async fn cluster_client() -> kube::Client {
    let env = std::env::var("KUBECONFIG").ok();
    let home = std::env::var_os("HOME").map(std::path::PathBuf::from);
    let source = upgrade_test::client::resolve(None, env.as_deref(), home.as_deref());
    upgrade_test::client::connect(&source)
        .await
        .expect("Failed to connect to the cluster")
}
