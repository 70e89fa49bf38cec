//! Conformance test suite for `KvClient` implementations.
//!
//! This module provides a backend-agnostic test suite that any `KvClient`
//! implementation can run to verify that the versioned store behaves
//! correctly on top of it. The suite covers:
//!
//! - **Create**: insert-if-absent semantics, duplicate detection
//! - **Update / OCC**: version round-tripping and mismatch detection
//! - **Transactions**: all-or-nothing commit, duplicate key rejection
//! - **Errors**: correct error variants for invalid operations
//! - **Leases**: TTL-bound keys disappear, re-puts move the lease
//! - **Watches**: event delivery, `until` timeouts, close idempotency
//! - **Concurrency**: exactly one winner for racing creates and updates
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty client for each test:
//!
//! ```ignore
//! use cplane_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn etcd_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         connect_to_fresh_etcd_namespace().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod create;
mod error;
mod lease;
mod txn;
mod update;
mod watch;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{KvClient, SharedClient};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "create", "txn", "watch").
    pub category: String,
    /// Test name (e.g. "create_fails_when_key_exists").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// client, ensuring test isolation.
pub async fn run_conformance_suite<C, F, Fut>(factory: F) -> ConformanceReport
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.extend(create::run_create_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(update::run_update_tests(&factory).await);
    results.extend(txn::run_txn_tests(&factory).await);
    results.extend(lease::run_lease_tests(&factory).await);
    results.extend(watch::run_watch_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Record type used throughout the suite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Item {
    #[serde(skip)]
    version: i64,
    name: String,
    count: i64,
}

crate::impl_value!(Item);

fn make_item(name: &str, count: i64) -> Item {
    Item {
        version: 0,
        name: name.to_string(),
        count,
    }
}

async fn shared<C, F, Fut>(factory: &F) -> SharedClient
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    Arc::new(factory().await)
}
