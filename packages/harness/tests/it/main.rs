//! Integration tests for the harness.
//!
//! Most tests drive the orchestrator against [`fake::FakeRuntime`], which
//! records every container operation instead of talking to a container
//! runtime. Tests that need a real runtime are behind the `ci` feature.

pub mod health;

#[cfg(feature = "ci")]
pub mod docker;
