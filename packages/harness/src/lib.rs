//! Contract-test harness for the orders service.
//!
//! A run starts the service and its dependencies as throwaway containers,
//! waits for the service to answer HTTP, runs the contract verifier against
//! the service's OpenAPI document, and removes everything it started.
//!
//! The pieces, leaves first:
//! - [`Command`] runs external processes and captures their output.
//! - [`Runtime`] (implemented by [`DockerCli`]) starts, inspects and removes
//!   containers.
//! - [`health`] decides when the service is reachable.
//! - [`Verifier`] runs the contract verifier and interprets its report.
//! - [`Orchestrator`] ties them together for a [`Scenario`].
//!
//! ## Tracing
//!
//! Library code only emits `tracing` events; the `orders-contract` binary and
//! the tests decide where they go. Set `RUST_LOG=harness=debug` to see every
//! command the harness runs.

pub mod command;
pub mod config;
pub mod container;
pub mod health;
pub mod orchestrator;
pub mod scenario;
pub mod verifier;

pub use command::{Command, ParsedOutput, Stream};
pub use config::HarnessConfig;
pub use container::{ContainerSpec, DockerCli, Link, Mount, Runtime, random_name};
pub use health::{HttpProbe, Probe, ReadinessPolicy};
pub use orchestrator::{Orchestrator, Phase, RunError, RunOutcome, Teardown};
pub use scenario::Scenario;
pub use verifier::{Summary, Verdict, VerificationReport, Verifier};
