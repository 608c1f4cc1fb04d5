use std::{path::PathBuf, time::Duration};

use bon::Builder;

use crate::{
    Verifier,
    health::{HttpProbe, ReadinessPolicy},
};

/// Everything a run needs to know about its environment.
///
/// Populated once at the CLI boundary (or directly in tests) and passed to
/// the [`Orchestrator`](crate::Orchestrator); nothing in the harness reads
/// process-wide configuration on its own.
#[derive(Clone, Debug, Builder)]
pub struct HarnessConfig {
    /// Extra environment for the verifier container, after
    /// [`HarnessConfig::verifier_env`].
    #[builder(field)]
    pub extra_verifier_env: Vec<(String, String)>,

    /// Tag of the service image to test; usually a commit identifier.
    #[builder(into, default = String::from(HarnessConfig::DEFAULT_TAG))]
    pub tag: String,

    /// Repository of the service image, without a tag.
    #[builder(into, default = String::from("weaveworksdemos/orders"))]
    pub service_image: String,

    /// Name of the service: its hostname, link alias and OpenAPI document
    /// name (`<service>.json`).
    #[builder(into, default = String::from("orders"))]
    pub service: String,

    /// Port the service listens on inside its container.
    #[builder(default = 80)]
    pub service_port: u16,

    /// Path probed for readiness.
    #[builder(into, default = String::from("/orders"))]
    pub health_path: String,

    /// Image reference for the service database.
    #[builder(into, default = String::from("mongo"))]
    pub database_image: String,

    /// Hostname and link alias of the service database.
    #[builder(into, default = String::from("orders-db"))]
    pub database_alias: String,

    /// Image reference for the mock upstream servers.
    #[builder(into, default = String::from("orders-mocks:latest"))]
    pub mock_image: String,

    /// Image reference for the contract-testing tool.
    #[builder(into, default = String::from(Verifier::DEFAULT_IMAGE))]
    pub verifier_image: String,

    /// Directory holding the OpenAPI documents and hooks script.
    #[builder(into)]
    pub spec_dir: PathBuf,

    /// Overrides the retry budget of every scenario.
    pub retries: Option<u32>,

    /// Delay between readiness probes.
    #[builder(default = ReadinessPolicy::DEFAULT_INTERVAL)]
    pub poll_interval: Duration,

    /// Connect/read timeout of each readiness probe.
    #[builder(default = HttpProbe::DEFAULT_TIMEOUT)]
    pub probe_timeout: Duration,

    /// Mirror the verifier output to the terminal while it runs.
    #[builder(default = true)]
    pub stream_verifier: bool,
}

impl HarnessConfig {
    pub const DEFAULT_TAG: &str = "latest";

    /// The full service image reference.
    ///
    /// An empty tag selects [`HarnessConfig::DEFAULT_TAG`].
    pub fn service_reference(&self) -> String {
        let tag = match self.tag.trim() {
            "" => Self::DEFAULT_TAG,
            tag => tag,
        };
        format!("{}:{tag}", self.service_image)
    }

    /// The base URL the verifier tests against, from inside the verifier
    /// container.
    pub fn verifier_base_url(&self) -> String {
        match self.service_port {
            80 => format!("http://{}/", self.service),
            port => format!("http://{}:{port}/", self.service),
        }
    }

    /// Environment for the verifier container: configuration the service
    /// needs that is not part of its API contract.
    pub fn verifier_env(&self) -> Vec<(String, String)> {
        std::iter::once((
            String::from("MONGO_ENDPOINT"),
            format!("mongodb://{}:27017/data", self.database_alias),
        ))
        .chain(self.extra_verifier_env.iter().cloned())
        .collect()
    }

    /// The readiness policy for a scenario with the given default budget.
    pub fn readiness(&self, scenario_retries: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            retries: self.retries.unwrap_or(scenario_retries),
            interval: self.poll_interval,
        }
    }
}

impl<S: harness_config_builder::State> HarnessConfigBuilder<S> {
    /// Add an environment variable for the verifier container.
    pub fn verifier_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_verifier_env.push((key.into(), value.into()));
        self
    }
}
