//! The top-level test run.
//!
//! A run moves through [`Phase`]s in order; any failure ends the run early.
//! Whatever happened, every container started during the run is removed
//! before [`Orchestrator::run`] returns (or, if the run is abandoned by a
//! panic or by dropping its future, when the [`Teardown`] guard drops).

use std::net::{IpAddr, SocketAddr};

use color_eyre::{
    Report,
    eyre::{Context, eyre},
};
use derive_more::{Display, Error};
use tracing::{error, info, instrument};
use url::Url;

use crate::{
    ContainerSpec, HarnessConfig, Link, Runtime, Scenario, Stream, VerificationReport, Verifier,
    container::random_name,
    health::{NotReady, Probe, wait_until_reachable},
    verifier::Verdict,
};

/// The phases of a run, in order.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum Phase {
    #[display("INIT")]
    Init,
    #[display("DEPENDENCIES_STARTING")]
    DependenciesStarting,
    #[display("WAITING_READY")]
    WaitingReady,
    #[display("VERIFYING")]
    Verifying,
    #[display("DONE")]
    Done,
    #[display("TEARDOWN")]
    Teardown,
}

/// A run that passed verification.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub scenario: &'static str,
    pub report: VerificationReport,
}

/// Why a run failed.
#[derive(Debug, Display, Error)]
pub enum RunError {
    /// A container could not be started, or its address resolved.
    #[display("launch failure: {_0:#}")]
    Launch(#[error(not(source))] Report),

    /// The service never became reachable.
    #[display("{_0}")]
    NotReady(NotReady),

    /// The verifier could not be run at all.
    #[display("verifier failure: {_0:#}")]
    Verifier(#[error(not(source))] Report),

    /// The verifier ran and its report does not pass.
    #[display("contract verification failed: {verdict:?}")]
    Verification {
        #[error(not(source))]
        report: VerificationReport,
        #[error(not(source))]
        verdict: Verdict,
    },
}

impl From<NotReady> for RunError {
    fn from(err: NotReady) -> Self {
        RunError::NotReady(err)
    }
}

/// Runs scenarios against a container runtime.
#[derive(Debug)]
pub struct Orchestrator<R, P> {
    runtime: R,
    probe: P,
    config: HarnessConfig,
}

impl<R: Runtime, P: Probe> Orchestrator<R, P> {
    pub fn new(runtime: R, probe: P, config: HarnessConfig) -> Self {
        Self {
            runtime,
            probe,
            config,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the scenario, tearing down everything it started.
    #[instrument(skip(self, scenario), fields(scenario = scenario.name))]
    pub async fn run(&self, scenario: &Scenario) -> Result<RunOutcome, RunError> {
        info!(phase = %Phase::Init, "starting run");
        let mut teardown = Teardown::new(&self.runtime);
        let result = self.run_phases(scenario, &mut teardown).await;
        match &result {
            Ok(_) => info!(phase = %Phase::Done, "run passed"),
            Err(err) => error!(phase = %Phase::Done, %err, "run failed"),
        }

        info!(phase = %Phase::Teardown, containers = teardown.len(), "tearing down");
        teardown.finish().await;
        result
    }

    async fn run_phases(
        &self,
        scenario: &Scenario,
        teardown: &mut Teardown<'_, R>,
    ) -> Result<RunOutcome, RunError> {
        let config = &self.config;

        info!(phase = %Phase::DependenciesStarting, "starting dependencies");
        let database = ContainerSpec::new()
            .name(random_name(&config.database_alias))
            .image(&config.database_image)
            .hostname(&config.database_alias)
            .finish();
        self.launch(&database, teardown).await?;
        let mut links = vec![Link::new(&database.name, &config.database_alias)];

        for upstream in scenario.mocks {
            let mock = ContainerSpec::new()
                .name(random_name(upstream.hostname()))
                .image(&config.mock_image)
                .hostname(upstream.hostname())
                .env(mocks::Upstream::ENV, upstream.to_string())
                .env("PORT", "80")
                .finish();
            self.launch(&mock, teardown).await?;
            links.push(Link::new(&mock.name, upstream.hostname()));
        }

        let service = ContainerSpec::new()
            .name(random_name(&config.service))
            .image(config.service_reference())
            .hostname(&config.service)
            .links(links.iter().cloned())
            .finish();
        self.launch(&service, teardown).await?;

        info!(phase = %Phase::WaitingReady, "waiting for service");
        let ip = self
            .runtime
            .resolve_ip(&service.name)
            .await
            .map_err(RunError::Launch)?;
        let url = health_url(ip, config.service_port, &config.health_path)
            .map_err(RunError::Launch)?;
        wait_until_reachable(&self.probe, &url, config.readiness(scenario.retries)).await?;

        info!(phase = %Phase::Verifying, "verifying contract");
        links.push(Link::new(&service.name, &config.service));
        let verifier = Verifier::builder()
            .image(&config.verifier_image)
            .spec_dir(&config.spec_dir)
            .stream(if config.stream_verifier {
                Stream::Live
            } else {
                Stream::Quiet
            })
            .build();
        let spec = verifier.container(
            &config.service,
            &config.verifier_base_url(),
            &links,
            &config.verifier_env(),
        );
        teardown.register(&spec.name);
        let report = verifier.run_container(&self.runtime, &spec).await;
        teardown.release(&spec.name);
        let report = report.map_err(RunError::Verifier)?;

        let verdict = report.verdict();
        if report.accepted() {
            Ok(RunOutcome {
                scenario: scenario.name,
                report,
            })
        } else {
            eprintln!(
                "[VERIFY] {}: contract verification failed ({verdict:?}); report follows:\n{}",
                scenario.name, report.text
            );
            Err(RunError::Verification { report, verdict })
        }
    }

    /// Start the container, registering it for teardown first so that a
    /// half-created container is still removed.
    async fn launch(
        &self,
        spec: &ContainerSpec,
        teardown: &mut Teardown<'_, R>,
    ) -> Result<(), RunError> {
        teardown.register(&spec.name);
        self.runtime.start(spec).await.map_err(RunError::Launch)
    }
}

/// The URL probed for readiness.
pub fn health_url(ip: IpAddr, port: u16, path: &str) -> color_eyre::Result<Url> {
    let addr = SocketAddr::new(ip, port);
    let path = path.strip_prefix('/').unwrap_or(path);
    Url::parse(&format!("http://{addr}/{path}"))
        .with_context(|| format!("build health URL for {addr}"))
}

/// Removes registered containers exactly once.
///
/// Call [`Teardown::finish`] on every path; if the guard is dropped before
/// that (because the run panicked or its future was dropped), the remaining
/// containers are removed synchronously in `Drop`.
#[derive(Debug)]
pub struct Teardown<'r, R: Runtime> {
    runtime: &'r R,
    names: Vec<String>,
}

impl<'r, R: Runtime> Teardown<'r, R> {
    pub fn new(runtime: &'r R) -> Self {
        Self {
            runtime,
            names: Vec::new(),
        }
    }

    /// Register a container for removal.
    pub fn register(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    /// Forget a container that the caller has already removed.
    pub fn release(&mut self, name: &str) {
        if let Some(index) = self.names.iter().rposition(|registered| registered == name) {
            self.names.remove(index);
        }
    }

    /// Number of containers still to be removed.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Remove every registered container, most recently started first.
    pub async fn finish(mut self) {
        while let Some(name) = self.names.pop() {
            self.runtime.stop_and_remove(&name).await;
        }
    }
}

impl<R: Runtime> Drop for Teardown<'_, R> {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        eprintln!(
            "[TEARDOWN] removing {} container(s) left behind by an abandoned run",
            self.names.len()
        );
        while let Some(name) = self.names.pop() {
            self.runtime.stop_and_remove_blocking(&name);
        }
    }
}

impl RunError {
    /// The verifier report, if the run got far enough to produce one.
    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            RunError::Verification { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Convert into a report for display.
    ///
    /// The verifier output is part of the message itself, so it is shown
    /// whichever `eyre` handler is installed.
    pub fn into_report(self) -> Report {
        match self.report().map(|report| report.text.trim_end()) {
            Some(text) => eyre!("{self}\n\nVerifier report:\n{text}"),
            None => eyre!("{self}"),
        }
    }
}
