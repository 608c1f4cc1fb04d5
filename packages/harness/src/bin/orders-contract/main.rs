use std::path::PathBuf;

use clap::Parser;
use color_eyre::{
    Report, Result, Section, SectionExt,
    eyre::{Context, bail, eyre},
};
use harness::{DockerCli, HarnessConfig, HttpProbe, Orchestrator, Scenario, Verdict};
use itertools::Itertools;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{Layer as _, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(
    name = "orders-contract",
    about = "Run the orders service contract tests against throwaway containers",
    version
)]
struct Cli {
    /// The tag of the service image to use.
    ///
    /// Falls back to the `COMMIT` environment variable; an empty value
    /// selects `latest`.
    #[arg(long, env = "COMMIT", default_value = HarnessConfig::DEFAULT_TAG)]
    tag: String,

    /// Override the readiness retry budget of every scenario.
    #[arg(long, env = "ORDERS_RETRIES")]
    retries: Option<u32>,

    /// Path to the docker-compatible CLI.
    #[arg(long, env = "DOCKER", default_value = "docker")]
    docker: PathBuf,

    /// Directory holding the OpenAPI documents and the hooks script.
    #[arg(long, env = "ORDERS_SPEC_DIR", default_value = "api-spec")]
    spec_dir: PathBuf,

    /// Image reference for the mock upstream servers.
    #[arg(long, env = "MOCK_IMAGE", default_value = "orders-mocks:latest")]
    mock_image: String,

    /// Image reference for the contract verifier.
    #[arg(long, env = "VERIFIER_IMAGE", default_value = harness::Verifier::DEFAULT_IMAGE)]
    verifier_image: String,

    /// Don't mirror verifier output to the terminal while it runs.
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// List the available scenarios and exit.
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Run only the scenarios whose name contains one of these filters.
    filters: Vec<String>,
}

impl Cli {
    fn config(&self) -> Result<HarnessConfig> {
        let spec_dir = std::path::absolute(&self.spec_dir)
            .with_context(|| format!("resolve spec directory {:?}", self.spec_dir))?;
        if !spec_dir.is_dir() {
            return Err(eyre!("spec directory {spec_dir:?} does not exist"))
                .suggestion("run from the repository root or pass `--spec-dir`");
        }

        Ok(HarnessConfig::builder()
            .tag(&self.tag)
            .maybe_retries(self.retries)
            .spec_dir(spec_dir)
            .mock_image(&self.mock_image)
            .verifier_image(&self.verifier_image)
            .stream_verifier(!self.quiet)
            .build())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    color_eyre::install()?;

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    if cli.list {
        for scenario in Scenario::ALL {
            let mocks = scenario.mocks.iter().join(", ");
            println!("{}\tretries={}\tmocks=[{mocks}]", scenario.name, scenario.retries);
        }
        return Ok(());
    }

    let scenarios = Scenario::select(&cli.filters);
    if scenarios.is_empty() {
        return Err(eyre!("no scenario matches {:?}", cli.filters))
            .suggestion("run with `--list` to see the available scenarios");
    }

    let config = cli.config()?;
    let probe = HttpProbe::new(config.probe_timeout).context("build health probe")?;
    let orchestrator = Orchestrator::new(DockerCli::new(&cli.docker), probe, config);

    let mut failures = Vec::new();
    for scenario in &scenarios {
        let result = tokio::select! {
            result = orchestrator.run(scenario) => result,
            _ = tokio::signal::ctrl_c() => {
                // Dropping the run removes whatever it had started.
                bail!("interrupted while running {}", scenario.name);
            }
        };

        match result {
            Ok(outcome) => {
                if cli.quiet {
                    println!("{}", outcome.report.text);
                }
                println!("[PASS] {}", outcome.scenario);
            }
            Err(err) => {
                if let Some(Verdict::NoReport) = err.report().map(|report| report.verdict()) {
                    eprintln!("[FAIL] {}: the verifier produced no report", scenario.name);
                }
                eprintln!("[FAIL] {}: {err}", scenario.name);
                failures.push((scenario.name, err.into_report()));
            }
        }
    }

    conclude(&failures, scenarios.len())
}

/// The process result for a batch of scenarios: an error iff any failed.
fn conclude(failures: &[(&str, Report)], total: usize) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }

    let summary = failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .join("\n\n");
    Err(eyre!("{} of {total} scenarios failed", failures.len()))
        .section(summary.header("Failures:"))
}
