//! Contract verification against a live service.
//!
//! The verifier is a black-box container: it is handed an OpenAPI document, a
//! base URL and a hooks script, and prints a free-form report. We run it,
//! capture what it prints, and then decide from that text whether the run
//! passed.

use std::path::PathBuf;

use bon::Builder;
use color_eyre::Result;
use lazy_regex::regex;
use tracing::{info, instrument};

use crate::{ContainerSpec, Link, Mount, Runtime, Stream, container::random_name};

/// Runs the contract-testing tool against a live service.
#[derive(Clone, Debug, Builder)]
pub struct Verifier {
    /// Image reference for the contract-testing tool.
    #[builder(into, default = Verifier::DEFAULT_IMAGE.to_string())]
    pub image: String,

    /// Host directory containing `<service>.json` and the hooks script.
    #[builder(into)]
    pub spec_dir: PathBuf,

    /// Name of the hooks script inside `spec_dir`.
    #[builder(into, default = String::from("hooks.js"))]
    pub hooks_file: String,

    /// Whether to mirror the verifier output to the terminal while it runs.
    #[builder(default)]
    pub stream: Stream,
}

impl Verifier {
    pub const DEFAULT_IMAGE: &str =
        "weaveworksdemos/openapi:6aca04cbdd63ee6f2033cf201b9c5cf39b6d8438";

    /// Where `spec_dir` is mounted inside the verifier container.
    pub const SPEC_MOUNT: &str = "/tmp/specs/";

    /// Prefix for verifier container names.
    pub const NAME_PREFIX: &str = "openapi";

    /// The container the verifier runs in for `service` against `base_url`.
    pub fn container(
        &self,
        service: &str,
        base_url: &str,
        links: &[Link],
        env: &[(String, String)],
    ) -> ContainerSpec {
        ContainerSpec::new()
            .name(random_name(Self::NAME_PREFIX))
            .hostname(Self::NAME_PREFIX)
            .image(&self.image)
            .mount(Mount::read_only(&self.spec_dir, Self::SPEC_MOUNT))
            .links(links.iter().cloned())
            .env_vars(env.iter().cloned())
            .command([
                format!("{}{service}.json", Self::SPEC_MOUNT),
                base_url.to_string(),
                String::from("-f"),
                format!("{}{}", Self::SPEC_MOUNT, self.hooks_file),
            ])
            .finish()
    }

    /// Verify `service` at `base_url`, returning the verifier's report.
    ///
    /// The verifier container is removed before this returns, whether or not
    /// the verifier ran successfully. A failing exit status from the verifier
    /// is recorded in the report but is not an error; only failing to run the
    /// verifier at all is.
    #[instrument(skip(self, runtime, links, env))]
    pub async fn run(
        &self,
        runtime: &impl Runtime,
        service: &str,
        base_url: &str,
        links: &[Link],
        env: &[(String, String)],
    ) -> Result<VerificationReport> {
        let spec = self.container(service, base_url, links, env);
        self.run_container(runtime, &spec).await
    }

    /// Run a verifier container built by [`Verifier::container`].
    ///
    /// Callers that must clean up after cancellation register `spec.name`
    /// for removal before calling this; the container is still removed
    /// eagerly here once the verifier exits.
    #[instrument(skip_all, fields(name = %spec.name))]
    pub async fn run_container(
        &self,
        runtime: &impl Runtime,
        spec: &ContainerSpec,
    ) -> Result<VerificationReport> {
        info!("running contract verifier");
        let output = runtime.run_attached(spec, self.stream).await;
        runtime.stop_and_remove(&spec.name).await;

        let output = output?;
        Ok(VerificationReport {
            text: output.combined_lossy(),
            exit_code: output.code(),
        })
    }
}

/// Counts from the summary line of a verifier report.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct Summary {
    pub passing: Option<u64>,
    pub failing: Option<u64>,
    pub errors: Option<u64>,
    pub skipped: Option<u64>,
    pub total: Option<u64>,
}

/// What a report says about the run, beyond plain acceptance.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Verdict {
    /// Both zero-count markers are present.
    Passed,

    /// The verifier produced a report, and it did not pass.
    Failed { summary: Option<Summary> },

    /// The verifier produced no summary, and either printed no pass/fail
    /// marker or was killed before exiting; it most likely crashed before
    /// testing anything.
    NoReport,
}

/// The raw output of a verifier run.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct VerificationReport {
    /// Combined stdout and stderr of the verifier.
    pub text: String,

    /// The verifier exit code, or `None` if it was killed by a signal.
    ///
    /// Acceptance is decided from [`VerificationReport::text`] alone; the
    /// exit code only separates a crashed verifier from a failing run in
    /// [`VerificationReport::verdict`].
    pub exit_code: Option<i32>,
}

impl VerificationReport {
    pub fn new(text: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            text: text.into(),
            exit_code,
        }
    }

    /// Whether the report contains an explicit zero-failures marker.
    ///
    /// The zero must stand alone: `10 failing` does not count.
    pub fn has_zero_failing(&self) -> bool {
        regex!(r"(?:^|[^0-9])0 failing").is_match(&self.text)
    }

    /// Whether the report contains an explicit zero-errors marker.
    pub fn has_zero_errors(&self) -> bool {
        regex!(r"(?:^|[^0-9])0 errors").is_match(&self.text)
    }

    /// The pass criterion: both zero-count markers are present.
    pub fn accepted(&self) -> bool {
        self.has_zero_failing() && self.has_zero_errors()
    }

    /// Parse the `complete: ...` summary line, if the report has one.
    ///
    /// The last such line wins, since the verifier prints progress lines
    /// with the same prefix before its final summary.
    pub fn summary(&self) -> Option<Summary> {
        let line = regex!(r"(?m)^.*complete:\s*(.*\d+\s+(?:passing|failing|errors?|skipped|total)\b.*)$")
            .captures_iter(&self.text)
            .last()?
            .get(1)?
            .as_str();

        let mut summary = Summary::default();
        for count in regex!(r"(\d+)\s+(passing|failing|errors?|skipped|total)").captures_iter(line) {
            let value = count[1].parse().ok();
            match &count[2] {
                "passing" => summary.passing = value,
                "failing" => summary.failing = value,
                "error" | "errors" => summary.errors = value,
                "skipped" => summary.skipped = value,
                "total" => summary.total = value,
                _ => {}
            }
        }
        Some(summary)
    }

    /// Classify the report.
    ///
    /// A report that is accepted always passes, whatever the exit code.
    pub fn verdict(&self) -> Verdict {
        if self.accepted() {
            return Verdict::Passed;
        }
        let summary = self.summary();
        let any_marker = regex!(r"\d+ (?:failing|errors?)").is_match(&self.text);
        let killed = self.exit_code.is_none();
        if summary.is_none() && (!any_marker || killed) {
            Verdict::NoReport
        } else {
            Verdict::Failed { summary }
        }
    }
}
