//! Readiness polling.
//!
//! The readiness signal here is intentionally weak: a target counts as
//! reachable as soon as anything answers HTTP on it, regardless of status.
//! That proves the network path and the listener exist, not that the service
//! is fully initialized; the retry budget and the verifier itself cover the
//! rest.

use std::{future::Future, time::Duration};

use derive_more::{Display, Error};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Decides whether a target is reachable.
pub trait Probe {
    /// Returns `true` only when the target could not be reached at all.
    fn is_unreachable(&self, url: &Url) -> impl Future<Output = bool>;
}

/// Probes targets with a plain HTTP `GET`.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// The per-request connect and read timeout used by default.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(timeout: Duration) -> color_eyre::Result<Self> {
        reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map(|client| Self { client })
            .map_err(Into::into)
    }
}

impl Probe for HttpProbe {
    #[instrument(skip(self, url), fields(%url))]
    async fn is_unreachable(&self, url: &Url) -> bool {
        match self.client.get(url.clone()).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "target answered");
                false
            }
            Err(err) if err.is_connect() || err.is_timeout() => {
                debug!(?err, "target unreachable");
                true
            }
            // Something accepted the connection and spoke (broken) HTTP back.
            Err(err) => {
                debug!(?err, "target answered with an unusable response");
                false
            }
        }
    }
}

/// How long to keep probing before giving up.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct ReadinessPolicy {
    /// How many times to retry after the first probe.
    pub retries: u32,

    /// Delay between probes.
    pub interval: Duration,
}

impl ReadinessPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::with_retries(10)
    }
}

/// The target became reachable.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Readiness {
    /// How many probes were issued, including the successful one.
    pub probes: u32,
}

/// The retry budget was exhausted while the target was still unreachable.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("could not get the API running: {url} unreachable after {probes} probes")]
pub struct NotReady {
    pub url: Url,
    pub probes: u32,
}

/// Probe `url` until it is reachable or the policy's retry budget runs out.
///
/// The first probe happens immediately. After each unreachable probe, if
/// retries remain, we sleep for the interval and try again; a budget of `N`
/// therefore issues at most `N + 1` probes and sleeps at most `N` times.
#[instrument(skip(probe, url), fields(%url))]
pub async fn wait_until_reachable(
    probe: &impl Probe,
    url: &Url,
    policy: ReadinessPolicy,
) -> Result<Readiness, NotReady> {
    let mut remaining = policy.retries;
    let mut probes = 0;
    loop {
        probes += 1;
        if !probe.is_unreachable(url).await {
            info!(probes, "target reachable");
            return Ok(Readiness { probes });
        }
        if remaining == 0 {
            warn!(probes, "retry budget exhausted");
            return Err(NotReady {
                url: url.clone(),
                probes,
            });
        }
        remaining -= 1;
        debug!(remaining, "target not reachable yet");
        tokio::time::sleep(policy.interval).await;
    }
}
