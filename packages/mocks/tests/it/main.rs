//! Route-level tests for the mock upstreams, served in-process.

use axum_test::TestServer;
use color_eyre::Result;
use mocks::Upstream;

pub mod accounts;
pub mod carts;
pub mod payment;
pub mod shipping;

/// Serve the upstream in-process.
pub fn server(upstream: Upstream) -> Result<TestServer> {
    TestServer::new(mocks::router(upstream)).map_err(|err| color_eyre::eyre::eyre!("{err:?}"))
}

#[test_log::test(tokio::test)]
async fn every_upstream_answers_health() -> Result<()> {
    use strum::IntoEnumIterator;

    for upstream in Upstream::iter() {
        let server = server(upstream)?;
        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_text("ok");
    }
    Ok(())
}
