//! [`HttpProbe`] against real sockets.

use std::{net::SocketAddr, time::Duration};

use color_eyre::Result;
use harness::{HttpProbe, Probe, ReadinessPolicy, health::wait_until_reachable};
use mocks::Upstream;
use pretty_assertions::assert_eq as pretty_assert_eq;
use tokio::net::TcpListener;
use url::Url;

async fn mock_server(upstream: Upstream) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(mocks::serve(listener, upstream));
    Ok(addr)
}

fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).expect("valid url")
}

fn probe() -> HttpProbe {
    HttpProbe::new(Duration::from_millis(500)).expect("build probe")
}

#[test_log::test(tokio::test)]
async fn answering_server_is_reachable() -> Result<()> {
    let addr = mock_server(Upstream::Carts).await?;
    assert!(!probe().is_unreachable(&url(addr, "/health")).await);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn error_status_is_still_reachable() -> Result<()> {
    let addr = mock_server(Upstream::Payment).await?;
    assert!(!probe().is_unreachable(&url(addr, "/does-not-exist")).await);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn closed_port_is_unreachable() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    assert!(probe().is_unreachable(&url(addr, "/orders")).await);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn silent_server_is_unreachable() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accepted = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    assert!(probe().is_unreachable(&url(addr, "/orders")).await);
    accepted.abort();
    Ok(())
}

#[test_log::test(tokio::test)]
async fn waits_for_a_late_server() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let listener = TcpListener::bind(addr).await?;
        mocks::serve(listener, Upstream::Shipping).await
    });

    let policy = ReadinessPolicy {
        retries: 50,
        interval: Duration::from_millis(50),
    };
    let readiness = wait_until_reachable(&probe(), &url(addr, "/health"), policy).await?;
    assert!(readiness.probes > 1, "{readiness:?}");
    late.abort();
    Ok(())
}

#[test_log::test(tokio::test)]
async fn gives_up_on_a_dead_port() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let policy = ReadinessPolicy {
        retries: 2,
        interval: Duration::from_millis(10),
    };
    let err = wait_until_reachable(&probe(), &url(addr, "/orders"), policy)
        .await
        .expect_err("nothing listens");
    pretty_assert_eq!(err.probes, 3);
    Ok(())
}
