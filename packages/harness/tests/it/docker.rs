//! [`DockerCli`] against a real docker daemon.

use color_eyre::Result;
use harness::{ContainerSpec, DockerCli, Runtime, Stream, random_name};
use pretty_assertions::assert_eq as pretty_assert_eq;

const IMAGE: &str = "alpine:3";

#[test_log::test(tokio::test)]
async fn start_inspect_and_remove() -> Result<()> {
    let docker = DockerCli::default();
    let spec = ContainerSpec::new()
        .name(random_name("harness-test"))
        .image(IMAGE)
        .hostname("harness-test")
        .command(["sleep", "60"])
        .finish();

    docker.start(&spec).await?;
    let ip = docker.resolve_ip(&spec.name).await;
    docker.stop_and_remove(&spec.name).await;
    assert!(!ip?.is_unspecified());

    // Removing again is a no-op, and the container is gone.
    docker.stop_and_remove(&spec.name).await;
    assert!(docker.resolve_ip(&spec.name).await.is_err());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn attached_run_captures_output() -> Result<()> {
    let docker = DockerCli::default();
    let spec = ContainerSpec::new()
        .name(random_name("harness-test"))
        .image(IMAGE)
        .hostname("harness-test")
        .env("GREETING", "0 failing, 0 errors")
        .command(["sh", "-c", "echo \"$GREETING\"; exit 3"])
        .finish();

    let output = docker.run_attached(&spec, Stream::Quiet).await;
    docker.stop_and_remove(&spec.name).await;
    let output = output?;

    pretty_assert_eq!(output.code(), Some(3));
    pretty_assert_eq!(output.stdout_lossy(), "0 failing, 0 errors\n");
    Ok(())
}

#[test_log::test]
fn blocking_remove_of_missing_container_is_quiet() {
    DockerCli::default().stop_and_remove_blocking(&random_name("harness-missing"));
}
