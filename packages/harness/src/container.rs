use std::{
    ffi::OsString,
    fmt::Display,
    future::Future,
    net::IpAddr,
    path::PathBuf,
};

use bon::Builder;
use color_eyre::{
    Result, Section, SectionExt,
    eyre::{Context, bail, eyre},
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{Command, ParsedOutput, Stream};

/// Generate a container name that is unique across concurrent test runs
/// sharing the same container runtime.
///
/// The name is in the format `{prefix}-{suffix}`, where the suffix is the
/// first 12 hex characters of a v4 UUID.
pub fn random_name(prefix: impl Display) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..12])
}

/// A network link to another container, addressable by `alias` from inside
/// the linking container.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Link {
    pub container: String,
    pub alias: String,
}

impl Link {
    pub fn new(container: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            alias: alias.into(),
        }
    }

    /// Render in the `container:alias` format used by `docker run --link`.
    pub fn as_arg(&self) -> String {
        format!("{}:{}", self.container, self.alias)
    }
}

/// A host directory mounted into a container.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Mount {
    pub host: PathBuf,
    pub container: PathBuf,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: true,
        }
    }

    /// Render in the `host:container[:ro]` format used by `docker run -v`.
    pub fn as_arg(&self) -> OsString {
        let mut arg = OsString::from(&self.host);
        arg.push(":");
        arg.push(&self.container);
        if self.read_only {
            arg.push(":ro");
        }
        arg
    }
}

/// Describes a container to start.
///
/// This is the full handle for a container in this harness: the runtime is
/// the source of truth for everything else about it, so the only thing we
/// learn after it starts is its address (see [`Runtime::resolve_ip`]).
#[derive(Clone, Eq, PartialEq, Debug, Builder)]
#[builder(start_fn = new, finish_fn = finish)]
pub struct ContainerSpec {
    /// Links to other containers.
    #[builder(field)]
    pub links: Vec<Link>,

    /// Environment variables to set in the container.
    /// Each tuple represents (key, value).
    #[builder(field)]
    pub env: Vec<(String, String)>,

    /// Host directories to mount in the container.
    #[builder(field)]
    pub mounts: Vec<Mount>,

    /// Additional arguments for the runtime, placed before the image.
    #[builder(field)]
    pub extra_args: Vec<String>,

    /// Arguments placed after the image, passed to the container entrypoint.
    #[builder(field)]
    pub command: Vec<String>,

    /// The container name; see [`random_name`].
    #[builder(into)]
    pub name: String,

    /// The image reference, including the tag.
    #[builder(into)]
    pub image: String,

    /// The hostname inside the container.
    #[builder(into)]
    pub hostname: String,
}

impl<S: container_spec_builder::State> ContainerSpecBuilder<S> {
    /// Add a single link to another container.
    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Add links to other containers.
    pub fn links(mut self, links: impl IntoIterator<Item = Link>) -> Self {
        self.links.extend(links);
        self
    }

    /// Add a single environment variable to set in the container.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add environment variables to set in the container.
    /// Each tuple represents (key, value).
    pub fn env_vars(
        mut self,
        vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add a host directory to mount in the container.
    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Add an argument for the runtime, placed before the image.
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Add arguments for the container entrypoint.
    pub fn command(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }
}

/// The container lifecycle verbs the harness needs.
///
/// Every method mutates state in the external runtime; implementations hold
/// no state of their own about the containers they manage.
pub trait Runtime {
    /// Start the container in the background.
    ///
    /// Fails if the runtime rejects the container.
    fn start(&self, spec: &ContainerSpec) -> impl Future<Output = Result<()>>;

    /// Start the container in the foreground and wait for it to exit,
    /// capturing its output.
    ///
    /// The exit status of the container is reported, not interpreted. The
    /// container is left in place; callers remove it.
    fn run_attached(
        &self,
        spec: &ContainerSpec,
        stream: Stream,
    ) -> impl Future<Output = Result<ParsedOutput>>;

    /// Resolve the address of a running container.
    fn resolve_ip(&self, name: &str) -> impl Future<Output = Result<IpAddr>>;

    /// Stop and remove the container.
    ///
    /// Best effort: failures (including the container not existing) are
    /// logged and otherwise ignored, and nothing is retried.
    fn stop_and_remove(&self, name: &str) -> impl Future<Output = ()>;

    /// Blocking equivalent of [`Runtime::stop_and_remove`], for use in `Drop`.
    fn stop_and_remove_blocking(&self, name: &str);
}

/// Drives the `docker` command line.
#[derive(Clone, Debug)]
pub struct DockerCli {
    binary: OsString,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    /// The inspect template used by [`Runtime::resolve_ip`].
    pub const INSPECT_FORMAT: &str = "{{.State.Running}} {{.NetworkSettings.IPAddress}}";

    /// Use the docker-compatible CLI at `binary` (e.g. `docker` or `podman`).
    pub fn new(binary: impl Into<OsString>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The `run` invocation for the container; `detached` adds `-d`.
    pub fn run_command(&self, spec: &ContainerSpec, detached: bool) -> Command {
        Command::new()
            .name(&self.binary)
            .arg("run")
            .arg_if(detached, "-d")
            .arg("--name")
            .arg(&spec.name)
            .arg("-h")
            .arg(&spec.hostname)
            .arg_each("--link", spec.links.iter().map(Link::as_arg))
            .arg_each(
                "--env",
                spec.env.iter().map(|(key, value)| format!("{key}={value}")),
            )
            .arg_each("-v", spec.mounts.iter().map(Mount::as_arg))
            .args(&spec.extra_args)
            .arg(&spec.image)
            .args(&spec.command)
            .finish()
    }

    fn remove_command(&self, name: &str) -> Command {
        Command::new()
            .name(&self.binary)
            .args(["rm", "-f", "-v", name])
            .finish()
    }

    /// Whether the failed removal was just the container already being gone.
    fn already_gone(stderr: &str) -> bool {
        stderr.contains("No such container")
    }
}

impl Runtime for DockerCli {
    #[instrument(skip(self), fields(name = %spec.name, image = %spec.image))]
    async fn start(&self, spec: &ContainerSpec) -> Result<()> {
        self.run_command(spec, true)
            .run_checked(Stream::Quiet)
            .await
            .with_context(|| format!("start container {:?} from {:?}", spec.name, spec.image))
            .map(drop)
    }

    #[instrument(skip(self), fields(name = %spec.name, image = %spec.image))]
    async fn run_attached(&self, spec: &ContainerSpec, stream: Stream) -> Result<ParsedOutput> {
        self.run_command(spec, false)
            .run(stream)
            .await
            .with_context(|| format!("run container {:?} from {:?}", spec.name, spec.image))
    }

    #[instrument(skip(self))]
    async fn resolve_ip(&self, name: &str) -> Result<IpAddr> {
        let output = Command::new()
            .name(&self.binary)
            .args(["inspect", "--format", Self::INSPECT_FORMAT, name])
            .finish()
            .run_checked(Stream::Quiet)
            .await
            .with_context(|| format!("inspect container {name:?}"))?;
        parse_inspect(&output.stdout_lossy())
            .with_context(|| format!("resolve address of container {name:?}"))
    }

    #[instrument(skip(self))]
    async fn stop_and_remove(&self, name: &str) {
        match self.remove_command(name).run(Stream::Quiet).await {
            Ok(output) if output.status.success() => debug!("removed container"),
            Ok(output) if Self::already_gone(&output.stderr_lossy()) => {
                debug!("container already removed")
            }
            Ok(output) => warn!(
                status = %output.status,
                stderr = %output.stderr_lossy(),
                "unable to remove container"
            ),
            Err(err) => warn!(?err, "unable to remove container"),
        }
    }

    #[instrument(skip(self))]
    fn stop_and_remove_blocking(&self, name: &str) {
        let output = std::process::Command::new(&self.binary)
            .args(["rm", "-f", "-v", name])
            .stdin(std::process::Stdio::null())
            .output();
        match output {
            Ok(output) if output.status.success() => debug!("removed container"),
            Ok(output) if Self::already_gone(&String::from_utf8_lossy(&output.stderr)) => {
                debug!("container already removed")
            }
            Ok(output) => warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "unable to remove container"
            ),
            Err(err) => warn!(?err, "unable to remove container"),
        }
    }
}

/// Parse the output of `docker inspect --format` with
/// [`DockerCli::INSPECT_FORMAT`].
pub fn parse_inspect(output: &str) -> Result<IpAddr> {
    let output = output.trim();
    let (running, address) = output
        .split_once(' ')
        .map(|(running, address)| (running, address.trim()))
        .unwrap_or((output, ""));

    match running {
        "true" => {}
        "false" => bail!("container is not running"),
        other => {
            return Err(eyre!("unexpected running state: {other:?}"))
                .section(output.to_string().header("Inspect output:"));
        }
    }

    if address.is_empty() {
        return Err(eyre!("container has no address on the default network"))
            .suggestion("the container may be attached only to a user-defined network");
    }

    address
        .parse()
        .with_context(|| format!("parse address {address:?}"))
}
