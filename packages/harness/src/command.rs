use std::{
    borrow::Cow,
    ffi::OsString,
    fmt::Debug,
    process::{ExitStatus, Stdio},
};

use bon::Builder;
use color_eyre::{
    Result, Section, SectionExt,
    eyre::{Context, OptionExt, eyre},
};
use itertools::Itertools;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Construct a command to run.
///
/// Every interaction the harness has with the outside world (aside from HTTP
/// health checks) goes through this type: the container runtime and the
/// contract verifier are both driven as child processes.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Builder)]
#[builder(start_fn = new, finish_fn = finish)]
pub struct Command {
    /// Arguments for the command.
    #[builder(field)]
    args: Vec<OsString>,

    /// The binary name (if in `$PATH`) or path to execute.
    #[builder(into)]
    name: OsString,
}

/// Whether the output of a command is mirrored to the current process while
/// it runs.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum Stream {
    /// Output is only buffered.
    #[default]
    Quiet,

    /// Output is buffered and also written to the stdout/stderr of the current
    /// process as it arrives.
    Live,
}

impl Command {
    /// The command line, rendered for humans.
    pub fn display(&self) -> String {
        std::iter::once(&self.name)
            .chain(&self.args)
            .map(|arg| arg.to_string_lossy())
            .join(" ")
    }

    /// Run the command to completion, capturing its output.
    ///
    /// A non-zero exit status is not an error here: callers that care use
    /// [`ParsedOutput::check`]. Errors are only returned if the process could
    /// not be spawned or its pipes could not be read.
    #[instrument(skip(self), fields(command = %self.display()))]
    pub async fn run(self, stream: Stream) -> Result<ParsedOutput> {
        let mut child = tokio::process::Command::new(&self.name)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("exec: `{}`", self.display()))?;

        let stdout = child.stdout.take().ok_or_eyre("take stdout")?;
        let stderr = child.stderr.take().ok_or_eyre("take stderr")?;

        // Both pipes are drained together; a child that fills one pipe while
        // we block on the other would otherwise never exit.
        let (stdout, stderr) = match stream {
            Stream::Quiet => tokio::try_join!(
                drain(stdout, tokio::io::sink()),
                drain(stderr, tokio::io::sink()),
            ),
            Stream::Live => tokio::try_join!(
                drain(stdout, tokio::io::stdout()),
                drain(stderr, tokio::io::stderr()),
            ),
        }
        .with_context(|| format!("read output of `{}`", self.display()))?;

        let status = child
            .wait()
            .await
            .with_context(|| format!("wait for `{}`", self.display()))
            .with_section(|| String::from_utf8_lossy(&stderr).into_owned().header("Stderr:"))
            .with_section(|| String::from_utf8_lossy(&stdout).into_owned().header("Stdout:"))?;

        debug!(%status, "command exited");
        Ok(ParsedOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Run the command to completion and require that it succeeds.
    pub async fn run_checked(self, stream: Stream) -> Result<ParsedOutput> {
        let display = self.display();
        self.run(stream)
            .await?
            .check()
            .with_context(|| format!("exec: `{display}`"))
    }
}

impl<S: command_builder::State> CommandBuilder<S> {
    /// Adds a single argument to pass to the program if the predicate is true.
    pub fn arg_if(mut self, predicate: bool, arg: impl Into<OsString>) -> Self {
        if predicate {
            self.args.push(arg.into());
        }
        self
    }

    /// Adds the flag followed by each value, e.g. `--link a --link b`.
    pub fn arg_each(
        mut self,
        flag: impl Into<OsString>,
        values: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        let flag = flag.into();
        for value in values {
            self.args.push(flag.clone());
            self.args.push(value.into());
        }
        self
    }

    /// Adds a single argument to pass to the program.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to pass to the program.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Read `reader` to the end, copying each chunk into `mirror` as it arrives.
async fn drain(
    mut reader: impl AsyncRead + Unpin,
    mut mirror: impl AsyncWrite + Unpin,
) -> Result<Vec<u8>> {
    let mut buffered = Vec::new();
    let mut chunk = [0; 4096];
    loop {
        let read = reader.read(&mut chunk).await.context("read pipe")?;
        if read == 0 {
            break;
        }
        mirror
            .write_all(&chunk[..read])
            .await
            .context("mirror pipe")?;
        buffered.extend_from_slice(&chunk[..read]);
    }
    mirror.flush().await.context("flush mirror")?;
    Ok(buffered)
}

/// The captured output of a command.
#[derive(Clone, Debug, Builder)]
pub struct ParsedOutput {
    /// The stderr of the command.
    #[builder(into, default)]
    pub stderr: Vec<u8>,

    /// The stdout of the command.
    #[builder(into, default)]
    pub stdout: Vec<u8>,

    /// The status of the command.
    pub status: ExitStatus,
}

impl ParsedOutput {
    /// Require that the command exited successfully.
    ///
    /// If the status code indicates failure, this method returns an error with
    /// the status code and the contents of stdout/stderr.
    pub fn check(self) -> Result<Self> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(eyre!("command failed with status: {}", self.status))
                .section(self.stdout_lossy_string().header("Stdout:"))
                .section(self.stderr_lossy_string().header("Stderr:"))
        }
    }

    /// The exit code, if the process exited normally.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// View [`ParsedOutput::stderr`] as a lossily-converted string.
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// View [`ParsedOutput::stderr`] as a lossily-converted owned string.
    pub fn stderr_lossy_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// View [`ParsedOutput::stdout`] as a lossily-converted string.
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// View [`ParsedOutput::stdout`] as a lossily-converted owned string.
    pub fn stdout_lossy_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout followed by stderr, lossily converted.
    ///
    /// Ordering between the two streams is not preserved; this is the same
    /// text a shell would show for `cmd 2>&1` only when the child writes to a
    /// single stream.
    pub fn combined_lossy(&self) -> String {
        let mut combined = self.stdout_lossy_string();
        if !combined.is_empty() && !combined.ends_with('\n') && !self.stderr.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&self.stderr_lossy());
        combined
    }
}
