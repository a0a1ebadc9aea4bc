use crate::exec::{ContainerRef, ExecContext, ExecError, LogOptions, LogStream};
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// `ExecContext` backed by the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct KubectlExec {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl KubectlExec {
    pub fn new(binary: impl Into<PathBuf>, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        if let Some(kubeconfig) = &self.kubeconfig {
            command.arg("--kubeconfig").arg(kubeconfig);
        }
        command
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    /// Find the first pod in the namespace whose name starts with the prefix.
    pub async fn resolve_pod(&self, target: &ContainerRef) -> Result<String, ExecError> {
        let args = pod_list_args(&target.namespace);
        let description = self.describe(&args);

        let output = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                command: description.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExecError::CommandFailed {
                command: description,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        select_pod(&String::from_utf8_lossy(&output.stdout), &target.pod_prefix).ok_or_else(
            || ExecError::PodNotFound {
                namespace: target.namespace.clone(),
                prefix: target.pod_prefix.clone(),
            },
        )
    }
}

#[async_trait]
impl ExecContext for KubectlExec {
    async fn logs_since(
        &self,
        target: &ContainerRef,
        options: LogOptions,
    ) -> Result<LogStream, ExecError> {
        let pod = self.resolve_pod(target).await?;
        let args = logs_args(&pod, target, options);
        let description = self.describe(&args);
        debug!(command = %description, "Starting log stream");

        let mut child = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: description.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::MissingStdout(description.clone()))?;
        let stderr = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut captured = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut captured).await {
                    debug!(error = %e, "Failed to read kubectl stderr");
                }
                String::from_utf8_lossy(&captured).trim().to_string()
            })
        });

        Ok(Box::pin(ChildStream {
            command: description,
            stdout,
            state: StreamState::Reading { child, stderr },
        }))
    }
}

type ExitCheck = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

enum StreamState {
    Reading {
        child: Child,
        stderr: Option<JoinHandle<String>>,
    },
    /// Stdout hit EOF; waiting for the exit status
    Exiting(ExitCheck),
    Done,
}

/// Stdout of a running `kubectl logs`. Dropping the stream kills the process.
///
/// EOF is only passed through once the process has exited successfully; a
/// failed exit surfaces as a read error carrying kubectl's stderr.
struct ChildStream {
    command: String,
    stdout: ChildStdout,
    state: StreamState,
}

impl AsyncRead for ChildStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match this.state {
                StreamState::Reading { .. } => {
                    let before = buf.filled().len();
                    ready!(Pin::new(&mut this.stdout).poll_read(cx, buf))?;
                    if buf.filled().len() > before || buf.remaining() == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    if let StreamState::Reading { child, stderr } =
                        std::mem::replace(&mut this.state, StreamState::Done)
                    {
                        this.state = StreamState::Exiting(Box::pin(check_exit(
                            this.command.clone(),
                            child,
                            stderr,
                        )));
                    }
                }
                StreamState::Exiting(ref mut exit) => {
                    let result = ready!(exit.as_mut().poll(cx));
                    this.state = StreamState::Done;
                    return Poll::Ready(result);
                }
                StreamState::Done => return Poll::Ready(Ok(())),
            }
        }
    }
}

async fn check_exit(
    command: String,
    mut child: Child,
    stderr: Option<JoinHandle<String>>,
) -> io::Result<()> {
    let status = child.wait().await?;
    if status.success() {
        debug!(command = %command, "Log stream process exited");
        return Ok(());
    }

    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };
    Err(io::Error::new(
        io::ErrorKind::Other,
        ExecError::CommandFailed {
            command,
            status,
            stderr,
        },
    ))
}

fn pod_list_args(namespace: &str) -> Vec<String> {
    vec![
        "get".to_string(),
        "pods".to_string(),
        "-n".to_string(),
        namespace.to_string(),
        "-o".to_string(),
        "name".to_string(),
    ]
}

fn logs_args(pod: &str, target: &ContainerRef, options: LogOptions) -> Vec<String> {
    let mut args = vec![
        "logs".to_string(),
        "-n".to_string(),
        target.namespace.clone(),
        pod.to_string(),
        "-c".to_string(),
        target.container.clone(),
        format!("--since={}s", options.since.as_secs().max(1)),
    ];
    if options.follow {
        args.push("--follow".to_string());
    }
    if options.timestamps {
        args.push("--timestamps".to_string());
    }
    args
}

/// Pick a pod from `kubectl get pods -o name` output.
fn select_pod(listing: &str, prefix: &str) -> Option<String> {
    listing
        .lines()
        .map(|line| line.trim())
        .map(|line| line.strip_prefix("pod/").unwrap_or(line))
        .find(|name| name.starts_with(prefix))
        .map(str::to_string)
}
