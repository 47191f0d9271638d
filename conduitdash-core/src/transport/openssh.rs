//! Transport backed by the system `ssh` client
//!
//! Each session is an `ssh -M -N` control master. Commands are multiplexed
//! over its control socket, so authentication happens once per session and
//! keepalive probing is done by the master. The master process is owned by a
//! supervisor task; when it exits for any reason the session stops being
//! alive, which the registry observes through [`RemoteSession::closed`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, instrument, warn};

use super::{ConnectOptions, RemoteSession, Transport};
use crate::error::{ConnectError, ConnectResult};
use crate::models::Host;

/// How often the master is probed while it is coming up
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit status `ssh` uses for its own failures
const SSH_ERROR_STATUS: i32 = 255;

/// Longest host-name fragment used in a control socket name
const MAX_SOCKET_NAME_LEN: usize = 32;

/// Opens sessions by starting `ssh` control masters
#[derive(Debug)]
pub struct OpenSshTransport {
    program: String,
    control_dir: PathBuf,
    counter: AtomicU64,
}

impl Default for OpenSshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenSshTransport {
    /// Creates a transport keeping control sockets in a per-process temp directory
    #[must_use]
    pub fn new() -> Self {
        Self::with_control_dir(
            std::env::temp_dir().join(format!("conduitdash-{}", std::process::id())),
        )
    }

    /// Creates a transport keeping control sockets in `dir`
    #[must_use]
    pub fn with_control_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "ssh".to_string(),
            control_dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Uses a different `ssh` executable
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn control_path(&self, host: &Host) -> PathBuf {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let name: String = host
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_SOCKET_NAME_LEN)
            .collect();
        self.control_dir.join(format!("{name}-{seq}.sock"))
    }

    fn master_command(
        &self,
        host: &Host,
        client_args: &[OsString],
        control_path: &Path,
    ) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-M")
            .arg("-N")
            .arg("-S")
            .arg(control_path)
            .args(client_args)
            .arg(host.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn master_ready(&self, control_path: &Path, destination: &str) -> bool {
        Command::new(&self.program)
            .arg("-S")
            .arg(control_path)
            .arg("-O")
            .arg("check")
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }
}

#[async_trait]
impl Transport for OpenSshTransport {
    #[instrument(skip(self, host, options), fields(host = %host.name))]
    async fn connect(
        &self,
        host: &Host,
        options: &ConnectOptions,
    ) -> ConnectResult<Arc<dyn RemoteSession>> {
        tokio::fs::File::open(&options.key_path)
            .await
            .map_err(|e| ConnectError::Credential {
                path: options.key_path.clone(),
                reason: e.to_string(),
            })?;

        tokio::fs::create_dir_all(&self.control_dir)
            .await
            .map_err(|e| {
                ConnectError::Spawn(format!(
                    "cannot create control directory {}: {e}",
                    self.control_dir.display()
                ))
            })?;

        let control_path = self.control_path(host);
        let destination = host.destination();
        let client_args = client_args(host, options);
        let mut child = self
            .master_command(host, &client_args, &control_path)
            .spawn()
            .map_err(|e| ConnectError::Spawn(e.to_string()))?;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let stderr = read_stderr(child.stderr.take()).await;
                    let message = if stderr.is_empty() {
                        format!("ssh exited with {status}")
                    } else {
                        stderr
                    };
                    return Err(ConnectError::Handshake(message));
                }
                Ok(None) => {}
                Err(e) => return Err(ConnectError::Spawn(e.to_string())),
            }
            if self.master_ready(&control_path, &destination).await {
                break;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        debug!(socket = %control_path.display(), "SSH master ready");

        let (alive_tx, alive_rx) = watch::channel(true);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(
            child,
            kill_rx,
            alive_tx,
            host.name.clone(),
            control_path.clone(),
        ));

        Ok(Arc::new(OpenSshSession {
            program: self.program.clone(),
            destination,
            control_path,
            client_args,
            alive: alive_rx,
            kill: Mutex::new(Some(kill_tx)),
        }))
    }
}

/// Options shared by the master and every multiplexed command
///
/// Commands repeat them so that a command racing a dead master still
/// authenticates with the configured key and timeouts.
fn client_args(host: &Host, options: &ConnectOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "BatchMode=yes".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        format!("ConnectTimeout={}", options.connect_timeout.as_secs().max(1)),
        format!(
            "ServerAliveInterval={}",
            options.keepalive_interval.as_secs().max(1)
        ),
        format!("ServerAliveCountMax={}", options.keepalive_count_max),
    ]
    .into_iter()
    .flat_map(|opt| [OsString::from("-o"), OsString::from(opt)])
    .collect();
    args.push("-i".into());
    args.push(options.key_path.clone().into_os_string());
    args.push("-p".into());
    args.push(host.port.to_string().into());
    args
}

/// Owns the master process until it exits or the session asks it to stop
///
/// Dropping the session drops the kill sender, which also stops the master.
async fn supervise(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    alive: watch::Sender<bool>,
    host: String,
    control_path: PathBuf,
) {
    if let Some(stderr) = child.stderr.take() {
        let host = host.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(host = %host, "ssh: {line}");
            }
        });
    }

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => debug!(host = %host, %status, "SSH master exited"),
            Err(e) => warn!(host = %host, error = %e, "Failed to wait for SSH master"),
        },
        _ = kill => {
            if let Err(e) = child.kill().await {
                debug!(host = %host, error = %e, "SSH master already gone");
            }
        }
    }

    alive.send_replace(false);
    let _ = tokio::fs::remove_file(&control_path).await;
}

async fn read_stderr(stderr: Option<ChildStderr>) -> String {
    let mut text = String::new();
    if let Some(mut stderr) = stderr {
        let _ = stderr.read_to_string(&mut text).await;
    }
    text.trim().to_string()
}

/// Reads two streams to the end, appending chunks in arrival order
async fn read_interleaved<A, B>(
    mut first: Option<A>,
    mut second: Option<B>,
) -> std::io::Result<Vec<u8>>
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    let mut combined = Vec::new();
    let mut buf_a = [0_u8; 4096];
    let mut buf_b = [0_u8; 4096];

    loop {
        let (a_open, b_open) = (first.is_some(), second.is_some());
        if !a_open && !b_open {
            return Ok(combined);
        }
        tokio::select! {
            n = read_some(first.as_mut(), &mut buf_a), if a_open => {
                let n = n?;
                if n == 0 { first = None; } else { combined.extend_from_slice(&buf_a[..n]); }
            }
            n = read_some(second.as_mut(), &mut buf_b), if b_open => {
                let n = n?;
                if n == 0 { second = None; } else { combined.extend_from_slice(&buf_b[..n]); }
            }
        }
    }
}

async fn read_some<R: AsyncRead + Unpin>(
    reader: Option<&mut R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => Ok(0),
    }
}

/// A live control master
struct OpenSshSession {
    program: String,
    destination: String,
    control_path: PathBuf,
    client_args: Vec<OsString>,
    alive: watch::Receiver<bool>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    async fn execute(&self, command: &str) -> Result<String, String> {
        if !self.is_alive() {
            return Err(format!("SSH master for {} is gone", self.destination));
        }
        let mut child = Command::new(&self.program)
            .arg("-S")
            .arg(&self.control_path)
            .args(&self.client_args)
            .arg(&self.destination)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to spawn SSH process: {e}"))?;

        let combined = read_interleaved(child.stdout.take(), child.stderr.take())
            .await
            .map_err(|e| format!("Failed to read command output: {e}"))?;
        let status = child
            .wait()
            .await
            .map_err(|e| format!("Failed to wait for SSH process: {e}"))?;

        let output = String::from_utf8_lossy(&combined).into_owned();
        if status.code() == Some(SSH_ERROR_STATUS) {
            let reason = output
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("ssh exited with status 255");
            return Err(reason.trim().to_string());
        }
        Ok(output)
    }

    async fn closed(&self) {
        let mut alive = self.alive.clone();
        let _ = alive.wait_for(|alive| !*alive).await;
    }

    async fn close(&self) {
        let sender = self
            .kill
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}
