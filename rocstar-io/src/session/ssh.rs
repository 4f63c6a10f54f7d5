use std::{fs::File, io::Write as _, process::Stdio, time::Duration};

use async_trait::async_trait;
use eyre::{OptionExt, Result, WrapErr, eyre};
use futures_lite::{AsyncReadExt, AsyncWriteExt};
use smol::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, instrument};

use super::{Pending, Session};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Remote shell over the system `ssh` client.
///
/// No pty is allocated: the remote end runs an interactive `sh` with its
/// stderr folded into stdout, so the prompt still shows up after every
/// command. Authentication must not need a password.
pub struct SshSession {
    destination: String,
    prompt: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    pending: Pending,
    transcript: Option<File>,
}

impl SshSession {
    pub fn new(user: &str, host: &str, prompt: &str) -> Self {
        Self {
            destination: format!("{user}@{host}"),
            prompt: prompt.to_owned(),
            child: None,
            stdin: None,
            stdout: None,
            pending: Pending::default(),
            transcript: None,
        }
    }

    /// Copy everything the remote side sends into `file`.
    pub fn with_transcript(mut self, file: File) -> Self {
        self.transcript = Some(file);
        self
    }

    async fn fill_until(&mut self, pattern: &str) -> Result<String> {
        let mut chunk = [0; 4096];
        loop {
            if let Some(before) = self.pending.take_until(pattern) {
                return Ok(before);
            }
            let stdout = self.stdout.as_mut().ok_or_eyre("ssh session not connected")?;
            let n = stdout.read(&mut chunk).await?;
            if n == 0 {
                return Err(eyre!("ssh session closed while waiting for {pattern:?}"));
            }
            if let Some(file) = &mut self.transcript {
                file.write_all(&chunk[..n])?;
            }
            self.pending.push(&chunk[..n]);
        }
    }
}

#[async_trait]
impl Session for SshSession {
    #[instrument(skip_all, fields(destination = %self.destination))]
    async fn connect(&mut self) -> Result<()> {
        let remote = format!("PS1='{}' exec sh -i 2>&1", self.prompt);
        let mut child = Command::new("ssh")
            .args(["-T", "-o", "BatchMode=yes", "-o", "ConnectTimeout=10"])
            .arg(&self.destination)
            .arg(remote)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .wrap_err("failed to spawn ssh")?;
        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.read_until_prompt(CONNECT_TIMEOUT)
            .await
            .wrap_err_with(|| format!("no shell prompt from {}", self.destination))?;
        info!("ssh connected");
        Ok(())
    }

    async fn send_line(&mut self, text: &str) -> Result<()> {
        debug!(text);
        let stdin = self.stdin.as_mut().ok_or_eyre("ssh session not connected")?;
        stdin.write_all(text.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String> {
        let pattern = pattern.to_owned();
        let timer = async {
            smol::Timer::after(timeout).await;
            Err(eyre!("timed out after {timeout:?} waiting for {pattern:?}"))
        };
        futures_lite::future::or(self.fill_until(&pattern), timer).await
    }

    fn prompt(&self) -> &str {
        &self.prompt
    }

    #[instrument(skip_all, fields(destination = %self.destination))]
    async fn disconnect(&mut self) -> Result<()> {
        self.send_line("exit").await?;
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let status = futures_lite::future::or(
                async { Ok(child.status().await?) },
                async {
                    smol::Timer::after(CONNECT_TIMEOUT).await;
                    Err(eyre!("ssh did not exit"))
                },
            )
            .await?;
            info!(%status, "ssh disconnected");
        }
        Ok(())
    }
}
