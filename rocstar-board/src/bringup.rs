//! Board bring-up over the remote shell: configure the Microzed PL, configure
//! the Spartan6, start the bus server.

use std::time::Duration;

use eyre::{Result, WrapErr, ensure, eyre};
use rocstar_io::Session;
use tracing::{debug, info, instrument};

pub const KILL_SERVER: &str = "killall server.elf";
pub const FORCE_KILL_SERVER: &str = "killall -9 server.elf";
pub const LIST_BITSTREAMS: &str = "ls -1 uzed_rocstar_*.bin";
pub const CHECK_MICROZED: &str = "./rd 0002 && ./rd 0001";
pub const CHECK_SPARTAN6: &str = "./v5rd 0013 && ./v5rd 0001";
pub const START_SERVER: &str = "./server.elf >> /dev/null &";

/// Ping once. Powering a dead board on is not our business.
#[instrument]
pub async fn is_alive(host: &str) -> Result<bool> {
    let output = smol::process::Command::new("ping")
        .args(["-c", "1", host])
        .output()
        .await
        .wrap_err("failed to run ping")?;
    let alive = output.status.success();
    if alive {
        info!("{host} is alive");
    } else {
        info!("{host} is dead");
        debug!(log = %String::from_utf8_lossy(&output.stdout));
    }
    Ok(alive)
}

/// Shell prompt set on board `host`, `zynq<last octet>>`.
pub fn prompt_for(host: &str) -> String {
    let octet = host.rsplit('.').next().unwrap_or(host);
    format!("zynq{octet}>")
}

/// Transcript file name for board `host`.
pub fn transcript_for(host: &str) -> String {
    format!("ssh_{}.log", host.replace('.', "_"))
}

#[derive(Debug, Clone)]
pub struct BringupOptions {
    /// Board-side directory holding bitstreams and tools.
    pub remote_dir: String,
    /// Spartan6 bitstream, relative to `remote_dir`.
    pub fpgabin: String,
    /// Wait after each configuration before touching the bus.
    pub settle: Duration,
    /// Wait after disconnecting for the bus server to come up.
    pub server_wait: Duration,
    pub command_timeout: Duration,
}

impl Default for BringupOptions {
    fn default() -> Self {
        Self {
            remote_dir: "/mnt/uzed".to_owned(),
            fpgabin: "rocstar.bin".to_owned(),
            settle: Duration::from_secs(2),
            server_wait: Duration::from_secs(3),
            command_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Bringup<S> {
    session: S,
    options: BringupOptions,
}

/// Last word of each of the last two lines.
fn last_two_words(output: &str) -> Option<(&str, &str)> {
    let mut lines = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .rev();
    let last = lines.next()?.split_whitespace().next_back()?;
    let second = lines.next()?.split_whitespace().next_back()?;
    Some((second, last))
}

impl<S: Session> Bringup<S> {
    pub fn new(session: S, options: BringupOptions) -> Self {
        Self { session, options }
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Send a line, return what it printed before the next prompt.
    pub async fn sep(&mut self, command: &str) -> Result<String> {
        debug!(command);
        self.session.send_line(command).await?;
        let output = self
            .session
            .read_until_prompt(self.options.command_timeout)
            .await
            .wrap_err_with(|| format!("no prompt after {command:?}"))?;
        let output = output.trim().to_owned();
        if !output.is_empty() {
            debug!(%output);
        }
        Ok(output)
    }

    #[instrument(skip_all)]
    pub async fn connect(&mut self) -> Result<()> {
        self.session.connect().await.wrap_err("ssh connect")?;
        let uptime = self.sep("uptime").await?;
        info!(uptime = %uptime.replace('\n', " "), "connected");
        Ok(())
    }

    pub async fn enter_remote_dir(&mut self) -> Result<()> {
        let dir = self.options.remote_dir.clone();
        self.sep(&format!("cd {dir}")).await?;
        let pwd = self.sep("pwd").await?;
        let wd = pwd.lines().next_back().unwrap_or_default().trim();
        ensure!(
            wd.trim_end_matches('/') == dir.trim_end_matches('/'),
            "working directory is {wd:?}, expected {dir:?}; is it mounted?"
        );
        Ok(())
    }

    async fn settle(&self) {
        info!("wait {:?}", self.options.settle);
        smol::Timer::after(self.options.settle).await;
    }

    #[instrument(skip_all)]
    pub async fn configure_microzed(&mut self) -> Result<()> {
        self.enter_remote_dir().await?;
        // bus i/o during PL configuration hangs the Microzed
        self.sep(KILL_SERVER).await?;
        self.sep(FORCE_KILL_SERVER).await?;

        let listing = self.sep(LIST_BITSTREAMS).await?;
        let mut bitstreams: Vec<&str> = listing
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("uzed_rocstar_") && l.ends_with(".bin"))
            .collect();
        bitstreams.sort_unstable();
        let bin = bitstreams
            .last()
            .ok_or_else(|| eyre!("no uzed_rocstar_*.bin in {}", self.options.remote_dir))?
            .to_string();
        info!(%bin, "configuring Zynq PL");
        self.sep(&format!("cat {bin} >> /dev/xdevcfg")).await?;
        self.settle().await;

        let out = self.sep(CHECK_MICROZED).await?;
        ensure!(
            last_two_words(&out) == Some(("dead", "beef")),
            "Zynq PL bus check failed after loading {bin}: {out:?}"
        );
        info!("Zynq PL bus i/o ok");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn configure_spartan6(&mut self) -> Result<()> {
        self.enter_remote_dir().await?;
        let fpgabin = self.options.fpgabin.clone();
        info!(%fpgabin, "configuring Spartan6");
        self.sep(&format!("./spartan6_config.elf {fpgabin}")).await?;
        self.settle().await;

        let out = self.sep(CHECK_SPARTAN6).await?;
        ensure!(
            last_two_words(&out) == Some(("6666", "beef")),
            "Spartan6 bus check failed after loading {fpgabin}: {out:?}"
        );
        info!("Spartan6 bus i/o ok");
        Ok(())
    }

    pub async fn start_bus_server(&mut self) -> Result<()> {
        self.sep(START_SERVER).await?;
        info!("bus server started");
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.sep("").await?;
        self.session.disconnect().await?;
        info!("ssh disconnected");
        Ok(())
    }

    /// The whole sequence. Returns once the bus server should be reachable.
    pub async fn run(&mut self) -> Result<()> {
        self.connect().await?;
        self.configure_microzed()
            .await
            .wrap_err("Microzed configuration")?;
        self.configure_spartan6()
            .await
            .wrap_err("Spartan6 configuration")?;
        self.start_bus_server().await?;
        self.disconnect().await?;
        smol::Timer::after(self.options.server_wait).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rocstar_io::ScriptedSession;

    use super::*;
    use crate::sim::SimulatedBoard;

    fn options() -> BringupOptions {
        BringupOptions {
            settle: Duration::ZERO,
            server_wait: Duration::ZERO,
            ..BringupOptions::default()
        }
    }

    #[test]
    fn prompt_and_transcript() {
        assert_eq!(prompt_for("192.168.1.45"), "zynq45>");
        assert_eq!(transcript_for("192.168.1.45"), "ssh_192_168_1_45.log");
    }

    #[test]
    fn last_words() {
        assert_eq!(
            last_two_words("junk\n0002: dead\n0001: beef\n"),
            Some(("dead", "beef"))
        );
        assert_eq!(last_two_words("beef"), None);
    }

    #[test]
    fn full_bringup() {
        let board = SimulatedBoard::new();
        let session = board.session(&options(), "zynq45>");
        let mut bringup = Bringup::new(session, options());
        smol::block_on(bringup.run()).unwrap();
        let session = bringup.into_session();
        assert!(!session.is_connected());
        let sent = session.sent();
        let pos = |cmd: &str| sent.iter().position(|s| s == cmd).unwrap();
        assert!(pos(FORCE_KILL_SERVER) < pos("cat uzed_rocstar_20240301.bin >> /dev/xdevcfg"));
        assert!(pos(CHECK_MICROZED) < pos("./spartan6_config.elf rocstar.bin"));
        assert!(pos(CHECK_SPARTAN6) < pos(START_SERVER));
        assert_eq!(sent.last().map(String::as_str), Some("exit"));
    }

    #[test]
    fn unmounted_dir_fails() {
        let session = ScriptedSession::new("zynq45>").respond("pwd", "/root");
        let mut bringup = Bringup::new(session, options());
        let err = smol::block_on(async {
            bringup.connect().await?;
            bringup.configure_microzed().await
        })
        .unwrap_err();
        assert!(err.to_string().contains("/root"), "{err}");
        assert!(!bringup.into_session().sent().contains(&KILL_SERVER.to_owned()));
    }

    #[test]
    fn spartan6_check_must_pass() {
        let session = ScriptedSession::new("zynq45>")
            .respond("pwd", "/mnt/uzed")
            .respond(CHECK_SPARTAN6, "0013: 0000\n0001: beef");
        let mut bringup = Bringup::new(session, options());
        let err = smol::block_on(async {
            bringup.connect().await?;
            bringup.configure_spartan6().await
        })
        .unwrap_err();
        assert!(err.to_string().contains("Spartan6 bus check"), "{err}");
    }

    #[test]
    fn missing_bitstream_fails() {
        let session = ScriptedSession::new("zynq45>").respond("pwd", "/mnt/uzed");
        let mut bringup = Bringup::new(session, options());
        let err = smol::block_on(async {
            bringup.connect().await?;
            bringup.configure_microzed().await
        })
        .unwrap_err();
        assert!(err.to_string().contains("no uzed_rocstar_"), "{err}");
    }
}
