use std::{ffi::OsString, fmt};

use async_trait::async_trait;
use rocstar_io::BusError;
use tracing::{debug, instrument};

/// Trigger generator mode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerMode(pub u8);

impl TriggerMode {
    /// Triggers only on [`TriggerSource::pulse`].
    pub const SOFTWARE: Self = Self(2);
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whatever makes the board see a trigger. Opaque beyond "one pulse, one
/// hardware trigger, if the board is armed".
#[async_trait]
pub trait TriggerSource: Send {
    async fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), BusError>;
    async fn pulse(&mut self) -> Result<(), BusError>;
}

#[async_trait]
impl<G: TriggerSource + ?Sized> TriggerSource for Box<G> {
    async fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), BusError> {
        (**self).set_trigger_mode(mode).await
    }

    async fn pulse(&mut self) -> Result<(), BusError> {
        (**self).pulse().await
    }
}

/// Drives an external test-pattern tool: `<program> <board> mode <n>` and
/// `<program> <board> pulse`.
#[derive(Debug, Clone)]
pub struct CommandTrigger {
    program: OsString,
    board: String,
}

impl CommandTrigger {
    pub fn new(program: impl Into<OsString>, board: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            board: board.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<(), BusError> {
        let what = format!("{} {} {}", self.program.to_string_lossy(), self.board, args.join(" "));
        debug!(command = %what);
        let output = smol::process::Command::new(&self.program)
            .arg(&self.board)
            .args(args)
            // a pulse abandoned on timeout must not fire later
            .kill_on_drop(true)
            .output()
            .await?;
        if output.status.success() {
            return Ok(());
        }
        Err(BusError::External {
            what,
            message: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })
    }
}

#[async_trait]
impl TriggerSource for CommandTrigger {
    #[instrument(skip_all, fields(%mode))]
    async fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), BusError> {
        self.run(&["mode", &mode.to_string()]).await
    }

    #[instrument(skip_all)]
    async fn pulse(&mut self) -> Result<(), BusError> {
        self.run(&["pulse"]).await
    }
}
