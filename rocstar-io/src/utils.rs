use std::{fmt::Display, time::Duration};

use crate::BusError;

pub struct Hex<T>(pub T);
impl Display for Hex<u16> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}
impl Display for Hex<u64> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

const MAX_DISPLAY: usize = 13;

/// Leading words of a FIFO dump, space separated.
pub struct Words<'a>(pub &'a [u16]);
impl Display for Words<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (idx, w) in self.0.iter().take(MAX_DISPLAY).enumerate() {
            if idx != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{w:04x}")?;
        }
        if self.0.len() > MAX_DISPLAY {
            write!(f, " ... ({} words)", self.0.len())?;
        }
        Ok(())
    }
}

/// Race `fut` against a timer. `op` names the operation in the error and is
/// only evaluated on expiry.
pub async fn with_timeout<T>(
    after: Duration,
    op: impl FnOnce() -> String,
    fut: impl Future<Output = Result<T, BusError>>,
) -> Result<T, BusError> {
    futures_lite::future::or(fut, async move {
        smol::Timer::after(after).await;
        Err(BusError::Timeout { op: op(), after })
    })
    .await
}
