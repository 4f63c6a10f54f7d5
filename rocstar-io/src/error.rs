use std::time::Duration;

use thiserror::Error;

/// Failure of a single bus transaction, or of an external collaborator that
/// sits on the same path (trigger generator).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    #[error("bus server closed the connection")]
    Closed,
    /// An earlier transaction was abandoned after its request went out, so
    /// its reply is still in flight. Reconnect before issuing more.
    #[error("connection out of step with the bus server after an abandoned transaction")]
    Desynchronized,
    #[error("bus i/o failed")]
    Io(#[from] std::io::Error),
    #[error("malformed reply to `{command}`: {reply:?}")]
    Malformed { command: String, reply: String },
    #[error("`{command}` rejected with status {status}: {message}")]
    Rejected {
        command: String,
        status: u16,
        message: String,
    },
    #[error("{what} failed: {message}")]
    External { what: String, message: String },
    #[error("{op} did not complete within {after:?}")]
    Timeout { op: String, after: Duration },
}

impl BusError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
