use rocstar_io::BusError;
use thiserror::Error;

use crate::drs4::{DecodeError, FifoError};

/// Coarse classification, for callers deciding whether to re-arm, reset or
/// give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    Transport,
    FifoProtocol,
    Decode,
    Sequencing,
    InvalidArgument,
    Timeout,
}

/// Everything that can end a readout attempt. None of these are retried and
/// none of them repair hardware state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadoutError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Fifo(#[from] FifoError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("trigger count went from {before} to {after} on a single pulse")]
    Sequencing { before: u16, after: u16 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ReadoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Bus(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Bus(_) => ErrorKind::Transport,
            Self::Fifo(_) => ErrorKind::FifoProtocol,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Sequencing { .. } => ErrorKind::Sequencing,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}
