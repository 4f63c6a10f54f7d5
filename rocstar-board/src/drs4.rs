//! DRS4 waveform readout on the Spartan6: configuration, trigger sequencing,
//! FIFO drain and event decoding.

use facet::Facet;

use crate::{
    ReadoutError,
    registers::{DrsSelect, Spartan6},
};

pub mod config;
pub mod event;
pub mod fifo;
pub mod source;
pub mod trigger;

pub use self::{
    config::{CalibrationMode, DigitizerConfig},
    event::{Check, DecodeError, Event, StatusSnapshot},
    fifo::FifoError,
    source::{CommandTrigger, TriggerMode, TriggerSource},
    trigger::{ReadoutLimits, Sequencer, State},
};

/// One of the two DRS4 chips. Only one is armed per trigger.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Facet)]
pub enum Subunit {
    A = 0,
    B = 1,
}

impl TryFrom<u8> for Subunit {
    type Error = ReadoutError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::A),
            1 => Ok(Self::B),
            other => Err(ReadoutError::InvalidArgument(format!(
                "sub-unit must be 0 (A) or 1 (B), got {other}"
            ))),
        }
    }
}

impl Subunit {
    pub const fn index(self) -> u16 {
        self as u16
    }

    pub const fn from_bit(bit: bool) -> Self {
        if bit { Self::B } else { Self::A }
    }

    pub const fn trigger_count(self) -> Spartan6 {
        match self {
            Self::A => Spartan6::TriggerCountA,
            Self::B => Spartan6::TriggerCountB,
        }
    }

    pub const fn latest_timestamp(self) -> Spartan6 {
        match self {
            Self::A => Spartan6::LatestTimestampA,
            Self::B => Spartan6::LatestTimestampB,
        }
    }

    pub const fn fifos_not_empty(self) -> Spartan6 {
        match self {
            Self::A => Spartan6::RfsmFifosNeA,
            Self::B => Spartan6::RfsmFifosNeB,
        }
    }

    /// `s6:0d06` value that triggers only this DRS.
    pub fn select(self) -> DrsSelect {
        match self {
            Self::A => DrsSelect::SEL_MODE,
            Self::B => DrsSelect::SEL_MODE | DrsSelect::MANUAL_B,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subunit_domain() {
        assert_eq!(Subunit::try_from(0).unwrap(), Subunit::A);
        assert_eq!(Subunit::try_from(1).unwrap(), Subunit::B);
        let err = Subunit::try_from(2).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn select_register() {
        assert_eq!(Subunit::A.select().bits(), 0x0002);
        assert_eq!(Subunit::B.select().bits(), 0x0003);
        assert_eq!(Subunit::B.trigger_count() as u16, 0x0d27);
        assert_eq!(Subunit::B.latest_timestamp() as u16, 0x0d29);
    }
}
