//! Register map of both stages. All registers are 16 bits wide.

use bitflags::bitflags;
use rocstar_io::Reg;

pub const BEEF: u16 = 0xbeef;
pub const DEAD: u16 = 0xdead;
/// Spartan6 `0013` after a successful configuration.
pub const SPARTAN6_MAGIC: u16 = 0x6666;

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Microzed {
    Beef = 0x0001,
    Dead = 0x0002,
    Version0 = 0x0010,
    Version1 = 0x0011,
    Version2 = 0x0012,
    /// Held high, resets the Spartan6 logic.
    SoftReset = 0x0019,
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Spartan6 {
    Id0 = 0x0000,
    Beef = 0x0001,
    Id2 = 0x0002,
    /// DRS4 analog input mux and calibration sine source.
    DrsInputs = 0x0006,
    Id8 = 0x0008,
    /// Bit 0 resets the readout FIFOs.
    FifoReset = 0x000e,
    Version0 = 0x0010,
    Version1 = 0x0011,
    Version2 = 0x0012,
    Magic = 0x0013,
    /// Number of soft resets seen from the Microzed.
    ResetsFromUzed = 0x0019,
    /// [7:0] DRS4 channels to read out, [15:8] unrelated, preserve.
    ChannelEnable = 0x0d00,
    ReadoutCells = 0x0d01,
    /// See [`DrsSelect`].
    DrsSelect = 0x0d06,
    /// Dynode data FIFO: words available.
    DdfNwords = 0x0d0a,
    /// Dynode data FIFO: head word.
    DdfData = 0x0d0b,
    TriggerCountA = 0x0d26,
    TriggerCountB = 0x0d27,
    LatestTimestampA = 0x0d28,
    LatestTimestampB = 0x0d29,
    /// Readout state machine FIFOs-not-empty flags.
    RfsmFifosNeA = 0x0d2a,
    RfsmFifosNeB = 0x0d2b,
}

impl From<Microzed> for Reg {
    fn from(value: Microzed) -> Self {
        Reg::microzed(value as u16)
    }
}

impl From<Spartan6> for Reg {
    fn from(value: Spartan6) -> Self {
        Reg::spartan6(value as u16)
    }
}

pub const MICROZED_VERSION: [Microzed; 3] =
    [Microzed::Version0, Microzed::Version1, Microzed::Version2];
pub const SPARTAN6_VERSION: [Spartan6; 3] =
    [Spartan6::Version0, Spartan6::Version1, Spartan6::Version2];
pub const SPARTAN6_ID: [Spartan6; 4] = [
    Spartan6::Id0,
    Spartan6::Beef,
    Spartan6::Id2,
    Spartan6::Id8,
];

bitflags! {
    /// `s6:0d06`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DrsSelect: u16 {
        /// Chooses DRS B when manual selection is on.
        const MANUAL_B = 1 << 0;
        /// Trigger only the manually selected DRS.
        const SEL_MODE = 1 << 1;
    }
}

pub const FIFO_RESET: u16 = 0x0001;
