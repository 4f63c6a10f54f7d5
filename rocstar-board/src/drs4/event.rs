//! Dynode data FIFO record layout and the consistency checks applied to it.
//!
//! | word | content |
//! |------|---------|
//! | 0 | [`SENTINEL`] |
//! | 1 | declared length `L`, record is `L + 3` words |
//! | 2 | channel-enable mask |
//! | 3 | `[9:0]` trigger cell, `[11]` sub-unit |
//! | 4 | readout cell count |
//! | 5..=7 | timestamp low, mid, high |
//! | 8.. | waveform |

use facet::Facet;
use rocstar_io::{Bus, BusError, Hex, Transport, Words};
use thiserror::Error;
use tracing::{debug, warn};

use super::{DigitizerConfig, Subunit};
use crate::registers::Spartan6;

pub const SENTINEL: u16 = 0xa5a5;
/// Words in a record not counted by its declared length.
pub const HEADER_OVERHEAD: usize = 3;
pub const HEADER_LEN: usize = 8;

pub const TRIGGER_CELL_MASK: u16 = 0x03ff;
pub const SUBUNIT_BIT: u16 = 1 << 11;

mod word {
    pub const LENGTH: usize = 1;
    pub const CHANNEL_ENABLE: usize = 2;
    pub const CELL_AND_SUBUNIT: usize = 3;
    pub const CELLS: usize = 4;
    pub const TIMESTAMP: usize = 5;
}

/// Checks run by [`decode`], in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Check {
    Sentinel,
    /// Enough words for a header at all. An empty record fails here.
    Header,
    Length,
    /// Header mask against the hardware channel-enable register.
    ChannelEnable,
    /// Hardware channel-enable register against the configured channel.
    ChannelMask,
    Subunit,
    /// Header cell count against the hardware readout-cells register.
    CellCount,
    WaveformLength,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("event failed {check} check: expected {expected:#x}, observed {observed:#x}")]
pub struct DecodeError {
    pub check: Check,
    pub expected: u64,
    pub observed: u64,
}

fn ensure(
    check: Check,
    expected: impl Into<u64>,
    observed: impl Into<u64>,
) -> Result<(), DecodeError> {
    let (expected, observed) = (expected.into(), observed.into());
    if expected == observed {
        Ok(())
    } else {
        Err(DecodeError {
            check,
            expected,
            observed,
        })
    }
}

/// Hardware registers the record is checked against, read independently of
/// the FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub channel_enable: u16,
    pub readout_cells: u16,
    pub latest_timestamp: u16,
}

impl StatusSnapshot {
    pub async fn read<T: Transport>(
        bus: &mut Bus<T>,
        subunit: Subunit,
    ) -> Result<Self, BusError> {
        Ok(Self {
            channel_enable: bus.read(Spartan6::ChannelEnable).await? & 0x00ff,
            readout_cells: bus.read(Spartan6::ReadoutCells).await?,
            latest_timestamp: bus.read(subunit.latest_timestamp()).await?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Event {
    trigger_cell: u16,
    active_subunit: Subunit,
    timestamp: u64,
    latest_timestamp: u16,
    raw_words: Vec<u16>,
}

impl Event {
    pub fn trigger_cell(&self) -> u16 {
        self.trigger_cell
    }

    pub fn active_subunit(&self) -> Subunit {
        self.active_subunit
    }

    /// 48-bit trigger timestamp from the header.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Latest-timestamp register read after the drain.
    pub fn latest_timestamp(&self) -> u16 {
        self.latest_timestamp
    }

    /// Whether the latest-timestamp register matches bits `[39:24]` of
    /// [`Self::timestamp`]. Diagnostic only.
    pub fn timestamp_agrees(&self) -> bool {
        timestamp_register_bits(self.timestamp) == self.latest_timestamp
    }

    pub fn raw_words(&self) -> &[u16] {
        &self.raw_words
    }

    pub fn waveform(&self) -> &[u16] {
        &self.raw_words[HEADER_LEN..]
    }
}

fn timestamp_register_bits(timestamp: u64) -> u16 {
    (timestamp >> 24) as u16
}

/// Validate a drained record and turn it into an [`Event`]. The first failing
/// check is reported; nothing is returned for a partially valid record.
pub fn decode(
    words: Vec<u16>,
    armed: Subunit,
    config: &DigitizerConfig,
    status: &StatusSnapshot,
) -> Result<Event, DecodeError> {
    if let Some(&first) = words.first() {
        ensure(Check::Sentinel, SENTINEL, first)?;
    }
    ensure(
        Check::Header,
        HEADER_LEN as u64,
        words.len().min(HEADER_LEN) as u64,
    )?;
    ensure(
        Check::Length,
        u64::from(words[word::LENGTH]) + HEADER_OVERHEAD as u64,
        words.len() as u64,
    )?;
    ensure(
        Check::ChannelEnable,
        status.channel_enable,
        words[word::CHANNEL_ENABLE],
    )?;
    ensure(
        Check::ChannelMask,
        config.channel_mask(),
        status.channel_enable,
    )?;

    let header3 = words[word::CELL_AND_SUBUNIT];
    let active = Subunit::from_bit(header3 & SUBUNIT_BIT != 0);
    ensure(Check::Subunit, armed.index(), active.index())?;
    ensure(Check::CellCount, status.readout_cells, words[word::CELLS])?;
    ensure(
        Check::WaveformLength,
        config.readout_cell_count(),
        (words.len() - HEADER_LEN) as u64,
    )?;

    let timestamp = words[word::TIMESTAMP..HEADER_LEN]
        .iter()
        .rev()
        .fold(0u64, |acc, &w| acc << 16 | u64::from(w));
    let event = Event {
        trigger_cell: header3 & TRIGGER_CELL_MASK,
        active_subunit: active,
        timestamp,
        latest_timestamp: status.latest_timestamp,
        raw_words: words,
    };
    if !event.timestamp_agrees() {
        warn!(
            timestamp = %Hex(timestamp),
            expected = %Hex(timestamp_register_bits(timestamp)),
            latest = %Hex(status.latest_timestamp),
            "latest timestamp register disagrees with event header"
        );
    }
    debug!(
        subunit = %active,
        trigger_cell = event.trigger_cell,
        timestamp = %Hex(timestamp),
        waveform = %Words(event.waveform()),
        "event decoded"
    );
    Ok(event)
}
