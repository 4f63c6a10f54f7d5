use facet::Facet;
use rocstar_io::{Bus, Hex, Transport};
use tracing::{info, instrument};

use super::{Subunit, TriggerMode, TriggerSource};
use crate::{ReadoutError, registers::Spartan6};

pub const CHANNELS: u8 = 8;
pub const MAX_CELLS: u16 = 1024;

/// What the DRS4 analog inputs are connected to.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, clap::ValueEnum, Facet,
)]
#[strum(serialize_all = "kebab-case")]
pub enum CalibrationMode {
    /// Inputs connected to the detector.
    #[default]
    #[value(name = "off")]
    #[strum(serialize = "off")]
    NonCalibration,
    /// Inputs on the calibration source, sine waves running.
    SineOn,
    /// Inputs on the calibration source, sine waves stopped.
    SineOff,
}

impl CalibrationMode {
    /// `s6:0006` value.
    pub const fn register_value(self) -> u16 {
        match self {
            Self::NonCalibration => 0x000e,
            Self::SineOn => 0x0030,
            Self::SineOff => 0x0000,
        }
    }
}

/// Digitizer settings for a session. Established once after bring-up and
/// never changed while a trigger sequence runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
pub struct DigitizerConfig {
    channel: u8,
    readout_cell_count: u16,
    calibration_mode: CalibrationMode,
}

impl DigitizerConfig {
    pub fn new(
        channel: u8,
        readout_cell_count: u16,
        calibration_mode: CalibrationMode,
    ) -> Result<Self, ReadoutError> {
        if channel >= CHANNELS {
            return Err(ReadoutError::InvalidArgument(format!(
                "channel {channel} out of range, board has {CHANNELS}"
            )));
        }
        if !(1..=MAX_CELLS).contains(&readout_cell_count) {
            return Err(ReadoutError::InvalidArgument(format!(
                "readout cell count {readout_cell_count} out of range [1, {MAX_CELLS}]"
            )));
        }
        Ok(Self {
            channel,
            readout_cell_count,
            calibration_mode,
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Exactly one bit, at [`Self::channel`].
    pub fn channel_mask(&self) -> u16 {
        1 << self.channel
    }

    pub fn readout_cell_count(&self) -> u16 {
        self.readout_cell_count
    }

    pub fn calibration_mode(&self) -> CalibrationMode {
        self.calibration_mode
    }

    /// Put the trigger generator in software mode and program the Spartan6
    /// for single-channel readout. Leaves DRS A armed.
    #[instrument(skip_all, fields(channel = self.channel, cells = self.readout_cell_count))]
    pub async fn apply<T: Transport, G: TriggerSource + ?Sized>(
        &self,
        bus: &mut Bus<T>,
        trigger: &mut G,
    ) -> Result<(), ReadoutError> {
        trigger.set_trigger_mode(TriggerMode::SOFTWARE).await?;
        bus.write(Spartan6::DrsSelect, Subunit::A.select().bits())
            .await?;
        let mask = self.channel_mask();
        bus.modify(Spartan6::ChannelEnable, |v| v & 0xff00 | mask)
            .await?;
        bus.write(Spartan6::ReadoutCells, self.readout_cell_count)
            .await?;
        self.apply_calibration_mode(bus).await
    }

    pub async fn apply_calibration_mode<T: Transport>(
        &self,
        bus: &mut Bus<T>,
    ) -> Result<(), ReadoutError> {
        bus.write(Spartan6::DrsInputs, self.calibration_mode.register_value())
            .await?;
        let readback = bus.read(Spartan6::DrsInputs).await?;
        info!(mode = %self.calibration_mode, readback = %Hex(readback), "DRS4 inputs set");
        Ok(())
    }
}
