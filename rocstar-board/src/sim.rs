//! A board that lives in memory: register file, dynode data FIFO and a
//! trigger generator that fills it. Used by the tests and by `--backend sim`.

use async_trait::async_trait;
use rocstar_io::{BusError, Reg, ScriptedSession, fake::FakeTransport};

use crate::{
    bringup::{BringupOptions, CHECK_MICROZED, CHECK_SPARTAN6, LIST_BITSTREAMS},
    drs4::{
        Subunit, TriggerMode, TriggerSource,
        event::{HEADER_LEN, HEADER_OVERHEAD, SENTINEL, SUBUNIT_BIT, TRIGGER_CELL_MASK},
    },
    registers::{
        BEEF, DEAD, DrsSelect, MICROZED_VERSION, Microzed, SPARTAN6_MAGIC, SPARTAN6_VERSION,
        Spartan6,
    },
};

pub const MICROZED_VERSION_WORDS: [u16; 3] = [0x2024, 0x0301, 0x0003];
pub const SPARTAN6_VERSION_WORDS: [u16; 3] = [0x2024, 0x0415, 0x0007];
pub const SPARTAN6_ID_WORDS: [u16; 3] = [0x0000, 0x5236, 0x0045];

/// Clock ticks between simulated triggers. Large enough to move bits
/// `[39:24]` every time.
const TIMESTAMP_STEP: u64 = 0x0001_2345_6789;

/// One dynode data FIFO record as the Spartan6 writes it.
pub fn record(
    subunit: Subunit,
    channel_enable: u16,
    cells: u16,
    trigger_cell: u16,
    timestamp: u64,
) -> Vec<u16> {
    let declared = (HEADER_LEN - HEADER_OVERHEAD) as u16 + cells;
    let mut words = Vec::with_capacity(HEADER_LEN + usize::from(cells));
    words.extend([
        SENTINEL,
        declared,
        channel_enable,
        trigger_cell & TRIGGER_CELL_MASK | subunit.index() * SUBUNIT_BIT,
        cells,
        timestamp as u16,
        (timestamp >> 16) as u16,
        (timestamp >> 32) as u16,
    ]);
    words.extend((0..cells).map(|i| 0x0800 + (i.wrapping_mul(29) & 0x00ff)));
    words
}

pub struct SimulatedBoard {
    fake: FakeTransport,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBoard {
    /// A freshly configured board: bus checks pass, FIFO empty, counters at
    /// zero.
    pub fn new() -> Self {
        let fake = FakeTransport::new();
        fake.set(Microzed::Dead.into(), DEAD);
        fake.set(Microzed::Beef.into(), BEEF);
        for (reg, value) in MICROZED_VERSION.into_iter().zip(MICROZED_VERSION_WORDS) {
            fake.set(reg.into(), value);
        }
        fake.set(Spartan6::Beef.into(), BEEF);
        fake.set(Spartan6::Magic.into(), SPARTAN6_MAGIC);
        for (reg, value) in [Spartan6::Id0, Spartan6::Id2, Spartan6::Id8]
            .into_iter()
            .zip(SPARTAN6_ID_WORDS)
        {
            fake.set(reg.into(), value);
        }
        for (reg, value) in SPARTAN6_VERSION.into_iter().zip(SPARTAN6_VERSION_WORDS) {
            fake.set(reg.into(), value);
        }
        fake.attach_fifo(Spartan6::DdfNwords.into(), Spartan6::DdfData.into());
        fake.reset_fifo_on(Spartan6::FifoReset.into(), Spartan6::DdfNwords.into());
        Self { fake }
    }

    /// Another handle onto the same registers.
    pub fn transport(&self) -> FakeTransport {
        self.fake.clone()
    }

    pub fn trigger(&self) -> SimulatedTrigger {
        SimulatedTrigger {
            fake: self.fake.clone(),
            mode: None,
            pulses: 0,
            clock: 0,
            stuck: false,
            hung: false,
            per_pulse: 1,
        }
    }

    /// Shell session answering the bring-up commands from the current
    /// register contents.
    pub fn session(&self, options: &BringupOptions, prompt: &str) -> ScriptedSession {
        let get = |reg: Reg| format!("{:04x}", self.fake.get(reg));
        ScriptedSession::new(prompt)
            .respond("uptime", " 12:00:00 up 3 min,  load average: 0.00, 0.00, 0.00")
            .respond("pwd", &options.remote_dir)
            .respond(
                LIST_BITSTREAMS,
                "uzed_rocstar_20231115.bin\nuzed_rocstar_20240301.bin",
            )
            .respond(
                CHECK_MICROZED,
                &format!(
                    "{}\n{}",
                    get(Microzed::Dead.into()),
                    get(Microzed::Beef.into())
                ),
            )
            .respond(
                CHECK_SPARTAN6,
                &format!(
                    "{}\n{}",
                    get(Spartan6::Magic.into()),
                    get(Spartan6::Beef.into())
                ),
            )
    }
}

/// Trigger generator wired to a [`SimulatedBoard`]. Each pulse bumps the
/// armed DRS's trigger counter and pushes one record into the FIFO.
pub struct SimulatedTrigger {
    fake: FakeTransport,
    mode: Option<TriggerMode>,
    pulses: usize,
    clock: u64,
    stuck: bool,
    hung: bool,
    per_pulse: u16,
}

impl SimulatedTrigger {
    /// Pulses are accepted and ignored.
    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// Pulses never return.
    pub fn hung(mut self) -> Self {
        self.hung = true;
        self
    }

    /// Every pulse counts twice.
    pub fn doubled(mut self) -> Self {
        self.per_pulse = 2;
        self
    }

    pub fn mode(&self) -> Option<TriggerMode> {
        self.mode
    }

    pub fn pulses(&self) -> usize {
        self.pulses
    }
}

#[async_trait]
impl TriggerSource for SimulatedTrigger {
    async fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), BusError> {
        self.mode = Some(mode);
        Ok(())
    }

    async fn pulse(&mut self) -> Result<(), BusError> {
        self.pulses += 1;
        if self.hung {
            futures_lite::future::pending::<()>().await;
        }
        if self.stuck {
            return Ok(());
        }
        let fake = &self.fake;
        let select = DrsSelect::from_bits_truncate(fake.get(Spartan6::DrsSelect.into()));
        let subunit = Subunit::from_bit(select.contains(DrsSelect::MANUAL_B));

        let count: Reg = subunit.trigger_count().into();
        fake.set(count, fake.get(count).wrapping_add(self.per_pulse));
        self.clock += TIMESTAMP_STEP;
        fake.set(
            subunit.latest_timestamp().into(),
            (self.clock >> 24) as u16,
        );

        let channel_enable = fake.get(Spartan6::ChannelEnable.into()) & 0x00ff;
        let cells = fake.get(Spartan6::ReadoutCells.into());
        let trigger_cell = (self.pulses * 37 % 1024) as u16;
        fake.push_fifo(
            Spartan6::DdfNwords.into(),
            record(subunit, channel_enable, cells, trigger_cell, self.clock),
        );
        Ok(())
    }
}
