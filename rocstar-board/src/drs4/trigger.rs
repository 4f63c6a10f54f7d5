use std::time::{Duration, Instant};

use rocstar_io::{Bus, BusError, Hex, Transport, with_timeout};
use tracing::{debug, info, instrument, trace, warn};

use super::{
    DigitizerConfig, Event, StatusSnapshot, Subunit, TriggerSource, event::decode, fifo::drain,
};
use crate::{
    ReadoutError,
    registers::{FIFO_RESET, Spartan6},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadoutLimits {
    /// Deadline for the pulse itself, and again for the trigger count to move
    /// afterwards.
    pub trigger_timeout: Duration,
    pub poll_interval: Duration,
    /// Bulk reads allowed before the FIFO is declared stuck.
    pub max_drain_iterations: usize,
}

impl Default for ReadoutLimits {
    fn default() -> Self {
        Self {
            trigger_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            max_drain_iterations: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum State {
    Idle,
    SubunitArmed,
    FifoReset,
    PreSnapshot,
    Triggered,
    PostSnapshot,
    Draining,
    Decoding,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counters {
    trigger_count: u16,
    latest_timestamp: u16,
}

impl Counters {
    async fn read<T: Transport>(bus: &mut Bus<T>, subunit: Subunit) -> Result<Self, BusError> {
        Ok(Self {
            trigger_count: bus.read(subunit.trigger_count()).await?,
            latest_timestamp: bus.read(subunit.latest_timestamp()).await?,
        })
    }
}

/// One trigger, start to finish: arm a DRS, reset the FIFO, pulse, check the
/// trigger counter moved by exactly one, drain and decode.
///
/// Failures leave the hardware as they found it. Resetting the FIFO or
/// re-arming is up to the caller.
pub struct Sequencer<'a, T, G: ?Sized> {
    bus: &'a mut Bus<T>,
    trigger: &'a mut G,
    config: &'a DigitizerConfig,
    limits: ReadoutLimits,
    state: State,
    failed_in: Option<State>,
}

impl<'a, T: Transport, G: TriggerSource + ?Sized> Sequencer<'a, T, G> {
    pub fn new(bus: &'a mut Bus<T>, trigger: &'a mut G, config: &'a DigitizerConfig) -> Self {
        Self {
            bus,
            trigger,
            config,
            limits: ReadoutLimits::default(),
            state: State::Idle,
            failed_in: None,
        }
    }

    pub fn with_limits(mut self, limits: ReadoutLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Where the last run stopped, if it failed.
    pub fn failed_in(&self) -> Option<State> {
        self.failed_in
    }

    fn enter(&mut self, state: State) {
        trace!(from = %self.state, to = %state);
        self.state = state;
    }

    /// Read out one event from sub-unit `which` (0 = A, 1 = B).
    #[instrument(skip(self))]
    pub async fn run(&mut self, which: u8) -> Result<Event, ReadoutError> {
        self.state = State::Idle;
        self.failed_in = None;
        match self.sequence(which).await {
            Ok(event) => {
                self.enter(State::Done);
                Ok(event)
            }
            Err(e) => {
                warn!(state = %self.state, kind = %e.kind(), "readout failed: {e}");
                self.failed_in = Some(self.state);
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    async fn sequence(&mut self, which: u8) -> Result<Event, ReadoutError> {
        let subunit = Subunit::try_from(which)?;

        self.enter(State::SubunitArmed);
        self.bus
            .write(Spartan6::DrsSelect, subunit.select().bits())
            .await?;

        self.enter(State::FifoReset);
        self.bus.write(Spartan6::FifoReset, FIFO_RESET).await?;

        self.enter(State::PreSnapshot);
        self.log_fifo_state(subunit).await?;
        let before = Counters::read(self.bus, subunit).await?;
        debug!(
            count = before.trigger_count,
            latest = %Hex(before.latest_timestamp),
            "before trigger"
        );

        self.enter(State::Triggered);
        with_timeout(
            self.limits.trigger_timeout,
            || "trigger pulse".to_owned(),
            self.trigger.pulse(),
        )
        .await?;

        self.enter(State::PostSnapshot);
        let after = self.wait_for_trigger(subunit, before).await?;
        if after.trigger_count != before.trigger_count.wrapping_add(1) {
            return Err(ReadoutError::Sequencing {
                before: before.trigger_count,
                after: after.trigger_count,
            });
        }
        if after.latest_timestamp == before.latest_timestamp {
            warn!(
                latest = %Hex(after.latest_timestamp),
                "latest timestamp did not advance"
            );
        }

        self.enter(State::Draining);
        let words = drain(
            self.bus,
            Spartan6::DdfNwords.into(),
            Spartan6::DdfData.into(),
            self.limits.max_drain_iterations,
        )
        .await?;
        let status = StatusSnapshot::read(self.bus, subunit).await?;

        self.enter(State::Decoding);
        let event = decode(words, subunit, self.config, &status)?;
        info!(
            %subunit,
            count = after.trigger_count,
            trigger_cell = event.trigger_cell(),
            timestamp = %Hex(event.timestamp()),
            "event read out"
        );
        Ok(event)
    }

    async fn log_fifo_state(&mut self, subunit: Subunit) -> Result<(), BusError> {
        let nwords = self.bus.read(Spartan6::DdfNwords).await?;
        let data = self.bus.read(Spartan6::DdfData).await?;
        let rfsm = self.bus.read(subunit.fifos_not_empty()).await?;
        debug!(nwords, data = %Hex(data), rfsm = %Hex(rfsm), "fifo after reset");
        Ok(())
    }

    /// Re-read the counters until the trigger count changes or the trigger
    /// deadline passes.
    async fn wait_for_trigger(
        &mut self,
        subunit: Subunit,
        before: Counters,
    ) -> Result<Counters, BusError> {
        let deadline = Instant::now() + self.limits.trigger_timeout;
        let mut after = Counters::read(self.bus, subunit).await?;
        while after.trigger_count == before.trigger_count && Instant::now() < deadline {
            smol::Timer::after(self.limits.poll_interval).await;
            after = Counters::read(self.bus, subunit).await?;
        }
        debug!(
            count = after.trigger_count,
            latest = %Hex(after.latest_timestamp),
            "after trigger"
        );
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use rocstar_io::{Reg, fake::Transaction};

    use super::*;
    use crate::{ErrorKind, drs4::CalibrationMode, sim::SimulatedBoard};

    fn limits() -> ReadoutLimits {
        ReadoutLimits {
            trigger_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            ..ReadoutLimits::default()
        }
    }

    fn config(cells: u16) -> DigitizerConfig {
        DigitizerConfig::new(4, cells, CalibrationMode::NonCalibration).unwrap()
    }

    #[test]
    fn arms_each_subunit() {
        let board = SimulatedBoard::new();
        let mut bus = Bus::new(board.transport());
        let mut trigger = board.trigger();
        let config = config(1023);
        smol::block_on(async {
            config.apply(&mut bus, &mut trigger).await.unwrap();
            for which in [0, 1] {
                let mut seq = Sequencer::new(&mut bus, &mut trigger, &config).with_limits(limits());
                let event = seq.run(which).await.unwrap();
                assert_eq!(seq.state(), State::Done);
                assert_eq!(event.active_subunit(), Subunit::try_from(which).unwrap());
                assert_eq!(event.waveform().len(), 1023);
                assert!(event.timestamp_agrees());
            }
        });
        assert_eq!(board.transport().get(Reg::spartan6(0x0d26)), 1);
        assert_eq!(board.transport().get(Reg::spartan6(0x0d27)), 1);
    }

    #[test]
    fn invalid_subunit_touches_nothing() {
        let board = SimulatedBoard::new();
        let fake = board.transport();
        let mut bus = Bus::new(fake.clone());
        let mut trigger = board.trigger();
        let config = config(16);
        let mut seq = Sequencer::new(&mut bus, &mut trigger, &config);
        let err = smol::block_on(seq.run(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(seq.state(), State::Failed);
        assert_eq!(seq.failed_in(), Some(State::Idle));
        assert!(fake.transactions().is_empty());
        assert_eq!(trigger.pulses(), 0);
    }

    #[test]
    fn stuck_counter_is_sequencing_error() {
        let board = SimulatedBoard::new();
        let mut bus = Bus::new(board.transport());
        let mut trigger = board.trigger().stuck();
        let config = config(16);
        let mut seq = Sequencer::new(&mut bus, &mut trigger, &config).with_limits(limits());
        let err = smol::block_on(seq.run(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Sequencing);
        assert!(matches!(
            err,
            ReadoutError::Sequencing {
                before: 0,
                after: 0
            }
        ));
        assert_eq!(seq.failed_in(), Some(State::PostSnapshot));
    }

    #[test]
    fn hung_pulse_times_out() {
        let board = SimulatedBoard::new();
        let mut bus = Bus::new(board.transport());
        let mut trigger = board.trigger().hung();
        let config = config(16);
        let mut seq = Sequencer::new(&mut bus, &mut trigger, &config).with_limits(limits());
        let err = smol::block_on(seq.run(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(seq.state(), State::Failed);
        assert_eq!(seq.failed_in(), Some(State::Triggered));
        assert!(
            !board
                .transport()
                .transactions()
                .iter()
                .any(|t| matches!(t, Transaction::ReadBlock(..)))
        );
    }

    #[test]
    fn double_trigger_is_sequencing_error() {
        let board = SimulatedBoard::new();
        let mut bus = Bus::new(board.transport());
        let mut trigger = board.trigger().doubled();
        let config = config(16);
        let mut seq = Sequencer::new(&mut bus, &mut trigger, &config).with_limits(limits());
        let err = smol::block_on(seq.run(1)).unwrap_err();
        assert!(matches!(
            err,
            ReadoutError::Sequencing {
                before: 0,
                after: 2
            }
        ));
        // nothing drained
        assert!(
            !board
                .transport()
                .transactions()
                .iter()
                .any(|t| matches!(t, Transaction::ReadBlock(..)))
        );
    }

    #[test]
    fn trigger_count_wraps() {
        let board = SimulatedBoard::new();
        board.transport().set(Reg::spartan6(0x0d27), 0xffff);
        let mut bus = Bus::new(board.transport());
        let mut trigger = board.trigger();
        let config = config(16);
        smol::block_on(async {
            config.apply(&mut bus, &mut trigger).await.unwrap();
            let mut seq = Sequencer::new(&mut bus, &mut trigger, &config).with_limits(limits());
            seq.run(1).await.unwrap();
        });
        assert_eq!(board.transport().get(Reg::spartan6(0x0d27)), 0);
    }

    #[test]
    fn cell_count_follows_config() {
        let board = SimulatedBoard::new();
        let mut bus = Bus::new(board.transport());
        let mut trigger = board.trigger();
        smol::block_on(async {
            for cells in [1023, 100, 1] {
                let config = config(cells);
                config.apply(&mut bus, &mut trigger).await.unwrap();
                let mut seq = Sequencer::new(&mut bus, &mut trigger, &config).with_limits(limits());
                assert_eq!(seq.run(0).await.unwrap().waveform().len(), usize::from(cells));
            }
        });
    }

    #[test]
    fn stale_fifo_contents_are_discarded() {
        let board = SimulatedBoard::new();
        let fake = board.transport();
        fake.push_fifo(Reg::spartan6(0x0d0a), [0xdead; 5]);
        let mut bus = Bus::new(fake.clone());
        let mut trigger = board.trigger();
        let config = config(8);
        smol::block_on(async {
            config.apply(&mut bus, &mut trigger).await.unwrap();
            let mut seq = Sequencer::new(&mut bus, &mut trigger, &config).with_limits(limits());
            assert_eq!(seq.run(0).await.unwrap().raw_words().len(), 16);
        });
    }

    #[test]
    fn config_mismatch_fails_in_decoding() {
        let board = SimulatedBoard::new();
        let mut bus = Bus::new(board.transport());
        let mut trigger = board.trigger();
        let applied = config(16);
        let expected = DigitizerConfig::new(5, 16, CalibrationMode::NonCalibration).unwrap();
        smol::block_on(async {
            applied.apply(&mut bus, &mut trigger).await.unwrap();
            let mut seq = Sequencer::new(&mut bus, &mut trigger, &expected).with_limits(limits());
            let err = seq.run(0).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Decode);
            assert_eq!(seq.failed_in(), Some(State::Decoding));
        });
    }
}
