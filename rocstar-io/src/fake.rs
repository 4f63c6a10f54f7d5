//! In-memory board for tests and dry runs.
//!
//! [`FakeTransport`] is a cheap handle around shared state, so a test (or a
//! simulated trigger generator) can keep a clone and poke at registers and
//! FIFOs while a [`crate::Bus`] owns another clone.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::{BlockReply, BusError, Reg, Transport, wire};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Read(Reg),
    Write(Reg, u16),
    ReadBlock(Reg, Reg),
}

/// Corruption applied to the next bulk read reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFault {
    Status(u16),
    Tag(String),
    /// Declare this many words regardless of how many are sent.
    Declared(usize),
}

struct Fifo {
    data: Reg,
    words: VecDeque<u16>,
}

#[derive(Default)]
struct State {
    registers: HashMap<Reg, u16>,
    /// keyed by the nwords register
    fifos: HashMap<Reg, Fifo>,
    /// control register -> nwords register of the FIFO cleared by bit 0
    resets: HashMap<Reg, Reg>,
    block_limit: Option<usize>,
    faults: VecDeque<BlockFault>,
    log: Vec<Transaction>,
    stalled: bool,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, reg: Reg, value: u16) {
        self.state().registers.insert(reg, value);
    }

    /// Current register value, as the hardware would report it. Reading
    /// through here is not logged.
    pub fn get(&self, reg: Reg) -> u16 {
        self.state().peek(reg)
    }

    pub fn attach_fifo(&self, nwords: Reg, data: Reg) {
        self.state().fifos.insert(
            nwords,
            Fifo {
                data,
                words: VecDeque::new(),
            },
        );
    }

    /// Writing a value with bit 0 set to `control` empties the FIFO.
    pub fn reset_fifo_on(&self, control: Reg, nwords: Reg) {
        self.state().resets.insert(control, nwords);
    }

    pub fn push_fifo(&self, nwords: Reg, words: impl IntoIterator<Item = u16>) {
        if let Some(fifo) = self.state().fifos.get_mut(&nwords) {
            fifo.words.extend(words);
        }
    }

    pub fn fifo_len(&self, nwords: Reg) -> usize {
        self.state()
            .fifos
            .get(&nwords)
            .map_or(0, |fifo| fifo.words.len())
    }

    /// Most words handed out per bulk read. Unlimited by default.
    pub fn set_block_limit(&self, limit: usize) {
        self.state().block_limit = Some(limit);
    }

    pub fn inject_block_fault(&self, fault: BlockFault) {
        self.state().faults.push_back(fault);
    }

    /// A stalled board never answers.
    pub fn stall(&self, stalled: bool) {
        self.state().stalled = stalled;
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state().log.clone()
    }
}

impl State {
    fn peek(&self, reg: Reg) -> u16 {
        if let Some(fifo) = self.fifos.get(&reg) {
            return u16::try_from(fifo.words.len()).unwrap_or(u16::MAX);
        }
        if let Some(fifo) = self.fifos.values().find(|fifo| fifo.data == reg) {
            return fifo.words.front().copied().unwrap_or(0);
        }
        self.registers.get(&reg).copied().unwrap_or(0)
    }

    fn block(&mut self, nwords: Reg, data: Reg) -> BlockReply {
        let limit = self.block_limit.unwrap_or(usize::MAX);
        let words: Vec<u16> = match self.fifos.get_mut(&nwords) {
            Some(fifo) if fifo.data == data => {
                let n = fifo.words.len().min(limit);
                fifo.words.drain(..n).collect()
            }
            _ => Vec::new(),
        };
        let mut reply = BlockReply {
            status: wire::OK,
            tag: wire::BLOCK_TAG.to_owned(),
            declared: words.len(),
            words,
        };
        match self.faults.pop_front() {
            Some(BlockFault::Status(status)) => reply.status = status,
            Some(BlockFault::Tag(tag)) => reply.tag = tag,
            Some(BlockFault::Declared(declared)) => reply.declared = declared,
            None => {}
        }
        reply
    }
}

impl FakeTransport {
    async fn wait_if_stalled(&self) {
        let stalled = self.state().stalled;
        if stalled {
            futures_lite::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn read(&mut self, reg: Reg) -> Result<u16, BusError> {
        self.state().log.push(Transaction::Read(reg));
        self.wait_if_stalled().await;
        Ok(self.state().peek(reg))
    }

    async fn write(&mut self, reg: Reg, value: u16) -> Result<(), BusError> {
        self.state().log.push(Transaction::Write(reg, value));
        self.wait_if_stalled().await;
        let mut state = self.state();
        if value & 1 == 1
            && let Some(nwords) = state.resets.get(&reg).copied()
            && let Some(fifo) = state.fifos.get_mut(&nwords)
        {
            fifo.words.clear();
        }
        state.registers.insert(reg, value);
        Ok(())
    }

    async fn read_block(&mut self, nwords: Reg, data: Reg) -> Result<BlockReply, BusError> {
        self.state().log.push(Transaction::ReadBlock(nwords, data));
        self.wait_if_stalled().await;
        Ok(self.state().block(nwords, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NW: Reg = Reg::spartan6(0x0d0a);
    const Q: Reg = Reg::spartan6(0x0d0b);
    const RESET: Reg = Reg::spartan6(0x000e);

    fn fake() -> FakeTransport {
        let fake = FakeTransport::new();
        fake.attach_fifo(NW, Q);
        fake.reset_fifo_on(RESET, NW);
        fake
    }

    #[test]
    fn fifo_registers() {
        let mut fake = fake();
        fake.push_fifo(NW, [0xa5a5, 3, 4]);
        smol::block_on(async {
            assert_eq!(fake.read(NW).await.unwrap(), 3);
            assert_eq!(fake.read(Q).await.unwrap(), 0xa5a5);
            // peeking at the data register does not pop
            assert_eq!(fake.read(NW).await.unwrap(), 3);
        });
    }

    #[test]
    fn block_limit_splits_replies() {
        let mut fake = fake();
        fake.set_block_limit(2);
        fake.push_fifo(NW, [1, 2, 3]);
        smol::block_on(async {
            assert_eq!(fake.read_block(NW, Q).await.unwrap().words, [1, 2]);
            assert_eq!(fake.read_block(NW, Q).await.unwrap().words, [3]);
            assert!(fake.read_block(NW, Q).await.unwrap().words.is_empty());
        });
    }

    #[test]
    fn reset_clears_fifo() {
        let mut fake = fake();
        fake.push_fifo(NW, [1, 2, 3]);
        smol::block_on(fake.write(RESET, 0x0001)).unwrap();
        assert_eq!(fake.fifo_len(NW), 0);
    }

    #[test]
    fn faults_apply_once() {
        let mut fake = fake();
        fake.push_fifo(NW, [1, 2]);
        fake.inject_block_fault(BlockFault::Tag("XX".into()));
        smol::block_on(async {
            let reply = fake.read_block(NW, Q).await.unwrap();
            assert_eq!(reply.tag, "XX");
            assert_eq!(reply.declared, 2);
            let reply = fake.read_block(NW, Q).await.unwrap();
            assert_eq!(reply.tag, wire::BLOCK_TAG);
        });
    }
}
