use async_trait::async_trait;

use crate::{BusError, Reg};

/// Reply to a bulk FIFO read, as received. Nothing here has been checked
/// against the tag or the declared count yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReply {
    pub status: u16,
    pub tag: String,
    pub declared: usize,
    pub words: Vec<u16>,
}

/// The wire boundary to the board: single register reads and writes in either
/// space, plus the bulk FIFO read.
///
/// Implementations must not retry or cache. Every call is one transaction.
#[async_trait]
pub trait Transport: Send {
    async fn read(&mut self, reg: Reg) -> Result<u16, BusError>;

    async fn write(&mut self, reg: Reg, value: u16) -> Result<(), BusError>;

    /// Pop up to the number of words reported by `nwords` out of `data`.
    async fn read_block(&mut self, nwords: Reg, data: Reg) -> Result<BlockReply, BusError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn read(&mut self, reg: Reg) -> Result<u16, BusError> {
        T::read(&mut *self, reg).await
    }

    async fn write(&mut self, reg: Reg, value: u16) -> Result<(), BusError> {
        T::write(&mut *self, reg, value).await
    }

    async fn read_block(&mut self, nwords: Reg, data: Reg) -> Result<BlockReply, BusError> {
        T::read_block(&mut *self, nwords, data).await
    }
}
