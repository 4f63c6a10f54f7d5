use std::time::Duration;

use tracing::{debug, instrument};

use crate::{BlockReply, BusError, Hex, Reg, Transport, with_timeout};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Register bus client.
///
/// Every method takes `&mut self`, so at most one transaction is ever in
/// flight: replies from the bus server are matched to requests by position
/// only. No retries and no caching happen here.
pub struct Bus<T> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> Bus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Deadline applied to each transaction individually.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip_all)]
    pub async fn read(&mut self, reg: impl Into<Reg>) -> Result<u16, BusError> {
        let reg = reg.into();
        let Self { transport, timeout } = self;
        let value = with_timeout(
            *timeout,
            || format!("read {reg}"),
            transport.read(reg),
        )
        .await?;
        debug!(%reg, value = %Hex(value));
        Ok(value)
    }

    #[instrument(skip_all)]
    pub async fn write(&mut self, reg: impl Into<Reg>, value: u16) -> Result<(), BusError> {
        let reg = reg.into();
        debug!(%reg, value = %Hex(value));
        let Self { transport, timeout } = self;
        with_timeout(
            *timeout,
            || format!("write {reg}"),
            transport.write(reg, value),
        )
        .await
    }

    /// Read, apply `f`, write back. Two transactions; nothing prevents the
    /// hardware from changing the register in between.
    pub async fn modify(
        &mut self,
        reg: impl Into<Reg>,
        f: impl FnOnce(u16) -> u16,
    ) -> Result<u16, BusError> {
        let reg = reg.into();
        let value = f(self.read(reg).await?);
        self.write(reg, value).await?;
        Ok(value)
    }

    #[instrument(skip_all)]
    pub async fn read_block(
        &mut self,
        nwords: impl Into<Reg>,
        data: impl Into<Reg>,
    ) -> Result<BlockReply, BusError> {
        let (nwords, data) = (nwords.into(), data.into());
        let Self { transport, timeout } = self;
        let reply = with_timeout(
            *timeout,
            || format!("block read {nwords} {data}"),
            transport.read_block(nwords, data),
        )
        .await?;
        debug!(%nwords, %data, status = reply.status, declared = reply.declared, len = reply.words.len());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeTransport, Transaction};

    #[test]
    fn reads_are_idempotent() {
        let fake = FakeTransport::new();
        fake.set(Reg::spartan6(0x0001), 0xbeef);
        let mut bus = Bus::new(fake.clone());
        smol::block_on(async {
            let a = bus.read(Reg::spartan6(0x0001)).await.unwrap();
            let b = bus.read(Reg::spartan6(0x0001)).await.unwrap();
            assert_eq!(a, 0xbeef);
            assert_eq!(a, b);
        });
        assert_eq!(fake.transactions().len(), 2);
    }

    #[test]
    fn spaces_are_independent() {
        let fake = FakeTransport::new();
        let mut bus = Bus::new(fake);
        smol::block_on(async {
            bus.write(Reg::microzed(0x0019), 1).await.unwrap();
            assert_eq!(bus.read(Reg::microzed(0x0019)).await.unwrap(), 1);
            assert_eq!(bus.read(Reg::spartan6(0x0019)).await.unwrap(), 0);
        });
    }

    #[test]
    fn modify_keeps_high_byte() {
        let fake = FakeTransport::new();
        fake.set(Reg::spartan6(0x0d00), 0x1203);
        let mut bus = Bus::new(fake.clone());
        let v = smol::block_on(bus.modify(Reg::spartan6(0x0d00), |v| v & 0xff00 | 0x10)).unwrap();
        assert_eq!(v, 0x1210);
        assert_eq!(fake.get(Reg::spartan6(0x0d00)), 0x1210);
        assert_eq!(
            fake.transactions(),
            [
                Transaction::Read(Reg::spartan6(0x0d00)),
                Transaction::Write(Reg::spartan6(0x0d00), 0x1210),
            ]
        );
    }

    #[test]
    fn stalled_board_times_out() {
        let fake = FakeTransport::new();
        fake.stall(true);
        let mut bus = Bus::new(fake).with_timeout(Duration::from_millis(20));
        let err = smol::block_on(bus.read(Reg::spartan6(0x0d0a))).unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert!(err.to_string().contains("read s6:0d0a"));
    }
}
