use facet::Facet;
use rocstar_io::{Bus, BusError, Reg, Transport};

use crate::{
    Read,
    registers::{MICROZED_VERSION, Microzed, SPARTAN6_ID, SPARTAN6_VERSION, Spartan6},
};

nestify::nest! {
#[derive(Debug, Facet)]
pub struct BoardInfo {
    pub microzed: #[derive(Debug, Facet)] pub struct MicrozedInfo {
        /// `0002`, `0001`: `dead`, `beef` when the PL is configured.
        pub bus_check: [u16; 2],
        pub version: [u16; 3],
    },
    pub spartan6: #[derive(Debug, Facet)] pub struct Spartan6Info {
        /// `0000`, `0001`, `0002`, `0008`.
        pub id: [u16; 4],
        pub magic: u16,
        pub version: [u16; 3],
        pub resets_from_uzed: u16,
    },
}
}

async fn read_all<T: Transport, const N: usize>(
    bus: &mut Bus<T>,
    regs: [impl Into<Reg>; N],
) -> Result<[u16; N], BusError> {
    let mut out = [0; N];
    for (value, reg) in out.iter_mut().zip(regs) {
        *value = bus.read(reg).await?;
    }
    Ok(out)
}

impl Read for MicrozedInfo {
    async fn read(bus: &mut Bus<impl Transport>) -> Result<Self, BusError> {
        Ok(Self {
            bus_check: read_all(bus, [Microzed::Dead, Microzed::Beef]).await?,
            version: read_all(bus, MICROZED_VERSION).await?,
        })
    }
}

impl Read for Spartan6Info {
    async fn read(bus: &mut Bus<impl Transport>) -> Result<Self, BusError> {
        Ok(Self {
            id: read_all(bus, SPARTAN6_ID).await?,
            magic: bus.read(Spartan6::Magic).await?,
            version: read_all(bus, SPARTAN6_VERSION).await?,
            resets_from_uzed: bus.read(Spartan6::ResetsFromUzed).await?,
        })
    }
}

impl Read for BoardInfo {
    async fn read(bus: &mut Bus<impl Transport>) -> Result<Self, BusError> {
        Ok(Self {
            microzed: MicrozedInfo::read(bus).await?,
            spartan6: Spartan6Info::read(bus).await?,
        })
    }
}
