//! Register-bus sanity checks run once the bus server is up.

use eyre::{Result, ensure};
use rocstar_io::{Bus, Hex, Transport};
use tracing::{info, instrument};

use crate::{
    Read,
    info::{MicrozedInfo, Spartan6Info},
    registers::{BEEF, DEAD, Microzed, SPARTAN6_MAGIC, Spartan6},
};

fn version(words: &[u16; 3]) -> String {
    words.map(|w| Hex(w).to_string()).join(" ")
}

#[instrument(skip_all)]
pub async fn verify_microzed(bus: &mut Bus<impl Transport>) -> Result<()> {
    let info = MicrozedInfo::read(bus).await?;
    let [dead, beef] = info.bus_check;
    ensure!(
        dead == DEAD && beef == BEEF,
        "Microzed bus check read {} {}, expected dead beef",
        Hex(dead),
        Hex(beef)
    );
    info!(version = %version(&info.version), "Microzed firmware");
    Ok(())
}

#[instrument(skip_all)]
pub async fn verify_spartan6(bus: &mut Bus<impl Transport>) -> Result<()> {
    let info = Spartan6Info::read(bus).await?;
    info!(
        id = %info.id.map(|w| Hex(w).to_string()).join(" "),
        "Spartan6 identification"
    );
    ensure!(
        info.id[1] == BEEF,
        "Spartan6 0001 read {}, expected beef",
        Hex(info.id[1])
    );
    ensure!(
        info.magic == SPARTAN6_MAGIC,
        "Spartan6 0013 read {}, expected {}",
        Hex(info.magic),
        Hex(SPARTAN6_MAGIC)
    );
    info!(version = %version(&info.version), "Spartan6 firmware");
    Ok(())
}

/// Pulse the Microzed soft-reset line into the Spartan6. The Spartan6 counts
/// the resets it sees, which is logged before, during and after.
#[instrument(skip_all)]
pub async fn soft_reset_spartan6(bus: &mut Bus<impl Transport>) -> Result<()> {
    let before = bus.read(Spartan6::ResetsFromUzed).await?;
    bus.write(Microzed::SoftReset, 1).await?;
    let during = bus.read(Spartan6::ResetsFromUzed).await?;
    bus.write(Microzed::SoftReset, 0).await?;
    let after = bus.read(Spartan6::ResetsFromUzed).await?;
    info!(before, during, after, "Spartan6 soft reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rocstar_io::{Reg, fake::Transaction};

    use super::*;
    use crate::sim::SimulatedBoard;

    #[test]
    fn healthy_board_passes() {
        let board = SimulatedBoard::new();
        let mut bus = Bus::new(board.transport());
        smol::block_on(async {
            verify_microzed(&mut bus).await.unwrap();
            verify_spartan6(&mut bus).await.unwrap();
        });
    }

    #[test]
    fn unconfigured_spartan6_fails() {
        let board = SimulatedBoard::new();
        board.transport().set(Reg::spartan6(0x0013), 0);
        let mut bus = Bus::new(board.transport());
        let err = smol::block_on(verify_spartan6(&mut bus)).unwrap_err();
        assert!(err.to_string().contains("0013"), "{err}");
    }

    #[test]
    fn soft_reset_pulses_line() {
        let board = SimulatedBoard::new();
        let fake = board.transport();
        let mut bus = Bus::new(fake.clone());
        smol::block_on(soft_reset_spartan6(&mut bus)).unwrap();
        let writes: Vec<_> = fake
            .transactions()
            .into_iter()
            .filter(|t| matches!(t, Transaction::Write(..)))
            .collect();
        assert_eq!(
            writes,
            [
                Transaction::Write(Reg::microzed(0x0019), 1),
                Transaction::Write(Reg::microzed(0x0019), 0),
            ]
        );
    }
}
