use rocstar_io::{BlockReply, Bus, Reg, Transport, Words, wire};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::ReadoutError;

/// A bulk read reply that contradicts itself, or a FIFO that never empties.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FifoError {
    #[error("bulk read returned status {observed}, expected {expected}")]
    Status { expected: u16, observed: u16 },
    #[error("bulk read tagged {observed:?}, expected {expected:?}")]
    Tag {
        expected: &'static str,
        observed: String,
    },
    #[error("bulk read declared {declared} words but carried {actual}")]
    Count { declared: usize, actual: usize },
    #[error("fifo still reports {remaining} words after {iterations} bulk reads")]
    Stuck { iterations: usize, remaining: u16 },
}

fn check_block(reply: &BlockReply) -> Result<(), FifoError> {
    if reply.status != wire::OK {
        return Err(FifoError::Status {
            expected: wire::OK,
            observed: reply.status,
        });
    }
    if reply.tag != wire::BLOCK_TAG {
        return Err(FifoError::Tag {
            expected: wire::BLOCK_TAG,
            observed: reply.tag.clone(),
        });
    }
    if reply.declared != reply.words.len() {
        return Err(FifoError::Count {
            declared: reply.declared,
            actual: reply.words.len(),
        });
    }
    Ok(())
}

/// Empty the FIFO whose depth is reported by `nwords` and whose contents pop
/// from `data`, returning every word in arrival order.
///
/// Runs until `nwords` reads zero or something fails. After `max_iterations`
/// bulk reads the FIFO is declared stuck. Dropping the future part way leaves
/// the hardware FIFO partially drained; reset it before the next trigger.
#[instrument(skip_all, fields(%nwords, %data))]
pub async fn drain<T: Transport>(
    bus: &mut Bus<T>,
    nwords: Reg,
    data: Reg,
    max_iterations: usize,
) -> Result<Vec<u16>, ReadoutError> {
    let mut words = Vec::new();
    let mut remaining = bus.read(nwords).await?;
    let mut iterations = 0;
    while remaining != 0 {
        if iterations == max_iterations {
            return Err(FifoError::Stuck {
                iterations,
                remaining,
            }
            .into());
        }
        iterations += 1;
        let reply = bus.read_block(nwords, data).await?;
        check_block(&reply)?;
        trace!(remaining, got = reply.words.len());
        words.extend_from_slice(&reply.words);
        remaining = bus.read(nwords).await?;
    }
    debug!(iterations, len = words.len(), head = %Words(&words), "fifo drained");
    Ok(words)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rocstar_io::fake::{BlockFault, FakeTransport, Transaction};

    use super::*;
    use crate::ErrorKind;

    const NW: Reg = Reg::spartan6(0x0d0a);
    const Q: Reg = Reg::spartan6(0x0d0b);

    fn setup(words: &[u16]) -> (FakeTransport, Bus<FakeTransport>) {
        let fake = FakeTransport::new();
        fake.attach_fifo(NW, Q);
        fake.push_fifo(NW, words.iter().copied());
        let bus = Bus::new(fake.clone()).with_timeout(Duration::from_millis(100));
        (fake, bus)
    }

    #[test]
    fn drains_across_blocks_in_order() {
        // sentinel, declared length, payload, trailer
        let record: Vec<u16> = [0xa5a5, 5]
            .into_iter()
            .chain(100..105)
            .chain([0xffff])
            .collect();
        let (fake, mut bus) = setup(&record);
        fake.set_block_limit(3);
        let words = smol::block_on(drain(&mut bus, NW, Q, 16)).unwrap();
        assert_eq!(words, record);
        assert_eq!(words.len(), usize::from(words[1]) + 3);
        assert_eq!(fake.fifo_len(NW), 0);
        let blocks = fake
            .transactions()
            .into_iter()
            .filter(|t| matches!(t, Transaction::ReadBlock(..)))
            .count();
        assert_eq!(blocks, 3);
    }

    #[test]
    fn empty_fifo_issues_no_block_read() {
        let (fake, mut bus) = setup(&[]);
        assert!(smol::block_on(drain(&mut bus, NW, Q, 16)).unwrap().is_empty());
        assert_eq!(fake.transactions(), [Transaction::Read(NW)]);
    }

    #[test]
    fn wrong_tag_is_protocol_error() {
        let (fake, mut bus) = setup(&[0xa5a5, 1, 2]);
        fake.inject_block_fault(BlockFault::Tag("DX".into()));
        let err = smol::block_on(drain(&mut bus, NW, Q, 16)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FifoProtocol);
        assert!(matches!(
            err,
            ReadoutError::Fifo(FifoError::Tag { ref observed, .. }) if observed == "DX"
        ));
    }

    #[test]
    fn wrong_status_is_protocol_error() {
        let (fake, mut bus) = setup(&[0xa5a5, 1, 2]);
        fake.inject_block_fault(BlockFault::Status(451));
        let err = smol::block_on(drain(&mut bus, NW, Q, 16)).unwrap_err();
        assert!(matches!(
            err,
            ReadoutError::Fifo(FifoError::Status { observed: 451, .. })
        ));
    }

    #[test]
    fn inconsistent_count_is_protocol_error() {
        let (fake, mut bus) = setup(&[0xa5a5, 1, 2]);
        fake.inject_block_fault(BlockFault::Declared(7));
        let err = smol::block_on(drain(&mut bus, NW, Q, 16)).unwrap_err();
        assert!(matches!(
            err,
            ReadoutError::Fifo(FifoError::Count {
                declared: 7,
                actual: 3
            })
        ));
    }

    #[test]
    fn stuck_fifo_hits_ceiling() {
        let (fake, mut bus) = setup(&[1; 10]);
        fake.set_block_limit(1);
        let err = smol::block_on(drain(&mut bus, NW, Q, 4)).unwrap_err();
        assert!(matches!(
            err,
            ReadoutError::Fifo(FifoError::Stuck {
                iterations: 4,
                remaining: 6
            })
        ));
    }

    #[test]
    fn stalled_board_times_out() {
        let (fake, mut bus) = setup(&[1, 2]);
        fake.stall(true);
        let err = smol::block_on(drain(&mut bus, NW, Q, 4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
