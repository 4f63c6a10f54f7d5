use rocstar_io::{Bus, BusError, Transport};

pub mod bringup;
pub mod checks;
pub mod drs4;
mod error;
pub mod info;
pub mod registers;
pub mod sim;

pub use crate::error::{ErrorKind, ReadoutError};

/// A block of board state that can be collected with plain register reads.
pub trait Read: Sized {
    fn read(bus: &mut Bus<impl Transport>) -> impl Future<Output = Result<Self, BusError>>;
}

pub async fn read<R: Read>(bus: &mut Bus<impl Transport>) -> Result<R, BusError> {
    R::read(bus).await
}
