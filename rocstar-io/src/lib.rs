mod bus;
mod error;
pub mod fake;
mod session;
mod space;
pub mod tcp;
mod transport;
mod utils;
pub mod wire;

pub use crate::{
    bus::{Bus, DEFAULT_TIMEOUT},
    error::BusError,
    session::{Session, scripted::ScriptedSession, ssh::SshSession},
    space::{Reg, Space},
    transport::{BlockReply, Transport},
    utils::{Hex, Words, with_timeout},
};
