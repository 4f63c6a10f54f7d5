use std::{
    fmt::{Display, Formatter},
    net::Ipv4Addr,
    str::FromStr,
};

use color_eyre::eyre::{self, bail};

/// `45` is shorthand for `192.168.1.45`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardAddr(pub Ipv4Addr);

impl FromStr for BoardAddr {
    type Err = eyre::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return Ok(Self(Ipv4Addr::new(192, 168, 1, n)));
        }
        match s.parse() {
            Ok(ip) => Ok(Self(ip)),
            Err(_) => bail!("expected a board number or an IPv4 address, got {s:?}"),
        }
    }
}

impl Display for BoardAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Register address or value, hex with or without `0x`.
pub fn parse_hex(s: &str) -> std::result::Result<u16, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u16::from_str_radix(s, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_addr() {
        let a: BoardAddr = "45".parse().unwrap();
        assert_eq!(a.to_string(), "192.168.1.45");
        let a: BoardAddr = "10.0.0.7".parse().unwrap();
        assert_eq!(a.0, Ipv4Addr::new(10, 0, 0, 7));
        assert!("board".parse::<BoardAddr>().is_err());
    }

    #[test]
    fn hex() {
        assert_eq!(parse_hex("0d0a").unwrap(), 0x0d0a);
        assert_eq!(parse_hex("0xBEEF").unwrap(), 0xbeef);
        assert!(parse_hex("10000").is_err());
    }
}
