use std::fmt::Display;

/// One of the two register files on the board. Addresses never alias between
/// them.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum Space {
    /// Stage A: Zynq programmable logic, bridges the bus to the Spartan6.
    #[strum(to_string = "uzed", serialize = "microzed", serialize = "a")]
    Microzed = 0,
    /// Stage B: hosts the DRS4 pipeline and trigger logic.
    #[strum(to_string = "s6", serialize = "spartan6", serialize = "b")]
    Spartan6 = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg {
    pub space: Space,
    pub addr: u16,
}

impl Reg {
    pub const fn new(space: Space, addr: u16) -> Self {
        Self { space, addr }
    }

    pub const fn microzed(addr: u16) -> Self {
        Self::new(Space::Microzed, addr)
    }

    pub const fn spartan6(addr: u16) -> Self {
        Self::new(Space::Spartan6, addr)
    }

    /// Address as sent to the bus server.
    ///
    /// ```text
    /// [19:16] space
    /// [15: 0] address
    /// ```
    pub const fn wire_addr(self) -> u32 {
        (self.space as u32) << 16 | self.addr as u32
    }
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:04x}", self.space, self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_addr_keeps_spaces_apart() {
        assert_eq!(Reg::microzed(0x0d0a).wire_addr(), 0x0_0d0a);
        assert_eq!(Reg::spartan6(0x0d0a).wire_addr(), 0x1_0d0a);
        assert_ne!(Reg::microzed(1), Reg::spartan6(1));
    }

    #[test]
    fn space_names() {
        assert_eq!("spartan6".parse::<Space>().unwrap(), Space::Spartan6);
        assert_eq!("uzed".parse::<Space>().unwrap(), Space::Microzed);
        assert_eq!(Reg::spartan6(0x0d27).to_string(), "s6:0d27");
    }
}
