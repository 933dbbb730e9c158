use crate::plat::Register;

/// The sixteen 8-bit general purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmuRegisters([u8; Register::COUNT]);

impl EmuRegisters {
    pub fn get(&self, reg: Register) -> u8 {
        self.0[reg.index()]
    }

    pub fn set(&mut self, reg: Register, value: u8) {
        self.0[reg.index()] = value;
    }

    pub fn values(&self) -> &[u8; Register::COUNT] {
        &self.0
    }

    /// The 12-bit address held by the `r1:r0` pair.
    pub fn address(&self) -> usize {
        (usize::from(self.get(Register::R1)) << 8 | usize::from(self.get(Register::R0))) & 0xfff
    }

    /// Splits a 12-bit address over the `r1:r0` pair.
    pub fn set_address(&mut self, addr: u16) {
        self.set(Register::R1, ((addr >> 8) & 0xf) as u8);
        self.set(Register::R0, (addr & 0xff) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_pair() {
        let mut regs = EmuRegisters::default();
        regs.set_address(0xabc);
        assert_eq!(regs.get(Register::R1), 0x0a);
        assert_eq!(regs.get(Register::R0), 0xbc);
        assert_eq!(regs.address(), 0xabc);

        // only the low nibble of r1 takes part
        regs.set(Register::R1, 0xff);
        assert_eq!(regs.address(), 0xfbc);
    }
}
