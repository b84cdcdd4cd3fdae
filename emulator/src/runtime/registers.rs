use bitflags::bitflags;
use parse_display::Display;
use thiserror::Error;

use crate::constants as C;
use crate::isa::Size;

bitflags! {
    /// The condition-code register, in the architecture's CCR bit order
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct Ccr: u8 {
        const CARRY    = 0b0_0001;
        const OVERFLOW = 0b0_0010;
        const ZERO     = 0b0_0100;
        const NEGATIVE = 0b0_1000;
        const EXTEND   = 0b1_0000;
    }
}

impl std::fmt::Debug for Ccr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#07b}", self.bits())
    }
}

impl Ccr {
    /// The flags as an ordered boolean sequence:
    /// carry, overflow, zero, negative, extend
    #[must_use]
    pub fn as_array(self) -> [bool; 5] {
        [
            self.contains(Ccr::CARRY),
            self.contains(Ccr::OVERFLOW),
            self.contains(Ccr::ZERO),
            self.contains(Ccr::NEGATIVE),
            self.contains(Ccr::EXTEND),
        ]
    }
}

/// One of the sixteen machine registers
///
/// Address register 7 doubles as the stack pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Reg {
    #[display("d{0}")]
    Data(u8),

    #[display("a{0}")]
    Addr(u8),
}

/// Register file kind, used by the index-based snapshot accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
pub enum RegisterKind {
    Data,
    Address,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{kind} register index {index} out of range")]
pub struct InvalidRegister {
    pub kind: RegisterKind,
    pub index: u8,
}

/// The register file: eight data and eight address registers, 32 bits each
///
/// All accesses are width-qualified: narrow reads return the low-order bits
/// unsigned, narrow writes leave the high-order bits untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    d: [C::Long; 8],
    a: [C::Long; 8],
}

impl Registers {
    /// Read a register at the given width (unsigned, low-order bits)
    #[must_use]
    pub fn get(&self, reg: Reg, size: Size) -> C::Long {
        self.raw(reg) & size.mask()
    }

    /// Write the low `size` bits of a register, preserving the rest
    pub fn set(&mut self, reg: Reg, size: Size, value: C::Long) {
        let mask = size.mask();
        let slot = self.raw_mut(reg);
        *slot = (*slot & !mask) | (value & mask);
    }

    /// Checked, index-based read for snapshot consumers
    ///
    /// # Errors
    ///
    /// Fails if `index` does not name one of the eight registers of `kind`.
    pub fn checked_get(
        &self,
        kind: RegisterKind,
        index: u8,
        size: Size,
    ) -> Result<C::Long, InvalidRegister> {
        if index >= 8 {
            return Err(InvalidRegister { kind, index });
        }
        let reg = match kind {
            RegisterKind::Data => Reg::Data(index),
            RegisterKind::Address => Reg::Addr(index),
        };
        Ok(self.get(reg, size))
    }

    /// The stack pointer (`a7`)
    #[must_use]
    pub fn sp(&self) -> C::Address {
        self.a[7]
    }

    pub(crate) fn set_sp(&mut self, value: C::Address) {
        self.a[7] = value;
    }

    fn raw(&self, reg: Reg) -> C::Long {
        match reg {
            Reg::Data(n) => self.d[usize::from(n) % 8],
            Reg::Addr(n) => self.a[usize::from(n) % 8],
        }
    }

    fn raw_mut(&mut self, reg: Reg) -> &mut C::Long {
        match reg {
            Reg::Data(n) => &mut self.d[usize::from(n) % 8],
            Reg::Addr(n) => &mut self.a[usize::from(n) % 8],
        }
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, value) in self.d.iter().enumerate() {
            write!(f, "d{i} = {value:#010x} | ")?;
        }
        for (i, value) in self.a.iter().enumerate() {
            write!(f, "a{i} = {value:#010x}")?;
            if i < 7 {
                write!(f, " | ")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn width_masking_test() {
        let mut registers = Registers::default();
        registers.set(Reg::Data(0), Size::Long, 0x1234_5678);

        // Byte write preserves the upper 24 bits
        registers.set(Reg::Data(0), Size::Byte, 0xAB);
        assert_eq!(registers.get(Reg::Data(0), Size::Long), 0x1234_56AB);

        // Word write preserves the upper 16 bits
        registers.set(Reg::Data(0), Size::Word, 0xCDEF);
        assert_eq!(registers.get(Reg::Data(0), Size::Long), 0x1234_CDEF);

        // Long write overwrites everything
        registers.set(Reg::Data(0), Size::Long, 0xDEAD_BEEF);
        assert_eq!(registers.get(Reg::Data(0), Size::Long), 0xDEAD_BEEF);
    }

    #[test]
    fn narrow_reads_are_unsigned_test() {
        let mut registers = Registers::default();
        registers.set(Reg::Data(3), Size::Long, 0xFFFF_FF80);
        assert_eq!(registers.get(Reg::Data(3), Size::Byte), 0x80);
        assert_eq!(registers.get(Reg::Data(3), Size::Word), 0xFF80);
    }

    #[test]
    fn checked_get_test() {
        let registers = Registers::default();
        assert_eq!(
            registers.checked_get(RegisterKind::Data, 7, Size::Long),
            Ok(0)
        );
        assert_eq!(
            registers.checked_get(RegisterKind::Address, 8, Size::Long),
            Err(InvalidRegister {
                kind: RegisterKind::Address,
                index: 8
            })
        );
    }

    #[test]
    fn sp_is_a7_test() {
        let mut registers = Registers::default();
        registers.set(Reg::Addr(7), Size::Long, 0x00FF_0000);
        assert_eq!(registers.sp(), 0x00FF_0000);
    }

    #[test]
    fn flag_order_test() {
        let ccr = Ccr::CARRY | Ccr::NEGATIVE;
        assert_eq!(ccr.as_array(), [true, false, false, true, false]);
        assert_eq!(ccr.bits(), 0b0_1001);
    }
}
