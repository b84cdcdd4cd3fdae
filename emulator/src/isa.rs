//! Instruction-set description shared by the semantic analyzer and the
//! compiler.
//!
//! Both consumers work from the same [`InstructionSpec`] table: the analyzer
//! checks operand shapes against it, the compiler builds the runtime
//! instruction from it. Keeping a single table prevents the validation and
//! execution rules from drifting apart.

use bitflags::bitflags;
use parse_display::Display;

use crate::runtime::Condition;

/// Operation width of an instruction or register access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Size {
    #[display("b")]
    Byte,

    #[display("w")]
    Word,

    #[display("l")]
    Long,
}

impl Size {
    /// Number of bytes moved by an access of this size
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    /// Mask selecting the low-order bits of this width
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Long => 0xFFFF_FFFF,
        }
    }

    /// Sign bit of this width
    #[must_use]
    pub const fn msb(self) -> u32 {
        match self {
            Size::Byte => 0x80,
            Size::Word => 0x8000,
            Size::Long => 0x8000_0000,
        }
    }

    pub(crate) fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "b" => Some(Size::Byte),
            "w" => Some(Size::Word),
            "l" => Some(Size::Long),
            _ => None,
        }
    }
}

bitflags! {
    /// Set of operand addressing-mode kinds
    ///
    /// Each parsed operand maps to exactly one bit; an instruction operand
    /// slot accepts a union of them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AddressingModeSet: u16 {
        const DATA_REGISTER         = 1 << 0;
        const ADDRESS_REGISTER      = 1 << 1;
        const IMMEDIATE             = 1 << 2;
        const INDIRECT              = 1 << 3;
        const INDIRECT_DISPLACEMENT = 1 << 4;
        const POST_INCREMENT        = 1 << 5;
        const PRE_DECREMENT         = 1 << 6;
        const ABSOLUTE              = 1 << 7;
    }
}

impl AddressingModeSet {
    /// Every addressing mode
    pub const ALL: Self = Self::all();

    /// Anything but an address register or an immediate: operands that can
    /// be written to and hold data
    pub const DATA_ALTERABLE: Self = Self::DATA_REGISTER
        .union(Self::INDIRECT)
        .union(Self::INDIRECT_DISPLACEMENT)
        .union(Self::POST_INCREMENT)
        .union(Self::PRE_DECREMENT)
        .union(Self::ABSOLUTE);

    /// Data-alterable modes plus address registers: anything `move` may
    /// write to
    pub const ALTERABLE: Self = Self::DATA_ALTERABLE.union(Self::ADDRESS_REGISTER);

    /// Every mode that names a memory location usable as a jump/load target
    pub const CONTROL: Self = Self::INDIRECT
        .union(Self::INDIRECT_DISPLACEMENT)
        .union(Self::ABSOLUTE);

    /// Any register
    pub const ANY_REGISTER: Self = Self::DATA_REGISTER.union(Self::ADDRESS_REGISTER);

    /// Everything that yields a plain data value (no address registers)
    pub const DATA: Self = Self::ALL.difference(Self::ADDRESS_REGISTER);

    /// Shift counts and bit numbers: an immediate or a data register
    pub const COUNT: Self = Self::DATA_REGISTER.union(Self::IMMEDIATE);
}

/// Operand and size shape of one mnemonic
#[derive(Debug, Clone, Copy)]
pub struct InstructionSpec {
    /// Accepted addressing modes, one entry per operand slot
    pub operands: &'static [AddressingModeSet],

    /// Sizes an explicit suffix may select; empty means the mnemonic takes
    /// no size suffix at all
    pub sizes: &'static [Size],

    /// Size used when no suffix is written
    pub default_size: Option<Size>,
}

const BWL: &[Size] = &[Size::Byte, Size::Word, Size::Long];
const WL: &[Size] = &[Size::Word, Size::Long];
const W: &[Size] = &[Size::Word];
const L: &[Size] = &[Size::Long];
const B: &[Size] = &[Size::Byte];
const BL: &[Size] = &[Size::Byte, Size::Long];
const UNSIZED: &[Size] = &[];

/// The closed set of recognized mnemonics
///
/// Conditional families (`b<cc>`, `db<cc>`, `s<cc>`) carry their condition,
/// resolved from the mnemonic suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Move,
    Add,
    Sub,
    Adda,
    Suba,
    Neg,
    Ext,
    Clr,
    Mulu,
    Muls,
    Divu,
    Divs,
    Cmp,
    Tst,
    And,
    Or,
    Eor,
    Not,
    Lsl,
    Lsr,
    Asl,
    Asr,
    Rol,
    Ror,
    Btst,
    Bchg,
    Bclr,
    Bset,
    Lea,
    Pea,
    Exg,
    Swap,
    Jmp,
    Jsr,
    Rts,
    Bra,
    Bsr,
    Bcc(Condition),
    Dbcc(Condition),
    Scc(Condition),
    Trap,
}

impl Mnemonic {
    /// Resolve a lowercase mnemonic name
    ///
    /// Fixed names win over the conditional families, so `bsr` is a
    /// subroutine branch and not `b` + an (unknown) `sr` condition.
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        use Mnemonic as M;

        let fixed = match name {
            "move" => Some(M::Move),
            "add" => Some(M::Add),
            "sub" => Some(M::Sub),
            "adda" => Some(M::Adda),
            "suba" => Some(M::Suba),
            "neg" => Some(M::Neg),
            "ext" => Some(M::Ext),
            "clr" => Some(M::Clr),
            "mulu" => Some(M::Mulu),
            "muls" => Some(M::Muls),
            "divu" => Some(M::Divu),
            "divs" => Some(M::Divs),
            "cmp" => Some(M::Cmp),
            "tst" => Some(M::Tst),
            "and" => Some(M::And),
            "or" => Some(M::Or),
            "eor" => Some(M::Eor),
            "not" => Some(M::Not),
            "lsl" => Some(M::Lsl),
            "lsr" => Some(M::Lsr),
            "asl" => Some(M::Asl),
            "asr" => Some(M::Asr),
            "rol" => Some(M::Rol),
            "ror" => Some(M::Ror),
            "btst" => Some(M::Btst),
            "bchg" => Some(M::Bchg),
            "bclr" => Some(M::Bclr),
            "bset" => Some(M::Bset),
            "lea" => Some(M::Lea),
            "pea" => Some(M::Pea),
            "exg" => Some(M::Exg),
            "swap" => Some(M::Swap),
            "jmp" => Some(M::Jmp),
            "jsr" => Some(M::Jsr),
            "rts" => Some(M::Rts),
            "bra" => Some(M::Bra),
            "bsr" => Some(M::Bsr),
            // dbra is the architecture's alias for dbf
            "dbra" => Some(M::Dbcc(Condition::False)),
            "trap" => Some(M::Trap),
            _ => None,
        };

        if fixed.is_some() {
            return fixed;
        }

        if let Some(suffix) = name.strip_prefix("db") {
            return Condition::from_suffix(suffix).map(M::Dbcc);
        }
        if let Some(suffix) = name.strip_prefix('b') {
            return Condition::from_suffix(suffix).map(M::Bcc);
        }
        if let Some(suffix) = name.strip_prefix('s') {
            return Condition::from_suffix(suffix).map(M::Scc);
        }

        None
    }

    /// Operand and size shape of this mnemonic
    #[must_use]
    pub fn spec(self) -> InstructionSpec {
        use AddressingModeSet as Am;
        use Mnemonic as M;

        let (operands, sizes, default_size): (&[Am], &[Size], Option<Size>) = match self {
            M::Move => (&[Am::ALL, Am::ALTERABLE], BWL, Some(Size::Word)),
            M::Add | M::Sub => (&[Am::ALL, Am::DATA_ALTERABLE], BWL, Some(Size::Word)),
            M::Adda | M::Suba => (&[Am::ALL, Am::ADDRESS_REGISTER], WL, Some(Size::Word)),
            M::Neg | M::Clr | M::Not | M::Tst => (&[Am::DATA_ALTERABLE], BWL, Some(Size::Word)),
            M::Ext => (&[Am::DATA_REGISTER], WL, Some(Size::Word)),
            M::Mulu | M::Muls | M::Divu | M::Divs => (&[Am::DATA, Am::DATA_REGISTER], W, Some(Size::Word)),
            M::Cmp => (&[Am::ALL, Am::ANY_REGISTER], BWL, Some(Size::Word)),
            M::And | M::Or | M::Eor => (&[Am::DATA, Am::DATA_ALTERABLE], BWL, Some(Size::Word)),
            M::Lsl | M::Lsr | M::Asl | M::Asr | M::Rol | M::Ror => {
                (&[Am::COUNT, Am::DATA_REGISTER], BWL, Some(Size::Word))
            }
            M::Btst | M::Bchg | M::Bclr | M::Bset => (&[Am::COUNT, Am::DATA_ALTERABLE], BL, None),
            M::Lea => (&[Am::CONTROL, Am::ADDRESS_REGISTER], L, Some(Size::Long)),
            M::Pea => (&[Am::CONTROL], L, Some(Size::Long)),
            M::Exg => (&[Am::ANY_REGISTER, Am::ANY_REGISTER], L, Some(Size::Long)),
            M::Swap => (&[Am::DATA_REGISTER], W, Some(Size::Word)),
            M::Jmp | M::Jsr => (&[Am::CONTROL], UNSIZED, None),
            M::Rts => (&[], UNSIZED, None),
            M::Bra | M::Bsr | M::Bcc(_) => (&[Am::ABSOLUTE], UNSIZED, None),
            M::Dbcc(_) => (&[Am::DATA_REGISTER, Am::ABSOLUTE], UNSIZED, None),
            M::Scc(_) => (&[Am::DATA_ALTERABLE], B, Some(Size::Byte)),
            M::Trap => (&[Am::IMMEDIATE], UNSIZED, None),
        };

        InstructionSpec {
            operands,
            sizes,
            default_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn resolve_fixed_mnemonics_test() {
        assert_eq!(Mnemonic::resolve("move"), Some(Mnemonic::Move));
        assert_eq!(Mnemonic::resolve("bsr"), Some(Mnemonic::Bsr));
        assert_eq!(Mnemonic::resolve("bclr"), Some(Mnemonic::Bclr));
        assert_eq!(Mnemonic::resolve("sub"), Some(Mnemonic::Sub));
        assert_eq!(Mnemonic::resolve("frobnicate"), None);
    }

    #[test]
    fn resolve_conditional_families_test() {
        assert_eq!(Mnemonic::resolve("beq"), Some(Mnemonic::Bcc(Condition::Equal)));
        assert_eq!(Mnemonic::resolve("bne"), Some(Mnemonic::Bcc(Condition::NotEqual)));
        assert_eq!(Mnemonic::resolve("blt"), Some(Mnemonic::Bcc(Condition::LessThan)));
        assert_eq!(Mnemonic::resolve("dbra"), Some(Mnemonic::Dbcc(Condition::False)));
        assert_eq!(Mnemonic::resolve("dbeq"), Some(Mnemonic::Dbcc(Condition::Equal)));
        assert_eq!(Mnemonic::resolve("seq"), Some(Mnemonic::Scc(Condition::Equal)));
        assert_eq!(Mnemonic::resolve("bxy"), None);
    }

    #[test]
    fn spec_shapes_test() {
        let spec = Mnemonic::Move.spec();
        assert_eq!(spec.operands.len(), 2);
        assert_eq!(spec.default_size, Some(Size::Word));
        assert!(spec.operands[0].contains(AddressingModeSet::IMMEDIATE));
        // An immediate is not a legal move destination
        assert!(!spec.operands[1].contains(AddressingModeSet::IMMEDIATE));

        let spec = Mnemonic::Rts.spec();
        assert!(spec.operands.is_empty());
        assert!(spec.sizes.is_empty());

        let spec = Mnemonic::Adda.spec();
        assert_eq!(spec.operands[1], AddressingModeSet::ADDRESS_REGISTER);
        assert_eq!(spec.sizes, WL);
    }

    #[test]
    fn size_arithmetic_test() {
        assert_eq!(Size::Byte.mask(), 0xFF);
        assert_eq!(Size::Word.msb(), 0x8000);
        assert_eq!(Size::Long.bytes(), 4);
        assert_eq!(Size::from_suffix("w"), Some(Size::Word));
        assert_eq!(Size::from_suffix("q"), None);
    }
}
