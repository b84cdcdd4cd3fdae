use parse_display::Display;
use tracing::debug;

use crate::constants as C;
use crate::isa::Size;

use super::condition::Condition;
use super::exception::Exception;
use super::interrupt::Interrupt;
use super::operands::Operand;
use super::registers::{Ccr, Reg};
use super::Machine;

/// A fully decoded instruction
///
/// One variant per executable mnemonic; conditional families carry their
/// condition and branch targets are resolved addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Instruction {
    /// Copy a value; writes to an address register use the `movea` rules
    #[display("move.{0} {1}, {2}")]
    Move(Size, Operand, Operand),

    #[display("add.{0} {1}, {2}")]
    Add(Size, Operand, Operand),

    #[display("sub.{0} {1}, {2}")]
    Sub(Size, Operand, Operand),

    /// Add to an address register; sets no flags
    #[display("adda.{0} {1}, a{2}")]
    Adda(Size, Operand, u8),

    /// Subtract from an address register; sets no flags
    #[display("suba.{0} {1}, a{2}")]
    Suba(Size, Operand, u8),

    #[display("neg.{0} {1}")]
    Neg(Size, Operand),

    /// Sign-extend byte to word, or word to long
    #[display("ext.{0} d{1}")]
    Ext(Size, u8),

    #[display("clr.{0} {1}")]
    Clr(Size, Operand),

    /// Unsigned word multiply, 32-bit product
    #[display("mulu {0}, d{1}")]
    Mulu(Operand, u8),

    /// Signed word multiply, 32-bit product
    #[display("muls {0}, d{1}")]
    Muls(Operand, u8),

    /// Unsigned divide: quotient in the low word, remainder in the high word
    #[display("divu {0}, d{1}")]
    Divu(Operand, u8),

    /// Signed divide: quotient in the low word, remainder in the high word
    #[display("divs {0}, d{1}")]
    Divs(Operand, u8),

    #[display("cmp.{0} {1}, {2}")]
    Cmp(Size, Operand, Operand),

    #[display("tst.{0} {1}")]
    Tst(Size, Operand),

    #[display("and.{0} {1}, {2}")]
    And(Size, Operand, Operand),

    #[display("or.{0} {1}, {2}")]
    Or(Size, Operand, Operand),

    #[display("eor.{0} {1}, {2}")]
    Eor(Size, Operand, Operand),

    #[display("not.{0} {1}")]
    Not(Size, Operand),

    #[display("lsl.{0} {1}, d{2}")]
    Lsl(Size, Operand, u8),

    #[display("lsr.{0} {1}, d{2}")]
    Lsr(Size, Operand, u8),

    #[display("asl.{0} {1}, d{2}")]
    Asl(Size, Operand, u8),

    #[display("asr.{0} {1}, d{2}")]
    Asr(Size, Operand, u8),

    #[display("rol.{0} {1}, d{2}")]
    Rol(Size, Operand, u8),

    #[display("ror.{0} {1}, d{2}")]
    Ror(Size, Operand, u8),

    #[display("btst {0}, {1}")]
    Btst(Operand, Operand),

    #[display("bchg {0}, {1}")]
    Bchg(Operand, Operand),

    #[display("bclr {0}, {1}")]
    Bclr(Operand, Operand),

    #[display("bset {0}, {1}")]
    Bset(Operand, Operand),

    /// Load an effective address into an address register
    #[display("lea {0}, a{1}")]
    Lea(Operand, u8),

    /// Push an effective address
    #[display("pea {0}")]
    Pea(Operand),

    /// Exchange two registers, all 32 bits
    #[display("exg {0}, {1}")]
    Exg(Reg, Reg),

    /// Swap the halves of a data register
    #[display("swap d{0}")]
    Swap(u8),

    #[display("jmp {0}")]
    Jmp(Operand),

    #[display("jsr {0}")]
    Jsr(Operand),

    #[display("rts")]
    Rts,

    #[display("bra ${0:x}")]
    Bra(C::Address),

    #[display("bsr ${0:x}")]
    Bsr(C::Address),

    /// Conditional branch
    #[display("b{0} ${1:x}")]
    Bcc(Condition, C::Address),

    /// Decrement and branch unless the condition holds or the counter
    /// reaches -1
    #[display("db{0} d{1}, ${2:x}")]
    Dbcc(Condition, u8, C::Address),

    /// Set a byte to all ones or all zeros depending on the condition
    #[display("s{0} {1}")]
    Scc(Condition, Operand),

    /// Raise a host-serviced trap
    #[display("trap #{0}")]
    Trap(u8),
}

fn sign_extend(value: C::Long, size: Size) -> i32 {
    match size {
        Size::Byte => i32::from(value as u8 as i8),
        Size::Word => i32::from(value as u16 as i16),
        Size::Long => value as i32,
    }
}

fn set_nz(ccr: &mut Ccr, result: C::Long, size: Size) {
    ccr.set(Ccr::NEGATIVE, result & size.msb() != 0);
    ccr.set(Ccr::ZERO, result & size.mask() == 0);
}

/// Move/logic rule: N and Z from the result, V and C cleared, X untouched
fn set_logic_flags(ccr: &mut Ccr, result: C::Long, size: Size) {
    ccr.set(Ccr::OVERFLOW, false);
    ccr.set(Ccr::CARRY, false);
    set_nz(ccr, result, size);
}

/// Masked addition with the full C/V/Z/N (and optionally X) update
fn add_with_flags(ccr: &mut Ccr, a: C::Long, b: C::Long, size: Size, set_x: bool) -> C::Long {
    let mask = size.mask();
    let (a, b) = (a & mask, b & mask);
    let result = a.wrapping_add(b) & mask;
    let carry = u64::from(a) + u64::from(b) > u64::from(mask);
    let overflow = !(a ^ b) & (a ^ result) & size.msb() != 0;
    ccr.set(Ccr::CARRY, carry);
    ccr.set(Ccr::OVERFLOW, overflow);
    if set_x {
        ccr.set(Ccr::EXTEND, carry);
    }
    set_nz(ccr, result, size);
    result
}

/// Masked subtraction (`dst - src`) with borrow semantics for C
fn sub_with_flags(ccr: &mut Ccr, dst: C::Long, src: C::Long, size: Size, set_x: bool) -> C::Long {
    let mask = size.mask();
    let (dst, src) = (dst & mask, src & mask);
    let result = dst.wrapping_sub(src) & mask;
    let borrow = src > dst;
    let overflow = (dst ^ src) & (dst ^ result) & size.msb() != 0;
    ccr.set(Ccr::CARRY, borrow);
    ccr.set(Ccr::OVERFLOW, overflow);
    if set_x {
        ccr.set(Ccr::EXTEND, borrow);
    }
    set_nz(ccr, result, size);
    result
}

#[derive(Clone, Copy)]
enum ShiftKind {
    LogicalLeft,
    LogicalRight,
    ArithmeticLeft,
    ArithmeticRight,
    RotateLeft,
    RotateRight,
}

impl ShiftKind {
    const fn is_rotate(self) -> bool {
        matches!(self, ShiftKind::RotateLeft | ShiftKind::RotateRight)
    }
}

/// One shift or rotate on a data register
///
/// The shift count is taken modulo 64, as on the real processor; each step
/// moves one bit so the last bit shifted out lands in C (and X for shifts).
fn shift(
    machine: &mut Machine,
    kind: ShiftKind,
    size: Size,
    count: &Operand,
    register: u8,
) -> Result<(), Exception> {
    let count = machine.read_operand(count, Size::Long)? % 64;
    let mask = size.mask();
    let msb = size.msb();

    let mut value = machine.registers.get(Reg::Data(register), size);
    let mut carry = false;
    let mut overflow = false;

    for _ in 0..count {
        value = match kind {
            ShiftKind::LogicalLeft | ShiftKind::ArithmeticLeft => {
                carry = value & msb != 0;
                let next = (value << 1) & mask;
                overflow |= (value ^ next) & msb != 0;
                next
            }
            ShiftKind::LogicalRight => {
                carry = value & 1 != 0;
                value >> 1
            }
            ShiftKind::ArithmeticRight => {
                carry = value & 1 != 0;
                (value >> 1) | (value & msb)
            }
            ShiftKind::RotateLeft => {
                carry = value & msb != 0;
                ((value << 1) & mask) | C::Long::from(carry)
            }
            ShiftKind::RotateRight => {
                carry = value & 1 != 0;
                (value >> 1) | if carry { msb } else { 0 }
            }
        };
    }

    machine.ccr.set(Ccr::CARRY, carry);
    machine.ccr.set(
        Ccr::OVERFLOW,
        matches!(kind, ShiftKind::ArithmeticLeft) && overflow,
    );
    if count != 0 && !kind.is_rotate() {
        machine.ccr.set(Ccr::EXTEND, carry);
    }
    set_nz(&mut machine.ccr, value, size);

    machine.registers.set(Reg::Data(register), size, value);
    Ok(())
}

#[derive(Clone, Copy)]
enum BitOp {
    Test,
    Change,
    Clear,
    Set,
}

/// Bit test/modify: long on registers, byte in memory; only Z is affected
fn bit_op(
    machine: &mut Machine,
    op: BitOp,
    number: &Operand,
    destination: &Operand,
) -> Result<(), Exception> {
    let number = machine.read_operand(number, Size::Long)?;

    let (location, size) = if let Operand::DataRegister(n) = destination {
        (super::operands::Location::Register(Reg::Data(*n)), Size::Long)
    } else {
        (machine.resolve(destination, Size::Byte)?, Size::Byte)
    };

    let bit = number % (size.bytes() * 8);
    let mask = 1 << bit;
    let value = machine.read(location, size)?;
    machine.ccr.set(Ccr::ZERO, value & mask == 0);

    let result = match op {
        BitOp::Test => return Ok(()),
        BitOp::Change => value ^ mask,
        BitOp::Clear => value & !mask,
        BitOp::Set => value | mask,
    };
    machine.write(location, size, result)
}

/// Read a NUL-terminated string out of guest memory
fn read_string(machine: &Machine, mut address: C::Address) -> Result<String, Exception> {
    let mut out = String::new();
    loop {
        let byte = machine.memory.read_byte(address)?;
        if byte == 0 {
            return Ok(out);
        }
        out.push(char::from(byte));
        address = address.wrapping_add(1);
    }
}

/// Build the interrupt for a host trap from the machine state
///
/// This is the request-publishing half of the trap: everything the request
/// needs (task number, display values, string contents) is captured here;
/// the result-writing half runs when the host answers.
fn publish_trap(machine: &Machine) -> Result<Interrupt, Exception> {
    let task = machine.registers.get(Reg::Data(0), Size::Word) as u16;
    match task {
        0 => {
            let a1 = machine.registers.get(Reg::Addr(1), Size::Long);
            Ok(Interrupt::DisplayStringWithCrLf(read_string(machine, a1)?))
        }
        1 => {
            let a1 = machine.registers.get(Reg::Addr(1), Size::Long);
            Ok(Interrupt::DisplayString(read_string(machine, a1)?))
        }
        2 => Ok(Interrupt::ReadKeyboardString),
        3 => {
            let value = machine.registers.get(Reg::Data(1), Size::Long) as i32;
            Ok(Interrupt::DisplayNumber(value))
        }
        4 => Ok(Interrupt::ReadNumber),
        5 => Ok(Interrupt::ReadChar),
        6 => {
            let value = machine.registers.get(Reg::Data(1), Size::Byte) as u8;
            Ok(Interrupt::DisplayChar(char::from(value)))
        }
        8 => Ok(Interrupt::GetTime),
        9 => Ok(Interrupt::Terminate),
        task => Err(Exception::UnknownTrapTask { task }),
    }
}

impl Instruction {
    /// Execute the instruction against the machine state
    ///
    /// The program counter has already been advanced past this instruction;
    /// control-flow instructions overwrite it. A returned interrupt means
    /// the instruction suspended between its request and result halves.
    #[allow(clippy::too_many_lines)]
    pub(crate) fn execute(&self, machine: &mut Machine) -> Result<Option<Interrupt>, Exception> {
        use Instruction as I;

        match self {
            I::Move(size, src, dst) => {
                let value = machine.read_operand(src, *size)?;

                if let Operand::AddressRegister(n) = dst {
                    // movea: a word source is sign-extended, flags untouched
                    let value = if *size == Size::Word {
                        sign_extend(value, Size::Word) as C::Long
                    } else {
                        value
                    };
                    machine.registers.set(Reg::Addr(*n), Size::Long, value);
                } else {
                    let location = machine.resolve(dst, *size)?;
                    machine.write(location, *size, value)?;
                    set_logic_flags(&mut machine.ccr, value, *size);
                }
            }

            I::Add(size, src, dst) => {
                let value = machine.read_operand(src, *size)?;
                let location = machine.resolve(dst, *size)?;
                let current = machine.read(location, *size)?;
                let result = add_with_flags(&mut machine.ccr, current, value, *size, true);
                debug!("{} + {} = {}", current, value, result);
                machine.write(location, *size, result)?;
            }

            I::Sub(size, src, dst) => {
                let value = machine.read_operand(src, *size)?;
                let location = machine.resolve(dst, *size)?;
                let current = machine.read(location, *size)?;
                let result = sub_with_flags(&mut machine.ccr, current, value, *size, true);
                debug!("{} - {} = {}", current, value, result);
                machine.write(location, *size, result)?;
            }

            I::Adda(size, src, register) => {
                let value = machine.read_operand(src, *size)?;
                let value = sign_extend(value, *size) as C::Long;
                let reg = Reg::Addr(*register);
                let current = machine.registers.get(reg, Size::Long);
                machine
                    .registers
                    .set(reg, Size::Long, current.wrapping_add(value));
            }

            I::Suba(size, src, register) => {
                let value = machine.read_operand(src, *size)?;
                let value = sign_extend(value, *size) as C::Long;
                let reg = Reg::Addr(*register);
                let current = machine.registers.get(reg, Size::Long);
                machine
                    .registers
                    .set(reg, Size::Long, current.wrapping_sub(value));
            }

            I::Neg(size, dst) => {
                let location = machine.resolve(dst, *size)?;
                let value = machine.read(location, *size)?;
                let result = sub_with_flags(&mut machine.ccr, 0, value, *size, true);
                machine.write(location, *size, result)?;
            }

            I::Ext(size, register) => {
                let reg = Reg::Data(*register);
                let (from, to) = match size {
                    Size::Word => (Size::Byte, Size::Word),
                    _ => (Size::Word, Size::Long),
                };
                let value = machine.registers.get(reg, from);
                let extended = sign_extend(value, from) as C::Long;
                machine.registers.set(reg, to, extended);
                set_logic_flags(&mut machine.ccr, extended, to);
            }

            I::Clr(size, dst) => {
                let location = machine.resolve(dst, *size)?;
                machine.write(location, *size, 0)?;
                set_logic_flags(&mut machine.ccr, 0, *size);
            }

            I::Mulu(src, register) => {
                let a = machine.read_operand(src, Size::Word)?;
                let b = machine.registers.get(Reg::Data(*register), Size::Word);
                let product = a * b;
                debug!("{} * {} = {}", a, b, product);
                machine
                    .registers
                    .set(Reg::Data(*register), Size::Long, product);
                set_logic_flags(&mut machine.ccr, product, Size::Long);
            }

            I::Muls(src, register) => {
                let a = sign_extend(machine.read_operand(src, Size::Word)?, Size::Word);
                let b = sign_extend(
                    machine.registers.get(Reg::Data(*register), Size::Word),
                    Size::Word,
                );
                let product = a.wrapping_mul(b) as C::Long;
                debug!("{} * {} = {}", a, b, product as i32);
                machine
                    .registers
                    .set(Reg::Data(*register), Size::Long, product);
                set_logic_flags(&mut machine.ccr, product, Size::Long);
            }

            I::Divu(src, register) => {
                let divisor = machine.read_operand(src, Size::Word)?;
                if divisor == 0 {
                    return Err(Exception::DivisionByZero);
                }
                let dividend = machine.registers.get(Reg::Data(*register), Size::Long);
                let quotient = dividend / divisor;
                let remainder = dividend % divisor;
                machine.ccr.set(Ccr::CARRY, false);
                if quotient > 0xFFFF {
                    // Quotient overflow: destination untouched
                    machine.ccr.set(Ccr::OVERFLOW, true);
                } else {
                    machine.ccr.set(Ccr::OVERFLOW, false);
                    set_nz(&mut machine.ccr, quotient, Size::Word);
                    machine.registers.set(
                        Reg::Data(*register),
                        Size::Long,
                        (remainder << 16) | quotient,
                    );
                }
            }

            I::Divs(src, register) => {
                let divisor = sign_extend(machine.read_operand(src, Size::Word)?, Size::Word);
                if divisor == 0 {
                    return Err(Exception::DivisionByZero);
                }
                let dividend =
                    machine.registers.get(Reg::Data(*register), Size::Long) as i32;
                machine.ccr.set(Ccr::CARRY, false);
                match dividend.checked_div(divisor) {
                    Some(quotient) if (-0x8000..=0x7FFF).contains(&quotient) => {
                        let remainder = dividend.wrapping_rem(divisor);
                        machine.ccr.set(Ccr::OVERFLOW, false);
                        set_nz(&mut machine.ccr, quotient as C::Long, Size::Word);
                        machine.registers.set(
                            Reg::Data(*register),
                            Size::Long,
                            (C::Long::from(remainder as u16) << 16)
                                | C::Long::from(quotient as u16),
                        );
                    }
                    // i32::MIN / -1 counts as an overflow too
                    _ => machine.ccr.set(Ccr::OVERFLOW, true),
                }
            }

            I::Cmp(size, src, dst) => {
                let value = machine.read_operand(src, *size)?;
                if let Operand::AddressRegister(n) = dst {
                    // cmpa: the source is sign-extended and the comparison
                    // is always on the full register
                    let value = sign_extend(value, *size) as C::Long;
                    let current = machine.registers.get(Reg::Addr(*n), Size::Long);
                    sub_with_flags(&mut machine.ccr, current, value, Size::Long, false);
                } else {
                    let current = machine.read_operand(dst, *size)?;
                    sub_with_flags(&mut machine.ccr, current, value, *size, false);
                }
            }

            I::Tst(size, dst) => {
                let value = machine.read_operand(dst, *size)?;
                set_logic_flags(&mut machine.ccr, value, *size);
            }

            I::And(size, src, dst) => {
                let value = machine.read_operand(src, *size)?;
                let location = machine.resolve(dst, *size)?;
                let result = machine.read(location, *size)? & value;
                machine.write(location, *size, result)?;
                set_logic_flags(&mut machine.ccr, result, *size);
            }

            I::Or(size, src, dst) => {
                let value = machine.read_operand(src, *size)?;
                let location = machine.resolve(dst, *size)?;
                let result = machine.read(location, *size)? | value;
                machine.write(location, *size, result)?;
                set_logic_flags(&mut machine.ccr, result, *size);
            }

            I::Eor(size, src, dst) => {
                let value = machine.read_operand(src, *size)?;
                let location = machine.resolve(dst, *size)?;
                let result = machine.read(location, *size)? ^ value;
                machine.write(location, *size, result)?;
                set_logic_flags(&mut machine.ccr, result, *size);
            }

            I::Not(size, dst) => {
                let location = machine.resolve(dst, *size)?;
                let result = !machine.read(location, *size)? & size.mask();
                machine.write(location, *size, result)?;
                set_logic_flags(&mut machine.ccr, result, *size);
            }

            I::Lsl(size, count, register) => {
                shift(machine, ShiftKind::LogicalLeft, *size, count, *register)?;
            }
            I::Lsr(size, count, register) => {
                shift(machine, ShiftKind::LogicalRight, *size, count, *register)?;
            }
            I::Asl(size, count, register) => {
                shift(machine, ShiftKind::ArithmeticLeft, *size, count, *register)?;
            }
            I::Asr(size, count, register) => {
                shift(machine, ShiftKind::ArithmeticRight, *size, count, *register)?;
            }
            I::Rol(size, count, register) => {
                shift(machine, ShiftKind::RotateLeft, *size, count, *register)?;
            }
            I::Ror(size, count, register) => {
                shift(machine, ShiftKind::RotateRight, *size, count, *register)?;
            }

            I::Btst(number, dst) => bit_op(machine, BitOp::Test, number, dst)?,
            I::Bchg(number, dst) => bit_op(machine, BitOp::Change, number, dst)?,
            I::Bclr(number, dst) => bit_op(machine, BitOp::Clear, number, dst)?,
            I::Bset(number, dst) => bit_op(machine, BitOp::Set, number, dst)?,

            I::Lea(src, register) => {
                let address = machine.effective_address(src)?;
                machine
                    .registers
                    .set(Reg::Addr(*register), Size::Long, address);
            }

            I::Pea(src) => {
                let address = machine.effective_address(src)?;
                machine.push_long(address)?;
            }

            I::Exg(x, y) => {
                let a = machine.registers.get(*x, Size::Long);
                let b = machine.registers.get(*y, Size::Long);
                machine.registers.set(*x, Size::Long, b);
                machine.registers.set(*y, Size::Long, a);
            }

            I::Swap(register) => {
                let reg = Reg::Data(*register);
                let value = machine.registers.get(reg, Size::Long);
                let result = value.rotate_left(16);
                machine.registers.set(reg, Size::Long, result);
                set_logic_flags(&mut machine.ccr, result, Size::Long);
            }

            I::Jmp(target) => {
                let address = machine.effective_address(target)?;
                debug!("jumping to address {:#x}", address);
                machine.pc = address;
            }

            I::Jsr(target) => {
                let address = machine.effective_address(target)?;
                machine.push_long(machine.pc)?;
                debug!("calling subroutine at {:#x}", address);
                machine.pc = address;
            }

            I::Rts => {
                let address = machine.pop_long()?;
                debug!("returning to {:#x}", address);
                machine.pc = address;
            }

            I::Bra(address) => {
                machine.pc = *address;
            }

            I::Bsr(address) => {
                machine.push_long(machine.pc)?;
                machine.pc = *address;
            }

            I::Bcc(condition, address) => {
                if condition.evaluate(machine.ccr) {
                    debug!("branch {} taken to {:#x}", condition, address);
                    machine.pc = *address;
                }
            }

            I::Dbcc(condition, register, address) => {
                if !condition.evaluate(machine.ccr) {
                    let reg = Reg::Data(*register);
                    let counter = machine.registers.get(reg, Size::Word).wrapping_sub(1)
                        & 0xFFFF;
                    machine.registers.set(reg, Size::Word, counter);
                    if counter != 0xFFFF {
                        machine.pc = *address;
                    }
                }
            }

            I::Scc(condition, dst) => {
                let location = machine.resolve(dst, Size::Byte)?;
                let value = if condition.evaluate(machine.ccr) {
                    0xFF
                } else {
                    0x00
                };
                machine.write(location, Size::Byte, value)?;
            }

            I::Trap(vector) => {
                if *vector != C::HOST_TRAP_VECTOR {
                    return Err(Exception::UnsupportedTrapVector { vector: *vector });
                }
                return publish_trap(machine).map(Some);
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::runtime::memory::Memory;
    use crate::runtime::registers::Registers;

    fn machine() -> Machine {
        Machine {
            registers: Registers::default(),
            ccr: Ccr::empty(),
            memory: Memory::new(0x100),
            pc: 0,
        }
    }

    #[test]
    fn add_flag_boundary_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 0x7FFF_FFFF);

        let inst = Instruction::Add(
            Size::Long,
            Operand::Immediate(1),
            Operand::DataRegister(0),
        );
        inst.execute(&mut m).unwrap();

        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0x8000_0000);
        assert!(m.ccr.contains(Ccr::OVERFLOW));
        assert!(m.ccr.contains(Ccr::NEGATIVE));
        assert!(!m.ccr.contains(Ccr::ZERO));
        assert!(!m.ccr.contains(Ccr::CARRY));
    }

    #[test]
    fn add_carry_and_extend_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 0xFFFF_FFFF);

        Instruction::Add(Size::Long, Operand::Immediate(1), Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();

        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0);
        assert!(m.ccr.contains(Ccr::CARRY));
        assert!(m.ccr.contains(Ccr::EXTEND));
        assert!(m.ccr.contains(Ccr::ZERO));
        assert!(!m.ccr.contains(Ccr::OVERFLOW));
    }

    #[test]
    fn byte_add_preserves_upper_bits_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(2), Size::Long, 0x1234_56FF);

        Instruction::Add(Size::Byte, Operand::Immediate(1), Operand::DataRegister(2))
            .execute(&mut m)
            .unwrap();

        assert_eq!(m.registers.get(Reg::Data(2), Size::Long), 0x1234_5600);
        assert!(m.ccr.contains(Ccr::CARRY));
        assert!(m.ccr.contains(Ccr::ZERO));
    }

    #[test]
    fn sub_borrow_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Word, 3);

        Instruction::Sub(Size::Word, Operand::Immediate(5), Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();

        assert_eq!(m.registers.get(Reg::Data(0), Size::Word), 0xFFFE);
        assert!(m.ccr.contains(Ccr::CARRY));
        assert!(m.ccr.contains(Ccr::NEGATIVE));
        assert!(!m.ccr.contains(Ccr::OVERFLOW));
    }

    #[test]
    fn cmp_leaves_destination_and_extend_test() {
        let mut m = machine();
        m.ccr.set(Ccr::EXTEND, true);
        m.registers.set(Reg::Data(1), Size::Long, 7);

        Instruction::Cmp(Size::Long, Operand::Immediate(7), Operand::DataRegister(1))
            .execute(&mut m)
            .unwrap();

        assert_eq!(m.registers.get(Reg::Data(1), Size::Long), 7);
        assert!(m.ccr.contains(Ccr::ZERO));
        // cmp never touches X
        assert!(m.ccr.contains(Ccr::EXTEND));
    }

    #[test]
    fn neg_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 5);

        Instruction::Neg(Size::Long, Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();

        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0xFFFF_FFFB);
        assert!(m.ccr.contains(Ccr::CARRY));
        assert!(m.ccr.contains(Ccr::NEGATIVE));
    }

    #[test]
    fn movea_sign_extends_word_test() {
        let mut m = machine();

        Instruction::Move(
            Size::Word,
            Operand::Immediate(0x8000),
            Operand::AddressRegister(0),
        )
        .execute(&mut m)
        .unwrap();

        assert_eq!(m.registers.get(Reg::Addr(0), Size::Long), 0xFFFF_8000);
        // Writes to an address register leave the flags alone
        assert!(!m.ccr.contains(Ccr::NEGATIVE));
        assert!(!m.ccr.contains(Ccr::ZERO));
    }

    #[test]
    fn mulu_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 0xFFFF_0003);

        Instruction::Mulu(Operand::Immediate(0x1000), 0)
            .execute(&mut m)
            .unwrap();

        // Only the low words multiply; the product is a full long
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0x3000);
    }

    #[test]
    fn muls_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Word, 0xFFFF); // -1

        Instruction::Muls(Operand::Immediate(5), 0)
            .execute(&mut m)
            .unwrap();

        assert_eq!(
            m.registers.get(Reg::Data(0), Size::Long) as i32,
            -5_i32
        );
        assert!(m.ccr.contains(Ccr::NEGATIVE));
    }

    #[test]
    fn divu_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 100);

        Instruction::Divu(Operand::Immediate(7), 0)
            .execute(&mut m)
            .unwrap();

        // quotient 14 in the low word, remainder 2 in the high word
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), (2 << 16) | 14);
    }

    #[test]
    fn div_by_zero_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 100);

        let err = Instruction::Divu(Operand::Immediate(0), 0)
            .execute(&mut m)
            .unwrap_err();
        assert_eq!(err, Exception::DivisionByZero);
    }

    #[test]
    fn divu_overflow_leaves_destination_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 0x0010_0000);

        Instruction::Divu(Operand::Immediate(1), 0)
            .execute(&mut m)
            .unwrap();

        assert!(m.ccr.contains(Ccr::OVERFLOW));
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0x0010_0000);
    }

    #[test]
    fn shift_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Word, 0b1000_0000_0000_0001);

        Instruction::Lsl(Size::Word, Operand::Immediate(1), 0)
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Word), 0b10);
        assert!(m.ccr.contains(Ccr::CARRY));
        assert!(m.ccr.contains(Ccr::EXTEND));

        Instruction::Lsr(Size::Word, Operand::Immediate(1), 0)
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Word), 0b1);
        assert!(!m.ccr.contains(Ccr::CARRY));
    }

    #[test]
    fn asr_keeps_sign_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Byte, 0x80);

        Instruction::Asr(Size::Byte, Operand::Immediate(2), 0)
            .execute(&mut m)
            .unwrap();

        assert_eq!(m.registers.get(Reg::Data(0), Size::Byte), 0xE0);
        assert!(m.ccr.contains(Ccr::NEGATIVE));
    }

    #[test]
    fn asl_overflow_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Byte, 0x40);

        Instruction::Asl(Size::Byte, Operand::Immediate(1), 0)
            .execute(&mut m)
            .unwrap();

        // The sign bit changed, so V is set
        assert_eq!(m.registers.get(Reg::Data(0), Size::Byte), 0x80);
        assert!(m.ccr.contains(Ccr::OVERFLOW));
    }

    #[test]
    fn rotate_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Byte, 0b1000_0001);

        Instruction::Rol(Size::Byte, Operand::Immediate(1), 0)
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Byte), 0b0000_0011);
        assert!(m.ccr.contains(Ccr::CARRY));

        Instruction::Ror(Size::Byte, Operand::Immediate(1), 0)
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Byte), 0b1000_0001);
    }

    #[test]
    fn bit_ops_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 0b100);

        Instruction::Btst(Operand::Immediate(2), Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();
        assert!(!m.ccr.contains(Ccr::ZERO));

        Instruction::Bclr(Operand::Immediate(2), Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0);

        Instruction::Bset(Operand::Immediate(33), Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();
        // Bit numbers are modulo 32 on registers
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0b10);
    }

    #[test]
    fn swap_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 0x1234_5678);

        Instruction::Swap(0).execute(&mut m).unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0x5678_1234);
    }

    #[test]
    fn ext_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Long, 0x1111_11F0);

        Instruction::Ext(Size::Word, 0).execute(&mut m).unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0x1111_FFF0);

        Instruction::Ext(Size::Long, 0).execute(&mut m).unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Long), 0xFFFF_FFF0);
    }

    #[test]
    fn dbcc_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Word, 2);
        m.pc = 0x100;

        // Condition false: decrement and branch while the counter is not -1
        Instruction::Dbcc(Condition::False, 0, 0x80)
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.pc, 0x80);
        assert_eq!(m.registers.get(Reg::Data(0), Size::Word), 1);

        Instruction::Dbcc(Condition::False, 0, 0x80)
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Word), 0);

        m.pc = 0x100;
        Instruction::Dbcc(Condition::False, 0, 0x80)
            .execute(&mut m)
            .unwrap();
        // Counter expired: fall through
        assert_eq!(m.pc, 0x100);
        assert_eq!(m.registers.get(Reg::Data(0), Size::Word), 0xFFFF);
    }

    #[test]
    fn scc_test() {
        let mut m = machine();
        m.ccr.set(Ccr::ZERO, true);

        Instruction::Scc(Condition::Equal, Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Byte), 0xFF);

        Instruction::Scc(Condition::NotEqual, Operand::DataRegister(0))
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.registers.get(Reg::Data(0), Size::Byte), 0x00);
    }

    #[test]
    fn jsr_rts_test() {
        let mut m = machine();
        m.registers.set_sp(0x100);
        m.pc = 0x1004;

        Instruction::Jsr(Operand::Absolute(0x2000))
            .execute(&mut m)
            .unwrap();
        assert_eq!(m.pc, 0x2000);
        assert_eq!(m.registers.sp(), 0xFC);

        Instruction::Rts.execute(&mut m).unwrap();
        assert_eq!(m.pc, 0x1004);
        assert_eq!(m.registers.sp(), 0x100);
    }

    #[test]
    fn post_increment_side_effect_test() {
        let mut m = machine();
        m.registers.set(Reg::Addr(0), Size::Long, 0x10);
        m.memory.write_word(0x10, 0x1234).unwrap();

        Instruction::Move(
            Size::Word,
            Operand::PostIncrement(0),
            Operand::DataRegister(0),
        )
        .execute(&mut m)
        .unwrap();

        assert_eq!(m.registers.get(Reg::Data(0), Size::Word), 0x1234);
        assert_eq!(m.registers.get(Reg::Addr(0), Size::Long), 0x12);
    }

    #[test]
    fn pre_decrement_side_effect_test() {
        let mut m = machine();
        m.registers.set(Reg::Addr(0), Size::Long, 0x14);

        Instruction::Move(
            Size::Long,
            Operand::Immediate(0xDEAD_BEEF),
            Operand::PreDecrement(0),
        )
        .execute(&mut m)
        .unwrap();

        assert_eq!(m.registers.get(Reg::Addr(0), Size::Long), 0x10);
        assert_eq!(m.memory.read_long(0x10), Ok(0xDEAD_BEEF));
    }

    #[test]
    fn trap_publishes_interrupt_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Word, 4);

        let interrupt = Instruction::Trap(15).execute(&mut m).unwrap();
        assert_eq!(interrupt, Some(Interrupt::ReadNumber));
    }

    #[test]
    fn trap_reads_display_string_test() {
        let mut m = machine();
        m.memory.load(0x20, b"hi\0").unwrap();
        m.registers.set(Reg::Data(0), Size::Word, 1);
        m.registers.set(Reg::Addr(1), Size::Long, 0x20);

        let interrupt = Instruction::Trap(15).execute(&mut m).unwrap();
        assert_eq!(
            interrupt,
            Some(Interrupt::DisplayString("hi".to_string()))
        );
    }

    #[test]
    fn trap_unknown_task_test() {
        let mut m = machine();
        m.registers.set(Reg::Data(0), Size::Word, 42);

        let err = Instruction::Trap(15).execute(&mut m).unwrap_err();
        assert_eq!(err, Exception::UnknownTrapTask { task: 42 });

        let err = Instruction::Trap(3).execute(&mut m).unwrap_err();
        assert_eq!(err, Exception::UnsupportedTrapVector { vector: 3 });
    }

    #[test]
    fn display_test() {
        let inst = Instruction::Move(
            Size::Long,
            Operand::Immediate(5),
            Operand::DataRegister(0),
        );
        assert_eq!(inst.to_string(), "move.l #5, d0");

        let inst = Instruction::Bcc(Condition::Equal, 0x1008);
        assert_eq!(inst.to_string(), "beq $1008");

        let inst = Instruction::Dbcc(Condition::False, 3, 0x1000);
        assert_eq!(inst.to_string(), "dbf d3, $1000");
    }
}
