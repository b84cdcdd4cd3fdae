//! Compilation: turn an analyzed program into an immutable, addressable
//! instruction sequence plus an initial memory image.
//!
//! Two passes in sequence: [`layout`] assigns addresses and collects the
//! symbol table, then the fill pass here resolves every operand against it
//! and builds the closed runtime [`Instruction`] per line. The compiler
//! assumes the semantic analyzer accepted the source; on unvalidated input
//! it reports the first inconsistency it trips over instead of a curated
//! error list.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::constants as C;
use crate::isa::{Mnemonic, Size};
use crate::parser::{
    DataValue, Directive, InstructionLine, LineContent, Operand as ParsedOperand, Program, Value,
};
use crate::runtime::{Instruction, Operand, Reg};

mod layout;

use self::layout::{resolve, Layout};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("line {line_index}: symbol `{name}` is not defined")]
    UndefinedSymbol { name: String, line_index: usize },

    #[error("line {line_index}: unknown instruction `{mnemonic}`")]
    UnknownMnemonic { mnemonic: String, line_index: usize },

    #[error("line {line_index}: malformed statement")]
    MalformedLine { line_index: usize },

    #[error("line {line_index}: invalid operands")]
    InvalidOperands { line_index: usize },

    #[error("line {line_index}: value out of range")]
    ValueOutOfRange { line_index: usize },

    /// Two instructions were laid out at the same address (an `org` seated
    /// the position over an already-filled slot)
    #[error("line {line_index}: instruction slot at {address:#x} is already filled")]
    MemoryOverlap { address: C::Address, line_index: usize },
}

/// One compiled instruction, tagged with where it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledInstruction {
    /// Start address of the instruction's slot
    pub address: C::Address,

    /// Zero-based source line that produced it
    pub line_index: usize,

    pub instruction: Instruction,
}

/// The immutable output of compilation
///
/// May be shared (via `Arc`) to construct any number of independent
/// interpreters without re-compiling.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    instructions: Vec<CompiledInstruction>,
    address_to_index: HashMap<C::Address, usize>,
    line_to_address: HashMap<usize, C::Address>,
    symbols: HashMap<String, i64>,
    image: Vec<(C::Address, Vec<u8>)>,
    entry: C::Address,
    end: C::Address,
}

impl CompiledProgram {
    /// The ordered instruction sequence
    #[must_use]
    pub fn instructions(&self) -> &[CompiledInstruction] {
        &self.instructions
    }

    /// The instruction whose slot starts at `address`
    ///
    /// Returns `None` for any address that is not an instruction boundary.
    #[must_use]
    pub fn instruction_at(&self, address: C::Address) -> Option<&CompiledInstruction> {
        self.address_to_index
            .get(&address)
            .map(|&index| &self.instructions[index])
    }

    /// The source line of the instruction at `address`
    #[must_use]
    pub fn line_at(&self, address: C::Address) -> Option<usize> {
        self.instruction_at(address).map(|c| c.line_index)
    }

    /// The slot address of the instruction a source line produced
    #[must_use]
    pub fn address_of_line(&self, line_index: usize) -> Option<C::Address> {
        self.line_to_address.get(&line_index).copied()
    }

    /// Label addresses and `equ` constants
    #[must_use]
    pub fn symbols(&self) -> &HashMap<String, i64> {
        &self.symbols
    }

    /// The initial memory image as (address, bytes) chunks
    #[must_use]
    pub fn image(&self) -> &[(C::Address, Vec<u8>)] {
        &self.image
    }

    /// Address execution starts at
    #[must_use]
    pub fn entry(&self) -> C::Address {
        self.entry
    }

    /// One past the last instruction: reaching it is normal termination
    #[must_use]
    pub fn end(&self) -> C::Address {
        self.end
    }
}

/// Fold a resolved value into the unsigned machine width
fn to_long(value: i64) -> C::Long {
    value as C::Long
}

fn convert_operand(
    operand: &ParsedOperand,
    symbols: &HashMap<String, i64>,
    line_index: usize,
) -> Result<Operand, CompileError> {
    Ok(match operand {
        ParsedOperand::DataRegister(n) => Operand::DataRegister(*n),
        ParsedOperand::AddressRegister(n) => Operand::AddressRegister(*n),
        ParsedOperand::Immediate(value) => {
            Operand::Immediate(to_long(resolve(symbols, value, line_index)?))
        }
        ParsedOperand::Indirect(n) => Operand::Indirect(*n),
        ParsedOperand::IndirectDisplacement {
            displacement,
            register,
        } => Operand::IndirectDisplacement {
            displacement: resolve(symbols, displacement, line_index)? as i32,
            register: *register,
        },
        ParsedOperand::PostIncrement(n) => Operand::PostIncrement(*n),
        ParsedOperand::PreDecrement(n) => Operand::PreDecrement(*n),
        ParsedOperand::Absolute(value) => {
            Operand::Absolute(to_long(resolve(symbols, value, line_index)?))
        }
        ParsedOperand::Label(name) => Operand::Absolute(to_long(resolve(
            symbols,
            &Value::Symbol(name.clone()),
            line_index,
        )?)),
    })
}

fn data_register(operand: &Operand, line_index: usize) -> Result<u8, CompileError> {
    match operand {
        Operand::DataRegister(n) => Ok(*n),
        _ => Err(CompileError::InvalidOperands { line_index }),
    }
}

fn address_register(operand: &Operand, line_index: usize) -> Result<u8, CompileError> {
    match operand {
        Operand::AddressRegister(n) => Ok(*n),
        _ => Err(CompileError::InvalidOperands { line_index }),
    }
}

fn any_register(operand: &Operand, line_index: usize) -> Result<Reg, CompileError> {
    match operand {
        Operand::DataRegister(n) => Ok(Reg::Data(*n)),
        Operand::AddressRegister(n) => Ok(Reg::Addr(*n)),
        _ => Err(CompileError::InvalidOperands { line_index }),
    }
}

fn branch_target(operand: &Operand, line_index: usize) -> Result<C::Address, CompileError> {
    match operand {
        Operand::Absolute(address) => Ok(*address),
        _ => Err(CompileError::InvalidOperands { line_index }),
    }
}

/// Build the runtime instruction for one source line
#[allow(clippy::too_many_lines)]
fn build_instruction(
    line: &InstructionLine,
    symbols: &HashMap<String, i64>,
    line_index: usize,
) -> Result<Instruction, CompileError> {
    use Mnemonic as M;

    let mnemonic =
        Mnemonic::resolve(&line.mnemonic).ok_or_else(|| CompileError::UnknownMnemonic {
            mnemonic: line.mnemonic.clone(),
            line_index,
        })?;
    let spec = mnemonic.spec();
    let size = line.size.or(spec.default_size).unwrap_or(Size::Word);

    let operands = line
        .operands
        .iter()
        .map(|operand| convert_operand(operand, symbols, line_index))
        .collect::<Result<Vec<_>, _>>()?;

    let invalid = || CompileError::InvalidOperands { line_index };

    let instruction = match (mnemonic, operands.as_slice()) {
        (M::Move, [src, dst]) => Instruction::Move(size, *src, *dst),
        (M::Add, [src, dst]) => Instruction::Add(size, *src, *dst),
        (M::Sub, [src, dst]) => Instruction::Sub(size, *src, *dst),
        (M::Adda, [src, dst]) => Instruction::Adda(size, *src, address_register(dst, line_index)?),
        (M::Suba, [src, dst]) => Instruction::Suba(size, *src, address_register(dst, line_index)?),
        (M::Neg, [dst]) => Instruction::Neg(size, *dst),
        (M::Ext, [dst]) => Instruction::Ext(size, data_register(dst, line_index)?),
        (M::Clr, [dst]) => Instruction::Clr(size, *dst),
        (M::Mulu, [src, dst]) => Instruction::Mulu(*src, data_register(dst, line_index)?),
        (M::Muls, [src, dst]) => Instruction::Muls(*src, data_register(dst, line_index)?),
        (M::Divu, [src, dst]) => Instruction::Divu(*src, data_register(dst, line_index)?),
        (M::Divs, [src, dst]) => Instruction::Divs(*src, data_register(dst, line_index)?),
        (M::Cmp, [src, dst]) => Instruction::Cmp(size, *src, *dst),
        (M::Tst, [dst]) => Instruction::Tst(size, *dst),
        (M::And, [src, dst]) => Instruction::And(size, *src, *dst),
        (M::Or, [src, dst]) => Instruction::Or(size, *src, *dst),
        (M::Eor, [src, dst]) => Instruction::Eor(size, *src, *dst),
        (M::Not, [dst]) => Instruction::Not(size, *dst),
        (M::Lsl, [count, dst]) => Instruction::Lsl(size, *count, data_register(dst, line_index)?),
        (M::Lsr, [count, dst]) => Instruction::Lsr(size, *count, data_register(dst, line_index)?),
        (M::Asl, [count, dst]) => Instruction::Asl(size, *count, data_register(dst, line_index)?),
        (M::Asr, [count, dst]) => Instruction::Asr(size, *count, data_register(dst, line_index)?),
        (M::Rol, [count, dst]) => Instruction::Rol(size, *count, data_register(dst, line_index)?),
        (M::Ror, [count, dst]) => Instruction::Ror(size, *count, data_register(dst, line_index)?),
        (M::Btst, [number, dst]) => Instruction::Btst(*number, *dst),
        (M::Bchg, [number, dst]) => Instruction::Bchg(*number, *dst),
        (M::Bclr, [number, dst]) => Instruction::Bclr(*number, *dst),
        (M::Bset, [number, dst]) => Instruction::Bset(*number, *dst),
        (M::Lea, [src, dst]) => Instruction::Lea(*src, address_register(dst, line_index)?),
        (M::Pea, [src]) => Instruction::Pea(*src),
        (M::Exg, [x, y]) => Instruction::Exg(
            any_register(x, line_index)?,
            any_register(y, line_index)?,
        ),
        (M::Swap, [dst]) => Instruction::Swap(data_register(dst, line_index)?),
        (M::Jmp, [target]) => Instruction::Jmp(*target),
        (M::Jsr, [target]) => Instruction::Jsr(*target),
        (M::Rts, []) => Instruction::Rts,
        (M::Bra, [target]) => Instruction::Bra(branch_target(target, line_index)?),
        (M::Bsr, [target]) => Instruction::Bsr(branch_target(target, line_index)?),
        (M::Bcc(condition), [target]) => {
            Instruction::Bcc(condition, branch_target(target, line_index)?)
        }
        (M::Dbcc(condition), [counter, target]) => Instruction::Dbcc(
            condition,
            data_register(counter, line_index)?,
            branch_target(target, line_index)?,
        ),
        (M::Scc(condition), [dst]) => Instruction::Scc(condition, *dst),
        (M::Trap, [vector]) => match vector {
            Operand::Immediate(vector) => Instruction::Trap(*vector as u8),
            _ => return Err(invalid()),
        },
        _ => return Err(invalid()),
    };

    Ok(instruction)
}

/// Encode one `dc` element into big-endian bytes of the directive's width
fn push_element(bytes: &mut Vec<u8>, size: Size, value: C::Long) {
    match size {
        Size::Byte => bytes.push((value & 0xFF) as u8),
        Size::Word => bytes.extend_from_slice(&((value & 0xFFFF) as u16).to_be_bytes()),
        Size::Long => bytes.extend_from_slice(&value.to_be_bytes()),
    }
}

fn encode_data(
    values: &[DataValue],
    size: Size,
    symbols: &HashMap<String, i64>,
    line_index: usize,
) -> Result<Vec<u8>, CompileError> {
    let mut bytes = Vec::new();
    for value in values {
        match value {
            DataValue::String(text) => {
                for c in text.chars() {
                    push_element(&mut bytes, size, C::Long::from(c));
                }
            }
            DataValue::Number(value) => {
                push_element(&mut bytes, size, to_long(resolve(symbols, value, line_index)?));
            }
        }
    }
    Ok(bytes)
}

/// Compile an analyzed program
///
/// Precondition: [`crate::analyzer::analyze`] returned no errors. The
/// output is immutable and may back any number of interpreters.
///
/// # Errors
///
/// On source the analyzer would have rejected, compilation fails with the
/// first inconsistency found.
#[tracing::instrument(skip(program))]
pub fn compile(program: &Program) -> Result<CompiledProgram, CompileError> {
    let Layout {
        symbols,
        slots,
        data,
        entry,
        end,
    } = self::layout::layout_memory(program)?;

    // Fill pass: every symbol is known now
    let mut image = Vec::with_capacity(data.len());
    for block in &data {
        let line = program
            .line(block.line_index)
            .ok_or(CompileError::MalformedLine {
                line_index: block.line_index,
            })?;
        let LineContent::Directive(Directive::DefineConstants { size, values }) = &line.content
        else {
            return Err(CompileError::MalformedLine {
                line_index: block.line_index,
            });
        };
        let bytes = encode_data(values, *size, &symbols, block.line_index)?;
        image.push((block.address, bytes));
    }

    let mut instructions = Vec::with_capacity(slots.len());
    let mut address_to_index = HashMap::with_capacity(slots.len());
    let mut line_to_address = HashMap::with_capacity(slots.len());

    for slot in &slots {
        let line = program
            .line(slot.line_index)
            .ok_or(CompileError::MalformedLine {
                line_index: slot.line_index,
            })?;
        let LineContent::Instruction(instruction_line) = &line.content else {
            return Err(CompileError::MalformedLine {
                line_index: slot.line_index,
            });
        };

        let instruction = build_instruction(instruction_line, &symbols, slot.line_index)?;
        debug!(address = slot.address, %instruction, "compiled");

        if address_to_index
            .insert(slot.address, instructions.len())
            .is_some()
        {
            return Err(CompileError::MemoryOverlap {
                address: slot.address,
                line_index: slot.line_index,
            });
        }
        line_to_address.insert(slot.line_index, slot.address);
        instructions.push(CompiledInstruction {
            address: slot.address,
            line_index: slot.line_index,
            instruction,
        });
    }

    Ok(CompiledProgram {
        instructions,
        address_to_index,
        line_to_address,
        symbols,
        image,
        entry,
        end,
    })
}
