//! Memory layout pass.
//!
//! Walks the source lines with a position counter: assigns every
//! instruction a uniform slot, advances over `dc`/`ds` data, re-seats the
//! position on `org`, and records every symbol (label addresses and `equ`
//! constants) into one table. Values that do not feed the layout are left
//! unresolved for the fill pass, so data may reference labels defined
//! later.

use std::collections::HashMap;

use tracing::debug;

use crate::constants as C;
use crate::isa::Size;
use crate::parser::{DataValue, Directive, LineContent, Program, Value};

use super::CompileError;

/// An instruction slot assigned during layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub line_index: usize,
    pub address: C::Address,
}

/// A `dc` directive placed during layout; its bytes are encoded by the
/// fill pass once every symbol is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataBlock {
    pub line_index: usize,
    pub address: C::Address,
}

#[derive(Debug, Default)]
pub(crate) struct Layout {
    /// Label addresses and `equ` constants, one namespace
    pub symbols: HashMap<String, i64>,

    /// Instruction slots in source order
    pub slots: Vec<Slot>,

    /// Placed `dc` directives in source order
    pub data: Vec<DataBlock>,

    /// Address of the first instruction
    pub entry: C::Address,

    /// One past the last instruction slot: reaching it terminates
    pub end: C::Address,
}

/// Resolve a layout-time value against the symbols collected so far
pub(crate) fn resolve(
    symbols: &HashMap<String, i64>,
    value: &Value,
    line_index: usize,
) -> Result<i64, CompileError> {
    match value {
        Value::Literal(literal) => Ok(*literal),
        Value::Symbol(name) => {
            symbols
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::UndefinedSymbol {
                    name: name.clone(),
                    line_index,
                })
        }
    }
}

fn align_even(position: C::Address) -> C::Address {
    position + (position & 1)
}

/// Number of memory elements a `dc` argument occupies
fn element_count(value: &DataValue) -> u32 {
    match value {
        DataValue::Number(_) => 1,
        DataValue::String(text) => u32::try_from(text.chars().count()).unwrap_or(u32::MAX),
    }
}

/// Lay out the program
///
/// Returns the symbol table, the instruction slots, the placed data blocks
/// and the entry/end addresses.
pub(crate) fn layout_memory(program: &Program) -> Result<Layout, CompileError> {
    let mut layout = Layout::default();
    let mut position = C::CODE_START;
    let mut first_instruction: Option<C::Address> = None;

    for line in &program.lines {
        // Word- and long-sized content keeps the position even, the same
        // way the assembler pads ahead of it
        let aligned = match &line.content {
            LineContent::Instruction(_) => align_even(position),
            LineContent::Directive(
                Directive::DefineConstants { size, .. } | Directive::ReserveStorage { size, .. },
            ) if *size != Size::Byte => align_even(position),
            _ => position,
        };
        position = aligned;

        if let Some(label) = &line.label {
            debug!(label = %label, address = position, "placing label");
            layout.symbols.insert(label.clone(), i64::from(position));
        }

        match &line.content {
            LineContent::Empty | LineContent::Unknown => {}

            LineContent::Instruction(_) => {
                layout.slots.push(Slot {
                    line_index: line.index,
                    address: position,
                });
                first_instruction.get_or_insert(position);
                position += C::INSTRUCTION_SIZE;
            }

            LineContent::Directive(directive) => match directive {
                Directive::Origin { address } => {
                    let target = resolve(&layout.symbols, address, line.index)?;
                    position = C::Address::try_from(target).map_err(|_| {
                        CompileError::ValueOutOfRange {
                            line_index: line.index,
                        }
                    })?;
                }

                Directive::Define { name, value } => {
                    let value = resolve(&layout.symbols, value, line.index)?;
                    layout.symbols.insert(name.clone(), value);
                }

                Directive::DefineConstants { size, values } => {
                    layout.data.push(DataBlock {
                        line_index: line.index,
                        address: position,
                    });
                    let count: u32 = values.iter().map(element_count).sum();
                    position += count * size.bytes();
                }

                Directive::ReserveStorage { size, count } => {
                    let count = resolve(&layout.symbols, count, line.index)?;
                    let reserved = u64::try_from(count)
                        .ok()
                        .map(|count| u64::from(position) + count * u64::from(size.bytes()))
                        .and_then(|end| C::Address::try_from(end).ok())
                        .ok_or(CompileError::ValueOutOfRange {
                            line_index: line.index,
                        })?;
                    position = reserved;
                }
            },
        }
    }

    layout.entry = first_instruction.unwrap_or(C::CODE_START);
    layout.end = layout
        .slots
        .last()
        .map_or(layout.entry, |slot| slot.address + C::INSTRUCTION_SIZE);

    debug!(
        entry = layout.entry,
        end = layout.end,
        symbols = layout.symbols.len(),
        "layout complete"
    );
    Ok(layout)
}
