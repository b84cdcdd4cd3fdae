//! Parse instruction operands and directive arguments.
//!
//! Each operand is handed to [`parse_operand`] as one complete token (the
//! line parser splits at top-level commas first), so every alternative is
//! anchored at both ends and classification is unambiguous.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, satisfy, space0},
    combinator::{all_consuming, map, value},
    sequence::{delimited, preceded, terminated},
    IResult,
};
use parse_display::Display;

use crate::isa::AddressingModeSet;

use super::literal::{parse_hexadecimal, parse_signed_number, parse_string_literal};
use super::parse_identifier;

/// A numeric value as written in the source: either a literal or a symbol
/// (label or `equ` constant) to be resolved at compile time
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Value {
    #[display("{0}")]
    Literal(i64),

    #[display("{0}")]
    Symbol(String),
}

impl Value {
    /// The symbol this value references, if it is not a literal
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Value::Literal(_) => None,
            Value::Symbol(name) => Some(name),
        }
    }
}

/// One `dc` directive argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataValue {
    Number(Value),
    String(String),
}

/// A parsed instruction operand, before symbol resolution
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Operand {
    #[display("d{0}")]
    DataRegister(u8),

    #[display("a{0}")]
    AddressRegister(u8),

    #[display("#{0}")]
    Immediate(Value),

    #[display("(a{0})")]
    Indirect(u8),

    #[display("{displacement}(a{register})")]
    IndirectDisplacement { displacement: Value, register: u8 },

    #[display("(a{0})+")]
    PostIncrement(u8),

    #[display("-(a{0})")]
    PreDecrement(u8),

    #[display("${0}")]
    Absolute(Value),

    #[display("{0}")]
    Label(String),
}

impl Operand {
    /// The addressing-mode kind of this operand, as a one-bit set
    ///
    /// Labels count as absolute addresses: they resolve to one at compile
    /// time.
    #[must_use]
    pub fn mode(&self) -> AddressingModeSet {
        use AddressingModeSet as Am;

        match self {
            Operand::DataRegister(_) => Am::DATA_REGISTER,
            Operand::AddressRegister(_) => Am::ADDRESS_REGISTER,
            Operand::Immediate(_) => Am::IMMEDIATE,
            Operand::Indirect(_) => Am::INDIRECT,
            Operand::IndirectDisplacement { .. } => Am::INDIRECT_DISPLACEMENT,
            Operand::PostIncrement(_) => Am::POST_INCREMENT,
            Operand::PreDecrement(_) => Am::PRE_DECREMENT,
            Operand::Absolute(_) | Operand::Label(_) => Am::ABSOLUTE,
        }
    }

    /// Human name of the addressing mode, for diagnostics
    #[must_use]
    pub fn mode_name(&self) -> &'static str {
        match self {
            Operand::DataRegister(_) => "data register",
            Operand::AddressRegister(_) => "address register",
            Operand::Immediate(_) => "immediate",
            Operand::Indirect(_) => "address indirect",
            Operand::IndirectDisplacement { .. } => "indirect with displacement",
            Operand::PostIncrement(_) => "post-increment",
            Operand::PreDecrement(_) => "pre-decrement",
            Operand::Absolute(_) => "absolute address",
            Operand::Label(_) => "label",
        }
    }

    /// The register index this operand uses, if any
    #[must_use]
    pub fn register_index(&self) -> Option<u8> {
        match self {
            Operand::DataRegister(n)
            | Operand::AddressRegister(n)
            | Operand::Indirect(n)
            | Operand::IndirectDisplacement { register: n, .. }
            | Operand::PostIncrement(n)
            | Operand::PreDecrement(n) => Some(*n),
            Operand::Immediate(_) | Operand::Absolute(_) | Operand::Label(_) => None,
        }
    }

    /// The symbol this operand references, if any
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Operand::Immediate(value)
            | Operand::IndirectDisplacement {
                displacement: value,
                ..
            }
            | Operand::Absolute(value) => value.symbol(),
            Operand::Label(name) => Some(name),
            _ => None,
        }
    }
}

fn parse_digit(input: &str) -> IResult<&str, u8> {
    map(satisfy(|c| c.is_ascii_digit()), |c| c as u8 - b'0')(input)
}

/// Parse an address register token: `a0`…`a9` or `sp` (alias for `a7`)
///
/// Out-of-range indices parse fine; the analyzer rejects them with a
/// proper message.
fn parse_address_register(input: &str) -> IResult<&str, u8> {
    alt((
        preceded(tag_no_case("a"), parse_digit),
        value(7, tag_no_case("sp")),
    ))(input)
}

fn parse_register(input: &str) -> IResult<&str, Operand> {
    alt((
        map(preceded(tag_no_case("d"), parse_digit), Operand::DataRegister),
        map(parse_address_register, Operand::AddressRegister),
    ))(input)
}

/// Parse a numeric value: a signed literal or a symbol reference
pub(crate) fn parse_value(input: &str) -> IResult<&str, Value> {
    alt((
        map(parse_signed_number, Value::Literal),
        map(parse_identifier, |name| Value::Symbol(name.to_string())),
    ))(input)
}

/// Parse one `dc` argument: a string literal or a numeric value
pub(crate) fn parse_data_value(input: &str) -> IResult<&str, DataValue> {
    alt((
        map(parse_string_literal, DataValue::String),
        map(parse_value, DataValue::Number),
    ))(input)
}

fn parse_indirect(input: &str) -> IResult<&str, Operand> {
    map(
        delimited(char('('), parse_address_register, char(')')),
        Operand::Indirect,
    )(input)
}

fn parse_post_increment(input: &str) -> IResult<&str, Operand> {
    map(
        terminated(
            delimited(char('('), parse_address_register, char(')')),
            char('+'),
        ),
        Operand::PostIncrement,
    )(input)
}

fn parse_pre_decrement(input: &str) -> IResult<&str, Operand> {
    map(
        preceded(
            char('-'),
            delimited(char('('), parse_address_register, char(')')),
        ),
        Operand::PreDecrement,
    )(input)
}

fn parse_indirect_displacement(input: &str) -> IResult<&str, Operand> {
    let (input, displacement) = parse_value(input)?;
    let (input, register) = delimited(char('('), parse_address_register, char(')'))(input)?;
    Ok((
        input,
        Operand::IndirectDisplacement {
            displacement,
            register,
        },
    ))
}

fn parse_immediate(input: &str) -> IResult<&str, Operand> {
    map(preceded(char('#'), parse_value), Operand::Immediate)(input)
}

fn parse_absolute(input: &str) -> IResult<&str, Operand> {
    // A bare `$hex` token; `$hex(an)` is covered by the displacement form
    map(parse_hexadecimal, |n| Operand::Absolute(Value::Literal(n)))(input)
}

fn parse_label_operand(input: &str) -> IResult<&str, Operand> {
    map(parse_identifier, |name| Operand::Label(name.to_string()))(input)
}

/// Classify and parse one complete operand token
///
/// Ordering matters the same way it does in the original classifier:
/// register forms win over labels, displacement forms win over bare
/// addresses, and anything unclaimed falls through to a label reference.
pub(crate) fn parse_operand(input: &str) -> IResult<&str, Operand> {
    preceded(
        space0,
        alt((
            all_consuming(parse_post_increment),
            all_consuming(parse_pre_decrement),
            all_consuming(parse_indirect),
            all_consuming(parse_indirect_displacement),
            all_consuming(parse_immediate),
            all_consuming(parse_absolute),
            all_consuming(parse_register),
            all_consuming(parse_label_operand),
        )),
    )(input.trim_end())
}
