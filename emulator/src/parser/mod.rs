//! Source parsing logic
//!
//! The parser is line-oriented and total: every line of input produces a
//! [`SourceLine`], and anything that matches no production is kept as an
//! `Unknown` line for the semantic analyzer to report. Token-level parsing
//! is handled by the `nom` library, one submodule per concern.

use nom::bytes::complete::take_while1;
use nom::combinator::verify;
use nom::IResult;
use tracing::debug;

mod line;
mod literal;
mod operand;

pub use self::line::{Directive, InstructionLine, LineContent, Program, SourceLine};
pub use self::operand::{DataValue, Operand, Value};

fn is_identifier_char(c: char) -> bool {
    is_start_identifier_char(c) || c.is_ascii_digit()
}

fn is_start_identifier_char(c: char) -> bool {
    c == '_' || c.is_ascii_lowercase() || c.is_ascii_uppercase()
}

/// Parse a C-like identifier
pub(crate) fn parse_identifier(input: &str) -> IResult<&str, &str> {
    verify(take_while1(is_identifier_char), |f: &str| {
        f.chars()
            .next()
            .filter(|&c| is_start_identifier_char(c))
            .is_some()
    })(input)
}

/// Parse a program, one [`SourceLine`] per input line
///
/// Parsing never fails; malformed lines come back as
/// [`LineContent::Unknown`] and are reported by the semantic analyzer.
#[must_use]
pub fn parse(source: &str) -> Program {
    let lines: Vec<_> = source
        .lines()
        .enumerate()
        .map(|(index, text)| line::parse_line(index, text))
        .collect();
    debug!(lines = lines.len(), "parsed program");
    Program { lines }
}
