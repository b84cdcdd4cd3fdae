//! Program line parsing.
//!
//! Each source line parses independently: an optional `label:` prefix
//! followed by an instruction, a directive (`org`, `equ`, `dc`, `ds`) or
//! nothing. A line that matches no production becomes
//! [`LineContent::Unknown`] instead of failing, so the semantic analyzer
//! stays the single reporting channel for bad source.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, satisfy, space0, space1},
    combinator::{all_consuming, eof, map, opt, peek},
    sequence::{delimited, preceded, terminated},
    IResult,
};

use crate::isa::Size;

use super::operand::{parse_data_value, parse_operand, parse_value, DataValue, Operand, Value};
use super::parse_identifier;

/// A parsed program: one entry per source line, in order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub lines: Vec<SourceLine>,
}

impl Program {
    #[must_use]
    pub fn line(&self, index: usize) -> Option<&SourceLine> {
        self.lines.get(index)
    }
}

/// One source line with its original text and parsed shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// Zero-based line index
    pub index: usize,

    /// The line as written (without the trailing newline)
    pub text: String,

    /// Label defined on this line, if any
    pub label: Option<String>,

    pub content: LineContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineContent {
    /// Blank line, comment-only line, or a bare label
    Empty,

    Instruction(InstructionLine),

    Directive(Directive),

    /// The line matched no production; reported by the analyzer
    Unknown,
}

/// An instruction as written: the mnemonic is kept as text so the analyzer
/// can report unknown ones with their source spelling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionLine {
    /// Lowercased mnemonic
    pub mnemonic: String,

    /// Explicit size suffix, if one was written
    pub size: Option<Size>,

    pub operands: Vec<Operand>,
}

/// An assembler directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `org value` — re-seat the layout position
    Origin { address: Value },

    /// `name equ value` — define a symbolic constant
    Define { name: String, value: Value },

    /// `dc.size v, v, …` — lay constants into memory
    DefineConstants { size: Size, values: Vec<DataValue> },

    /// `ds.size count` — reserve zeroed storage
    ReserveStorage { size: Size, count: Value },
}

/// Strip the `;` comment from a line, ignoring semicolons inside quotes
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (at, c) in line.char_indices() {
        match (quote, c) {
            (None, ';') => return &line[..at],
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            _ => {}
        }
    }
    line
}

/// Split at top-level commas, ignoring commas inside parentheses or quotes
///
/// The same splitting discipline the original line classifier used: an
/// operand like `4(a0)` or a string like `'a, b'` stays in one piece.
fn split_arguments(input: &str) -> Vec<&str> {
    let mut arguments = Vec::new();
    let mut depth = 0_u32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (at, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                arguments.push(input[start..at].trim());
                start = at + c.len_utf8();
            }
            _ => {}
        }
    }
    arguments.push(input[start..].trim());
    arguments
}

/// Parse an optional `.x` size suffix
fn parse_size_suffix(input: &str) -> IResult<&str, Size> {
    let (input, _) = char('.')(input)?;
    let (input, letter) = satisfy(|c| c.is_ascii_alphabetic())(input)?;
    let size = Size::from_suffix(&letter.to_ascii_lowercase().to_string());
    size.map_or_else(
        || {
            Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::OneOf,
            )))
        },
        |size| Ok((input, size)),
    )
}

/// Parse `label:` at the start of a line
fn parse_label_definition(input: &str) -> IResult<&str, &str> {
    terminated(parse_identifier, preceded(space0, char(':')))(input)
}

/// Parse a `name equ value` definition
fn parse_equ(input: &str) -> IResult<&str, Directive> {
    let (input, name) = parse_identifier(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag_no_case("equ")(input)?;
    let (input, _) = space1(input)?;
    let (input, value) = parse_value(input)?;
    Ok((
        input,
        Directive::Define {
            name: name.to_string(),
            value,
        },
    ))
}

/// Parse an `org value` directive
fn parse_org(input: &str) -> IResult<&str, Directive> {
    let (input, _) = tag_no_case("org")(input)?;
    let (input, _) = space1(input)?;
    let (input, address) = parse_value(input)?;
    Ok((input, Directive::Origin { address }))
}

/// Parse the `dc`/`ds` head: the directive name and its size (word when no
/// suffix is written)
fn parse_storage_head<'a>(
    name: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, Size> {
    move |input| {
        let (input, _) = tag_no_case(name)(input)?;
        let (input, size) = opt(parse_size_suffix)(input)?;
        let (input, _) = space1(input)?;
        Ok((input, size.unwrap_or(Size::Word)))
    }
}

/// Parse a whole `dc` directive with its comma-separated arguments
fn parse_dc(input: &str) -> Option<Directive> {
    let (rest, size) = parse_storage_head("dc")(input).ok()?;
    let values = split_arguments(rest)
        .into_iter()
        .map(|argument| {
            all_consuming(preceded(space0, parse_data_value))(argument.trim_end())
                .ok()
                .map(|(_, value)| value)
        })
        .collect::<Option<Vec<_>>>()?;
    if values.is_empty() {
        return None;
    }
    Some(Directive::DefineConstants { size, values })
}

/// Parse a whole `ds` directive
fn parse_ds(input: &str) -> Option<Directive> {
    let (rest, size) = parse_storage_head("ds")(input).ok()?;
    let (_, count) = all_consuming(delimited(space0, parse_value, space0))(rest).ok()?;
    Some(Directive::ReserveStorage { size, count })
}

/// Parse the `mnemonic[.size]` head of an instruction
///
/// The head must be followed by whitespace or the end of the line, so
/// `move.l#5` does not parse as an instruction.
fn parse_instruction_head(input: &str) -> IResult<&str, (String, Option<Size>)> {
    let (input, mnemonic) = parse_identifier(input)?;
    let (input, size) = opt(parse_size_suffix)(input)?;
    let (input, ()) = peek(alt((map(space1, |_| ()), map(eof, |_| ()))))(input)?;
    Ok((input, (mnemonic.to_lowercase(), size)))
}

/// Parse an instruction line: head plus comma-separated operands
fn parse_instruction(input: &str) -> Option<LineContent> {
    let (rest, (mnemonic, size)) = parse_instruction_head(input).ok()?;
    let rest = rest.trim();

    let operands = if rest.is_empty() {
        Vec::new()
    } else {
        split_arguments(rest)
            .into_iter()
            .map(|argument| parse_operand(argument).ok().map(|(_, operand)| operand))
            .collect::<Option<Vec<Operand>>>()?
    };

    Some(LineContent::Instruction(InstructionLine {
        mnemonic,
        size,
        operands,
    }))
}

/// Parse the content after any label: a directive or an instruction
fn parse_content(input: &str) -> LineContent {
    // org/equ/ds heads are unambiguous; dc/ds argument lists need the
    // comma splitter, so those two run outside nom
    if let Ok((_, directive)) = all_consuming(terminated(parse_org, space0))(input) {
        return LineContent::Directive(directive);
    }
    if let Ok((_, directive)) = all_consuming(terminated(parse_equ, space0))(input) {
        return LineContent::Directive(directive);
    }
    if let Some(directive) = parse_dc(input) {
        return LineContent::Directive(directive);
    }
    if let Some(directive) = parse_ds(input) {
        return LineContent::Directive(directive);
    }
    if let Some(content) = parse_instruction(input) {
        return content;
    }
    LineContent::Unknown
}

/// Parse one source line
pub(crate) fn parse_line(index: usize, text: &str) -> SourceLine {
    let code = strip_comment(text).trim();

    if code.is_empty() {
        return SourceLine {
            index,
            text: text.to_string(),
            label: None,
            content: LineContent::Empty,
        };
    }

    let (rest, label) = match parse_label_definition(code) {
        Ok((rest, label)) => (rest.trim(), Some(label.to_string())),
        Err(_) => (code, None),
    };

    let content = if rest.is_empty() {
        LineContent::Empty
    } else {
        parse_content(rest)
    };

    SourceLine {
        index,
        text: text.to_string(),
        label,
        content,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn content(text: &str) -> LineContent {
        parse_line(0, text).content
    }

    #[test]
    fn empty_and_comment_lines_test() {
        assert_eq!(content(""), LineContent::Empty);
        assert_eq!(content("   "), LineContent::Empty);
        assert_eq!(content("; just a comment"), LineContent::Empty);
        assert_eq!(content("  \t ; indented comment"), LineContent::Empty);
    }

    #[test]
    fn label_test() {
        let line = parse_line(3, "loop:");
        assert_eq!(line.label.as_deref(), Some("loop"));
        assert_eq!(line.content, LineContent::Empty);
        assert_eq!(line.index, 3);

        let line = parse_line(0, "start: move.l #1, d0");
        assert_eq!(line.label.as_deref(), Some("start"));
        assert!(matches!(line.content, LineContent::Instruction(_)));
    }

    #[test]
    fn instruction_test() {
        assert_eq!(
            content("move.l #5, d0"),
            LineContent::Instruction(InstructionLine {
                mnemonic: "move".to_string(),
                size: Some(Size::Long),
                operands: vec![
                    Operand::Immediate(Value::Literal(5)),
                    Operand::DataRegister(0)
                ],
            })
        );

        assert_eq!(
            content("rts"),
            LineContent::Instruction(InstructionLine {
                mnemonic: "rts".to_string(),
                size: None,
                operands: vec![],
            })
        );

        // Mnemonics are case-insensitive and lowercased
        assert_eq!(
            content("MOVE.W d1, d2"),
            LineContent::Instruction(InstructionLine {
                mnemonic: "move".to_string(),
                size: Some(Size::Word),
                operands: vec![Operand::DataRegister(1), Operand::DataRegister(2)],
            })
        );
    }

    #[test]
    fn instruction_with_comment_test() {
        assert_eq!(
            content("add.w d0, d1 ; accumulate"),
            LineContent::Instruction(InstructionLine {
                mnemonic: "add".to_string(),
                size: Some(Size::Word),
                operands: vec![Operand::DataRegister(0), Operand::DataRegister(1)],
            })
        );
    }

    #[test]
    fn parenthesized_operand_split_test() {
        assert_eq!(
            content("move.w 4(a0), d0"),
            LineContent::Instruction(InstructionLine {
                mnemonic: "move".to_string(),
                size: Some(Size::Word),
                operands: vec![
                    Operand::IndirectDisplacement {
                        displacement: Value::Literal(4),
                        register: 0
                    },
                    Operand::DataRegister(0)
                ],
            })
        );
    }

    #[test]
    fn org_test() {
        assert_eq!(
            content("org $2000"),
            LineContent::Directive(Directive::Origin {
                address: Value::Literal(0x2000)
            })
        );
    }

    #[test]
    fn equ_test() {
        assert_eq!(
            content("limit equ 100"),
            LineContent::Directive(Directive::Define {
                name: "limit".to_string(),
                value: Value::Literal(100)
            })
        );
        assert_eq!(
            content("screen EQU $8000"),
            LineContent::Directive(Directive::Define {
                name: "screen".to_string(),
                value: Value::Literal(0x8000)
            })
        );
    }

    #[test]
    fn dc_test() {
        assert_eq!(
            content("dc.b 'hi', 0"),
            LineContent::Directive(Directive::DefineConstants {
                size: Size::Byte,
                values: vec![
                    DataValue::String("hi".to_string()),
                    DataValue::Number(Value::Literal(0))
                ],
            })
        );

        // No suffix defaults to word
        assert_eq!(
            content("dc 1, 2, 3"),
            LineContent::Directive(Directive::DefineConstants {
                size: Size::Word,
                values: vec![
                    DataValue::Number(Value::Literal(1)),
                    DataValue::Number(Value::Literal(2)),
                    DataValue::Number(Value::Literal(3))
                ],
            })
        );

        // A comma inside a string is not a separator
        assert_eq!(
            content("dc.b 'a, b', 0"),
            LineContent::Directive(Directive::DefineConstants {
                size: Size::Byte,
                values: vec![
                    DataValue::String("a, b".to_string()),
                    DataValue::Number(Value::Literal(0))
                ],
            })
        );
    }

    #[test]
    fn ds_test() {
        assert_eq!(
            content("ds.w 10"),
            LineContent::Directive(Directive::ReserveStorage {
                size: Size::Word,
                count: Value::Literal(10)
            })
        );
        assert_eq!(
            content("ds.b size"),
            LineContent::Directive(Directive::ReserveStorage {
                size: Size::Byte,
                count: Value::Symbol("size".to_string())
            })
        );
    }

    #[test]
    fn unknown_lines_test() {
        assert_eq!(content("move.q #1, d0"), LineContent::Unknown); // bad size
        assert_eq!(content("move.l #1,"), LineContent::Unknown); // dangling comma
        assert_eq!(content("move.l#1, d0"), LineContent::Unknown); // no space
        assert_eq!(content("dc.b"), LineContent::Unknown); // no arguments
        assert_eq!(content("12345"), LineContent::Unknown);
    }

    #[test]
    fn semicolon_inside_string_test() {
        assert_eq!(
            content("dc.b 'a;b', 0"),
            LineContent::Directive(Directive::DefineConstants {
                size: Size::Byte,
                values: vec![
                    DataValue::String("a;b".to_string()),
                    DataValue::Number(Value::Literal(0))
                ],
            })
        );
    }
}
