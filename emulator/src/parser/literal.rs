//! Parse number, character and string literals.
//!
//! Numbers use the assembler prefixes: `$` for base 16, `@` for base 8,
//! `%` for base 2, no prefix for base 10. A quoted single character is a
//! number too (its code point).

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, none_of},
    combinator::{map, map_res, opt},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_hex_digit(c: char) -> bool {
    c.is_ascii_hexdigit()
}

fn is_oct_digit(c: char) -> bool {
    ('0'..='7').contains(&c)
}

fn is_bin_digit(c: char) -> bool {
    c == '0' || c == '1'
}

fn from_decimal(input: &str) -> Result<i64, std::num::ParseIntError> {
    input.parse::<u32>().map(i64::from)
}

fn from_hexadecimal(input: &str) -> Result<i64, std::num::ParseIntError> {
    u32::from_str_radix(input, 16).map(i64::from)
}

fn from_octal(input: &str) -> Result<i64, std::num::ParseIntError> {
    u32::from_str_radix(input, 8).map(i64::from)
}

fn from_binary(input: &str) -> Result<i64, std::num::ParseIntError> {
    u32::from_str_radix(input, 2).map(i64::from)
}

/// Parse a `$`-prefixed hexadecimal literal
pub(crate) fn parse_hexadecimal(input: &str) -> IResult<&str, i64> {
    map_res(
        preceded(char('$'), take_while1(is_hex_digit)),
        from_hexadecimal,
    )(input)
}

/// Parse an `@`-prefixed octal literal
fn parse_octal(input: &str) -> IResult<&str, i64> {
    map_res(preceded(char('@'), take_while1(is_oct_digit)), from_octal)(input)
}

/// Parse a `%`-prefixed binary literal
fn parse_binary(input: &str) -> IResult<&str, i64> {
    map_res(preceded(char('%'), take_while1(is_bin_digit)), from_binary)(input)
}

/// Parse a quoted character as its code point
fn parse_char(input: &str) -> IResult<&str, i64> {
    map(delimited(char('\''), none_of("'"), char('\'')), |c| {
        i64::from(u32::from(c))
    })(input)
}

/// Parse an unsigned number literal in any of the supported bases
pub(crate) fn parse_number_literal(input: &str) -> IResult<&str, i64> {
    alt((
        parse_hexadecimal,
        parse_octal,
        parse_binary,
        parse_char,
        map_res(take_while1(is_digit), from_decimal),
    ))(input)
}

/// Parse an optionally negated number literal
pub(crate) fn parse_signed_number(input: &str) -> IResult<&str, i64> {
    let (input, sign) = opt(char('-'))(input)?;
    let (input, magnitude) = parse_number_literal(input)?;
    Ok((
        input,
        if sign.is_some() { -magnitude } else { magnitude },
    ))
}

/// Parse a single- or double-quoted string literal
pub(crate) fn parse_string_literal(input: &str) -> IResult<&str, String> {
    let single = delimited(
        char('\''),
        map(many0(none_of("'")), |chars| {
            chars.into_iter().collect::<String>()
        }),
        char('\''),
    );
    let double = delimited(
        char('"'),
        map(many0(none_of("\"")), |chars| {
            chars.into_iter().collect::<String>()
        }),
        char('"'),
    );
    alt((single, double))(input)
}
