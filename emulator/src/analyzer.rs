//! Semantic validation.
//!
//! [`analyze`] is a pure function of the parsed source: it walks the lines
//! in order, collects every violation instead of stopping at the first,
//! and returns the ordered error list. An empty list means the program is
//! accepted and safe to hand to the compiler.

use std::collections::HashMap;

use crate::isa::Mnemonic;
use crate::parser::{
    DataValue, Directive, InstructionLine, LineContent, Program, SourceLine, Value,
};

/// One semantic violation, tied to its zero-based source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticError {
    message: String,
    line_index: usize,
}

impl SemanticError {
    fn new(line_index: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line_index,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Zero-based index of the offending source line
    #[must_use]
    pub fn line_index(&self) -> usize {
        self.line_index
    }
}

impl std::fmt::Display for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line_index, self.message)
    }
}

/// First definition site of every symbol (labels and `equ` names)
fn collect_symbols(program: &Program) -> HashMap<&str, usize> {
    let mut symbols: HashMap<&str, usize> = HashMap::new();

    for line in &program.lines {
        if let Some(label) = &line.label {
            symbols.entry(label.as_str()).or_insert(line.index);
        }
        if let LineContent::Directive(Directive::Define { name, .. }) = &line.content {
            symbols.entry(name.as_str()).or_insert(line.index);
        }
    }

    symbols
}

struct Analyzer<'a> {
    symbols: HashMap<&'a str, usize>,
    errors: Vec<SemanticError>,
}

impl<'a> Analyzer<'a> {
    fn error(&mut self, line_index: usize, message: impl Into<String>) {
        self.errors.push(SemanticError::new(line_index, message));
    }

    /// A symbol reference that may point anywhere in the program
    fn check_symbol(&mut self, line_index: usize, name: &str) {
        if !self.symbols.contains_key(name) {
            self.error(line_index, format!("symbol `{name}` is not defined"));
        }
    }

    /// A symbol reference that feeds the memory layout: it must be defined
    /// on an earlier line, or the layout position would be undecidable
    fn check_layout_symbol(&mut self, line_index: usize, value: &Value) {
        let Some(name) = value.symbol() else { return };
        match self.symbols.get(name) {
            None => self.error(line_index, format!("symbol `{name}` is not defined")),
            Some(&defined_at) if defined_at >= line_index => self.error(
                line_index,
                format!("symbol `{name}` must be defined before it is used in a directive"),
            ),
            Some(_) => {}
        }
    }

    fn check_duplicate_definitions(&mut self, line: &SourceLine) {
        let defined = match (&line.label, &line.content) {
            (Some(label), _) => Some(label.as_str()),
            (None, LineContent::Directive(Directive::Define { name, .. })) => {
                Some(name.as_str())
            }
            _ => None,
        };

        if let Some(name) = defined {
            if self.symbols.get(name).is_some_and(|&first| first != line.index) {
                self.error(
                    line.index,
                    format!("symbol `{name}` is defined more than once"),
                );
            }
        }
    }

    fn check_instruction(&mut self, line: &SourceLine, instruction: &'a InstructionLine) {
        let Some(mnemonic) = Mnemonic::resolve(&instruction.mnemonic) else {
            self.error(
                line.index,
                format!("unknown instruction `{}`", instruction.mnemonic),
            );
            return;
        };

        let spec = mnemonic.spec();
        let name = &instruction.mnemonic;

        if let Some(size) = instruction.size {
            if spec.sizes.is_empty() {
                self.error(line.index, format!("`{name}` takes no size suffix"));
            } else if !spec.sizes.contains(&size) {
                self.error(
                    line.index,
                    format!("size suffix `.{size}` is not valid for `{name}`"),
                );
            }
        }

        if instruction.operands.len() != spec.operands.len() {
            self.error(
                line.index,
                format!(
                    "`{name}` expects {} operand(s), found {}",
                    spec.operands.len(),
                    instruction.operands.len()
                ),
            );
        }

        for (slot, (operand, allowed)) in instruction
            .operands
            .iter()
            .zip(spec.operands.iter())
            .enumerate()
        {
            if !allowed.contains(operand.mode()) {
                self.error(
                    line.index,
                    format!(
                        "operand {}: {} addressing is not allowed for `{name}`",
                        slot + 1,
                        operand.mode_name()
                    ),
                );
            }
        }

        for (slot, operand) in instruction.operands.iter().enumerate() {
            if let Some(index) = operand.register_index() {
                if index >= 8 {
                    self.error(
                        line.index,
                        format!("operand {}: register index {index} out of range", slot + 1),
                    );
                }
            }
            if let Some(symbol) = operand.symbol() {
                self.check_symbol(line.index, symbol);
            }
        }

        if mnemonic == Mnemonic::Trap {
            if let Some(crate::parser::Operand::Immediate(Value::Literal(vector))) =
                instruction.operands.first()
            {
                if !(0..=15).contains(vector) {
                    self.error(line.index, "trap vector must be between 0 and 15");
                }
            }
        }
    }

    fn check_directive(&mut self, line: &SourceLine, directive: &Directive) {
        match directive {
            Directive::Origin { address } => {
                self.check_layout_symbol(line.index, address);
                if let Value::Literal(address) = address {
                    if *address < 0 {
                        self.error(line.index, "origin address must be non-negative");
                    }
                }
            }

            Directive::Define { value, .. } => {
                self.check_layout_symbol(line.index, value);
            }

            Directive::DefineConstants { values, .. } => {
                for value in values {
                    if let DataValue::Number(value) = value {
                        if let Some(symbol) = value.symbol() {
                            self.check_symbol(line.index, symbol);
                        }
                    }
                }
            }

            Directive::ReserveStorage { count, .. } => {
                self.check_layout_symbol(line.index, count);
                if let Value::Literal(count) = count {
                    if *count < 0 {
                        self.error(line.index, "storage count must be non-negative");
                    }
                }
            }
        }
    }

    fn check_line(&mut self, line: &'a SourceLine) {
        self.check_duplicate_definitions(line);

        match &line.content {
            LineContent::Empty => {}
            LineContent::Unknown => {
                self.error(line.index, "unknown or malformed statement");
            }
            LineContent::Instruction(instruction) => self.check_instruction(line, instruction),
            LineContent::Directive(directive) => self.check_directive(line, directive),
        }
    }
}

/// Validate a parsed program, collecting every violation in source order
///
/// Pure and deterministic: identical source yields an identical, order
/// stable error list. An empty list means the program is accepted.
#[must_use]
pub fn analyze(program: &Program) -> Vec<SemanticError> {
    let mut analyzer = Analyzer {
        symbols: collect_symbols(program),
        errors: Vec::new(),
    };

    for line in &program.lines {
        analyzer.check_line(line);
    }

    analyzer.errors
}
