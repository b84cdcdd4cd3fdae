//! An emulator for the Motorola 68000 family of processors.
//!
//! The pipeline has three stages plus the virtual CPU:
//!
//! 1. [`parse`] turns source text into a [`parser::Program`] — total, one
//!    entry per line;
//! 2. [`analyze`] validates it exhaustively, returning the ordered
//!    [`analyzer::SemanticError`] list (empty means accepted);
//! 3. [`compile`] resolves labels and directives into an immutable
//!    [`compiler::CompiledProgram`];
//! 4. [`runtime::Interpreter`] executes it one instruction at a time,
//!    suspending on host-serviced traps.
//!
//! ```
//! use std::sync::Arc;
//!
//! use m68k_emulator::runtime::{Interpreter, RegisterKind, Status};
//! use m68k_emulator::isa::Size;
//!
//! let program = m68k_emulator::parse("move.l #5, d0\nadd.l #3, d0\n");
//! assert!(m68k_emulator::analyze(&program).is_empty());
//!
//! let compiled = Arc::new(m68k_emulator::compile(&program).unwrap());
//! let mut cpu = Interpreter::with_memory_size(compiled, 0x10000).unwrap();
//! assert_eq!(cpu.run(), Ok(Status::Terminated));
//! assert_eq!(cpu.register(RegisterKind::Data, 0, Size::Long), Ok(8));
//! ```

pub mod analyzer;
pub mod compiler;
pub mod constants;
pub mod isa;
pub mod parser;
pub mod runtime;

pub use self::analyzer::analyze;
pub use self::compiler::compile;
pub use self::parser::parse;
