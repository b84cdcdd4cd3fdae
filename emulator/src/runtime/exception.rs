use thiserror::Error;

use crate::constants as C;

use super::memory::MemoryError;

/// A terminal CPU fault
///
/// Faults do not unwind: they transition the interpreter to
/// `TerminatedByFault` and stay retrievable so the host can inspect the
/// final state and the cause.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// The program counter landed on an address that does not start an
    /// instruction
    #[error("illegal jump to address {address:#x}")]
    IllegalJump { address: C::Address },

    /// An out-of-range memory access
    #[error("invalid memory access ({0})")]
    InvalidMemoryAccess(#[from] MemoryError),

    #[error("division by zero")]
    DivisionByZero,

    /// A `trap` with a vector the simulator does not service
    #[error("unsupported trap vector {vector}")]
    UnsupportedTrapVector { vector: u8 },

    /// A host trap with an unknown task number in `d0`
    #[error("unknown trap task {task}")]
    UnknownTrapTask { task: u16 },
}
