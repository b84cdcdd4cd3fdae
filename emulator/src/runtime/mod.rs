//! The virtual CPU: register file, memory, instruction execution and the
//! host-mediated interrupt protocol.

use std::sync::Arc;

use parse_display::Display;
use thiserror::Error;
use tracing::debug;

use crate::compiler::{CompiledInstruction, CompiledProgram};
use crate::constants as C;
use crate::isa::Size;

mod condition;
mod exception;
mod instructions;
mod memory;
mod operands;
mod registers;

mod interrupt;

pub use self::condition::Condition;
pub use self::exception::Exception;
pub use self::instructions::Instruction;
pub use self::interrupt::{Interrupt, InterruptResult, ResultShape};
pub use self::memory::{Memory, MemoryError};
pub use self::operands::Operand;
pub use self::registers::{Ccr, InvalidRegister, Reg, RegisterKind, Registers};

use self::operands::Location;

/// Execution status of an [`Interpreter`]
///
/// `Terminated` and `TerminatedByFault` are absorbing; only `Running`
/// permits further stepping without host intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Status {
    #[display("running")]
    Running,

    #[display("awaiting interrupt")]
    AwaitingInterrupt,

    #[display("terminated")]
    Terminated,

    #[display("terminated by fault")]
    TerminatedByFault,
}

/// Caller-protocol violation
///
/// These are host bugs, kept separate from guest CPU faults: they never
/// mutate interpreter state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// `step`/`run` was called while an interrupt is pending
    #[error("an interrupt is pending and must be answered before execution can resume")]
    InterruptPending,

    /// `answer_interrupt` was called with no interrupt pending
    #[error("no interrupt is pending")]
    NoInterruptPending,

    /// The answer does not match the shape the pending interrupt expects
    #[error("interrupt answer has the wrong shape: expected {expected}, got {got}")]
    MismatchedAnswer {
        expected: ResultShape,
        got: ResultShape,
    },
}

/// Error of the read accessors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error(transparent)]
    Register(#[from] InvalidRegister),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Error constructing an [`Interpreter`]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("memory size {size} does not fit the address space")]
    MemoryTooLarge { size: usize },

    #[error("initial memory image does not fit in {size} bytes of memory")]
    ImageOutOfRange {
        size: usize,
        #[source]
        source: MemoryError,
    },
}

/// The instruction executed by one [`Interpreter::step`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedLine {
    /// Address the instruction was decoded from
    pub address: C::Address,

    /// Zero-based source line that produced the instruction
    pub line_index: usize,
}

/// One-shot record returned by [`Interpreter::step`]
///
/// `executed` is `None` when the machine had nothing left to execute (it
/// was already terminated, or the program counter reached the end of the
/// program), which makes misuse detectable without a separate channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub executed: Option<ExecutedLine>,
    pub status: Status,
}

/// Mutable machine state threaded through instruction execution: the
/// register file, the flags, the memory and the program counter
pub(crate) struct Machine {
    pub(crate) registers: Registers,
    pub(crate) ccr: Ccr,
    pub(crate) memory: Memory,
    pub(crate) pc: C::Address,
}

impl Machine {
    fn address_register(&self, n: u8) -> C::Address {
        self.registers.get(Reg::Addr(n), Size::Long)
    }

    /// Compute an operand's location, applying post-increment and
    /// pre-decrement side effects exactly once
    pub(crate) fn resolve(&mut self, operand: &Operand, size: Size) -> Result<Location, Exception> {
        match *operand {
            Operand::DataRegister(n) => Ok(Location::Register(Reg::Data(n))),
            Operand::AddressRegister(n) => Ok(Location::Register(Reg::Addr(n))),
            Operand::Immediate(value) => Ok(Location::Value(value & size.mask())),
            Operand::Indirect(n) => Ok(Location::Memory(self.address_register(n))),
            Operand::IndirectDisplacement {
                displacement,
                register,
            } => Ok(Location::Memory(
                self.address_register(register)
                    .wrapping_add(displacement as C::Address),
            )),
            Operand::PostIncrement(n) => {
                let address = self.address_register(n);
                self.registers
                    .set(Reg::Addr(n), Size::Long, address.wrapping_add(size.bytes()));
                Ok(Location::Memory(address))
            }
            Operand::PreDecrement(n) => {
                let address = self.address_register(n).wrapping_sub(size.bytes());
                self.registers.set(Reg::Addr(n), Size::Long, address);
                Ok(Location::Memory(address))
            }
            Operand::Absolute(address) => Ok(Location::Memory(address)),
        }
    }

    pub(crate) fn read(&self, location: Location, size: Size) -> Result<C::Long, Exception> {
        match location {
            Location::Register(reg) => Ok(self.registers.get(reg, size)),
            Location::Memory(address) => self.memory.read(address, size).map_err(Exception::from),
            Location::Value(value) => Ok(value),
        }
    }

    pub(crate) fn write(
        &mut self,
        location: Location,
        size: Size,
        value: C::Long,
    ) -> Result<(), Exception> {
        match location {
            Location::Register(reg) => {
                self.registers.set(reg, size, value);
                Ok(())
            }
            Location::Memory(address) => {
                self.memory.write(address, size, value).map_err(Exception::from)
            }
            // The analyzer rejects immediates in writable slots
            Location::Value(_) => unreachable!("immediate operands are never written"),
        }
    }

    pub(crate) fn read_operand(&mut self, operand: &Operand, size: Size) -> Result<C::Long, Exception> {
        let location = self.resolve(operand, size)?;
        self.read(location, size)
    }

    /// The address a control operand names, without touching memory
    pub(crate) fn effective_address(&mut self, operand: &Operand) -> Result<C::Address, Exception> {
        match self.resolve(operand, Size::Long)? {
            Location::Memory(address) => Ok(address),
            // The analyzer only lets control modes through
            Location::Register(_) | Location::Value(_) => {
                unreachable!("control operands resolve to an address")
            }
        }
    }

    pub(crate) fn push_long(&mut self, value: C::Long) -> Result<(), Exception> {
        let sp = self.registers.sp().wrapping_sub(4);
        self.memory.write_long(sp, value)?;
        self.registers.set_sp(sp);
        Ok(())
    }

    pub(crate) fn pop_long(&mut self) -> Result<C::Long, Exception> {
        let sp = self.registers.sp();
        let value = self.memory.read_long(sp)?;
        self.registers.set_sp(sp.wrapping_add(4));
        Ok(value)
    }
}

/// A virtual CPU executing one [`CompiledProgram`]
///
/// Exclusively owns its register file, flags and memory. Single-threaded
/// and synchronous: `step`/`run` always return at the next suspension
/// point instead of blocking on host I/O.
pub struct Interpreter {
    program: Arc<CompiledProgram>,
    machine: Machine,
    status: Status,
    pending: Option<Interrupt>,
    fault: Option<Exception>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Interpreter {{ status: {:?}, pc: {:#x}, registers: {:?}, memory: [...] }}",
            self.status, self.machine.pc, self.machine.registers
        )
    }
}

impl Interpreter {
    /// Build an interpreter with the default memory size
    ///
    /// # Errors
    ///
    /// Fails if the program's initial memory image does not fit.
    pub fn new(program: Arc<CompiledProgram>) -> Result<Self, LoadError> {
        Self::with_memory_size(program, C::DEFAULT_MEMORY_SIZE)
    }

    /// Build an interpreter with a fixed memory size in bytes
    ///
    /// The size is immutable afterwards. The stack pointer starts at the
    /// top of memory, aligned down to an even address.
    ///
    /// # Errors
    ///
    /// Fails if the size does not fit the address space or the program's
    /// initial memory image does not fit in it.
    pub fn with_memory_size(
        program: Arc<CompiledProgram>,
        size: usize,
    ) -> Result<Self, LoadError> {
        let top = C::Address::try_from(size).map_err(|_| LoadError::MemoryTooLarge { size })?;

        let mut memory = Memory::new(size);
        for (address, bytes) in program.image() {
            memory
                .load(*address, bytes)
                .map_err(|source| LoadError::ImageOutOfRange { size, source })?;
        }

        let mut registers = Registers::default();
        registers.set_sp(top & !1);

        let pc = program.entry();
        debug!(pc, "interpreter ready");

        Ok(Self {
            program,
            machine: Machine {
                registers,
                ccr: Ccr::empty(),
                memory,
                pc,
            },
            status: Status::Running,
            pending: None,
            fault: None,
        })
    }

    /// Execute exactly one instruction at the current program counter
    ///
    /// Deterministic: identical state and instruction produce an identical
    /// resulting state. A trap instruction executes only its
    /// request-publishing half and suspends. On a terminated machine this
    /// is a no-op `Step` with `executed: None` and the unchanged status.
    ///
    /// # Errors
    ///
    /// Fails if an interrupt is pending and unanswered.
    pub fn step(&mut self) -> Result<Step, ProtocolError> {
        match self.status {
            Status::AwaitingInterrupt => Err(ProtocolError::InterruptPending),
            Status::Terminated | Status::TerminatedByFault => Ok(Step {
                executed: None,
                status: self.status,
            }),
            Status::Running => {
                let pc = self.machine.pc;
                let Some(compiled) = self.program.instruction_at(pc) else {
                    if pc == self.program.end() {
                        debug!("end of program reached");
                        self.status = Status::Terminated;
                    } else {
                        self.fault = Some(Exception::IllegalJump { address: pc });
                        self.status = Status::TerminatedByFault;
                    }
                    return Ok(Step {
                        executed: None,
                        status: self.status,
                    });
                };

                let instruction = compiled.instruction;
                let line_index = compiled.line_index;
                self.machine.pc = pc.wrapping_add(C::INSTRUCTION_SIZE);

                match instruction.execute(&mut self.machine) {
                    Ok(None) => {}
                    Ok(Some(interrupt)) => {
                        debug!(?interrupt, "trap raised, awaiting host");
                        self.pending = Some(interrupt);
                        self.status = Status::AwaitingInterrupt;
                    }
                    Err(exception) => {
                        debug!(%exception, "CPU fault");
                        self.fault = Some(exception);
                        self.status = Status::TerminatedByFault;
                    }
                }

                Ok(Step {
                    executed: Some(ExecutedLine {
                        address: pc,
                        line_index,
                    }),
                    status: self.status,
                })
            }
        }
    }

    /// Step until the status is no longer `Running`
    ///
    /// There is no internal cancellation: a diverging guest program makes
    /// this diverge too. Bound execution with repeated [`Self::step`]
    /// calls instead.
    ///
    /// # Errors
    ///
    /// Fails if an interrupt is pending and unanswered.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<Status, ProtocolError> {
        if self.status == Status::AwaitingInterrupt {
            return Err(ProtocolError::InterruptPending);
        }
        while self.status == Status::Running {
            self.step()?;
        }
        Ok(self.status)
    }

    /// Complete the pending trap with the host's answer and resume
    ///
    /// This is the result-writing half of the trap instruction that
    /// suspended the machine; execution resumes at the following
    /// instruction (or terminates, for a terminate request).
    ///
    /// # Errors
    ///
    /// Fails if no interrupt is pending, or if the answer's shape does not
    /// match the request; state is untouched in both cases.
    pub fn answer_interrupt(&mut self, result: InterruptResult) -> Result<(), ProtocolError> {
        let Some(interrupt) = self.pending.take() else {
            return Err(ProtocolError::NoInterruptPending);
        };

        let expected = interrupt.expected_result();
        if result.shape() != expected {
            let got = result.shape();
            self.pending = Some(interrupt);
            return Err(ProtocolError::MismatchedAnswer { expected, got });
        }

        self.status = Status::Running;
        match (interrupt, result) {
            (Interrupt::ReadKeyboardString, InterruptResult::String(text)) => {
                let address = self.machine.registers.get(Reg::Addr(1), Size::Long);
                let mut data: Vec<u8> = text.bytes().take(C::MAX_READ_STRING).collect();
                let length = data.len() as C::Long;
                data.push(0);
                if let Err(error) = self.machine.memory.load(address, &data) {
                    self.fault = Some(error.into());
                    self.status = Status::TerminatedByFault;
                    return Ok(());
                }
                self.machine
                    .registers
                    .set(Reg::Data(1), Size::Word, length);
            }

            (Interrupt::ReadNumber | Interrupt::GetTime, InterruptResult::Number(value)) => {
                self.machine
                    .registers
                    .set(Reg::Data(1), Size::Long, value as C::Long);
            }

            (Interrupt::ReadChar, InterruptResult::Char(value)) => {
                self.machine
                    .registers
                    .set(Reg::Data(1), Size::Long, value as C::Long);
            }

            (Interrupt::Terminate, InterruptResult::None) => {
                self.status = Status::Terminated;
            }

            // Display requests carry their payload in the request itself;
            // the acknowledgement just resumes execution
            _ => {}
        }

        Ok(())
    }

    /// The pending interrupt, if the machine is suspended on one
    #[must_use]
    pub fn current_interrupt(&self) -> Option<&Interrupt> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// The fault that terminated execution, if any
    #[must_use]
    pub fn fault(&self) -> Option<&Exception> {
        self.fault.as_ref()
    }

    /// Current program counter
    #[must_use]
    pub fn pc(&self) -> C::Address {
        self.machine.pc
    }

    /// Zero-based source line of the instruction at the program counter
    #[must_use]
    pub fn current_line_index(&self) -> Option<usize> {
        self.program
            .instruction_at(self.machine.pc)
            .map(|compiled| compiled.line_index)
    }

    /// The compiled instruction starting at `address`, if any
    ///
    /// Returns `None` for addresses that do not begin an instruction.
    #[must_use]
    pub fn instruction_at(&self, address: C::Address) -> Option<&CompiledInstruction> {
        self.program.instruction_at(address)
    }

    /// Full register file snapshot
    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.machine.registers
    }

    /// Width-qualified, index-checked register read
    ///
    /// # Errors
    ///
    /// Fails if `index` does not name one of the eight registers of `kind`.
    pub fn register(
        &self,
        kind: RegisterKind,
        index: u8,
        size: Size,
    ) -> Result<C::Long, AccessError> {
        self.machine
            .registers
            .checked_get(kind, index, size)
            .map_err(AccessError::from)
    }

    /// The condition codes as a packed bitfield
    #[must_use]
    pub fn ccr(&self) -> Ccr {
        self.machine.ccr
    }

    /// The flags as an ordered sequence:
    /// carry, overflow, zero, negative, extend
    #[must_use]
    pub fn flags(&self) -> [bool; 5] {
        self.machine.ccr.as_array()
    }

    /// Evaluate a named condition against the current flags
    #[must_use]
    pub fn evaluate_condition(&self, condition: Condition) -> bool {
        condition.evaluate(self.machine.ccr)
    }

    /// Borrow a raw memory range
    ///
    /// # Errors
    ///
    /// Fails if any byte of the range is out of bounds.
    pub fn memory(&self, address: C::Address, len: u32) -> Result<&[u8], AccessError> {
        self.machine
            .memory
            .slice(address, len)
            .map_err(AccessError::from)
    }

    /// Total memory size in bytes
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.machine.memory.len()
    }
}
