//! Execution ABI shared between the generated code and the engine
//! (registers, engine-context layout, exit statuses, builtin indices).
//!
//! This module centralizes the contract so the code generator, the
//! trampolines, and the tests agree on every offset and status value.

use crate::asm::Reg;

// ── Reserved Registers ──

/// Engine context pointer.
/// Points at the per-call engine context described by the `CTX_*` offsets
/// below for the whole duration of a function.
pub const ENGINE_CTX_REG: Reg = Reg::R13;

/// Value-stack base pointer.
/// Operand-stack slot `s` lives at `[STACK_BASE_REG + s*8]`. The engine
/// writes the arguments into slots `0..params` before entering and reads
/// the results from slots `0..results` after a `Returned` exit.
pub const STACK_BASE_REG: Reg = Reg::R14;

/// Linear-memory base pointer.
pub const MEMORY_BASE_REG: Reg = Reg::R15;

/// Scratch register for slot-to-slot moves.
///
/// Never handed out by the register allocator, never live across an
/// operation boundary. The engine's entry trampoline saves every
/// callee-saved host register, so the generated code owns RBP outright.
pub const SCRATCH_REG: Reg = Reg::Rbp;

// ── Engine Context Layout ──
//
// All offsets are in bytes from ENGINE_CTX_REG. Fields the generated code
// writes are written exactly once per exit.

/// u32: one of [`ExitStatus`]. Written immediately before every return.
pub const CTX_EXIT_STATUS: i32 = 0;

/// u32: index of the requested builtin when status is `CallBuiltIn`.
pub const CTX_BUILTIN_INDEX: i32 = 8;

/// u32: index of the host function when status is `CallHost`.
pub const CTX_HOST_FUNC_INDEX: i32 = 16;

/// u32: code offset at which the engine re-enters after servicing a
/// `CallBuiltIn` exit.
pub const CTX_CONTINUATION: i32 = 24;

/// u64: the operand-stack pointer (in slots) at the moment of a builtin
/// exit, so the engine can find the builtin's arguments.
pub const CTX_STACK_POINTER: i32 = 32;

/// u64: slots remaining in the value stack for this frame. Checked by the
/// preamble probe against the function's stack ceiling.
pub const CTX_STACK_CAPACITY: i32 = 40;

/// u64: current byte length of linear memory. Every memory access compares
/// its exclusive upper bound against this field.
pub const CTX_MEMORY_LEN: i32 = 48;

/// u64: pointer to the element array of table 0.
pub const CTX_TABLE_BASE: i32 = 56;

/// u64: current element count of table 0.
pub const CTX_TABLE_LEN: i32 = 64;

/// u64: pointer to the engine's function-reference array (for `ref.func`).
pub const CTX_FUNCREFS_BASE: i32 = 72;

// ── Exit Statuses ──

/// Status codes the generated code reports through `CTX_EXIT_STATUS`.
///
/// The numeric values are the wire contract with the engine and must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitStatus {
    Returned = 0,
    CallBuiltIn = 1,
    CallHost = 2,
    Unreachable = 3,
    InvalidFloatToInt = 4,
    MemoryOutOfBounds = 5,
    InvalidTableAccess = 6,
    IndirectCallTypeMismatch = 7,
    IntegerOverflow = 8,
    IntegerDivisionByZero = 9,
    CodeInvalid = 10,
}

impl ExitStatus {
    pub(crate) const COUNT: usize = 11;

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

// ── Builtin Functions ──

/// Engine helpers reached through a `CallBuiltIn` exit.
///
/// Arguments are taken from the flushed operand stack (the top
/// `arg_count` slots below `CTX_STACK_POINTER`), results are written back
/// in their place before the engine re-enters at `CTX_CONTINUATION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Builtin {
    /// Grow the value stack so that at least the requested slot count (in
    /// the first argument slot) is available.
    GrowValueStack = 0,
    MemoryGrow = 1,
    MemoryInit = 2,
    MemoryCopy = 3,
    MemoryFill = 4,
    DataDrop = 5,
    TableGrow = 6,
    TableInit = 7,
    TableCopy = 8,
    TableFill = 9,
    ElemDrop = 10,
}

impl Builtin {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}
