//! Native x86-64 code generator for a WebAssembly execution engine.
//!
//! The crate consumes the pre-lowered, stack-oriented IR of one function
//! (produced by a validating front-end) and emits an executable byte
//! buffer in a single pass over the operation stream, maintaining a
//! virtual operand stack whose entries live on the physical value stack,
//! in general-purpose or vector registers, or in the condition flags.
//!
//! # Architecture
//!
//! - `ir`: the typed operation stream consumed from the front-end
//! - `asm`: instruction encoding, labels, fix-ups, static-data pool
//! - `translate`: the single-pass lowerer (operand stack, register file,
//!   control flow, per-family operation lowering)
//! - `abi`: the register/context/status contract with the engine

#![allow(clippy::too_many_lines, clippy::missing_errors_doc)]

pub mod abi;
pub mod asm;
pub mod error;
pub mod ir;
mod translate;

/// Test harness: IR builders plus mnemonic-pattern assertions.
///
/// Only available when running tests or when the `test-harness` feature
/// is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::{Error, Result};
pub use translate::{compile, compile_host_stub, CompiledFunction, SourceOffset};
