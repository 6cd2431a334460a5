//! Test harness for wasm-x64 unit and integration tests.
//!
//! Provides small IR-building helpers, a compile entry point that also
//! returns the emitted mnemonic stream, and assertions over that stream.
//! Only available when running tests (or with the `test-harness`
//! feature).
//!
//! # Example
//!
//! ```rust
//! use wasm_x64::test_harness::*;
//! use wasm_x64::ir::{IntTy, Op, ValType};
//!
//! let function = func(
//!     &[],
//!     &[ValType::I32],
//!     vec![
//!         Op::I32Const { value: 2 },
//!         Op::I32Const { value: 3 },
//!         Op::Add { ty: IntTy::I32 },
//!     ],
//! );
//! let (artifact, listing) = compile_with_listing(&function).expect("compile");
//! assert!(has_mnemonic(&listing, Mnemonic::AddL));
//! assert!(!artifact.code.is_empty());
//! ```

pub use crate::asm::Mnemonic;
use crate::ir::{Function, Op, ValType};
use crate::{CompiledFunction, Result};

/// Builds a [`Function`] with no declared locals.
#[must_use]
pub fn func(params: &[ValType], results: &[ValType], body: Vec<Op>) -> Function {
    Function { params: params.to_vec(), results: results.to_vec(), locals: Vec::new(), body }
}

/// Builds a [`Function`] with declared locals.
#[must_use]
pub fn func_with_locals(
    params: &[ValType],
    results: &[ValType],
    locals: &[ValType],
    body: Vec<Op>,
) -> Function {
    Function {
        params: params.to_vec(),
        results: results.to_vec(),
        locals: locals.to_vec(),
        body,
    }
}

/// Compiles a function and returns the artifact together with the
/// mnemonic stream in emission order.
pub fn compile_with_listing(function: &Function) -> Result<(CompiledFunction, Vec<Mnemonic>)> {
    crate::translate::compile_function(function)
}

/// Number of occurrences of a mnemonic in the listing.
#[must_use]
pub fn count_mnemonic(listing: &[Mnemonic], mnemonic: Mnemonic) -> usize {
    listing.iter().filter(|m| **m == mnemonic).count()
}

#[must_use]
pub fn has_mnemonic(listing: &[Mnemonic], mnemonic: Mnemonic) -> bool {
    count_mnemonic(listing, mnemonic) > 0
}

/// True if `pattern` occurs as a contiguous run in the listing.
#[must_use]
pub fn has_sequence(listing: &[Mnemonic], pattern: &[Mnemonic]) -> bool {
    if pattern.is_empty() {
        return true;
    }
    listing.windows(pattern.len()).any(|w| w == pattern)
}

/// Panics with a readable diff if `pattern` does not occur contiguously.
pub fn assert_has_sequence(listing: &[Mnemonic], pattern: &[Mnemonic]) {
    assert!(
        has_sequence(listing, pattern),
        "pattern {pattern:?} not found in listing:\n{listing:?}"
    );
}
