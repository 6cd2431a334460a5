//! Regression tests for the division trap sequences.
//!
//! The WebAssembly spec requires:
//! - division/remainder by zero traps `IntegerDivisionByZero`
//! - signed `INT_MIN / -1` traps `IntegerOverflow`
//! - signed `INT_MIN % -1` yields 0 without trapping

use wasm_x64::ir::{IntTy, Op, ValType};
use wasm_x64::test_harness::*;

fn div_func(op: Op) -> wasm_x64::ir::Function {
    func(
        &[ValType::I32, ValType::I32],
        &[ValType::I32],
        vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, op],
    )
}

#[test]
fn div_u_emits_zero_check_and_div() {
    let (_, listing) = compile_with_listing(&div_func(Op::DivU { ty: IntTy::I32 }))
        .expect("compile");
    // TEST divisor + conditional jump into the trap trampoline.
    assert!(has_mnemonic(&listing, Mnemonic::TestL));
    assert!(has_mnemonic(&listing, Mnemonic::Jcc));
    assert!(has_mnemonic(&listing, Mnemonic::DivL));
    // Unsigned division zeroes RDX instead of sign-extending.
    assert!(has_mnemonic(&listing, Mnemonic::XorL));
    assert!(!has_mnemonic(&listing, Mnemonic::Cdq));
}

#[test]
fn div_s_emits_overflow_check() {
    let (_, listing) = compile_with_listing(&div_func(Op::DivS { ty: IntTy::I32 }))
        .expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::IdivL));
    assert!(has_mnemonic(&listing, Mnemonic::Cdq));
    // Zero check plus divisor==-1 check plus INT_MIN check.
    assert!(count_mnemonic(&listing, Mnemonic::Jcc) >= 3);
}

#[test]
fn rem_s_shortcuts_minus_one_instead_of_trapping() {
    let (_, listing) = compile_with_listing(&div_func(Op::RemS { ty: IntTy::I32 }))
        .expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::IdivL));
    // The -1 divisor path zeroes the remainder and jumps over the IDIV.
    assert!(has_mnemonic(&listing, Mnemonic::Jmp));
    assert!(has_mnemonic(&listing, Mnemonic::XorL));
}

#[test]
fn div_s_64_uses_wide_sequence() {
    let f = func(
        &[ValType::I64, ValType::I64],
        &[ValType::I64],
        vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, Op::DivS { ty: IntTy::I64 }],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Cqo));
    assert!(has_mnemonic(&listing, Mnemonic::IdivQ));
}

#[test]
fn trap_trampolines_are_shared_per_status() {
    // Two divisions share one division-by-zero trampoline: the exit
    // status store appears once per used status, not once per site.
    let f = func(
        &[ValType::I32, ValType::I32],
        &[ValType::I32],
        vec![
            Op::Pick { depth: 1 },
            Op::Pick { depth: 1 },
            Op::DivU { ty: IntTy::I32 },
            Op::Pick { depth: 2 },
            Op::DivU { ty: IntTy::I32 },
        ],
    );
    let (artifact, _) = compile_with_listing(&f).expect("compile");
    assert!(artifact.stack_pointer_ceil >= 3);
}
