//! Register-pressure behavior: operand stacks deeper than the register
//! file spill to the value stack and reload transparently.

use wasm_x64::ir::{DropKeep, IntTy, Op, ValType};
use wasm_x64::test_harness::*;

#[test]
fn deep_scalar_stack_spills_and_reduces() {
    // Build 40 register-resident values (each through a real add), far
    // more than the 11 allocatable general-purpose registers, then fold.
    let mut body = Vec::new();
    for i in 0..40 {
        body.push(Op::I32Const { value: i });
        body.push(Op::I32Const { value: 1 });
        body.push(Op::Add { ty: IntTy::I32 });
    }
    for _ in 0..39 {
        body.push(Op::Add { ty: IntTy::I32 });
    }
    let f = func(&[], &[ValType::I32], body);
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    assert!(artifact.stack_pointer_ceil >= 40);
    assert_eq!(count_mnemonic(&listing, Mnemonic::AddL), 79);
}

#[test]
fn deep_vector_stack_spills() {
    // 20 live v128 values against 16 XMM registers.
    let mut body = Vec::new();
    for i in 0..20 {
        body.push(Op::V128Const { lo: i as u64, hi: i as u64 });
    }
    for _ in 0..19 {
        body.push(Op::V128Add { shape: wasm_x64::ir::Shape::I32x4 });
    }
    body.push(Op::Drop { drop_keep: DropKeep { drop: 1, keep: 0 } });
    let f = func(&[], &[], body);
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    // Two slots per v128.
    assert!(artifact.stack_pointer_ceil >= 40);
    // Spills write vectors back to their slots.
    assert!(count_mnemonic(&listing, Mnemonic::Movdqu) > 0);
    assert_eq!(count_mnemonic(&listing, Mnemonic::Paddd), 19);
}

#[test]
fn stack_ceiling_counts_the_watermark_not_the_final_depth() {
    let f = func(
        &[],
        &[ValType::I32],
        vec![
            Op::I32Const { value: 1 },
            Op::I32Const { value: 2 },
            Op::I32Const { value: 3 },
            Op::Add { ty: IntTy::I32 },
            Op::Add { ty: IntTy::I32 },
        ],
    );
    let (artifact, _) = compile_with_listing(&f).expect("compile");
    assert_eq!(artifact.stack_pointer_ceil, 3);
}

#[test]
fn params_and_locals_occupy_the_stack_bottom() {
    let f = func_with_locals(
        &[ValType::I64, ValType::I64],
        &[ValType::I64],
        &[ValType::I64, ValType::V128],
        vec![Op::Pick { depth: 3 }, Op::Pick { depth: 3 }, Op::Add { ty: IntTy::I64 }],
    );
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    // 2 params + 1 + 2 local slots + the two picked copies.
    assert!(artifact.stack_pointer_ceil >= 7);
    // Local zeroing stores.
    assert!(count_mnemonic(&listing, Mnemonic::MovQ) >= 3);
}
