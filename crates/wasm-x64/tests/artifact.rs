//! Artifact-level properties: determinism, resolved fix-ups, static-data
//! layout, and the trap-attribution side table.

use wasm_x64::ir::{DropKeep, FloatTy, IntTy, Op, Shape, ValType};
use wasm_x64::test_harness::*;

fn representative_function() -> wasm_x64::ir::Function {
    func(
        &[ValType::I32, ValType::F32],
        &[ValType::I32],
        vec![
            Op::Pick { depth: 1 },
            Op::Pick { depth: 1 },
            Op::ITruncF { int: IntTy::I32, float: FloatTy::F32, signed: true },
            Op::Add { ty: IntTy::I32 },
            Op::V128Const { lo: 0x1122_3344, hi: 0x5566_7788 },
            Op::V128Abs { shape: Shape::I32x4 },
            Op::Drop { drop_keep: DropKeep { drop: 1, keep: 0 } },
        ],
    )
}

#[test]
fn compilation_is_deterministic() {
    let f = representative_function();
    let (a, la) = compile_with_listing(&f).expect("first compile");
    let (b, lb) = compile_with_listing(&f).expect("second compile");
    assert_eq!(a.code, b.code);
    assert_eq!(a.static_data_offsets, b.static_data_offsets);
    assert_eq!(a.stack_pointer_ceil, b.stack_pointer_ceil);
    assert_eq!(la, lb);
}

#[test]
fn static_data_sits_after_code_aligned() {
    let (artifact, _) = compile_with_listing(&representative_function()).expect("compile");
    for offset in &artifact.static_data_offsets {
        assert_eq!(offset % 16, 0, "static entry at {offset} unaligned");
        assert!((*offset as usize) < artifact.code.len());
    }
}

#[test]
fn source_map_is_monotone_and_covers_the_body() {
    let f = representative_function();
    let (artifact, _) = compile_with_listing(&f).expect("compile");
    assert_eq!(artifact.source_map.len(), f.body.len());
    let mut last = 0;
    for entry in &artifact.source_map {
        assert!(entry.code_offset >= last);
        last = entry.code_offset;
    }
}

#[test]
fn every_compile_ends_with_resolved_branches() {
    // A function dense with forward branches; finalize would fail on any
    // unresolved fix-up.
    let f = func(
        &[ValType::I32],
        &[ValType::I32],
        vec![
            Op::Pick { depth: 0 },
            Op::BrIf { target: 0, drop_keep: DropKeep::default() },
            Op::Pick { depth: 0 },
            Op::BrIf { target: 1, drop_keep: DropKeep::default() },
            Op::Label { label: 1, arity: 0 },
            Op::Label { label: 0, arity: 0 },
            Op::I32Const { value: 9 },
        ],
    );
    let (artifact, _) = compile_with_listing(&f).expect("compile");
    assert!(!artifact.code.is_empty());
}

#[test]
fn empty_function_compiles_to_return_path() {
    let f = func(&[], &[], vec![]);
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Ret));
    assert_eq!(artifact.stack_pointer_ceil, 0);
}

#[test]
fn results_are_flushed_to_the_frame_bottom() {
    let f = func(
        &[],
        &[ValType::I64],
        vec![Op::I64Const { value: 0x1234_5678_9ABC_DEF0 }],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    // The result constant is materialized and stored to slot 0 before
    // the Returned status store.
    assert!(has_mnemonic(&listing, Mnemonic::MovQ));
    assert!(has_mnemonic(&listing, Mnemonic::Ret));
}
