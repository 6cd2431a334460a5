//! Label binding, branches, branch tables, and operand-carry
//! reconciliation across control-flow joins.

use wasm_x64::ir::{BranchTarget, DropKeep, IntTy, LabelId, Op, ValType};
use wasm_x64::test_harness::*;

fn label(id: LabelId, arity: u32) -> Op {
    Op::Label { label: id, arity }
}

#[test]
fn forward_branch_with_carried_result() {
    // block (result i32) ; i32.const 7 ; br 0 ; end
    let f = func(
        &[],
        &[ValType::I32],
        vec![
            Op::I32Const { value: 7 },
            Op::Br { target: 0, drop_keep: DropKeep { drop: 0, keep: 1 } },
            label(0, 1),
        ],
    );
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Jmp));
    assert!(!artifact.code.is_empty());
}

#[test]
fn br_if_without_drops_branches_directly() {
    let f = func(
        &[ValType::I32],
        &[],
        vec![
            Op::Pick { depth: 0 },
            Op::BrIf { target: 0, drop_keep: DropKeep::default() },
            label(0, 0),
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Jcc));
}

#[test]
fn br_if_with_drops_uses_an_inline_thunk() {
    // The taken path discards one operand the fallthrough keeps.
    let f = func(
        &[ValType::I32],
        &[ValType::I32],
        vec![
            Op::I32Const { value: 1 },
            Op::Pick { depth: 1 },
            Op::BrIf { target: 0, drop_keep: DropKeep { drop: 1, keep: 0 } },
            Op::Drop { drop_keep: DropKeep { drop: 1, keep: 0 } },
            label(0, 0),
            Op::I32Const { value: 3 },
            label(1, 1),
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    // Inverted guard jump plus the thunk's unconditional jump.
    assert!(has_mnemonic(&listing, Mnemonic::Jcc));
    assert!(has_mnemonic(&listing, Mnemonic::Jmp));
}

#[test]
fn flag_condition_feeds_the_branch_without_setcc() {
    let f = func(
        &[ValType::I32, ValType::I32],
        &[],
        vec![
            Op::Pick { depth: 1 },
            Op::Pick { depth: 1 },
            Op::Cmp { ty: IntTy::I32, cmp: wasm_x64::ir::IntCmp::Eq },
            Op::BrIf { target: 0, drop_keep: DropKeep::default() },
            label(0, 0),
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    // The compare's flags drive Jcc directly.
    assert!(!has_mnemonic(&listing, Mnemonic::Setcc));
    assert!(has_mnemonic(&listing, Mnemonic::Jcc));
}

#[test]
fn br_table_emits_indexed_dispatch() {
    let arms = DropKeep::default();
    let f = func(
        &[ValType::I32],
        &[],
        vec![
            Op::Pick { depth: 0 },
            Op::BrTable {
                targets: vec![
                    BranchTarget { label: 0, drop_keep: arms },
                    BranchTarget { label: 1, drop_keep: arms },
                ],
                default: BranchTarget { label: 2, drop_keep: arms },
            },
            label(0, 0),
            Op::Br { target: 2, drop_keep: arms },
            label(1, 0),
            Op::Br { target: 2, drop_keep: arms },
            label(2, 0),
        ],
    );
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    // Clamp, table address, sign-extended entry load, indirect jump.
    assert!(has_mnemonic(&listing, Mnemonic::CmovL));
    assert!(has_mnemonic(&listing, Mnemonic::Lea));
    assert!(has_mnemonic(&listing, Mnemonic::MovsxLQ));
    assert!(has_mnemonic(&listing, Mnemonic::JmpReg));
    // Jump table in the static pool: 3 entries of 4 bytes.
    assert!(!artifact.static_data_offsets.is_empty());
}

#[test]
fn unreachable_code_is_elided() {
    let f = func(
        &[],
        &[ValType::I32],
        vec![
            Op::I32Const { value: 1 },
            Op::Br { target: 0, drop_keep: DropKeep { drop: 0, keep: 1 } },
            // Dead: no label binds before it.
            Op::I32Const { value: 2 },
            Op::I32Const { value: 3 },
            Op::Add { ty: IntTy::I32 },
            Op::Drop { drop_keep: DropKeep { drop: 1, keep: 0 } },
            label(0, 1),
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    // The dead add never reaches the assembler.
    assert!(!has_mnemonic(&listing, Mnemonic::AddL));
}

#[test]
fn loop_back_edge_resolves_backward() {
    // A bound label receives a later branch: the fix-up is backward.
    let f = func(
        &[ValType::I32],
        &[],
        vec![
            label(0, 0),
            Op::Pick { depth: 0 },
            Op::BrIf { target: 0, drop_keep: DropKeep::default() },
        ],
    );
    let (artifact, _) = compile_with_listing(&f).expect("compile");
    assert!(!artifact.code.is_empty());
}

#[test]
fn unreachable_op_exits_with_trampoline() {
    let f = func(&[], &[], vec![Op::Unreachable]);
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Jmp));
    // Trampoline plus return path both end in RET.
    assert!(count_mnemonic(&listing, Mnemonic::Ret) >= 1);
    assert!(!artifact.code.is_empty());
}

#[test]
fn select_scalar_uses_cmov() {
    let f = func(
        &[ValType::I32, ValType::I32, ValType::I32],
        &[ValType::I32],
        vec![
            Op::Pick { depth: 2 },
            Op::Pick { depth: 2 },
            Op::Pick { depth: 2 },
            Op::Select,
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::CmovL));
}

#[test]
fn select_vector_uses_a_branch() {
    let f = func(
        &[ValType::F64, ValType::F64, ValType::I32],
        &[ValType::F64],
        vec![
            Op::Pick { depth: 2 },
            Op::Pick { depth: 2 },
            Op::Pick { depth: 2 },
            Op::Select,
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Jcc));
    assert!(has_mnemonic(&listing, Mnemonic::Movaps));
}

#[test]
fn mismatched_join_shapes_are_rejected() {
    // One producer carries an i32, the other an f64, into the same label.
    let f = func(
        &[ValType::I32],
        &[],
        vec![
            Op::Pick { depth: 0 },
            Op::BrIf { target: 1, drop_keep: DropKeep::default() },
            Op::F64Const { bits: 0 },
            Op::Br { target: 0, drop_keep: DropKeep { drop: 0, keep: 1 } },
            label(1, 0),
            Op::I32Const { value: 1 },
            Op::Br { target: 0, drop_keep: DropKeep { drop: 0, keep: 1 } },
            label(0, 1),
            Op::Drop { drop_keep: DropKeep { drop: 1, keep: 0 } },
        ],
    );
    assert!(compile_with_listing(&f).is_err());
}
