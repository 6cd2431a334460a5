//! Engine-exit paths: host-import stubs and builtin-helper exits.

use wasm_x64::abi::{CTX_EXIT_STATUS, CTX_HOST_FUNC_INDEX, ExitStatus};
use wasm_x64::compile_host_stub;
use wasm_x64::ir::{Op, ValType};
use wasm_x64::test_harness::*;

#[test]
fn host_stub_reports_index_and_status() {
    let artifact = compile_host_stub(42).expect("compile");
    // mov dword [r13+16], 42 ; mov dword [r13+0], 2 ; ret
    let expected = [
        0x41, 0xC7, 0x45, CTX_HOST_FUNC_INDEX as u8, 42, 0x00, 0x00, 0x00,
        0x41, 0xC7, 0x45, CTX_EXIT_STATUS as u8, ExitStatus::CallHost.as_u32() as u8, 0x00, 0x00,
        0x00,
        0xC3,
    ];
    assert_eq!(&artifact.code[..expected.len()], expected);
    assert_eq!(artifact.stack_pointer_ceil, 0);
}

#[test]
fn memory_grow_exits_to_the_engine_and_resumes() {
    let f = func(&[ValType::I32], &[ValType::I32], vec![Op::Pick { depth: 0 }, Op::MemoryGrow]);
    let (_, listing) = compile_with_listing(&f).expect("compile");
    // The builtin exit returns to the engine; the preamble's grow check
    // plus the memory.grow exit both end in RET, and the final return
    // path adds one more.
    assert!(count_mnemonic(&listing, Mnemonic::Ret) >= 3);
}

#[test]
fn bulk_memory_ops_use_builtin_exits() {
    for (op, extra_args) in [
        (Op::MemoryCopy, 3u32),
        (Op::MemoryFill, 3),
        (Op::MemoryInit { data_index: 2 }, 3),
        (Op::DataDrop { data_index: 2 }, 0),
    ] {
        let mut body = Vec::new();
        for _ in 0..extra_args {
            body.push(Op::I32Const { value: 0 });
        }
        body.push(op.clone());
        let f = func(&[], &[], body);
        let (_, listing) =
            compile_with_listing(&f).unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
        assert!(count_mnemonic(&listing, Mnemonic::Ret) >= 2, "{op:?} missing exit");
    }
}

#[test]
fn table_bulk_ops_compile() {
    for (op, args) in [
        (Op::TableGrow, 2u32),
        (Op::TableFill, 3),
        (Op::TableInit { elem_index: 0 }, 3),
        (Op::TableCopy, 3),
        (Op::ElemDrop { elem_index: 0 }, 0),
    ] {
        let mut body = Vec::new();
        for _ in 0..args {
            body.push(Op::I32Const { value: 0 });
        }
        body.push(op.clone());
        if matches!(op, Op::TableGrow) {
            body.push(Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } });
        }
        let f = func(&[], &[], body);
        compile_with_listing(&f).unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
    }
}
