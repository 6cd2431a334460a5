//! Property-based tests for the code generator.
//!
//! Uses `proptest` to generate random-but-valid IR and verify:
//! - compilation never panics and always resolves its fix-ups
//! - byte output is deterministic
//! - the stack ceiling dominates the observed operand depth

use proptest::prelude::*;
use wasm_x64::ir::{DropKeep, IntTy, Op, Shape, ValType};
use wasm_x64::test_harness::*;

/// A random balanced arithmetic expression over i32 constants, expressed
/// as a stack program: `leaves` constants followed by `leaves - 1` binary
/// operations.
fn arith_program() -> impl Strategy<Value = Vec<Op>> {
    (2usize..24, proptest::collection::vec(any::<u32>(), 24), 0u8..5).prop_map(
        |(leaves, values, opkind)| {
            let mut body = Vec::new();
            for value in values.iter().take(leaves) {
                body.push(Op::I32Const { value: *value });
            }
            let op = match opkind {
                0 => Op::Add { ty: IntTy::I32 },
                1 => Op::Sub { ty: IntTy::I32 },
                2 => Op::Mul { ty: IntTy::I32 },
                3 => Op::And { ty: IntTy::I32 },
                _ => Op::Xor { ty: IntTy::I32 },
            };
            for _ in 0..leaves - 1 {
                body.push(op.clone());
            }
            body
        },
    )
}

proptest! {
    #[test]
    fn arithmetic_programs_compile_deterministically(body in arith_program()) {
        let f = func(&[], &[ValType::I32], body);
        let (a, _) = compile_with_listing(&f).expect("compile");
        let (b, _) = compile_with_listing(&f).expect("recompile");
        prop_assert_eq!(a.code, b.code);
        prop_assert!(a.stack_pointer_ceil >= 1);
    }

    #[test]
    fn shuffle_lane_patterns_always_compile(lanes in proptest::array::uniform16(0u8..32)) {
        let f = func(
            &[],
            &[],
            vec![
                Op::V128Const { lo: 1, hi: 2 },
                Op::V128Const { lo: 3, hi: 4 },
                Op::V128Shuffle { lanes },
                Op::Drop { drop_keep: DropKeep { drop: 1, keep: 0 } },
            ],
        );
        let (artifact, listing) = compile_with_listing(&f).expect("compile");
        // Both permutation tables reach the static pool.
        prop_assert!(artifact.static_data_offsets.len() >= 2);
        prop_assert_eq!(count_mnemonic(&listing, Mnemonic::Pshufb), 2);
    }

    #[test]
    fn v128_const_bit_patterns_compile(lo in any::<u64>(), hi in any::<u64>()) {
        let f = func(
            &[],
            &[],
            vec![
                Op::V128Const { lo, hi },
                Op::V128Neg { shape: Shape::I64x2 },
                Op::Drop { drop_keep: DropKeep { drop: 1, keep: 0 } },
            ],
        );
        let (artifact, _) = compile_with_listing(&f).expect("compile");
        prop_assert!(!artifact.code.is_empty());
    }

    #[test]
    fn pick_depths_preserve_stack_accounting(extra in 1u32..10) {
        let mut body = Vec::new();
        for i in 0..extra {
            body.push(Op::I32Const { value: i });
        }
        // Duplicate the deepest value, then fold everything down.
        body.push(Op::Pick { depth: extra - 1 });
        for _ in 0..extra {
            body.push(Op::Add { ty: IntTy::I32 });
        }
        let f = func(&[], &[ValType::I32], body);
        let (artifact, _) = compile_with_listing(&f).expect("compile");
        prop_assert!(artifact.stack_pointer_ceil >= u64::from(extra) + 1);
    }
}
