//! Broad lowering coverage: every operation family compiles, and the
//! emulated SIMD sequences emit the instruction mix they are built from.

use wasm_x64::ir::{
    FloatCmp, FloatTy, IntCmp, IntTy, MemArg, Op, RoundKind, Shape, V128LoadKind, ValType,
};
use wasm_x64::test_harness::*;

fn v128_pair(op: Op) -> wasm_x64::ir::Function {
    func(
        &[],
        &[],
        vec![
            Op::V128Const { lo: 0x0000_0001_0000_0002, hi: 0x0000_0003_0000_0004 },
            Op::V128Const { lo: 0x0000_0005_0000_0006, hi: 0x0000_0007_0000_0008 },
            op,
            Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
        ],
    )
}

#[test]
fn i64x2_mul_uses_three_pmuludq() {
    let (_, listing) =
        compile_with_listing(&v128_pair(Op::V128Mul { shape: Shape::I64x2 })).expect("compile");
    assert_eq!(count_mnemonic(&listing, Mnemonic::Pmuludq), 3);
    assert_eq!(count_mnemonic(&listing, Mnemonic::Paddq), 2);
    assert!(has_mnemonic(&listing, Mnemonic::Psrlq));
    assert!(has_mnemonic(&listing, Mnemonic::Psllq));
}

#[test]
fn i8x16_shl_masks_through_the_table() {
    let f = func(
        &[ValType::I32],
        &[],
        vec![
            Op::V128Const { lo: 0x0807_0605_0403_0201, hi: 0x100F_0E0D_0C0B_0A09 },
            Op::Pick { depth: 1 },
            Op::V128Shl { shape: Shape::I8x16 },
            Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
        ],
    );
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    // Word shift, then an indexed load of the mask row and a PAND.
    assert!(has_mnemonic(&listing, Mnemonic::Psllw));
    assert!(has_mnemonic(&listing, Mnemonic::Lea));
    assert!(has_mnemonic(&listing, Mnemonic::Pand));
    // The 128-byte mask table landed in the static pool.
    assert!(!artifact.static_data_offsets.is_empty());
}

#[test]
fn i8x16_shr_signed_goes_through_word_domain() {
    let f = func(
        &[ValType::I32],
        &[],
        vec![
            Op::V128Const { lo: 1, hi: 2 },
            Op::Pick { depth: 1 },
            Op::V128Shr { shape: Shape::I8x16, signed: true },
            Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Punpcklbw));
    assert!(has_mnemonic(&listing, Mnemonic::Punpckhbw));
    assert_eq!(count_mnemonic(&listing, Mnemonic::Psraw), 2);
    assert!(has_mnemonic(&listing, Mnemonic::Packsswb));
}

#[test]
fn i64x2_shr_signed_uses_scalar_sar_per_lane() {
    let f = func(
        &[ValType::I32],
        &[],
        vec![
            Op::V128Const { lo: 1, hi: 2 },
            Op::Pick { depth: 1 },
            Op::V128Shr { shape: Shape::I64x2, signed: true },
            Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert_eq!(count_mnemonic(&listing, Mnemonic::Pextrq), 2);
    assert_eq!(count_mnemonic(&listing, Mnemonic::Pinsrq), 3); // 2 lanes + const build
    assert_eq!(count_mnemonic(&listing, Mnemonic::SarQ), 2);
}

#[test]
fn shuffle_emits_two_pshufb_tables() {
    let lanes: [u8; 16] = [0, 17, 2, 19, 4, 21, 6, 23, 8, 25, 10, 27, 12, 29, 14, 31];
    let (artifact, listing) =
        compile_with_listing(&v128_pair(Op::V128Shuffle { lanes })).expect("compile");
    assert_eq!(count_mnemonic(&listing, Mnemonic::Pshufb), 2);
    assert!(has_mnemonic(&listing, Mnemonic::Orps));
    // Two 16-byte permutation tables in the static pool.
    assert!(artifact.static_data_offsets.len() >= 2);
}

#[test]
fn swizzle_saturates_indices_before_pshufb() {
    let (_, listing) = compile_with_listing(&v128_pair(Op::V128Swizzle)).expect("compile");
    assert_has_sequence(&listing, &[Mnemonic::Paddusb, Mnemonic::Pshufb]);
}

#[test]
fn float_min_canonicalizes_nans() {
    let f = func(
        &[ValType::F32, ValType::F32],
        &[ValType::F32],
        vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, Op::FMin { ty: FloatTy::F32 }],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    // Both directions, the unordered compare, and the canonical-NaN
    // shift-and-andn tail.
    assert_eq!(count_mnemonic(&listing, Mnemonic::Minss), 2);
    assert!(has_mnemonic(&listing, Mnemonic::Cmpss));
    assert!(has_mnemonic(&listing, Mnemonic::Psrld));
    assert!(has_mnemonic(&listing, Mnemonic::Andnps));
}

#[test]
fn v128_float_max_mirrors_the_scalar_recipe() {
    let (_, listing) =
        compile_with_listing(&v128_pair(Op::V128Max { shape: Shape::F64x2, signed: true }))
            .expect("compile");
    assert_eq!(count_mnemonic(&listing, Mnemonic::Maxpd), 2);
    assert!(has_mnemonic(&listing, Mnemonic::Cmppd));
    assert!(has_mnemonic(&listing, Mnemonic::Psrlq));
    assert!(has_mnemonic(&listing, Mnemonic::Andnpd));
}

#[test]
fn i64x2_abs_blends_through_xmm0() {
    let f = func(
        &[],
        &[],
        vec![
            Op::V128Const { lo: u64::MAX, hi: 1 },
            Op::V128Abs { shape: Shape::I64x2 },
            Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Blendvpd));
    assert!(has_mnemonic(&listing, Mnemonic::Psubq));
}

#[test]
fn v128_popcnt_is_a_nibble_table_lookup() {
    let f = func(
        &[],
        &[],
        vec![
            Op::V128Const { lo: 0xFF00_FF00, hi: 0x0123_4567 },
            Op::V128Popcnt,
            Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert_eq!(count_mnemonic(&listing, Mnemonic::Pshufb), 2);
    assert!(has_mnemonic(&listing, Mnemonic::Paddb));
}

#[test]
fn unsigned_compare_goes_through_min_max() {
    let (_, listing) = compile_with_listing(&v128_pair(Op::V128ICmp {
        shape: Shape::I8x16,
        cmp: IntCmp::LtU,
    }))
    .expect("compile");
    assert!(has_mnemonic(&listing, Mnemonic::Pminub));
    assert!(has_mnemonic(&listing, Mnemonic::Pcmpeqb));
    assert!(has_mnemonic(&listing, Mnemonic::Pxor));
}

#[test]
fn bitselect_is_and_andn_or() {
    let f = func(
        &[],
        &[],
        vec![
            Op::V128Const { lo: 1, hi: 2 },
            Op::V128Const { lo: 3, hi: 4 },
            Op::V128Const { lo: 5, hi: 6 },
            Op::V128Bitselect,
            Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert_has_sequence(&listing, &[Mnemonic::Pand, Mnemonic::Pandn, Mnemonic::Por]);
}

#[test]
fn i16x8_bitmask_narrows_first() {
    let f = func(
        &[],
        &[ValType::I32],
        vec![
            Op::V128Const { lo: 0x8000_8000_8000_8000, hi: 0 },
            Op::V128BitMask { shape: Shape::I16x8 },
        ],
    );
    let (_, listing) = compile_with_listing(&f).expect("compile");
    assert_has_sequence(&listing, &[Mnemonic::Packsswb, Mnemonic::Pmovmskb]);
    assert!(has_mnemonic(&listing, Mnemonic::ShrL));
}

#[test]
fn trapping_trunc_checks_nan_and_range() {
    let f = func(
        &[ValType::F32],
        &[ValType::I32],
        vec![
            Op::Pick { depth: 0 },
            Op::ITruncF { int: IntTy::I32, float: FloatTy::F32, signed: true },
        ],
    );
    let (artifact, listing) = compile_with_listing(&f).expect("compile");
    // Self-compare for NaN plus two bound compares.
    assert_eq!(count_mnemonic(&listing, Mnemonic::Ucomiss), 3);
    assert!(has_mnemonic(&listing, Mnemonic::Cvttss2siL));
    // Two boundary constants in the static pool.
    assert!(artifact.static_data_offsets.len() >= 2);
}

#[test]
fn swap_requires_matching_types() {
    let f = func(
        &[ValType::I32, ValType::I64],
        &[],
        vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, Op::Swap { depth: 1 }],
    );
    assert!(compile_with_listing(&f).is_err());
}

#[test]
fn wide_operator_matrix_compiles() {
    let scalar_ops = vec![
        Op::Add { ty: IntTy::I32 },
        Op::Sub { ty: IntTy::I32 },
        Op::Mul { ty: IntTy::I32 },
        Op::And { ty: IntTy::I32 },
        Op::Or { ty: IntTy::I32 },
        Op::Xor { ty: IntTy::I32 },
        Op::Shl { ty: IntTy::I32 },
        Op::ShrS { ty: IntTy::I32 },
        Op::ShrU { ty: IntTy::I32 },
        Op::Rotl { ty: IntTy::I32 },
        Op::Rotr { ty: IntTy::I32 },
        Op::Cmp { ty: IntTy::I32, cmp: IntCmp::LtS },
    ];
    for op in scalar_ops {
        let f = func(
            &[ValType::I32, ValType::I32],
            &[ValType::I32],
            vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, op.clone()],
        );
        let (artifact, _) = compile_with_listing(&f)
            .unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
        assert!(!artifact.code.is_empty());
    }

    let unary_ops = vec![
        Op::Clz { ty: IntTy::I64 },
        Op::Ctz { ty: IntTy::I64 },
        Op::Popcnt { ty: IntTy::I64 },
        Op::Eqz { ty: IntTy::I64 },
    ];
    for op in unary_ops {
        let f = func(&[ValType::I64], &[ValType::I32], vec![Op::Pick { depth: 0 }, op.clone()]);
        // Clz/Ctz/Popcnt return i64-typed counts only for i64 inputs in
        // this IR; wrap to match the declared result.
        let f = match op {
            Op::Eqz { .. } => f,
            _ => func(
                &[ValType::I64],
                &[ValType::I32],
                vec![Op::Pick { depth: 0 }, op.clone(), Op::I32WrapI64],
            ),
        };
        compile_with_listing(&f).unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
    }

    let float_ops = vec![
        Op::FAdd { ty: FloatTy::F64 },
        Op::FSub { ty: FloatTy::F64 },
        Op::FMul { ty: FloatTy::F64 },
        Op::FDiv { ty: FloatTy::F64 },
        Op::FMin { ty: FloatTy::F64 },
        Op::FMax { ty: FloatTy::F64 },
        Op::FCopysign { ty: FloatTy::F64 },
    ];
    for op in float_ops {
        let f = func(
            &[ValType::F64, ValType::F64],
            &[ValType::F64],
            vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, op.clone()],
        );
        compile_with_listing(&f).unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
    }

    let float_unary = vec![
        Op::FAbs { ty: FloatTy::F32 },
        Op::FNeg { ty: FloatTy::F32 },
        Op::FSqrt { ty: FloatTy::F32 },
        Op::FRound { ty: FloatTy::F32, kind: RoundKind::Nearest },
        Op::FRound { ty: FloatTy::F32, kind: RoundKind::Trunc },
    ];
    for op in float_unary {
        let f = func(&[ValType::F32], &[ValType::F32], vec![Op::Pick { depth: 0 }, op.clone()]);
        compile_with_listing(&f).unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
    }

    for cmp in [FloatCmp::Eq, FloatCmp::Ne, FloatCmp::Lt, FloatCmp::Gt, FloatCmp::Le, FloatCmp::Ge]
    {
        let f = func(
            &[ValType::F32, ValType::F32],
            &[ValType::I32],
            vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, Op::FCmp { ty: FloatTy::F32, cmp }],
        );
        compile_with_listing(&f).unwrap_or_else(|e| panic!("{cmp:?} failed: {e}"));
    }
}

#[test]
fn conversion_matrix_compiles() {
    for (int, float, signed) in [
        (IntTy::I32, FloatTy::F32, true),
        (IntTy::I32, FloatTy::F32, false),
        (IntTy::I32, FloatTy::F64, true),
        (IntTy::I32, FloatTy::F64, false),
        (IntTy::I64, FloatTy::F32, true),
        (IntTy::I64, FloatTy::F32, false),
        (IntTy::I64, FloatTy::F64, true),
        (IntTy::I64, FloatTy::F64, false),
    ] {
        let param = float.val_type();
        let result = int.val_type();
        let f = func(
            &[param],
            &[result],
            vec![Op::Pick { depth: 0 }, Op::ITruncF { int, float, signed }],
        );
        compile_with_listing(&f).expect("trunc compiles");

        let f = func(
            &[result],
            &[param],
            vec![Op::Pick { depth: 0 }, Op::FConvertI { float, int, signed }],
        );
        compile_with_listing(&f).expect("convert compiles");
    }
}

#[test]
fn v128_surface_compiles() {
    let binary_ops = vec![
        Op::V128Add { shape: Shape::I8x16 },
        Op::V128Add { shape: Shape::F32x4 },
        Op::V128Sub { shape: Shape::I64x2 },
        Op::V128Mul { shape: Shape::I16x8 },
        Op::V128Mul { shape: Shape::F64x2 },
        Op::V128Div { shape: Shape::F32x4 },
        Op::V128AddSat { shape: Shape::I8x16, signed: true },
        Op::V128SubSat { shape: Shape::I16x8, signed: false },
        Op::V128Min { shape: Shape::I8x16, signed: false },
        Op::V128Max { shape: Shape::I32x4, signed: true },
        Op::V128Min { shape: Shape::F32x4, signed: true },
        Op::V128AvgrU { shape: Shape::I16x8 },
        Op::V128Pmin { shape: Shape::F64x2 },
        Op::V128Pmax { shape: Shape::F32x4 },
        Op::V128And,
        Op::V128Or,
        Op::V128Xor,
        Op::V128AndNot,
        Op::V128Swizzle,
        Op::V128Q15MulrSatS,
        Op::V128Dot,
        Op::V128Narrow { origin: Shape::I16x8, signed: true },
        Op::V128Narrow { origin: Shape::I32x4, signed: false },
        Op::V128ExtMul { origin: Shape::I8x16, signed: true, low: true },
        Op::V128ExtMul { origin: Shape::I16x8, signed: false, low: false },
        Op::V128ExtMul { origin: Shape::I32x4, signed: true, low: true },
        Op::V128ICmp { shape: Shape::I32x4, cmp: IntCmp::GeS },
        Op::V128ICmp { shape: Shape::I64x2, cmp: IntCmp::LtS },
        Op::V128FCmp { shape: Shape::F32x4, cmp: FloatCmp::Gt },
        Op::V128FCmp { shape: Shape::F64x2, cmp: FloatCmp::Ne },
    ];
    for op in binary_ops {
        compile_with_listing(&v128_pair(op.clone()))
            .unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
    }

    let unary_ops = vec![
        Op::V128Not,
        Op::V128Neg { shape: Shape::I8x16 },
        Op::V128Neg { shape: Shape::F64x2 },
        Op::V128Abs { shape: Shape::I16x8 },
        Op::V128Abs { shape: Shape::F32x4 },
        Op::V128Abs { shape: Shape::I64x2 },
        Op::V128Sqrt { shape: Shape::F64x2 },
        Op::V128Popcnt,
        Op::V128Round { shape: Shape::F32x4, kind: RoundKind::Ceil },
        Op::V128Round { shape: Shape::F64x2, kind: RoundKind::Floor },
        Op::V128Extend { origin: Shape::I8x16, signed: true, low: true },
        Op::V128Extend { origin: Shape::I16x8, signed: false, low: false },
        Op::V128Extend { origin: Shape::I32x4, signed: true, low: false },
        Op::V128ExtAddPairwise { origin: Shape::I8x16, signed: true },
        Op::V128ExtAddPairwise { origin: Shape::I8x16, signed: false },
        Op::V128ExtAddPairwise { origin: Shape::I16x8, signed: true },
        Op::V128ExtAddPairwise { origin: Shape::I16x8, signed: false },
        Op::V128FloatPromote,
        Op::V128FloatDemote,
        Op::V128FConvertI { shape: Shape::F32x4, signed: true },
        Op::V128FConvertI { shape: Shape::F32x4, signed: false },
        Op::V128FConvertI { shape: Shape::F64x2, signed: true },
        Op::V128FConvertI { shape: Shape::F64x2, signed: false },
        Op::V128ITruncSatF { origin: Shape::F32x4, signed: true },
        Op::V128ITruncSatF { origin: Shape::F32x4, signed: false },
        Op::V128ITruncSatF { origin: Shape::F64x2, signed: true },
        Op::V128ITruncSatF { origin: Shape::F64x2, signed: false },
    ];
    for op in unary_ops {
        let f = func(
            &[],
            &[],
            vec![
                Op::V128Const { lo: 7, hi: 9 },
                op.clone(),
                Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
            ],
        );
        compile_with_listing(&f).unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
    }

    // Lane access, splats, boolean reductions.
    for shape in [Shape::I8x16, Shape::I16x8, Shape::I32x4, Shape::I64x2] {
        let f = func(
            &[],
            &[ValType::I32],
            vec![
                Op::V128Const { lo: 1, hi: 2 },
                Op::V128AllTrue { shape },
            ],
        );
        compile_with_listing(&f).unwrap_or_else(|e| panic!("all_true {shape:?} failed: {e}"));

        let f = func(
            &[],
            &[ValType::I32],
            vec![Op::V128Const { lo: 1, hi: 2 }, Op::V128BitMask { shape }],
        );
        compile_with_listing(&f).unwrap_or_else(|e| panic!("bitmask {shape:?} failed: {e}"));
    }

    let f = func(
        &[ValType::I32],
        &[ValType::I32],
        vec![
            Op::Pick { depth: 0 },
            Op::V128Splat { shape: Shape::I8x16 },
            Op::V128ExtractLane { shape: Shape::I8x16, lane: 3, signed: true },
        ],
    );
    compile_with_listing(&f).expect("splat + extract");

    let f = func(
        &[ValType::F64],
        &[ValType::F64],
        vec![
            Op::Pick { depth: 0 },
            Op::V128Splat { shape: Shape::F64x2 },
            Op::V128ExtractLane { shape: Shape::F64x2, lane: 1, signed: false },
        ],
    );
    compile_with_listing(&f).expect("f64 splat + extract");
}

#[test]
fn memory_surface_compiles() {
    let arg = MemArg { offset: 8 };
    let loads: Vec<Op> = vec![
        Op::Load { ty: ValType::I32, arg },
        Op::Load { ty: ValType::I64, arg },
        Op::Load { ty: ValType::F32, arg },
        Op::Load { ty: ValType::F64, arg },
        Op::Load8 { ty: IntTy::I32, signed: true, arg },
        Op::Load8 { ty: IntTy::I64, signed: false, arg },
        Op::Load16 { ty: IntTy::I32, signed: false, arg },
        Op::Load16 { ty: IntTy::I64, signed: true, arg },
        Op::Load32 { signed: true, arg },
        Op::Load32 { signed: false, arg },
    ];
    for op in loads {
        let result = match &op {
            Op::Load { ty, .. } => *ty,
            Op::Load8 { ty, .. } | Op::Load16 { ty, .. } => ty.val_type(),
            _ => ValType::I64,
        };
        let f = func(&[ValType::I32], &[result], vec![Op::Pick { depth: 0 }, op.clone()]);
        let (_, listing) = compile_with_listing(&f)
            .unwrap_or_else(|e| panic!("{op:?} failed: {e}"));
        // Every access bounds-checks against the memory length.
        assert!(has_mnemonic(&listing, Mnemonic::CmpQ), "{op:?} missing bounds check");
        assert!(has_mnemonic(&listing, Mnemonic::Jcc), "{op:?} missing trap branch");
    }

    let f = func(
        &[ValType::I32, ValType::I64],
        &[],
        vec![Op::Pick { depth: 1 }, Op::Pick { depth: 1 }, Op::Store { ty: ValType::I64, arg }],
    );
    compile_with_listing(&f).expect("store compiles");

    let f = func(&[], &[ValType::I32], vec![Op::MemorySize]);
    let (_, listing) = compile_with_listing(&f).expect("memory.size");
    assert!(has_mnemonic(&listing, Mnemonic::ShrQ));

    for kind in [
        V128LoadKind::N128,
        V128LoadKind::S8x8,
        V128LoadKind::U16x4,
        V128LoadKind::S32x2,
        V128LoadKind::Splat8,
        V128LoadKind::Splat16,
        V128LoadKind::Splat32,
        V128LoadKind::Splat64,
        V128LoadKind::Zero32,
        V128LoadKind::Zero64,
    ] {
        let f = func(
            &[ValType::I32],
            &[],
            vec![
                Op::Pick { depth: 0 },
                Op::V128Load { kind, arg },
                Op::Drop { drop_keep: wasm_x64::ir::DropKeep { drop: 1, keep: 0 } },
            ],
        );
        compile_with_listing(&f).unwrap_or_else(|e| panic!("{kind:?} failed: {e}"));
    }
}

#[test]
fn table_ops_compile() {
    let f = func(&[ValType::I32], &[ValType::I64], vec![Op::Pick { depth: 0 }, Op::TableGet]);
    let (_, listing) = compile_with_listing(&f).expect("table.get");
    assert!(has_mnemonic(&listing, Mnemonic::Jcc));

    let f = func(&[], &[ValType::I32], vec![Op::TableSize]);
    compile_with_listing(&f).expect("table.size");

    let f = func(&[], &[ValType::I64], vec![Op::RefFunc { function_index: 4 }]);
    compile_with_listing(&f).expect("ref.func");
}
