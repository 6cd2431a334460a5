//! v128 lowering.
//!
//! Most operations map straight onto SSE instructions; the rest are
//! emulated with the standard non-AVX sequences: packed-byte shifts run
//! as word shifts plus a mask-table cleanup, the signed i64x2 shift goes
//! through scalar SAR, i64x2 multiplication decomposes into three
//! PMULUDQ, float min/max canonicalizes NaNs, and i8x16 popcount is a
//! nibble-table PSHUFB lookup.

use crate::abi::MEMORY_BASE_REG;
use crate::asm::{Cond, Mnemonic, Reg};
use crate::error::{Error, Result};
use crate::ir::{FloatCmp, IntCmp, MemArg, RoundKind, Shape, V128LoadKind, ValType};

use super::codegen::Compiler;
use super::float::round_imm;

// Mask applied after a packed-word left shift to clear the bits that
// crossed a byte boundary, one 16-byte row per shift amount 0..7.
const I8X16_SHL_MASKS: [u8; 128] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe, 0xfe,
    0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc, 0xfc,
    0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8, 0xf8,
    0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0, 0xf0,
    0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0, 0xe0,
    0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0, 0xc0,
    0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80,
];

// Counterpart for logical right shifts.
const I8X16_SHR_MASKS: [u8; 128] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f,
    0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
    0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f, 0x1f,
    0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f,
    0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07,
    0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
];

// Saturating add forces any swizzle index >= 16 to 0x80..0xFF, which
// PSHUFB interprets as "write zero".
const SWIZZLE_SAT: [u8; 16] = [0x70; 16];

const POPCNT_MASK: [u8; 16] = [0x0f; 16];
const POPCNT_TABLE: [u8; 16] = [
    0x00, 0x01, 0x01, 0x02, 0x01, 0x02, 0x02, 0x03,
    0x01, 0x02, 0x02, 0x03, 0x02, 0x03, 0x03, 0x04,
];

const ONES_I8: [u8; 16] = [0x01; 16];
const ONES_I16: [u8; 16] = [
    0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00,
];
const SIGN_I16: [u8; 16] = [
    0x00, 0x80, 0x00, 0x80, 0x00, 0x80, 0x00, 0x80,
    0x00, 0x80, 0x00, 0x80, 0x00, 0x80, 0x00, 0x80,
];
// 0x0001_0000 per i32 lane: the bias restored after a sign-flipped
// unsigned pairwise add.
const PAIRWISE_BIAS_I32: [u8; 16] = [
    0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00,
];

const F32X4_2P31: [u8; 16] = splat4(0x4F00_0000);
const F32X4_65536: [u8; 16] = splat4(0x4780_0000);
// High dword of a double whose mantissa will hold a u32: 2^52's exponent.
const F64_MAGIC_HI: [u8; 16] = splat4(0x4330_0000);
const F64X2_2P52: [u8; 16] = splat2(0x4330_0000_0000_0000);
const F64X2_INT32_MAX: [u8; 16] = splat2(0x41DF_FFFF_FFC0_0000);
const F64X2_UINT32_MAX: [u8; 16] = splat2(0x41EF_FFFF_FFE0_0000);

const fn splat4(value: u32) -> [u8; 16] {
    let b = value.to_le_bytes();
    [
        b[0], b[1], b[2], b[3], b[0], b[1], b[2], b[3],
        b[0], b[1], b[2], b[3], b[0], b[1], b[2], b[3],
    ]
}

const fn splat2(value: u64) -> [u8; 16] {
    let b = value.to_le_bytes();
    [
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]
}

fn by_int_shape(shape: Shape, b: Mnemonic, w: Mnemonic, d: Mnemonic, q: Mnemonic) -> Mnemonic {
    match shape {
        Shape::I8x16 => b,
        Shape::I16x8 => w,
        Shape::I32x4 => d,
        Shape::I64x2 => q,
        _ => unreachable!("integer shape expected"),
    }
}

fn pcmpeq(shape: Shape) -> Mnemonic {
    by_int_shape(shape, Mnemonic::Pcmpeqb, Mnemonic::Pcmpeqw, Mnemonic::Pcmpeqd, Mnemonic::Pcmpeqq)
}

fn pcmpgt(shape: Shape) -> Mnemonic {
    by_int_shape(shape, Mnemonic::Pcmpgtb, Mnemonic::Pcmpgtw, Mnemonic::Pcmpgtd, Mnemonic::Pcmpgtq)
}

impl Compiler {
    /// The common `x1 ← x1 op x2` tail: pops both vectors, applies the
    /// instruction, pushes the destination.
    fn v128_binop(&mut self, inst: Mnemonic) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        self.asm.emit_rr(inst, x2.vr(), x1.vr());
        self.release(&x2);
        self.stack.push_vreg(x1.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_const(&mut self, lo: u64, hi: u64) -> Result<()> {
        let result = self.alloc_vec()?;
        let tmp = self.alloc_gp()?;
        // The 128-bit immediate travels through a GP register; a zero
        // half degrades to XOR.
        if lo == 0 {
            self.asm.emit_rr(Mnemonic::XorL, tmp, tmp);
        } else {
            self.asm.emit_const_to_reg(Mnemonic::MovQ, lo as i64, tmp);
        }
        self.asm.emit_rr(Mnemonic::MovQ, tmp, result);
        if lo != 0 && hi == 0 {
            self.asm.emit_rr(Mnemonic::XorL, tmp, tmp);
        } else if hi != 0 {
            self.asm.emit_const_to_reg(Mnemonic::MovQ, hi as i64, tmp);
        }
        self.asm.emit_rr_imm(Mnemonic::Pinsrq, tmp, result, 1);
        self.regs.mark_unused(tmp);
        self.stack.push_vreg(result, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_load(&mut self, kind: V128LoadKind, arg: MemArg) -> Result<()> {
        let size = kind.access_size();
        let disp = -i32::from(size);
        match kind {
            V128LoadKind::N128 => {
                let ceil = self.memory_access_ceil(arg.offset, size)?;
                let result = self.alloc_vec()?;
                self.asm
                    .emit_mem_indexed_to_reg(Mnemonic::Movdqu, MEMORY_BASE_REG, disp, ceil, 1, result);
                self.regs.mark_unused(ceil);
                self.stack.push_vreg(result, ValType::V128);
            }
            V128LoadKind::S8x8
            | V128LoadKind::U8x8
            | V128LoadKind::S16x4
            | V128LoadKind::U16x4
            | V128LoadKind::S32x2
            | V128LoadKind::U32x2 => {
                let inst = match kind {
                    V128LoadKind::S8x8 => Mnemonic::Pmovsxbw,
                    V128LoadKind::U8x8 => Mnemonic::Pmovzxbw,
                    V128LoadKind::S16x4 => Mnemonic::Pmovsxwd,
                    V128LoadKind::U16x4 => Mnemonic::Pmovzxwd,
                    V128LoadKind::S32x2 => Mnemonic::Pmovsxdq,
                    _ => Mnemonic::Pmovzxdq,
                };
                let ceil = self.memory_access_ceil(arg.offset, size)?;
                let result = self.alloc_vec()?;
                self.asm
                    .emit_mem_indexed_to_reg(inst, MEMORY_BASE_REG, disp, ceil, 1, result);
                self.regs.mark_unused(ceil);
                self.stack.push_vreg(result, ValType::V128);
            }
            V128LoadKind::Zero32 | V128LoadKind::Zero64 => {
                let inst =
                    if kind == V128LoadKind::Zero32 { Mnemonic::Movss } else { Mnemonic::Movsd };
                let ceil = self.memory_access_ceil(arg.offset, size)?;
                let result = self.alloc_vec()?;
                self.asm
                    .emit_mem_indexed_to_reg(inst, MEMORY_BASE_REG, disp, ceil, 1, result);
                self.regs.mark_unused(ceil);
                self.stack.push_vreg(result, ValType::V128);
            }
            V128LoadKind::Splat8 | V128LoadKind::Splat16 | V128LoadKind::Splat32
            | V128LoadKind::Splat64 => {
                let load = match kind {
                    V128LoadKind::Splat8 => Mnemonic::MovzxBL,
                    V128LoadKind::Splat16 => Mnemonic::MovzxWL,
                    V128LoadKind::Splat32 => Mnemonic::MovL,
                    _ => Mnemonic::MovQ,
                };
                let ceil = self.memory_access_ceil(arg.offset, size)?;
                self.asm
                    .emit_mem_indexed_to_reg(load, MEMORY_BASE_REG, disp, ceil, 1, ceil);
                let shape = match kind {
                    V128LoadKind::Splat8 => Shape::I8x16,
                    V128LoadKind::Splat16 => Shape::I16x8,
                    V128LoadKind::Splat32 => Shape::I32x4,
                    _ => Shape::I64x2,
                };
                let result = self.splat_gp_to_vec(ceil, shape)?;
                self.regs.mark_unused(ceil);
                self.stack.push_vreg(result, ValType::V128);
            }
        }
        Ok(())
    }

    pub(crate) fn lower_v128_load_lane(&mut self, lane_bits: u8, lane: u8, arg: MemArg) -> Result<()> {
        let size = lane_bits / 8;
        let inst = match lane_bits {
            8 => Mnemonic::Pinsrb,
            16 => Mnemonic::Pinsrw,
            32 => Mnemonic::Pinsrd,
            64 => Mnemonic::Pinsrq,
            _ => return Err(Error::InvalidIr(format!("lane width {lane_bits}"))),
        };
        let target = self.pop_vec()?;
        let ceil = self.memory_access_ceil(arg.offset, size)?;
        self.asm.emit_mem_indexed_to_reg_imm(
            inst,
            MEMORY_BASE_REG,
            -i32::from(size),
            ceil,
            1,
            target.vr(),
            lane,
        );
        self.regs.mark_unused(ceil);
        self.stack.push_vreg(target.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_store(&mut self, arg: MemArg) -> Result<()> {
        let value = self.pop_vec()?;
        let ceil = self.memory_access_ceil(arg.offset, 16)?;
        self.asm.emit_reg_to_mem_indexed(
            Mnemonic::Movdqu,
            value.vr(),
            MEMORY_BASE_REG,
            -16,
            ceil,
            1,
        );
        self.regs.mark_unused(ceil);
        self.release(&value);
        Ok(())
    }

    pub(crate) fn lower_v128_store_lane(&mut self, lane_bits: u8, lane: u8, arg: MemArg) -> Result<()> {
        let size = lane_bits / 8;
        let inst = match lane_bits {
            8 => Mnemonic::Pextrb,
            16 => Mnemonic::Pextrw,
            32 => Mnemonic::Pextrd,
            64 => Mnemonic::Pextrq,
            _ => return Err(Error::InvalidIr(format!("lane width {lane_bits}"))),
        };
        let value = self.pop_vec()?;
        let ceil = self.memory_access_ceil(arg.offset, size)?;
        self.asm.emit_reg_to_mem_indexed_imm(
            inst,
            value.vr(),
            MEMORY_BASE_REG,
            -i32::from(size),
            ceil,
            1,
            lane,
        );
        self.regs.mark_unused(ceil);
        self.release(&value);
        Ok(())
    }

    pub(crate) fn lower_v128_extract_lane(&mut self, shape: Shape, lane: u8, signed: bool) -> Result<()> {
        let value = self.pop_vec()?;
        match shape {
            Shape::I8x16 => {
                let result = self.alloc_gp()?;
                self.asm.emit_rr_imm(Mnemonic::Pextrb, value.vr(), result, lane);
                if signed {
                    self.asm.emit_rr(Mnemonic::MovsxBL, result, result);
                } else {
                    self.asm.emit_rr(Mnemonic::MovzxBL, result, result);
                }
                self.release(&value);
                self.stack.push_gpr(result, ValType::I32);
            }
            Shape::I16x8 => {
                let result = self.alloc_gp()?;
                self.asm.emit_rr_imm(Mnemonic::Pextrw, value.vr(), result, lane);
                if signed {
                    self.asm.emit_rr(Mnemonic::MovsxWL, result, result);
                } else {
                    self.asm.emit_rr(Mnemonic::MovzxWL, result, result);
                }
                self.release(&value);
                self.stack.push_gpr(result, ValType::I32);
            }
            Shape::I32x4 => {
                let result = self.alloc_gp()?;
                self.asm.emit_rr_imm(Mnemonic::Pextrd, value.vr(), result, lane);
                self.release(&value);
                self.stack.push_gpr(result, ValType::I32);
            }
            Shape::I64x2 => {
                let result = self.alloc_gp()?;
                self.asm.emit_rr_imm(Mnemonic::Pextrq, value.vr(), result, lane);
                self.release(&value);
                self.stack.push_gpr(result, ValType::I64);
            }
            Shape::F32x4 => {
                if lane != 0 {
                    self.asm.emit_rr_imm(Mnemonic::Pshufd, value.vr(), value.vr(), lane);
                }
                self.stack.push_vreg(value.vr(), ValType::F32);
            }
            Shape::F64x2 => {
                if lane != 0 {
                    // Move the upper quadword down.
                    self.asm.emit_rr_imm(Mnemonic::Pshufd, value.vr(), value.vr(), 0b0000_1110);
                }
                self.stack.push_vreg(value.vr(), ValType::F64);
            }
        }
        Ok(())
    }

    pub(crate) fn lower_v128_replace_lane(&mut self, shape: Shape, lane: u8) -> Result<()> {
        if shape.is_float() {
            let origin = self.pop_vec()?;
            let vector = self.pop_vec()?;
            match shape {
                Shape::F32x4 => {
                    // INSERTPS encodes the destination index in bits 5:4.
                    self.asm
                        .emit_rr_imm(Mnemonic::Insertps, origin.vr(), vector.vr(), lane << 4);
                }
                Shape::F64x2 => {
                    if lane == 0 {
                        self.asm.emit_rr(Mnemonic::Movsd, origin.vr(), vector.vr());
                    } else {
                        self.asm.emit_rr(Mnemonic::Movlhps, origin.vr(), vector.vr());
                    }
                }
                _ => unreachable!(),
            }
            self.release(&origin);
            self.stack.push_vreg(vector.vr(), ValType::V128);
        } else {
            let origin = self.pop_gp()?;
            let vector = self.pop_vec()?;
            let inst = by_int_shape(
                shape,
                Mnemonic::Pinsrb,
                Mnemonic::Pinsrw,
                Mnemonic::Pinsrd,
                Mnemonic::Pinsrq,
            );
            self.asm.emit_rr_imm(inst, origin.gpr(), vector.vr(), lane);
            self.release(&origin);
            self.stack.push_vreg(vector.vr(), ValType::V128);
        }
        Ok(())
    }

    /// Broadcast a GP scalar into every lane of a fresh vector register.
    fn splat_gp_to_vec(&mut self, origin: Reg, shape: Shape) -> Result<Reg> {
        let result = self.alloc_vec()?;
        match shape {
            Shape::I8x16 => {
                let zero = self.alloc_vec()?;
                self.asm.emit_rr_imm(Mnemonic::Pinsrb, origin, result, 0);
                self.asm.emit_rr(Mnemonic::Pxor, zero, zero);
                self.asm.emit_rr(Mnemonic::Pshufb, zero, result);
                self.regs.mark_unused(zero);
            }
            Shape::I16x8 => {
                self.asm.emit_rr_imm(Mnemonic::Pinsrw, origin, result, 0);
                self.asm.emit_rr_imm(Mnemonic::Pinsrw, origin, result, 1);
                self.asm.emit_rr_imm(Mnemonic::Pshufd, result, result, 0);
            }
            Shape::I32x4 => {
                self.asm.emit_rr_imm(Mnemonic::Pinsrd, origin, result, 0);
                self.asm.emit_rr_imm(Mnemonic::Pshufd, result, result, 0);
            }
            Shape::I64x2 => {
                self.asm.emit_rr_imm(Mnemonic::Pinsrq, origin, result, 0);
                self.asm.emit_rr_imm(Mnemonic::Pinsrq, origin, result, 1);
            }
            _ => unreachable!("float splats stay in the vector class"),
        }
        Ok(result)
    }

    pub(crate) fn lower_v128_splat(&mut self, shape: Shape) -> Result<()> {
        match shape {
            Shape::F32x4 => {
                let origin = self.pop_vec()?;
                self.asm.emit_rr_imm(Mnemonic::Insertps, origin.vr(), origin.vr(), 0);
                self.asm.emit_rr_imm(Mnemonic::Pshufd, origin.vr(), origin.vr(), 0);
                self.stack.push_vreg(origin.vr(), ValType::V128);
            }
            Shape::F64x2 => {
                let origin = self.pop_vec()?;
                self.asm.emit_rr(Mnemonic::MovQ, origin.vr(), origin.vr());
                self.asm.emit_rr(Mnemonic::Movlhps, origin.vr(), origin.vr());
                self.stack.push_vreg(origin.vr(), ValType::V128);
            }
            _ => {
                let origin = self.pop_gp()?;
                let result = self.splat_gp_to_vec(origin.gpr(), shape)?;
                self.release(&origin);
                self.stack.push_vreg(result, ValType::V128);
            }
        }
        Ok(())
    }

    pub(crate) fn lower_v128_shuffle(&mut self, lanes: &[u8; 16]) -> Result<()> {
        let w = self.pop_vec()?;
        let v = self.pop_vec()?;
        let tmp = self.alloc_vec()?;
        // Two per-source PSHUFB tables: an index below 16 selects from the
        // first vector, 0x80 writes zero in the other half, and OR merges.
        let mut consts = [0u8; 32];
        for (i, lane) in lanes.iter().enumerate() {
            if *lane < 16 {
                consts[i + 16] = 0x80;
                consts[i] = *lane;
            } else {
                consts[i + 16] = lane - 16;
                consts[i] = 0x80;
            }
        }
        self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &consts[..16], tmp);
        self.asm.emit_rr(Mnemonic::Pshufb, tmp, v.vr());
        self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &consts[16..], tmp);
        self.asm.emit_rr(Mnemonic::Pshufb, tmp, w.vr());
        self.asm.emit_rr(Mnemonic::Orps, v.vr(), w.vr());
        self.regs.mark_unused(tmp);
        self.release(&v);
        self.stack.push_vreg(w.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_swizzle(&mut self) -> Result<()> {
        let index = self.pop_vec()?;
        let base = self.pop_vec()?;
        let tmp = self.alloc_vec()?;
        self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &SWIZZLE_SAT, tmp);
        self.asm.emit_rr(Mnemonic::Paddusb, tmp, index.vr());
        self.asm.emit_rr(Mnemonic::Pshufb, index.vr(), base.vr());
        self.regs.mark_unused(tmp);
        self.release(&index);
        self.stack.push_vreg(base.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_any_true(&mut self) -> Result<()> {
        let value = self.pop_vec()?;
        self.asm.emit_rr(Mnemonic::Ptest, value.vr(), value.vr());
        self.release(&value);
        self.stack.push_flag(Cond::Ne);
        Ok(())
    }

    pub(crate) fn lower_v128_all_true(&mut self, shape: Shape) -> Result<()> {
        let value = self.pop_vec()?;
        let tmp = self.alloc_vec()?;
        self.asm.emit_rr(Mnemonic::Pxor, tmp, tmp);
        self.asm.emit_rr(pcmpeq(shape), value.vr(), tmp);
        self.asm.emit_rr(Mnemonic::Ptest, tmp, tmp);
        self.regs.mark_unused(tmp);
        self.release(&value);
        self.stack.push_flag(Cond::E);
        Ok(())
    }

    pub(crate) fn lower_v128_bitmask(&mut self, shape: Shape) -> Result<()> {
        let value = self.pop_vec()?;
        let result = self.alloc_gp()?;
        match shape {
            Shape::I8x16 => self.asm.emit_rr(Mnemonic::Pmovmskb, value.vr(), result),
            Shape::I16x8 => {
                // Narrow to bytes; each word sign lands twice in the
                // 16-bit byte mask, so drop the duplicated upper half.
                self.asm.emit_rr(Mnemonic::Packsswb, value.vr(), value.vr());
                self.asm.emit_rr(Mnemonic::Pmovmskb, value.vr(), result);
                self.asm.emit_const_to_reg(Mnemonic::ShrL, 8, result);
            }
            Shape::I32x4 => self.asm.emit_rr(Mnemonic::Movmskps, value.vr(), result),
            Shape::I64x2 => self.asm.emit_rr(Mnemonic::Movmskpd, value.vr(), result),
            _ => return Err(Error::InvalidIr("bitmask on a float shape".into())),
        }
        self.release(&value);
        self.stack.push_gpr(result, ValType::I32);
        Ok(())
    }

    pub(crate) fn lower_v128_bitwise(&mut self, inst: Mnemonic) -> Result<()> {
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_not(&mut self) -> Result<()> {
        let value = self.pop_vec()?;
        let tmp = self.alloc_vec()?;
        self.asm.emit_rr(Mnemonic::Pcmpeqd, tmp, tmp);
        self.asm.emit_rr(Mnemonic::Pxor, tmp, value.vr());
        self.regs.mark_unused(tmp);
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_andnot(&mut self) -> Result<()> {
        // x1 & !x2: PANDN complements its destination, so x2 is the
        // destination and x1 the source.
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        self.asm.emit_rr(Mnemonic::Pandn, x1.vr(), x2.vr());
        self.release(&x1);
        self.stack.push_vreg(x2.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_bitselect(&mut self) -> Result<()> {
        let selector = self.pop_vec()?;
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        self.asm.emit_rr(Mnemonic::Pand, selector.vr(), x1.vr());
        self.asm.emit_rr(Mnemonic::Pandn, x2.vr(), selector.vr());
        self.asm.emit_rr(Mnemonic::Por, selector.vr(), x1.vr());
        self.release(&x2);
        self.release(&selector);
        self.stack.push_vreg(x1.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_shl(&mut self, shape: Shape) -> Result<()> {
        let count = self.pop_gp()?;
        let value = self.pop_vec()?;
        let vec_count = self.alloc_vec()?;
        let count_reg = count.gpr();
        let (modulo, shift) = match shape {
            // No packed byte shift exists: shift words, then mask.
            Shape::I8x16 => (0x7, Mnemonic::Psllw),
            Shape::I16x8 => (0xf, Mnemonic::Psllw),
            Shape::I32x4 => (0x1f, Mnemonic::Pslld),
            Shape::I64x2 => (0x3f, Mnemonic::Psllq),
            _ => return Err(Error::InvalidIr("shift on a float shape".into())),
        };
        self.asm.emit_const_to_reg(Mnemonic::AndQ, modulo, count_reg);
        self.asm.emit_rr(Mnemonic::MovL, count_reg, vec_count);
        self.asm.emit_rr(shift, vec_count, value.vr());
        if shape == Shape::I8x16 {
            self.apply_byte_shift_mask(&I8X16_SHL_MASKS, count_reg, vec_count, value.vr())?;
        }
        self.regs.mark_unused(vec_count);
        self.release(&count);
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    /// Indexed load of the 16-byte mask row for the shift amount, ANDed
    /// into the shifted vector.
    fn apply_byte_shift_mask(
        &mut self,
        table: &'static [u8; 128],
        count_reg: Reg,
        vec_tmp: Reg,
        target: Reg,
    ) -> Result<()> {
        let base = self.alloc_gp()?;
        let entry = self.asm.add_static_entry(table);
        self.asm.lea_static_entry(entry, base);
        // Row offset = amount * 16.
        self.asm.emit_const_to_reg(Mnemonic::ShlQ, 4, count_reg);
        self.asm.emit_mem_indexed_to_reg(Mnemonic::Movdqu, base, 0, count_reg, 1, vec_tmp);
        self.asm.emit_rr(Mnemonic::Pand, vec_tmp, target);
        self.regs.mark_unused(base);
        Ok(())
    }

    pub(crate) fn lower_v128_shr(&mut self, shape: Shape, signed: bool) -> Result<()> {
        if shape == Shape::I8x16 {
            return self.lower_v128_shr_i8x16(signed);
        }
        if shape == Shape::I64x2 && signed {
            return self.lower_v128_shr_i64x2_signed();
        }
        let count = self.pop_gp()?;
        let value = self.pop_vec()?;
        let vec_count = self.alloc_vec()?;
        let count_reg = count.gpr();
        let (modulo, shift) = match (shape, signed) {
            (Shape::I16x8, true) => (0xf, Mnemonic::Psraw),
            (Shape::I16x8, false) => (0xf, Mnemonic::Psrlw),
            (Shape::I32x4, true) => (0x1f, Mnemonic::Psrad),
            (Shape::I32x4, false) => (0x1f, Mnemonic::Psrld),
            (Shape::I64x2, false) => (0x3f, Mnemonic::Psrlq),
            _ => return Err(Error::InvalidIr("shift on a float shape".into())),
        };
        self.asm.emit_const_to_reg(Mnemonic::AndQ, modulo, count_reg);
        self.asm.emit_rr(Mnemonic::MovL, count_reg, vec_count);
        self.asm.emit_rr(shift, vec_count, value.vr());
        self.regs.mark_unused(vec_count);
        self.release(&count);
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    /// PSRAQ needs AVX-512; shift each lane with scalar SAR instead.
    fn lower_v128_shr_i64x2_signed(&mut self) -> Result<()> {
        let mut count = self.stack.pop();
        self.move_value_to_specific_gp(&mut count, Reg::Rcx)?;
        let tmp = self.alloc_gp()?;
        let value = self.pop_vec()?;
        for lane in 0u8..2 {
            self.asm.emit_rr_imm(Mnemonic::Pextrq, value.vr(), tmp, lane);
            self.asm.emit_shift_cl(Mnemonic::SarQ, tmp);
            self.asm.emit_rr_imm(Mnemonic::Pinsrq, tmp, value.vr(), lane);
        }
        self.regs.mark_unused(Reg::Rcx);
        self.regs.mark_unused(tmp);
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    fn lower_v128_shr_i8x16(&mut self, signed: bool) -> Result<()> {
        let count = self.pop_gp()?;
        let value = self.pop_vec()?;
        let vec_tmp = self.alloc_vec()?;
        let count_reg = count.gpr();
        self.asm.emit_const_to_reg(Mnemonic::AndQ, 0x7, count_reg);
        if signed {
            let vec_tmp2 = self.alloc_vec()?;
            let vreg = value.vr();
            // Duplicate each byte into a word, shift words with the
            // amount biased by 8 so the copies restore the sign bits,
            // then pack back down.
            self.asm.emit_rr(Mnemonic::Movdqa, vreg, vec_tmp);
            self.asm.emit_rr(Mnemonic::Punpcklbw, vreg, vreg);
            self.asm.emit_rr(Mnemonic::Punpckhbw, vec_tmp, vec_tmp);
            self.asm.emit_const_to_reg(Mnemonic::AddQ, 0x8, count_reg);
            self.asm.emit_rr(Mnemonic::MovL, count_reg, vec_tmp2);
            self.asm.emit_rr(Mnemonic::Psraw, vec_tmp2, vreg);
            self.asm.emit_rr(Mnemonic::Psraw, vec_tmp2, vec_tmp);
            self.asm.emit_rr(Mnemonic::Packsswb, vec_tmp, vreg);
            self.regs.mark_unused(vec_tmp2);
        } else {
            self.asm.emit_rr(Mnemonic::MovL, count_reg, vec_tmp);
            self.asm.emit_rr(Mnemonic::Psrlw, vec_tmp, value.vr());
            self.apply_byte_shift_mask(&I8X16_SHR_MASKS, count_reg, vec_tmp, value.vr())?;
        }
        self.regs.mark_unused(vec_tmp);
        self.release(&count);
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    pub(crate) fn lower_v128_int_cmp(&mut self, shape: Shape, cmp: IntCmp) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let (x1r, x2r) = (x1.vr(), x2.vr());
        let result = match cmp {
            IntCmp::Eq => {
                self.asm.emit_rr(pcmpeq(shape), x2r, x1r);
                x1r
            }
            IntCmp::Ne => {
                self.asm.emit_rr(pcmpeq(shape), x2r, x1r);
                self.asm.emit_rr(Mnemonic::Pcmpeqd, x2r, x2r);
                self.asm.emit_rr(Mnemonic::Pxor, x2r, x1r);
                x1r
            }
            IntCmp::LtS => {
                self.asm.emit_rr(pcmpgt(shape), x1r, x2r);
                x2r
            }
            IntCmp::GtS => {
                self.asm.emit_rr(pcmpgt(shape), x2r, x1r);
                x1r
            }
            IntCmp::LtU | IntCmp::GtU => {
                // No unsigned packed compare: min/max against the other
                // operand, equality, then complement.
                let minmax = if cmp == IntCmp::LtU {
                    by_int_shape(shape, Mnemonic::Pminub, Mnemonic::Pminuw, Mnemonic::Pminud, Mnemonic::Pminud)
                } else {
                    by_int_shape(shape, Mnemonic::Pmaxub, Mnemonic::Pmaxuw, Mnemonic::Pmaxud, Mnemonic::Pmaxud)
                };
                if shape == Shape::I64x2 {
                    return Err(Error::InvalidIr("unsigned i64x2 comparison".into()));
                }
                self.asm.emit_rr(minmax, x2r, x1r);
                self.asm.emit_rr(pcmpeq(shape), x2r, x1r);
                self.asm.emit_rr(Mnemonic::Pcmpeqd, x2r, x2r);
                self.asm.emit_rr(Mnemonic::Pxor, x2r, x1r);
                x1r
            }
            IntCmp::LeS | IntCmp::LeU => {
                if shape == Shape::I64x2 {
                    if cmp == IntCmp::LeU {
                        return Err(Error::InvalidIr("unsigned i64x2 comparison".into()));
                    }
                    self.asm.emit_rr(Mnemonic::Pcmpgtq, x2r, x1r);
                    self.asm.emit_rr(Mnemonic::Pcmpeqd, x2r, x2r);
                    self.asm.emit_rr(Mnemonic::Pxor, x2r, x1r);
                    x1r
                } else {
                    let min = if cmp == IntCmp::LeS {
                        by_int_shape(shape, Mnemonic::Pminsb, Mnemonic::Pminsw, Mnemonic::Pminsd, Mnemonic::Pminsd)
                    } else {
                        by_int_shape(shape, Mnemonic::Pminub, Mnemonic::Pminuw, Mnemonic::Pminud, Mnemonic::Pminud)
                    };
                    let tmp = self.alloc_vec()?;
                    self.asm.emit_rr(Mnemonic::Movdqa, x1r, tmp);
                    self.asm.emit_rr(min, x2r, tmp);
                    self.asm.emit_rr(pcmpeq(shape), tmp, x1r);
                    self.regs.mark_unused(tmp);
                    x1r
                }
            }
            IntCmp::GeS | IntCmp::GeU => {
                if shape == Shape::I64x2 {
                    if cmp == IntCmp::GeU {
                        return Err(Error::InvalidIr("unsigned i64x2 comparison".into()));
                    }
                    self.asm.emit_rr(Mnemonic::Pcmpgtq, x1r, x2r);
                    self.asm.emit_rr(Mnemonic::Pcmpeqd, x1r, x1r);
                    self.asm.emit_rr(Mnemonic::Pxor, x1r, x2r);
                    x2r
                } else {
                    let max = if cmp == IntCmp::GeS {
                        by_int_shape(shape, Mnemonic::Pmaxsb, Mnemonic::Pmaxsw, Mnemonic::Pmaxsd, Mnemonic::Pmaxsd)
                    } else {
                        by_int_shape(shape, Mnemonic::Pmaxub, Mnemonic::Pmaxuw, Mnemonic::Pmaxud, Mnemonic::Pmaxud)
                    };
                    let tmp = self.alloc_vec()?;
                    self.asm.emit_rr(Mnemonic::Movdqa, x1r, tmp);
                    self.asm.emit_rr(max, x2r, tmp);
                    self.asm.emit_rr(pcmpeq(shape), tmp, x1r);
                    self.regs.mark_unused(tmp);
                    x1r
                }
            }
        };
        let other = if result == x1r { x2r } else { x1r };
        self.regs.mark_unused(other);
        self.stack.push_vreg(result, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_float_cmp(&mut self, shape: Shape, cmp: FloatCmp) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let (x1r, x2r) = (x1.vr(), x2.vr());
        let inst = if shape == Shape::F32x4 { Mnemonic::Cmpps } else { Mnemonic::Cmppd };
        // CMPPS predicates: 0 = EQ, 1 = LT, 2 = LE, 4 = NEQ. GT/GE swap
        // operands onto LT/LE.
        let result = match cmp {
            FloatCmp::Eq => {
                self.asm.emit_rr_imm(inst, x2r, x1r, 0);
                x1r
            }
            FloatCmp::Ne => {
                self.asm.emit_rr_imm(inst, x2r, x1r, 4);
                x1r
            }
            FloatCmp::Lt => {
                self.asm.emit_rr_imm(inst, x2r, x1r, 1);
                x1r
            }
            FloatCmp::Le => {
                self.asm.emit_rr_imm(inst, x2r, x1r, 2);
                x1r
            }
            FloatCmp::Gt => {
                self.asm.emit_rr_imm(inst, x1r, x2r, 1);
                x2r
            }
            FloatCmp::Ge => {
                self.asm.emit_rr_imm(inst, x1r, x2r, 2);
                x2r
            }
        };
        let other = if result == x1r { x2r } else { x1r };
        self.regs.mark_unused(other);
        self.stack.push_vreg(result, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_add(&mut self, shape: Shape) -> Result<()> {
        let inst = match shape {
            Shape::I8x16 => Mnemonic::Paddb,
            Shape::I16x8 => Mnemonic::Paddw,
            Shape::I32x4 => Mnemonic::Paddd,
            Shape::I64x2 => Mnemonic::Paddq,
            Shape::F32x4 => Mnemonic::Addps,
            Shape::F64x2 => Mnemonic::Addpd,
        };
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_sub(&mut self, shape: Shape) -> Result<()> {
        let inst = match shape {
            Shape::I8x16 => Mnemonic::Psubb,
            Shape::I16x8 => Mnemonic::Psubw,
            Shape::I32x4 => Mnemonic::Psubd,
            Shape::I64x2 => Mnemonic::Psubq,
            Shape::F32x4 => Mnemonic::Subps,
            Shape::F64x2 => Mnemonic::Subpd,
        };
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_mul(&mut self, shape: Shape) -> Result<()> {
        let inst = match shape {
            Shape::I16x8 => Mnemonic::Pmullw,
            Shape::I32x4 => Mnemonic::Pmulld,
            Shape::I64x2 => return self.lower_v128_mul_i64x2(),
            Shape::F32x4 => Mnemonic::Mulps,
            Shape::F64x2 => Mnemonic::Mulpd,
            Shape::I8x16 => return Err(Error::InvalidIr("i8x16 multiplication".into())),
        };
        self.v128_binop(inst)
    }

    /// No 64x64→64 packed multiply below AVX-512: build it from three
    /// 32x32→64 PMULUDQ, an add of the crossed partial products shifted
    /// into the high half, and the low product.
    fn lower_v128_mul_i64x2(&mut self) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let (x1r, x2r) = (x1.vr(), x2.vr());
        let tmp1 = self.alloc_vec()?;
        let tmp2 = self.alloc_vec()?;
        self.asm.emit_rr(Mnemonic::Movdqa, x1r, tmp1);
        self.asm.emit_const_to_reg(Mnemonic::Psrlq, 32, tmp1);
        self.asm.emit_rr(Mnemonic::Pmuludq, x2r, tmp1);
        self.asm.emit_rr(Mnemonic::Movdqa, x2r, tmp2);
        self.asm.emit_const_to_reg(Mnemonic::Psrlq, 32, tmp2);
        self.asm.emit_rr(Mnemonic::Pmuludq, x1r, tmp2);
        self.asm.emit_rr(Mnemonic::Paddq, tmp2, tmp1);
        self.asm.emit_const_to_reg(Mnemonic::Psllq, 32, tmp1);
        self.asm.emit_rr(Mnemonic::Pmuludq, x2r, x1r);
        self.asm.emit_rr(Mnemonic::Paddq, tmp1, x1r);
        self.regs.mark_unused(tmp1);
        self.regs.mark_unused(tmp2);
        self.release(&x2);
        self.stack.push_vreg(x1r, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_div(&mut self, shape: Shape) -> Result<()> {
        let inst = match shape {
            Shape::F32x4 => Mnemonic::Divps,
            Shape::F64x2 => Mnemonic::Divpd,
            _ => return Err(Error::InvalidIr("integer packed division".into())),
        };
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_add_sat(&mut self, shape: Shape, signed: bool) -> Result<()> {
        let inst = match (shape, signed) {
            (Shape::I8x16, true) => Mnemonic::Paddsb,
            (Shape::I8x16, false) => Mnemonic::Paddusb,
            (Shape::I16x8, true) => Mnemonic::Paddsw,
            (Shape::I16x8, false) => Mnemonic::Paddusw,
            _ => return Err(Error::InvalidIr("saturating add lane width".into())),
        };
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_sub_sat(&mut self, shape: Shape, signed: bool) -> Result<()> {
        let inst = match (shape, signed) {
            (Shape::I8x16, true) => Mnemonic::Psubsb,
            (Shape::I8x16, false) => Mnemonic::Psubusb,
            (Shape::I16x8, true) => Mnemonic::Psubsw,
            (Shape::I16x8, false) => Mnemonic::Psubusw,
            _ => return Err(Error::InvalidIr("saturating sub lane width".into())),
        };
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_neg(&mut self, shape: Shape) -> Result<()> {
        if shape.is_float() {
            let value = self.pop_vec()?;
            let tmp = self.alloc_vec()?;
            self.asm.emit_rr(Mnemonic::Pcmpeqd, tmp, tmp);
            if shape == Shape::F32x4 {
                self.asm.emit_const_to_reg(Mnemonic::Pslld, 31, tmp);
                self.asm.emit_rr(Mnemonic::Xorps, tmp, value.vr());
            } else {
                self.asm.emit_const_to_reg(Mnemonic::Psllq, 63, tmp);
                self.asm.emit_rr(Mnemonic::Xorpd, tmp, value.vr());
            }
            self.regs.mark_unused(tmp);
            self.stack.push_vreg(value.vr(), ValType::V128);
        } else {
            let value = self.pop_vec()?;
            let result = self.alloc_vec()?;
            let sub = by_int_shape(shape, Mnemonic::Psubb, Mnemonic::Psubw, Mnemonic::Psubd, Mnemonic::Psubq);
            self.asm.emit_rr(Mnemonic::Pxor, result, result);
            self.asm.emit_rr(sub, value.vr(), result);
            self.release(&value);
            self.stack.push_vreg(result, ValType::V128);
        }
        Ok(())
    }

    pub(crate) fn lower_v128_sqrt(&mut self, shape: Shape) -> Result<()> {
        let inst = match shape {
            Shape::F32x4 => Mnemonic::Sqrtps,
            Shape::F64x2 => Mnemonic::Sqrtpd,
            _ => return Err(Error::InvalidIr("integer packed sqrt".into())),
        };
        let value = self.pop_vec()?;
        self.asm.emit_rr(inst, value.vr(), value.vr());
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_abs(&mut self, shape: Shape) -> Result<()> {
        if shape == Shape::I64x2 {
            return self.lower_v128_abs_i64x2();
        }
        let value = self.pop_vec()?;
        let vr = value.vr();
        match shape {
            Shape::I8x16 => self.asm.emit_rr(Mnemonic::Pabsb, vr, vr),
            Shape::I16x8 => self.asm.emit_rr(Mnemonic::Pabsw, vr, vr),
            Shape::I32x4 => self.asm.emit_rr(Mnemonic::Pabsd, vr, vr),
            Shape::F32x4 | Shape::F64x2 => {
                let tmp = self.alloc_vec()?;
                self.asm.emit_rr(Mnemonic::Pcmpeqd, tmp, tmp);
                if shape == Shape::F32x4 {
                    self.asm.emit_const_to_reg(Mnemonic::Psrld, 1, tmp);
                    self.asm.emit_rr(Mnemonic::Andps, tmp, vr);
                } else {
                    self.asm.emit_const_to_reg(Mnemonic::Psrlq, 1, tmp);
                    self.asm.emit_rr(Mnemonic::Andpd, tmp, vr);
                }
                self.regs.mark_unused(tmp);
            }
            Shape::I64x2 => unreachable!(),
        }
        self.stack.push_vreg(vr, ValType::V128);
        Ok(())
    }

    /// PABSQ needs AVX-512; select between the value and its negation
    /// with BLENDVPD, whose mask operand is hardwired to XMM0.
    fn lower_v128_abs_i64x2(&mut self) -> Result<()> {
        self.claim_specific(Reg::Xmm0)?;
        let value = self.pop_vec()?;
        let vr = value.vr();
        debug_assert!(vr != Reg::Xmm0, "operand must not own the blend mask register");
        let tmp = self.alloc_vec()?;
        self.asm.emit_rr(Mnemonic::Movdqa, vr, tmp);
        self.asm.emit_rr(Mnemonic::Pxor, Reg::Xmm0, Reg::Xmm0);
        self.asm.emit_rr(Mnemonic::Psubq, vr, Reg::Xmm0);
        self.asm.emit_rr(Mnemonic::Movdqa, Reg::Xmm0, vr);
        // Negative lanes of the negation have their sign clear, so the
        // blend keeps the original only where it was positive.
        self.asm.emit_rr(Mnemonic::Blendvpd, tmp, vr);
        self.regs.mark_unused(Reg::Xmm0);
        self.regs.mark_unused(tmp);
        self.stack.push_vreg(vr, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_popcnt(&mut self) -> Result<()> {
        let value = self.pop_vec()?;
        let vr = value.vr();
        let tmp1 = self.alloc_vec()?;
        let tmp2 = self.alloc_vec()?;
        let tmp3 = self.alloc_vec()?;
        // Nibble-table lookup: translate both halves of each byte through
        // the 16-entry popcount table and add.
        self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &POPCNT_MASK, tmp1);
        self.asm.emit_rr(Mnemonic::Movdqa, vr, tmp2);
        self.asm.emit_rr(Mnemonic::Pand, tmp1, tmp2);
        self.asm.emit_const_to_reg(Mnemonic::Psrlw, 4, vr);
        self.asm.emit_rr(Mnemonic::Pand, tmp1, vr);
        self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &POPCNT_TABLE, tmp1);
        self.asm.emit_rr(Mnemonic::Movdqa, tmp1, tmp3);
        self.asm.emit_rr(Mnemonic::Pshufb, tmp2, tmp3);
        self.asm.emit_rr(Mnemonic::Pshufb, vr, tmp1);
        self.asm.emit_rr(Mnemonic::Movdqa, tmp1, vr);
        self.asm.emit_rr(Mnemonic::Paddb, tmp3, vr);
        self.regs.mark_unused(tmp1);
        self.regs.mark_unused(tmp2);
        self.regs.mark_unused(tmp3);
        self.stack.push_vreg(vr, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_min(&mut self, shape: Shape, signed: bool) -> Result<()> {
        if shape.is_float() {
            return self.lower_v128_min_max_float(shape, true);
        }
        let inst = if signed {
            by_int_shape(shape, Mnemonic::Pminsb, Mnemonic::Pminsw, Mnemonic::Pminsd, Mnemonic::Pminsd)
        } else {
            by_int_shape(shape, Mnemonic::Pminub, Mnemonic::Pminuw, Mnemonic::Pminud, Mnemonic::Pminud)
        };
        if shape == Shape::I64x2 {
            return Err(Error::InvalidIr("i64x2 packed min".into()));
        }
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_max(&mut self, shape: Shape, signed: bool) -> Result<()> {
        if shape.is_float() {
            return self.lower_v128_min_max_float(shape, false);
        }
        let inst = if signed {
            by_int_shape(shape, Mnemonic::Pmaxsb, Mnemonic::Pmaxsw, Mnemonic::Pmaxsd, Mnemonic::Pmaxsd)
        } else {
            by_int_shape(shape, Mnemonic::Pmaxub, Mnemonic::Pmaxuw, Mnemonic::Pmaxud, Mnemonic::Pmaxud)
        };
        if shape == Shape::I64x2 {
            return Err(Error::InvalidIr("i64x2 packed max".into()));
        }
        self.v128_binop(inst)
    }

    /// MINPS/MAXPS alone pick the second operand on NaN; run both
    /// directions, OR the candidates, and overwrite unordered lanes with
    /// the canonical NaN.
    fn lower_v128_min_max_float(&mut self, shape: Shape, is_min: bool) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let (x1r, x2r) = (x1.vr(), x2.vr());
        let tmp = self.alloc_vec()?;
        let (cmp, andn, or, shift, shift_by) = if shape == Shape::F32x4 {
            (Mnemonic::Cmpps, Mnemonic::Andnps, Mnemonic::Orps, Mnemonic::Psrld, 10)
        } else {
            (Mnemonic::Cmppd, Mnemonic::Andnpd, Mnemonic::Orpd, Mnemonic::Psrlq, 13)
        };
        let op = match (shape, is_min) {
            (Shape::F32x4, true) => Mnemonic::Minps,
            (Shape::F32x4, false) => Mnemonic::Maxps,
            (Shape::F64x2, true) => Mnemonic::Minpd,
            (Shape::F64x2, false) => Mnemonic::Maxpd,
            _ => return Err(Error::InvalidIr("float min/max on integer shape".into())),
        };
        self.asm.emit_rr(Mnemonic::Movdqa, x1r, tmp);
        self.asm.emit_rr(op, x2r, tmp);
        self.asm.emit_rr(op, x1r, x2r);
        self.asm.emit_rr(Mnemonic::Movdqa, tmp, x1r);
        // Unordered mask, ORed into the candidates, then shifted right so
        // AND-NOT leaves exponent + mantissa MSB: the canonical NaN.
        self.asm.emit_rr_imm(cmp, x2r, x1r, 3);
        self.asm.emit_rr(or, x1r, tmp);
        self.asm.emit_const_to_reg(shift, shift_by, x1r);
        self.asm.emit_rr(andn, tmp, x1r);
        self.regs.mark_unused(tmp);
        self.release(&x2);
        self.stack.push_vreg(x1r, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_avgr_u(&mut self, shape: Shape) -> Result<()> {
        let inst = match shape {
            Shape::I8x16 => Mnemonic::Pavgb,
            Shape::I16x8 => Mnemonic::Pavgw,
            _ => return Err(Error::InvalidIr("avgr lane width".into())),
        };
        self.v128_binop(inst)
    }

    /// Pseudo-min/max: the asymmetric `b < a ? b : a` select, which is
    /// exactly the MINPS/MAXPS operand rule.
    pub(crate) fn lower_v128_pminmax(&mut self, shape: Shape, is_min: bool) -> Result<()> {
        let inst = match (shape, is_min) {
            (Shape::F32x4, true) => Mnemonic::Minps,
            (Shape::F32x4, false) => Mnemonic::Maxps,
            (Shape::F64x2, true) => Mnemonic::Minpd,
            (Shape::F64x2, false) => Mnemonic::Maxpd,
            _ => return Err(Error::InvalidIr("pmin/pmax on integer shape".into())),
        };
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_round(&mut self, shape: Shape, kind: RoundKind) -> Result<()> {
        let inst = match shape {
            Shape::F32x4 => Mnemonic::Roundps,
            Shape::F64x2 => Mnemonic::Roundpd,
            _ => return Err(Error::InvalidIr("rounding on integer shape".into())),
        };
        let value = self.pop_vec()?;
        self.asm.emit_rr_imm(inst, value.vr(), value.vr(), round_imm(kind));
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_extend(&mut self, origin: Shape, signed: bool, low: bool) -> Result<()> {
        let value = self.pop_vec()?;
        let vr = value.vr();
        if !low {
            self.asm.emit_const_to_reg(Mnemonic::Psrldq, 8, vr);
        }
        let inst = match (origin, signed) {
            (Shape::I8x16, true) => Mnemonic::Pmovsxbw,
            (Shape::I8x16, false) => Mnemonic::Pmovzxbw,
            (Shape::I16x8, true) => Mnemonic::Pmovsxwd,
            (Shape::I16x8, false) => Mnemonic::Pmovzxwd,
            (Shape::I32x4, true) => Mnemonic::Pmovsxdq,
            (Shape::I32x4, false) => Mnemonic::Pmovzxdq,
            _ => return Err(Error::InvalidIr("extend origin shape".into())),
        };
        self.asm.emit_rr(inst, vr, vr);
        self.stack.push_vreg(vr, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_ext_mul(&mut self, origin: Shape, signed: bool, low: bool) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let (x1r, x2r) = (x1.vr(), x2.vr());
        if !low {
            self.asm.emit_const_to_reg(Mnemonic::Psrldq, 8, x1r);
            self.asm.emit_const_to_reg(Mnemonic::Psrldq, 8, x2r);
        }
        match origin {
            Shape::I8x16 | Shape::I16x8 => {
                let (widen, mul) = if origin == Shape::I8x16 {
                    (
                        if signed { Mnemonic::Pmovsxbw } else { Mnemonic::Pmovzxbw },
                        Mnemonic::Pmullw,
                    )
                } else {
                    (
                        if signed { Mnemonic::Pmovsxwd } else { Mnemonic::Pmovzxwd },
                        Mnemonic::Pmulld,
                    )
                };
                self.asm.emit_rr(widen, x1r, x1r);
                self.asm.emit_rr(widen, x2r, x2r);
                self.asm.emit_rr(mul, x2r, x1r);
            }
            Shape::I32x4 => {
                // PMUL(U)DQ reads the doublewords at positions 0 and 2.
                self.asm.emit_rr_imm(Mnemonic::Pshufd, x1r, x1r, 0b0001_0000);
                self.asm.emit_rr_imm(Mnemonic::Pshufd, x2r, x2r, 0b0001_0000);
                let mul = if signed { Mnemonic::Pmuldq } else { Mnemonic::Pmuludq };
                self.asm.emit_rr(mul, x2r, x1r);
            }
            _ => return Err(Error::InvalidIr("extmul origin shape".into())),
        }
        self.release(&x2);
        self.stack.push_vreg(x1r, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_q15mulr_sat_s(&mut self) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let tmp = self.alloc_vec()?;
        self.asm.emit_rr(Mnemonic::Pmulhrsw, x2.vr(), x1.vr());
        // 0x8000 × 0x8000 rounds to 0x8000; the wasm result saturates to
        // 0x7FFF, one XOR away.
        self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &SIGN_I16, tmp);
        self.asm.emit_rr(Mnemonic::Pcmpeqw, x1.vr(), tmp);
        self.asm.emit_rr(Mnemonic::Pxor, tmp, x1.vr());
        self.regs.mark_unused(tmp);
        self.release(&x2);
        self.stack.push_vreg(x1.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_ext_add_pairwise(&mut self, origin: Shape, signed: bool) -> Result<()> {
        let value = self.pop_vec()?;
        let vr = value.vr();
        let tmp = self.alloc_vec()?;
        match (origin, signed) {
            (Shape::I8x16, true) => {
                // PMADDUBSW treats its destination as unsigned: feed the
                // all-ones vector on that side.
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &ONES_I8, tmp);
                self.asm.emit_rr(Mnemonic::Pmaddubsw, vr, tmp);
                self.regs.mark_unused(vr);
                self.stack.push_vreg(tmp, ValType::V128);
                return Ok(());
            }
            (Shape::I8x16, false) => {
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &ONES_I8, tmp);
                self.asm.emit_rr(Mnemonic::Pmaddubsw, tmp, vr);
            }
            (Shape::I16x8, true) => {
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &ONES_I16, tmp);
                self.asm.emit_rr(Mnemonic::Pmaddwd, tmp, vr);
            }
            (Shape::I16x8, false) => {
                // Flip to signed, pairwise-add, then undo the two biases.
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &SIGN_I16, tmp);
                self.asm.emit_rr(Mnemonic::Pxor, tmp, vr);
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &ONES_I16, tmp);
                self.asm.emit_rr(Mnemonic::Pmaddwd, tmp, vr);
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &PAIRWISE_BIAS_I32, tmp);
                self.asm.emit_rr(Mnemonic::Paddd, tmp, vr);
            }
            _ => return Err(Error::InvalidIr("extadd_pairwise origin shape".into())),
        }
        self.regs.mark_unused(tmp);
        self.stack.push_vreg(vr, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_float_promote(&mut self) -> Result<()> {
        let value = self.pop_vec()?;
        self.asm.emit_rr(Mnemonic::Cvtps2pd, value.vr(), value.vr());
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_float_demote(&mut self) -> Result<()> {
        let value = self.pop_vec()?;
        self.asm.emit_rr(Mnemonic::Cvtpd2ps, value.vr(), value.vr());
        self.stack.push_vreg(value.vr(), ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_fconvert_i(&mut self, shape: Shape, signed: bool) -> Result<()> {
        let value = self.pop_vec()?;
        let vr = value.vr();
        match (shape, signed) {
            (Shape::F32x4, true) => self.asm.emit_rr(Mnemonic::Cvtdq2ps, vr, vr),
            (Shape::F32x4, false) => {
                // Convert the 16-bit halves separately; both fit in the
                // signed converter, and the high half is scaled by 2^16.
                let tmp = self.alloc_vec()?;
                let scale = self.alloc_vec()?;
                self.asm.emit_rr(Mnemonic::Movdqa, vr, tmp);
                self.asm.emit_const_to_reg(Mnemonic::Psrld, 16, tmp);
                self.asm.emit_rr(Mnemonic::Cvtdq2ps, tmp, tmp);
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F32X4_65536, scale);
                self.asm.emit_rr(Mnemonic::Mulps, scale, tmp);
                self.asm.emit_const_to_reg(Mnemonic::Pslld, 16, vr);
                self.asm.emit_const_to_reg(Mnemonic::Psrld, 16, vr);
                self.asm.emit_rr(Mnemonic::Cvtdq2ps, vr, vr);
                self.asm.emit_rr(Mnemonic::Addps, tmp, vr);
                self.regs.mark_unused(tmp);
                self.regs.mark_unused(scale);
            }
            (Shape::F64x2, true) => self.asm.emit_rr(Mnemonic::Cvtdq2pd, vr, vr),
            (Shape::F64x2, false) => {
                // Interleave each u32 under a 2^52 exponent and subtract
                // the magic constant back out.
                let tmp = self.alloc_vec()?;
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F64_MAGIC_HI, tmp);
                self.asm.emit_rr(Mnemonic::Unpcklps, tmp, vr);
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F64X2_2P52, tmp);
                self.asm.emit_rr(Mnemonic::Subpd, tmp, vr);
                self.regs.mark_unused(tmp);
            }
            _ => return Err(Error::InvalidIr("fconvert destination shape".into())),
        }
        self.stack.push_vreg(vr, ValType::V128);
        Ok(())
    }

    pub(crate) fn lower_v128_dot(&mut self) -> Result<()> {
        self.v128_binop(Mnemonic::Pmaddwd)
    }

    pub(crate) fn lower_v128_narrow(&mut self, origin: Shape, signed: bool) -> Result<()> {
        let inst = match (origin, signed) {
            (Shape::I16x8, true) => Mnemonic::Packsswb,
            (Shape::I16x8, false) => Mnemonic::Packuswb,
            (Shape::I32x4, true) => Mnemonic::Packssdw,
            (Shape::I32x4, false) => Mnemonic::Packusdw,
            _ => return Err(Error::InvalidIr("narrow origin shape".into())),
        };
        self.v128_binop(inst)
    }

    pub(crate) fn lower_v128_itrunc_sat_f(&mut self, origin: Shape, signed: bool) -> Result<()> {
        let value = self.pop_vec()?;
        let vr = value.vr();
        match (origin, signed) {
            (Shape::F32x4, true) => {
                let tmp = self.alloc_vec()?;
                // Ordered-self mask zeroes NaN lanes before conversion.
                self.asm.emit_rr(Mnemonic::Movaps, vr, tmp);
                self.asm.emit_rr_imm(Mnemonic::Cmpps, tmp, tmp, 7);
                self.asm.emit_rr(Mnemonic::Andps, tmp, vr);
                // Positive overflow converts to INT_MIN; XOR with the
                // `>= 2^31` mask flips those lanes to INT_MAX.
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F32X4_2P31, tmp);
                self.asm.emit_rr_imm(Mnemonic::Cmpps, vr, tmp, 2);
                self.asm.emit_rr(Mnemonic::Cvttps2dq, vr, vr);
                self.asm.emit_rr(Mnemonic::Pxor, tmp, vr);
                self.regs.mark_unused(tmp);
            }
            (Shape::F32x4, false) => {
                let zero = self.alloc_vec()?;
                let bound = self.alloc_vec()?;
                let high = self.alloc_vec()?;
                self.asm.emit_rr(Mnemonic::Pxor, zero, zero);
                // NaN and negatives clamp to zero.
                self.asm.emit_rr(Mnemonic::Maxps, zero, vr);
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F32X4_2P31, bound);
                // high = trunc(v - 2^31) with overflow lanes saturated,
                // negative lanes clamped to zero; low = trunc(v), which is
                // INT_MIN exactly on the lanes where `high` contributes.
                self.asm.emit_rr(Mnemonic::Movaps, vr, high);
                self.asm.emit_rr(Mnemonic::Subps, bound, high);
                self.asm.emit_rr_imm(Mnemonic::Cmpps, high, bound, 2);
                self.asm.emit_rr(Mnemonic::Cvttps2dq, high, high);
                self.asm.emit_rr(Mnemonic::Pxor, bound, high);
                self.asm.emit_rr(Mnemonic::Pmaxsd, zero, high);
                self.asm.emit_rr(Mnemonic::Cvttps2dq, vr, vr);
                self.asm.emit_rr(Mnemonic::Paddd, high, vr);
                self.regs.mark_unused(zero);
                self.regs.mark_unused(bound);
                self.regs.mark_unused(high);
            }
            (Shape::F64x2, true) => {
                let tmp = self.alloc_vec()?;
                self.asm.emit_rr(Mnemonic::Movaps, vr, tmp);
                self.asm.emit_rr_imm(Mnemonic::Cmppd, tmp, tmp, 7);
                self.asm.emit_rr(Mnemonic::Andpd, tmp, vr);
                // Clamp the high end; CVTTPD2DQ saturates the low end to
                // INT_MIN itself and zeroes the upper half.
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F64X2_INT32_MAX, tmp);
                self.asm.emit_rr(Mnemonic::Minpd, tmp, vr);
                self.asm.emit_rr(Mnemonic::Cvttpd2dq, vr, vr);
                self.regs.mark_unused(tmp);
            }
            (Shape::F64x2, false) => {
                let tmp = self.alloc_vec()?;
                self.asm.emit_rr(Mnemonic::Movaps, vr, tmp);
                self.asm.emit_rr_imm(Mnemonic::Cmppd, tmp, tmp, 7);
                self.asm.emit_rr(Mnemonic::Andpd, tmp, vr);
                self.asm.emit_rr(Mnemonic::Xorpd, tmp, tmp);
                self.asm.emit_rr(Mnemonic::Maxpd, tmp, vr);
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F64X2_UINT32_MAX, tmp);
                self.asm.emit_rr(Mnemonic::Minpd, tmp, vr);
                self.asm.emit_rr_imm(Mnemonic::Roundpd, vr, vr, 3);
                // 2^52 + x leaves x in the low mantissa dwords; gather
                // them and zero the rest.
                self.asm.load_static_const_to_reg(Mnemonic::Movdqu, &F64X2_2P52, tmp);
                self.asm.emit_rr(Mnemonic::Addpd, tmp, vr);
                self.asm.emit_rr(Mnemonic::Xorpd, tmp, tmp);
                self.asm.emit_rr_imm(Mnemonic::Shufps, tmp, vr, 0b1000_1000);
                self.regs.mark_unused(tmp);
            }
            _ => return Err(Error::InvalidIr("trunc_sat origin shape".into())),
        }
        self.stack.push_vreg(vr, ValType::V128);
        Ok(())
    }
}
