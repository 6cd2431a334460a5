//! Scalar conversions: demote/promote, reinterprets across register
//! classes, trapping float→int truncation, and int→float conversion
//! including the unsigned-64 recipes the ISA has no instruction for.

use crate::abi::{ExitStatus, SCRATCH_REG};
use crate::asm::{Cond, Mnemonic};
use crate::error::Result;
use crate::ir::{FloatTy, IntTy, ValType};

use super::codegen::Compiler;
use super::stack::ValueLocation;

/// Exclusive upper bound, trap condition + inclusive/exclusive lower
/// bound, for each (int, float, signed) truncation. The bounds are exact
/// in the source float format, so a plain compare classifies every input.
struct TruncBounds {
    upper: &'static [u8],
    lower: &'static [u8],
    lower_trap: Cond,
}

// Range-check constants, exact in the source float format.
const F32_2P31: [u8; 4] = 0x4F00_0000u32.to_le_bytes();
const F32_2P32: [u8; 4] = 0x4F80_0000u32.to_le_bytes();
const F32_2P63: [u8; 4] = 0x5F00_0000u32.to_le_bytes();
const F32_2P64: [u8; 4] = 0x5F80_0000u32.to_le_bytes();
const F32_NEG_2P31: [u8; 4] = 0xCF00_0000u32.to_le_bytes();
const F32_NEG_2P63: [u8; 4] = 0xDF00_0000u32.to_le_bytes();
const F32_NEG_ONE: [u8; 4] = 0xBF80_0000u32.to_le_bytes();
const F64_2P31: [u8; 8] = 0x41E0_0000_0000_0000u64.to_le_bytes();
const F64_2P32: [u8; 8] = 0x41F0_0000_0000_0000u64.to_le_bytes();
const F64_2P63: [u8; 8] = 0x43E0_0000_0000_0000u64.to_le_bytes();
const F64_2P64: [u8; 8] = 0x43F0_0000_0000_0000u64.to_le_bytes();
const F64_NEG_2P31_MINUS_1: [u8; 8] = 0xC1E0_0000_0020_0000u64.to_le_bytes();
const F64_NEG_2P63: [u8; 8] = 0xC3E0_0000_0000_0000u64.to_le_bytes();
const F64_NEG_ONE: [u8; 8] = 0xBFF0_0000_0000_0000u64.to_le_bytes();

fn trunc_bounds(int: IntTy, float: FloatTy, signed: bool) -> TruncBounds {
    match (float, int, signed) {
        // -2^31 itself is a valid f32 input, so only strictly-below traps.
        (FloatTy::F32, IntTy::I32, true) => {
            TruncBounds { upper: &F32_2P31, lower: &F32_NEG_2P31, lower_trap: Cond::B }
        }
        (FloatTy::F32, IntTy::I32, false) => {
            TruncBounds { upper: &F32_2P32, lower: &F32_NEG_ONE, lower_trap: Cond::Be }
        }
        (FloatTy::F32, IntTy::I64, true) => {
            TruncBounds { upper: &F32_2P63, lower: &F32_NEG_2P63, lower_trap: Cond::B }
        }
        (FloatTy::F32, IntTy::I64, false) => {
            TruncBounds { upper: &F32_2P64, lower: &F32_NEG_ONE, lower_trap: Cond::Be }
        }
        // f64 can represent values between -2^31-1 and -2^31, which still
        // truncate into range; the exclusive bound is -(2^31)-1.
        (FloatTy::F64, IntTy::I32, true) => {
            TruncBounds { upper: &F64_2P31, lower: &F64_NEG_2P31_MINUS_1, lower_trap: Cond::Be }
        }
        (FloatTy::F64, IntTy::I32, false) => {
            TruncBounds { upper: &F64_2P32, lower: &F64_NEG_ONE, lower_trap: Cond::Be }
        }
        (FloatTy::F64, IntTy::I64, true) => {
            TruncBounds { upper: &F64_2P63, lower: &F64_NEG_2P63, lower_trap: Cond::B }
        }
        (FloatTy::F64, IntTy::I64, false) => {
            TruncBounds { upper: &F64_2P64, lower: &F64_NEG_ONE, lower_trap: Cond::Be }
        }
    }
}

impl Compiler {
    pub(crate) fn lower_demote(&mut self) -> Result<()> {
        let value = self.pop_vec()?;
        self.asm.emit_rr(Mnemonic::Cvtsd2ss, value.vr(), value.vr());
        self.stack.push_vreg(value.vr(), ValType::F32);
        Ok(())
    }

    pub(crate) fn lower_promote(&mut self) -> Result<()> {
        let value = self.pop_vec()?;
        self.asm.emit_rr(Mnemonic::Cvtss2sd, value.vr(), value.vr());
        self.stack.push_vreg(value.vr(), ValType::F64);
        Ok(())
    }

    /// Bit-identical retyping: the value crosses register classes when
    /// needed, via MOVD/MOVQ.
    pub(crate) fn lower_reinterpret(&mut self, target: ValType) -> Result<()> {
        let value = self.stack.pop();
        if let ValueLocation::Const(bits) = value.loc {
            self.stack.push_const(bits, target);
            return Ok(());
        }
        let mut value = value;
        if target.is_vector_class() {
            self.ensure_on_vec(&mut value)?;
            self.stack.push_vreg(value.vr(), target);
        } else {
            self.ensure_on_gp(&mut value)?;
            self.stack.push_gpr(value.gpr(), target);
        }
        Ok(())
    }

    /// Trapping float→int truncation: NaN traps, then the value is
    /// range-checked against exact bounds before CVTT, so the hardware's
    /// integer-indefinite result can never escape.
    pub(crate) fn lower_itrunc_f(&mut self, int: IntTy, float: FloatTy, signed: bool) -> Result<()> {
        let src = self.pop_vec()?;
        let bound = self.alloc_vec()?;
        let (ucomi, load) = match float {
            FloatTy::F32 => (Mnemonic::Ucomiss, Mnemonic::Movss),
            FloatTy::F64 => (Mnemonic::Ucomisd, Mnemonic::Movsd),
        };

        self.asm.emit_rr(ucomi, src.vr(), src.vr());
        self.jcc_trap(Cond::P, ExitStatus::InvalidFloatToInt);

        let bounds = trunc_bounds(int, float, signed);
        self.asm.load_static_const_to_reg(load, bounds.upper, bound);
        self.asm.emit_rr(ucomi, bound, src.vr());
        self.jcc_trap(Cond::Ae, ExitStatus::InvalidFloatToInt);
        self.asm.load_static_const_to_reg(load, bounds.lower, bound);
        self.asm.emit_rr(ucomi, bound, src.vr());
        self.jcc_trap(bounds.lower_trap, ExitStatus::InvalidFloatToInt);

        let result = self.alloc_gp()?;
        let cvt_l = match float {
            FloatTy::F32 => Mnemonic::Cvttss2siL,
            FloatTy::F64 => Mnemonic::Cvttsd2siL,
        };
        let cvt_q = match float {
            FloatTy::F32 => Mnemonic::Cvttss2siQ,
            FloatTy::F64 => Mnemonic::Cvttsd2siQ,
        };
        match (int, signed) {
            (IntTy::I32, true) => self.asm.emit_rr(cvt_l, src.vr(), result),
            (IntTy::I32, false) => {
                // Convert through 64 bits; the range check guarantees the
                // value fits in u32.
                self.asm.emit_rr(cvt_q, src.vr(), result);
                self.asm.emit_rr(Mnemonic::MovL, result, result);
            }
            (IntTy::I64, true) => self.asm.emit_rr(cvt_q, src.vr(), result),
            (IntTy::I64, false) => {
                // Values at or above 2^63 are rebased before conversion
                // and the top bit is added back.
                let two63: &[u8] = match float {
                    FloatTy::F32 => &F32_2P63,
                    FloatTy::F64 => &F64_2P63,
                };
                let sub = match float {
                    FloatTy::F32 => Mnemonic::Subss,
                    FloatTy::F64 => Mnemonic::Subsd,
                };
                let big = self.asm.new_label();
                let done = self.asm.new_label();
                self.asm.load_static_const_to_reg(load, two63, bound);
                self.asm.emit_rr(ucomi, bound, src.vr());
                self.asm.emit_jcc(Cond::Ae, big);
                self.asm.emit_rr(cvt_q, src.vr(), result);
                self.asm.emit_jmp(done);
                self.asm.bind_label(big)?;
                self.asm.emit_rr(sub, bound, src.vr());
                self.asm.emit_rr(cvt_q, src.vr(), result);
                self.asm.emit_const_to_reg(Mnemonic::MovQ, i64::MIN, SCRATCH_REG);
                self.asm.emit_rr(Mnemonic::AddQ, SCRATCH_REG, result);
                self.asm.bind_label(done)?;
            }
        }
        self.regs.mark_unused(bound);
        self.release(&src);
        self.stack.push_gpr(result, int.val_type());
        Ok(())
    }

    pub(crate) fn lower_fconvert_i(&mut self, float: FloatTy, int: IntTy, signed: bool) -> Result<()> {
        let value = self.pop_gp()?;
        let result = self.alloc_vec()?;
        let (cvt_l, cvt_q, add) = match float {
            FloatTy::F32 => (Mnemonic::Cvtsi2ssL, Mnemonic::Cvtsi2ssQ, Mnemonic::Addss),
            FloatTy::F64 => (Mnemonic::Cvtsi2sdL, Mnemonic::Cvtsi2sdQ, Mnemonic::Addsd),
        };
        match (int, signed) {
            (IntTy::I32, true) => self.asm.emit_rr(cvt_l, value.gpr(), result),
            // u32 widens losslessly into the signed 64-bit converter (the
            // upper register half is already zero).
            (IntTy::I32, false) | (IntTy::I64, true) => {
                self.asm.emit_rr(cvt_q, value.gpr(), result);
            }
            (IntTy::I64, false) => {
                // Negative u64 values (top bit set) are halved with a
                // round-to-odd sticky bit, converted, and doubled back.
                let reg = value.gpr();
                let big = self.asm.new_label();
                let done = self.asm.new_label();
                self.asm.emit_rr(Mnemonic::TestQ, reg, reg);
                self.asm.emit_jcc(Cond::S, big);
                self.asm.emit_rr(cvt_q, reg, result);
                self.asm.emit_jmp(done);
                self.asm.bind_label(big)?;
                self.asm.emit_rr(Mnemonic::MovQ, reg, SCRATCH_REG);
                self.asm.emit_const_to_reg(Mnemonic::ShrQ, 1, SCRATCH_REG);
                self.asm.emit_const_to_reg(Mnemonic::AndQ, 1, reg);
                self.asm.emit_rr(Mnemonic::OrQ, reg, SCRATCH_REG);
                self.asm.emit_rr(cvt_q, SCRATCH_REG, result);
                self.asm.emit_rr(add, result, result);
                self.asm.bind_label(done)?;
            }
        }
        self.release(&value);
        self.stack.push_vreg(result, float.val_type());
        Ok(())
    }
}
