//! Scalar float lowering.
//!
//! min/max carry WebAssembly's NaN-propagation requirement, which the
//! plain MINSS/MAXSS family does not provide: the emitted sequence runs
//! the operation in both directions, ORs the candidates, builds an
//! unordered mask, and replaces NaN lanes with the canonical NaN by
//! shifting the mask into the mantissa and AND-NOT-ing it in.

use crate::abi::SCRATCH_REG;
use crate::asm::{Cond, Mnemonic};
use crate::error::Result;
use crate::ir::{FloatCmp, FloatTy, RoundKind};

use super::codegen::Compiler;

fn pick(ty: FloatTy, single: Mnemonic, double: Mnemonic) -> Mnemonic {
    match ty {
        FloatTy::F32 => single,
        FloatTy::F64 => double,
    }
}

pub(crate) fn round_imm(kind: RoundKind) -> u8 {
    match kind {
        RoundKind::Nearest => 0,
        RoundKind::Floor => 1,
        RoundKind::Ceil => 2,
        RoundKind::Trunc => 3,
    }
}

impl Compiler {
    pub(crate) fn lower_float_binop(
        &mut self,
        ty: FloatTy,
        single: Mnemonic,
        double: Mnemonic,
    ) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        self.asm.emit_rr(pick(ty, single, double), x2.vr(), x1.vr());
        self.stack.push_vreg(x1.vr(), ty.val_type());
        self.release(&x2);
        Ok(())
    }

    pub(crate) fn lower_fsqrt(&mut self, ty: FloatTy) -> Result<()> {
        let value = self.pop_vec()?;
        self.asm
            .emit_rr(pick(ty, Mnemonic::Sqrtss, Mnemonic::Sqrtsd), value.vr(), value.vr());
        self.stack.push_vreg(value.vr(), ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_fabs(&mut self, ty: FloatTy) -> Result<()> {
        let value = self.pop_vec()?;
        let mask = self.alloc_vec()?;
        // All-ones shifted right by one clears exactly the sign bit.
        self.asm.emit_rr(Mnemonic::Pcmpeqd, mask, mask);
        match ty {
            FloatTy::F32 => {
                self.asm.emit_const_to_reg(Mnemonic::Psrld, 1, mask);
                self.asm.emit_rr(Mnemonic::Andps, mask, value.vr());
            }
            FloatTy::F64 => {
                self.asm.emit_const_to_reg(Mnemonic::Psrlq, 1, mask);
                self.asm.emit_rr(Mnemonic::Andpd, mask, value.vr());
            }
        }
        self.regs.mark_unused(mask);
        self.stack.push_vreg(value.vr(), ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_fneg(&mut self, ty: FloatTy) -> Result<()> {
        let value = self.pop_vec()?;
        let mask = self.alloc_vec()?;
        self.asm.emit_rr(Mnemonic::Pcmpeqd, mask, mask);
        match ty {
            FloatTy::F32 => {
                self.asm.emit_const_to_reg(Mnemonic::Pslld, 31, mask);
                self.asm.emit_rr(Mnemonic::Xorps, mask, value.vr());
            }
            FloatTy::F64 => {
                self.asm.emit_const_to_reg(Mnemonic::Psllq, 63, mask);
                self.asm.emit_rr(Mnemonic::Xorpd, mask, value.vr());
            }
        }
        self.regs.mark_unused(mask);
        self.stack.push_vreg(value.vr(), ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_fround(&mut self, ty: FloatTy, kind: RoundKind) -> Result<()> {
        let value = self.pop_vec()?;
        let inst = pick(ty, Mnemonic::Roundss, Mnemonic::Roundsd);
        self.asm.emit_rr_imm(inst, value.vr(), value.vr(), round_imm(kind));
        self.stack.push_vreg(value.vr(), ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_copysign(&mut self, ty: FloatTy) -> Result<()> {
        let sign = self.pop_vec()?;
        let magnitude = self.pop_vec()?;
        let mask = self.alloc_vec()?;
        let (shift, shift_by, and, andn, or) = match ty {
            FloatTy::F32 => {
                (Mnemonic::Pslld, 31, Mnemonic::Andps, Mnemonic::Andnps, Mnemonic::Orps)
            }
            FloatTy::F64 => {
                (Mnemonic::Psllq, 63, Mnemonic::Andpd, Mnemonic::Andnpd, Mnemonic::Orpd)
            }
        };
        self.asm.emit_rr(Mnemonic::Pcmpeqd, mask, mask);
        self.asm.emit_const_to_reg(shift, shift_by, mask);
        // sign keeps only its sign bit; mask becomes the magnitude with
        // the sign cleared; OR merges them.
        self.asm.emit_rr(and, mask, sign.vr());
        self.asm.emit_rr(andn, magnitude.vr(), mask);
        self.asm.emit_rr(or, sign.vr(), mask);
        self.release(&magnitude);
        self.release(&sign);
        self.stack.push_vreg(mask, ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_float_min_max(&mut self, ty: FloatTy, is_min: bool) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let tmp = self.alloc_vec()?;
        let (op, cmp, or, shift, shift_by, andn) = match (ty, is_min) {
            (FloatTy::F32, true) => (
                Mnemonic::Minss,
                Mnemonic::Cmpss,
                Mnemonic::Orps,
                Mnemonic::Psrld,
                10,
                Mnemonic::Andnps,
            ),
            (FloatTy::F32, false) => (
                Mnemonic::Maxss,
                Mnemonic::Cmpss,
                Mnemonic::Orps,
                Mnemonic::Psrld,
                10,
                Mnemonic::Andnps,
            ),
            (FloatTy::F64, true) => (
                Mnemonic::Minsd,
                Mnemonic::Cmpsd,
                Mnemonic::Orpd,
                Mnemonic::Psrlq,
                13,
                Mnemonic::Andnpd,
            ),
            (FloatTy::F64, false) => (
                Mnemonic::Maxsd,
                Mnemonic::Cmpsd,
                Mnemonic::Orpd,
                Mnemonic::Psrlq,
                13,
                Mnemonic::Andnpd,
            ),
        };
        // Run min/max in both operand orders so a NaN input survives in
        // one of the candidates regardless of which side it was on.
        self.asm.emit_rr(Mnemonic::Movaps, x1.vr(), tmp);
        self.asm.emit_rr(op, x2.vr(), tmp);
        self.asm.emit_rr(op, x1.vr(), x2.vr());
        self.asm.emit_rr(Mnemonic::Movaps, tmp, x1.vr());
        // Unordered predicate: all-ones where either input is NaN.
        self.asm.emit_rr_imm(cmp, x2.vr(), x1.vr(), 3);
        self.asm.emit_rr(or, x1.vr(), tmp);
        // Shifting the mask right turns it into the canonical-NaN
        // complement: AND-NOT keeps the mantissa MSB set, exponent
        // all-ones, lower mantissa cleared.
        self.asm.emit_const_to_reg(shift, shift_by, x1.vr());
        self.asm.emit_rr(andn, tmp, x1.vr());
        self.regs.mark_unused(tmp);
        self.release(&x2);
        self.stack.push_vreg(x1.vr(), ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_float_cmp(&mut self, ty: FloatTy, cmp: FloatCmp) -> Result<()> {
        let x2 = self.pop_vec()?;
        let x1 = self.pop_vec()?;
        let ucomi = pick(ty, Mnemonic::Ucomiss, Mnemonic::Ucomisd);
        match cmp {
            FloatCmp::Eq | FloatCmp::Ne => {
                // ZF alone cannot distinguish equality from unordered;
                // combine it with PF in a register.
                self.asm.emit_rr(ucomi, x2.vr(), x1.vr());
                self.release(&x1);
                self.release(&x2);
                let result = self.alloc_gp()?;
                if cmp == FloatCmp::Eq {
                    self.asm.emit_setcc(Cond::Np, result);
                    self.asm.emit_setcc(Cond::E, SCRATCH_REG);
                    self.asm.emit_rr(Mnemonic::AndL, SCRATCH_REG, result);
                } else {
                    self.asm.emit_setcc(Cond::P, result);
                    self.asm.emit_setcc(Cond::Ne, SCRATCH_REG);
                    self.asm.emit_rr(Mnemonic::OrL, SCRATCH_REG, result);
                }
                self.asm.emit_rr(Mnemonic::MovzxBL, result, result);
                self.stack.push_gpr(result, crate::ir::ValType::I32);
            }
            _ => {
                // Ordered A/AE conditions are false on unordered inputs,
                // which is exactly the NaN semantics; Lt/Le swap operands.
                let (src, dst, cond) = match cmp {
                    FloatCmp::Lt => (x1.vr(), x2.vr(), Cond::A),
                    FloatCmp::Le => (x1.vr(), x2.vr(), Cond::Ae),
                    FloatCmp::Gt => (x2.vr(), x1.vr(), Cond::A),
                    FloatCmp::Ge => (x2.vr(), x1.vr(), Cond::Ae),
                    FloatCmp::Eq | FloatCmp::Ne => unreachable!(),
                };
                self.asm.emit_rr(ucomi, src, dst);
                self.release(&x1);
                self.release(&x2);
                self.stack.push_flag(cond);
            }
        }
        Ok(())
    }
}
