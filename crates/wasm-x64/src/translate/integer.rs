//! Scalar integer lowering: ALU mappings, shifts through CL, the
//! trapping division sequences, and comparisons into flag-resident
//! results.

use crate::abi::{ExitStatus, SCRATCH_REG};
use crate::asm::{Cond, Mnemonic, Reg};
use crate::error::Result;
use crate::ir::{IntCmp, IntTy, ValType};

use super::codegen::Compiler;
use super::stack::ValueLocation;

fn pick(ty: IntTy, narrow: Mnemonic, wide: Mnemonic) -> Mnemonic {
    match ty {
        IntTy::I32 => narrow,
        IntTy::I64 => wide,
    }
}

pub(crate) fn cond_of_int_cmp(cmp: IntCmp) -> Cond {
    match cmp {
        IntCmp::Eq => Cond::E,
        IntCmp::Ne => Cond::Ne,
        IntCmp::LtS => Cond::L,
        IntCmp::LtU => Cond::B,
        IntCmp::GtS => Cond::G,
        IntCmp::GtU => Cond::A,
        IntCmp::LeS => Cond::Le,
        IntCmp::LeU => Cond::Be,
        IntCmp::GeS => Cond::Ge,
        IntCmp::GeU => Cond::Ae,
    }
}

impl Compiler {
    pub(crate) fn lower_int_binop(
        &mut self,
        ty: IntTy,
        narrow: Mnemonic,
        wide: Mnemonic,
    ) -> Result<()> {
        let x2 = self.pop_gp()?;
        let x1 = self.pop_gp()?;
        self.asm.emit_rr(pick(ty, narrow, wide), x2.gpr(), x1.gpr());
        self.stack.push_gpr(x1.gpr(), ty.val_type());
        self.release(&x2);
        Ok(())
    }

    /// Shifts and rotates. The hardware masks the count by 31/63, which
    /// is exactly the WebAssembly semantics; constant counts use the
    /// immediate forms, everything else goes through CL.
    pub(crate) fn lower_shift(
        &mut self,
        ty: IntTy,
        narrow: Mnemonic,
        wide: Mnemonic,
    ) -> Result<()> {
        let mnemonic = pick(ty, narrow, wide);
        let mask = match ty {
            IntTy::I32 => 31,
            IntTy::I64 => 63,
        };
        let count = self.stack.pop();
        if let ValueLocation::Const(bits) = count.loc {
            let value = self.pop_gp()?;
            self.asm.emit_const_to_reg(mnemonic, (bits & mask) as i64, value.gpr());
            self.stack.push_gpr(value.gpr(), ty.val_type());
            return Ok(());
        }
        let mut count = count;
        self.move_value_to_specific_gp(&mut count, Reg::Rcx)?;
        let value = self.pop_gp()?;
        self.asm.emit_shift_cl(mnemonic, value.gpr());
        self.regs.mark_unused(Reg::Rcx);
        self.stack.push_gpr(value.gpr(), ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_bitcount(
        &mut self,
        ty: IntTy,
        narrow: Mnemonic,
        wide: Mnemonic,
    ) -> Result<()> {
        let value = self.pop_gp()?;
        self.asm.emit_rr(pick(ty, narrow, wide), value.gpr(), value.gpr());
        self.stack.push_gpr(value.gpr(), ty.val_type());
        Ok(())
    }

    /// DIV/IDIV with the WebAssembly trap semantics: a zero divisor traps,
    /// signed `INT_MIN / -1` traps with `IntegerOverflow`, and signed
    /// `INT_MIN % -1` yields 0 without executing IDIV.
    pub(crate) fn lower_div(&mut self, ty: IntTy, signed: bool, is_rem: bool) -> Result<()> {
        self.claim_specific(Reg::Rax)?;
        self.claim_specific(Reg::Rdx)?;
        let mut divisor = self.stack.pop();
        self.ensure_on_gp(&mut divisor)?;
        let mut dividend = self.stack.pop();
        self.move_value_to_specific_gp(&mut dividend, Reg::Rax)?;
        let divisor_reg = divisor.gpr();

        let test = pick(ty, Mnemonic::TestL, Mnemonic::TestQ);
        self.asm.emit_rr(test, divisor_reg, divisor_reg);
        self.jcc_trap(Cond::E, ExitStatus::IntegerDivisionByZero);

        let done = self.asm.new_label();
        if signed {
            let do_div = self.asm.new_label();
            let cmp = pick(ty, Mnemonic::CmpL, Mnemonic::CmpQ);
            self.asm.emit_const_to_reg(cmp, -1, divisor_reg);
            self.asm.emit_jcc(Cond::Ne, do_div);
            if is_rem {
                // INT_MIN % -1 is 0; IDIV would fault.
                self.asm.emit_rr(Mnemonic::XorL, Reg::Rdx, Reg::Rdx);
                self.asm.emit_jmp(done);
            } else {
                match ty {
                    IntTy::I32 => {
                        self.asm.emit_const_to_reg(
                            Mnemonic::CmpL,
                            i64::from(i32::MIN),
                            Reg::Rax,
                        );
                    }
                    IntTy::I64 => {
                        self.asm.emit_const_to_reg(Mnemonic::MovQ, i64::MIN, SCRATCH_REG);
                        self.asm.emit_rr(Mnemonic::CmpQ, SCRATCH_REG, Reg::Rax);
                    }
                }
                self.jcc_trap(Cond::E, ExitStatus::IntegerOverflow);
            }
            self.asm.bind_label(do_div)?;
            match ty {
                IntTy::I32 => self.asm.emit_cdq(),
                IntTy::I64 => self.asm.emit_cqo(),
            }
            self.asm.emit_unary(pick(ty, Mnemonic::IdivL, Mnemonic::IdivQ), divisor_reg);
        } else {
            self.asm.emit_rr(Mnemonic::XorL, Reg::Rdx, Reg::Rdx);
            self.asm.emit_unary(pick(ty, Mnemonic::DivL, Mnemonic::DivQ), divisor_reg);
        }
        self.asm.bind_label(done)?;

        let (result, scratch) = if is_rem { (Reg::Rdx, Reg::Rax) } else { (Reg::Rax, Reg::Rdx) };
        self.regs.mark_unused(divisor_reg);
        self.regs.mark_unused(scratch);
        self.stack.push_gpr(result, ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_eqz(&mut self, ty: IntTy) -> Result<()> {
        let value = self.pop_gp()?;
        let test = pick(ty, Mnemonic::TestL, Mnemonic::TestQ);
        self.asm.emit_rr(test, value.gpr(), value.gpr());
        self.release(&value);
        self.stack.push_flag(Cond::E);
        Ok(())
    }

    pub(crate) fn lower_int_cmp(&mut self, ty: IntTy, cmp: IntCmp) -> Result<()> {
        let x2 = self.pop_gp()?;
        let x1 = self.pop_gp()?;
        let inst = pick(ty, Mnemonic::CmpL, Mnemonic::CmpQ);
        self.asm.emit_rr(inst, x2.gpr(), x1.gpr());
        self.release(&x1);
        self.release(&x2);
        self.stack.push_flag(cond_of_int_cmp(cmp));
        Ok(())
    }

    pub(crate) fn lower_i32_wrap_i64(&mut self) -> Result<()> {
        let value = self.pop_gp()?;
        // A 32-bit move zeroes the upper half.
        self.asm.emit_rr(Mnemonic::MovL, value.gpr(), value.gpr());
        self.stack.push_gpr(value.gpr(), ValType::I32);
        Ok(())
    }

    pub(crate) fn lower_extend(&mut self, signed: bool) -> Result<()> {
        let value = self.pop_gp()?;
        if signed {
            self.asm.emit_rr(Mnemonic::MovsxLQ, value.gpr(), value.gpr());
        } else {
            // i32 register values already have a zeroed upper half; a
            // 32-bit self-move re-establishes that for raw slot loads.
            self.asm.emit_rr(Mnemonic::MovL, value.gpr(), value.gpr());
        }
        self.stack.push_gpr(value.gpr(), ValType::I64);
        Ok(())
    }

    pub(crate) fn lower_sign_extend(&mut self, mnemonic: Mnemonic, result: ValType) -> Result<()> {
        let value = self.pop_gp()?;
        self.asm.emit_rr(mnemonic, value.gpr(), value.gpr());
        self.stack.push_gpr(value.gpr(), result);
        Ok(())
    }
}
