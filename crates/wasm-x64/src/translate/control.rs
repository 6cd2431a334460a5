//! Conditional branches, branch tables, and the explicit stack operations
//! (pick, swap, select).
//!
//! Unconditional branches and label binding live in `codegen`; this module
//! adds the lowerings that need compile-time state cloning: a conditional
//! branch that drops operands runs its reshape code on the taken path
//! only, so the fallthrough continues from the pre-branch state.

use crate::abi::{SCRATCH_REG, STACK_BASE_REG};
use crate::asm::{Cond, Label, Mnemonic};
use crate::error::{Error, Result};
use crate::ir::{BranchTarget, DropKeep, LabelId, ValType};

use super::codegen::{slot_disp, Compiler};
use super::stack::ValueLocation;

impl Compiler {
    /// Pops the branch condition, leaving it in RFLAGS.
    fn pop_condition(&mut self) -> Result<Cond> {
        let mut cond = self.stack.pop();
        match cond.loc {
            ValueLocation::Flag(c) => Ok(c),
            _ => {
                // A buried flag value would not survive the TEST below.
                self.flush_flag()?;
                self.ensure_on_gp(&mut cond)?;
                let reg = cond.gpr();
                self.asm.emit_rr(Mnemonic::TestL, reg, reg);
                self.regs.mark_unused(reg);
                Ok(Cond::Ne)
            }
        }
    }

    pub(crate) fn lower_br_if(&mut self, target: LabelId, dk: DropKeep) -> Result<()> {
        let cond = self.pop_condition()?;
        if dk.drop == 0 {
            // Both paths share the canonical shape; the reconcile emits
            // only MOV-family instructions, so the condition survives.
            self.reconcile_for_branch(dk.keep)?;
            self.record_or_verify_shape(target, dk.keep)?;
            let label = self.target_label(target);
            self.asm.emit_jcc(cond, label);
        } else {
            // The drop belongs to the taken path only: branch over an
            // inline thunk and restore the compile-time state afterwards.
            let skip = self.asm.new_label();
            self.asm.emit_jcc(cond.invert(), skip);
            let saved_stack = self.stack.clone();
            let saved_regs = self.regs.clone();
            self.branch_to(target, dk)?;
            self.asm.bind_label(skip)?;
            self.stack = saved_stack;
            self.regs = saved_regs;
        }
        Ok(())
    }

    pub(crate) fn lower_br_table(
        &mut self,
        targets: &[BranchTarget],
        default: &BranchTarget,
    ) -> Result<()> {
        let index = self.pop_gp()?;
        let index_reg = index.gpr();
        let count = targets.len() as u32;

        // Clamp out-of-range indices onto the default arm (entry `count`).
        self.asm.emit_const_to_reg(Mnemonic::MovL, i64::from(count), SCRATCH_REG);
        self.asm.emit_const_to_reg(Mnemonic::CmpL, i64::from(count), index_reg);
        self.asm.emit_cmovcc(Mnemonic::CmovL, Cond::Ae, SCRATCH_REG, index_reg);

        // The table holds 32-bit target deltas relative to its own
        // address: destination = table_address + entry.
        let thunks: Vec<Label> = (0..=count).map(|_| self.asm.new_label()).collect();
        let table = self.asm.add_jump_table(&thunks);
        let base = self.alloc_gp()?;
        self.asm.lea_static_entry(table, base);
        self.asm
            .emit_mem_indexed_to_reg(Mnemonic::MovsxLQ, base, 0, index_reg, 4, index_reg);
        self.asm.emit_rr(Mnemonic::AddQ, base, index_reg);
        self.asm.emit_jmp_reg(index_reg);
        self.regs.mark_unused(index_reg);
        self.regs.mark_unused(base);

        // One reshape thunk per arm, each compiled from the dispatch-point
        // state.
        let saved_stack = self.stack.clone();
        let saved_regs = self.regs.clone();
        for (thunk, arm) in thunks.iter().zip(targets.iter().chain(std::iter::once(default))) {
            self.stack = saved_stack.clone();
            self.regs = saved_regs.clone();
            self.asm.bind_label(*thunk)?;
            self.branch_to(arm.label, arm.drop_keep)?;
        }
        self.set_unreachable();
        Ok(())
    }

    pub(crate) fn lower_pick(&mut self, depth: u32) -> Result<()> {
        // Duplicating a flag would break the single-flag invariant.
        if matches!(self.stack.peek(depth).loc, ValueLocation::Flag(_)) {
            self.ensure_entry_in_class_reg(depth)?;
        }
        let ty = self.stack.peek(depth).ty;
        if let ValueLocation::Const(bits) = self.stack.peek(depth).loc {
            self.stack.push_const(bits, ty);
            return Ok(());
        }
        if ty.is_vector_class() {
            let reg = self.alloc_vec()?;
            let src = *self.stack.peek(depth);
            match src.loc {
                ValueLocation::Vreg(r) => self.asm.emit_rr(Mnemonic::Movaps, r, reg),
                ValueLocation::Stack => self.load_from_slot(reg, &src),
                _ => unreachable!("vector-class value in a scalar location"),
            }
            self.stack.push_vreg(reg, ty);
        } else {
            let reg = self.alloc_gp()?;
            let src = *self.stack.peek(depth);
            match src.loc {
                ValueLocation::Gpr(r) => self.asm.emit_rr(Mnemonic::MovQ, r, reg),
                ValueLocation::Stack => {
                    let mov = if matches!(src.ty, ValType::I32 | ValType::F32) {
                        Mnemonic::MovL
                    } else {
                        Mnemonic::MovQ
                    };
                    self.asm.emit_mem_to_reg(mov, STACK_BASE_REG, slot_disp(src.slot), reg);
                }
                _ => unreachable!("constant and flag picks are handled above"),
            }
            self.stack.push_gpr(reg, ty);
        }
        Ok(())
    }

    pub(crate) fn lower_swap(&mut self, depth: u32) -> Result<()> {
        if depth == 0 {
            return Ok(());
        }
        let top_ty = self.stack.peek(0).ty;
        let deep = *self.stack.peek(depth);
        if top_ty != deep.ty {
            return Err(Error::InvalidIr(format!(
                "swap of mismatching types {top_ty:?} and {:?}",
                deep.ty
            )));
        }
        // Spill slots belong to positions, not values: park both entries
        // in their slots (allocation-free) and exchange the slot contents
        // through the scratch register.
        let top_idx = self.stack.depth() as usize - 1;
        let deep_idx = top_idx - depth as usize;
        self.flush_entry(top_idx);
        self.flush_entry(deep_idx);
        let top_slot = self.stack.peek(0).slot;
        for w in 0..top_ty.slot_width() {
            self.asm.emit_mem_to_reg(
                Mnemonic::MovQ,
                STACK_BASE_REG,
                slot_disp(top_slot + w),
                SCRATCH_REG,
            );
            self.asm.emit_reg_to_mem(
                Mnemonic::XchgQ,
                SCRATCH_REG,
                STACK_BASE_REG,
                slot_disp(deep.slot + w),
            );
            self.asm.emit_reg_to_mem(
                Mnemonic::MovQ,
                SCRATCH_REG,
                STACK_BASE_REG,
                slot_disp(top_slot + w),
            );
        }
        Ok(())
    }

    /// `(v1, v2, c)` → `v1` if `c != 0` else `v2`, via TEST + CMOV for
    /// scalars and a forward branch for vector-class values.
    pub(crate) fn lower_select(&mut self) -> Result<()> {
        let cond = self.pop_condition()?;
        if self.stack.peek(0).ty.is_vector_class() {
            let mut v2 = self.stack.pop();
            let mut v1 = self.stack.pop();
            self.ensure_on_vec(&mut v2)?;
            self.ensure_on_vec(&mut v1)?;
            let keep = self.asm.new_label();
            self.asm.emit_jcc(cond, keep);
            self.asm.emit_rr(Mnemonic::Movaps, v2.vr(), v1.vr());
            self.asm.bind_label(keep)?;
            self.stack.push_vreg(v1.vr(), v1.ty);
            self.release(&v2);
        } else {
            let mut v2 = self.stack.pop();
            let mut v1 = self.stack.pop();
            self.ensure_on_gp(&mut v2)?;
            self.ensure_on_gp(&mut v1)?;
            let mov = if matches!(v1.ty, ValType::I64) { Mnemonic::CmovQ } else { Mnemonic::CmovL };
            self.asm.emit_cmovcc(mov, cond.invert(), v2.gpr(), v1.gpr());
            self.stack.push_gpr(v1.gpr(), v1.ty);
            self.release(&v2);
        }
        Ok(())
    }
}
