//! Linear-memory access lowering.
//!
//! Every access computes `index + static_offset + size` into a register,
//! compares it against the instance's memory length, and addresses the
//! data as `[memory_base + ceil - size]`, so one register serves both the
//! bounds check and the access. Bulk operations exit to engine builtins.

use crate::abi::{
    Builtin, ExitStatus, CTX_MEMORY_LEN, ENGINE_CTX_REG, MEMORY_BASE_REG, SCRATCH_REG,
};
use crate::asm::{Cond, Mnemonic, Reg};
use crate::error::Result;
use crate::ir::{IntTy, MemArg, ValType};

use super::codegen::Compiler;

/// Bytes moved by a full-width access of a scalar type.
fn access_size(ty: ValType) -> u8 {
    match ty {
        ValType::I32 | ValType::F32 => 4,
        ValType::I64 | ValType::F64 => 8,
        ValType::V128 => 16,
    }
}

impl Compiler {
    /// Pops the i32 address, adds the static offset plus the access size,
    /// and traps `MemoryOutOfBounds` unless the sum stays within the
    /// instance's memory length. Returns the register holding the
    /// exclusive upper bound (still marked used).
    pub(crate) fn memory_access_ceil(&mut self, offset: u32, size: u8) -> Result<Reg> {
        let index = self.pop_gp()?;
        let reg = index.gpr();
        let add = i64::from(offset) + i64::from(size);
        if let Ok(imm) = i32::try_from(add) {
            self.asm.emit_const_to_reg(Mnemonic::AddQ, i64::from(imm), reg);
        } else {
            self.asm.emit_const_to_reg(Mnemonic::MovQ, add, SCRATCH_REG);
            self.asm.emit_rr(Mnemonic::AddQ, SCRATCH_REG, reg);
        }
        self.asm.emit_mem_to_reg(Mnemonic::CmpQ, ENGINE_CTX_REG, CTX_MEMORY_LEN, reg);
        self.jcc_trap(Cond::A, ExitStatus::MemoryOutOfBounds);
        Ok(reg)
    }

    pub(crate) fn lower_load(&mut self, ty: ValType, arg: MemArg) -> Result<()> {
        let size = access_size(ty);
        let ceil = self.memory_access_ceil(arg.offset, size)?;
        let disp = -i32::from(size);
        match ty {
            ValType::I32 => {
                self.asm
                    .emit_mem_indexed_to_reg(Mnemonic::MovL, MEMORY_BASE_REG, disp, ceil, 1, ceil);
                self.stack.push_gpr(ceil, ty);
            }
            ValType::I64 => {
                self.asm
                    .emit_mem_indexed_to_reg(Mnemonic::MovQ, MEMORY_BASE_REG, disp, ceil, 1, ceil);
                self.stack.push_gpr(ceil, ty);
            }
            ValType::F32 | ValType::F64 => {
                let dst = self.alloc_vec()?;
                let mov = if ty == ValType::F32 { Mnemonic::Movss } else { Mnemonic::Movsd };
                self.asm.emit_mem_indexed_to_reg(mov, MEMORY_BASE_REG, disp, ceil, 1, dst);
                self.regs.mark_unused(ceil);
                self.stack.push_vreg(dst, ty);
            }
            ValType::V128 => unreachable!("v128 loads have their own lowering"),
        }
        Ok(())
    }

    pub(crate) fn lower_load8(&mut self, ty: IntTy, signed: bool, arg: MemArg) -> Result<()> {
        let ceil = self.memory_access_ceil(arg.offset, 1)?;
        let mov = match (ty, signed) {
            (IntTy::I32, true) => Mnemonic::MovsxBL,
            (IntTy::I64, true) => Mnemonic::MovsxBQ,
            // Zero extension through 32 bits clears the full register.
            (_, false) => Mnemonic::MovzxBL,
        };
        self.asm.emit_mem_indexed_to_reg(mov, MEMORY_BASE_REG, -1, ceil, 1, ceil);
        self.stack.push_gpr(ceil, ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_load16(&mut self, ty: IntTy, signed: bool, arg: MemArg) -> Result<()> {
        let ceil = self.memory_access_ceil(arg.offset, 2)?;
        let mov = match (ty, signed) {
            (IntTy::I32, true) => Mnemonic::MovsxWL,
            (IntTy::I64, true) => Mnemonic::MovsxWQ,
            (_, false) => Mnemonic::MovzxWL,
        };
        self.asm.emit_mem_indexed_to_reg(mov, MEMORY_BASE_REG, -2, ceil, 1, ceil);
        self.stack.push_gpr(ceil, ty.val_type());
        Ok(())
    }

    pub(crate) fn lower_load32(&mut self, signed: bool, arg: MemArg) -> Result<()> {
        let ceil = self.memory_access_ceil(arg.offset, 4)?;
        let mov = if signed { Mnemonic::MovsxLQ } else { Mnemonic::MovL };
        self.asm.emit_mem_indexed_to_reg(mov, MEMORY_BASE_REG, -4, ceil, 1, ceil);
        self.stack.push_gpr(ceil, ValType::I64);
        Ok(())
    }

    pub(crate) fn lower_store(&mut self, ty: ValType, arg: MemArg) -> Result<()> {
        let size = access_size(ty);
        let mut value = self.stack.pop();
        if ty.is_vector_class() {
            self.ensure_on_vec(&mut value)?;
        } else {
            self.ensure_on_gp(&mut value)?;
        }
        let ceil = self.memory_access_ceil(arg.offset, size)?;
        let disp = -i32::from(size);
        let mov = match ty {
            ValType::I32 => Mnemonic::MovL,
            ValType::I64 => Mnemonic::MovQ,
            ValType::F32 => Mnemonic::Movss,
            ValType::F64 => Mnemonic::Movsd,
            ValType::V128 => Mnemonic::Movdqu,
        };
        let src = value.reg().expect("value was just ensured into a register");
        self.asm.emit_reg_to_mem_indexed(mov, src, MEMORY_BASE_REG, disp, ceil, 1);
        self.regs.mark_unused(ceil);
        self.release(&value);
        Ok(())
    }

    pub(crate) fn lower_store_narrow(&mut self, mov: Mnemonic, size: u8, arg: MemArg) -> Result<()> {
        let value = {
            let mut v = self.stack.pop();
            self.ensure_on_gp(&mut v)?;
            v
        };
        let ceil = self.memory_access_ceil(arg.offset, size)?;
        self.asm.emit_reg_to_mem_indexed(mov, value.gpr(), MEMORY_BASE_REG, -i32::from(size), ceil, 1);
        self.regs.mark_unused(ceil);
        self.release(&value);
        Ok(())
    }

    pub(crate) fn lower_memory_size(&mut self) -> Result<()> {
        let reg = self.alloc_gp()?;
        self.asm.emit_mem_to_reg(Mnemonic::MovQ, ENGINE_CTX_REG, CTX_MEMORY_LEN, reg);
        // Bytes to 64KiB pages.
        self.asm.emit_const_to_reg(Mnemonic::ShrQ, 16, reg);
        self.stack.push_gpr(reg, ValType::I32);
        Ok(())
    }

    pub(crate) fn lower_memory_grow(&mut self) -> Result<()> {
        self.builtin_call(Builtin::MemoryGrow, 1, &[ValType::I32])
    }

    pub(crate) fn lower_memory_init(&mut self, data_index: u32) -> Result<()> {
        self.stack.push_const(u64::from(data_index), ValType::I32);
        self.builtin_call(Builtin::MemoryInit, 4, &[])
    }

    pub(crate) fn lower_data_drop(&mut self, data_index: u32) -> Result<()> {
        self.stack.push_const(u64::from(data_index), ValType::I32);
        self.builtin_call(Builtin::DataDrop, 1, &[])
    }

    pub(crate) fn lower_memory_copy(&mut self) -> Result<()> {
        self.builtin_call(Builtin::MemoryCopy, 3, &[])
    }

    pub(crate) fn lower_memory_fill(&mut self) -> Result<()> {
        self.builtin_call(Builtin::MemoryFill, 3, &[])
    }
}
