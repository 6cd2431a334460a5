//! Table access lowering. Get/set/size are inlined as bounds-checked
//! indexed loads and stores against the table snapshot in the engine
//! context; growth and the bulk operations exit to engine builtins.
//! Function references are opaque 64-bit engine pointers.

use crate::abi::{
    Builtin, ExitStatus, CTX_FUNCREFS_BASE, CTX_TABLE_BASE, CTX_TABLE_LEN, ENGINE_CTX_REG,
};
use crate::asm::{Cond, Mnemonic};
use crate::error::Result;
use crate::ir::ValType;

use super::codegen::Compiler;

impl Compiler {
    /// Traps `InvalidTableAccess` unless the popped index is below the
    /// table length. The index register stays claimed.
    fn table_bounds_check(&mut self) -> Result<crate::asm::Reg> {
        let index = self.pop_gp()?;
        let reg = index.gpr();
        self.asm.emit_mem_to_reg(Mnemonic::CmpQ, ENGINE_CTX_REG, CTX_TABLE_LEN, reg);
        self.jcc_trap(Cond::Ae, ExitStatus::InvalidTableAccess);
        Ok(reg)
    }

    pub(crate) fn lower_table_get(&mut self) -> Result<()> {
        let index = self.table_bounds_check()?;
        let base = self.alloc_gp()?;
        self.asm.emit_mem_to_reg(Mnemonic::MovQ, ENGINE_CTX_REG, CTX_TABLE_BASE, base);
        self.asm.emit_mem_indexed_to_reg(Mnemonic::MovQ, base, 0, index, 8, index);
        self.regs.mark_unused(base);
        self.stack.push_gpr(index, ValType::I64);
        Ok(())
    }

    pub(crate) fn lower_table_set(&mut self) -> Result<()> {
        let value = self.pop_gp()?;
        let index = self.table_bounds_check()?;
        let base = self.alloc_gp()?;
        self.asm.emit_mem_to_reg(Mnemonic::MovQ, ENGINE_CTX_REG, CTX_TABLE_BASE, base);
        self.asm.emit_reg_to_mem_indexed(Mnemonic::MovQ, value.gpr(), base, 0, index, 8);
        self.regs.mark_unused(base);
        self.regs.mark_unused(index);
        self.release(&value);
        Ok(())
    }

    pub(crate) fn lower_table_size(&mut self) -> Result<()> {
        let reg = self.alloc_gp()?;
        self.asm.emit_mem_to_reg(Mnemonic::MovQ, ENGINE_CTX_REG, CTX_TABLE_LEN, reg);
        self.asm.emit_rr(Mnemonic::MovL, reg, reg);
        self.stack.push_gpr(reg, ValType::I32);
        Ok(())
    }

    pub(crate) fn lower_table_grow(&mut self) -> Result<()> {
        self.builtin_call(Builtin::TableGrow, 2, &[ValType::I32])
    }

    pub(crate) fn lower_table_fill(&mut self) -> Result<()> {
        self.builtin_call(Builtin::TableFill, 3, &[])
    }

    pub(crate) fn lower_table_init(&mut self, elem_index: u32) -> Result<()> {
        self.stack.push_const(u64::from(elem_index), ValType::I32);
        self.builtin_call(Builtin::TableInit, 4, &[])
    }

    pub(crate) fn lower_table_copy(&mut self) -> Result<()> {
        self.builtin_call(Builtin::TableCopy, 3, &[])
    }

    pub(crate) fn lower_elem_drop(&mut self, elem_index: u32) -> Result<()> {
        self.stack.push_const(u64::from(elem_index), ValType::I32);
        self.builtin_call(Builtin::ElemDrop, 1, &[])
    }

    pub(crate) fn lower_ref_func(&mut self, function_index: u32) -> Result<()> {
        let reg = self.alloc_gp()?;
        self.asm.emit_mem_to_reg(Mnemonic::MovQ, ENGINE_CTX_REG, CTX_FUNCREFS_BASE, reg);
        self.asm
            .emit_mem_to_reg(Mnemonic::MovQ, reg, (function_index * 8) as i32, reg);
        self.stack.push_gpr(reg, ValType::I64);
        Ok(())
    }
}
