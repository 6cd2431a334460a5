//! Single-pass code generation: one walk over the IR stream, maintaining
//! the virtual operand stack and the register file, appending machine
//! code through the assembler.
//!
//! This module holds the compiler state and the machinery every operation
//! family shares (register residency, spilling, flag materialization,
//! stack reconciliation, trap trampolines, builtin exits, preamble and
//! return paths). The per-family lowerings live in the sibling modules.

use crate::abi::{
    Builtin, ExitStatus, CTX_BUILTIN_INDEX, CTX_CONTINUATION, CTX_EXIT_STATUS, CTX_HOST_FUNC_INDEX,
    CTX_STACK_CAPACITY, CTX_STACK_POINTER, ENGINE_CTX_REG, SCRATCH_REG, STACK_BASE_REG,
};
use crate::asm::{Assembler, Cond, Label, Mnemonic, Reg};
use crate::error::{Error, Result};
use crate::ir::{DropKeep, Function, LabelId, Op, ValType};

use super::regalloc::{RegClass, RegisterFile, GP_ALLOC_ORDER, VEC_ALLOC_ORDER};
use super::stack::{LocationStack, StackValue, ValueLocation};

/// One (code offset, IR offset) pair of the trap-attribution side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOffset {
    pub code_offset: u32,
    pub ir_offset: u32,
}

/// The finished artifact handed to the engine.
#[derive(Debug)]
pub struct CompiledFunction {
    /// Machine code followed by the static-data block.
    pub code: Vec<u8>,
    /// Code-relative offsets of the static-data entries, for relocation
    /// when the code is copied.
    pub static_data_offsets: Vec<u32>,
    /// Frame ceiling of the virtual operand stack, in 8-byte slots.
    pub stack_pointer_ceil: u64,
    /// Maps code offsets back to IR offsets for trap attribution.
    pub source_map: Vec<SourceOffset>,
}

/// Per-label state. `Undefined → Referenced → Bound`, where "referenced"
/// is observable as a recorded entry-shape snapshot.
struct LabelInfo {
    asm_label: Label,
    snapshot: Option<Snapshot>,
    bound: bool,
}

/// Canonical entry shape of a label: the full stack typing plus how many
/// top entries arrive in carry registers. Everything below the carried
/// operands is slot-resident.
#[derive(Clone, PartialEq, Eq, Debug)]
struct Snapshot {
    types: Vec<ValType>,
    arity: u32,
}

pub(crate) struct Compiler {
    pub(crate) asm: Assembler,
    pub(crate) stack: LocationStack,
    pub(crate) regs: RegisterFile,
    labels: Vec<Option<LabelInfo>>,
    trap_labels: [Option<Label>; ExitStatus::COUNT],
    return_label: Option<Label>,
    reachable: bool,
    results: Vec<ValType>,
    source_map: Vec<SourceOffset>,
}

pub(crate) fn slot_disp(slot: u32) -> i32 {
    (slot * 8) as i32
}

/// Load/store mnemonic for a value's spill slot.
pub(crate) fn slot_mov(ty: ValType) -> Mnemonic {
    match ty {
        ValType::I32 => Mnemonic::MovL,
        ValType::I64 => Mnemonic::MovQ,
        ValType::F32 => Mnemonic::Movss,
        ValType::F64 => Mnemonic::Movsd,
        ValType::V128 => Mnemonic::Movdqu,
    }
}

/// Compiles one function's IR into machine code.
pub fn compile(function: &Function) -> Result<CompiledFunction> {
    Ok(compile_function(function)?.0)
}

/// Compiles the stub for a host-import function: it reports the host
/// function index and exits with `CallHost`; the engine performs the call
/// and resumes the caller.
pub fn compile_host_stub(host_func_index: u32) -> Result<CompiledFunction> {
    let mut asm = Assembler::new();
    asm.emit_const_to_mem(
        Mnemonic::MovL,
        host_func_index as i32,
        ENGINE_CTX_REG,
        CTX_HOST_FUNC_INDEX,
    );
    asm.emit_const_to_mem(
        Mnemonic::MovL,
        ExitStatus::CallHost.as_u32() as i32,
        ENGINE_CTX_REG,
        CTX_EXIT_STATUS,
    );
    asm.emit_ret();
    let fin = asm.finalize(0)?;
    Ok(CompiledFunction {
        code: fin.code,
        static_data_offsets: fin.static_data_offsets,
        stack_pointer_ceil: 0,
        source_map: Vec::new(),
    })
}

pub(crate) fn compile_function(
    function: &Function,
) -> Result<(CompiledFunction, Vec<Mnemonic>)> {
    let mut c = Compiler::new(function.results.clone());
    c.emit_preamble(function)?;
    for (idx, op) in function.body.iter().enumerate() {
        if !c.reachable && !matches!(op, Op::Label { .. }) {
            continue;
        }
        c.source_map.push(SourceOffset {
            code_offset: c.asm.current_offset(),
            ir_offset: idx as u32,
        });
        c.lower_op(op)?;
    }
    c.emit_function_end()?;
    c.emit_trap_trampolines()?;

    let ceil = c.stack.stack_pointer_ceil();
    let fin = c.asm.finalize(ceil)?;
    tracing::debug!(
        target: "wasm_x64::codegen",
        ops = function.body.len(),
        code_size = fin.code.len(),
        static_entries = fin.static_data_offsets.len(),
        stack_ceil = ceil,
        "function compiled"
    );
    Ok((
        CompiledFunction {
            code: fin.code,
            static_data_offsets: fin.static_data_offsets,
            stack_pointer_ceil: u64::from(ceil),
            source_map: c.source_map,
        },
        fin.listing,
    ))
}

impl Compiler {
    fn new(results: Vec<ValType>) -> Self {
        Self {
            asm: Assembler::new(),
            stack: LocationStack::new(),
            regs: RegisterFile::new(),
            labels: Vec::new(),
            trap_labels: [None; ExitStatus::COUNT],
            return_label: None,
            reachable: true,
            results,
            source_map: Vec::new(),
        }
    }

    // ── register residency ──

    /// A free register of the class, spilling the least-recently-touched
    /// slot-owning value (the deepest register-resident entry) if needed.
    pub(crate) fn alloc(&mut self, class: RegClass) -> Result<Reg> {
        if let Some(reg) = self.regs.take_free(class) {
            return Ok(reg);
        }
        let victim_idx = self
            .stack
            .entries()
            .iter()
            .position(|v| match v.loc {
                ValueLocation::Gpr(_) => class == RegClass::Gp,
                ValueLocation::Vreg(_) => class == RegClass::Vec,
                _ => false,
            })
            .ok_or(Error::RegisterPressure(class.name()))?;
        let victim = self.stack.entries()[victim_idx];
        let reg = victim.reg().expect("victim holds a register");
        self.store_to_slot(&victim);
        self.stack.entries_mut()[victim_idx].loc = ValueLocation::Stack;
        self.regs.mark_unused(reg);
        Ok(self.regs.take_free(class).expect("register was just freed"))
    }

    pub(crate) fn alloc_gp(&mut self) -> Result<Reg> {
        self.alloc(RegClass::Gp)
    }

    pub(crate) fn alloc_vec(&mut self) -> Result<Reg> {
        self.alloc(RegClass::Vec)
    }

    /// Takes exclusive ownership of a specific register for a
    /// fixed-register instruction: if a stack entry owns it, that entry
    /// is written to its slot first.
    pub(crate) fn claim_specific(&mut self, reg: Reg) -> Result<()> {
        if let Some(idx) = self.stack.entries().iter().position(|v| v.reg() == Some(reg)) {
            let owner = self.stack.entries()[idx];
            self.store_to_slot(&owner);
            self.stack.entries_mut()[idx].loc = ValueLocation::Stack;
            self.regs.mark_unused(reg);
        }
        if !self.regs.is_used(reg) {
            self.regs.mark_used(reg);
        }
        Ok(())
    }

    pub(crate) fn store_to_slot(&mut self, value: &StackValue) {
        let reg = value.reg().expect("only register-resident values are stored");
        self.asm
            .emit_reg_to_mem(slot_mov(value.ty), reg, STACK_BASE_REG, slot_disp(value.slot));
    }

    pub(crate) fn load_from_slot(&mut self, reg: Reg, value: &StackValue) {
        self.asm
            .emit_mem_to_reg(slot_mov(value.ty), STACK_BASE_REG, slot_disp(value.slot), reg);
    }

    /// Makes `value` general-purpose-register resident.
    pub(crate) fn ensure_on_gp(&mut self, value: &mut StackValue) -> Result<()> {
        match value.loc {
            ValueLocation::Gpr(_) => {}
            ValueLocation::Stack => {
                debug_assert!(!matches!(value.ty, ValType::V128));
                let reg = self.alloc_gp()?;
                // Raw bit load; MovL zero-extends 32-bit values.
                let mov = if matches!(value.ty, ValType::I32 | ValType::F32) {
                    Mnemonic::MovL
                } else {
                    Mnemonic::MovQ
                };
                self.asm.emit_mem_to_reg(mov, STACK_BASE_REG, slot_disp(value.slot), reg);
                value.loc = ValueLocation::Gpr(reg);
            }
            ValueLocation::Flag(cond) => {
                let reg = self.alloc_gp()?;
                self.asm.emit_setcc(cond, reg);
                self.asm.emit_rr(Mnemonic::MovzxBL, reg, reg);
                value.loc = ValueLocation::Gpr(reg);
            }
            ValueLocation::Const(bits) => {
                let reg = self.alloc_gp()?;
                self.materialize_const_to_gp(bits, value.ty, reg);
                value.loc = ValueLocation::Gpr(reg);
            }
            ValueLocation::Vreg(vreg) => {
                debug_assert!(!matches!(value.ty, ValType::V128));
                let reg = self.alloc_gp()?;
                let mov = if matches!(value.ty, ValType::F32 | ValType::I32) {
                    Mnemonic::MovL
                } else {
                    Mnemonic::MovQ
                };
                self.asm.emit_rr(mov, vreg, reg);
                self.regs.mark_unused(vreg);
                value.loc = ValueLocation::Gpr(reg);
            }
        }
        Ok(())
    }

    /// Makes `value` vector-register resident.
    pub(crate) fn ensure_on_vec(&mut self, value: &mut StackValue) -> Result<()> {
        match value.loc {
            ValueLocation::Vreg(_) => {}
            ValueLocation::Stack => {
                let reg = self.alloc_vec()?;
                // Raw bit load into the vector class; reinterprets hand
                // integer-typed values to this path.
                let mov = match value.ty {
                    ValType::V128 => Mnemonic::Movdqu,
                    ValType::I32 | ValType::F32 => Mnemonic::Movss,
                    ValType::I64 | ValType::F64 => Mnemonic::Movsd,
                };
                self.asm.emit_mem_to_reg(mov, STACK_BASE_REG, slot_disp(value.slot), reg);
                value.loc = ValueLocation::Vreg(reg);
            }
            ValueLocation::Gpr(gp) => {
                debug_assert!(!matches!(value.ty, ValType::V128));
                let reg = self.alloc_vec()?;
                let mov = if matches!(value.ty, ValType::F32 | ValType::I32) {
                    Mnemonic::MovL
                } else {
                    Mnemonic::MovQ
                };
                self.asm.emit_rr(mov, gp, reg);
                self.regs.mark_unused(gp);
                value.loc = ValueLocation::Vreg(reg);
            }
            ValueLocation::Const(bits) => {
                let reg = self.alloc_vec()?;
                self.materialize_const_to_gp(bits, value.ty, SCRATCH_REG);
                let mov = if matches!(value.ty, ValType::F32) { Mnemonic::MovL } else { Mnemonic::MovQ };
                self.asm.emit_rr(mov, SCRATCH_REG, reg);
                value.loc = ValueLocation::Vreg(reg);
            }
            ValueLocation::Flag(_) => unreachable!("flag-resident value of a vector-class type"),
        }
        Ok(())
    }

    fn materialize_const_to_gp(&mut self, bits: u64, ty: ValType, reg: Reg) {
        match ty {
            ValType::I32 | ValType::F32 => {
                self.asm.emit_const_to_reg(Mnemonic::MovL, i64::from(bits as u32), reg);
            }
            _ => self.asm.emit_const_to_reg(Mnemonic::MovQ, bits as i64, reg),
        }
    }

    /// Pops the top value and makes it GP-resident.
    pub(crate) fn pop_gp(&mut self) -> Result<StackValue> {
        let mut value = self.stack.pop();
        self.ensure_on_gp(&mut value)?;
        Ok(value)
    }

    /// Pops the top value and makes it vector-resident.
    pub(crate) fn pop_vec(&mut self) -> Result<StackValue> {
        let mut value = self.stack.pop();
        self.ensure_on_vec(&mut value)?;
        Ok(value)
    }

    /// Moves a popped value into a specific general-purpose register
    /// (variable shift counts into CL, dividends into AX), evicting any
    /// stack entry that owns it first.
    pub(crate) fn move_value_to_specific_gp(
        &mut self,
        value: &mut StackValue,
        target: Reg,
    ) -> Result<()> {
        if value.loc == ValueLocation::Gpr(target) {
            return Ok(());
        }
        self.claim_specific(target)?;
        match value.loc {
            ValueLocation::Gpr(reg) => {
                self.asm.emit_rr(Mnemonic::MovQ, reg, target);
                self.regs.mark_unused(reg);
            }
            ValueLocation::Stack => {
                let mov = if matches!(value.ty, ValType::I32 | ValType::F32) {
                    Mnemonic::MovL
                } else {
                    Mnemonic::MovQ
                };
                self.asm.emit_mem_to_reg(mov, STACK_BASE_REG, slot_disp(value.slot), target);
            }
            ValueLocation::Const(bits) => self.materialize_const_to_gp(bits, value.ty, target),
            ValueLocation::Flag(cond) => {
                self.asm.emit_setcc(cond, target);
                self.asm.emit_rr(Mnemonic::MovzxBL, target, target);
            }
            ValueLocation::Vreg(reg) => {
                let mov = if matches!(value.ty, ValType::F32 | ValType::I32) {
                    Mnemonic::MovL
                } else {
                    Mnemonic::MovQ
                };
                self.asm.emit_rr(mov, reg, target);
                self.regs.mark_unused(reg);
            }
        }
        value.loc = ValueLocation::Gpr(target);
        Ok(())
    }

    /// Makes the entry `depth` below the top register-resident in the
    /// class its type belongs to, in place.
    pub(crate) fn ensure_entry_in_class_reg(&mut self, depth: u32) -> Result<()> {
        let mut value = *self.stack.peek(depth);
        if value.ty.is_vector_class() {
            self.ensure_on_vec(&mut value)?;
        } else {
            self.ensure_on_gp(&mut value)?;
        }
        *self.stack.peek_mut(depth) = value;
        Ok(())
    }

    /// Releases the register held by a popped value, if any.
    pub(crate) fn release(&mut self, value: &StackValue) {
        if let Some(reg) = value.reg() {
            self.regs.mark_unused(reg);
        }
    }

    /// Materializes a live flag-resident entry into a register, so the
    /// next emitted instruction may clobber RFLAGS.
    pub(crate) fn flush_flag(&mut self) -> Result<()> {
        let idx = self
            .stack
            .entries()
            .iter()
            .position(|v| matches!(v.loc, ValueLocation::Flag(_)));
        if let Some(idx) = idx {
            let mut value = self.stack.entries()[idx];
            self.ensure_on_gp(&mut value)?;
            self.stack.entries_mut()[idx] = value;
        }
        Ok(())
    }

    /// Writes an entry to its spill slot, releasing any register it held.
    /// Flags and constants are materialized through the scratch register
    /// so no allocation can occur.
    pub(crate) fn flush_entry(&mut self, idx: usize) {
        let value = self.stack.entries()[idx];
        match value.loc {
            ValueLocation::Stack => return,
            ValueLocation::Gpr(reg) | ValueLocation::Vreg(reg) => {
                self.store_to_slot(&value);
                self.regs.mark_unused(reg);
            }
            ValueLocation::Flag(cond) => {
                self.asm.emit_setcc(cond, SCRATCH_REG);
                self.asm.emit_rr(Mnemonic::MovzxBL, SCRATCH_REG, SCRATCH_REG);
                self.asm.emit_reg_to_mem(
                    Mnemonic::MovL,
                    SCRATCH_REG,
                    STACK_BASE_REG,
                    slot_disp(value.slot),
                );
            }
            ValueLocation::Const(bits) => {
                if let Ok(imm) = i32::try_from(bits as i64) {
                    self.asm.emit_const_to_mem(
                        Mnemonic::MovQ,
                        imm,
                        STACK_BASE_REG,
                        slot_disp(value.slot),
                    );
                } else {
                    self.materialize_const_to_gp(bits, value.ty, SCRATCH_REG);
                    self.asm.emit_reg_to_mem(
                        Mnemonic::MovQ,
                        SCRATCH_REG,
                        STACK_BASE_REG,
                        slot_disp(value.slot),
                    );
                }
            }
        }
        self.stack.entries_mut()[idx].loc = ValueLocation::Stack;
    }

    /// Flushes every live value to its slot and frees all registers.
    pub(crate) fn flush_all(&mut self) {
        for idx in 0..self.stack.entries().len() {
            self.flush_entry(idx);
        }
        self.regs.release_all();
    }

    // ── reconciliation at control-flow joins ──

    /// Carry register (or slot residency) for each of a label's carried
    /// operands, assigned from the allocation orders bottom-up.
    fn canonical_regs(types: &[ValType]) -> Vec<Option<Reg>> {
        let (mut gp, mut vec) = (0usize, 0usize);
        types
            .iter()
            .map(|ty| {
                if ty.is_vector_class() {
                    let r = VEC_ALLOC_ORDER.get(vec).copied();
                    vec += 1;
                    r
                } else {
                    let r = GP_ALLOC_ORDER.get(gp).copied();
                    gp += 1;
                    r
                }
            })
            .collect()
    }

    /// Reshapes the stack to a label's canonical entry shape: everything
    /// slot-resident except the top `arity` operands, which move into the
    /// canonical carry registers of their class.
    pub(crate) fn reconcile_for_branch(&mut self, arity: u32) -> Result<()> {
        self.flush_all();
        let depth = self.stack.depth();
        debug_assert!(arity <= depth);
        let carry_types: Vec<ValType> = (0..arity)
            .rev()
            .map(|d| self.stack.peek(d).ty)
            .collect();
        let regs = Self::canonical_regs(&carry_types);
        for (i, reg) in regs.iter().enumerate() {
            let Some(reg) = *reg else { continue };
            let d = arity - 1 - i as u32;
            let value = *self.stack.peek(d);
            self.load_from_slot(reg, &value);
            self.stack.peek_mut(d).loc = if reg.is_vector() {
                ValueLocation::Vreg(reg)
            } else {
                ValueLocation::Gpr(reg)
            };
            self.regs.mark_used(reg);
        }
        Ok(())
    }

    fn snapshot(&self, arity: u32) -> Snapshot {
        Snapshot {
            types: self.stack.entries().iter().map(|v| v.ty).collect(),
            arity,
        }
    }

    /// Rebuilds stack and register state from a label's recorded shape.
    fn restore_snapshot(&mut self, snap: &Snapshot) {
        self.stack.reset_from_types(&snap.types);
        self.regs.release_all();
        let depth = self.stack.depth();
        let carry_types: Vec<ValType> = (0..snap.arity)
            .rev()
            .map(|d| self.stack.peek(d).ty)
            .collect();
        debug_assert!(snap.arity <= depth);
        for (i, reg) in Self::canonical_regs(&carry_types).iter().enumerate() {
            let Some(reg) = *reg else { continue };
            let d = snap.arity - 1 - i as u32;
            self.stack.peek_mut(d).loc = if reg.is_vector() {
                ValueLocation::Vreg(reg)
            } else {
                ValueLocation::Gpr(reg)
            };
            self.regs.mark_used(reg);
        }
    }

    fn label_info(&mut self, id: LabelId) -> &mut LabelInfo {
        let idx = id as usize;
        if idx >= self.labels.len() {
            self.labels.resize_with(idx + 1, || None);
        }
        if self.labels[idx].is_none() {
            let asm_label = self.asm.new_label();
            self.labels[idx] = Some(LabelInfo { asm_label, snapshot: None, bound: false });
        }
        self.labels[idx].as_mut().expect("just created")
    }

    /// The assembler label backing an IR label id.
    pub(crate) fn target_label(&mut self, id: LabelId) -> Label {
        self.label_info(id).asm_label
    }

    /// Records the reconciled shape at a branch site, or checks it
    /// against the shape earlier producers recorded.
    pub(crate) fn record_or_verify_shape(&mut self, id: LabelId, arity: u32) -> Result<()> {
        let snap = self.snapshot(arity);
        let info = self.label_info(id);
        match &info.snapshot {
            None => info.snapshot = Some(snap),
            Some(existing) => {
                if *existing != snap {
                    return Err(Error::InvalidIr(format!(
                        "label {id} entered with mismatching stack shapes"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Discards the `drop` entries beneath the top `keep` ones, shifting
    /// the kept entries down to their new slots.
    pub(crate) fn apply_drop_keep(&mut self, dk: DropKeep) -> Result<()> {
        if dk.drop == 0 {
            return Ok(());
        }
        let depth = self.stack.depth();
        if dk.drop + dk.keep > depth {
            return Err(Error::InvalidIr(format!(
                "drop {}+keep {} exceeds stack depth {depth}",
                dk.drop, dk.keep
            )));
        }
        let mut kept: Vec<StackValue> = Vec::with_capacity(dk.keep as usize);
        for _ in 0..dk.keep {
            kept.push(self.stack.pop());
        }
        kept.reverse();
        for _ in 0..dk.drop {
            let dropped = self.stack.pop();
            self.release(&dropped);
        }
        for value in kept {
            let new_slot = self.stack.next_slot();
            if matches!(value.loc, ValueLocation::Stack) && new_slot != value.slot {
                for w in 0..value.ty.slot_width() {
                    self.asm.emit_mem_to_reg(
                        Mnemonic::MovQ,
                        STACK_BASE_REG,
                        slot_disp(value.slot + w),
                        SCRATCH_REG,
                    );
                    self.asm.emit_reg_to_mem(
                        Mnemonic::MovQ,
                        SCRATCH_REG,
                        STACK_BASE_REG,
                        slot_disp(new_slot + w),
                    );
                }
            }
            self.stack.push(value.loc, value.ty);
        }
        Ok(())
    }

    // ── labels and branches ──

    pub(crate) fn lower_label(&mut self, id: LabelId, arity: u32) -> Result<()> {
        if self.reachable {
            self.reconcile_for_branch(arity)?;
            self.record_or_verify_shape(id, arity)?;
        } else {
            let has_snapshot = self.label_info(id).snapshot.is_some();
            if !has_snapshot {
                // Nothing branches here and the fallthrough is dead:
                // elide everything until the next live label.
                return Ok(());
            }
            let snap = self.label_info(id).snapshot.clone().expect("checked above");
            self.restore_snapshot(&snap);
        }
        let info = self.label_info(id);
        if info.bound {
            return Err(Error::LabelRebound(id));
        }
        info.bound = true;
        let asm_label = info.asm_label;
        self.asm.bind_label(asm_label)?;
        self.reachable = true;
        Ok(())
    }

    /// Reconciles and jumps; shared by `Br` and the branch-table thunks.
    pub(crate) fn branch_to(&mut self, target: LabelId, dk: DropKeep) -> Result<()> {
        self.apply_drop_keep(dk)?;
        self.reconcile_for_branch(dk.keep)?;
        self.record_or_verify_shape(target, dk.keep)?;
        let label = self.label_info(target).asm_label;
        self.asm.emit_jmp(label);
        Ok(())
    }

    pub(crate) fn lower_br(&mut self, target: LabelId, dk: DropKeep) -> Result<()> {
        self.branch_to(target, dk)?;
        self.reachable = false;
        Ok(())
    }

    /// Marks the current program point dead (after an unconditional exit).
    pub(crate) fn set_unreachable(&mut self) {
        self.reachable = false;
    }

    pub(crate) fn lower_return(&mut self, dk: DropKeep) -> Result<()> {
        debug_assert_eq!(dk.keep as usize, self.results.len());
        self.apply_drop_keep(dk)?;
        self.flush_all();
        let label = match self.return_label {
            Some(label) => label,
            None => {
                let label = self.asm.new_label();
                self.return_label = Some(label);
                label
            }
        };
        self.asm.emit_jmp(label);
        self.reachable = false;
        Ok(())
    }

    // ── traps and engine exits ──

    /// The shared trampoline label for a trap status, created on first use.
    pub(crate) fn trap_label(&mut self, status: ExitStatus) -> Label {
        let idx = status.as_u32() as usize;
        if let Some(label) = self.trap_labels[idx] {
            return label;
        }
        let label = self.asm.new_label();
        self.trap_labels[idx] = Some(label);
        label
    }

    /// Conditional jump into a trap trampoline.
    pub(crate) fn jcc_trap(&mut self, cond: Cond, status: ExitStatus) {
        let label = self.trap_label(status);
        self.asm.emit_jcc(cond, label);
    }

    fn emit_trap_trampolines(&mut self) -> Result<()> {
        for idx in 0..ExitStatus::COUNT {
            let Some(label) = self.trap_labels[idx] else { continue };
            self.asm.bind_label(label)?;
            self.asm.emit_const_to_mem(
                Mnemonic::MovL,
                idx as i32,
                ENGINE_CTX_REG,
                CTX_EXIT_STATUS,
            );
            self.asm.emit_ret();
        }
        Ok(())
    }

    /// Exits to the engine to run a builtin helper, then resumes.
    ///
    /// The operand stack is flushed first: the builtin's arguments are the
    /// top slots below the reported stack pointer, and its results replace
    /// them before the engine re-enters at the recorded continuation.
    pub(crate) fn emit_builtin_exit(&mut self, builtin: Builtin) -> Result<()> {
        self.flush_all();
        let cont = self.asm.new_label();
        self.asm.emit_const_to_mem(
            Mnemonic::MovL,
            builtin.as_u32() as i32,
            ENGINE_CTX_REG,
            CTX_BUILTIN_INDEX,
        );
        self.asm.emit_const_to_mem(
            Mnemonic::MovQ,
            self.stack.next_slot() as i32,
            ENGINE_CTX_REG,
            CTX_STACK_POINTER,
        );
        self.asm.emit_label_offset_to_mem(cont, ENGINE_CTX_REG, CTX_CONTINUATION);
        self.asm.emit_const_to_mem(
            Mnemonic::MovL,
            ExitStatus::CallBuiltIn.as_u32() as i32,
            ENGINE_CTX_REG,
            CTX_EXIT_STATUS,
        );
        self.asm.emit_ret();
        self.asm.bind_label(cont)?;
        Ok(())
    }

    /// Pops `args` flushed arguments and pushes `results` slot-resident
    /// results around a builtin exit.
    pub(crate) fn builtin_call(
        &mut self,
        builtin: Builtin,
        args: u32,
        results: &[ValType],
    ) -> Result<()> {
        self.emit_builtin_exit(builtin)?;
        for _ in 0..args {
            self.stack.pop();
        }
        for &ty in results {
            self.stack.push_stack(ty);
        }
        Ok(())
    }

    // ── preamble / return ──

    fn emit_preamble(&mut self, function: &Function) -> Result<()> {
        for &ty in &function.params {
            self.stack.push_stack(ty);
        }
        for &ty in &function.locals {
            let value = self.stack.push_stack(ty);
            for w in 0..ty.slot_width() {
                self.asm.emit_const_to_mem(
                    Mnemonic::MovQ,
                    0,
                    STACK_BASE_REG,
                    slot_disp(value.slot + w),
                );
            }
        }
        // Frame probe: the ceiling immediate is patched at finalize.
        self.asm.emit_stack_ceil_to_reg(SCRATCH_REG);
        self.asm
            .emit_mem_to_reg(Mnemonic::CmpQ, ENGINE_CTX_REG, CTX_STACK_CAPACITY, SCRATCH_REG);
        let ok = self.asm.new_label();
        self.asm.emit_jcc(Cond::Be, ok);
        self.emit_builtin_exit(Builtin::GrowValueStack)?;
        self.asm.bind_label(ok)?;
        Ok(())
    }

    fn emit_function_end(&mut self) -> Result<()> {
        if self.reachable {
            let keep = self.results.len() as u32;
            let depth = self.stack.depth();
            self.lower_return(DropKeep { drop: depth - keep, keep })?;
        }
        if let Some(label) = self.return_label {
            self.asm.bind_label(label)?;
            self.asm.emit_const_to_mem(
                Mnemonic::MovL,
                ExitStatus::Returned.as_u32() as i32,
                ENGINE_CTX_REG,
                CTX_EXIT_STATUS,
            );
            self.asm.emit_ret();
        }
        Ok(())
    }

    // ── dispatch ──

    #[allow(clippy::too_many_lines)]
    fn lower_op(&mut self, op: &Op) -> Result<()> {
        // A live flag entry must be materialized before anything that
        // clobbers RFLAGS; the exempted operations either emit nothing,
        // emit only MOV-family instructions, or consume the flag
        // themselves.
        match op {
            Op::Label { .. }
            | Op::Br { .. }
            | Op::BrIf { .. }
            | Op::Select
            | Op::Drop { .. }
            | Op::Swap { .. }
            | Op::Pick { .. }
            | Op::I32Const { .. }
            | Op::I64Const { .. }
            | Op::F32Const { .. }
            | Op::F64Const { .. } => {}
            _ => self.flush_flag()?,
        }

        match op {
            Op::Unreachable => {
                let label = self.trap_label(ExitStatus::Unreachable);
                self.asm.emit_jmp(label);
                self.reachable = false;
            }
            Op::Label { label, arity } => self.lower_label(*label, *arity)?,
            Op::Br { target, drop_keep } => self.lower_br(*target, *drop_keep)?,
            Op::BrIf { target, drop_keep } => self.lower_br_if(*target, *drop_keep)?,
            Op::BrTable { targets, default } => self.lower_br_table(targets, default)?,
            Op::Return { drop_keep } => self.lower_return(*drop_keep)?,

            Op::Pick { depth } => self.lower_pick(*depth)?,
            Op::Swap { depth } => self.lower_swap(*depth)?,
            Op::Drop { drop_keep } => self.apply_drop_keep(*drop_keep)?,
            Op::Select => self.lower_select()?,

            Op::I32Const { value } => {
                self.stack.push_const(u64::from(*value), ValType::I32);
            }
            Op::I64Const { value } => {
                self.stack.push_const(*value, ValType::I64);
            }
            Op::F32Const { bits } => {
                self.stack.push_const(u64::from(*bits), ValType::F32);
            }
            Op::F64Const { bits } => {
                self.stack.push_const(*bits, ValType::F64);
            }
            Op::V128Const { lo, hi } => self.lower_v128_const(*lo, *hi)?,

            Op::Add { ty } => self.lower_int_binop(*ty, Mnemonic::AddL, Mnemonic::AddQ)?,
            Op::Sub { ty } => self.lower_int_binop(*ty, Mnemonic::SubL, Mnemonic::SubQ)?,
            Op::Mul { ty } => self.lower_int_binop(*ty, Mnemonic::ImulL, Mnemonic::ImulQ)?,
            Op::And { ty } => self.lower_int_binop(*ty, Mnemonic::AndL, Mnemonic::AndQ)?,
            Op::Or { ty } => self.lower_int_binop(*ty, Mnemonic::OrL, Mnemonic::OrQ)?,
            Op::Xor { ty } => self.lower_int_binop(*ty, Mnemonic::XorL, Mnemonic::XorQ)?,
            Op::DivS { ty } => self.lower_div(*ty, true, false)?,
            Op::DivU { ty } => self.lower_div(*ty, false, false)?,
            Op::RemS { ty } => self.lower_div(*ty, true, true)?,
            Op::RemU { ty } => self.lower_div(*ty, false, true)?,
            Op::Shl { ty } => self.lower_shift(*ty, Mnemonic::ShlL, Mnemonic::ShlQ)?,
            Op::ShrS { ty } => self.lower_shift(*ty, Mnemonic::SarL, Mnemonic::SarQ)?,
            Op::ShrU { ty } => self.lower_shift(*ty, Mnemonic::ShrL, Mnemonic::ShrQ)?,
            Op::Rotl { ty } => self.lower_shift(*ty, Mnemonic::RolL, Mnemonic::RolQ)?,
            Op::Rotr { ty } => self.lower_shift(*ty, Mnemonic::RorL, Mnemonic::RorQ)?,
            Op::Clz { ty } => self.lower_bitcount(*ty, Mnemonic::LzcntL, Mnemonic::LzcntQ)?,
            Op::Ctz { ty } => self.lower_bitcount(*ty, Mnemonic::TzcntL, Mnemonic::TzcntQ)?,
            Op::Popcnt { ty } => self.lower_bitcount(*ty, Mnemonic::PopcntL, Mnemonic::PopcntQ)?,
            Op::Eqz { ty } => self.lower_eqz(*ty)?,
            Op::Cmp { ty, cmp } => self.lower_int_cmp(*ty, *cmp)?,

            Op::FAdd { ty } => self.lower_float_binop(*ty, Mnemonic::Addss, Mnemonic::Addsd)?,
            Op::FSub { ty } => self.lower_float_binop(*ty, Mnemonic::Subss, Mnemonic::Subsd)?,
            Op::FMul { ty } => self.lower_float_binop(*ty, Mnemonic::Mulss, Mnemonic::Mulsd)?,
            Op::FDiv { ty } => self.lower_float_binop(*ty, Mnemonic::Divss, Mnemonic::Divsd)?,
            Op::FMin { ty } => self.lower_float_min_max(*ty, true)?,
            Op::FMax { ty } => self.lower_float_min_max(*ty, false)?,
            Op::FCopysign { ty } => self.lower_copysign(*ty)?,
            Op::FAbs { ty } => self.lower_fabs(*ty)?,
            Op::FNeg { ty } => self.lower_fneg(*ty)?,
            Op::FSqrt { ty } => self.lower_fsqrt(*ty)?,
            Op::FRound { ty, kind } => self.lower_fround(*ty, *kind)?,
            Op::FCmp { ty, cmp } => self.lower_float_cmp(*ty, *cmp)?,

            Op::I32WrapI64 => self.lower_i32_wrap_i64()?,
            Op::ITruncF { int, float, signed } => self.lower_itrunc_f(*int, *float, *signed)?,
            Op::FConvertI { float, int, signed } => self.lower_fconvert_i(*float, *int, *signed)?,
            Op::F32DemoteF64 => self.lower_demote()?,
            Op::F64PromoteF32 => self.lower_promote()?,
            Op::I32ReinterpretF32 => self.lower_reinterpret(ValType::I32)?,
            Op::I64ReinterpretF64 => self.lower_reinterpret(ValType::I64)?,
            Op::F32ReinterpretI32 => self.lower_reinterpret(ValType::F32)?,
            Op::F64ReinterpretI64 => self.lower_reinterpret(ValType::F64)?,
            Op::Extend { signed } => self.lower_extend(*signed)?,
            Op::SignExtend32From8 => self.lower_sign_extend(Mnemonic::MovsxBL, ValType::I32)?,
            Op::SignExtend32From16 => self.lower_sign_extend(Mnemonic::MovsxWL, ValType::I32)?,
            Op::SignExtend64From8 => self.lower_sign_extend(Mnemonic::MovsxBQ, ValType::I64)?,
            Op::SignExtend64From16 => self.lower_sign_extend(Mnemonic::MovsxWQ, ValType::I64)?,
            Op::SignExtend64From32 => self.lower_sign_extend(Mnemonic::MovsxLQ, ValType::I64)?,

            Op::Load { ty, arg } => self.lower_load(*ty, *arg)?,
            Op::Load8 { ty, signed, arg } => self.lower_load8(*ty, *signed, *arg)?,
            Op::Load16 { ty, signed, arg } => self.lower_load16(*ty, *signed, *arg)?,
            Op::Load32 { signed, arg } => self.lower_load32(*signed, *arg)?,
            Op::Store { ty, arg } => self.lower_store(*ty, *arg)?,
            Op::Store8 { arg } => self.lower_store_narrow(Mnemonic::MovB, 1, *arg)?,
            Op::Store16 { arg } => self.lower_store_narrow(Mnemonic::MovW, 2, *arg)?,
            Op::Store32 { arg } => self.lower_store_narrow(Mnemonic::MovL, 4, *arg)?,
            Op::MemorySize => self.lower_memory_size()?,
            Op::MemoryGrow => self.lower_memory_grow()?,
            Op::MemoryInit { data_index } => self.lower_memory_init(*data_index)?,
            Op::DataDrop { data_index } => self.lower_data_drop(*data_index)?,
            Op::MemoryCopy => self.lower_memory_copy()?,
            Op::MemoryFill => self.lower_memory_fill()?,

            Op::TableGet => self.lower_table_get()?,
            Op::TableSet => self.lower_table_set()?,
            Op::TableSize => self.lower_table_size()?,
            Op::TableGrow => self.lower_table_grow()?,
            Op::TableFill => self.lower_table_fill()?,
            Op::TableInit { elem_index } => self.lower_table_init(*elem_index)?,
            Op::TableCopy => self.lower_table_copy()?,
            Op::ElemDrop { elem_index } => self.lower_elem_drop(*elem_index)?,
            Op::RefFunc { function_index } => self.lower_ref_func(*function_index)?,

            Op::V128Load { kind, arg } => self.lower_v128_load(*kind, *arg)?,
            Op::V128LoadLane { lane_bits, lane, arg } => {
                self.lower_v128_load_lane(*lane_bits, *lane, *arg)?;
            }
            Op::V128Store { arg } => self.lower_v128_store(*arg)?,
            Op::V128StoreLane { lane_bits, lane, arg } => {
                self.lower_v128_store_lane(*lane_bits, *lane, *arg)?;
            }
            Op::V128ExtractLane { shape, lane, signed } => {
                self.lower_v128_extract_lane(*shape, *lane, *signed)?;
            }
            Op::V128ReplaceLane { shape, lane } => self.lower_v128_replace_lane(*shape, *lane)?,
            Op::V128Splat { shape } => self.lower_v128_splat(*shape)?,
            Op::V128Shuffle { lanes } => self.lower_v128_shuffle(lanes)?,
            Op::V128Swizzle => self.lower_v128_swizzle()?,
            Op::V128AnyTrue => self.lower_v128_any_true()?,
            Op::V128AllTrue { shape } => self.lower_v128_all_true(*shape)?,
            Op::V128BitMask { shape } => self.lower_v128_bitmask(*shape)?,
            Op::V128And => self.lower_v128_bitwise(Mnemonic::Pand)?,
            Op::V128Or => self.lower_v128_bitwise(Mnemonic::Por)?,
            Op::V128Xor => self.lower_v128_bitwise(Mnemonic::Pxor)?,
            Op::V128Not => self.lower_v128_not()?,
            Op::V128AndNot => self.lower_v128_andnot()?,
            Op::V128Bitselect => self.lower_v128_bitselect()?,
            Op::V128Shl { shape } => self.lower_v128_shl(*shape)?,
            Op::V128Shr { shape, signed } => self.lower_v128_shr(*shape, *signed)?,
            Op::V128ICmp { shape, cmp } => self.lower_v128_int_cmp(*shape, *cmp)?,
            Op::V128FCmp { shape, cmp } => self.lower_v128_float_cmp(*shape, *cmp)?,
            Op::V128Add { shape } => self.lower_v128_add(*shape)?,
            Op::V128Sub { shape } => self.lower_v128_sub(*shape)?,
            Op::V128Mul { shape } => self.lower_v128_mul(*shape)?,
            Op::V128Div { shape } => self.lower_v128_div(*shape)?,
            Op::V128AddSat { shape, signed } => self.lower_v128_add_sat(*shape, *signed)?,
            Op::V128SubSat { shape, signed } => self.lower_v128_sub_sat(*shape, *signed)?,
            Op::V128Neg { shape } => self.lower_v128_neg(*shape)?,
            Op::V128Sqrt { shape } => self.lower_v128_sqrt(*shape)?,
            Op::V128Abs { shape } => self.lower_v128_abs(*shape)?,
            Op::V128Popcnt => self.lower_v128_popcnt()?,
            Op::V128Min { shape, signed } => self.lower_v128_min(*shape, *signed)?,
            Op::V128Max { shape, signed } => self.lower_v128_max(*shape, *signed)?,
            Op::V128AvgrU { shape } => self.lower_v128_avgr_u(*shape)?,
            Op::V128Pmin { shape } => self.lower_v128_pminmax(*shape, true)?,
            Op::V128Pmax { shape } => self.lower_v128_pminmax(*shape, false)?,
            Op::V128Round { shape, kind } => self.lower_v128_round(*shape, *kind)?,
            Op::V128Extend { origin, signed, low } => {
                self.lower_v128_extend(*origin, *signed, *low)?;
            }
            Op::V128ExtMul { origin, signed, low } => {
                self.lower_v128_ext_mul(*origin, *signed, *low)?;
            }
            Op::V128Q15MulrSatS => self.lower_v128_q15mulr_sat_s()?,
            Op::V128ExtAddPairwise { origin, signed } => {
                self.lower_v128_ext_add_pairwise(*origin, *signed)?;
            }
            Op::V128FloatPromote => self.lower_v128_float_promote()?,
            Op::V128FloatDemote => self.lower_v128_float_demote()?,
            Op::V128FConvertI { shape, signed } => self.lower_v128_fconvert_i(*shape, *signed)?,
            Op::V128Dot => self.lower_v128_dot()?,
            Op::V128Narrow { origin, signed } => self.lower_v128_narrow(*origin, *signed)?,
            Op::V128ITruncSatF { origin, signed } => {
                self.lower_v128_itrunc_sat_f(*origin, *signed)?;
            }
        }
        Ok(())
    }
}
