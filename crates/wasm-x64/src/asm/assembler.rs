//! Byte-level assembler: an append-only code buffer with labels, forward
//! fix-ups, and a static-data pool.
//!
//! Branch displacements and static-data references are recorded as fix-up
//! sites and written in one pass at [`Assembler::finalize`]. Once
//! `finalize` returns, the buffer is immutable; an unresolved fix-up at
//! that point is a bug in the caller, surfaced as an error.

use super::inst::{Enc, Esc, Form, Mnemonic, Prefix};
use super::reg::{Cond, Reg};
use crate::error::{Error, Result};

/// A branch target inside the code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub(crate) u32);

/// Finalized machine code plus the resolved static-data positions.
#[derive(Debug)]
pub struct FinalizedCode {
    pub code: Vec<u8>,
    /// Code-buffer-relative offset of each static-data entry, in the
    /// order the entries were allocated.
    pub static_data_offsets: Vec<u32>,
    /// Mnemonic stream in emission order, for tests and tracing.
    pub listing: Vec<Mnemonic>,
}

pub struct Assembler {
    buf: Vec<u8>,
    labels: Vec<Option<u32>>,
    /// rel32 displacement sites waiting for a label offset.
    jump_sites: Vec<(u32, Label)>,
    /// imm32 sites patched with a label's absolute code offset
    /// (builtin-call continuations).
    abs_sites: Vec<(u32, Label)>,
    static_entries: Vec<Vec<u8>>,
    /// rel32 RIP-displacement sites referencing a static entry.
    static_sites: Vec<(u32, usize)>,
    /// Jump-table slots: (static entry, slot index, target label).
    table_slots: Vec<(usize, usize, Label)>,
    /// imm32 sites patched with the final stack-pointer ceiling.
    ceil_sites: Vec<u32>,
    listing: Vec<Mnemonic>,
}

impl Assembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            labels: Vec::new(),
            jump_sites: Vec::new(),
            abs_sites: Vec::new(),
            static_entries: Vec::new(),
            static_sites: Vec::new(),
            table_slots: Vec::new(),
            ceil_sites: Vec::new(),
            listing: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_offset(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn new_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Binds `label` to the current offset. A label may be bound once.
    pub fn bind_label(&mut self, label: Label) -> Result<u32> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(Error::LabelRebound(label.0));
        }
        let offset = self.buf.len() as u32;
        *slot = Some(offset);
        Ok(offset)
    }

    #[must_use]
    pub fn listing(&self) -> &[Mnemonic] {
        &self.listing
    }

    // ── raw emission ──

    fn u8(&mut self, b: u8) {
        self.buf.push(b);
    }

    fn u32le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64le(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn prefix(&mut self, p: Prefix) {
        match p {
            Prefix::None => {}
            Prefix::P66 => self.u8(0x66),
            Prefix::PF2 => self.u8(0xF2),
            Prefix::PF3 => self.u8(0xF3),
        }
    }

    fn escape(&mut self, esc: Esc) {
        match esc {
            Esc::None => {}
            Esc::E0F => self.u8(0x0F),
            Esc::E0F38 => {
                self.u8(0x0F);
                self.u8(0x38);
            }
            Esc::E0F3A => {
                self.u8(0x0F);
                self.u8(0x3A);
            }
        }
    }

    /// REX byte from the W flag and the extension bits of the operands in
    /// the `reg`, `index` and `rm`/`base` positions. `force` makes the
    /// byte present even when empty (byte ops touching SPL..DIL).
    fn rex(&mut self, w: bool, reg: Option<Reg>, index: Option<Reg>, rm: Option<Reg>, force: bool) {
        let mut b = 0x40u8;
        if w {
            b |= 0x08;
        }
        if reg.is_some_and(Reg::needs_rex_ext) {
            b |= 0x04;
        }
        if index.is_some_and(Reg::needs_rex_ext) {
            b |= 0x02;
        }
        if rm.is_some_and(Reg::needs_rex_ext) {
            b |= 0x01;
        }
        if b != 0x40 || force {
            self.u8(b);
        }
    }

    fn modrm(&mut self, mode: u8, reg: u8, rm: u8) {
        self.u8((mode << 6) | ((reg & 7) << 3) | (rm & 7));
    }

    /// True when a GP register needs a REX byte to be addressed as its
    /// low byte (SPL/BPL/SIL/DIL).
    fn byte_rex_needed(reg: Reg) -> bool {
        !reg.is_vector() && (4..8).contains(&(reg as u8))
    }

    fn encode_rr(&mut self, enc: &Enc, reg_op: Reg, rm_op: Reg, imm: Option<u8>) {
        self.prefix(enc.prefix);
        let force = enc.byte_op && (Self::byte_rex_needed(reg_op) || Self::byte_rex_needed(rm_op));
        self.rex(enc.rex_w, Some(reg_op), None, Some(rm_op), force);
        self.escape(enc.escape);
        self.u8(enc.op);
        self.modrm(0b11, reg_op.hw_code(), rm_op.hw_code());
        if let Some(i) = imm {
            self.u8(i);
        }
    }

    /// ModRM + optional SIB + displacement for a `[base + disp]` or
    /// `[base + index*scale + disp]` operand.
    fn mem_operand(&mut self, reg_field: u8, base: Reg, disp: i32, index: Option<(Reg, u8)>) {
        debug_assert!(!base.is_vector());
        let needs_sib = index.is_some() || base.hw_code() == 4;
        // RBP/R13 as base cannot use the no-displacement mode.
        let mode = if disp == 0 && base.hw_code() != 5 {
            0b00
        } else if i8::try_from(disp).is_ok() {
            0b01
        } else {
            0b10
        };
        if needs_sib {
            self.modrm(mode, reg_field, 0b100);
            let (index_reg, scale) = index.unwrap_or((Reg::Rsp, 1));
            debug_assert!(index.is_none() || index_reg != Reg::Rsp);
            let ss = match scale {
                1 => 0,
                2 => 1,
                4 => 2,
                8 => 3,
                _ => unreachable!("invalid scale {scale}"),
            };
            self.u8((ss << 6) | (index_reg.hw_code() << 3) | base.hw_code());
        } else {
            self.modrm(mode, reg_field, base.hw_code());
        }
        match mode {
            0b01 => self.u8(disp as i8 as u8),
            0b10 => self.u32le(disp as u32),
            _ => {}
        }
    }

    fn encode_mem(
        &mut self,
        enc: &Enc,
        opcode: u8,
        reg_op: Reg,
        base: Reg,
        disp: i32,
        index: Option<(Reg, u8)>,
        imm: Option<u8>,
    ) {
        self.prefix(enc.prefix);
        let force = enc.byte_op && Self::byte_rex_needed(reg_op);
        self.rex(enc.rex_w, Some(reg_op), index.map(|(r, _)| r), Some(base), force);
        self.escape(enc.escape);
        self.u8(opcode);
        self.mem_operand(reg_op.hw_code(), base, disp, index);
        if let Some(i) = imm {
            self.u8(i);
        }
    }

    /// Emits the opcode with a RIP-relative operand and returns the
    /// offset of the 4-byte displacement placeholder.
    fn encode_rip(&mut self, enc: &Enc, reg_op: Reg, imm: Option<u8>) -> u32 {
        self.prefix(enc.prefix);
        self.rex(enc.rex_w, Some(reg_op), None, None, false);
        self.escape(enc.escape);
        self.u8(enc.op);
        self.modrm(0b00, reg_op.hw_code(), 0b101);
        let site = self.buf.len() as u32;
        self.u32le(0);
        if let Some(i) = imm {
            self.u8(i);
        }
        site
    }

    // ── §4.1 instruction templates ──

    /// `dst ← dst op src` (or plain `dst ← src` for moves).
    ///
    /// `MovL`/`MovQ` dispatch on the operand classes: GP↔GP uses the
    /// plain move, GP↔XMM the MOVD/MOVQ cross forms, XMM↔XMM the
    /// MOVQ-zeroing form.
    pub fn emit_rr(&mut self, m: Mnemonic, src: Reg, dst: Reg) {
        self.listing.push(m);
        if matches!(m, Mnemonic::MovL | Mnemonic::MovQ) {
            let wide = m == Mnemonic::MovQ;
            match (src.is_vector(), dst.is_vector()) {
                (false, false) => {}
                (false, true) => {
                    // movd/movq xmm, r: 66 (REX.W) 0F 6E /r
                    self.u8(0x66);
                    self.rex(wide, Some(dst), None, Some(src), false);
                    self.u8(0x0F);
                    self.u8(0x6E);
                    self.modrm(0b11, dst.hw_code(), src.hw_code());
                    return;
                }
                (true, false) => {
                    // movd/movq r, xmm: 66 (REX.W) 0F 7E /r
                    self.u8(0x66);
                    self.rex(wide, Some(src), None, Some(dst), false);
                    self.u8(0x0F);
                    self.u8(0x7E);
                    self.modrm(0b11, src.hw_code(), dst.hw_code());
                    return;
                }
                (true, true) => {
                    // movq xmm, xmm: F3 0F 7E /r (zeroes the upper half)
                    debug_assert!(wide, "32-bit xmm-to-xmm moves use Movss/Movaps");
                    self.u8(0xF3);
                    self.rex(false, Some(dst), None, Some(src), false);
                    self.u8(0x0F);
                    self.u8(0x7E);
                    self.modrm(0b11, dst.hw_code(), src.hw_code());
                    return;
                }
            }
        }
        let enc = m.enc();
        match enc.form {
            Form::Rm => self.encode_rr(&enc, dst, src, None),
            Form::Mr => self.encode_rr(&enc, src, dst, None),
        }
    }

    /// Two-register form with a trailing imm8 (PSHUFD, PINSR*, CMPPS, ...).
    pub fn emit_rr_imm(&mut self, m: Mnemonic, src: Reg, dst: Reg, imm: u8) {
        self.listing.push(m);
        let enc = m.enc();
        debug_assert!(enc.imm8);
        match enc.form {
            Form::Rm => self.encode_rr(&enc, dst, src, Some(imm)),
            Form::Mr => self.encode_rr(&enc, src, dst, Some(imm)),
        }
    }

    /// Immediate-operand form: `dst ← dst op imm` / `dst ← imm`.
    pub fn emit_const_to_reg(&mut self, m: Mnemonic, imm: i64, dst: Reg) {
        self.listing.push(m);
        if let Some((digit, wide)) = m.group1_digit() {
            let imm32 = i32::try_from(imm).expect("group-1 immediate out of range");
            self.rex(wide, None, None, Some(dst), false);
            self.u8(0x81);
            self.modrm(0b11, digit, dst.hw_code());
            self.u32le(imm32 as u32);
            return;
        }
        if let Some((digit, wide)) = m.shift_digit() {
            self.rex(wide, None, None, Some(dst), false);
            self.u8(0xC1);
            self.modrm(0b11, digit, dst.hw_code());
            self.u8((imm & 0x3F) as u8);
            return;
        }
        if let Some((opcode, digit)) = m.vec_shift_imm() {
            debug_assert!(dst.is_vector());
            self.u8(0x66);
            self.rex(false, None, None, Some(dst), false);
            self.u8(0x0F);
            self.u8(opcode);
            self.modrm(0b11, digit, dst.hw_code());
            self.u8(imm as u8);
            return;
        }
        match m {
            Mnemonic::MovL => {
                let imm32 = imm as u32;
                self.rex(false, None, None, Some(dst), false);
                self.u8(0xB8 + dst.hw_code());
                self.u32le(imm32);
            }
            Mnemonic::MovQ => {
                if let Ok(imm32) = i32::try_from(imm) {
                    self.rex(true, None, None, Some(dst), false);
                    self.u8(0xC7);
                    self.modrm(0b11, 0, dst.hw_code());
                    self.u32le(imm32 as u32);
                } else {
                    self.rex(true, None, None, Some(dst), false);
                    self.u8(0xB8 + dst.hw_code());
                    self.u64le(imm as u64);
                }
            }
            Mnemonic::TestL | Mnemonic::TestQ => {
                let imm32 = i32::try_from(imm).expect("test immediate out of range");
                self.rex(m == Mnemonic::TestQ, None, None, Some(dst), false);
                self.u8(0xF7);
                self.modrm(0b11, 0, dst.hw_code());
                self.u32le(imm32 as u32);
            }
            _ => unreachable!("{m:?} has no immediate form"),
        }
    }

    /// `dst ← [base + disp]`.
    pub fn emit_mem_to_reg(&mut self, m: Mnemonic, base: Reg, disp: i32, dst: Reg) {
        self.listing.push(m);
        let enc = m.enc();
        debug_assert!(enc.form == Form::Rm);
        self.encode_mem(&enc, enc.op, dst, base, disp, None, None);
    }

    /// `[base + disp] ← src`.
    pub fn emit_reg_to_mem(&mut self, m: Mnemonic, src: Reg, base: Reg, disp: i32) {
        self.listing.push(m);
        let enc = m.enc();
        let opcode = enc.store_op.expect("mnemonic has no store form");
        self.encode_mem(&enc, opcode, src, base, disp, None, None);
    }

    /// `dst ← [base + index*scale + disp]`.
    pub fn emit_mem_indexed_to_reg(
        &mut self,
        m: Mnemonic,
        base: Reg,
        disp: i32,
        index: Reg,
        scale: u8,
        dst: Reg,
    ) {
        self.listing.push(m);
        let enc = m.enc();
        debug_assert!(enc.form == Form::Rm);
        self.encode_mem(&enc, enc.op, dst, base, disp, Some((index, scale)), None);
    }

    /// `[base + index*scale + disp] ← src`.
    pub fn emit_reg_to_mem_indexed(
        &mut self,
        m: Mnemonic,
        src: Reg,
        base: Reg,
        disp: i32,
        index: Reg,
        scale: u8,
    ) {
        self.listing.push(m);
        let enc = m.enc();
        let opcode = enc.store_op.expect("mnemonic has no store form");
        self.encode_mem(&enc, opcode, src, base, disp, Some((index, scale)), None);
    }

    /// Indexed load with a lane immediate (PINSR* from memory).
    pub fn emit_mem_indexed_to_reg_imm(
        &mut self,
        m: Mnemonic,
        base: Reg,
        disp: i32,
        index: Reg,
        scale: u8,
        dst: Reg,
        imm: u8,
    ) {
        self.listing.push(m);
        let enc = m.enc();
        debug_assert!(enc.imm8 && enc.form == Form::Rm);
        self.encode_mem(&enc, enc.op, dst, base, disp, Some((index, scale)), Some(imm));
    }

    /// Indexed store with a lane immediate (PEXTR* to memory).
    pub fn emit_reg_to_mem_indexed_imm(
        &mut self,
        m: Mnemonic,
        src: Reg,
        base: Reg,
        disp: i32,
        index: Reg,
        scale: u8,
        imm: u8,
    ) {
        self.listing.push(m);
        let enc = m.enc();
        debug_assert!(enc.imm8 && enc.form == Form::Mr);
        self.encode_mem(&enc, enc.op, src, base, disp, Some((index, scale)), Some(imm));
    }

    /// `[base + disp] ← imm32` (sign-extended for the 64-bit form).
    pub fn emit_const_to_mem(&mut self, m: Mnemonic, imm: i32, base: Reg, disp: i32) {
        self.listing.push(m);
        let wide = match m {
            Mnemonic::MovL => false,
            Mnemonic::MovQ => true,
            _ => unreachable!("{m:?} has no store-immediate form"),
        };
        self.rex(wide, None, None, Some(base), false);
        self.u8(0xC7);
        self.mem_operand(0, base, disp, None);
        self.u32le(imm as u32);
    }

    /// Shift/rotate by CL.
    pub fn emit_shift_cl(&mut self, m: Mnemonic, dst: Reg) {
        self.listing.push(m);
        let (digit, wide) = m.shift_digit().expect("not a shift mnemonic");
        self.rex(wide, None, None, Some(dst), false);
        self.u8(0xD3);
        self.modrm(0b11, digit, dst.hw_code());
    }

    /// DIV/IDIV (implicit AX/DX operands).
    pub fn emit_unary(&mut self, m: Mnemonic, rm: Reg) {
        self.listing.push(m);
        let (digit, wide) = m.unary_digit().expect("not a unary mnemonic");
        self.rex(wide, None, None, Some(rm), false);
        self.u8(0xF7);
        self.modrm(0b11, digit, rm.hw_code());
    }

    pub fn emit_cdq(&mut self) {
        self.listing.push(Mnemonic::Cdq);
        self.u8(0x99);
    }

    pub fn emit_cqo(&mut self) {
        self.listing.push(Mnemonic::Cqo);
        self.u8(0x48);
        self.u8(0x99);
    }

    /// SETcc on the low byte of `dst`.
    pub fn emit_setcc(&mut self, cond: Cond, dst: Reg) {
        self.listing.push(Mnemonic::Setcc);
        self.rex(false, None, None, Some(dst), Self::byte_rex_needed(dst));
        self.u8(0x0F);
        self.u8(0x90 + cond as u8);
        self.modrm(0b11, 0, dst.hw_code());
    }

    pub fn emit_cmovcc(&mut self, m: Mnemonic, cond: Cond, src: Reg, dst: Reg) {
        self.listing.push(m);
        let wide = match m {
            Mnemonic::CmovL => false,
            Mnemonic::CmovQ => true,
            _ => unreachable!("{m:?} is not a conditional move"),
        };
        self.rex(wide, Some(dst), None, Some(src), false);
        self.u8(0x0F);
        self.u8(0x40 + cond as u8);
        self.modrm(0b11, dst.hw_code(), src.hw_code());
    }

    /// Conditional jump to `target`, rel32, resolved at finalize.
    pub fn emit_jcc(&mut self, cond: Cond, target: Label) {
        self.listing.push(Mnemonic::Jcc);
        self.u8(0x0F);
        self.u8(0x80 + cond as u8);
        let site = self.buf.len() as u32;
        self.u32le(0);
        self.jump_sites.push((site, target));
    }

    /// Unconditional jump to `target`, rel32, resolved at finalize.
    pub fn emit_jmp(&mut self, target: Label) {
        self.listing.push(Mnemonic::Jmp);
        self.u8(0xE9);
        let site = self.buf.len() as u32;
        self.u32le(0);
        self.jump_sites.push((site, target));
    }

    /// Indirect jump through a GP register.
    pub fn emit_jmp_reg(&mut self, reg: Reg) {
        self.listing.push(Mnemonic::JmpReg);
        debug_assert!(!reg.is_vector());
        self.rex(false, None, None, Some(reg), false);
        self.u8(0xFF);
        self.modrm(0b11, 4, reg.hw_code());
    }

    pub fn emit_ret(&mut self) {
        self.listing.push(Mnemonic::Ret);
        self.u8(0xC3);
    }

    // ── static data ──

    /// Copies `bytes` into the static-data pool and returns the entry id.
    pub fn add_static_entry(&mut self, bytes: &[u8]) -> usize {
        self.static_entries.push(bytes.to_vec());
        self.static_entries.len() - 1
    }

    /// Loads a pooled constant into `dst` with a RIP-relative operand of
    /// the given load mnemonic (MOVDQU, MOVSS, MOVSD, ...).
    pub fn load_static_const_to_reg(&mut self, m: Mnemonic, bytes: &[u8], dst: Reg) {
        let entry = self.add_static_entry(bytes);
        self.load_static_entry_to_reg(m, entry, dst);
    }

    /// RIP-relative load of an existing static entry.
    pub fn load_static_entry_to_reg(&mut self, m: Mnemonic, entry: usize, dst: Reg) {
        self.listing.push(m);
        let enc = m.enc();
        debug_assert!(enc.form == Form::Rm && !enc.imm8);
        let site = self.encode_rip(&enc, dst, None);
        self.static_sites.push((site, entry));
    }

    /// LEA of a static entry's address into a GP register.
    pub fn lea_static_entry(&mut self, entry: usize, dst: Reg) {
        self.listing.push(Mnemonic::Lea);
        debug_assert!(!dst.is_vector());
        let enc = Mnemonic::Lea.enc();
        let site = self.encode_rip(&enc, dst, None);
        self.static_sites.push((site, entry));
    }

    /// Allocates a jump table of `labels.len()` 32-bit entries in the
    /// static pool. Each entry is patched at finalize with
    /// `target_offset - table_offset`, so `table_address + entry` is the
    /// target address at run time.
    pub fn add_jump_table(&mut self, labels: &[Label]) -> usize {
        let entry = self.add_static_entry(&vec![0u8; labels.len() * 4]);
        for (slot, label) in labels.iter().enumerate() {
            self.table_slots.push((entry, slot, *label));
        }
        entry
    }

    /// `MOV dst, imm32` whose immediate is patched at finalize with the
    /// function's stack-pointer ceiling.
    pub fn emit_stack_ceil_to_reg(&mut self, dst: Reg) {
        self.listing.push(Mnemonic::MovL);
        self.rex(false, None, None, Some(dst), false);
        self.u8(0xB8 + dst.hw_code());
        let site = self.buf.len() as u32;
        self.u32le(0);
        self.ceil_sites.push(site);
    }

    /// `MOV dword [base + disp], imm32` where the immediate is the
    /// absolute code offset of `label` (builtin-call continuations).
    pub fn emit_label_offset_to_mem(&mut self, label: Label, base: Reg, disp: i32) {
        self.listing.push(Mnemonic::MovL);
        self.rex(false, None, None, Some(base), false);
        self.u8(0xC7);
        self.mem_operand(0, base, disp, None);
        let site = self.buf.len() as u32;
        self.u32le(0);
        self.abs_sites.push((site, label));
    }

    // ── finalization ──

    fn patch_u32(buf: &mut [u8], site: u32, value: u32) {
        buf[site as usize..site as usize + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn resolved(&self, label: Label) -> Result<u32> {
        self.labels[label.0 as usize].ok_or(Error::UnresolvedFixup(label.0))
    }

    /// Appends the static-data pool, resolves every fix-up, and patches
    /// the stack-ceiling immediates.
    pub fn finalize(mut self, stack_pointer_ceil: u32) -> Result<FinalizedCode> {
        while self.buf.len() % 16 != 0 {
            self.buf.push(0);
        }
        let mut static_data_offsets = Vec::with_capacity(self.static_entries.len());
        let entries = std::mem::take(&mut self.static_entries);
        for bytes in &entries {
            static_data_offsets.push(self.buf.len() as u32);
            self.buf.extend_from_slice(bytes);
        }

        for (site, label) in std::mem::take(&mut self.jump_sites) {
            let target = self.resolved(label)?;
            let disp = target.wrapping_sub(site + 4) as i32;
            Self::patch_u32(&mut self.buf, site, disp as u32);
        }
        for (site, entry) in std::mem::take(&mut self.static_sites) {
            let target = static_data_offsets[entry];
            let disp = target.wrapping_sub(site + 4) as i32;
            Self::patch_u32(&mut self.buf, site, disp as u32);
        }
        for (site, label) in std::mem::take(&mut self.abs_sites) {
            let target = self.resolved(label)?;
            Self::patch_u32(&mut self.buf, site, target);
        }
        for (entry, slot, label) in std::mem::take(&mut self.table_slots) {
            let target = self.resolved(label)?;
            let table = static_data_offsets[entry];
            let delta = target.wrapping_sub(table) as i32;
            Self::patch_u32(&mut self.buf, table + slot as u32 * 4, delta as u32);
        }
        for site in std::mem::take(&mut self.ceil_sites) {
            Self::patch_u32(&mut self.buf, site, stack_pointer_ceil);
        }

        Ok(FinalizedCode { code: self.buf, static_data_offsets, listing: self.listing })
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(f: impl FnOnce(&mut Assembler)) -> Vec<u8> {
        let mut asm = Assembler::new();
        f(&mut asm);
        asm.finalize(0).expect("finalize").code
    }

    #[test]
    fn mov_reg_reg() {
        assert_eq!(bytes(|a| a.emit_rr(Mnemonic::MovQ, Reg::Rbx, Reg::Rax)), [0x48, 0x8B, 0xC3]);
        assert_eq!(bytes(|a| a.emit_rr(Mnemonic::MovL, Reg::Rdx, Reg::Rcx)), [0x8B, 0xCA]);
    }

    #[test]
    fn mov_cross_class() {
        // movq xmm0, rax
        assert_eq!(
            bytes(|a| a.emit_rr(Mnemonic::MovQ, Reg::Rax, Reg::Xmm0)),
            [0x66, 0x48, 0x0F, 0x6E, 0xC0]
        );
        // movq rax, xmm0
        assert_eq!(
            bytes(|a| a.emit_rr(Mnemonic::MovQ, Reg::Xmm0, Reg::Rax)),
            [0x66, 0x48, 0x0F, 0x7E, 0xC0]
        );
        // movd xmm1, ecx
        assert_eq!(
            bytes(|a| a.emit_rr(Mnemonic::MovL, Reg::Rcx, Reg::Xmm1)),
            [0x66, 0x0F, 0x6E, 0xC9]
        );
    }

    #[test]
    fn sse_reg_reg() {
        // paddb xmm1, xmm2
        assert_eq!(
            bytes(|a| a.emit_rr(Mnemonic::Paddb, Reg::Xmm2, Reg::Xmm1)),
            [0x66, 0x0F, 0xFC, 0xCA]
        );
        // pxor xmm8, xmm8 needs REX.R and REX.B
        assert_eq!(
            bytes(|a| a.emit_rr(Mnemonic::Pxor, Reg::Xmm8, Reg::Xmm8)),
            [0x66, 0x45, 0x0F, 0xEF, 0xC0]
        );
        // pshufb xmm0, xmm1 (0F 38 escape)
        assert_eq!(
            bytes(|a| a.emit_rr(Mnemonic::Pshufb, Reg::Xmm1, Reg::Xmm0)),
            [0x66, 0x0F, 0x38, 0x00, 0xC1]
        );
    }

    #[test]
    fn imm8_forms() {
        // pshufd xmm0, xmm1, 0
        assert_eq!(
            bytes(|a| a.emit_rr_imm(Mnemonic::Pshufd, Reg::Xmm1, Reg::Xmm0, 0)),
            [0x66, 0x0F, 0x70, 0xC1, 0x00]
        );
        // pextrb eax, xmm2, 3 (MR form: reg = xmm source)
        assert_eq!(
            bytes(|a| a.emit_rr_imm(Mnemonic::Pextrb, Reg::Xmm2, Reg::Rax, 3)),
            [0x66, 0x0F, 0x3A, 0x14, 0xD0, 0x03]
        );
    }

    #[test]
    fn const_forms() {
        // mov eax, 7
        assert_eq!(
            bytes(|a| a.emit_const_to_reg(Mnemonic::MovL, 7, Reg::Rax)),
            [0xB8, 0x07, 0x00, 0x00, 0x00]
        );
        // mov rax, -1 (sign-extended C7 form)
        assert_eq!(
            bytes(|a| a.emit_const_to_reg(Mnemonic::MovQ, -1, Reg::Rax)),
            [0x48, 0xC7, 0xC0, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        // movabs for a 64-bit immediate
        assert_eq!(
            bytes(|a| a.emit_const_to_reg(Mnemonic::MovQ, 0x1_0000_0000, Reg::Rax)),
            [0x48, 0xB8, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
        // and rcx, 63
        assert_eq!(
            bytes(|a| a.emit_const_to_reg(Mnemonic::AndQ, 63, Reg::Rcx)),
            [0x48, 0x81, 0xE1, 0x3F, 0x00, 0x00, 0x00]
        );
        // shl rax, 4
        assert_eq!(
            bytes(|a| a.emit_const_to_reg(Mnemonic::ShlQ, 4, Reg::Rax)),
            [0x48, 0xC1, 0xE0, 0x04]
        );
        // psrlw xmm1, 4
        assert_eq!(
            bytes(|a| a.emit_const_to_reg(Mnemonic::Psrlw, 4, Reg::Xmm1)),
            [0x66, 0x0F, 0x71, 0xD1, 0x04]
        );
    }

    #[test]
    fn mem_forms() {
        // mov rax, [r13 + 0] — R13 base forces a disp8
        assert_eq!(
            bytes(|a| a.emit_mem_to_reg(Mnemonic::MovQ, Reg::R13, 0, Reg::Rax)),
            [0x49, 0x8B, 0x45, 0x00]
        );
        // mov [r14 + 8], rax
        assert_eq!(
            bytes(|a| a.emit_reg_to_mem(Mnemonic::MovQ, Reg::Rax, Reg::R14, 8)),
            [0x49, 0x89, 0x46, 0x08]
        );
        // movzx eax, byte [r15 + rcx*1 - 1]
        assert_eq!(
            bytes(|a| a.emit_mem_indexed_to_reg(Mnemonic::MovzxBL, Reg::R15, -1, Reg::Rcx, 1, Reg::Rax)),
            [0x41, 0x0F, 0xB6, 0x44, 0x0F, 0xFF]
        );
        // mov dword [r13 + 0], 5
        assert_eq!(
            bytes(|a| a.emit_const_to_mem(Mnemonic::MovL, 5, Reg::R13, 0)),
            [0x41, 0xC7, 0x45, 0x00, 0x05, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn setcc_and_shift_cl() {
        // sete al
        assert_eq!(bytes(|a| a.emit_setcc(Cond::E, Reg::Rax)), [0x0F, 0x94, 0xC0]);
        // setne sil needs an empty REX
        assert_eq!(bytes(|a| a.emit_setcc(Cond::Ne, Reg::Rsi)), [0x40, 0x0F, 0x95, 0xC6]);
        // shl rax, cl
        assert_eq!(bytes(|a| a.emit_shift_cl(Mnemonic::ShlQ, Reg::Rax)), [0x48, 0xD3, 0xE0]);
        // idiv rbx
        assert_eq!(bytes(|a| a.emit_unary(Mnemonic::IdivQ, Reg::Rbx)), [0x48, 0xF7, 0xFB]);
    }

    #[test]
    fn forward_jump_resolution() {
        let mut asm = Assembler::new();
        let label = asm.new_label();
        asm.emit_jmp(label);
        asm.emit_ret();
        asm.bind_label(label).expect("bind");
        asm.emit_ret();
        let code = asm.finalize(0).expect("finalize").code;
        // jmp rel32 over the first ret: displacement 1.
        assert_eq!(&code[..6], [0xE9, 0x01, 0x00, 0x00, 0x00, 0xC3]);
        assert_eq!(code[6], 0xC3);
    }

    #[test]
    fn backward_jump_resolution() {
        let mut asm = Assembler::new();
        let label = asm.new_label();
        asm.bind_label(label).expect("bind");
        asm.emit_ret();
        asm.emit_jmp(label);
        let code = asm.finalize(0).expect("finalize").code;
        // site at 2, next at 6, target 0 → disp -6.
        assert_eq!(&code[1..6], [0xE9, 0xFA, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn unresolved_fixup_is_an_error() {
        let mut asm = Assembler::new();
        let label = asm.new_label();
        asm.emit_jmp(label);
        assert!(matches!(asm.finalize(0), Err(Error::UnresolvedFixup(_))));
    }

    #[test]
    fn label_rebound_is_an_error() {
        let mut asm = Assembler::new();
        let label = asm.new_label();
        asm.bind_label(label).expect("first bind");
        assert!(matches!(asm.bind_label(label), Err(Error::LabelRebound(_))));
    }

    #[test]
    fn static_data_is_appended_after_code() {
        let mut asm = Assembler::new();
        asm.load_static_const_to_reg(Mnemonic::Movdqu, &[0xAA; 16], Reg::Xmm0);
        asm.emit_ret();
        let fin = asm.finalize(0).expect("finalize");
        let off = fin.static_data_offsets[0] as usize;
        assert_eq!(off % 16, 0);
        assert_eq!(&fin.code[off..off + 16], &[0xAA; 16]);
        // movdqu xmm0, [rip+disp]: F3 0F 6F 05 disp32
        assert_eq!(&fin.code[..4], [0xF3, 0x0F, 0x6F, 0x05]);
        let disp = i32::from_le_bytes(fin.code[4..8].try_into().unwrap());
        assert_eq!(8 + disp, off as i32);
    }

    #[test]
    fn jump_table_entries_are_table_relative() {
        let mut asm = Assembler::new();
        let l0 = asm.new_label();
        asm.bind_label(l0).expect("bind");
        asm.emit_ret();
        let table = asm.add_jump_table(&[l0]);
        asm.lea_static_entry(table, Reg::Rax);
        let fin = asm.finalize(0).expect("finalize");
        let table_off = fin.static_data_offsets[0] as usize;
        let entry = i32::from_le_bytes(fin.code[table_off..table_off + 4].try_into().unwrap());
        // l0 is at offset 0; entry = 0 - table_off.
        assert_eq!(entry, -(table_off as i32));
    }
}
