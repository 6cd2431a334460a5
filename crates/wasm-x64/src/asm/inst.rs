//! Instruction mnemonics and their encoding table.
//!
//! One variant per machine instruction the generator emits. The table
//! describes the legacy-prefix / escape / opcode / ModRM layout; irregular
//! instructions (jumps, SETcc, CMOVcc, CDQ/CQO, register-class-dependent
//! moves) are encoded by dedicated assembler methods and have no table
//! entry.

/// Mandatory legacy prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prefix {
    None,
    P66,
    PF2,
    PF3,
}

/// Opcode escape bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Esc {
    None,
    E0F,
    E0F38,
    E0F3A,
}

/// Which operand occupies the ModRM `reg` field in the two-operand form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Form {
    /// `reg` = destination, `rm` = source (loads, most SSE ops).
    Rm,
    /// `reg` = source, `rm` = destination (TEST, PEXTRB/D/Q).
    Mr,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Enc {
    pub prefix: Prefix,
    pub rex_w: bool,
    pub escape: Esc,
    /// Opcode of the register-destination (load) form.
    pub op: u8,
    /// Opcode of the memory-destination form when it differs from `op`.
    pub store_op: Option<u8>,
    pub form: Form,
    /// The two-operand form carries a trailing imm8.
    pub imm8: bool,
    /// 8-bit operand size (forces a REX byte for SPL/BPL/SIL/DIL).
    pub byte_op: bool,
}

const fn e(prefix: Prefix, rex_w: bool, escape: Esc, op: u8) -> Enc {
    Enc { prefix, rex_w, escape, op, store_op: None, form: Form::Rm, imm8: false, byte_op: false }
}

const fn store(mut enc: Enc, store_op: u8) -> Enc {
    enc.store_op = Some(store_op);
    enc
}

const fn mr(mut enc: Enc) -> Enc {
    enc.form = Form::Mr;
    enc
}

const fn imm8(mut enc: Enc) -> Enc {
    enc.imm8 = true;
    enc
}

const fn byte_op(mut enc: Enc) -> Enc {
    enc.byte_op = true;
    enc
}

/// Every instruction the generator can emit.
///
/// `L` suffix = 32-bit operand size, `Q` = 64-bit (REX.W).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Mnemonic {
    // general-purpose moves
    MovB,
    MovW,
    MovL,
    MovQ,
    XchgQ,
    Lea,
    // general-purpose ALU
    AddL,
    AddQ,
    SubL,
    SubQ,
    AndL,
    AndQ,
    OrL,
    OrQ,
    XorL,
    XorQ,
    CmpL,
    CmpQ,
    TestL,
    TestQ,
    ImulL,
    ImulQ,
    // unary group (F7 /digit)
    DivL,
    DivQ,
    IdivL,
    IdivQ,
    // shifts and rotates (D3 /digit by CL, C1 /digit by imm8)
    ShlL,
    ShlQ,
    ShrL,
    ShrQ,
    SarL,
    SarQ,
    RolL,
    RolQ,
    RorL,
    RorQ,
    // bit counting
    LzcntL,
    LzcntQ,
    TzcntL,
    TzcntQ,
    PopcntL,
    PopcntQ,
    // widening moves
    MovzxBL,
    MovzxWL,
    MovsxBL,
    MovsxWL,
    MovsxBQ,
    MovsxWQ,
    MovsxLQ,
    // irregular (dedicated emitters)
    Setcc,
    CmovL,
    CmovQ,
    Jcc,
    Jmp,
    JmpReg,
    Ret,
    Cdq,
    Cqo,
    // vector moves
    Movdqa,
    Movdqu,
    Movaps,
    Movss,
    Movsd,
    Movlhps,
    // packed integer arithmetic
    Paddb,
    Paddw,
    Paddd,
    Paddq,
    Psubb,
    Psubw,
    Psubd,
    Psubq,
    Paddsb,
    Paddsw,
    Paddusb,
    Paddusw,
    Psubsb,
    Psubsw,
    Psubusb,
    Psubusw,
    Pmullw,
    Pmuludq,
    Pmuldq,
    Pmulld,
    Pmaddwd,
    Pmaddubsw,
    Pmulhrsw,
    Pavgb,
    Pavgw,
    // packed bitwise
    Pand,
    Pandn,
    Por,
    Pxor,
    // packed compare
    Pcmpeqb,
    Pcmpeqw,
    Pcmpeqd,
    Pcmpeqq,
    Pcmpgtb,
    Pcmpgtw,
    Pcmpgtd,
    Pcmpgtq,
    // packed min/max
    Pminsb,
    Pminub,
    Pminsw,
    Pminuw,
    Pminsd,
    Pminud,
    Pmaxsb,
    Pmaxub,
    Pmaxsw,
    Pmaxuw,
    Pmaxsd,
    Pmaxud,
    // packed abs
    Pabsb,
    Pabsw,
    Pabsd,
    // pack / unpack
    Packsswb,
    Packssdw,
    Packuswb,
    Packusdw,
    Punpcklbw,
    Punpckhbw,
    Unpcklps,
    // packed shifts (count in XMM; imm8 forms via `vec_shift_imm`)
    Psllw,
    Pslld,
    Psllq,
    Psrlw,
    Psrld,
    Psrlq,
    Psraw,
    Psrad,
    Psrldq,
    // shuffles and lane ops
    Pshufb,
    Pshufd,
    Shufps,
    Pinsrb,
    Pinsrw,
    Pinsrd,
    Pinsrq,
    Pextrb,
    Pextrw,
    Pextrd,
    Pextrq,
    Insertps,
    Pmovmskb,
    Movmskps,
    Movmskpd,
    Ptest,
    Blendvpd,
    // widening loads
    Pmovsxbw,
    Pmovsxwd,
    Pmovsxdq,
    Pmovzxbw,
    Pmovzxwd,
    Pmovzxdq,
    // packed float
    Addps,
    Addpd,
    Subps,
    Subpd,
    Mulps,
    Mulpd,
    Divps,
    Divpd,
    Minps,
    Minpd,
    Maxps,
    Maxpd,
    Sqrtps,
    Sqrtpd,
    Andps,
    Andpd,
    Andnps,
    Andnpd,
    Orps,
    Orpd,
    Xorps,
    Xorpd,
    Cmpps,
    Cmppd,
    Roundps,
    Roundpd,
    // scalar float
    Addss,
    Addsd,
    Subss,
    Subsd,
    Mulss,
    Mulsd,
    Divss,
    Divsd,
    Minss,
    Minsd,
    Maxss,
    Maxsd,
    Sqrtss,
    Sqrtsd,
    Ucomiss,
    Ucomisd,
    Cmpss,
    Cmpsd,
    Roundss,
    Roundsd,
    // conversions
    Cvtss2sd,
    Cvtsd2ss,
    Cvtsi2ssL,
    Cvtsi2ssQ,
    Cvtsi2sdL,
    Cvtsi2sdQ,
    Cvttss2siL,
    Cvttss2siQ,
    Cvttsd2siL,
    Cvttsd2siQ,
    Cvtdq2ps,
    Cvttps2dq,
    Cvtdq2pd,
    Cvttpd2dq,
    Cvtps2pd,
    Cvtpd2ps,
}

impl Mnemonic {
    /// Encoding of the regular two-operand form.
    ///
    /// Irregular mnemonics are emitted by dedicated assembler methods;
    /// asking for their table entry is a programming error.
    pub(crate) fn enc(self) -> Enc {
        use Esc::{E0F, E0F38, E0F3A};
        use Prefix::{P66, PF2, PF3};
        use Prefix::None as NP;
        use Esc::None as NE;
        match self {
            Self::MovB => byte_op(store(e(NP, false, NE, 0x8A), 0x88)),
            Self::MovW => store(e(P66, false, NE, 0x8B), 0x89),
            Self::MovL => store(e(NP, false, NE, 0x8B), 0x89),
            Self::MovQ => store(e(NP, true, NE, 0x8B), 0x89),
            Self::XchgQ => store(e(NP, true, NE, 0x87), 0x87),
            Self::Lea => e(NP, true, NE, 0x8D),
            Self::AddL => e(NP, false, NE, 0x03),
            Self::AddQ => e(NP, true, NE, 0x03),
            Self::SubL => e(NP, false, NE, 0x2B),
            Self::SubQ => e(NP, true, NE, 0x2B),
            Self::AndL => e(NP, false, NE, 0x23),
            Self::AndQ => e(NP, true, NE, 0x23),
            Self::OrL => e(NP, false, NE, 0x0B),
            Self::OrQ => e(NP, true, NE, 0x0B),
            Self::XorL => e(NP, false, NE, 0x33),
            Self::XorQ => e(NP, true, NE, 0x33),
            Self::CmpL => e(NP, false, NE, 0x3B),
            Self::CmpQ => e(NP, true, NE, 0x3B),
            Self::TestL => mr(e(NP, false, NE, 0x85)),
            Self::TestQ => mr(e(NP, true, NE, 0x85)),
            Self::ImulL => e(NP, false, E0F, 0xAF),
            Self::ImulQ => e(NP, true, E0F, 0xAF),
            Self::LzcntL => e(PF3, false, E0F, 0xBD),
            Self::LzcntQ => e(PF3, true, E0F, 0xBD),
            Self::TzcntL => e(PF3, false, E0F, 0xBC),
            Self::TzcntQ => e(PF3, true, E0F, 0xBC),
            Self::PopcntL => e(PF3, false, E0F, 0xB8),
            Self::PopcntQ => e(PF3, true, E0F, 0xB8),
            // 8-bit source operands need a REX byte to reach SIL/DIL.
            Self::MovzxBL => byte_op(e(NP, false, E0F, 0xB6)),
            Self::MovzxWL => e(NP, false, E0F, 0xB7),
            Self::MovsxBL => byte_op(e(NP, false, E0F, 0xBE)),
            Self::MovsxWL => e(NP, false, E0F, 0xBF),
            Self::MovsxBQ => byte_op(e(NP, true, E0F, 0xBE)),
            Self::MovsxWQ => e(NP, true, E0F, 0xBF),
            Self::MovsxLQ => e(NP, true, NE, 0x63),
            Self::Movdqa => store(e(P66, false, E0F, 0x6F), 0x7F),
            Self::Movdqu => store(e(PF3, false, E0F, 0x6F), 0x7F),
            Self::Movaps => store(e(NP, false, E0F, 0x28), 0x29),
            Self::Movss => store(e(PF3, false, E0F, 0x10), 0x11),
            Self::Movsd => store(e(PF2, false, E0F, 0x10), 0x11),
            Self::Movlhps => e(NP, false, E0F, 0x16),
            Self::Paddb => e(P66, false, E0F, 0xFC),
            Self::Paddw => e(P66, false, E0F, 0xFD),
            Self::Paddd => e(P66, false, E0F, 0xFE),
            Self::Paddq => e(P66, false, E0F, 0xD4),
            Self::Psubb => e(P66, false, E0F, 0xF8),
            Self::Psubw => e(P66, false, E0F, 0xF9),
            Self::Psubd => e(P66, false, E0F, 0xFA),
            Self::Psubq => e(P66, false, E0F, 0xFB),
            Self::Paddsb => e(P66, false, E0F, 0xEC),
            Self::Paddsw => e(P66, false, E0F, 0xED),
            Self::Paddusb => e(P66, false, E0F, 0xDC),
            Self::Paddusw => e(P66, false, E0F, 0xDD),
            Self::Psubsb => e(P66, false, E0F, 0xE8),
            Self::Psubsw => e(P66, false, E0F, 0xE9),
            Self::Psubusb => e(P66, false, E0F, 0xD8),
            Self::Psubusw => e(P66, false, E0F, 0xD9),
            Self::Pmullw => e(P66, false, E0F, 0xD5),
            Self::Pmuludq => e(P66, false, E0F, 0xF4),
            Self::Pmuldq => e(P66, false, E0F38, 0x28),
            Self::Pmulld => e(P66, false, E0F38, 0x40),
            Self::Pmaddwd => e(P66, false, E0F, 0xF5),
            Self::Pmaddubsw => e(P66, false, E0F38, 0x04),
            Self::Pmulhrsw => e(P66, false, E0F38, 0x0B),
            Self::Pavgb => e(P66, false, E0F, 0xE0),
            Self::Pavgw => e(P66, false, E0F, 0xE3),
            Self::Pand => e(P66, false, E0F, 0xDB),
            Self::Pandn => e(P66, false, E0F, 0xDF),
            Self::Por => e(P66, false, E0F, 0xEB),
            Self::Pxor => e(P66, false, E0F, 0xEF),
            Self::Pcmpeqb => e(P66, false, E0F, 0x74),
            Self::Pcmpeqw => e(P66, false, E0F, 0x75),
            Self::Pcmpeqd => e(P66, false, E0F, 0x76),
            Self::Pcmpeqq => e(P66, false, E0F38, 0x29),
            Self::Pcmpgtb => e(P66, false, E0F, 0x64),
            Self::Pcmpgtw => e(P66, false, E0F, 0x65),
            Self::Pcmpgtd => e(P66, false, E0F, 0x66),
            Self::Pcmpgtq => e(P66, false, E0F38, 0x37),
            Self::Pminsb => e(P66, false, E0F38, 0x38),
            Self::Pminub => e(P66, false, E0F, 0xDA),
            Self::Pminsw => e(P66, false, E0F, 0xEA),
            Self::Pminuw => e(P66, false, E0F38, 0x3A),
            Self::Pminsd => e(P66, false, E0F38, 0x39),
            Self::Pminud => e(P66, false, E0F38, 0x3B),
            Self::Pmaxsb => e(P66, false, E0F38, 0x3C),
            Self::Pmaxub => e(P66, false, E0F, 0xDE),
            Self::Pmaxsw => e(P66, false, E0F, 0xEE),
            Self::Pmaxuw => e(P66, false, E0F38, 0x3E),
            Self::Pmaxsd => e(P66, false, E0F38, 0x3D),
            Self::Pmaxud => e(P66, false, E0F38, 0x3F),
            Self::Pabsb => e(P66, false, E0F38, 0x1C),
            Self::Pabsw => e(P66, false, E0F38, 0x1D),
            Self::Pabsd => e(P66, false, E0F38, 0x1E),
            Self::Packsswb => e(P66, false, E0F, 0x63),
            Self::Packssdw => e(P66, false, E0F, 0x6B),
            Self::Packuswb => e(P66, false, E0F, 0x67),
            Self::Packusdw => e(P66, false, E0F38, 0x2B),
            Self::Punpcklbw => e(P66, false, E0F, 0x60),
            Self::Punpckhbw => e(P66, false, E0F, 0x68),
            Self::Unpcklps => e(NP, false, E0F, 0x14),
            Self::Psllw => e(P66, false, E0F, 0xF1),
            Self::Pslld => e(P66, false, E0F, 0xF2),
            Self::Psllq => e(P66, false, E0F, 0xF3),
            Self::Psrlw => e(P66, false, E0F, 0xD1),
            Self::Psrld => e(P66, false, E0F, 0xD2),
            Self::Psrlq => e(P66, false, E0F, 0xD3),
            Self::Psraw => e(P66, false, E0F, 0xE1),
            Self::Psrad => e(P66, false, E0F, 0xE2),
            Self::Pshufb => e(P66, false, E0F38, 0x00),
            Self::Pshufd => imm8(e(P66, false, E0F, 0x70)),
            Self::Shufps => imm8(e(NP, false, E0F, 0xC6)),
            Self::Pinsrb => imm8(e(P66, false, E0F3A, 0x20)),
            Self::Pinsrw => imm8(e(P66, false, E0F, 0xC4)),
            Self::Pinsrd => imm8(e(P66, false, E0F3A, 0x22)),
            Self::Pinsrq => imm8(e(P66, true, E0F3A, 0x22)),
            Self::Pextrb => imm8(mr(e(P66, false, E0F3A, 0x14))),
            // The 0F 3A form, valid for both r32 and m16 destinations.
            Self::Pextrw => imm8(mr(e(P66, false, E0F3A, 0x15))),
            Self::Pextrd => imm8(mr(e(P66, false, E0F3A, 0x16))),
            Self::Pextrq => imm8(mr(e(P66, true, E0F3A, 0x16))),
            Self::Insertps => imm8(e(P66, false, E0F3A, 0x21)),
            Self::Pmovmskb => e(P66, false, E0F, 0xD7),
            Self::Movmskps => e(NP, false, E0F, 0x50),
            Self::Movmskpd => e(P66, false, E0F, 0x50),
            Self::Ptest => e(P66, false, E0F38, 0x17),
            Self::Blendvpd => e(P66, false, E0F38, 0x15),
            Self::Pmovsxbw => e(P66, false, E0F38, 0x20),
            Self::Pmovsxwd => e(P66, false, E0F38, 0x23),
            Self::Pmovsxdq => e(P66, false, E0F38, 0x25),
            Self::Pmovzxbw => e(P66, false, E0F38, 0x30),
            Self::Pmovzxwd => e(P66, false, E0F38, 0x33),
            Self::Pmovzxdq => e(P66, false, E0F38, 0x35),
            Self::Addps => e(NP, false, E0F, 0x58),
            Self::Addpd => e(P66, false, E0F, 0x58),
            Self::Subps => e(NP, false, E0F, 0x5C),
            Self::Subpd => e(P66, false, E0F, 0x5C),
            Self::Mulps => e(NP, false, E0F, 0x59),
            Self::Mulpd => e(P66, false, E0F, 0x59),
            Self::Divps => e(NP, false, E0F, 0x5E),
            Self::Divpd => e(P66, false, E0F, 0x5E),
            Self::Minps => e(NP, false, E0F, 0x5D),
            Self::Minpd => e(P66, false, E0F, 0x5D),
            Self::Maxps => e(NP, false, E0F, 0x5F),
            Self::Maxpd => e(P66, false, E0F, 0x5F),
            Self::Sqrtps => e(NP, false, E0F, 0x51),
            Self::Sqrtpd => e(P66, false, E0F, 0x51),
            Self::Andps => e(NP, false, E0F, 0x54),
            Self::Andpd => e(P66, false, E0F, 0x54),
            Self::Andnps => e(NP, false, E0F, 0x55),
            Self::Andnpd => e(P66, false, E0F, 0x55),
            Self::Orps => e(NP, false, E0F, 0x56),
            Self::Orpd => e(P66, false, E0F, 0x56),
            Self::Xorps => e(NP, false, E0F, 0x57),
            Self::Xorpd => e(P66, false, E0F, 0x57),
            Self::Cmpps => imm8(e(NP, false, E0F, 0xC2)),
            Self::Cmppd => imm8(e(P66, false, E0F, 0xC2)),
            Self::Roundps => imm8(e(P66, false, E0F3A, 0x08)),
            Self::Roundpd => imm8(e(P66, false, E0F3A, 0x09)),
            Self::Roundss => imm8(e(P66, false, E0F3A, 0x0A)),
            Self::Roundsd => imm8(e(P66, false, E0F3A, 0x0B)),
            Self::Addss => e(PF3, false, E0F, 0x58),
            Self::Addsd => e(PF2, false, E0F, 0x58),
            Self::Subss => e(PF3, false, E0F, 0x5C),
            Self::Subsd => e(PF2, false, E0F, 0x5C),
            Self::Mulss => e(PF3, false, E0F, 0x59),
            Self::Mulsd => e(PF2, false, E0F, 0x59),
            Self::Divss => e(PF3, false, E0F, 0x5E),
            Self::Divsd => e(PF2, false, E0F, 0x5E),
            Self::Minss => e(PF3, false, E0F, 0x5D),
            Self::Minsd => e(PF2, false, E0F, 0x5D),
            Self::Maxss => e(PF3, false, E0F, 0x5F),
            Self::Maxsd => e(PF2, false, E0F, 0x5F),
            Self::Sqrtss => e(PF3, false, E0F, 0x51),
            Self::Sqrtsd => e(PF2, false, E0F, 0x51),
            Self::Ucomiss => e(NP, false, E0F, 0x2E),
            Self::Ucomisd => e(P66, false, E0F, 0x2E),
            Self::Cmpss => imm8(e(PF3, false, E0F, 0xC2)),
            Self::Cmpsd => imm8(e(PF2, false, E0F, 0xC2)),
            Self::Cvtss2sd => e(PF3, false, E0F, 0x5A),
            Self::Cvtsd2ss => e(PF2, false, E0F, 0x5A),
            Self::Cvtsi2ssL => e(PF3, false, E0F, 0x2A),
            Self::Cvtsi2ssQ => e(PF3, true, E0F, 0x2A),
            Self::Cvtsi2sdL => e(PF2, false, E0F, 0x2A),
            Self::Cvtsi2sdQ => e(PF2, true, E0F, 0x2A),
            Self::Cvttss2siL => e(PF3, false, E0F, 0x2C),
            Self::Cvttss2siQ => e(PF3, true, E0F, 0x2C),
            Self::Cvttsd2siL => e(PF2, false, E0F, 0x2C),
            Self::Cvttsd2siQ => e(PF2, true, E0F, 0x2C),
            Self::Cvtdq2ps => e(NP, false, E0F, 0x5B),
            Self::Cvttps2dq => e(PF3, false, E0F, 0x5B),
            Self::Cvtdq2pd => e(PF3, false, E0F, 0xE6),
            Self::Cvttpd2dq => e(P66, false, E0F, 0xE6),
            Self::Cvtps2pd => e(NP, false, E0F, 0x5A),
            Self::Cvtpd2ps => e(P66, false, E0F, 0x5A),
            Self::DivL | Self::DivQ | Self::IdivL | Self::IdivQ => {
                unreachable!("{self:?} is encoded by emit_unary")
            }
            Self::ShlL | Self::ShlQ | Self::ShrL | Self::ShrQ | Self::SarL | Self::SarQ
            | Self::RolL | Self::RolQ | Self::RorL | Self::RorQ => {
                unreachable!("{self:?} is encoded by emit_shift_cl / emit_const_to_reg")
            }
            Self::Psrldq => unreachable!("Psrldq has only an imm8 form"),
            Self::Setcc | Self::CmovL | Self::CmovQ | Self::Jcc | Self::Jmp | Self::JmpReg
            | Self::Ret | Self::Cdq | Self::Cqo => {
                unreachable!("{self:?} is encoded by a dedicated emitter")
            }
        }
    }

    /// `/digit` of the imm32 group-1 ALU form (opcode 0x81).
    pub(crate) fn group1_digit(self) -> Option<(u8, bool)> {
        match self {
            Self::AddL => Some((0, false)),
            Self::AddQ => Some((0, true)),
            Self::OrL => Some((1, false)),
            Self::OrQ => Some((1, true)),
            Self::AndL => Some((4, false)),
            Self::AndQ => Some((4, true)),
            Self::SubL => Some((5, false)),
            Self::SubQ => Some((5, true)),
            Self::XorL => Some((6, false)),
            Self::XorQ => Some((6, true)),
            Self::CmpL => Some((7, false)),
            Self::CmpQ => Some((7, true)),
            _ => None,
        }
    }

    /// `/digit` of the shift group (0xD3 by CL, 0xC1 by imm8).
    pub(crate) fn shift_digit(self) -> Option<(u8, bool)> {
        match self {
            Self::RolL => Some((0, false)),
            Self::RolQ => Some((0, true)),
            Self::RorL => Some((1, false)),
            Self::RorQ => Some((1, true)),
            Self::ShlL => Some((4, false)),
            Self::ShlQ => Some((4, true)),
            Self::ShrL => Some((5, false)),
            Self::ShrQ => Some((5, true)),
            Self::SarL => Some((7, false)),
            Self::SarQ => Some((7, true)),
            _ => None,
        }
    }

    /// `/digit` of the unary group (0xF7).
    pub(crate) fn unary_digit(self) -> Option<(u8, bool)> {
        match self {
            Self::DivL => Some((6, false)),
            Self::DivQ => Some((6, true)),
            Self::IdivL => Some((7, false)),
            Self::IdivQ => Some((7, true)),
            _ => None,
        }
    }

    /// (opcode, /digit) of the packed-shift-by-imm8 form (66 0F 71/72/73).
    pub(crate) fn vec_shift_imm(self) -> Option<(u8, u8)> {
        match self {
            Self::Psrlw => Some((0x71, 2)),
            Self::Psraw => Some((0x71, 4)),
            Self::Psllw => Some((0x71, 6)),
            Self::Psrld => Some((0x72, 2)),
            Self::Psrad => Some((0x72, 4)),
            Self::Pslld => Some((0x72, 6)),
            Self::Psrlq => Some((0x73, 2)),
            Self::Psrldq => Some((0x73, 3)),
            Self::Psllq => Some((0x73, 6)),
            _ => None,
        }
    }
}
