//! Opcode table of the classic BPF instruction set plus the check extensions.

use core::fmt;

/// The byte can't be mapped to any known [`Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidOpcode(pub u8);

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opcode 0x{:02x}", self.0)
    }
}

impl std::error::Error for InvalidOpcode {}

/// Instruction category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Category {
    /// Loads into `A` or `X`.
    Load,
    /// Stores from `A` or `X` into a scratch slot.
    Store,
    /// Arithmetic and logic on `A`.
    Alu,
    /// Control transfer.
    Jump,
    /// Terminates execution with a verdict.
    Ret,
    /// Register-to-register moves.
    Misc,
    /// Dispatched to a registered handler.
    Extension,
}

/// How the `dst`/`src`/`immediate` fields of an instruction are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperandFormat {
    /// Immediate only.
    Immediate,
    /// Absolute byte offset into the packet.
    MemoryAbs,
    /// Packet offset `X + immediate`.
    MemoryInd,
    /// Scratch slot index in the immediate.
    MemoryReg,
    /// No operands.
    RegOnly,
    /// Immediate is a signed relative offset in instructions.
    JumpUncond,
    /// Immediate is the compared value; `dst`/`src` carry the true/false
    /// branch offsets.
    JumpCond,
    /// Opcode-specific.
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
/// Opcode representation of the classic BPF VM.
///
/// The discriminants are wire format: they match the opcode bytes emitted by
/// libpcap for every instruction both toolchains know, and they must never be
/// renumbered.
pub enum Opcode {
    /// `A = immediate`.
    LdImm = 0x00,
    /// `A = u32(packet[k..k+4])`.
    LdAbsW = 0x20,
    /// `A = u16(packet[k..k+2])`.
    LdAbsH = 0x28,
    /// `A = packet[k]`.
    LdAbsB = 0x30,
    /// `A = u32(packet[X+k..X+k+4])`.
    LdIndW = 0x40,
    /// `A = u16(packet[X+k..X+k+2])`.
    LdIndH = 0x48,
    /// `A = packet[X+k]`.
    LdIndB = 0x50,
    /// `A = M[k]`.
    LdMem = 0x60,
    /// `A = packet length`.
    LdLen = 0x80,
    /// `A = (packet[k] & 0x0f) << 2`, the IPv4 IHL-to-bytes idiom.
    LdMsh = 0xA0,
    /// `X = immediate`.
    LdxImm = 0x01,
    /// `X = M[k]`.
    LdxMem = 0x61,
    /// `X = packet length`.
    LdxLen = 0x81,
    /// `X = (packet[k] & 0x0f) << 2`.
    LdxMsh = 0xA1,

    /// `M[k] = A`.
    St = 0x02,
    /// `M[k] = X`.
    Stx = 0x03,

    /// `A = A + k`.
    AddK = 0x04,
    /// `A = A - k`.
    SubK = 0x14,
    /// `A = A * k`.
    MulK = 0x24,
    /// `A = A / k`; division by zero yields `0`.
    DivK = 0x34,
    /// `A = A | k`.
    OrK = 0x44,
    /// `A = A & k`.
    AndK = 0x54,
    /// `A = A << k`, shift count taken modulo 32.
    LshK = 0x64,
    /// `A = A >> k`, logical, shift count taken modulo 32.
    RshK = 0x74,
    /// `A = -A`, two's complement within 32 bits.
    Neg = 0x84,
    /// `A = A % k`; modulo by zero yields `0`.
    ModK = 0x94,
    /// `A = A ^ k`.
    XorK = 0xA4,
    /// `A = A + X`.
    AddX = 0x0C,
    /// `A = A - X`.
    SubX = 0x1C,
    /// `A = A * X`.
    MulX = 0x2C,
    /// `A = A / X`; division by zero yields `0`.
    DivX = 0x3C,
    /// `A = A | X`.
    OrX = 0x4C,
    /// `A = A & X`.
    AndX = 0x5C,
    /// `A = A << X`.
    LshX = 0x6C,
    /// `A = A >> X`, logical.
    RshX = 0x7C,
    /// `A = A % X`; modulo by zero yields `0`.
    ModX = 0x9C,
    /// `A = A ^ X`.
    XorX = 0xAC,

    /// Unconditional relative jump.
    Ja = 0x05,
    /// Branch if `A == k`.
    JeqK = 0x15,
    /// Branch if `A > k`, unsigned.
    JgtK = 0x25,
    /// Branch if `A >= k`, unsigned.
    JgeK = 0x35,
    /// Branch if `A & k != 0`.
    JsetK = 0x45,
    /// Branch if `A == X`.
    JeqX = 0x1D,
    /// Branch if `A > X`, unsigned.
    JgtX = 0x2D,
    /// Branch if `A >= X`, unsigned.
    JgeX = 0x3D,
    /// Branch if `A & X != 0`.
    JsetX = 0x4D,

    /// Terminate with verdict `k`.
    RetK = 0x06,
    /// Terminate with verdict `A`.
    RetA = 0x16,

    /// `X = A`.
    Tax = 0x07,
    /// `A = X`.
    Txa = 0x87,

    /// Verify the CRC-32 of a packet region against its trailing checksum.
    ChkCrc = 0xE0,
    /// Verify the layer-3 (IPv4 header) checksum.
    ChkL3Csum = 0xE1,
    /// Verify the layer-4 (TCP/UDP) checksum over the pseudo-header.
    ChkL4Csum = 0xE2,
    /// Flag the error register if the packet was truncated on capture.
    ChkTrunc = 0xE3,
    /// Assert a minimum frame length.
    ChkFrameLen = 0xE4,
    /// Assert the decoded offset of a protocol layer.
    ChkProtoLoc = 0xE5,
}

impl Opcode {
    /// Category this opcode belongs to.
    pub const fn category(&self) -> Category {
        use Opcode::*;
        match self {
            LdImm | LdAbsW | LdAbsH | LdAbsB | LdIndW | LdIndH | LdIndB | LdMem
            | LdLen | LdMsh | LdxImm | LdxMem | LdxLen | LdxMsh => Category::Load,
            St | Stx => Category::Store,
            AddK | SubK | MulK | DivK | OrK | AndK | LshK | RshK | Neg | ModK | XorK
            | AddX | SubX | MulX | DivX | OrX | AndX | LshX | RshX | ModX | XorX => {
                Category::Alu
            }
            Ja | JeqK | JgtK | JgeK | JsetK | JeqX | JgtX | JgeX | JsetX => {
                Category::Jump
            }
            RetK | RetA => Category::Ret,
            Tax | Txa => Category::Misc,
            ChkCrc | ChkL3Csum | ChkL4Csum | ChkTrunc | ChkFrameLen | ChkProtoLoc => {
                Category::Extension
            }
        }
    }

    /// Operand format of this opcode.
    pub const fn format(&self) -> OperandFormat {
        use Opcode::*;
        match self {
            LdImm | LdxImm | AddK | SubK | MulK | DivK | OrK | AndK | LshK | RshK
            | ModK | XorK | RetK => OperandFormat::Immediate,
            LdAbsW | LdAbsH | LdAbsB | LdMsh | LdxMsh => OperandFormat::MemoryAbs,
            LdIndW | LdIndH | LdIndB => OperandFormat::MemoryInd,
            LdMem | LdxMem | St | Stx => OperandFormat::MemoryReg,
            LdLen | LdxLen | Neg | AddX | SubX | MulX | DivX | OrX | AndX | LshX
            | RshX | ModX | XorX | RetA | Tax | Txa => OperandFormat::RegOnly,
            Ja => OperandFormat::JumpUncond,
            JeqK | JgtK | JgeK | JsetK | JeqX | JgtX | JgeX | JsetX => {
                OperandFormat::JumpCond
            }
            ChkCrc | ChkL3Csum | ChkL4Csum | ChkTrunc | ChkFrameLen | ChkProtoLoc => {
                OperandFormat::Extended
            }
        }
    }

    /// Mnemonic used by the `-d` textual form.
    pub const fn mnemonic(&self) -> &'static str {
        use Opcode::*;
        match self {
            LdImm | LdAbsW | LdIndW | LdMem | LdLen => "ld",
            LdAbsH | LdIndH => "ldh",
            LdAbsB | LdIndB | LdMsh => "ldb",
            LdxImm | LdxMem | LdxLen => "ldx",
            LdxMsh => "ldxb",
            St => "st",
            Stx => "stx",
            AddK | AddX => "add",
            SubK | SubX => "sub",
            MulK | MulX => "mul",
            DivK | DivX => "div",
            ModK | ModX => "mod",
            OrK | OrX => "or",
            AndK | AndX => "and",
            XorK | XorX => "xor",
            LshK | LshX => "lsh",
            RshK | RshX => "rsh",
            Neg => "neg",
            Ja => "ja",
            JeqK | JeqX => "jeq",
            JgtK | JgtX => "jgt",
            JgeK | JgeX => "jge",
            JsetK | JsetX => "jset",
            RetK | RetA => "ret",
            Tax => "tax",
            Txa => "txa",
            ChkCrc => "chk_crc",
            ChkL3Csum => "chk_l3_csum",
            ChkL4Csum => "chk_l4_csum",
            ChkTrunc => "chk_trunc",
            ChkFrameLen => "chk_frame_len",
            ChkProtoLoc => "chk_proto_loc",
        }
    }

    /// `true` for opcodes resolved through the extension handler table.
    pub const fn is_extension(&self) -> bool {
        matches!(self.category(), Category::Extension)
    }

    /// `true` for conditional jumps whose second operand is `X`.
    pub const fn compares_index_register(&self) -> bool {
        use Opcode::*;
        matches!(self, JeqX | JgtX | JgeX | JsetX)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        match b {
            0x00 => Ok(LdImm),
            0x20 => Ok(LdAbsW),
            0x28 => Ok(LdAbsH),
            0x30 => Ok(LdAbsB),
            0x40 => Ok(LdIndW),
            0x48 => Ok(LdIndH),
            0x50 => Ok(LdIndB),
            0x60 => Ok(LdMem),
            0x80 => Ok(LdLen),
            0xA0 => Ok(LdMsh),
            0x01 => Ok(LdxImm),
            0x61 => Ok(LdxMem),
            0x81 => Ok(LdxLen),
            0xA1 => Ok(LdxMsh),
            0x02 => Ok(St),
            0x03 => Ok(Stx),
            0x04 => Ok(AddK),
            0x14 => Ok(SubK),
            0x24 => Ok(MulK),
            0x34 => Ok(DivK),
            0x44 => Ok(OrK),
            0x54 => Ok(AndK),
            0x64 => Ok(LshK),
            0x74 => Ok(RshK),
            0x84 => Ok(Neg),
            0x94 => Ok(ModK),
            0xA4 => Ok(XorK),
            0x0C => Ok(AddX),
            0x1C => Ok(SubX),
            0x2C => Ok(MulX),
            0x3C => Ok(DivX),
            0x4C => Ok(OrX),
            0x5C => Ok(AndX),
            0x6C => Ok(LshX),
            0x7C => Ok(RshX),
            0x9C => Ok(ModX),
            0xAC => Ok(XorX),
            0x05 => Ok(Ja),
            0x15 => Ok(JeqK),
            0x25 => Ok(JgtK),
            0x35 => Ok(JgeK),
            0x45 => Ok(JsetK),
            0x1D => Ok(JeqX),
            0x2D => Ok(JgtX),
            0x3D => Ok(JgeX),
            0x4D => Ok(JsetX),
            0x06 => Ok(RetK),
            0x16 => Ok(RetA),
            0x07 => Ok(Tax),
            0x87 => Ok(Txa),
            0xE0 => Ok(ChkCrc),
            0xE1 => Ok(ChkL3Csum),
            0xE2 => Ok(ChkL4Csum),
            0xE3 => Ok(ChkTrunc),
            0xE4 => Ok(ChkFrameLen),
            0xE5 => Ok(ChkProtoLoc),
            _ => Err(InvalidOpcode(b)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
