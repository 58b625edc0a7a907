//! RISC-V assembly instruction definitions
//!
//! The subset of RV64GC the emitter targets, as a typed instruction list
//! with textual rendering. Float/int register classes are distinguished by
//! name; mixed-class moves render as the `fmv.w.x`/`fmv.x.w` transfers.

use std::fmt;

/// A physical register, identified by its assembler name.
///
/// Integer registers: `zero ra sp s0-s11 t0-t6 a0-a7`; float registers:
/// `fs0-fs11 ft0-ft11 fa0-fa7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(&'static str);

const INT_ARGS: [&str; 8] = ["a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7"];
const FLOAT_ARGS: [&str; 8] = ["fa0", "fa1", "fa2", "fa3", "fa4", "fa5", "fa6", "fa7"];
const SAVED: [&str; 12] = [
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
];
const TEMPS: [&str; 7] = ["t0", "t1", "t2", "t3", "t4", "t5", "t6"];
const FLOAT_SAVED: [&str; 12] = [
    "fs0", "fs1", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9", "fs10", "fs11",
];
const FLOAT_TEMPS: [&str; 12] = [
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "ft8", "ft9", "ft10", "ft11",
];

impl Reg {
    pub const ZERO: Reg = Reg("zero");
    pub const RA: Reg = Reg("ra");
    pub const SP: Reg = Reg("sp");
    pub const S0: Reg = Reg("s0");
    pub const T0: Reg = Reg("t0");
    pub const T1: Reg = Reg("t1");
    pub const T2: Reg = Reg("t2");
    pub const FT0: Reg = Reg("ft0");
    pub const FT1: Reg = Reg("ft1");
    pub const A0: Reg = Reg("a0");
    pub const FA0: Reg = Reg("fa0");

    pub fn int_arg(i: usize) -> Reg {
        Reg(INT_ARGS[i])
    }

    pub fn float_arg(i: usize) -> Reg {
        Reg(FLOAT_ARGS[i])
    }

    pub fn saved(i: usize) -> Reg {
        Reg(SAVED[i])
    }

    pub fn temp(i: usize) -> Reg {
        Reg(TEMPS[i])
    }

    pub fn float_saved(i: usize) -> Reg {
        Reg(FLOAT_SAVED[i])
    }

    pub fn float_temp(i: usize) -> Reg {
        Reg(FLOAT_TEMPS[i])
    }

    pub fn name(&self) -> &'static str {
        self.0
    }

    pub fn is_float(&self) -> bool {
        self.0.starts_with('f')
    }

    /// Whether this is an argument-passing register (`a*` or `fa*`)
    pub fn is_arg(&self) -> bool {
        INT_ARGS.contains(&self.0) || FLOAT_ARGS.contains(&self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A RISC-V instruction as the emitter produces it
#[derive(Debug, Clone, PartialEq)]
pub enum AsmInst {
    /// li rd, imm
    Li(Reg, i64),
    /// la rd, symbol
    La(Reg, String),
    /// lui rd, %hi(sym)
    LuiHi(Reg, String),
    /// addi rd, rs, %lo(sym)
    AddiLo(Reg, Reg, String),
    /// mv / fmv.s / fmv.w.x / fmv.x.w by register classes
    Mv(Reg, Reg),
    /// ld/fld rd, off(base)
    Ld(Reg, i64, Reg),
    /// sd/fsd rs, off(base)
    Sd(Reg, i64, Reg),
    /// lw/flw rd, off(base)
    Lw(Reg, i64, Reg),
    /// sw/fsw rs, off(base)
    Sw(Reg, i64, Reg),
    /// three-register ALU op (addw, subw, mulw, divw, rem, fadd.s, ...)
    Binary(&'static str, Reg, Reg, Reg),
    /// register-immediate ALU op (addi, andi, xori, slli, srai)
    BinaryImm(&'static str, Reg, Reg, i64),
    Seqz(Reg, Reg),
    Snez(Reg, Reg),
    /// feq.s rd, fs1, fs2
    Feq(Reg, Reg, Reg),
    /// flt.s rd, fs1, fs2
    Flt(Reg, Reg, Reg),
    /// fcvt.s.w fd, rs
    FcvtSW(Reg, Reg),
    /// fcvt.w.s rd, fs, rtz
    FcvtWS(Reg, Reg),
    Beqz(Reg, String),
    J(String),
    Call(String),
    Ret,
}

impl fmt::Display for AsmInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmInst::Li(rd, imm) => write!(f, "  li {}, {}", rd, imm),
            AsmInst::La(rd, sym) => write!(f, "  la {}, {}", rd, sym),
            AsmInst::LuiHi(rd, sym) => write!(f, "  lui {}, %hi({})", rd, sym),
            AsmInst::AddiLo(rd, rs, sym) => write!(f, "  addi {}, {}, %lo({})", rd, rs, sym),
            AsmInst::Mv(rd, rs) => {
                let op = match (rd.is_float(), rs.is_float()) {
                    (true, true) => "fmv.s",
                    (true, false) => "fmv.w.x",
                    (false, true) => "fmv.x.w",
                    (false, false) => "mv",
                };
                write!(f, "  {} {}, {}", op, rd, rs)
            }
            AsmInst::Ld(rd, off, base) => {
                let op = if rd.is_float() { "fld" } else { "ld" };
                write!(f, "  {} {}, {}({})", op, rd, off, base)
            }
            AsmInst::Sd(rs, off, base) => {
                let op = if rs.is_float() { "fsd" } else { "sd" };
                write!(f, "  {} {}, {}({})", op, rs, off, base)
            }
            AsmInst::Lw(rd, off, base) => {
                let op = if rd.is_float() { "flw" } else { "lw" };
                write!(f, "  {} {}, {}({})", op, rd, off, base)
            }
            AsmInst::Sw(rs, off, base) => {
                let op = if rs.is_float() { "fsw" } else { "sw" };
                write!(f, "  {} {}, {}({})", op, rs, off, base)
            }
            AsmInst::Binary(op, rd, rs1, rs2) => {
                write!(f, "  {} {}, {}, {}", op, rd, rs1, rs2)
            }
            AsmInst::BinaryImm(op, rd, rs1, imm) => {
                // addi only takes a 12-bit immediate; large frame offsets go
                // through s0
                if *op == "addi" && !(-2048..=2047).contains(imm) {
                    writeln!(f, "  li s0, {}", imm)?;
                    write!(f, "  add {}, {}, s0", rd, rs1)
                } else {
                    write!(f, "  {} {}, {}, {}", op, rd, rs1, imm)
                }
            }
            AsmInst::Seqz(rd, rs) => write!(f, "  seqz {}, {}", rd, rs),
            AsmInst::Snez(rd, rs) => write!(f, "  snez {}, {}", rd, rs),
            AsmInst::Feq(rd, rs1, rs2) => write!(f, "  feq.s {}, {}, {}", rd, rs1, rs2),
            AsmInst::Flt(rd, rs1, rs2) => write!(f, "  flt.s {}, {}, {}", rd, rs1, rs2),
            AsmInst::FcvtSW(rd, rs) => write!(f, "  fcvt.s.w {}, {}", rd, rs),
            AsmInst::FcvtWS(rd, rs) => write!(f, "  fcvt.w.s {}, {}, rtz", rd, rs),
            AsmInst::Beqz(rs, label) => write!(f, "  beqz {}, {}", rs, label),
            AsmInst::J(label) => write!(f, "  j {}", label),
            AsmInst::Call(name) => write!(f, "  call {}", name),
            AsmInst::Ret => write!(f, "  ret"),
        }
    }
}

/// A labeled run of instructions
#[derive(Debug, Clone, PartialEq)]
pub struct AsmBlock {
    pub label: String,
    pub instrs: Vec<AsmInst>,
}

impl AsmBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instrs: Vec::new(),
        }
    }

    pub fn push(&mut self, inst: AsmInst) {
        self.instrs.push(inst);
    }
}

/// One emitted function: label, frame size, blocks
#[derive(Debug, Clone, PartialEq)]
pub struct AsmFunction {
    pub name: String,
    pub stack_size: i64,
    pub blocks: Vec<AsmBlock>,
}

impl AsmFunction {
    pub fn new(name: impl Into<String>, stack_size: i64) -> Self {
        Self {
            name: name.into(),
            stack_size,
            blocks: Vec::new(),
        }
    }

    pub fn block_mut(&mut self, label: &str) -> Option<&mut AsmBlock> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    /// Render the label, prologue, and every block
    pub fn render(&self, out: &mut String) {
        out.push_str(&self.name);
        out.push_str(":\n");
        if self.stack_size < 2048 {
            out.push_str(&format!("  addi sp, sp, {}\n", -self.stack_size));
        } else {
            out.push_str(&format!("  li s0, {}\n", -self.stack_size));
            out.push_str("  add sp, sp, s0\n");
        }
        for block in &self.blocks {
            out.push_str(&block.label);
            out.push_str(":\n");
            for inst in &block.instrs {
                out.push_str(&format!("{}\n", inst));
            }
        }
    }
}
