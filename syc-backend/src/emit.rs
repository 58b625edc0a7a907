//! IR to RISC-V lowering
//!
//! Walks the optimized module function by function, block by block,
//! instruction by instruction, turning each opcode into assembly using the
//! allocator's placement map and the calling convention. Every operand is
//! materialized into a scratch register first (`t0`/`t1`/`t2` for the
//! integer class, `ft0`/`ft1` for floats, chosen by static type), handling
//! the three location classes uniformly: stack-resident values load through
//! a doubled `sp` offset, register-resident values move directly, and
//! stack-passed parameters reach the caller's frame through a temporary
//! stack-pointer adjustment.
//!
//! Phi nodes lower in two phases through reserved temporary slots at the
//! top of the frame: the join block loads its slot into the phi
//! destination, and every predecessor stores its incoming value into the
//! slot just before its terminator. Predecessor-to-successor moves must
//! happen before control transfers and distinct predecessors carry distinct
//! values, so going through the slot avoids the lost-copy hazard.

use crate::alloc::{self, Allocation};
use crate::opt as asm_opt;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use syc_codegen::{
    AsmBlock, AsmFunction, AsmInst, CallingConvention, Frame, Location, Reg,
};
use syc_common::CompilerError;
use syc_ir::{
    BinaryOp, BlockId, CastKind, Function, GlobalInit, Instruction, Module, Predicate, Value,
};

/// Complete lowered output: the data section text plus one [`AsmFunction`]
/// per IR function.
pub struct AsmOutput {
    pub data: String,
    pub functions: Vec<AsmFunction>,
}

pub fn emit_module(module: &Module) -> AsmOutput {
    let mut output = AsmOutput {
        data: render_data(module),
        functions: Vec::new(),
    };
    for func in &module.functions {
        output.functions.push(FunctionEmitter::new(func).emit());
    }
    for func in &mut output.functions {
        asm_opt::run(func);
    }
    output
}

impl AsmOutput {
    /// Render the complete assembly text
    pub fn render(&self) -> String {
        let mut out = self.data.clone();
        out.push_str("  .text\n  .globl main\n");
        for func in &self.functions {
            func.render(&mut out);
        }
        out
    }

    /// Write the assembly to `path`, flushing in chunks as the in-memory
    /// buffer passes the size threshold.
    pub fn write_to(&self, path: &Path) -> Result<(), CompilerError> {
        let mut writer = ChunkedWriter::create(path)?;
        writer.push(&self.data)?;
        writer.push("  .text\n  .globl main\n")?;
        for func in &self.functions {
            let mut text = String::new();
            func.render(&mut text);
            writer.push(&text)?;
        }
        writer.finish()
    }
}

const FLUSH_THRESHOLD: usize = 10_000;

struct ChunkedWriter {
    file: std::fs::File,
    buf: String,
    path: String,
}

impl ChunkedWriter {
    fn create(path: &Path) -> Result<Self, CompilerError> {
        let file = std::fs::File::create(path)
            .map_err(|e| CompilerError::io(path.display().to_string(), &e))?;
        Ok(Self {
            file,
            buf: String::new(),
            path: path.display().to_string(),
        })
    }

    fn push(&mut self, text: &str) -> Result<(), CompilerError> {
        self.buf.push_str(text);
        if self.buf.len() > FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CompilerError> {
        self.file
            .write_all(self.buf.as_bytes())
            .map_err(|e| CompilerError::io(self.path.clone(), &e))?;
        self.buf.clear();
        Ok(())
    }

    fn finish(mut self) -> Result<(), CompilerError> {
        self.flush()
    }
}

/// Global scalars and non-zero arrays go to `.data`; all-zero arrays are
/// reserved in `.bss`.
fn render_data(module: &Module) -> String {
    let mut out = String::from("  .data\n");
    let mut bss: Vec<(String, i64)> = Vec::new();
    for global in &module.globals {
        match &global.init {
            GlobalInit::Int(v) => {
                out.push_str(&format!("{}:\n  .dword {}\n\n", global.name, v));
            }
            GlobalInit::Float(v) => {
                out.push_str(&format!(
                    "{}:\n  .dword 0X{:x}\n\n",
                    global.name,
                    v.to_bits()
                ));
            }
            GlobalInit::IntArray(values) => {
                let words: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                out.push_str(&format!("{}:\n  .word {}\n\n", global.name, words.join(", ")));
            }
            GlobalInit::FloatArray(values) => {
                let words: Vec<String> = values
                    .iter()
                    .map(|v| format!("0X{:x}", v.to_bits()))
                    .collect();
                out.push_str(&format!("{}:\n  .word {}\n\n", global.name, words.join(", ")));
            }
            GlobalInit::ZeroArray => {
                bss.push((global.name.clone(), global.ty.flat_len() as i64 * 4));
            }
        }
    }
    if !bss.is_empty() {
        out.push_str("  .bss \n");
        for (name, size) in bss {
            out.push_str(&format!("{}:\n  .space {}\n\n", name, size));
        }
    }
    out
}

/// Where one of this function's parameters arrives
#[derive(Debug, Clone, Copy)]
enum ParamLoc {
    Reg(Reg),
    /// Byte offset into the caller's frame
    CallerStack(i64),
}

struct PhiRecord {
    incomings: Vec<(BlockId, Value)>,
}

struct FunctionEmitter<'a> {
    func: &'a Function,
    alloc: Allocation,
    params: HashMap<String, ParamLoc>,
    /// Own register-class parameters and their save-area byte offsets
    param_saves: Vec<(Reg, i64)>,
    frame: Frame,
    stack_size: i64,
    has_call: bool,
    gep_pointers: HashSet<String>,
    phis: Vec<PhiRecord>,
}

impl<'a> FunctionEmitter<'a> {
    fn new(func: &'a Function) -> Self {
        let allocation = alloc::allocate_function(func);

        let mut params = HashMap::new();
        let mut param_saves = Vec::new();
        let mut int_index = 0usize;
        let mut float_index = 0usize;
        let mut caller_off = 0i64;
        let mut save_off = 0i64;
        for param in &func.params {
            let name = param.name().unwrap_or_default().to_string();
            if param.ty().is_float() {
                if float_index >= CallingConvention::MAX_REG_ARGS {
                    params.insert(name, ParamLoc::CallerStack(caller_off));
                    caller_off += 8;
                } else {
                    let reg = Reg::float_arg(float_index);
                    params.insert(name, ParamLoc::Reg(reg));
                    param_saves.push((reg, save_off));
                    save_off += 8;
                    float_index += 1;
                }
            } else if int_index >= CallingConvention::MAX_REG_ARGS {
                params.insert(name, ParamLoc::CallerStack(caller_off));
                caller_off += 8;
            } else {
                let reg = Reg::int_arg(int_index);
                params.insert(name, ParamLoc::Reg(reg));
                param_saves.push((reg, save_off));
                save_off += 8;
                int_index += 1;
            }
        }

        let phi_count = func
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i, Instruction::Phi { .. }))
            .count() as i64;
        let frame = Frame {
            units: allocation.frame_units,
            reg_param_bytes: save_off,
            phi_count,
        };
        let stack_size = frame.total_size();

        // the parameter save area sits just below the phi temporaries
        let rebase = frame.aligned_size() - save_off;
        for (_, off) in &mut param_saves {
            *off += rebase;
        }

        let has_call = func
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .any(|i| matches!(i, Instruction::Call { .. }));

        // element pointers hold addresses, not values; loads and stores
        // through them need the extra indirection regardless of which block
        // defines them
        let mut gep_pointers = HashSet::new();
        for block in &func.blocks {
            for inst in &block.instructions {
                if let Instruction::Gep { result, .. } = inst {
                    if let Some(name) = result.name() {
                        gep_pointers.insert(name.to_string());
                    }
                }
            }
        }

        Self {
            func,
            alloc: allocation,
            params,
            param_saves,
            frame,
            stack_size,
            has_call,
            gep_pointers,
            phis: Vec::new(),
        }
    }

    /// Block labels are function-local in the IR; prefixing with the
    /// function name keeps them unique across the module's text section.
    fn block_label(&self, id: BlockId) -> String {
        format!(".L{}_{}", self.func.name, self.func.blocks[id].label)
    }

    fn emit(mut self) -> AsmFunction {
        let mut asm = AsmFunction::new(&self.func.name, self.stack_size);
        for (bid, block) in self.func.blocks.iter().enumerate() {
            let mut out: Vec<AsmInst> = Vec::new();
            if bid == self.func.entry() && self.has_call {
                if let Some(slot) = self.alloc.ra_slot {
                    out.push(AsmInst::Sd(Reg::RA, slot * 2, Reg::SP));
                }
            }
            for (idx, inst) in block.instructions.iter().enumerate() {
                self.lower(inst, bid, idx, &mut out);
                if inst.is_terminator() {
                    break;
                }
            }
            asm.blocks.push(AsmBlock {
                label: self.block_label(bid),
                instrs: out,
            });
        }
        self.fixup_phis(&mut asm);
        asm
    }

    fn lower(&mut self, inst: &Instruction, bid: usize, idx: usize, out: &mut Vec<AsmInst>) {
        match inst {
            Instruction::Alloca { result } => self.lower_alloca(result, out),
            Instruction::Load { result, ptr } => self.lower_load(result, ptr, out),
            Instruction::Store { value, ptr } => self.lower_store(value, ptr, out),
            Instruction::Binary {
                op,
                result,
                lhs,
                rhs,
            } => self.lower_binary(*op, result, lhs, rhs, out),
            Instruction::Icmp {
                pred,
                result,
                lhs,
                rhs,
            } => self.lower_icmp(*pred, result, lhs, rhs, out),
            Instruction::Gep {
                result,
                base,
                indices,
            } => self.lower_gep(result, base, indices, out),
            Instruction::Call {
                result,
                callee,
                ret,
                args,
            } => self.lower_call(result.as_ref(), callee, ret, args, bid, idx, out),
            Instruction::Br { target } => {
                out.push(AsmInst::J(self.block_label(*target)));
            }
            Instruction::CondBr {
                cond,
                if_true,
                if_false,
            } => {
                self.load_value(out, cond, Reg::T0, Reg::FT0);
                out.push(AsmInst::Beqz(Reg::T0, self.block_label(*if_false)));
                out.push(AsmInst::J(self.block_label(*if_true)));
            }
            Instruction::Phi { result, incomings } => self.lower_phi(result, incomings, out),
            Instruction::Zext { result, value } => {
                if self.is_unused(result) {
                    return;
                }
                self.load_value(out, value, Reg::T0, Reg::FT0);
                out.push(AsmInst::BinaryImm("andi", Reg::T0, Reg::T0, 1));
                self.store_result(out, result, false);
            }
            Instruction::Cast {
                kind,
                result,
                value,
            } => {
                if self.is_unused(result) {
                    return;
                }
                match kind {
                    CastKind::IntToFloat => {
                        self.load_value(out, value, Reg::T0, Reg::FT0);
                        out.push(AsmInst::FcvtSW(Reg::FT0, Reg::T0));
                        self.store_result(out, result, true);
                    }
                    CastKind::FloatToInt => {
                        self.load_value(out, value, Reg::T0, Reg::FT0);
                        out.push(AsmInst::FcvtWS(Reg::T0, Reg::FT0));
                        self.store_result(out, result, false);
                    }
                }
            }
            Instruction::Ret { value } => self.lower_ret(value.as_ref(), out),
        }
    }

    // ---- operand materialization ----

    /// Materialize `value` into the given scratch pair; returns whether it
    /// landed in the float scratch.
    fn load_value(
        &self,
        out: &mut Vec<AsmInst>,
        value: &Value,
        int_scratch: Reg,
        float_scratch: Reg,
    ) -> bool {
        match value {
            Value::ConstInt(v) => {
                out.push(AsmInst::Li(int_scratch, *v as i64));
                false
            }
            Value::ConstFloat(v) => {
                let sym = float_bits(*v);
                out.push(AsmInst::LuiHi(int_scratch, sym.clone()));
                out.push(AsmInst::AddiLo(int_scratch, int_scratch, sym));
                out.push(AsmInst::Mv(float_scratch, int_scratch));
                true
            }
            Value::Global { name, .. } => {
                out.push(AsmInst::La(int_scratch, name.clone()));
                false
            }
            Value::Reg { name, ty } => {
                let is_float = ty.is_float();
                let scratch = if is_float { float_scratch } else { int_scratch };
                if let Some(loc) = self.params.get(name) {
                    match loc {
                        ParamLoc::Reg(r) => out.push(AsmInst::Mv(scratch, *r)),
                        ParamLoc::CallerStack(off) => {
                            self.caller_frame_load(out, scratch, *off);
                        }
                    }
                } else {
                    match self.alloc.locations.get(name) {
                        Some(Location::Register(r)) => out.push(AsmInst::Mv(scratch, *r)),
                        Some(Location::Stack(off)) => {
                            out.push(AsmInst::Ld(scratch, off * 2, Reg::SP));
                        }
                        // liveness gives every read value an interval, so a
                        // read with no storage is an IR-construction bug
                        _ => unreachable!("read of %{} with no allocated storage", name),
                    }
                }
                is_float
            }
        }
    }

    /// Reach a stack-passed parameter in the caller's frame: hop the stack
    /// pointer over this frame, load, hop back.
    fn caller_frame_load(&self, out: &mut Vec<AsmInst>, scratch: Reg, offset: i64) {
        out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, self.stack_size));
        out.push(AsmInst::Ld(scratch, offset, Reg::SP));
        out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, -self.stack_size));
    }

    fn store_result(&self, out: &mut Vec<AsmInst>, result: &Value, is_float: bool) {
        let scratch = if is_float { Reg::FT0 } else { Reg::T0 };
        match self.alloc.location_of(result) {
            Location::Stack(off) => out.push(AsmInst::Sd(scratch, off * 2, Reg::SP)),
            Location::Register(r) => out.push(AsmInst::Mv(r, scratch)),
            Location::Unused => {}
        }
    }

    fn is_unused(&self, result: &Value) -> bool {
        matches!(self.alloc.location_of(result), Location::Unused)
    }

    // ---- per-opcode lowering ----

    /// Scalar allocas need no code (their frame slot is the storage); array
    /// allocas compute the decayed base pointer and zero the storage.
    fn lower_alloca(&mut self, result: &Value, out: &mut Vec<AsmInst>) {
        let ty = result.ty();
        let Some(elem) = ty.elem() else { return };
        if !elem.is_array() {
            return;
        }
        let Location::Stack(off) = self.alloc.location_of(result) else {
            return;
        };
        let len = elem.flat_len() as i64;
        let base = off * 2 - len * 8;
        out.push(AsmInst::BinaryImm("addi", Reg::T0, Reg::SP, base));
        for i in 0..(len / 2 + 1) {
            out.push(AsmInst::Sd(Reg::ZERO, base + i * 8, Reg::SP));
        }
        out.push(AsmInst::Sd(Reg::T0, off * 2, Reg::SP));
    }

    fn lower_load(&mut self, result: &Value, ptr: &Value, out: &mut Vec<AsmInst>) {
        if self.is_unused(result) {
            return;
        }
        let elem_float = ptr.ty().elem().map(|t| t.is_float()).unwrap_or(false);
        let scratch = if elem_float { Reg::FT0 } else { Reg::T0 };
        match ptr {
            Value::Global { name, .. } => {
                out.push(AsmInst::La(Reg::T0, name.clone()));
                // float globals hold a 32-bit pattern; flw NaN-boxes it
                if elem_float {
                    out.push(AsmInst::Lw(scratch, 0, Reg::T0));
                } else {
                    out.push(AsmInst::Ld(scratch, 0, Reg::T0));
                }
            }
            Value::Reg { name, .. }
                if self.gep_pointers.contains(name) || self.params.contains_key(name) =>
            {
                // the value is an address into an array
                self.load_value(out, ptr, Reg::T0, Reg::FT0);
                out.push(AsmInst::Mv(Reg::T1, Reg::T0));
                out.push(AsmInst::Lw(scratch, 0, Reg::T1));
            }
            _ => {
                // an unpromoted scalar slot: its location is the storage
                match self.alloc.location_of(ptr) {
                    Location::Stack(off) => out.push(AsmInst::Ld(scratch, off * 2, Reg::SP)),
                    Location::Register(r) => out.push(AsmInst::Mv(scratch, r)),
                    Location::Unused => {}
                }
            }
        }
        self.store_result(out, result, elem_float);
    }

    fn lower_store(&mut self, value: &Value, ptr: &Value, out: &mut Vec<AsmInst>) {
        let value_float = self.load_value(out, value, Reg::T0, Reg::FT0);
        let elem_float = ptr.ty().elem().map(|t| t.is_float()).unwrap_or(false);
        match ptr {
            Value::Global { name, .. } => {
                out.push(AsmInst::La(Reg::T1, name.clone()));
                if value_float && elem_float {
                    out.push(AsmInst::Sw(Reg::FT0, 0, Reg::T1));
                } else if value_float {
                    out.push(AsmInst::FcvtWS(Reg::T0, Reg::FT0));
                    out.push(AsmInst::Sd(Reg::T0, 0, Reg::T1));
                } else {
                    out.push(AsmInst::Sd(Reg::T0, 0, Reg::T1));
                }
            }
            Value::Reg { name, .. }
                if self.gep_pointers.contains(name) || self.params.contains_key(name) =>
            {
                // address in t1, word store through it
                if self.params.contains_key(name) {
                    let mut addr = Vec::new();
                    self.load_value(&mut addr, ptr, Reg::T1, Reg::FT1);
                    out.extend(addr);
                } else {
                    match self.alloc.location_of(ptr) {
                        Location::Stack(off) => {
                            out.push(AsmInst::Ld(Reg::T1, off * 2, Reg::SP));
                        }
                        Location::Register(r) => out.push(AsmInst::Mv(Reg::T1, r)),
                        Location::Unused => return,
                    }
                }
                if value_float && elem_float {
                    out.push(AsmInst::Sw(Reg::FT0, 0, Reg::T1));
                } else if value_float {
                    out.push(AsmInst::FcvtWS(Reg::T0, Reg::FT0));
                    out.push(AsmInst::Sw(Reg::T0, 0, Reg::T1));
                } else {
                    out.push(AsmInst::Sw(Reg::T0, 0, Reg::T1));
                }
            }
            _ => {
                // unpromoted scalar slot
                let src = if value_float && elem_float {
                    Reg::FT0
                } else if value_float {
                    out.push(AsmInst::FcvtWS(Reg::T0, Reg::FT0));
                    Reg::T0
                } else {
                    Reg::T0
                };
                match self.alloc.location_of(ptr) {
                    Location::Stack(off) => out.push(AsmInst::Sd(src, off * 2, Reg::SP)),
                    Location::Register(r) => out.push(AsmInst::Mv(r, src)),
                    Location::Unused => {}
                }
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        result: &Value,
        lhs: &Value,
        rhs: &Value,
        out: &mut Vec<AsmInst>,
    ) {
        if self.is_unused(result) {
            return;
        }
        self.load_value(out, lhs, Reg::T0, Reg::FT0);
        self.load_value(out, rhs, Reg::T1, Reg::FT1);
        let is_float = op.is_float();
        let mnemonic = match op {
            BinaryOp::Add => "addw",
            BinaryOp::Sub => "subw",
            BinaryOp::Mul => "mulw",
            BinaryOp::SDiv => "divw",
            BinaryOp::SRem => "rem",
            BinaryOp::Xor => "xor",
            BinaryOp::FAdd => "fadd.s",
            BinaryOp::FSub => "fsub.s",
            BinaryOp::FMul => "fmul.s",
            BinaryOp::FDiv => "fdiv.s",
        };
        if is_float {
            out.push(AsmInst::Binary(mnemonic, Reg::FT0, Reg::FT0, Reg::FT1));
        } else {
            out.push(AsmInst::Binary(mnemonic, Reg::T0, Reg::T0, Reg::T1));
        }
        self.store_result(out, result, is_float);
    }

    fn lower_icmp(
        &mut self,
        pred: Predicate,
        result: &Value,
        lhs: &Value,
        rhs: &Value,
        out: &mut Vec<AsmInst>,
    ) {
        if self.is_unused(result) {
            return;
        }
        let is_float = lhs.ty().is_float() || rhs.ty().is_float();
        self.load_value(out, lhs, Reg::T0, Reg::FT0);
        self.load_value(out, rhs, Reg::T1, Reg::FT1);
        if is_float {
            match pred {
                Predicate::Eq => out.push(AsmInst::Feq(Reg::T0, Reg::FT0, Reg::FT1)),
                Predicate::Ne => {
                    out.push(AsmInst::Feq(Reg::T0, Reg::FT0, Reg::FT1));
                    out.push(AsmInst::BinaryImm("xori", Reg::T0, Reg::T0, 1));
                }
                Predicate::Gt => out.push(AsmInst::Flt(Reg::T0, Reg::FT1, Reg::FT0)),
                Predicate::Ge => {
                    out.push(AsmInst::Flt(Reg::T0, Reg::FT0, Reg::FT1));
                    out.push(AsmInst::BinaryImm("xori", Reg::T0, Reg::T0, 1));
                }
                Predicate::Lt => out.push(AsmInst::Flt(Reg::T0, Reg::FT0, Reg::FT1)),
                Predicate::Le => {
                    out.push(AsmInst::Flt(Reg::T0, Reg::FT1, Reg::FT0));
                    out.push(AsmInst::BinaryImm("xori", Reg::T0, Reg::T0, 1));
                }
            }
        } else {
            match pred {
                Predicate::Eq => {
                    out.push(AsmInst::Binary("xor", Reg::T0, Reg::T0, Reg::T1));
                    out.push(AsmInst::Seqz(Reg::T0, Reg::T0));
                }
                Predicate::Ne => {
                    out.push(AsmInst::Binary("xor", Reg::T0, Reg::T0, Reg::T1));
                    out.push(AsmInst::Snez(Reg::T0, Reg::T0));
                }
                Predicate::Gt => out.push(AsmInst::Binary("slt", Reg::T0, Reg::T1, Reg::T0)),
                Predicate::Ge => {
                    out.push(AsmInst::Binary("slt", Reg::T0, Reg::T0, Reg::T1));
                    out.push(AsmInst::BinaryImm("xori", Reg::T0, Reg::T0, 1));
                }
                Predicate::Lt => out.push(AsmInst::Binary("slt", Reg::T0, Reg::T0, Reg::T1)),
                Predicate::Le => {
                    out.push(AsmInst::Binary("slt", Reg::T0, Reg::T1, Reg::T0));
                    out.push(AsmInst::BinaryImm("xori", Reg::T0, Reg::T0, 1));
                }
            }
        }
        self.store_result(out, result, false);
    }

    fn lower_gep(
        &mut self,
        result: &Value,
        base: &Value,
        indices: &[Value],
        out: &mut Vec<AsmInst>,
    ) {
        if self.is_unused(result) {
            return;
        }
        self.load_value(out, base, Reg::T0, Reg::FT0);

        let pointee = base.ty().elem().cloned();
        let index = if indices.len() > 1 {
            &indices[1]
        } else {
            &indices[0]
        };
        // row-major scaling: with an explicit leading zero index the first
        // dimension is the one being stepped, so the inner dimensions
        // multiply in; a decayed pointer steps by the whole pointee
        let scale: i64 = match &pointee {
            Some(ty) if ty.is_array() => {
                let dims = ty.dims();
                if indices.len() > 1 {
                    dims[1..].iter().map(|&d| d as i64).product()
                } else {
                    dims.iter().map(|&d| d as i64).product()
                }
            }
            _ => 1,
        };

        match index {
            Value::ConstInt(i) => {
                out.push(AsmInst::BinaryImm(
                    "addi",
                    Reg::T0,
                    Reg::T0,
                    *i as i64 * scale * 4,
                ));
            }
            dynamic => {
                self.load_value(out, dynamic, Reg::T1, Reg::FT1);
                if scale != 1 {
                    out.push(AsmInst::Li(Reg::T2, scale));
                    out.push(AsmInst::Binary("mul", Reg::T1, Reg::T1, Reg::T2));
                }
                out.push(AsmInst::Li(Reg::T2, 4));
                out.push(AsmInst::Binary("mul", Reg::T1, Reg::T1, Reg::T2));
                out.push(AsmInst::Binary("add", Reg::T0, Reg::T0, Reg::T1));
            }
        }
        self.store_result(out, result, false);
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_call(
        &mut self,
        result: Option<&Value>,
        callee: &str,
        ret: &syc_ir::IrType,
        args: &[Value],
        bid: usize,
        idx: usize,
        out: &mut Vec<AsmInst>,
    ) {
        // caller-save: own register parameters into the reserved area
        for (reg, off) in &self.param_saves {
            out.push(AsmInst::Sd(*reg, *off, Reg::SP));
        }
        // and every register-resident value live across this call
        let mut saved: Vec<(Reg, i64)> = Vec::new();
        if let Some(live) = self.alloc.call_live.get(&(bid, idx)) {
            for name in live {
                if let (Some(Location::Register(r)), Some(slot)) = (
                    self.alloc.locations.get(name),
                    self.alloc.save_slots.get(name),
                ) {
                    saved.push((*r, *slot));
                }
            }
        }
        for (reg, slot) in &saved {
            out.push(AsmInst::Sd(*reg, slot * 2, Reg::SP));
        }

        // overflow bytes for arguments beyond the register sets
        let mut int_index = 0usize;
        let mut float_index = 0usize;
        let mut overflow = 0i64;
        for arg in args {
            if arg.ty().is_float() {
                if float_index >= CallingConvention::MAX_REG_ARGS {
                    overflow += 8;
                } else {
                    float_index += 1;
                }
            } else if int_index >= CallingConvention::MAX_REG_ARGS {
                overflow += 8;
            } else {
                int_index += 1;
            }
        }

        int_index = 0;
        float_index = 0;
        let mut stack_loc = 0i64;
        for arg in args {
            let is_float = self.load_argument(out, arg);
            if is_float {
                if float_index < CallingConvention::MAX_REG_ARGS {
                    out.push(AsmInst::Mv(Reg::float_arg(float_index), Reg::FT0));
                    float_index += 1;
                } else {
                    out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, -overflow));
                    out.push(AsmInst::Sd(Reg::FT0, stack_loc, Reg::SP));
                    out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, overflow));
                    stack_loc += 8;
                }
            } else if int_index < CallingConvention::MAX_REG_ARGS {
                out.push(AsmInst::Mv(Reg::int_arg(int_index), Reg::T0));
                int_index += 1;
            } else {
                out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, -overflow));
                out.push(AsmInst::Sd(Reg::T0, stack_loc, Reg::SP));
                out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, overflow));
                stack_loc += 8;
            }
        }

        if overflow > 0 {
            out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, -overflow));
        }
        out.push(AsmInst::Call(callee.to_string()));
        if overflow > 0 {
            out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, overflow));
        }

        // fetch the return value
        if let Some(result) = result {
            match self.alloc.location_of(result) {
                Location::Stack(off) => {
                    let from = if ret.is_float() { Reg::FA0 } else { Reg::A0 };
                    out.push(AsmInst::Sd(from, off * 2, Reg::SP));
                }
                Location::Register(r) => {
                    let from = if ret.is_float() { Reg::FA0 } else { Reg::A0 };
                    out.push(AsmInst::Mv(r, from));
                }
                Location::Unused => {}
            }
        }

        // caller-restore, in save order
        for (reg, off) in &self.param_saves {
            out.push(AsmInst::Ld(*reg, *off, Reg::SP));
        }
        for (reg, slot) in &saved {
            out.push(AsmInst::Ld(*reg, slot * 2, Reg::SP));
        }
    }

    /// Materialize a call argument into `t0`/`ft0`. Values parked in
    /// argument registers are reloaded from their save slots because the
    /// argument registers are being overwritten by the marshaling itself.
    fn load_argument(&self, out: &mut Vec<AsmInst>, arg: &Value) -> bool {
        if let Value::Reg { name, ty } = arg {
            let is_float = ty.is_float();
            let scratch = if is_float { Reg::FT0 } else { Reg::T0 };
            if let Some(loc) = self.params.get(name) {
                match loc {
                    ParamLoc::Reg(r) => {
                        if let Some(off) = self.param_save_of(*r) {
                            out.push(AsmInst::Ld(scratch, off, Reg::SP));
                        }
                    }
                    ParamLoc::CallerStack(off) => self.caller_frame_load(out, scratch, *off),
                }
                return is_float;
            }
            if let Some(Location::Register(r)) = self.alloc.locations.get(name) {
                if r.is_arg() {
                    if let Some(slot) = self.alloc.save_slots.get(name) {
                        out.push(AsmInst::Ld(scratch, slot * 2, Reg::SP));
                        return is_float;
                    }
                }
            }
        }
        self.load_value(out, arg, Reg::T0, Reg::FT0)
    }

    fn param_save_of(&self, reg: Reg) -> Option<i64> {
        self.param_saves
            .iter()
            .find(|(r, _)| *r == reg)
            .map(|(_, off)| *off)
    }

    fn lower_ret(&mut self, value: Option<&Value>, out: &mut Vec<AsmInst>) {
        if self.has_call {
            if let Some(slot) = self.alloc.ra_slot {
                out.push(AsmInst::Ld(Reg::RA, slot * 2, Reg::SP));
            }
        }
        if let Some(value) = value {
            // the scratch pair is the return-value pair here
            self.load_value(out, value, Reg::A0, Reg::FA0);
        }
        out.push(AsmInst::BinaryImm("addi", Reg::SP, Reg::SP, self.stack_size));
        out.push(AsmInst::Ret);
    }

    /// Join-block half of the phi protocol: pull the value the predecessor
    /// parked in this phi's temporary slot into the destination.
    fn lower_phi(&mut self, result: &Value, incomings: &[(BlockId, Value)], out: &mut Vec<AsmInst>) {
        let location = self.alloc.location_of(result);
        if location == Location::Unused {
            return;
        }
        let index = self.phis.len() as i64;
        self.phis.push(PhiRecord {
            incomings: incomings.to_vec(),
        });
        let tmp = self.frame.phi_slot(index);
        match location {
            Location::Stack(off) => {
                let scratch = if result.ty().is_float() {
                    Reg::FT0
                } else {
                    Reg::T0
                };
                out.push(AsmInst::Ld(scratch, tmp, Reg::SP));
                out.push(AsmInst::Sd(scratch, off * 2, Reg::SP));
            }
            Location::Register(r) => out.push(AsmInst::Ld(r, tmp, Reg::SP)),
            Location::Unused => {}
        }
    }

    /// Predecessor half of the phi protocol: store each incoming value into
    /// the phi's temporary slot just before the predecessor's terminator
    /// (3 instructions from the end for a conditional branch, 1 for an
    /// unconditional jump).
    fn fixup_phis(&self, asm: &mut AsmFunction) {
        for (index, record) in self.phis.iter().enumerate() {
            for (pred, value) in &record.incomings {
                let pred_block = &self.func.blocks[*pred];
                let offset = match pred_block.terminator() {
                    Some(Instruction::CondBr { .. }) => 3,
                    _ => 1,
                };
                let label = self.block_label(*pred);
                let Some(block) = asm.block_mut(&label) else {
                    continue;
                };
                let mut seq = Vec::new();
                let is_float = self.load_value(&mut seq, value, Reg::T0, Reg::FT0);
                let src = if is_float { Reg::FT0 } else { Reg::T0 };
                seq.push(AsmInst::Sd(
                    src,
                    self.frame.phi_slot(index as i64),
                    Reg::SP,
                ));
                let at = block.instrs.len().saturating_sub(offset);
                for (k, inst) in seq.into_iter().enumerate() {
                    block.instrs.insert(at + k, inst);
                }
            }
        }
    }
}

fn float_bits(value: f32) -> String {
    format!("0X{:x}", value.to_bits())
}
