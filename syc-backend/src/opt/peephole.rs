//! Peephole strength reduction
//!
//! Multiplications and divisions whose right operand is a visible `li` of a
//! power of two become shifts.

use syc_codegen::{AsmFunction, AsmInst};

pub fn run(func: &mut AsmFunction) {
    for block in &mut func.blocks {
        for i in 1..block.instrs.len() {
            let &AsmInst::Li(li_reg, imm) = &block.instrs[i - 1] else {
                continue;
            };
            if imm <= 0 || (imm & (imm - 1)) != 0 {
                continue;
            }
            let shift = imm.trailing_zeros() as i64;
            let replacement = match &block.instrs[i] {
                AsmInst::Binary(op, rd, rs1, rs2)
                    if (*op == "mul" || *op == "mulw") && rd == rs1 && *rs2 == li_reg =>
                {
                    AsmInst::BinaryImm("slli", *rd, *rs1, shift)
                }
                AsmInst::Binary(op, rd, rs1, rs2)
                    if (*op == "div" || *op == "divw") && rd == rs1 && *rs2 == li_reg =>
                {
                    AsmInst::BinaryImm("srai", *rd, *rs1, shift)
                }
                _ => continue,
            };
            log::debug!("strength-reduced {} to shift by {}", block.instrs[i], shift);
            block.instrs[i] = replacement;
        }
    }
}
