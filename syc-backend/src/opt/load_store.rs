//! Redundant load/store/move elimination
//!
//! Adjacent-pair cleanup within each block over the emitted stream:
//! a load right after a store of the same register and address is dropped,
//! an identical duplicate store is dropped, a move pair that swaps back is
//! dropped, and self-moves disappear.

use syc_codegen::{AsmFunction, AsmInst};

pub fn run(func: &mut AsmFunction) {
    for block in &mut func.blocks {
        block
            .instrs
            .retain(|inst| !matches!(inst, AsmInst::Mv(a, b) if a == b));

        let mut i = 0;
        while i + 1 < block.instrs.len() {
            match (&block.instrs[i], &block.instrs[i + 1]) {
                // sd x, A; ld x, A  -> the load re-reads what was written
                (AsmInst::Sd(sr, so, sb), AsmInst::Ld(lr, lo, lb))
                    if sr == lr && so == lo && sb == lb =>
                {
                    block.instrs.remove(i + 1);
                }
                // identical back-to-back stores
                (AsmInst::Sd(ar, ao, ab), AsmInst::Sd(br, bo, bb))
                    if ar == br && ao == bo && ab == bb =>
                {
                    block.instrs.remove(i + 1);
                }
                // mv a, b; mv b, a  -> the swap back is a no-op
                (AsmInst::Mv(ad, as_), AsmInst::Mv(bd, bs)) if ad == bs && as_ == bd => {
                    block.instrs.remove(i + 1);
                }
                // ld x, A; sd x, A  -> stores back what was just read
                (AsmInst::Ld(lr, lo, lb), AsmInst::Sd(sr, so, sb))
                    if lr == sr && lo == so && lb == sb =>
                {
                    block.instrs.remove(i + 1);
                }
                _ => i += 1,
            }
        }
    }
}
