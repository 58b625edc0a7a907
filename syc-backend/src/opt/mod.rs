//! Assembly-level cleanup passes
//!
//! Run per emitted function, after lowering: unreachable block removal,
//! redundant load/store/move elimination, and peephole strength reduction.

pub mod load_store;
pub mod peephole;
pub mod unreachable;

use syc_codegen::AsmFunction;

pub fn run(func: &mut AsmFunction) {
    unreachable::run(func);
    load_store::run(func);
    peephole::run(func);
}
