//! SysY Compiler - Backend
//!
//! Everything between the optimized IR and the assembly text: per-function
//! liveness analysis, the allocation driver combining linear scan with
//! array/float bucketing and call-site caller-save slots, the instruction
//! lowering that produces RISC-V, and the assembly-level cleanup passes.

pub mod alloc;
pub mod emit;
pub mod liveness;
pub mod opt;

pub use alloc::{allocate_function, Allocation};
pub use emit::{emit_module, AsmOutput};
