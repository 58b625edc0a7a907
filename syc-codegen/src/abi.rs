//! RISC-V calling convention and frame layout
//!
//! Up to 8 integer/pointer arguments travel in `a0-a7` and up to 8 float
//! arguments in `fa0-fa7`; the rest go on the caller's stack in 8-byte
//! slots. There is no callee-save guarantee for the register classes the
//! allocator hands out, so every live register is caller-saved around calls.

use crate::asm::Reg;

pub struct CallingConvention;

impl CallingConvention {
    /// Arguments beyond this many per class are passed on the stack
    pub const MAX_REG_ARGS: usize = 8;

    /// Allocator stack unit in bytes; the emitter doubles offsets into
    /// 8-byte slots
    pub const WORD: i64 = 4;

    /// Stack slot width in bytes as actually addressed
    pub const SLOT: i64 = 8;

    /// Integer-class allocation pool for a function with `int_params`
    /// integer/pointer parameters: the saved and upper temp registers, plus
    /// whichever argument registers this function's own parameters leave
    /// unused.
    pub fn int_pool(int_params: usize) -> Vec<Reg> {
        let mut pool: Vec<Reg> = (1..12).map(Reg::saved).collect();
        pool.extend((3..7).map(Reg::temp));
        for i in (int_params + 1)..Self::MAX_REG_ARGS {
            pool.push(Reg::int_arg(i));
        }
        pool
    }

    /// Float-class allocation pool, sized the same way
    pub fn float_pool(float_params: usize) -> Vec<Reg> {
        let mut pool: Vec<Reg> = (1..12).map(Reg::float_saved).collect();
        pool.extend((3..12).map(Reg::float_temp));
        pool.push(Reg::float_saved(0));
        for i in (float_params + 1)..Self::MAX_REG_ARGS {
            pool.push(Reg::float_arg(i));
        }
        pool
    }
}

/// Frame size bookkeeping for one function.
///
/// `units` is the allocator's final stack pointer in 4-byte units; the
/// emitted frame doubles it into 8-byte slots, adds a fixed 8 bytes, the
/// save area for register-class parameters, and one 8-byte temporary per
/// phi node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub units: i64,
    pub reg_param_bytes: i64,
    pub phi_count: i64,
}

impl Frame {
    /// Frame size before the phi temporaries
    pub fn aligned_size(&self) -> i64 {
        self.units * 2 + 8 + self.reg_param_bytes
    }

    /// Total reserved frame size
    pub fn total_size(&self) -> i64 {
        self.aligned_size() + self.phi_count * 8
    }

    /// Stack offset of the i-th phi temporary slot
    pub fn phi_slot(&self, index: i64) -> i64 {
        self.aligned_size() + index * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_int_pool_reuses_free_arg_registers() {
        let none = CallingConvention::int_pool(0);
        // s1-s11, t3-t6, a1-a7
        assert_eq!(none.len(), 11 + 4 + 7);
        assert!(none.contains(&Reg::int_arg(1)));
        assert!(!none.contains(&Reg::int_arg(0)));

        let three = CallingConvention::int_pool(3);
        assert!(!three.contains(&Reg::int_arg(3)));
        assert!(three.contains(&Reg::int_arg(4)));

        let full = CallingConvention::int_pool(8);
        assert_eq!(full.len(), 15);
    }

    #[test]
    fn test_float_pool_composition() {
        let pool = CallingConvention::float_pool(8);
        // fs1-fs11, ft3-ft11, fs0
        assert_eq!(pool.len(), 11 + 9 + 1);
        assert!(pool.contains(&Reg::float_saved(0)));
        assert!(!pool.contains(&Reg::float_temp(0)));
    }

    #[test]
    fn test_frame_layout() {
        let frame = Frame {
            units: 12,
            reg_param_bytes: 16,
            phi_count: 2,
        };
        assert_eq!(frame.aligned_size(), 12 * 2 + 8 + 16);
        assert_eq!(frame.total_size(), frame.aligned_size() + 16);
        assert_eq!(frame.phi_slot(1), frame.aligned_size() + 8);
    }
}
