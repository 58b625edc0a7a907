//! Per-function optimization pipeline
//!
//! A fixed, ordered list of passes run once per function per compilation:
//! SSA promotion, constant folding, branch/compare fusion, tail-recursion
//! elimination, common-subexpression elimination. Passes never raise
//! user-visible errors; a shape that does not match a pass's precondition is
//! simply left untouched.

pub mod branch_fuse;
pub mod constant_fold;
pub mod cse;
pub mod mem2reg;
pub mod tail_rec;

use crate::ir::{Function, Module, NameSupply};

/// Run the full pipeline over every function of the module, in order.
pub fn optimize_module(module: &mut Module) {
    let names = &mut module.names;
    for func in &mut module.functions {
        optimize_function(func, names);
    }
}

pub fn optimize_function(func: &mut Function, names: &mut NameSupply) {
    log::debug!("optimizing function @{}", func.name);
    mem2reg::run(func, names);
    constant_fold::run(func);
    branch_fuse::run(func);
    tail_rec::run(func, names);
    cse::run(func);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::{Instruction, IrType, Predicate, Value};
    use std::collections::HashSet;

    /// int f(int n, int acc) { if (n == 0) return acc; return f(n - 1, acc + n); }
    fn tail_sum_module() -> Module {
        let mut b = IrBuilder::new("t");
        let f = b.add_function("f", &[IrType::I32, IrType::I32], IrType::I32);
        let entry = b.append_block(f, "entry");
        let base = b.append_block(f, "base");
        let rec = b.append_block(f, "rec");
        let n = b.module().functions[f].params[0].clone();
        let acc = b.module().functions[f].params[1].clone();

        b.position_at_end(f, entry);
        let n_slot = b.build_alloca(IrType::I32, "n_addr");
        let acc_slot = b.build_alloca(IrType::I32, "acc_addr");
        b.build_store(n.clone(), n_slot.clone());
        b.build_store(acc.clone(), acc_slot.clone());
        let n_val = b.build_load(n_slot.clone(), "n");
        let cond = b.build_icmp(Predicate::Eq, n_val, Value::ConstInt(0), "cmp");
        b.build_cond_br(cond, base, rec);

        b.position_at_end(f, base);
        let acc_val = b.build_load(acc_slot.clone(), "acc");
        b.build_ret(Some(acc_val));

        b.position_at_end(f, rec);
        let n_val = b.build_load(n_slot, "n");
        let acc_val = b.build_load(acc_slot, "acc");
        let next_n = b.build_sub(n_val.clone(), Value::ConstInt(1), "dec");
        let next_acc = b.build_add(acc_val, n_val, "inc");
        let ret = b.build_call("f", vec![next_n, next_acc], "r").unwrap();
        b.build_ret(Some(ret));

        b.finish()
    }

    #[test]
    fn test_ssa_invariant_after_pipeline() {
        let mut module = tail_sum_module();
        optimize_module(&mut module);
        let func = &module.functions[0];
        // every register defined exactly once
        let mut defs: HashSet<String> = HashSet::new();
        for block in &func.blocks {
            for inst in &block.instructions {
                if let Some(result) = inst.result() {
                    let name = result.name().unwrap().to_string();
                    assert!(defs.insert(name.clone()), "duplicate definition of %{name}");
                }
            }
        }
        // no loads/stores of promoted scalars survive
        for block in &func.blocks {
            for inst in &block.instructions {
                assert!(
                    !matches!(inst, Instruction::Alloca { .. } | Instruction::Load { .. }),
                    "scalar slot survived promotion: {:?}",
                    inst
                );
            }
        }
    }

    #[test]
    fn test_tail_recursion_becomes_loop() {
        let mut module = tail_sum_module();
        optimize_module(&mut module);
        let func = &module.functions[0];
        // no call of f remains anywhere
        for block in &func.blocks {
            for inst in &block.instructions {
                assert!(
                    !matches!(inst, Instruction::Call { callee, .. } if callee == "f"),
                    "self-call survived tail-recursion elimination"
                );
            }
        }
        // a loop header with parameter phis exists
        let has_param_phi = func.blocks.iter().any(|b| {
            b.instructions
                .iter()
                .any(|i| matches!(i, Instruction::Phi { incomings, .. } if incomings.len() == 2))
        });
        assert!(has_param_phi);
    }
}
