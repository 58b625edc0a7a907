//! Tail-recursion elimination
//!
//! A block ending `r = call @self(...); ret r` is a tail call. The entry
//! block's body moves into a fresh loop header holding one phi per
//! parameter (entry edge: the original argument; each recursive edge: the
//! tail call's actual argument), the recursive block branches back to the
//! header, and every use of a parameter in the body is replaced by its phi.
//! Functions with more than 30 parameters are left alone.

use crate::ir::{BlockId, Function, Instruction, NameSupply, Value};

const MAX_PARAMS: usize = 30;

pub fn run(func: &mut Function, names: &mut NameSupply) {
    if !(0..func.blocks.len()).any(|b| is_tail_recursive(func, b)) {
        return;
    }
    if func.params.len() > MAX_PARAMS {
        log::debug!(
            "skipping tail-recursion elimination for @{}: {} parameters",
            func.name,
            func.params.len()
        );
        return;
    }

    // hoist the entry body into the loop header
    let entry = func.entry();
    let header = func.add_block(crate::ir::BasicBlock::new("tail.header"));
    let body = std::mem::take(&mut func.blocks[entry].instructions);
    func.blocks[header].instructions = body;
    func.blocks[entry]
        .instructions
        .push(Instruction::Br { target: header });
    if let Some(pos) = func.ret_blocks.iter().position(|&b| b == entry) {
        func.ret_blocks[pos] = header;
    }

    // the hoist may have moved an entry-resident tail call into the header,
    // so the tail blocks are collected only now
    let tail_blocks: Vec<BlockId> = (0..func.blocks.len())
        .filter(|&b| is_tail_recursive(func, b))
        .collect();

    // one phi per parameter, selecting the entry argument on the entry edge
    let mut phis: Vec<Value> = Vec::new();
    for param in func.params.clone() {
        let result = names.fresh("phi", param.ty());
        func.blocks[header].instructions.insert(
            0,
            Instruction::Phi {
                result: result.clone(),
                incomings: vec![(entry, param)],
            },
        );
        phis.push(result);
    }

    for &block in &tail_blocks {
        let len = func.blocks[block].instructions.len();
        let Instruction::Call { args, .. } = func.blocks[block].instructions[len - 2].clone()
        else {
            continue;
        };
        func.blocks[block].instructions.truncate(len - 2);
        func.blocks[block]
            .instructions
            .push(Instruction::Br { target: header });
        func.ret_blocks.retain(|&b| b != block);

        // the recursive edge carries the call's actual arguments; the phis
        // sit at the head of the header in reverse parameter order
        for (i, arg) in args.into_iter().enumerate() {
            if i >= func.params.len() {
                break;
            }
            let phi_index = func.params.len() - 1 - i;
            if let Instruction::Phi { incomings, .. } =
                &mut func.blocks[header].instructions[phi_index]
            {
                if let Some(entry) = incomings.iter_mut().find(|(b, _)| *b == block) {
                    entry.1 = arg;
                } else {
                    incomings.push((block, arg));
                }
            }
        }
    }

    // every use of a parameter in the body now reads the phi; the header
    // phis themselves are fixed up separately below
    let params = func.params.clone();
    for (param, phi) in params.iter().zip(&phis) {
        let Some(param_name) = param.name() else {
            continue;
        };
        for bid in 0..func.blocks.len() {
            for i in 0..func.blocks[bid].instructions.len() {
                if bid == header
                    && matches!(func.blocks[bid].instructions[i], Instruction::Phi { .. })
                {
                    continue;
                }
                func.blocks[bid].instructions[i].replace_uses(param_name, phi);
            }
        }
    }

    // a recursive edge's incoming value names the current iteration's value,
    // which after the rewrite is the phi; only the entry edge keeps the raw
    // argument
    for inst in &mut func.blocks[header].instructions {
        let Instruction::Phi { incomings, .. } = inst else {
            break;
        };
        for (from, value) in incomings.iter_mut() {
            if *from == entry || !matches!(value, Value::Reg { .. }) {
                continue;
            }
            let name = value.name();
            if let Some(i) = params.iter().position(|p| p.name() == name) {
                *value = phis[i].clone();
            }
        }
    }

    func.compute_edges();
}

fn is_tail_recursive(func: &Function, block: BlockId) -> bool {
    let insts = &func.blocks[block].instructions;
    if insts.len() <= 1 {
        return false;
    }
    let (Some(last), Some(prev)) = (insts.last(), insts.get(insts.len() - 2)) else {
        return false;
    };
    match (prev, last) {
        (
            Instruction::Call {
                result: Some(result),
                callee,
                ..
            },
            Instruction::Ret { value: Some(value) },
        ) => *callee == func.name && value == result,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, BinaryOp, IrType, Predicate};
    use pretty_assertions::assert_eq;

    fn reg(name: &str, ty: IrType) -> Value {
        Value::Reg {
            name: name.into(),
            ty,
        }
    }

    /// int f(int n, int acc) { if (n == 0) return acc; return f(n-1, acc+n); }
    fn tail_sum() -> (Function, NameSupply) {
        let mut func = Function::new("f", IrType::I32);
        let n = reg("n", IrType::I32);
        let acc = reg("acc", IrType::I32);
        func.params = vec![n.clone(), acc.clone()];
        let entry = func.add_block(BasicBlock::new("entry"));
        let base = func.add_block(BasicBlock::new("base"));
        let rec = func.add_block(BasicBlock::new("rec"));
        func.blocks[entry].instructions = vec![
            Instruction::Icmp {
                pred: Predicate::Eq,
                result: reg("cmp", IrType::I1),
                lhs: n.clone(),
                rhs: Value::ConstInt(0),
            },
            Instruction::CondBr {
                cond: reg("cmp", IrType::I1),
                if_true: base,
                if_false: rec,
            },
        ];
        func.blocks[base].instructions = vec![Instruction::Ret {
            value: Some(acc.clone()),
        }];
        func.blocks[rec].instructions = vec![
            Instruction::Binary {
                op: BinaryOp::Sub,
                result: reg("dec", IrType::I32),
                lhs: n.clone(),
                rhs: Value::ConstInt(1),
            },
            Instruction::Binary {
                op: BinaryOp::Add,
                result: reg("inc", IrType::I32),
                lhs: acc,
                rhs: n,
            },
            Instruction::Call {
                result: Some(reg("r", IrType::I32)),
                callee: "f".into(),
                ret: IrType::I32,
                args: vec![reg("dec", IrType::I32), reg("inc", IrType::I32)],
            },
            Instruction::Ret {
                value: Some(reg("r", IrType::I32)),
            },
        ];
        func.ret_blocks = vec![base, rec];
        func.compute_edges();
        (func, NameSupply::default())
    }

    #[test]
    fn test_rewrites_tail_call_to_branch() {
        let (mut func, mut names) = tail_sum();
        run(&mut func, &mut names);

        // no self-call remains
        for block in &func.blocks {
            for inst in &block.instructions {
                assert!(!matches!(inst, Instruction::Call { callee, .. } if callee == "f"));
            }
        }
        // the recursive block ends in a branch to the header
        let header = func.blocks.len() - 1;
        assert_eq!(
            func.blocks[2].instructions.last(),
            Some(&Instruction::Br { target: header })
        );
        assert_eq!(func.ret_blocks, vec![1]);

        // two phis with an entry edge and a recursive edge each
        let phi_count = func.blocks[header]
            .instructions
            .iter()
            .take_while(|i| matches!(i, Instruction::Phi { .. }))
            .count();
        assert_eq!(phi_count, 2);
        for inst in func.blocks[header].instructions.iter().take(2) {
            match inst {
                Instruction::Phi { incomings, .. } => {
                    assert_eq!(incomings.len(), 2);
                    assert!(incomings.iter().any(|(b, _)| *b == 0));
                    assert!(incomings.iter().any(|(b, _)| *b == 2));
                }
                other => panic!("expected phi, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_body_uses_switch_to_phis() {
        let (mut func, mut names) = tail_sum();
        run(&mut func, &mut names);
        let header = func.blocks.len() - 1;
        // the comparison now reads the phi, not the raw parameter
        let cmp = func.blocks[header]
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::Icmp { lhs, .. } => Some(lhs.clone()),
                _ => None,
            })
            .unwrap();
        assert_ne!(cmp, reg("n", IrType::I32));
        assert!(cmp.name().unwrap().starts_with("phi"));
    }

    #[test]
    fn test_swapped_arguments_route_through_the_phis() {
        // int f(int a, int b) { return f(b, a); } - each recursive edge must
        // carry the other phi, not the original argument
        let mut func = Function::new("f", IrType::I32);
        let a = reg("a", IrType::I32);
        let b = reg("b", IrType::I32);
        func.params = vec![a.clone(), b.clone()];
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![
            Instruction::Call {
                result: Some(reg("r", IrType::I32)),
                callee: "f".into(),
                ret: IrType::I32,
                args: vec![b.clone(), a.clone()],
            },
            Instruction::Ret {
                value: Some(reg("r", IrType::I32)),
            },
        ];
        func.ret_blocks = vec![entry];
        func.compute_edges();
        run(&mut func, &mut NameSupply::default());

        let header = func.blocks.len() - 1;
        let phi_results: Vec<Value> = func.blocks[header]
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Phi { result, .. } => Some(result.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(phi_results.len(), 2);
        // phi for a receives phi-of-b on the back edge, and vice versa
        for (i, inst) in func.blocks[header].instructions.iter().take(2).enumerate() {
            let Instruction::Phi { incomings, .. } = inst else {
                panic!("expected phi, got {:?}", inst);
            };
            let (_, back) = incomings
                .iter()
                .find(|(from, _)| *from == header)
                .expect("recursive edge present");
            assert_eq!(back, &phi_results[1 - i]);
        }
        // no self-call remains and the function still has a return
        for block in &func.blocks {
            for inst in &block.instructions {
                assert!(!matches!(inst, Instruction::Call { callee, .. } if callee == "f"));
            }
        }
        assert_eq!(func.ret_blocks, Vec::<usize>::new());
    }

    #[test]
    fn test_non_recursive_function_untouched() {
        let mut func = Function::new("g", IrType::I32);
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![Instruction::Ret {
            value: Some(Value::ConstInt(1)),
        }];
        func.compute_edges();
        let before = func.clone();
        run(&mut func, &mut NameSupply::default());
        assert_eq!(func, before);
    }
}
