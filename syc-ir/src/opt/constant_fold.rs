//! Constant folding over the optimized IR
//!
//! The builder already folds constants the front end wrote literally; this
//! pass catches the ones later rewrites introduce (mem2reg turning loads
//! into literals, earlier folds feeding later instructions). Each fold
//! rewrites every use of the folded result - call arguments, GEP indices
//! and phi incomings included - removes the instruction, and rescans the
//! whole function. Division or remainder by a literal zero never matches.

use crate::ir::{BinaryOp, Function, Instruction, Value};

pub fn run(func: &mut Function) {
    while fold_one(func) {}
}

/// Find and fold the first foldable instruction; true if anything changed.
fn fold_one(func: &mut Function) -> bool {
    for bid in 0..func.blocks.len() {
        for i in 0..func.blocks[bid].instructions.len() {
            let Instruction::Binary {
                op,
                result,
                lhs,
                rhs,
            } = &func.blocks[bid].instructions[i]
            else {
                continue;
            };
            let Some(folded) = fold(*op, lhs, rhs) else {
                continue;
            };
            let name = result.name().unwrap_or_default().to_string();
            func.blocks[bid].instructions.remove(i);
            func.replace_uses(&name, &folded);
            return true;
        }
    }
    false
}

fn fold(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::ConstInt(a), Value::ConstInt(b)) => {
            let v = match op {
                BinaryOp::Add => a.wrapping_add(*b),
                BinaryOp::Sub => a.wrapping_sub(*b),
                BinaryOp::Mul => a.wrapping_mul(*b),
                BinaryOp::SDiv if *b != 0 => a.wrapping_div(*b),
                BinaryOp::SRem if *b != 0 => a.wrapping_rem(*b),
                BinaryOp::Xor => a ^ b,
                _ => return None,
            };
            Some(Value::ConstInt(v))
        }
        (Value::ConstFloat(a), Value::ConstFloat(b)) => {
            let v = match op {
                BinaryOp::FAdd => a + b,
                BinaryOp::FSub => a - b,
                BinaryOp::FMul => a * b,
                BinaryOp::FDiv => a / b,
                _ => return None,
            };
            Some(Value::ConstFloat(v))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, IrType};
    use pretty_assertions::assert_eq;

    fn reg(name: &str) -> Value {
        Value::Reg {
            name: name.into(),
            ty: IrType::I32,
        }
    }

    fn binary(op: BinaryOp, result: &str, lhs: Value, rhs: Value) -> Instruction {
        Instruction::Binary {
            op,
            result: reg(result),
            lhs,
            rhs,
        }
    }

    #[test]
    fn test_fold_chains_through_uses() {
        let mut func = Function::new("f", IrType::I32);
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![
            binary(BinaryOp::Add, "a", Value::ConstInt(2), Value::ConstInt(3)),
            binary(BinaryOp::Mul, "b", reg("a"), Value::ConstInt(4)),
            Instruction::Ret {
                value: Some(reg("b")),
            },
        ];
        run(&mut func);
        assert_eq!(
            func.blocks[entry].instructions,
            vec![Instruction::Ret {
                value: Some(Value::ConstInt(20))
            }]
        );
    }

    #[test]
    fn test_fold_rewrites_call_args_and_phis() {
        let mut func = Function::new("f", IrType::Void);
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![
            binary(BinaryOp::Sub, "a", Value::ConstInt(9), Value::ConstInt(4)),
            Instruction::Call {
                result: None,
                callee: "putint".into(),
                ret: IrType::Void,
                args: vec![reg("a")],
            },
            Instruction::Phi {
                result: reg("p"),
                incomings: vec![(0, reg("a"))],
            },
            Instruction::Ret { value: None },
        ];
        run(&mut func);
        match &func.blocks[entry].instructions[0] {
            Instruction::Call { args, .. } => assert_eq!(args[0], Value::ConstInt(5)),
            other => panic!("expected call, got {:?}", other),
        }
        match &func.blocks[entry].instructions[1] {
            Instruction::Phi { incomings, .. } => assert_eq!(incomings[0].1, Value::ConstInt(5)),
            other => panic!("expected phi, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_divisor_does_not_match() {
        let mut func = Function::new("f", IrType::I32);
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![
            binary(BinaryOp::SDiv, "a", Value::ConstInt(1), Value::ConstInt(0)),
            Instruction::Ret {
                value: Some(reg("a")),
            },
        ];
        run(&mut func);
        assert_eq!(func.blocks[entry].instructions.len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let mut func = Function::new("f", IrType::I32);
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![
            binary(BinaryOp::Add, "a", Value::ConstInt(1), Value::ConstInt(2)),
            Instruction::Ret {
                value: Some(reg("a")),
            },
        ];
        run(&mut func);
        let after_first = func.clone();
        run(&mut func);
        assert_eq!(func, after_first);
    }
}
