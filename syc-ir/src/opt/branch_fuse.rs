//! Branch/compare fusion
//!
//! Boolean-negation lowering in the front end produces the 4-instruction
//! window {icmp, zext, icmp-against-zero, cond_br}. The branch only needs
//! the first comparison: the two middle instructions are deleted and the
//! branch condition rewired to the first compare's result.

use crate::ir::{Function, Instruction, Predicate, Value};

pub fn run(func: &mut Function) {
    for block in &mut func.blocks {
        let mut remove: Vec<usize> = Vec::new();
        let insts = &mut block.instructions;
        for i in 0..insts.len() {
            if i + 3 >= insts.len() {
                break;
            }
            let Instruction::Icmp { result: first, .. } = &insts[i] else {
                continue;
            };
            let Instruction::Zext {
                result: widened,
                value: zext_in,
            } = &insts[i + 1]
            else {
                continue;
            };
            if zext_in != first {
                continue;
            }
            let Instruction::Icmp {
                pred: Predicate::Ne,
                result: second,
                lhs,
                rhs,
            } = &insts[i + 2]
            else {
                continue;
            };
            // the branch condition must be `widened != 0`, which is exactly
            // the first compare's result; any other predicate would change
            // which way the branch goes
            let feeds_zero_compare = (lhs == widened && *rhs == Value::ConstInt(0))
                || (rhs == widened && *lhs == Value::ConstInt(0));
            if !feeds_zero_compare {
                continue;
            }
            let Instruction::CondBr { cond, .. } = &insts[i + 3] else {
                continue;
            };
            if cond != second {
                continue;
            }
            let first = first.clone();
            if let Instruction::CondBr { cond, .. } = &mut insts[i + 3] {
                *cond = first;
            }
            remove.push(i + 1);
            remove.push(i + 2);
        }
        for &i in remove.iter().rev() {
            insts.remove(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, IrType, Predicate};
    use pretty_assertions::assert_eq;

    fn reg(name: &str, ty: IrType) -> Value {
        Value::Reg {
            name: name.into(),
            ty,
        }
    }

    #[test]
    fn test_fuses_negated_compare_into_branch() {
        let mut func = Function::new("f", IrType::Void);
        let entry = func.add_block(BasicBlock::new("entry"));
        let a = func.add_block(BasicBlock::new("a"));
        let b = func.add_block(BasicBlock::new("b"));
        func.blocks[entry].instructions = vec![
            Instruction::Icmp {
                pred: Predicate::Lt,
                result: reg("cmp", IrType::I1),
                lhs: reg("x", IrType::I32),
                rhs: Value::ConstInt(10),
            },
            Instruction::Zext {
                result: reg("wide", IrType::I32),
                value: reg("cmp", IrType::I1),
            },
            Instruction::Icmp {
                pred: Predicate::Ne,
                result: reg("again", IrType::I1),
                lhs: reg("wide", IrType::I32),
                rhs: Value::ConstInt(0),
            },
            Instruction::CondBr {
                cond: reg("again", IrType::I1),
                if_true: a,
                if_false: b,
            },
        ];
        for target in [a, b] {
            func.blocks[target]
                .instructions
                .push(Instruction::Ret { value: None });
        }

        run(&mut func);
        assert_eq!(func.blocks[entry].instructions.len(), 2);
        match &func.blocks[entry].instructions[1] {
            Instruction::CondBr { cond, .. } => assert_eq!(cond, &reg("cmp", IrType::I1)),
            other => panic!("expected cond_br, got {:?}", other),
        }
    }

    #[test]
    fn test_inverted_compare_is_untouched() {
        // `wide == 0` selects the opposite arm; rewiring it to the first
        // compare would flip the branch
        let mut func = Function::new("f", IrType::Void);
        let entry = func.add_block(BasicBlock::new("entry"));
        let a = func.add_block(BasicBlock::new("a"));
        let b = func.add_block(BasicBlock::new("b"));
        func.blocks[entry].instructions = vec![
            Instruction::Icmp {
                pred: Predicate::Lt,
                result: reg("cmp", IrType::I1),
                lhs: reg("x", IrType::I32),
                rhs: Value::ConstInt(10),
            },
            Instruction::Zext {
                result: reg("wide", IrType::I32),
                value: reg("cmp", IrType::I1),
            },
            Instruction::Icmp {
                pred: Predicate::Eq,
                result: reg("again", IrType::I1),
                lhs: reg("wide", IrType::I32),
                rhs: Value::ConstInt(0),
            },
            Instruction::CondBr {
                cond: reg("again", IrType::I1),
                if_true: a,
                if_false: b,
            },
        ];
        let before = func.blocks[entry].instructions.clone();
        run(&mut func);
        assert_eq!(func.blocks[entry].instructions, before);
    }

    #[test]
    fn test_unrelated_window_is_untouched() {
        let mut func = Function::new("f", IrType::Void);
        let entry = func.add_block(BasicBlock::new("entry"));
        let a = func.add_block(BasicBlock::new("a"));
        let b = func.add_block(BasicBlock::new("b"));
        func.blocks[entry].instructions = vec![
            Instruction::Icmp {
                pred: Predicate::Lt,
                result: reg("cmp", IrType::I1),
                lhs: reg("x", IrType::I32),
                rhs: Value::ConstInt(10),
            },
            Instruction::Zext {
                result: reg("wide", IrType::I32),
                value: reg("cmp", IrType::I1),
            },
            Instruction::Icmp {
                pred: Predicate::Ne,
                result: reg("again", IrType::I1),
                lhs: reg("wide", IrType::I32),
                rhs: Value::ConstInt(1),
            },
            Instruction::CondBr {
                cond: reg("again", IrType::I1),
                if_true: a,
                if_false: b,
            },
        ];
        let before = func.blocks[entry].instructions.clone();
        run(&mut func);
        assert_eq!(func.blocks[entry].instructions, before);
    }
}
