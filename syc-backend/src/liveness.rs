//! Per-function liveness analysis
//!
//! Classic backward data flow in two stages: a work-list fixed point over
//! block-level `in`/`out` sets (predecessors re-enqueued whenever a block's
//! `in` set changes), then a single backward walk per block refining to
//! per-instruction sets. Live intervals are read off a global instruction
//! counter over the function's textual instruction order.
//!
//! Only virtual registers are tracked; constants are immaterial and globals
//! are addressed through `la` at every access.

use std::collections::{HashMap, HashSet, VecDeque};
use syc_ir::{BlockId, Function, Instruction, Value};

#[derive(Debug, Clone)]
pub struct LivenessInfo {
    /// 1-based `[start, end]` positions per value name; values that are
    /// never live at any boundary have no entry
    pub intervals: HashMap<String, (usize, usize)>,
}

impl LivenessInfo {
    pub fn live_at(&self, name: &str, position: usize) -> bool {
        self.intervals
            .get(name)
            .is_some_and(|&(start, end)| start <= position && position <= end)
    }
}

/// Register names an instruction reads
pub fn uses_of(inst: &Instruction) -> Vec<String> {
    let mut uses = Vec::new();
    inst.for_each_use(|v| {
        if let Value::Reg { name, .. } = v {
            if !uses.contains(name) {
                uses.push(name.clone());
            }
        }
    });
    uses
}

/// Register name an instruction defines
pub fn def_of(inst: &Instruction) -> Option<String> {
    match inst.result() {
        Some(Value::Reg { name, .. }) => Some(name.clone()),
        _ => None,
    }
}

pub fn analyze(func: &Function) -> LivenessInfo {
    let n = func.blocks.len();

    // predecessors derived from terminators, independent of stored edges
    let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); n];
    for block in 0..n {
        for succ in func.successors_of(block) {
            if !preds[succ].contains(&block) {
                preds[succ].push(block);
            }
        }
    }

    // block-level use/def
    let mut use_sets: Vec<HashSet<String>> = vec![HashSet::new(); n];
    let mut def_sets: Vec<HashSet<String>> = vec![HashSet::new(); n];
    for (bid, block) in func.blocks.iter().enumerate() {
        for inst in &block.instructions {
            for used in uses_of(inst) {
                if !def_sets[bid].contains(&used) {
                    use_sets[bid].insert(used);
                }
            }
            if let Some(defined) = def_of(inst) {
                if !use_sets[bid].contains(&defined) {
                    def_sets[bid].insert(defined);
                }
            }
        }
    }

    // work-list fixed point, seeded back-to-front
    let mut ins: Vec<HashSet<String>> = vec![HashSet::new(); n];
    let mut outs: Vec<HashSet<String>> = vec![HashSet::new(); n];
    let mut worklist: VecDeque<BlockId> = (0..n).rev().collect();
    while let Some(block) = worklist.pop_front() {
        let mut out: HashSet<String> = HashSet::new();
        for succ in func.successors_of(block) {
            out.extend(ins[succ].iter().cloned());
        }
        let mut inn: HashSet<String> = use_sets[block].clone();
        inn.extend(out.difference(&def_sets[block]).cloned());
        let changed = inn != ins[block];
        outs[block] = out;
        ins[block] = inn;
        if changed {
            for &pred in &preds[block] {
                if !worklist.contains(&pred) {
                    worklist.push_back(pred);
                }
            }
        }
    }

    // per-instruction refinement, one backward walk per block
    let mut intervals: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0usize;
    let mut inst_live: Vec<(HashSet<String>, HashSet<String>)> = Vec::new();
    for (bid, block) in func.blocks.iter().enumerate() {
        let count = block.instructions.len();
        let mut block_live: Vec<(HashSet<String>, HashSet<String>)> =
            vec![(HashSet::new(), HashSet::new()); count];
        let mut next_in = outs[bid].clone();
        for i in (0..count).rev() {
            let inst = &block.instructions[i];
            let out = next_in.clone();
            let inn = if i == 0 {
                ins[bid].clone()
            } else {
                let mut inn: HashSet<String> = uses_of(inst).into_iter().collect();
                let def: HashSet<String> = def_of(inst).into_iter().collect();
                inn.extend(out.difference(&def).cloned());
                inn
            };
            next_in = inn.clone();
            block_live[i] = (inn, out);
        }
        inst_live.extend(block_live);
    }

    for (inn, out) in &inst_live {
        position += 1;
        for name in inn.iter().chain(out.iter()) {
            let entry = intervals.entry(name.clone()).or_insert((position, position));
            entry.1 = position;
        }
    }

    LivenessInfo { intervals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use syc_ir::{BasicBlock, BinaryOp, IrType};

    fn reg(name: &str) -> Value {
        Value::Reg {
            name: name.into(),
            ty: IrType::I32,
        }
    }

    #[test]
    fn test_straightline_intervals_cover_def_to_last_use() {
        let mut func = Function::new("f", IrType::I32);
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![
            // 1: a = 1 + 2 (as registers to keep them live)
            Instruction::Binary {
                op: BinaryOp::Add,
                result: reg("a"),
                lhs: Value::ConstInt(1),
                rhs: Value::ConstInt(2),
            },
            // 2: b = a + a
            Instruction::Binary {
                op: BinaryOp::Add,
                result: reg("b"),
                lhs: reg("a"),
                rhs: reg("a"),
            },
            // 3: ret b
            Instruction::Ret {
                value: Some(reg("b")),
            },
        ];
        let live = analyze(&func);
        // live from the definition's boundary to the last use
        assert_eq!(live.intervals["a"], (1, 2));
        assert_eq!(live.intervals["b"], (2, 3));
        assert!(live.live_at("a", 2));
        assert!(!live.live_at("a", 3));
    }

    #[test]
    fn test_dead_definition_has_no_interval() {
        let mut func = Function::new("f", IrType::Void);
        let entry = func.add_block(BasicBlock::new("entry"));
        func.blocks[entry].instructions = vec![
            Instruction::Binary {
                op: BinaryOp::Add,
                result: reg("dead"),
                lhs: Value::ConstInt(1),
                rhs: Value::ConstInt(2),
            },
            Instruction::Ret { value: None },
        ];
        let live = analyze(&func);
        assert!(!live.intervals.contains_key("dead"));
    }

    #[test]
    fn test_value_live_across_branches() {
        let mut func = Function::new("f", IrType::I32);
        let entry = func.add_block(BasicBlock::new("entry"));
        let left = func.add_block(BasicBlock::new("left"));
        let right = func.add_block(BasicBlock::new("right"));
        func.blocks[entry].instructions = vec![
            Instruction::Binary {
                op: BinaryOp::Add,
                result: reg("x"),
                lhs: Value::ConstInt(1),
                rhs: Value::ConstInt(2),
            },
            Instruction::CondBr {
                cond: reg("x"),
                if_true: left,
                if_false: right,
            },
        ];
        func.blocks[left].instructions = vec![Instruction::Ret {
            value: Some(reg("x")),
        }];
        func.blocks[right].instructions = vec![Instruction::Ret {
            value: Some(Value::ConstInt(0)),
        }];
        let live = analyze(&func);
        // x is live from its definition through the ret in `left`
        let (start, end) = live.intervals["x"];
        assert_eq!(start, 1);
        assert!(end >= 3);
    }

    #[test]
    fn test_loop_carried_value_spans_the_back_edge() {
        // entry -> header; header -> (body | exit); body -> header
        let mut func = Function::new("f", IrType::I32);
        let entry = func.add_block(BasicBlock::new("entry"));
        let header = func.add_block(BasicBlock::new("header"));
        let body = func.add_block(BasicBlock::new("body"));
        let exit = func.add_block(BasicBlock::new("exit"));
        func.blocks[entry].instructions = vec![
            Instruction::Binary {
                op: BinaryOp::Add,
                result: reg("i"),
                lhs: Value::ConstInt(0),
                rhs: Value::ConstInt(0),
            },
            Instruction::Br { target: header },
        ];
        func.blocks[header].instructions = vec![Instruction::CondBr {
            cond: reg("i"),
            if_true: body,
            if_false: exit,
        }];
        func.blocks[body].instructions = vec![Instruction::Br { target: header }];
        func.blocks[exit].instructions = vec![Instruction::Ret {
            value: Some(reg("i")),
        }];
        let live = analyze(&func);
        let (start, end) = live.intervals["i"];
        // live from the branch in the header through the loop body to the ret
        assert!(start <= 3);
        assert!(end >= 5, "interval {:?} must span the back edge", (start, end));
    }
}
