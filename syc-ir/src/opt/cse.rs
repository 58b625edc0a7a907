//! Block-local common-subexpression elimination
//!
//! Within each basic block, value-producing instructions are keyed by
//! opcode class plus operand list. A repeat of an already-seen key is
//! deleted and its result recorded in a substitution map that rewrites
//! every later operand reference in the block. No cross-block analysis.

use crate::ir::{Function, Instruction, Value};
use std::collections::HashMap;
use std::fmt::Write;

pub fn run(func: &mut Function) {
    for block in &mut func.blocks {
        let mut seen: HashMap<String, Value> = HashMap::new();
        let mut subst: HashMap<String, Value> = HashMap::new();
        let mut i = 0;
        while i < block.instructions.len() {
            // rewrite operands through the substitutions recorded so far
            for (from, to) in &subst {
                block.instructions[i].replace_uses(from, to);
            }
            let Some(key) = instruction_key(&block.instructions[i]) else {
                i += 1;
                continue;
            };
            let Some(result) = block.instructions[i].result().cloned() else {
                i += 1;
                continue;
            };
            match seen.get(&key) {
                Some(prev) => {
                    if let Some(name) = result.name() {
                        subst.insert(name.to_string(), prev.clone());
                    }
                    block.instructions.remove(i);
                }
                None => {
                    seen.insert(key, result);
                    i += 1;
                }
            }
        }
    }
}

/// Key identifying an instruction's computation, excluding its result.
/// Instructions with side effects or memory behavior return `None`.
fn instruction_key(inst: &Instruction) -> Option<String> {
    let mut key = String::new();
    match inst {
        Instruction::Binary { op, lhs, rhs, .. } => {
            write!(key, "bin {} {} {}", op, lhs, rhs).ok()?;
        }
        Instruction::Icmp { pred, lhs, rhs, .. } => {
            let float = lhs.ty().is_float() || rhs.ty().is_float();
            let pred = if float {
                pred.float_text()
            } else {
                pred.int_text()
            };
            write!(key, "cmp {} {} {}", pred, lhs, rhs).ok()?;
        }
        Instruction::Gep { base, indices, .. } => {
            write!(key, "gep {}", base).ok()?;
            for idx in indices {
                write!(key, " {}", idx).ok()?;
            }
        }
        Instruction::Phi { incomings, .. } => {
            write!(key, "phi").ok()?;
            for (block, value) in incomings {
                write!(key, " [{} {}]", block, value).ok()?;
            }
        }
        Instruction::Zext { value, .. } => {
            write!(key, "zext {}", value).ok()?;
        }
        Instruction::Cast { kind, value, .. } => {
            write!(key, "cast {:?} {}", kind, value).ok()?;
        }
        _ => return None,
    }
    Some(key)
}
