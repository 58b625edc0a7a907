//! Unreachable block removal
//!
//! Breadth-first search from the entry block over `j` and `beqz` targets;
//! anything not reached is dropped from the function.

use std::collections::{HashSet, VecDeque};
use syc_codegen::{AsmFunction, AsmInst};

pub fn run(func: &mut AsmFunction) {
    if func.blocks.is_empty() {
        return;
    }
    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    reachable.insert(func.blocks[0].label.clone());
    queue.push_back(func.blocks[0].label.clone());

    while let Some(label) = queue.pop_front() {
        let Some(block) = func.blocks.iter().find(|b| b.label == label) else {
            continue;
        };
        for inst in &block.instrs {
            let target = match inst {
                AsmInst::J(target) | AsmInst::Beqz(_, target) => target,
                _ => continue,
            };
            if reachable.insert(target.clone()) {
                queue.push_back(target.clone());
            }
        }
    }

    func.blocks.retain(|b| reachable.contains(&b.label));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use syc_codegen::{AsmBlock, Reg};

    #[test]
    fn test_drops_unreached_blocks() {
        let mut func = AsmFunction::new("f", 16);
        let mut entry = AsmBlock::new("entry");
        entry.push(AsmInst::Beqz(Reg::T0, "exit".into()));
        entry.push(AsmInst::J("loop".into()));
        let mut looped = AsmBlock::new("loop");
        looped.push(AsmInst::J("exit".into()));
        let mut exit = AsmBlock::new("exit");
        exit.push(AsmInst::Ret);
        let mut island = AsmBlock::new("island");
        island.push(AsmInst::Ret);
        func.blocks = vec![entry, looped, exit, island];

        run(&mut func);
        let labels: Vec<&str> = func.blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["entry", "loop", "exit"]);
    }

    #[test]
    fn test_entry_always_survives() {
        let mut func = AsmFunction::new("f", 0);
        let mut entry = AsmBlock::new("entry");
        entry.push(AsmInst::Ret);
        func.blocks = vec![entry];
        run(&mut func);
        assert_eq!(func.blocks.len(), 1);
    }
}
