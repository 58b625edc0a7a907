//! Dominance analysis
//!
//! Computes, per function, the dominator set, immediate dominator, and
//! dominance frontier of every basic block. The fixed point iterates in
//! reverse postorder and is O(n^2) in the block count; SSA promotion guards
//! against pathologically large functions before calling in here.

use crate::ir::{BlockId, Function};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct DomInfo {
    /// Blocks dominating each block (indexed by block id; includes itself)
    pub dominators: Vec<HashSet<BlockId>>,
    /// Immediate dominator; `None` for the entry and unreachable blocks
    pub idom: Vec<Option<BlockId>>,
    /// Dominance frontier of each block
    pub frontier: Vec<HashSet<BlockId>>,
}

impl DomInfo {
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dominators[b].contains(&a)
    }
}

/// Run the analysis. Expects `func.compute_edges()` to have been called
/// after the last CFG mutation.
pub fn analyze(func: &Function) -> DomInfo {
    let n = func.blocks.len();
    let entry = func.entry();
    let rpo = reverse_postorder(func);
    let reachable: HashSet<BlockId> = rpo.iter().copied().collect();

    // every block starts dominated by all blocks; the entry only by itself
    let all: HashSet<BlockId> = (0..n).collect();
    let mut dominators: Vec<HashSet<BlockId>> = vec![all; n];
    dominators[entry] = HashSet::from([entry]);

    let mut changed = true;
    while changed {
        changed = false;
        for &block in &rpo {
            if block == entry {
                continue;
            }
            let mut new_doms: Option<HashSet<BlockId>> = None;
            for &pred in &func.blocks[block].preds {
                if !reachable.contains(&pred) {
                    continue;
                }
                new_doms = Some(match new_doms {
                    None => dominators[pred].clone(),
                    Some(acc) => acc.intersection(&dominators[pred]).copied().collect(),
                });
            }
            let mut new_doms = new_doms.unwrap_or_default();
            new_doms.insert(block);
            if new_doms != dominators[block] {
                dominators[block] = new_doms;
                changed = true;
            }
        }
    }

    // idom of B: the dominator D != B whose own dominator set equals
    // B's dominator set minus B
    let mut idom = vec![None; n];
    for &block in &rpo {
        if block == entry {
            continue;
        }
        let mut strict = dominators[block].clone();
        strict.remove(&block);
        for &dom in &dominators[block] {
            if dom == block {
                continue;
            }
            if idom[block].is_none() && dominators[dom] == strict {
                idom[block] = Some(dom);
            }
        }
    }

    // frontier: walk each predecessor's idom chain up to a dominator of B
    let mut frontier: Vec<HashSet<BlockId>> = vec![HashSet::new(); n];
    for &block in &rpo {
        for &pred in &func.blocks[block].preds {
            if !reachable.contains(&pred) {
                continue;
            }
            let mut runner = Some(pred);
            while let Some(r) = runner {
                if dominators[block].contains(&r) {
                    break;
                }
                frontier[r].insert(block);
                runner = idom[r];
            }
        }
    }

    DomInfo {
        dominators,
        idom,
        frontier,
    }
}

/// Reverse postorder over the successor graph, starting from the entry.
/// Unreachable blocks do not appear.
pub fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    dfs(func, func.entry(), &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}

fn dfs(func: &Function, block: BlockId, visited: &mut HashSet<BlockId>, out: &mut Vec<BlockId>) {
    if !visited.insert(block) {
        return;
    }
    for &succ in &func.blocks[block].succs {
        dfs(func, succ, visited, out);
    }
    out.push(block);
}
