//! SSA promotion of scalar stack slots (mem2reg)
//!
//! Every `alloca` of a scalar i32/float that is only touched by direct
//! load/store is promoted to SSA registers: a phi is inserted at each block
//! of the iterated dominance frontier of the slot's definition sites, then a
//! single traversal from the entry carries a current-value map, rewriting
//! loads to the live incoming value (a typed zero when undefined on that
//! path) and deleting the promoted alloca/load/store instructions. Inserted
//! phis that end up unused are removed again.

use crate::dom;
use crate::ir::{BlockId, Function, Instruction, IrType, NameSupply, Value};
use std::collections::{HashMap, HashSet, VecDeque};

/// Functions past these sizes are not promoted; the dominance fixed point
/// is quadratic and compile time is bounded instead.
const MAX_BLOCKS: usize = 5000;
const MAX_VARS: usize = 3000;

pub fn run(func: &mut Function, names: &mut NameSupply) {
    if func.blocks.len() > MAX_BLOCKS {
        log::debug!(
            "skipping mem2reg for @{}: {} blocks",
            func.name,
            func.blocks.len()
        );
        return;
    }
    let var_count = func
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| i.result().is_some())
        .count();
    if var_count > MAX_VARS {
        log::debug!("skipping mem2reg for @{}: {} variables", func.name, var_count);
        return;
    }

    // drop anything after the first terminator of each block
    for block in &mut func.blocks {
        if let Some(pos) = block.instructions.iter().position(Instruction::is_terminator) {
            block.instructions.truncate(pos + 1);
        }
    }
    func.compute_edges();
    let dom = dom::analyze(func);

    // promotable scalar slots, in program order
    let mut slot_types: HashMap<String, IrType> = HashMap::new();
    let mut slot_order: Vec<String> = Vec::new();
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Instruction::Alloca { result } = inst {
                if let Some(elem) = result.ty().elem() {
                    if matches!(elem, IrType::I32 | IrType::Float) {
                        let name = result.name().unwrap_or_default().to_string();
                        if slot_types.insert(name.clone(), elem.clone()).is_none() {
                            slot_order.push(name);
                        }
                    }
                }
            }
        }
    }
    if slot_order.is_empty() {
        return;
    }

    // blocks containing a store to each slot
    let mut def_blocks: HashMap<String, HashSet<BlockId>> = slot_order
        .iter()
        .map(|name| (name.clone(), HashSet::new()))
        .collect();
    for (bid, block) in func.blocks.iter().enumerate() {
        for inst in &block.instructions {
            if let Instruction::Store { ptr, .. } = inst {
                if let Some(defs) = ptr.name().and_then(|n| def_blocks.get_mut(n)) {
                    defs.insert(bid);
                }
            }
        }
    }

    // phi insertion over the iterated dominance frontier
    let mut phi_slots: HashMap<String, String> = HashMap::new();
    for slot in &slot_order {
        let defs = &def_blocks[slot];
        let mut worklist: VecDeque<BlockId> = defs.iter().copied().collect();
        let mut placed: HashSet<BlockId> = HashSet::new();
        while let Some(block) = worklist.pop_front() {
            for &df in &dom.frontier[block] {
                if !placed.insert(df) {
                    continue;
                }
                let result = names.fresh("phi", slot_types[slot].clone());
                phi_slots.insert(result.name().unwrap().to_string(), slot.clone());
                func.blocks[df].instructions.insert(
                    0,
                    Instruction::Phi {
                        result,
                        incomings: Vec::new(),
                    },
                );
                if !defs.contains(&df) {
                    worklist.push_back(df);
                }
            }
        }
    }

    rename(func, &slot_types, &phi_slots);
    remove_unused_phis(func, &phi_slots);
}

/// Single traversal from the entry carrying the current value of every slot.
fn rename(
    func: &mut Function,
    slot_types: &HashMap<String, IrType>,
    phi_slots: &HashMap<String, String>,
) {
    let mut visited: HashSet<BlockId> = HashSet::new();
    let mut queue: VecDeque<(BlockId, HashMap<String, Value>)> = VecDeque::new();
    queue.push_back((func.entry(), HashMap::new()));

    while let Some((bid, mut incoming)) = queue.pop_front() {
        if !visited.insert(bid) {
            continue;
        }
        let mut i = 0;
        while i < func.blocks[bid].instructions.len() {
            let inst = func.blocks[bid].instructions[i].clone();
            match inst {
                Instruction::Alloca { result }
                    if result.name().is_some_and(|n| slot_types.contains_key(n)) =>
                {
                    func.blocks[bid].instructions.remove(i);
                }
                Instruction::Load { result, ptr }
                    if ptr.name().is_some_and(|n| slot_types.contains_key(n)) =>
                {
                    let slot = ptr.name().unwrap();
                    let replacement = incoming
                        .get(slot)
                        .cloned()
                        .unwrap_or_else(|| Value::zero_of(&slot_types[slot]));
                    let loaded = result.name().unwrap_or_default().to_string();
                    func.blocks[bid].instructions.remove(i);
                    func.replace_uses(&loaded, &replacement);
                }
                Instruction::Store { value, ptr }
                    if ptr.name().is_some_and(|n| slot_types.contains_key(n)) =>
                {
                    incoming.insert(ptr.name().unwrap().to_string(), value);
                    func.blocks[bid].instructions.remove(i);
                }
                Instruction::Phi { result, .. }
                    if result.name().is_some_and(|n| phi_slots.contains_key(n)) =>
                {
                    let slot = phi_slots[result.name().unwrap()].clone();
                    incoming.insert(slot, result);
                    i += 1;
                }
                _ => i += 1,
            }
        }

        let succs = func.blocks[bid].succs.clone();
        for succ in succs {
            queue.push_back((succ, incoming.clone()));
            // fill in this edge's value on every inserted phi of the successor
            for inst in &mut func.blocks[succ].instructions {
                if let Instruction::Phi { result, incomings } = inst {
                    let Some(slot) = result.name().and_then(|n| phi_slots.get(n)) else {
                        continue;
                    };
                    let value = incoming
                        .get(slot)
                        .cloned()
                        .unwrap_or_else(|| Value::zero_of(&slot_types[slot]));
                    if let Some(entry) = incomings.iter_mut().find(|(b, _)| *b == bid) {
                        entry.1 = value;
                    } else {
                        incomings.push((bid, value));
                    }
                }
            }
        }
    }
}

/// Delete inserted phis that nothing uses. Self-references through a phi's
/// own incoming list do not count as uses.
fn remove_unused_phis(func: &mut Function, phi_slots: &HashMap<String, String>) {
    let phi_names: Vec<&str> = phi_slots.keys().map(String::as_str).collect();
    let mut dead: HashSet<String> = HashSet::new();
    for name in phi_names {
        let mut used = false;
        for block in &func.blocks {
            for inst in &block.instructions {
                if inst.result().and_then(Value::name) == Some(name) {
                    continue;
                }
                inst.for_each_use(|v| {
                    if v.name() == Some(name) {
                        used = true;
                    }
                });
            }
        }
        if !used {
            dead.insert(name.to_string());
        }
    }
    for block in &mut func.blocks {
        block.instructions.retain(|inst| {
            !matches!(inst, Instruction::Phi { result, .. }
                if result.name().is_some_and(|n| dead.contains(n)))
        });
    }
}
