//! Per-function allocation driver
//!
//! Runs liveness, buckets values into their storage classes (array-typed
//! locals are always stack-resident, float values use the float register
//! file, everything else the integer file), runs one linear scan per class,
//! and reserves caller-save slots for every register-resident value live
//! across each call plus one slot for the return address.

use crate::liveness;
use std::collections::{HashMap, HashSet};
use syc_codegen::{CallingConvention, FrameBuilder, LinearScan, LiveInterval, Location};
use syc_ir::{Function, Instruction, IrType, Value};

#[derive(Debug)]
pub struct Allocation {
    /// Primary placement of every tracked value
    pub locations: HashMap<String, Location>,
    /// Caller-save slot (allocator units) for values held in registers
    /// across a call; one slot per value, reused at every call site
    pub save_slots: HashMap<String, i64>,
    /// Register-resident values live at each call, keyed by the call's
    /// (block, instruction) position; this is exactly what the emitter
    /// saves and restores around that call
    pub call_live: HashMap<(usize, usize), Vec<String>>,
    /// Slot for the return address, present when the function calls
    pub ra_slot: Option<i64>,
    /// Final stack pointer in allocator units
    pub frame_units: i64,
}

impl Allocation {
    pub fn location_of(&self, value: &Value) -> Location {
        value
            .name()
            .and_then(|n| self.locations.get(n).cloned())
            .unwrap_or(Location::Unused)
    }
}

/// How many of this function's parameters land in each argument register
/// class
pub fn param_counts(func: &Function) -> (usize, usize) {
    let mut ints = 0;
    let mut floats = 0;
    for param in &func.params {
        if param.ty().is_float() {
            floats += 1;
        } else {
            ints += 1;
        }
    }
    (
        ints.min(CallingConvention::MAX_REG_ARGS),
        floats.min(CallingConvention::MAX_REG_ARGS),
    )
}

pub fn allocate_function(func: &Function) -> Allocation {
    let live = liveness::analyze(func);
    let param_names: HashSet<&str> = func.params.iter().filter_map(Value::name).collect();

    // value types and storage classes, in program order
    let mut order: Vec<String> = Vec::new();
    let mut types: HashMap<String, IrType> = HashMap::new();
    let mut array_lens: HashMap<String, i64> = HashMap::new();
    let record = |v: &Value, order: &mut Vec<String>, types: &mut HashMap<String, IrType>| {
        if let Value::Reg { name, ty } = v {
            if !types.contains_key(name) {
                types.insert(name.clone(), ty.clone());
                order.push(name.clone());
            }
        }
    };
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Some(result) = inst.result() {
                record(result, &mut order, &mut types);
            }
            inst.for_each_use(|v| record(v, &mut order, &mut types));
            if let Instruction::Alloca { result } = inst {
                if let (Some(name), Some(elem)) = (result.name(), result.ty().elem()) {
                    if elem.is_array() {
                        array_lens.insert(name.to_string(), elem.flat_len() as i64);
                    }
                }
            }
        }
    }

    let mut locations: HashMap<String, Location> = HashMap::new();
    let mut frame = FrameBuilder::default();
    let mut int_intervals: Vec<LiveInterval> = Vec::new();
    let mut float_intervals: Vec<LiveInterval> = Vec::new();

    for name in &order {
        if param_names.contains(name.as_str()) {
            continue;
        }
        let Some(&(start, end)) = live.intervals.get(name) else {
            // never read: no storage at all
            locations.insert(name.clone(), Location::Unused);
            continue;
        };
        if let Some(&len) = array_lens.get(name) {
            // the extra word holds the decayed base pointer itself
            let offset = frame.push((len + 1) * CallingConvention::WORD);
            locations.insert(name.clone(), Location::Stack(offset));
        } else if types[name].is_float() {
            float_intervals.push(LiveInterval::new(name.clone(), start, end));
        } else {
            int_intervals.push(LiveInterval::new(name.clone(), start, end));
        }
    }

    let (int_params, float_params) = param_counts(func);
    LinearScan::new(CallingConvention::int_pool(int_params)).run(
        &int_intervals,
        &mut frame,
        &mut locations,
    );
    LinearScan::new(CallingConvention::float_pool(float_params)).run(
        &float_intervals,
        &mut frame,
        &mut locations,
    );

    // caller-save slots at call sites
    let mut save_slots: HashMap<String, i64> = HashMap::new();
    let mut call_live: HashMap<(usize, usize), Vec<String>> = HashMap::new();
    let mut ra_slot = None;
    let mut position = 0usize;
    for (bid, block) in func.blocks.iter().enumerate() {
        for (idx, inst) in block.instructions.iter().enumerate() {
            position += 1;
            if !matches!(inst, Instruction::Call { .. }) {
                continue;
            }
            // the call's own result is live here but defined by the call;
            // everything else live in a register must be preserved
            let result_name = liveness::def_of(inst);
            let mut live_here = Vec::new();
            for name in &order {
                if Some(name) == result_name.as_ref() || !live.live_at(name, position) {
                    continue;
                }
                if matches!(locations.get(name), Some(Location::Register(_))) {
                    if !save_slots.contains_key(name) {
                        save_slots.insert(name.clone(), frame.push(CallingConvention::WORD));
                    }
                    live_here.push(name.clone());
                }
            }
            call_live.insert((bid, idx), live_here);
            if ra_slot.is_none() {
                ra_slot = Some(frame.push(CallingConvention::WORD));
            }
        }
    }

    Allocation {
        locations,
        save_slots,
        call_live,
        ra_slot,
        frame_units: frame.size(),
    }
}
