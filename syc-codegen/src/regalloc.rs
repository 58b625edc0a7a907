//! Linear-scan register allocation
//!
//! Works over named live intervals, one register class at a time. Intervals
//! are processed in increasing start order; an `active` list sorted by end
//! point tracks what currently holds a register, expired entries free their
//! register, and when the pool is dry the interval ending last is the one
//! that spills.

use crate::asm::Reg;
use std::collections::HashMap;

/// Where a value lives for its whole lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Register(Reg),
    /// Stack offset in 4-byte allocator units; the emitter doubles this
    /// into the real 8-byte-slot frame offset
    Stack(i64),
    /// Never read; no storage, skipped entirely by the emitter
    Unused,
}

/// `[start, end]` span of a value in the global instruction counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInterval {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl LiveInterval {
    pub fn new(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Grows the frame in 4-byte allocator units and hands out offsets.
/// An offset is the unit position just past the pushed storage, matching
/// the downward-growing frame the emitter addresses off `sp`.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    size: i64,
}

impl FrameBuilder {
    pub fn push(&mut self, bytes: i64) -> i64 {
        self.size += bytes;
        self.size
    }

    /// Final stack pointer in allocator units
    pub fn size(&self) -> i64 {
        self.size
    }
}

/// One linear-scan run over a single register class
pub struct LinearScan {
    pool: Vec<Reg>,
}

struct Active {
    name: String,
    end: usize,
    reg_index: usize,
}

impl LinearScan {
    pub fn new(pool: Vec<Reg>) -> Self {
        Self { pool }
    }

    /// Assign every interval a register or a stack slot.
    pub fn run(
        &self,
        intervals: &[LiveInterval],
        frame: &mut FrameBuilder,
        locations: &mut HashMap<String, Location>,
    ) {
        let mut sorted: Vec<&LiveInterval> = intervals.iter().collect();
        sorted.sort_by_key(|iv| iv.start);

        let mut free: Vec<bool> = vec![true; self.pool.len()];
        let mut active: Vec<Active> = Vec::new();

        for interval in sorted {
            // expire entries whose end point has passed
            active.retain(|a| {
                if a.end < interval.start {
                    free[a.reg_index] = true;
                    false
                } else {
                    true
                }
            });

            if active.len() >= self.pool.len() {
                self.spill(interval, &mut active, frame, locations);
            } else if let Some(reg_index) = free.iter().position(|&f| f) {
                free[reg_index] = false;
                locations.insert(
                    interval.name.clone(),
                    Location::Register(self.pool[reg_index]),
                );
                insert_by_end(
                    &mut active,
                    Active {
                        name: interval.name.clone(),
                        end: interval.end,
                        reg_index,
                    },
                );
            }
        }
    }

    /// Whichever of {the new interval, the active interval ending last}
    /// ends later goes to the stack; the other keeps or takes the register.
    fn spill(
        &self,
        interval: &LiveInterval,
        active: &mut Vec<Active>,
        frame: &mut FrameBuilder,
        locations: &mut HashMap<String, Location>,
    ) {
        let last = active
            .last()
            .expect("spill is only reached with a full active list");
        if interval.end > last.end {
            let offset = frame.push(super::abi::CallingConvention::WORD);
            locations.insert(interval.name.clone(), Location::Stack(offset));
        } else {
            let reg_index = last.reg_index;
            let loser = active.pop().expect("active list is non-empty");
            locations.insert(
                interval.name.clone(),
                Location::Register(self.pool[reg_index]),
            );
            let offset = frame.push(super::abi::CallingConvention::WORD);
            locations.insert(loser.name, Location::Stack(offset));
            insert_by_end(
                active,
                Active {
                    name: interval.name.clone(),
                    end: interval.end,
                    reg_index,
                },
            );
        }
    }
}

fn insert_by_end(active: &mut Vec<Active>, entry: Active) {
    let pos = active
        .iter()
        .position(|a| a.end > entry.end)
        .unwrap_or(active.len());
    active.insert(pos, entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn regs(n: usize) -> Vec<Reg> {
        (1..=n).map(Reg::saved).collect()
    }

    #[test]
    fn test_interval_overlap() {
        let a = LiveInterval::new("a", 0, 10);
        let b = LiveInterval::new("b", 5, 15);
        let c = LiveInterval::new("c", 12, 20);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&c));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_overlapping_intervals_get_distinct_registers() {
        let scan = LinearScan::new(regs(4));
        let intervals = vec![
            LiveInterval::new("a", 1, 5),
            LiveInterval::new("b", 2, 8),
            LiveInterval::new("c", 3, 9),
        ];
        let mut frame = FrameBuilder::default();
        let mut locations = HashMap::new();
        scan.run(&intervals, &mut frame, &mut locations);

        let mut seen = Vec::new();
        for name in ["a", "b", "c"] {
            match &locations[name] {
                Location::Register(r) => {
                    assert!(!seen.contains(r), "register {} reused while live", r);
                    seen.push(*r);
                }
                other => panic!("expected register for {}, got {:?}", name, other),
            }
        }
        assert_eq!(frame.size(), 0);
    }

    #[test]
    fn test_expired_interval_frees_its_register() {
        let scan = LinearScan::new(regs(1));
        let intervals = vec![LiveInterval::new("a", 1, 3), LiveInterval::new("b", 5, 9)];
        let mut frame = FrameBuilder::default();
        let mut locations = HashMap::new();
        scan.run(&intervals, &mut frame, &mut locations);
        assert_eq!(locations["a"], Location::Register(Reg::saved(1)));
        assert_eq!(locations["b"], Location::Register(Reg::saved(1)));
    }

    #[test]
    fn test_latest_ending_interval_spills() {
        let scan = LinearScan::new(regs(1));
        // "long" ends last, so it spills when "short" arrives
        let intervals = vec![LiveInterval::new("long", 1, 100), LiveInterval::new("short", 2, 3)];
        let mut frame = FrameBuilder::default();
        let mut locations = HashMap::new();
        scan.run(&intervals, &mut frame, &mut locations);
        assert_eq!(locations["long"], Location::Stack(4));
        assert_eq!(locations["short"], Location::Register(Reg::saved(1)));
        assert_eq!(frame.size(), 4);
    }

    #[test]
    fn test_new_interval_spills_itself_when_it_ends_last() {
        let scan = LinearScan::new(regs(1));
        let intervals = vec![LiveInterval::new("short", 1, 4), LiveInterval::new("long", 2, 100)];
        let mut frame = FrameBuilder::default();
        let mut locations = HashMap::new();
        scan.run(&intervals, &mut frame, &mut locations);
        assert_eq!(locations["short"], Location::Register(Reg::saved(1)));
        assert_eq!(locations["long"], Location::Stack(4));
    }

    #[test]
    fn test_no_two_overlapping_share_a_register_under_pressure() {
        let scan = LinearScan::new(regs(2));
        let intervals: Vec<LiveInterval> = (0..6)
            .map(|i| LiveInterval::new(format!("v{}", i), i, i + 4))
            .collect();
        let mut frame = FrameBuilder::default();
        let mut locations = HashMap::new();
        scan.run(&intervals, &mut frame, &mut locations);

        for a in &intervals {
            for b in &intervals {
                if a.name == b.name || !a.overlaps(b) {
                    continue;
                }
                if let (Location::Register(ra), Location::Register(rb)) =
                    (&locations[&a.name], &locations[&b.name])
                {
                    assert_ne!(ra, rb, "{} and {} overlap in {}", a.name, b.name, ra);
                }
            }
        }
    }
}
