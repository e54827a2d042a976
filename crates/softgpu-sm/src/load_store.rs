//! Load/store units
//!
//! Unlike the arithmetic cores, load/store units are clocked once per tick
//! and their latency depends on the memory hierarchy: a load issues
//! prefetches when it is accepted and then polls the bus until every line
//! has landed. While any line is in flight the unit stays busy and the
//! dispatch units see it as unavailable.

use crate::bus::MemoryBus;
use crate::instruction::{Lane, LoadStoreInstruction, MemOp};
use crate::register_file::RegisterFile;

/// Ticks between acceptance of a load and its memory access
pub const LOAD_LATENCY_TICKS: u32 = 2;
/// Ticks between acceptance of a store and its memory access
pub const STORE_LATENCY_TICKS: u32 = 1;

struct InFlightMem {
    remaining: u32,
    instr: LoadStoreInstruction,
}

/// One load/store unit.
pub struct LoadStore {
    index: u32,
    in_flight: Option<InFlightMem>,
}

impl LoadStore {
    /// Create an idle unit with the given unit index.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            in_flight: None,
        }
    }

    /// Whether the unit currently holds an instruction.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Accept a memory instruction; loads prefetch their lines up front.
    /// Returns false, without side effects, while busy.
    pub fn execute<M: MemoryBus>(
        &mut self,
        instr: LoadStoreInstruction,
        regs: &RegisterFile,
        bus: &mut M,
    ) -> bool {
        if self.in_flight.is_some() {
            return false;
        }

        if instr.op == MemOp::Load {
            for lane in &instr.lanes {
                bus.prefetch(lane_address(lane, regs, instr.imm));
            }
        }

        let remaining = match instr.op {
            MemOp::Load => LOAD_LATENCY_TICKS,
            MemOp::Store => STORE_LATENCY_TICKS,
        };
        self.in_flight = Some(InFlightMem { remaining, instr });
        true
    }

    /// Advance one tick. Returns the unit index on completion.
    pub fn clock<M: MemoryBus>(&mut self, regs: &mut RegisterFile, bus: &mut M) -> Option<u32> {
        let in_flight = self.in_flight.as_mut()?;
        if in_flight.remaining > 1 {
            in_flight.remaining -= 1;
            return None;
        }

        // At the access tick; stall while the hierarchy still owns a line.
        // Poll every lane so a slow line keeps aging.
        let mut stalled = false;
        for lane in &in_flight.instr.lanes {
            if bus.in_flight(lane_address(lane, regs, in_flight.instr.imm)) {
                stalled = true;
            }
        }
        if stalled {
            log::trace!("load/store unit {} stalled on memory", self.index);
            return None;
        }

        let instr = self.in_flight.take()?.instr;
        match instr.op {
            MemOp::Load => {
                for lane in &instr.lanes {
                    let value = bus.read(lane_address(lane, regs, instr.imm));
                    regs.set(lane.dst, value);
                }
                for lane in &instr.lanes {
                    regs.release(lane.src_a);
                }
                for lane in &instr.lanes {
                    regs.release(lane.dst);
                }
            }
            MemOp::Store => {
                for lane in &instr.lanes {
                    bus.write(lane_address(lane, regs, instr.imm), regs.get(lane.src_b));
                }
                for lane in &instr.lanes {
                    regs.release(lane.src_a);
                    regs.release(lane.src_b);
                }
            }
        }
        log::trace!("load/store unit {} committed {:?}", self.index, instr.op);
        Some(self.index)
    }
}

fn lane_address(lane: &Lane, regs: &RegisterFile, imm: u16) -> u64 {
    u64::from(regs.get(lane.src_a)) + u64::from(imm)
}
