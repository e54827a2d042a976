//! The streaming multiprocessor
//!
//! Composes the register file, the functional units and the two dispatch
//! units, and drives them through the fixed six-phase tick:
//!
//! 1. debug reporting
//! 2. load/store units (one clock each)
//! 3. arithmetic cores, six sub-cycles
//! 4. dispatch per-cycle reset
//! 5. six issue rounds, dispatch unit 0 before unit 1 in each
//!
//! Units finishing in phases 2–3 are marked ready before phase 5 runs, so
//! an instruction can reuse a unit the same tick it frees up.

use alloc::boxed::Box;

use crate::bus::MemoryBus;
use crate::cores::{FpCore, IntFpCore};
use crate::debug::DebugProbe;
use crate::dispatch::{
    DispatchUnit, IssueRequest, UnitBitmap, FP_AVAIL_OFFSET, INT_FP_AVAIL_OFFSET,
    LDST_AVAIL_OFFSET,
};
use crate::load_store::LoadStore;
use crate::register_file::RegisterFile;
use crate::{
    ContextState, DISPATCH_UNITS, FP_CORES, INT_FP_CORES, ISSUE_ROUNDS, LDST_UNITS,
    REGISTERS_PER_CONTEXT, REPLICATION_WIDTH, SUB_CYCLES,
};

use crate::instruction::Program;

/// One streaming multiprocessor of the SoftGpu device.
pub struct StreamingMultiprocessor {
    sm_index: u32,
    register_file: RegisterFile,
    ldst_units: [LoadStore; LDST_UNITS],
    fp_cores: [FpCore; FP_CORES],
    int_fp_cores: [IntFpCore; INT_FP_CORES],
    dispatch_units: [DispatchUnit; DISPATCH_UNITS],
    unit_avail: UnitBitmap,
    debug: Option<Box<dyn DebugProbe>>,
}

impl StreamingMultiprocessor {
    /// Create an idle SM with the given index.
    pub fn new(sm_index: u32) -> Self {
        Self {
            sm_index,
            register_file: RegisterFile::new(),
            ldst_units: core::array::from_fn(|index| LoadStore::new(index as u32)),
            fp_cores: core::array::from_fn(|index| FpCore::new(index as u32)),
            int_fp_cores: core::array::from_fn(|index| IntFpCore::new(index as u32)),
            dispatch_units: core::array::from_fn(|index| DispatchUnit::new(index as u32)),
            unit_avail: UnitBitmap::all_ready(),
            debug: None,
        }
    }

    /// Advance the SM by one clock tick against the given memory bus.
    pub fn clock<M: MemoryBus>(&mut self, bus: &mut M) {
        if let Some(probe) = self.debug.as_deref_mut() {
            probe.report_registers(self.sm_index, self.register_file.values());
            for du in &self.dispatch_units {
                probe.report_base_registers(self.sm_index, du.port(), &du.base_registers());
            }
        }

        for unit in &mut self.ldst_units {
            if let Some(index) = unit.clock(&mut self.register_file, bus) {
                self.unit_avail.mark_ready(LDST_AVAIL_OFFSET + index);
            }
        }

        for sub_cycle in 0..SUB_CYCLES {
            for core in &mut self.fp_cores {
                if let Some(index) = core.clock(sub_cycle, &mut self.register_file) {
                    self.unit_avail.mark_ready(FP_AVAIL_OFFSET + index);
                }
            }
            for core in &mut self.int_fp_cores {
                if let Some(index) = core.clock(sub_cycle, &mut self.register_file) {
                    self.unit_avail.mark_ready(INT_FP_AVAIL_OFFSET + index);
                }
            }
        }

        for du in &mut self.dispatch_units {
            du.reset_cycle();
        }

        for _ in 0..ISSUE_ROUNDS {
            for port in 0..DISPATCH_UNITS {
                let request =
                    self.dispatch_units[port].clock(&mut self.register_file, &self.unit_avail);
                if let Some(request) = request {
                    self.commit_issue(request, bus);
                }
            }
        }
    }

    fn commit_issue<M: MemoryBus>(&mut self, request: IssueRequest, bus: &mut M) {
        match request {
            IssueRequest::Fpu { unit, instr } => {
                let accepted = if (unit as usize) < FP_CORES {
                    self.unit_avail.mark_busy(FP_AVAIL_OFFSET + unit);
                    self.fp_cores[unit as usize].initiate(instr)
                } else {
                    let index = unit - FP_CORES as u32;
                    self.unit_avail.mark_busy(INT_FP_AVAIL_OFFSET + index);
                    self.int_fp_cores[index as usize].initiate_fp(instr)
                };
                debug_assert!(accepted, "issue to a busy FP unit");
            }
            IssueRequest::Int { unit, instr } => {
                self.unit_avail.mark_busy(INT_FP_AVAIL_OFFSET + unit);
                let accepted = self.int_fp_cores[unit as usize].initiate_int(instr);
                debug_assert!(accepted, "issue to a busy combined core");
            }
            IssueRequest::LoadStore { unit, instr } => {
                self.unit_avail.mark_busy(LDST_AVAIL_OFFSET + unit);
                let accepted =
                    self.ldst_units[unit as usize].execute(instr, &self.register_file, bus);
                debug_assert!(accepted, "issue to a busy load/store unit");
            }
        }
    }

    /// Attach a debugger probe; state is reported at the top of every tick.
    pub fn attach_debugger(&mut self, probe: Box<dyn DebugProbe>) {
        self.debug = Some(probe);
    }

    /// Detach the debugger probe, if any.
    pub fn detach_debugger(&mut self) {
        self.debug = None;
    }

    /// Load a program onto a dispatch port.
    ///
    /// Replica `r` of port `p` gets base register `(p * 4 + r) * 256`, so
    /// the eight replication contexts tile the register file.
    pub fn test_load_program(&mut self, port: u32, replication_mask: u8, program: Program) {
        let bases: [u32; REPLICATION_WIDTH] =
            core::array::from_fn(|replica| (port * 4 + replica as u32) * REGISTERS_PER_CONTEXT);
        self.dispatch_units[port as usize].load_ip(replication_mask, bases, program);
    }

    /// Write a register of one replication context directly.
    pub fn test_load_register(&mut self, port: u32, replica: u32, index: u8, value: u32) {
        let register = (port * 4 + replica) * REGISTERS_PER_CONTEXT + u32::from(index);
        self.register_file.set(register, value);
    }

    /// Unchecked read of an absolute register.
    pub fn register(&self, index: u32) -> u32 {
        self.register_file.get(index)
    }

    /// Unchecked write of an absolute register.
    pub fn set_register(&mut self, index: u32, value: u32) {
        self.register_file.set(index, value);
    }

    /// All register values, in index order.
    pub fn registers(&self) -> &[u32] {
        self.register_file.values()
    }

    /// Instruction pointer of a dispatch port.
    pub fn dispatch_ip(&self, port: u32) -> usize {
        self.dispatch_units[port as usize].ip()
    }

    /// Context states of a dispatch port.
    pub fn context_states(&self, port: u32) -> [ContextState; REPLICATION_WIDTH] {
        self.dispatch_units[port as usize].context_states()
    }

    /// Whether a unit is idle in the shared availability bitmap.
    pub fn unit_is_ready(&self, unit: u32) -> bool {
        self.unit_avail.is_ready(unit)
    }
}
