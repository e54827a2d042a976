//! Dispatch units
//!
//! Each dispatch unit drives four replication contexts through a shared
//! instruction pointer. Per tick it gets six issue attempts; an attempt
//! fetches the next instruction, resolves per-replica registers, and only
//! issues when a unit of the required class is free and every required
//! register passes its hazard check. Failed attempts leave the instruction
//! pointer where it is.
//!
//! Both dispatch units of an SM observe one shared [`UnitBitmap`]. Unit 0
//! is always clocked first in a round, so when both want the last free
//! unit, unit 0 takes it and unit 1 sees the busy bit and retries next
//! cycle.

use crate::instruction::{
    FpuInstruction, IntInstruction, Lane, Lanes, LoadStoreInstruction, MemOp, Op, Program,
    UnitClass,
};
use crate::register_file::RegisterFile;
use crate::{FP_CORES, INT_FP_CORES, LDST_UNITS, REPLICATION_WIDTH};

/// First availability-bitmap bit of the load/store units
pub const LDST_AVAIL_OFFSET: u32 = 0;
/// First availability-bitmap bit of the FP cores
pub const FP_AVAIL_OFFSET: u32 = LDST_AVAIL_OFFSET + LDST_UNITS as u32;
/// First availability-bitmap bit of the combined integer/FP cores
pub const INT_FP_AVAIL_OFFSET: u32 = FP_AVAIL_OFFSET + FP_CORES as u32;
/// Total functional units tracked by the bitmap
pub const UNIT_COUNT: u32 = INT_FP_AVAIL_OFFSET + INT_FP_CORES as u32;

/// Availability bitmap over all functional units of an SM.
///
/// Owned by the SM and shared by both dispatch units; bit set = unit idle.
/// Both marking operations are idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitBitmap(u32);

impl UnitBitmap {
    /// A bitmap with every unit ready.
    pub fn all_ready() -> Self {
        Self((1 << UNIT_COUNT) - 1)
    }

    /// Whether `unit` is idle.
    pub fn is_ready(&self, unit: u32) -> bool {
        self.0 & (1 << unit) != 0
    }

    /// Mark `unit` busy.
    pub fn mark_busy(&mut self, unit: u32) {
        self.0 &= !(1 << unit);
    }

    /// Mark `unit` ready.
    pub fn mark_ready(&mut self, unit: u32) {
        self.0 |= 1 << unit;
    }

    /// Index, relative to `offset`, of the first ready unit in a range.
    pub fn first_ready(&self, offset: u32, count: u32) -> Option<u32> {
        (0..count).find(|index| self.is_ready(offset + index))
    }
}

/// Execution state of one replication context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Issuing normally
    Running,
    /// Deferred on a contested register
    Stalled,
    /// Disabled or past the end of its program
    Halted,
}

#[derive(Debug, Clone, Copy)]
struct ReplicationContext {
    base_register: u32,
    enabled: bool,
    state: ContextState,
}

impl ReplicationContext {
    const fn idle() -> Self {
        Self {
            base_register: 0,
            enabled: false,
            state: ContextState::Halted,
        }
    }
}

/// One instruction, resolved and ready to hand to a functional unit.
///
/// `Fpu` unit indices span both core banks: 0..8 are FP cores, 8..16 the
/// combined cores picking up FP overflow.
pub enum IssueRequest {
    /// An FP operation for an FP or combined core
    Fpu {
        /// Unit index in 0..16
        unit: u32,
        /// The resolved packet
        instr: FpuInstruction,
    },
    /// An integer operation for a combined core
    Int {
        /// Combined-core index in 0..8
        unit: u32,
        /// The resolved packet
        instr: IntInstruction,
    },
    /// A memory operation for a load/store unit
    LoadStore {
        /// Load/store unit index in 0..4
        unit: u32,
        /// The resolved packet
        instr: LoadStoreInstruction,
    },
}

/// One of the SM's two dispatch units.
pub struct DispatchUnit {
    port: u32,
    contexts: [ReplicationContext; REPLICATION_WIDTH],
    program: Option<Program>,
    ip: usize,
    issued_this_cycle: bool,
}

impl DispatchUnit {
    /// Create an idle dispatch unit for `port` (0 or 1).
    pub fn new(port: u32) -> Self {
        Self {
            port,
            contexts: [ReplicationContext::idle(); REPLICATION_WIDTH],
            program: None,
            ip: 0,
            issued_this_cycle: false,
        }
    }

    /// The dispatch port index.
    pub fn port(&self) -> u32 {
        self.port
    }

    /// Current instruction pointer (an index into the loaded program).
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Current state of every replication context.
    pub fn context_states(&self) -> [ContextState; REPLICATION_WIDTH] {
        let mut states = [ContextState::Halted; REPLICATION_WIDTH];
        for (state, ctx) in states.iter_mut().zip(&self.contexts) {
            *state = ctx.state;
        }
        states
    }

    /// Base register of every replication context.
    pub fn base_registers(&self) -> [u32; REPLICATION_WIDTH] {
        let mut bases = [0; REPLICATION_WIDTH];
        for (base, ctx) in bases.iter_mut().zip(&self.contexts) {
            *base = ctx.base_register;
        }
        bases
    }

    /// Load a program: which replicas run (`replication_mask`), their base
    /// registers, and the decoded instruction buffer. The instruction
    /// pointer restarts at the beginning of the buffer.
    pub fn load_ip(
        &mut self,
        replication_mask: u8,
        base_registers: [u32; REPLICATION_WIDTH],
        program: Program,
    ) {
        for (replica, ctx) in self.contexts.iter_mut().enumerate() {
            let enabled = replication_mask & (1 << replica) != 0;
            ctx.enabled = enabled;
            ctx.base_register = base_registers[replica];
            ctx.state = if enabled {
                ContextState::Running
            } else {
                ContextState::Halted
            };
        }
        self.ip = 0;
        self.program = Some(program);
        log::debug!("dispatch {} loaded program, mask {replication_mask:#06b}", self.port);
    }

    /// Start a new cycle: the unit may issue one instruction again.
    pub fn reset_cycle(&mut self) {
        self.issued_this_cycle = false;
    }

    /// One issue attempt against the shared availability bitmap.
    ///
    /// On success the affected registers are locked, the instruction
    /// pointer advances, and the resolved request is returned for the SM
    /// to commit. On any contention the attempt is abandoned with no state
    /// advanced (beyond context stall markers).
    pub fn clock(&mut self, regs: &mut RegisterFile, avail: &UnitBitmap) -> Option<IssueRequest> {
        if self.issued_this_cycle {
            return None;
        }
        let program = self.program.clone()?;
        if self.ip >= program.len() {
            self.halt_enabled_contexts();
            return None;
        }
        let instr = program[self.ip];

        let mut lanes = Lanes::new();
        for (replica, ctx) in self.contexts.iter().enumerate() {
            if !ctx.enabled {
                continue;
            }
            let base = ctx.base_register;
            let lane = Lane {
                replica: replica as u8,
                dst: base + u32::from(instr.dst),
                src_a: base + u32::from(instr.src_a),
                src_b: base + u32::from(instr.src_b),
            };
            if lanes.push(lane).is_err() {
                break;
            }
        }
        if lanes.is_empty() {
            return None;
        }

        let unit = match instr.unit_class() {
            UnitClass::LdSt => avail.first_ready(LDST_AVAIL_OFFSET, LDST_UNITS as u32),
            UnitClass::IntFp => avail.first_ready(INT_FP_AVAIL_OFFSET, INT_FP_CORES as u32),
            // FP work spills over to the combined cores when the dedicated
            // bank is fully busy
            UnitClass::Fp => avail.first_ready(FP_AVAIL_OFFSET, FP_CORES as u32).or_else(|| {
                avail
                    .first_ready(INT_FP_AVAIL_OFFSET, INT_FP_CORES as u32)
                    .map(|index| index + FP_CORES as u32)
            }),
        };
        let Some(unit) = unit else {
            log::trace!("dispatch {}: no {:?} unit free", self.port, instr.unit_class());
            return None;
        };

        let mut contested = false;
        for lane in &lanes {
            if lane_contested(instr.op, lane, regs) {
                self.contexts[lane.replica as usize].state = ContextState::Stalled;
                contested = true;
            }
        }
        if contested {
            log::trace!("dispatch {}: registers contested at ip {}", self.port, self.ip);
            return None;
        }

        for lane in &lanes {
            lock_lane(instr.op, lane, regs);
        }
        for ctx in self.contexts.iter_mut().filter(|ctx| ctx.enabled) {
            ctx.state = ContextState::Running;
        }
        self.ip += 1;
        self.issued_this_cycle = true;
        log::trace!("dispatch {} issued {:?} to unit slot {}", self.port, instr.op, unit);

        Some(match instr.op {
            Op::Fp(op) => IssueRequest::Fpu {
                unit,
                instr: FpuInstruction { op, lanes },
            },
            Op::Int(op) => IssueRequest::Int {
                unit,
                instr: IntInstruction { op, lanes },
            },
            Op::Mem(op) => IssueRequest::LoadStore {
                unit,
                instr: LoadStoreInstruction {
                    op,
                    imm: instr.imm,
                    lanes,
                },
            },
        })
    }

    fn halt_enabled_contexts(&mut self) {
        for ctx in self.contexts.iter_mut().filter(|ctx| ctx.enabled) {
            ctx.state = ContextState::Halted;
        }
    }
}

fn lane_contested(op: Op, lane: &Lane, regs: &RegisterFile) -> bool {
    match op {
        Op::Fp(_) | Op::Int(_) => {
            !regs.can_read(lane.src_a) || !regs.can_read(lane.src_b) || !regs.can_write(lane.dst)
        }
        Op::Mem(MemOp::Load) => !regs.can_read(lane.src_a) || !regs.can_write(lane.dst),
        Op::Mem(MemOp::Store) => !regs.can_read(lane.src_a) || !regs.can_read(lane.src_b),
    }
}

fn lock_lane(op: Op, lane: &Lane, regs: &mut RegisterFile) {
    match op {
        Op::Fp(_) | Op::Int(_) => {
            regs.lock_read(lane.src_a);
            regs.lock_read(lane.src_b);
            regs.lock_write(lane.dst);
        }
        Op::Mem(MemOp::Load) => {
            regs.lock_read(lane.src_a);
            regs.lock_write(lane.dst);
        }
        Op::Mem(MemOp::Store) => {
            regs.lock_read(lane.src_a);
            regs.lock_read(lane.src_b);
        }
    }
}
