//! FP and combined integer/FP cores
//!
//! Each core is a small state machine: `initiate` moves it from idle to
//! busy with a latency countdown, and every sub-cycle clock decrements the
//! countdown until the result commits to the register file. Completion is
//! returned to the SM, which marks the unit ready for both dispatch units.

use crate::instruction::{FpOp, FpuInstruction, IntInstruction, IntOp, Lanes};
use crate::register_file::RegisterFile;

/// Sub-cycles an FP operation occupies a core
pub const FP_LATENCY: u32 = 6;
/// Sub-cycles an integer operation occupies a combined core
pub const INT_LATENCY: u32 = 2;

fn eval_fp(op: FpOp, a: u32, b: u32) -> u32 {
    let x = f32::from_bits(a);
    let y = f32::from_bits(b);
    let result = match op {
        FpOp::Add => x + y,
        FpOp::Sub => x - y,
        FpOp::Mul => x * y,
        FpOp::Div => x / y,
        FpOp::Min => x.min(y),
        FpOp::Max => x.max(y),
    };
    result.to_bits()
}

fn eval_int(op: IntOp, a: u32, b: u32) -> u32 {
    match op {
        IntOp::Add => a.wrapping_add(b),
        IntOp::Sub => a.wrapping_sub(b),
        IntOp::And => a & b,
        IntOp::Or => a | b,
        IntOp::Xor => a ^ b,
        IntOp::Shl => a.wrapping_shl(b),
        IntOp::Shr => a.wrapping_shr(b),
    }
}

/// Commit one arithmetic packet: read operands, write results, drop locks.
///
/// Sources release before destinations so a register reused as source and
/// destination sheds its read hold before the write claim clears.
fn commit_arith(lanes: &Lanes, regs: &mut RegisterFile, eval: impl Fn(u32, u32) -> u32) {
    for lane in lanes {
        let result = eval(regs.get(lane.src_a), regs.get(lane.src_b));
        regs.set(lane.dst, result);
    }
    for lane in lanes {
        regs.release(lane.src_a);
        regs.release(lane.src_b);
    }
    for lane in lanes {
        regs.release(lane.dst);
    }
}

struct InFlightFp {
    latency: u32,
    instr: FpuInstruction,
}

/// A dedicated floating-point core.
pub struct FpCore {
    index: u32,
    in_flight: Option<InFlightFp>,
}

impl FpCore {
    /// Create an idle core with the given unit index.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            in_flight: None,
        }
    }

    /// Whether the core currently holds an instruction.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Accept an instruction. Returns false, without side effects, while
    /// busy.
    pub fn initiate(&mut self, instr: FpuInstruction) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        self.in_flight = Some(InFlightFp {
            latency: FP_LATENCY,
            instr,
        });
        true
    }

    /// Advance one sub-cycle. Returns the unit index on completion.
    pub fn clock(&mut self, sub_cycle: u32, regs: &mut RegisterFile) -> Option<u32> {
        let in_flight = self.in_flight.as_mut()?;
        in_flight.latency -= 1;
        if in_flight.latency > 0 {
            return None;
        }

        let instr = self.in_flight.take()?.instr;
        let op = instr.op;
        commit_arith(&instr.lanes, regs, |a, b| eval_fp(op, a, b));
        log::trace!("fp core {} committed {:?} at sub-cycle {}", self.index, op, sub_cycle);
        Some(self.index)
    }
}

enum IntFpWork {
    Fp(FpuInstruction),
    Int(IntInstruction),
}

struct InFlightIntFp {
    latency: u32,
    work: IntFpWork,
}

/// A combined integer/FP core.
///
/// Integer instructions dispatch only here; FP instructions spill over
/// from the dedicated cores when all of them are busy.
pub struct IntFpCore {
    index: u32,
    in_flight: Option<InFlightIntFp>,
}

impl IntFpCore {
    /// Create an idle core with the given unit index.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            in_flight: None,
        }
    }

    /// Whether the core currently holds an instruction.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Accept an FP instruction. Returns false while busy.
    pub fn initiate_fp(&mut self, instr: FpuInstruction) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        self.in_flight = Some(InFlightIntFp {
            latency: FP_LATENCY,
            work: IntFpWork::Fp(instr),
        });
        true
    }

    /// Accept an integer instruction. Returns false while busy.
    pub fn initiate_int(&mut self, instr: IntInstruction) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        self.in_flight = Some(InFlightIntFp {
            latency: INT_LATENCY,
            work: IntFpWork::Int(instr),
        });
        true
    }

    /// Advance one sub-cycle. Returns the unit index on completion.
    pub fn clock(&mut self, sub_cycle: u32, regs: &mut RegisterFile) -> Option<u32> {
        let in_flight = self.in_flight.as_mut()?;
        in_flight.latency -= 1;
        if in_flight.latency > 0 {
            return None;
        }

        match self.in_flight.take()?.work {
            IntFpWork::Fp(instr) => {
                let op = instr.op;
                commit_arith(&instr.lanes, regs, |a, b| eval_fp(op, a, b));
                log::trace!(
                    "int/fp core {} committed {:?} at sub-cycle {}",
                    self.index,
                    op,
                    sub_cycle
                );
            }
            IntFpWork::Int(instr) => {
                let op = instr.op;
                commit_arith(&instr.lanes, regs, |a, b| eval_int(op, a, b));
                log::trace!(
                    "int/fp core {} committed {:?} at sub-cycle {}",
                    self.index,
                    op,
                    sub_cycle
                );
            }
        }
        Some(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Lane;

    fn fp_packet(op: FpOp, dst: u32, src_a: u32, src_b: u32) -> FpuInstruction {
        let mut lanes = Lanes::new();
        lanes
            .push(Lane {
                replica: 0,
                dst,
                src_a,
                src_b,
            })
            .unwrap();
        FpuInstruction { op, lanes }
    }

    fn lock_lane(regs: &mut RegisterFile, dst: u32, src_a: u32, src_b: u32) {
        regs.lock_read(src_a);
        regs.lock_read(src_b);
        regs.lock_write(dst);
    }

    #[test]
    fn test_fp_core_commits_after_six_sub_cycles() {
        let mut regs = RegisterFile::new();
        regs.set(0, 1.5f32.to_bits());
        regs.set(1, 2.25f32.to_bits());
        lock_lane(&mut regs, 2, 0, 1);

        let mut core = FpCore::new(3);
        assert!(core.initiate(fp_packet(FpOp::Add, 2, 0, 1)));
        assert!(core.is_busy());
        // Still busy while the instruction is in the pipeline
        assert!(!core.initiate(fp_packet(FpOp::Add, 3, 0, 1)));

        for sub_cycle in 0..5 {
            assert_eq!(core.clock(sub_cycle, &mut regs), None);
        }
        assert_eq!(core.clock(5, &mut regs), Some(3));
        assert!(!core.is_busy());
        assert_eq!(f32::from_bits(regs.get(2)), 3.75);
        // All locks dropped at commit
        assert!(regs.can_write(0) && regs.can_write(1) && regs.can_write(2));
    }

    #[test]
    fn test_idle_core_does_not_report() {
        let mut regs = RegisterFile::new();
        let mut core = FpCore::new(0);
        for sub_cycle in 0..6 {
            assert_eq!(core.clock(sub_cycle, &mut regs), None);
        }
    }

    #[test]
    fn test_int_fp_core_integer_latency() {
        let mut regs = RegisterFile::new();
        regs.set(4, 0x0F0F);
        regs.set(5, 0x00FF);
        lock_lane(&mut regs, 6, 4, 5);

        let mut lanes = Lanes::new();
        lanes
            .push(Lane {
                replica: 0,
                dst: 6,
                src_a: 4,
                src_b: 5,
            })
            .unwrap();
        let mut core = IntFpCore::new(1);
        assert!(core.initiate_int(IntInstruction {
            op: IntOp::And,
            lanes
        }));

        assert_eq!(core.clock(0, &mut regs), None);
        assert_eq!(core.clock(1, &mut regs), Some(1));
        assert_eq!(regs.get(6), 0x000F);
    }

    #[test]
    fn test_int_fp_core_runs_fp_work() {
        let mut regs = RegisterFile::new();
        regs.set(0, 8.0f32.to_bits());
        regs.set(1, 2.0f32.to_bits());
        lock_lane(&mut regs, 2, 0, 1);

        let mut core = IntFpCore::new(0);
        assert!(core.initiate_fp(fp_packet(FpOp::Div, 2, 0, 1)));
        let mut completed = None;
        for sub_cycle in 0..6 {
            if let Some(unit) = core.clock(sub_cycle, &mut regs) {
                completed = Some((sub_cycle, unit));
            }
        }
        assert_eq!(completed, Some((5, 0)));
        assert_eq!(f32::from_bits(regs.get(2)), 4.0);
    }

    #[test]
    fn test_source_reused_as_destination() {
        let mut regs = RegisterFile::new();
        regs.set(10, 5.0f32.to_bits());
        regs.set(11, 7.0f32.to_bits());
        // dst aliases src_a: one read hold plus the write claim
        lock_lane(&mut regs, 10, 10, 11);

        let mut core = FpCore::new(0);
        assert!(core.initiate(fp_packet(FpOp::Mul, 10, 10, 11)));
        for sub_cycle in 0..6 {
            core.clock(sub_cycle, &mut regs);
        }
        assert_eq!(f32::from_bits(regs.get(10)), 35.0);
        assert!(regs.can_write(10) && regs.can_write(11));
    }
}
