//! Debugger attachment point
//!
//! When a probe is attached the SM reports its observable state at the top
//! of every tick, before any unit advances. Without one the reporting
//! phase is a no-op.

use crate::REPLICATION_WIDTH;

/// Receiver for per-tick state reports from an SM.
pub trait DebugProbe {
    /// All register values of the SM, in index order.
    fn report_registers(&mut self, sm_index: u32, registers: &[u32]);

    /// The base registers of one dispatch unit's replication contexts.
    fn report_base_registers(
        &mut self,
        sm_index: u32,
        port: u32,
        bases: &[u32; REPLICATION_WIDTH],
    );
}
