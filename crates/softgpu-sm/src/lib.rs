//! softgpu-sm - Streaming-multiprocessor execution core
//!
//! A per-cycle model of one SM: a hazard-tracked register file, eight FP
//! cores, eight combined integer/FP cores, four load/store units and two
//! dispatch units that issue instructions under register and unit
//! availability constraints. One [`StreamingMultiprocessor::clock`] call is
//! one device clock tick; arithmetic units advance through six sub-cycles
//! inside it.
//!
//! The memory hierarchy behind the load/store units is external and reached
//! through the [`MemoryBus`] trait, passed into `clock` by the caller.
//!
//! # Example
//!
//! ```ignore
//! use softgpu_sm::{FpOp, Instruction, StreamingMultiprocessor};
//!
//! let mut sm = StreamingMultiprocessor::new(0);
//! let program: softgpu_sm::Program =
//!     [Instruction::fp(FpOp::Add, 2, 0, 1)].into();
//! sm.test_load_program(0, 0x1, program);
//! sm.clock(&mut bus);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

pub mod bus;
pub mod cores;
pub mod debug;
pub mod dispatch;
pub mod instruction;
pub mod load_store;
pub mod register_file;
pub mod sm;

pub use bus::MemoryBus;
pub use debug::DebugProbe;
pub use dispatch::{ContextState, DispatchUnit, UnitBitmap};
pub use instruction::{FpOp, Instruction, IntOp, MemOp, Op, Program, UnitClass};
pub use register_file::RegisterFile;
pub use sm::StreamingMultiprocessor;

/// FP cores per SM
pub const FP_CORES: usize = 8;
/// Combined integer/FP cores per SM
pub const INT_FP_CORES: usize = 8;
/// Load/store units per SM
pub const LDST_UNITS: usize = 4;
/// Dispatch units per SM
pub const DISPATCH_UNITS: usize = 2;
/// Replication contexts per dispatch unit
pub const REPLICATION_WIDTH: usize = 4;
/// Registers addressable by one replication context
pub const REGISTERS_PER_CONTEXT: u32 = 256;
/// Total registers in the SM register file
pub const REGISTER_FILE_SIZE: usize =
    DISPATCH_UNITS * REPLICATION_WIDTH * REGISTERS_PER_CONTEXT as usize;
/// Sub-cycles per clock tick
pub const SUB_CYCLES: u32 = 6;
/// Issue attempts per dispatch unit per tick
pub const ISSUE_ROUNDS: u32 = 6;
