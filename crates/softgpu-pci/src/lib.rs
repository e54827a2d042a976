//! softgpu-pci - PCIe configuration-space model for the SoftGpu device
//!
//! This crate owns the device's 4 KiB configuration region: the Type-0
//! header, the PCI Express and Power Management capabilities, and the
//! Advanced Error Reporting extended capability. Reads and writes are
//! byte-granular (1/2/4 bytes), write masks and read-only bits are applied
//! per field, and BAR address decode answers which window claims a given
//! bus address.
//!
//! The model never fails: malformed accesses read as 0 and invalid writes
//! are dropped, matching the master-abort behavior of real hardware.
//!
//! # Example
//!
//! ```
//! use softgpu_pci::PciController;
//!
//! let mut pci = PciController::new();
//! assert_eq!(pci.config_read(0x00, 4), 0x0001_FFFD);
//!
//! pci.config_write(0x10, 4, 0x1200_0000);
//! assert_eq!(pci.decode_bar(0x1234_5678), 0);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod controller;
pub mod regs;

pub use controller::PciController;
pub use regs::{Command, Status};
