//! Configuration-space controller
//!
//! The 4 KiB region is a flat byte array partitioned into the Type-0
//! header, the PCIe and Power Management capabilities, legacy config
//! space, the AER extended capability and the remaining extended config
//! space. Region boundaries and field offsets are explicit constants;
//! nothing is derived from a struct layout.

use crate::regs::{
    Command, DeviceCaps, DeviceControl, ExpressCaps, ExtCapHeader, LinkCaps, LinkStatus, PmCaps,
    Status,
};

/// Total size of the configuration region
pub const CONFIG_SPACE_SIZE: usize = 4096;

/// End of the standard Type-0 header
pub const HEADER_END: u16 = 0x40;
/// Offset of the PCI Express capability
pub const PCIE_CAP_OFFSET: u16 = 0x40;
/// End of the PCI Express capability
pub const PCIE_CAP_END: u16 = PCIE_CAP_OFFSET + 0x14;
/// Offset of the Power Management capability
pub const PM_CAP_OFFSET: u16 = PCIE_CAP_END;
/// End of the Power Management capability
pub const PM_CAP_END: u16 = PM_CAP_OFFSET + 0x08;
/// End of the legacy (256-byte) configuration space
pub const LEGACY_CONFIG_END: u16 = 0x100;
/// Offset of the Advanced Error Reporting extended capability
pub const AER_CAP_OFFSET: u16 = 0x100;
/// End of the Advanced Error Reporting extended capability
pub const AER_CAP_END: u16 = AER_CAP_OFFSET + 0x2C;

/// Logical partitions of the region; accesses may not cross one of these
const REGION_BOUNDS: [(u16, u16); 6] = [
    (0x000, HEADER_END),
    (PCIE_CAP_OFFSET, PCIE_CAP_END),
    (PM_CAP_OFFSET, PM_CAP_END),
    (PM_CAP_END, LEGACY_CONFIG_END),
    (AER_CAP_OFFSET, AER_CAP_END),
    (AER_CAP_END, CONFIG_SPACE_SIZE as u16),
];

// Header field offsets
const VENDOR_ID_OFFSET: u16 = 0x00;
const DEVICE_ID_OFFSET: u16 = 0x02;
const COMMAND_OFFSET: u16 = 0x04;
const STATUS_OFFSET: u16 = 0x06;
const REVISION_ID_OFFSET: u16 = 0x08;
const PROG_IF_OFFSET: u16 = 0x09;
const SUBCLASS_OFFSET: u16 = 0x0A;
const CLASS_OFFSET: u16 = 0x0B;
const CACHE_LINE_SIZE_OFFSET: u16 = 0x0C;
const BAR0_OFFSET: u16 = 0x10;
const BAR1_OFFSET: u16 = 0x14;
const BAR2_OFFSET: u16 = 0x18;
const BAR3_OFFSET: u16 = 0x1C;
const BAR4_OFFSET: u16 = 0x20;
const BAR5_OFFSET: u16 = 0x24;
const EXPANSION_ROM_OFFSET: u16 = 0x30;
const CAP_POINTER_OFFSET: u16 = 0x34;
const INTERRUPT_LINE_OFFSET: u16 = 0x3C;

// PCIe capability field offsets
const EXPRESS_CAPS_OFFSET: u16 = PCIE_CAP_OFFSET + 0x02;
const DEVICE_CAPABILITIES_OFFSET: u16 = PCIE_CAP_OFFSET + 0x04;
const DEVICE_CONTROL_OFFSET: u16 = PCIE_CAP_OFFSET + 0x08;
const LINK_CAPABILITIES_OFFSET: u16 = PCIE_CAP_OFFSET + 0x0C;
const LINK_CONTROL_OFFSET: u16 = PCIE_CAP_OFFSET + 0x10;
const LINK_STATUS_OFFSET: u16 = PCIE_CAP_OFFSET + 0x12;

// Power Management capability field offsets
const PM_CAPABILITIES_OFFSET: u16 = PM_CAP_OFFSET + 0x02;
const PM_CONTROL_STATUS_OFFSET: u16 = PM_CAP_OFFSET + 0x04;

// AER field offsets
const AER_UNCORRECTABLE_SEVERITY_OFFSET: u16 = AER_CAP_OFFSET + 0x0C;
const AER_CORRECTABLE_MASK_OFFSET: u16 = AER_CAP_OFFSET + 0x14;

// Capability IDs
const CAP_ID_POWER_MANAGEMENT: u8 = 0x01;
const CAP_ID_PCI_EXPRESS: u8 = 0x10;
const EXT_CAP_ID_AER: u16 = 0x0001;

/// Write masks and sticky read-only bits. Offsets not listed here are
/// read-only in their entirety.
pub mod masks {
    /// Command register writable bits
    pub const COMMAND: u16 = 0x0446;
    /// Status register writable bits
    pub const STATUS: u16 = 0xFB00;
    /// BAR0 writable bits (16 MiB aligned, 32-bit window)
    pub const BAR0: u32 = 0xFF00_0000;
    /// BAR1 writable bits (low half of the 64-bit window)
    pub const BAR1: u32 = 0x8000_0000;
    /// BAR2 writable bits (high half of the 64-bit window)
    pub const BAR2: u32 = 0xFFFF_FFFF;
    /// BAR1 sticky bits: 64-bit, prefetchable memory
    pub const BAR1_READ_ONLY: u32 = 0x0000_000C;
    /// Expansion ROM BAR writable bits (address + enable)
    pub const EXPANSION_ROM: u32 = 0xFFFF_8001;
    /// Expansion ROM address bits
    pub const EXPANSION_ROM_ADDRESS: u32 = 0xFFFF_8000;
    /// Expansion ROM enable bit
    pub const EXPANSION_ROM_ENABLE: u32 = 0x0000_0001;
    /// PCIe Device Control writable bits
    pub const DEVICE_CONTROL: u16 = 0x7CFF;
    /// PCIe Link Control writable bits
    pub const LINK_CONTROL: u16 = 0x01C3;
    /// Power Management Control/Status writable bits
    pub const PM_CONTROL_STATUS: u16 = 0x0003;
}

/// BAR ID reported for the Expansion ROM window
pub const EXPANSION_ROM_BAR_ID: u8 = 0x7F;
/// BAR ID reported when no window claims an address
pub const INVALID_BAR_ID: u8 = 0xFF;

/// BAR0 window size (16 MiB, 32-bit, non-prefetchable)
pub const BAR0_WINDOW_SIZE: u64 = 16 * 1024 * 1024;
/// BAR1/BAR2 window size (2 GiB, 64-bit, prefetchable)
pub const BAR1_WINDOW_SIZE: u64 = 2 * 1024 * 1024 * 1024;
/// Expansion ROM window size (32 KiB)
pub const EXPANSION_ROM_SIZE: u64 = 32 * 1024;

const VENDOR_ID: u16 = 0xFFFD;
const DEVICE_ID: u16 = 0x0001;

/// The SoftGpu configuration-space controller.
///
/// All state lives in the flat `config` array; accessors read and write it
/// little-endian, exactly as a host would see it on the bus.
pub struct PciController {
    config: [u8; CONFIG_SPACE_SIZE],
}

impl PciController {
    /// Create a controller in its post-reset state.
    pub fn new() -> Self {
        let mut controller = Self {
            config: [0; CONFIG_SPACE_SIZE],
        };
        controller.init_config_header();
        controller.init_pcie_capability();
        controller.init_power_management_capability();
        controller.init_advanced_error_reporting_capability();
        controller
    }

    /// Read 1, 2 or 4 bytes at `address`, zero-extended to 32 bits.
    ///
    /// Returns 0 for sizes outside {1, 2, 4} and for accesses that straddle
    /// a partition boundary.
    pub fn config_read(&self, address: u16, size: u8) -> u32 {
        if !matches!(size, 1 | 2 | 4) {
            return 0;
        }

        let Some((_, end)) = region_containing(address) else {
            return 0;
        };
        if u32::from(address) + u32::from(size) > u32::from(end) {
            return 0;
        }

        let base = usize::from(address);
        let mut value = 0u32;
        for (i, &byte) in self.config[base..base + usize::from(size)].iter().enumerate() {
            value |= u32::from(byte) << (8 * i);
        }
        value
    }

    /// Write a recognized field at `address`.
    ///
    /// The access size must match the field width and only the field's
    /// writable bits take effect; everything else is silently dropped.
    pub fn config_write(&mut self, address: u16, size: u8, value: u32) {
        match (address, size) {
            (COMMAND_OFFSET, 2) => {
                self.write_u16(COMMAND_OFFSET, value as u16 & masks::COMMAND);
            }
            (STATUS_OFFSET, 2) => {
                self.write_u16(STATUS_OFFSET, value as u16 & masks::STATUS);
            }
            (CACHE_LINE_SIZE_OFFSET, 1) => {
                self.config[usize::from(CACHE_LINE_SIZE_OFFSET)] = value as u8;
            }
            (BAR0_OFFSET, 4) => {
                let stored = value & masks::BAR0;
                log::debug!("BAR0 programmed to {stored:#010X}");
                self.write_u32(BAR0_OFFSET, stored);
            }
            (BAR1_OFFSET, 4) => {
                let stored = (value & masks::BAR1) | masks::BAR1_READ_ONLY;
                log::debug!("BAR1 programmed to {stored:#010X}");
                self.write_u32(BAR1_OFFSET, stored);
            }
            (BAR2_OFFSET, 4) => {
                let stored = value & masks::BAR2;
                log::debug!("BAR2 programmed to {stored:#010X}");
                self.write_u32(BAR2_OFFSET, stored);
            }
            // BAR3..BAR5 are unimplemented and hardwired to zero
            (BAR3_OFFSET, 4) | (BAR4_OFFSET, 4) | (BAR5_OFFSET, 4) => {
                self.write_u32(address, 0);
            }
            (EXPANSION_ROM_OFFSET, 4) => {
                let stored = value & masks::EXPANSION_ROM;
                log::debug!("expansion ROM BAR programmed to {stored:#010X}");
                self.write_u32(EXPANSION_ROM_OFFSET, stored);
            }
            (INTERRUPT_LINE_OFFSET, 1) => {
                self.config[usize::from(INTERRUPT_LINE_OFFSET)] = value as u8;
            }
            (DEVICE_CONTROL_OFFSET, 2) => {
                self.write_u16(DEVICE_CONTROL_OFFSET, value as u16 & masks::DEVICE_CONTROL);
            }
            (LINK_CONTROL_OFFSET, 2) => {
                self.write_u16(LINK_CONTROL_OFFSET, value as u16 & masks::LINK_CONTROL);
            }
            (PM_CONTROL_STATUS_OFFSET, 2) => {
                self.write_u16(
                    PM_CONTROL_STATUS_OFFSET,
                    value as u16 & masks::PM_CONTROL_STATUS,
                );
            }
            _ => {
                log::trace!("config write to {address:#05X} (size {size}) dropped");
                return;
            }
        }
        log::trace!("config write {value:#010X} to {address:#05X} (size {size})");
    }

    /// The BAR ID whose window claims `address`, or [`INVALID_BAR_ID`].
    ///
    /// BAR0 and the Expansion ROM decode only below 4 GiB, with BAR0
    /// winning overlaps; the 64-bit BAR1/BAR2 pair is consulted afterwards.
    pub fn decode_bar(&self, address: u64) -> u8 {
        if address < 1 << 32 {
            let bar0 = self.bar0_base();
            if address >= bar0 && address < bar0 + BAR0_WINDOW_SIZE {
                return 0;
            }

            let rom = self.expansion_rom_base();
            if address >= rom && address < rom + EXPANSION_ROM_SIZE {
                return EXPANSION_ROM_BAR_ID;
            }
        }

        let bar1 = self.bar1_base();
        if address.checked_sub(bar1).is_some_and(|offset| offset < BAR1_WINDOW_SIZE) {
            return 1;
        }

        INVALID_BAR_ID
    }

    /// Offset of `address` inside the window of `bar`.
    ///
    /// Unknown BAR IDs return the address unchanged.
    pub fn bar_offset(&self, address: u64, bar: u8) -> u64 {
        match bar {
            0 => address.wrapping_sub(self.bar0_base()),
            1 => address.wrapping_sub(self.bar1_base()),
            EXPANSION_ROM_BAR_ID => address.wrapping_sub(self.expansion_rom_base()),
            _ => address,
        }
    }

    /// Current value of the Command register.
    pub fn command_register(&self) -> u16 {
        self.read_u16(COMMAND_OFFSET)
    }

    /// Whether the Expansion ROM enable bit is set.
    pub fn expansion_rom_enabled(&self) -> bool {
        self.read_u32(EXPANSION_ROM_OFFSET) & masks::EXPANSION_ROM_ENABLE != 0
    }

    fn bar0_base(&self) -> u64 {
        u64::from(self.read_u32(BAR0_OFFSET) & masks::BAR0)
    }

    fn bar1_base(&self) -> u64 {
        let high = u64::from(self.read_u32(BAR2_OFFSET) & masks::BAR2);
        let low = u64::from(self.read_u32(BAR1_OFFSET) & masks::BAR1);
        (high << 32) | low
    }

    fn expansion_rom_base(&self) -> u64 {
        u64::from(self.read_u32(EXPANSION_ROM_OFFSET) & masks::EXPANSION_ROM_ADDRESS)
    }

    fn init_config_header(&mut self) {
        self.write_u16(VENDOR_ID_OFFSET, VENDOR_ID);
        self.write_u16(DEVICE_ID_OFFSET, DEVICE_ID);
        self.write_u16(COMMAND_OFFSET, Command::empty().bits());
        self.write_u16(STATUS_OFFSET, Status::CAPABILITIES_LIST.bits());
        self.config[usize::from(REVISION_ID_OFFSET)] = 0x01;
        // Class 0x03 (display controller), prog-if 0x01
        self.config[usize::from(PROG_IF_OFFSET)] = 0x01;
        self.config[usize::from(SUBCLASS_OFFSET)] = 0x00;
        self.config[usize::from(CLASS_OFFSET)] = 0x03;
        // BAR0: memory, 32-bit, not prefetchable
        self.write_u32(BAR0_OFFSET, 0x0000_0000);
        // BAR1: memory, 64-bit, prefetchable; BAR2 holds the high half
        self.write_u32(BAR1_OFFSET, masks::BAR1_READ_ONLY);
        self.write_u32(BAR2_OFFSET, 0x0000_0000);
        // 32 KiB ROM, not enabled
        self.write_u32(EXPANSION_ROM_OFFSET, 0x0000_0000);
        self.config[usize::from(CAP_POINTER_OFFSET)] = PCIE_CAP_OFFSET as u8;
    }

    fn init_pcie_capability(&mut self) {
        self.config[usize::from(PCIE_CAP_OFFSET)] = CAP_ID_PCI_EXPRESS;
        self.config[usize::from(PCIE_CAP_OFFSET) + 1] = PM_CAP_OFFSET as u8;

        let mut caps = ExpressCaps::new(0);
        caps.set_capability_version(0x1);
        // Legacy endpoint, the type real consumer GPUs report
        caps.set_device_type(0b0001);
        self.write_u16(EXPRESS_CAPS_OFFSET, caps.bits());

        let mut device_caps = DeviceCaps::new(0);
        // 256-byte max payload
        device_caps.set_max_payload_supported(0b001);
        device_caps.set_extended_tag_field(true);
        // L0s: no limit, L1: up to 64 us
        device_caps.set_l0s_acceptable_latency(0b111);
        device_caps.set_l1_acceptable_latency(0b110);
        device_caps.set_role_based_error_reporting(true);
        self.write_u32(DEVICE_CAPABILITIES_OFFSET, device_caps.bits());

        let mut device_control = DeviceControl::new(0);
        device_control.set_relaxed_ordering(true);
        device_control.set_no_snoop(true);
        // 512-byte max read request, the defined default
        device_control.set_max_read_request_size(0b010);
        self.write_u16(DEVICE_CONTROL_OFFSET, device_control.bits());

        let mut link_caps = LinkCaps::new(0);
        link_caps.set_max_link_speed(0b0001);
        link_caps.set_max_link_width(8);
        // L0s only
        link_caps.set_aspm_support(0b01);
        link_caps.set_l0s_exit_latency(0b100);
        link_caps.set_l1_exit_latency(0b010);
        link_caps.set_clock_power_management(true);
        self.write_u32(LINK_CAPABILITIES_OFFSET, link_caps.bits());

        let mut link_status = LinkStatus::new(0);
        link_status.set_link_speed(0b0001);
        link_status.set_link_width(8);
        self.write_u16(LINK_STATUS_OFFSET, link_status.bits());
    }

    fn init_power_management_capability(&mut self) {
        self.config[usize::from(PM_CAP_OFFSET)] = CAP_ID_POWER_MANAGEMENT;
        self.config[usize::from(PM_CAP_OFFSET) + 1] = 0x00;

        // PCI PM 1.2, no D1/D2, no PME
        let mut pm_caps = PmCaps::new(0);
        pm_caps.set_version(0b011);
        self.write_u16(PM_CAPABILITIES_OFFSET, pm_caps.bits());
    }

    fn init_advanced_error_reporting_capability(&mut self) {
        let mut header = ExtCapHeader::new(0);
        header.set_capability_id(EXT_CAP_ID_AER);
        header.set_capability_version(0x1);
        header.set_next_capability(0);
        self.write_u32(AER_CAP_OFFSET, header.bits());

        self.write_u32(AER_UNCORRECTABLE_SEVERITY_OFFSET, 0x0006_2030);
        self.write_u32(AER_CORRECTABLE_MASK_OFFSET, 0x0000_2000);
    }

    fn read_u16(&self, offset: u16) -> u16 {
        let base = usize::from(offset);
        u16::from_le_bytes([self.config[base], self.config[base + 1]])
    }

    fn read_u32(&self, offset: u16) -> u32 {
        let base = usize::from(offset);
        u32::from_le_bytes([
            self.config[base],
            self.config[base + 1],
            self.config[base + 2],
            self.config[base + 3],
        ])
    }

    fn write_u16(&mut self, offset: u16, value: u16) {
        let base = usize::from(offset);
        self.config[base..base + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn write_u32(&mut self, offset: u16, value: u32) {
        let base = usize::from(offset);
        self.config[base..base + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for PciController {
    fn default() -> Self {
        Self::new()
    }
}

fn region_containing(address: u16) -> Option<(u16, u16)> {
    REGION_BOUNDS
        .iter()
        .copied()
        .find(|&(begin, end)| address >= begin && address < end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_lookup() {
        assert_eq!(region_containing(0x00), Some((0x000, 0x040)));
        assert_eq!(region_containing(0x3F), Some((0x000, 0x040)));
        assert_eq!(region_containing(0x40), Some((0x040, 0x054)));
        assert_eq!(region_containing(0x58), Some((0x054, 0x05C)));
        assert_eq!(region_containing(0xFF), Some((0x05C, 0x100)));
        assert_eq!(region_containing(0x100), Some((0x100, 0x12C)));
        assert_eq!(region_containing(0xFFF), Some((0x12C, 0x1000)));
        assert_eq!(region_containing(0x1000), None);
    }

    #[test]
    fn test_capability_field_offsets() {
        assert_eq!(DEVICE_CONTROL_OFFSET, 0x48);
        assert_eq!(LINK_CONTROL_OFFSET, 0x50);
        assert_eq!(PM_CONTROL_STATUS_OFFSET, 0x58);
        assert_eq!(AER_UNCORRECTABLE_SEVERITY_OFFSET, 0x10C);
        assert_eq!(AER_CORRECTABLE_MASK_OFFSET, 0x114);
    }
}
