//! Packed hardware register accessors
//!
//! Each PCIe register is kept as an opaque `u16`/`u32` with named accessor
//! methods instead of a bitfield struct, so the stored layout never depends
//! on the compiler.

use bit_field::BitField;
use bitflags::bitflags;

bitflags! {
    /// Command register at offset 0x04
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Command: u16 {
        /// Respond to I/O space accesses
        const IO_SPACE              = 1 << 0;
        /// Respond to memory space accesses
        const MEMORY_SPACE          = 1 << 1;
        /// Generate bus-master transactions
        const BUS_MASTER            = 1 << 2;
        /// Monitor special cycles
        const SPECIAL_CYCLES        = 1 << 3;
        /// Generate the Memory Write and Invalidate command
        const MEMORY_WRITE_INVALIDATE = 1 << 4;
        /// VGA palette snooping
        const VGA_PALETTE_SNOOP     = 1 << 5;
        /// Respond to detected parity errors
        const PARITY_ERROR_RESPONSE = 1 << 6;
        /// Drive SERR#
        const SERR_ENABLE           = 1 << 8;
        /// Allow fast back-to-back transactions
        const FAST_BACK_TO_BACK     = 1 << 9;
        /// Mask legacy INTx assertion
        const INTERRUPT_DISABLE     = 1 << 10;
    }
}

bitflags! {
    /// Status register at offset 0x06
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u16 {
        /// An INTx interrupt is pending
        const INTERRUPT_STATUS      = 1 << 3;
        /// A capability list hangs off offset 0x34
        const CAPABILITIES_LIST     = 1 << 4;
        /// Master data parity error observed
        const MASTER_DATA_PARITY    = 1 << 8;
        /// Signalled Target-Abort
        const SIGNALLED_TARGET_ABORT = 1 << 11;
        /// Received Target-Abort
        const RECEIVED_TARGET_ABORT = 1 << 12;
        /// Received Master-Abort
        const RECEIVED_MASTER_ABORT = 1 << 13;
        /// Signalled SERR#
        const SIGNALLED_SYSTEM_ERROR = 1 << 14;
        /// Parity error detected
        const DETECTED_PARITY_ERROR = 1 << 15;
    }
}

/// PCI Express Capabilities register (offset +0x02 in the capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressCaps(u16);

impl ExpressCaps {
    /// Wrap a raw register value
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Capability structure version
    pub fn capability_version(self) -> u8 {
        self.0.get_bits(0..4) as u8
    }

    /// Set the capability structure version
    pub fn set_capability_version(&mut self, version: u8) {
        self.0.set_bits(0..4, u16::from(version));
    }

    /// Device/port type (0b0001 = legacy PCI Express endpoint)
    pub fn device_type(self) -> u8 {
        self.0.get_bits(4..8) as u8
    }

    /// Set the device/port type
    pub fn set_device_type(&mut self, device_type: u8) {
        self.0.set_bits(4..8, u16::from(device_type));
    }

    /// Slot implemented
    pub fn slot_implemented(self) -> bool {
        self.0.get_bit(8)
    }

    /// Interrupt message number
    pub fn interrupt_message_number(self) -> u8 {
        self.0.get_bits(9..14) as u8
    }
}

/// Device Capabilities register (offset +0x04 in the PCIe capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps(u32);

impl DeviceCaps {
    /// Wrap a raw register value
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Largest supported TLP payload (0b001 = 256 bytes)
    pub fn max_payload_supported(self) -> u8 {
        self.0.get_bits(0..3) as u8
    }

    /// Set the largest supported TLP payload
    pub fn set_max_payload_supported(&mut self, encoding: u8) {
        self.0.set_bits(0..3, u32::from(encoding));
    }

    /// Phantom functions supported
    pub fn phantom_functions(self) -> u8 {
        self.0.get_bits(3..5) as u8
    }

    /// Extended tag field supported
    pub fn extended_tag_field(self) -> bool {
        self.0.get_bit(5)
    }

    /// Set extended tag field support
    pub fn set_extended_tag_field(&mut self, supported: bool) {
        self.0.set_bit(5, supported);
    }

    /// Acceptable L0s exit latency for the endpoint
    pub fn l0s_acceptable_latency(self) -> u8 {
        self.0.get_bits(6..9) as u8
    }

    /// Set the acceptable L0s exit latency
    pub fn set_l0s_acceptable_latency(&mut self, encoding: u8) {
        self.0.set_bits(6..9, u32::from(encoding));
    }

    /// Acceptable L1 exit latency for the endpoint
    pub fn l1_acceptable_latency(self) -> u8 {
        self.0.get_bits(9..12) as u8
    }

    /// Set the acceptable L1 exit latency
    pub fn set_l1_acceptable_latency(&mut self, encoding: u8) {
        self.0.set_bits(9..12, u32::from(encoding));
    }

    /// Role-based error reporting supported
    pub fn role_based_error_reporting(self) -> bool {
        self.0.get_bit(15)
    }

    /// Set role-based error reporting support
    pub fn set_role_based_error_reporting(&mut self, supported: bool) {
        self.0.set_bit(15, supported);
    }
}

/// Device Control register (offset +0x08 in the PCIe capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceControl(u16);

impl DeviceControl {
    /// Wrap a raw register value
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Relaxed ordering enabled
    pub fn relaxed_ordering(self) -> bool {
        self.0.get_bit(4)
    }

    /// Enable relaxed ordering
    pub fn set_relaxed_ordering(&mut self, enabled: bool) {
        self.0.set_bit(4, enabled);
    }

    /// Negotiated TLP payload limit
    pub fn max_payload(self) -> u8 {
        self.0.get_bits(5..8) as u8
    }

    /// Set the negotiated TLP payload limit
    pub fn set_max_payload(&mut self, encoding: u8) {
        self.0.set_bits(5..8, u16::from(encoding));
    }

    /// No-snoop transactions enabled
    pub fn no_snoop(self) -> bool {
        self.0.get_bit(11)
    }

    /// Enable no-snoop transactions
    pub fn set_no_snoop(&mut self, enabled: bool) {
        self.0.set_bit(11, enabled);
    }

    /// Largest read request the device will issue (0b010 = 512 bytes)
    pub fn max_read_request_size(self) -> u8 {
        self.0.get_bits(12..15) as u8
    }

    /// Set the largest read request the device will issue
    pub fn set_max_read_request_size(&mut self, encoding: u8) {
        self.0.set_bits(12..15, u16::from(encoding));
    }
}

/// Link Capabilities register (offset +0x0C in the PCIe capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCaps(u32);

impl LinkCaps {
    /// Wrap a raw register value
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Maximum link speed encoding (1 = 2.5 GT/s)
    pub fn max_link_speed(self) -> u8 {
        self.0.get_bits(0..4) as u8
    }

    /// Set the maximum link speed encoding
    pub fn set_max_link_speed(&mut self, encoding: u8) {
        self.0.set_bits(0..4, u32::from(encoding));
    }

    /// Maximum link width in lanes
    pub fn max_link_width(self) -> u8 {
        self.0.get_bits(4..10) as u8
    }

    /// Set the maximum link width in lanes
    pub fn set_max_link_width(&mut self, lanes: u8) {
        self.0.set_bits(4..10, u32::from(lanes));
    }

    /// ASPM support encoding (0b01 = L0s only)
    pub fn aspm_support(self) -> u8 {
        self.0.get_bits(10..12) as u8
    }

    /// Set the ASPM support encoding
    pub fn set_aspm_support(&mut self, encoding: u8) {
        self.0.set_bits(10..12, u32::from(encoding));
    }

    /// L0s exit latency encoding
    pub fn l0s_exit_latency(self) -> u8 {
        self.0.get_bits(12..15) as u8
    }

    /// Set the L0s exit latency encoding
    pub fn set_l0s_exit_latency(&mut self, encoding: u8) {
        self.0.set_bits(12..15, u32::from(encoding));
    }

    /// L1 exit latency encoding
    pub fn l1_exit_latency(self) -> u8 {
        self.0.get_bits(15..18) as u8
    }

    /// Set the L1 exit latency encoding
    pub fn set_l1_exit_latency(&mut self, encoding: u8) {
        self.0.set_bits(15..18, u32::from(encoding));
    }

    /// Clock power management supported
    pub fn clock_power_management(self) -> bool {
        self.0.get_bit(18)
    }

    /// Set clock power management support
    pub fn set_clock_power_management(&mut self, supported: bool) {
        self.0.set_bit(18, supported);
    }

    /// Port number
    pub fn port_number(self) -> u8 {
        self.0.get_bits(24..32) as u8
    }
}

/// Link Control register (offset +0x10 in the PCIe capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkControl(u16);

impl LinkControl {
    /// Wrap a raw register value
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// ASPM control encoding
    pub fn aspm_control(self) -> u8 {
        self.0.get_bits(0..2) as u8
    }

    /// Read completion boundary (false = 64 bytes, true = 128 bytes)
    pub fn read_completion_boundary(self) -> bool {
        self.0.get_bit(3)
    }

    /// Common clock configuration
    pub fn common_clock_configuration(self) -> bool {
        self.0.get_bit(6)
    }

    /// Extended synch enabled
    pub fn extended_synch(self) -> bool {
        self.0.get_bit(7)
    }

    /// Clock power management enabled
    pub fn clock_power_management(self) -> bool {
        self.0.get_bit(8)
    }
}

/// Link Status register (offset +0x12 in the PCIe capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus(u16);

impl LinkStatus {
    /// Wrap a raw register value
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Current link speed encoding
    pub fn link_speed(self) -> u8 {
        self.0.get_bits(0..4) as u8
    }

    /// Set the current link speed encoding
    pub fn set_link_speed(&mut self, encoding: u8) {
        self.0.set_bits(0..4, u16::from(encoding));
    }

    /// Negotiated link width in lanes
    pub fn link_width(self) -> u8 {
        self.0.get_bits(4..10) as u8
    }

    /// Set the negotiated link width in lanes
    pub fn set_link_width(&mut self, lanes: u8) {
        self.0.set_bits(4..10, u16::from(lanes));
    }

    /// Link training in progress
    pub fn link_training(self) -> bool {
        self.0.get_bit(11)
    }
}

/// Power Management Capabilities register (offset +0x02 in the capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmCaps(u16);

impl PmCaps {
    /// Wrap a raw register value
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// PM specification version (0b011 = PCI PM 1.2)
    pub fn version(self) -> u8 {
        self.0.get_bits(0..3) as u8
    }

    /// Set the PM specification version
    pub fn set_version(&mut self, version: u8) {
        self.0.set_bits(0..3, u16::from(version));
    }

    /// D1 power state supported
    pub fn d1_support(self) -> bool {
        self.0.get_bit(9)
    }

    /// D2 power state supported
    pub fn d2_support(self) -> bool {
        self.0.get_bit(10)
    }

    /// PME# assertion support mask
    pub fn pme_support(self) -> u8 {
        self.0.get_bits(11..16) as u8
    }
}

/// Power Management Control/Status register (offset +0x04 in the capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmControlStatus(u16);

impl PmControlStatus {
    /// Wrap a raw register value
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw register value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Current power state (0 = D0 .. 3 = D3hot)
    pub fn power_state(self) -> u8 {
        self.0.get_bits(0..2) as u8
    }

    /// Set the current power state
    pub fn set_power_state(&mut self, state: u8) {
        self.0.set_bits(0..2, u16::from(state));
    }

    /// PME# assertion enabled
    pub fn pme_enable(self) -> bool {
        self.0.get_bit(8)
    }

    /// PME# status
    pub fn pme_status(self) -> bool {
        self.0.get_bit(15)
    }
}

/// PCI Express extended capability header (AER and friends)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtCapHeader(u32);

impl ExtCapHeader {
    /// Wrap a raw header value
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw header value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Extended capability ID (16 bits)
    pub fn capability_id(self) -> u16 {
        self.0.get_bits(0..16) as u16
    }

    /// Set the extended capability ID
    pub fn set_capability_id(&mut self, id: u16) {
        self.0.set_bits(0..16, u32::from(id));
    }

    /// Capability structure version
    pub fn capability_version(self) -> u8 {
        self.0.get_bits(16..20) as u8
    }

    /// Set the capability structure version
    pub fn set_capability_version(&mut self, version: u8) {
        self.0.set_bits(16..20, u32::from(version));
    }

    /// Offset of the next extended capability (0 terminates the chain)
    pub fn next_capability(self) -> u16 {
        self.0.get_bits(20..32) as u16
    }

    /// Set the offset of the next extended capability
    pub fn set_next_capability(&mut self, offset: u16) {
        self.0.set_bits(20..32, u32::from(offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_express_caps_packing() {
        let mut caps = ExpressCaps::new(0);
        caps.set_capability_version(0x1);
        caps.set_device_type(0b0001);
        assert_eq!(caps.bits(), 0x0011);
        assert_eq!(caps.capability_version(), 1);
        assert_eq!(caps.device_type(), 1);
        assert!(!caps.slot_implemented());
    }

    #[test]
    fn test_device_control_packing() {
        let mut ctl = DeviceControl::new(0);
        ctl.set_relaxed_ordering(true);
        ctl.set_no_snoop(true);
        ctl.set_max_read_request_size(0b010);
        assert_eq!(ctl.bits(), 0x2810);
        assert_eq!(ctl.max_read_request_size(), 2);
    }

    #[test]
    fn test_link_caps_packing() {
        let mut link = LinkCaps::new(0);
        link.set_max_link_speed(1);
        link.set_max_link_width(8);
        link.set_aspm_support(0b01);
        link.set_l0s_exit_latency(0b100);
        link.set_l1_exit_latency(0b010);
        link.set_clock_power_management(true);
        assert_eq!(link.bits(), 0x0005_4481);
        assert_eq!(link.max_link_width(), 8);
        assert_eq!(link.aspm_support(), 1);
    }

    #[test]
    fn test_ext_cap_header_packing() {
        let mut header = ExtCapHeader::new(0);
        header.set_capability_id(0x0001);
        header.set_capability_version(0x1);
        header.set_next_capability(0);
        assert_eq!(header.bits(), 0x0001_0001);
    }

    #[test]
    fn test_command_write_mask_value() {
        let mask = Command::MEMORY_SPACE
            | Command::BUS_MASTER
            | Command::PARITY_ERROR_RESPONSE
            | Command::INTERRUPT_DISABLE;
        assert_eq!(mask.bits(), 0x0446);
    }
}
