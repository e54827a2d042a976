//! Host-visible behavior of the configuration space: reset values, write
//! masks, straddle handling and BAR decode.

use softgpu_pci::controller::{EXPANSION_ROM_BAR_ID, INVALID_BAR_ID};
use softgpu_pci::PciController;

#[test]
fn test_vendor_device_id_after_reset() {
    let pci = PciController::new();
    assert_eq!(pci.config_read(0x00, 4), 0x0001_FFFD);
    assert_eq!(pci.config_read(0x00, 2), 0xFFFD);
    assert_eq!(pci.config_read(0x02, 2), 0x0001);
}

#[test]
fn test_header_reset_values() {
    let pci = PciController::new();
    // Command clear, Status advertises the capability list
    assert_eq!(pci.config_read(0x04, 2), 0x0000);
    assert_eq!(pci.config_read(0x06, 2), 0x0010);
    // Revision 0x01, class code 0x030001 (display controller)
    assert_eq!(pci.config_read(0x08, 4), 0x0300_0101);
    // BAR1 is a 64-bit prefetchable memory window
    assert_eq!(pci.config_read(0x14, 4), 0x0000_000C);
    assert_eq!(pci.config_read(0x18, 4), 0x0000_0000);
    assert_eq!(pci.config_read(0x34, 1), 0x40);
}

#[test]
fn test_pcie_capability_reset_values() {
    let pci = PciController::new();
    // ID 0x10, next capability at the PM structure
    assert_eq!(pci.config_read(0x40, 2), 0x5410);
    // Version 1, legacy endpoint
    assert_eq!(pci.config_read(0x42, 2), 0x0011);
    // 256-byte payload, extended tags, L0s/L1 latencies, role-based errors
    assert_eq!(pci.config_read(0x44, 4), 0x0000_8DE1);
    // Relaxed ordering + no snoop + 512-byte read requests
    assert_eq!(pci.config_read(0x48, 2), 0x2810);
    // 2.5 GT/s x8, L0s ASPM, clock power management
    assert_eq!(pci.config_read(0x4C, 4), 0x0005_4481);
    assert_eq!(pci.config_read(0x50, 2), 0x0000);
    assert_eq!(pci.config_read(0x52, 2), 0x0081);
}

#[test]
fn test_power_management_reset_values() {
    let pci = PciController::new();
    // ID 0x01, end of chain
    assert_eq!(pci.config_read(0x54, 2), 0x0001);
    // PM 1.2, no D1/D2, no PME
    assert_eq!(pci.config_read(0x56, 2), 0x0003);
    assert_eq!(pci.config_read(0x58, 2), 0x0000);
}

#[test]
fn test_aer_reset_values() {
    let pci = PciController::new();
    assert_eq!(pci.config_read(0x100, 4), 0x0001_0001);
    assert_eq!(pci.config_read(0x104, 4), 0x0000_0000);
    assert_eq!(pci.config_read(0x10C, 4), 0x0006_2030);
    assert_eq!(pci.config_read(0x114, 4), 0x0000_2000);
    assert_eq!(pci.config_read(0x128, 4), 0x0000_0000);
}

#[test]
fn test_capability_chain_walk() {
    let pci = PciController::new();
    let mut offset = pci.config_read(0x34, 1) as u16;
    let mut chain = Vec::new();
    while offset != 0 {
        let id = pci.config_read(offset, 1) as u8;
        chain.push((offset, id));
        offset = pci.config_read(offset + 1, 1) as u16;
    }
    assert_eq!(chain, vec![(0x40, 0x10), (0x54, 0x01)]);
}

#[test]
fn test_command_write_mask() {
    let mut pci = PciController::new();
    pci.config_write(0x04, 2, 0xFFFF);
    assert_eq!(pci.config_read(0x04, 2), 0x0446);
    assert_eq!(pci.command_register(), 0x0446);
    // Neighbouring Status bytes are untouched by a Command write
    assert_eq!(pci.config_read(0x06, 2), 0x0010);

    pci.config_write(0x04, 2, 0x0000);
    assert_eq!(pci.command_register(), 0x0000);
}

#[test]
fn test_status_write_mask() {
    let mut pci = PciController::new();
    pci.config_write(0x06, 2, 0xFFFF);
    assert_eq!(pci.config_read(0x06, 2), 0xFB00);
}

#[test]
fn test_wrong_size_writes_are_dropped() {
    let mut pci = PciController::new();
    pci.config_write(0x04, 4, 0xFFFF_FFFF);
    pci.config_write(0x04, 1, 0xFF);
    assert_eq!(pci.config_read(0x04, 2), 0x0000);

    pci.config_write(0x10, 2, 0xFFFF);
    assert_eq!(pci.config_read(0x10, 4), 0x0000_0000);

    pci.config_write(0x0C, 2, 0xFFFF);
    assert_eq!(pci.config_read(0x0C, 1), 0x00);
}

#[test]
fn test_read_only_offsets_ignore_writes() {
    let mut pci = PciController::new();
    pci.config_write(0x00, 2, 0x1234);
    pci.config_write(0x02, 2, 0x5678);
    pci.config_write(0x08, 4, 0xFFFF_FFFF);
    pci.config_write(0x2C, 2, 0xBEEF);
    pci.config_write(0x44, 4, 0xFFFF_FFFF);
    pci.config_write(0x4C, 4, 0xFFFF_FFFF);
    pci.config_write(0x10C, 4, 0xFFFF_FFFF);

    assert_eq!(pci.config_read(0x00, 4), 0x0001_FFFD);
    assert_eq!(pci.config_read(0x08, 4), 0x0300_0101);
    assert_eq!(pci.config_read(0x2C, 2), 0x0000);
    assert_eq!(pci.config_read(0x44, 4), 0x0000_8DE1);
    assert_eq!(pci.config_read(0x4C, 4), 0x0005_4481);
    assert_eq!(pci.config_read(0x10C, 4), 0x0006_2030);
}

#[test]
fn test_byte_wide_fields() {
    let mut pci = PciController::new();
    pci.config_write(0x0C, 1, 0x40);
    assert_eq!(pci.config_read(0x0C, 1), 0x40);

    pci.config_write(0x3C, 1, 0x0B);
    assert_eq!(pci.config_read(0x3C, 1), 0x0B);
    // Interrupt pin stays zero
    assert_eq!(pci.config_read(0x3C, 2), 0x000B);
}

#[test]
fn test_capability_control_write_masks() {
    let mut pci = PciController::new();
    pci.config_write(0x48, 2, 0xFFFF);
    assert_eq!(pci.config_read(0x48, 2), 0x7CFF);

    pci.config_write(0x50, 2, 0xFFFF);
    assert_eq!(pci.config_read(0x50, 2), 0x01C3);

    pci.config_write(0x58, 2, 0xFFFF);
    assert_eq!(pci.config_read(0x58, 2), 0x0003);
}

#[test]
fn test_invalid_sizes_read_zero() {
    let pci = PciController::new();
    assert_eq!(pci.config_read(0x00, 0), 0);
    assert_eq!(pci.config_read(0x00, 3), 0);
    assert_eq!(pci.config_read(0x00, 8), 0);
}

#[test]
fn test_straddling_reads_return_zero() {
    let pci = PciController::new();
    // Crossing the end of the Type-0 header
    assert_eq!(pci.config_read(0x3E, 4), 0);
    assert_eq!(pci.config_read(0x3F, 2), 0);
    // Link Status is readable as 2 bytes but a dword would leave the
    // PCIe capability
    assert_eq!(pci.config_read(0x52, 2), 0x0081);
    assert_eq!(pci.config_read(0x52, 4), 0);
    // End of the PM capability, legacy space, AER and the region itself
    assert_eq!(pci.config_read(0x5A, 4), 0);
    assert_eq!(pci.config_read(0xFE, 4), 0);
    assert_eq!(pci.config_read(0x12A, 4), 0);
    assert_eq!(pci.config_read(0xFFE, 4), 0);
    // Past the end of the region entirely
    assert_eq!(pci.config_read(0x1000, 4), 0);
    assert_eq!(pci.config_read(0x2000, 1), 0);
}

#[test]
fn test_bar0_writes_and_decode() {
    let mut pci = PciController::new();
    pci.config_write(0x10, 4, 0xFFFF_FFFF);
    assert_eq!(pci.config_read(0x10, 4), 0xFF00_0000);

    // Park the 64-bit BAR1 window high so it cannot shadow the probe
    pci.config_write(0x14, 4, 0x8000_0000);
    pci.config_write(0x18, 4, 0x0000_0001);

    pci.config_write(0x10, 4, 0x1200_0000);
    assert_eq!(pci.decode_bar(0x1200_0000), 0);
    assert_eq!(pci.decode_bar(0x1234_5678), 0);
    assert_eq!(pci.bar_offset(0x1234_5678, 0), 0x0034_5678);
    // One past the 16 MiB window
    assert_eq!(pci.decode_bar(0x1300_0000), INVALID_BAR_ID);
}

#[test]
fn test_bar1_sticky_type_bits() {
    let mut pci = PciController::new();
    pci.config_write(0x14, 4, 0x0000_0000);
    assert_eq!(pci.config_read(0x14, 4), 0x0000_000C);

    pci.config_write(0x14, 4, 0xFFFF_FFFF);
    assert_eq!(pci.config_read(0x14, 4), 0x8000_000C);
}

#[test]
fn test_bar1_64_bit_decode() {
    let mut pci = PciController::new();
    pci.config_write(0x14, 4, 0xFFFF_FFFF);
    pci.config_write(0x18, 4, 0xFFFF_FFFF);
    pci.config_write(0x14, 4, 0x8000_0000);
    pci.config_write(0x18, 4, 0x0000_0001);

    assert_eq!(pci.decode_bar(0x0000_0001_8000_0000), 1);
    assert_eq!(pci.bar_offset(0x0000_0001_8000_0000, 1), 0);
    assert_eq!(pci.bar_offset(0x0000_0001_8000_1000, 1), 0x1000);
    // Below the window base
    assert_eq!(pci.decode_bar(0x0000_0001_7FFF_FFFF), INVALID_BAR_ID);
    // One past the 2 GiB window
    assert_eq!(pci.decode_bar(0x0000_0002_0000_0000), INVALID_BAR_ID);
}

#[test]
fn test_unimplemented_bars_stay_zero() {
    let mut pci = PciController::new();
    pci.config_write(0x1C, 4, 0xFFFF_FFFF);
    pci.config_write(0x20, 4, 0xFFFF_FFFF);
    pci.config_write(0x24, 4, 0xFFFF_FFFF);
    assert_eq!(pci.config_read(0x1C, 4), 0);
    assert_eq!(pci.config_read(0x20, 4), 0);
    assert_eq!(pci.config_read(0x24, 4), 0);
}

#[test]
fn test_expansion_rom_enable_and_decode() {
    let mut pci = PciController::new();
    assert!(!pci.expansion_rom_enabled());

    pci.config_write(0x30, 4, 0xC000_0001);
    assert_eq!(pci.config_read(0x30, 4), 0xC000_0001);
    assert!(pci.expansion_rom_enabled());
    assert_eq!(pci.decode_bar(0xC000_0000), EXPANSION_ROM_BAR_ID);
    assert_eq!(pci.decode_bar(0xC000_7FFF), EXPANSION_ROM_BAR_ID);
    assert_eq!(pci.bar_offset(0xC000_1000, EXPANSION_ROM_BAR_ID), 0x1000);
    assert_eq!(pci.decode_bar(0xC000_8000), INVALID_BAR_ID);

    // The enable bit is reported separately and does not shift the window
    pci.config_write(0x30, 4, 0xC000_0000);
    assert!(!pci.expansion_rom_enabled());
    assert_eq!(pci.decode_bar(0xC000_0000), EXPANSION_ROM_BAR_ID);
}

#[test]
fn test_bar0_wins_over_expansion_rom() {
    let mut pci = PciController::new();
    pci.config_write(0x10, 4, 0x1200_0000);
    pci.config_write(0x30, 4, 0x1200_0001);
    assert_eq!(pci.decode_bar(0x1200_0000), 0);
    assert_eq!(pci.decode_bar(0x1200_4000), 0);
}

#[test]
fn test_unmatched_addresses_decode_invalid() {
    let mut pci = PciController::new();
    // Push every window away from the probe address
    pci.config_write(0x10, 4, 0x1200_0000);
    pci.config_write(0x30, 4, 0x1400_0000);
    pci.config_write(0x14, 4, 0x8000_0000);
    pci.config_write(0x18, 4, 0x0000_0001);

    assert_eq!(pci.decode_bar(0x2000_0000), INVALID_BAR_ID);
    assert_eq!(pci.decode_bar(0x0000_0004_0000_0000), INVALID_BAR_ID);
}

#[test]
fn test_bar_offset_for_unknown_bar_is_identity() {
    let pci = PciController::new();
    assert_eq!(pci.bar_offset(0xDEAD_BEEF, 5), 0xDEAD_BEEF);
    assert_eq!(pci.bar_offset(0x1234, INVALID_BAR_ID), 0x1234);
}
