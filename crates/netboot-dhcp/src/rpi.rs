//! Raspberry Pi netboot quirks.

use dhcp_proto::MacAddress;

/// OUI prefixes assigned to the Raspberry Pi Foundation.
///
/// The MAC prefix is the only reliable way to spot a Pi boot ROM in a DHCP
/// request; the ROM does not send a distinguishing vendor class.
const RPI_OUIS: [[u8; 3]; 4] = [
    [0x28, 0xCD, 0xC1],
    [0xB8, 0x27, 0xEB],
    [0xDC, 0xA6, 0x32],
    [0xE4, 0x5F, 0x01],
];

/// Whether the MAC address carries a Raspberry Pi OUI.
pub fn is_rpi(mac: &MacAddress) -> bool {
    RPI_OUIS.contains(&mac.oui())
}

/// Append the option 43 sub-options the Pi 4 boot ROM requires before it
/// will accept a netboot reply. Sub-option 9 must contain the literal
/// "Raspberry Pi Boot" marker.
pub fn add_vendor_suboptions(subs: &mut Vec<(u8, Vec<u8>)>) {
    subs.push((9, b"\x00\x00\x11Raspberry Pi Boot".to_vec()));
    subs.push((10, vec![0x00, 0x50, 0x58, 0x45])); // "\0PXE"
}
