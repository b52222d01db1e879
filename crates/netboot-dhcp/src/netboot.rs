//! Packet classification and the netboot decision engine.
//!
//! Given a received packet, backend data and server configuration, this
//! module decides whether a client may netboot, which iPXE binary or
//! script it is handed, which next-server address is advertised, and what
//! goes into the vendor-specific option 43 blob. The rules follow the PXE
//! spec conventions for proxyDHCP servers
//! (<http://www.pix.net/software/pxeboot/archive/pxespec.pdf>).

use std::net::{Ipv4Addr, SocketAddrV4};

use dhcp_proto::{encode_suboptions, ClientArch, DhcpPacket, MacAddress, MessageType};
use thiserror::Error;
use url::Url;

use crate::otel::Traceparent;
use crate::rpi;

/// User class (option 77) sent by stock iPXE. A client in this state runs
/// iPXE native drivers; chainloading it back to a UNDI stack won't work,
/// so it is handed a full tftp:// URL instead of a bare filename.
pub const USER_CLASS_IPXE: &str = "iPXE";

/// User class identifying our own chainloaded, full-featured iPXE build.
/// Matching it is what breaks the chainload loop: such a client gets the
/// boot script, not another iPXE binary.
pub const USER_CLASS_TINKERBELL: &str = "Tinkerbell";

/// Client transport taken from the vendor class identifier (option 60).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// `PXEClient:...`, TFTP-booting PXE firmware.
    Pxe,
    /// `HTTPClient:...`, HTTP-boot firmware.
    Http,
}

impl ClientType {
    /// Classify from the raw option 60 string. Anything that is not an
    /// HTTPClient is treated as a PXEClient, mirroring what is echoed
    /// back in replies.
    pub fn from_class_identifier(opt60: &str) -> Self {
        if opt60.starts_with("HTTPClient") {
            Self::Http
        } else {
            Self::Pxe
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pxe => "PXEClient",
            Self::Http => "HTTPClient",
        }
    }
}

/// Map a client architecture to the iPXE binary it boots. A `None` means
/// netboot is not possible for this client.
pub fn arch_bootfile(arch: ClientArch) -> Option<&'static str> {
    match arch {
        ClientArch::IntelX86Pc
        | ClientArch::NecPc98
        | ClientArch::EfiItanium
        | ClientArch::DecAlpha
        | ClientArch::ArcX86
        | ClientArch::IntelLeanClient => Some("undionly.kpxe"),
        ClientArch::EfiIa32
        | ClientArch::EfiX8664
        | ClientArch::EfiXscale
        | ClientArch::EfiBc
        | ClientArch::EfiX86Http
        | ClientArch::EfiX8664Http => Some("ipxe.efi"),
        ClientArch::EfiArm32
        | ClientArch::EfiArm64
        | ClientArch::EfiArm32Http
        | ClientArch::EfiArm64Http
        | ClientArch::Rpi => Some("snp.efi"),
        ClientArch::Unknown(_) => None,
    }
}

/// The client architecture from option 93, with the Raspberry Pi OUI
/// override: Pi boot ROMs are identified by MAC prefix regardless of what
/// arch value the firmware advertises.
pub fn client_arch(pkt: &DhcpPacket) -> ClientArch {
    let archs = pkt.client_arch();
    if archs.is_empty() {
        return ClientArch::Unknown(255);
    }
    if rpi::is_rpi(&pkt.chaddr) {
        return ClientArch::Rpi;
    }
    archs
        .iter()
        .copied()
        .find(|a| a.is_known())
        .unwrap_or(ClientArch::Unknown(255))
}

/// Why a packet does not qualify as a netboot client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("message type ({0}) must be either DISCOVER or REQUEST")]
    InvalidMessageType(String),
    #[error("option 60 not set")]
    Opt60Missing,
    #[error("option 60 ({0:?}) must start with PXEClient or HTTPClient")]
    Opt60Invalid(String),
    #[error("option 93 not set")]
    Opt93Missing,
    #[error("option 94 not set")]
    Opt94Missing,
    #[error("option 97 does not start with 0")]
    Opt97LeadingByte,
    #[error("option 97 has invalid length (must be 0 or 17): {0}")]
    Opt97Length(usize),
}

/// Whether the client is a valid netboot client. A valid netboot client
/// has all of the following in its request:
///
/// 1. a DISCOVER or REQUEST message type,
/// 2. option 60 starting with "PXEClient" or "HTTPClient",
/// 3. option 93 set,
/// 4. option 94 set,
/// 5. option 97 either absent or 17 bytes with a zero lead byte.
///
/// Failure is diagnostic, not fatal: the packet is simply not a netboot
/// request.
pub fn is_netboot_client(pkt: &DhcpPacket) -> Result<(), ClassifyError> {
    match pkt.message_type() {
        Some(MessageType::Discover) | Some(MessageType::Request) => {}
        Some(other) => return Err(ClassifyError::InvalidMessageType(other.to_string())),
        None => return Err(ClassifyError::InvalidMessageType("none".to_string())),
    }

    if !pkt.has_option(60) {
        return Err(ClassifyError::Opt60Missing);
    }
    let opt60 = pkt.class_identifier();
    if !opt60.starts_with("PXEClient") && !opt60.starts_with("HTTPClient") {
        return Err(ClassifyError::Opt60Invalid(opt60.to_string()));
    }

    if !pkt.has_option(93) {
        return Err(ClassifyError::Opt93Missing);
    }
    if !pkt.has_option(94) {
        return Err(ClassifyError::Opt94Missing);
    }

    // A missing GUID is invalid per the PXE spec, but ROMs in the wild
    // omit it and still expect to boot. The GUID is only mirrored back to
    // the client, so those ROMs are accepted.
    let guid = pkt.machine_id();
    match guid.len() {
        0 => {}
        17 => {
            if guid[0] != 0 {
                return Err(ClassifyError::Opt97LeadingByte);
            }
        }
        len => return Err(ClassifyError::Opt97Length(len)),
    }

    Ok(())
}

/// Resolve the bootfile name and next-server address for a reply.
///
/// Branch order matters:
///
/// a. the client already runs our own iPXE (the "Tinkerbell" user class or
///    the configured custom one): hand it the boot script and stop the
///    chainload loop;
/// b. HTTP-boot firmware: hand it an absolute HTTP URL to the binary;
/// c. stock iPXE: hand it a full tftp:// URL (option 43.6 is set, so a
///    bare filename would not be fetched);
/// d. anything else: a bare filename fetched from `tftp_addr`.
#[allow(clippy::too_many_arguments)]
pub fn bootfile_and_next_server(
    pkt_user_class: &str,
    custom_user_class: Option<&str>,
    client_type: ClientType,
    bin: &str,
    tftp_addr: SocketAddrV4,
    http_url: &Url,
    script_url: Option<&Url>,
    traceparent: Option<&Traceparent>,
) -> (String, Ipv4Addr) {
    let bin = match traceparent {
        Some(tp) => format!("{bin}-{tp}"),
        None => bin.to_string(),
    };
    let mut next_server = *tftp_addr.ip();

    let in_our_ipxe = pkt_user_class == USER_CLASS_TINKERBELL
        || custom_user_class.is_some_and(|c| !c.is_empty() && pkt_user_class == c);

    let bootfile = if in_our_ipxe {
        // next-server must be a real address here; a proxyDHCP reply with
        // 0.0.0.0 makes the ROM retry the broadcast.
        if next_server.is_unspecified() {
            next_server = script_url
                .and_then(|u| u.host_str())
                .and_then(|h| h.parse().ok())
                .unwrap_or(Ipv4Addr::new(127, 0, 0, 1));
        }
        match script_url {
            Some(u) => u.to_string(),
            None => "/no-ipxe-script-defined".to_string(),
        }
    } else if client_type == ClientType::Http {
        next_server = http_url
            .host_str()
            .and_then(|h| h.parse().ok())
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        format!("{}/{}", http_url.as_str().trim_end_matches('/'), bin)
    } else if pkt_user_class == USER_CLASS_IPXE {
        format!("tftp://{tftp_addr}/{bin}")
    } else {
        bin
    };

    (bootfile, next_server)
}

/// Build the option 43 vendor-specific blob for a netboot reply:
///
/// - sub-option 6 = `[0x08]`, PXE boot server discovery control: bypass
///   discovery, boot straight from the filename;
/// - sub-option 69 = the 26-byte traceparent, when tracing is on;
/// - sub-option 116 = the VLAN for iPXE to bring up, when set;
/// - Raspberry Pi MACs additionally get sub-options 9 and 10.
pub fn vendor_options(
    mac: MacAddress,
    vlan: Option<&str>,
    traceparent: Option<&Traceparent>,
) -> Vec<u8> {
    let mut subs: Vec<(u8, Vec<u8>)> = vec![(6, vec![0x08])];
    if let Some(tp) = traceparent {
        subs.push((69, tp.encode().to_vec()));
    }
    if let Some(vlan) = vlan.filter(|v| !v.is_empty()) {
        subs.push((116, vlan.as_bytes().to_vec()));
    }
    if rpi::is_rpi(&mac) {
        rpi::add_vendor_suboptions(&mut subs);
    }
    encode_suboptions(&subs)
}
