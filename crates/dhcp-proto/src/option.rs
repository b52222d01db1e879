use std::net::Ipv4Addr;

use crate::arch::ClientArch;
use crate::MessageType;

/// DHCP options as defined in RFC 2132 and friends.
///
/// Only the options this server family reads or writes get a typed
/// variant; everything else round-trips through `Unknown`.
#[derive(Debug, Clone, PartialEq)]
pub enum DhcpOption {
    /// Option 1.
    SubnetMask(Ipv4Addr),
    /// Option 3.
    Router(Vec<Ipv4Addr>),
    /// Option 6.
    DnsServer(Vec<Ipv4Addr>),
    /// Option 12.
    Hostname(String),
    /// Option 15.
    DomainName(String),
    /// Option 28.
    BroadcastAddress(Ipv4Addr),
    /// Option 42.
    NtpServers(Vec<Ipv4Addr>),
    /// Option 43, an opaque blob of vendor sub-options.
    VendorSpecific(Vec<u8>),
    /// Option 50.
    RequestedIpAddress(Ipv4Addr),
    /// Option 51.
    LeaseTime(u32),
    /// Option 53.
    MessageType(MessageType),
    /// Option 54.
    ServerIdentifier(Ipv4Addr),
    /// Option 60, the vendor class identifier.
    ClassIdentifier(String),
    /// Option 77, the user class. PXE firmware sends a bare string.
    UserClass(String),
    /// Option 93, client system architectures, most preferred first.
    ClientArch(Vec<ClientArch>),
    /// Option 94, client network interface identifier (type/major/minor).
    ClientNdi(Vec<u8>),
    /// Option 97, client machine identifier (zero byte + GUID).
    ClientMachineId(Vec<u8>),
    /// Option 119, domain search list (RFC 3397).
    DomainSearch(Vec<String>),
    End,
    Unknown(u8, Vec<u8>),
}

impl DhcpOption {
    /// The option code on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => 1,
            Self::Router(_) => 3,
            Self::DnsServer(_) => 6,
            Self::Hostname(_) => 12,
            Self::DomainName(_) => 15,
            Self::BroadcastAddress(_) => 28,
            Self::NtpServers(_) => 42,
            Self::VendorSpecific(_) => 43,
            Self::RequestedIpAddress(_) => 50,
            Self::LeaseTime(_) => 51,
            Self::MessageType(_) => 53,
            Self::ServerIdentifier(_) => 54,
            Self::ClassIdentifier(_) => 60,
            Self::UserClass(_) => 77,
            Self::ClientArch(_) => 93,
            Self::ClientNdi(_) => 94,
            Self::ClientMachineId(_) => 97,
            Self::DomainSearch(_) => 119,
            Self::End => 255,
            Self::Unknown(code, _) => *code,
        }
    }

    /// Parse a DHCP option from code and data bytes.
    pub fn parse(code: u8, data: &[u8]) -> Self {
        match code {
            1 if data.len() == 4 => Self::SubnetMask(ipv4(data)),
            3 => Self::Router(ipv4_list(data)),
            6 => Self::DnsServer(ipv4_list(data)),
            12 => Self::Hostname(String::from_utf8_lossy(data).to_string()),
            15 => Self::DomainName(String::from_utf8_lossy(data).to_string()),
            28 if data.len() == 4 => Self::BroadcastAddress(ipv4(data)),
            42 => Self::NtpServers(ipv4_list(data)),
            43 => Self::VendorSpecific(data.to_vec()),
            50 if data.len() == 4 => Self::RequestedIpAddress(ipv4(data)),
            51 if data.len() == 4 => {
                Self::LeaseTime(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
            }
            53 if data.len() == 1 => {
                if let Some(mt) = MessageType::from_u8(data[0]) {
                    Self::MessageType(mt)
                } else {
                    Self::Unknown(code, data.to_vec())
                }
            }
            54 if data.len() == 4 => Self::ServerIdentifier(ipv4(data)),
            60 => Self::ClassIdentifier(String::from_utf8_lossy(data).to_string()),
            77 => Self::UserClass(String::from_utf8_lossy(data).to_string()),
            93 => Self::ClientArch(
                data.chunks_exact(2)
                    .map(|c| ClientArch::from_u16(u16::from_be_bytes([c[0], c[1]])))
                    .collect(),
            ),
            94 => Self::ClientNdi(data.to_vec()),
            97 => Self::ClientMachineId(data.to_vec()),
            119 => Self::DomainSearch(parse_domain_search(data)),
            _ => Self::Unknown(code, data.to_vec()),
        }
    }

    /// Serialize the option to bytes, including code and length.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            Self::SubnetMask(addr) => put(&mut bytes, 1, &addr.octets()),
            Self::Router(addrs) => put(&mut bytes, 3, &octets(addrs)),
            Self::DnsServer(addrs) => put(&mut bytes, 6, &octets(addrs)),
            Self::Hostname(name) => put(&mut bytes, 12, name.as_bytes()),
            Self::DomainName(name) => put(&mut bytes, 15, name.as_bytes()),
            Self::BroadcastAddress(addr) => put(&mut bytes, 28, &addr.octets()),
            Self::NtpServers(addrs) => put(&mut bytes, 42, &octets(addrs)),
            Self::VendorSpecific(data) => put(&mut bytes, 43, data),
            Self::RequestedIpAddress(addr) => put(&mut bytes, 50, &addr.octets()),
            Self::LeaseTime(time) => put(&mut bytes, 51, &time.to_be_bytes()),
            Self::MessageType(mt) => put(&mut bytes, 53, &[u8::from(*mt)]),
            Self::ServerIdentifier(addr) => put(&mut bytes, 54, &addr.octets()),
            Self::ClassIdentifier(s) => put(&mut bytes, 60, s.as_bytes()),
            Self::UserClass(s) => put(&mut bytes, 77, s.as_bytes()),
            Self::ClientArch(archs) => {
                let data: Vec<u8> = archs
                    .iter()
                    .flat_map(|a| a.to_u16().to_be_bytes())
                    .collect();
                put(&mut bytes, 93, &data);
            }
            Self::ClientNdi(data) => put(&mut bytes, 94, data),
            Self::ClientMachineId(data) => put(&mut bytes, 97, data),
            Self::DomainSearch(names) => put(&mut bytes, 119, &encode_domain_search(names)),
            Self::End => {}
            Self::Unknown(code, data) => put(&mut bytes, *code, data),
        }
        bytes
    }
}

fn put(bytes: &mut Vec<u8>, code: u8, data: &[u8]) {
    bytes.push(code);
    bytes.push(data.len() as u8);
    bytes.extend_from_slice(data);
}

fn ipv4(data: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(data[0], data[1], data[2], data[3])
}

fn ipv4_list(data: &[u8]) -> Vec<Ipv4Addr> {
    data.chunks_exact(4).map(ipv4).collect()
}

fn octets(addrs: &[Ipv4Addr]) -> Vec<u8> {
    addrs.iter().flat_map(|a| a.octets()).collect()
}

/// Encode a domain search list as an uncompressed RFC 1035 label sequence.
fn encode_domain_search(names: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for name in names {
        for label in name.split('.').filter(|l| !l.is_empty()) {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
    }
    out
}

/// Decode an uncompressed RFC 1035 label sequence. Compression pointers
/// terminate the current name; this server never emits them.
fn parse_domain_search(data: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        i += 1;
        if len == 0 {
            if !labels.is_empty() {
                names.push(labels.join("."));
                labels.clear();
            }
            continue;
        }
        if len & 0xC0 != 0 || i + len > data.len() {
            break;
        }
        labels.push(String::from_utf8_lossy(&data[i..i + len]).to_string());
        i += len;
    }
    if !labels.is_empty() {
        names.push(labels.join("."));
    }
    names
}

/// Encode `(code, value)` pairs as a nested option blob, e.g. for the
/// sub-options of option 43. Pairs are emitted in ascending code order and
/// terminated with 255.
pub fn encode_suboptions(subs: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut sorted: Vec<&(u8, Vec<u8>)> = subs.iter().collect();
    sorted.sort_by_key(|(code, _)| *code);

    let mut out = Vec::new();
    for (code, value) in sorted {
        out.push(*code);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
    }
    out.push(255);
    out
}

/// Decode a nested option blob back into `(code, value)` pairs.
pub fn decode_suboptions(data: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let code = data[i];
        if code == 255 {
            break;
        }
        if code == 0 {
            i += 1;
            continue;
        }
        if i + 1 >= data.len() {
            break;
        }
        let len = data[i + 1] as usize;
        if i + 2 + len > data.len() {
            break;
        }
        out.push((code, data[i + 2..i + 2 + len].to_vec()));
        i += 2 + len;
    }
    out
}
