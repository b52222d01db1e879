use std::net::Ipv4Addr;

use crate::error::ParseError;
use crate::{ClientArch, DhcpOption, MacAddress, MessageType};

/// DHCP packet structure as defined in RFC 2131.
#[derive(Debug, Clone, PartialEq)]
pub struct DhcpPacket {
    pub op: u8,             // Message op code / message type
    pub htype: u8,          // Hardware address type
    pub hlen: u8,           // Hardware address length
    pub hops: u8,           // Client sets to zero
    pub xid: u32,           // Transaction ID
    pub secs: u16,          // Seconds elapsed
    pub flags: u16,         // Flags
    pub ciaddr: Ipv4Addr,   // Client IP address
    pub yiaddr: Ipv4Addr,   // 'Your' (client) IP address
    pub siaddr: Ipv4Addr,   // Next-server IP address
    pub giaddr: Ipv4Addr,   // Relay agent IP address
    pub chaddr: MacAddress, // Client hardware address
    pub sname: String,      // Optional server host name
    pub file: String,       // Boot file name
    pub options: Vec<DhcpOption>,
}

/// DHCP magic cookie (RFC 2131).
const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

pub const OP_BOOTREQUEST: u8 = 1;
pub const OP_BOOTREPLY: u8 = 2;

impl DhcpPacket {
    /// Create a new empty BOOTREQUEST packet.
    pub fn new() -> Self {
        Self {
            op: OP_BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: MacAddress::default(),
            sname: String::new(),
            file: String::new(),
            options: Vec::new(),
        }
    }

    /// Create a BOOTREPLY skeleton from a received request, copying the
    /// fields the reply must mirror: `xid`, `flags`, `giaddr`, `chaddr`
    /// and the hardware type/length.
    pub fn reply_to(request: &DhcpPacket) -> Self {
        let mut reply = Self::new();
        reply.op = OP_BOOTREPLY;
        reply.htype = request.htype;
        reply.hlen = request.hlen;
        reply.xid = request.xid;
        reply.flags = request.flags;
        reply.giaddr = request.giaddr;
        reply.chaddr = request.chaddr;
        reply
    }

    /// Parse a DHCP packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < 240 {
            return Err(ParseError::TooShort(data.len()));
        }
        if data[236..240] != DHCP_MAGIC_COOKIE {
            return Err(ParseError::MissingMagicCookie);
        }

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let chaddr = MacAddress::from_slice(&data[28..34]).ok_or(ParseError::InvalidMac)?;

        let sname = nul_terminated(&data[44..108]);
        let file = nul_terminated(&data[108..236]);

        // The end marker (255) terminates the walk; it is not kept as an
        // option so that encode/decode round-trips compare equal.
        let mut options = Vec::new();
        let mut i = 240;
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
                return Err(ParseError::TruncatedOption { code });
            }

            let len = data[i + 1] as usize;
            if i + 2 + len > data.len() {
                return Err(ParseError::TruncatedOption { code });
            }

            options.push(DhcpOption::parse(code, &data[i + 2..i + 2 + len]));
            i += 2 + len;
        }

        Ok(Self {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Serialize the packet to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; 240];

        bytes[0] = self.op;
        bytes[1] = self.htype;
        bytes[2] = self.hlen;
        bytes[3] = self.hops;

        bytes[4..8].copy_from_slice(&self.xid.to_be_bytes());
        bytes[8..10].copy_from_slice(&self.secs.to_be_bytes());
        bytes[10..12].copy_from_slice(&self.flags.to_be_bytes());

        bytes[12..16].copy_from_slice(&self.ciaddr.octets());
        bytes[16..20].copy_from_slice(&self.yiaddr.octets());
        bytes[20..24].copy_from_slice(&self.siaddr.octets());
        bytes[24..28].copy_from_slice(&self.giaddr.octets());

        bytes[28..34].copy_from_slice(self.chaddr.as_bytes());

        let sname = self.sname.as_bytes();
        bytes[44..44 + sname.len().min(63)].copy_from_slice(&sname[..sname.len().min(63)]);
        let file = self.file.as_bytes();
        bytes[108..108 + file.len().min(127)].copy_from_slice(&file[..file.len().min(127)]);

        bytes[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            if matches!(option, DhcpOption::End) {
                continue;
            }
            bytes.extend_from_slice(&option.to_bytes());
        }
        bytes.push(255);

        bytes
    }

    /// Get the message type from the options.
    pub fn message_type(&self) -> Option<MessageType> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::MessageType(mt) => Some(*mt),
            _ => None,
        })
    }

    /// Whether an option with the given code is present.
    pub fn has_option(&self, code: u8) -> bool {
        self.options.iter().any(|opt| opt.code() == code)
    }

    /// The vendor class identifier (option 60), empty string if absent.
    pub fn class_identifier(&self) -> &str {
        self.options
            .iter()
            .find_map(|opt| match opt {
                DhcpOption::ClassIdentifier(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or("")
    }

    /// The user class (option 77), empty string if absent.
    pub fn user_class(&self) -> &str {
        self.options
            .iter()
            .find_map(|opt| match opt {
                DhcpOption::UserClass(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or("")
    }

    /// Client system architectures from option 93, most preferred first.
    pub fn client_arch(&self) -> &[ClientArch] {
        self.options
            .iter()
            .find_map(|opt| match opt {
                DhcpOption::ClientArch(archs) => Some(archs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Client machine identifier (option 97) raw bytes, empty if absent.
    pub fn machine_id(&self) -> &[u8] {
        self.options
            .iter()
            .find_map(|opt| match opt {
                DhcpOption::ClientMachineId(id) => Some(id.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Insert an option, replacing any existing option with the same code.
    pub fn set_option(&mut self, option: DhcpOption) {
        let code = option.code();
        if let Some(existing) = self.options.iter_mut().find(|o| o.code() == code) {
            *existing = option;
        } else {
            self.options.push(option);
        }
    }
}

impl Default for DhcpPacket {
    fn default() -> Self {
        Self::new()
    }
}

fn nul_terminated(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}
