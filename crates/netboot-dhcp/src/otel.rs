//! Tracing glue: W3C trace context handling and DHCP packet attributes.

use std::fmt;
use std::str::FromStr;

use dhcp_proto::{DhcpOption, DhcpPacket};
use rand::RngCore;

/// A W3C trace context identifier.
///
/// Round-trips between the `traceparent` header string form
/// (`00-<trace id>-<span id>-<flags>`) and the 26-byte binary form carried
/// in option 43 sub-option 69 (`0x00 | trace_id[16] | span_id[8] | flags`),
/// so downstream boot stages can link their spans to the DHCP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traceparent {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub flags: u8,
}

impl Traceparent {
    /// Generate a fresh, sampled trace context for one packet exchange.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut trace_id = [0u8; 16];
        let mut span_id = [0u8; 8];
        rng.fill_bytes(&mut trace_id);
        rng.fill_bytes(&mut span_id);
        Self {
            trace_id,
            span_id,
            flags: 0x01,
        }
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & 0x01 != 0
    }

    /// The 26-byte binary encoding for option 43 sub-option 69.
    pub fn encode(&self) -> [u8; 26] {
        let mut out = [0u8; 26];
        out[0] = 0x00; // traceparent version
        out[1..17].copy_from_slice(&self.trace_id);
        out[17..25].copy_from_slice(&self.span_id);
        out[25] = if self.is_sampled() { 0x01 } else { 0x00 };
        out
    }

    /// Decode the 26-byte binary form. Returns `None` for a wrong length
    /// or an unknown version byte.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 26 || bytes[0] != 0x00 {
            return None;
        }
        let mut trace_id = [0u8; 16];
        let mut span_id = [0u8; 8];
        trace_id.copy_from_slice(&bytes[1..17]);
        span_id.copy_from_slice(&bytes[17..25]);
        Some(Self {
            trace_id,
            span_id,
            flags: bytes[25],
        })
    }
}

impl fmt::Display for Traceparent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "00-{}-{}-{:02x}",
            hex(&self.trace_id),
            hex(&self.span_id),
            self.flags
        )
    }
}

/// Error parsing a W3C `traceparent` string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid traceparent: {0}")]
pub struct TraceparentParseError(String);

impl FromStr for Traceparent {
    type Err = TraceparentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return Err(TraceparentParseError(s.to_string()));
        }
        let trace_id: [u8; 16] = unhex(parts[1])
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| TraceparentParseError(s.to_string()))?;
        let span_id: [u8; 8] = unhex(parts[2])
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| TraceparentParseError(s.to_string()))?;
        let flags = u8::from_str_radix(parts[3], 16)
            .map_err(|_| TraceparentParseError(s.to_string()))?;
        Ok(Self {
            trace_id,
            span_id,
            flags,
        })
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Translate a DHCP packet into namespaced key/value attributes for
/// structured logging, e.g. `DHCP.request.Opt1.SubnetMask`. A key is only
/// emitted when the source header or option is present.
pub fn packet_attributes(pkt: &DhcpPacket, namespace: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut push = |key: &str, value: String| {
        attrs.push((format!("DHCP.{namespace}.{key}"), value));
    };

    if pkt.yiaddr != std::net::Ipv4Addr::UNSPECIFIED {
        push("Header.yiaddr", pkt.yiaddr.to_string());
    }
    if pkt.siaddr != std::net::Ipv4Addr::UNSPECIFIED {
        push("Header.siaddr", pkt.siaddr.to_string());
    }
    if pkt.chaddr.as_bytes() != &[0u8; 6] {
        push("Header.chaddr", pkt.chaddr.to_string());
    }
    if !pkt.file.is_empty() {
        push("Header.file", pkt.file.clone());
    }

    for opt in &pkt.options {
        match opt {
            DhcpOption::SubnetMask(m) => push("Opt1.SubnetMask", m.to_string()),
            DhcpOption::Router(rs) if !rs.is_empty() => {
                push("Opt3.DefaultGateway", join(rs));
            }
            DhcpOption::DnsServer(ns) if !ns.is_empty() => {
                push("Opt6.NameServers", join(ns));
            }
            DhcpOption::Hostname(h) if !h.is_empty() => push("Opt12.Hostname", h.clone()),
            DhcpOption::DomainName(d) if !d.is_empty() => push("Opt15.DomainName", d.clone()),
            DhcpOption::BroadcastAddress(b) => push("Opt28.BroadcastAddress", b.to_string()),
            DhcpOption::NtpServers(ntp) if !ntp.is_empty() => {
                push("Opt42.NTPServers", join(ntp));
            }
            DhcpOption::LeaseTime(t) => push("Opt51.LeaseTime", t.to_string()),
            DhcpOption::MessageType(mt) => push("Opt53.MessageType", mt.to_string()),
            DhcpOption::ServerIdentifier(s) => push("Opt54.ServerIdentifier", s.to_string()),
            DhcpOption::DomainSearch(names) if !names.is_empty() => {
                push("Opt119.DomainSearch", names.join(","));
            }
            _ => {}
        }
    }

    attrs
}

fn join(ips: &[std::net::Ipv4Addr]) -> String {
    ips.iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
