//! The neutral host record shared between backends and handlers.

use std::net::Ipv4Addr;

use dhcp_proto::MacAddress;
use url::Url;

/// DHCP headers and options a backend can supply for one host.
///
/// This is the API between the server and a backend: handlers read it,
/// backends produce it, nobody mutates it in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Dhcp {
    /// chaddr DHCP header.
    pub mac: MacAddress,
    /// yiaddr DHCP header.
    pub ip_address: Ipv4Addr,
    /// DHCP option 1.
    pub subnet_mask: Ipv4Addr,
    /// DHCP option 3.
    pub default_gateway: Option<Ipv4Addr>,
    /// DHCP option 6.
    pub name_servers: Vec<Ipv4Addr>,
    /// DHCP option 12.
    pub hostname: Option<String>,
    /// DHCP option 15.
    pub domain_name: Option<String>,
    /// DHCP option 28.
    pub broadcast_address: Option<Ipv4Addr>,
    /// DHCP option 42.
    pub ntp_servers: Vec<Ipv4Addr>,
    /// DHCP option 51.
    pub lease_time: u32,
    /// DHCP option 119.
    pub domain_search: Vec<String>,
}

/// Netboot data for one host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Netboot {
    /// If true, the client is offered netboot options in OFFER/ACK.
    pub allow_netboot: bool,
    /// Per-host iPXE script, overriding the server-wide default.
    pub ipxe_script_url: Option<Url>,
    /// VLAN for iPXE to netboot on, delivered as option 43 sub-option 116.
    pub vlan: Option<String>,
}

impl Dhcp {
    /// Key/value attributes for tracing. Only non-empty fields are emitted.
    pub fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("DHCP.MACAddress", self.mac.to_string()),
            ("DHCP.IPAddress", self.ip_address.to_string()),
            ("DHCP.SubnetMask", self.subnet_mask.to_string()),
            ("DHCP.LeaseTime", self.lease_time.to_string()),
        ];
        if let Some(gw) = self.default_gateway {
            attrs.push(("DHCP.DefaultGateway", gw.to_string()));
        }
        if !self.name_servers.is_empty() {
            attrs.push(("DHCP.NameServers", join_ips(&self.name_servers)));
        }
        if let Some(h) = &self.hostname {
            attrs.push(("DHCP.Hostname", h.clone()));
        }
        if let Some(d) = &self.domain_name {
            attrs.push(("DHCP.DomainName", d.clone()));
        }
        if let Some(b) = self.broadcast_address {
            attrs.push(("DHCP.BroadcastAddress", b.to_string()));
        }
        if !self.ntp_servers.is_empty() {
            attrs.push(("DHCP.NTPServers", join_ips(&self.ntp_servers)));
        }
        if !self.domain_search.is_empty() {
            attrs.push(("DHCP.DomainSearch", self.domain_search.join(",")));
        }
        attrs
    }
}

impl Netboot {
    /// Key/value attributes for tracing.
    pub fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![("Netboot.AllowNetboot", self.allow_netboot.to_string())];
        if let Some(u) = &self.ipxe_script_url {
            attrs.push(("Netboot.IPXEScriptURL", u.to_string()));
        }
        if let Some(v) = &self.vlan {
            attrs.push(("Netboot.VLAN", v.clone()));
        }
        attrs
    }
}

fn join_ips(ips: &[Ipv4Addr]) -> String {
    ips.iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dhcp_attributes_skip_empty() {
        let d = Dhcp {
            mac: "01:02:03:04:05:06".parse().unwrap(),
            ip_address: Ipv4Addr::new(192, 168, 2, 150),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            default_gateway: None,
            name_servers: vec![],
            hostname: None,
            domain_name: None,
            broadcast_address: None,
            ntp_servers: vec![],
            lease_time: 86400,
            domain_search: vec![],
        };
        let attrs = d.to_attributes();
        assert_eq!(attrs.len(), 4);
        assert!(attrs
            .iter()
            .any(|(k, v)| *k == "DHCP.IPAddress" && v == "192.168.2.150"));
        assert!(!attrs.iter().any(|(k, _)| *k == "DHCP.DefaultGateway"));
    }

    #[test]
    fn test_netboot_attributes() {
        let n = Netboot {
            allow_netboot: true,
            ipxe_script_url: Some(Url::parse("http://boot.example.org/auto.ipxe").unwrap()),
            vlan: Some("100".to_string()),
        };
        let attrs = n.to_attributes();
        assert!(attrs
            .iter()
            .any(|(k, v)| *k == "Netboot.AllowNetboot" && v == "true"));
        assert!(attrs.iter().any(|(k, _)| *k == "Netboot.VLAN"));
    }
}
