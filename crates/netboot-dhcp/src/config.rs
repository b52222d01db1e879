use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddrV4};
use url::Url;

/// Per-handler configuration, fixed at construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// IP address used as the server identifier (option 54).
    pub server_ip: Ipv4Addr,

    /// Whether replies carry generic IP configuration (mask, gateway,
    /// DNS, lease, ...). Reservation handler only.
    #[serde(default = "default_true")]
    pub dhcp_enabled: bool,

    /// When true, the bootfile name is suffixed with the traceparent and
    /// option 43 sub-option 69 carries its binary encoding, so later boot
    /// stages can join the trace.
    #[serde(default)]
    pub otel_enabled: bool,

    pub netboot: NetbootConfig,
}

/// Netboot-specific configuration shared by both handler personalities.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetbootConfig {
    /// Master switch for serving netboot options at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// IP:port of the TFTP server holding the iPXE binaries.
    pub tftp_addr: SocketAddrV4,

    /// Base URL of the HTTP server holding the iPXE binaries.
    pub http_url: Url,

    /// Default iPXE script URL, overridable per host by the backend.
    #[serde(default)]
    pub script_url: Option<Url>,

    /// Custom user class (option 77) that marks our own chainloaded iPXE,
    /// used to break out of the chainload loop.
    #[serde(default)]
    pub user_class: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
serverIp: 192.168.2.225
otelEnabled: true
netboot:
  tftpAddr: 192.168.2.225:69
  httpUrl: http://192.168.2.225:8080
  scriptUrl: http://boot.example.org/auto.ipxe
"#;
        let cfg: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server_ip, Ipv4Addr::new(192, 168, 2, 225));
        assert!(cfg.dhcp_enabled);
        assert!(cfg.otel_enabled);
        assert!(cfg.netboot.enabled);
        assert_eq!(*cfg.netboot.tftp_addr.ip(), Ipv4Addr::new(192, 168, 2, 225));
        assert_eq!(cfg.netboot.tftp_addr.port(), 69);
        assert_eq!(
            cfg.netboot.script_url.as_ref().unwrap().as_str(),
            "http://boot.example.org/auto.ipxe"
        );
        assert!(cfg.netboot.user_class.is_none());
    }
}
