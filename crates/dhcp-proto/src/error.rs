use thiserror::Error;

/// Errors produced while decoding a DHCPv4 datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The datagram is shorter than the 240-byte fixed header + cookie.
    #[error("packet too small: {0} bytes")]
    TooShort(usize),

    /// Bytes 236..240 are not the RFC 2131 magic cookie.
    #[error("missing DHCP magic cookie")]
    MissingMagicCookie,

    /// An option's declared length runs past the end of the datagram.
    #[error("truncated option {code}")]
    TruncatedOption { code: u8 },

    /// A MAC address string or field could not be parsed.
    #[error("invalid MAC address")]
    InvalidMac,
}
