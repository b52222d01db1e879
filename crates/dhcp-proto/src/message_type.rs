use std::fmt;

/// DHCP message types as defined in RFC 2132 (option 53).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Discover),
            2 => Some(Self::Offer),
            3 => Some(Self::Request),
            4 => Some(Self::Decline),
            5 => Some(Self::Ack),
            6 => Some(Self::Nak),
            7 => Some(Self::Release),
            8 => Some(Self::Inform),
            _ => None,
        }
    }
}

impl From<MessageType> for u8 {
    fn from(mt: MessageType) -> u8 {
        mt as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discover => "DISCOVER",
            Self::Offer => "OFFER",
            Self::Request => "REQUEST",
            Self::Decline => "DECLINE",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Release => "RELEASE",
            Self::Inform => "INFORM",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_to_u8() {
        assert_eq!(u8::from(MessageType::Discover), 1);
        assert_eq!(u8::from(MessageType::Offer), 2);
        assert_eq!(u8::from(MessageType::Request), 3);
        assert_eq!(u8::from(MessageType::Ack), 5);
    }

    #[test]
    fn test_message_type_from_u8() {
        assert_eq!(MessageType::from_u8(1), Some(MessageType::Discover));
        assert_eq!(MessageType::from_u8(2), Some(MessageType::Offer));
        assert_eq!(MessageType::from_u8(5), Some(MessageType::Ack));
        assert_eq!(MessageType::from_u8(99), None);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::Discover.to_string(), "DISCOVER");
        assert_eq!(MessageType::Nak.to_string(), "NAK");
    }
}
