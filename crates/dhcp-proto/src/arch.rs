use std::fmt;

/// Client system architecture, DHCP option 93 (RFC 4578).
///
/// Values follow the IANA processor-architecture registry. `Rpi` (41) is
/// the value Raspberry Pi firmware advertises for its broadcom boot ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientArch {
    IntelX86Pc,
    NecPc98,
    EfiItanium,
    DecAlpha,
    ArcX86,
    IntelLeanClient,
    EfiIa32,
    EfiBc,
    EfiXscale,
    EfiX8664,
    EfiArm32,
    EfiArm64,
    EfiX86Http,
    EfiX8664Http,
    EfiArm32Http,
    EfiArm64Http,
    Rpi,
    Unknown(u16),
}

impl ClientArch {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::IntelX86Pc,
            1 => Self::NecPc98,
            2 => Self::EfiItanium,
            3 => Self::DecAlpha,
            4 => Self::ArcX86,
            5 => Self::IntelLeanClient,
            6 => Self::EfiIa32,
            7 => Self::EfiBc,
            8 => Self::EfiXscale,
            9 => Self::EfiX8664,
            10 => Self::EfiArm32,
            11 => Self::EfiArm64,
            15 => Self::EfiX86Http,
            16 => Self::EfiX8664Http,
            18 => Self::EfiArm32Http,
            19 => Self::EfiArm64Http,
            41 => Self::Rpi,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::IntelX86Pc => 0,
            Self::NecPc98 => 1,
            Self::EfiItanium => 2,
            Self::DecAlpha => 3,
            Self::ArcX86 => 4,
            Self::IntelLeanClient => 5,
            Self::EfiIa32 => 6,
            Self::EfiBc => 7,
            Self::EfiXscale => 8,
            Self::EfiX8664 => 9,
            Self::EfiArm32 => 10,
            Self::EfiArm64 => 11,
            Self::EfiX86Http => 15,
            Self::EfiX8664Http => 16,
            Self::EfiArm32Http => 18,
            Self::EfiArm64Http => 19,
            Self::Rpi => 41,
            Self::Unknown(other) => other,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for ClientArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntelX86Pc => f.write_str("Intel x86PC"),
            Self::NecPc98 => f.write_str("NEC/PC98"),
            Self::EfiItanium => f.write_str("EFI Itanium"),
            Self::DecAlpha => f.write_str("DEC Alpha"),
            Self::ArcX86 => f.write_str("Arc x86"),
            Self::IntelLeanClient => f.write_str("Intel Lean Client"),
            Self::EfiIa32 => f.write_str("EFI IA32"),
            Self::EfiBc => f.write_str("EFI BC"),
            Self::EfiXscale => f.write_str("EFI Xscale"),
            Self::EfiX8664 => f.write_str("EFI x86-64"),
            Self::EfiArm32 => f.write_str("EFI ARM32"),
            Self::EfiArm64 => f.write_str("EFI ARM64"),
            Self::EfiX86Http => f.write_str("EFI x86 boot from HTTP"),
            Self::EfiX8664Http => f.write_str("EFI x86-64 boot from HTTP"),
            Self::EfiArm32Http => f.write_str("EFI ARM32 boot from HTTP"),
            Self::EfiArm64Http => f.write_str("EFI ARM64 boot from HTTP"),
            Self::Rpi => f.write_str("Raspberry Pi boot ROM"),
            Self::Unknown(v) => write!(f, "unknown ({v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_round_trip() {
        for v in 0u16..=64 {
            assert_eq!(ClientArch::from_u16(v).to_u16(), v);
        }
    }

    #[test]
    fn test_arch_known() {
        assert!(ClientArch::EfiX8664.is_known());
        assert!(ClientArch::Rpi.is_known());
        assert!(!ClientArch::Unknown(255).is_known());
        assert_eq!(ClientArch::from_u16(255), ClientArch::Unknown(255));
    }
}
