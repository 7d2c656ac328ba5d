//! Die design and color codes.

/// Design and color of a die, as reported in its identity reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DesignAndColor {
    /// Unknown design.
    #[default]
    Unknown,
    /// Onyx Black.
    OnyxBlack,
    /// Hematite Grey.
    HematiteGrey,
    /// Midnight Galaxy.
    MidnightGalaxy,
    /// Aurora Sky.
    AuroraSky,
    /// Clear.
    Clear,
    /// White Aurora.
    WhiteAurora,
    /// Custom design.
    Custom,
    /// A code this crate does not know, kept as received.
    Other(u8),
}

impl DesignAndColor {
    /// Create from raw byte value. Undefined codes map to `Other`.
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::OnyxBlack,
            2 => Self::HematiteGrey,
            3 => Self::MidnightGalaxy,
            4 => Self::AuroraSky,
            5 => Self::Clear,
            6 => Self::WhiteAurora,
            255 => Self::Custom,
            other => Self::Other(other),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::OnyxBlack => 1,
            Self::HematiteGrey => 2,
            Self::MidnightGalaxy => 3,
            Self::AuroraSky => 4,
            Self::Clear => 5,
            Self::WhiteAurora => 6,
            Self::Custom => 255,
            Self::Other(raw) => *raw,
        }
    }

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::OnyxBlack => "Onyx Black",
            Self::HematiteGrey => "Hematite Grey",
            Self::MidnightGalaxy => "Midnight Galaxy",
            Self::AuroraSky => "Aurora Sky",
            Self::Clear => "Clear",
            Self::WhiteAurora => "White Aurora",
            Self::Custom => "Custom",
            Self::Other(_) => "Unrecognized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(DesignAndColor::from_raw(1), DesignAndColor::OnyxBlack);
        assert_eq!(DesignAndColor::from_raw(6), DesignAndColor::WhiteAurora);
        assert_eq!(DesignAndColor::from_raw(255), DesignAndColor::Custom);
        assert_eq!(DesignAndColor::from_raw(0), DesignAndColor::Unknown);
        assert_eq!(DesignAndColor::from_raw(7), DesignAndColor::Other(7));
    }

    #[test]
    fn test_undefined_codes_round_trip() {
        for raw in 0..=u8::MAX {
            assert_eq!(DesignAndColor::from_raw(raw).to_raw(), raw);
        }
        assert_eq!(DesignAndColor::Other(7).name(), "Unrecognized");
    }

    #[test]
    fn test_name() {
        assert_eq!(DesignAndColor::MidnightGalaxy.name(), "Midnight Galaxy");
    }
}
