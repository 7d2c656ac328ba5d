//! Roll state and face types.

/// Motion classification reported by the die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RollState {
    /// State not known yet.
    #[default]
    Unknown,
    /// The die just finished rolling and settled on a face.
    Rolled,
    /// The die is being picked up or held.
    Handling,
    /// The die is tumbling.
    Rolling,
    /// The die is resting but not flat on a face.
    Crooked,
    /// The die is resting on a face.
    OnFace,
    /// A code this crate does not know, kept as received.
    Other(u8),
}

impl RollState {
    /// Create from raw byte value. Undefined codes map to `Other`.
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Rolled,
            2 => Self::Handling,
            3 => Self::Rolling,
            4 => Self::Crooked,
            5 => Self::OnFace,
            other => Self::Other(other),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Rolled => 1,
            Self::Handling => 2,
            Self::Rolling => 3,
            Self::Crooked => 4,
            Self::OnFace => 5,
            Self::Other(raw) => *raw,
        }
    }

    /// Whether the reported face can be trusted as the last good read.
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::OnFace | Self::Rolled)
    }
}

impl std::fmt::Display for RollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Rolled => write!(f, "Rolled"),
            Self::Handling => write!(f, "Handling"),
            Self::Rolling => write!(f, "Rolling"),
            Self::Crooked => write!(f, "Crooked"),
            Self::OnFace => write!(f, "On face"),
            Self::Other(raw) => write!(f, "Other({})", raw),
        }
    }
}

/// A die face: the zero-based index used by the firmware together with the
/// one-based value shown to a player.
///
/// The only constructor is [`Face::from_index`], so `value == index + 1`
/// always holds. The value is widened to `u16` so index 255 maps to 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Face {
    index: u8,
    value: u16,
}

impl Face {
    /// Build a face from the hardware index.
    pub fn from_index(index: u8) -> Self {
        Self {
            index,
            value: u16::from(index) + 1,
        }
    }

    /// Zero-based face index.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// One-based face value.
    pub fn value(&self) -> u16 {
        self.value
    }
}

impl std::fmt::Display for Face {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_state_from_raw() {
        assert_eq!(RollState::from_raw(0), RollState::Unknown);
        assert_eq!(RollState::from_raw(1), RollState::Rolled);
        assert_eq!(RollState::from_raw(2), RollState::Handling);
        assert_eq!(RollState::from_raw(3), RollState::Rolling);
        assert_eq!(RollState::from_raw(4), RollState::Crooked);
        assert_eq!(RollState::from_raw(5), RollState::OnFace);
        assert_eq!(RollState::from_raw(42), RollState::Other(42));
    }

    #[test]
    fn test_roll_state_keeps_undefined_codes() {
        for raw in 0..=u8::MAX {
            assert_eq!(RollState::from_raw(raw).to_raw(), raw);
        }
        assert!(!RollState::Other(9).is_stable());
        assert_eq!(RollState::Other(9).to_string(), "Other(9)");
    }

    #[test]
    fn test_roll_state_is_stable() {
        assert!(RollState::OnFace.is_stable());
        assert!(RollState::Rolled.is_stable());
        assert!(!RollState::Rolling.is_stable());
        assert!(!RollState::Handling.is_stable());
        assert!(!RollState::Crooked.is_stable());
        assert!(!RollState::Unknown.is_stable());
    }

    #[test]
    fn test_face_from_index() {
        let face = Face::from_index(0);
        assert_eq!(face.index(), 0);
        assert_eq!(face.value(), 1);

        let face = Face::from_index(19);
        assert_eq!(face.value(), 20);
        assert_eq!(face.to_string(), "20");
    }

    #[test]
    fn test_face_value_does_not_wrap() {
        let face = Face::from_index(u8::MAX);
        assert_eq!(face.index(), 255);
        assert_eq!(face.value(), 256);
    }
}
