//! Battery state codes.

/// Battery state code reported by the die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryState {
    /// State not known.
    #[default]
    Unknown,
    /// Battery is fine.
    Ok,
    /// Battery is low.
    Low,
    /// Switching between charging and not charging.
    Transition,
    /// On the charger but not charging properly.
    BadCharging,
    /// Battery error.
    Error,
    /// Charging.
    Charging,
    /// Trickle charging near full.
    TrickleCharge,
    /// Charge completed.
    Done,
    /// Too cold to charge.
    LowTemp,
    /// Too hot to charge.
    HighTemp,
    /// A code this crate does not know, kept as received.
    Other(u8),
}

impl BatteryState {
    /// Create from raw byte value. Undefined codes map to `Other`.
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Ok,
            2 => Self::Low,
            3 => Self::Transition,
            4 => Self::BadCharging,
            5 => Self::Error,
            6 => Self::Charging,
            7 => Self::TrickleCharge,
            8 => Self::Done,
            9 => Self::LowTemp,
            10 => Self::HighTemp,
            other => Self::Other(other),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Ok => 1,
            Self::Low => 2,
            Self::Transition => 3,
            Self::BadCharging => 4,
            Self::Error => 5,
            Self::Charging => 6,
            Self::TrickleCharge => 7,
            Self::Done => 8,
            Self::LowTemp => 9,
            Self::HighTemp => 10,
            Self::Other(raw) => *raw,
        }
    }

    /// Whether the die counts as charging.
    ///
    /// Only `Charging` qualifies. `TrickleCharge` and `Done` also mean the die
    /// sits on a charger but are reported as not charging.
    pub fn is_charging(&self) -> bool {
        matches!(self, Self::Charging)
    }

    /// Whether the battery needs attention.
    pub fn is_low(&self) -> bool {
        matches!(self, Self::Low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_roundtrip() {
        for raw in 0..=u8::MAX {
            assert_eq!(BatteryState::from_raw(raw).to_raw(), raw);
        }
        assert_eq!(BatteryState::from_raw(0), BatteryState::Unknown);
        assert_eq!(BatteryState::from_raw(11), BatteryState::Other(11));
        assert_eq!(BatteryState::from_raw(255), BatteryState::Other(255));
    }

    #[test]
    fn test_only_charging_is_charging() {
        for raw in 0..=10u8 {
            let state = BatteryState::from_raw(raw);
            assert_eq!(state.is_charging(), state == BatteryState::Charging);
        }
        assert!(!BatteryState::TrickleCharge.is_charging());
        assert!(!BatteryState::Done.is_charging());
        assert!(!BatteryState::Other(106).is_charging());
    }
}
