//! The numeric message catalog of the Pixels protocol.
//!
//! Every frame exchanged with a die starts with one of these tags. Only a
//! handful are decoded by this crate, but the whole catalog is kept stable
//! so that frames we do not understand can still be named in logs.

/// Pixels message types, as carried in byte 0 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MessageType {
    /// No message.
    None = 0,
    /// Identity request sent right after connecting.
    WhoAreYou = 1,
    /// Identity reply carrying a snapshot of the die state.
    IAmADie = 2,
    /// Roll state change notification.
    RollState = 3,
    /// Accelerometer telemetry.
    Telemetry = 4,
    /// Bulk transfer setup.
    BulkSetup = 5,
    /// Bulk transfer setup acknowledgment.
    BulkSetupAck = 6,
    /// Bulk transfer data chunk.
    BulkData = 7,
    /// Bulk transfer data acknowledgment.
    BulkDataAck = 8,
    /// Start of an animation set transfer.
    TransferAnimationSet = 9,
    /// Animation set transfer acknowledgment.
    TransferAnimationSetAck = 10,
    /// Animation set transfer completed.
    TransferAnimationSetFinished = 11,
    /// Start of a settings transfer.
    TransferSettings = 12,
    /// Settings transfer acknowledgment.
    TransferSettingsAck = 13,
    /// Settings transfer completed.
    TransferSettingsFinished = 14,
    /// Start of a test animation set transfer.
    TransferTestAnimationSet = 15,
    /// Test animation set transfer acknowledgment.
    TransferTestAnimationSetAck = 16,
    /// Test animation set transfer completed.
    TransferTestAnimationSetFinished = 17,
    /// Debug log line from the firmware.
    DebugLog = 18,
    /// Play an animation.
    PlayAnimation = 19,
    /// Animation event.
    PlayAnimationEvent = 20,
    /// Stop an animation.
    StopAnimation = 21,
    /// Remote action trigger.
    RemoteAction = 22,
    /// Ask the die for its roll state.
    RequestRollState = 23,
    /// Ask the die for its animation set.
    RequestAnimationSet = 24,
    /// Ask the die for its settings.
    RequestSettings = 25,
    /// Ask the die to stream telemetry.
    RequestTelemetry = 26,
    /// Reprogram the default animation set.
    ProgramDefaultAnimationSet = 27,
    /// Default animation set programming completed.
    ProgramDefaultAnimationSetFinished = 28,
    /// Blink the LEDs.
    Blink = 29,
    /// Blink acknowledgment.
    BlinkAck = 30,
    /// Ask for the default animation set color.
    RequestDefaultAnimationSetColor = 31,
    /// Default animation set color.
    DefaultAnimationSetColor = 32,
    /// Ask the die for its battery level.
    RequestBatteryLevel = 33,
    /// Battery level report.
    BatteryLevel = 34,
    /// Ask the die for the RSSI it sees.
    RequestRssi = 35,
    /// RSSI report.
    Rssi = 36,
    /// Start calibration.
    Calibrate = 37,
    /// Calibrate a single face.
    CalibrateFace = 38,
    /// Die-initiated user notification.
    NotifyUser = 39,
    /// User notification acknowledgment.
    NotifyUserAck = 40,
    /// Run the hardware self test.
    TestHardware = 41,
    /// Run the LED loopback test.
    TestLedLoopback = 42,
    /// LED loopback result.
    LedLoopback = 43,
    /// Set the firmware top level state.
    SetTopLevelState = 44,
    /// Reprogram default parameters.
    ProgramDefaultParameters = 45,
    /// Default parameter programming completed.
    ProgramDefaultParametersFinished = 46,
    /// Set the design and color code.
    SetDesignAndColor = 47,
    /// Design and color acknowledgment.
    SetDesignAndColorAck = 48,
    /// Set the current behavior.
    SetCurrentBehavior = 49,
    /// Current behavior acknowledgment.
    SetCurrentBehaviorAck = 50,
    /// Set the advertised name.
    SetName = 51,
    /// Name acknowledgment.
    SetNameAck = 52,
    /// Put the die to sleep.
    Sleep = 53,
    /// Leave validation mode.
    ExitValidation = 54,
    /// Start of an instant animation set transfer.
    TransferInstantAnimationSet = 55,
    /// Instant animation set transfer acknowledgment.
    TransferInstantAnimationSetAck = 56,
    /// Instant animation set transfer completed.
    TransferInstantAnimationSetFinished = 57,
    /// Play an instant animation.
    PlayInstantAnimation = 58,
    /// Stop all animations.
    StopAllAnimations = 59,
    /// Ask the die for its temperature.
    RequestTemperature = 60,
    /// Temperature report.
    Temperature = 61,
    /// Enable battery charging.
    EnableCharging = 62,
    /// Disable battery charging.
    DisableCharging = 63,
    /// Discharge the battery.
    Discharge = 64,
}

impl MessageType {
    /// Every message type, indexed by its wire value.
    pub const ALL: [MessageType; 65] = [
        Self::None,
        Self::WhoAreYou,
        Self::IAmADie,
        Self::RollState,
        Self::Telemetry,
        Self::BulkSetup,
        Self::BulkSetupAck,
        Self::BulkData,
        Self::BulkDataAck,
        Self::TransferAnimationSet,
        Self::TransferAnimationSetAck,
        Self::TransferAnimationSetFinished,
        Self::TransferSettings,
        Self::TransferSettingsAck,
        Self::TransferSettingsFinished,
        Self::TransferTestAnimationSet,
        Self::TransferTestAnimationSetAck,
        Self::TransferTestAnimationSetFinished,
        Self::DebugLog,
        Self::PlayAnimation,
        Self::PlayAnimationEvent,
        Self::StopAnimation,
        Self::RemoteAction,
        Self::RequestRollState,
        Self::RequestAnimationSet,
        Self::RequestSettings,
        Self::RequestTelemetry,
        Self::ProgramDefaultAnimationSet,
        Self::ProgramDefaultAnimationSetFinished,
        Self::Blink,
        Self::BlinkAck,
        Self::RequestDefaultAnimationSetColor,
        Self::DefaultAnimationSetColor,
        Self::RequestBatteryLevel,
        Self::BatteryLevel,
        Self::RequestRssi,
        Self::Rssi,
        Self::Calibrate,
        Self::CalibrateFace,
        Self::NotifyUser,
        Self::NotifyUserAck,
        Self::TestHardware,
        Self::TestLedLoopback,
        Self::LedLoopback,
        Self::SetTopLevelState,
        Self::ProgramDefaultParameters,
        Self::ProgramDefaultParametersFinished,
        Self::SetDesignAndColor,
        Self::SetDesignAndColorAck,
        Self::SetCurrentBehavior,
        Self::SetCurrentBehaviorAck,
        Self::SetName,
        Self::SetNameAck,
        Self::Sleep,
        Self::ExitValidation,
        Self::TransferInstantAnimationSet,
        Self::TransferInstantAnimationSetAck,
        Self::TransferInstantAnimationSetFinished,
        Self::PlayInstantAnimation,
        Self::StopAllAnimations,
        Self::RequestTemperature,
        Self::Temperature,
        Self::EnableCharging,
        Self::DisableCharging,
        Self::Discharge,
    ];

    /// Create from raw byte value.
    ///
    /// Returns `None` for tags outside the catalog.
    pub fn from_raw(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Fixed wire size for the message types this crate encodes or decodes.
    ///
    /// `None` means the layout is not modelled here.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::WhoAreYou
            | Self::RequestRollState
            | Self::BlinkAck
            | Self::RequestBatteryLevel => Some(1),
            Self::RollState | Self::BatteryLevel => Some(3),
            Self::Blink => Some(14),
            Self::IAmADie => Some(22),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_indexed_by_wire_value() {
        for (index, message_type) in MessageType::ALL.iter().enumerate() {
            assert_eq!(message_type.to_raw() as usize, index);
        }
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(MessageType::from_raw(0), Some(MessageType::None));
        assert_eq!(MessageType::from_raw(1), Some(MessageType::WhoAreYou));
        assert_eq!(MessageType::from_raw(2), Some(MessageType::IAmADie));
        assert_eq!(MessageType::from_raw(29), Some(MessageType::Blink));
        assert_eq!(MessageType::from_raw(33), Some(MessageType::RequestBatteryLevel));
        assert_eq!(MessageType::from_raw(34), Some(MessageType::BatteryLevel));
        assert_eq!(MessageType::from_raw(64), Some(MessageType::Discharge));
        assert_eq!(MessageType::from_raw(65), None);
        assert_eq!(MessageType::from_raw(200), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(MessageType::IAmADie.to_string(), "IAmADie");
        assert_eq!(MessageType::BlinkAck.to_string(), "BlinkAck");
    }

    #[test]
    fn test_fixed_size() {
        assert_eq!(MessageType::IAmADie.fixed_size(), Some(22));
        assert_eq!(MessageType::Blink.fixed_size(), Some(14));
        assert_eq!(MessageType::RollState.fixed_size(), Some(3));
        assert_eq!(MessageType::Telemetry.fixed_size(), None);
    }
}
