//! Live model of one connected die.

use chrono::{DateTime, TimeZone, Utc};

use crate::data::{BatteryState, DesignAndColor, Face, RollState};
use crate::protocol::{BatteryLevelMessage, IAmADie, Message, RollStateMessage};

/// Everything known about a die during one session.
///
/// Created empty when the connection comes up and only changed by applying
/// decoded messages received from the die.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DieState {
    /// Unique die identifier, 0 until the identity reply is applied.
    pub pixel_id: u32,
    /// Number of LEDs.
    pub led_count: u8,
    /// Design and color.
    pub design_and_color: DesignAndColor,
    /// Firmware build time, UNIX seconds.
    pub build_timestamp: u32,
    /// Hash of the animation data set.
    pub data_set_hash: u32,
    /// Free flash for animation data, in bytes.
    pub available_flash: u16,

    /// Last stable face.
    pub face: Face,
    /// Most recent roll state, stable or not.
    pub roll_state: RollState,
    /// Battery level in percent.
    pub battery_level: u8,
    /// Battery state code.
    pub battery_state: BatteryState,
    /// Whether the battery is charging.
    pub battery_charging: bool,
    /// When the last stable face was read.
    pub last_rolled: Option<DateTime<Utc>>,
}

impl DieState {
    /// Create an empty, unresolved state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the identity reply has been received.
    pub fn is_identified(&self) -> bool {
        self.pixel_id != 0
    }

    /// Firmware build time, if the identity is known.
    pub fn build_time(&self) -> Option<DateTime<Utc>> {
        if !self.is_identified() {
            return None;
        }
        Utc.timestamp_opt(self.build_timestamp as i64, 0).single()
    }

    /// Apply an identity reply.
    ///
    /// Identity fields are written only while the die is unresolved, so the
    /// pixel id changes at most once. The state snapshot in the reply is
    /// always applied.
    pub fn apply_identity(&mut self, msg: &IAmADie) {
        if !self.is_identified() {
            self.pixel_id = msg.pixel_id;
            self.led_count = msg.led_count;
            self.design_and_color = msg.design_and_color;
            self.build_timestamp = msg.build_timestamp;
            self.data_set_hash = msg.data_set_hash;
            self.available_flash = msg.available_flash;
        }

        self.roll_state = msg.roll_state;
        self.face = msg.face;
        self.set_battery(msg.battery_level, msg.battery_state);
        self.last_rolled = Some(Utc::now());
    }

    /// Apply a roll state change.
    ///
    /// Transitional states only update `roll_state`; the last stable face and
    /// its timestamp are kept.
    pub fn apply_roll_state(&mut self, msg: &RollStateMessage) {
        self.roll_state = msg.roll_state;

        if msg.roll_state.is_stable() {
            self.face = msg.face;
            self.last_rolled = Some(Utc::now());
        }
    }

    /// Apply a battery report.
    pub fn apply_battery(&mut self, msg: &BatteryLevelMessage) {
        self.set_battery(msg.battery_level, msg.battery_state);
    }

    /// Route a decoded message to the matching mutator.
    ///
    /// Returns `false` for messages that carry no die state.
    pub fn apply(&mut self, message: &Message) -> bool {
        match message {
            Message::IAmADie(msg) => self.apply_identity(msg),
            Message::RollState(msg) => self.apply_roll_state(msg),
            Message::BatteryLevel(msg) => self.apply_battery(msg),
            _ => return false,
        }
        true
    }

    fn set_battery(&mut self, level: u8, state: BatteryState) {
        self.battery_level = level;
        self.battery_state = state;
        self.battery_charging = state.is_charging();
    }
}
