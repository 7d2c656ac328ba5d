//! Typed Pixels messages and their wire encoding.
//!
//! Frame format:
//! - Byte 0: message type tag (see [`MessageType`])
//! - Remaining bytes: fixed-offset fields, no padding, no length prefix
//! - Multi-byte integers are little-endian
//!
//! The layout is implied by the tag, so a frame is only decodable if it is at
//! least as long as the fixed layout of its type.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::data::{BatteryState, DesignAndColor, Face, Rgba, RollState};
use crate::error::DecodeError;
use crate::protocol::MessageType;

/// Identity reply, sent by the die in answer to `WhoAreYou`.
///
/// Besides the identity it carries a snapshot of the observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IAmADie {
    /// Number of LEDs.
    pub led_count: u8,
    /// Design and color code.
    pub design_and_color: DesignAndColor,
    /// Reserved byte, kept as received.
    pub reserved: u8,
    /// Hash of the animation data set stored on the die.
    pub data_set_hash: u32,
    /// Unique die identifier. Never zero on a real die.
    pub pixel_id: u32,
    /// Free flash for animation data, in bytes.
    pub available_flash: u16,
    /// Firmware build time, UNIX seconds.
    pub build_timestamp: u32,
    /// Current roll state.
    pub roll_state: RollState,
    /// Current face.
    pub face: Face,
    /// Battery level in percent.
    pub battery_level: u8,
    /// Battery state code.
    pub battery_state: BatteryState,
}

impl IAmADie {
    /// Wire size including the tag.
    pub const SIZE: usize = 22;

    fn parse(mut buf: &[u8]) -> Self {
        Self {
            led_count: buf.get_u8(),
            design_and_color: DesignAndColor::from_raw(buf.get_u8()),
            reserved: buf.get_u8(),
            data_set_hash: buf.get_u32_le(),
            pixel_id: buf.get_u32_le(),
            available_flash: buf.get_u16_le(),
            build_timestamp: buf.get_u32_le(),
            roll_state: RollState::from_raw(buf.get_u8()),
            face: Face::from_index(buf.get_u8()),
            battery_level: buf.get_u8(),
            battery_state: BatteryState::from_raw(buf.get_u8()),
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.led_count);
        buf.put_u8(self.design_and_color.to_raw());
        buf.put_u8(self.reserved);
        buf.put_u32_le(self.data_set_hash);
        buf.put_u32_le(self.pixel_id);
        buf.put_u16_le(self.available_flash);
        buf.put_u32_le(self.build_timestamp);
        buf.put_u8(self.roll_state.to_raw());
        buf.put_u8(self.face.index());
        buf.put_u8(self.battery_level);
        buf.put_u8(self.battery_state.to_raw());
    }
}

/// Roll state change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RollStateMessage {
    /// New roll state.
    pub roll_state: RollState,
    /// Face reported with the state. Only meaningful for stable states.
    pub face: Face,
}

impl RollStateMessage {
    /// Wire size including the tag.
    pub const SIZE: usize = 3;

    fn parse(mut buf: &[u8]) -> Self {
        Self {
            roll_state: RollState::from_raw(buf.get_u8()),
            face: Face::from_index(buf.get_u8()),
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.roll_state.to_raw());
        buf.put_u8(self.face.index());
    }
}

/// Battery level report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryLevelMessage {
    /// Battery level in percent (0-100).
    pub battery_level: u8,
    /// Battery state code.
    pub battery_state: BatteryState,
}

impl BatteryLevelMessage {
    /// Wire size including the tag.
    pub const SIZE: usize = 3;

    fn parse(mut buf: &[u8]) -> Self {
        Self {
            battery_level: buf.get_u8(),
            battery_state: BatteryState::from_raw(buf.get_u8()),
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.battery_level);
        buf.put_u8(self.battery_state.to_raw());
    }
}

/// Blink the die LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Blink {
    /// Number of flashes.
    pub count: u8,
    /// Total duration in milliseconds.
    pub duration_ms: u16,
    /// Flash color.
    pub color: Rgba,
    /// Faces to light, one bit per face index.
    pub face_mask: u32,
    /// Fade amount, 0 for hard on/off.
    pub fade: u8,
    /// Number of times to repeat the whole blink.
    pub loop_count: u8,
}

impl Blink {
    /// Wire size including the tag.
    pub const SIZE: usize = 14;

    /// Face mask lighting every face.
    pub const ALL_FACES: u32 = 0xFFFF_FFFF;

    /// A blink on every face, no fade, played once.
    pub fn new(count: u8, duration_ms: u16, color: Rgba) -> Self {
        Self {
            count,
            duration_ms,
            color,
            face_mask: Self::ALL_FACES,
            fade: 0,
            loop_count: 1,
        }
    }

    /// Restrict the blink to the faces in `face_mask`.
    pub fn with_face_mask(mut self, face_mask: u32) -> Self {
        self.face_mask = face_mask;
        self
    }

    /// Set the fade amount.
    pub fn with_fade(mut self, fade: u8) -> Self {
        self.fade = fade;
        self
    }

    /// Set the loop count.
    pub fn with_loop_count(mut self, loop_count: u8) -> Self {
        self.loop_count = loop_count;
        self
    }

    fn parse(mut buf: &[u8]) -> Self {
        let count = buf.get_u8();
        let duration_ms = buf.get_u16_le();
        // Color goes over the air as B, G, R, A.
        let b = buf.get_u8();
        let g = buf.get_u8();
        let r = buf.get_u8();
        let a = buf.get_u8();
        Self {
            count,
            duration_ms,
            color: Rgba::new(r, g, b, a),
            face_mask: buf.get_u32_le(),
            fade: buf.get_u8(),
            loop_count: buf.get_u8(),
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.count);
        buf.put_u16_le(self.duration_ms);
        buf.put_u8(self.color.b);
        buf.put_u8(self.color.g);
        buf.put_u8(self.color.r);
        buf.put_u8(self.color.a);
        buf.put_u32_le(self.face_mask);
        buf.put_u8(self.fade);
        buf.put_u8(self.loop_count);
    }
}

/// A decoded Pixels frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Identity request.
    WhoAreYou,
    /// Identity reply.
    IAmADie(IAmADie),
    /// Roll state change.
    RollState(RollStateMessage),
    /// Ask for a roll state notification.
    RequestRollState,
    /// Blink command.
    Blink(Blink),
    /// Blink acknowledgment. Not correlated with the blink that caused it.
    BlinkAck,
    /// Ask for a battery level report.
    RequestBatteryLevel,
    /// Battery level report.
    BatteryLevel(BatteryLevelMessage),
    /// A cataloged message type this crate does not decode.
    Other {
        /// Message type from byte 0.
        message_type: MessageType,
        /// The complete frame, tag included.
        data: Bytes,
    },
    /// A tag outside the known catalog.
    Unknown {
        /// Raw tag from byte 0.
        tag: u8,
        /// The complete frame, tag included.
        data: Bytes,
    },
}

impl Message {
    /// Decode a raw notification buffer.
    ///
    /// Byte 0 selects the layout. Frames longer than the layout are accepted
    /// and the trailing bytes ignored; shorter frames are rejected.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let (&tag, body) = data.split_first().ok_or(DecodeError::Empty)?;

        let Some(message_type) = MessageType::from_raw(tag) else {
            return Ok(Self::Unknown {
                tag,
                data: Bytes::copy_from_slice(data),
            });
        };

        if let Some(expected) = message_type.fixed_size() {
            if data.len() < expected {
                return Err(DecodeError::TruncatedMessage {
                    message_type,
                    expected,
                    actual: data.len(),
                });
            }
        }

        let message = match message_type {
            MessageType::WhoAreYou => Self::WhoAreYou,
            MessageType::IAmADie => Self::IAmADie(IAmADie::parse(body)),
            MessageType::RollState => Self::RollState(RollStateMessage::parse(body)),
            MessageType::RequestRollState => Self::RequestRollState,
            MessageType::Blink => Self::Blink(Blink::parse(body)),
            MessageType::BlinkAck => Self::BlinkAck,
            MessageType::RequestBatteryLevel => Self::RequestBatteryLevel,
            MessageType::BatteryLevel => Self::BatteryLevel(BatteryLevelMessage::parse(body)),
            other => Self::Other {
                message_type: other,
                data: Bytes::copy_from_slice(data),
            },
        };

        Ok(message)
    }

    /// Encode to a wire frame with the tag in byte 0.
    pub fn encode(&self) -> Bytes {
        let tag = self.tag();
        let size = match self {
            Self::Other { data, .. } | Self::Unknown { data, .. } => return data.clone(),
            Self::WhoAreYou
            | Self::RequestRollState
            | Self::BlinkAck
            | Self::RequestBatteryLevel => 1,
            Self::IAmADie(_) => IAmADie::SIZE,
            Self::RollState(_) => RollStateMessage::SIZE,
            Self::Blink(_) => Blink::SIZE,
            Self::BatteryLevel(_) => BatteryLevelMessage::SIZE,
        };

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(tag);

        match self {
            Self::WhoAreYou | Self::RequestRollState | Self::BlinkAck | Self::RequestBatteryLevel => {}
            Self::IAmADie(msg) => msg.put(&mut buf),
            Self::RollState(msg) => msg.put(&mut buf),
            Self::Blink(msg) => msg.put(&mut buf),
            Self::BatteryLevel(msg) => msg.put(&mut buf),
            Self::Other { .. } | Self::Unknown { .. } => {}
        }

        buf.freeze()
    }

    /// Message type, or `None` for tags outside the catalog.
    pub fn message_type(&self) -> Option<MessageType> {
        let message_type = match self {
            Self::WhoAreYou => MessageType::WhoAreYou,
            Self::IAmADie(_) => MessageType::IAmADie,
            Self::RollState(_) => MessageType::RollState,
            Self::RequestRollState => MessageType::RequestRollState,
            Self::Blink(_) => MessageType::Blink,
            Self::BlinkAck => MessageType::BlinkAck,
            Self::RequestBatteryLevel => MessageType::RequestBatteryLevel,
            Self::BatteryLevel(_) => MessageType::BatteryLevel,
            Self::Other { message_type, .. } => *message_type,
            Self::Unknown { .. } => return None,
        };
        Some(message_type)
    }

    /// Raw tag byte.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Unknown { tag, .. } => *tag,
            other => other.message_type().map(|t| t.to_raw()).unwrap_or_default(),
        }
    }
}

impl From<Blink> for Message {
    fn from(blink: Blink) -> Self {
        Self::Blink(blink)
    }
}
