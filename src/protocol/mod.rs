//! Protocol module for parsing and constructing messages.
//!
//! This module contains the implementations for:
//! - The numeric message catalog
//! - Decoding notification frames and encoding commands

pub mod message_type;
pub mod messages;

pub use message_type::MessageType;
pub use messages::{BatteryLevelMessage, Blink, IAmADie, Message, RollStateMessage};
