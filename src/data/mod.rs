//! Data structures for die state.
//!
//! This module contains the value types reported by a die (roll state,
//! faces, battery and design codes, colors) and the live [`DieState`] model.

pub mod battery;
pub mod color;
pub mod design;
pub mod die_state;
pub mod roll;

pub use battery::BatteryState;
pub use color::Rgba;
pub use design::DesignAndColor;
pub use die_state::DieState;
pub use roll::{Face, RollState};
