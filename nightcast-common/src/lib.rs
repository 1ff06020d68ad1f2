//! # Nightcast Common Library
//!
//! Shared vocabulary for the nightcast livestream daemon and its consumers
//! (overlay renderer, tooling):
//! - Broadcast modes and their metadata table (`Mode`)
//! - Typed per-mode state bags (`ModeState`, `ModeStatePatch`)
//! - Event types and the broadcast `EventBus`
//! - Configuration file resolution

pub mod config;
pub mod error;
pub mod events;
pub mod mode;

pub use error::{Error, Result};
pub use events::{EventBus, NightcastEvent, QueueKind};
pub use mode::{Mode, ModeState, ModeStatePatch};
