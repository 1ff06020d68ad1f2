//! Mode coordination
//!
//! [`ModeCoordinator`] owns the current broadcast mode and fans transitions
//! out to registered [`ModeObserver`]s (scene visibility, media playback).

pub mod coordinator;
pub mod observer;

pub use coordinator::{AutoSwitch, ModeCoordinator, ModeInfo, TransitionPolicy};
pub use observer::ModeObserver;
