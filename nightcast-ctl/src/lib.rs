//! # nightcast-ctl
//!
//! Control daemon for an unattended livestream: decides which mode the
//! stream is in (live broadcast, PK battle, rotation playback, listener
//! song requests) and drives an external compositor or player so the
//! screen always shows the right thing.
//!
//! - [`mode`]: the mode coordinator and its observer fan-out
//! - [`playback`]: per-mode playback with snapshot/resume
//! - [`capability`]: OBS WebSocket v5 and VLC HTTP backends
//! - [`library`]: song and replay indexes, request queues, now playing
//! - [`chat`]: chat commands and paced replies
//! - [`watchdog`]: background loops that keep requests moving
//! - [`api`]: HTTP/SSE control surface

pub mod api;
pub mod capability;
pub mod chat;
pub mod config;
pub mod error;
pub mod library;
pub mod mode;
pub mod playback;
pub mod scene;
pub mod watchdog;

pub use error::{Error, Result};
