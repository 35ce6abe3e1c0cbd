//! Event-bus protocol shared by the session actor and the control loop.
//!
//! Every user control and player notification maps to exactly one message;
//! the session actor consumes them one at a time, so each message corresponds
//! to a single state-machine transition.

use std::path::PathBuf;

use crate::catalog::{CatalogOrder, Period};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Session(SessionMessage),
    Player(PlayerMessage),
}

/// Parameters for building a playback session, taken from config defaults
/// and optionally overridden on the command line.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub user: String,
    pub min_plays: u32,
    pub max_plays: u32,
    pub period: Period,
    pub order: CatalogOrder,
}

/// User controls driving the session state machine.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// Build the catalog and start playback.
    Start(SessionParams),
    /// Advance without counting the interrupted track as a play.
    Skip,
    /// Return to the previous track.
    Previous,
    /// Scrobble the current track, then advance.
    ScrobbleAndAdvance,
    /// Flip the loop flag; takes effect on the next advance.
    ToggleLoop,
    /// Replace the current track's media ID with a user-supplied one.
    OverrideMedia(String),
    /// Merge a snapshot file into the local cache layer.
    ImportCache(PathBuf),
    /// Write the full merged cache view to a snapshot file.
    ExportCache(PathBuf),
    /// Stop the session actor.
    Shutdown,
}

/// Notifications from the media player boundary.
#[derive(Debug, Clone)]
pub enum PlayerMessage {
    /// Playback of the current media naturally completed.
    MediaEnded,
}
