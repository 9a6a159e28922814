/// Playback state of one session and the phase derived from it
use serde::{Serialize, Deserialize};
use strum_macros::EnumString;

use super::track::Track;

/// Progress value written on every track change
///
/// It is nonzero so that the end-of-track detection, which waits for the
/// remote client to report zero progress, does not fire before the client
/// reported anything for the new track.
pub const PROGRESS_SENTINEL_MS: u64 = 1;

/// Phase of the playback state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum PlayerPhase {
    /// No current track, nothing is being consumed from the queue
    #[serde(rename = "idle")]
    #[strum(serialize = "idle")]
    Idle,
    /// A track is current and not paused
    #[serde(rename = "playing")]
    #[strum(serialize = "playing")]
    Playing,
    /// A track is current and paused
    #[serde(rename = "paused")]
    #[strum(serialize = "paused")]
    Paused,
    /// Progress read zero on the last tick; one more zero read ends the track
    #[serde(rename = "waiting")]
    #[strum(serialize = "waiting")]
    Waiting,
}

impl Default for PlayerPhase {
    fn default() -> Self {
        PlayerPhase::Idle
    }
}

impl std::fmt::Display for PlayerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerPhase::Idle => write!(f, "idle"),
            PlayerPhase::Playing => write!(f, "playing"),
            PlayerPhase::Paused => write!(f, "paused"),
            PlayerPhase::Waiting => write!(f, "waiting"),
        }
    }
}

/// Per-session playback record
///
/// Only the playback controller mutates this. Readers get clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_track: Option<Track>,
    pub progress_ms: u64,
    pub total_length_ms: u64,
    pub paused: bool,
    /// Queue-level looping, independent of the remote client's own repeat
    pub repeat: bool,
    pub songs_played: u32,
    /// Debounce flag for end-of-track detection
    pub awaiting_second_tick: bool,
    /// Last `timestamp` reported by the remote client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remote_timestamp: Option<i64>,
    /// Track the remote client last reported as loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_track: Option<Track>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            progress_ms: 0,
            total_length_ms: 0,
            paused: true,
            repeat: false,
            songs_played: 0,
            awaiting_second_tick: false,
            last_remote_timestamp: None,
            remote_track: None,
        }
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> PlayerPhase {
        if self.current_track.is_none() {
            PlayerPhase::Idle
        } else if self.awaiting_second_tick {
            PlayerPhase::Waiting
        } else if self.paused {
            PlayerPhase::Paused
        } else {
            PlayerPhase::Playing
        }
    }

    /// Make `track` current and reset progress tracking for it
    pub fn start_track(&mut self, track: Track) {
        self.total_length_ms = track.duration_ms;
        self.current_track = Some(track);
        self.progress_ms = PROGRESS_SENTINEL_MS;
        self.awaiting_second_tick = false;
        self.paused = false;
    }

    /// Drop the current track and fall back to the idle shape
    pub fn clear_track(&mut self) {
        self.current_track = None;
        self.progress_ms = 0;
        self.total_length_ms = 0;
        self.awaiting_second_tick = false;
        self.paused = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_phase_derivation() {
        let mut state = PlaybackState::new();
        assert_eq!(state.phase(), PlayerPhase::Idle);

        state.start_track(Track::new("1", "a", "b", "c", "spotify:track:1", 3000));
        assert_eq!(state.phase(), PlayerPhase::Playing);
        assert_eq!(state.progress_ms, PROGRESS_SENTINEL_MS);
        assert_eq!(state.total_length_ms, 3000);

        state.paused = true;
        assert_eq!(state.phase(), PlayerPhase::Paused);

        state.awaiting_second_tick = true;
        assert_eq!(state.phase(), PlayerPhase::Waiting);

        state.clear_track();
        assert_eq!(state.phase(), PlayerPhase::Idle);
        assert!(state.paused);
    }

    #[test]
    fn test_phase_parse_and_display() {
        assert_eq!(PlayerPhase::from_str("waiting").unwrap(), PlayerPhase::Waiting);
        assert_eq!(PlayerPhase::Paused.to_string(), "paused");
    }
}
