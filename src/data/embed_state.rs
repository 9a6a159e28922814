use serde::{Serialize, Deserialize};

use super::playback_state::PlaybackState;
use super::queue::TrackQueue;
use super::track::Track;

/// Number of upcoming tracks shown in a published summary
pub const QUEUE_PREVIEW_LEN: usize = 5;

/// Snapshot of everything the published summary shows
///
/// Compared structurally against the last published snapshot to suppress
/// publishes that would not change anything visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedState {
    pub track: Option<Track>,
    pub queue_preview: Vec<String>,
    pub queue_size: usize,
    pub repeat: bool,
    pub paused: bool,
}

impl EmbedState {
    pub fn capture(state: &PlaybackState, queue: &TrackQueue) -> Self {
        Self {
            track: state.current_track.clone(),
            queue_preview: queue.preview(QUEUE_PREVIEW_LEN),
            queue_size: queue.len(),
            repeat: state.repeat,
            paused: state.paused,
        }
    }
}
