use crate::commands::ControlAction;
use crate::data::EmbedState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use log::info;
use thiserror::Error;

/// Errors reported by the presentation surface
#[derive(Error, Debug)]
pub enum PublishError {
    /// The stored message no longer exists; a new one has to be created
    #[error("target message {0} no longer exists")]
    TargetMissing(String),

    #[error("presenter call timed out after {} ms", .0.as_millis())]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// The surface the playback summary is published to
///
/// Calls are made from the session task and are cut off after the
/// scheduler's call timeout, so implementations should return promptly.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Turn a snapshot into the message body
    fn render(&self, state: &EmbedState) -> String;

    /// Replace the body of an existing message
    ///
    /// Must fail with [`PublishError::TargetMissing`] if the message is gone.
    async fn edit_message(&self, channel_id: &str, message_id: &str, body: &str) -> Result<(), PublishError>;

    /// Post a new message and return its id
    async fn create_message(&self, channel_id: &str, body: &str) -> Result<String, PublishError>;
}

const NOT_AVAILABLE: &str = "N/A";
const EMPTY_QUEUE: &str = "No tracks in queue.";

/// Plain-text rendering of a summary
pub fn render_text(state: &EmbedState) -> String {
    let looped = if state.repeat { " (Looped)" } else { "" };
    let mut lines = Vec::new();

    match &state.track {
        Some(track) => {
            let paused = if state.paused { " (Paused)" } else { "" };
            lines.push(format!("Track{}: {}", paused, link(&track.name, track.url.as_deref())));
            lines.push(format!("Artist: {}", link(&track.artist, track.artist_url.as_deref())));
            if let Some(cover) = &track.cover_url {
                lines.push(format!("Cover: {}", cover));
            }
            lines.push(format!("Upcoming Tracks - {}{}:", state.queue_size, looped));
            if state.queue_preview.is_empty() {
                lines.push(EMPTY_QUEUE.to_string());
            } else {
                for (index, entry) in state.queue_preview.iter().enumerate() {
                    lines.push(format!("{}. {}", index + 1, entry));
                }
            }
        }
        None => {
            lines.push(format!("Track: {}", NOT_AVAILABLE));
            lines.push(format!("Artist: {}", NOT_AVAILABLE));
            lines.push(format!("Upcoming Tracks{}: {}", looped, EMPTY_QUEUE));
        }
    }

    let controls: Vec<&str> = ControlAction::ALL.iter().map(|a| a.emoji()).collect();
    lines.push(controls.join(" "));
    lines.join("\n")
}

fn link(text: &str, url: Option<&str>) -> String {
    match url {
        Some(url) => format!("[{}]({})", text, url),
        None => text.to_string(),
    }
}

/// Presenter that keeps messages in memory and logs every change
#[derive(Debug, Default)]
pub struct TextPresenter {
    messages: Mutex<HashMap<String, String>>,
    next_id: Mutex<u64>,
}

impl TextPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current body of a message, if it exists
    pub fn message(&self, message_id: &str) -> Option<String> {
        self.messages.lock().ok()?.get(message_id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Drop a message, as if it was deleted on the surface
    pub fn delete_message(&self, message_id: &str) -> bool {
        self.messages.lock().map(|mut m| m.remove(message_id).is_some()).unwrap_or(false)
    }
}

#[async_trait]
impl Presenter for TextPresenter {
    fn render(&self, state: &EmbedState) -> String {
        render_text(state)
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, body: &str) -> Result<(), PublishError> {
        let mut messages = self.messages.lock()
            .map_err(|_| PublishError::Other("message table poisoned".to_string()))?;
        match messages.get_mut(message_id) {
            Some(existing) => {
                *existing = body.to_string();
                info!("[{}/{}]\n{}", channel_id, message_id, body);
                Ok(())
            }
            None => Err(PublishError::TargetMissing(message_id.to_string())),
        }
    }

    async fn create_message(&self, channel_id: &str, body: &str) -> Result<String, PublishError> {
        let message_id = {
            let mut next = self.next_id.lock()
                .map_err(|_| PublishError::Other("message counter poisoned".to_string()))?;
            *next += 1;
            format!("{}-{}", chrono::Utc::now().timestamp_millis(), next)
        };
        self.messages.lock()
            .map_err(|_| PublishError::Other("message table poisoned".to_string()))?
            .insert(message_id.clone(), body.to_string());
        info!("[{}/{}] new summary\n{}", channel_id, message_id, body);
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Track;

    fn playing_state() -> EmbedState {
        let track = Track::new("abc", "Song", "Artist", "Album", "spotify:track:abc", 1000)
            .with_artist_url("https://open.spotify.com/artist/x");
        EmbedState {
            track: Some(track),
            queue_preview: vec!["Next - Someone".to_string(), "Later - Other".to_string()],
            queue_size: 9,
            repeat: true,
            paused: true,
        }
    }

    #[test]
    fn test_render_playing() {
        let text = render_text(&playing_state());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Track (Paused): [Song](https://open.spotify.com/track/abc)");
        assert_eq!(lines[1], "Artist: [Artist](https://open.spotify.com/artist/x)");
        assert_eq!(lines[2], "Upcoming Tracks - 9 (Looped):");
        assert_eq!(lines[3], "1. Next - Someone");
        assert_eq!(lines[4], "2. Later - Other");
        assert!(lines[5].starts_with("🔀"));
    }

    #[test]
    fn test_render_idle() {
        let state = EmbedState { track: None, queue_preview: vec![], queue_size: 0, repeat: false, paused: true };
        let text = render_text(&state);
        assert!(text.starts_with("Track: N/A\nArtist: N/A\nUpcoming Tracks: No tracks in queue."));
    }

    #[test]
    fn test_render_empty_queue_while_playing() {
        let mut state = playing_state();
        state.queue_preview.clear();
        state.queue_size = 0;
        state.repeat = false;
        state.paused = false;
        let text = render_text(&state);
        assert!(text.contains("Track: [Song]"));
        assert!(text.contains("Upcoming Tracks - 0:\nNo tracks in queue."));
    }

    #[tokio::test]
    async fn test_edit_missing_message() {
        let presenter = TextPresenter::new();
        let id = presenter.create_message("chan", "one").await.unwrap();
        presenter.edit_message("chan", &id, "two").await.unwrap();
        assert_eq!(presenter.message(&id).as_deref(), Some("two"));

        assert!(presenter.delete_message(&id));
        assert!(matches!(
            presenter.edit_message("chan", &id, "three").await,
            Err(PublishError::TargetMissing(missing)) if missing == id
        ));
    }
}
