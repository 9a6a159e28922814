//! Chat-command surface of a session
//!
//! Index-or-name lookups are resolved against one queue snapshot and then
//! applied by track id, so a queue that changes in between can only make the
//! command fail with [`CommandError::NoMatch`], never hit the wrong track.

use crate::data::Track;
use crate::helpers::catalog::{Catalog, CatalogError};
use crate::helpers::playlist_loader::{self, ImportStats};
use crate::helpers::presentation::PublishError;
use crate::players::session::SessionHandle;
use log::{debug, info};
use thiserror::Error;

/// Results returned by search autocomplete
const SEARCH_LIMIT: usize = 1;

/// Maximum number of autocomplete choices
pub const MAX_CHOICES: usize = 25;

/// User-facing failures of chat commands
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("the queue is empty")]
    QueueEmpty,

    #[error("no matching track")]
    NoMatch,

    #[error("no active session")]
    NoSession,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("catalog lookup failed: {0}")]
    Catalog(String),

    #[error("failed to update the publish target: {0}")]
    Publish(#[from] PublishError),
}

impl From<CatalogError> for CommandError {
    fn from(e: CatalogError) -> Self {
        CommandError::Catalog(e.to_string())
    }
}

/// Resolve a queue reference typed by a user
///
/// `input` is either a 1-based position or a case-insensitive track name or
/// artist. A name that matches more than one entry is treated as no match.
pub fn resolve_entry(queue: &[Track], input: &str) -> Result<Track, CommandError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CommandError::InvalidArgument("empty track reference".to_string()));
    }

    if let Ok(position) = input.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|index| queue.get(index))
            .cloned()
            .ok_or(CommandError::NoMatch);
    }

    let needle = input.to_lowercase();
    let mut matches = queue.iter()
        .filter(|t| t.name.to_lowercase() == needle || t.artist.to_lowercase() == needle);
    match (matches.next(), matches.next()) {
        (Some(track), None) => Ok(track.clone()),
        (Some(_), Some(_)) => {
            debug!("'{}' is ambiguous", input);
            Err(CommandError::NoMatch)
        }
        _ => Err(CommandError::NoMatch),
    }
}

/// Remove the queue entry `input` refers to
pub async fn remove_entry(session: &SessionHandle, input: &str) -> Result<Track, CommandError> {
    let snapshot = session.snapshot().await?;
    let track = resolve_entry(&snapshot.queue, input)?;
    session.remove(&track.id).await
}

/// Look up the track a "who requested" query refers to
///
/// Blank input asks about the current track, anything else is resolved
/// against the queue. `NoMatch` if nothing is playing.
pub async fn who_requested(session: &SessionHandle, input: &str) -> Result<Track, CommandError> {
    let snapshot = session.snapshot().await?;
    if input.trim().is_empty() {
        return snapshot.state.current_track.ok_or(CommandError::NoMatch);
    }
    resolve_entry(&snapshot.queue, input)
}

/// What a play request refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLink {
    Track(String),
    Album(String),
    Playlist(String),
    Query(String),
}

const WEB_PREFIX: &str = "https://open.spotify.com/";
const ID_PREFIX: &str = "id:";

impl CatalogLink {
    /// Classify user input
    ///
    /// Web links to tracks, albums and playlists are recognised with or
    /// without a query string. `id:<id>` is what search autocomplete
    /// submits. Anything else is a free-text search.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Some(id) = input.strip_prefix(ID_PREFIX) {
            return CatalogLink::Track(id.trim().to_string());
        }
        if let Some(path) = input.strip_prefix(WEB_PREFIX) {
            let path = path.split(['?', '#']).next().unwrap_or_default();
            let mut segments = path.split('/').filter(|s| !s.is_empty());
            if let (Some(kind), Some(id)) = (segments.next(), segments.next()) {
                let id = id.to_string();
                match kind {
                    "track" => return CatalogLink::Track(id),
                    "album" => return CatalogLink::Album(id),
                    "playlist" => return CatalogLink::Playlist(id),
                    _ => {}
                }
            }
        }
        CatalogLink::Query(input.to_string())
    }
}

/// Result of a play request
#[derive(Debug, Clone)]
pub enum PlayOutcome {
    /// A single track; `added` is false if it was already queued
    Track { track: Track, added: bool },
    Album { name: String, added: usize },
    Playlist { name: String, stats: ImportStats },
}

/// Look up `input` in the catalog and queue the result for `requester_id`
pub async fn play_request(
    catalog: &dyn Catalog,
    session: &SessionHandle,
    input: &str,
    requester_id: &str,
) -> Result<PlayOutcome, CommandError> {
    match CatalogLink::parse(input) {
        CatalogLink::Query(query) => {
            if query.is_empty() {
                return Err(CommandError::InvalidArgument("empty query".to_string()));
            }
            let track = catalog.search_tracks(&query, SEARCH_LIMIT).await?
                .into_iter()
                .next()
                .ok_or(CommandError::NoMatch)?;
            enqueue_track(session, track, requester_id).await
        }
        CatalogLink::Track(id) => {
            let track = catalog.get_track(&id).await?.ok_or(CommandError::NoMatch)?;
            enqueue_track(session, track, requester_id).await
        }
        CatalogLink::Album(id) => {
            let album = catalog.get_album(&id).await?.ok_or(CommandError::NoMatch)?;
            let tracks = album.tracks.into_iter().map(|t| t.with_requester(requester_id)).collect();
            let added = session.enqueue_bulk(tracks).await?;
            info!("Queued {} tracks from album '{}'", added, album.name);
            Ok(PlayOutcome::Album { name: album.name, added })
        }
        CatalogLink::Playlist(id) => {
            let playlist = catalog.get_playlist(&id).await?.ok_or(CommandError::NoMatch)?;
            let stats = playlist_loader::import_playlist(catalog, session, &playlist, requester_id).await?;
            Ok(PlayOutcome::Playlist { name: playlist.name, stats })
        }
    }
}

async fn enqueue_track(session: &SessionHandle, track: Track, requester_id: &str) -> Result<PlayOutcome, CommandError> {
    let track = track.with_requester(requester_id);
    let added = session.enqueue(track.clone()).await?;
    Ok(PlayOutcome::Track { track, added })
}

/// Reaction controls attached to the published summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Shuffle,
    Previous,
    TogglePause,
    Skip,
    ToggleRepeat,
    Stop,
}

const VARIATION_SELECTOR: char = '\u{FE0F}';

impl ControlAction {
    /// All controls in display order
    pub const ALL: [ControlAction; 6] = [
        ControlAction::Shuffle,
        ControlAction::Previous,
        ControlAction::TogglePause,
        ControlAction::Skip,
        ControlAction::ToggleRepeat,
        ControlAction::Stop,
    ];

    pub fn emoji(&self) -> &'static str {
        match self {
            ControlAction::Shuffle => "🔀",
            ControlAction::Previous => "⏮️",
            ControlAction::TogglePause => "⏯️",
            ControlAction::Skip => "⏭️",
            ControlAction::ToggleRepeat => "🔁",
            ControlAction::Stop => "⏹️",
        }
    }

    /// Map a reaction back to its control; the variation selector is optional
    pub fn from_emoji(emoji: &str) -> Option<Self> {
        let bare = emoji.trim().trim_end_matches(VARIATION_SELECTOR);
        Self::ALL.into_iter()
            .find(|action| action.emoji().trim_end_matches(VARIATION_SELECTOR) == bare)
    }
}

/// Run a reaction control
///
/// Controls only act on a playing session; with no current track the
/// reaction is ignored and `Ok(false)` is returned.
pub async fn apply_control(session: &SessionHandle, action: ControlAction) -> Result<bool, CommandError> {
    let snapshot = session.snapshot().await?;
    if snapshot.state.current_track.is_none() {
        debug!("Ignoring {:?}, nothing is playing", action);
        return Ok(false);
    }

    match action {
        ControlAction::Shuffle => session.shuffle().await?,
        ControlAction::Previous => {
            session.previous().await?;
        }
        ControlAction::TogglePause => {
            session.toggle_pause().await?;
        }
        ControlAction::Skip => {
            session.skip().await?;
        }
        ControlAction::ToggleRepeat => {
            session.toggle_repeat().await?;
        }
        ControlAction::Stop => session.shutdown().await?,
    }
    Ok(true)
}

/// One autocomplete entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Autocomplete choices for commands taking a queue reference
///
/// An entry matches when its position starts with `input` or its name
/// contains it. The value is the 1-based position.
pub fn queue_choices(queue: &[Track], input: &str) -> Vec<Choice> {
    let needle = input.trim().to_lowercase();
    queue.iter()
        .enumerate()
        .map(|(index, track)| (index + 1, track))
        .filter(|(position, track)| {
            needle.is_empty()
                || position.to_string().starts_with(&needle)
                || track.name.to_lowercase().contains(&needle)
        })
        .take(MAX_CHOICES)
        .map(|(position, track)| Choice {
            label: format!("{}. {} - {}", position, truncate(&track.name, 45), truncate(&track.artist, 30)),
            value: position.to_string(),
        })
        .collect()
}

/// Autocomplete choices for catalog search results
pub fn search_choices(tracks: &[Track]) -> Vec<Choice> {
    tracks.iter()
        .take(MAX_CHOICES)
        .map(|track| Choice {
            label: format!("{} - {}", truncate(&track.name, 50), truncate(&track.artist, 40)),
            value: format!("{}{}", ID_PREFIX, track.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, name: &str, artist: &str) -> Track {
        Track::new(id, name, artist, "Album", &format!("spotify:track:{}", id), 1000)
    }

    fn queue() -> Vec<Track> {
        vec![
            track("1", "Blue Monday", "New Order"),
            track("2", "Ceremony", "New Order"),
            track("3", "Atmosphere", "Joy Division"),
        ]
    }

    #[test]
    fn test_resolve_by_position() {
        assert_eq!(resolve_entry(&queue(), "2").unwrap().id, "2");
        assert!(matches!(resolve_entry(&queue(), "0"), Err(CommandError::NoMatch)));
        assert!(matches!(resolve_entry(&queue(), "4"), Err(CommandError::NoMatch)));
    }

    #[test]
    fn test_resolve_by_name_or_artist() {
        assert_eq!(resolve_entry(&queue(), "blue monday").unwrap().id, "1");
        assert_eq!(resolve_entry(&queue(), "JOY DIVISION").unwrap().id, "3");
        // Two entries by the same artist
        assert!(matches!(resolve_entry(&queue(), "new order"), Err(CommandError::NoMatch)));
        assert!(matches!(resolve_entry(&queue(), "blue"), Err(CommandError::NoMatch)));
        assert!(matches!(resolve_entry(&queue(), "  "), Err(CommandError::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_catalog_links() {
        assert_eq!(
            CatalogLink::parse("https://open.spotify.com/track/abc123?si=xyz"),
            CatalogLink::Track("abc123".to_string())
        );
        assert_eq!(
            CatalogLink::parse("https://open.spotify.com/album/alb"),
            CatalogLink::Album("alb".to_string())
        );
        assert_eq!(
            CatalogLink::parse("https://open.spotify.com/playlist/pl?si=1&x=2"),
            CatalogLink::Playlist("pl".to_string())
        );
        assert_eq!(CatalogLink::parse("id:abc"), CatalogLink::Track("abc".to_string()));
        assert_eq!(
            CatalogLink::parse("https://open.spotify.com/artist/x"),
            CatalogLink::Query("https://open.spotify.com/artist/x".to_string())
        );
        assert_eq!(CatalogLink::parse(" blue monday "), CatalogLink::Query("blue monday".to_string()));
    }

    #[test]
    fn test_control_emoji() {
        for action in ControlAction::ALL {
            assert_eq!(ControlAction::from_emoji(action.emoji()), Some(action));
        }
        assert_eq!(ControlAction::from_emoji("\u{23ED}"), Some(ControlAction::Skip));
        assert_eq!(ControlAction::from_emoji("👍"), None);
    }

    #[test]
    fn test_queue_choices() {
        let choices = queue_choices(&queue(), "");
        assert_eq!(choices.len(), 3);
        assert_eq!(choices[0], Choice { label: "1. Blue Monday - New Order".to_string(), value: "1".to_string() });

        let filtered = queue_choices(&queue(), "atmo");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].value, "3");

        assert_eq!(queue_choices(&queue(), "2")[0].value, "2");
    }

    #[test]
    fn test_choices_are_truncated_and_capped() {
        let long = "x".repeat(60);
        let many: Vec<Track> = (0..40).map(|i| track(&i.to_string(), &long, &long)).collect();

        let choices = queue_choices(&many, "");
        assert_eq!(choices.len(), MAX_CHOICES);
        assert_eq!(choices[0].label, format!("1. {}... - {}...", "x".repeat(42), "x".repeat(27)));

        let search = search_choices(&many[..1]);
        assert_eq!(search[0].value, "id:0");
        assert_eq!(search[0].label, format!("{}... - {}...", "x".repeat(47), "x".repeat(37)));
    }
}
