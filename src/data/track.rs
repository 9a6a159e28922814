use std::fmt;
use std::hash::{Hash, Hasher};
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// One playable item of the queue
///
/// A track is immutable once constructed. It is built either from a catalog
/// lookup (`Track::new` and the `with_*` setters) or from the `item` object
/// the remote client pushes with a `playerState` event
/// (`Track::from_player_state_item`). Both paths fill the same fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Catalog identifier, unique per track
    pub id: String,
    /// Display name
    pub name: String,
    /// Primary artist name
    pub artist: String,
    /// Link to the primary artist, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_url: Option<String>,
    /// Album name
    pub album: String,
    /// Cover art URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// Canonical play URI (e.g. `spotify:track:<id>`)
    pub uri: String,
    /// Web URL of the track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Opaque identity of whoever requested the track, empty if unknown
    #[serde(default)]
    pub requester_id: String,
}

impl Track {
    /// Create a new track from catalog data
    pub fn new(id: &str, name: &str, artist: &str, album: &str, uri: &str, duration_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            artist: artist.to_string(),
            artist_url: None,
            album: album.to_string(),
            cover_url: None,
            uri: uri.to_string(),
            url: web_url_for_uri(uri),
            duration_ms,
            requester_id: String::new(),
        }
    }

    /// Create a bare track that only knows its play URI
    ///
    /// The id is the last `:`-separated segment of the URI and the URI doubles
    /// as the display name.
    pub fn from_uri(uri: &str) -> Self {
        let id = uri.rsplit(':').next().unwrap_or(uri);
        Self::new(id, uri, "", "", uri, 0)
    }

    pub fn with_artist_url(mut self, url: &str) -> Self {
        self.artist_url = Some(url.to_string());
        self
    }

    pub fn with_cover_url(mut self, url: &str) -> Self {
        self.cover_url = Some(url.to_string());
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Return a copy of this track attributed to `requester_id`
    pub fn with_requester(mut self, requester_id: &str) -> Self {
        self.requester_id = requester_id.to_string();
        self
    }

    /// Build a track from the `item` object of a `playerState` push
    ///
    /// Recognised fields: `uri` (required), `id`, `name`, `duration` (either a
    /// number or `{ "milliseconds": n }`) or `duration_ms`, `artists[0].name`,
    /// `artists[0].uri`, `album.name`, `album.images[0].url` and
    /// `external_urls.spotify`. Returns `None` when there is no usable URI.
    pub fn from_player_state_item(item: &Value) -> Option<Self> {
        let uri = item.get("uri").and_then(|u| u.as_str()).filter(|u| !u.is_empty())?;

        let id = item.get("id")
            .and_then(|i| i.as_str())
            .map(|i| i.to_string())
            .unwrap_or_else(|| uri.rsplit(':').next().unwrap_or(uri).to_string());

        let name = item.get("name").and_then(|n| n.as_str()).unwrap_or_default();

        let duration_ms = match item.get("duration") {
            Some(Value::Object(d)) => d.get("milliseconds").and_then(|m| m.as_u64()),
            Some(d) => d.as_u64(),
            None => item.get("duration_ms").and_then(|d| d.as_u64()),
        }.unwrap_or(0);

        let first_artist = item.get("artists").and_then(|a| a.get(0));
        let artist = first_artist
            .and_then(|a| a.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or_default();
        let artist_url = first_artist.and_then(|a| {
            a.get("external_urls")
                .and_then(|u| u.get("spotify"))
                .and_then(|u| u.as_str())
                .map(|u| u.to_string())
                .or_else(|| a.get("uri").and_then(|u| u.as_str()).and_then(web_url_for_uri))
        });

        let album = item.get("album");
        let album_name = album
            .and_then(|a| a.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or_default();
        let cover_url = album
            .and_then(|a| a.get("images"))
            .and_then(|i| i.get(0))
            .and_then(|i| i.get("url"))
            .and_then(|u| u.as_str())
            .map(|u| u.to_string());

        let url = item.get("external_urls")
            .and_then(|u| u.get("spotify"))
            .and_then(|u| u.as_str())
            .map(|u| u.to_string())
            .or_else(|| web_url_for_uri(uri));

        Some(Self {
            id,
            name: name.to_string(),
            artist: artist.to_string(),
            artist_url,
            album: album_name.to_string(),
            cover_url,
            uri: uri.to_string(),
            url,
            duration_ms,
            requester_id: String::new(),
        })
    }

    /// One-line `"<name> - <artist>"` summary used by the queue preview
    pub fn summary_line(&self) -> String {
        format!("{} - {}", self.name, self.artist)
    }
}

/// Map a `spotify:<kind>:<id>` URI to its `open.spotify.com` web URL
pub fn web_url_for_uri(uri: &str) -> Option<String> {
    let mut parts = uri.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("spotify"), Some(kind), Some(id), None) if !kind.is_empty() && !id.is_empty() => {
            Some(format!("https://open.spotify.com/{}/{}", kind, id))
        }
        _ => None,
    }
}

// Tracks are identified by id only; the requester and the metadata do not
// take part in queue duplicate detection.
impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} by {}", self.name, self.artist)
        }
    }
}
