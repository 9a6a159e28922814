use std::str::FromStr;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::bridge_command::FRAME_SEPARATOR;
use super::track::Track;

/// Errors raised while decoding a bridge frame
///
/// These are never fatal: the bridge logs them and drops the frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("unknown command or event: {0}")]
    UnknownCommand(String),

    #[error("invalid parameter for {command}: {value}")]
    InvalidParameter { command: String, value: String },

    #[error("missing parameter for {0}")]
    MissingParameter(String),

    #[error("invalid playerState payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Events pushed by the remote client
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Playback position in milliseconds
    Progress(u64),
    /// Partial snapshot of the remote player
    PlayerState(PlayerStateUpdate),
    /// Keep-alive, answered with `pong`
    Ping,
    /// Reply to a keep-alive sent by us
    Pong,
}

/// Partial update carried by a `playerState` event
///
/// Every field is optional. A field that is absent (or not a number) leaves
/// the corresponding playback state untouched; it is never read as zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateUpdate {
    /// Epoch milliseconds at which the remote sampled the position
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    /// Track length in milliseconds
    #[serde(default, deserialize_with = "lenient_u64")]
    pub duration: Option<u64>,
    /// Position in milliseconds as of `timestamp`
    #[serde(default, deserialize_with = "lenient_u64")]
    pub position_as_of_timestamp: Option<u64>,
    /// The track the remote is currently on
    #[serde(default, deserialize_with = "lenient_item")]
    pub item: Option<Track>,
}

impl PlayerStateUpdate {
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
            && self.duration.is_none()
            && self.position_as_of_timestamp.is_none()
            && self.item.is_none()
    }
}

// The remote sends whatever its player reports; anything that is not an
// integer of the expected sign is treated as absent.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_i64())
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_u64())
}

fn lenient_item<'de, D>(deserializer: D) -> Result<Option<Track>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Track::from_player_state_item(&value))
}

impl FromStr for BridgeEvent {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        if frame.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }
        // The JSON payload may itself contain the separator, so only the
        // first one splits the frame.
        let (name, parameter) = match frame.split_once(FRAME_SEPARATOR) {
            Some((name, parameter)) => (name, Some(parameter)),
            None => (frame, None),
        };

        match name {
            "ping" => Ok(BridgeEvent::Ping),
            "pong" => Ok(BridgeEvent::Pong),
            "progress" => {
                let value = parameter.ok_or_else(|| ProtocolError::MissingParameter(name.to_string()))?;
                value.trim().parse::<u64>()
                    .map(BridgeEvent::Progress)
                    .map_err(|_| ProtocolError::InvalidParameter {
                        command: name.to_string(),
                        value: value.to_string(),
                    })
            }
            "playerState" => {
                let json = parameter.ok_or_else(|| ProtocolError::MissingParameter(name.to_string()))?;
                PlayerStateUpdate::from_json(json).map(BridgeEvent::PlayerState)
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl std::fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeEvent::Progress(ms) => write!(f, "progress{}{}", FRAME_SEPARATOR, ms),
            BridgeEvent::PlayerState(update) => {
                let mut object = serde_json::Map::new();
                if let Some(timestamp) = update.timestamp {
                    object.insert("timestamp".into(), timestamp.into());
                }
                if let Some(duration) = update.duration {
                    object.insert("duration".into(), duration.into());
                }
                if let Some(position) = update.position_as_of_timestamp {
                    object.insert("positionAsOfTimestamp".into(), position.into());
                }
                if let Some(track) = &update.item {
                    object.insert("item".into(), player_state_item(track));
                }
                write!(f, "playerState{}{}", FRAME_SEPARATOR, Value::Object(object))
            }
            BridgeEvent::Ping => write!(f, "ping"),
            BridgeEvent::Pong => write!(f, "pong"),
        }
    }
}

/// Render a track in the shape the remote client uses for `playerState.item`
pub fn player_state_item(track: &Track) -> Value {
    let mut artist = serde_json::json!({ "name": track.artist });
    if let Some(url) = &track.artist_url {
        artist["external_urls"] = serde_json::json!({ "spotify": url });
    }
    let mut album = serde_json::json!({ "name": track.album, "images": [] });
    if let Some(cover) = &track.cover_url {
        album["images"] = serde_json::json!([{ "url": cover }]);
    }
    serde_json::json!({
        "id": track.id,
        "uri": track.uri,
        "name": track.name,
        "duration": { "milliseconds": track.duration_ms },
        "artists": [artist],
        "album": album,
    })
}
