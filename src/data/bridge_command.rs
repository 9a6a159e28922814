/// Transport commands sent from the bridge to the remote client
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use super::bridge_event::ProtocolError;
use super::repeat_mode::RepeatMode;

/// Separator between a command and its parameter in a text frame
pub const FRAME_SEPARATOR: char = '|';

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BridgeCommand {
    Pause,
    Play,
    /// Start playing the given URI
    PlayUri(String),
    /// Volume in percent, 0-100
    Volume(u8),
    /// Native repeat of the remote player
    Repeat(RepeatMode),
    Mute(bool),
    Shuffle(bool),
    /// Reply to a `ping` event
    Pong,
}

impl BridgeCommand {
    /// The command word of the frame
    pub fn name(&self) -> &'static str {
        match self {
            BridgeCommand::Pause => "pause",
            BridgeCommand::Play => "play",
            BridgeCommand::PlayUri(_) => "playUri",
            BridgeCommand::Volume(_) => "volume",
            BridgeCommand::Repeat(_) => "repeat",
            BridgeCommand::Mute(_) => "mute",
            BridgeCommand::Shuffle(_) => "shuffle",
            BridgeCommand::Pong => "pong",
        }
    }

    /// The commands sent to every freshly connected client, in order
    pub fn normalization() -> [BridgeCommand; 3] {
        [
            BridgeCommand::Volume(100),
            BridgeCommand::Repeat(RepeatMode::Off),
            BridgeCommand::Pause,
        ]
    }

    /// Encode as a wire frame: `<command>` or `<command>|<parameter>`
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for BridgeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeCommand::Pause | BridgeCommand::Play | BridgeCommand::Pong => write!(f, "{}", self.name()),
            BridgeCommand::PlayUri(uri) => write!(f, "{}{}{}", self.name(), FRAME_SEPARATOR, uri),
            BridgeCommand::Volume(volume) => write!(f, "{}{}{}", self.name(), FRAME_SEPARATOR, volume),
            BridgeCommand::Repeat(mode) => write!(f, "{}{}{}", self.name(), FRAME_SEPARATOR, mode),
            BridgeCommand::Mute(muted) => write!(f, "{}{}{}", self.name(), FRAME_SEPARATOR, muted),
            BridgeCommand::Shuffle(enabled) => write!(f, "{}{}{}", self.name(), FRAME_SEPARATOR, enabled),
        }
    }
}

/// Decode a command frame, as the remote client does
impl FromStr for BridgeCommand {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        if frame.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let (name, parameter) = match frame.split_once(FRAME_SEPARATOR) {
            Some((name, parameter)) => (name, Some(parameter)),
            None => (frame, None),
        };
        let require = |name: &str| parameter.ok_or_else(|| ProtocolError::MissingParameter(name.to_string()));
        let invalid = |name: &str, value: &str| ProtocolError::InvalidParameter {
            command: name.to_string(),
            value: value.to_string(),
        };

        match name {
            "pause" => Ok(BridgeCommand::Pause),
            "play" => Ok(BridgeCommand::Play),
            "pong" => Ok(BridgeCommand::Pong),
            "playUri" => {
                let uri = require(name)?;
                if uri.is_empty() {
                    return Err(invalid(name, uri));
                }
                Ok(BridgeCommand::PlayUri(uri.to_string()))
            }
            "volume" => {
                let value = require(name)?;
                match value.parse::<u8>() {
                    Ok(volume) if volume <= 100 => Ok(BridgeCommand::Volume(volume)),
                    _ => Err(invalid(name, value)),
                }
            }
            "repeat" => {
                let value = require(name)?;
                RepeatMode::from_str(value)
                    .map(BridgeCommand::Repeat)
                    .map_err(|_| invalid(name, value))
            }
            "mute" | "shuffle" => {
                let value = require(name)?;
                let flag = value.parse::<bool>().map_err(|_| invalid(name, value))?;
                if name == "mute" {
                    Ok(BridgeCommand::Mute(flag))
                } else {
                    Ok(BridgeCommand::Shuffle(flag))
                }
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_vocabulary() {
        assert_eq!(BridgeCommand::Pause.encode(), "pause");
        assert_eq!(BridgeCommand::Play.encode(), "play");
        assert_eq!(BridgeCommand::PlayUri("spotify:track:abc".into()).encode(), "playUri|spotify:track:abc");
        assert_eq!(BridgeCommand::Volume(100).encode(), "volume|100");
        assert_eq!(BridgeCommand::Repeat(RepeatMode::Off).encode(), "repeat|0");
        assert_eq!(BridgeCommand::Mute(true).encode(), "mute|true");
        assert_eq!(BridgeCommand::Shuffle(false).encode(), "shuffle|false");
    }

    #[test]
    fn test_normalization_triplet() {
        let frames: Vec<String> = BridgeCommand::normalization().iter().map(|c| c.encode()).collect();
        assert_eq!(frames, vec!["volume|100", "repeat|0", "pause"]);
    }

    #[test]
    fn test_play_uri_survives_encoding() {
        let uri = "spotify:track:4uLU6hMCjMI75M1A2tKUQC";
        let decoded: BridgeCommand = BridgeCommand::PlayUri(uri.to_string()).encode().parse().unwrap();
        assert_eq!(decoded, BridgeCommand::PlayUri(uri.to_string()));
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!("".parse::<BridgeCommand>(), Err(ProtocolError::Empty)));
        assert!(matches!("volume|101".parse::<BridgeCommand>(), Err(ProtocolError::InvalidParameter { .. })));
        assert!(matches!("volume".parse::<BridgeCommand>(), Err(ProtocolError::MissingParameter(_))));
        assert!(matches!("seek|10".parse::<BridgeCommand>(), Err(ProtocolError::UnknownCommand(_))));
        assert!(matches!("mute|yes".parse::<BridgeCommand>(), Err(ProtocolError::InvalidParameter { .. })));
    }
}
