/// Native repeat setting of the remote player
use serde::{Serialize, Deserialize};
use strum_macros::EnumString;

/// Sent as `repeat|<n>`; queue-level looping is handled locally and keeps the
/// remote player at `Off`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// No native repeat
    #[serde(rename = "off")]
    #[strum(serialize = "off", serialize = "0")]
    Off,
    /// Repeat the remote player's current context
    #[serde(rename = "context")]
    #[strum(serialize = "context", serialize = "1")]
    Context,
    /// Repeat the current track
    #[serde(rename = "track")]
    #[strum(serialize = "track", serialize = "2")]
    Track,
}

impl RepeatMode {
    /// Numeric value used on the wire
    pub fn wire_value(&self) -> u8 {
        match self {
            RepeatMode::Off => 0,
            RepeatMode::Context => 1,
            RepeatMode::Track => 2,
        }
    }
}

impl Default for RepeatMode {
    fn default() -> Self {
        RepeatMode::Off
    }
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_numeric_and_named() {
        assert_eq!(RepeatMode::from_str("0").unwrap(), RepeatMode::Off);
        assert_eq!(RepeatMode::from_str("track").unwrap(), RepeatMode::Track);
        assert_eq!(RepeatMode::from_str("1").unwrap(), RepeatMode::Context);
        assert!(RepeatMode::from_str("3").is_err());
    }

    #[test]
    fn test_display_is_wire_value() {
        assert_eq!(RepeatMode::Track.to_string(), "2");
        assert_eq!(RepeatMode::default().to_string(), "0");
    }
}
