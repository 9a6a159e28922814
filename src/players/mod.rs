//! Playback state machine and the session actor that owns it
pub mod command_sink;
pub mod playback_controller;
pub mod session;

pub use command_sink::{CommandSink, RecordingSink};
pub use playback_controller::PlaybackController;
pub use session::{Session, SessionHandle, SessionSnapshot, DEFAULT_TICK_INTERVAL};
