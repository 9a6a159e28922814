// Value types shared by the bridge, the playback controller and the publisher

pub mod bridge_command;
pub mod bridge_event;
pub mod embed_state;
pub mod playback_state;
pub mod queue;
pub mod repeat_mode;
pub mod track;

// Re-export types from child modules
pub use bridge_command::*;
pub use bridge_event::*;
pub use embed_state::*;
pub use playback_state::*;
pub use queue::*;
pub use repeat_mode::*;
pub use track::*;
