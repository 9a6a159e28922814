use std::sync::atomic::{AtomicBool, Ordering};
use log::{debug, info};

/// The audio/voice transport the session streams into
///
/// The playback controller only needs to tell it to leave when the session
/// shuts down; joining and audio capture live outside this crate.
pub trait VoiceLink: Send + Sync {
    /// Leave the voice context, if connected
    fn disconnect(&self);

    /// Whether the transport is currently joined
    fn is_connected(&self) -> bool;
}

/// A voice link that only remembers whether it was told to disconnect
///
/// Used by the daemon when no real voice transport is attached.
pub struct NoopVoiceLink {
    connected: AtomicBool,
}

impl NoopVoiceLink {
    pub fn new() -> Self {
        debug!("Creating new NoopVoiceLink");
        Self {
            connected: AtomicBool::new(true),
        }
    }
}

impl Default for NoopVoiceLink {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceLink for NoopVoiceLink {
    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Voice link disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
