use crate::data::BridgeCommand;
use std::sync::{Arc, Mutex};
use log::debug;

/// Destination for transport commands issued by the playback controller
///
/// This is the seam between the state machine and the remote client. The
/// bridge server implements it; tests substitute a [`RecordingSink`].
pub trait CommandSink: Send + Sync {
    /// Send a command to the remote client
    ///
    /// # Arguments
    ///
    /// * `command` - The command to send
    ///
    /// # Returns
    ///
    /// `true` if the command was handed to a connected client, `false` if it
    /// was dropped because nobody is connected. Dropped commands are never
    /// replayed.
    fn send_command(&self, command: BridgeCommand) -> bool;

    /// Whether a remote client is currently connected
    fn is_connected(&self) -> bool;

    /// Close the active connection, if any, and stop accepting new ones
    fn close(&self);
}

impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    fn send_command(&self, command: BridgeCommand) -> bool {
        (**self).send_command(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&self) {
        (**self).close()
    }
}

/// A sink that records every command instead of sending it
///
/// Starts connected; `set_connected(false)` makes it drop commands the way
/// the bridge does while no client is attached.
#[derive(Debug)]
pub struct RecordingSink {
    sent: Mutex<Vec<BridgeCommand>>,
    connected: Mutex<bool>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: Mutex::new(true),
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        if let Ok(mut guard) = self.connected.lock() {
            *guard = connected;
        }
    }

    /// All commands accepted so far, in send order
    pub fn sent(&self) -> Vec<BridgeCommand> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Wire frames of all commands accepted so far
    pub fn frames(&self) -> Vec<String> {
        self.sent().iter().map(|c| c.encode()).collect()
    }

    pub fn take(&self) -> Vec<BridgeCommand> {
        self.sent.lock().map(|mut sent| std::mem::take(&mut *sent)).unwrap_or_default()
    }
}

impl CommandSink for RecordingSink {
    fn send_command(&self, command: BridgeCommand) -> bool {
        if !self.is_connected() {
            debug!("RecordingSink: not connected, dropping {}", command);
            return false;
        }
        match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(command);
                true
            }
            Err(_) => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.lock().map(|c| *c).unwrap_or(false)
    }

    fn close(&self) {
        self.set_connected(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_drops_while_disconnected() {
        let sink = RecordingSink::new();
        assert!(sink.send_command(BridgeCommand::Play));
        sink.set_connected(false);
        assert!(!sink.send_command(BridgeCommand::Pause));
        sink.set_connected(true);
        assert!(sink.send_command(BridgeCommand::Volume(40)));
        assert_eq!(sink.frames(), vec!["play", "volume|40"]);
    }

    #[test]
    fn test_close_disconnects() {
        let sink = Arc::new(RecordingSink::new());
        let as_trait: Arc<dyn CommandSink> = sink.clone();
        as_trait.close();
        assert!(!sink.is_connected());
        assert!(!as_trait.send_command(BridgeCommand::Play));
    }
}
