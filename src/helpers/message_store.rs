use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use log::{debug, warn};

/// Persisted ids of the channel and message the summary is published to
///
/// Stored as `<state_dir>/<guild_id>.txt`: the channel id on the first line,
/// the message id on the second. An empty line means the id is absent.
#[derive(Debug, Clone)]
pub struct MessageStore {
    path: PathBuf,
    channel_id: Option<String>,
    message_id: Option<String>,
}

fn non_empty(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

impl MessageStore {
    /// Load the record for `guild_id`
    ///
    /// A missing file yields an empty record. An unreadable or malformed file
    /// is deleted and also yields an empty record.
    pub fn load(state_dir: &Path, guild_id: &str) -> Self {
        let path = state_dir.join(format!("{}.txt", guild_id));
        let mut store = Self { path, channel_id: None, message_id: None };

        if !store.path.exists() {
            debug!("No message record at {}", store.path.display());
            return store;
        }

        let parsed = fs::read_to_string(&store.path).ok().and_then(|content| {
            let mut lines = content.lines();
            let channel = lines.next()?;
            let message = lines.next()?;
            Some((non_empty(channel), non_empty(message)))
        });

        match parsed {
            Some((channel_id, message_id)) => {
                debug!("Loaded message record: channel {:?}, message {:?}", channel_id, message_id);
                store.channel_id = channel_id;
                store.message_id = message_id;
            }
            None => {
                warn!("Message record {} is corrupt, removing it", store.path.display());
                if let Err(e) = fs::remove_file(&store.path) {
                    warn!("Failed to remove {}: {}", store.path.display(), e);
                }
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Point the record at a new channel; the old message id is forgotten
    pub fn set_channel(&mut self, channel_id: &str) -> io::Result<()> {
        self.channel_id = non_empty(channel_id);
        self.message_id = None;
        self.save()
    }

    pub fn set_message_id(&mut self, message_id: &str) -> io::Result<()> {
        self.message_id = non_empty(message_id);
        self.save()
    }

    /// Rewrite the record file
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = format!(
            "{}\n{}\n",
            self.channel_id.as_deref().unwrap_or_default(),
            self.message_id.as_deref().unwrap_or_default()
        );
        fs::write(&self.path, content)
    }
}
