/// Track, queue, state and wire types
pub mod data;

/// Playback state machine and the session actor
pub mod players;

/// WebSocket connection manager for the remote client
pub mod bridge;

/// Publish scheduler and external collaborators
pub mod helpers;

/// Chat-command surface
pub mod commands;

pub mod config;
pub mod logging;

use crate::bridge::{BridgeError, BridgeServer};
use crate::config::{BridgeConfig, ConfigError};
use crate::helpers::message_store::MessageStore;
use crate::helpers::presentation::Presenter;
use crate::helpers::publish_scheduler::PublishScheduler;
use crate::helpers::remote_process::RemoteProcess;
use crate::helpers::voice::VoiceLink;
use crate::players::{PlaybackController, Session, SessionHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use log::{error, info};
use thiserror::Error;

pub use data::{BridgeCommand, BridgeEvent, PlaybackState, PlayerPhase, Track};

/// Capacity of the decoded event channel from the bridge to the session
const EVENT_BUFFER: usize = 256;

/// Failures that abort [`initialize`]
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// A running bridge: connection manager plus session
pub struct Playbridge {
    server: Arc<BridgeServer>,
    session: SessionHandle,
    session_task: JoinHandle<()>,
}

impl Playbridge {
    pub fn server(&self) -> &Arc<BridgeServer> {
        &self.server
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Shut the session down and wait for its task to finish
    pub async fn stop(self) {
        if let Err(e) = self.session.shutdown().await {
            info!("Session already gone: {}", e);
        }
        self.server.shutdown();
        self.session.stop().await;
        if let Err(e) = self.session_task.await {
            error!("Session task failed: {}", e);
        }
    }
}

/// Bring a session up
///
/// Binds the bridge server, makes sure the remote host application runs,
/// waits for the remote client to connect and only then starts the session
/// and its tick task. Each of these steps is fatal on failure.
pub async fn initialize(
    config: &BridgeConfig,
    presenter: Arc<dyn Presenter>,
    voice: Arc<dyn VoiceLink>,
) -> Result<Playbridge, StartupError> {
    let guild_id = config.guild_id()?;
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let server = BridgeServer::bind(config.bind_addr(), events_tx).await?;

    if config.remote.manage {
        let remote = RemoteProcess::new(
            &config.remote.process_name,
            config.remote.executable.clone(),
            config.remote.launch,
        );
        if let Err(e) = remote.ensure_running().await {
            error!("Cannot start streaming: {}", e);
            server.shutdown();
            return Err(e.into());
        }
    }

    let connection = match server.wait_for_connection(config.handshake_timeout()).await {
        Ok(id) => id,
        Err(e) => {
            error!("Initialization aborted: {}", e);
            server.shutdown();
            return Err(e.into());
        }
    };
    info!("Remote client connected (connection {}), starting session", connection);

    let controller = PlaybackController::new(server.clone(), voice);
    let store = MessageStore::load(&config.publish.state_dir, guild_id);
    let scheduler = PublishScheduler::new(config.publish_cooldown(), presenter, store);
    let (session, session_task) = Session::spawn(controller, scheduler, events_rx, Some(config.tick_interval()));

    Ok(Playbridge { server, session, session_task })
}
