use crate::commands::CommandError;
use crate::data::{BridgeEvent, EmbedState, PlaybackState, PlayerPhase, RepeatMode, Track};
use crate::helpers::publish_scheduler::{PublishDecision, PublishOutcome, PublishScheduler};
use crate::players::playback_controller::PlaybackController;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use log::{debug, info, trace, warn};

/// Capacity of the command channel into the session
const COMMAND_BUFFER: usize = 64;

/// Default interval of the end-of-track detection tick
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Read-only copy of the session, for queries and the console
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub phase: PlayerPhase,
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
    pub embed: EmbedState,
    pub connected: bool,
    pub publish_requests: u64,
    pub publishes_sent: u64,
}

type Reply<T> = oneshot::Sender<T>;

enum SessionCommand {
    Enqueue(Track, Reply<bool>),
    EnqueueBulk(Vec<Track>, Reply<usize>),
    Remove(String, Reply<Option<Track>>),
    Clear(Reply<()>),
    Shuffle(Reply<()>),
    Skip(Reply<Result<Option<Track>, CommandError>>),
    Previous(Reply<Result<Track, CommandError>>),
    TogglePause(Reply<bool>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    ToggleRepeat(Reply<bool>),
    SetVolume(u8, Reply<Result<bool, CommandError>>),
    SetRemoteRepeat(RepeatMode, Reply<bool>),
    SetMute(bool, Reply<bool>),
    SetRemoteShuffle(bool, Reply<bool>),
    Publish(bool, Reply<()>),
    SetTargetChannel(String, Reply<Result<(), CommandError>>),
    Snapshot(Reply<SessionSnapshot>),
    Tick,
    Shutdown(Reply<()>),
    Stop,
}

/// The single writer of all session state
///
/// Owns the playback controller and the publish scheduler. Commands from
/// handles, events from the bridge and the deferred publish deadline are
/// processed one at a time, so no state is ever touched concurrently.
pub struct Session {
    controller: PlaybackController,
    scheduler: PublishScheduler,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Receiver<BridgeEvent>,
    events_open: bool,
    deferred_publish: Option<Instant>,
}

impl Session {
    /// Start the session task
    ///
    /// With a `tick_interval` a tick task is started as well; it stops by
    /// itself once the session is gone.
    pub fn spawn(
        controller: PlaybackController,
        scheduler: PublishScheduler,
        events: mpsc::Receiver<BridgeEvent>,
        tick_interval: Option<Duration>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);
        let session = Session {
            controller,
            scheduler,
            commands,
            events,
            events_open: true,
            deferred_publish: None,
        };
        let join = tokio::spawn(session.run());
        let handle = SessionHandle { commands: sender };

        if let Some(interval) = tick_interval {
            handle.spawn_ticker(interval);
        }
        (handle, join)
    }

    async fn run(mut self) {
        debug!("Session started");
        loop {
            let deadline = self.deferred_publish;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Stop) | None => break,
                    Some(command) => self.handle(command),
                },
                event = self.events.recv(), if self.events_open => match event {
                    Some(event) => self.controller.on_event(event),
                    None => {
                        debug!("Bridge event channel closed");
                        self.events_open = false;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deferred_publish = None;
                    self.perform_publish().await;
                }
            }
            self.flush_publish().await;
        }
        self.drain_publish().await;
        info!("Session stopped");
    }

    /// Perform a publish that is still deferred or not yet handed over
    async fn drain_publish(&mut self) {
        self.flush_publish().await;
        if self.deferred_publish.take().is_some() {
            debug!("Performing deferred publish before stopping");
            self.perform_publish().await;
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            SessionCommand::Enqueue(track, reply) => { let _ = reply.send(self.controller.enqueue(track)); }
            SessionCommand::EnqueueBulk(tracks, reply) => { let _ = reply.send(self.controller.enqueue_bulk(tracks)); }
            SessionCommand::Remove(id, reply) => { let _ = reply.send(self.controller.remove(&id)); }
            SessionCommand::Clear(reply) => { let _ = reply.send(self.controller.clear()); }
            SessionCommand::Shuffle(reply) => { let _ = reply.send(self.controller.shuffle()); }
            SessionCommand::Skip(reply) => { let _ = reply.send(self.controller.skip()); }
            SessionCommand::Previous(reply) => { let _ = reply.send(self.controller.previous()); }
            SessionCommand::TogglePause(reply) => { let _ = reply.send(self.controller.toggle_pause()); }
            SessionCommand::Pause(reply) => { let _ = reply.send(self.controller.pause()); }
            SessionCommand::Resume(reply) => { let _ = reply.send(self.controller.resume()); }
            SessionCommand::ToggleRepeat(reply) => { let _ = reply.send(self.controller.toggle_repeat()); }
            SessionCommand::SetVolume(volume, reply) => { let _ = reply.send(self.controller.set_volume(volume)); }
            SessionCommand::SetRemoteRepeat(mode, reply) => { let _ = reply.send(self.controller.set_remote_repeat(mode)); }
            SessionCommand::SetMute(muted, reply) => { let _ = reply.send(self.controller.set_mute(muted)); }
            SessionCommand::SetRemoteShuffle(enabled, reply) => { let _ = reply.send(self.controller.set_remote_shuffle(enabled)); }
            SessionCommand::Publish(force, reply) => {
                self.controller.request_publish(force);
                let _ = reply.send(());
            }
            SessionCommand::SetTargetChannel(channel_id, reply) => {
                let result = self.scheduler.set_target_channel(&channel_id).map_err(CommandError::from);
                if result.is_ok() {
                    self.controller.request_publish(true);
                }
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot(reply) => { let _ = reply.send(self.snapshot()); }
            SessionCommand::Tick => self.controller.tick(),
            SessionCommand::Shutdown(reply) => { let _ = reply.send(self.controller.shutdown()); }
            SessionCommand::Stop => {}
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let c = &self.controller;
        SessionSnapshot {
            state: c.state().clone(),
            phase: c.phase(),
            queue: c.queue().snapshot(),
            history: c.history().iter().cloned().collect(),
            embed: c.embed_state(),
            connected: c.is_connected(),
            publish_requests: c.publish_requests(),
            publishes_sent: self.scheduler.sent_count(),
        }
    }

    /// Hand the controller's accumulated publish request to the scheduler
    async fn flush_publish(&mut self) {
        let Some(force) = self.controller.take_publish_request() else {
            return;
        };
        let now = Instant::now();
        match self.scheduler.request(force, now) {
            PublishDecision::PublishNow => self.perform_publish().await,
            PublishDecision::ScheduleAfter(delay) => self.deferred_publish = Some(now + delay),
            PublishDecision::AlreadyPending => trace!("Publish already pending"),
        }
    }

    async fn perform_publish(&mut self) {
        let snapshot = self.controller.embed_state();
        match self.scheduler.perform(snapshot, Instant::now()).await {
            PublishOutcome::Sent { message_id, created } => {
                debug!("Published summary to message {}{}", message_id, if created { " (new)" } else { "" });
            }
            PublishOutcome::Unchanged | PublishOutcome::NoChannel => {}
            PublishOutcome::Failed(reason) => warn!("Summary publish failed: {}", reason),
        }
    }
}

/// Cloneable handle to a running session
///
/// Every method fails with `CommandError::NoSession` once the session task
/// has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn call<R>(&self, command: impl FnOnce(Reply<R>) -> SessionCommand) -> Result<R, CommandError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await.map_err(|_| CommandError::NoSession)?;
        response.await.map_err(|_| CommandError::NoSession)
    }

    fn spawn_ticker(&self, interval: Duration) {
        let commands = self.commands.downgrade();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(commands) = commands.upgrade() else { break };
                if commands.send(SessionCommand::Tick).await.is_err() {
                    break;
                }
            }
            debug!("Tick task stopped");
        });
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub async fn enqueue(&self, track: Track) -> Result<bool, CommandError> {
        self.call(|reply| SessionCommand::Enqueue(track, reply)).await
    }

    pub async fn enqueue_bulk(&self, tracks: Vec<Track>) -> Result<usize, CommandError> {
        self.call(|reply| SessionCommand::EnqueueBulk(tracks, reply)).await
    }

    /// Remove a queued track by id; `NoMatch` if it is not queued (any more)
    pub async fn remove(&self, id: &str) -> Result<Track, CommandError> {
        let id = id.to_string();
        self.call(|reply| SessionCommand::Remove(id, reply)).await?
            .ok_or(CommandError::NoMatch)
    }

    pub async fn clear(&self) -> Result<(), CommandError> {
        self.call(SessionCommand::Clear).await
    }

    pub async fn shuffle(&self) -> Result<(), CommandError> {
        self.call(SessionCommand::Shuffle).await
    }

    pub async fn skip(&self) -> Result<Option<Track>, CommandError> {
        self.call(SessionCommand::Skip).await?
    }

    pub async fn previous(&self) -> Result<Track, CommandError> {
        self.call(SessionCommand::Previous).await?
    }

    pub async fn toggle_pause(&self) -> Result<bool, CommandError> {
        self.call(SessionCommand::TogglePause).await
    }

    pub async fn pause(&self) -> Result<(), CommandError> {
        self.call(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), CommandError> {
        self.call(SessionCommand::Resume).await
    }

    pub async fn toggle_repeat(&self) -> Result<bool, CommandError> {
        self.call(SessionCommand::ToggleRepeat).await
    }

    pub async fn set_volume(&self, volume: u8) -> Result<bool, CommandError> {
        self.call(|reply| SessionCommand::SetVolume(volume, reply)).await?
    }

    pub async fn set_remote_repeat(&self, mode: RepeatMode) -> Result<bool, CommandError> {
        self.call(|reply| SessionCommand::SetRemoteRepeat(mode, reply)).await
    }

    pub async fn set_mute(&self, muted: bool) -> Result<bool, CommandError> {
        self.call(|reply| SessionCommand::SetMute(muted, reply)).await
    }

    pub async fn set_remote_shuffle(&self, enabled: bool) -> Result<bool, CommandError> {
        self.call(|reply| SessionCommand::SetRemoteShuffle(enabled, reply)).await
    }

    /// Request a publish of the current summary
    pub async fn publish(&self, force: bool) -> Result<(), CommandError> {
        self.call(|reply| SessionCommand::Publish(force, reply)).await
    }

    /// Publish to `channel_id` from now on, starting with a fresh message
    pub async fn set_target_channel(&self, channel_id: &str) -> Result<(), CommandError> {
        let channel_id = channel_id.to_string();
        self.call(|reply| SessionCommand::SetTargetChannel(channel_id, reply)).await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, CommandError> {
        self.call(SessionCommand::Snapshot).await
    }

    /// Run one end-of-track detection step
    pub async fn tick(&self) -> Result<(), CommandError> {
        self.commands.send(SessionCommand::Tick).await.map_err(|_| CommandError::NoSession)
    }

    /// Stop playback, disconnect and clear all session state
    pub async fn shutdown(&self) -> Result<(), CommandError> {
        self.call(SessionCommand::Shutdown).await
    }

    /// Terminate the session task
    pub async fn stop(&self) {
        let _ = self.commands.send(SessionCommand::Stop).await;
    }
}
