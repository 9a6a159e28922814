use crate::commands::CommandError;
use crate::data::{
    BridgeCommand, BridgeEvent, EmbedState, PlaybackState, PlayerPhase, PlayerStateUpdate,
    RepeatMode, Track, TrackHistory, TrackQueue,
};
use crate::helpers::voice::VoiceLink;
use crate::players::command_sink::CommandSink;
use std::sync::Arc;
use log::{debug, info, trace, warn};

/// Queue, history and transport state machine of one session
///
/// Every state-mutating operation records a publish request instead of
/// publishing directly. The owner drains the accumulated request with
/// [`PlaybackController::take_publish_request`] and hands it to the publish
/// scheduler, so any number of mutations between two drains collapse into a
/// single request.
pub struct PlaybackController {
    state: PlaybackState,
    queue: TrackQueue,
    history: TrackHistory,
    sink: Arc<dyn CommandSink>,
    voice: Arc<dyn VoiceLink>,
    pending_publish: Option<bool>,
    publish_requests: u64,
}

impl PlaybackController {
    pub fn new(sink: Arc<dyn CommandSink>, voice: Arc<dyn VoiceLink>) -> Self {
        debug!("Creating new PlaybackController");
        Self {
            state: PlaybackState::new(),
            queue: TrackQueue::new(),
            history: TrackHistory::new(),
            sink,
            voice,
            pending_publish: None,
            publish_requests: 0,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn history(&self) -> &TrackHistory {
        &self.history
    }

    pub fn phase(&self) -> PlayerPhase {
        self.state.phase()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.state.current_track.as_ref()
    }

    /// Whether the remote client is currently reachable
    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    /// Snapshot for the publish scheduler
    pub fn embed_state(&self) -> EmbedState {
        EmbedState::capture(&self.state, &self.queue)
    }

    /// Number of publish requests recorded since creation
    pub fn publish_requests(&self) -> u64 {
        self.publish_requests
    }

    /// Take the accumulated publish request, if any
    ///
    /// Returns `Some(force)` where `force` is true if any of the merged
    /// requests was forced.
    pub fn take_publish_request(&mut self) -> Option<bool> {
        self.pending_publish.take()
    }

    /// Record a publish request
    pub fn request_publish(&mut self, force: bool) {
        self.publish_requests += 1;
        let merged = self.pending_publish.unwrap_or(false) || force;
        self.pending_publish = Some(merged);
    }

    fn send(&self, command: BridgeCommand) -> bool {
        let frame = command.to_string();
        let sent = self.sink.send_command(command);
        if !sent {
            debug!("Remote client not connected, dropped command {}", frame);
        }
        sent
    }

    /// Add a track at the tail of the queue
    ///
    /// Returns `false` without any side effect if the track is already queued.
    pub fn enqueue(&mut self, track: Track) -> bool {
        let description = track.to_string();
        let added = self.queue.push_back(track);
        if added {
            debug!("Queued {}", description);
            self.request_publish(false);
        }
        added
    }

    /// Add tracks in order with a single publish request for the batch
    pub fn enqueue_bulk(&mut self, tracks: Vec<Track>) -> usize {
        let offered = tracks.len();
        let added = self.queue.extend(tracks);
        debug!("Queued {} of {} tracks", added, offered);
        if added > 0 {
            self.request_publish(false);
        }
        added
    }

    /// Remove a queued track by id
    pub fn remove(&mut self, id: &str) -> Option<Track> {
        let removed = self.queue.remove(id);
        if let Some(track) = &removed {
            debug!("Removed {} from the queue", track);
            self.request_publish(false);
        }
        removed
    }

    pub fn clear(&mut self) {
        debug!("Clearing queue of {} tracks", self.queue.len());
        self.queue.clear();
        self.request_publish(false);
    }

    pub fn shuffle(&mut self) {
        self.queue.shuffle();
        self.request_publish(false);
    }

    fn play(&mut self, track: Track) {
        info!("Playing {}", track);
        self.send(BridgeCommand::PlayUri(track.uri.clone()));
        self.state.start_track(track);
    }

    /// Move on to the head of the queue
    ///
    /// The finished track goes back to the queue tail when repeat is on and to
    /// the history otherwise. `force` marks the resulting publish as forced.
    pub fn advance(&mut self, force: bool) -> Option<&Track> {
        if let Some(finished) = self.state.current_track.take() {
            if self.state.repeat {
                trace!("Repeat on, requeueing {}", finished);
                self.queue.push_back(finished);
            } else {
                self.history.push(finished);
            }
        }

        match self.queue.pop_front() {
            Some(next) => {
                self.play(next);
                self.state.songs_played += 1;
            }
            None => {
                debug!("Queue exhausted, going idle");
                self.state.clear_track();
                self.state.songs_played = 0;
            }
        }

        self.request_publish(force);
        self.state.current_track.as_ref()
    }

    /// Skip the current track
    ///
    /// With an empty queue this stops playback instead. Fails with
    /// `QueueEmpty` when there is nothing playing and nothing queued.
    pub fn skip(&mut self) -> Result<Option<Track>, CommandError> {
        if self.queue.is_empty() {
            if self.state.current_track.is_none() {
                return Err(CommandError::QueueEmpty);
            }
            self.send(BridgeCommand::Pause);
            self.state.clear_track();
            self.state.songs_played = 0;
            self.request_publish(true);
            return Ok(None);
        }
        Ok(self.advance(true).cloned())
    }

    /// Go back to the previously played track
    ///
    /// Takes the last history entry, or the queue tail when repeat is on and
    /// the history is empty. The current track returns to the queue front.
    pub fn previous(&mut self) -> Result<Track, CommandError> {
        let target = match self.history.pop() {
            Some(track) => Some(track),
            None if self.state.repeat => self.queue.pop_back(),
            None => None,
        };

        let result = match target {
            Some(track) => {
                if let Some(current) = self.state.current_track.take() {
                    self.queue.push_front(current);
                }
                self.play(track.clone());
                Ok(track)
            }
            None => Err(CommandError::NoMatch),
        };

        self.request_publish(true);
        result
    }

    /// Flip between paused and playing, returning the new paused flag
    pub fn toggle_pause(&mut self) -> bool {
        if self.state.paused {
            self.resume();
        } else {
            self.pause();
        }
        self.state.paused
    }

    pub fn pause(&mut self) {
        self.send(BridgeCommand::Pause);
        self.state.paused = true;
        self.request_publish(false);
    }

    pub fn resume(&mut self) {
        self.send(BridgeCommand::Play);
        self.state.paused = false;
        self.request_publish(false);
    }

    /// Flip queue-level looping, returning the new flag
    pub fn toggle_repeat(&mut self) -> bool {
        self.state.repeat = !self.state.repeat;
        info!("Queue repeat {}", if self.state.repeat { "enabled" } else { "disabled" });
        self.request_publish(false);
        self.state.repeat
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<bool, CommandError> {
        if volume > 100 {
            return Err(CommandError::InvalidArgument(format!("volume {} is above 100", volume)));
        }
        Ok(self.send(BridgeCommand::Volume(volume)))
    }

    /// Set the remote player's native repeat; queue looping is unaffected
    pub fn set_remote_repeat(&mut self, mode: RepeatMode) -> bool {
        self.send(BridgeCommand::Repeat(mode))
    }

    pub fn set_mute(&mut self, muted: bool) -> bool {
        self.send(BridgeCommand::Mute(muted))
    }

    pub fn set_remote_shuffle(&mut self, enabled: bool) -> bool {
        self.send(BridgeCommand::Shuffle(enabled))
    }

    /// Apply a decoded event from the remote client
    pub fn on_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Progress(ms) => self.on_progress(ms),
            BridgeEvent::PlayerState(update) => self.on_player_state(update),
            BridgeEvent::Ping | BridgeEvent::Pong => trace!("Ignoring keep-alive event"),
        }
    }

    pub fn on_progress(&mut self, progress_ms: u64) {
        trace!("Remote progress {} ms", progress_ms);
        self.state.progress_ms = progress_ms;
        self.request_publish(false);
    }

    /// Apply a partial `playerState` push; absent fields are left untouched
    pub fn on_player_state(&mut self, update: PlayerStateUpdate) {
        if let Some(timestamp) = update.timestamp {
            self.state.last_remote_timestamp = Some(timestamp);
        }
        if let Some(duration) = update.duration {
            self.state.total_length_ms = duration;
        }
        if let Some(position) = update.position_as_of_timestamp {
            self.state.progress_ms = position;
        }
        if let Some(item) = update.item {
            if self.state.current_track.as_ref().is_some_and(|current| *current != item) {
                warn!("Remote client reports {} while {} is current",
                    item,
                    self.state.current_track.as_ref().map(|t| t.to_string()).unwrap_or_default());
            }
            self.state.remote_track = Some(item);
        }
        self.request_publish(false);
    }

    /// Periodic end-of-track detection and queue consumption
    pub fn tick(&mut self) {
        if self.state.repeat && self.queue.is_empty() && !self.history.is_empty() {
            debug!("Repeat on and queue empty, looping {} tracks from history", self.history.len());
            let looped = self.history.drain();
            self.queue.extend(looped);
        }

        if self.state.current_track.is_none() && self.queue.is_empty() {
            self.state.paused = true;
            self.state.songs_played = 0;
            self.request_publish(false);
            return;
        }

        if self.state.songs_played == 0 && self.state.current_track.is_none() {
            self.advance(false);
            return;
        }

        if self.state.progress_ms != 0 {
            // Only consecutive zero reads count
            self.state.awaiting_second_tick = false;
            return;
        }

        if self.state.awaiting_second_tick {
            debug!("Progress stayed at zero, advancing");
            self.state.awaiting_second_tick = false;
            self.advance(false);
        } else {
            trace!("Progress read zero, waiting one more tick");
            self.state.awaiting_second_tick = true;
        }
    }

    /// Stop playback and drop all session state
    pub fn shutdown(&mut self) {
        info!("Shutting down playback");
        self.send(BridgeCommand::Pause);
        self.voice.disconnect();
        self.sink.close();
        self.state.clear_track();
        self.state.songs_played = 0;
        self.state.remote_track = None;
        self.queue.clear();
        self.history.clear();
        self.request_publish(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::voice::NoopVoiceLink;
    use crate::players::command_sink::RecordingSink;

    fn track(id: &str) -> Track {
        Track::new(id, &format!("Song {}", id), "Artist", "Album", &format!("spotify:track:{}", id), 1000)
    }

    fn controller() -> (PlaybackController, Arc<RecordingSink>, Arc<NoopVoiceLink>) {
        let sink = Arc::new(RecordingSink::new());
        let voice = Arc::new(NoopVoiceLink::new());
        let controller = PlaybackController::new(sink.clone(), voice.clone());
        (controller, sink, voice)
    }

    fn queue_ids(controller: &PlaybackController) -> Vec<String> {
        controller.queue().iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let (mut c, _, _) = controller();
        assert!(c.enqueue(track("a")));
        assert!(!c.enqueue(track("a")));
        assert!(c.enqueue(track("b")));
        assert_eq!(queue_ids(&c), vec!["a", "b"]);
        assert_eq!(c.publish_requests(), 2);
    }

    #[test]
    fn test_enqueue_bulk_requests_one_publish() {
        let (mut c, _, _) = controller();
        c.enqueue(track("a"));
        c.enqueue(track("b"));
        let before = c.publish_requests();

        let added = c.enqueue_bulk(vec![track("a"), track("c"), track("d"), track("b"), track("e")]);
        assert_eq!(added, 3);
        assert_eq!(c.publish_requests(), before + 1);
        assert_eq!(queue_ids(&c), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_advance_without_repeat() {
        let (mut c, sink, _) = controller();
        c.enqueue_bulk(vec![track("a"), track("b"), track("c")]);
        c.advance(false);
        c.on_progress(5000);

        c.advance(false);
        assert_eq!(c.queue().len(), 1);
        assert_eq!(c.history().len(), 1);
        assert_eq!(c.current_track().unwrap().id, "b");
        assert_eq!(c.state().progress_ms, crate::data::PROGRESS_SENTINEL_MS);
        assert_eq!(c.state().songs_played, 2);
        assert!(!c.state().paused);
        assert_eq!(sink.frames(), vec!["playUri|spotify:track:a", "playUri|spotify:track:b"]);
    }

    #[test]
    fn test_advance_with_repeat_requeues_at_tail() {
        let (mut c, _, _) = controller();
        c.enqueue_bulk(vec![track("a"), track("b"), track("c")]);
        c.advance(false);
        c.toggle_repeat();

        c.advance(false);
        assert_eq!(c.current_track().unwrap().id, "b");
        assert_eq!(queue_ids(&c), vec!["c", "a"]);
        assert!(c.history().is_empty());
    }

    #[test]
    fn test_advance_on_empty_queue_goes_idle() {
        let (mut c, _, _) = controller();
        c.enqueue(track("a"));
        c.advance(false);
        c.advance(false);
        assert!(c.current_track().is_none());
        assert!(c.state().paused);
        assert_eq!(c.state().songs_played, 0);
        assert_eq!(c.phase(), PlayerPhase::Idle);
    }

    #[test]
    fn test_two_zero_ticks_advance_exactly_once() {
        let (mut c, sink, _) = controller();
        c.enqueue_bulk(vec![track("a"), track("b")]);
        c.tick();
        assert_eq!(c.current_track().unwrap().id, "a");
        sink.take();

        c.on_progress(0);
        c.tick();
        assert_eq!(c.phase(), PlayerPhase::Waiting);
        assert!(sink.sent().is_empty());

        c.tick();
        assert_eq!(c.current_track().unwrap().id, "b");
        assert_eq!(sink.frames(), vec!["playUri|spotify:track:b"]);
        assert_eq!(c.history().iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["a"]);
        assert!(c.queue().is_empty());

        // Sentinel progress keeps the new track from being skipped
        c.tick();
        c.tick();
        assert_eq!(c.current_track().unwrap().id, "b");
        assert_eq!(sink.sent().len(), 1);
    }

    #[test]
    fn test_nonzero_progress_between_zero_reads() {
        let (mut c, _, _) = controller();
        c.enqueue(track("a"));
        c.tick();
        c.on_progress(0);
        c.tick();
        c.on_progress(300);
        c.tick();
        assert_eq!(c.current_track().unwrap().id, "a");
        assert!(!c.state().awaiting_second_tick);

        c.on_progress(0);
        c.tick();
        assert_eq!(c.current_track().unwrap().id, "a");
        assert_eq!(c.phase(), PlayerPhase::Waiting);
    }

    #[test]
    fn test_tick_idle_resets_counters() {
        let (mut c, _, _) = controller();
        c.tick();
        assert!(c.state().paused);
        assert_eq!(c.state().songs_played, 0);
        assert_eq!(c.take_publish_request(), Some(false));
    }

    #[test]
    fn test_tick_loops_history_when_repeating() {
        let (mut c, _, _) = controller();
        c.enqueue_bulk(vec![track("a"), track("b")]);
        c.advance(false);
        c.advance(false);
        c.advance(false);
        assert!(c.current_track().is_none());
        assert_eq!(c.history().len(), 2);

        c.toggle_repeat();
        c.tick();
        assert!(c.history().is_empty());
        assert_eq!(c.current_track().unwrap().id, "a");
        assert_eq!(queue_ids(&c), vec!["b"]);
    }

    #[test]
    fn test_previous_from_history() {
        let (mut c, sink, _) = controller();
        c.enqueue_bulk(vec![track("a"), track("b")]);
        c.advance(false);
        c.advance(false);
        sink.take();

        let previous = c.previous().unwrap();
        assert_eq!(previous.id, "a");
        assert_eq!(c.current_track().unwrap().id, "a");
        assert_eq!(queue_ids(&c), vec!["b"]);
        assert!(c.history().is_empty());
        assert!(!c.state().paused);
        assert_eq!(sink.frames(), vec!["playUri|spotify:track:a"]);
        assert_eq!(c.take_publish_request(), Some(true));
    }

    #[test]
    fn test_previous_falls_back_to_queue_tail_when_repeating() {
        let (mut c, _, _) = controller();
        c.enqueue_bulk(vec![track("a"), track("b"), track("c")]);
        c.advance(false);
        c.toggle_repeat();

        let previous = c.previous().unwrap();
        assert_eq!(previous.id, "c");
        assert_eq!(queue_ids(&c), vec!["a", "b"]);
    }

    #[test]
    fn test_previous_without_candidates_is_a_miss() {
        let (mut c, sink, _) = controller();
        c.enqueue(track("a"));
        c.advance(false);
        sink.take();
        c.take_publish_request();

        assert!(matches!(c.previous(), Err(CommandError::NoMatch)));
        assert_eq!(c.current_track().unwrap().id, "a");
        assert!(sink.sent().is_empty());
        assert_eq!(c.take_publish_request(), Some(true));
    }

    #[test]
    fn test_skip_with_empty_queue_stops() {
        let (mut c, sink, _) = controller();
        assert!(matches!(c.skip(), Err(CommandError::QueueEmpty)));

        c.enqueue(track("a"));
        c.advance(false);
        sink.take();
        assert_eq!(c.skip().unwrap(), None);
        assert!(c.current_track().is_none());
        assert_eq!(c.state().songs_played, 0);
        assert_eq!(sink.frames(), vec!["pause"]);

        // A later enqueue starts playback again on the next tick
        c.enqueue(track("b"));
        c.tick();
        assert_eq!(c.current_track().unwrap().id, "b");
    }

    #[test]
    fn test_skip_advances() {
        let (mut c, _, _) = controller();
        c.enqueue_bulk(vec![track("a"), track("b")]);
        c.advance(false);
        c.take_publish_request();
        assert_eq!(c.skip().unwrap().map(|t| t.id), Some("b".to_string()));
        assert_eq!(c.take_publish_request(), Some(true));
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut c, sink, _) = controller();
        assert!(!c.toggle_pause());
        assert!(c.toggle_pause());
        c.resume();
        c.pause();
        assert_eq!(sink.frames(), vec!["play", "pause", "play", "pause"]);
        assert!(c.state().paused);
    }

    #[test]
    fn test_forwards_do_not_touch_queue_repeat() {
        let (mut c, sink, _) = controller();
        assert!(c.set_volume(55).unwrap());
        assert!(matches!(c.set_volume(101), Err(CommandError::InvalidArgument(_))));
        c.set_remote_repeat(RepeatMode::Track);
        c.set_mute(true);
        c.set_remote_shuffle(false);
        assert!(!c.state().repeat);
        assert_eq!(sink.frames(), vec!["volume|55", "repeat|2", "mute|true", "shuffle|false"]);
        assert_eq!(c.take_publish_request(), None);
    }

    #[test]
    fn test_partial_player_state_updates() {
        let (mut c, _, _) = controller();
        c.enqueue(track("a"));
        c.advance(false);

        c.on_player_state(PlayerStateUpdate { duration: Some(9000), ..Default::default() });
        assert_eq!(c.state().total_length_ms, 9000);
        assert_eq!(c.state().progress_ms, crate::data::PROGRESS_SENTINEL_MS);

        c.on_player_state(PlayerStateUpdate {
            timestamp: Some(1_718_000_000_000),
            position_as_of_timestamp: Some(4200),
            ..Default::default()
        });
        assert_eq!(c.state().total_length_ms, 9000);
        assert_eq!(c.state().progress_ms, 4200);
        assert_eq!(c.state().last_remote_timestamp, Some(1_718_000_000_000));
    }

    #[test]
    fn test_commands_while_disconnected_are_dropped() {
        let (mut c, sink, _) = controller();
        sink.set_connected(false);
        c.enqueue(track("a"));
        c.advance(false);
        assert_eq!(c.current_track().unwrap().id, "a");
        assert!(sink.sent().is_empty());
        assert!(!c.set_volume(10).unwrap());
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let (mut c, sink, voice) = controller();
        c.enqueue_bulk(vec![track("a"), track("b"), track("c")]);
        c.advance(false);
        c.advance(false);
        sink.take();

        c.shutdown();
        assert_eq!(sink.frames(), vec!["pause"]);
        assert!(!voice.is_connected());
        assert!(!sink.is_connected());
        assert!(c.current_track().is_none());
        assert!(c.queue().is_empty());
        assert!(c.history().is_empty());
        assert_eq!(c.state().songs_played, 0);
        assert_eq!(c.take_publish_request(), Some(true));

        c.tick();
        assert_eq!(c.phase(), PlayerPhase::Idle);
    }

    #[test]
    fn test_publish_requests_merge_force() {
        let (mut c, _, _) = controller();
        c.request_publish(false);
        c.request_publish(true);
        c.request_publish(false);
        assert_eq!(c.take_publish_request(), Some(true));
        assert_eq!(c.take_publish_request(), None);
    }

    #[test]
    fn test_embed_state_reflects_queue() {
        let (mut c, _, _) = controller();
        c.enqueue_bulk((0..7).map(|i| track(&i.to_string())).collect());
        c.advance(false);
        let snapshot = c.embed_state();
        assert_eq!(snapshot.track.unwrap().id, "0");
        assert_eq!(snapshot.queue_size, 6);
        assert_eq!(snapshot.queue_preview.len(), 5);
        assert!(!snapshot.paused);
    }
}
