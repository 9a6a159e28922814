use crate::data::EmbedState;
use crate::helpers::message_store::MessageStore;
use crate::helpers::presentation::{Presenter, PublishError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use log::{debug, info, trace, warn};

/// Default minimum spacing between two publishes
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(100);

/// Upper bound for a single presenter call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// What the owner has to do after a publish request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    /// Perform the publish right away
    PublishNow,
    /// Arm a single deferred publish after the given delay
    ScheduleAfter(Duration),
    /// A publish is already pending; it will pick up the latest state
    AlreadyPending,
}

/// Result of one performed publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The summary was sent; `created` is true if a new message was posted
    Sent { message_id: String, created: bool },
    /// Snapshot identical to the last published one, nothing sent
    Unchanged,
    /// No target channel configured yet
    NoChannel,
    Failed(String),
}

/// Coalesces publish requests into at most one publish per cooldown window
///
/// Not thread-safe by itself: it lives inside the session actor, which is the
/// only caller of `request` and `perform`. Presenter calls run on the actor,
/// so each one is bounded by the call timeout.
pub struct PublishScheduler {
    cooldown: Duration,
    call_timeout: Duration,
    presenter: Arc<dyn Presenter>,
    store: MessageStore,
    last_publish: Option<Instant>,
    last_published: Option<EmbedState>,
    scheduled: bool,
    pending_force: bool,
    sent_count: u64,
}

impl PublishScheduler {
    pub fn new(cooldown: Duration, presenter: Arc<dyn Presenter>, store: MessageStore) -> Self {
        debug!("Creating PublishScheduler with {} ms cooldown", cooldown.as_millis());
        Self {
            cooldown,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            presenter,
            store,
            last_publish: None,
            last_published: None,
            scheduled: false,
            pending_force: false,
            sent_count: 0,
        }
    }

    /// Bound each presenter call by `timeout` instead of the default
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether a publish is pending or in flight
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Number of summaries actually sent
    pub fn sent_count(&self) -> u64 {
        self.sent_count
    }

    pub fn last_published(&self) -> Option<&EmbedState> {
        self.last_published.as_ref()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Register a publish request made at `now`
    ///
    /// A forced request that arrives while another one is pending upgrades
    /// the pending publish to forced.
    pub fn request(&mut self, force: bool, now: Instant) -> PublishDecision {
        if self.scheduled {
            self.pending_force |= force;
            return PublishDecision::AlreadyPending;
        }

        let remaining = match self.last_publish {
            Some(last) => self.cooldown.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };

        self.scheduled = true;
        self.pending_force = force;
        if remaining.is_zero() {
            PublishDecision::PublishNow
        } else {
            trace!("Deferring publish by {} ms", remaining.as_millis());
            PublishDecision::ScheduleAfter(remaining)
        }
    }

    /// Publish `snapshot` for the pending request
    pub async fn perform(&mut self, snapshot: EmbedState, now: Instant) -> PublishOutcome {
        let force = std::mem::take(&mut self.pending_force);

        if !force && self.last_published.as_ref() == Some(&snapshot) {
            trace!("Summary unchanged, skipping publish");
            self.scheduled = false;
            return PublishOutcome::Unchanged;
        }

        let Some(channel_id) = self.store.channel_id().map(|c| c.to_string()) else {
            debug!("No target channel set, not publishing");
            self.scheduled = false;
            return PublishOutcome::NoChannel;
        };

        let body = self.presenter.render(&snapshot);
        let result = match self.store.message_id().map(|m| m.to_string()) {
            Some(message_id) => match bounded(self.call_timeout, self.presenter.edit_message(&channel_id, &message_id, &body)).await {
                Ok(()) => Ok((message_id, false)),
                Err(PublishError::TargetMissing(_)) => {
                    info!("Summary message {} is gone, posting a new one", message_id);
                    self.create(&channel_id, &body).await
                }
                Err(e) => Err(e),
            },
            None => self.create(&channel_id, &body).await,
        };

        self.scheduled = false;
        match result {
            Ok((message_id, created)) => {
                self.last_published = Some(snapshot);
                self.last_publish = Some(now);
                self.sent_count += 1;
                PublishOutcome::Sent { message_id, created }
            }
            Err(e) => {
                warn!("Failed to publish summary: {}", e);
                PublishOutcome::Failed(e.to_string())
            }
        }
    }

    async fn create(&mut self, channel_id: &str, body: &str) -> Result<(String, bool), PublishError> {
        let message_id = bounded(self.call_timeout, self.presenter.create_message(channel_id, body)).await?;
        if let Err(e) = self.store.set_message_id(&message_id) {
            warn!("Failed to persist message id {}: {}", message_id, e);
        }
        Ok((message_id, true))
    }

    /// Publish to a different channel from now on
    ///
    /// The old message id is dropped, so the next publish posts a new message.
    pub fn set_target_channel(&mut self, channel_id: &str) -> Result<(), PublishError> {
        info!("Publishing summaries to channel {}", channel_id);
        self.store.set_channel(channel_id)?;
        Ok(())
    }
}

async fn bounded<T>(limit: Duration, call: impl Future<Output = Result<T, PublishError>>) -> Result<T, PublishError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(PublishError::Timeout(limit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Track;
    use crate::helpers::presentation::TextPresenter;
    use async_trait::async_trait;
    use tempfile::{tempdir, TempDir};

    /// Presenter whose calls never finish in time
    struct StalledPresenter;

    #[async_trait]
    impl Presenter for StalledPresenter {
        fn render(&self, state: &EmbedState) -> String {
            format!("{:?}", state)
        }

        async fn edit_message(&self, _channel_id: &str, _message_id: &str, _body: &str) -> Result<(), PublishError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn create_message(&self, _channel_id: &str, _body: &str) -> Result<String, PublishError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".to_string())
        }
    }

    fn scheduler(with_channel: bool) -> (PublishScheduler, Arc<TextPresenter>, TempDir) {
        let dir = tempdir().unwrap();
        let mut store = MessageStore::load(dir.path(), "guild");
        if with_channel {
            store.set_channel("chan").unwrap();
        }
        let presenter = Arc::new(TextPresenter::new());
        (PublishScheduler::new(DEFAULT_COOLDOWN, presenter.clone(), store), presenter, dir)
    }

    fn snapshot(queue_size: usize) -> EmbedState {
        EmbedState {
            track: Some(Track::new("a", "A", "B", "C", "spotify:track:a", 1)),
            queue_preview: vec![],
            queue_size,
            repeat: false,
            paused: false,
        }
    }

    #[tokio::test]
    async fn test_first_request_publishes_now() {
        let (mut s, presenter, _dir) = scheduler(true);
        let now = Instant::now();
        assert_eq!(s.request(false, now), PublishDecision::PublishNow);
        assert_eq!(s.request(false, now), PublishDecision::AlreadyPending);

        let outcome = s.perform(snapshot(1), now).await;
        assert!(matches!(outcome, PublishOutcome::Sent { created: true, .. }));
        assert!(!s.is_scheduled());
        assert_eq!(presenter.message_count(), 1);
    }

    #[tokio::test]
    async fn test_requests_inside_cooldown_are_deferred() {
        let (mut s, _presenter, _dir) = scheduler(true);
        let start = Instant::now();
        s.request(false, start);
        s.perform(snapshot(1), start).await;

        let later = start + Duration::from_millis(30);
        assert_eq!(s.request(false, later), PublishDecision::ScheduleAfter(Duration::from_millis(70)));
        assert_eq!(s.request(false, later), PublishDecision::AlreadyPending);

        let after = start + Duration::from_millis(200);
        s.perform(snapshot(2), after).await;
        assert_eq!(s.request(false, after + Duration::from_millis(150)), PublishDecision::PublishNow);
    }

    #[tokio::test]
    async fn test_unchanged_snapshot_is_not_sent_unless_forced() {
        let (mut s, _presenter, _dir) = scheduler(true);
        let start = Instant::now();
        s.request(false, start);
        s.perform(snapshot(1), start).await;
        assert_eq!(s.sent_count(), 1);

        let later = start + Duration::from_secs(1);
        s.request(false, later);
        assert_eq!(s.perform(snapshot(1), later).await, PublishOutcome::Unchanged);
        assert_eq!(s.sent_count(), 1);
        // The skipped publish did not move the cooldown window
        assert_eq!(s.request(false, later), PublishDecision::PublishNow);
        s.perform(snapshot(1), later).await;

        s.request(true, later);
        assert!(matches!(s.perform(snapshot(1), later).await, PublishOutcome::Sent { created: false, .. }));
        assert_eq!(s.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_force_merges_into_pending_request() {
        let (mut s, _presenter, _dir) = scheduler(true);
        let start = Instant::now();
        s.request(false, start);
        s.perform(snapshot(1), start).await;

        let later = start + Duration::from_millis(10);
        assert!(matches!(s.request(false, later), PublishDecision::ScheduleAfter(_)));
        assert_eq!(s.request(true, later), PublishDecision::AlreadyPending);
        assert!(matches!(s.perform(snapshot(1), start + Duration::from_millis(100)).await, PublishOutcome::Sent { .. }));
    }

    #[tokio::test]
    async fn test_missing_message_is_recreated() {
        let (mut s, presenter, dir) = scheduler(true);
        let now = Instant::now();
        s.request(false, now);
        let PublishOutcome::Sent { message_id: first, .. } = s.perform(snapshot(1), now).await else {
            panic!("expected a sent publish");
        };
        presenter.delete_message(&first);

        let later = now + Duration::from_secs(1);
        s.request(false, later);
        let PublishOutcome::Sent { message_id: second, created } = s.perform(snapshot(2), later).await else {
            panic!("expected a sent publish");
        };
        assert!(created);
        assert_ne!(first, second);
        assert_eq!(MessageStore::load(dir.path(), "guild").message_id(), Some(second.as_str()));
    }

    #[tokio::test]
    async fn test_no_channel_clears_flag() {
        let (mut s, presenter, _dir) = scheduler(false);
        let now = Instant::now();
        s.request(false, now);
        assert_eq!(s.perform(snapshot(1), now).await, PublishOutcome::NoChannel);
        assert!(!s.is_scheduled());
        assert_eq!(presenter.message_count(), 0);

        s.set_target_channel("chan").unwrap();
        s.request(true, now);
        assert!(matches!(s.perform(snapshot(1), now).await, PublishOutcome::Sent { created: true, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_presenter_call_times_out() {
        let dir = tempdir().unwrap();
        let mut store = MessageStore::load(dir.path(), "guild");
        store.set_channel("chan").unwrap();
        let mut s = PublishScheduler::new(DEFAULT_COOLDOWN, Arc::new(StalledPresenter), store)
            .with_call_timeout(Duration::from_millis(500));

        let start = Instant::now();
        s.request(true, start);
        match s.perform(snapshot(1), start).await {
            PublishOutcome::Failed(reason) => assert!(reason.contains("500 ms")),
            other => panic!("expected a failed publish, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!s.is_scheduled());
        assert_eq!(s.sent_count(), 0);
        assert_eq!(s.store().message_id(), None);
    }

    #[tokio::test]
    async fn test_unwritable_record_is_an_io_error() {
        let dir = tempdir().unwrap();
        let store = MessageStore::load(dir.path(), "guild");
        // A directory in place of the record file makes every save fail
        std::fs::create_dir(store.path()).unwrap();
        let mut s = PublishScheduler::new(DEFAULT_COOLDOWN, Arc::new(TextPresenter::new()), store);

        assert!(matches!(s.set_target_channel("chan"), Err(PublishError::Io(_))));
    }
}
