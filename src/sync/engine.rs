//! Sync engine
//!
//! Keeps both peers' [`GameState`] identical by funnelling every state
//! transition through one async mutex:
//!
//! - **local path** ([`SyncEngine::propose_event`]): validate, send, wait for
//!   the peer's feedback, then apply;
//! - **remote path**: dedup, validate, apply, answer with an ack or a
//!   rejection;
//! - **config path**: a `SessionConfig` replaces the state wholesale and
//!   clears the dedup window.
//!
//! The lock is held while a local proposal waits for its ack, so a remote
//! event arriving meanwhile is applied only after the proposal settles.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::core::constants::PROTOCOL_VERSION;
use crate::core::{DomainError, SyncConfig};
use crate::game::{GameState, MatchSetup, UserId, reduce, validate};
use crate::message::{
    ControlKind, ControlMessage, FeedbackEvent, FeedbackKind, GameEvent, Message, RejectionReason,
};
use crate::transport::{MessengerError, ReliableMessenger};

use super::dedup::DedupWindow;

/// Errors from the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Event breaks a game rule; nothing was sent.
    #[error("validation failed: {0}")]
    Validation(#[from] DomainError),

    /// Peer refused the event. Not retried.
    #[error("peer rejected event: {reason} (peer at version {current_version})")]
    Rejected {
        /// Peer's reason.
        reason: RejectionReason,
        /// Peer's version when it refused.
        current_version: u64,
    },

    /// Messenger failure outside the retry loop.
    #[error("messenger error: {0}")]
    Messenger(#[from] MessengerError),

    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: MessengerError,
    },

    /// No match configured yet.
    #[error("state not initialized")]
    NotInitialized,
}

/// What the remote path did with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Applied and acked.
    Applied {
        /// Local version after applying.
        new_version: u64,
    },
    /// Refused and answered with a rejection.
    Rejected(RejectionReason),
    /// Already processed; ignored without reply.
    Duplicate,
}

/// Session-level control notices forwarded to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Peer left.
    Left {
        /// Who left.
        user_id: UserId,
        /// Their reason.
        reason: String,
    },
    /// Peer wants a rematch.
    ReplayRequested {
        /// Who asked.
        user_id: UserId,
    },
}

#[derive(Debug)]
struct Core {
    state: Option<GameState>,
    dedup: DedupWindow,
}

struct Inner {
    local_id: UserId,
    messenger: Arc<ReliableMessenger>,
    config: SyncConfig,
    core: Mutex<Core>,
    state_tx: watch::Sender<Option<GameState>>,
    events_tx: broadcast::Sender<GameEvent>,
    notices_tx: broadcast::Sender<SessionNotice>,
}

/// Replicates game events between two peers.
pub struct SyncEngine {
    inner: Arc<Inner>,
    listener: JoinHandle<()>,
}

impl SyncEngine {
    /// Engine for `local_id` over `messenger`.
    ///
    /// Subscribes to the messenger before returning, so nothing that arrives
    /// afterwards is missed. Requires a running tokio runtime.
    pub fn new(local_id: UserId, messenger: Arc<ReliableMessenger>) -> Self {
        let config = messenger.config().clone();
        let (state_tx, _) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(config.channel_capacity);
        let (notices_tx, _) = broadcast::channel(config.channel_capacity);

        let inner = Arc::new(Inner {
            local_id,
            core: Mutex::new(Core {
                state: None,
                dedup: DedupWindow::new(config.dedup_capacity),
            }),
            messenger,
            config,
            state_tx,
            events_tx,
            notices_tx,
        });

        let inbound = inner.messenger.subscribe();
        let listener = tokio::spawn(listen(Arc::clone(&inner), inbound));
        Self { inner, listener }
    }

    /// Local player.
    pub fn local_id(&self) -> &UserId {
        &self.inner.local_id
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Underlying messenger.
    pub fn messenger(&self) -> &Arc<ReliableMessenger> {
        &self.inner.messenger
    }

    /// Latest published state.
    pub fn state(&self) -> Option<GameState> {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch published states.
    pub fn watch_state(&self) -> watch::Receiver<Option<GameState>> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to applied events, local and remote.
    pub fn subscribe_events(&self) -> broadcast::Receiver<GameEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Subscribe to leave and replay notices.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices_tx.subscribe()
    }

    /// Propose a local event with the configured retry budget.
    pub async fn propose_event(&self, event: GameEvent) -> Result<GameState, SyncError> {
        self.inner.propose(event, self.inner.config.max_retries).await
    }

    /// Propose a local event, trying at most `max_retries` times.
    ///
    /// Validates first and sends nothing if the event breaks a rule. A
    /// rejection from the peer ends the proposal at once; transport failures
    /// and ack timeouts are retried after `retry_backoff * attempt`.
    pub async fn propose_event_with_retries(
        &self,
        event: GameEvent,
        max_retries: u32,
    ) -> Result<GameState, SyncError> {
        self.inner.propose(event, max_retries).await
    }

    /// Process one inbound event as if it came off the link.
    pub async fn handle_remote_event(&self, event: GameEvent) -> RemoteOutcome {
        self.inner.handle_remote_event(event).await
    }

    /// Send a match configuration to the peer, then apply it locally.
    ///
    /// The local player becomes the host and takes the first turn.
    pub async fn start_match(&self, setup: MatchSetup) -> Result<GameState, SyncError> {
        if setup.game_players.len() < 2 {
            return Err(DomainError::NotEnoughPlayers.into());
        }
        let message = ControlMessage::new(
            self.inner.local_id.clone(),
            ControlKind::SessionConfig(setup.clone()),
        );
        self.inner.messenger.send(&message.into()).await?;
        Ok(self.inner.apply_config(&self.inner.local_id, &setup).await)
    }

    /// Tell the peer we are leaving.
    pub async fn send_leave(&self, reason: impl Into<String>) -> Result<(), SyncError> {
        let kind = ControlKind::SessionLeft {
            reason: reason.into(),
        };
        self.send_control(kind).await
    }

    /// Ask the peer for a rematch.
    pub async fn send_replay_requested(&self) -> Result<(), SyncError> {
        self.send_control(ControlKind::ReplayRequested).await
    }

    async fn send_control(&self, kind: ControlKind) -> Result<(), SyncError> {
        let message = ControlMessage::new(self.inner.local_id.clone(), kind);
        self.inner.messenger.send(&message.into()).await?;
        Ok(())
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("local_id", &self.inner.local_id)
            .field("version", &self.state().map(|s| s.version))
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn publish(&self, state: GameState, event: GameEvent) {
        self.state_tx.send_replace(Some(state));
        let _ = self.events_tx.send(event);
    }

    async fn propose(&self, event: GameEvent, max_retries: u32) -> Result<GameState, SyncError> {
        let mut core = self.core.lock().await;
        let state = core.state.as_ref().ok_or(SyncError::NotInitialized)?;
        validate(state, &event)?;

        let attempts = max_retries.max(1);
        let mut attempt = 0;
        let last = loop {
            attempt += 1;
            let err = match self.exchange(&event).await {
                Ok(feedback) => match feedback.kind {
                    FeedbackKind::EventAck { new_version } => {
                        let current = core.state.as_ref().ok_or(SyncError::NotInitialized)?;
                        let next = reduce(current, &event);
                        if next.version != new_version {
                            tracing::warn!(
                                event_id = %event.event_id,
                                local = next.version,
                                remote = new_version,
                                "peer version differs after ack"
                            );
                        }
                        core.state = Some(next.clone());
                        self.publish(next.clone(), event);
                        return Ok(next);
                    }
                    FeedbackKind::EventRejected {
                        reason,
                        current_version,
                    } => {
                        tracing::info!(
                            event_id = %event.event_id,
                            %reason,
                            current_version,
                            "peer rejected event"
                        );
                        return Err(SyncError::Rejected {
                            reason,
                            current_version,
                        });
                    }
                },
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err.into()),
            };

            tracing::warn!(
                event_id = %event.event_id,
                attempt,
                attempts,
                error = %err,
                "event exchange failed"
            );
            if attempt >= attempts {
                break err;
            }
            sleep(self.config.retry_backoff * attempt).await;
        };

        Err(SyncError::RetriesExhausted { attempts, last })
    }

    async fn exchange(&self, event: &GameEvent) -> Result<FeedbackEvent, MessengerError> {
        self.messenger.send(&Message::Game(event.clone())).await?;
        self.messenger.wait_for_ack(event.event_id).await
    }

    async fn handle_remote_event(&self, event: GameEvent) -> RemoteOutcome {
        let mut core = self.core.lock().await;

        if core.dedup.contains(&event.event_id) {
            tracing::debug!(event_id = %event.event_id, "duplicate event ignored");
            return RemoteOutcome::Duplicate;
        }

        let Some(state) = core.state.as_ref() else {
            self.reply(FeedbackEvent::rejected(
                event.event_id,
                self.local_id.clone(),
                RejectionReason::GameNotStarted,
                0,
            ))
            .await;
            return RemoteOutcome::Rejected(RejectionReason::GameNotStarted);
        };

        if let Err(err) = validate(state, &event) {
            tracing::info!(
                event_id = %event.event_id,
                sender = %event.sender_id,
                code = err.code(),
                "rejecting remote event"
            );
            let current_version = state.version;
            self.reply(FeedbackEvent::rejected(
                event.event_id,
                self.local_id.clone(),
                RejectionReason::InvalidState,
                current_version,
            ))
            .await;
            return RemoteOutcome::Rejected(RejectionReason::InvalidState);
        }

        let next = reduce(state, &event);
        let new_version = next.version;
        let event_id = event.event_id;
        core.dedup.remember(event_id);
        core.state = Some(next.clone());
        self.publish(next, event);

        self.reply(FeedbackEvent::ack(event_id, self.local_id.clone(), new_version))
            .await;
        RemoteOutcome::Applied { new_version }
    }

    async fn reply(&self, feedback: FeedbackEvent) {
        let event_id = feedback.original_event_id;
        if let Err(err) = self.messenger.send(&feedback.into()).await {
            tracing::warn!(%event_id, error = %err, "failed to send feedback");
        }
    }

    async fn apply_config(&self, host: &UserId, setup: &MatchSetup) -> GameState {
        let mut core = self.core.lock().await;
        let state = GameState::from_setup(host, setup);
        core.dedup.clear();
        core.state = Some(state.clone());

        tracing::info!(
            %host,
            rows = setup.rows,
            cols = setup.cols,
            players = setup.game_players.len(),
            "match configured"
        );
        self.publish(state.clone(), GameEvent::game_started(host.clone()));
        state
    }

    async fn handle_control(&self, message: ControlMessage) {
        if message.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                peer = %message.user_id,
                version = message.protocol_version,
                "peer speaks a different protocol version"
            );
        }

        match message.kind {
            ControlKind::SessionConfig(setup) => {
                self.apply_config(&message.user_id, &setup).await;
            }
            ControlKind::SessionLeft { reason } => {
                let _ = self.notices_tx.send(SessionNotice::Left {
                    user_id: message.user_id,
                    reason,
                });
            }
            ControlKind::ReplayRequested => {
                let _ = self.notices_tx.send(SessionNotice::ReplayRequested {
                    user_id: message.user_id,
                });
            }
            ControlKind::Identity { .. } => {}
        }
    }
}

async fn listen(inner: Arc<Inner>, mut inbound: broadcast::Receiver<Message>) {
    loop {
        match inbound.recv().await {
            Ok(Message::Game(event)) => {
                inner.handle_remote_event(event).await;
            }
            Ok(Message::Control(message)) => inner.handle_control(message).await,
            Ok(Message::Feedback(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "engine fell behind inbound messages");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::game::fixtures::{guest, host, setup};
    use crate::game::{CardId, CardState};
    use crate::transport::MemoryLink;

    fn config() -> SyncConfig {
        SyncConfig::default()
            .fragment_delay(Duration::ZERO)
            .ack_timeout(Duration::from_millis(100))
            .retry_backoff(Duration::from_millis(10))
    }

    fn engines() -> (SyncEngine, SyncEngine) {
        let (a, b) = MemoryLink::pair(64);
        let ma = Arc::new(ReliableMessenger::new(a, config()).unwrap());
        let mb = Arc::new(ReliableMessenger::new(b, config()).unwrap());
        (SyncEngine::new(host(), ma), SyncEngine::new(guest(), mb))
    }

    async fn wait_version(engine: &SyncEngine, version: u64) {
        let mut rx = engine.watch_state();
        rx.wait_for(|s| s.as_ref().is_some_and(|s| s.version == version))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_propose_before_config() {
        let (a, _b) = engines();
        let err = a
            .propose_event(GameEvent::card_revealed(host(), CardId::new("0")))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotInitialized));
    }

    #[tokio::test]
    async fn test_start_match_configures_both() {
        let (a, b) = engines();
        let mut events = b.subscribe_events();

        let state = a.start_match(setup()).await.unwrap();
        assert_eq!(state.version, 1);
        wait_version(&b, 1).await;

        assert_eq!(b.state().unwrap(), state);
        let started = events.recv().await.unwrap();
        assert_eq!(started.sender_id, host());
    }

    #[tokio::test]
    async fn test_propose_applies_on_both() {
        let (a, b) = engines();
        a.start_match(setup()).await.unwrap();
        wait_version(&b, 1).await;

        let state = a
            .propose_event(GameEvent::card_revealed(host(), CardId::new("0")))
            .await
            .unwrap();
        assert_eq!(state.version, 2);
        assert_eq!(b.state().unwrap(), state);
        assert_eq!(
            state.card(&CardId::new("0")).unwrap().state,
            CardState::Revealed
        );
    }

    #[tokio::test]
    async fn test_invalid_local_event_sends_nothing() {
        let (a, b) = engines();
        a.start_match(setup()).await.unwrap();
        wait_version(&b, 1).await;
        let sent_before = a.messenger().stats().messages_sent;

        let err = b
            .propose_event(GameEvent::card_revealed(guest(), CardId::new("0")))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(DomainError::NotYourTurn)));
        assert_eq!(b.messenger().stats().messages_sent, 0);
        assert_eq!(a.messenger().stats().messages_sent, sent_before);
    }

    #[tokio::test]
    async fn test_remote_duplicate_is_noop() {
        let (a, b) = engines();
        a.start_match(setup()).await.unwrap();
        wait_version(&b, 1).await;

        let event = GameEvent::card_revealed(host(), CardId::new("1"));
        assert_eq!(
            b.handle_remote_event(event.clone()).await,
            RemoteOutcome::Applied { new_version: 2 }
        );
        let sent = b.messenger().stats().messages_sent;

        assert_eq!(b.handle_remote_event(event).await, RemoteOutcome::Duplicate);
        assert_eq!(b.state().unwrap().version, 2);
        assert_eq!(b.messenger().stats().messages_sent, sent);
    }

    #[tokio::test]
    async fn test_remote_invalid_event_rejected() {
        let (a, b) = engines();
        a.start_match(setup()).await.unwrap();
        wait_version(&b, 1).await;

        let out_of_turn = GameEvent::card_revealed(guest(), CardId::new("0"));
        assert_eq!(
            b.handle_remote_event(out_of_turn).await,
            RemoteOutcome::Rejected(RejectionReason::InvalidState)
        );
        assert_eq!(b.state().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_remote_before_config_rejected() {
        let (_a, b) = engines();
        assert_eq!(
            b.handle_remote_event(GameEvent::game_started(host())).await,
            RemoteOutcome::Rejected(RejectionReason::GameNotStarted)
        );
    }

    #[tokio::test]
    async fn test_config_resets_dedup() {
        let (a, b) = engines();
        a.start_match(setup()).await.unwrap();
        wait_version(&b, 1).await;

        let event = GameEvent::card_revealed(host(), CardId::new("1"));
        b.handle_remote_event(event.clone()).await;

        a.start_match(setup()).await.unwrap();
        wait_version(&b, 1).await;
        assert_eq!(
            b.handle_remote_event(event).await,
            RemoteOutcome::Applied { new_version: 2 }
        );
    }

    #[tokio::test]
    async fn test_start_match_needs_two_players() {
        let (a, _b) = engines();
        let mut lonely = setup();
        lonely.game_players.truncate(1);
        assert!(matches!(
            a.start_match(lonely).await,
            Err(SyncError::Validation(DomainError::NotEnoughPlayers))
        ));
    }

    #[tokio::test]
    async fn test_notices_forwarded() {
        let (a, b) = engines();
        let mut notices = b.subscribe_notices();

        a.send_leave("user_left").await.unwrap();
        a.send_replay_requested().await.unwrap();

        assert_eq!(
            notices.recv().await.unwrap(),
            SessionNotice::Left {
                user_id: host(),
                reason: "user_left".into()
            }
        );
        assert_eq!(
            notices.recv().await.unwrap(),
            SessionNotice::ReplayRequested { user_id: host() }
        );
    }
}
