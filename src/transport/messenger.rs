//! Reliable messenger.
//!
//! Sits on a [`Transport`] and turns it into a message pipe:
//!
//! - outbound messages are encoded, fragmented and written one fragment at a
//!   time, each fragment retried up to the policy's attempt budget;
//! - a background task decodes inbound packets, reassembles them and
//!   publishes every decoded message on a broadcast channel;
//! - feedback messages also resolve any pending [`wait_for_ack`].
//!
//! [`wait_for_ack`]: ReliableMessenger::wait_for_ack

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::core::{CodecError, ConfigError, SendPolicy, SyncConfig, Transport, TransportError};
use crate::message::{EnvelopeCodec, EventId, FeedbackEvent, Message};

use super::ack::{AckRegistry, AckWait, DEFAULT_ACK_CACHE_CAPACITY};
use super::frame::{Fragment, FrameCodec, FrameError};
use super::health::{MessengerStats, StatsSnapshot, TransportHealth};
use super::reassembly::Reassembler;

/// Messenger errors.
#[derive(Debug, Error)]
pub enum MessengerError {
    /// Envelope could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Link refused the message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No feedback for the event within the bound.
    #[error("no ack for event {event_id} within {timeout:?}")]
    AckTimeout {
        /// Event waited on.
        event_id: EventId,
        /// Bound that elapsed.
        timeout: Duration,
    },

    /// Peer did not introduce itself in time.
    #[error("identity exchange timed out after {timeout:?}")]
    IdentityTimeout {
        /// Bound that elapsed.
        timeout: Duration,
    },

    /// Encoded message does not fit in the fragment id space.
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge {
        /// Encoded size.
        size: usize,
        /// Largest size that can be fragmented.
        max: usize,
    },

    /// Messenger shut down while waiting.
    #[error("messenger closed")]
    Closed,
}

impl From<FrameError> for MessengerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::TooLarge { size, max } => Self::MessageTooLarge { size, max },
        }
    }
}

impl MessengerError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::AckTimeout { .. })
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    codec: FrameCodec,
    next_message_id: AtomicU8,
    send_lock: Mutex<()>,
    acks: AckRegistry,
    incoming: broadcast::Sender<Message>,
    health: watch::Sender<TransportHealth>,
    stats: MessengerStats,
}

impl Shared {
    fn mark_healthy(&self) {
        self.health.send_if_modified(|health| {
            if health.is_healthy() {
                false
            } else {
                *health = TransportHealth::Healthy;
                true
            }
        });
    }

    fn mark_degraded(&self, reason: String) {
        self.health.send_replace(TransportHealth::Degraded(reason));
    }

    fn dispatch(&self, message: Message) {
        self.stats.message_received();
        self.mark_healthy();

        if let Message::Feedback(feedback) = &message {
            let delivered = self.acks.resolve(feedback.clone());
            tracing::debug!(
                event_id = %feedback.original_event_id,
                delivered,
                "feedback received"
            );
        }
        // No subscribers is not an error; the message is simply unobserved.
        let _ = self.incoming.send(message);
    }
}

/// Message pipe over a lossy, small-MTU link.
pub struct ReliableMessenger {
    shared: Arc<Shared>,
    recv_task: JoinHandle<()>,
}

impl ReliableMessenger {
    /// Start a messenger on `transport`. Spawns the receive loop, so a tokio
    /// runtime must be running.
    pub fn new<T: Transport>(transport: T, config: SyncConfig) -> Result<Self, ConfigError> {
        Self::from_arc(Arc::new(transport), config)
    }

    /// Like [`new`](Self::new) for a transport that is already shared.
    pub fn from_arc(
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (incoming, _) = broadcast::channel(config.channel_capacity);
        let (health, _) = watch::channel(TransportHealth::Healthy);
        let shared = Arc::new(Shared {
            transport,
            codec: FrameCodec::from_config(&config),
            next_message_id: AtomicU8::new(0),
            send_lock: Mutex::new(()),
            acks: AckRegistry::new(DEFAULT_ACK_CACHE_CAPACITY.max(config.channel_capacity)),
            incoming,
            health,
            stats: MessengerStats::default(),
            config,
        });

        let recv_task = tokio::spawn(receive_loop(Arc::clone(&shared)));
        Ok(Self { shared, recv_task })
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Send with the configured retry budget.
    pub async fn send(&self, message: &Message) -> Result<(), MessengerError> {
        let policy = SendPolicy::with_retries(self.shared.config.max_retries);
        self.send_with_policy(message, policy).await
    }

    /// Encode, fragment and write `message`.
    ///
    /// Fragments go out in order, one at a time. If any fragment exhausts
    /// its attempts the whole send fails.
    pub async fn send_with_policy(
        &self,
        message: &Message,
        policy: SendPolicy,
    ) -> Result<(), MessengerError> {
        let shared = &self.shared;
        let bytes = EnvelopeCodec::encode(message)?;

        let _guard = shared.send_lock.lock().await;
        let message_id = shared.next_message_id.fetch_add(1, Ordering::Relaxed);
        let fragments = shared.codec.fragment(&bytes, message_id)?;
        let total = fragments.len();

        tracing::debug!(
            tag = message.tag(),
            message_id,
            bytes = bytes.len(),
            fragments = total,
            "sending message"
        );

        for fragment in &fragments {
            self.send_fragment(fragment, total, policy.max_retries).await?;
        }

        shared.stats.message_sent();
        Ok(())
    }

    async fn send_fragment(
        &self,
        fragment: &Fragment,
        total: usize,
        max_retries: u32,
    ) -> Result<(), TransportError> {
        let shared = &self.shared;
        let packet = fragment.encode();
        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            let result = shared.transport.send(&packet).await;
            sleep(shared.config.fragment_delay).await;

            match result {
                Ok(()) => {
                    shared.stats.fragment_sent();
                    shared.mark_healthy();
                    return Ok(());
                }
                Err(TransportError::Closed) => return Err(TransportError::Closed),
                Err(err) => {
                    shared.stats.fragment_failed();
                    tracing::warn!(
                        message_id = fragment.message_id,
                        index = fragment.index,
                        attempt,
                        attempts,
                        error = %err,
                        "fragment write failed"
                    );
                    shared.mark_degraded(format!("fragment_write_failed: {err}"));
                }
            }
        }

        Err(TransportError::FragmentSendFailed {
            message_id: fragment.message_id,
            index: fragment.index as usize,
            total,
            attempts,
        })
    }

    /// Wait for feedback on `event_id` for the configured ack timeout.
    pub async fn wait_for_ack(&self, event_id: EventId) -> Result<FeedbackEvent, MessengerError> {
        self.wait_for_ack_within(event_id, self.shared.config.ack_timeout).await
    }

    /// Wait for feedback on `event_id` for at most `bound`.
    ///
    /// Returns immediately if the feedback already arrived. The wait is
    /// deregistered on every exit path, cancellation included.
    pub async fn wait_for_ack_within(
        &self,
        event_id: EventId,
        bound: Duration,
    ) -> Result<FeedbackEvent, MessengerError> {
        let mut waiter = match self.shared.acks.register(event_id) {
            AckWait::Ready(feedback) => return Ok(feedback),
            AckWait::Pending(waiter) => waiter,
        };

        match timeout(bound, &mut waiter.rx).await {
            Ok(Ok(feedback)) => Ok(feedback),
            Ok(Err(_)) => Err(MessengerError::Closed),
            Err(_) => {
                tracing::warn!(%event_id, timeout = ?bound, "ack wait timed out");
                Err(MessengerError::AckTimeout {
                    event_id,
                    timeout: bound,
                })
            }
        }
    }

    /// New subscription to inbound messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.shared.incoming.subscribe()
    }

    /// Watch link health.
    pub fn health(&self) -> watch::Receiver<TransportHealth> {
        self.shared.health.subscribe()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Registered ack waiters.
    pub fn pending_acks(&self) -> usize {
        self.shared.acks.pending_count()
    }

    /// Close the link and stop receiving.
    pub async fn close(&self) {
        self.shared.transport.close().await;
        self.recv_task.abort();
    }
}

impl Drop for ReliableMessenger {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

impl std::fmt::Debug for ReliableMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableMessenger")
            .field("config", &self.shared.config)
            .field("health", &*self.shared.health.borrow())
            .field("stats", &self.shared.stats.snapshot())
            .finish_non_exhaustive()
    }
}

async fn receive_loop(shared: Arc<Shared>) {
    let mut reassembler = Reassembler::new(shared.config.reassembly_ttl);

    while let Some(packet) = shared.transport.recv().await {
        let Some(fragment) = Fragment::decode(&packet) else {
            shared.stats.malformed_packet();
            tracing::debug!(len = packet.len(), "packet shorter than fragment header");
            continue;
        };

        let Some(payload) = reassembler.add_fragment(fragment) else {
            continue;
        };

        match EnvelopeCodec::decode(&payload) {
            Ok(message) => shared.dispatch(message),
            Err(err) => {
                tracing::warn!(len = payload.len(), error = %err, "dropping undecodable message");
                reassembler.clear();
                shared.stats.decode_failed();
                shared.mark_degraded(format!("deserialization_failed: {err}"));
            }
        }
    }

    tracing::debug!("link closed, receive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{CardId, UserId};
    use crate::message::{ControlKind, ControlMessage, GameEvent};
    use crate::transport::MemoryLink;

    fn fast_config() -> SyncConfig {
        SyncConfig::default()
            .fragment_delay(Duration::from_millis(1))
            .ack_timeout(Duration::from_millis(200))
    }

    fn pair() -> (ReliableMessenger, ReliableMessenger, Arc<MemoryLink>, Arc<MemoryLink>) {
        let (a, b) = MemoryLink::pair(64);
        let (a, b) = (Arc::new(a), Arc::new(b));
        let ma = ReliableMessenger::from_arc(a.clone(), fast_config()).unwrap();
        let mb = ReliableMessenger::from_arc(b.clone(), fast_config()).unwrap();
        (ma, mb, a, b)
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (ma, mb, _, _) = pair();
        let mut rx = mb.subscribe();

        let event = GameEvent::card_revealed(UserId::new("host"), CardId::new("1"));
        ma.send(&event.clone().into()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Message::Game(event));
        assert_eq!(ma.stats().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_large_message_is_fragmented() {
        let (ma, mb, link_a, _) = pair();
        let mut rx = mb.subscribe();

        let msg: Message = ControlMessage::new(
            UserId::new("host"),
            ControlKind::SessionLeft {
                reason: "x".repeat(1500),
            },
        )
        .into();
        ma.send(&msg).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), msg);
        assert!(link_a.delivered() >= 3);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_before_sending() {
        let (a, _b) = MemoryLink::pair(4);
        let a = Arc::new(a);
        let config = fast_config().link_overhead(0).mtu(4);
        let ma = ReliableMessenger::from_arc(a.clone(), config).unwrap();

        let msg: Message = ControlMessage::new(
            UserId::new("host"),
            ControlKind::SessionLeft {
                reason: "x".repeat(300),
            },
        )
        .into();
        let err = ma.send(&msg).await.unwrap_err();

        assert!(matches!(err, MessengerError::MessageTooLarge { max: 256, .. }));
        assert!(!err.is_transient());
        assert_eq!(a.delivered(), 0);
    }

    #[tokio::test]
    async fn test_fragment_retried_then_succeeds() {
        let (ma, mb, link_a, _) = pair();
        let mut rx = mb.subscribe();
        let mut health = ma.health();

        link_a.fail_next_sends(2);
        let event = GameEvent::game_started(UserId::new("host"));
        ma.send(&event.clone().into()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Message::Game(event));
        let stats = ma.stats();
        assert_eq!(stats.fragment_failures, 2);
        assert_eq!(stats.fragments_sent, 1);
        assert!(health.borrow_and_update().is_healthy());
    }

    #[tokio::test]
    async fn test_send_fails_after_budget() {
        let (ma, _mb, link_a, _) = pair();
        link_a.fail_next_sends(3);

        let event = GameEvent::game_started(UserId::new("host"));
        let err = ma.send(&event.into()).await.unwrap_err();

        assert!(matches!(
            err,
            MessengerError::Transport(TransportError::FragmentSendFailed { attempts: 3, .. })
        ));
        assert!(!ma.health().borrow().is_healthy());
    }

    #[tokio::test]
    async fn test_buffered_ack_returns_immediately() {
        let (ma, mb, _, _) = pair();
        let mut rx = ma.subscribe();

        let id = EventId::new();
        mb.send(&FeedbackEvent::ack(id, UserId::new("guest"), 3).into())
            .await
            .unwrap();
        rx.recv().await.unwrap();

        let feedback = ma.wait_for_ack_within(id, Duration::ZERO).await.unwrap();
        assert!(feedback.is_ack());
        assert_eq!(ma.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_ack_timeout_deregisters() {
        let (ma, _mb, _, _) = pair();
        let id = EventId::new();

        let err = ma
            .wait_for_ack_within(id, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, MessengerError::AckTimeout { event_id, .. } if event_id == id));
        assert_eq!(ma.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_garbage_degrades_health_and_loop_survives() {
        let (ma, mb, link_a, _) = pair();
        let mut rx = mb.subscribe();
        let mut health = mb.health();

        link_a.send(&[0, 0, 0, b'{', b'x']).await.unwrap();
        health.changed().await.unwrap();
        assert!(matches!(
            &*health.borrow_and_update(),
            TransportHealth::Degraded(reason) if reason.starts_with("deserialization_failed")
        ));
        assert_eq!(mb.stats().decode_failures, 1);

        let event = GameEvent::game_started(UserId::new("host"));
        ma.send(&event.clone().into()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Message::Game(event));
        assert!(health.borrow().is_healthy());
    }

    #[tokio::test]
    async fn test_decode_failure_discards_partial_transfers() {
        let (ma, mb, link_a, _) = pair();
        let mut rx = mb.subscribe();
        let mut health = mb.health();

        let event = GameEvent::game_started(UserId::new("host"));
        let bytes = EnvelopeCodec::encode(&event.into()).unwrap();
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let part = |index: u8, payload: &[u8]| Fragment {
            message_id: 7,
            index,
            total_fragments: 1,
            payload: payload.to_vec(),
        };

        link_a.send(&part(0, head).encode()).await.unwrap();
        link_a.send(&[9, 0, 0, b'{', b'x']).await.unwrap();
        health.changed().await.unwrap();
        assert!(!health.borrow_and_update().is_healthy());
        assert_eq!(mb.stats().decode_failures, 1);

        // The first half went with the bad message; the second half alone
        // cannot complete anything.
        link_a.send(&part(1, tail).encode()).await.unwrap();

        let marker = GameEvent::turn_changed(UserId::new("host"), UserId::new("guest"));
        ma.send(&marker.clone().into()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Message::Game(marker));
        assert_eq!(mb.stats().decode_failures, 1);
    }

    #[tokio::test]
    async fn test_message_ids_wrap() {
        let (ma, mb, _, _) = pair();
        let mut rx = mb.subscribe();
        ma.shared.next_message_id.store(255, Ordering::Relaxed);

        for _ in 0..2 {
            ma.send(&GameEvent::game_started(UserId::new("host")).into())
                .await
                .unwrap();
            rx.recv().await.unwrap();
        }
        assert_eq!(ma.shared.next_message_id.load(Ordering::Relaxed), 1);
    }
}
