//! Message types exchanged between peers.
//!
//! Three closed families share one envelope:
//!
//! | Family   | Tags                                          |
//! |----------|-----------------------------------------------|
//! | Control  | `SYS_JOIN`, `SYS_CONFIG`, `SYS_LEAVE`, `SYS_REPLAY` |
//! | Game     | `GC`, `CR`, `PR`, `TC`, `GF`                  |
//! | Feedback | `ACK`, `REJ`                                  |
//!
//! The discriminator lives in the `t` field of the serialized object.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::constants::{DEFAULT_LEAVE_REASON, PROTOCOL_VERSION};
use crate::game::{CardId, MatchSetup, UserId};

/// Unique id chosen by an event's originator.
///
/// Doubles as the dedup key on the receiver and the ack correlation key on
/// the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Milliseconds since the UNIX epoch, saturating at zero for clocks set
/// before 1970.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

fn default_leave_reason() -> String {
    DEFAULT_LEAVE_REASON.to_string()
}

// =============================================================================
// CONTROL
// =============================================================================

/// Identity, configuration and session-control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    /// Sender.
    pub user_id: UserId,
    /// Sender's protocol version.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    /// What the message says.
    #[serde(flatten)]
    pub kind: ControlKind,
}

/// Control message variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ControlKind {
    /// Announce the sender's identity right after the link comes up.
    #[serde(rename = "SYS_JOIN", rename_all = "camelCase")]
    Identity {
        /// Display name.
        player_name: String,
        /// Single-glyph avatar.
        user_avatar: char,
    },

    /// Start or restart a match with this board and roster.
    #[serde(rename = "SYS_CONFIG")]
    SessionConfig(MatchSetup),

    /// The sender is leaving.
    #[serde(rename = "SYS_LEAVE")]
    SessionLeft {
        /// Free-form reason.
        #[serde(default = "default_leave_reason")]
        reason: String,
    },

    /// The sender wants to play again.
    #[serde(rename = "SYS_REPLAY")]
    ReplayRequested,
}

impl ControlMessage {
    /// Wrap a control variant from `user_id` at the current protocol version.
    pub fn new(user_id: UserId, kind: ControlKind) -> Self {
        Self {
            user_id,
            protocol_version: PROTOCOL_VERSION,
            kind,
        }
    }
}

// =============================================================================
// GAME EVENTS
// =============================================================================

/// A domain event proposed by one peer and replicated to the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    /// Idempotency and ack-correlation key.
    pub event_id: EventId,
    /// Creation time in milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Originator.
    pub sender_id: UserId,
    /// What happened.
    #[serde(flatten)]
    pub kind: GameEventKind,
}

/// Game event variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum GameEventKind {
    /// Host starts the match.
    #[serde(rename = "GC")]
    GameStarted,

    /// Turn holder flips a card.
    #[serde(rename = "CR", rename_all = "camelCase")]
    CardRevealed {
        /// Flipped card.
        card_id: CardId,
    },

    /// The two revealed cards are settled.
    #[serde(rename = "PR")]
    PairResolved {
        /// First revealed card.
        card1: CardId,
        /// Second revealed card.
        card2: CardId,
        /// Whether their symbols matched.
        matched: bool,
    },

    /// Turn passes to another player.
    #[serde(rename = "TC", rename_all = "camelCase")]
    TurnChanged {
        /// New turn holder.
        next_user_id: UserId,
    },

    /// Match is over.
    #[serde(rename = "GF", rename_all = "camelCase")]
    GameFinished {
        /// Winner.
        winner_id: UserId,
    },
}

impl GameEvent {
    /// New event from `sender_id` with a fresh id and the current time.
    pub fn new(sender_id: UserId, kind: GameEventKind) -> Self {
        Self {
            event_id: EventId::new(),
            timestamp: now_millis(),
            sender_id,
            kind,
        }
    }

    /// `GameStarted` from `sender_id`.
    pub fn game_started(sender_id: UserId) -> Self {
        Self::new(sender_id, GameEventKind::GameStarted)
    }

    /// `CardRevealed` from `sender_id`.
    pub fn card_revealed(sender_id: UserId, card_id: CardId) -> Self {
        Self::new(sender_id, GameEventKind::CardRevealed { card_id })
    }

    /// `PairResolved` from `sender_id`.
    pub fn pair_resolved(sender_id: UserId, card1: CardId, card2: CardId, matched: bool) -> Self {
        Self::new(
            sender_id,
            GameEventKind::PairResolved {
                card1,
                card2,
                matched,
            },
        )
    }

    /// `TurnChanged` from `sender_id`.
    pub fn turn_changed(sender_id: UserId, next_user_id: UserId) -> Self {
        Self::new(sender_id, GameEventKind::TurnChanged { next_user_id })
    }

    /// `GameFinished` from `sender_id`.
    pub fn game_finished(sender_id: UserId, winner_id: UserId) -> Self {
        Self::new(sender_id, GameEventKind::GameFinished { winner_id })
    }
}

// =============================================================================
// FEEDBACK
// =============================================================================

/// Why a remote event was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Sender does not hold the turn.
    InvalidTurn,
    /// Card already face up.
    CardAlreadyRevealed,
    /// Match not running.
    GameNotStarted,
    /// Event does not apply to the receiver's state.
    InvalidState,
    /// Versions diverged.
    VersionConflict,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidTurn => "INVALID_TURN",
            Self::CardAlreadyRevealed => "CARD_ALREADY_REVEALED",
            Self::GameNotStarted => "GAME_NOT_STARTED",
            Self::InvalidState => "INVALID_STATE",
            Self::VersionConflict => "VERSION_CONFLICT",
        };
        f.write_str(name)
    }
}

/// Receiver's answer to a game event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    /// Event being answered.
    pub original_event_id: EventId,
    /// Peer that answered.
    pub responder_id: UserId,
    /// The answer.
    #[serde(flatten)]
    pub kind: FeedbackKind,
}

/// Feedback variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FeedbackKind {
    /// Event applied; the responder is now at `new_version`.
    #[serde(rename = "ACK", rename_all = "camelCase")]
    EventAck {
        /// Responder's version after applying.
        new_version: u64,
    },

    /// Event refused; responder state untouched.
    #[serde(rename = "REJ", rename_all = "camelCase")]
    EventRejected {
        /// Why.
        reason: RejectionReason,
        /// Responder's unchanged version.
        current_version: u64,
    },
}

impl FeedbackEvent {
    /// Acknowledge `original_event_id`.
    pub fn ack(original_event_id: EventId, responder_id: UserId, new_version: u64) -> Self {
        Self {
            original_event_id,
            responder_id,
            kind: FeedbackKind::EventAck { new_version },
        }
    }

    /// Reject `original_event_id`.
    pub fn rejected(
        original_event_id: EventId,
        responder_id: UserId,
        reason: RejectionReason,
        current_version: u64,
    ) -> Self {
        Self {
            original_event_id,
            responder_id,
            kind: FeedbackKind::EventRejected {
                reason,
                current_version,
            },
        }
    }

    /// Whether this is an ack.
    pub fn is_ack(&self) -> bool {
        matches!(self.kind, FeedbackKind::EventAck { .. })
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Any message that can cross the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Identity / config / leave / replay.
    Control(ControlMessage),
    /// Domain event.
    Game(GameEvent),
    /// Ack or rejection.
    Feedback(FeedbackEvent),
}

impl Message {
    /// Wire discriminator of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Control(msg) => match msg.kind {
                ControlKind::Identity { .. } => "SYS_JOIN",
                ControlKind::SessionConfig(_) => "SYS_CONFIG",
                ControlKind::SessionLeft { .. } => "SYS_LEAVE",
                ControlKind::ReplayRequested => "SYS_REPLAY",
            },
            Self::Game(event) => match event.kind {
                GameEventKind::GameStarted => "GC",
                GameEventKind::CardRevealed { .. } => "CR",
                GameEventKind::PairResolved { .. } => "PR",
                GameEventKind::TurnChanged { .. } => "TC",
                GameEventKind::GameFinished { .. } => "GF",
            },
            Self::Feedback(feedback) => match feedback.kind {
                FeedbackKind::EventAck { .. } => "ACK",
                FeedbackKind::EventRejected { .. } => "REJ",
            },
        }
    }
}

impl From<ControlMessage> for Message {
    fn from(msg: ControlMessage) -> Self {
        Self::Control(msg)
    }
}

impl From<GameEvent> for Message {
    fn from(event: GameEvent) -> Self {
        Self::Game(event)
    }
}

impl From<FeedbackEvent> for Message {
    fn from(feedback: FeedbackEvent) -> Self {
        Self::Feedback(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn test_event_constructors() {
        let sender = UserId::new("host");
        let event = GameEvent::card_revealed(sender.clone(), CardId::new("3"));

        assert_eq!(event.sender_id, sender);
        assert!(event.timestamp > 0);
        assert_eq!(
            event.kind,
            GameEventKind::CardRevealed {
                card_id: CardId::new("3")
            }
        );
    }

    #[test]
    fn test_tags() {
        let sender = UserId::new("host");
        let id = EventId::new();

        let msg: Message = GameEvent::game_finished(sender.clone(), sender.clone()).into();
        assert_eq!(msg.tag(), "GF");

        let msg: Message = FeedbackEvent::ack(id, sender.clone(), 4).into();
        assert_eq!(msg.tag(), "ACK");

        let msg: Message = ControlMessage::new(sender, ControlKind::ReplayRequested).into();
        assert_eq!(msg.tag(), "SYS_REPLAY");
    }

    #[test]
    fn test_rejection_reason_display_matches_wire() {
        let wire = serde_json::to_string(&RejectionReason::InvalidState).unwrap();
        assert_eq!(wire, "\"INVALID_STATE\"");
        assert_eq!(RejectionReason::InvalidState.to_string(), "INVALID_STATE");
    }

    #[test]
    fn test_feedback_is_ack() {
        let id = EventId::new();
        let responder = UserId::new("guest");
        assert!(FeedbackEvent::ack(id, responder.clone(), 2).is_ack());
        assert!(!FeedbackEvent::rejected(id, responder, RejectionReason::InvalidState, 2).is_ack());
    }
}
