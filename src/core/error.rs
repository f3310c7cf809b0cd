//! Error types shared across layers.

use std::io;

use thiserror::Error;

/// Game-rule violations found by the validator.
///
/// These are typed results, not failures of the protocol: a local proposal
/// stops on them, a remote event is answered with an `EventRejected`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainError {
    /// Sender does not hold the current turn.
    #[error("it is not your turn")]
    NotYourTurn,

    /// Game is not in progress.
    #[error("game has not started yet")]
    GameNotStarted,

    /// Game already left the waiting state.
    #[error("game is already in progress")]
    GameAlreadyInProgress,

    /// Only the host may start a game.
    #[error("only the host can start the game")]
    OnlyHostCanStart,

    /// Fewer than two players in the roster.
    #[error("need at least 2 players")]
    NotEnoughPlayers,

    /// Target card is missing or not face down.
    #[error("card is not in hidden state")]
    CardNotHidden,

    /// Two cards are already face up this turn.
    #[error("already 2 cards revealed this turn")]
    TooManyCardsRevealed,

    /// A pair can only be resolved with exactly two revealed cards.
    #[error("must have 2 revealed cards to resolve")]
    InsufficientRevealedCards,

    /// The named player is not in the roster.
    #[error("target player does not exist")]
    InvalidTargetPlayer,
}

impl DomainError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotYourTurn => "GAME_NOT_YOUR_TURN",
            Self::GameNotStarted => "GAME_NOT_STARTED",
            Self::GameAlreadyInProgress => "GAME_ALREADY_IN_PROGRESS",
            Self::OnlyHostCanStart => "GAME_ONLY_HOST_CAN_START",
            Self::NotEnoughPlayers => "GAME_NOT_ENOUGH_PLAYERS",
            Self::CardNotHidden => "GAME_CARD_NOT_HIDDEN",
            Self::TooManyCardsRevealed => "GAME_TOO_MANY_REVEALED",
            Self::InsufficientRevealedCards => "GAME_INSUFFICIENT_REVEALED",
            Self::InvalidTargetPlayer => "GAME_INVALID_TARGET_PLAYER",
        }
    }
}

/// Envelope serialization errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Message could not be encoded.
    #[error("failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Payload is not a valid envelope.
    #[error("failed to decode envelope: {source}; raw: {raw}")]
    Deserialize {
        /// Offending payload, lossily decoded as UTF-8.
        raw: String,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },

    /// Envelope has no discriminator field.
    #[error("envelope has no discriminator; raw: {raw}")]
    MissingTag {
        /// Offending payload.
        raw: String,
    },

    /// Discriminator does not name a known message kind.
    #[error("unknown discriminator {tag:?}; raw: {raw}")]
    UnknownTag {
        /// The discriminator value received.
        tag: String,
        /// Offending payload.
        raw: String,
    },
}

impl CodecError {
    /// The raw payload text that failed to decode, for diagnostics.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Serialize(_) => None,
            Self::Deserialize { raw, .. }
            | Self::MissingTag { raw }
            | Self::UnknownTag { raw, .. } => Some(raw),
        }
    }
}

/// Link-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link refused a single packet write.
    #[error("link write failed: {0}")]
    WriteFailed(String),

    /// The link is closed.
    #[error("link closed")]
    Closed,

    /// A fragment could not be delivered within the retry budget.
    /// The whole message is abandoned.
    #[error(
        "failed to send fragment {index}/{total} of message {message_id} after {attempts} attempts"
    )]
    FragmentSendFailed {
        /// Wire message id.
        message_id: u8,
        /// Index of the fragment that failed.
        index: usize,
        /// Number of fragments in the message.
        total: usize,
        /// Attempts made.
        attempts: u32,
    },

    /// I/O error from the underlying link.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// MTU leaves no room for payload.
    #[error("mtu {mtu} leaves no payload after {overhead} bytes of overhead")]
    MtuTooSmall {
        /// Configured MTU.
        mtu: usize,
        /// Total per-packet overhead.
        overhead: usize,
    },

    /// Retry budget must allow at least one attempt.
    #[error("max_retries must be at least 1")]
    ZeroRetries,

    /// A capacity was zero.
    #[error("{0} must be non-zero")]
    ZeroCapacity(&'static str),
}

/// Top-level memolink errors.
#[derive(Debug, Error)]
pub enum MemoError {
    /// Domain rule violation.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Envelope codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Link error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Messenger error.
    #[cfg(feature = "transport")]
    #[error("messenger error: {0}")]
    Messenger(#[from] crate::transport::MessengerError),

    /// Sync engine error.
    #[cfg(feature = "sync")]
    #[error("sync error: {0}")]
    Sync(#[from] crate::sync::SyncError),

    /// Session orchestration error.
    #[cfg(feature = "sync")]
    #[error("session error: {0}")]
    Session(#[from] crate::sync::SessionError),
}
