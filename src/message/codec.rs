//! Envelope codec: [`Message`] to JSON bytes and back.
//!
//! Every family serializes as one flat JSON object whose `t` field names the
//! variant. Decoding reads `t` first and dispatches to the owning family, so
//! an unknown or missing tag is reported as such instead of as a generic
//! parse failure.

use serde_json::Value;

use crate::core::CodecError;

use super::types::{ControlMessage, FeedbackEvent, GameEvent, Message};

/// Name of the discriminator field.
pub const TAG_FIELD: &str = "t";

/// Control tags.
pub const CONTROL_TAGS: &[&str] = &["SYS_JOIN", "SYS_CONFIG", "SYS_LEAVE", "SYS_REPLAY"];

/// Game event tags.
pub const GAME_TAGS: &[&str] = &["GC", "CR", "PR", "TC", "GF"];

/// Feedback tags.
pub const FEEDBACK_TAGS: &[&str] = &["ACK", "REJ"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Control,
    Game,
    Feedback,
}

impl Family {
    fn from_tag(tag: &str) -> Option<Self> {
        if CONTROL_TAGS.contains(&tag) {
            Some(Self::Control)
        } else if GAME_TAGS.contains(&tag) {
            Some(Self::Game)
        } else if FEEDBACK_TAGS.contains(&tag) {
            Some(Self::Feedback)
        } else {
            None
        }
    }
}

/// Stateless envelope encoder/decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Serialize a message to its wire bytes.
    pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
        let encoded = match message {
            Message::Control(msg) => serde_json::to_vec(msg),
            Message::Game(event) => serde_json::to_vec(event),
            Message::Feedback(feedback) => serde_json::to_vec(feedback),
        };
        encoded.map_err(CodecError::Serialize)
    }

    /// Parse wire bytes back into a message.
    ///
    /// Unknown fields are ignored. Errors carry the offending text.
    pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
        let raw = || String::from_utf8_lossy(bytes).into_owned();

        let value: Value = serde_json::from_slice(bytes)
            .map_err(|source| CodecError::Deserialize { raw: raw(), source })?;

        let family = {
            let tag = value
                .get(TAG_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| CodecError::MissingTag { raw: raw() })?;
            Family::from_tag(tag).ok_or_else(|| CodecError::UnknownTag {
                tag: tag.to_string(),
                raw: raw(),
            })?
        };

        let decoded = match family {
            Family::Control => {
                serde_json::from_value::<ControlMessage>(value).map(Message::Control)
            }
            Family::Game => serde_json::from_value::<GameEvent>(value).map(Message::Game),
            Family::Feedback => {
                serde_json::from_value::<FeedbackEvent>(value).map(Message::Feedback)
            }
        };
        decoded.map_err(|source| CodecError::Deserialize { raw: raw(), source })
    }
}
