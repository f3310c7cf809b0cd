//! Fragment framing.
//!
//! Wire format of one packet:
//! ```text
//! +0  Message Id      (1 byte, wraps at 256)
//! +1  Fragment Index  (1 byte)
//! +2  Last Index      (1 byte, 0 = not split)
//! +3  Payload chunk   (variable)
//! ```
//!
//! `total_fragments` carries the zero-based index of the last fragment, not
//! the count. A message that fits in one packet is sent with
//! `total_fragments = 0`.

use thiserror::Error;

use crate::core::SyncConfig;
use crate::core::constants::FRAGMENT_HEADER_SIZE;

/// Most fragments one message may be split into.
pub const MAX_FRAGMENTS: usize = 256;

/// Fragmentation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Payload needs more fragments than the one-byte index can address.
    #[error("payload of {size} bytes exceeds the {max} byte fragmentation limit")]
    TooLarge {
        /// Payload size.
        size: usize,
        /// Largest payload that can be fragmented.
        max: usize,
    },
}

/// One slice of an envelope payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Message this fragment belongs to.
    pub message_id: u8,
    /// Position within the message.
    pub index: u8,
    /// Index of the last fragment, or 0 if the message is not split.
    pub total_fragments: u8,
    /// Payload chunk.
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Whether this fragment carries a whole message.
    pub fn is_whole(&self) -> bool {
        self.total_fragments == 0
    }

    /// Size on the wire.
    pub fn wire_size(&self) -> usize {
        FRAGMENT_HEADER_SIZE + self.payload.len()
    }

    /// Encode as header plus payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.push(self.message_id);
        buf.push(self.index);
        buf.push(self.total_fragments);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode one packet. `None` if it cannot hold a header.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < FRAGMENT_HEADER_SIZE {
            return None;
        }
        Some(Self {
            message_id: data[0],
            index: data[1],
            total_fragments: data[2],
            payload: data[FRAGMENT_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Splits payloads into packets that fit the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    usable_payload: usize,
}

impl FrameCodec {
    /// Codec with an explicit per-fragment payload budget.
    ///
    /// A zero budget is raised to one byte.
    pub fn new(usable_payload: usize) -> Self {
        Self {
            usable_payload: usable_payload.max(1),
        }
    }

    /// Codec sized from the negotiated MTU.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.usable_payload())
    }

    /// Payload bytes per fragment.
    pub fn usable_payload(&self) -> usize {
        self.usable_payload
    }

    /// Largest payload that fits in [`MAX_FRAGMENTS`] fragments.
    pub fn max_message_size(&self) -> usize {
        self.usable_payload * MAX_FRAGMENTS
    }

    /// Split `data` into fragments tagged with `message_id`.
    ///
    /// Fails if `data` is longer than
    /// [`max_message_size`](Self::max_message_size).
    pub fn fragment(&self, data: &[u8], message_id: u8) -> Result<Vec<Fragment>, FrameError> {
        let max = self.max_message_size();
        if data.len() > max {
            return Err(FrameError::TooLarge {
                size: data.len(),
                max,
            });
        }

        if data.len() <= self.usable_payload {
            return Ok(vec![Fragment {
                message_id,
                index: 0,
                total_fragments: 0,
                payload: data.to_vec(),
            }]);
        }

        let chunks = data.chunks(self.usable_payload);
        let last = u8::try_from(chunks.len() - 1)
            .map_err(|_| FrameError::TooLarge { size: data.len(), max })?;
        Ok((0..=last)
            .zip(chunks)
            .map(|(index, chunk)| Fragment {
                message_id,
                index,
                total_fragments: last,
                payload: chunk.to_vec(),
            })
            .collect())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_payload_is_whole() {
        let codec = FrameCodec::default();
        let fragments = codec.fragment(b"hello", 9).unwrap();

        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].is_whole());
        assert_eq!(fragments[0].message_id, 9);
        assert_eq!(fragments[0].payload, b"hello");
    }

    #[test]
    fn test_exact_fit_is_not_split() {
        let codec = FrameCodec::new(4);
        let fragments = codec.fragment(&[1, 2, 3, 4], 0).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].total_fragments, 0);
    }

    #[test]
    fn test_split_1200_bytes() {
        let codec = FrameCodec::default();
        assert_eq!(codec.usable_payload(), 506);

        let data = vec![0xAB; 1200];
        let fragments = codec.fragment(&data, 1).unwrap();

        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.total_fragments == 2));
        assert_eq!(
            fragments.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(fragments[0].payload.len(), 506);
        assert_eq!(fragments[1].payload.len(), 506);
        assert_eq!(fragments[2].payload.len(), 188);
    }

    #[test]
    fn test_index_space_limit() {
        let codec = FrameCodec::new(2);
        assert_eq!(codec.max_message_size(), 512);

        let fragments = codec.fragment(&[7; 512], 0).unwrap();
        assert_eq!(fragments.len(), MAX_FRAGMENTS);
        assert_eq!(fragments[255].index, 255);
        assert_eq!(fragments[255].total_fragments, 255);

        assert_eq!(
            codec.fragment(&[7; 513], 0),
            Err(FrameError::TooLarge { size: 513, max: 512 })
        );
    }

    #[test]
    fn test_encode_layout() {
        let fragment = Fragment {
            message_id: 0xFF,
            index: 1,
            total_fragments: 2,
            payload: vec![0xDE, 0xAD],
        };
        assert_eq!(hex::encode(fragment.encode()), "ff0102dead");
    }

    #[test]
    fn test_decode() {
        let fragment = Fragment::decode(&hex::decode("070001beef").unwrap()).unwrap();
        assert_eq!(fragment.message_id, 7);
        assert_eq!(fragment.index, 0);
        assert_eq!(fragment.total_fragments, 1);
        assert_eq!(fragment.payload, vec![0xBE, 0xEF]);

        let header_only = Fragment::decode(&[1, 0, 0]).unwrap();
        assert!(header_only.payload.is_empty());
    }

    #[test]
    fn test_decode_too_short() {
        assert!(Fragment::decode(&[]).is_none());
        assert!(Fragment::decode(&[1, 2]).is_none());
    }

    #[test]
    fn test_zero_budget_is_clamped() {
        let codec = FrameCodec::new(0);
        assert_eq!(codec.usable_payload(), 1);
        assert_eq!(codec.fragment(&[1, 2, 3], 0).unwrap().len(), 3);
    }
}
