//! The session envelope: a type tag and an opaque payload

use crate::codec::{self, Reader};
use crate::error::{CodecError, Result};

/// Magic tag leading every datagram
pub const MESSAGE_MAGIC: u32 = 0x17_3495;

/// Magic, type tag and payload length
pub const MESSAGE_MIN_LEN: usize = 4 * 3;

/// Longest datagram the encoder can produce
pub const MESSAGE_MAX_LEN: usize = MESSAGE_MIN_LEN + crate::MAX_PAYLOAD_SIZE;

/// Session events a peer can announce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageType {
    /// A player entered a new dungeon; everyone follows.
    TeleportDungeon = 0,
    /// A player is performing a ritual or sermon.
    RitualPerform = 1,
    /// A player joined; the payload is their `PlayerState`.
    PlayerJoin = 2,
    /// A player left the session.
    PlayerLeft = 3,
    /// A chat line to broadcast to the other players.
    ChatNotify = 4,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::TeleportDungeon,
        MessageType::RitualPerform,
        MessageType::PlayerJoin,
        MessageType::PlayerLeft,
        MessageType::ChatNotify,
    ];

    pub fn tag(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for MessageType {
    type Error = CodecError;

    fn try_from(tag: i32) -> Result<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|index| MessageType::ALL.get(index).copied())
            .ok_or(CodecError::InvalidType(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    /// `None` when there is no payload. An empty payload is never stored.
    pub data: Option<Vec<u8>>,
}

impl Message {
    pub fn new(kind: MessageType, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            kind,
            data: (!data.is_empty()).then_some(data),
        }
    }

    pub fn empty(kind: MessageType) -> Self {
        Self { kind, data: None }
    }

    /// Builds a message from an untyped tag, rejecting tags outside
    /// [`MessageType`].
    pub fn from_raw(tag: i32, data: impl Into<Vec<u8>>) -> Result<Self> {
        Ok(Self::new(MessageType::try_from(tag)?, data))
    }

    pub fn payload(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = self.payload();
        let mut out = Vec::with_capacity(MESSAGE_MIN_LEN + payload.len());
        codec::write_u32(&mut out, MESSAGE_MAGIC);
        codec::write_i32(&mut out, self.kind.tag());
        codec::write_prefixed(&mut out, payload)?;
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MESSAGE_MIN_LEN {
            return Err(CodecError::TooShort {
                needed: MESSAGE_MIN_LEN,
                actual: data.len(),
            });
        }
        let mut reader = Reader::new(data);
        reader.expect_magic(MESSAGE_MAGIC)?;
        let kind = MessageType::try_from(reader.read_i32()?)?;
        let data = reader.read_prefixed()?.map(<[u8]>::to_vec);
        Ok(Self { kind, data })
    }
}
