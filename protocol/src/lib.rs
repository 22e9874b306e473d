//! # Session Wire Protocol
//!
//! Binary codecs for the multiplayer session transport. Every datagram carries
//! exactly one [`Message`]: a magic-tagged envelope holding a [`MessageType`]
//! and an optional opaque payload. Payloads that describe a player use the
//! [`PlayerState`] codec, which embeds a [`Point3`].
//!
//! ## Wire Format
//!
//! All integers and floats are little-endian and 32 bits wide unless noted.
//!
//! | Structure     | Layout                                                                   |
//! |---------------|--------------------------------------------------------------------------|
//! | `Message`     | `magic:u32` `type:i32` `len:i32` `payload`                               |
//! | `PlayerState` | `magic:u32` `state:i32` `facing` `look` `defending:u8` `timer` `len:i32` `point` |
//! | `Point3`      | `magic:u32` `x` `y` `z` (16 bytes)                                       |
//!
//! A length of `-1` marks an absent payload. Lengths are only ever read
//! through [`codec::Reader::read_prefixed`], which refuses anything larger
//! than [`MAX_PAYLOAD_SIZE`] before touching the buffer.
//!
//! ## Robustness
//!
//! Decoders operate on untrusted bytes straight off the socket. They never
//! panic and never read out of bounds; every failure is a [`CodecError`].
//!
//! ```rust
//! use protocol::{Message, MessageType, PlayerState, Point3, State};
//!
//! let state = PlayerState::idle_at(Point3::new(1.0, 0.0, -3.5));
//! let message = Message::new(MessageType::PlayerJoin, state.encode());
//! let bytes = message.encode().unwrap();
//!
//! let decoded = Message::decode(&bytes).unwrap();
//! assert_eq!(decoded.kind, MessageType::PlayerJoin);
//! assert_eq!(PlayerState::decode(decoded.payload()).unwrap().current, State::Idle);
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod player_state;
pub mod point;

pub use error::{CodecError, Result};
pub use message::{Message, MessageType, MESSAGE_MAGIC, MESSAGE_MAX_LEN};
pub use player_state::{PlayerState, State, PLAYER_STATE_MAGIC};
pub use point::{Point3, POINT3_MAGIC};

/// Largest length-prefixed block accepted on decode or produced on encode
pub const MAX_PAYLOAD_SIZE: usize = 1500;
