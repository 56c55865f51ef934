//! Actor identity.

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

/// Number of raw bytes in an [`ActorId`].
pub const ACTOR_ID_LEN: usize = 12;

/// A stable opaque identifier of a client session.
///
/// Actor ids participate in [`TimeTicket`](crate::document::TimeTicket)
/// tie-breaks, so they are ordered byte-wise. The reserved
/// [`ActorId::INITIAL`] (all zeroes) denotes "no actor" and sorts before
/// every real actor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId([u8; ACTOR_ID_LEN]);

impl ActorId {
    /// The reserved id meaning "no actor".
    pub const INITIAL: ActorId = ActorId([0; ACTOR_ID_LEN]);

    /// Create an actor id from raw bytes.
    pub const fn from_bytes(bytes: [u8; ACTOR_ID_LEN]) -> Self {
        ActorId(bytes)
    }

    /// Generate a fresh random actor id.
    pub fn random() -> Self {
        ActorId(rand::random())
    }

    /// Parse an actor id from its 24-character hex rendering.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != ACTOR_ID_LEN * 2 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; ACTOR_ID_LEN];
        for (i, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
            let high = (chunk[0] as char).to_digit(16)?;
            let low = (chunk[1] as char).to_digit(16)?;
            bytes[i] = (high * 16 + low) as u8;
        }
        Some(ActorId(bytes))
    }

    /// The raw bytes of this id.
    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_LEN] {
        &self.0
    }

    /// Hex rendering, the canonical external form.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(ACTOR_ID_LEN * 2);
        for byte in self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.to_hex())
    }
}

impl Serialize for ActorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        ActorId::from_hex(&hex).ok_or_else(|| de::Error::custom("invalid actor id hex"))
    }
}
