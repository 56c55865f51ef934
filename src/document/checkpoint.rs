//! Per-client synchronization checkpoints.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// How far a client and the server have synchronized for one document.
///
/// `client_seq` is the highest client sequence the server has accepted
/// from the client; `server_seq` is the highest server sequence the
/// client has received. A stored checkpoint only ever moves forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    client_seq: u32,
    server_seq: u64,
}

impl Checkpoint {
    /// The checkpoint of a client that has never synchronized.
    pub const INITIAL: Checkpoint = Checkpoint {
        client_seq: 0,
        server_seq: 0,
    };

    /// Create a checkpoint.
    pub const fn new(client_seq: u32, server_seq: u64) -> Self {
        Checkpoint {
            client_seq,
            server_seq,
        }
    }

    /// The highest accepted client sequence.
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// The highest delivered server sequence.
    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// Field-wise maximum with `other`. The result dominates both inputs,
    /// which is what keeps stored checkpoints monotonic under retries.
    pub fn forward(&self, other: &Checkpoint) -> Checkpoint {
        Checkpoint {
            client_seq: self.client_seq.max(other.client_seq),
            server_seq: self.server_seq.max(other.server_seq),
        }
    }

    /// Advance the client sequence to at least `client_seq`.
    pub fn sync_client_seq(&self, client_seq: u32) -> Checkpoint {
        Checkpoint {
            client_seq: self.client_seq.max(client_seq),
            ..*self
        }
    }

    /// Replace the server sequence.
    pub fn with_server_seq(&self, server_seq: u64) -> Checkpoint {
        Checkpoint {
            server_seq,
            ..*self
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.client_seq, self.server_seq)
    }
}
