//! Document-level building blocks.
//!
//! Everything the synchronization engine needs to talk about a document
//! without interpreting its contents: actor identities, Lamport-based
//! change identifiers, time tickets for operation ordering and garbage
//! collection, checkpoints, and the change pack exchanged on every sync.
//!
//! Change operations are opaque byte payloads here. The concrete CRDT
//! merge algebra lives behind the [`Materializer`] seam, which the
//! snapshot worker and the pull-side snapshot assembler call into.

mod actor;
mod change;
mod checkpoint;
mod key;
mod materializer;
mod pack;
mod ticket;

pub use actor::ActorId;
pub use change::Change;
pub use change::ChangeId;
pub use checkpoint::Checkpoint;
pub use key::DocumentKey;
pub use key::InvalidDocumentKey;
pub use materializer::Materializer;
pub use materializer::MaterializerError;
pub use materializer::OpaqueMaterializer;
pub use pack::ChangePack;
pub use ticket::MAX_DELIMITER;
pub use ticket::TimeTicket;
