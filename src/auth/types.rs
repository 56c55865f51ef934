//! Access-control wire types.

use serde::Deserialize;
use serde::Serialize;

use crate::document::ChangePack;

/// Method name of the PushPull operation as seen by the decision service.
pub const METHOD_PUSH_PULL: &str = "PushPull";

/// How an attribute's resource is accessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verb {
    /// Read-only access.
    #[serde(rename = "r")]
    Read,
    /// Read and write access.
    #[serde(rename = "rw")]
    ReadWrite,
}

/// One resource touched by a call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessAttribute {
    /// Resource key, the combined document key for PushPull.
    pub key: String,
    /// Access mode.
    pub verb: Verb,
}

/// What a call wants to do, fed to [`verify_access`](crate::auth::verify_access).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessInfo {
    /// The RPC method name.
    pub method: String,
    /// The resources the call touches.
    pub attributes: Vec<AccessAttribute>,
}

/// Attributes of a PushPull call: one entry for the synchronized
/// document, writable only when the pack pushes changes.
///
/// Declared as a list because bulk operations may touch several
/// documents in one call.
pub fn access_attributes(pack: &ChangePack) -> Vec<AccessAttribute> {
    let verb = if pack.has_changes() {
        Verb::ReadWrite
    } else {
        Verb::Read
    };
    vec![AccessAttribute {
        key: pack.document_key.combined(),
        verb,
    }]
}

/// Request body sent to the decision service.
///
/// Field order is fixed; the serialized form doubles as the cache
/// fingerprint, so serialization must stay deterministic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthWebhookRequest {
    /// Token bound to the call by the transport layer.
    pub token: String,
    /// The RPC method name.
    pub method: String,
    /// The resources the call touches.
    pub attributes: Vec<AccessAttribute>,
}

/// Decision returned by the service with HTTP 200.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthWebhookResponse {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Human-readable grounds for the decision.
    #[serde(default)]
    pub reason: String,
}
