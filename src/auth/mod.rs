//! Webhook-gated authorization.
//!
//! Access decisions are delegated to an external HTTP decision service.
//! Each call is fingerprinted by its exact serialized request; decisions
//! are cached with independent TTLs for allow and deny so that denial
//! storms do not hammer the webhook. Transient upstream failures are
//! retried with exponential backoff.

mod cache;
mod error;
mod types;
mod webhook;

pub use cache::AuthWebhookCache;
pub use cache::CachedDecision;
pub use error::AuthError;
pub use types::AccessAttribute;
pub use types::AccessInfo;
pub use types::AuthWebhookRequest;
pub use types::AuthWebhookResponse;
pub use types::METHOD_PUSH_PULL;
pub use types::Verb;
pub use types::access_attributes;
pub use webhook::verify_access;
