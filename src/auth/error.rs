//! Authorization error types.

use snafu::Snafu;

/// Errors from the authorization gate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    /// The decision service denied the call.
    #[snafu(display("{reason}: method is not allowed for this user"))]
    NotAllowed {
        /// The decision service's grounds.
        reason: String,
    },

    /// The webhook answered with a status that is neither a decision nor
    /// retriable.
    #[snafu(display("unexpected status code from webhook: {status}"))]
    UnexpectedStatusCode {
        /// The HTTP status received.
        status: u16,
    },

    /// Retries were exhausted without reaching a decision.
    #[snafu(display("webhook timeout, last status: {}", last_status.map_or_else(|| "no response".to_string(), |s| s.to_string())))]
    WebhookTimeout {
        /// The status of the final attempt that received a response,
        /// absent when every attempt failed before one arrived.
        last_status: Option<u16>,
    },

    /// The ambient context was canceled while waiting to retry.
    #[snafu(display("verify access canceled"))]
    Canceled,

    /// The webhook request could not be sent or its body decoded.
    #[snafu(display("webhook transport error: {source}"))]
    Transport {
        /// The underlying client error.
        source: reqwest::Error,
    },

    /// The request fingerprint could not be built.
    #[snafu(display("failed to encode webhook request: {source}"))]
    Encode {
        /// The underlying encode error.
        source: serde_json::Error,
    },
}
