//! Webhook verification with exponential backoff.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::auth::AccessInfo;
use crate::auth::AuthError;
use crate::auth::AuthWebhookRequest;
use crate::auth::AuthWebhookResponse;
use crate::auth::CachedDecision;
use crate::auth::error;
use crate::backend::AuthWebhookConfig;
use crate::backend::Backend;

/// Base unit of the exponential backoff schedule.
const BASE_WAIT: Duration = Duration::from_millis(100);

/// Verify the given access against the configured decision service.
///
/// Skips verification entirely when the method does not require auth.
/// Otherwise consults the decision cache by the exact serialized request
/// and falls through to the webhook with the retry policy of
/// [`AuthWebhookConfig`]. Denials are cached under the unauth TTL,
/// allows under the auth TTL; transport faults are never cached.
///
/// `cancel` aborts backoff waits, surfacing [`AuthError::Canceled`].
pub async fn verify_access(
    be: &Backend,
    auth_token: &str,
    info: &AccessInfo,
    cancel: &CancellationToken,
) -> Result<(), AuthError> {
    let config = &be.config().auth_webhook;
    if !config.require_auth(&info.method) {
        return Ok(());
    }
    // require_auth is false whenever the URL is unset.
    let Some(url) = config.url.as_deref() else {
        return Ok(());
    };

    let request = AuthWebhookRequest {
        token: auth_token.to_string(),
        method: info.method.clone(),
        attributes: info.attributes.clone(),
    };
    let fingerprint = serde_json::to_string(&request).context(error::EncodeSnafu)?;

    if let Some(decision) = be.auth_cache().get(&fingerprint) {
        debug!(method = %info.method, "webhook decision served from cache");
        return match decision {
            CachedDecision::Allowed => Ok(()),
            CachedDecision::Denied { reason } => error::NotAllowedSnafu { reason }.fail(),
        };
    }

    let response = with_exponential_backoff(config, cancel, || {
        call_webhook(be.webhook_client(), url, &fingerprint)
    })
    .await?;

    if !response.allowed {
        warn!(method = %info.method, reason = %response.reason, "webhook denied access");
        be.auth_cache().put(
            fingerprint,
            CachedDecision::Denied {
                reason: response.reason.clone(),
            },
            config.cache_unauth_ttl,
        );
        return error::NotAllowedSnafu {
            reason: response.reason,
        }
        .fail();
    }

    be.auth_cache()
        .put(fingerprint, CachedDecision::Allowed, config.cache_auth_ttl);
    Ok(())
}

async fn call_webhook(
    client: &reqwest::Client,
    url: &str,
    body: &str,
) -> Result<AuthWebhookResponse, AuthError> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .send()
        .await
        .context(error::TransportSnafu)?;

    let status = response.status();
    if status != StatusCode::OK {
        return error::UnexpectedStatusCodeSnafu {
            status: status.as_u16(),
        }
        .fail();
    }

    response
        .json::<AuthWebhookResponse>()
        .await
        .context(error::TransportSnafu)
}

async fn with_exponential_backoff<F, Fut>(
    config: &AuthWebhookConfig,
    cancel: &CancellationToken,
    mut webhook_fn: F,
) -> Result<AuthWebhookResponse, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<AuthWebhookResponse, AuthError>>,
{
    let mut last_status = None;
    for retries in 0..=config.max_retries {
        let err = match webhook_fn().await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        if !should_retry(&err) {
            return Err(err);
        }
        if let AuthError::UnexpectedStatusCode { status } = err {
            last_status = Some(status);
        }
        if retries == config.max_retries {
            break;
        }

        let wait = wait_interval(retries, config.max_wait_interval);
        debug!(retries, wait_ms = wait.as_millis() as u64, "webhook retriable failure, backing off");
        tokio::select! {
            _ = cancel.cancelled() => return error::CanceledSnafu.fail(),
            _ = tokio::time::sleep(wait) => {}
        }
    }

    error::WebhookTimeoutSnafu { last_status }.fail()
}

/// The backoff before retry `retries`: `2^retries * 100ms`, capped.
fn wait_interval(retries: u64, max_wait_interval: Duration) -> Duration {
    let factor = 1u64.checked_shl(retries.min(u32::MAX as u64) as u32);
    let interval = factor
        .and_then(|f| f.checked_mul(BASE_WAIT.as_millis() as u64))
        .map(Duration::from_millis)
        .unwrap_or(max_wait_interval);
    interval.min(max_wait_interval)
}

/// Whether a failed attempt is worth retrying.
///
/// Mirrors the common upstream policy: connection resets and the
/// transient status family 500/503/504/429. Other statuses terminate
/// immediately; 502 and 408 are deliberately not included.
fn should_retry(err: &AuthError) -> bool {
    match err {
        AuthError::UnexpectedStatusCode { status } => {
            matches!(status, 500 | 503 | 504 | 429)
        }
        AuthError::Transport { source } => is_connection_reset(source),
        _ => false,
    }
}

fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return io_err.kind() == io::ErrorKind::ConnectionReset;
        }
        source = cause.source();
    }
    false
}
