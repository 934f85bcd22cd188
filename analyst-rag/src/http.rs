//! Error classification shared by the HTTP providers.

use tracing::error;

use crate::error::RagError;

/// Map a transport-level `reqwest` failure onto a [`RagError`].
///
/// Request construction failures are permanent; connection, timeout and
/// body failures are transient.
pub(crate) fn request_error(provider: &str, err: &reqwest::Error) -> RagError {
    error!(provider, error = %err, "request failed");
    if let Some(status) = err.status() {
        return RagError::from_http_status(provider, status.as_u16(), err.to_string());
    }
    if err.is_builder() {
        return RagError::FatalProvider {
            provider: provider.to_string(),
            message: format!("invalid request: {err}"),
        };
    }
    RagError::TransientNetwork {
        provider: provider.to_string(),
        message: format!("request failed: {err}"),
    }
}

/// Turn a non-success response into a classified [`RagError`].
///
/// Pulls the human-readable message out of the usual JSON error envelopes
/// and falls back to the raw body.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> RagError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body).unwrap_or(body);
    error!(provider, %status, "API error");
    RagError::from_http_status(provider, status.as_u16(), detail)
}

/// A response body that did not match the expected shape.
pub(crate) fn decode_error(provider: &str, err: impl std::fmt::Display) -> RagError {
    error!(provider, error = %err, "failed to parse response");
    RagError::FatalProvider {
        provider: provider.to_string(),
        message: format!("failed to parse response: {err}"),
    }
}

fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/detail/error"),
        value.get("detail"),
        value.get("error"),
    ];
    candidates.into_iter().flatten().find_map(|v| v.as_str().map(str::to_string))
}
