//! Error type for calls to the optimization, account and auth services.

use thiserror::Error;

/// Failures of a request/response exchange with a remote service.
///
/// - [`Api`](RemoteError::Api): any non-2xx answer with a readable body
/// - [`GatewayTimeout`](RemoteError::GatewayTimeout): HTTP 504 whose body is not JSON
/// - [`Malformed`](RemoteError::Malformed): a 2xx answer that does not parse
/// - [`Auth`](RemoteError::Auth): no usable bearer token could be obtained
/// - [`Network`](RemoteError::Network): transport failure
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("gateway timeout: {body}")]
    GatewayTimeout { body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
