use reqwest::StatusCode;

/// Transient failure kinds on the gateway boundary.
///
/// None of these are fatal to the moderation loop; each maps to a specific
/// recovery step in the watcher (fixed delay, session refresh, or both).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The client-side timeout elapsed. The server's own long-poll wait is
    /// shorter, so this means the connection went quiet, not "no messages".
    #[error("gateway request timed out")]
    NetworkTimeout,

    #[error("connection to gateway lost: {0}")]
    ConnectionLost(String),

    /// 401-equivalent response. The session must be refreshed before the
    /// next poll.
    #[error("gateway session expired or unauthorized")]
    AuthExpired,

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("gateway request failed ({status}): {body}")]
    RequestFailed { status: u16, body: String },

    #[error("no gateway session; log in first")]
    NotLoggedIn,

    #[error("gateway login did not complete: {0}")]
    LoginFailed(String),
}

impl GatewayError {
    pub(crate) fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            Self::AuthExpired
        } else {
            Self::RequestFailed {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::NetworkTimeout
        } else if err.is_connect() {
            Self::ConnectionLost(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, err.to_string())
        } else {
            Self::ConnectionLost(err.to_string())
        }
    }
}
