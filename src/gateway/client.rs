use super::GatewayError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Server-side long-poll wait requested from the gateway, in seconds.
const WATCH_SERVER_WAIT_SECS: u64 = 20;
/// Client-side cap on a watch request. Slightly larger than the server wait
/// so a polite server timeout is distinguishable from a dead connection.
const WATCH_CLIENT_TIMEOUT: Duration = Duration::from_secs(25);

const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(3);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// One chat message as the gateway reports it. Immutable once received.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub event_id: String,
    pub sender: String,
    pub body: String,
    /// Origin timestamp in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: u64,
}

/// Response of the watch endpoint. `messages` is newest-first.
#[derive(Debug, Default, Deserialize)]
pub struct WatchResponse {
    #[serde(default)]
    pub has_new_messages: bool,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub next_batch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomInfo {
    pub room_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Handle returned when an SSO login is started. The operator completes the
/// flow in a browser at `sso_url`.
#[derive(Debug, Deserialize)]
pub struct SsoLogin {
    pub session_id: String,
    pub sso_url: String,
}

#[derive(Debug, Deserialize)]
struct LoginStatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct GatewayStatusResponse {
    status: String,
}

/// Typed client for the gateway HTTP surface.
///
/// Owns the session id; all room operations embed it in the request path.
/// The session may expire asynchronously; callers observe that as
/// [`GatewayError::AuthExpired`] and call [`GatewayClient::refresh_session`].
pub struct GatewayClient {
    base_url: String,
    http: Client,
    session_id: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            session_id: None,
        }
    }

    /// Attach an existing session id instead of running the login bootstrap.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn session(&self) -> Result<&str, GatewayError> {
        self.session_id.as_deref().ok_or(GatewayError::NotLoggedIn)
    }

    fn room_endpoint(&self, session: &str, room_id: &str, tail: &str) -> String {
        format!("{}/rooms/{session}/{room_id}/{tail}", self.base_url)
    }

    async fn into_checked(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::from_status(status, body))
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Probe the gateway itself, independent of any session.
    pub async fn gateway_status(&self) -> Result<String, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        let resp = Self::into_checked(resp).await?;
        let parsed: GatewayStatusResponse = resp.json().await?;
        Ok(parsed.status)
    }

    /// Whether the current session is still accepted by the gateway.
    /// Any status other than `logged_in` counts as expired.
    pub async fn session_is_live(&self) -> Result<bool, GatewayError> {
        let Some(session) = self.session_id.as_deref() else {
            return Ok(false);
        };
        let resp = self
            .http
            .get(format!("{}/login/status/{session}", self.base_url))
            .send()
            .await?;
        let resp = Self::into_checked(resp).await?;
        let parsed: LoginStatusResponse = resp.json().await?;
        Ok(parsed.status == "logged_in")
    }

    pub async fn start_sso_login(&self) -> Result<SsoLogin, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/login/sso/start", self.base_url))
            .send()
            .await?;
        let resp = Self::into_checked(resp).await?;
        Ok(resp.json().await?)
    }

    async fn poll_login_status(&self, session: &str) -> Result<LoginStatusResponse, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/login/status/{session}", self.base_url))
            .send()
            .await?;
        let resp = Self::into_checked(resp).await?;
        Ok(resp.json().await?)
    }

    /// Make sure a live session exists, running the SSO bootstrap if needed.
    ///
    /// The SSO URL is surfaced to the operator, then the login status is
    /// polled until the browser flow completes or the bootstrap times out.
    pub async fn ensure_session(&mut self) -> Result<(), GatewayError> {
        if self.session_id.is_some() {
            match self.session_is_live().await {
                Ok(true) => {
                    tracing::debug!("reusing existing gateway session");
                    return Ok(());
                }
                Ok(false) => {
                    tracing::info!("existing gateway session is no longer valid; logging in again");
                    self.session_id = None;
                }
                Err(err) => {
                    tracing::warn!("session status check failed ({err}); logging in again");
                    self.session_id = None;
                }
            }
        }

        let login = self.start_sso_login().await?;
        println!("Complete the SSO login in your browser:\n\n    {}\n", login.sso_url);
        tracing::info!("waiting for SSO login to complete...");

        let deadline = tokio::time::Instant::now() + LOGIN_TIMEOUT;
        loop {
            tokio::time::sleep(LOGIN_POLL_INTERVAL).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(GatewayError::LoginFailed(
                    "timed out waiting for the browser login".into(),
                ));
            }
            let status = self.poll_login_status(&login.session_id).await?;
            match status.status.as_str() {
                "logged_in" => {
                    tracing::info!("gateway login successful");
                    self.session_id = Some(login.session_id);
                    return Ok(());
                }
                "error" => {
                    return Err(GatewayError::LoginFailed(
                        status.error.unwrap_or_else(|| "unknown login error".into()),
                    ));
                }
                _ => tracing::debug!("login still pending..."),
            }
        }
    }

    /// Drop the current session and run the login bootstrap again.
    pub async fn refresh_session(&mut self) -> Result<(), GatewayError> {
        self.session_id = None;
        self.ensure_session().await
    }

    // ── Room operations ──────────────────────────────────────────────

    /// Nudge the gateway to sync with the homeserver. Failures are the
    /// caller's to tolerate; the gateway keeps serving a basic room list
    /// even when its own sync times out.
    pub async fn sync(&self) -> Result<(), GatewayError> {
        let session = self.session()?;
        let resp = self
            .http
            .get(format!("{}/sync/{session}", self.base_url))
            .send()
            .await?;
        Self::into_checked(resp).await?;
        Ok(())
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>, GatewayError> {
        let session = self.session()?;
        let resp = self
            .http
            .get(format!("{}/rooms/{session}", self.base_url))
            .send()
            .await?;
        let resp = Self::into_checked(resp).await?;
        Ok(resp.json().await?)
    }

    /// Recent messages from a room, newest first, gateway-limited.
    pub async fn recent_messages(&self, room_id: &str) -> Result<Vec<RawMessage>, GatewayError> {
        let session = self.session()?;
        let url = self.room_endpoint(session, room_id, "messages");
        let resp = self.http.get(url).send().await?;
        let resp = Self::into_checked(resp).await?;
        Ok(resp.json().await?)
    }

    /// Join a room. Safe to call when already a member.
    pub async fn join_room(&self, room_id: &str) -> Result<(), GatewayError> {
        let session = self.session()?;
        let url = self.room_endpoint(session, room_id, "join");
        let resp = self.http.post(url).send().await?;
        Self::into_checked(resp).await?;
        Ok(())
    }

    /// Send a message to a room. Returns the new event id. Not idempotent.
    pub async fn send_message(&self, room_id: &str, body: &str) -> Result<String, GatewayError> {
        let session = self.session()?;
        let url = self.room_endpoint(session, room_id, "send");
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        let resp = Self::into_checked(resp).await?;
        let parsed: SendResponse = resp.json().await?;
        Ok(parsed.event_id)
    }

    /// One long-poll against the room. `since` is the continuation token
    /// from the previous call; `None` watches from now.
    pub async fn watch(
        &self,
        room_id: &str,
        since: Option<&str>,
    ) -> Result<WatchResponse, GatewayError> {
        let session = self.session()?;
        let url = self.room_endpoint(session, room_id, "watch");
        let mut req = self
            .http
            .get(url)
            .query(&[("timeout", WATCH_SERVER_WAIT_SECS)])
            .timeout(WATCH_CLIENT_TIMEOUT);
        if let Some(token) = since {
            req = req.query(&[("since", token)]);
        }
        let resp = req.send().await?;
        let resp = Self::into_checked(resp).await?;
        Ok(resp.json().await?)
    }

    /// Redact a message. Retry-safe on the gateway side.
    pub async fn redact(
        &self,
        room_id: &str,
        event_id: &str,
        reason: Option<&str>,
    ) -> Result<(), GatewayError> {
        let session = self.session()?;
        let url = self.room_endpoint(session, room_id, &format!("redact/{event_id}"));
        let payload = match reason {
            Some(reason) => serde_json::json!({ "reason": reason }),
            None => serde_json::json!({}),
        };
        let resp = self.http.post(url).json(&payload).send().await?;
        Self::into_checked(resp).await?;
        Ok(())
    }

    /// Ban a user from a room. NOT idempotent: never retried blindly; the
    /// gateway treats a duplicate ban as already applied.
    pub async fn ban(
        &self,
        room_id: &str,
        user_id: &str,
        reason: Option<&str>,
    ) -> Result<(), GatewayError> {
        let session = self.session()?;
        let url = self.room_endpoint(session, room_id, &format!("ban/{user_id}"));
        let payload = match reason {
            Some(reason) => serde_json::json!({ "reason": reason }),
            None => serde_json::json!({}),
        };
        let resp = self.http.post(url).json(&payload).send().await?;
        Self::into_checked(resp).await?;
        Ok(())
    }
}
