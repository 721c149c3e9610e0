//! Adaptive long-poll watcher for one room.
//!
//! One gateway long-poll per [`RoomWatcher::poll`] call. The continuation
//! token is threaded into the next call and replaced whenever the gateway
//! returns a newer one; it is never reused once superseded. The check
//! interval adapts to observed activity and gates how often a poll is
//! issued, not the server-side wait.

use crate::gateway::{GatewayClient, GatewayError, RawMessage};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(3);
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(15);
const INITIAL_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Empty polls beyond this streak length start stretching the interval.
const EMPTY_STREAK_THRESHOLD: u32 = 5;

const RETRY_DELAY: Duration = Duration::from_secs(5);
const REFRESH_FAILED_DELAY: Duration = Duration::from_secs(10);

/// Outcome of one long-poll.
#[derive(Debug)]
pub enum PollResult {
    /// The server waited its full window without news; the token advanced.
    NoNewMessages,
    /// Fresh messages, newest first.
    NewMessages(Vec<RawMessage>),
    /// Transient failure; the prior token is kept. Never fatal.
    Failed(GatewayError),
}

pub struct RoomWatcher {
    room_id: String,
    next_batch: Option<String>,
    check_interval: Duration,
    consecutive_empty: u32,
}

impl RoomWatcher {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            next_batch: None,
            check_interval: INITIAL_CHECK_INTERVAL,
            consecutive_empty: 0,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current gate between polls, always within `[3s, 15s]`.
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn next_batch(&self) -> Option<&str> {
        self.next_batch.as_deref()
    }

    /// Issue one long-poll and classify the outcome.
    pub async fn poll(&mut self, gateway: &GatewayClient) -> PollResult {
        match gateway.watch(&self.room_id, self.next_batch.as_deref()).await {
            Ok(resp) => {
                // Token advances on every successful poll, messages or not.
                if let Some(token) = resp.next_batch {
                    self.next_batch = Some(token);
                }
                if resp.has_new_messages && !resp.messages.is_empty() {
                    self.note_activity();
                    PollResult::NewMessages(resp.messages)
                } else {
                    self.note_empty();
                    PollResult::NoNewMessages
                }
            }
            Err(err) => PollResult::Failed(err),
        }
    }

    fn note_empty(&mut self) {
        self.consecutive_empty += 1;
        if self.consecutive_empty > EMPTY_STREAK_THRESHOLD {
            self.check_interval =
                (self.check_interval + Duration::from_secs(1)).min(MAX_CHECK_INTERVAL);
        }
    }

    fn note_activity(&mut self) {
        self.consecutive_empty = 0;
        self.check_interval = self
            .check_interval
            .saturating_sub(Duration::from_secs(1))
            .max(MIN_CHECK_INTERVAL);
    }

    /// Apply the recovery step for a transient failure: a fixed delay, a
    /// session refresh, or both. Delays end early on cancellation; the
    /// watcher itself never terminates on failure.
    pub async fn recover(
        &self,
        failure: &GatewayError,
        gateway: &mut GatewayClient,
        cancel: &CancellationToken,
    ) {
        match failure {
            GatewayError::NetworkTimeout => {
                tracing::warn!("watch poll timed out; retrying shortly");
                wait_cancellable(cancel, RETRY_DELAY).await;
            }
            GatewayError::MalformedResponse(detail) => {
                tracing::warn!("malformed watch response ({detail}); keeping prior token");
                wait_cancellable(cancel, RETRY_DELAY).await;
            }
            GatewayError::RequestFailed { status, body } => {
                tracing::warn!("watch request failed ({status}): {body}");
                wait_cancellable(cancel, RETRY_DELAY).await;
            }
            GatewayError::AuthExpired | GatewayError::NotLoggedIn => {
                tracing::warn!("gateway session expired; refreshing before next poll");
                if let Err(err) = gateway.refresh_session().await {
                    tracing::warn!("session refresh failed: {err}");
                    wait_cancellable(cancel, REFRESH_FAILED_DELAY).await;
                }
            }
            GatewayError::ConnectionLost(detail) => {
                tracing::warn!("connection to gateway lost ({detail}); refreshing session");
                match gateway.refresh_session().await {
                    Ok(()) => wait_cancellable(cancel, RETRY_DELAY).await,
                    Err(err) => {
                        tracing::warn!("session refresh failed: {err}");
                        wait_cancellable(cancel, REFRESH_FAILED_DELAY).await;
                    }
                }
            }
            GatewayError::LoginFailed(detail) => {
                tracing::warn!("gateway login failed ({detail}); retrying later");
                wait_cancellable(cancel, REFRESH_FAILED_DELAY).await;
            }
        }
    }
}

/// Sleep that returns early when the cancellation token fires.
pub(crate) async fn wait_cancellable(cancel: &CancellationToken, delay: Duration) {
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {}
    }
}
