//! Moderation orchestrator: drives the watcher over one room, feeds novel
//! messages through the classifier, updates the ledger, and dispatches the
//! resulting gateway actions. Owns the cancellation token and the
//! heartbeat cadence.

use crate::gateway::{GatewayClient, RawMessage};
use crate::moderation::classifier::PolicyClassifier;
use crate::moderation::dedup::DedupFilter;
use crate::moderation::ledger::ViolationLedger;
use crate::moderation::policy::{self, Escalation};
use crate::moderation::watcher::{wait_cancellable, PollResult, RoomWatcher};
use crate::moderation::unix_now_secs;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Quiet period after which a liveness line is logged.
const HEARTBEAT_AFTER: Duration = Duration::from_secs(300);

const BAN_REASON: &str = "Three violations of PG-14 standards within one hour";

pub struct ModerationEngine {
    gateway: GatewayClient,
    classifier: PolicyClassifier,
    watcher: RoomWatcher,
    dedup: DedupFilter,
    ledger: ViolationLedger,
    room_id: String,
    cancel: CancellationToken,
}

impl ModerationEngine {
    pub fn new(
        gateway: GatewayClient,
        classifier: PolicyClassifier,
        room_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let room_id = room_id.into();
        Self {
            gateway,
            classifier,
            watcher: RoomWatcher::new(room_id.clone()),
            dedup: DedupFilter::new(),
            ledger: ViolationLedger::new(),
            room_id,
            cancel,
        }
    }

    pub fn ledger(&self) -> &ViolationLedger {
        &self.ledger
    }

    pub fn dedup(&self) -> &DedupFilter {
        &self.dedup
    }

    /// Run the moderation loop until the cancellation token fires.
    ///
    /// Join failures are logged and the loop proceeds to watch regardless;
    /// every per-iteration failure is transient by design. One
    /// poll/classify/escalate cycle runs at a time; no in-flight gateway
    /// call is aborted on cancellation; the loop exits at the next
    /// suspension point.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        match self.gateway.join_room(&self.room_id).await {
            Ok(()) => tracing::info!("joined room {}", self.room_id),
            Err(err) => {
                tracing::warn!("could not join room {} ({err}); watching anyway", self.room_id);
            }
        }

        tracing::info!("moderating room {}", self.room_id);
        let mut last_activity = Instant::now();

        while !self.cancel.is_cancelled() {
            if last_activity.elapsed() > HEARTBEAT_AFTER {
                tracing::info!(
                    "still watching {} for new messages (checking every {}s)",
                    self.room_id,
                    self.watcher.check_interval().as_secs()
                );
                last_activity = Instant::now();
            }

            match self.watcher.poll(&self.gateway).await {
                PollResult::NewMessages(messages) => {
                    last_activity = Instant::now();
                    // Only the newest event of a batch is inspected; the
                    // rest of the batch is dropped.
                    if let Some(message) = messages.into_iter().next() {
                        self.handle_message(message).await;
                    }
                }
                PollResult::NoNewMessages => {}
                PollResult::Failed(failure) => {
                    self.watcher
                        .recover(&failure, &mut self.gateway, &self.cancel)
                        .await;
                }
            }

            wait_cancellable(&self.cancel, self.watcher.check_interval()).await;
        }

        tracing::info!("moderation stopped");
        Ok(())
    }

    /// Classify one message and escalate on a positive verdict. Novelty is
    /// checked first; the dedup key is marked at the point of acceptance.
    pub async fn handle_message(&mut self, message: RawMessage) {
        if !self.dedup.is_novel(&message.sender, &message.event_id) {
            tracing::debug!("already processed {}; skipping", message.event_id);
            return;
        }
        self.dedup.mark_seen(&message.sender, &message.event_id);

        let verdict = self
            .classifier
            .classify(&message.body, &message.sender)
            .await;

        if verdict.violates {
            tracing::warn!(
                "message {} from {} violates policy: {}",
                message.event_id,
                message.sender,
                verdict.reason
            );
            let (count, decision) = self.apply_violation(&message, unix_now_secs());
            self.dispatch(&message, &verdict.reason, count, decision)
                .await;
        } else {
            tracing::info!(
                "message {} from {} is compliant: {}",
                message.event_id,
                message.sender,
                verdict.reason
            );
        }
    }

    /// Ledger update plus the pure escalation decision for it.
    pub fn apply_violation(&mut self, message: &RawMessage, now_secs: u64) -> (u32, Escalation) {
        let count = self.ledger.record_violation(
            &message.sender,
            &message.event_id,
            &message.body,
            now_secs,
        );
        (count, policy::decide(count))
    }

    /// Execute the gateway side effects for a decision: redact first, then
    /// the conditional follow-up. Failed actions are logged, never retried,
    /// and never stop the loop.
    async fn dispatch(
        &self,
        message: &RawMessage,
        reason: &str,
        count: u32,
        decision: Escalation,
    ) {
        let redact_reason = format!("Violates PG-14 standards: {reason}");
        match self
            .gateway
            .redact(&self.room_id, &message.event_id, Some(&redact_reason))
            .await
        {
            Ok(()) => tracing::info!("redacted {} from {}", message.event_id, message.sender),
            Err(err) => tracing::warn!("redact of {} failed: {err}", message.event_id),
        }

        match decision {
            Escalation::Redact => {}
            Escalation::RedactAndWarn => {
                let warning = format!(
                    "{} This is your second violation. One more illicit message within 1 hour will result in a ban.",
                    message.sender
                );
                match self.gateway.send_message(&self.room_id, &warning).await {
                    Ok(event_id) => {
                        tracing::info!("warning sent to {} ({event_id})", message.sender);
                    }
                    Err(err) => tracing::warn!("warning to {} failed: {err}", message.sender),
                }
            }
            Escalation::RedactAndBan => {
                tracing::warn!("banning {} after {count} violations", message.sender);
                if let Err(err) = self
                    .gateway
                    .ban(&self.room_id, &message.sender, Some(BAN_REASON))
                    .await
                {
                    tracing::warn!("ban of {} failed: {err}", message.sender);
                }
            }
        }
    }
}
