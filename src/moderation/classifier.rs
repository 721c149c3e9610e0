//! Binary policy classification of a single message.
//!
//! The classifier asks the LLM backend a terse YES/NO question. Failure
//! handling is an explicit two-step policy: the full prompt, then one retry
//! with a minimal fallback prompt, then a fail-safe positive verdict. The
//! system over-flags rather than silently passing content through when the
//! backend is down.

use crate::providers::Provider;

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub violates: bool,
    pub reason: String,
}

const FAIL_SAFE_REASON: &str = "Could not analyze content - flagging for human review";

pub struct PolicyClassifier {
    provider: Box<dyn Provider>,
    model: String,
    temperature: f64,
}

impl PolicyClassifier {
    pub fn new(provider: Box<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }

    /// Classify `body` from `sender` against the PG-14 policy.
    pub async fn classify(&self, body: &str, sender: &str) -> Verdict {
        match self.ask(&primary_prompt(body, sender)).await {
            Ok(answer) => {
                if answer_is_yes(&answer) {
                    Verdict {
                        violates: true,
                        reason: "Message violates PG-14 standards".into(),
                    }
                } else {
                    Verdict {
                        violates: false,
                        reason: "Message is compliant with PG-14 standards".into(),
                    }
                }
            }
            Err(primary_err) => {
                tracing::warn!("primary classification failed ({primary_err}); trying fallback prompt");
                self.classify_fallback(body).await
            }
        }
    }

    async fn classify_fallback(&self, body: &str) -> Verdict {
        match self.ask(&fallback_prompt(body)).await {
            Ok(answer) => {
                if answer_is_yes(&answer) {
                    Verdict {
                        violates: true,
                        reason: "Message likely violates PG-14 standards".into(),
                    }
                } else {
                    Verdict {
                        violates: false,
                        reason: "Message appears compliant with PG-14 standards".into(),
                    }
                }
            }
            Err(fallback_err) => {
                tracing::error!("fallback classification also failed: {fallback_err}");
                Verdict {
                    violates: true,
                    reason: FAIL_SAFE_REASON.into(),
                }
            }
        }
    }

    async fn ask(&self, prompt: &str) -> anyhow::Result<String> {
        self.provider
            .chat(prompt, &self.model, self.temperature)
            .await
    }
}

/// Any answer containing YES is a violation; the prompt demands a terse
/// YES/NO reply.
fn answer_is_yes(answer: &str) -> bool {
    answer.trim().to_uppercase().contains("YES")
}

fn primary_prompt(body: &str, sender: &str) -> String {
    format!(
        r#"Your task is to determine if the following message violates PG-14 standards.

Message: "{body}"
Sender: {sender}

PG-14 standards prohibit:
- Explicit sexual content or strong sexual innuendo
- Graphic violence or gore
- Hate speech, discrimination, or harassment
- Promotion of self-harm, suicide, or harmful activities
- Detailed instructions for illegal activities
- Strong profanity

Think carefully about context and nuance. Consider whether the message contains:
- Slurs or derogatory terms
- Threatening language
- Explicit descriptions of violence
- Sexual content inappropriate for teenagers

Respond with ONLY "YES" if it violates PG-14 standards, or "NO" if it doesn't."#
    )
}

fn fallback_prompt(body: &str) -> String {
    format!(r#"Does this message "{body}" violate PG-14 standards? Answer YES or NO only."#)
}
