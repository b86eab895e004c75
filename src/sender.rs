//! Rate-limited sending with bounded retry
//!
//! Every delivery attempt goes through the shared throttle, including
//! retries, so the configured minimum interval holds across the whole run.
//! Transient failures are retried with exponential backoff; permanent
//! failures surface immediately. Labeling happens after a successful send
//! and is never a reason to retry the send itself.

use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{MailProvider, OutgoingMessage, SentMessage};
use crate::config::SendConfig;
use crate::error::CampaignError;
use crate::models::Label;
use crate::throttle::SendThrottle;

/// Outcome of a successful delivery
#[derive(Debug, Clone)]
pub struct SendResult {
    pub sent: SentMessage,
    /// Total attempts made, including the successful one
    pub attempts: u32,
    /// Set when the message went out but labeling it failed
    pub label_warning: Option<String>,
}

/// A delivery that gave up, with the attempts actually made
///
/// Carries the count so outcomes report what really happened: a permanent
/// error after k transient retries is k+1 attempts, not one.
#[derive(Debug)]
pub struct SendFailure {
    pub error: CampaignError,
    pub attempts: u32,
}

pub struct RateLimitedSender<P: MailProvider> {
    provider: P,
    throttle: SendThrottle,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl<P: MailProvider> RateLimitedSender<P> {
    pub fn new(provider: P, throttle: SendThrottle, config: &SendConfig) -> Self {
        Self {
            provider,
            throttle,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Deliver one message, applying `label` after the send succeeds.
    ///
    /// A message is never sent twice: once `send_message` returns Ok, any
    /// later failure (labeling) is reported as a warning on the result.
    pub async fn send(
        &self,
        message: &OutgoingMessage,
        label: Option<&Label>,
    ) -> std::result::Result<SendResult, SendFailure> {
        let mut delay = self.base_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.throttle.acquire().await;

            match self.provider.send_message(message).await {
                Ok(sent) => {
                    let label_warning = match label {
                        Some(label) => self.apply_label(&sent, label).await,
                        None => None,
                    };
                    return Ok(SendResult {
                        sent,
                        attempts: attempt,
                        label_warning,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let wait = retry_delay(&e, delay, self.max_delay);
                    warn!(
                        "Send to {} failed (attempt {}/{}), retrying in {:?}: {}",
                        message.to, attempt, self.max_attempts, wait, e
                    );
                    tokio::time::sleep(wait).await;
                    delay = (delay * 2).min(self.max_delay);
                }
                Err(e) => {
                    return Err(SendFailure {
                        error: e,
                        attempts: attempt,
                    })
                }
            }
        }
    }

    async fn apply_label(&self, sent: &SentMessage, label: &Label) -> Option<String> {
        match self.provider.apply_label(&sent.id, &label.provider_id).await {
            Ok(()) => {
                debug!("Applied label '{}' to message {}", label.name, sent.id);
                None
            }
            Err(e) => {
                let warning = format!(
                    "Message {} sent but applying label '{}' failed: {}",
                    sent.id, label.name, e
                );
                warn!("{}", warning);
                Some(warning)
            }
        }
    }
}

/// Backoff for one failed attempt. A rate-limit reply with a Retry-After
/// hint stretches the wait when the hint is longer than the backoff.
fn retry_delay(error: &CampaignError, backoff: Duration, max_delay: Duration) -> Duration {
    let capped = backoff.min(max_delay);
    match error {
        CampaignError::RateLimitExceeded { retry_after } => {
            capped.max(Duration::from_secs(*retry_after))
        }
        _ => capped,
    }
}
