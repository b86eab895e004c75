//! Campaign dispatch engine
//!
//! Processes recipients strictly in input order, one at a time. Each
//! recipient moves through dedup check, content generation and rate-limited
//! send, and ends as exactly one outcome in the run report. A failure for
//! one recipient never aborts the run; the stop flag is honored between
//! recipients, never mid-send.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{MailProvider, OutgoingMessage};
use crate::config::Config;
use crate::error::Result;
use crate::generator::{fill_sender_name, ContentGenerator, TemplateGenerator};
use crate::models::{DispatchOutcome, GeneratedContent, Label, Recipient, RunReport};
use crate::sender::RateLimitedSender;

/// Called after each recipient reaches a final state, in input order
pub type OutcomeObserver = Box<dyn Fn(&DispatchOutcome) + Send + Sync>;

pub struct CampaignDispatcher<P: MailProvider> {
    sender: RateLimitedSender<P>,
    generator: Box<dyn ContentGenerator>,
    config: Config,
    label: Option<Label>,
    stop: Arc<AtomicBool>,
    observer: Option<OutcomeObserver>,
}

impl<P: MailProvider> CampaignDispatcher<P> {
    pub fn new(
        sender: RateLimitedSender<P>,
        generator: Box<dyn ContentGenerator>,
        config: Config,
        label: Option<Label>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sender,
            generator,
            config,
            label,
            stop,
            observer: None,
        }
    }

    /// Register a per-outcome callback, e.g. for progress display
    pub fn with_observer(mut self, observer: OutcomeObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run the campaign over `recipients`. Always returns a report; a
    /// completed run with per-recipient failures is not an error.
    pub async fn run(&self, recipients: Vec<Recipient>) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "Starting run {} with {} recipients (label: {})",
            run_id,
            recipients.len(),
            self.label
                .as_ref()
                .map(|l| l.name.as_str())
                .unwrap_or("none")
        );

        let mut seen: HashSet<String> = HashSet::new();
        let mut outcomes = Vec::with_capacity(recipients.len());
        let mut stopped_early = false;

        for recipient in recipients {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested, ending run after {} outcomes", outcomes.len());
                stopped_early = true;
                break;
            }

            let outcome = self.process_recipient(recipient, &mut seen).await;
            if let Some(observer) = &self.observer {
                observer(&outcome);
            }
            outcomes.push(outcome);
        }

        let report = RunReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            label: self.label.clone(),
            outcomes,
            stopped_early,
        };
        info!(
            "Run {} finished: {} sent, {} skipped, {} failed in {}s",
            report.run_id,
            report.sent_count(),
            report.skipped_count(),
            report.failed_count(),
            report.duration_seconds()
        );
        report
    }

    async fn process_recipient(
        &self,
        recipient: Recipient,
        seen: &mut HashSet<String>,
    ) -> DispatchOutcome {
        // Dedup runs before any generation work. The key is claimed here,
        // before the send, so a failed recipient still blocks later rows
        // for the same company in this run. Empty keys never collide.
        let key = recipient.dedup_key();
        if !key.is_empty() && !seen.insert(key) {
            debug!(
                "Skipping {} ({}): duplicate company in this run",
                recipient.email, recipient.company
            );
            return DispatchOutcome::skipped_duplicate(recipient);
        }

        if self.config.send.skip_existing_threads {
            match self.has_existing_thread(&recipient.email).await {
                Ok(true) => {
                    debug!("Skipping {}: existing campaign thread", recipient.email);
                    return DispatchOutcome::skipped_duplicate(recipient);
                }
                Ok(false) => {}
                // Best effort only; a search failure must not block the send
                Err(e) => {
                    warn!("Thread lookup for {} failed, proceeding: {}", recipient.email, e);
                }
            }
        }

        let (content, mut warning) = self.generate_content(&recipient).await;
        let body = fill_sender_name(&content.body, &self.config.sender.name);

        let message = OutgoingMessage {
            from_header: self.config.sender.from_header(),
            to: recipient.email.clone(),
            subject: content.subject,
            body,
        };

        match self.sender.send(&message, self.label.as_ref()).await {
            Ok(result) => {
                info!(
                    "Sent to {} ({} attempt{})",
                    recipient.email,
                    result.attempts,
                    if result.attempts == 1 { "" } else { "s" }
                );
                if warning.is_none() {
                    warning = result.label_warning;
                }
                DispatchOutcome::sent(recipient, result.attempts, warning)
            }
            Err(failure) => {
                warn!("Giving up on {}: {}", recipient.email, failure.error);
                DispatchOutcome::failed(recipient, failure.error.to_string(), failure.attempts)
            }
        }
    }

    /// Generate content for one recipient. External generator failures
    /// downgrade to the template for this recipient only, recorded as a
    /// warning on the outcome.
    async fn generate_content(&self, recipient: &Recipient) -> (GeneratedContent, Option<String>) {
        match self.generator.generate(recipient, &self.config.campaign).await {
            Ok(content) => (content, None),
            Err(e) => {
                let warning = format!("Generation failed, used template: {}", e);
                warn!("{} for {}", warning, recipient.email);
                (
                    TemplateGenerator::render(recipient, &self.config.campaign),
                    Some(warning),
                )
            }
        }
    }

    /// Cross-run duplicate check: has this address already been contacted
    /// under the campaign label?
    async fn has_existing_thread(&self, email: &str) -> Result<bool> {
        let label = match &self.label {
            Some(label) => label,
            None => return Ok(false),
        };
        let query = format!("label:\"{}\" to:{}", label.name, email);
        let ids = self.sender.provider().search_message_ids(&query).await?;
        Ok(!ids.is_empty())
    }
}

/// Build the generator named by the config. "template" is the default;
/// "external" requires an API key, enforced by config validation.
pub fn build_generator(config: &Config) -> Result<Box<dyn ContentGenerator>> {
    match config.generator.mode.as_str() {
        "external" => Ok(Box::new(crate::generator::OpenAiGenerator::new(
            &config.generator,
        )?)),
        _ => Ok(Box::new(TemplateGenerator)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SendConfig;
    use crate::throttle::SendThrottle;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingProvider {
        sent_to: Mutex<Vec<String>>,
        existing_threads: Vec<String>,
    }

    impl RecordingProvider {
        fn new() -> Self {
            Self {
                sent_to: Mutex::new(Vec::new()),
                existing_threads: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl MailProvider for RecordingProvider {
        async fn list_labels(&self) -> crate::error::Result<Vec<crate::client::LabelInfo>> {
            Ok(vec![])
        }

        async fn create_label(
            &self,
            name: &str,
        ) -> crate::error::Result<crate::client::LabelInfo> {
            Ok(crate::client::LabelInfo {
                id: "Label_1".to_string(),
                name: name.to_string(),
            })
        }

        async fn send_message(
            &self,
            message: &OutgoingMessage,
        ) -> crate::error::Result<crate::client::SentMessage> {
            self.sent_to.lock().unwrap().push(message.to.clone());
            Ok(crate::client::SentMessage {
                id: format!("msg-{}", message.to),
                thread_id: "t".to_string(),
            })
        }

        async fn apply_label(
            &self,
            _message_id: &str,
            _label_id: &str,
        ) -> crate::error::Result<()> {
            Ok(())
        }

        async fn search_message_ids(&self, query: &str) -> crate::error::Result<Vec<String>> {
            let hit = self
                .existing_threads
                .iter()
                .any(|email| query.contains(email.as_str()));
            Ok(if hit { vec!["old-msg".to_string()] } else { vec![] })
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.sender.name = "Ada".to_string();
        config.sender.email = "ada@example.com".to_string();
        config.send.min_interval_secs = 0;
        config
    }

    fn dispatcher_with(provider: RecordingProvider) -> CampaignDispatcher<RecordingProvider> {
        let config = test_config();
        let send_config = SendConfig {
            min_interval_secs: 0,
            ..config.send.clone()
        };
        let sender = RateLimitedSender::new(
            provider,
            SendThrottle::new(Duration::from_secs(0)),
            &send_config,
        );
        CampaignDispatcher::new(
            sender,
            Box::new(TemplateGenerator),
            config,
            Some(Label {
                name: "ColdCampaign".to_string(),
                provider_id: "Label_1".to_string(),
            }),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn recipient(company: &str, email: &str) -> Recipient {
        Recipient {
            company: company.to_string(),
            contact_name: "Jane".to_string(),
            email: email.to_string(),
            notes: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_company_skipped_without_send() {
        let dispatcher = dispatcher_with(RecordingProvider::new());
        let report = dispatcher
            .run(vec![
                recipient("Acme", "first@acme.com"),
                recipient("Globex", "hank@globex.com"),
                recipient("ACME", "second@acme.com"),
            ])
            .await;

        assert_eq!(report.sent_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        let sent = dispatcher.sender.provider().sent_to.lock().unwrap().clone();
        assert_eq!(sent, vec!["first@acme.com", "hank@globex.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_company_rows_never_collide() {
        let dispatcher = dispatcher_with(RecordingProvider::new());
        let report = dispatcher
            .run(vec![recipient("", "a@x.com"), recipient("", "b@y.com")])
            .await;

        assert_eq!(report.sent_count(), 2);
        assert_eq!(report.skipped_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flag_ends_run_between_recipients() {
        let stop = Arc::new(AtomicBool::new(false));
        let provider = RecordingProvider::new();
        let config = test_config();
        let sender = RateLimitedSender::new(
            provider,
            SendThrottle::new(Duration::from_secs(0)),
            &config.send.clone(),
        );
        let stop_after_first = stop.clone();
        let dispatcher = CampaignDispatcher::new(
            sender,
            Box::new(TemplateGenerator),
            config,
            None,
            stop.clone(),
        )
        .with_observer(Box::new(move |_| {
            stop_after_first.store(true, Ordering::SeqCst);
        }));

        let report = dispatcher
            .run(vec![
                recipient("Acme", "a@acme.com"),
                recipient("Globex", "b@globex.com"),
            ])
            .await;

        assert!(report.stopped_early);
        assert_eq!(report.outcomes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_thread_skipped_when_enabled() {
        let mut provider = RecordingProvider::new();
        provider.existing_threads = vec!["old@acme.com".to_string()];
        let mut dispatcher = dispatcher_with(provider);
        dispatcher.config.send.skip_existing_threads = true;

        let report = dispatcher
            .run(vec![
                recipient("Acme", "old@acme.com"),
                recipient("Globex", "new@globex.com"),
            ])
            .await;

        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.sent_count(), 1);
        let sent = dispatcher.sender.provider().sent_to.lock().unwrap().clone();
        assert_eq!(sent, vec!["new@globex.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sender_name_substituted_in_body() {
        struct CaptureProvider {
            bodies: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl MailProvider for CaptureProvider {
            async fn list_labels(&self) -> crate::error::Result<Vec<crate::client::LabelInfo>> {
                Ok(vec![])
            }
            async fn create_label(
                &self,
                name: &str,
            ) -> crate::error::Result<crate::client::LabelInfo> {
                Ok(crate::client::LabelInfo {
                    id: "L".to_string(),
                    name: name.to_string(),
                })
            }
            async fn send_message(
                &self,
                message: &OutgoingMessage,
            ) -> crate::error::Result<crate::client::SentMessage> {
                self.bodies.lock().unwrap().push(message.body.clone());
                Ok(crate::client::SentMessage {
                    id: "m".to_string(),
                    thread_id: "t".to_string(),
                })
            }
            async fn apply_label(&self, _m: &str, _l: &str) -> crate::error::Result<()> {
                Ok(())
            }
            async fn search_message_ids(&self, _q: &str) -> crate::error::Result<Vec<String>> {
                Ok(vec![])
            }
        }

        let provider = CaptureProvider {
            bodies: Mutex::new(Vec::new()),
        };
        let config = test_config();
        let sender = RateLimitedSender::new(
            provider,
            SendThrottle::new(Duration::from_secs(0)),
            &config.send.clone(),
        );
        let dispatcher = CampaignDispatcher::new(
            sender,
            Box::new(TemplateGenerator),
            config,
            None,
            Arc::new(AtomicBool::new(false)),
        );

        dispatcher.run(vec![recipient("Acme", "a@acme.com")]).await;

        let bodies = dispatcher.sender.provider().bodies.lock().unwrap();
        assert!(bodies[0].ends_with("Best,\nAda"));
        assert!(!bodies[0].contains("{FROM_NAME}"));
    }
}
