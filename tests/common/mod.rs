//! Common test utilities and fixtures

use async_trait::async_trait;
use campaign_dispatch::client::{LabelInfo, MailProvider, OutgoingMessage, SentMessage};
use campaign_dispatch::config::Config;
use campaign_dispatch::error::{CampaignError, Result};
use campaign_dispatch::models::Recipient;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Create a test recipient with default values
pub fn create_test_recipient(company: &str, email: &str) -> Recipient {
    Recipient {
        company: company.to_string(),
        contact_name: "Taylor".to_string(),
        email: email.to_string(),
        notes: "manual reporting".to_string(),
    }
}

/// Config with pacing disabled so tests run on the paused clock
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.sender.name = "Ada Lovelace".to_string();
    config.sender.email = "ada@example.com".to_string();
    config.campaign.service_name = "Workflow Automation".to_string();
    config.campaign.value_prop = "We cut admin work in half.".to_string();
    config.campaign.cta = "Open to a short call next week?".to_string();
    config.send.min_interval_secs = 0;
    config.send.base_delay_ms = 10;
    config.send.max_delay_secs = 1;
    config
}

/// Scriptable in-memory mail provider
///
/// Records every call; `send_message` pops errors from `send_failures`
/// before succeeding, and `fail_label_apply` turns labeling into a failure.
pub struct MockMailProvider {
    pub labels: Mutex<Vec<LabelInfo>>,
    pub create_calls: AtomicU32,
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub send_failures: Mutex<Vec<CampaignError>>,
    pub label_applications: Mutex<Vec<(String, String)>>,
    pub fail_label_apply: bool,
    next_id: AtomicU32,
}

impl MockMailProvider {
    pub fn new() -> Self {
        Self {
            labels: Mutex::new(Vec::new()),
            create_calls: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
            send_failures: Mutex::new(Vec::new()),
            label_applications: Mutex::new(Vec::new()),
            fail_label_apply: false,
            next_id: AtomicU32::new(1),
        }
    }

    pub fn with_labels(labels: Vec<LabelInfo>) -> Self {
        let provider = Self::new();
        *provider.labels.lock().unwrap() = labels;
        provider
    }

    /// Queue errors returned by the next send calls, in order
    pub fn script_send_failures(&self, failures: Vec<CampaignError>) {
        *self.send_failures.lock().unwrap() = failures;
    }

    pub fn sent_addresses(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.to.clone()).collect()
    }
}

impl Default for MockMailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailProvider for MockMailProvider {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.labels.lock().unwrap().clone())
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let info = LabelInfo {
            id: format!("Label_{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            name: name.to_string(),
        };
        self.labels.lock().unwrap().push(info.clone());
        Ok(info)
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        let mut failures = self.send_failures.lock().unwrap();
        if !failures.is_empty() {
            return Err(failures.remove(0));
        }
        drop(failures);

        self.sent.lock().unwrap().push(message.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SentMessage {
            id: format!("msg-{}", n),
            thread_id: format!("thread-{}", n),
        })
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()> {
        if self.fail_label_apply {
            return Err(CampaignError::ProviderError(
                "label apply rejected".to_string(),
            ));
        }
        self.label_applications
            .lock()
            .unwrap()
            .push((message_id.to_string(), label_id.to_string()));
        Ok(())
    }

    async fn search_message_ids(&self, _query: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
}
