//! Mail provider abstraction and the Gmail API implementation

use async_trait::async_trait;
use google_gmail1::api::{Label, Message, ModifyMessageRequest};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{CampaignError, Result};

/// Label info returned from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// A fully assembled outbound email, ready for the wire
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// RFC 5322 From header value, e.g. `Name <addr>`
    pub from_header: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMessage {
    /// Assemble the RFC 2822 envelope the provider expects.
    /// Plain-text body only; MIME multipart is out of scope here.
    pub fn to_rfc822(&self) -> Vec<u8> {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            header_value(&self.from_header),
            header_value(&self.to),
            header_value(&self.subject),
            self.body
        )
        .into_bytes()
    }
}

/// Header values must stay on one line. CR/LF from untrusted content
/// (CSV fields, generated subjects) would otherwise inject extra headers.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Provider identifiers for a sent message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub thread_id: String,
}

/// Abstract mail provider capability consumed by the dispatch engine
///
/// All calls are request/response; no streaming. Tests substitute a
/// scripted implementation.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label
    async fn create_label(&self, name: &str) -> Result<LabelInfo>;

    /// Send one message. Exactly one externally visible email per
    /// successful call.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<SentMessage>;

    /// Apply a label to an already-sent message
    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()>;

    /// List message IDs matching a provider search query
    async fn search_message_ids(&self, query: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<T: MailProvider + ?Sized> MailProvider for Arc<T> {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        self.as_ref().create_label(name).await
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        self.as_ref().send_message(message).await
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()> {
        self.as_ref().apply_label(message_id, label_id).await
    }

    async fn search_message_ids(&self, query: &str) -> Result<Vec<String>> {
        self.as_ref().search_message_ids(query).await
    }
}

/// Production Gmail provider
///
/// Thin request/response adapter over the Gmail hub. Throttling and retry
/// live in the rate-limited sender, not here.
pub struct GmailMailProvider {
    hub: GmailHub,
}

impl GmailMailProvider {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl MailProvider for GmailMailProvider {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        // Bounded so a hung connection cannot stall the whole run setup
        let timeout_duration = Duration::from_secs(30);
        let api_call = self
            .hub
            .users()
            .labels_list("me")
            .add_scope("https://www.googleapis.com/auth/gmail.labels")
            .doit();

        let (_, response) = match tokio::time::timeout(timeout_duration, api_call).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Gmail labels.list call timed out after {:?}", timeout_duration);
                return Err(CampaignError::NetworkError(format!(
                    "API call timed out after {:?}",
                    timeout_duration
                )));
            }
        };

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Listed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope("https://www.googleapis.com/auth/gmail.labels")
            .doit()
            .await?;

        match (created.id, created.name) {
            (Some(id), Some(name)) => Ok(LabelInfo { id, name }),
            _ => Err(CampaignError::LabelError(
                "Created label has no ID".to_string(),
            )),
        }
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        let rfc822 = message.to_rfc822();
        let mime_type: mime::Mime = "message/rfc822".parse().unwrap();

        let (_, sent) = self
            .hub
            .users()
            .messages_send(Message::default(), "me")
            .add_scope("https://www.googleapis.com/auth/gmail.send")
            .upload(Cursor::new(rfc822), mime_type)
            .await?;

        let id = sent
            .id
            .ok_or_else(|| CampaignError::SendError("Sent message has no ID".to_string()))?;
        let thread_id = sent.thread_id.unwrap_or_else(|| id.clone());

        debug!("Sent message {} (thread {})", id, thread_id);
        Ok(SentMessage { id, thread_id })
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()> {
        let modify_request = ModifyMessageRequest {
            add_label_ids: Some(vec![label_id.to_string()]),
            remove_label_ids: None,
        };

        self.hub
            .users()
            .messages_modify(modify_request, "me", message_id)
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        Ok(())
    }

    async fn search_message_ids(&self, query: &str) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(query)
                .max_results(100);

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = call
                .add_scope("https://www.googleapis.com/auth/gmail.readonly")
                .doit()
                .await?;

            if let Some(messages) = response.messages {
                for msg_ref in messages {
                    if let Some(id) = msg_ref.id {
                        all_ids.push(id);
                    }
                }
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_ids)
    }
}
