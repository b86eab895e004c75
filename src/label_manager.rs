//! Campaign label resolution: lookup-or-create with race recovery

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::client::MailProvider;
use crate::error::{CampaignError, Result};
use crate::models::Label;

static INVALID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s/\-]").unwrap());
static MULTIPLE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Resolves the campaign label once per run
///
/// The run holds onto the returned [`Label`] and reuses its provider ID for
/// every send, avoiding redundant creation calls.
pub struct LabelManager<P> {
    provider: P,
}

impl<P: MailProvider> LabelManager<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Look up the label by exact name (case-insensitive), creating it when
    /// missing. Idempotent: calling twice yields the same provider ID.
    ///
    /// Handles the race where a concurrent process creates the label between
    /// lookup and create: an "already exists" conflict triggers a re-fetch
    /// instead of failing the run.
    pub async fn ensure_label(&self, name: &str) -> Result<Label> {
        let sanitized = sanitize_label_name(name)?;

        if let Some(label) = self.find_label(&sanitized).await? {
            debug!("Label '{}' already exists (id: {})", label.name, label.provider_id);
            return Ok(label);
        }

        info!("Creating label: {}", sanitized);
        match self.provider.create_label(&sanitized).await {
            Ok(info) => Ok(Label {
                name: info.name,
                provider_id: info.id,
            }),
            // Lost the creation race: another process made it first.
            // The conflict surfaces as a 400/409-style client error.
            Err(e @ CampaignError::BadRequest(_)) | Err(e @ CampaignError::ProviderError(_)) => {
                warn!(
                    "Label creation conflict for '{}' ({}), re-fetching",
                    sanitized, e
                );
                self.find_label(&sanitized).await?.ok_or_else(|| {
                    CampaignError::LabelError(format!(
                        "Failed to create label '{}': {}",
                        sanitized, e
                    ))
                })
            }
            Err(e) => Err(CampaignError::LabelError(format!(
                "Failed to create label '{}': {}",
                sanitized, e
            ))),
        }
    }

    async fn find_label(&self, name: &str) -> Result<Option<Label>> {
        let labels = self
            .provider
            .list_labels()
            .await
            .map_err(|e| CampaignError::LabelError(format!("Failed to list labels: {}", e)))?;

        let wanted = name.to_lowercase();
        Ok(labels
            .into_iter()
            .find(|l| l.name.to_lowercase() == wanted)
            .map(|l| Label {
                name: l.name,
                provider_id: l.id,
            }))
    }
}

/// Sanitize a label name to comply with Gmail's requirements
///
/// Trims whitespace, strips invalid characters, collapses runs of spaces
/// and enforces the 50-character limit.
pub fn sanitize_label_name(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(CampaignError::LabelError(
            "Label name cannot be empty".to_string(),
        ));
    }

    let mut sanitized = name.trim().to_string();
    sanitized = INVALID_CHARS.replace_all(&sanitized, " ").to_string();
    sanitized = MULTIPLE_SPACES.replace_all(&sanitized, " ").to_string();
    sanitized = sanitized.trim().to_string();

    // Gmail caps label names at 50 characters. Cut on a char boundary:
    // byte 50 can fall inside a multibyte character
    if sanitized.len() > 50 {
        let mut cut = 50;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        if let Some(last_space) = sanitized.rfind(' ') {
            sanitized.truncate(last_space);
        }
        sanitized = sanitized.trim_end().to_string();
    }

    if sanitized.is_empty() {
        return Err(CampaignError::LabelError(
            "Sanitized label name is empty".to_string(),
        ));
    }

    Ok(sanitized)
}
