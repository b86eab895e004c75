use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One prospect row from the recipient source. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub company: String,
    pub contact_name: String,
    pub email: String,
    #[serde(default)]
    pub notes: String,
}

impl Recipient {
    /// Duplicate-detection key: one campaign thread per company, not per
    /// contact. Case-normalized so "Acme" and "ACME" collide.
    pub fn dedup_key(&self) -> String {
        self.company.trim().to_lowercase()
    }
}

/// Subject and body produced for one recipient. Never cached across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedContent {
    pub subject: String,
    pub body: String,
}

/// A provider-side classification tag, resolved once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub provider_id: String,
}

/// Final state of one recipient within a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DispatchStatus {
    Sent,
    SkippedDuplicate,
    Failed,
}

/// One per recipient per run; the ordered list of outcomes is the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub recipient: Recipient,
    pub status: DispatchStatus,
    /// Terminal error for `Failed` outcomes
    pub error: Option<String>,
    /// Non-fatal warning, e.g. sent but label application failed
    pub warning: Option<String>,
    /// Send attempts made, including the successful one. Zero for skips.
    pub attempt_count: u32,
}

impl DispatchOutcome {
    pub fn skipped_duplicate(recipient: Recipient) -> Self {
        Self {
            recipient,
            status: DispatchStatus::SkippedDuplicate,
            error: None,
            warning: None,
            attempt_count: 0,
        }
    }

    pub fn failed(recipient: Recipient, error: String, attempt_count: u32) -> Self {
        Self {
            recipient,
            status: DispatchStatus::Failed,
            error: Some(error),
            warning: None,
            attempt_count,
        }
    }

    pub fn sent(recipient: Recipient, attempt_count: u32, warning: Option<String>) -> Self {
        Self {
            recipient,
            status: DispatchStatus::Sent,
            error: None,
            warning,
            attempt_count,
        }
    }
}

/// Structured summary of one campaign run
///
/// Always lists every recipient's final status in input order; a failed
/// recipient is never silently omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub label: Option<Label>,
    pub outcomes: Vec<DispatchOutcome>,
    /// True when the run was stopped before processing every recipient
    pub stopped_early: bool,
}

impl RunReport {
    pub fn sent_count(&self) -> usize {
        self.count(DispatchStatus::Sent)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(DispatchStatus::SkippedDuplicate)
    }

    pub fn failed_count(&self) -> usize {
        self.count(DispatchStatus::Failed)
    }

    fn count(&self, status: DispatchStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(company: &str, email: &str) -> Recipient {
        Recipient {
            company: company.to_string(),
            contact_name: "Jane".to_string(),
            email: email.to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_dedup_key_case_normalized() {
        assert_eq!(recipient("Acme Corp", "a@acme.com").dedup_key(), "acme corp");
        assert_eq!(recipient("ACME CORP", "b@acme.com").dedup_key(), "acme corp");
        assert_eq!(recipient("  Acme Corp ", "c@acme.com").dedup_key(), "acme corp");
    }

    #[test]
    fn test_report_counts() {
        let report = RunReport {
            run_id: "run-1".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            label: None,
            outcomes: vec![
                DispatchOutcome::sent(recipient("A", "a@a.com"), 1, None),
                DispatchOutcome::skipped_duplicate(recipient("a", "a2@a.com")),
                DispatchOutcome::failed(recipient("B", "b@b.com"), "boom".to_string(), 5),
            ],
            stopped_early: false,
        };

        assert_eq!(report.sent_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = DispatchOutcome::sent(recipient("Acme", "a@acme.com"), 2, None);
        let json = serde_json::to_string(&outcome).unwrap();
        let back: DispatchOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, DispatchStatus::Sent);
        assert_eq!(back.attempt_count, 2);
    }
}
