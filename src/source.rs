//! Recipient list loading from CSV
//!
//! The list is read fully before dispatch starts so ordering is fixed and
//! malformed rows are reported up front. Rows with an invalid or missing
//! email address are skipped with a warning rather than aborting the run.

use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{CampaignError, Result};
use crate::models::Recipient;

const REQUIRED_HEADERS: &[&str] = &["company", "contact_name", "email"];

// Deliberately loose: full RFC 5322 validation rejects addresses that
// providers accept. This catches blank cells and obvious typos.
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Load recipients from a CSV file with headers company, contact_name,
/// email and optional notes. Row order is preserved.
pub fn load_recipients(path: &Path) -> Result<Vec<Recipient>> {
    if !path.exists() {
        return Err(CampaignError::SourceError(format!(
            "Recipient file not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            CampaignError::SourceError(format!("Failed to open {}: {}", path.display(), e))
        })?;

    let headers = reader
        .headers()
        .map_err(|e| CampaignError::SourceError(format!("Failed to read CSV header: {}", e)))?
        .clone();

    let column_index = resolve_columns(&headers)?;

    let mut recipients = Vec::new();
    for (row_number, record) in reader.records().enumerate() {
        // Header is line 1, first data row is line 2
        let line = row_number + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed row at line {}: {}", line, e);
                continue;
            }
        };

        match parse_row(&record, &column_index) {
            Ok(recipient) => recipients.push(recipient),
            Err(reason) => {
                warn!("Skipping row at line {}: {}", line, reason);
            }
        }
    }

    debug!(
        "Loaded {} recipients from {}",
        recipients.len(),
        path.display()
    );
    Ok(recipients)
}

struct ColumnIndex {
    company: usize,
    contact_name: usize,
    email: usize,
    notes: Option<usize>,
}

fn resolve_columns(headers: &StringRecord) -> Result<ColumnIndex> {
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .filter(|name| find(name).is_none())
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(CampaignError::SourceError(format!(
            "CSV is missing required columns: {}",
            missing.join(", ")
        )));
    }

    Ok(ColumnIndex {
        company: find("company").unwrap_or(0),
        contact_name: find("contact_name").unwrap_or(0),
        email: find("email").unwrap_or(0),
        notes: find("notes"),
    })
}

fn parse_row(record: &StringRecord, columns: &ColumnIndex) -> std::result::Result<Recipient, String> {
    let field = |index: usize| record.get(index).unwrap_or("").trim().to_string();

    let email = field(columns.email);
    if email.is_empty() {
        return Err("empty email".to_string());
    }
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(format!("invalid email '{}'", email));
    }

    Ok(Recipient {
        company: field(columns.company),
        contact_name: field(columns.contact_name),
        email,
        notes: columns.notes.map(field).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_loads_rows_in_order() {
        let file = csv_file(
            "company,contact_name,email,notes\n\
             Acme,Jane,jane@acme.com,slow invoicing\n\
             Globex,Hank,hank@globex.com,\n",
        );

        let recipients = load_recipients(file.path()).unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].company, "Acme");
        assert_eq!(recipients[0].notes, "slow invoicing");
        assert_eq!(recipients[1].email, "hank@globex.com");
        assert_eq!(recipients[1].notes, "");
    }

    #[test]
    fn test_notes_column_is_optional() {
        let file = csv_file(
            "company,contact_name,email\n\
             Acme,Jane,jane@acme.com\n",
        );

        let recipients = load_recipients(file.path()).unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].notes, "");
    }

    #[test]
    fn test_header_case_and_order_are_flexible() {
        let file = csv_file(
            "Email,Company,Contact_Name\n\
             jane@acme.com,Acme,Jane\n",
        );

        let recipients = load_recipients(file.path()).unwrap();
        assert_eq!(recipients[0].company, "Acme");
        assert_eq!(recipients[0].email, "jane@acme.com");
    }

    #[test]
    fn test_invalid_email_rows_are_skipped() {
        let file = csv_file(
            "company,contact_name,email\n\
             Acme,Jane,not-an-email\n\
             Globex,Hank,hank@globex.com\n\
             Initech,,\n",
        );

        let recipients = load_recipients(file.path()).unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].company, "Globex");
    }

    #[test]
    fn test_missing_required_column_is_error() {
        let file = csv_file(
            "company,email\n\
             Acme,jane@acme.com\n",
        );

        let result = load_recipients(file.path());
        match result {
            Err(CampaignError::SourceError(msg)) => {
                assert!(msg.contains("contact_name"));
            }
            other => panic!("Expected SourceError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_recipients(Path::new("/nonexistent/recipients.csv"));
        assert!(matches!(result, Err(CampaignError::SourceError(_))));
    }
}
