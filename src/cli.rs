//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::client::GmailMailProvider;
use crate::config::Config;
use crate::dispatcher::{build_generator, CampaignDispatcher};
use crate::error::Result;
use crate::generator::fill_sender_name;
use crate::label_manager::LabelManager;
use crate::models::{DispatchStatus, Recipient, RunReport};
use crate::sender::RateLimitedSender;
use crate::source::load_recipients;
use crate::throttle::SendThrottle;

#[derive(Parser, Debug)]
#[command(name = "campaign-dispatch")]
#[command(version)]
#[command(about = "Cold email campaign dispatcher for Gmail", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".campaign-dispatch/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with the Gmail API
    Auth {
        /// Force re-authentication even if a token exists
        #[arg(long)]
        force: bool,
    },

    /// Run a campaign over a recipient CSV
    Run {
        /// Path to the recipient CSV (company, contact_name, email, notes)
        #[arg(short = 'r', long)]
        csv: PathBuf,

        /// Generate and preview content without authenticating or sending
        #[arg(long)]
        dry_run: bool,

        /// Process at most N recipients
        #[arg(long)]
        limit: Option<usize>,

        /// Process only the recipient with this email address
        #[arg(long)]
        only_email: Option<String>,

        /// Send without resolving or applying the campaign label
        #[arg(long)]
        no_label: bool,
    },

    /// Generate an example configuration file
    InitConfig {
        /// Path to create the config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap()
            .progress_chars("##-");

        Self {
            multi: MultiProgress::new(),
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for one `run` invocation, parsed from the command line
pub struct RunOptions {
    pub csv: PathBuf,
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub only_email: Option<String>,
    pub no_label: bool,
}

/// Apply `--only-email` and `--limit` to the loaded list, in that order
fn filter_recipients(
    mut recipients: Vec<Recipient>,
    options: &RunOptions,
) -> Vec<Recipient> {
    if let Some(email) = &options.only_email {
        recipients.retain(|r| r.email.eq_ignore_ascii_case(email));
    }
    if let Some(limit) = options.limit {
        recipients.truncate(limit);
    }
    recipients
}

/// Execute a campaign run end to end and return the report.
///
/// Dry runs stop before authentication: content is generated and printed
/// but nothing reaches the provider.
pub async fn run_campaign(
    cli: &Cli,
    options: RunOptions,
    stop: Arc<AtomicBool>,
) -> Result<Option<RunReport>> {
    let config = Config::load(&cli.config).await?;

    let recipients = load_recipients(&options.csv)?;
    let recipients = filter_recipients(recipients, &options);
    if recipients.is_empty() {
        println!("No recipients to process.");
        return Ok(None);
    }
    info!("Processing {} recipients", recipients.len());

    if options.dry_run {
        preview_campaign(&config, &recipients).await?;
        return Ok(None);
    }

    let reporter = ProgressReporter::new();

    let spinner = reporter.add_spinner("Authenticating with Gmail...");
    let hub = crate::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    reporter.finish_spinner(&spinner, "Authenticated");

    let provider = Arc::new(GmailMailProvider::new(hub));

    let label = if options.no_label {
        None
    } else {
        let spinner = reporter.add_spinner("Resolving campaign label...");
        let manager = LabelManager::new(Arc::clone(&provider));
        let label = manager.ensure_label(&config.campaign.label).await?;
        reporter.finish_spinner(&spinner, &format!("Label ready: {}", label.name));
        Some(label)
    };

    let generator = build_generator(&config)?;
    let throttle = SendThrottle::new(config.send.min_interval());
    let sender = RateLimitedSender::new(Arc::clone(&provider), throttle, &config.send);

    let bar = reporter.add_progress_bar(recipients.len() as u64, "Dispatching");
    let bar_handle = bar.clone();
    let dispatcher =
        CampaignDispatcher::new(sender, generator, config, label, stop).with_observer(Box::new(
            move |outcome| {
                let mark = match outcome.status {
                    DispatchStatus::Sent => "sent",
                    DispatchStatus::SkippedDuplicate => "skipped",
                    DispatchStatus::Failed => "FAILED",
                };
                bar_handle.set_message(format!("{} {}", outcome.recipient.email, mark));
                bar_handle.inc(1);
            },
        ));

    let report = dispatcher.run(recipients).await;
    bar.finish_and_clear();

    Ok(Some(report))
}

/// Generate content for every recipient and print it, without touching
/// the provider. Duplicates are still detected so the preview matches
/// what a real run would send.
async fn preview_campaign(config: &Config, recipients: &[Recipient]) -> Result<()> {
    use std::collections::HashSet;

    println!("Running in DRY RUN mode - nothing will be sent\n");

    let generator = build_generator(config)?;
    let mut seen: HashSet<String> = HashSet::new();

    for recipient in recipients {
        let key = recipient.dedup_key();
        if !key.is_empty() && !seen.insert(key) {
            println!(
                "--- {} <{}> SKIPPED (duplicate company: {})\n",
                recipient.contact_name, recipient.email, recipient.company
            );
            continue;
        }

        let content = match generator.generate(recipient, &config.campaign).await {
            Ok(content) => content,
            Err(e) => {
                println!(
                    "--- {} <{}> generation failed ({}), template fallback:\n",
                    recipient.contact_name, recipient.email, e
                );
                crate::generator::TemplateGenerator::render(recipient, &config.campaign)
            }
        };

        println!("--- To: {} <{}>", recipient.contact_name, recipient.email);
        println!("Subject: {}", content.subject);
        println!("{}\n", fill_sender_name(&content.body, &config.sender.name));
    }

    Ok(())
}

/// Print the run summary block
pub fn print_report(report: &RunReport) {
    println!("\n========================================");
    println!("Campaign Run Summary");
    println!("========================================");
    println!("Run ID: {}", report.run_id);
    println!("Duration: {} seconds", report.duration_seconds());
    if let Some(label) = &report.label {
        println!("Label: {}", label.name);
    }
    println!("Sent: {}", report.sent_count());
    println!("Skipped (duplicates): {}", report.skipped_count());
    println!("Failed: {}", report.failed_count());
    if report.stopped_early {
        println!("Stopped early by operator request");
    }
    println!("========================================");

    for outcome in &report.outcomes {
        if outcome.status == DispatchStatus::Failed {
            println!(
                "  ✗ {}: {}",
                outcome.recipient.email,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        } else if let Some(warning) = &outcome.warning {
            println!("  ! {}: {}", outcome.recipient.email, warning);
        }
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

    fn options(limit: Option<usize>, only_email: Option<&str>) -> RunOptions {
        RunOptions {
            csv: PathBuf::from("recipients.csv"),
            dry_run: false,
            limit,
            only_email: only_email.map(String::from),
            no_label: false,
        }
    }

    #[test]
    fn test_limit_truncates_after_filter() {
        let recipients = vec![
            recipient("A", "a@a.com"),
            recipient("B", "b@b.com"),
            recipient("C", "c@c.com"),
        ];

        let filtered = filter_recipients(recipients.clone(), &options(Some(2), None));
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[1].email, "b@b.com");

        let filtered = filter_recipients(recipients, &options(None, Some("B@B.COM")));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].company, "B");
    }

    #[test]
    fn test_run_options_leave_parsed_cli_usable() {
        let cli = Cli::parse_from(["campaign-dispatch", "run", "--csv", "x.csv", "--limit", "2"]);

        // The binary builds RunOptions out of a borrowed command and then
        // hands the whole Cli to run_campaign for the global path arguments
        let options = match &cli.command {
            Commands::Run {
                csv,
                dry_run,
                limit,
                only_email,
                no_label,
            } => RunOptions {
                csv: csv.clone(),
                dry_run: *dry_run,
                limit: *limit,
                only_email: only_email.clone(),
                no_label: *no_label,
            },
            _ => panic!("Expected Run command"),
        };

        assert_eq!(options.csv, PathBuf::from("x.csv"));
        assert_eq!(options.limit, Some(2));
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert_eq!(cli.credentials, PathBuf::from("credentials.json"));
    }

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::parse_from([
            "campaign-dispatch",
            "run",
            "--csv",
            "prospects.csv",
            "--dry-run",
            "--limit",
            "5",
        ]);

        match cli.command {
            Commands::Run {
                csv,
                dry_run,
                limit,
                only_email,
                no_label,
            } => {
                assert_eq!(csv, PathBuf::from("prospects.csv"));
                assert!(dry_run);
                assert_eq!(limit, Some(5));
                assert!(only_email.is_none());
                assert!(!no_label);
            }
            _ => panic!("Expected Run command"),
        }
    }
}
