use anyhow::Result;
use campaign_dispatch::cli::{self, Cli, Commands, RunOptions};
use campaign_dispatch::config::Config;
use campaign_dispatch::error::CampaignError;
use clap::Parser;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: campaign-dispatch --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // This is necessary because multiple dependencies use different crypto providers
    // On non-Windows platforms, use aws-lc-rs (better performance, FIPS support)
    // On Windows, use ring (better compatibility, no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("campaign_dispatch=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("campaign_dispatch=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let hub =
                campaign_dispatch::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache)
                    .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Test the connection with an explicit scope to avoid triggering
            // an additional OAuth flow
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.readonly")
                .doit()
                .await?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Run {
            csv,
            dry_run,
            limit,
            only_email,
            no_label,
        } => {
            tracing::info!("Starting campaign run");

            // Ctrl-C requests a stop; the dispatcher finishes the current
            // recipient and ends the run cleanly
            let stop = Arc::new(AtomicBool::new(false));
            let stop_handler = Arc::clone(&stop);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nStop requested, finishing current recipient...");
                    stop_handler.store(true, Ordering::SeqCst);
                }
            });

            // Borrow out of the command so the global path arguments on
            // `cli` stay usable for run_campaign
            let options = RunOptions {
                csv: csv.clone(),
                dry_run: *dry_run,
                limit: *limit,
                only_email: only_email.clone(),
                no_label: *no_label,
            };

            if let Some(report) = cli::run_campaign(&cli, options, stop).await? {
                cli::print_report(&report);
            }

            // A completed run exits zero even when individual recipients
            // failed; the report carries those failures
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !*force {
                return Err(CampaignError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file before your first run.");
            println!("Key settings to review:");
            println!("  - sender.name / sender.email: your From identity");
            println!("  - campaign.service_name / value_prop / cta: campaign copy");
            println!("  - generator.mode: 'template' or 'external'");
            println!("  - send.min_interval_secs: pacing between sends");

            Ok(())
        }
    }
}
