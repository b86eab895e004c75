//! Campaign Dispatch Engine
//!
//! A single-operator cold email campaign tool that reads a recipient CSV,
//! generates personalized outreach per prospect, and sends it through the
//! Gmail API at a controlled pace with campaign labeling.
//!
//! # Overview
//!
//! This library provides a complete dispatch pipeline:
//! - **Authentication**: OAuth2 authentication with token caching
//! - **Recipient Source**: CSV loading with validation and row skipping
//! - **Content Generation**: deterministic template or an OpenAI-compatible
//!   external generator with template fallback
//! - **Label Management**: lookup-or-create campaign label resolution
//! - **Rate-Limited Sending**: global send pacing with bounded retry
//! - **Dispatch Engine**: sequential per-recipient processing with in-run
//!   duplicate suppression and a structured run report
//!
//! # Example Usage
//!
//! ```no_run
//! use campaign_dispatch::{auth, client::GmailMailProvider, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     // Authenticate
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".campaign-dispatch/token.json".as_ref()
//!     ).await?;
//!
//!     // Talk to Gmail through the provider seam
//!     let provider = GmailMailProvider::new(hub);
//!     // ...
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line interface and run orchestration
//! - [`client`] - Mail provider trait and the Gmail implementation
//! - [`config`] - Configuration management
//! - [`dispatcher`] - The per-run campaign dispatch engine
//! - [`error`] - Error types and result aliases
//! - [`generator`] - Template and external content generation
//! - [`label_manager`] - Campaign label resolution
//! - [`models`] - Core data structures
//! - [`sender`] - Rate-limited sending with bounded retry
//! - [`source`] - Recipient CSV loading
//! - [`throttle`] - Global minimum-interval send gate

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod label_manager;
pub mod models;
pub mod sender;
pub mod source;
pub mod throttle;

// Re-export commonly used types for convenience
pub use error::{CampaignError, Result};

// Core data models
pub use models::{
    DispatchOutcome, DispatchStatus, GeneratedContent, Label, Recipient, RunReport,
};

// Config types
pub use config::{CampaignConfig, Config, GeneratorConfig, SendConfig, SenderConfig};

// Provider seam
pub use client::{GmailMailProvider, LabelInfo, MailProvider, OutgoingMessage, SentMessage};

// Generation
pub use generator::{ContentGenerator, OpenAiGenerator, TemplateGenerator};

// Dispatch pipeline
pub use dispatcher::CampaignDispatcher;
pub use label_manager::LabelManager;
pub use sender::{RateLimitedSender, SendFailure, SendResult};
pub use throttle::SendThrottle;

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
