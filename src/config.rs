use crate::{
    errors::{UploadError, UploadResult},
    models::transfer::TransferOptions,
    services::chunker::{DEFAULT_PART_SIZE, MIN_PART_SIZE},
};
use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

const MIB: u64 = 1024 * 1024;

/// Bounded exponential backoff for part uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per part, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, failures surface immediately.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Limits applied to a file selection before anything is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    pub max_files: usize,
    /// Maximum size of a single file in bytes.
    pub max_file_size: u64,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size: 10 * 1024 * MIB,
        }
    }
}

/// Tuning of the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Part size in bytes.
    pub part_size: u64,
    /// Parts uploaded concurrently within one batch.
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    /// Compare MD5-shaped ETags with the digest of the bytes sent.
    pub verify_etags: bool,
    pub limits: SelectionLimits,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            max_concurrency: 10,
            retry: RetryPolicy::default(),
            verify_etags: false,
            limits: SelectionLimits::default(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl UploaderConfig {
    pub fn validate(&self) -> UploadResult<()> {
        if self.part_size == 0 {
            return Err(UploadError::InvalidConfig("part size must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(UploadError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(UploadError::InvalidConfig(
                "at least one attempt per part is required".into(),
            ));
        }
        if self.limits.max_files == 0 {
            return Err(UploadError::InvalidConfig(
                "at least one file per transfer must be allowed".into(),
            ));
        }
        Ok(())
    }

    /// HTTP client shared by the backend and storage calls.
    pub fn http_client(&self) -> UploadResult<Client> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(UploadError::HttpClient)
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Upload files as a share-link transfer")]
pub struct Args {
    /// Files to send
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// GraphQL endpoint (overrides TRANSFER_API_URL)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bearer token (overrides TRANSFER_API_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Part size in MiB, at least 5 (overrides TRANSFER_PART_SIZE_MB)
    #[arg(long)]
    pub part_size_mb: Option<u64>,

    /// Parts uploaded in parallel (overrides TRANSFER_CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Attempts per part, 1 disables retries (overrides TRANSFER_MAX_ATTEMPTS)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Request timeout in seconds (overrides TRANSFER_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Check MD5 ETags against the uploaded bytes
    #[arg(long)]
    pub verify_etags: bool,

    /// Force the MIME type of every file
    #[arg(long)]
    pub mime_type: Option<String>,

    /// Days before the link expires
    #[arg(long, default_value_t = 7)]
    pub expiry_days: u32,

    /// Message shown to the recipient
    #[arg(long, default_value = "")]
    pub message: String,

    /// Recipient email address
    #[arg(long)]
    pub recipient_email: Option<String>,

    /// Require payment before download
    #[arg(long)]
    pub require_payment: bool,

    /// Payment amount
    #[arg(long, default_value_t = 0.0)]
    pub amount: f64,

    /// Payment currency (EUR, USD, GBP)
    #[arg(long, default_value = "EUR")]
    pub currency: String,

    /// Get notified on each download
    #[arg(long)]
    pub notify_on_download: bool,

    /// Protect the link with a password
    #[arg(long)]
    pub password: Option<String>,

    /// Disable file previews
    #[arg(long)]
    pub no_preview: bool,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub files: Vec<PathBuf>,
    pub mime_type: Option<String>,
    pub uploader: UploaderConfig,
    pub options: TransferOptions,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge `args` over the values found through `lookup`; CLI wins.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_endpoint = lookup("TRANSFER_API_URL")
            .unwrap_or_else(|| "http://localhost:4000/graphql".into());
        let env_token = lookup("TRANSFER_API_TOKEN");
        let env_part_size: u64 = parse_env(&lookup, "TRANSFER_PART_SIZE_MB", 50)?;
        let env_concurrency: usize = parse_env(&lookup, "TRANSFER_CONCURRENCY", 10)?;
        let env_attempts: u32 = parse_env(&lookup, "TRANSFER_MAX_ATTEMPTS", 3)?;
        let env_timeout: u64 = parse_env(&lookup, "TRANSFER_REQUEST_TIMEOUT_SECS", 300)?;

        let part_size_mb = args.part_size_mb.unwrap_or(env_part_size);
        let part_size = part_size_mb
            .checked_mul(MIB)
            .with_context(|| format!("part size of {} MiB is too large", part_size_mb))?;
        if part_size < MIN_PART_SIZE {
            anyhow::bail!("part size must be at least {} MiB", MIN_PART_SIZE / MIB);
        }

        let uploader = UploaderConfig {
            part_size,
            max_concurrency: args.concurrency.unwrap_or(env_concurrency),
            retry: RetryPolicy {
                max_attempts: args.max_attempts.unwrap_or(env_attempts),
                ..RetryPolicy::default()
            },
            verify_etags: args.verify_etags,
            request_timeout: Duration::from_secs(args.request_timeout_secs.unwrap_or(env_timeout)),
            ..UploaderConfig::default()
        };
        uploader.validate()?;

        let options = TransferOptions {
            expiry_days: args.expiry_days,
            is_payment_required: args.require_payment,
            payment_amount: args.amount,
            payment_currency: args.currency,
            recipient_email: args.recipient_email,
            message: args.message,
            notify_on_download: args.notify_on_download,
            password_protected: args.password.is_some(),
            password: args.password,
            allow_preview: !args.no_preview,
        }
        .normalized()?;

        Ok(Self {
            endpoint: args.endpoint.unwrap_or(env_endpoint),
            token: args.token.or(env_token).filter(|t| !t.is_empty()),
            files: args.files,
            mime_type: args.mime_type,
            uploader,
            options,
        })
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}
