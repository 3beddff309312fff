use anyhow::{Context, Result};
use std::time::Instant;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use transfer_uploader::{
    AppConfig, EtaEstimator, GraphqlBackend, PartUploader, ProgressEvent, ProgressReporter,
    TransferService, UploadCoordinator, models::transfer::format_size,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env_and_args()?;
    tracing::debug!("Starting transfer-uploader with config: {:?}", cfg.uploader);

    // --- Wire the pipeline ---
    let client = cfg.uploader.http_client()?;
    let backend = GraphqlBackend::new(client.clone(), cfg.endpoint.clone(), cfg.token.clone());
    let uploader = PartUploader::new(client, cfg.uploader.retry, cfg.uploader.verify_etags);
    let service = TransferService::new(UploadCoordinator::new(
        backend,
        uploader,
        cfg.uploader.clone(),
    ));

    let mut files = service.select_files(&cfg.files).await;
    if let Some(mime_type) = &cfg.mime_type {
        files = files
            .into_iter()
            .map(|f| f.with_mime_type(mime_type.clone()))
            .collect();
    }

    // --- Ctrl-C cancels the running transfer ---
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling transfer");
            on_signal.cancel();
        }
    });

    let mut progress = ProgressReporter::default();
    let logger = tokio::spawn(log_progress(progress.subscribe()));

    let result = service
        .create_transfer(&files, &cfg.options, &mut progress, &cancel)
        .await;

    // Closing the channel ends the logger.
    drop(progress);
    let _ = logger.await;

    let result = result.context("transfer failed")?;
    println!("Share link: {}", result.share_link);
    println!("Access key: {}", result.access_key);
    println!("Status:     {}", result.status);
    println!("Files:      {}", result.files.len());
    println!("Total size: {}", format_size(result.total_size));
    if let Some(expiry) = &result.expiry_date {
        println!("Expires:    {}", expiry);
    }

    Ok(())
}

async fn log_progress(mut rx: Receiver<ProgressEvent>) {
    let mut eta = EtaEstimator::new(Instant::now());
    loop {
        match rx.recv().await {
            Ok(event) => {
                eta.observe(&event, Instant::now());
                match &event {
                    ProgressEvent::FileStarted {
                        file_name,
                        file_size,
                        total_parts,
                        ..
                    } => tracing::info!(
                        "Uploading {} ({}, {} parts)",
                        file_name,
                        format_size(*file_size),
                        total_parts
                    ),
                    ProgressEvent::PartCompleted {
                        percent,
                        bytes_uploaded,
                        total_bytes,
                        ..
                    } => tracing::info!(
                        "{:5.1}%  {}/{}  eta {}",
                        percent,
                        format_size(*bytes_uploaded),
                        format_size(*total_bytes),
                        eta.remaining()
                            .map(|d| format!("{}s", d.as_secs()))
                            .unwrap_or_else(|| "?".into())
                    ),
                    ProgressEvent::StateChanged { state, .. } => {
                        tracing::debug!("Upload state: {:?}", state)
                    }
                    _ => {}
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Progress logger skipped {} events", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}
