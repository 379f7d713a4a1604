//! Chunkferry
//!
//! Command-line front end for resumable chunked uploads.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunkferry::config::Config;
use chunkferry::{
    Credential, DownloadOutcome, LedgerClient, StagingStore, TransferId, UploadOutcome, Uploader,
};

#[derive(Parser, Debug)]
#[command(name = "chunkferry", version, about = "Resumable chunked file uploads")]
struct Cli {
    /// Ledger base URL (overrides LEDGER_BASE_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Credential token (overrides LEDGER_CSRF_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file as a new transfer
    Upload {
        path: PathBuf,
    },
    /// Resume an interrupted transfer
    Resume {
        transfer_id: TransferId,
        /// Original file, needed when nothing is staged locally
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Download the assembled file
    Download {
        transfer_id: TransferId,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// List transfers with locally staged chunks
    Pending,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "chunkferry=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    if let Some(server) = cli.server {
        config.ledger.base_url = server;
    }
    if let Some(token) = cli.token {
        config.ledger.csrf_token = token;
    }

    tracing::debug!(
        ledger = %config.ledger.base_url,
        staging = %config.staging.database_url,
        total_chunks = config.upload.total_chunks,
        "Configuration loaded"
    );

    let ledger = LedgerClient::new(&config.ledger.base_url, config.timeout())
        .context("Failed to initialize ledger client")?;
    let staging = StagingStore::connect(config.staging.database_url.clone())
        .await
        .context("Failed to open staging store")?;

    let uploader = Uploader::new(Arc::new(ledger), Arc::new(staging), config.session_config())
        .with_progress(Arc::new(|done: u32, total: u32| {
            tracing::info!("Uploaded {}/{} chunks", done, total);
        }));
    let credential = Credential::new(config.ledger.csrf_token.clone());

    let outcome = match cli.command {
        Command::Upload { path } => uploader.upload_path(&path, &credential, None).await,
        Command::Resume { transfer_id, file } => match file {
            Some(path) => uploader.upload_path(&path, &credential, Some(transfer_id)).await,
            None => uploader.resume_upload(transfer_id, None, &credential).await,
        },
        Command::Download { transfer_id, out } => {
            return Ok(match uploader.download(transfer_id, &out).await {
                DownloadOutcome::Saved { path, bytes } => {
                    println!("Saved {} ({} bytes)", path.display(), bytes);
                    ExitCode::SUCCESS
                }
                DownloadOutcome::Failed { reason } => {
                    eprintln!("Download failed: {}", reason);
                    ExitCode::FAILURE
                }
            });
        }
        Command::Pending => {
            let pending = uploader.pending().await.context("Failed to read staging store")?;
            if pending.is_empty() {
                println!("No paused transfers");
            }
            for transfer in pending {
                println!(
                    "{}\t{}\t{} staged chunks",
                    transfer.transfer_id, transfer.file_name, transfer.staged_chunks
                );
            }
            return Ok(ExitCode::SUCCESS);
        }
    };

    Ok(report(outcome))
}

fn report(outcome: UploadOutcome) -> ExitCode {
    match outcome {
        UploadOutcome::Completed(summary) => {
            println!(
                "File uploaded successfully (transfer {}, {} chunks sent)",
                summary.transfer_id, summary.chunks_sent
            );
            ExitCode::SUCCESS
        }
        UploadOutcome::Paused { transfer_id, next_chunk, staged } => {
            eprintln!(
                "Upload paused at chunk {} ({} chunks staged). Resume with: chunkferry resume {}",
                next_chunk, staged, transfer_id
            );
            ExitCode::from(2)
        }
        UploadOutcome::Failed { transfer_id, reason } => {
            match transfer_id {
                Some(id) => eprintln!("Upload of transfer {} failed: {}", id, reason),
                None => eprintln!("Upload failed: {}", reason),
            }
            ExitCode::FAILURE
        }
    }
}
