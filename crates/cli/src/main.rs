//! `cvflow` -- submit CV jobs and follow their progress from a terminal.
//!
//! `upload <file>` validates and uploads a CV, then follows the job's
//! progress socket until it completes or fails. `generate <prompt>` asks
//! the backend to build a CV from free text over the session channel.
//!
//! Configuration is read from the environment (and `.env`); see
//! [`CliConfig::from_env`].

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cvflow_cli::config::CliConfig;
use cvflow_cli::render;
use cvflow_progress::connector::ProgressSubscription;
use cvflow_progress::events::JobOutcome;
use cvflow_progress::session::CvSession;

#[derive(Parser)]
#[command(name = "cvflow")]
#[command(about = "Upload or generate CVs and follow processing progress")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Backend base URL (overrides `CVFLOW_API_URL`).
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a CV file and follow its processing job
    Upload {
        file: PathBuf,
        /// Manual reconnects allowed after automatic recovery gives up
        #[arg(long, default_value_t = 1)]
        retries: u32,
    },
    /// Generate a CV from a free-text description
    Generate {
        prompt: String,
        #[arg(long)]
        template: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cvflow_cli=info,cvflow_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = CliConfig::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }

    tracing::info!(
        api_url = %config.api_url,
        max_file_size_mb = config.constraints.max_file_size_mb,
        "Starting cvflow",
    );

    let mut session = CvSession::new(&config.api_url, config.constraints.clone())
        .with_upload_config(config.upload_connector())
        .with_chat_config(config.chat_connector());

    let result = match cli.command {
        Command::Upload { file, retries } => upload(&mut session, file, retries).await,
        Command::Generate { prompt, template } => {
            generate(&mut session, &prompt, template.as_deref()).await
        }
    };

    session.reset().await;
    result
}

async fn upload(session: &mut CvSession, file: PathBuf, retries: u32) -> anyhow::Result<()> {
    let subscription = session
        .start_upload(&file)
        .await
        .with_context(|| format!("Upload of {} failed", file.display()))?;
    println!("Job {} started", subscription.job_id());

    follow(subscription, retries).await
}

async fn generate(
    session: &mut CvSession,
    prompt: &str,
    template: Option<&str>,
) -> anyhow::Result<()> {
    println!("Generating CV (session {})...", session.session_id());
    let response = session
        .start_generation(prompt, template)
        .await
        .context("CV generation failed")?;

    if let Some(subscription) = session.active() {
        println!("{}", render::progress_line(&subscription.view()));
    }
    match (&response.pdf_filename, &response.pdf_url) {
        (Some(name), Some(url)) => println!("Generated {name}: {url}"),
        (None, Some(url)) => println!("Generated: {url}"),
        _ => println!("Generation finished without a PDF link"),
    }
    Ok(())
}

/// Print progress until the job reaches a terminal state.
async fn follow(subscription: &mut ProgressSubscription, mut retries: u32) -> anyhow::Result<()> {
    let mut state_rx = subscription.watch_state();
    let mut connection_rx = subscription.watch_connection();
    let mut last_line = String::new();

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                let line = render::progress_line(&state.view());
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
                if state.is_terminal() {
                    break;
                }
            }
            changed = connection_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let connection = connection_rx.borrow_and_update().clone();
                if let Some(line) = render::connection_line(&connection) {
                    eprintln!("{line}");
                }
                if connection.retry_available {
                    if retries == 0 {
                        bail!("Lost connection to job {}", subscription.job_id());
                    }
                    retries -= 1;
                    tracing::info!(job_id = subscription.job_id(), "Retrying progress connection");
                    subscription.retry();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(job_id = subscription.job_id(), "Interrupted");
                subscription.shutdown().await;
                break;
            }
        }
    }

    match subscription.outcome().await {
        JobOutcome::Completed(result) => {
            tracing::debug!(result = %result, "Job result");
            let view = subscription.view();
            if view.actions.is_empty() {
                println!("Done.");
            }
            for action in &view.actions {
                println!("{}", render::action_line(action));
            }
            Ok(())
        }
        JobOutcome::Failed(error) => bail!("Job failed: {error}"),
        JobOutcome::Cancelled => bail!("Job {} was cancelled", subscription.job_id()),
    }
}
