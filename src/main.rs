use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use baton::batch::run_batch;
use baton::cli::{Cli, Commands, StateAction};
use baton::config;
use baton::hooks;
use baton::session::{SessionHandle, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr; stdout carries only JSON for the caller.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = config::load_config(&cli)?;
    tracing::debug!(
        workspace = %config.workspace.display(),
        state = %config.state_path.display(),
        "Config loaded"
    );

    let session = SessionHandle::spawn(StateStore::from_config(&config));

    match cli.command {
        Commands::Batch { request, .. } => {
            tracing::info!(
                worker = %config.worker.display(),
                deadline_secs = config.deadline_secs,
                "Starting batch"
            );
            let report = run_batch(&config, &request, Some(&session))
                .await
                .context("Batch failed")?;

            println!("{}", serde_json::to_string(&report.summary())?);
            if report.succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Hook { kind } => {
            let output = hooks::run(kind, &config, session).await;
            if let Some(diagnostic) = &output.diagnostic {
                eprintln!("{diagnostic}");
            }
            println!("{}", output.stdout);
            Ok(ExitCode::from(output.exit_code))
        }
        Commands::State { action } => {
            let state = match action {
                StateAction::Show => session.snapshot().await?,
                StateAction::Reset => {
                    let ended = session.end_session(config.archive_dir.clone()).await?;
                    tracing::info!(session_id = %ended.session_id, "Session archived and reset");
                    session.snapshot().await?
                }
            };
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
