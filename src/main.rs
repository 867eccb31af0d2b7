use anyhow::Result;
use clap::Parser;
use postmeet::{
    app,
    cli::{
        handle_meetings_command, handle_retry_command, handle_stale_command, handle_status_command,
        Cli, CliCommand,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("postmeet {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Meetings(args)) => {
            handle_meetings_command(args)?;
            return Ok(());
        }
        Some(CliCommand::Status(args)) => {
            handle_status_command(args)?;
            return Ok(());
        }
        Some(CliCommand::Retry(args)) => {
            handle_retry_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Stale(args)) => {
            handle_stale_command(args)?;
            return Ok(());
        }
        Some(CliCommand::Serve) | None => {}
    }

    app::run_service().await
}
