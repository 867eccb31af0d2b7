use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "postmeet")]
#[command(about = "Turn meeting recordings into blog and social posts", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the HTTP service (default)
    Serve,
    /// List meetings and their step statuses
    Meetings(MeetingsCliArgs),
    /// Show one meeting with its processing log
    Status(StatusCliArgs),
    /// Restart a failed or stuck step and re-send its request
    Retry(RetryCliArgs),
    /// List steps stuck in progress
    Stale(StaleCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct MeetingsCliArgs {
    /// Only show meetings of this organization
    #[arg(short, long)]
    pub organization: Option<String>,
    /// Maximum number of results to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
    /// Number of meetings to skip
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

#[derive(ClapArgs, Debug)]
pub struct StatusCliArgs {
    /// Meeting id
    pub id: String,
}

#[derive(ClapArgs, Debug)]
pub struct RetryCliArgs {
    /// Meeting id
    pub id: String,
    /// Step to retry: transcription, blog, poster or facebook_post
    pub step: String,
}

#[derive(ClapArgs, Debug)]
pub struct StaleCliArgs {
    /// Threshold in minutes (default: pipeline.stale_after_minutes)
    #[arg(short, long)]
    pub minutes: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry() {
        let cli = Cli::try_parse_from(["postmeet", "retry", "abc", "blog", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(CliCommand::Retry(args)) => {
                assert_eq!(args.id, "abc");
                assert_eq!(args.step, "blog");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["postmeet"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_stale_minutes() {
        let cli = Cli::try_parse_from(["postmeet", "stale", "--minutes", "15"]).unwrap();
        match cli.command {
            Some(CliCommand::Stale(args)) => assert_eq!(args.minutes, Some(15)),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
