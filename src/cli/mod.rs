pub mod args;
pub mod meetings;

pub use args::{Cli, CliCommand};
pub use meetings::{
    handle_meetings_command, handle_retry_command, handle_stale_command, handle_status_command,
};
