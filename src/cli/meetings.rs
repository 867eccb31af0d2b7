use crate::config::Config;
use crate::db::{MeetingRecord, MeetingRepository, Store};
use crate::dispatch::{dispatch_all, AutomationClient};
use crate::pipeline::{PipelineError, ProcessingCoordinator, Step};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use uuid::Uuid;

use super::args::{MeetingsCliArgs, RetryCliArgs, StaleCliArgs, StatusCliArgs};

fn open_coordinator(config: &Config) -> Result<ProcessingCoordinator> {
    let store = Arc::new(Store::open_default()?);
    Ok(ProcessingCoordinator::new(store).with_public_base_url(config.server.base_url.clone()))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("{:?} is not a meeting id", raw))
}

fn status_line(meeting: &MeetingRecord) -> String {
    Step::ALL
        .iter()
        .map(|step| format!("{}={}", step, meeting.statuses.get(*step)))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn handle_meetings_command(args: MeetingsCliArgs) -> Result<()> {
    let store = Store::open_default()?;
    let org = args.organization.as_deref();

    let (meetings, total) = store.with_conn(|conn| {
        let meetings = MeetingRepository::list(conn, org, args.limit, args.offset)?;
        let total = MeetingRepository::count(conn, org)?;
        Ok::<_, crate::db::StoreError>((meetings, total))
    })?;

    if meetings.is_empty() {
        println!("No meetings found.");
        return Ok(());
    }

    println!("Showing {} of {} meeting(s):\n", meetings.len(), total);
    for meeting in meetings {
        println!(
            "{}  {}  {}\n    {}\n",
            meeting.id,
            meeting.meeting_code,
            meeting.title,
            status_line(&meeting)
        );
    }

    Ok(())
}

pub fn handle_status_command(args: StatusCliArgs) -> Result<()> {
    let config = Config::load()?;
    let coordinator = open_coordinator(&config)?;
    let detail = coordinator.meeting_detail(parse_id(&args.id)?)?;
    let meeting = &detail.meeting;

    println!("{} ({})", meeting.title, meeting.meeting_code);
    println!("Organization: {}", meeting.organization_id);
    if let Some(external) = &meeting.external_meeting_ref {
        println!("Imported from: {}", external);
    }
    println!("Steps: {}", status_line(meeting));

    if let Some(post) = &detail.blog_post {
        println!("Blog post: {} [{}]", post.title, post.status);
    }
    for social in &detail.social_posts {
        println!(
            "Social post: {} [{}] platforms: {}",
            social.platform,
            social.status,
            social.platforms.join(", ")
        );
    }

    println!("\nLog:");
    for entry in &detail.logs {
        let error = entry
            .error_message
            .as_deref()
            .map(|e| format!(" ({})", e))
            .unwrap_or_default();
        println!("  {}  {:<14} {}{}", entry.started_at, entry.step.as_str(), entry.status, error);
    }

    Ok(())
}

pub async fn handle_retry_command(args: RetryCliArgs) -> Result<()> {
    let config = Config::load()?;
    let coordinator = open_coordinator(&config)?;
    let id = parse_id(&args.id)?;
    let step = Step::parse(&args.step)?;

    let applied = match coordinator.retry(id, step) {
        Ok(applied) => applied,
        Err(e @ PipelineError::IllegalTransition { .. }) => {
            return Err(anyhow!("{} cannot be retried right now: {}", step, e));
        }
        Err(e) => return Err(e.into()),
    };

    let client = AutomationClient::new(config.automation.clone())?;
    let delivered = dispatch_all(&client, &applied.actions).await;

    println!(
        "{} for meeting {}: {} -> {} ({} of {} request(s) sent)",
        step,
        id,
        applied.from,
        applied.to,
        delivered,
        applied.actions.len()
    );
    Ok(())
}

pub fn handle_stale_command(args: StaleCliArgs) -> Result<()> {
    let config = Config::load()?;
    let minutes = args.minutes.unwrap_or(config.pipeline.stale_after_minutes);
    let coordinator = open_coordinator(&config)?;

    let stale = coordinator.stale_steps(chrono::Duration::minutes(minutes))?;
    if stale.is_empty() {
        println!("No steps in progress for more than {} minute(s).", minutes);
        return Ok(());
    }

    println!("{} stale step(s):\n", stale.len());
    for entry in stale {
        println!(
            "  {}  {:<14} since {}",
            entry.meeting_id,
            entry.step.as_str(),
            entry.in_progress_since
        );
    }
    println!("\nRestart with: postmeet retry <meeting-id> <step>");

    Ok(())
}
