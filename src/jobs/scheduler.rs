//! Cron-driven job ticker.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use cron::Schedule;

use crate::config::ScheduleConfig;
use crate::error::JobError;
use crate::jobs::{JobName, JobRegistry};

/// Cron expression configured for `job`.
pub fn expression_for(schedules: &ScheduleConfig, job: JobName) -> &str {
    match job {
        JobName::VetcareSync => &schedules.vetcare_sync,
        JobName::Vaccines => &schedules.vaccines,
        JobName::Financial => &schedules.financial,
        JobName::Grooming => &schedules.grooming,
        JobName::Appointments => &schedules.appointments,
        JobName::Satisfaction => &schedules.satisfaction,
    }
}

/// Parse a cron expression, accepting the classic five-field form by
/// prepending a zero seconds field.
pub fn parse_schedule(job: JobName, expr: &str) -> Result<Schedule, JobError> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| JobError::InvalidSchedule {
        job: job.to_string(),
        reason: format!("{expr:?}: {e}"),
    })
}

/// Next fire time after now in the local time zone.
pub fn next_fire(schedule: &Schedule) -> Option<DateTime<Local>> {
    schedule.upcoming(Local).next()
}

/// Start one ticker task per registered job.
///
/// Every expression is validated before anything is spawned. Run failures
/// (including "already running") are logged and the ticker keeps going.
pub fn spawn_scheduler(
    registry: Arc<JobRegistry>,
    schedules: &ScheduleConfig,
) -> Result<Vec<tokio::task::JoinHandle<()>>, JobError> {
    let parsed = registry
        .names()
        .map(|job| {
            let expr = expression_for(schedules, job);
            parse_schedule(job, expr).map(|schedule| (job, expr.to_string(), schedule))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let handles = parsed
        .into_iter()
        .map(|(job, expr, schedule)| {
            tracing::info!(job = %job, schedule = %expr, "Job scheduled");
            let registry = registry.clone();
            tokio::spawn(async move {
                loop {
                    let Some(next) = next_fire(&schedule) else {
                        tracing::warn!(job = %job, "Schedule has no future fire time, stopping");
                        break;
                    };
                    let wait = (next - Local::now()).to_std().unwrap_or_default();
                    tracing::debug!(job = %job, next = %next, "Waiting for next fire");
                    tokio::time::sleep(wait).await;

                    if let Err(e) = registry.run(job).await {
                        tracing::warn!(job = %job, error = %e, "Scheduled run did not start");
                    }
                }
            })
        })
        .collect();
    Ok(handles)
}
