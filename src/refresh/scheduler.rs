//! Scheduled refresh trigger.
//!
//! Runs the coordinator on a cron schedule (default: Mondays at 04:00 local
//! time, the traditional database publication slot). Manual triggers go
//! through the same coordinator and therefore the same single-flight guard.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use super::RefreshCoordinator;

/// Parses a refresh schedule.
///
/// Accepts the standard 5-field cron form (`min hour dom month dow`); a
/// seconds field is prepended internally because the parser wants one. Full
/// 6/7-field expressions pass through untouched.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized)
        .with_context(|| format!("Invalid refresh schedule: {:?}", expr))
}

/// Runs refresh cycles on `schedule` until `cancel` fires.
///
/// Cycle failures are logged and the loop keeps going: a failed refresh
/// means serving stale data, never stopping the scheduler.
pub async fn run_scheduler(
    coordinator: Arc<RefreshCoordinator>,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    loop {
        let Some(next) = schedule.upcoming(Local).next() else {
            log::warn!("Refresh schedule has no upcoming fire times; scheduler stopping");
            return;
        };

        let delay = (next - Local::now())
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        log::info!("Next database refresh scheduled for {}", next);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                match coordinator.run_cycle().await {
                    Ok(summary) => {
                        log::info!(
                            "Scheduled refresh succeeded: {}/{} databases updated",
                            summary.succeeded(),
                            summary.outcomes.len()
                        );
                    }
                    Err(e) => {
                        log::error!("Scheduled refresh failed: {}", e);
                    }
                }
            }
            _ = cancel.cancelled() => {
                log::info!("Refresh scheduler stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_five_field_schedule() {
        let schedule = parse_schedule("0 4 * * Mon").expect("valid schedule");
        let next = schedule.upcoming(Local).next().expect("upcoming fire time");
        assert_eq!(next.hour(), 4);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn test_parse_default_schedule() {
        assert!(parse_schedule(crate::config::DEFAULT_REFRESH_SCHEDULE).is_ok());
    }

    #[test]
    fn test_parse_six_field_passthrough() {
        assert!(parse_schedule("30 0 4 * * Mon").is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_schedule("not a schedule").is_err());
        assert!(parse_schedule("90 4 * * Mon").is_err());
    }
}
