use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::Config;
use crate::models::{member::Member, waiver::Waiver};
use crate::services::{
    email::{EmailClient, WaiverReminderEmail},
    waivers::{self, SignerRelationship, ADULT_AGE},
};

/// Days before expiry on which a reminder goes out
pub const REMINDER_DAYS: [i64; 2] = [30, 7];

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Default)]
pub struct ReminderStats {
    pub checked: usize,
    pub reminded: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Expiring { days_remaining: i64 },
    NeedsAdultWaiver,
}

/// Whether a member's latest waiver warrants a reminder today
pub fn reminder_due(
    signed_at: DateTime<Utc>,
    relationship: SignerRelationship,
    date_of_birth: NaiveDate,
    now: DateTime<Utc>,
) -> Option<ReminderKind> {
    let today = now.date_naive();
    // Leap-day birthdays roll over on March 1st in other years
    let turned_adult_today = relationship.is_guardian()
        && waivers::age_on(date_of_birth, today) == ADULT_AGE
        && today
            .checked_sub_days(Days::new(1))
            .is_some_and(|yesterday| waivers::age_on(date_of_birth, yesterday) == ADULT_AGE - 1);

    if turned_adult_today && waivers::is_waiver_valid(signed_at, now) {
        return Some(ReminderKind::NeedsAdultWaiver);
    }

    let days_remaining = waivers::days_until_expiry(signed_at, now);
    REMINDER_DAYS
        .contains(&days_remaining)
        .then_some(ReminderKind::Expiring { days_remaining })
}

/// Starts the daily waiver reminder scheduler
pub async fn start_scheduler(pool: PgPool, config: Config) -> Result<JobScheduler, JobError> {
    let scheduler = JobScheduler::new().await?;

    let job_pool = pool.clone();
    let job_config = config.clone();

    let job = Job::new_async(config.waiver_reminder_cron.as_str(), move |_uuid, _lock| {
        let pool = job_pool.clone();
        let config = job_config.clone();

        Box::pin(async move {
            let email_client = config.email_client();
            if let Err(e) = send_waiver_reminders(
                &pool,
                email_client.as_ref(),
                &config.gym_name,
                &config.base_url,
                Utc::now(),
            )
            .await
            {
                tracing::error!(error = %e, "Waiver reminder job failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(cron = %config.waiver_reminder_cron, "Waiver reminder scheduler started");

    Ok(scheduler)
}

/// Emails members whose waiver expires in 30 or 7 days, and members who
/// turned 18 today while covered by a guardian-signed waiver
pub async fn send_waiver_reminders(
    pool: &PgPool,
    email_client: Option<&EmailClient>,
    gym_name: &str,
    base_url: &str,
    now: DateTime<Utc>,
) -> Result<ReminderStats, JobError> {
    let mut stats = ReminderStats::default();

    let latest: HashMap<_, _> = Waiver::latest_for_training_members(pool)
        .await?
        .into_iter()
        .map(|w| (w.member_id, w))
        .collect();
    let members = Member::list_training(pool).await?;

    tracing::info!(members = members.len(), "Starting waiver reminder job");

    for member in members {
        stats.checked += 1;

        let Some(waiver) = latest.get(&member.id) else {
            continue;
        };
        let Some(kind) =
            reminder_due(waiver.signed_at, waiver.relationship(), member.date_of_birth, now)
        else {
            continue;
        };

        let Some(client) = email_client else {
            tracing::debug!(member_id = %member.id, "Email not configured, reminder skipped");
            continue;
        };

        let expires_on = waiver.expires_at.format("%B %-d, %Y").to_string();
        let renew_url = format!("{}/waiver?member={}", base_url.trim_end_matches('/'), member.id);
        let (days_remaining, needs_adult_waiver) = match kind {
            ReminderKind::Expiring { days_remaining } => (days_remaining, false),
            ReminderKind::NeedsAdultWaiver => {
                (waivers::days_until_expiry(waiver.signed_at, now), true)
            }
        };

        let subject = if needs_adult_waiver {
            format!("{}, please sign your own waiver", member.first_name)
        } else {
            format!("Your waiver expires in {} days", days_remaining)
        };

        let template = WaiverReminderEmail {
            gym_name,
            first_name: &member.first_name,
            expires_on: &expires_on,
            days_remaining,
            needs_adult_waiver,
            renew_url: &renew_url,
        };

        match client.send_template(&member.email, &subject, &template).await {
            Ok(_) => {
                stats.reminded += 1;
                tracing::info!(member_id = %member.id, ?kind, "Waiver reminder sent");
            }
            Err(e) => {
                stats.failures += 1;
                tracing::warn!(member_id = %member.id, error = %e, "Waiver reminder failed");
            }
        }
    }

    tracing::info!(?stats, "Waiver reminder job completed");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()
    }

    fn adult_dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()
    }

    fn signed_days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    #[test]
    fn test_reminds_at_thirty_and_seven_days() {
        assert_eq!(
            reminder_due(signed_days_ago(335), SignerRelationship::SelfSigned, adult_dob(), now()),
            Some(ReminderKind::Expiring { days_remaining: 30 })
        );
        assert_eq!(
            reminder_due(signed_days_ago(358), SignerRelationship::SelfSigned, adult_dob(), now()),
            Some(ReminderKind::Expiring { days_remaining: 7 })
        );
    }

    #[test]
    fn test_no_reminder_on_other_days() {
        for days_ago in [0, 100, 334, 336, 357, 359, 365, 400] {
            assert_eq!(
                reminder_due(
                    signed_days_ago(days_ago),
                    SignerRelationship::SelfSigned,
                    adult_dob(),
                    now()
                ),
                None,
                "signed {} days ago",
                days_ago
            );
        }
    }

    #[test]
    fn test_eighteenth_birthday_with_guardian_waiver() {
        let dob = NaiveDate::from_ymd_opt(2006, 6, 15).unwrap();
        assert_eq!(
            reminder_due(signed_days_ago(100), SignerRelationship::Parent, dob, now()),
            Some(ReminderKind::NeedsAdultWaiver)
        );

        // Self-signed waivers are unaffected
        assert_eq!(
            reminder_due(signed_days_ago(100), SignerRelationship::SelfSigned, dob, now()),
            None
        );
    }

    #[test]
    fn test_leap_day_birthday_reminded_in_common_year() {
        let dob = NaiveDate::from_ymd_opt(2008, 2, 29).unwrap();
        let march_first = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let signed_at = march_first - Duration::days(100);

        assert_eq!(
            reminder_due(signed_at, SignerRelationship::Guardian, dob, march_first),
            Some(ReminderKind::NeedsAdultWaiver)
        );

        let feb_28 = Utc.with_ymd_and_hms(2026, 2, 28, 9, 0, 0).unwrap();
        assert_eq!(
            reminder_due(signed_at, SignerRelationship::Guardian, dob, feb_28),
            None
        );
    }

    #[test]
    fn test_guardian_waiver_day_after_birthday_not_repeated() {
        let dob = NaiveDate::from_ymd_opt(2006, 6, 14).unwrap();
        assert_eq!(
            reminder_due(signed_days_ago(100), SignerRelationship::Guardian, dob, now()),
            None
        );
    }
}
