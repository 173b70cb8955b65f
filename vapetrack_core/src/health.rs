//! Recovery milestones measured from the last puff.

use crate::types::{Event, UserProfile};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Milestone {
    pub title: &'static str,
    /// Human label for the threshold, e.g. "2 Weeks"
    pub label: &'static str,
    minutes: i64,
}

impl Milestone {
    /// Time without a puff needed to unlock
    pub fn after(&self) -> Duration {
        Duration::minutes(self.minutes)
    }
}

const fn milestone(title: &'static str, label: &'static str, minutes: i64) -> Milestone {
    Milestone {
        title,
        label,
        minutes,
    }
}

const HOUR: i64 = 60;
const DAY: i64 = 24 * HOUR;

pub const MILESTONES: [Milestone; 10] = [
    milestone("Heart Rate Normalizes", "20 Minutes", 20),
    milestone("CO Levels Drop", "12 Hours", 12 * HOUR),
    milestone("Nicotine Clears", "48 Hours", 48 * HOUR),
    milestone("Taste & Smell Improve", "48 Hours", 48 * HOUR),
    milestone("Breathing Improves", "3 Days", 72 * HOUR),
    milestone("Circulation Improves", "2 Weeks", 14 * DAY),
    milestone("Withdrawal Gone", "1 Month", 30 * DAY),
    milestone("Lung Function +10%", "3 Months", 90 * DAY),
    milestone("Lungs Healed", "9 Months", 270 * DAY),
    milestone("Heart Disease Risk Halved", "1 Year", 365 * DAY),
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MilestoneStatus {
    pub title: &'static str,
    pub label: &'static str,
    pub unlocked: bool,
    /// Seconds left until unlock, 0 once unlocked
    pub remaining_seconds: i64,
}

/// Instant the recovery clock runs from
///
/// The last event, else the onboarding time, else `now`.
pub fn reference_time(profile: &UserProfile, events: &[Event], now: DateTime<Utc>) -> DateTime<Utc> {
    events
        .last()
        .map(|e| e.timestamp)
        .or(profile.onboarded_at)
        .unwrap_or(now)
}

/// Time since the last puff, never negative
pub fn time_since_last_puff(profile: &UserProfile, events: &[Event], now: DateTime<Utc>) -> Duration {
    (now - reference_time(profile, events, now)).max(Duration::zero())
}

pub fn timeline(profile: &UserProfile, events: &[Event], now: DateTime<Utc>) -> Vec<MilestoneStatus> {
    let elapsed = time_since_last_puff(profile, events, now);
    MILESTONES
        .iter()
        .map(|m| MilestoneStatus {
            title: m.title,
            label: m.label,
            unlocked: elapsed >= m.after(),
            remaining_seconds: (m.after() - elapsed).num_seconds().max(0),
        })
        .collect()
}

/// `"<h>h <m>m <s>s"` with hours unbounded
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_reference_prefers_last_event() {
        let profile = UserProfile {
            onboarded_at: Some(ts("2025-01-01T00:00:00Z")),
            ..Default::default()
        };
        let events = vec![
            Event::at(ts("2025-06-01T08:00:00Z")),
            Event::at(ts("2025-06-01T09:00:00Z")),
        ];
        let now = ts("2025-06-01T10:00:00Z");

        assert_eq!(reference_time(&profile, &events, now), ts("2025-06-01T09:00:00Z"));
        assert_eq!(reference_time(&profile, &[], now), ts("2025-01-01T00:00:00Z"));
        assert_eq!(reference_time(&UserProfile::default(), &[], now), now);
    }

    #[test]
    fn test_timeline_unlocks_by_elapsed_time() {
        let events = vec![Event::at(ts("2025-06-01T00:00:00Z"))];
        let now = ts("2025-06-03T00:00:00Z");
        let statuses = timeline(&UserProfile::default(), &events, now);

        assert_eq!(statuses.len(), 10);
        let unlocked: Vec<_> = statuses.iter().filter(|s| s.unlocked).map(|s| s.title).collect();
        assert_eq!(
            unlocked,
            vec!["Heart Rate Normalizes", "CO Levels Drop", "Nicotine Clears", "Taste & Smell Improve"]
        );
        assert_eq!(statuses[4].remaining_seconds, 24 * 3600);
        assert_eq!(statuses[0].remaining_seconds, 0);
    }

    #[test]
    fn test_future_event_clamps_to_zero() {
        let events = vec![Event::at(ts("2025-06-02T00:00:00Z"))];
        let elapsed = time_since_last_puff(&UserProfile::default(), &events, ts("2025-06-01T00:00:00Z"));
        assert_eq!(elapsed, Duration::zero());
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::seconds(0)), "0h 0m 0s");
        assert_eq!(format_elapsed(Duration::seconds(90_061)), "25h 1m 1s");
    }
}
