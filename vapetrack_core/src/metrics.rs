//! Derived metrics computed from the profile and event history.
//!
//! Everything here is a pure function of `(profile, events, now)`. The
//! local calendar day of an event is its timestamp viewed in the UTC offset
//! of `now`.

use crate::types::{Event, JuicePurchase, UserProfile, UserType};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;

/// Puffs one mL of e-liquid produces, for nicotine and cost math
pub const PUFFS_PER_ML: f64 = 150.0;
/// Nicotine (mg) absorbed from one cigarette
pub const ABSORBED_NICOTINE_PER_CIGARETTE: f64 = 2.0;
/// Fraction of vaped nicotine that is absorbed
pub const VAPE_ABSORPTION_RATE: f64 = 0.5;
/// Strength assumed when the device has none recorded
pub const DEFAULT_NICOTINE_MG_PER_ML: f64 = 20.0;

const DEFAULT_PACK_SIZE: u32 = 20;
const DEFAULT_DEVICE_SIZE_ML: f64 = 2.0;
const DEFAULT_DEVICE_COST: f64 = 15.0;

/// Puffs that deliver the nicotine of one cigarette
///
/// `round(2 / ((N / 150) * 0.5))`, never below 1.
pub fn puffs_per_cigarette(nicotine: Option<f64>) -> u32 {
    let strength = match nicotine {
        Some(n) if n > 0.0 && n.is_finite() => n,
        _ => DEFAULT_NICOTINE_MG_PER_ML,
    };
    let absorbed_per_puff = (strength / PUFFS_PER_ML) * VAPE_ABSORPTION_RATE;
    let puffs = (ABSORBED_NICOTINE_PER_CIGARETTE / absorbed_per_puff).round();
    (puffs as u32).max(1)
}

/// Daily puff allowance the user measures against
pub fn daily_baseline(profile: &UserProfile) -> u32 {
    match profile.user_type {
        UserType::FormerSmoker => profile
            .cigarettes_per_day
            .saturating_mul(puffs_per_cigarette(profile.device_nicotine())),
        UserType::CurrentVaper => profile.daily_puff_goal,
    }
}

/// `100 * count / baseline`, or `None` when there is no baseline
pub fn percent_of_baseline(count: usize, baseline: u32) -> Option<f64> {
    if baseline == 0 {
        return None;
    }
    Some(count as f64 * 100.0 / baseline as f64)
}

/// Local calendar day of an event, in the given offset
pub fn local_day(event: &Event, offset: &FixedOffset) -> NaiveDate {
    event.timestamp.with_timezone(offset).date_naive()
}

/// Number of events on a local calendar day
pub fn events_on(events: &[Event], day: NaiveDate, offset: &FixedOffset) -> usize {
    events.iter().filter(|e| local_day(e, offset) == day).count()
}

/// Today's usage against the baseline
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyProgress {
    pub puffs: usize,
    pub baseline: u32,
    /// Rounded percentage of baseline; `None` when the baseline is zero
    pub percentage: Option<u32>,
    pub remaining: u32,
    pub cigarettes_equivalent: f64,
    pub over_limit: bool,
}

pub fn daily_progress(
    profile: &UserProfile,
    events: &[Event],
    now: DateTime<FixedOffset>,
) -> DailyProgress {
    let puffs = events_on(events, now.date_naive(), now.offset());
    let baseline = daily_baseline(profile);
    let ppc = puffs_per_cigarette(profile.device_nicotine());
    let percent = percent_of_baseline(puffs, baseline);

    DailyProgress {
        puffs,
        baseline,
        percentage: percent.map(|p| p.round() as u32),
        remaining: baseline.saturating_sub(puffs.min(u32::MAX as usize) as u32),
        cigarettes_equivalent: puffs as f64 / ppc as f64,
        over_limit: percent.map_or(true, |p| p >= 100.0),
    }
}

/// Money saved versus the old smoking habit
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostSavings {
    pub days_since_onboarding: f64,
    pub daily_smoking_cost: f64,
    pub projected_cost: f64,
    pub actual_vaping_cost: f64,
    pub net_savings: f64,
    pub cigarettes_avoided: f64,
}

/// Savings since onboarding; `None` until the user has onboarded
pub fn cost_savings(
    profile: &UserProfile,
    events: &[Event],
    now: DateTime<FixedOffset>,
) -> Option<CostSavings> {
    let onboarded_at = profile.onboarded_at?;

    let elapsed_ms = (now.with_timezone(&chrono::Utc) - onboarded_at).num_milliseconds();
    let days = (elapsed_ms as f64 / Duration::days(1).num_milliseconds() as f64).max(0.0);

    let pack_size = match profile.cigarettes_per_pack {
        0 => DEFAULT_PACK_SIZE,
        n => n,
    };
    let daily_smoking_cost =
        profile.cigarettes_per_day as f64 / pack_size as f64 * profile.pack_cost;

    let (size, cost) = device_size_and_cost(profile);
    let cost_per_puff = cost / (size * PUFFS_PER_ML);

    let projected_cost = days * daily_smoking_cost;
    let actual_vaping_cost = events.len() as f64 * cost_per_puff;

    Some(CostSavings {
        days_since_onboarding: days,
        daily_smoking_cost,
        projected_cost,
        actual_vaping_cost,
        net_savings: projected_cost - actual_vaping_cost,
        cigarettes_avoided: days * profile.cigarettes_per_day as f64,
    })
}

fn device_size_and_cost(profile: &UserProfile) -> (f64, f64) {
    let positive = |v: f64, fallback: f64| if v > 0.0 && v.is_finite() { v } else { fallback };
    match &profile.current_vape {
        Some(device) => (
            positive(device.size, DEFAULT_DEVICE_SIZE_ML),
            positive(device.cost, DEFAULT_DEVICE_COST),
        ),
        None => (DEFAULT_DEVICE_SIZE_ML, DEFAULT_DEVICE_COST),
    }
}

/// One bar of the weekly chart
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrendDay {
    pub date: NaiveDate,
    /// Short weekday name, e.g. "Mon"
    pub label: String,
    pub puffs: usize,
    /// Cigarette equivalents for former smokers, puffs for vapers
    pub value: f64,
    pub percentage: Option<u32>,
    pub above_limit: bool,
}

/// The trailing seven local days, oldest first, ending today
pub fn weekly_trend(
    profile: &UserProfile,
    events: &[Event],
    now: DateTime<FixedOffset>,
) -> Vec<TrendDay> {
    let offset = now.offset();
    let today = now.date_naive();
    let ppc = puffs_per_cigarette(profile.device_nicotine());
    let is_former_smoker = profile.user_type == UserType::FormerSmoker;
    let limit = if is_former_smoker {
        profile.cigarettes_per_day
    } else {
        profile.daily_puff_goal
    };

    (0..7)
        .rev()
        .map(|days_back| {
            let date = today - Duration::days(days_back);
            let puffs = events_on(events, date, offset);
            let value = if is_former_smoker {
                puffs as f64 / ppc as f64
            } else {
                puffs as f64
            };
            let percentage = if limit == 0 {
                None
            } else {
                Some((value / limit as f64 * 100.0).round() as u32)
            };

            TrendDay {
                date,
                label: date.format("%a").to_string(),
                puffs,
                value,
                percentage,
                above_limit: value > limit as f64,
            }
        })
        .collect()
}

/// Mean puffs per distinct local day with activity
pub fn daily_average(events: &[Event], offset: &FixedOffset) -> u64 {
    if events.is_empty() {
        return 0;
    }
    let days: HashSet<NaiveDate> = events.iter().map(|e| local_day(e, offset)).collect();
    (events.len() as f64 / days.len().max(1) as f64).round() as u64
}

/// Bottle consumption statistics
#[derive(Clone, Debug, PartialEq)]
pub struct JuiceStats {
    pub purchases: usize,
    pub average_puffs_per_bottle: Option<u64>,
    /// Mean gap between consecutive purchases (needs two purchases)
    pub average_interval: Option<Duration>,
}

pub fn juice_stats(purchases: &[JuicePurchase]) -> JuiceStats {
    let average_puffs_per_bottle = if purchases.is_empty() {
        None
    } else {
        let total: u64 = purchases.iter().map(|p| p.puffs_since_last).sum();
        Some((total as f64 / purchases.len() as f64).round() as u64)
    };

    let average_interval = match (purchases.first(), purchases.last()) {
        (Some(first), Some(last)) if purchases.len() >= 2 => {
            let span = last.timestamp - first.timestamp;
            Some(span / (purchases.len() as i32 - 1))
        }
        _ => None,
    };

    JuiceStats {
        purchases: purchases.len(),
        average_puffs_per_bottle,
        average_interval,
    }
}

/// Display level for an XP balance, starting at 1
pub fn level(xp: u64) -> u64 {
    xp / 1000 + 1
}

/// Weekday of a date, e.g. "Monday"
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}
