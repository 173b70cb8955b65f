//! XP and reward bookkeeping.
//!
//! This module implements the gamification rules:
//! - Daily XP: one grant per local day, scored on yesterday's usage
//! - Badges: unlocked once by cumulative puff count, never revoked
//! - Rewards: bought with XP, equipped per slot once owned

use crate::metrics::{daily_baseline, events_on, percent_of_baseline};
use crate::types::{Badge, RewardCategory, TrackerState};
use chrono::{DateTime, Duration, FixedOffset};

/// XP granted per percentage point under the baseline
pub const XP_PER_PERCENT_UNDER: f64 = 10.0;

/// XP earned for a day with `count` puffs against `baseline`
///
/// `round((100 - p) * 10)` where `p = 100 * count / baseline`, and 0 once
/// the day reaches the baseline. A zero baseline earns nothing.
pub fn daily_xp_award(count: usize, baseline: u32) -> u64 {
    match percent_of_baseline(count, baseline) {
        Some(p) if p < 100.0 => ((100.0 - p) * XP_PER_PERCENT_UNDER).round() as u64,
        _ => 0,
    }
}

/// Run the once-per-day XP evaluation
///
/// Returns `None` when today was already evaluated. Otherwise scores the
/// previous local day, credits the XP, marks today as evaluated and
/// returns the amount granted (possibly 0).
pub fn evaluate_daily_xp(state: &mut TrackerState, now: DateTime<FixedOffset>) -> Option<u64> {
    let today = now.date_naive();
    if state.last_xp_evaluation == Some(today) {
        return None;
    }

    let yesterday = today - Duration::days(1);
    let count = events_on(&state.events, yesterday, now.offset());
    let baseline = daily_baseline(&state.profile);
    let award = daily_xp_award(count, baseline);

    state.profile.xp = state.profile.xp.saturating_add(award);
    state.last_xp_evaluation = Some(today);

    tracing::info!(
        "Daily XP for {}: {} puffs against baseline {}, granted {} XP",
        yesterday,
        count,
        baseline,
        award
    );
    Some(award)
}

/// XP today would earn if the day ended now
pub fn projected_xp_today(state: &TrackerState, now: DateTime<FixedOffset>) -> u64 {
    let count = events_on(&state.events, now.date_naive(), now.offset());
    daily_xp_award(count, daily_baseline(&state.profile))
}

/// Unlock every badge whose threshold `event_count` has reached
///
/// Returns the badges unlocked by this call. Existing badges are kept.
pub fn unlock_badges(event_count: usize, badges: &mut Vec<Badge>) -> Vec<Badge> {
    let unlocked: Vec<Badge> = Badge::ALL
        .iter()
        .copied()
        .filter(|b| event_count >= b.threshold() && !badges.contains(b))
        .collect();

    for badge in &unlocked {
        tracing::info!("Badge unlocked: {}", badge.id());
    }
    badges.extend(unlocked.iter().copied());
    unlocked
}

/// Buy a reward with XP
///
/// Fails without side effects if the balance is short or the reward is
/// already owned.
pub fn purchase_reward(state: &mut TrackerState, id: &str, cost: u64) -> bool {
    if state.profile.xp < cost {
        tracing::debug!("Cannot buy {}: {} XP < {}", id, state.profile.xp, cost);
        return false;
    }
    if state.purchased_rewards.iter().any(|r| r == id) {
        tracing::debug!("Cannot buy {}: already owned", id);
        return false;
    }

    state.profile.xp -= cost;
    state.purchased_rewards.push(id.to_string());
    true
}

/// Equip an owned reward into a slot
pub fn equip_reward(state: &mut TrackerState, id: &str, category: RewardCategory) -> bool {
    if !state.purchased_rewards.iter().any(|r| r == id) {
        tracing::debug!("Cannot equip {}: not owned", id);
        return false;
    }
    *state.equipped_rewards.slot_mut(category) = Some(id.to_string());
    true
}

pub fn unequip_reward(state: &mut TrackerState, category: RewardCategory) {
    *state.equipped_rewards.slot_mut(category) = None;
}
