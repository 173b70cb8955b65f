//! Core domain types for VapeTrack.
//!
//! This module defines the records the store owns:
//! - The user profile and its typed partial update
//! - Puff events and juice purchases
//! - Badges, rewards and the equip slots
//! - Remote session identity

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Profile Types
// ============================================================================

/// How the daily baseline is derived
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// Baseline comes from the old cigarette habit
    #[default]
    FormerSmoker,
    /// Baseline is an explicit daily puff goal
    CurrentVaper,
}

/// The vape device currently in use
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub name: String,
    /// Nicotine strength in mg/mL
    #[serde(default)]
    pub nicotine: f64,
    /// Reservoir size in mL
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default = "default_device_kind")]
    pub kind: String,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            name: String::new(),
            nicotine: 0.0,
            size: 0.0,
            cost: 0.0,
            kind: default_device_kind(),
        }
    }
}

fn default_device_kind() -> String {
    "Pod".into()
}

/// Singleton user profile
///
/// Field names serialize in camelCase so the document matches the `data`
/// column of the remote `profiles` table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub onboarded_at: Option<DateTime<Utc>>,
    pub user_type: UserType,
    pub cigarettes_per_day: u32,
    pub cigarettes_per_pack: u32,
    pub pack_cost: f64,
    pub daily_puff_goal: u32,
    pub current_vape: Option<Device>,
    /// Juice left in the reservoir, 0-100 percent
    pub juice_level: f64,
    /// Bottle size in mL
    pub bottle_size: f64,
    pub xp: u64,
    /// Set while a smoke-free streak is running
    pub smoke_free_start_time: Option<DateTime<Utc>>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "Guest User".into(),
            email: String::new(),
            onboarded_at: None,
            user_type: UserType::FormerSmoker,
            cigarettes_per_day: 10,
            cigarettes_per_pack: 20,
            pack_cost: 15.0,
            daily_puff_goal: 100,
            current_vape: None,
            juice_level: 100.0,
            bottle_size: 2.0,
            xp: 0,
            smoke_free_start_time: None,
        }
    }
}

impl UserProfile {
    pub fn is_smoke_free(&self) -> bool {
        self.smoke_free_start_time.is_some()
    }

    pub fn is_onboarded(&self) -> bool {
        self.onboarded_at.is_some()
    }

    /// Nicotine strength of the current device, if one is set
    pub fn device_nicotine(&self) -> Option<f64> {
        self.current_vape.as_ref().map(|d| d.nicotine)
    }
}

/// Typed partial update for [`UserProfile`]
///
/// Only fields that are `Some` are written.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub onboarded_at: Option<DateTime<Utc>>,
    pub user_type: Option<UserType>,
    pub cigarettes_per_day: Option<u32>,
    pub cigarettes_per_pack: Option<u32>,
    pub pack_cost: Option<f64>,
    pub daily_puff_goal: Option<u32>,
    pub current_vape: Option<Device>,
    pub juice_level: Option<f64>,
    pub bottle_size: Option<f64>,
    pub xp: Option<u64>,
    pub smoke_free_start_time: Option<DateTime<Utc>>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut UserProfile) {
        if let Some(v) = self.name {
            profile.name = v;
        }
        if let Some(v) = self.email {
            profile.email = v;
        }
        if let Some(v) = self.onboarded_at {
            profile.onboarded_at = Some(v);
        }
        if let Some(v) = self.user_type {
            profile.user_type = v;
        }
        if let Some(v) = self.cigarettes_per_day {
            profile.cigarettes_per_day = v;
        }
        if let Some(v) = self.cigarettes_per_pack {
            profile.cigarettes_per_pack = v;
        }
        if let Some(v) = self.pack_cost {
            profile.pack_cost = v;
        }
        if let Some(v) = self.daily_puff_goal {
            profile.daily_puff_goal = v;
        }
        if let Some(v) = self.current_vape {
            profile.current_vape = Some(v);
        }
        if let Some(v) = self.juice_level {
            profile.juice_level = v;
        }
        if let Some(v) = self.bottle_size {
            profile.bottle_size = v;
        }
        if let Some(v) = self.xp {
            profile.xp = v;
        }
        if let Some(v) = self.smoke_free_start_time {
            profile.smoke_free_start_time = Some(v);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// One logged puff
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }
}

/// A juice bottle replacement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JuicePurchase {
    /// Epoch milliseconds of the purchase, unique and increasing
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub puffs_since_last: u64,
}

// ============================================================================
// Gamification Types
// ============================================================================

/// Milestone badge, unlocked by cumulative puff count
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    FirstStep,
    CenturyClub,
}

impl Badge {
    pub const ALL: [Badge; 2] = [Badge::FirstStep, Badge::CenturyClub];

    /// Total event count at which the badge unlocks
    pub fn threshold(self) -> usize {
        match self {
            Badge::FirstStep => 1,
            Badge::CenturyClub => 100,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Badge::FirstStep => "first_step",
            Badge::CenturyClub => "century_club",
        }
    }
}

/// Equip slot a reward belongs to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    Icon,
    Border,
}

impl std::str::FromStr for RewardCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "icon" => Ok(RewardCategory::Icon),
            "border" => Ok(RewardCategory::Border),
            other => Err(crate::Error::Validation(format!(
                "unknown reward category: {}",
                other
            ))),
        }
    }
}

/// Cosmetic reward from the fixed catalog
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Reward {
    pub id: &'static str,
    pub name: &'static str,
    pub category: RewardCategory,
    pub cost: u64,
    pub description: &'static str,
}

/// Currently equipped reward per slot
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EquippedRewards {
    pub icon: Option<String>,
    pub border: Option<String>,
}

impl EquippedRewards {
    pub fn get(&self, category: RewardCategory) -> Option<&str> {
        match category {
            RewardCategory::Icon => self.icon.as_deref(),
            RewardCategory::Border => self.border.as_deref(),
        }
    }

    pub fn slot_mut(&mut self, category: RewardCategory) -> &mut Option<String> {
        match category {
            RewardCategory::Icon => &mut self.icon,
            RewardCategory::Border => &mut self.border,
        }
    }
}

// ============================================================================
// Tracker State
// ============================================================================

/// Everything the store owns and persists
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackerState {
    pub profile: UserProfile,
    pub events: Vec<Event>,
    pub badges: Vec<Badge>,
    pub juice_purchases: Vec<JuicePurchase>,
    pub purchased_rewards: Vec<String>,
    pub equipped_rewards: EquippedRewards,
    /// Local date of the last daily XP evaluation
    pub last_xp_evaluation: Option<NaiveDate>,
}

// ============================================================================
// Session Types
// ============================================================================

/// Authenticated remote identity
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account_id: String,
    pub email: String,
    pub access_token: String,
}

/// Where the store is in the sign-in flow
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated(Session),
    /// Signed up, waiting for the email confirmation; no session yet
    AwaitingConfirmation { email: String },
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let profile = UserProfile::default();
        assert_eq!(profile.name, "Guest User");
        assert_eq!(profile.cigarettes_per_day, 10);
        assert_eq!(profile.juice_level, 100.0);
        assert!(!profile.is_smoke_free());
        assert!(!profile.is_onboarded());
    }

    #[test]
    fn test_profile_update_only_touches_present_fields() {
        let mut profile = UserProfile::default();
        ProfileUpdate {
            cigarettes_per_day: Some(25),
            user_type: Some(UserType::CurrentVaper),
            ..Default::default()
        }
        .apply(&mut profile);

        assert_eq!(profile.cigarettes_per_day, 25);
        assert_eq!(profile.user_type, UserType::CurrentVaper);
        assert_eq!(profile.name, "Guest User");
        assert_eq!(profile.pack_cost, 15.0);
    }

    #[test]
    fn test_partial_remote_document_parses_as_update() {
        let doc = r#"{"name":"Sam","cigarettesPerDay":12,"userType":"current_vaper","unknown":1}"#;
        let update: ProfileUpdate = serde_json::from_str(doc).unwrap();
        assert_eq!(update.name.as_deref(), Some("Sam"));
        assert_eq!(update.cigarettes_per_day, Some(12));
        assert_eq!(update.user_type, Some(UserType::CurrentVaper));
        assert!(update.pack_cost.is_none());
    }

    #[test]
    fn test_profile_document_is_camel_case() {
        let value = serde_json::to_value(UserProfile::default()).unwrap();
        assert!(value.get("cigarettesPerDay").is_some());
        assert!(value.get("smokeFreeStartTime").is_some());
        assert_eq!(value["userType"], "former_smoker");
    }

    #[test]
    fn test_equipped_slots() {
        let mut equipped = EquippedRewards::default();
        *equipped.slot_mut(RewardCategory::Border) = Some("border_gold".into());
        assert_eq!(equipped.get(RewardCategory::Border), Some("border_gold"));
        assert_eq!(equipped.get(RewardCategory::Icon), None);
    }

    #[test]
    fn test_reward_category_parse() {
        assert_eq!("Icon".parse::<RewardCategory>().unwrap(), RewardCategory::Icon);
        assert!("effect".parse::<RewardCategory>().is_err());
    }
}
