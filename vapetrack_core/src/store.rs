//! The event and profile store.
//!
//! [`Store`] is the single owner of [`TrackerState`]. Every mutation updates
//! memory first, then rewrites the affected persisted documents, then hands
//! remote writes to the sync gateway. Persistence and sync failures are
//! logged and swallowed; the in-memory state stays authoritative.

use crate::analytics::{self, Analytics, TracingAnalytics};
use crate::clock::Clock;
use crate::kv::{
    KeyValueStore, ALL_KEYS, BADGES_KEY, EQUIPPED_REWARDS_KEY, EVENTS_KEY, JUICE_PURCHASES_KEY,
    LAST_XP_CALC_KEY, PROFILE_KEY, PURCHASED_REWARDS_KEY, SESSION_KEY,
};
use crate::ledger;
use crate::remote::{ProfileRow, SignUpOutcome};
use crate::sync::{merge_events, LogContext, SyncGateway};
use crate::types::{
    AuthState, Badge, Event, JuicePurchase, ProfileUpdate, RewardCategory, Session, TrackerState,
    UserProfile,
};
use crate::{AuthError, Error, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Puffs one mL of juice is assumed to produce when converting a level drop
pub const JUICE_PUFFS_PER_ML: f64 = 300.0;
/// XP granted per puff reconstructed from a juice level drop
pub const XP_PER_JUICE_PUFF: u64 = 10;
/// Most puffs a single juice level drop may add
pub const MAX_JUICE_PUFFS: f64 = 100_000.0;
/// Shortest accepted display name at sign-up
pub const MIN_NAME_LEN: usize = 3;

/// What a logging call changed besides the event list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogOutcome {
    pub added: usize,
    pub badges: Vec<Badge>,
    /// XP granted by the daily evaluation, if it ran
    pub daily_xp: Option<u64>,
}

pub struct Store {
    state: TrackerState,
    kv: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    sync: Option<SyncGateway>,
    analytics: Arc<dyn Analytics>,
    auth: AuthState,
    platform: String,
}

fn load_doc<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    let json = match kv.get(key) {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Unable to read {}: {}. Using defaults.", key, e);
            return None;
        }
    };
    match serde_json::from_str(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}. Using defaults.", key, e);
            None
        }
    }
}

fn persist<T: Serialize + ?Sized>(kv: &mut dyn KeyValueStore, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(Error::from)
        .and_then(|json| kv.set(key, &json));
    if let Err(e) = result {
        tracing::warn!("Failed to persist {}: {}", key, e);
    }
}

impl Store {
    /// Load every persisted document, falling back to defaults per key
    ///
    /// A persisted session is restored as authenticated but nothing is
    /// pulled until [`Store::resume_session`].
    pub fn open(kv: Box<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let kv_ref = kv.as_ref();
        let state = TrackerState {
            profile: load_doc(kv_ref, PROFILE_KEY).unwrap_or_default(),
            events: load_doc(kv_ref, EVENTS_KEY).unwrap_or_default(),
            badges: load_doc(kv_ref, BADGES_KEY).unwrap_or_default(),
            juice_purchases: load_doc(kv_ref, JUICE_PURCHASES_KEY).unwrap_or_default(),
            purchased_rewards: load_doc(kv_ref, PURCHASED_REWARDS_KEY).unwrap_or_default(),
            equipped_rewards: load_doc(kv_ref, EQUIPPED_REWARDS_KEY).unwrap_or_default(),
            last_xp_evaluation: load_doc(kv_ref, LAST_XP_CALC_KEY),
        };
        let auth = match load_doc::<Session>(kv_ref, SESSION_KEY) {
            Some(session) => AuthState::Authenticated(session),
            None => AuthState::Anonymous,
        };

        tracing::debug!(
            "Opened store: {} events, {} XP, {} purchases",
            state.events.len(),
            state.profile.xp,
            state.juice_purchases.len()
        );

        Self {
            state,
            kv,
            clock,
            sync: None,
            analytics: Arc::new(TracingAnalytics),
            auth,
            platform: std::env::consts::OS.to_string(),
        }
    }

    pub fn with_sync(mut self, gateway: SyncGateway) -> Self {
        self.sync = Some(gateway);
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn Analytics>) -> Self {
        self.analytics = analytics;
        self
    }

    /// Platform tag attached to synced log rows
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn profile(&self) -> &UserProfile {
        &self.state.profile
    }

    pub fn events(&self) -> &[Event] {
        &self.state.events
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn session(&self) -> Option<&Session> {
        self.auth.session()
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now()
    }

    /// Owned copy of the state for renderers and tickers
    pub fn snapshot(&self) -> TrackerState {
        self.state.clone()
    }

    /// Wait for queued remote writes to be attempted
    pub fn flush_sync(&self) {
        if let Some(sync) = &self.sync {
            sync.flush();
        }
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    pub fn onboard(&mut self, update: ProfileUpdate) {
        update.apply(&mut self.state.profile);
        self.state.profile.onboarded_at = Some(self.clock.now_utc());
        self.profile_changed();
        self.analytics.capture(
            analytics::ONBOARDING_COMPLETED,
            json!({ "user_type": self.state.profile.user_type }),
        );
    }

    pub fn update_profile(&mut self, update: ProfileUpdate) {
        if update.is_empty() {
            return;
        }
        let fields: Vec<String> = match serde_json::to_value(&update) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k)
                .collect(),
            _ => Vec::new(),
        };

        update.apply(&mut self.state.profile);
        self.profile_changed();
        self.analytics
            .capture(analytics::PROFILE_UPDATED, json!({ "fields": fields }));
    }

    /// Start or end the smoke-free streak
    ///
    /// Returns whether a streak is running afterwards.
    pub fn toggle_smoke_free(&mut self) -> bool {
        let now = self.clock.now_utc();
        let profile = &mut self.state.profile;
        let active = match profile.smoke_free_start_time.take() {
            Some(_) => false,
            None => {
                profile.smoke_free_start_time = Some(now);
                true
            }
        };
        self.profile_changed();

        let event = if active {
            analytics::COLD_TURKEY_ACTIVATED
        } else {
            analytics::COLD_TURKEY_DEACTIVATED
        };
        self.analytics.capture(event, json!({}));
        active
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn log_event(&mut self) -> LogOutcome {
        self.log_events(NonZeroU32::MIN)
    }

    /// Append `count` puffs sharing the current timestamp
    pub fn log_events(&mut self, count: NonZeroU32) -> LogOutcome {
        let now = self.clock.now();
        let added = count.get() as usize;
        let first_new = self.append_events(now, added);

        // Any puff ends a smoke-free streak
        let streak_ended = self.state.profile.smoke_free_start_time.take().is_some();
        if streak_ended {
            tracing::info!("Smoke-free streak ended by a logged puff");
        }

        let (badges, daily_xp) = self.run_evaluations(now);
        if streak_ended || daily_xp.is_some() {
            self.profile_changed();
        }

        self.mirror_puffs(now, first_new, None, json!({}));
        self.analytics.capture(
            analytics::PUFF_LOGGED,
            json!({ "count": added, "total": self.state.events.len() }),
        );

        LogOutcome {
            added,
            badges,
            daily_xp,
        }
    }

    /// Set the juice level, turning any drop into puffs
    ///
    /// A drop of `d` percent of a `b` mL bottle adds `round(d / 100 * b *
    /// 300)` puffs at the current time and grants 10 XP each. Raising the
    /// level adds nothing. Returns the number of puffs added.
    pub fn set_juice_level(&mut self, new_level: f64) -> Result<usize> {
        if !new_level.is_finite() || !(0.0..=100.0).contains(&new_level) {
            return Err(Error::Validation(format!(
                "juice level must be between 0 and 100, got {}",
                new_level
            )));
        }

        let now = self.clock.now();
        let old_level = self.state.profile.juice_level;
        let mut added = 0usize;

        if new_level < old_level {
            let ml_used = (old_level - new_level) / 100.0 * self.state.profile.bottle_size;
            let puffs = (ml_used * JUICE_PUFFS_PER_ML).round();
            if !puffs.is_finite() || puffs > MAX_JUICE_PUFFS {
                return Err(Error::Validation(format!(
                    "juice drop of {} mL is more than one drop can record",
                    ml_used
                )));
            }
            added = puffs.max(0.0) as usize;
        }

        if added > 0 {
            let first_new = self.append_events(now, added);
            let xp = (added as u64).saturating_mul(XP_PER_JUICE_PUFF);
            self.state.profile.xp = self.state.profile.xp.saturating_add(xp);
            self.analytics.capture(
                analytics::XP_EARNED,
                json!({ "amount": xp, "source": "juice_level" }),
            );
            self.run_evaluations(now);
            self.mirror_puffs(
                now,
                first_new,
                Some((old_level, new_level)),
                json!({ "source": "juice_level" }),
            );
        }

        self.state.profile.juice_level = new_level;
        self.profile_changed();
        self.analytics.capture(
            analytics::JUICE_LEVEL_UPDATED,
            json!({ "from": old_level, "to": new_level, "puffs_added": added }),
        );
        Ok(added)
    }

    /// Record a bottle replacement
    pub fn record_juice_purchase(&mut self) -> JuicePurchase {
        let now = self.clock.now();
        let timestamp = now.with_timezone(&Utc);

        let (id, puffs_since_last) = match self.state.juice_purchases.last() {
            Some(last) => (
                timestamp.timestamp_millis().max(last.id + 1),
                self.state
                    .events
                    .iter()
                    .filter(|e| e.timestamp > last.timestamp)
                    .count() as u64,
            ),
            None => (timestamp.timestamp_millis(), self.state.events.len() as u64),
        };

        let purchase = JuicePurchase {
            id,
            timestamp,
            puffs_since_last,
        };
        self.state.juice_purchases.push(purchase.clone());
        persist(self.kv.as_mut(), JUICE_PURCHASES_KEY, &self.state.juice_purchases);

        let metadata = json!({
            "puffs_since_last": puffs_since_last,
            "bottle_size": self.state.profile.bottle_size,
            "vape_cost": self.state.profile.current_vape.as_ref().map(|d| d.cost),
        });
        if let (Some(sync), Some(session)) = (&self.sync, self.auth.session()) {
            let ctx = self.log_context(session, now);
            let row = ctx.purchase_row(&self.state.events, timestamp, metadata.clone());
            sync.push_logs(session, vec![row]);
        }
        self.analytics.capture(analytics::JUICE_PURCHASED, metadata);

        purchase
    }

    /// Run the once-per-day XP evaluation now
    pub fn evaluate_daily_xp(&mut self) -> Option<u64> {
        let now = self.clock.now();
        let award = self.daily_xp(now);
        if award.is_some() {
            self.profile_changed();
        }
        award
    }

    // ------------------------------------------------------------------
    // Rewards
    // ------------------------------------------------------------------

    pub fn purchase_reward(&mut self, id: &str, cost: u64) -> bool {
        if !ledger::purchase_reward(&mut self.state, id, cost) {
            return false;
        }
        persist(self.kv.as_mut(), PURCHASED_REWARDS_KEY, &self.state.purchased_rewards);
        self.profile_changed();
        self.analytics.capture(
            analytics::REWARD_PURCHASED,
            json!({ "reward_id": id, "cost": cost, "remaining_xp": self.state.profile.xp }),
        );
        true
    }

    pub fn equip_reward(&mut self, id: &str, category: RewardCategory) -> bool {
        if !ledger::equip_reward(&mut self.state, id, category) {
            return false;
        }
        persist(self.kv.as_mut(), EQUIPPED_REWARDS_KEY, &self.state.equipped_rewards);
        self.analytics.capture(
            analytics::REWARD_EQUIPPED,
            json!({ "reward_id": id, "category": category }),
        );
        true
    }

    pub fn unequip_reward(&mut self, category: RewardCategory) {
        ledger::unequip_reward(&mut self.state, category);
        persist(self.kv.as_mut(), EQUIPPED_REWARDS_KEY, &self.state.equipped_rewards);
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Create an account
    ///
    /// Validation failures change nothing. On success the display name and
    /// email are stored locally; the store is signed in if the backend
    /// issued a session, otherwise it waits for email confirmation.
    pub fn sign_up(&mut self, email: &str, password: &str, confirm: &str, name: &str) -> Result<()> {
        if password != confirm {
            return Err(Error::Validation("passwords do not match".into()));
        }
        let name = name.trim();
        if name.chars().count() < MIN_NAME_LEN {
            return Err(Error::Validation(format!(
                "name must be at least {} characters",
                MIN_NAME_LEN
            )));
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::Validation("email is required".into()));
        }

        let outcome = {
            let sync = self.sync.as_ref().ok_or(AuthError::NotConfigured)?;
            self.auth = AuthState::Authenticating;
            sync.backend().sign_up(email, password, name)
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.auth = AuthState::Anonymous;
                return Err(e);
            }
        };

        self.state.profile.name = name.to_string();
        self.state.profile.email = email.to_string();
        persist(self.kv.as_mut(), PROFILE_KEY, &self.state.profile);
        self.analytics
            .capture(analytics::USER_SIGNED_UP, json!({ "method": "email" }));

        match outcome {
            SignUpOutcome::SignedIn(session) => {
                tracing::info!("Signed up and signed in as {}", session.email);
                self.establish_session(session);
                self.profile_changed();
            }
            SignUpOutcome::PendingConfirmation { email, .. } => {
                tracing::info!("Signed up {}, awaiting email confirmation", email);
                self.auth = AuthState::AwaitingConfirmation { email };
            }
        }
        Ok(())
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<()> {
        let result = {
            let sync = self.sync.as_ref().ok_or(AuthError::NotConfigured)?;
            self.auth = AuthState::Authenticating;
            sync.backend().sign_in(email.trim(), password)
        };
        match result {
            Ok(session) => {
                tracing::info!("Signed in as {}", session.email);
                self.establish_session(session);
                self.analytics
                    .capture(analytics::USER_LOGGED_IN, json!({ "method": "email" }));
                Ok(())
            }
            Err(e) => {
                self.auth = AuthState::Anonymous;
                Err(e)
            }
        }
    }

    /// Pull remote state for a session restored at open
    ///
    /// Returns `false` when there is no session or no backend.
    pub fn resume_session(&mut self) -> bool {
        let session = match (&self.sync, self.auth.session()) {
            (Some(_), Some(session)) => session.clone(),
            _ => return false,
        };
        self.pull(&session);
        true
    }

    /// Sign out and wipe every local document
    ///
    /// The remote sign-out is best effort; local data is cleared even if
    /// it fails.
    pub fn sign_out(&mut self) {
        let had_session = self.auth.session().is_some();
        self.clear_all();
        if had_session {
            self.analytics.capture(analytics::USER_LOGGED_OUT, json!({}));
        }
    }

    /// Reset to defaults, remove all persisted keys and drop any session
    pub fn clear_all(&mut self) {
        if let (Some(sync), Some(session)) = (&self.sync, self.auth.session()) {
            sync.flush();
            if let Err(e) = sync.backend().sign_out(session) {
                tracing::warn!("Remote sign-out failed: {}", e);
            }
        }

        if let Err(e) = self.kv.remove_many(&ALL_KEYS) {
            tracing::warn!("Failed to clear persisted data: {}", e);
        }
        self.state = TrackerState::default();
        self.auth = AuthState::Anonymous;
        tracing::info!("Cleared all local data");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn append_events(&mut self, now: DateTime<FixedOffset>, count: usize) -> usize {
        let first_new = self.state.events.len();
        let event = Event::at(now.with_timezone(&Utc));
        self.state.events.extend(std::iter::repeat(event).take(count));
        persist(self.kv.as_mut(), EVENTS_KEY, &self.state.events);
        first_new
    }

    /// Badge unlocks then the daily XP check, both persisted
    fn run_evaluations(&mut self, now: DateTime<FixedOffset>) -> (Vec<Badge>, Option<u64>) {
        let badges = ledger::unlock_badges(self.state.events.len(), &mut self.state.badges);
        if !badges.is_empty() {
            persist(self.kv.as_mut(), BADGES_KEY, &self.state.badges);
        }
        (badges, self.daily_xp(now))
    }

    fn daily_xp(&mut self, now: DateTime<FixedOffset>) -> Option<u64> {
        let award = ledger::evaluate_daily_xp(&mut self.state, now)?;
        persist(self.kv.as_mut(), LAST_XP_CALC_KEY, &self.state.last_xp_evaluation);
        if award > 0 {
            self.analytics.capture(
                analytics::XP_EARNED,
                json!({ "amount": award, "source": "daily" }),
            );
        }
        Some(award)
    }

    /// Persist the profile and mirror it remotely
    fn profile_changed(&mut self) {
        persist(self.kv.as_mut(), PROFILE_KEY, &self.state.profile);
        if let (Some(sync), Some(session)) = (&self.sync, self.auth.session()) {
            sync.push_profile(session, &self.state.profile, self.clock.now_utc());
        }
    }

    fn log_context<'a>(&'a self, session: &'a Session, now: DateTime<FixedOffset>) -> LogContext<'a> {
        LogContext {
            session,
            profile: &self.state.profile,
            now,
            platform: &self.platform,
        }
    }

    fn mirror_puffs(
        &self,
        now: DateTime<FixedOffset>,
        first_new: usize,
        juice_levels: Option<(f64, f64)>,
        metadata: Value,
    ) {
        if let (Some(sync), Some(session)) = (&self.sync, self.auth.session()) {
            let rows = self
                .log_context(session, now)
                .puff_rows(&self.state.events, first_new, juice_levels, metadata);
            sync.push_logs(session, rows);
        }
    }

    fn establish_session(&mut self, session: Session) {
        persist(self.kv.as_mut(), SESSION_KEY, &session);
        self.auth = AuthState::Authenticated(session.clone());
        self.pull(&session);
    }

    /// Merge the remote profile and logs into local state
    fn pull(&mut self, session: &Session) {
        let Some(sync) = &self.sync else {
            return;
        };

        let remote_profile = sync.backend().fetch_profile(session);
        let remote_logs = sync.backend().fetch_logs(session);

        match remote_profile {
            Ok(Some(row)) => self.apply_remote_profile(session, row),
            Ok(None) => {
                tracing::debug!("No remote profile for {}", session.account_id);
                self.state.profile.email = session.email.clone();
                persist(self.kv.as_mut(), PROFILE_KEY, &self.state.profile);
            }
            Err(e) => tracing::warn!("Error loading remote profile: {}", e),
        }

        match remote_logs {
            Ok(rows) => {
                if let Some((merged, offline_tail)) = merge_events(&self.state.events, &rows) {
                    tracing::info!(
                        "Merged {} remote puffs with {} offline puffs",
                        merged.len() - offline_tail.len(),
                        offline_tail.len()
                    );
                    self.state.events = merged;
                    persist(self.kv.as_mut(), EVENTS_KEY, &self.state.events);

                    if !offline_tail.is_empty() {
                        let first_tail = self.state.events.len() - offline_tail.len();
                        self.mirror_puffs(self.clock.now(), first_tail, None, json!({ "source": "offline" }));
                    }
                }
            }
            Err(e) => tracing::warn!("Error loading remote logs: {}", e),
        }
    }

    /// Overlay the remote `data` document on the local profile
    ///
    /// Every key present remotely wins, including nulls. A null on a field
    /// that cannot be absent resets it to its default. Keys missing remotely
    /// keep their local value. The email always comes from the session.
    fn apply_remote_profile(&mut self, session: &Session, row: ProfileRow) {
        let remote = match row.data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                tracing::warn!("Ignoring malformed remote profile: {}", other);
                Map::new()
            }
        };
        let defaults = profile_fields(&UserProfile::default());
        let has_name = remote
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| !name.is_empty());

        let mut doc = profile_fields(&self.state.profile);
        for (key, value) in remote {
            let value = match value {
                Value::Null => defaults.get(&key).cloned().unwrap_or(Value::Null),
                value => value,
            };
            doc.insert(key, value);
        }
        if !has_name {
            if let Some(username) = row.username.filter(|u| !u.is_empty()) {
                doc.insert("name".into(), Value::String(username));
            }
        }
        doc.insert("email".into(), Value::String(session.email.clone()));

        match serde_json::from_value::<UserProfile>(Value::Object(doc)) {
            Ok(profile) => self.state.profile = profile,
            Err(e) => {
                tracing::warn!("Ignoring malformed remote profile: {}", e);
                self.state.profile.email = session.email.clone();
            }
        }
        persist(self.kv.as_mut(), PROFILE_KEY, &self.state.profile);
    }
}

fn profile_fields(profile: &UserProfile) -> Map<String, Value> {
    match serde_json::to_value(profile) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
