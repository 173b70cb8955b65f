//! Product analytics sink.
//!
//! Capturing an event never fails and never changes what the caller does.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

pub const USER_SIGNED_UP: &str = "user_signed_up";
pub const USER_LOGGED_IN: &str = "user_logged_in";
pub const USER_LOGGED_OUT: &str = "user_logged_out";
pub const ONBOARDING_COMPLETED: &str = "onboarding_completed";
pub const PUFF_LOGGED: &str = "puff_logged";
pub const JUICE_LEVEL_UPDATED: &str = "juice_level_updated";
pub const JUICE_PURCHASED: &str = "juice_purchased";
pub const COLD_TURKEY_ACTIVATED: &str = "cold_turkey_activated";
pub const COLD_TURKEY_DEACTIVATED: &str = "cold_turkey_deactivated";
pub const REWARD_PURCHASED: &str = "reward_purchased";
pub const REWARD_EQUIPPED: &str = "reward_equipped";
pub const XP_EARNED: &str = "xp_earned";
pub const PROFILE_UPDATED: &str = "profile_updated";

/// Destination for named product events
pub trait Analytics: Send + Sync {
    fn capture(&self, event: &str, properties: Value);
}

/// Emits each event as a debug record on the `vapetrack::analytics` target
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAnalytics;

impl Analytics for TracingAnalytics {
    fn capture(&self, event: &str, properties: Value) {
        tracing::debug!(target: "vapetrack::analytics", event, %properties, "capture");
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnalytics;

impl Analytics for NoopAnalytics {
    fn capture(&self, _event: &str, _properties: Value) {}
}

/// Keeps every captured event in memory
///
/// Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct RecordingAnalytics {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    /// Names of the captured events, in capture order
    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Analytics for RecordingAnalytics {
    fn capture(&self, event: &str, properties: Value) {
        self.events.lock().push((event.to_string(), properties));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_keeps_order() {
        let analytics = RecordingAnalytics::new();
        let shared = analytics.clone();
        analytics.capture(PUFF_LOGGED, json!({ "count": 1 }));
        shared.capture(XP_EARNED, json!({ "amount": 10 }));

        assert_eq!(analytics.names(), vec![PUFF_LOGGED, XP_EARNED]);
        assert_eq!(analytics.events()[1].1["amount"], 10);
    }

    #[test]
    fn test_tracing_sink_accepts_any_payload() {
        crate::logging::init_test();
        TracingAnalytics.capture(PROFILE_UPDATED, Value::Null);
        NoopAnalytics.capture(PROFILE_UPDATED, json!([1, 2, 3]));
    }
}
