//! Best-effort mirroring of local state to the remote backend.
//!
//! Writes (profile upserts and log inserts) go through an outbox drained by
//! a background worker thread, so callers never wait on the network. A
//! failed write is logged and dropped; there is no retry queue. Reads
//! (the pull at session start) and auth calls are synchronous.

use crate::metrics::{local_day, weekday_name};
use crate::remote::{LogKind, LogRow, ProfileRow, RemoteBackend};
use crate::types::{Event, Session, UserProfile};
use crate::Result;
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

enum Job {
    UpsertProfile(Session, ProfileRow),
    InsertLogs(Session, Vec<LogRow>),
    Flush(Sender<()>),
    Shutdown,
}

/// Handle to the remote backend plus its write-behind worker
pub struct SyncGateway {
    backend: Arc<dyn RemoteBackend>,
    outbox: Sender<Job>,
    worker: Option<JoinHandle<()>>,
}

impl SyncGateway {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        let (outbox, jobs) = mpsc::channel();
        let worker_backend = Arc::clone(&backend);
        let worker = std::thread::Builder::new()
            .name("vapetrack-sync".into())
            .spawn(move || run_worker(worker_backend, jobs));

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to start sync worker: {}. Remote writes disabled.", e);
                None
            }
        };

        Self {
            backend,
            outbox,
            worker,
        }
    }

    pub fn backend(&self) -> &dyn RemoteBackend {
        self.backend.as_ref()
    }

    /// Queue a full-profile upsert for the session's account
    pub fn push_profile(&self, session: &Session, profile: &UserProfile, now: DateTime<Utc>) {
        let row = match profile_row(session, profile, now) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Failed to serialize profile for sync: {}", e);
                return;
            }
        };
        self.enqueue(Job::UpsertProfile(session.clone(), row));
    }

    /// Queue log rows for insertion
    pub fn push_logs(&self, session: &Session, rows: Vec<LogRow>) {
        if rows.is_empty() {
            return;
        }
        self.enqueue(Job::InsertLogs(session.clone(), rows));
    }

    /// Block until every write queued so far has been attempted
    pub fn flush(&self) {
        if self.worker.is_none() {
            return;
        }
        let (ack, done) = mpsc::channel();
        if self.outbox.send(Job::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }

    fn enqueue(&self, job: Job) {
        if self.worker.is_none() || self.outbox.send(job).is_err() {
            tracing::warn!("Sync worker unavailable, dropping remote write");
        }
    }
}

impl Drop for SyncGateway {
    fn drop(&mut self) {
        let _ = self.outbox.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Sync worker panicked");
            }
        }
    }
}

fn run_worker(backend: Arc<dyn RemoteBackend>, jobs: Receiver<Job>) {
    for job in jobs {
        match job {
            Job::UpsertProfile(session, row) => {
                match backend.upsert_profile(&session, &row) {
                    Ok(()) => tracing::debug!("Synced profile for {}", session.account_id),
                    Err(e) => tracing::warn!("Error syncing profile: {}", e),
                }
            }
            Job::InsertLogs(session, rows) => match backend.insert_logs(&session, &rows) {
                Ok(()) => tracing::debug!("Synced {} log rows", rows.len()),
                Err(e) => tracing::warn!("Error syncing {} log rows: {}", rows.len(), e),
            },
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
            Job::Shutdown => break,
        }
    }
}

/// Collision-free public username for an account
///
/// Lowercased alphanumerics of the display name joined with `_`, then the
/// first 8 hex characters of the account id. Falls back to `user_<id>`
/// when the name has nothing usable.
pub fn derive_username(name: &str, account_id: &str) -> String {
    let suffix: String = account_id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(8)
        .collect::<String>()
        .to_lowercase();

    let slug = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_");

    if slug.is_empty() {
        format!("user_{}", suffix)
    } else {
        format!("{}_{}", slug, suffix)
    }
}

pub fn profile_row(session: &Session, profile: &UserProfile, now: DateTime<Utc>) -> Result<ProfileRow> {
    Ok(ProfileRow {
        id: session.account_id.clone(),
        username: Some(derive_username(&profile.name, &session.account_id)),
        email: Some(session.email.clone()),
        data: serde_json::to_value(profile)?,
        updated_at: Some(now),
    })
}

/// Inputs for enriching log rows
pub struct LogContext<'a> {
    pub session: &'a Session,
    pub profile: &'a UserProfile,
    /// Local time, used for weekday and hour columns
    pub now: DateTime<FixedOffset>,
    pub platform: &'a str,
}

impl LogContext<'_> {
    fn device_type(&self) -> &'static str {
        match self.platform {
            "ios" => "ios",
            "android" => "android",
            "linux" | "macos" | "windows" => "desktop",
            _ => "other",
        }
    }

    fn streak_days(&self) -> u64 {
        self.profile
            .smoke_free_start_time
            .map(|start| (self.now.with_timezone(&Utc) - start).num_days().max(0) as u64)
            .unwrap_or(0)
    }

    fn base_row(&self, timestamp: DateTime<Utc>, kind: LogKind) -> LogRow {
        let local = timestamp.with_timezone(self.now.offset());
        let device = self.profile.current_vape.as_ref();
        LogRow {
            user_id: self.session.account_id.clone(),
            timestamp,
            kind,
            vape_name: device.map(|d| d.name.clone()).filter(|n| !n.is_empty()),
            vape_nicotine: device.map(|d| d.nicotine),
            juice_level_before: Some(self.profile.juice_level),
            juice_level_after: Some(self.profile.juice_level),
            day_of_week: weekday_name(local.date_naive()).to_string(),
            hour_of_day: local.hour(),
            time_since_last_puff_ms: None,
            user_xp: self.profile.xp,
            daily_puff_count: 0,
            streak_days: self.streak_days(),
            user_agent: self.platform.to_string(),
            device_type: self.device_type().to_string(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// One row per newly appended event
    ///
    /// `events` is the full sequence after the append and `new_from` the
    /// index of the first new event. Gaps and same-day counts are taken
    /// relative to the events before each row.
    pub fn puff_rows(
        &self,
        events: &[Event],
        new_from: usize,
        juice_levels: Option<(f64, f64)>,
        metadata: serde_json::Value,
    ) -> Vec<LogRow> {
        let offset = self.now.offset();
        (new_from..events.len())
            .map(|i| {
                let event = events[i];
                let day = local_day(&event, offset);
                let mut row = self.base_row(event.timestamp, LogKind::Puff);
                row.time_since_last_puff_ms = i
                    .checked_sub(1)
                    .map(|prev| (event.timestamp - events[prev].timestamp).num_milliseconds());
                row.daily_puff_count = events[..=i]
                    .iter()
                    .filter(|e| local_day(e, offset) == day)
                    .count() as u64;
                if let Some((before, after)) = juice_levels {
                    row.juice_level_before = Some(before);
                    row.juice_level_after = Some(after);
                }
                row.metadata = metadata.clone();
                row
            })
            .collect()
    }

    pub fn purchase_row(
        &self,
        events: &[Event],
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> LogRow {
        let offset = self.now.offset();
        let day = timestamp.with_timezone(offset).date_naive();
        let mut row = self.base_row(timestamp, LogKind::JuicePurchase);
        row.time_since_last_puff_ms = events
            .last()
            .map(|last| (timestamp - last.timestamp).num_milliseconds());
        row.daily_puff_count = events.iter().filter(|e| local_day(e, offset) == day).count() as u64;
        row.metadata = metadata;
        row
    }
}

/// Reconcile pulled remote logs with local events
///
/// Remote puff rows are authoritative. Local events strictly newer than
/// the newest remote puff were logged offline and are kept. The result is
/// stably sorted by timestamp. Returns `None` when the remote has no puffs,
/// meaning local events stay as they are. The second element is the local
/// tail that still needs to be pushed.
pub fn merge_events(local: &[Event], remote: &[LogRow]) -> Option<(Vec<Event>, Vec<Event>)> {
    let mut merged: Vec<Event> = remote
        .iter()
        .filter(|r| r.kind == LogKind::Puff)
        .map(|r| Event::at(r.timestamp))
        .collect();

    let newest_remote = merged.iter().map(|e| e.timestamp).max()?;

    let offline_tail: Vec<Event> = local
        .iter()
        .filter(|e| e.timestamp > newest_remote)
        .copied()
        .collect();

    merged.extend(offline_tail.iter().copied());
    merged.sort_by_key(|e| e.timestamp);
    Some((merged, offline_tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;
    use crate::types::Device;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn session() -> Session {
        Session {
            account_id: "3f2a9c7e-1b2d-4e5f-8a9b-0c1d2e3f4a5b".into(),
            email: "sam@example.com".into(),
            access_token: "token".into(),
        }
    }

    fn remote_row(timestamp: &str, kind: LogKind) -> LogRow {
        let ctx_session = session();
        let profile = UserProfile::default();
        let ctx = LogContext {
            session: &ctx_session,
            profile: &profile,
            now: DateTime::parse_from_rfc3339(timestamp).unwrap(),
            platform: "linux",
        };
        ctx.base_row(ts(timestamp), kind)
    }

    #[test]
    fn test_username_from_name() {
        let account = session().account_id;
        assert_eq!(derive_username("Sam O'Neil", &account), "sam_o_neil_3f2a9c7e");
        assert_eq!(derive_username("  ", &account), "user_3f2a9c7e");
        assert_eq!(derive_username("Зоя", &account), "user_3f2a9c7e");
    }

    #[test]
    fn test_profile_row_uses_session_email() {
        let profile = UserProfile {
            name: "Sam".into(),
            email: "stale@example.com".into(),
            ..Default::default()
        };
        let row = profile_row(&session(), &profile, ts("2025-06-01T00:00:00Z")).unwrap();
        assert_eq!(row.email.as_deref(), Some("sam@example.com"));
        assert_eq!(row.username.as_deref(), Some("sam_3f2a9c7e"));
        assert_eq!(row.data["name"], "Sam");
    }

    #[test]
    fn test_puff_rows_enrichment() {
        let session = session();
        let profile = UserProfile {
            xp: 40,
            current_vape: Some(Device {
                name: "Pod X".into(),
                nicotine: 20.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        let now = DateTime::parse_from_rfc3339("2025-06-02T14:30:00+02:00").unwrap();
        let ctx = LogContext {
            session: &session,
            profile: &profile,
            now,
            platform: "android",
        };

        let events = vec![
            Event::at(ts("2025-06-02T10:00:00Z")),
            Event::at(ts("2025-06-02T12:30:00Z")),
            Event::at(ts("2025-06-02T12:30:00Z")),
        ];
        let rows = ctx.puff_rows(&events, 1, None, serde_json::json!({}));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, LogKind::Puff);
        assert_eq!(rows[0].day_of_week, "Monday");
        assert_eq!(rows[0].hour_of_day, 14);
        assert_eq!(rows[0].time_since_last_puff_ms, Some(9_000_000));
        assert_eq!(rows[0].daily_puff_count, 2);
        assert_eq!(rows[1].time_since_last_puff_ms, Some(0));
        assert_eq!(rows[1].daily_puff_count, 3);
        assert_eq!(rows[1].vape_name.as_deref(), Some("Pod X"));
        assert_eq!(rows[1].user_xp, 40);
        assert_eq!(rows[1].device_type, "android");
    }

    #[test]
    fn test_merge_keeps_offline_tail() {
        let remote = vec![
            remote_row("2025-06-01T08:00:00Z", LogKind::Puff),
            remote_row("2025-06-01T09:00:00Z", LogKind::JuicePurchase),
            remote_row("2025-06-01T10:00:00Z", LogKind::Puff),
        ];
        let local = vec![
            Event::at(ts("2025-06-01T08:00:00Z")),
            Event::at(ts("2025-06-01T10:00:00Z")),
            Event::at(ts("2025-06-01T11:00:00Z")),
        ];

        let (merged, tail) = merge_events(&local, &remote).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(tail, vec![Event::at(ts("2025-06-01T11:00:00Z"))]);
        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_merge_without_remote_puffs_keeps_local() {
        let remote = vec![remote_row("2025-06-01T09:00:00Z", LogKind::JuicePurchase)];
        let local = vec![Event::at(ts("2025-06-01T08:00:00Z"))];
        assert!(merge_events(&local, &remote).is_none());
    }

    #[test]
    fn test_gateway_writes_are_applied_after_flush() {
        let backend = MemoryBackend::new();
        backend.sign_up("sam@example.com", "secret1", "sam").unwrap();
        let session = backend.sign_in("sam@example.com", "secret1").unwrap();

        let gateway = SyncGateway::new(Arc::new(backend.clone()));
        gateway.push_profile(&session, &UserProfile::default(), ts("2025-06-01T00:00:00Z"));
        gateway.push_logs(
            &session,
            vec![remote_row("2025-06-01T08:00:00Z", LogKind::Puff)],
        );
        gateway.flush();

        assert!(backend.profile(&session.account_id).is_some());
        assert_eq!(backend.logs(&session.account_id).len(), 1);
    }

    #[test]
    fn test_gateway_swallows_remote_failures() {
        let backend = MemoryBackend::new();
        backend.sign_up("sam@example.com", "secret1", "sam").unwrap();
        let session = backend.sign_in("sam@example.com", "secret1").unwrap();
        backend.set_offline(true);

        let gateway = SyncGateway::new(Arc::new(backend.clone()));
        gateway.push_profile(&session, &UserProfile::default(), ts("2025-06-01T00:00:00Z"));
        gateway.flush();

        backend.set_offline(false);
        assert!(backend.profile(&session.account_id).is_none());
    }
}
