//! In-process backend.

use super::{LogRow, ProfileRow, RemoteBackend, SignUpOutcome};
use crate::types::Session;
use crate::{AuthError, Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
struct Account {
    id: String,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    profiles: HashMap<String, ProfileRow>,
    logs: Vec<LogRow>,
    require_confirmation: bool,
    offline: bool,
    fail_sign_out: bool,
}

/// Backend that keeps everything in memory
///
/// Clones share the same data. Failure switches let tests exercise the
/// offline paths.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// New sign-ups must confirm their email before signing in
    pub fn require_confirmation(&self, required: bool) {
        self.inner.lock().require_confirmation = required;
    }

    /// Mark an account's email as confirmed
    pub fn confirm(&self, email: &str) {
        if let Some(account) = self.inner.lock().accounts.get_mut(email) {
            account.confirmed = true;
        }
    }

    /// Make every data call fail as if the network were down
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.inner.lock().fail_sign_out = fail;
    }

    pub fn profile(&self, account_id: &str) -> Option<ProfileRow> {
        self.inner.lock().profiles.get(account_id).cloned()
    }

    pub fn logs(&self, account_id: &str) -> Vec<LogRow> {
        self.inner
            .lock()
            .logs
            .iter()
            .filter(|r| r.user_id == account_id)
            .cloned()
            .collect()
    }

    /// Seed a profile row directly (as another device would have)
    pub fn put_profile(&self, row: ProfileRow) {
        self.inner.lock().profiles.insert(row.id.clone(), row);
    }

    /// Seed log rows directly (as another device would have)
    pub fn put_logs(&self, rows: Vec<LogRow>) {
        self.inner.lock().logs.extend(rows);
    }

    fn authorize(inner: &Inner, session: &Session) -> Result<()> {
        if inner.offline {
            return Err(Error::Remote("network unreachable".into()));
        }
        match inner.tokens.get(&session.access_token) {
            Some(id) if *id == session.account_id => Ok(()),
            _ => Err(Error::Auth(AuthError::Rejected("invalid or expired session".into()))),
        }
    }

    fn issue_session(inner: &mut Inner, account_id: &str, email: &str) -> Session {
        let token = Uuid::new_v4().to_string();
        inner.tokens.insert(token.clone(), account_id.to_string());
        Session {
            account_id: account_id.to_string(),
            email: email.to_string(),
            access_token: token,
        }
    }
}

impl RemoteBackend for MemoryBackend {
    fn sign_up(&self, email: &str, password: &str, _username: &str) -> Result<SignUpOutcome> {
        let mut inner = self.inner.lock();
        if inner.offline {
            return Err(Error::Remote("network unreachable".into()));
        }
        if inner.accounts.contains_key(email) {
            return Err(AuthError::UserExists.into());
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            password: password.to_string(),
            confirmed: !inner.require_confirmation,
        };
        let id = account.id.clone();
        let confirmed = account.confirmed;
        inner.accounts.insert(email.to_string(), account);

        if confirmed {
            Ok(SignUpOutcome::SignedIn(Self::issue_session(&mut inner, &id, email)))
        } else {
            Ok(SignUpOutcome::PendingConfirmation {
                account_id: id,
                email: email.to_string(),
            })
        }
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let mut inner = self.inner.lock();
        if inner.offline {
            return Err(Error::Remote("network unreachable".into()));
        }
        let account = match inner.accounts.get(email) {
            Some(a) if a.password == password => a.clone(),
            _ => return Err(AuthError::InvalidCredentials.into()),
        };
        if !account.confirmed {
            return Err(AuthError::EmailNotConfirmed.into());
        }
        Ok(Self::issue_session(&mut inner, &account.id, email))
    }

    fn sign_out(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.offline || inner.fail_sign_out {
            return Err(Error::Remote("sign-out request failed".into()));
        }
        inner.tokens.remove(&session.access_token);
        Ok(())
    }

    fn fetch_profile(&self, session: &Session) -> Result<Option<ProfileRow>> {
        let inner = self.inner.lock();
        Self::authorize(&inner, session)?;
        Ok(inner.profiles.get(&session.account_id).cloned())
    }

    fn upsert_profile(&self, session: &Session, row: &ProfileRow) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::authorize(&inner, session)?;
        inner.profiles.insert(row.id.clone(), row.clone());
        Ok(())
    }

    fn fetch_logs(&self, session: &Session) -> Result<Vec<LogRow>> {
        let inner = self.inner.lock();
        Self::authorize(&inner, session)?;
        let mut rows: Vec<LogRow> = inner
            .logs
            .iter()
            .filter(|r| r.user_id == session.account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    fn insert_logs(&self, session: &Session, rows: &[LogRow]) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::authorize(&inner, session)?;
        inner.logs.extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_then_sign_in() {
        let backend = MemoryBackend::new();
        let outcome = backend.sign_up("a@example.com", "secret1", "sam").unwrap();
        assert!(matches!(outcome, SignUpOutcome::SignedIn(_)));

        let session = backend.sign_in("a@example.com", "secret1").unwrap();
        assert_eq!(session.email, "a@example.com");
        assert!(backend.fetch_profile(&session).unwrap().is_none());
    }

    #[test]
    fn test_bad_password_is_auth_error() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "secret1", "sam").unwrap();

        let err = backend.sign_in("a@example.com", "wrong").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_unconfirmed_account_cannot_sign_in() {
        let backend = MemoryBackend::new();
        backend.require_confirmation(true);
        let outcome = backend.sign_up("a@example.com", "secret1", "sam").unwrap();
        assert!(matches!(outcome, SignUpOutcome::PendingConfirmation { .. }));

        let err = backend.sign_in("a@example.com", "secret1").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::EmailNotConfirmed)));

        backend.confirm("a@example.com");
        assert!(backend.sign_in("a@example.com", "secret1").is_ok());
    }

    #[test]
    fn test_duplicate_sign_up_rejected() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "secret1", "sam").unwrap();
        let err = backend.sign_up("a@example.com", "other", "sam").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::UserExists)));
    }

    #[test]
    fn test_signed_out_token_is_rejected() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "secret1", "sam").unwrap();
        let session = backend.sign_in("a@example.com", "secret1").unwrap();

        backend.sign_out(&session).unwrap();
        assert!(backend.fetch_logs(&session).is_err());
    }
}
