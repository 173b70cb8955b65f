//! Supabase-compatible REST backend.
//!
//! Auth goes through GoTrue (`/auth/v1/...`), tables through PostgREST
//! (`/rest/v1/...`). Every request carries the project API key; data
//! requests also carry the session's bearer token.

use super::{LogRow, ProfileRow, RemoteBackend, SignUpOutcome};
use crate::config::RemoteConfig;
use crate::types::Session;
use crate::{AuthError, Error, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// GoTrue returns either a session (with `user`) or a bare user
#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthErrorBody {
    fn text(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "authentication failed".into())
    }

    fn into_auth_error(self) -> AuthError {
        let text = self.text();
        let lower = text.to_lowercase();
        match self.error_code.as_deref() {
            Some("invalid_credentials") => AuthError::InvalidCredentials,
            Some("email_not_confirmed") => AuthError::EmailNotConfirmed,
            Some("user_already_exists") | Some("email_exists") => AuthError::UserExists,
            _ if lower.contains("invalid login credentials") => AuthError::InvalidCredentials,
            _ if lower.contains("email not confirmed") => AuthError::EmailNotConfirmed,
            _ if lower.contains("already registered") => AuthError::UserExists,
            _ => AuthError::Rejected(text),
        }
    }
}

impl RestBackend {
    /// Build a backend from configuration
    ///
    /// Fails with [`AuthError::NotConfigured`] when the URL or key is
    /// missing.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let (url, key) = match (&config.url, &config.api_key) {
            (Some(u), Some(k)) if !u.is_empty() && !k.is_empty() => (u, k),
            _ => return Err(AuthError::NotConfigured.into()),
        };

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn authed(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
    }

    fn auth_call(&self, builder: RequestBuilder) -> Result<AuthResponse> {
        let response = self.anon(builder).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }
        let body: AuthErrorBody = response.json().unwrap_or_default();
        tracing::debug!("Auth request failed with {}: {}", status, body.text());
        Err(body.into_auth_error().into())
    }

    fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected(format!("{}: {}", status, text)).into());
        }
        Err(Error::Remote(format!("{}: {}", status, text)))
    }
}

impl RemoteBackend for RestBackend {
    fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<SignUpOutcome> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "username": username },
        });
        let response = self.auth_call(self.client.post(self.url("/auth/v1/signup")).json(&body))?;

        match (response.access_token, response.user) {
            (Some(token), Some(user)) => Ok(SignUpOutcome::SignedIn(Session {
                account_id: user.id,
                email: user.email.unwrap_or_else(|| email.to_string()),
                access_token: token,
            })),
            (_, Some(user)) => Ok(SignUpOutcome::PendingConfirmation {
                account_id: user.id,
                email: user.email.unwrap_or_else(|| email.to_string()),
            }),
            (_, None) => {
                let id = response
                    .id
                    .ok_or_else(|| Error::Remote("sign-up response has no user".into()))?;
                Ok(SignUpOutcome::PendingConfirmation {
                    account_id: id,
                    email: response.email.unwrap_or_else(|| email.to_string()),
                })
            }
        }
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let body = json!({ "email": email, "password": password });
        let response = self.auth_call(
            self.client
                .post(self.url("/auth/v1/token?grant_type=password"))
                .json(&body),
        )?;

        match (response.access_token, response.user) {
            (Some(token), Some(user)) => Ok(Session {
                account_id: user.id,
                email: user.email.unwrap_or_else(|| email.to_string()),
                access_token: token,
            }),
            _ => Err(Error::Remote("sign-in response has no session".into())),
        }
    }

    fn sign_out(&self, session: &Session) -> Result<()> {
        let request = self.authed(self.client.post(self.url("/auth/v1/logout")), session);
        Self::check(request.send()?)?;
        Ok(())
    }

    fn fetch_profile(&self, session: &Session) -> Result<Option<ProfileRow>> {
        let request = self.authed(
            self.client
                .get(self.url("/rest/v1/profiles"))
                .query(&[("id", format!("eq.{}", session.account_id))])
                .query(&[("select", "*")]),
            session,
        );
        let rows: Vec<ProfileRow> = Self::check(request.send()?)?.json()?;
        Ok(rows.into_iter().next())
    }

    fn upsert_profile(&self, session: &Session, row: &ProfileRow) -> Result<()> {
        let request = self.authed(
            self.client
                .post(self.url("/rest/v1/profiles"))
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(row),
            session,
        );
        Self::check(request.send()?)?;
        Ok(())
    }

    fn fetch_logs(&self, session: &Session) -> Result<Vec<LogRow>> {
        let request = self.authed(
            self.client
                .get(self.url("/rest/v1/logs"))
                .query(&[("user_id", format!("eq.{}", session.account_id))])
                .query(&[("select", "*"), ("order", "timestamp.asc")]),
            session,
        );
        Ok(Self::check(request.send()?)?.json()?)
    }

    fn insert_logs(&self, session: &Session, rows: &[LogRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self.authed(
            self.client
                .post(self.url("/rest/v1/logs"))
                .header("Prefer", "return=minimal")
                .json(rows),
            session,
        );
        Self::check(request.send()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url_and_key() {
        let config = RemoteConfig::default();
        let err = RestBackend::from_config(&config).err().unwrap();
        assert!(matches!(err, Error::Auth(AuthError::NotConfigured)));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let config = RemoteConfig {
            url: Some("https://example.supabase.co/".into()),
            api_key: Some("anon".into()),
            timeout_seconds: 5,
        };
        let backend = RestBackend::from_config(&config).unwrap();
        assert_eq!(backend.url("/rest/v1/logs"), "https://example.supabase.co/rest/v1/logs");
    }

    #[test]
    fn test_auth_error_mapping() {
        let body = AuthErrorBody {
            error_code: Some("invalid_credentials".into()),
            ..Default::default()
        };
        assert_eq!(body.into_auth_error(), AuthError::InvalidCredentials);

        let body = AuthErrorBody {
            msg: Some("Email not confirmed".into()),
            ..Default::default()
        };
        assert_eq!(body.into_auth_error(), AuthError::EmailNotConfirmed);

        let body = AuthErrorBody {
            msg: Some("rate limited".into()),
            ..Default::default()
        };
        assert_eq!(body.into_auth_error(), AuthError::Rejected("rate limited".into()));
    }
}
