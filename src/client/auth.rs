//! Session handling for the BI platform REST API.
//!
//! Log-on is a two-step handshake against `/biprws/logon/long`: an
//! unauthenticated `GET` hands out a session cookie, then a `POST` carrying that
//! cookie and the XML credentials returns the logon token in the
//! `X-SAP-LogonToken` response header. The token lives in a [`Session`] value
//! which the caller passes to every endpoint operation and eventually to
//! [`BiAuth::log_off`].

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::Client;

use crate::client::client::{ensure_json, ensure_success, token_header, JSON_CONTENT_TYPE};
use crate::client::error::{BiError, Result};
use crate::client::types::Credentials;

/// Header carrying the logon token on every authenticated request.
pub const LOGON_TOKEN_HEADER: &str = "X-SAP-LogonToken";

/// A logon token issued by the CMS.
///
/// The value is opaque and sent back verbatim. Expiry is not tracked: an
/// expired token shows up as a rejected request.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    username: String,
    issued_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            username: username.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// First characters of the token, safe for logs.
    pub fn preview(&self) -> String {
        let end = self
            .value
            .char_indices()
            .nth(10)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len());
        format!("{}...", &self.value[..end])
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &self.preview())
            .field("username", &self.username)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Logon state threaded through every API call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    /// No token; requests go out without the token header.
    #[default]
    None,
    Active(SessionToken),
}

impl Session {
    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            Session::None => None,
            Session::Active(token) => Some(token),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Session::Active(_))
    }
}

/// # Session Manager
///
/// Performs the log-on handshake and log-off call. It holds no token itself;
/// tokens are returned to the caller as [`Session`] values.
#[derive(Debug, Clone)]
pub struct BiAuth {
    base_url: String,
    client: Client,
}

impl BiAuth {
    pub fn new(base_url: String, client: Client) -> Self {
        Self { base_url, client }
    }

    /// Logs on and returns an active session.
    ///
    /// An existing session is never consulted; logging on again simply yields
    /// a new token.
    pub async fn log_on(&self, credentials: &Credentials) -> Result<Session> {
        tracing::info!(
            "Attempting log-on for user {} ({})",
            credentials.username,
            credentials.auth_type
        );
        let logon_url = format!("{}/biprws/logon/long", self.base_url);

        tracing::debug!("Fetching session cookie from: {}", logon_url);
        let response = self.client.get(&logon_url).send().await.map_err(|e| {
            tracing::error!("Network error during log-on: {}", e);
            e
        })?;
        let response = ensure_success(response).await?;
        let cookie = session_cookie(&response);

        let mut request = self
            .client
            .post(&logon_url)
            .header(CONTENT_TYPE, "application/xml")
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .body(credentials.to_logon_xml());
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        tracing::debug!("Log-on response status: {}", response.status());
        let response = ensure_success(response).await?;
        ensure_json(&response)?;

        let token = response
            .headers()
            .get(LOGON_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                tracing::error!("Log-on succeeded but no {} header was returned", LOGON_TOKEN_HEADER);
                BiError::protocol(
                    format!("a {} header", LOGON_TOKEN_HEADER),
                    "no token header",
                )
            })?;

        let token = SessionToken::new(token, credentials.username.clone());
        tracing::info!("Log-on successful for user: {}", credentials.username);
        tracing::debug!("Received token: {}", token.preview());

        Ok(Session::Active(token))
    }

    /// Ends the session on the server and resets `session` to [`Session::None`].
    ///
    /// With no active session the request is still sent, without a token; the
    /// server decides the outcome.
    pub async fn log_off(&self, session: &mut Session) -> Result<()> {
        let logoff_url = format!("{}/biprws/logoff", self.base_url);
        tracing::debug!("Logging off at: {}", logoff_url);

        let mut request = self.client.post(&logoff_url).header(ACCEPT, JSON_CONTENT_TYPE);
        match token_header(session)? {
            Some(value) => request = request.header(LOGON_TOKEN_HEADER, value),
            None => tracing::warn!("Log-off requested without an active session"),
        }

        let response = request.send().await?;
        let response = ensure_success(response).await?;
        if response.headers().contains_key(CONTENT_TYPE) {
            ensure_json(&response)?;
        }

        if let Some(token) = session.token() {
            tracing::info!("Logged off user: {}", token.username());
        }
        *session = Session::None;
        Ok(())
    }
}

/// Collects the `name=value` pairs of every `Set-Cookie` header.
fn session_cookie(response: &reqwest::Response) -> Option<String> {
    let pairs: Vec<&str> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}
