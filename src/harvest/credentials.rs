//! Credential pool with round-robin session assignment
//!
//! Every configured identity gets its own HTTP session. Outbound requests take
//! sessions in strict rotation so the request quota is spread across identities.
//! There is no health checking here: a revoked token surfaces as API errors in
//! the fetcher.

use crate::config::{ApiConfig, CredentialEntry};
use crate::ConfigError;
use reqwest::{Client, RequestBuilder};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// One authenticated HTTP session
#[derive(Debug)]
pub struct CredentialSession {
    identity: String,
    secret: String,
    client: Client,
    usage: AtomicU64,
}

impl CredentialSession {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Number of requests this session has been assigned
    pub fn usage_count(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    /// Starts an authenticated GET request
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.identity, Some(&self.secret))
    }
}

/// Pool of sessions handed out round-robin
#[derive(Debug)]
pub struct CredentialPool {
    sessions: Vec<Arc<CredentialSession>>,
    counter: AtomicUsize,
}

impl CredentialPool {
    /// Builds one session per credential
    ///
    /// # Returns
    ///
    /// * `Ok(CredentialPool)` - At least one session was built
    /// * `Err(ConfigError)` - No credentials, a blank field, or the HTTP client failed to build
    pub fn new(credentials: &[CredentialEntry], api: &ApiConfig) -> Result<Self, ConfigError> {
        if credentials.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let mut sessions = Vec::with_capacity(credentials.len());
        for entry in credentials {
            if entry.user_name.trim().is_empty() || entry.api_token.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "credential '{}' is missing user-name or api-token",
                    entry.user_name
                )));
            }

            let client = build_http_client(api).map_err(|e| {
                ConfigError::Validation(format!("failed to build HTTP client: {}", e))
            })?;

            sessions.push(Arc::new(CredentialSession {
                identity: entry.user_name.clone(),
                secret: entry.api_token.clone(),
                client,
                usage: AtomicU64::new(0),
            }));
        }

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
        })
    }

    /// Hands out the next session in rotation
    ///
    /// Safe to call from any number of concurrent tasks: the rotation counter is a
    /// single atomic increment.
    pub fn acquire(&self) -> Arc<CredentialSession> {
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed);
        let session = &self.sessions[ticket % self.sessions.len()];
        session.usage.fetch_add(1, Ordering::Relaxed);
        Arc::clone(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Usage counter of every session, in configuration order
    pub fn usage_counts(&self) -> Vec<(String, u64)> {
        self.sessions
            .iter()
            .map(|s| (s.identity.clone(), s.usage_count()))
            .collect()
    }
}

/// Builds an HTTP client for API requests
pub fn build_http_client(api: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(api.user_agent.as_str())
        .timeout(api.request_timeout())
        .connect_timeout(std::time::Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}
