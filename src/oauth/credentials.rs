//! Credential records — one user's OAuth2 grant
//!
//! A record is created on the first successful code exchange, replaced
//! whole on refresh, and deleted on revoke. Reads never create one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored OAuth2 grant for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialRecord {
    /// The access token for API requests
    pub access_token: String,

    /// The refresh token for obtaining new access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires (absent if the provider gave no lifetime)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Scopes granted
    #[serde(default)]
    pub scope: Vec<String>,

    /// The unmodified provider response payload, kept for fields not
    /// otherwise modeled
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl CredentialRecord {
    /// Build a record from the fields of a token-endpoint response
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scope: Option<String>,
        raw: serde_json::Value,
    ) -> Self {
        let expires_at = expires_in_secs.map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        Self {
            access_token,
            refresh_token,
            expires_at,
            scope: scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            raw,
        }
    }

    /// Check if the access token is expired or about to expire
    ///
    /// Returns true if the token expires within the next 5 minutes
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => {
                let buffer = chrono::Duration::minutes(5);
                Utc::now() + buffer >= expires
            }
            None => false, // No expiry means token doesn't expire
        }
    }

    /// Check if we have a refresh token
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}
