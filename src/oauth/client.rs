//! OAuth2 client adapter — the protocol primitives
//!
//! A thin wrapper over the authorization-code flow against a configured
//! provider endpoint set: authorization URL construction, code exchange,
//! refresh, and revoke. Constructed once at startup and threaded through
//! explicitly; it holds no mutable state.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::credentials::CredentialRecord;
use crate::error::Error;
use crate::Result;

/// Google OAuth2 endpoints
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// OAuth2 scope required for sending mail via the Gmail API
const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Static provider configuration, read-only after startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_revoke_url")]
    pub revoke_url: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_auth_url() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_revoke_url() -> String {
    GOOGLE_REVOKE_URL.to_string()
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8085/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![GMAIL_SEND_SCOPE.to_string()]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            revoke_url: default_revoke_url(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

/// Provider token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Token exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

/// Token refresh request
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    grant_type: &'a str,
}

/// OAuth2 client adapter
///
/// Any OAuth2-compliant authorization-code provider works; the endpoint set
/// comes entirely from [`ProviderConfig`].
#[derive(Clone)]
pub struct OAuthClient {
    config: ProviderConfig,
    http: Client,
}

impl OAuthClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    /// Build the authorization URL embedding client id, redirect URI,
    /// scopes, and the caller-supplied `state`
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| Error::OAuth(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url.to_string())
    }

    /// Exchange an authorization code for a credential record
    pub async fn exchange_code(&self, code: &str) -> Result<CredentialRecord> {
        let request = TokenExchangeRequest {
            code,
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            redirect_uri: &self.config.redirect_uri,
            grant_type: "authorization_code",
        };

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let raw: serde_json::Value = response.json().await?;
        parse_token_response(raw, None)
    }

    /// Refresh an access token
    ///
    /// The provider may omit the refresh token in its response; the one
    /// passed in is preserved in that case.
    pub async fn refresh(&self, refresh_token: &str) -> Result<CredentialRecord> {
        let request = RefreshRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            refresh_token,
            grant_type: "refresh_token",
        };

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let raw: serde_json::Value = response.json().await?;
        parse_token_response(raw, Some(refresh_token))
    }

    /// Revoke a token at the provider's revoke endpoint
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.config.revoke_url)
            .form(&[("token", token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Build a credential record out of a raw token-endpoint payload,
/// retaining the payload itself
fn parse_token_response(
    raw: serde_json::Value,
    prior_refresh_token: Option<&str>,
) -> Result<CredentialRecord> {
    let parsed: TokenResponse = serde_json::from_value(raw.clone())?;

    let refresh = parsed
        .refresh_token
        .or_else(|| prior_refresh_token.map(String::from));

    Ok(CredentialRecord::new(
        parsed.access_token,
        refresh,
        parsed.expires_in,
        parsed.scope,
        raw,
    ))
}

/// Generate a random alphanumeric string for the `state` parameter
pub(crate) fn generate_state() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient::new(ProviderConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "http://127.0.0.1:8085/callback".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_authorization_url_embeds_config() {
        let url = client().authorization_url("state123").unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8085%2Fcallback"));
        assert!(url.contains("state=state123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("gmail.send"));
    }

    #[test]
    fn test_parse_token_response_keeps_raw_payload() {
        let raw = serde_json::json!({
            "access_token": "ya29.abc",
            "refresh_token": "1//r",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/gmail.send",
            "token_type": "Bearer",
            "id_token": "not-otherwise-modeled",
        });

        let record = parse_token_response(raw, None).unwrap();
        assert_eq!(record.access_token, "ya29.abc");
        assert_eq!(record.refresh_token.as_deref(), Some("1//r"));
        assert!(record.expires_at.is_some());
        assert_eq!(record.raw["id_token"], "not-otherwise-modeled");
    }

    #[test]
    fn test_parse_token_response_preserves_prior_refresh_token() {
        let raw = serde_json::json!({
            "access_token": "ya29.new",
            "expires_in": 3599,
        });

        let record = parse_token_response(raw, Some("kept")).unwrap();
        assert_eq!(record.refresh_token.as_deref(), Some("kept"));
    }

    #[test]
    fn test_generate_state() {
        let state = generate_state();
        assert_eq!(state.len(), 16);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, generate_state());
    }

    #[tokio::test]
    async fn test_exchange_transport_failure_is_typed() {
        // Nothing listens on this port; the error must be Transport,
        // not Provider
        let client = OAuthClient::new(ProviderConfig {
            token_url: "http://127.0.0.1:9/token".to_string(),
            ..Default::default()
        });

        match client.exchange_code("code").await {
            Err(Error::Transport(_)) => {}
            other => panic!("expected transport error, got {:?}", other.map(|_| ())),
        }
    }
}
