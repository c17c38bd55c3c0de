//! Token lifecycle manager
//!
//! Sole owner of write access to stored credentials. Orchestrates the
//! authorize / exchange / refresh / revoke operations against the token
//! store and the OAuth client adapter, and serializes mutating operations
//! per user so concurrent refresh/revoke calls for one user cannot lose
//! updates. Operations for different users never contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{generate_state, OAuthClient};
use super::credentials::CredentialRecord;
use super::store::TokenStore;
use crate::error::Error;
use crate::Result;

/// The acting user identity behind a command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable external identifier, the credential key
    pub id: String,
    /// Display name for logs and notifications
    pub username: String,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Orchestrates the OAuth2 token lifecycle against the store and client
pub struct TokenLifecycleManager {
    client: OAuthClient,
    store: Arc<dyn TokenStore>,
    // Per-user serialization of mutating operations; entries are created
    // lazily and keyed by user id so cross-user calls never block each other
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenLifecycleManager {
    pub fn new(client: OAuthClient, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Build the authorization URL for a user
    ///
    /// The `state` parameter carries the user id plus a random suffix so the
    /// eventual callback can be correlated back to the user. Never touches
    /// the store.
    pub fn authorization_url(&self, user: &User) -> Result<String> {
        self.authorization_request(user).map(|(url, _)| url)
    }

    /// Like [`authorization_url`](Self::authorization_url), but also hands
    /// back the embedded state for callers that validate the callback
    /// themselves (the CLI login flow).
    pub fn authorization_request(&self, user: &User) -> Result<(String, String)> {
        let state = format!("{}.{}", user.id, generate_state());
        let url = self.client.authorization_url(&state)?;
        Ok((url, state))
    }

    /// Recover the user id embedded in a callback `state` parameter
    pub fn user_id_from_state(state: &str) -> Option<&str> {
        state.rsplit_once('.').map(|(user_id, _)| user_id)
    }

    /// Exchange an authorization code and store the resulting credential
    ///
    /// On success the stored record is an unconditional whole-record
    /// overwrite keyed by the user id. On any failure nothing is written,
    /// so a prior credential (if any) survives.
    pub async fn exchange_code(&self, user: &User, code: &str) -> Result<CredentialRecord> {
        let lock = self.user_lock(&user.id).await;
        let _guard = lock.lock().await;

        let record = self.client.exchange_code(code).await?;
        self.store.save(&user.id, &record).await?;

        info!("access token stored for user {}", user.username);
        Ok(record)
    }

    /// Read the stored credential for a user
    ///
    /// `Ok(None)` means "not yet authorized" — an expected state, not an
    /// error.
    pub async fn get_token(&self, user: &User) -> Result<Option<CredentialRecord>> {
        let record = self.store.load(&user.id).await?;
        match &record {
            Some(_) => debug!("access token retrieved for user {}", user.username),
            None => debug!("no access token on file for user {}", user.username),
        }
        Ok(record)
    }

    /// Refresh the stored access token using the refresh token on file
    ///
    /// Fails without touching the store when no record or no refresh token
    /// exists, or when the provider rejects the refresh.
    pub async fn refresh(&self, user: &User) -> Result<CredentialRecord> {
        let lock = self.user_lock(&user.id).await;
        let _guard = lock.lock().await;

        let record = self.store.load(&user.id).await?.ok_or_else(|| {
            Error::NotAuthorized(format!("no credential on file for user {}", user.username))
        })?;

        let refresh_token = record.refresh_token.as_deref().ok_or_else(|| {
            Error::NotAuthorized(format!("no refresh token on file for user {}", user.username))
        })?;

        let refreshed = self.client.refresh(refresh_token).await?;
        self.store.save(&user.id, &refreshed).await?;

        info!("access token refreshed for user {}", user.username);
        Ok(refreshed)
    }

    /// Revoke the stored token at the provider and delete the local record
    ///
    /// The local record is removed even when the remote revoke fails, so a
    /// stale credential never outlives an explicit revoke; the remote
    /// failure is still returned to the caller afterwards.
    pub async fn revoke(&self, user: &User) -> Result<()> {
        let lock = self.user_lock(&user.id).await;
        let _guard = lock.lock().await;

        let record = self.store.load(&user.id).await?.ok_or_else(|| {
            Error::NotAuthorized(format!("no credential on file for user {}", user.username))
        })?;

        let remote = self.client.revoke(&record.access_token).await;

        self.store.delete(&user.id).await?;

        match remote {
            Ok(()) => {
                info!("access token revoked for user {}", user.username);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "remote revoke failed for user {}, local record cleared anyway: {}",
                    user.username, e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::client::ProviderConfig;
    use crate::oauth::store::MemoryTokenStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on an ephemeral port and return its URL
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 4096];
            let _ = socket.read(&mut buffer).await;

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    fn manager_with(config: ProviderConfig) -> (TokenLifecycleManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = TokenLifecycleManager::new(OAuthClient::new(config), store.clone());
        (manager, store)
    }

    fn stored_record(access: &str, refresh: Option<&str>) -> CredentialRecord {
        CredentialRecord::new(
            access.to_string(),
            refresh.map(String::from),
            Some(3600),
            None,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn test_get_token_without_credential_is_none() {
        let (manager, _) = manager_with(ProviderConfig::default());
        let user = User::new("u1", "alice");

        assert!(manager.get_token(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exchange_then_get_roundtrip() {
        let token_url = one_shot_server(
            "200 OK",
            r#"{"access_token":"ya29.fresh","refresh_token":"1//r","expires_in":3599,"scope":"https://www.googleapis.com/auth/gmail.send"}"#,
        )
        .await;

        let (manager, _) = manager_with(ProviderConfig {
            token_url,
            ..Default::default()
        });
        let user = User::new("u1", "alice");

        let exchanged = manager.exchange_code(&user, "auth-code").await.unwrap();
        let loaded = manager.get_token(&user).await.unwrap().unwrap();

        assert_eq!(loaded, exchanged);
        assert_eq!(loaded.access_token, "ya29.fresh");
    }

    #[tokio::test]
    async fn test_exchange_failure_preserves_prior_credential() {
        let token_url = one_shot_server("400 Bad Request", r#"{"error":"invalid_grant"}"#).await;

        let (manager, store) = manager_with(ProviderConfig {
            token_url,
            ..Default::default()
        });
        let user = User::new("u1", "alice");

        let prior = stored_record("old-token", Some("old-refresh"));
        store.save(&user.id, &prior).await.unwrap();

        let err = manager.exchange_code(&user, "bad-code").await.unwrap_err();
        assert!(matches!(err, Error::Provider { status: 400, .. }));

        // The failed exchange wrote nothing
        assert_eq!(manager.get_token(&user).await.unwrap().unwrap(), prior);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_untouched() {
        let (manager, store) = manager_with(ProviderConfig::default());
        let user = User::new("u1", "alice");

        let prior = stored_record("token-only", None);
        store.save(&user.id, &prior).await.unwrap();

        let err = manager.refresh(&user).await.unwrap_err();
        assert!(err.is_not_authorized());
        assert_eq!(manager.get_token(&user).await.unwrap().unwrap(), prior);
    }

    #[tokio::test]
    async fn test_refresh_without_credential_fails() {
        let (manager, _) = manager_with(ProviderConfig::default());
        let user = User::new("u1", "alice");

        assert!(manager.refresh(&user).await.unwrap_err().is_not_authorized());
    }

    #[tokio::test]
    async fn test_refresh_overwrites_record() {
        let token_url = one_shot_server(
            "200 OK",
            r#"{"access_token":"ya29.refreshed","expires_in":3599}"#,
        )
        .await;

        let (manager, store) = manager_with(ProviderConfig {
            token_url,
            ..Default::default()
        });
        let user = User::new("u1", "alice");

        store
            .save(&user.id, &stored_record("stale", Some("1//keep")))
            .await
            .unwrap();

        let refreshed = manager.refresh(&user).await.unwrap();
        assert_eq!(refreshed.access_token, "ya29.refreshed");
        // Provider omitted the refresh token; the stored one is preserved
        assert_eq!(refreshed.refresh_token.as_deref(), Some("1//keep"));
        assert_eq!(manager.get_token(&user).await.unwrap().unwrap(), refreshed);
    }

    #[tokio::test]
    async fn test_revoke_clears_local_even_when_remote_fails() {
        // Nothing listens here, so the remote revoke is a transport failure
        let (manager, store) = manager_with(ProviderConfig {
            revoke_url: "http://127.0.0.1:9/revoke".to_string(),
            ..Default::default()
        });
        let user = User::new("u1", "alice");

        store
            .save(&user.id, &stored_record("doomed", Some("r")))
            .await
            .unwrap();

        let err = manager.revoke(&user).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        // Local record is gone regardless of the remote outcome
        assert!(manager.get_token(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_success_clears_local() {
        let revoke_url = one_shot_server("200 OK", "{}").await;

        let (manager, store) = manager_with(ProviderConfig {
            revoke_url,
            ..Default::default()
        });
        let user = User::new("u1", "alice");

        store
            .save(&user.id, &stored_record("bye", Some("r")))
            .await
            .unwrap();

        manager.revoke(&user).await.unwrap();
        assert!(manager.get_token(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_user_mutations_are_serialized() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        // Token endpoint that serves two slow responses and records whether
        // any two requests were ever in flight at the same time
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        {
            let in_flight = in_flight.clone();
            let overlaps = overlaps.clone();
            tokio::spawn(async move {
                for i in 0..2u32 {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let in_flight = in_flight.clone();
                    let overlaps = overlaps.clone();
                    tokio::spawn(async move {
                        if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }

                        let mut buffer = vec![0u8; 4096];
                        let _ = socket.read(&mut buffer).await;
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

                        let body = format!(r#"{{"access_token":"ya29.{i}","expires_in":3599}}"#);
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;

                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }

        let (manager, _) = manager_with(ProviderConfig {
            token_url: format!("http://{}", addr),
            ..Default::default()
        });
        let user = User::new("u1", "alice");

        let (first, second) = tokio::join!(
            manager.exchange_code(&user, "code-a"),
            manager.exchange_code(&user, "code-b"),
        );
        first.unwrap();
        second.unwrap();

        // The keyed lock must have run the two mutations back to back
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);

        // Last writer wins; either way a full record is on file
        let stored = manager.get_token(&user).await.unwrap().unwrap();
        assert!(stored.access_token == "ya29.0" || stored.access_token == "ya29.1");
    }

    #[tokio::test]
    async fn test_operations_for_different_users_do_not_interfere() {
        let token_url = one_shot_server(
            "200 OK",
            r#"{"access_token":"ya29.alice","expires_in":3599}"#,
        )
        .await;

        let (manager, store) = manager_with(ProviderConfig {
            token_url,
            ..Default::default()
        });
        let alice = User::new("u1", "alice");
        let bob = User::new("u2", "bob");

        store
            .save(&bob.id, &stored_record("bob-token", Some("r")))
            .await
            .unwrap();

        manager.exchange_code(&alice, "code").await.unwrap();

        assert_eq!(
            manager.get_token(&alice).await.unwrap().unwrap().access_token,
            "ya29.alice"
        );
        assert_eq!(
            manager.get_token(&bob).await.unwrap().unwrap().access_token,
            "bob-token"
        );
    }

    #[tokio::test]
    async fn test_authorization_url_state_roundtrip() {
        let (manager, _) = manager_with(ProviderConfig {
            client_id: "cid".to_string(),
            ..Default::default()
        });
        let user = User::new("user-42", "alice");

        let url = manager.authorization_url(&user).unwrap();
        assert!(url.contains("client_id=cid"));

        let parsed = url::Url::parse(&url).unwrap();
        let state = parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.to_string())
            .unwrap();

        assert_eq!(
            TokenLifecycleManager::user_id_from_state(&state),
            Some("user-42")
        );
    }
}
