//! OAuth2 callback server
//!
//! A temporary local HTTP server that captures the authorization code from
//! the browser redirect during the CLI login flow. Accepts exactly one
//! connection, answers with a small status page, and returns the code.

use std::collections::HashMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use super::lifecycle::TokenLifecycleManager;
use crate::error::Error;
use crate::Result;

/// Success page shown after authorization
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>MailBridge | Authorization Successful</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: 'Inter', -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        .container { max-width: 400px; padding: 40px; }
        .icon { font-size: 64px; margin-bottom: 24px; }
        h1 { font-size: 24px; color: #34d399; margin: 0 0 12px; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div class="container">
        <div class="icon">&#128236;</div>
        <h1>Authorization Successful</h1>
        <p>MailBridge has been granted access.<br>You can close this window and return to your terminal.</p>
    </div>
</body>
</html>"#;

/// Error page
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>MailBridge | Authorization Failed</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: 'Inter', -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        .container { max-width: 400px; padding: 40px; }
        .icon { font-size: 64px; margin-bottom: 24px; }
        h1 { font-size: 24px; color: #ef4444; margin: 0 0 12px; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div class="container">
        <div class="icon">&#9888;</div>
        <h1>Authorization Failed</h1>
        <p>Something went wrong during authorization.<br>Please try again or check your terminal.</p>
    </div>
</body>
</html>"#;

/// Ways a callback redirect can be unusable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// The provider redirected back with an `error` parameter
    #[error("Authorization denied: {error} - {description}")]
    Denied { error: String, description: String },

    /// The `state` in the redirect does not match the one we issued
    #[error("State mismatch: expected {expected}, got {got}")]
    StateMismatch { expected: String, got: String },

    /// A `state` was expected but the redirect carries none
    #[error("Missing state parameter")]
    MissingState,

    /// The redirect carries neither a code nor an error
    #[error("Missing authorization code")]
    MissingCode,

    /// The request was not a parseable HTTP redirect at all
    #[error("Malformed callback request: {0}")]
    BadRequest(String),
}

/// Authorization code result from the callback
#[derive(Debug, Clone)]
pub struct AuthorizationResult {
    pub code: String,
    pub state: Option<String>,
}

impl AuthorizationResult {
    /// The user id embedded in the `state` parameter, if any
    pub fn user_id(&self) -> Option<&str> {
        self.state
            .as_deref()
            .and_then(TokenLifecycleManager::user_id_from_state)
    }
}

/// Start a temporary callback server on the redirect URI's port and wait for
/// the authorization code
///
/// `redirect_uri` must be a loopback URI such as
/// `http://127.0.0.1:8085/callback`.
pub async fn wait_for_callback(
    redirect_uri: &str,
    expected_state: Option<&str>,
) -> Result<AuthorizationResult> {
    let uri = Url::parse(redirect_uri)
        .map_err(|e| Error::OAuth(format!("Invalid redirect URI {}: {}", redirect_uri, e)))?;
    let port = uri
        .port()
        .ok_or_else(|| Error::OAuth(format!("Redirect URI has no port: {}", redirect_uri)))?;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        Error::OAuth(format!("Failed to start callback server on {}: {}", addr, e))
    })?;

    tracing::info!("Callback server listening on http://{}", addr);

    let expected_state = expected_state.map(|s| s.to_string());

    // Accept one connection
    let (mut socket, _) = listener
        .accept()
        .await
        .map_err(|e| Error::OAuth(format!("Failed to accept connection: {}", e)))?;

    let mut buffer = vec![0u8; 4096];
    let n = socket
        .read(&mut buffer)
        .await
        .map_err(|e| Error::OAuth(format!("Failed to read request: {}", e)))?;

    let request = String::from_utf8_lossy(&buffer[..n]);

    let result = parse_callback_request(&request, expected_state.as_deref());

    let (status, body) = match &result {
        Ok(_) => ("200 OK", SUCCESS_HTML),
        Err(_) => ("400 Bad Request", ERROR_HTML),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;

    result
}

/// Parse the redirect request line into an authorization result
///
/// The query is the only part we care about: `code` and `state` on success,
/// `error`/`error_description` on denial.
fn parse_callback_request(
    request: &str,
    expected_state: Option<&str>,
) -> Result<AuthorizationResult> {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| CallbackError::BadRequest("missing request line".to_string()))?;

    let url = Url::parse(&format!("http://localhost{}", path))
        .map_err(|e| CallbackError::BadRequest(e.to_string()))?;

    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = query.get("error") {
        return Err(CallbackError::Denied {
            error: error.clone(),
            description: query
                .get("error_description")
                .cloned()
                .unwrap_or_else(|| "Unknown error".to_string()),
        }
        .into());
    }

    let state = query.get("state").cloned();

    if let Some(expected) = expected_state {
        match state.as_deref() {
            Some(got) if got == expected => {}
            Some(got) => {
                return Err(CallbackError::StateMismatch {
                    expected: expected.to_string(),
                    got: got.to_string(),
                }
                .into())
            }
            None => return Err(CallbackError::MissingState.into()),
        }
    }

    let code = query
        .get("code")
        .cloned()
        .ok_or(CallbackError::MissingCode)?;

    Ok(AuthorizationResult { code, state })
}
