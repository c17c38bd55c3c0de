//! Mail send executor — the dependent action behind the `mail` subcommand
//!
//! Given a bearer token and a message payload, performs exactly one
//! authenticated call to the Gmail send endpoint. No retries, and no token
//! refresh on 401; the status is surfaced to the caller as-is.

use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Gmail API send endpoint
const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// The message payload, static per deployment and configured at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Default for MailMessage {
    fn default() -> Self {
        Self {
            to: "someone@example.com".to_string(),
            subject: "Testing MailAPI".to_string(),
            body: "Hi, if this works the mail bridge is sorted".to_string(),
        }
    }
}

/// Encode an RFC-822-like message as url-safe base64 without padding,
/// the format the Gmail send endpoint expects in its `raw` field
pub fn create_body(to: &str, subject: &str, body: &str) -> String {
    let message = format!(
        "To: {to}\r\n\
         Subject: {subject}\r\n\
         Content-Type: text/plain; charset=\"UTF-8\"\r\n\
         Content-Transfer-Encoding: 7bit\r\n\r\n\
         {body}"
    );

    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(message.as_bytes())
}

/// Basic shape check on a recipient address before sending
///
/// Intentionally simple; the goal is to catch obvious mistakes, not to
/// implement RFC 5321.
pub fn validate_address(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !email.chars().any(|c| c.is_whitespace() || c.is_control())
                && email.matches('@').count() == 1
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid recipient address: {email}")))
    }
}

/// Sends one message through the Gmail API with a bearer token
#[derive(Clone)]
pub struct MailSender {
    http: Client,
    endpoint: String,
}

impl Default for MailSender {
    fn default() -> Self {
        Self::new()
    }
}

impl MailSender {
    pub fn new() -> Self {
        Self::with_endpoint(GMAIL_SEND_URL)
    }

    /// Custom endpoint, used by tests
    pub fn with_endpoint(endpoint: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Perform the authenticated send call
    ///
    /// Returns the parsed success payload on 200, or
    /// [`Error::Provider`] carrying the HTTP status otherwise.
    pub async fn send(
        &self,
        access_token: &str,
        message: &MailMessage,
    ) -> Result<serde_json::Value> {
        validate_address(&message.to)?;

        let raw = create_body(&message.to, &message.subject, &message.body);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        let payload: serde_json::Value = response.json().await?;
        tracing::debug!("mail sent, response id: {:?}", payload.get("id"));
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on an ephemeral port and return its URL
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 8192];
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

    #[test]
    fn test_create_body_is_url_safe_without_padding() {
        let encoded = create_body("a@b.com", "Subj", "Body");

        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.ends_with('='));
    }

    #[test]
    fn test_create_body_decodes_to_literal_message() {
        let encoded = create_body("a@b.com", "Subj", "Body");

        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&encoded)
            .unwrap();
        let text = String::from_utf8(decoded).unwrap();

        assert_eq!(
            text,
            "To: a@b.com\r\nSubject: Subj\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\nContent-Transfer-Encoding: 7bit\r\n\r\nBody"
        );
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("user@example.com").is_ok());
        assert!(validate_address("user+tag@sub.domain.co").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("nope").is_err());
        assert!(validate_address("@example.com").is_err());
        assert!(validate_address("user@").is_err());
        assert!(validate_address("user@nodot").is_err());
        assert!(validate_address("user name@example.com").is_err());
        assert!(validate_address("user@@example.com").is_err());
    }

    #[tokio::test]
    async fn test_send_success_returns_payload() {
        let url = one_shot_server("200 OK", r#"{"id":"msg-1","threadId":"t-1"}"#).await;
        let sender = MailSender::with_endpoint(&url);

        let payload = sender
            .send("bearer-token", &MailMessage::default())
            .await
            .unwrap();
        assert_eq!(payload["id"], "msg-1");
    }

    #[tokio::test]
    async fn test_send_failure_carries_status() {
        let url = one_shot_server("403 Forbidden", r#"{"error":{"code":403}}"#).await;
        let sender = MailSender::with_endpoint(&url);

        let err = sender
            .send("bearer-token", &MailMessage::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { status: 403, .. }));
    }
}
