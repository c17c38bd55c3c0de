//! Command dispatcher — routes `oauth` subcommands to lifecycle operations
//!
//! A single-entry state machine keyed by the first argument token:
//! `token`, `refresh`, `revoke`, `mail`; any other first argument (or none)
//! falls through to the authorize-URL branch. Every invocation produces
//! exactly one notification to the acting user through the [`Notifier`],
//! and no failure escapes past the dispatch boundary.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::mail::{MailMessage, MailSender};
use crate::oauth::{TokenLifecycleManager, User};
use crate::Result;

/// The single outbound channel back to the invoking user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: &User, text: &str) -> Result<()>;
}

/// Routes one command invocation to the appropriate lifecycle operation
pub struct CommandDispatcher {
    lifecycle: Arc<TokenLifecycleManager>,
    sender: MailSender,
    message: MailMessage,
}

impl CommandDispatcher {
    pub fn new(
        lifecycle: Arc<TokenLifecycleManager>,
        sender: MailSender,
        message: MailMessage,
    ) -> Self {
        Self {
            lifecycle,
            sender,
            message,
        }
    }

    /// Dispatch one invocation and notify the user with its outcome
    ///
    /// Failures are caught here: logged with operation and user context,
    /// then reported as a single failure notification. This method never
    /// returns an error to the hosting channel.
    pub async fn dispatch(&self, user: &User, args: &[String], notifier: &dyn Notifier) {
        let subcommand = args.first().map(String::as_str).unwrap_or("");

        let outcome = self.execute(user, subcommand).await;

        let text = match outcome {
            Ok(text) => text,
            Err(e) if e.is_not_authorized() => {
                // Expected user state, not an operational failure
                info!("user {} is not authorized: {}", user.username, e);
                "No access token found. Please authorize the app first.".to_string()
            }
            Err(e) => {
                error!(
                    "error executing oauth command {:?} for user {}: {}",
                    subcommand, user.username, e
                );
                format!("An error occurred while processing the oauth command: {e}")
            }
        };

        if let Err(e) = notifier.notify(user, &text).await {
            warn!("failed to notify user {}: {}", user.username, e);
        }
    }

    async fn execute(&self, user: &User, subcommand: &str) -> Result<String> {
        match subcommand {
            "token" => match self.lifecycle.get_token(user).await? {
                Some(record) => Ok(format!("Access token: {}", record.access_token)),
                None => Ok("No access token found. Please authorize the app first.".to_string()),
            },

            "refresh" => {
                self.lifecycle.refresh(user).await?;
                Ok("Access token refreshed successfully.".to_string())
            }

            "revoke" => {
                self.lifecycle.revoke(user).await?;
                Ok("Access token revoked successfully.".to_string())
            }

            "mail" => match self.lifecycle.get_token(user).await? {
                Some(record) => {
                    let payload = self.sender.send(&record.access_token, &self.message).await?;
                    let id = payload
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    Ok(format!("Mail sent (id: {id}). Mail Service Completed"))
                }
                None => Ok("No access token found. Please authorize the app first.".to_string()),
            },

            // Unrecognized subcommands intentionally share the default
            // authorize branch
            _ => {
                let url = self.lifecycle.authorization_url(user)?;
                Ok(format!("Please authorize the app by visiting: {url}"))
            }
        }
    }
}
