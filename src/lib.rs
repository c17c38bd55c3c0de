//! MailBridge - chat-bot bridge for Google OAuth2 and Gmail send
//!
//! This library provides the OAuth2 token lifecycle (authorize, exchange,
//! refresh, revoke), per-user credential storage, and the command dispatcher
//! that routes `token | refresh | revoke | mail` subcommands from a chat
//! channel to those operations.

pub mod adapters;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mail;
pub mod oauth;
pub mod ui;

pub use error::{Error, Result};
