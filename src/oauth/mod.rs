//! OAuth2 module — token lifecycle and credential management
//!
//! This module provides:
//! - Credential records built from provider token responses
//! - Per-user token storage (file-backed and in-memory)
//! - The OAuth2 client adapter (authorize URL, exchange, refresh, revoke)
//! - The token lifecycle manager orchestrating the above
//! - A local callback server for the CLI login flow

mod callback;
mod client;
mod credentials;
mod lifecycle;
mod store;

pub use callback::{wait_for_callback, AuthorizationResult, CallbackError};
pub use client::{OAuthClient, ProviderConfig};
pub use credentials::CredentialRecord;
pub use lifecycle::{TokenLifecycleManager, User};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
