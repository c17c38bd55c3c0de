//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;
use crate::mail::MailMessage;
use crate::oauth::ProviderConfig;
use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OAuth2 provider endpoints and client credentials
    #[serde(default)]
    pub provider: ProviderConfig,

    /// The message the `mail` subcommand sends
    #[serde(default)]
    pub mail: MailMessage,

    /// Telegram configuration
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Directory holding per-user credential files
    #[serde(default = "default_token_dir")]
    pub token_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub allow_from: Vec<String>,
}

fn default_token_dir() -> PathBuf {
    config_dir().join("tokens")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            mail: MailMessage::default(),
            telegram: TelegramConfig::default(),
            token_dir: default_token_dir(),
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mailbridge")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file
pub fn load() -> Result<Config> {
    let path = config_path();

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'mailbridge onboard' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}

/// Initialize configuration interactively
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::{Confirm, Text};

    println!("  Welcome! I'll help you get MailBridge configured in a few steps.\n");

    let mut config = Config::default();

    // 1. OAuth client credentials
    ui::print_step("Create an OAuth client (Web application) in the Google Cloud Console");
    let client_id = Text::new("Enter your OAuth client id:")
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    let client_secret = Text::new("Enter your OAuth client secret:")
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if client_id.is_empty() || client_secret.is_empty() {
        return Err(Error::Config("Client id and secret cannot be empty".to_string()));
    }

    config.provider.client_id = client_id;
    config.provider.client_secret = client_secret;

    let keep_redirect = Confirm::new(&format!(
        "Use default redirect URI ({})?",
        config.provider.redirect_uri
    ))
    .with_default(true)
    .prompt()
    .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if !keep_redirect {
        config.provider.redirect_uri = Text::new("Enter redirect URI:")
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    }

    // 2. Mail payload
    let to = Text::new("Recipient for the 'mail' command:")
        .with_default(&config.mail.to)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.mail.to = to;

    // 3. Telegram gateway (optional)
    let telegram = Confirm::new("Set up the Telegram gateway now?")
        .with_default(false)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if telegram {
        setup_telegram_gateway(&mut config)?;
    }

    // 4. Token directory
    ui::print_thinking("Creating token directory");
    std::fs::create_dir_all(&config.token_dir)?;

    // 5. Save config
    ui::print_thinking("Saving configuration");
    save(&config)?;

    println!();
    ui::print_success("Setup complete!");
    ui::print_step("Run 'mailbridge login' to authorize, or 'mailbridge gateway' to start the bot.");

    Ok(())
}

/// Helper to setup the Telegram gateway interactively
pub fn setup_telegram_gateway(config: &mut Config) -> Result<()> {
    use crate::ui;
    use colored::Colorize;
    use inquire::Text;

    println!();
    ui::print_step("To setup a Telegram bot:");
    println!("    1. Message {} on Telegram", "@BotFather".cyan().bold());
    println!("    2. Send {} and choose a name", "/newbot".cyan());
    println!("    3. Copy the {} provided", "API Token".cyan());
    println!();

    let token = Text::new("Enter your Telegram Bot Token:")
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if token.is_empty() {
        return Err(Error::Config("Token cannot be empty".to_string()));
    }

    config.telegram.enabled = true;
    config.telegram.token = token;

    let user = whoami::username();
    config.telegram.allow_from = vec![user.clone()];

    ui::print_step(&format!("Auto-whitelisted local user: {}", user.cyan()));

    Ok(())
}
