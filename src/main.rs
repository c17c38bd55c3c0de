//! MailBridge CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::sync::Arc;

use mailbridge::adapters::{cli::CliChannel, telegram::TelegramChannel, Channel, ChannelRegistry};
use mailbridge::config::Config;
use mailbridge::dispatcher::CommandDispatcher;
use mailbridge::mail::MailSender;
use mailbridge::oauth::{
    wait_for_callback, FileTokenStore, OAuthClient, TokenLifecycleManager, User,
};
use mailbridge::ui;

#[derive(Parser)]
#[command(name = "mailbridge")]
#[command(about = "📬 MailBridge - Google OAuth2 + Gmail send for your chat bot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize MailBridge configuration
    Onboard,

    /// Authorize with Google via the browser (local callback flow)
    Login,

    /// Revoke and remove the stored credential for the local user
    Logout,

    /// Run oauth commands from the console
    Console {
        /// Single command to dispatch (e.g. "token", "mail"); omit for a REPL
        #[arg(short, long)]
        command: Option<String>,
    },

    /// Start the Telegram gateway
    Gateway,

    /// Show MailBridge status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Setup Global Ctrl+C handler
    let exit_flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let r = exit_flag.clone();

    ctrlc::set_handler(move || {
        if r.load(std::sync::atomic::Ordering::SeqCst) {
            println!("\n👋 Bye!");
            std::process::exit(0);
        } else {
            println!("\n⚠️  Press Ctrl+C again to exit");
            r.store(true, std::sync::atomic::Ordering::SeqCst);

            // Reset flag after 3 seconds
            let r2 = r.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs(3));
                r2.store(false, std::sync::atomic::Ordering::SeqCst);
            });
        }
    })
    .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            println!("📬 Initializing MailBridge...");
            mailbridge::config::onboard()?;
        }

        Commands::Login => {
            let config = mailbridge::config::load()?;
            run_login(&config).await?;
        }

        Commands::Logout => {
            let config = mailbridge::config::load()?;
            run_logout(&config).await?;
        }

        Commands::Console { command } => {
            let config = mailbridge::config::load()?;
            let channel = CliChannel::new(build_dispatcher(&config), local_user());

            if let Some(line) = command {
                channel.run_once(&line).await;
            } else {
                println!("📬 MailBridge console (Ctrl+C or 'exit' to quit)\n");
                channel.run_interactive().await?;
            }
        }

        Commands::Gateway => {
            let config = mailbridge::config::load()?;

            if !ChannelRegistry::is_enabled("telegram", &config) {
                ui::print_warning(
                    "Telegram is disabled in config. Enable it and set 'token' to run the gateway.",
                );
                return Ok(());
            }

            let dispatcher = build_dispatcher(&config);
            let channel = TelegramChannel::new(config, dispatcher);
            println!("✓ Gateway started. Listening for Telegram messages...");
            channel.start().await?;
        }

        Commands::Status => {
            let config = mailbridge::config::load()?;
            println!("📬 MailBridge Status\n");
            println!(
                "OAuth client: {}",
                if config.provider.client_id.is_empty() {
                    "not set (run 'mailbridge onboard')"
                } else {
                    "✓"
                }
            );
            println!("Redirect URI: {}", config.provider.redirect_uri);
            println!("Mail recipient: {}", config.mail.to);

            for name in ChannelRegistry::available() {
                let state = if ChannelRegistry::is_enabled(name, &config) {
                    "enabled"
                } else {
                    "disabled"
                };
                println!(
                    "Channel {} ({}): {}",
                    name,
                    ChannelRegistry::description(name),
                    state
                );
            }

            let lifecycle = build_lifecycle(&config);
            match lifecycle.get_token(&local_user()).await? {
                Some(record) => println!(
                    "Local credential: ✓{}",
                    if record.is_expired() { " (expired)" } else { "" }
                ),
                None => println!("Local credential: not set (run 'mailbridge login')"),
            }
        }
    }

    Ok(())
}

/// The user identity for CLI-side commands
fn local_user() -> User {
    let name = whoami::username();
    User::new(name.clone(), name)
}

fn build_lifecycle(config: &Config) -> Arc<TokenLifecycleManager> {
    let client = OAuthClient::new(config.provider.clone());
    let store = Arc::new(FileTokenStore::new(config.token_dir.clone()));
    Arc::new(TokenLifecycleManager::new(client, store))
}

fn build_dispatcher(config: &Config) -> CommandDispatcher {
    CommandDispatcher::new(build_lifecycle(config), MailSender::new(), config.mail.clone())
}

async fn run_login(config: &Config) -> Result<()> {
    let lifecycle = build_lifecycle(config);
    let user = local_user();

    let (auth_url, state) = lifecycle.authorization_request(&user)?;

    println!("\n🔐 Opening browser for Google authentication...\n");
    println!("If the browser doesn't open, visit this URL:\n{}\n", auth_url);

    if let Err(e) = open::that(&auth_url) {
        tracing::warn!("Failed to open browser: {}", e);
    }

    println!("⏳ Waiting for authorization...");
    let callback = wait_for_callback(&config.provider.redirect_uri, Some(&state)).await?;

    println!("✓ Authorization received, exchanging token...\n");
    lifecycle.exchange_code(&user, &callback.code).await?;

    println!("✓ Authentication successful!");
    println!("  Credential stored under {:?}", config.token_dir);
    println!("\nTry it: mailbridge console -c token");

    Ok(())
}

async fn run_logout(config: &Config) -> Result<()> {
    let lifecycle = build_lifecycle(config);

    match lifecycle.revoke(&local_user()).await {
        Ok(()) => println!("✓ Logged out successfully"),
        Err(e) if e.is_not_authorized() => println!("No credential stored."),
        Err(e) => {
            // Local record is cleared even when the remote revoke fails
            ui::print_error(&format!("Remote revoke failed: {}", e));
            ui::print_step("Local credential removed.");
        }
    }

    Ok(())
}
