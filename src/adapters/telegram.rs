//! Telegram adapter using teloxide

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MediaKind, MessageKind};
use tracing::{debug, error, info};

use super::Channel;
use crate::config::Config;
use crate::dispatcher::{CommandDispatcher, Notifier};
use crate::oauth::User;
use crate::Result;

/// Notifier that answers in the chat the command came from
struct ChatNotifier {
    bot: Bot,
    chat_id: ChatId,
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn notify(&self, _user: &User, text: &str) -> Result<()> {
        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }
}

/// Telegram channel adapter
pub struct TelegramChannel {
    bot: Bot,
    config: Config,
    dispatcher: Arc<CommandDispatcher>,
}

impl TelegramChannel {
    pub fn new(config: Config, dispatcher: CommandDispatcher) -> Self {
        let bot = Bot::new(&config.telegram.token);
        Self {
            bot,
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    async fn handle_message(&self, message: teloxide::types::Message) -> Result<()> {
        let chat_id = message.chat.id;
        let from = message.from();

        // Authorization check
        if !self.is_allowed(from) {
            debug!("Ignoring message from unauthorized user: {:?}", from);
            return Ok(());
        }

        // Get text content
        let text = match message.kind {
            MessageKind::Common(ref common) => match &common.media_kind {
                MediaKind::Text(media) => &media.text,
                _ => return Ok(()), // Ignore non-text messages
            },
            _ => return Ok(()),
        };

        // Only the /oauth command is handled
        let Some(args) = parse_oauth_command(text) else {
            return Ok(());
        };

        let Some(from) = from else { return Ok(()) };
        let user = User::new(
            from.id.to_string(),
            from.username.clone().unwrap_or_else(|| from.id.to_string()),
        );

        info!("Received oauth command from {}: {:?}", user.username, args);

        let notifier = ChatNotifier {
            bot: self.bot.clone(),
            chat_id,
        };

        // The dispatcher owns the error boundary; nothing propagates here
        self.dispatcher.dispatch(&user, &args, &notifier).await;

        Ok(())
    }

    fn is_allowed(&self, user: Option<&teloxide::types::User>) -> bool {
        if self.config.telegram.allow_from.is_empty() {
            return true; // Empty allow list means open (dev mode)
        }

        let Some(user) = user else { return false };
        let username = user.username.as_deref().unwrap_or("");
        let id = user.id.to_string();

        self.config
            .telegram
            .allow_from
            .iter()
            .any(|allowed| allowed == username || allowed == &id)
    }
}

/// Extract the argument list from an `/oauth ...` message
///
/// Returns `None` for any other text so unrelated chat is ignored.
/// `/oauth@BotName` addressing is accepted too.
fn parse_oauth_command(text: &str) -> Option<Vec<String>> {
    let mut tokens = text.split_whitespace();
    let command = tokens.next()?;

    let name = command.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name != "oauth" {
        return None;
    }

    Some(tokens.map(String::from).collect())
}

// Helper to wrap the event loop
async fn run_telegram_loop(channel: Arc<TelegramChannel>) {
    let handler = Update::filter_message().endpoint(
        move |_bot: Bot, msg: teloxide::types::Message, channel: Arc<TelegramChannel>| async move {
            if let Err(e) = channel.handle_message(msg).await {
                error!("Error handling telegram message: {}", e);
            }
            respond(())
        },
    );

    Dispatcher::builder(channel.bot.clone(), handler)
        .dependencies(dptree::deps![channel])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn start(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        let this = Arc::new(Self {
            bot: self.bot.clone(),
            config: self.config.clone(),
            dispatcher: self.dispatcher.clone(),
        });

        async move {
            info!("Starting Telegram bot...");
            run_telegram_loop(this).await;
            Ok(())
        }
    }

    fn stop(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        async {
            // Teloxide dispatcher handles Ctrl+C, no manual stop needed
            Ok(())
        }
    }
}
