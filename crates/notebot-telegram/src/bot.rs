//! Main Telegram bot implementation.

use std::sync::Arc;

use notebot_core::{Classifier, Config};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use crate::error::{Result, TelegramError};
use crate::handlers::{handle_callback, handle_command, handle_message, Command};
use crate::state::{create_shared_state, BotState};

/// The Telegram bot for Notebot.
pub struct NoteBot {
    /// The teloxide bot instance.
    bot: Bot,
    /// Shared state across handlers.
    state: Arc<BotState>,
}

impl NoteBot {
    /// Create a new NoteBot from validated configuration.
    pub fn new(config: Config, classifier: Arc<dyn Classifier>) -> Result<Self> {
        if config.telegram_bot_token.is_empty() {
            return Err(TelegramError::NoToken);
        }

        let bot = Bot::new(&config.telegram_bot_token);
        let state = create_shared_state(config, classifier);
        Ok(Self { bot, state })
    }

    /// Create a NoteBot with custom state (for testing).
    pub fn with_state(state: Arc<BotState>) -> Result<Self> {
        let token = state.config().telegram_bot_token.clone();
        if token.is_empty() {
            return Err(TelegramError::NoToken);
        }

        Ok(Self {
            bot: Bot::new(token),
            state,
        })
    }

    pub fn state(&self) -> &Arc<BotState> {
        &self.state
    }

    /// Get the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TelegramError::BotStartFailed(e.to_string()))?;
        Ok(me.username().to_string())
    }

    /// Start the bot in long-polling mode. Runs until Ctrl-C.
    pub async fn start_polling(&self) -> Result<()> {
        info!("Starting Telegram bot in polling mode...");

        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!(error = %e, "Failed to register command list");
        }

        let bot = self.bot.clone();
        let state_for_commands = Arc::clone(&self.state);
        let state_for_messages = Arc::clone(&self.state);
        let state_for_callbacks = Arc::clone(&self.state);

        let handler = dptree::entry()
            .branch(
                Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                    let state = Arc::clone(&state_for_callbacks);
                    async move { handle_callback(bot, q, state).await }
                }),
            )
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
                        let state = Arc::clone(&state_for_commands);
                        info!(chat_id = %msg.chat.id, "Command matched: {:?}", cmd);
                        async move { handle_command(bot, msg, cmd, state).await }
                    }),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.text().is_some_and(|t| t.starts_with('/')))
                    .endpoint(|bot: Bot, msg: Message| async move {
                        if let Some(text) = msg.text() {
                            info!(cmd = %text, "Unrecognized command");
                            bot.send_message(msg.chat.id, unknown_command_reply(text))
                                .await?;
                        }
                        respond(())
                    }),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.text().is_some_and(|t| !t.starts_with('/')))
                    .endpoint(move |bot: Bot, msg: Message| {
                        let state = Arc::clone(&state_for_messages);
                        info!(chat_id = %msg.chat.id, "Note message received");
                        async move { handle_message(bot, msg, state).await }
                    }),
            );

        info!("Bot is running! Send /start to begin.");

        Dispatcher::builder(bot, handler)
            .default_handler(|upd| async move {
                warn!("Unhandled update: {:?}", upd.id);
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Bot stopped");
        Ok(())
    }
}

/// Reply for a `/command` that did not parse.
pub fn unknown_command_reply(text: &str) -> String {
    let command = text.split_whitespace().next().unwrap_or(text);
    format!(
        "Unknown command: {}\n\nUse /help to see available commands.",
        command
    )
}
