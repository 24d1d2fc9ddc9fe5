//! Command handlers for the Telegram bot.

use std::collections::BTreeMap;
use std::sync::Arc;

use notebot_models::{ClassificationSource, NoteSummary, Provenance};
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::utils::command::BotCommands;
use teloxide::utils::html::escape;
use tracing::{debug, error, info, warn};

use crate::error::TelegramError;
use crate::state::{BotState, NoteOutcome, SavedNote, ValidationError};

/// Callback data for the confirmation keyboard.
pub const CALLBACK_ACCEPT: &str = "note:accept";
pub const CALLBACK_CHOOSE: &str = "note:custom";
pub const CALLBACK_CANCEL: &str = "note:cancel";

/// Default and maximum number of notes shown by /recent.
pub const DEFAULT_RECENT_LIMIT: usize = 10;
pub const MAX_RECENT_LIMIT: usize = 50;

/// Maximum number of search results listed in one reply.
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Default backup age for /cleanup, in days.
pub const DEFAULT_CLEANUP_DAYS: u64 = 30;

const UNAUTHORIZED_TEXT: &str = "⛔ You are not authorized to use this bot.";
const STORAGE_FAILURE_TEXT: &str = "❌ Something went wrong while accessing your notes. Please try again later.";

/// Bot commands that can be invoked with /.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot and get help")]
    Start,

    #[command(description = "Show help message")]
    Help,

    #[command(description = "List your note categories")]
    Classes,

    #[command(description = "Show note statistics")]
    Stats,

    #[command(description = "Show recent notes: /recent [limit]")]
    Recent(String),

    #[command(description = "Search notes: /search <query> [in <category>]")]
    Search(String),

    #[command(description = "Discard the note waiting for confirmation")]
    Cancel,

    #[command(description = "Delete old backups (admin): /cleanup [days]")]
    Cleanup(String),
}

/// Extracts the sender of a message.
pub fn provenance(msg: &Message) -> Option<Provenance> {
    let user = msg.from.as_ref()?;
    let username = user
        .username
        .clone()
        .unwrap_or_else(|| user.first_name.clone());
    Some(Provenance::new(user.id.0 as i64, username, i64::from(msg.id.0)))
}

fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|u| u.id.0 as i64)
}

/// The Accept / Choose different / Cancel keyboard.
pub fn confirmation_keyboard(category: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            format!("✅ Save to {}", category),
            CALLBACK_ACCEPT,
        )],
        vec![
            InlineKeyboardButton::callback("✏️ Choose different", CALLBACK_CHOOSE),
            InlineKeyboardButton::callback("🗑 Cancel", CALLBACK_CANCEL),
        ],
    ])
}

async fn reply_html(bot: &Bot, chat_id: ChatId, text: impl Into<String>) -> ResponseResult<()> {
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Sends the reply for a conversation turn, with the confirmation keyboard
/// when the note is waiting for a decision.
async fn send_outcome(
    bot: &Bot,
    chat_id: ChatId,
    result: Result<NoteOutcome, TelegramError>,
) -> ResponseResult<()> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(chat_id = %chat_id, error = %e, "Note turn failed");
            return reply_html(bot, chat_id, STORAGE_FAILURE_TEXT).await;
        }
    };

    let text = format_outcome(&outcome);
    match &outcome {
        NoteOutcome::AwaitingConfirmation { suggestion, .. } => {
            bot.send_message(chat_id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(confirmation_keyboard(&suggestion.category))
                .await?;
            Ok(())
        }
        _ => reply_html(bot, chat_id, text).await,
    }
}

/// Handle the /start command.
pub async fn handle_start(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let welcome = format!(
        "Welcome to Notebot! 📝\n\n\
        Send me any text and I will file it as a note in the right category.\n\n\
        <b>How it works:</b>\n\
        1. Send a note as a normal message\n\
        2. I suggest a category (or save it right away if I'm confident)\n\
        3. Confirm, pick a different category, or cancel\n\n\
        Confident threshold: {}%\n\n\
        Type /help for all commands.",
        (state.config().confidence_threshold * 100.0).round() as u32
    );

    reply_html(&bot, msg.chat.id, welcome).await?;

    info!(chat_id = %msg.chat.id, user = ?msg.from.as_ref().map(|u| &u.username), "User started bot");
    Ok(())
}

/// Handle the /help command.
pub async fn handle_help(bot: Bot, msg: Message) -> ResponseResult<()> {
    let help_text = format!(
        "{}\n\nAny other message is saved as a note.",
        Command::descriptions()
    );
    bot.send_message(msg.chat.id, help_text).await?;
    Ok(())
}

/// Handle the /classes command.
pub async fn handle_classes(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let text = match state.stats() {
        Ok(counts) => format_categories(&counts),
        Err(e) => {
            error!(error = %e, "Failed to list categories");
            STORAGE_FAILURE_TEXT.to_string()
        }
    };
    reply_html(&bot, msg.chat.id, text).await
}

/// Handle the /stats command.
pub async fn handle_stats(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let text = match state.stats() {
        Ok(counts) => format_stats(&counts),
        Err(e) => {
            error!(error = %e, "Failed to count notes");
            STORAGE_FAILURE_TEXT.to_string()
        }
    };
    reply_html(&bot, msg.chat.id, text).await
}

/// Handle the /recent command.
pub async fn handle_recent(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
    arg: String,
) -> ResponseResult<()> {
    let Some(limit) = parse_recent_limit(&arg) else {
        return reply_html(
            &bot,
            msg.chat.id,
            format!(
                "<b>Usage:</b> <code>/recent [limit]</code>\n\nLimit is a number from 1 to {}.",
                MAX_RECENT_LIMIT
            ),
        )
        .await;
    };

    let text = match state.recent(limit) {
        Ok(notes) => format_recent(&notes),
        Err(e) => {
            error!(error = %e, "Failed to list recent notes");
            STORAGE_FAILURE_TEXT.to_string()
        }
    };
    reply_html(&bot, msg.chat.id, text).await
}

/// Handle the /search command.
pub async fn handle_search(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
    arg: String,
) -> ResponseResult<()> {
    let Some((query, category)) = parse_search_args(&arg) else {
        return reply_html(
            &bot,
            msg.chat.id,
            "<b>Usage:</b> <code>/search &lt;query&gt; [in &lt;category&gt;]</code>\n\n\
            Example: <code>/search pasta in cooking</code>",
        )
        .await;
    };

    let text = match state.search(&query, category.as_deref()) {
        Ok(results) => format_search(&query, category.as_deref(), &results),
        Err(e) => {
            error!(error = %e, query = %query, "Search failed");
            STORAGE_FAILURE_TEXT.to_string()
        }
    };
    reply_html(&bot, msg.chat.id, text).await
}

/// Handle the /cancel command.
pub async fn handle_cancel(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    send_outcome(&bot, msg.chat.id, state.cancel_pending(user_id).await).await
}

/// Handle the /cleanup command (admin only).
pub async fn handle_cleanup(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
    arg: String,
) -> ResponseResult<()> {
    let user_id = sender_id(&msg).unwrap_or_default();
    if !state.is_admin(user_id) {
        warn!(user_id = %user_id, "Non-admin tried /cleanup");
        return reply_html(&bot, msg.chat.id, UNAUTHORIZED_TEXT).await;
    }

    let Some(days) = parse_cleanup_days(&arg) else {
        return reply_html(
            &bot,
            msg.chat.id,
            "<b>Usage:</b> <code>/cleanup [days]</code>\n\nDays must be a positive number.",
        )
        .await;
    };

    let text = match state.cleanup_backups(days) {
        Ok(removed) => format!(
            "🧹 Removed {} backup{} older than {} day{}.",
            removed,
            plural(removed),
            days,
            plural(days as usize)
        ),
        Err(e) => {
            error!(error = %e, "Backup cleanup failed");
            STORAGE_FAILURE_TEXT.to_string()
        }
    };
    reply_html(&bot, msg.chat.id, text).await
}

/// Handle a plain text message: a new note, or a category name for the
/// pending one.
pub async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let (Some(text), Some(provenance)) = (msg.text(), provenance(&msg)) else {
        return Ok(());
    };

    let result = state.process_message(provenance, text).await;
    send_outcome(&bot, msg.chat.id, result).await
}

/// Handle a button press on the confirmation keyboard.
pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let user_id = q.from.id.0 as i64;
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(user_id));

    bot.answer_callback_query(q.id.clone()).await?;

    let result = match q.data.as_deref() {
        Some(CALLBACK_ACCEPT) => state.accept_pending(user_id).await,
        Some(CALLBACK_CHOOSE) => state.choose_different(user_id).await,
        Some(CALLBACK_CANCEL) => state.cancel_pending(user_id).await,
        other => {
            warn!(data = ?other, "Unknown callback data");
            return Ok(());
        }
    };

    // Drop the keyboard so the same suggestion cannot be answered twice.
    if !matches!(result, Ok(NoteOutcome::AwaitingCategory { .. })) {
        if let Some(message) = q.message.as_ref() {
            if let Err(e) = bot.edit_message_reply_markup(chat_id, message.id()).await {
                debug!(error = %e, "Failed to remove confirmation keyboard");
            }
        }
    }

    send_outcome(&bot, chat_id, result).await
}

/// Main command dispatcher.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let public = matches!(cmd, Command::Start | Command::Help);
    if !public && !sender_id(&msg).is_some_and(|id| state.is_authorized(id)) {
        warn!(chat_id = %msg.chat.id, "Rejected command from unauthorized user");
        return reply_html(&bot, msg.chat.id, UNAUTHORIZED_TEXT).await;
    }

    match cmd {
        Command::Start => handle_start(bot, msg, state).await,
        Command::Help => handle_help(bot, msg).await,
        Command::Classes => handle_classes(bot, msg, state).await,
        Command::Stats => handle_stats(bot, msg, state).await,
        Command::Recent(arg) => handle_recent(bot, msg, state, arg).await,
        Command::Search(arg) => handle_search(bot, msg, state, arg).await,
        Command::Cancel => handle_cancel(bot, msg, state).await,
        Command::Cleanup(arg) => handle_cleanup(bot, msg, state, arg).await,
    }
}

// --- Argument parsing ---

/// Parses the /recent argument. Empty means the default; numbers are
/// clamped to `1..=MAX_RECENT_LIMIT`.
pub fn parse_recent_limit(arg: &str) -> Option<usize> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Some(DEFAULT_RECENT_LIMIT);
    }
    arg.parse::<usize>()
        .ok()
        .map(|n| n.clamp(1, MAX_RECENT_LIMIT))
}

/// Splits `/search` arguments into a query and an optional category, as in
/// `pasta in cooking`.
pub fn parse_search_args(arg: &str) -> Option<(String, Option<String>)> {
    let arg = arg.trim();
    if arg.is_empty() {
        return None;
    }

    if let Some((query, category)) = arg.rsplit_once(" in ") {
        let (query, category) = (query.trim(), category.trim());
        if !query.is_empty() && !category.is_empty() && !category.contains(char::is_whitespace) {
            return Some((query.to_string(), Some(category.to_lowercase())));
        }
    }

    Some((arg.to_string(), None))
}

/// Parses the /cleanup argument. Empty means the default.
pub fn parse_cleanup_days(arg: &str) -> Option<u64> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Some(DEFAULT_CLEANUP_DAYS);
    }
    arg.parse::<u64>().ok().filter(|&d| d > 0)
}

// --- Reply formatting ---

/// Renders the reply for a conversation turn.
pub fn format_outcome(outcome: &NoteOutcome) -> String {
    match outcome {
        NoteOutcome::Saved(saved) => format_saved(saved),
        NoteOutcome::AwaitingConfirmation {
            suggestion,
            low_confidence,
        } => {
            let mut text = if *low_confidence {
                format!(
                    "🤔 I'm not sure where this belongs.\n\n\
                    Best guess: <b>{}</b> ({}% confidence)\n\n\
                    Save it there, choose a different category, or cancel.",
                    escape(&suggestion.category),
                    suggestion.confidence_percent()
                )
            } else {
                format!(
                    "🆕 This looks like a new category: <b>{}</b> ({}% confidence)\n\n\
                    Create it, choose a different category, or cancel.",
                    escape(&suggestion.category),
                    suggestion.confidence_percent()
                )
            };
            if suggestion.is_fallback() {
                text.push_str("\n\n<i>AI classifier unavailable, suggestion from keyword rules.</i>");
            }
            text
        }
        NoteOutcome::AwaitingCategory { suggestion } => format!(
            "✏️ Send the category name for this note (suggested: <b>{}</b>).\n\n\
            Use /cancel to discard it.",
            escape(&suggestion.category)
        ),
        NoteOutcome::Cancelled => "🗑 Note discarded.".to_string(),
        NoteOutcome::NoPending => {
            "There is no note waiting for a category. It may have expired.".to_string()
        }
        NoteOutcome::Unauthorized => UNAUTHORIZED_TEXT.to_string(),
        NoteOutcome::RateLimited { retry_after } => format!(
            "⏳ Slow down! You can send another note in {}s.",
            retry_after.as_secs().max(1)
        ),
        NoteOutcome::Invalid(ValidationError::Empty) => {
            "Please send some text to save as a note.".to_string()
        }
        NoteOutcome::Invalid(ValidationError::TooLong { length, max }) => format!(
            "That note is too long ({} characters). The limit is {}.",
            length, max
        ),
        NoteOutcome::InvalidCategory(name) => format!(
            "\"{}\" is not a usable category name.\n\n\
            Use a short name with letters, digits, '-' or '_', or /cancel.",
            escape(name)
        ),
    }
}

fn format_saved(saved: &SavedNote) -> String {
    let filename = saved
        .path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let source = match saved.source {
        ClassificationSource::Model => "AI",
        ClassificationSource::Fallback => "keyword rules",
        ClassificationSource::User => "your choice",
    };

    format!(
        "✅ Saved to <b>{}</b>{}\n📄 <code>{}</code>\nConfidence: {}% ({})",
        escape(&saved.category),
        if saved.new_category { " (new category)" } else { "" },
        escape(&filename),
        (saved.confidence * 100.0).round() as u32,
        source
    )
}

/// Renders the /classes reply.
pub fn format_categories(counts: &BTreeMap<String, usize>) -> String {
    if counts.is_empty() {
        return "No categories yet. Send me a note to get started!".to_string();
    }

    let mut text = format!("📁 <b>Categories ({})</b>\n", counts.len());
    for (category, count) in counts {
        text.push_str(&format!(
            "\n• {} ({} note{})",
            escape(category),
            count,
            plural(*count)
        ));
    }
    text
}

/// Renders the /stats reply, largest category first.
pub fn format_stats(counts: &BTreeMap<String, usize>) -> String {
    let total: usize = counts.values().sum();
    if total == 0 {
        return "📊 No notes yet. Send me a note to get started!".to_string();
    }

    let mut sorted: Vec<(&String, &usize)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut text = format!(
        "📊 <b>Note statistics</b>\n\nTotal notes: {}\nCategories: {}\n",
        total,
        counts.len()
    );
    for (category, count) in sorted {
        let percent = *count as f64 * 100.0 / total as f64;
        text.push_str(&format!(
            "\n• {}: {} ({:.1}%)",
            escape(category),
            count,
            percent
        ));
    }
    text
}

/// Renders the /recent reply.
pub fn format_recent(notes: &[NoteSummary]) -> String {
    if notes.is_empty() {
        return "No notes yet. Send me a note to get started!".to_string();
    }

    let mut text = format!("🕒 <b>Recent notes ({})</b>\n", notes.len());
    for (i, note) in notes.iter().enumerate() {
        text.push_str(&format_summary_line(i + 1, note));
    }
    text
}

/// Renders the /search reply, listing at most [`MAX_SEARCH_RESULTS`].
pub fn format_search(query: &str, category: Option<&str>, results: &[NoteSummary]) -> String {
    let scope = category
        .map(|c| format!(" in <b>{}</b>", escape(c)))
        .unwrap_or_default();

    if results.is_empty() {
        return format!("🔍 No notes found for \"{}\"{}.", escape(query), scope);
    }

    let mut text = format!("🔍 <b>Results for \"{}\"</b>{}\n", escape(query), scope);
    for (i, note) in results.iter().take(MAX_SEARCH_RESULTS).enumerate() {
        text.push_str(&format_summary_line(i + 1, note));
    }
    if results.len() > MAX_SEARCH_RESULTS {
        text.push_str(&format!(
            "\n\n<i>Showing {} of {} results.</i>",
            MAX_SEARCH_RESULTS,
            results.len()
        ));
    }
    text
}

fn format_summary_line(index: usize, note: &NoteSummary) -> String {
    format!(
        "\n{}. <b>{}</b>\n   📁 {} · {}",
        index,
        escape(&note.title),
        escape(&note.category),
        note.created_at.format("%Y-%m-%d %H:%M")
    )
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
