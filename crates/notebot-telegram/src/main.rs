//! Notebot binary.
//!
//! Start the bot with:
//! ```bash
//! TELEGRAM_BOT_TOKEN=xxx cargo run -p notebot-telegram
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use notebot_core::{config, Config, OllamaClassifier};
use notebot_telegram::NoteBot;
use tracing_subscriber::EnvFilter;

/// Notebot - file Telegram messages as categorized markdown notes
#[derive(Parser, Debug)]
#[command(name = "notebot")]
#[command(about = "Telegram bot that classifies notes with a local LLM and stores them as markdown")]
struct Args {
    /// Notes directory (overrides NOTES_DIRECTORY)
    #[arg(long, value_name = "PATH")]
    notes_dir: Option<PathBuf>,

    /// Validate configuration and probe Ollama, then exit
    #[arg(long)]
    check: bool,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Earlier files win: dotenvy never overrides a variable that is already set.
    let env_path = config::env_file();
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let filter = match args.verbose {
        0 => "notebot=info,notebot_telegram=info,notebot_core=info,notebot_persistence=info,teloxide=warn",
        1 => "notebot=debug,notebot_telegram=debug,notebot_core=debug,notebot_persistence=debug,teloxide=info",
        2 => "notebot=trace,notebot_telegram=trace,notebot_core=trace,notebot_persistence=trace,teloxide=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::from_env()?;
    if let Some(dir) = &args.notes_dir {
        config = config.with_notes_dir(dir);
    }
    config.ensure_notes_dir()?;
    tracing::debug!(config = ?config, "Configuration loaded");

    let classifier = OllamaClassifier::from_config(&config)?;
    let ollama_up = classifier.is_available().await;
    if ollama_up {
        tracing::info!(url = %config.ollama_base_url, model = %config.ollama_model, "Ollama reachable");
    } else {
        tracing::warn!(
            url = %config.ollama_base_url,
            "Ollama unreachable, notes will be classified with keyword rules until it comes back"
        );
    }

    if args.check {
        println!("\n[ok] Configuration valid");
        println!("   Notes: {}", config.notes_dir.display());
        println!("   Ollama: {} ({})", config.ollama_base_url, config.ollama_model);
        println!(
            "   Status: {}",
            if ollama_up { "reachable" } else { "UNREACHABLE (fallback rules)" }
        );
        return Ok(());
    }

    let notes_dir = config.notes_dir.clone();
    let bot = NoteBot::new(config, Arc::new(classifier))?;

    match bot.get_me().await {
        Ok(username) => {
            tracing::info!(username = %username, "Bot initialized successfully");
            println!("\n[robot] Notebot");
            println!("   Bot: @{}", username);
            println!("   Mode: polling");
            println!("   Notes: {}", notes_dir.display());
            println!(
                "   Classifier: {}",
                if ollama_up { "ollama" } else { "keyword rules (Ollama unreachable)" }
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get bot info");
            return Err(e.into());
        }
    }

    println!("\n[phone] Open Telegram and send /start to begin");
    println!("   Press Ctrl+C to stop\n");

    bot.start_polling().await?;

    Ok(())
}
