// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Startup implementations (config loading)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load and validate configuration
// 2. Initialize the detector (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and the message event handler

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::antispam::RepeatMessageDetector;
use crate::discord::antispam::enforcement;
use crate::discord::{Data, Error};
use crate::infra::antispam::load_detection_config;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_CONFIG_PATH: &str = "data/antispam.json";

/// Event handler for non-command Discord events.
/// Every inbound guild message is fed through the flood detector here.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        match enforcement::handle_message_for_flood(ctx, new_message, data).await {
            Ok(true) => {
                tracing::debug!(
                    author_id = new_message.author.id.get(),
                    "Message handled as flood"
                );
            }
            Ok(false) => {}
            Err(e) => {
                // Detection must never take the event loop down.
                tracing::error!("Flood check failed: {}", e);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Load the static detection config, validate it once, and build the
    // detector. Invalid configuration aborts startup - the detector never
    // re-validates per call.

    let config_path =
        std::env::var("ANTISPAM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let detection_config =
        load_detection_config(&config_path).expect("Failed to load anti-spam config");
    detection_config
        .validate()
        .expect("Invalid anti-spam config");

    tracing::info!(
        window_seconds = detection_config.window_seconds,
        repeat_threshold = detection_config.repeat_threshold,
        similarity_threshold = detection_config.similarity_threshold,
        action = %detection_config.action,
        "Anti-spam detector configured"
    );

    let detector = Arc::new(RepeatMessageDetector::new(detection_config));

    // Create the data structure that will be shared across all commands
    let data = Data {
        detector,
        started_at: Instant::now(),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Configure the poise framework with our commands and settings.

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![discord::antispam::commands::antispam()],
            // Event handler for messages
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                // Register slash commands globally (can take up to an hour
                // to propagate; use register_in_guild during development)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                tracing::info!("Commands registered, bot is ready");
                Ok(data)
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
