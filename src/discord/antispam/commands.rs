// Anti-spam slash commands - the administrative toggle surface.
//
// The toggle is held in process memory only. On restart every guild falls
// back to the configured default the first time a message arrives; this
// matches the intentional lazy default-on policy and is documented, not a
// persistence bug to fix.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Anti-spam controls.
#[poise::command(
    slash_command,
    subcommands("on", "off", "status"),
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn antispam(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - subcommands do the work
    Ok(())
}

/// Enable anti-spam detection in this server.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn on(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    ctx.data().detector.set_enabled(guild_id.get(), true);
    ctx.send(
        poise::CreateReply::default()
            .content("🛡️ AntiSpam **enabled** in this server.")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Disable anti-spam detection in this server.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn off(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    ctx.data().detector.set_enabled(guild_id.get(), false);
    ctx.send(
        poise::CreateReply::default()
            .content("🛡️ AntiSpam **disabled** in this server (until restart or `/antispam on`).")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show anti-spam status and the active parameters.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    let detector = &ctx.data().detector;
    let config = detector.config();
    let enabled = detector.is_enabled(guild_id.get());

    let action_value = match config.action {
        crate::core::antispam::ActionKind::Timeout => format!(
            "{} ({}m)",
            config.action,
            config.timeout_duration_secs / 60
        ),
        _ => config.action.to_string(),
    };

    let mut embed = serenity::CreateEmbed::new()
        .title("🛡️ AntiSpam — Status")
        .color(if enabled { 0x00FF00 } else { 0xFF0000 })
        .field("Active", if enabled { "Yes" } else { "No" }, true)
        .field("Window", format!("{}s", config.window_seconds), true)
        .field("Threshold", format!("{}×", config.repeat_threshold), true)
        .field(
            "Similarity",
            format!("{:.2}", config.similarity_threshold),
            true,
        )
        .field("Action", action_value, true)
        .field(
            "Cooldown",
            format!("{}s", config.action_cooldown_seconds),
            true,
        )
        .field(
            "Log channel",
            config
                .log_channel_id
                .map(|id| format!("<#{}>", id))
                .unwrap_or_else(|| "off".to_string()),
            true,
        );

    if !config.exempt_roles.is_empty() {
        let roles = config
            .exempt_roles
            .iter()
            .map(|id| format!("<@&{}>", id))
            .collect::<Vec<_>>()
            .join(", ");
        embed = embed.field("Exempt roles", roles, false);
    }
    if !config.exempt_channels.is_empty() {
        let channels = config
            .exempt_channels
            .iter()
            .map(|id| format!("<#{}>", id))
            .collect::<Vec<_>>()
            .join(", ");
        embed = embed.field("Exempt channels", channels, false);
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
