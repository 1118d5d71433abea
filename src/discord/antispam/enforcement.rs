// Discord-specific flood handling - resolves exemptions, feeds the
// detector, and translates trigger outcomes into Discord actions.
//
// Enforcement failures (missing permission, network) are logged and
// swallowed here: detection is fire-and-forget per occurrence, and a
// failed action never rolls back or re-queues the detection.

use crate::core::antispam::{DetectionConfig, DetectionOutcome, FloodAction, FloodTrigger};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

/// Check a message for repeated-message flooding and apply the configured
/// action on a trigger.
///
/// Returns `true` if the message tripped the detector and was handled.
pub async fn handle_message_for_flood(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<bool, Error> {
    // Skip bots and DMs
    if msg.author.bot {
        return Ok(false);
    }
    let guild_id = match msg.guild_id {
        Some(id) => id,
        None => return Ok(false),
    };

    let is_exempt = resolve_exemption(ctx, msg, data, guild_id).await;

    let outcome = data.detector.observe(
        guild_id.get(),
        msg.author.id.get(),
        msg.channel_id.get(),
        is_exempt,
        data.now_seconds(),
        &msg.content,
    );

    match outcome {
        DetectionOutcome::NoAction => Ok(false),
        DetectionOutcome::Trigger(trigger) => {
            apply_flood_action(ctx, msg, data, guild_id, &trigger).await;
            Ok(true)
        }
    }
}

/// Resolve whether this message bypasses detection.
///
/// Exempt when the channel (or, for threads, the parent channel) is
/// whitelisted, or the author holds an exempt role or a role with
/// administrator permission. The detector only consumes the resulting
/// boolean.
async fn resolve_exemption(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
    guild_id: serenity::GuildId,
) -> bool {
    let config = data.detector.config();

    // Channel whitelist. With no whitelisted channels (the default) there
    // is nothing to resolve, so the thread-parent lookup is skipped and
    // no message costs a channel fetch.
    if !config.exempt_channels.is_empty() {
        let parent = thread_parent(ctx, msg).await;
        if is_channel_exempt(config, msg.channel_id.get(), parent) {
            return true;
        }
    }

    // Role and administrator checks via the cache. Clone what we need out
    // of the guard so nothing non-Send crosses an await point.
    let (member_roles, admin_roles) = match ctx.cache.guild(guild_id) {
        Some(guild) => {
            let roles = guild
                .members
                .get(&msg.author.id)
                .map(|m| m.roles.clone())
                .unwrap_or_default();
            let admins: Vec<serenity::RoleId> = guild
                .roles
                .iter()
                .filter(|(_, role)| role.permissions.administrator())
                .map(|(id, _)| *id)
                .collect();
            (roles, admins)
        }
        None => return false,
    };

    is_role_exempt(config, &member_roles, &admin_roles)
}

/// Parent channel of a thread message, `None` for regular channels.
///
/// Served from the cache; the REST fallback only runs on a cache miss.
async fn thread_parent(ctx: &serenity::Context, msg: &serenity::Message) -> Option<u64> {
    if let Some(channel) = ctx.cache.channel(msg.channel_id) {
        if channel.thread_metadata.is_some() {
            return channel.parent_id.map(|id| id.get());
        }
        return None;
    }

    match msg.channel_id.to_channel(ctx).await {
        Ok(serenity::Channel::Guild(channel)) if channel.thread_metadata.is_some() => {
            channel.parent_id.map(|id| id.get())
        }
        _ => None,
    }
}

/// Whether a channel is whitelisted, directly or through its thread parent.
fn is_channel_exempt(
    config: &DetectionConfig,
    channel_id: u64,
    thread_parent: Option<u64>,
) -> bool {
    config.exempt_channels.contains(&channel_id)
        || thread_parent.is_some_and(|parent| config.exempt_channels.contains(&parent))
}

/// Whether any held role grants exemption, by whitelist or by carrying
/// administrator permission.
fn is_role_exempt(
    config: &DetectionConfig,
    member_roles: &[serenity::RoleId],
    admin_roles: &[serenity::RoleId],
) -> bool {
    member_roles
        .iter()
        .any(|r| config.exempt_roles.contains(&r.get()) || admin_roles.contains(r))
}

/// Whether the platform rejected a call for lack of permission, as
/// opposed to a transient network or API failure.
fn is_permission_error(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 403
    )
}

/// Apply the configured action for a detected flood, then post the
/// moderation-log embed.
async fn apply_flood_action(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
    guild_id: serenity::GuildId,
    trigger: &FloodTrigger,
) {
    let action_label = match &trigger.action {
        FloodAction::Ban => {
            match guild_id
                .ban_with_reason(
                    &ctx.http,
                    msg.author.id,
                    0,
                    "Auto-ban: repeated message flood",
                )
                .await
            {
                Ok(()) => "BAN".to_string(),
                Err(e) => {
                    tracing::error!(
                        user_id = msg.author.id.get(),
                        "Failed to ban flooding user: {}",
                        e
                    );
                    send_log_note(ctx, data, failure_note(msg.author.id, &e, "Ban Members")).await;
                    return;
                }
            }
        }

        FloodAction::Timeout { duration } => {
            let timeout_until = match serenity::Timestamp::from_unix_timestamp(
                chrono::Utc::now().timestamp() + duration.as_secs() as i64,
            ) {
                Ok(ts) => ts,
                Err(e) => {
                    tracing::error!("Failed to create timeout timestamp: {}", e);
                    return;
                }
            };

            match guild_id
                .edit_member(
                    &ctx.http,
                    msg.author.id,
                    serenity::EditMember::new()
                        .disable_communication_until_datetime(timeout_until)
                        .audit_log_reason("Auto-timeout: repeated message flood"),
                )
                .await
            {
                Ok(_) => format!("TIMEOUT {}m", duration.as_secs() / 60),
                Err(e) => {
                    tracing::error!(
                        user_id = msg.author.id.get(),
                        "Failed to timeout flooding user: {}",
                        e
                    );
                    send_log_note(
                        ctx,
                        data,
                        failure_note(msg.author.id, &e, "Moderate Members"),
                    )
                    .await;
                    return;
                }
            }
        }

        FloodAction::FlagOnly => "FLAG".to_string(),
    };

    tracing::info!(
        user_id = msg.author.id.get(),
        guild_id = guild_id.get(),
        similar_count = trigger.similar_count,
        action = %action_label,
        "Repeated-message flood handled"
    );

    send_trigger_log(ctx, data, msg, trigger, &action_label).await;
}

/// Build the log note for a failed enforcement call. Only an actual 403
/// claims a missing permission; anything else is reported as-is.
fn failure_note(
    author_id: serenity::UserId,
    err: &serenity::Error,
    needed_permission: &str,
) -> String {
    if is_permission_error(err) {
        format!(
            "⚠️ AntiSpam: could not act on <@{}> (missing **{}** permission).",
            author_id, needed_permission
        )
    } else {
        format!("❌ AntiSpam: failed to act on <@{}>: `{}`", author_id, err)
    }
}

/// Post the red trigger embed to the configured moderation-log channel.
async fn send_trigger_log(
    ctx: &serenity::Context,
    data: &Data,
    msg: &serenity::Message,
    trigger: &FloodTrigger,
    action_label: &str,
) {
    let Some(log_channel) = data.detector.config().log_channel_id else {
        return;
    };

    let embed = serenity::CreateEmbed::new()
        .title("🚨 AntiSpam Triggered")
        .description(format!(
            "<@{}> (`{}`) — **{}**",
            msg.author.id,
            msg.author.id,
            action_label
        ))
        .color(0xFF0000)
        .field("Channel", format!("<#{}>", trigger.channel_id), true)
        .field("Window", format!("{}s", trigger.window_seconds), true)
        .field(
            "Threshold",
            format!(
                "{}× (sim ≥ {:.2})",
                trigger.repeat_threshold, trigger.similarity_threshold
            ),
            true,
        )
        .field("Last message", trigger.matched_text.clone(), false)
        .thumbnail(msg.author.face())
        .timestamp(serenity::Timestamp::now());

    if let Err(e) = serenity::ChannelId::new(log_channel)
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
        .await
    {
        tracing::warn!("Failed to send flood log embed: {}", e);
    }
}

/// Post a plain text note to the configured moderation-log channel.
async fn send_log_note(ctx: &serenity::Context, data: &Data, note: String) {
    let Some(log_channel) = data.detector.config().log_channel_id else {
        return;
    };

    if let Err(e) = serenity::ChannelId::new(log_channel)
        .say(&ctx.http, note)
        .await
    {
        tracing::warn!("Failed to send moderation log note: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_channels(channels: &[u64]) -> DetectionConfig {
        DetectionConfig {
            exempt_channels: channels.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn config_with_roles(roles: &[u64]) -> DetectionConfig {
        DetectionConfig {
            exempt_roles: roles.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn whitelisted_channel_is_exempt() {
        let config = config_with_channels(&[555]);
        assert!(is_channel_exempt(&config, 555, None));
        assert!(!is_channel_exempt(&config, 556, None));
    }

    #[test]
    fn thread_inherits_parent_channel_exemption() {
        let config = config_with_channels(&[555]);
        assert!(is_channel_exempt(&config, 999, Some(555)));
        assert!(!is_channel_exempt(&config, 999, Some(777)));
    }

    #[test]
    fn empty_whitelist_exempts_no_channel() {
        let config = config_with_channels(&[]);
        assert!(config.exempt_channels.is_empty());
        assert!(!is_channel_exempt(&config, 555, None));
        assert!(!is_channel_exempt(&config, 555, Some(556)));
    }

    #[test]
    fn exempt_role_bypasses_detection() {
        let config = config_with_roles(&[42]);
        let held = [serenity::RoleId::new(42)];
        assert!(is_role_exempt(&config, &held, &[]));
    }

    #[test]
    fn administrator_role_bypasses_detection() {
        let config = config_with_roles(&[]);
        let admin = serenity::RoleId::new(7);
        let held = [serenity::RoleId::new(7)];
        assert!(is_role_exempt(&config, &held, &[admin]));
    }

    #[test]
    fn plain_members_are_not_exempt() {
        // Exemption comes only from whitelisted or administrator roles;
        // holding unrelated roles grants nothing.
        let config = config_with_roles(&[42]);
        let held = [serenity::RoleId::new(1), serenity::RoleId::new(2)];
        let admin = [serenity::RoleId::new(7)];
        assert!(!is_role_exempt(&config, &held, &admin));
        assert!(!is_role_exempt(&config, &[], &admin));
    }

    #[test]
    fn generic_errors_do_not_claim_missing_permission() {
        // A network-style failure must report the error itself instead of
        // blaming a missing permission.
        let err = serenity::Error::Other("connection reset");
        assert!(!is_permission_error(&err));

        let note = failure_note(serenity::UserId::new(123), &err, "Ban Members");
        assert!(note.contains("failed to act"));
        assert!(!note.contains("permission"));
    }
}
