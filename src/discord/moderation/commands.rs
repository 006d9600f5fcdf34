// Moderation slash commands: ban, unban, kick and mute.
//
// Validation lives in `core::moderation`; this file only turns actions into
// Discord API calls. Every API call here is idempotent, so it goes through
// the retry helper.

use crate::core::moderation::{ModerationAction, MUTED_ROLE_NAME};
use crate::core::retry::{retry, RetryPolicy};
use crate::discord::errors::is_transient;
use crate::discord::{Data, Error};
use poise::serenity_prelude::{self as serenity, Mentionable};
use std::sync::Arc;

type Context<'a> = poise::Context<'a, Data, Error>;

/// Ban a user from the server.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: serenity::User,
    #[description = "Why they are being banned"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let action = ModerationAction::ban(reason);
    if !check_target(&ctx, &action, &user).await? {
        return Ok(());
    }

    let audit = action.audit_reason(&ctx.author().name);
    let audit = audit.as_str();
    let http = ctx.http();
    retry(&ctx.data().retry, is_transient, || {
        guild_id.ban_with_reason(http, user.id, 0, audit)
    })
    .await?;

    tracing::info!(
        guild_id = guild_id.get(),
        user_id = user.id.get(),
        moderator_id = ctx.author().id.get(),
        "User banned"
    );
    ctx.say(ban_message(&user.tag(), action.reason().unwrap_or_default()))
        .await?;
    Ok(())
}

/// Lift a ban.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User to unban"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let action = ModerationAction::Unban;
    let audit = action.audit_reason(&ctx.author().name);
    let audit = audit.as_str();
    let http = ctx.http();

    let result = retry(&ctx.data().retry, is_transient, || {
        http.remove_ban(guild_id, user.id, Some(audit))
    })
    .await;
    match result {
        Ok(()) => {
            tracing::info!(
                guild_id = guild_id.get(),
                user_id = user.id.get(),
                moderator_id = ctx.author().id.get(),
                "User unbanned"
            );
            ctx.say(format!("{} has been unbanned!", user.mention()))
                .await?;
        }
        Err(e) => {
            // Usually "Unknown Ban": the user was never banned.
            tracing::warn!(
                guild_id = guild_id.get(),
                user_id = user.id.get(),
                "Unban failed: {}",
                e
            );
            ctx.say(format!(
                "Failed to unban {}. Please check that the user is currently banned.",
                user.mention()
            ))
            .await?;
        }
    }
    Ok(())
}

/// Kick a member from the server.
#[poise::command(slash_command, guild_only, required_permissions = "KICK_MEMBERS")]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] member: serenity::Member,
    #[description = "Why they are being kicked"] reason: Option<String>,
) -> Result<(), Error> {
    let action = ModerationAction::kick(reason);
    if !check_target(&ctx, &action, &member.user).await? {
        return Ok(());
    }

    let audit = action.audit_reason(&ctx.author().name);
    let audit = audit.as_str();
    let http = ctx.http();
    let (guild_id, user_id) = (member.guild_id, member.user.id);
    retry(&ctx.data().retry, is_transient, || {
        guild_id.kick_with_reason(http, user_id, audit)
    })
    .await?;

    tracing::info!(
        guild_id = guild_id.get(),
        user_id = user_id.get(),
        moderator_id = ctx.author().id.get(),
        reason = action.reason().unwrap_or_default(),
        "Member kicked"
    );
    ctx.say(format!("{} has been kicked from the server.", member.mention()))
        .await?;
    Ok(())
}

/// Mute a member for a number of minutes.
#[poise::command(slash_command, guild_only, required_permissions = "KICK_MEMBERS")]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] member: serenity::Member,
    #[description = "How long to mute them (in minutes)"] duration: i64,
) -> Result<(), Error> {
    let action = match ModerationAction::mute(duration) {
        Ok(action) => action,
        Err(e) => {
            reply_ephemeral(&ctx, format!("❌ {}", e)).await?;
            return Ok(());
        }
    };
    let ModerationAction::Mute { duration: mute_for } = action else {
        return Ok(());
    };
    if !check_target(&ctx, &action, &member.user).await? {
        return Ok(());
    }

    // Role setup touches every channel; make sure the interaction doesn't expire.
    ctx.defer().await?;

    let policy = ctx.data().retry;
    let role_id = ensure_muted_role(ctx.serenity_context(), member.guild_id, &policy).await?;

    let audit = action.audit_reason(&ctx.author().name);
    let audit = audit.as_str();
    let http = ctx.http();
    let (guild_id, user_id) = (member.guild_id, member.user.id);
    retry(&policy, is_transient, || {
        http.add_member_role(guild_id, user_id, role_id, Some(audit))
    })
    .await?;

    tracing::info!(
        guild_id = guild_id.get(),
        user_id = user_id.get(),
        moderator_id = ctx.author().id.get(),
        minutes = duration,
        "Member muted"
    );
    ctx.say(format!(
        "{} has been muted for {} minutes.",
        member.mention(),
        duration
    ))
    .await?;

    let http = Arc::clone(&ctx.serenity_context().http);
    let channel_id = ctx.channel_id();
    tokio::spawn(async move {
        tokio::time::sleep(mute_for).await;
        unmute(&http, &policy, guild_id, user_id, role_id, channel_id).await;
    });

    Ok(())
}

async fn unmute(
    http: &serenity::Http,
    policy: &RetryPolicy,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
    role_id: serenity::RoleId,
    channel_id: serenity::ChannelId,
) {
    let removed = retry(policy, is_transient, || {
        http.remove_member_role(guild_id, user_id, role_id, Some("mute expired"))
    })
    .await;

    if let Err(e) = removed {
        tracing::error!(
            guild_id = guild_id.get(),
            user_id = user_id.get(),
            "Failed to remove muted role: {}",
            e
        );
        return;
    }

    tracing::info!(guild_id = guild_id.get(), user_id = user_id.get(), "Member unmuted");
    if let Err(e) = channel_id
        .say(http, format!("{} has been unmuted.", user_id.mention()))
        .await
    {
        tracing::warn!("Failed to post unmute notice: {}", e);
    }
}

/// Find the guild's muted role, creating it (and its channel overwrites) on
/// first use.
async fn ensure_muted_role(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    policy: &RetryPolicy,
) -> Result<serenity::RoleId, serenity::Error> {
    let http = ctx.http.as_ref();
    let roles = retry(policy, is_transient, || guild_id.roles(http)).await?;
    if let Some(role) = roles.values().find(|r| r.name == MUTED_ROLE_NAME) {
        return Ok(role.id);
    }

    let role = guild_id
        .create_role(
            ctx,
            serenity::EditRole::new()
                .name(MUTED_ROLE_NAME)
                .permissions(serenity::Permissions::empty())
                .audit_log_reason("To mute users"),
        )
        .await?;
    tracing::info!(guild_id = guild_id.get(), role_id = role.id.get(), "Created muted role");

    let channels = retry(policy, is_transient, || guild_id.channels(http)).await?;
    for channel_id in channels.keys() {
        let overwrite = muted_overwrite(role.id);
        let applied = retry(policy, is_transient, || {
            channel_id.create_permission(http, overwrite.clone())
        })
        .await;
        if let Err(e) = applied {
            tracing::warn!(
                channel_id = channel_id.get(),
                "Failed to set muted role overwrite: {}",
                e
            );
        }
    }

    Ok(role.id)
}

fn muted_overwrite(role_id: serenity::RoleId) -> serenity::PermissionOverwrite {
    serenity::PermissionOverwrite {
        allow: serenity::Permissions::empty(),
        deny: serenity::Permissions::SEND_MESSAGES,
        kind: serenity::PermissionOverwriteType::Role(role_id),
    }
}

/// Replies with the refusal and returns `false` when the moderator targets
/// themselves.
async fn check_target(
    ctx: &Context<'_>,
    action: &ModerationAction,
    target: &serenity::User,
) -> Result<bool, Error> {
    match action.check_target(ctx.author().id.get(), target.id.get()) {
        Ok(()) => Ok(true),
        Err(e) => {
            reply_ephemeral(ctx, format!("❌ {}", e)).await?;
            Ok(false)
        }
    }
}

async fn reply_ephemeral(ctx: &Context<'_>, content: String) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

fn ban_message(tag: &str, reason: &str) -> String {
    format!("{} has been banned from the server. Reason: {}", tag, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_message_includes_reason() {
        let action = ModerationAction::ban(None);
        assert_eq!(
            ban_message("spammer#0001", action.reason().unwrap_or_default()),
            "spammer#0001 has been banned from the server. Reason: No reason provided"
        );
    }

    #[test]
    fn muted_overwrite_only_denies_sending() {
        let role_id = serenity::RoleId::new(42);
        let overwrite = muted_overwrite(role_id);

        assert!(overwrite.allow.is_empty());
        assert_eq!(overwrite.deny, serenity::Permissions::SEND_MESSAGES);
        assert_eq!(
            overwrite.kind,
            serenity::PermissionOverwriteType::Role(role_id)
        );
    }
}
