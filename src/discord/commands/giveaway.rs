// Discord commands for giveaways.
//
// The command posts the banner, registers the giveaway with the core service
// and hands the rest of the lifecycle to a background task.

use crate::core::giveaway::{Giveaway, GiveawayPlacement, GiveawayRequest, ENTRY_EMOJI};
use crate::discord::commands::leveling::{Context, Error};
use crate::discord::giveaway::run_giveaway;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Create a giveaway. Members enter by reacting with 🎉.
#[poise::command(slash_command, guild_only, rename = "create-giveaway")]
pub async fn create_giveaway(
    ctx: Context<'_>,
    #[description = "The prize for the giveaway"] prize: String,
    #[description = "The number of winners for the giveaway"] num_winners: i64,
    #[description = "The duration of the giveaway (in minutes)"] duration: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in servers")?;

    let request = match GiveawayRequest::new(&prize, num_winners, duration) {
        Ok(request) => request,
        Err(e) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("❌ {}", e))
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    let reply = ctx.say(request.banner()).await?;
    let message = reply.message().await?;

    let placement = GiveawayPlacement {
        message_id: message.id.get(),
        channel_id: message.channel_id.get(),
        guild_id: guild_id.get(),
        host_id: ctx.author().id.get(),
    };
    // Register before reacting so no early entry is missed.
    let giveaway = ctx.data().giveaways.open(placement, &request, Utc::now())?;

    if let Err(e) = message
        .react(ctx, serenity::ReactionType::Unicode(ENTRY_EMOJI.to_string()))
        .await
    {
        tracing::warn!(message_id = giveaway.message_id, "Failed to add entry reaction: {}", e);
    }

    tracing::info!(
        message_id = giveaway.message_id,
        guild_id = giveaway.guild_id,
        host_id = giveaway.host_id,
        prize = %giveaway.prize,
        num_winners = giveaway.num_winners,
        started_at = %giveaway.started_at,
        end_time = %giveaway.end_time,
        "Giveaway started"
    );

    tokio::spawn(run_giveaway(
        ctx.serenity_context().http.clone(),
        Arc::clone(&ctx.data().giveaways),
        ctx.framework().bot_id,
        giveaway.message_id,
        giveaway.end_time,
    ));

    Ok(())
}

/// List the giveaways currently running in this server.
#[poise::command(slash_command, guild_only)]
pub async fn giveaways(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in servers")?;
    let active = ctx.data().giveaways.active_in_guild(guild_id.get());

    if active.is_empty() {
        ctx.say("There are no giveaways running right now.").await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("{} Running giveaways", ENTRY_EMOJI))
        .color(0xffd700);
    for giveaway in &active {
        embed = embed.field(&giveaway.prize, giveaway_summary(giveaway), false);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn giveaway_summary(giveaway: &Giveaway) -> String {
    let entrants = giveaway.participants.len();
    format!(
        "{} winner{} • {} entr{} • ends <t:{}:R> in <#{}>\nhosted by <@{}>",
        giveaway.num_winners,
        if giveaway.num_winners == 1 { "" } else { "s" },
        entrants,
        if entrants == 1 { "y" } else { "ies" },
        giveaway.end_time.timestamp(),
        giveaway.channel_id,
        giveaway.host_id
    )
}
