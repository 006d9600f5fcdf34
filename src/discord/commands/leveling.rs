// Discord commands for the leveling system.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result
//
// This layer is THIN - no business logic, just translation.

use crate::core::giveaway::GiveawayService;
use crate::core::leveling::{LevelRecord, LevelingError, LevelingService};
use crate::core::retry::{retry, RetryPolicy};
use crate::discord::errors::is_transient;
use crate::infra::leveling::SnapshotLevelStore;
use poise::serenity_prelude::{self as serenity, Mentionable};
use std::sync::Arc;

/// How many users the leaderboard shows.
const LEADERBOARD_SIZE: usize = 10;

/// Records fetched for the leaderboard. Users that can no longer be resolved
/// are skipped, so we ask for a few extra.
const LEADERBOARD_CANDIDATES: usize = 25;

const DISABLED_MESSAGE: &str = "The leveling system is currently disabled.";

/// Show your level and experience points.
#[poise::command(slash_command, guild_only)]
pub async fn level(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target_user = user.as_ref().unwrap_or_else(|| ctx.author());

    if target_user.bot {
        ctx.say("Bots don't earn experience points! 🤖").await?;
        return Ok(());
    }

    let record = match ctx.data().leveling.record(target_user.id.get()).await {
        Ok(record) => record,
        Err(LevelingError::Disabled) => {
            ctx.say(DISABLED_MESSAGE).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let is_self = target_user.id == ctx.author().id;
    ctx.say(level_reply(
        &target_user.mention().to_string(),
        is_self,
        record.as_ref(),
    ))
    .await?;

    Ok(())
}

/// Show the server's leaderboard.
#[poise::command(slash_command, guild_only)]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let records = match ctx.data().leveling.leaderboard(LEADERBOARD_CANDIDATES).await {
        Ok(records) => records,
        Err(LevelingError::Disabled) => {
            ctx.say(DISABLED_MESSAGE).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if records.is_empty() {
        ctx.say("No one has earned experience yet! Start chatting to get on the leaderboard! 💬")
            .await?;
        return Ok(());
    }

    // Name lookups can hit the API, so acknowledge the interaction first.
    ctx.defer().await?;

    let mut rows = Vec::with_capacity(LEADERBOARD_SIZE);
    for record in records {
        if rows.len() == LEADERBOARD_SIZE {
            break;
        }
        match resolve_user_name(&ctx, record.user_id).await {
            Some(name) => rows.push((name, record)),
            None => tracing::debug!(
                user_id = record.user_id,
                "Skipping unknown user on leaderboard"
            ),
        }
    }

    ctx.say(format_leaderboard(&rows)).await?;
    Ok(())
}

/// Look up a username, cache first. `None` if the account no longer exists.
async fn resolve_user_name(ctx: &Context<'_>, user_id: u64) -> Option<String> {
    let user_id = serenity::UserId::new(user_id);

    if let Some(user) = ctx.serenity_context().cache.user(user_id) {
        return Some(user.name.clone());
    }

    let http = ctx.http();
    retry(&ctx.data().retry, is_transient, || user_id.to_user(http))
        .await
        .ok()
        .map(|user| user.name)
}

fn level_reply(mention: &str, is_self: bool, record: Option<&LevelRecord>) -> String {
    match (record, is_self) {
        (Some(record), true) => format!(
            "{}, you are at level {} with {} experience points.",
            mention, record.level, record.experience
        ),
        (Some(record), false) => format!(
            "{} is at level {} with {} experience points.",
            mention, record.level, record.experience
        ),
        (None, true) => format!("{}, you haven't earned any experience points yet.", mention),
        (None, false) => format!("{} hasn't earned any experience points yet.", mention),
    }
}

fn format_leaderboard(rows: &[(String, LevelRecord)]) -> String {
    let mut out = String::from("**Leaderboard:**");
    for (index, (name, record)) in rows.iter().enumerate() {
        let medal = match index {
            0 => "🥇 ",
            1 => "🥈 ",
            2 => "🥉 ",
            _ => "",
        };
        out.push_str(&format!(
            "\n{}{}. {} - Level {} ({} exp)",
            medal,
            index + 1,
            name,
            record.level,
            record.experience
        ));
    }
    out
}

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands.
/// This is where we store our services and configuration.
pub struct Data {
    pub leveling: Arc<LevelingService<SnapshotLevelStore>>,
    pub giveaways: Arc<GiveawayService>,
    /// Where milestone announcements go. Set whenever leveling is enabled.
    pub leveling_channel: Option<serenity::ChannelId>,
    /// Retry policy for idempotent Discord API calls.
    pub retry: RetryPolicy,
}
