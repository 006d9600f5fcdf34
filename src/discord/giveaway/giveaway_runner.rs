// Discord side of the giveaway lifecycle: reaction entries, the expiry task,
// and the serenity-backed notifier for results.

use crate::core::giveaway::{
    EntryOutcome, GiveawayError, GiveawayNotifier, GiveawayService, NotifyError, ENTRY_EMOJI,
};
use crate::discord::Data;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Sends giveaway results through the Discord HTTP API.
pub struct SerenityNotifier {
    http: Arc<serenity::Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl GiveawayNotifier for SerenityNotifier {
    async fn direct_message(&self, user_id: u64, content: &str) -> Result<(), NotifyError> {
        serenity::UserId::new(user_id)
            .direct_message(&self.http, serenity::CreateMessage::new().content(content))
            .await
            .map(|_| ())
            .map_err(|e| NotifyError {
                target: user_id,
                reason: e.to_string(),
            })
    }

    async fn announce(&self, channel_id: u64, content: &str) -> Result<(), NotifyError> {
        serenity::ChannelId::new(channel_id)
            .say(&self.http, content)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError {
                target: channel_id,
                reason: e.to_string(),
            })
    }
}

/// Wait for the giveaway to expire, draw winners and send the results.
///
/// Spawned once per giveaway. There is no early exit: the task only returns
/// after the deadline has passed.
pub async fn run_giveaway(
    http: Arc<serenity::Http>,
    giveaways: Arc<GiveawayService>,
    bot_id: serenity::UserId,
    message_id: u64,
    end_time: DateTime<Utc>,
) {
    let draw = loop {
        let remaining = (end_time - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(remaining).await;

        let result = {
            let mut rng = rand::thread_rng();
            giveaways.close(message_id, &[bot_id.get()], Utc::now(), &mut rng)
        };

        match result {
            Ok(draw) => break draw,
            // The wall clock lagged behind the timer; sleep off the rest.
            Err(GiveawayError::StillOpen(left)) => {
                tracing::debug!(message_id, left_ms = left.num_milliseconds(), "Giveaway not due yet");
            }
            Err(e) => {
                tracing::error!(message_id, "Failed to close giveaway: {}", e);
                return;
            }
        }
    };

    let notifier = SerenityNotifier::new(http);
    let report = giveaways.deliver(&draw, &notifier).await;

    tracing::info!(
        message_id,
        prize = %draw.prize,
        requested = draw.requested,
        participants = draw.participant_count,
        winners = draw.winners.len(),
        notified = report.notified.len(),
        failed = report.failed.len(),
        announced = report.announced,
        "Giveaway finished"
    );
}

/// Enter the reacting user if the reaction is 🎉 on an open giveaway.
pub async fn handle_reaction_add(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
) -> Result<(), serenity::Error> {
    let message_id = reaction.message_id.get();
    if !is_entry_reaction(&reaction.emoji, data.giveaways.is_giveaway(message_id)) {
        return Ok(());
    }

    let Some(user_id) = reaction.user_id else {
        return Ok(());
    };

    let is_self = user_id == ctx.cache.current_user().id;
    let is_bot = match &reaction.member {
        Some(member) => member.user.bot,
        None if is_self => true,
        None => user_id.to_user(ctx).await?.bot,
    };
    if !may_enter(is_bot, is_self) {
        return Ok(());
    }

    match data
        .giveaways
        .enter(message_id, user_id.get(), Utc::now())
    {
        Ok(EntryOutcome::Entered) => {
            tracing::info!(message_id, user_id = user_id.get(), "Giveaway entry added");
        }
        Ok(EntryOutcome::AlreadyEntered) => {}
        Err(GiveawayError::Closed(_)) | Err(GiveawayError::NotFound(_)) => {
            tracing::debug!(message_id, user_id = user_id.get(), "Late giveaway reaction ignored");
        }
        Err(e) => tracing::warn!(message_id, "Unexpected giveaway entry error: {}", e),
    }

    Ok(())
}

/// Only 🎉 on a message that belongs to a registered giveaway counts.
fn is_entry_reaction(emoji: &serenity::ReactionType, registered: bool) -> bool {
    registered && matches!(emoji, serenity::ReactionType::Unicode(e) if e == ENTRY_EMOJI)
}

/// Bots, this one included, never enter.
fn may_enter(is_bot: bool, is_self: bool) -> bool {
    !is_bot && !is_self
}
