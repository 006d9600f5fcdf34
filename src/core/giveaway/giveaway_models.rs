// Giveaway domain models.
//
// Pure data with no Discord dependencies. Ids are the raw snowflakes.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// The emoji members react with to enter.
pub const ENTRY_EMOJI: &str = "🎉";

/// Longest giveaway we accept, in minutes (30 days).
pub const MAX_DURATION_MINUTES: i64 = 30 * 24 * 60;

/// A validated create-giveaway request. Only [`GiveawayRequest::new`] builds
/// one, so every instance has a prize, at least one winner and a positive
/// duration.
#[derive(Debug, Clone, PartialEq)]
pub struct GiveawayRequest {
    prize: String,
    num_winners: u32,
    duration: Duration,
}

impl GiveawayRequest {
    pub fn new(
        prize: &str,
        num_winners: i64,
        duration_minutes: i64,
    ) -> Result<Self, super::GiveawayError> {
        use super::GiveawayError;

        let prize = prize.trim();
        if prize.is_empty() {
            return Err(GiveawayError::EmptyPrize);
        }
        if num_winners <= 0 || num_winners > u32::MAX as i64 {
            return Err(GiveawayError::InvalidWinnerCount(num_winners));
        }
        if duration_minutes <= 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(GiveawayError::InvalidDuration(duration_minutes));
        }

        Ok(Self {
            prize: prize.to_string(),
            num_winners: num_winners as u32,
            duration: Duration::minutes(duration_minutes),
        })
    }

    pub fn prize(&self) -> &str {
        &self.prize
    }

    pub fn num_winners(&self) -> u32 {
        self.num_winners
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Text of the message members react to.
    pub fn banner(&self) -> String {
        format!(
            "{emoji} **GIVEAWAY** {emoji}\n\nReact with {emoji} to enter!\n\nPrize: {}\n\nNumber of winners: {}\n\nDuration: {} minutes",
            self.prize,
            self.num_winners,
            self.duration.num_minutes(),
            emoji = ENTRY_EMOJI,
        )
    }
}

/// Where a giveaway lives and who started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiveawayPlacement {
    /// The banner message members react to. Also the giveaway's key.
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: u64,
    pub host_id: u64,
}

/// An open giveaway.
#[derive(Debug, Clone)]
pub struct Giveaway {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: u64,
    pub host_id: u64,
    pub prize: String,
    pub num_winners: u32,
    pub started_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub participants: HashSet<u64>,
}

impl Giveaway {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        now < self.end_time
    }
}

/// Outcome of a reaction on a giveaway message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Entered,
    AlreadyEntered,
}

/// Result of closing a giveaway.
#[derive(Debug, Clone, PartialEq)]
pub struct GiveawayDraw {
    pub message_id: u64,
    pub channel_id: u64,
    pub prize: String,
    pub requested: u32,
    pub participant_count: usize,
    pub winners: Vec<u64>,
}

impl GiveawayDraw {
    /// Direct message sent to each winner.
    pub fn winner_message(&self) -> String {
        format!(
            "Congratulations! You won the {} giveaway! {}",
            self.prize, ENTRY_EMOJI
        )
    }

    /// Public message posted in the giveaway channel. Winners in
    /// `unreachable` could not be sent a DM and are asked to contact the host.
    pub fn announcement(&self, unreachable: &[u64]) -> String {
        if self.winners.is_empty() {
            return format!(
                "The {} giveaway has ended, but nobody entered. No winners this time.",
                self.prize
            );
        }

        let mentions = self
            .winners
            .iter()
            .map(|id| format!("<@{}>", id))
            .collect::<Vec<_>>()
            .join(" ");
        let mut text = format!(
            "Congratulations {}! You have won the {} giveaway!",
            mentions, self.prize
        );
        for id in unreachable {
            text.push_str(&format!(
                "\nI couldn't DM <@{}>, please contact the host to claim your prize.",
                id
            ));
        }
        text
    }
}

/// What happened when results were sent out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    pub notified: Vec<u64>,
    pub failed: Vec<u64>,
    pub announced: bool,
}
