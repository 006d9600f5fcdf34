// Giveaway service - core business logic for timed giveaways.
//
// Lifecycle per giveaway: Open -> Closed.
// - open():  register the giveaway under the id of its announcement message
// - enter(): reaction events add participants until the deadline
// - close(): after the deadline, draw winners and drop it from the registry
// - deliver(): DM the winners and post the public announcement
//
// NO Discord dependencies here. Outbound messages go through the
// GiveawayNotifier port, implemented by the Discord layer.

use super::giveaway_models::{
    DeliveryReport, EntryOutcome, Giveaway, GiveawayDraw, GiveawayPlacement, GiveawayRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum GiveawayError {
    #[error("The prize cannot be empty")]
    EmptyPrize,

    #[error("Number of winners must be at least 1 (got {0})")]
    InvalidWinnerCount(i64),

    #[error("Duration must be between 1 minute and 30 days (got {0} minutes)")]
    InvalidDuration(i64),

    #[error("A giveaway is already running on message {0}")]
    AlreadyExists(u64),

    #[error("No giveaway found for message {0}")]
    NotFound(u64),

    #[error("The giveaway on message {0} is no longer accepting entries")]
    Closed(u64),

    #[error("The giveaway is still open for another {} seconds", .0.num_seconds())]
    StillOpen(chrono::Duration),
}

#[derive(Debug, Error)]
#[error("Could not reach {target}: {reason}")]
pub struct NotifyError {
    pub target: u64,
    pub reason: String,
}

// ============================================================================
// NOTIFIER TRAIT (PORT)
// ============================================================================

/// Outbound messages for giveaway results.
#[async_trait]
pub trait GiveawayNotifier: Send + Sync {
    /// Send a private message to a user.
    async fn direct_message(&self, user_id: u64, content: &str) -> Result<(), NotifyError>;

    /// Post a public message in a channel.
    async fn announce(&self, channel_id: u64, content: &str) -> Result<(), NotifyError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Registry of open giveaways, keyed by announcement message id.
///
/// **DashMap:** reaction events and the closing tasks run on different tokio
/// workers, so every access goes through the map's shard locks.
#[derive(Default)]
pub struct GiveawayService {
    open: DashMap<u64, Giveaway>,
}

impl GiveawayService {
    pub fn new() -> Self {
        Self {
            open: DashMap::new(),
        }
    }

    /// Register a giveaway on the banner message named by `placement`.
    pub fn open(
        &self,
        placement: GiveawayPlacement,
        request: &GiveawayRequest,
        now: DateTime<Utc>,
    ) -> Result<Giveaway, GiveawayError> {
        match self.open.entry(placement.message_id) {
            Entry::Occupied(_) => Err(GiveawayError::AlreadyExists(placement.message_id)),
            Entry::Vacant(slot) => {
                let giveaway = Giveaway {
                    message_id: placement.message_id,
                    channel_id: placement.channel_id,
                    guild_id: placement.guild_id,
                    host_id: placement.host_id,
                    prize: request.prize().to_string(),
                    num_winners: request.num_winners(),
                    started_at: now,
                    end_time: now + request.duration(),
                    participants: HashSet::new(),
                };
                slot.insert(giveaway.clone());
                Ok(giveaway)
            }
        }
    }

    /// Add `user_id` to the giveaway. Entering twice is a no-op.
    pub fn enter(
        &self,
        message_id: u64,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> Result<EntryOutcome, GiveawayError> {
        let mut giveaway = self
            .open
            .get_mut(&message_id)
            .ok_or(GiveawayError::NotFound(message_id))?;

        if !giveaway.is_open_at(now) {
            return Err(GiveawayError::Closed(message_id));
        }

        if giveaway.participants.insert(user_id) {
            Ok(EntryOutcome::Entered)
        } else {
            Ok(EntryOutcome::AlreadyEntered)
        }
    }

    /// True if `message_id` belongs to an open giveaway.
    pub fn is_giveaway(&self, message_id: u64) -> bool {
        self.open.contains_key(&message_id)
    }

    /// Snapshot of the giveaways registered in `guild_id`, soonest deadline first.
    pub fn active_in_guild(&self, guild_id: u64) -> Vec<Giveaway> {
        let mut giveaways: Vec<Giveaway> = self
            .open
            .iter()
            .filter(|entry| entry.guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        giveaways.sort_by_key(|g| (g.end_time, g.message_id));
        giveaways
    }

    /// Close the giveaway and draw its winners.
    ///
    /// Refuses with `StillOpen` before the deadline. Ids in `excluded` (the
    /// bot's own account) never win. At most `num_winners` distinct winners
    /// are drawn; fewer when fewer people entered, none when nobody did.
    pub fn close<R: Rng + ?Sized>(
        &self,
        message_id: u64,
        excluded: &[u64],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<GiveawayDraw, GiveawayError> {
        let (_, giveaway) = self
            .open
            .remove_if(&message_id, |_, g| !g.is_open_at(now))
            .ok_or_else(|| match self.open.get(&message_id) {
                Some(g) => GiveawayError::StillOpen(g.end_time - now),
                None => GiveawayError::NotFound(message_id),
            })?;

        // Sorted so a seeded rng gives a reproducible draw.
        let mut pool: Vec<u64> = giveaway
            .participants
            .iter()
            .copied()
            .filter(|id| !excluded.contains(id))
            .collect();
        pool.sort_unstable();

        let count = (giveaway.num_winners as usize).min(pool.len());
        let winners: Vec<u64> = pool.choose_multiple(rng, count).copied().collect();

        tracing::info!(
            message_id,
            participants = pool.len(),
            winners = winners.len(),
            "Giveaway closed"
        );

        Ok(GiveawayDraw {
            message_id,
            channel_id: giveaway.channel_id,
            prize: giveaway.prize,
            requested: giveaway.num_winners,
            participant_count: pool.len(),
            winners,
        })
    }

    /// Send the results: a DM to every winner, then one public announcement.
    ///
    /// A winner who cannot be reached is recorded in the report and skipped.
    pub async fn deliver<N: GiveawayNotifier + ?Sized>(
        &self,
        draw: &GiveawayDraw,
        notifier: &N,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let dm = draw.winner_message();

        for &winner in &draw.winners {
            match notifier.direct_message(winner, &dm).await {
                Ok(()) => report.notified.push(winner),
                Err(e) => {
                    tracing::warn!(user_id = winner, "Failed to DM giveaway winner: {}", e);
                    report.failed.push(winner);
                }
            }
        }

        match notifier.announce(draw.channel_id, &draw.announcement(&report.failed)).await {
            Ok(()) => report.announced = true,
            Err(e) => tracing::error!(
                channel_id = draw.channel_id,
                "Failed to announce giveaway winners: {}",
                e
            ),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::sync::Mutex;

    const BOT_ID: u64 = 999;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn place(message_id: u64) -> GiveawayPlacement {
        GiveawayPlacement {
            message_id,
            channel_id: 10,
            guild_id: 20,
            host_id: 5,
        }
    }

    fn request(prize: &str, winners: i64, minutes: i64) -> GiveawayRequest {
        GiveawayRequest::new(prize, winners, minutes).unwrap()
    }

    /// Records every outbound message; DMs to `blocked` users fail.
    #[derive(Default)]
    struct RecordingNotifier {
        blocked: Vec<u64>,
        dms: Mutex<Vec<(u64, String)>>,
        announcements: Mutex<Vec<(u64, String)>>,
    }

    #[async_trait]
    impl GiveawayNotifier for RecordingNotifier {
        async fn direct_message(&self, user_id: u64, content: &str) -> Result<(), NotifyError> {
            if self.blocked.contains(&user_id) {
                return Err(NotifyError {
                    target: user_id,
                    reason: "Cannot send messages to this user".to_string(),
                });
            }
            self.dms.lock().await.push((user_id, content.to_string()));
            Ok(())
        }

        async fn announce(&self, channel_id: u64, content: &str) -> Result<(), NotifyError> {
            self.announcements
                .lock()
                .await
                .push((channel_id, content.to_string()));
            Ok(())
        }
    }

    #[test]
    fn request_validation() {
        assert_eq!(
            GiveawayRequest::new("  ", 1, 5).unwrap_err(),
            GiveawayError::EmptyPrize
        );
        assert_eq!(
            GiveawayRequest::new("Nitro", 0, 5).unwrap_err(),
            GiveawayError::InvalidWinnerCount(0)
        );
        assert_eq!(
            GiveawayRequest::new("Nitro", 1, 0).unwrap_err(),
            GiveawayError::InvalidDuration(0)
        );
        assert_eq!(
            GiveawayRequest::new("Nitro", 1, -10).unwrap_err(),
            GiveawayError::InvalidDuration(-10)
        );
        assert!(GiveawayRequest::new("Nitro", 1, 30 * 24 * 60 + 1).is_err());

        let ok = request(" Nitro ", 3, 15);
        assert_eq!(ok.prize(), "Nitro");
        assert_eq!(ok.num_winners(), 3);
        assert_eq!(ok.duration(), Duration::minutes(15));
        assert!(ok.banner().contains("Prize: Nitro"));
        assert!(ok.banner().contains("Duration: 15 minutes"));
    }

    #[test]
    fn duplicate_reactions_enter_once() {
        let service = GiveawayService::new();
        let now = start();
        service.open(place(1), &request("Mug", 1, 1), now).unwrap();

        assert_eq!(service.enter(1, 100, now).unwrap(), EntryOutcome::Entered);
        assert_eq!(
            service.enter(1, 100, now).unwrap(),
            EntryOutcome::AlreadyEntered
        );

        let active = service.active_in_guild(20);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].participants.len(), 1);
        assert!(service.active_in_guild(21).is_empty());
    }

    #[test]
    fn same_message_cannot_host_two_giveaways() {
        let service = GiveawayService::new();
        service.open(place(1), &request("Mug", 1, 1), start()).unwrap();
        assert_eq!(
            service
                .open(place(1), &request("Hat", 1, 1), start())
                .unwrap_err(),
            GiveawayError::AlreadyExists(1)
        );
    }

    #[test]
    fn entries_after_deadline_are_rejected() {
        let service = GiveawayService::new();
        let now = start();
        service.open(place(1), &request("Mug", 1, 1), now).unwrap();

        let late = now + Duration::minutes(1);
        assert_eq!(service.enter(1, 100, late), Err(GiveawayError::Closed(1)));
        assert_eq!(service.enter(2, 100, now), Err(GiveawayError::NotFound(2)));
    }

    #[test]
    fn cannot_close_before_deadline() {
        let service = GiveawayService::new();
        let now = start();
        service.open(place(1), &request("Mug", 1, 10), now).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let early = now + Duration::minutes(4);
        assert_eq!(
            service.close(1, &[BOT_ID], early, &mut rng),
            Err(GiveawayError::StillOpen(Duration::minutes(6)))
        );
        assert!(service.is_giveaway(1));

        let draw = service
            .close(1, &[BOT_ID], now + Duration::minutes(10), &mut rng)
            .unwrap();
        assert!(draw.winners.is_empty());
        assert!(!service.is_giveaway(1));
        assert_eq!(
            service.close(1, &[BOT_ID], now + Duration::minutes(11), &mut rng),
            Err(GiveawayError::NotFound(1))
        );
    }

    #[test]
    fn winners_are_capped_by_participants() {
        let service = GiveawayService::new();
        let now = start();
        service.open(place(1), &request("Mug", 5, 1), now).unwrap();
        service.enter(1, 100, now).unwrap();
        service.enter(1, 101, now).unwrap();
        service.enter(1, BOT_ID, now).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let draw = service
            .close(1, &[BOT_ID], now + Duration::minutes(1), &mut rng)
            .unwrap();

        let mut winners = draw.winners.clone();
        winners.sort_unstable();
        assert_eq!(winners, vec![100, 101]);
        assert_eq!(draw.requested, 5);
        assert_eq!(draw.participant_count, 2);
    }

    #[test]
    fn zero_participants_draws_nobody() {
        let service = GiveawayService::new();
        let now = start();
        service.open(place(1), &request("Mug", 2, 1), now).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let draw = service
            .close(1, &[BOT_ID], now + Duration::minutes(1), &mut rng)
            .unwrap();

        assert!(draw.winners.is_empty());
        assert!(draw.announcement(&[]).contains("nobody entered"));
    }

    #[test]
    fn winners_are_distinct_and_drawn_from_entrants() {
        let service = GiveawayService::new();
        let now = start();
        let entrants: Vec<u64> = (200..220).collect();

        for seed in 0..25 {
            let message_id = 1000 + seed;
            service
                .open(place(message_id), &request("Key", 4, 1), now)
                .unwrap();
            for &user in &entrants {
                service.enter(message_id, user, now).unwrap();
            }

            let mut rng = StdRng::seed_from_u64(seed);
            let draw = service
                .close(message_id, &[BOT_ID], now + Duration::minutes(1), &mut rng)
                .unwrap();

            let unique: HashSet<u64> = draw.winners.iter().copied().collect();
            assert_eq!(draw.winners.len(), 4);
            assert_eq!(unique.len(), 4);
            assert!(draw.winners.iter().all(|w| entrants.contains(w)));
        }
    }

    #[tokio::test]
    async fn gift_card_scenario_two_of_three_win() {
        let service = GiveawayService::new();
        let now = start();
        let request = request("Gift Card", 2, 1);
        let placement = GiveawayPlacement {
            channel_id: 60,
            ..place(50)
        };
        service.open(placement, &request, now).unwrap();

        for (offset, user) in [(5, 301u64), (20, 302), (45, 303)] {
            service
                .enter(50, user, now + Duration::seconds(offset))
                .unwrap();
        }

        let mut rng = StdRng::seed_from_u64(42);
        let draw = service
            .close(50, &[BOT_ID], now + Duration::minutes(1), &mut rng)
            .unwrap();
        assert_eq!(draw.winners.len(), 2);

        let notifier = RecordingNotifier::default();
        let report = service.deliver(&draw, &notifier).await;

        let dms = notifier.dms.lock().await;
        assert_eq!(dms.len(), 2);
        assert!(dms.iter().all(|(user, text)| {
            draw.winners.contains(user) && text.contains("Gift Card")
        }));

        let announcements = notifier.announcements.lock().await;
        assert_eq!(announcements.len(), 1);
        assert_eq!(announcements[0].0, 60);
        for winner in &draw.winners {
            assert!(announcements[0].1.contains(&format!("<@{}>", winner)));
        }
        assert!(report.announced);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn still_open_reports_seconds() {
        let err = GiveawayError::StillOpen(chrono::Duration::minutes(6));
        assert_eq!(
            err.to_string(),
            "The giveaway is still open for another 360 seconds"
        );
    }

    #[tokio::test]
    async fn blocked_dm_does_not_stop_other_winners() {
        let service = GiveawayService::new();
        let draw = GiveawayDraw {
            message_id: 1,
            channel_id: 10,
            prize: "Sticker".to_string(),
            requested: 3,
            participant_count: 3,
            winners: vec![1, 2, 3],
        };
        let notifier = RecordingNotifier {
            blocked: vec![2],
            ..Default::default()
        };

        let report = service.deliver(&draw, &notifier).await;

        assert_eq!(report.notified, vec![1, 3]);
        assert_eq!(report.failed, vec![2]);
        assert!(report.announced);
        let announcements = notifier.announcements.lock().await;
        let announcement = &announcements[0].1;
        assert!(announcement.contains("<@2>"));
        assert!(announcement.contains("I couldn't DM <@2>, please contact the host"));
        assert!(!announcement.contains("I couldn't DM <@1>"));
        assert!(!announcement.contains("I couldn't DM <@3>"));
    }
}
