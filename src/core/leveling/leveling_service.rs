// This is the leveling module - it contains ALL the business logic for the leveling system.
// No Discord-specific code lives here. It works with primitive ids (u64) so the
// Discord layer only has to translate events into calls.

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// A user's progress. One record per user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRecord {
    pub user_id: u64,
    pub level: u32,
    pub experience: u64,
}

impl LevelRecord {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            level: 0,
            experience: 0,
        }
    }
}

/// Returned by the service when a message pushed a user to a higher level,
/// so the Discord layer can announce it.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpEvent {
    pub user_id: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub experience: u64,
    /// The level crossed a multiple of [`MILESTONE_EVERY`].
    pub milestone: bool,
}

/// Milestone broadcasts fire every this many levels.
pub const MILESTONE_EVERY: u32 = 5;

/// Experience granted for each qualifying message.
pub const EXPERIENCE_PER_MESSAGE: u64 = 1;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LevelingError {
    #[error("The leveling system is currently disabled")]
    Disabled,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid user ID")]
    InvalidId,

    #[error("Leaderboard limit must be at least 1")]
    InvalidLimit,
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for persisting level records.
///
/// Implementations must apply `add_experience` atomically: two concurrent
/// messages from the same user both have to land.
#[async_trait]
pub trait LevelStore: Send + Sync {
    /// Add experience to a user (creating the record if needed) and recompute
    /// the level with `level_for`. Returns the record before and after.
    async fn add_experience(
        &self,
        user_id: u64,
        amount: u64,
        level_for: &(dyn Fn(u64) -> u32 + Send + Sync),
    ) -> Result<(LevelRecord, LevelRecord), LevelingError>;

    /// Get a user's record, if they have one.
    async fn get_record(&self, user_id: u64) -> Result<Option<LevelRecord>, LevelingError>;

    /// All records, in no particular order.
    async fn all_records(&self) -> Result<Vec<LevelRecord>, LevelingError>;

    /// Write the current state to durable storage.
    async fn flush(&self) -> Result<(), LevelingError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelingSettings {
    pub enabled: bool,
    /// Levels per experience point.
    pub rate: f64,
}

impl Default for LevelingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 1.0,
        }
    }
}

/// The main service for leveling operations.
///
/// Generic over the store so tests can swap in an in-memory implementation.
pub struct LevelingService<S: LevelStore> {
    store: S,
    settings: LevelingSettings,
}

impl<S: LevelStore> LevelingService<S> {
    pub fn new(store: S, settings: LevelingSettings) -> Self {
        Self { store, settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn ensure_enabled(&self) -> Result<(), LevelingError> {
        if self.settings.enabled {
            Ok(())
        } else {
            Err(LevelingError::Disabled)
        }
    }

    /// Calculate level from total experience.
    ///
    /// `level = floor(experience * rate)`. With the default rate of 1.0 every
    /// message is worth one level.
    pub fn calculate_level(&self, experience: u64) -> u32 {
        let level = (experience as f64 * self.settings.rate).floor();
        if level >= u32::MAX as f64 {
            u32::MAX
        } else {
            level as u32
        }
    }

    /// Count one qualifying message for `user_id`.
    ///
    /// **Returns:**
    /// - `Ok(Some(LevelUpEvent))` if the user reached a higher level
    /// - `Ok(None)` if experience was added but the level did not change
    /// - `Err(LevelingError::Disabled)` when leveling is switched off
    pub async fn record_activity(
        &self,
        user_id: u64,
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        self.ensure_enabled()?;
        if user_id == 0 {
            return Err(LevelingError::InvalidId);
        }

        let level_for = |experience: u64| self.calculate_level(experience);
        let (before, after) = self
            .store
            .add_experience(user_id, EXPERIENCE_PER_MESSAGE, &level_for)
            .await?;

        if after.level > before.level {
            Ok(Some(LevelUpEvent {
                user_id,
                old_level: before.level,
                new_level: after.level,
                experience: after.experience,
                milestone: crosses_milestone(before.level, after.level),
            }))
        } else {
            Ok(None)
        }
    }

    /// Get a user's record, or `None` if they never earned experience.
    pub async fn record(&self, user_id: u64) -> Result<Option<LevelRecord>, LevelingError> {
        self.ensure_enabled()?;
        self.store.get_record(user_id).await
    }

    /// Top users, highest level first. Ties go to more experience, then to
    /// the lower user id so the order is stable.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LevelRecord>, LevelingError> {
        self.ensure_enabled()?;
        if limit == 0 {
            return Err(LevelingError::InvalidLimit);
        }

        let mut records = self.store.all_records().await?;
        records.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then(b.experience.cmp(&a.experience))
                .then(a.user_id.cmp(&b.user_id))
        });
        records.truncate(limit);
        Ok(records)
    }

    /// Persist the in-memory state.
    pub async fn save_snapshot(&self) -> Result<(), LevelingError> {
        self.store.flush().await
    }
}

/// True when moving from `old` to `new` passes a multiple of [`MILESTONE_EVERY`].
pub fn crosses_milestone(old: u32, new: u32) -> bool {
    new > old && new / MILESTONE_EVERY > old / MILESTONE_EVERY
}

// ============================================================================
// TESTS
// ============================================================================
