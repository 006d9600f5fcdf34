// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "config/bot_config.rs"]
pub mod config;

#[path = "giveaway/mod.rs"]
pub mod giveaway;

#[path = "leveling/leveling_service.rs"]
pub mod leveling;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "retry/backoff.rs"]
pub mod retry;
