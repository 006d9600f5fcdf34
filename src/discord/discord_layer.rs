// Discord layer - commands, event handlers and the Discord side of each feature.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "errors/error_handler.rs"]
pub mod errors;

#[path = "giveaway/giveaway_runner.rs"]
pub mod giveaway;

#[path = "leveling/leveling_announcements.rs"]
pub mod leveling_announcements;

#[path = "moderation/commands.rs"]
pub mod moderation;

// Re-export command types for convenience
pub use commands::leveling::{Data, Error};
