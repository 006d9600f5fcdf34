// Discord commands module.
// Each feature gets its own command file; moderation commands live under
// `discord::moderation`.

pub mod giveaway;

pub mod leveling;

// Bot presence management
pub mod presence;
