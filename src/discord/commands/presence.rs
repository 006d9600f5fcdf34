// Bot presence. Discord SDK types only, nothing reaches the core.

use poise::serenity_prelude as serenity;

/// Sets the default "what am I doing" line under the bot's name.
pub fn on_ready(ctx: &serenity::Context, leveling_enabled: bool) {
    ctx.set_presence(
        Some(serenity::ActivityData::watching(status_line(leveling_enabled))),
        serenity::OnlineStatus::Online,
    );
}

fn status_line(leveling_enabled: bool) -> &'static str {
    if leveling_enabled {
        "for 🎉 giveaways and level-ups"
    } else {
        "for 🎉 giveaways"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mentions_leveling_only_when_enabled() {
        assert!(status_line(true).contains("level-ups"));
        assert!(!status_line(false).contains("level"));
    }
}
