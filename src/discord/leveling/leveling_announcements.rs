use crate::core::leveling::LevelUpEvent;
use crate::discord::Data;
use poise::serenity_prelude::{self as serenity, builder::CreateMessage};
use rand::seq::SliceRandom;

/// Post a milestone announcement to the configured leveling channel.
///
/// Not retried: a second attempt after an ambiguous failure could post twice.
pub async fn send_milestone_announcement(
    ctx: &serenity::Context,
    data: &Data,
    level_up: &LevelUpEvent,
) -> Result<(), serenity::Error> {
    let Some(channel_id) = data.leveling_channel else {
        tracing::warn!("Leveling channel not configured, skipping milestone announcement");
        return Ok(());
    };

    let embed = serenity::CreateEmbed::new()
        .title("Level Up!")
        .color(level_color(level_up.new_level))
        .field("Level", level_up.new_level.to_string(), true)
        .field("Experience", level_up.experience.to_string(), true)
        .footer(serenity::CreateEmbedFooter::new(random_flavor_line()));

    channel_id
        .send_message(
            ctx,
            CreateMessage::new()
                .content(milestone_text(level_up))
                .embed(embed),
        )
        .await
        .map(|_| ())
}

fn milestone_text(level_up: &LevelUpEvent) -> String {
    format!(
        "Congratulations <@{}>! You have reached level {}! :tada:",
        level_up.user_id, level_up.new_level
    )
}

fn level_color(level: u32) -> serenity::Colour {
    if level >= 50 {
        serenity::Colour::DARK_PURPLE
    } else if level >= 25 {
        serenity::Colour::ORANGE
    } else if level >= 10 {
        serenity::Colour::GOLD
    } else {
        serenity::Colour::BLURPLE
    }
}

fn random_flavor_line() -> &'static str {
    const FLAVOR_LINES: [&str; 4] = [
        "Keep the streak going!",
        "Your chatter is paying off.",
        "Five more levels to the next shout-out.",
        "That counter never stood a chance.",
    ];

    FLAVOR_LINES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FLAVOR_LINES[0])
}
