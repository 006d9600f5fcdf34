// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (snapshot file store)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::config::BotConfig;
use crate::core::giveaway::GiveawayService;
use crate::core::leveling::{LevelingError, LevelingService, LevelingSettings};
use crate::core::retry::RetryPolicy;
use crate::discord::commands::presence;
use crate::discord::giveaway::handle_reaction_add;
use crate::discord::leveling_announcements::send_milestone_announcement;
use crate::discord::{Data, Error};
use crate::infra::leveling::SnapshotLevelStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if !qualifies_for_leveling(new_message.author.bot, data.leveling.is_enabled()) {
                return Ok(());
            }

            match data
                .leveling
                .record_activity(new_message.author.id.get())
                .await
            {
                Ok(Some(level_up)) => {
                    tracing::debug!(
                        user_id = level_up.user_id,
                        old_level = level_up.old_level,
                        new_level = level_up.new_level,
                        "User leveled up"
                    );

                    if level_up.milestone {
                        tracing::info!(
                            user_id = level_up.user_id,
                            level = level_up.new_level,
                            "Milestone reached"
                        );
                        if let Err(err) = send_milestone_announcement(ctx, data, &level_up).await
                        {
                            tracing::warn!("Failed to send milestone announcement: {err}");
                        }
                    }
                }
                Ok(None) => {}
                Err(LevelingError::Disabled) => {}
                Err(e) => tracing::error!("Error recording activity: {}", e),
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            if let Err(e) = handle_reaction_add(ctx, data, add_reaction).await {
                tracing::error!("Error handling giveaway reaction: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Only human messages count, and only while leveling is switched on. Bot
/// accounts (this one included) never earn experience.
fn qualifies_for_leveling(author_is_bot: bool, leveling_enabled: bool) -> bool {
    leveling_enabled && !author_is_bot
}

/// Periodically write the leveling snapshot. Runs for the life of the process.
async fn snapshot_loop(leveling: Arc<LevelingService<SnapshotLevelStore>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        match leveling.save_snapshot().await {
            Ok(()) => tracing::debug!("Leveling snapshot saved"),
            Err(e) => tracing::error!("Failed to save leveling snapshot: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = BotConfig::from_env().context("Invalid bot configuration")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let leveling_config = config.leveling.clone();
    if leveling_config.enabled {
        if let Some(dir) = leveling_config.snapshot_path.parent() {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create snapshot directory {}", dir.display())
            })?;
        }
    }

    // A disabled leveling system never touches the snapshot file.
    let level_store = if leveling_config.enabled {
        SnapshotLevelStore::load(&leveling_config.snapshot_path)
            .context("Failed to load leveling snapshot")?
    } else {
        SnapshotLevelStore::empty(&leveling_config.snapshot_path)
    };
    let snapshot_path = level_store.path().to_path_buf();
    let leveling_service = Arc::new(LevelingService::new(
        level_store,
        LevelingSettings {
            enabled: leveling_config.enabled,
            rate: leveling_config.rate,
        },
    ));
    let giveaway_service = Arc::new(GiveawayService::new());

    tracing::info!(
        leveling_enabled = leveling_config.enabled,
        rate = leveling_config.rate,
        snapshot = %snapshot_path.display(),
        "Services initialized"
    );

    // Create the data structure that will be shared across all commands
    let data = Data {
        leveling: Arc::clone(&leveling_service),
        giveaways: Arc::clone(&giveaway_service),
        leveling_channel: leveling_config.channel_id.map(serenity::ChannelId::new),
        retry: RetryPolicy::default(),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            // Register all our commands here
            commands: vec![
                discord::commands::giveaway::create_giveaway(),
                discord::commands::giveaway::giveaways(),
                discord::moderation::ban(),
                discord::moderation::unban(),
                discord::moderation::kick(),
                discord::moderation::mute(),
                discord::commands::leveling::level(),
                discord::commands::leveling::leaderboard(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(discord::errors::on_error(error)),
            pre_command: |ctx| {
                Box::pin(async move {
                    tracing::debug!(
                        command = %ctx.command().qualified_name,
                        user_id = ctx.author().id.get(),
                        "Running command"
                    );
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(bot = %ready.user.name, "Bot is starting up");

                // Global registration can take a while to propagate.
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                presence::on_ready(ctx, data.leveling.is_enabled());

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Shutting down");
        shard_manager.shutdown_all().await;
    });

    let snapshot_task = leveling_service.is_enabled().then(|| {
        tokio::spawn(snapshot_loop(
            Arc::clone(&leveling_service),
            leveling_config.snapshot_interval,
        ))
    });

    let run_result = client.start().await;

    // Stop the periodic writer before the last save so the two never overlap.
    if let Some(task) = snapshot_task {
        task.abort();
        let _ = task.await;
    }

    if leveling_service.is_enabled() {
        match leveling_service.save_snapshot().await {
            Ok(()) => tracing::info!("Final leveling snapshot saved"),
            Err(e) => tracing::error!("Failed to save final leveling snapshot: {}", e),
        }
    }

    run_result.context("Error running bot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_human_messages_earn_experience() {
        assert!(qualifies_for_leveling(false, true));
        assert!(!qualifies_for_leveling(true, true));
    }

    #[test]
    fn nothing_counts_while_leveling_is_disabled() {
        assert!(!qualifies_for_leveling(false, false));
        assert!(!qualifies_for_leveling(true, false));
    }
}
