// Framework error handling and classification of Discord API errors.

use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

/// Errors worth another attempt: rate limits, server errors and network
/// failures. Anything else (missing permissions, unknown user, ...) is final.
pub fn is_transient(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) => {
            let status = response.status_code;
            status.as_u16() == 429 || status.is_server_error()
        }
        serenity::Error::Http(serenity::HttpError::Request(_)) => true,
        serenity::Error::Io(_) => true,
        _ => false,
    }
}

/// Poise error hook. Permission failures and command errors are reported to
/// the invoker; nothing here stops the bot.
pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            tracing::error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                command = %ctx.command().qualified_name,
                "Error in command: {}",
                error
            );
            let _ = ctx
                .send(
                    poise::CreateReply::default()
                        .content("Something went wrong while running that command.")
                        .ephemeral(true),
                )
                .await;
        }
        poise::FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            tracing::info!(
                command = %ctx.command().qualified_name,
                user_id = ctx.author().id.get(),
                "Command rejected: missing permissions"
            );
            let _ = ctx
                .send(
                    poise::CreateReply::default()
                        .content(permission_message(missing_permissions))
                        .ephemeral(true),
                )
                .await;
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

fn permission_message(missing: Option<serenity::Permissions>) -> String {
    match missing {
        Some(permissions) if !permissions.is_empty() => format!(
            "You don't have permission to use this command. Missing: {}",
            permissions.get_permission_names().join(", ")
        ),
        _ => "You don't have permission to use this command.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transient() {
        let err = serenity::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(is_transient(&err));
    }

    #[test]
    fn other_errors_are_final() {
        assert!(!is_transient(&serenity::Error::Other("nope")));
    }

    #[test]
    fn permission_message_names_what_is_missing() {
        let text = permission_message(Some(serenity::Permissions::BAN_MEMBERS));
        assert!(text.contains("Ban Members"));

        assert_eq!(
            permission_message(None),
            "You don't have permission to use this command."
        );
    }
}
