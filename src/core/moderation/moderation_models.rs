// Moderation domain models - ban, unban, kick and mute.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer turns them into API calls and channel messages.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REASON: &str = "No reason provided";

/// Name of the role used to silence members.
pub const MUTED_ROLE_NAME: &str = "Muted";

/// Longest mute we accept, in minutes (28 days).
pub const MAX_MUTE_MINUTES: i64 = 28 * 24 * 60;

#[derive(Debug, Error, PartialEq)]
pub enum ModerationError {
    #[error("Mute duration must be between 1 and {max} minutes (got {0})", max = MAX_MUTE_MINUTES)]
    InvalidMuteDuration(i64),

    #[error("You cannot {0} yourself")]
    SelfTarget(&'static str),
}

/// A moderation action against one user.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationAction {
    Ban { reason: String },
    Unban,
    Kick { reason: String },
    Mute { duration: Duration },
}

impl ModerationAction {
    pub fn ban(reason: Option<String>) -> Self {
        Self::Ban {
            reason: reason_or_default(reason),
        }
    }

    pub fn kick(reason: Option<String>) -> Self {
        Self::Kick {
            reason: reason_or_default(reason),
        }
    }

    pub fn mute(minutes: i64) -> Result<Self, ModerationError> {
        if minutes <= 0 || minutes > MAX_MUTE_MINUTES {
            return Err(ModerationError::InvalidMuteDuration(minutes));
        }
        Ok(Self::Mute {
            duration: Duration::from_secs(minutes as u64 * 60),
        })
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Ban { .. } => "ban",
            Self::Unban => "unban",
            Self::Kick { .. } => "kick",
            Self::Mute { .. } => "mute",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ban { reason } | Self::Kick { reason } => Some(reason),
            Self::Unban | Self::Mute { .. } => None,
        }
    }

    /// Reject actions a moderator aims at themselves. Unban is harmless.
    pub fn check_target(&self, actor_id: u64, target_id: u64) -> Result<(), ModerationError> {
        if actor_id == target_id && !matches!(self, Self::Unban) {
            Err(ModerationError::SelfTarget(self.verb()))
        } else {
            Ok(())
        }
    }

    /// Text for the audit log entry Discord records with the action.
    pub fn audit_reason(&self, actor_name: &str) -> String {
        match self {
            Self::Ban { reason } | Self::Kick { reason } => {
                format!("{} by {}: {}", self.verb(), actor_name, reason)
            }
            Self::Unban => format!("unban by {}", actor_name),
            Self::Mute { duration } => format!(
                "mute by {} for {} minutes",
                actor_name,
                duration.as_secs() / 60
            ),
        }
    }
}

pub fn reason_or_default(reason: Option<String>) -> String {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REASON.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reason_falls_back_to_default() {
        assert_eq!(
            ModerationAction::ban(None),
            ModerationAction::Ban {
                reason: DEFAULT_REASON.to_string()
            }
        );
        assert_eq!(
            ModerationAction::kick(Some("   ".into())),
            ModerationAction::Kick {
                reason: DEFAULT_REASON.to_string()
            }
        );
        assert_eq!(
            ModerationAction::ban(Some(" spamming ".into())),
            ModerationAction::Ban {
                reason: "spamming".to_string()
            }
        );
    }

    #[test]
    fn mute_duration_bounds() {
        assert_eq!(
            ModerationAction::mute(0),
            Err(ModerationError::InvalidMuteDuration(0))
        );
        assert_eq!(
            ModerationAction::mute(-3),
            Err(ModerationError::InvalidMuteDuration(-3))
        );
        assert!(ModerationAction::mute(MAX_MUTE_MINUTES + 1).is_err());
        assert_eq!(
            ModerationAction::mute(15),
            Ok(ModerationAction::Mute {
                duration: Duration::from_secs(900)
            })
        );
    }

    #[test]
    fn self_targeting_is_refused_except_unban() {
        let kick = ModerationAction::kick(None);
        assert_eq!(
            kick.check_target(1, 1),
            Err(ModerationError::SelfTarget("kick"))
        );
        assert!(kick.check_target(1, 2).is_ok());
        assert!(ModerationAction::Unban.check_target(1, 1).is_ok());
    }

    #[test]
    fn audit_reasons_name_the_moderator() {
        let ban = ModerationAction::ban(Some("raid".into()));
        assert_eq!(ban.audit_reason("mod"), "ban by mod: raid");

        let mute = ModerationAction::mute(30).unwrap();
        assert_eq!(mute.audit_reason("mod"), "mute by mod for 30 minutes");
        assert_eq!(
            ModerationAction::Unban.audit_reason("mod"),
            "unban by mod"
        );
    }
}
