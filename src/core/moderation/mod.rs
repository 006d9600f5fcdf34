// Core moderation module - validation and wording for moderator actions.

pub mod moderation_models;

pub use moderation_models::*;
