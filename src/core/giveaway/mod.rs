// Core giveaway module - timed entry windows and winner draws.

pub mod giveaway_models;
pub mod giveaway_service;

pub use giveaway_models::*;
pub use giveaway_service::*;
