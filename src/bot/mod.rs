//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Turns incoming Telegram messages into discovery events
//! - `ui_builder`: Creates keyboards and formats messages
//! - `dialogue_manager`: The recipe discovery state machine

pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

// Re-export main handler functions for use in main.rs
pub use message_handler::message_handler;

// Re-export the state machine API
pub use dialogue_manager::{DiscoverySettings, RecipeDiscovery, Reply, ReplyKind};
