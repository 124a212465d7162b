//! # Recipe Roulette Telegram Bot
//!
//! A Telegram bot that draws random recipes from a TheMealDB category,
//! translates them and walks the user from category choice to full recipe.

pub mod bot;
pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod dialogue;
pub mod errors;
pub mod localization;
pub mod session_store;
pub mod translation;
