use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recipe_roulette::bot::{self, DiscoverySettings, RecipeDiscovery};
use recipe_roulette::catalog::MealDbClient;
use recipe_roulette::config::BotConfig;
use recipe_roulette::localization::init_localization;
use recipe_roulette::session_store::InMemorySessionStore;
use recipe_roulette::translation::MyMemoryTranslator;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Recipe Roulette Telegram Bot");

    let config = BotConfig::from_env().context("Invalid bot configuration")?;
    init_localization().context("Failed to load localization bundles")?;

    info!(
        catalog = %config.mealdb_base_url,
        target_language = %config.target_language,
        timeout_secs = config.recovery.request_timeout_secs,
        "Configuration loaded"
    );

    let catalog = MealDbClient::new(&config.mealdb_base_url, config.recovery.clone())?;
    let translator = MyMemoryTranslator::new(
        &config.translation_base_url,
        config.translation_email.clone(),
        config.recovery.request_timeout(),
    )?;

    let discovery = Arc::new(RecipeDiscovery::new(
        Arc::new(catalog),
        Arc::new(translator),
        Arc::new(InMemorySessionStore::new()),
        DiscoverySettings {
            language: config.target_language.clone(),
            call_timeout: config.recovery.request_timeout(),
        },
    ));

    // Initialize the bot
    let bot = Bot::new(&config.telegram_token);

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry().branch(Update::filter_message().endpoint(bot::message_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![discovery])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
