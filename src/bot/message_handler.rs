//! Message Handler module for processing incoming Telegram messages

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::debug;

// Import dialogue types
use crate::dialogue::{parse_user_event, UserEvent};
use crate::session_store::ConversationId;

use super::dialogue_manager::{RecipeDiscovery, Reply};

// Import UI builder functions
use super::ui_builder::{create_reply_markup, split_message, TELEGRAM_MESSAGE_LIMIT};

/// Send a reply, splitting long bodies; the markup goes with the last part
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) -> Result<()> {
    let parts = split_message(&reply.body, TELEGRAM_MESSAGE_LIMIT);
    let last = parts.len().saturating_sub(1);

    for (i, part) in parts.into_iter().enumerate() {
        if i == last {
            bot.send_message(chat_id, part)
                .reply_markup(create_reply_markup(reply))
                .await?;
        } else {
            bot.send_message(chat_id, part).await?;
        }
    }
    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    text: &str,
    discovery: &RecipeDiscovery,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, message_length = text.len(), "Received text message from user");

    let user_name = msg.from.as_ref().map(|user| user.full_name());
    let event = parse_user_event(text, user_name.as_deref());

    let replies = discovery.respond(ConversationId::from(msg.chat.id), event).await;
    for reply in &replies {
        send_reply(bot, msg.chat.id, reply).await?;
    }
    Ok(())
}

async fn handle_unsupported_message(
    bot: &Bot,
    msg: &Message,
    discovery: &RecipeDiscovery,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Received unsupported message type from user");

    let replies = discovery
        .respond(ConversationId::from(msg.chat.id), UserEvent::Help)
        .await;
    for reply in &replies {
        send_reply(bot, msg.chat.id, reply).await?;
    }
    Ok(())
}

pub async fn message_handler(bot: Bot, msg: Message, discovery: Arc<RecipeDiscovery>) -> Result<()> {
    if let Some(text) = msg.text() {
        handle_text_message(&bot, &msg, text, &discovery).await?;
    } else {
        handle_unsupported_message(&bot, &msg, &discovery).await?;
    }

    Ok(())
}
