//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup};

// Import localization
use crate::localization::t_lang;

// Import catalog types
use crate::catalog::MealDetail;

use super::dialogue_manager::{Reply, ReplyKind};

/// Maximum length of a Telegram text message, in characters
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Options up to this length are laid out several per keyboard row
const SHORT_OPTION_CHARS: usize = 12;
const SHORT_OPTIONS_PER_ROW: usize = 3;

/// Format candidate recipe names as a marked list under a title
pub fn format_candidate_list(title: &str, names: &[String]) -> String {
    let mut result = format!("{title}\n");

    for name in names {
        result.push_str(&format!("• {name}\n"));
    }

    result.trim_end().to_string()
}

/// Format a recipe for display
pub fn format_meal_detail(detail: &MealDetail, language_code: Option<&str>) -> String {
    let mut result = format!("🍽 {}\n", detail.name);

    let mut facts = Vec::new();
    if !detail.category.is_empty() {
        facts.push(format!("{}: {}", t_lang("detail-category", language_code), detail.category));
    }
    if let Some(area) = &detail.area {
        facts.push(format!("{}: {}", t_lang("detail-area", language_code), area));
    }
    if !facts.is_empty() {
        result.push_str(&facts.join(" | "));
        result.push('\n');
    }

    if !detail.ingredients.is_empty() {
        result.push_str(&format!("\n{}:\n", t_lang("detail-ingredients", language_code)));
        for ingredient in &detail.ingredients {
            if ingredient.measure.is_empty() {
                result.push_str(&format!("• {}\n", ingredient.name));
            } else {
                result.push_str(&format!("• {} - {}\n", ingredient.name, ingredient.measure));
            }
        }
    }

    if !detail.instructions.is_empty() {
        result.push_str(&format!(
            "\n{}:\n{}\n",
            t_lang("detail-instructions", language_code),
            detail.instructions.replace("\r\n", "\n")
        ));
    }

    for (key, link) in [("detail-video", &detail.youtube), ("detail-source", &detail.source)] {
        if let Some(link) = link {
            result.push_str(&format!("\n{}: {}", t_lang(key, language_code), link));
        }
    }

    result.trim_end().to_string()
}

/// Split a message body into Telegram-sized parts
///
/// Parts break at line ends; a single line longer than the limit is cut on
/// character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > limit && !current.is_empty() {
            parts.push(current.trim_end().to_string());
            current.clear();
            current_len = 0;
        }

        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                parts.push(piece.iter().collect());
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim_end().to_string());
    }
    parts
}

/// Create a reply keyboard with one button per option
pub fn create_options_keyboard(options: &[String]) -> KeyboardMarkup {
    let per_row = if options.iter().all(|o| o.chars().count() <= SHORT_OPTION_CHARS) {
        SHORT_OPTIONS_PER_ROW
    } else {
        1
    };

    let rows: Vec<Vec<KeyboardButton>> = options
        .chunks(per_row)
        .map(|row| row.iter().map(|option| KeyboardButton::new(option.clone())).collect())
        .collect();

    KeyboardMarkup::new(rows).resize_keyboard().one_time_keyboard()
}

/// Markup for a reply: a keyboard for choice lists, no keyboard for plain text
pub fn create_reply_markup(reply: &Reply) -> ReplyMarkup {
    match reply.kind {
        ReplyKind::ChoiceList if !reply.options.is_empty() => {
            ReplyMarkup::Keyboard(create_options_keyboard(&reply.options))
        }
        _ => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
    }
}
