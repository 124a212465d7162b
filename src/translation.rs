//! # Translation Module
//!
//! Translation of catalog texts (meal names, instructions, ingredients) into
//! the bot's language.
//!
//! Translation is best effort: callers go through [`translate_or_original`] or
//! [`translate_all`], which fall back to the source text when the service
//! fails or times out. A failure never reaches the user.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::TranslationError;

/// Language of the recipe catalog texts
pub const SOURCE_LANGUAGE: &str = "en";

/// Per-query character limit of the translation service
pub const MAX_CHUNK_CHARS: usize = 450;

/// Text translation service
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError>;
}

/// Translations kept in flight by [`translate_all`]
pub const MAX_CONCURRENT_TRANSLATIONS: usize = 4;

/// Translate one text, returning the original on failure or timeout
///
/// The text is sent in service-sized chunks, one call per chunk, and `limit`
/// bounds each call rather than the whole text. Any failed chunk makes the
/// whole text fall back, so a reply never mixes languages.
pub async fn translate_or_original(
    translator: &dyn Translator,
    text: &str,
    target_language: &str,
    limit: Duration,
) -> String {
    let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);
    let mut translated = String::with_capacity(text.len());

    for (index, chunk) in chunks.iter().enumerate() {
        match tokio::time::timeout(limit, translator.translate(chunk, target_language)).await {
            Ok(Ok(piece)) => translated.push_str(&piece),
            Ok(Err(e)) => {
                warn!(error = %e, target_language, chunk = index, "Translation failed, keeping original text");
                return text.to_string();
            }
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    target_language,
                    chunk = index,
                    "Translation timed out, keeping original text"
                );
                return text.to_string();
            }
        }
    }

    if chunks.is_empty() {
        return text.to_string();
    }
    translated
}

/// Translate many texts with at most [`MAX_CONCURRENT_TRANSLATIONS`] in flight
///
/// The result is parallel to `texts`; every position falls back to its own
/// original text independently of the others.
pub async fn translate_all(
    translator: &dyn Translator,
    texts: &[String],
    target_language: &str,
    limit: Duration,
) -> Vec<String> {
    let translations: futures::stream::BoxStream<'_, String> = stream::iter(texts)
        .map(|text| translate_or_original(translator, text, target_language, limit))
        .buffered(MAX_CONCURRENT_TRANSLATIONS)
        .boxed();
    translations.collect().await
}

/// Split text into pieces of at most `max_chars` characters
///
/// Pieces break at line ends where possible, then at sentence ends, then
/// anywhere. Concatenating the pieces gives back the input.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for segment in text.split_inclusive('\n').flat_map(|line| {
        if line.chars().count() > max_chars {
            line.split_inclusive(". ").collect::<Vec<_>>()
        } else {
            vec![line]
        }
    }) {
        if current.chars().count() + segment.chars().count() > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if segment.chars().count() > max_chars {
            let chars: Vec<char> = segment.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
        } else {
            current.push_str(segment);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Deserialize)]
struct MyMemoryResponse {
    #[serde(rename = "responseData")]
    response_data: Option<MyMemoryData>,
    #[serde(rename = "responseStatus", default)]
    response_status: Value,
    #[serde(rename = "responseDetails", default)]
    response_details: Value,
}

#[derive(Debug, Deserialize)]
struct MyMemoryData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

/// Translator backed by the MyMemory public API
pub struct MyMemoryTranslator {
    client: Client,
    base_url: String,
    contact_email: Option<String>,
}

impl MyMemoryTranslator {
    pub fn new(base_url: &str, contact_email: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create translation HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            contact_email,
        })
    }

    async fn translate_chunk(&self, chunk: &str, target_language: &str) -> Result<String, TranslationError> {
        let langpair = format!("{SOURCE_LANGUAGE}|{target_language}");
        let mut query = vec![("q", chunk), ("langpair", langpair.as_str())];
        if let Some(email) = &self.contact_email {
            query.push(("de", email.as_str()));
        }

        let response: MyMemoryResponse = self
            .client
            .get(format!("{}/get", self.base_url))
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The status is a number on success and sometimes a string on errors
        let status = match &response.response_status {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        if status != Some(200) {
            return Err(TranslationError::Unavailable(format!(
                "status {}: {}",
                response.response_status, response.response_details
            )));
        }

        response
            .response_data
            .and_then(|data| data.translated_text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| TranslationError::Unavailable("empty translation".to_string()))
    }
}

#[async_trait]
impl Translator for MyMemoryTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() || target_language.eq_ignore_ascii_case(SOURCE_LANGUAGE) {
            return Ok(text.to_string());
        }

        let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);
        debug!(chars = text.len(), chunks = chunks.len(), target_language, "Translating text");

        let mut translated = String::with_capacity(text.len());
        for chunk in &chunks {
            let trimmed = chunk.trim_end();
            let trailing = &chunk[trimmed.len()..];
            if trimmed.trim().is_empty() {
                translated.push_str(chunk);
                continue;
            }
            translated.push_str(&self.translate_chunk(trimmed, target_language).await?);
            translated.push_str(trailing);
        }

        Ok(translated)
    }
}
