//! # Localization Module
//!
//! Fluent message bundles for the bot's user-facing texts. The bundles are
//! compiled into the binary from `locales/<lang>/main.ftl`, so the bot does
//! not depend on its working directory at runtime.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use tracing::{error, warn};
use unic_langid::LanguageIdentifier;

/// Languages with a bundled message file, the first one is the fallback
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "ru"];

const EN_MESSAGES: &str = include_str!("../locales/en/main.ftl");
const RU_MESSAGES: &str = include_str!("../locales/ru/main.ftl");

/// Localization manager for the recipe bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with every supported language loaded
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for (lang, source) in [("en", EN_MESSAGES), ("ru", RU_MESSAGES)] {
            let locale: LanguageIdentifier = lang.parse()?;
            bundles.insert(lang.to_string(), Self::create_bundle(locale, source)?);
        }

        Ok(Self { bundles })
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(
        locale: LanguageIdentifier,
        source: &str,
    ) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Telegram renders the Unicode isolation marks literally
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid messages for {locale}: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate messages for {locale}: {errors:?}"))?;

        Ok(bundle)
    }

    /// Get a localized message in the given language, falling back to English
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let Some(bundle) = self
            .bundles
            .get(detect_language(Some(language)))
            .or_else(|| self.bundles.get(SUPPORTED_LANGUAGES[0]))
        else {
            return format!("Missing translation: {key}");
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, *value);
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle
            .format_pattern(pattern, fluent_args.as_ref(), &mut errors)
            .into_owned();
        if !errors.is_empty() {
            warn!(key, language, ?errors, "Message formatted with errors");
        }

        value
    }

    /// Get a localized message with simple string arguments
    pub fn get_message_with_args(&self, key: &str, language: &str, args: &[(&str, &str)]) -> String {
        let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
        self.get_message_in_language(key, language, Some(&args_map))
    }
}

/// Map a user or configured language code to a supported language
///
/// Region suffixes are ignored (`ru-RU` → `ru`); anything unsupported falls
/// back to English.
pub fn detect_language(language_code: Option<&str>) -> &'static str {
    let primary = language_code
        .and_then(|code| code.split(['-', '_']).next())
        .map(|code| code.to_lowercase());

    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| primary.as_deref() == Some(**lang))
        .copied()
        .unwrap_or(SUPPORTED_LANGUAGES[0])
}

/// Global localization instance
static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager
pub fn init_localization() -> Result<()> {
    if LOCALIZATION_MANAGER.get().is_none() {
        let manager = LocalizationManager::new()?;
        let _ = LOCALIZATION_MANAGER.set(manager);
    }
    Ok(())
}

/// Get the global localization manager, initializing it on first use
pub fn get_localization_manager() -> &'static LocalizationManager {
    LOCALIZATION_MANAGER.get_or_init(|| {
        LocalizationManager::new().unwrap_or_else(|e| {
            error!(error = %e, "Failed to load bundled messages");
            LocalizationManager {
                bundles: HashMap::new(),
            }
        })
    })
}

/// Convenience function to get a localized message
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    get_localization_manager().get_message_in_language(key, detect_language(language_code), None)
}

/// Convenience function to get a localized message with arguments
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    get_localization_manager().get_message_with_args(key, detect_language(language_code), args)
}
