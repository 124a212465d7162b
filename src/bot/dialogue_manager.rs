//! Dialogue Manager module: the recipe discovery state machine
//!
//! Every user event is handled as one step: read the conversation's session,
//! call the catalog and translator as needed, write the next session and
//! return reply descriptors. A step holds its conversation's step lock until
//! it finishes, so events of one conversation never interleave.
//!
//! | Stage | Input | Next stage |
//! |---|---|---|
//! | any | `/category_search_random N` | `AwaitingCategory` (or `Idle` on failure) |
//! | `AwaitingCategory` | offered category | `AwaitingRecipeListConfirmation` |
//! | `AwaitingRecipeListConfirmation` | confirmation phrase | `AwaitingRecipeSelection` |
//! | `AwaitingRecipeSelection` | `"<n>, ..."` or "all recipes" | `Idle` |
//!
//! Invalid input leaves the stage unchanged; upstream failures reset to `Idle`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{detect_language, t_args_lang, t_lang};

// Import catalog and translation collaborators
use crate::catalog::{Ingredient, MealDetail, MealSummary, RecipeCatalog, TimeBoxedCatalog};
use crate::errors::CatalogError;
use crate::translation::{translate_all, Translator};

// Import dialogue types
use crate::dialogue::{
    match_category, parse_recipe_count, parse_selection_index, selection_option, Session,
    SessionPatch, Stage, UserEvent,
};
use crate::session_store::{ConversationId, SessionStore};

// Import UI builder functions
use super::ui_builder::{format_candidate_list, format_meal_detail};

/// How a reply should be presented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    Text,
    /// Text with a set of options the user picks from
    ChoiceList,
}

/// Reply descriptor produced by a step, rendered by the message handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub body: String,
    pub options: Vec<String>,
}

impl Reply {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Text,
            body: body.into(),
            options: Vec::new(),
        }
    }

    pub fn choices(body: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            kind: ReplyKind::ChoiceList,
            body: body.into(),
            options,
        }
    }
}

/// Tunables of the discovery flow
#[derive(Clone, Debug)]
pub struct DiscoverySettings {
    /// Language recipes are translated into and replies are written in
    pub language: String,
    /// Deadline for every catalog and translation call
    pub call_timeout: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            language: crate::config::DEFAULT_TARGET_LANGUAGE.to_string(),
            call_timeout: Duration::from_secs(crate::config::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Largest candidate list that still offers the "all recipes" option
pub const MAX_ALL_RECIPES: usize = 10;

/// Pick up to `count` meals at random, never the same meal twice
pub fn sample_meals<R>(meals: &[MealSummary], count: usize, rng: &mut R) -> Vec<MealSummary>
where
    R: Rng + ?Sized,
{
    let mut seen = HashSet::new();
    let distinct: Vec<&MealSummary> = meals.iter().filter(|meal| seen.insert(meal.id.clone())).collect();

    distinct
        .choose_multiple(rng, count)
        .map(|meal| (*meal).clone())
        .collect()
}

/// The recipe discovery state machine
pub struct RecipeDiscovery {
    catalog: Arc<dyn RecipeCatalog>,
    translator: Arc<dyn Translator>,
    store: Arc<dyn SessionStore>,
    settings: DiscoverySettings,
    step_locks: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RecipeDiscovery {
    /// Create the state machine; every catalog call gets `settings.call_timeout`
    pub fn new(
        catalog: Arc<dyn RecipeCatalog>,
        translator: Arc<dyn Translator>,
        store: Arc<dyn SessionStore>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            catalog: Arc::new(TimeBoxedCatalog::new(catalog, settings.call_timeout)),
            translator,
            store,
            settings,
            step_locks: Mutex::new(HashMap::new()),
        }
    }

    fn language(&self) -> Option<&str> {
        Some(detect_language(Some(&self.settings.language)))
    }

    fn t(&self, key: &str) -> String {
        t_lang(key, self.language())
    }

    fn step_lock(&self, id: ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.step_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    /// Current stage of a conversation
    pub async fn stage(&self, id: ConversationId) -> Result<Stage> {
        Ok(self.store.get(id).await?.stage)
    }

    /// Drop the conversation's step lock unless another step holds or waits on it
    fn release_step_lock(&self, id: ConversationId) {
        let mut locks = self.step_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }

    /// Handle one user event and return the replies to send
    ///
    /// Fails only when the session store does.
    pub async fn handle(&self, id: ConversationId, event: UserEvent) -> Result<Vec<Reply>> {
        let step_lock = self.step_lock(id);
        let result = {
            let _step = step_lock.lock().await;
            self.step(id, event).await
        };
        drop(step_lock);
        self.release_step_lock(id);
        result
    }

    /// Handle one user event; a store failure becomes the upstream-failure reply
    pub async fn respond(&self, id: ConversationId, event: UserEvent) -> Vec<Reply> {
        match self.handle(id, event).await {
            Ok(replies) => replies,
            Err(e) => {
                error!(conversation_id = %id, error = %e, "Failed to handle user event");
                vec![Reply::text(self.t("upstream-failure"))]
            }
        }
    }

    async fn step(&self, id: ConversationId, event: UserEvent) -> Result<Vec<Reply>> {
        let session = self.store.get(id).await?;
        debug!(conversation_id = %id, stage = ?session.stage, ?event, "Handling user event");

        let replies = match event {
            UserEvent::Start { user_name } => vec![self.welcome(user_name.as_deref())],
            UserEvent::Help => vec![self.help()],
            UserEvent::About => vec![Reply::text(self.t("about"))],
            UserEvent::Cancel => {
                if session.stage != Stage::Idle {
                    self.store.reset(id).await?;
                    info!(conversation_id = %id, stage = ?session.stage, "Search cancelled by user");
                }
                vec![Reply::text(self.t("search-cancelled"))]
            }
            UserEvent::StartSearch { count } => self.start_search(id, count.as_deref()).await?,
            UserEvent::Text(text) => match session.stage {
                Stage::Idle => self.idle_text(&text),
                Stage::AwaitingCategory => self.choose_category(id, session, &text).await?,
                Stage::AwaitingRecipeListConfirmation => self.confirm_list(id, session, &text).await?,
                Stage::AwaitingRecipeSelection => self.select_recipe(id, session, &text).await?,
            },
        };

        Ok(replies)
    }

    fn welcome(&self, user_name: Option<&str>) -> Reply {
        let default_name = self.t("welcome-default-name");
        let name = user_name.filter(|n| !n.trim().is_empty()).unwrap_or(default_name.as_str());

        Reply::choices(
            t_args_lang("welcome", &[("name", name)], self.language()),
            vec![self.t("button-commands"), self.t("button-about")],
        )
    }

    fn help(&self) -> Reply {
        let help_message = [
            self.t("help-title"),
            self.t("help-search"),
            self.t("help-cancel"),
            self.t("help-help"),
        ]
        .join("\n");
        Reply::text(help_message)
    }

    /// Free text outside of a search: the start keyboard buttons or a hint
    fn idle_text(&self, text: &str) -> Vec<Reply> {
        let input = text.trim().to_lowercase();

        if input == self.t("button-commands").to_lowercase() {
            vec![self.help()]
        } else if input == self.t("button-about").to_lowercase() {
            vec![Reply::text(self.t("about"))]
        } else {
            vec![Reply::text(self.t("idle-hint"))]
        }
    }

    /// Reset the conversation and explain why
    async fn abort(&self, id: ConversationId, message_key: &str) -> Result<Vec<Reply>> {
        self.store.reset(id).await?;
        Ok(vec![Reply::text(self.t(message_key))])
    }

    async fn start_search(&self, id: ConversationId, raw_count: Option<&str>) -> Result<Vec<Reply>> {
        let requested_count = match parse_recipe_count(raw_count) {
            Ok(count) => count,
            Err(reason) => {
                debug!(conversation_id = %id, reason, ?raw_count, "Rejected recipe count");
                return Ok(vec![Reply::text(self.t("search-usage"))]);
            }
        };

        match self.catalog.list_categories().await {
            Ok(categories) if !categories.is_empty() => {
                info!(
                    conversation_id = %id,
                    requested_count,
                    categories = categories.len(),
                    "Starting recipe search"
                );
                self.store
                    .set(id, Session::awaiting_category(requested_count, categories.clone()))
                    .await?;
                Ok(vec![Reply::choices(self.t("choose-category"), categories)])
            }
            Ok(_) | Err(CatalogError::Malformed(_)) => {
                warn!(conversation_id = %id, "Catalog returned no categories");
                self.abort(id, "categories-unavailable").await
            }
            Err(e) => {
                error!(conversation_id = %id, error = %e, "Failed to list categories");
                self.abort(id, "upstream-failure").await
            }
        }
    }

    async fn choose_category(&self, id: ConversationId, session: Session, text: &str) -> Result<Vec<Reply>> {
        let Some(category) = match_category(text, &session.offered_categories).map(str::to_string) else {
            debug!(conversation_id = %id, input = text, "Input is not an offered category");
            return Ok(vec![Reply::choices(
                self.t("category-unknown"),
                session.offered_categories.clone(),
            )]);
        };

        let Some(requested_count) = session.requested_count else {
            error!(conversation_id = %id, "Session awaiting category without a recipe count");
            return self.abort(id, "upstream-failure").await;
        };

        let meals = match self.catalog.list_meals_in_category(&category).await {
            Ok(meals) if !meals.is_empty() => meals,
            Ok(_) | Err(CatalogError::Malformed(_)) => {
                warn!(conversation_id = %id, category = %category, "No meals in category");
                self.store.reset(id).await?;
                return Ok(vec![Reply::text(t_args_lang(
                    "no-meals",
                    &[("category", category.as_str())],
                    self.language(),
                ))]);
            }
            Err(e) => {
                error!(conversation_id = %id, category = %category, error = %e, "Failed to list meals");
                return self.abort(id, "upstream-failure").await;
            }
        };

        let candidates = sample_meals(&meals, requested_count as usize, &mut rand::thread_rng());
        let names: Vec<String> = candidates.iter().map(|meal| meal.name.clone()).collect();
        let translated_names = translate_all(
            self.translator.as_ref(),
            &names,
            &self.settings.language,
            self.settings.call_timeout,
        )
        .await;

        info!(
            conversation_id = %id,
            category = %category,
            available = meals.len(),
            sampled = candidates.len(),
            "Sampled candidate recipes"
        );

        let next = session.with_candidates(candidates, translated_names.clone());
        debug_assert!(next.is_consistent());
        self.store.set(id, next).await?;

        Ok(vec![Reply::choices(
            format_candidate_list(&self.t("candidates-title"), &translated_names),
            vec![self.t("confirm-phrase")],
        )])
    }

    async fn confirm_list(&self, id: ConversationId, session: Session, text: &str) -> Result<Vec<Reply>> {
        let confirm_phrase = self.t("confirm-phrase");

        if text.trim().to_lowercase() != confirm_phrase.to_lowercase() {
            debug!(conversation_id = %id, input = text, "Recipe list not confirmed");
            return Ok(vec![Reply::choices(self.t("confirm-first"), vec![confirm_phrase])]);
        }

        let session = self
            .store
            .update(id, SessionPatch::stage(Stage::AwaitingRecipeSelection))
            .await?;
        debug!(conversation_id = %id, candidates = session.candidate_meal_ids.len(), "Recipe list confirmed");

        Ok(vec![Reply::choices(self.t("choose-recipe"), self.selection_options(&session))])
    }

    fn offers_all_recipes(session: &Session) -> bool {
        session.candidate_meal_ids.len() <= MAX_ALL_RECIPES
    }

    /// Numbered candidate names, plus "all recipes" for short lists
    fn selection_options(&self, session: &Session) -> Vec<String> {
        let mut options: Vec<String> = session
            .translated_names
            .iter()
            .enumerate()
            .map(|(i, name)| selection_option(i + 1, name))
            .collect();
        if Self::offers_all_recipes(session) {
            options.push(self.t("all-recipes"));
        }
        options
    }

    async fn select_recipe(&self, id: ConversationId, session: Session, text: &str) -> Result<Vec<Reply>> {
        if Self::offers_all_recipes(&session)
            && text.trim().to_lowercase() == self.t("all-recipes").to_lowercase()
        {
            return self.show_all_recipes(id, session).await;
        }

        let selected = parse_selection_index(text)
            .and_then(|index| session.candidate_at(index).cloned().map(|meal_id| (index, meal_id)));
        let Some((index, meal_id)) = selected else {
            debug!(conversation_id = %id, input = text, "Invalid recipe selection");
            return Ok(vec![Reply::choices(
                self.t("invalid-selection"),
                self.selection_options(&session),
            )]);
        };

        debug!(conversation_id = %id, index, meal_id = %meal_id, "Recipe selected");
        match self.catalog.get_meal_detail(&meal_id).await {
            Ok(Some(detail)) => {
                let detail = self.translate_detail(detail).await;
                self.store.reset(id).await?;
                info!(conversation_id = %id, meal_id = %meal_id, "Recipe delivered");
                Ok(vec![Reply::text(format_meal_detail(&detail, self.language()))])
            }
            Ok(None) | Err(CatalogError::Malformed(_)) => {
                warn!(conversation_id = %id, meal_id = %meal_id, "Recipe not found");
                self.abort(id, "recipe-not-found").await
            }
            Err(e) => {
                error!(conversation_id = %id, meal_id = %meal_id, error = %e, "Failed to fetch recipe");
                self.abort(id, "upstream-failure").await
            }
        }
    }

    async fn show_all_recipes(&self, id: ConversationId, session: Session) -> Result<Vec<Reply>> {
        let details = self.catalog.get_meal_details(&session.candidate_meal_ids).await;
        let found = details.iter().filter(|detail| detail.is_some()).count();

        // One recipe at a time, each already fans out its own translations
        let replies: Vec<Reply> = stream::iter(details.into_iter().zip(&session.translated_names))
            .then(|(detail, name)| async move {
                match detail {
                    Some(detail) => {
                        let detail = self.translate_detail(detail).await;
                        Reply::text(format_meal_detail(&detail, self.language()))
                    }
                    None => Reply::text(t_args_lang("recipe-missing", &[("name", name.as_str())], self.language())),
                }
            })
            .collect()
            .await;

        self.store.reset(id).await?;
        info!(
            conversation_id = %id,
            requested = session.candidate_meal_ids.len(),
            found,
            "All candidate recipes delivered"
        );
        Ok(replies)
    }

    /// Translate the user-facing texts of a recipe, each falling back on its own
    async fn translate_detail(&self, detail: MealDetail) -> MealDetail {
        let mut texts = vec![detail.name.clone(), detail.category.clone()];
        texts.extend(detail.area.clone());
        texts.push(detail.instructions.clone());
        for ingredient in &detail.ingredients {
            texts.push(ingredient.name.clone());
            texts.push(ingredient.measure.clone());
        }

        let mut translated = translate_all(
            self.translator.as_ref(),
            &texts,
            &self.settings.language,
            self.settings.call_timeout,
        )
        .await
        .into_iter();
        let mut take = |original: String| translated.next().unwrap_or(original);

        // Same order as `texts` above
        let name = take(detail.name);
        let category = take(detail.category);
        let area = detail.area.map(&mut take);
        let instructions = take(detail.instructions);
        let ingredients = detail
            .ingredients
            .into_iter()
            .map(|ingredient| {
                let name = take(ingredient.name);
                let measure = take(ingredient.measure);
                Ingredient { name, measure }
            })
            .collect();

        MealDetail {
            id: detail.id,
            name,
            category,
            instructions,
            ingredients,
            area,
            thumbnail: detail.thumbnail,
            youtube: detail.youtube,
            source: detail.source,
        }
    }
}
