//! Recipe discovery dialogue: conversation state and user input parsing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{MealId, MealSummary};

/// Discrete step of the recipe discovery flow
///
/// Variants are declared in flow order; a session only moves forward through
/// them and falls back to `Idle` when the flow ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    Idle,
    AwaitingCategory,
    AwaitingRecipeListConfirmation,
    AwaitingRecipeSelection,
}

/// Per-conversation state of the recipe discovery flow
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub stage: Stage,
    pub requested_count: Option<u32>,
    pub offered_categories: Vec<String>,
    pub candidate_meal_ids: Vec<MealId>,
    pub candidate_meals: Vec<MealSummary>,
    pub translated_names: Vec<String>,
}

impl Session {
    /// Fresh session waiting for a category choice
    pub fn awaiting_category(requested_count: u32, offered_categories: Vec<String>) -> Self {
        Self {
            stage: Stage::AwaitingCategory,
            requested_count: Some(requested_count),
            offered_categories,
            ..Default::default()
        }
    }

    /// Store sampled candidates with their display names and wait for confirmation
    pub fn with_candidates(self, candidate_meals: Vec<MealSummary>, translated_names: Vec<String>) -> Self {
        Self {
            stage: Stage::AwaitingRecipeListConfirmation,
            candidate_meal_ids: candidate_meals.iter().map(|meal| meal.id.clone()).collect(),
            candidate_meals,
            translated_names,
            ..self
        }
    }

    /// Meal id behind a 1-based selection index
    pub fn candidate_at(&self, index: usize) -> Option<&MealId> {
        index.checked_sub(1).and_then(|i| self.candidate_meal_ids.get(i))
    }

    /// Whether the session satisfies the data model invariants
    pub fn is_consistent(&self) -> bool {
        let parallel = self.candidate_meal_ids.len() == self.candidate_meals.len()
            && self.candidate_meals.len() == self.translated_names.len()
            && self
                .candidate_meal_ids
                .iter()
                .zip(&self.candidate_meals)
                .all(|(id, meal)| *id == meal.id);

        let counted = match self.requested_count {
            Some(count) => count > 0 && self.candidate_meal_ids.len() <= count as usize,
            None => self.stage == Stage::Idle && self.candidate_meal_ids.is_empty(),
        };

        parallel && counted
    }
}

/// Partial session update applied by `SessionStore::update`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub stage: Option<Stage>,
    pub requested_count: Option<u32>,
    pub offered_categories: Option<Vec<String>>,
    /// Candidate meals; ids are derived from them
    pub candidate_meals: Option<Vec<MealSummary>>,
    pub translated_names: Option<Vec<String>>,
}

impl SessionPatch {
    pub fn stage(stage: Stage) -> Self {
        Self {
            stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn apply(self, session: &mut Session) {
        if let Some(stage) = self.stage {
            session.stage = stage;
        }
        if let Some(count) = self.requested_count {
            session.requested_count = Some(count);
        }
        if let Some(categories) = self.offered_categories {
            session.offered_categories = categories;
        }
        if let Some(meals) = self.candidate_meals {
            session.candidate_meal_ids = meals.iter().map(|meal| meal.id.clone()).collect();
            session.candidate_meals = meals;
        }
        if let Some(names) = self.translated_names {
            session.translated_names = names;
        }
    }
}

/// Incoming user event, already separated into commands and free text
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    /// `/start`, with the user's display name when known
    Start { user_name: Option<String> },
    Help,
    About,
    /// `/category_search_random` with its raw argument
    StartSearch { count: Option<String> },
    Cancel,
    Text(String),
}

lazy_static! {
    // "/command", "/command@BotName", optional argument after whitespace
    static ref COMMAND_REGEX: Regex =
        Regex::new(r"^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$").unwrap();
    // Leading digits followed by a separator or end of input
    static ref SELECTION_REGEX: Regex = Regex::new(r"^(\d+)(?:[,.)\s]|$)").unwrap();
}

/// Classify a text message
///
/// Unknown slash commands are passed through as free text so the active
/// stage can reject them like any other unexpected reply.
pub fn parse_user_event(text: &str, user_name: Option<&str>) -> UserEvent {
    let trimmed = text.trim();

    if let Some(caps) = COMMAND_REGEX.captures(trimmed) {
        let argument = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|arg| !arg.is_empty());

        match caps[1].to_lowercase().as_str() {
            "start" => {
                return UserEvent::Start {
                    user_name: user_name.map(str::to_string),
                }
            }
            "help" => return UserEvent::Help,
            "about" => return UserEvent::About,
            "cancel" => return UserEvent::Cancel,
            "category_search_random" => return UserEvent::StartSearch { count: argument },
            _ => {}
        }
    }

    UserEvent::Text(trimmed.to_string())
}

/// Validate the recipe count argument of `/category_search_random`
pub fn parse_recipe_count(argument: Option<&str>) -> Result<u32, &'static str> {
    let raw = argument.map(str::trim).filter(|arg| !arg.is_empty()).ok_or("missing")?;

    match raw.parse::<i64>() {
        Ok(count) if count <= 0 => Err("not_positive"),
        Ok(count) => u32::try_from(count).map_err(|_| "too_large"),
        Err(_) => Err("not_a_number"),
    }
}

/// Parse a `"<n>, ..."` selection into its 1-based index
pub fn parse_selection_index(input: &str) -> Option<usize> {
    SELECTION_REGEX
        .captures(input.trim())
        .and_then(|caps| caps[1].parse::<usize>().ok())
}

/// Find the offered category the user typed, ignoring case and padding
pub fn match_category<'a>(input: &str, offered: &'a [String]) -> Option<&'a str> {
    let wanted = input.trim().to_lowercase();
    offered
        .iter()
        .find(|category| category.to_lowercase() == wanted)
        .map(String::as_str)
}

/// Render a numbered selection option, the inverse of `parse_selection_index`
pub fn selection_option(index: usize, name: &str) -> String {
    format!("{index}, {name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meal(id: &str, name: &str) -> MealSummary {
        MealSummary {
            id: MealId::from(id),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_user_event("/category_search_random 3", None),
            UserEvent::StartSearch {
                count: Some("3".to_string())
            }
        );
        assert_eq!(
            parse_user_event("/category_search_random@RecipeBot  12 ", None),
            UserEvent::StartSearch {
                count: Some("12".to_string())
            }
        );
        assert_eq!(
            parse_user_event("/category_search_random", None),
            UserEvent::StartSearch { count: None }
        );
        assert_eq!(parse_user_event("/help", None), UserEvent::Help);
        assert_eq!(parse_user_event("/cancel", None), UserEvent::Cancel);
        assert_eq!(
            parse_user_event("/start", Some("Ann")),
            UserEvent::Start {
                user_name: Some("Ann".to_string())
            }
        );
    }

    #[test]
    fn test_free_text_and_unknown_commands() {
        assert_eq!(parse_user_event("  Chicken ", None), UserEvent::Text("Chicken".to_string()));
        assert_eq!(parse_user_event("/unknown", None), UserEvent::Text("/unknown".to_string()));
        assert_eq!(parse_user_event("1, Pasta", None), UserEvent::Text("1, Pasta".to_string()));
    }

    #[test]
    fn test_recipe_count_validation() {
        assert_eq!(parse_recipe_count(Some("3")), Ok(3));
        assert_eq!(parse_recipe_count(Some(" 10 ")), Ok(10));

        assert_eq!(parse_recipe_count(None), Err("missing"));
        assert_eq!(parse_recipe_count(Some("  ")), Err("missing"));
        assert_eq!(parse_recipe_count(Some("three")), Err("not_a_number"));
        assert_eq!(parse_recipe_count(Some("2.5")), Err("not_a_number"));
        assert_eq!(parse_recipe_count(Some("0")), Err("not_positive"));
        assert_eq!(parse_recipe_count(Some("-4")), Err("not_positive"));
        assert_eq!(parse_recipe_count(Some("99999999999")), Err("too_large"));
    }

    #[test]
    fn test_selection_parsing() {
        assert_eq!(parse_selection_index("1, Teriyaki Chicken"), Some(1));
        assert_eq!(parse_selection_index("12, x"), Some(12));
        assert_eq!(parse_selection_index("3"), Some(3));
        assert_eq!(parse_selection_index(" 2. Soup"), Some(2));
        assert_eq!(parse_selection_index("4 soup"), Some(4));

        assert_eq!(parse_selection_index("Soup"), None);
        assert_eq!(parse_selection_index("1x, Soup"), None);
        assert_eq!(parse_selection_index(", 1"), None);
        assert_eq!(parse_selection_index(""), None);
        assert_eq!(parse_selection_index("99999999999999999999999, big"), None);
    }

    #[test]
    fn test_selection_option_round_trip() {
        let option = selection_option(2, "Курица терияки");
        assert_eq!(option, "2, Курица терияки");
        assert_eq!(parse_selection_index(&option), Some(2));
    }

    #[test]
    fn test_match_category() {
        let offered = vec!["Beef".to_string(), "Chicken".to_string()];
        assert_eq!(match_category("chicken", &offered), Some("Chicken"));
        assert_eq!(match_category("  BEEF ", &offered), Some("Beef"));
        assert_eq!(match_category("Pork", &offered), None);
    }

    #[test]
    fn test_session_candidates_stay_parallel() {
        let session = Session::awaiting_category(2, vec!["Chicken".to_string()])
            .with_candidates(vec![meal("1", "A"), meal("2", "B")], vec!["А".into(), "Б".into()]);

        assert_eq!(session.stage, Stage::AwaitingRecipeListConfirmation);
        assert_eq!(session.candidate_meal_ids, vec![MealId::from("1"), MealId::from("2")]);
        assert!(session.is_consistent());
        assert_eq!(session.candidate_at(1), Some(&MealId::from("1")));
        assert_eq!(session.candidate_at(0), None);
        assert_eq!(session.candidate_at(3), None);
    }

    #[test]
    fn test_inconsistent_sessions_detected() {
        let mut session = Session::awaiting_category(1, vec![])
            .with_candidates(vec![meal("1", "A")], vec!["A".into()]);
        session.translated_names.push("extra".into());
        assert!(!session.is_consistent());

        let session = Session {
            stage: Stage::AwaitingCategory,
            ..Default::default()
        };
        assert!(!session.is_consistent());
        assert!(Session::default().is_consistent());
    }

    #[test]
    fn test_patch_replaces_candidates() {
        let mut session = Session::awaiting_category(3, vec!["Beef".into()]);
        SessionPatch {
            candidate_meals: Some(vec![meal("7", "Stew")]),
            translated_names: Some(vec!["Рагу".into()]),
            stage: Some(Stage::AwaitingRecipeListConfirmation),
            ..Default::default()
        }
        .apply(&mut session);

        assert_eq!(session.candidate_meal_ids, vec![MealId::from("7")]);
        assert_eq!(session.stage, Stage::AwaitingRecipeListConfirmation);
        assert_eq!(session.requested_count, Some(3));
        assert!(session.is_consistent());
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::Idle < Stage::AwaitingCategory);
        assert!(Stage::AwaitingCategory < Stage::AwaitingRecipeListConfirmation);
        assert!(Stage::AwaitingRecipeListConfirmation < Stage::AwaitingRecipeSelection);
    }
}
