use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::models::Selections;
use crate::prompts::{default_selections, Category};

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("{0}")]
    Disabled(String),
}

/// Owns a stage's category selections and the prompt derived from them.
///
/// Selections are the source of truth: the prompt is a derived cache that the
/// stage recomputes on every selection change, overwriting any manual edit.
#[derive(Debug, Clone)]
pub struct PromptAssistant {
    categories: &'static [Category],
    selections: Selections,
    prompt: String,
    /// Category key -> reason its selector is inert.
    disabled: BTreeMap<String, String>,
}

impl PromptAssistant {
    pub fn new(categories: &'static [Category]) -> Self {
        Self {
            categories,
            selections: default_selections(categories),
            prompt: String::new(),
            disabled: BTreeMap::new(),
        }
    }

    /// Merges an upstream-supplied selection set over the stage defaults:
    /// upstream keys win, anything the upstream does not know about keeps
    /// the default.
    pub fn reseed(&mut self, initial: &Selections) {
        let mut merged = default_selections(self.categories);
        for (key, value) in initial {
            merged.insert(key.clone(), value.clone());
        }
        self.selections = merged;
    }

    pub fn select(&mut self, key: &str, value: &str) -> Result<(), SelectionError> {
        if let Some(reason) = self.disabled.get(key) {
            return Err(SelectionError::Disabled(reason.clone()));
        }
        if !self.categories.iter().any(|cat| cat.key == key) {
            return Err(SelectionError::UnknownCategory(key.to_string()));
        }
        self.selections.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Recomputes the derived prompt from the full selection set.
    pub fn compose_with<F: FnOnce(&Selections) -> String>(&mut self, template: F) {
        self.prompt = template(&self.selections);
    }

    /// Manual override slot; persists only until the next recompute.
    pub fn override_prompt(&mut self, text: String) {
        self.prompt = text;
    }

    pub fn set_disabled(&mut self, keys: &[&str], reason: &str) {
        for key in keys {
            self.disabled.insert((*key).to_string(), reason.to_string());
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    /// Display value for an allow-custom category's free-text field: empty
    /// while the stored value is one of the enumerated options, so the two
    /// input modes never fight over display.
    pub fn custom_text(&self, key: &str) -> &str {
        let Some(cat) = self.categories.iter().find(|cat| cat.key == key && cat.allow_custom) else {
            return "";
        };
        match self.selections.get(key) {
            Some(value) if !cat.options.contains(&value.as_str()) => value,
            _ => "",
        }
    }
}

impl Serialize for PromptAssistant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PromptAssistant", 4)?;
        state.serialize_field("selections", &self.selections)?;
        state.serialize_field("prompt", &self.prompt)?;
        state.serialize_field("disabled", &self.disabled)?;
        let custom_text: BTreeMap<&str, &str> = self
            .categories
            .iter()
            .filter(|cat| cat.allow_custom)
            .map(|cat| (cat.key, self.custom_text(cat.key)))
            .collect();
        state.serialize_field("customText", &custom_text)?;
        state.end()
    }
}
