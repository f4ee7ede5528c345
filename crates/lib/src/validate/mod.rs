//! Declarative async schema validation.
//!
//! A [`Schema`] whitelists fields, sanitizes values, runs per-field
//! rules (including async custom validators for format and uniqueness
//! checks), then applies renames and static field injection. Fields
//! outside the whitelist are dropped silently.

pub mod errors;

pub use errors::ValidationError;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::ModelConfig;

/// Per-field value transform applied before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitizer {
    Trim,
    ToLowerCase,
}

impl Sanitizer {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "trim" => Some(Sanitizer::Trim),
            "toLowerCase" => Some(Sanitizer::ToLowerCase),
            _ => None,
        }
    }

    fn apply(&self, value: &str) -> String {
        match self {
            Sanitizer::Trim => value.trim().to_string(),
            Sanitizer::ToLowerCase => value.to_lowercase(),
        }
    }
}

/// One validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Rule {
    /// Field must be present and non-blank.
    Presence,
    /// Minimum string length.
    Length {
        minimum: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Value must equal another field's value.
    Matches { field: String },
    /// Named async validator supplied by the caller; returns a message
    /// on failure.
    Custom { name: String },
}

/// Resolver for [`Rule::Custom`] validators.
#[async_trait]
pub trait CustomValidators: Send + Sync {
    /// Run the named validator; `None` means pass.
    async fn validate(&self, name: &str, value: &str) -> Option<String>;
}

/// No custom validators registered.
pub struct NoCustomValidators;

#[async_trait]
impl CustomValidators for NoCustomValidators {
    async fn validate(&self, name: &str, _value: &str) -> Option<String> {
        Some(format!("unknown validator: {name}"))
    }
}

/// A declarative validation schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub whitelist: Vec<String>,
    pub sanitize: BTreeMap<String, Vec<Sanitizer>>,
    pub rules: BTreeMap<String, Vec<Rule>>,
    pub rename: BTreeMap<String, String>,
    pub static_fields: BTreeMap<String, Value>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn whitelist_field(&mut self, field: &str) {
        if !self.whitelist.iter().any(|f| f == field) {
            self.whitelist.push(field.to_string());
        }
    }

    pub fn rule(&mut self, field: &str, rule: Rule) {
        self.rules.entry(field.to_string()).or_default().push(rule);
    }

    pub fn sanitizer(&mut self, field: &str, sanitizer: Sanitizer) {
        self.sanitize
            .entry(field.to_string())
            .or_default()
            .push(sanitizer);
    }

    /// Merge application additions from configuration: whitelists are
    /// unioned, per-field lists extended, renames and statics overlaid.
    pub fn merge_config(&mut self, model: &ModelConfig) {
        for field in &model.whitelist {
            self.whitelist_field(field);
        }
        for (field, names) in &model.sanitize {
            for name in names {
                match Sanitizer::parse(name) {
                    Some(sanitizer) => self.sanitizer(field, sanitizer),
                    None => warn!(sanitizer = %name, "unknown sanitizer, skipping"),
                }
            }
        }
        for (field, rules) in &model.validate {
            for rule in rules {
                self.rule(field, rule.clone());
            }
        }
        for (from, to) in &model.rename {
            self.rename.insert(from.clone(), to.clone());
        }
        for (field, value) in &model.static_fields {
            self.static_fields.insert(field.clone(), value.clone());
        }
    }

    /// Validate and sanitize a document.
    ///
    /// Returns the processed document, or the per-field message map on
    /// failure.
    pub async fn process(
        &self,
        input: Map<String, Value>,
        customs: &dyn CustomValidators,
    ) -> Result<Map<String, Value>, ValidationError> {
        // Whitelist: unknown fields are dropped silently.
        let mut doc: Map<String, Value> = input
            .into_iter()
            .filter(|(k, _)| self.whitelist.iter().any(|f| f == k))
            .collect();

        for (field, sanitizers) in &self.sanitize {
            if let Some(Value::String(s)) = doc.get(field) {
                let mut value = s.clone();
                for sanitizer in sanitizers {
                    value = sanitizer.apply(&value);
                }
                doc.insert(field.clone(), Value::String(value));
            }
        }

        let mut failed = ValidationError::new();
        for (field, rules) in &self.rules {
            let value = doc.get(field).and_then(Value::as_str);
            for rule in rules {
                match rule {
                    Rule::Presence => {
                        if value.map(str::trim).unwrap_or("").is_empty() {
                            failed.add(field, "can't be blank");
                        }
                    }
                    Rule::Length { minimum, message } => {
                        let Some(value) = value else { continue };
                        if value.chars().count() < *minimum {
                            failed.add(
                                field,
                                message.clone().unwrap_or_else(|| {
                                    format!("is too short (minimum is {minimum} characters)")
                                }),
                            );
                        }
                    }
                    Rule::Matches { field: other } => {
                        let other_value = doc.get(other).and_then(Value::as_str);
                        if value != other_value {
                            failed.add(field, format!("does not match {other}"));
                        }
                    }
                    Rule::Custom { name } => {
                        let Some(value) = value else { continue };
                        if let Some(message) = customs.validate(name, value).await {
                            failed.add(field, message);
                        }
                    }
                }
            }
        }

        if !failed.is_empty() {
            return Err(failed);
        }

        for (from, to) in &self.rename {
            if let Some(value) = doc.remove(from) {
                doc.insert(to.clone(), value);
            }
        }

        for (field, value) in &self.static_fields {
            doc.insert(field.clone(), value.clone());
        }

        Ok(doc)
    }
}
