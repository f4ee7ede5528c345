//! Error types for schema validation.

use std::collections::BTreeMap;

use thiserror::Error;

/// Validation failure: one or more messages per offending field.
#[derive(Debug, Error)]
#[error("Validation failed")]
pub struct ValidationError {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Stable wire key.
    pub fn key(&self) -> &'static str {
        "validation_failed"
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        400
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}
