//! Configuration form for the selected catalog template.

use std::collections::BTreeMap;

use regex::Regex;
use shared::domain::{FieldType, FormFieldSchema, SearchResult, TemplateId};
use tracing::warn;

use crate::error::{EngineError, EngineResult, FieldErrors};

const DEFAULT_PATTERN_MESSAGE: &str = "invalid format";

pub struct SourceForm {
    source: SearchResult,
    values: BTreeMap<String, String>,
    errors: FieldErrors,
}

impl SourceForm {
    pub fn new(source: SearchResult) -> Self {
        let values = source
            .form_schema
            .iter()
            .map(|field| (field.name.clone(), String::new()))
            .collect();
        Self {
            source,
            values,
            errors: FieldErrors::new(),
        }
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.source.id
    }

    pub fn source(&self) -> &SearchResult {
        &self.source
    }

    pub fn schema(&self) -> &[FormFieldSchema] {
        &self.source.form_schema
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Sets a field value and clears that field's error. Unknown names are ignored.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) -> bool {
        let Some(slot) = self.values.get_mut(name) else {
            warn!("form: ignored value for unknown field={name}");
            return false;
        };
        *slot = value.into();
        self.errors.remove(name);
        true
    }

    /// Validates every field and returns the submission parameters.
    ///
    /// On failure the field errors are kept on the form as well as returned.
    pub fn validate(&mut self) -> EngineResult<BTreeMap<String, String>> {
        let errors: FieldErrors = self
            .source
            .form_schema
            .iter()
            .filter_map(|field| {
                let value = self.values.get(&field.name).map(String::as_str).unwrap_or("");
                validate_field(field, value).map(|message| (field.name.clone(), message))
            })
            .collect();

        self.errors = errors.clone();
        if errors.is_empty() {
            Ok(self.values.clone())
        } else {
            Err(EngineError::Validation(errors))
        }
    }
}

pub fn validate_field(field: &FormFieldSchema, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return field
            .required
            .then(|| format!("{} is required", field.display_name));
    }

    match field.field_type {
        FieldType::String => {}
        FieldType::Number => {
            if trimmed.parse::<f64>().map_or(true, |n| !n.is_finite()) {
                return Some(format!("{} must be a number", field.display_name));
            }
        }
        FieldType::Boolean => {
            if !matches!(trimmed, "true" | "false") {
                return Some(format!("{} must be true or false", field.display_name));
            }
        }
    }

    let pattern = field.validation_pattern.as_deref()?;
    match Regex::new(pattern) {
        Ok(regex) if regex.is_match(value) => None,
        Ok(_) => Some(
            field
                .validation_message
                .clone()
                .unwrap_or_else(|| DEFAULT_PATTERN_MESSAGE.to_string()),
        ),
        Err(err) => {
            warn!("form: skipped invalid pattern field={} error={err}", field.name);
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
