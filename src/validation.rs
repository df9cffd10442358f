//! Request field validation.
//!
//! Handlers collect every field failure before answering so a client sees all
//! problems at once, rendered as a 422 `VALIDATION_FAILED` body keyed by field.

use std::collections::BTreeMap;

use crate::config::is_valid_email;
use crate::error::{ApiError, validation_failed};

#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field`; the first failure per field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("The {field} field is required."));
        }
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                field,
                format!("The {field} field must not be greater than {max} characters."),
            );
        }
    }

    pub fn optional_max_chars(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(value) = value {
            self.max_chars(field, value, max);
        }
    }

    /// Required and at most `max` characters.
    pub fn text(&mut self, field: &str, value: &str, max: usize) {
        self.required(field, value);
        self.max_chars(field, value, max);
    }

    pub fn email(&mut self, field: &str, value: &str) {
        self.required(field, value);
        self.max_chars(field, value, 255);
        if !value.trim().is_empty() && !is_valid_email(value.trim()) {
            self.add(field, format!("The {field} field must be a valid email address."));
        }
    }

    pub fn one_of(&mut self, field: &str, value: Option<&str>, allowed: &[&str]) {
        if let Some(value) = value
            && !allowed.contains(&value)
        {
            self.add(field, format!("The selected {field} is invalid."));
        }
    }

    pub fn range<T: PartialOrd + std::fmt::Display + Copy>(
        &mut self,
        field: &str,
        value: Option<T>,
        min: T,
        max: T,
    ) {
        if let Some(value) = value
            && (value < min || value > max)
        {
            self.add(
                field,
                format!("The {field} field must be between {min} and {max}."),
            );
        }
    }

    pub fn min<T: PartialOrd + std::fmt::Display + Copy>(
        &mut self,
        field: &str,
        value: Option<T>,
        min: T,
    ) {
        if let Some(value) = value
            && value < min
        {
            self.add(field, format!("The {field} field must be at least {min}."));
        }
    }

    /// `Err` with every collected failure, or `Ok` when there are none.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(validation_failed(serde_json::json!(self.errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn collects_all_fields() {
        let mut errors = FieldErrors::new();
        errors.text("name", "", 255);
        errors.email("email", "not-an-email");
        errors.range("priority", Some(11), 1, 10);
        errors.one_of("status", Some("archived"), &["draft", "active"]);
        errors.max_chars("keyword", &"k".repeat(256), 255);

        let err = errors.finish().unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let details = err.details.unwrap();
        assert_eq!(details["name"], "The name field is required.");
        assert_eq!(details["email"], "The email field must be a valid email address.");
        assert_eq!(details["priority"], "The priority field must be between 1 and 10.");
        assert_eq!(details["status"], "The selected status is invalid.");
        assert!(details["keyword"].as_str().unwrap().contains("255"));
    }

    #[test]
    fn clean_input_passes() {
        let mut errors = FieldErrors::new();
        errors.text("name", "Acme", 255);
        errors.range("priority", None::<i32>, 1, 10);
        errors.one_of("status", None, &["draft"]);
        assert!(errors.finish().is_ok());
    }
}
