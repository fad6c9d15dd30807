use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

/// Lifecycle labels accepted in the `State` column.
pub static STATE_OPTIONS: [&str; 4] = ["new customer", "served", "to contact", "paused"];

lazy_static! {
    static ref VERSION_REGEX: Regex = Regex::new(r"^\d+(\.\d+)*$").unwrap();
    static ref DATE_REGEX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").unwrap();
    static ref FIELD_RULES: HashMap<&'static str, FieldRule> = {
        let mut rules = HashMap::new();
        rules.insert("id", FieldRule::required(1, "ID is required"));
        rules.insert("name", FieldRule::required(1, "Name is required"));
        rules.insert("language", FieldRule::required(1, "Language is required"));
        rules.insert(
            "version",
            FieldRule::pattern(
                &VERSION_REGEX,
                "Version must be in semver format (e.g., 1.0.0)",
            ),
        );
        rules.insert(
            "State",
            FieldRule {
                required: false,
                min_length: None,
                allowed: Some(&STATE_OPTIONS[..]),
                pattern: None,
                message: "State must be: new customer, served, to contact, or paused",
            },
        );
        rules.insert(
            "Created Date",
            FieldRule::pattern(
                &DATE_REGEX,
                "Created Date must be in YYYY-MM-DD HH:MM:SS format (e.g., 2025-11-22 13:03:42)",
            ),
        );
        rules
    };
}

/// Static rule for one known column.
pub struct FieldRule {
    pub required: bool,
    pub min_length: Option<usize>,
    pub allowed: Option<&'static [&'static str]>,
    pub pattern: Option<&'static Regex>,
    pub message: &'static str,
}

impl FieldRule {
    fn required(min_length: usize, message: &'static str) -> Self {
        FieldRule {
            required: true,
            min_length: Some(min_length),
            allowed: None,
            pattern: None,
            message,
        }
    }

    fn pattern(pattern: &'static Regex, message: &'static str) -> Self {
        FieldRule {
            required: false,
            min_length: None,
            allowed: None,
            pattern: Some(pattern),
            message,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        ValidationResult {
            valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ValidationResult {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Checks a candidate cell value against the rule for `field`.
///
/// Unknown fields are always valid. Optional fields accept blank input.
pub fn validate_field(field: &str, value: &str) -> ValidationResult {
    let rule = match FIELD_RULES.get(field) {
        Some(rule) => rule,
        None => return ValidationResult::valid(),
    };

    let blank = value.trim().is_empty();
    if blank {
        return if rule.required {
            ValidationResult::invalid(rule.message)
        } else {
            ValidationResult::valid()
        };
    }

    if let Some(allowed) = rule.allowed {
        if !allowed.iter().any(|label| *label == value.trim()) {
            return ValidationResult::invalid(rule.message);
        }
    }

    if let Some(pattern) = rule.pattern {
        if !pattern.is_match(value) {
            return ValidationResult::invalid(rule.message);
        }
    }

    if let Some(min) = rule.min_length {
        if value.chars().count() < min {
            return ValidationResult::invalid(format!(
                "{} must be at least {} characters",
                field, min
            ));
        }
    }

    ValidationResult::valid()
}
