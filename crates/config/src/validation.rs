//! Validation helpers for configuration values
//!
//! Each config section implements [`ConfigSection`]; the shared checks live
//! on [`Validator`].

pub use crate::error::ValidationError;

/// A named section of `config.toml` that can validate and merge itself
pub trait ConfigSection: Default {
    /// Validates the section; every problem found is returned
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Merges another section into this one; values from `other` win
    fn merge(&mut self, other: Self);

    /// Section name as it appears in the file
    fn section_name(&self) -> &'static str;
}

/// Common validators for config values
pub struct Validator;

impl Validator {
    /// Validates that a numeric value is within an inclusive range
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that a string is not blank
    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Validates that a value is one of the allowed options
    pub fn one_of<T>(value: &T, allowed: &[T], field: &str) -> Result<(), ValidationError>
    where
        T: PartialEq + std::fmt::Display,
    {
        if !allowed.contains(value) {
            let allowed_str = allowed
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(ValidationError::with_value(
                field,
                format!("must be one of: {}", allowed_str),
                value,
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that a string looks like an absolute http(s) URL
    pub fn http_url(value: &str, field: &str) -> Result<(), ValidationError> {
        let rest = value
            .strip_prefix("https://")
            .or_else(|| value.strip_prefix("http://"));

        match rest {
            Some(host) if !host.trim().is_empty() && !host.contains(char::is_whitespace) => Ok(()),
            _ => Err(ValidationError::with_value(
                field,
                "must be an http:// or https:// URL",
                value,
            )),
        }
    }

    /// Collects multiple validation results into a single result
    pub fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
