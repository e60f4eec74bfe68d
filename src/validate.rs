//! Field validation for decoded input.
//!
//! A [`Validator`] collects at most one message per field; the first failed
//! check for a field wins. Once the checks have run,
//! [`Validator::into_result`] turns any collected messages into a
//! [`ValidationError`].
//!
//! ```
//! use corekit::validate::Validator;
//!
//! let mut v = Validator::new();
//! v.not_blank("", "name");
//! v.is_email("not-an-email", "email");
//! assert!(!v.valid());
//! assert_eq!(v.errors["name"], "This field cannot be blank");
//! ```

use std::{collections::BTreeMap, error::Error as StdError, fmt, sync::OnceLock};

use regex::Regex;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$";

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// The pattern used by [`Validator::is_email`].
pub fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

/// Collects per-field error messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validator {
    pub errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while no check has failed.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records `message` for `field` unless the field already has one.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_insert_with(|| message.into());
    }

    /// Records `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn not_blank(&mut self, value: &str, field: &str) {
        self.check(
            !value.trim().is_empty(),
            field,
            "This field cannot be blank",
        );
    }

    /// Lengths are counted in characters.
    pub fn max_length(&mut self, value: &str, max: usize, field: &str) {
        if value.chars().count() > max {
            self.add_error(
                field,
                format!("This field cannot be more than {max} characters"),
            );
        }
    }

    pub fn min_length(&mut self, value: &str, min: usize, field: &str) {
        if value.chars().count() < min {
            self.add_error(field, format!("This field must be at least {min} characters"));
        }
    }

    pub fn matches(&mut self, value: &str, pattern: &Regex, field: &str, message: &str) {
        self.check(pattern.is_match(value), field, message);
    }

    /// Requires `value` to be one of `permitted`.
    pub fn in_list<S>(&mut self, value: &str, permitted: &[S], field: &str)
    where
        S: AsRef<str>,
    {
        self.check(
            permitted.iter().any(|item| item.as_ref() == value),
            field,
            "This field contains an invalid value",
        );
    }

    pub fn is_email(&mut self, value: &str, field: &str) {
        self.check(
            email_regex().is_match(value),
            field,
            "This field must be a valid email address",
        );
    }

    /// Returns the collected errors as a [`ValidationError`], if any.
    pub fn as_validation_error(&self) -> Option<ValidationError> {
        (!self.valid()).then(|| ValidationError {
            errors: self.errors.clone(),
        })
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.valid() {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// Failed validation, keyed by field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: BTreeMap<String, String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed: ")?;
        for (index, (field, message)) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

impl StdError for ValidationError {}

/// Finds a [`ValidationError`] in `err` or its source chain.
pub fn find_validation_error<'a>(
    err: &'a (dyn StdError + 'static),
) -> Option<&'a ValidationError> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(found) = err.downcast_ref::<ValidationError>() {
            return Some(found);
        }
        current = err.source();
    }
    None
}

pub fn is_validation_error(err: &(dyn StdError + 'static)) -> bool {
    find_validation_error(err).is_some()
}

/// The per-field messages carried by `err`, if it is a validation failure.
pub fn validation_errors<'a>(
    err: &'a (dyn StdError + 'static),
) -> Option<&'a BTreeMap<String, String>> {
    find_validation_error(err).map(|found| &found.errors)
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::{is_validation_error, validation_errors, ValidationError, Validator};

    #[derive(Debug, thiserror::Error)]
    #[error("create user: {0}")]
    struct Wrapped(#[source] ValidationError);

    #[test]
    fn first_error_per_field_wins() {
        let mut v = Validator::new();
        assert!(v.valid());
        v.add_error("name", "first");
        v.add_error("name", "second");
        v.check(false, "age", "too young");
        v.check(true, "email", "unused");

        assert!(!v.valid());
        assert_eq!(v.errors.len(), 2);
        assert_eq!(v.errors["name"], "first");
        assert_eq!(v.errors["age"], "too young");
    }

    #[test]
    fn string_checks() {
        let mut v = Validator::new();
        v.not_blank("  \t", "blank");
        v.not_blank("ok", "present");
        v.max_length("abcdef", 5, "long");
        v.max_length("ábcdé", 5, "unicode");
        v.min_length("ab", 3, "short");
        v.in_list("purple", &["red", "green"], "color");
        v.in_list("red", &["red", "green"], "other_color");

        assert_eq!(v.errors["blank"], "This field cannot be blank");
        assert_eq!(v.errors["long"], "This field cannot be more than 5 characters");
        assert_eq!(v.errors["short"], "This field must be at least 3 characters");
        assert_eq!(v.errors["color"], "This field contains an invalid value");
        assert!(!v.errors.contains_key("present"));
        assert!(!v.errors.contains_key("unicode"));
        assert!(!v.errors.contains_key("other_color"));
    }

    #[test]
    fn pattern_and_email_checks() {
        let digits = Regex::new(r"^\d+$").expect("valid pattern");
        let mut v = Validator::new();
        v.matches("12a", &digits, "zip", "digits only");
        v.matches("123", &digits, "code", "digits only");
        v.is_email("user@example.com", "email");
        v.is_email("user@localhost", "backup_email");
        v.is_email("@example.com", "other_email");

        assert_eq!(v.errors["zip"], "digits only");
        assert!(!v.errors.contains_key("code"));
        assert!(!v.errors.contains_key("email"));
        assert_eq!(
            v.errors["backup_email"],
            "This field must be a valid email address"
        );
        assert!(v.errors.contains_key("other_email"));
    }

    #[test]
    fn error_message_lists_fields() {
        let mut v = Validator::new();
        assert!(v.as_validation_error().is_none());
        v.add_error("name", "required");
        v.add_error("age", "too young");

        let err = v.into_result().expect_err("validation must fail");
        assert_eq!(
            err.to_string(),
            "validation failed: age: too young; name: required"
        );
    }

    #[test]
    fn validation_errors_are_found_through_wrapping() {
        let mut v = Validator::new();
        v.add_error("email", "bad");
        let wrapped = Wrapped(v.as_validation_error().expect("has errors"));

        assert!(is_validation_error(&wrapped));
        assert_eq!(
            validation_errors(&wrapped).map(|errors| errors["email"].as_str()),
            Some("bad")
        );

        let other = std::io::Error::other("boom");
        assert!(!is_validation_error(&other));
        assert!(validation_errors(&other).is_none());
    }
}
