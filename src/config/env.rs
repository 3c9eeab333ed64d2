//! `${VAR}` substitution for configuration values
//!
//! Placeholders are matched left to right, non-overlapping. Replacement text
//! is never rescanned, so a value that itself contains `${...}` is inserted
//! verbatim.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{HegemonError, HegemonResult};

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
});

/// Substitute `${NAME}` placeholders from the process environment
///
/// When `required` is true an unset variable is a configuration error naming
/// the variable; otherwise it is replaced by the empty string.
pub fn substitute_env_vars(value: &str, required: bool) -> HegemonResult<String> {
    substitute_with(value, required, |name| std::env::var(name).ok())
}

/// Substitute placeholders using an arbitrary lookup function
pub fn substitute_with<F>(value: &str, required: bool, lookup: F) -> HegemonResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;

    let result = ENV_VAR_PATTERN.replace_all(value, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(name) {
            Some(v) => v,
            None => {
                if required && missing.is_none() {
                    missing = Some(name.to_string());
                }
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(HegemonError::config(format!(
            "Environment variable not set: {}",
            name
        ))),
        None => Ok(result.into_owned()),
    }
}
