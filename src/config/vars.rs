//! Environment variable interpolation for config files.
//!
//! - `${VAR}` is replaced by the variable's value; an unset variable is an error
//! - `${VAR:-default}` falls back to `default` when VAR is unset or empty
//! - `$$` is a literal `$`
//!
//! A lone `$` that starts none of the above is left untouched, so secrets
//! containing `$` do not need escaping.

use regex::{Captures, Regex};
use snafu::prelude::*;
use std::env;
use std::sync::LazyLock;

use crate::error::{ConfigError, EnvInterpolationSnafu};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{
            (?P<name>[A-Za-z_][A-Za-z0-9_]*)
            (?: :- (?P<default>[^}]*) )?
        \}
        ",
    )
    .expect("placeholder pattern is valid")
});

/// Substitute every placeholder in `input`.
///
/// Problems are collected across the whole document and reported together.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut problems = Vec::new();

    let text = PLACEHOLDER.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.name("name") else {
            return "$".to_string();
        };
        let name = name.as_str();
        let default = caps.name("default").map(|m| m.as_str());

        match (env::var(name), default) {
            (Ok(value), _) if value.contains(['\n', '\r']) => {
                problems.push(format!("{name} contains a line break"));
                String::new()
            }
            (Ok(value), Some(default)) if value.is_empty() => default.to_string(),
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                problems.push(format!("{name} is not set"));
                String::new()
            }
        }
    });

    ensure!(
        problems.is_empty(),
        EnvInterpolationSnafu {
            message: problems.join("\n"),
        }
    );
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable names so parallel tests never race.
    fn set(name: &str, value: &str) {
        // SAFETY: names are unique to one test.
        unsafe { env::set_var(name, value) }
    }

    fn unset(name: &str) {
        // SAFETY: names are unique to one test.
        unsafe { env::remove_var(name) }
    }

    #[test]
    fn test_braced_substitution() {
        set("SONGLAKE_VARS_BUCKET", "sparkify");
        let text = interpolate("path: s3a://${SONGLAKE_VARS_BUCKET}/out").unwrap();
        assert_eq!(text, "path: s3a://sparkify/out");
    }

    #[test]
    fn test_default_when_unset_or_empty() {
        unset("SONGLAKE_VARS_UNSET");
        set("SONGLAKE_VARS_EMPTY", "");
        let text =
            interpolate("a: ${SONGLAKE_VARS_UNSET:-x}, b: ${SONGLAKE_VARS_EMPTY:-y}").unwrap();
        assert_eq!(text, "a: x, b: y");
    }

    #[test]
    fn test_set_value_wins_over_default() {
        set("SONGLAKE_VARS_LEVEL", "debug");
        let text = interpolate("${SONGLAKE_VARS_LEVEL:-info}").unwrap();
        assert_eq!(text, "debug");
    }

    #[test]
    fn test_all_missing_variables_reported() {
        unset("SONGLAKE_VARS_MISSING_A");
        unset("SONGLAKE_VARS_MISSING_B");
        let err = interpolate("${SONGLAKE_VARS_MISSING_A} ${SONGLAKE_VARS_MISSING_B}")
            .unwrap_err();
        let ConfigError::EnvInterpolation { message } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(message.contains("SONGLAKE_VARS_MISSING_A is not set"));
        assert!(message.contains("SONGLAKE_VARS_MISSING_B is not set"));
    }

    #[test]
    fn test_line_breaks_rejected() {
        set("SONGLAKE_VARS_MULTILINE", "a\nb");
        let err = interpolate("key: ${SONGLAKE_VARS_MULTILINE}").unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
    }

    #[test]
    fn test_escapes_and_bare_dollars() {
        assert_eq!(interpolate("cost: $$5").unwrap(), "cost: $5");
        assert_eq!(interpolate("secret: ab$cd").unwrap(), "secret: ab$cd");
    }
}
