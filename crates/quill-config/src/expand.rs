//! `${VAR}` expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// Strings without `${` are returned as-is, so a literal `$` in a secret or
/// address never triggers a lookup.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, UnsetVar> {
        std::env::var(var)
            .map(Some)
            .map_err(|_| UnsetVar(var.to_owned()))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

struct UnsetVar(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_secret_from_env() {
        // SAFETY: each test uses a unique variable name
        unsafe {
            std::env::set_var("QUILL_TEST_SECRET", "hunter2");
        }
        let result = expand_env("${QUILL_TEST_SECRET}", "update.secret").unwrap();
        assert_eq!(result, "hunter2");
        unsafe {
            std::env::remove_var("QUILL_TEST_SECRET");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        // SAFETY: each test uses a unique variable name
        unsafe {
            std::env::remove_var("QUILL_TEST_UNSET_ADDR");
        }
        let result = expand_env("${QUILL_TEST_UNSET_ADDR:-:9292}", "server.addr").unwrap();
        assert_eq!(result, ":9292");
    }

    #[test]
    fn test_expand_empty_default() {
        // SAFETY: each test uses a unique variable name
        unsafe {
            std::env::remove_var("QUILL_TEST_EMPTY_DEFAULT");
        }
        let result = expand_env("${QUILL_TEST_EMPTY_DEFAULT:-}", "update.secret").unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn test_expand_missing_names_field_and_var() {
        // SAFETY: each test uses a unique variable name
        unsafe {
            std::env::remove_var("QUILL_TEST_MISSING");
        }
        let err = expand_env("${QUILL_TEST_MISSING}", "update.secret").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let message = err.to_string();
        assert!(message.contains("QUILL_TEST_MISSING"));
        assert!(message.contains("update.secret"));
    }

    #[test]
    fn test_literal_dollar_kept() {
        let result = expand_env("pa$$word", "update.secret").unwrap();
        assert_eq!(result, "pa$$word");
    }

    #[test]
    fn test_expand_inside_address() {
        // SAFETY: each test uses a unique variable name
        unsafe {
            std::env::set_var("QUILL_TEST_PORT", "8080");
        }
        let result = expand_env("0.0.0.0:${QUILL_TEST_PORT}", "server.addr").unwrap();
        assert_eq!(result, "0.0.0.0:8080");
        unsafe {
            std::env::remove_var("QUILL_TEST_PORT");
        }
    }
}
