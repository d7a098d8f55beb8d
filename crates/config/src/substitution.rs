use anyhow::Result;
use regex::{Captures, Regex};
use std::env;
use tracing::{debug, warn};

/// `${VAR}`, `${VAR:-fallback}` or `$VAR`
const PLACEHOLDER_PATTERN: &str = r"\$\{(\w+)(?::-([^}]*))?\}|\$(\w+)";

/// Substitute environment variables in the format `${VAR_NAME}`,
/// `${VAR_NAME:-default}` or `$VAR_NAME`.
///
/// Unset variables without a fallback keep their placeholder so the
/// validator can report them.
pub fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(PLACEHOLDER_PATTERN)?;
    let mut missing_vars = Vec::new();

    let result = re.replace_all(content, |caps: &Captures| {
        let placeholder = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let var_name = match caps.get(1).or_else(|| caps.get(3)) {
            Some(name) => name.as_str(),
            None => return placeholder.to_string(),
        };

        match env::var(var_name) {
            Ok(value) => {
                debug!("Substituting environment variable: {}", var_name);
                value
            }
            Err(_) => match caps.get(2) {
                Some(fallback) => {
                    debug!(
                        "Environment variable '{}' not set, using fallback \"{}\"",
                        var_name,
                        fallback.as_str()
                    );
                    fallback.as_str().to_string()
                }
                None => {
                    warn!("Environment variable '{}' not set", var_name);
                    missing_vars.push(var_name.to_string());
                    placeholder.to_string()
                }
            },
        }
    });

    if !missing_vars.is_empty() {
        debug!(
            "Environment variables not set (may fail validation): {:?}",
            missing_vars
        );
    }

    Ok(result.into_owned())
}

/// Get environment variable with a default value
pub fn get_env_or_default(var_name: &str, default: &str) -> String {
    match env::var(var_name) {
        Ok(value) => value,
        Err(_) => {
            warn!(
                "Environment variable '{}' not set, using default: \"{}\"",
                var_name, default
            );
            default.to_string()
        }
    }
}

/// Check if a string contains unresolved environment variable placeholders
pub fn has_unresolved_env_vars(content: &str) -> bool {
    Regex::new(PLACEHOLDER_PATTERN)
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_set_variable() {
        env::set_var("PEERMATCH_SUBST_HOST", "db.internal");
        let out = substitute_env_vars("host: ${PEERMATCH_SUBST_HOST}").unwrap();
        assert_eq!(out, "host: db.internal");
    }

    #[test]
    fn test_substitute_fallback() {
        let out = substitute_env_vars("port: ${PEERMATCH_SUBST_UNSET_PORT:-6379}").unwrap();
        assert_eq!(out, "port: 6379");
    }

    #[test]
    fn test_missing_variable_keeps_placeholder() {
        let out = substitute_env_vars("password: ${PEERMATCH_SUBST_UNSET_PW}").unwrap();
        assert_eq!(out, "password: ${PEERMATCH_SUBST_UNSET_PW}");
        assert!(has_unresolved_env_vars(&out));
    }

    #[test]
    fn test_get_env_or_default() {
        assert_eq!(get_env_or_default("PEERMATCH_SUBST_NEVER_SET", "x"), "x");
    }
}
