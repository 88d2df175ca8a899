pub mod parse;
pub mod types;

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};

pub use parse::{load_config, load_or_default, ConfigError};
pub use types::{AwsConfig, Config, DiscoveryConfig};

/// Matches `$env{VAR_NAME}` placeholders.
const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

fn env_var_regex() -> Result<Regex, regex::Error> {
    Regex::new(ENV_VAR_PATTERN)
}

/// Expands `$env{VAR_NAME}` placeholders from the environment.
/// Placeholders naming unset variables are left unchanged.
pub fn expand_env_vars(text: &str) -> Result<String, regex::Error> {
    let re = env_var_regex()?;
    let expanded = re.replace_all(text, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}

/// Names of the `$env{..}` placeholders still present in `text`, sorted and
/// deduplicated.
pub fn unexpanded_vars(text: &str) -> Result<Vec<String>, regex::Error> {
    let re = env_var_regex()?;
    let mut names: Vec<String> = re.captures_iter(text).map(|caps| caps[1].to_string()).collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Expands tilde (~) in paths to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Per-user config location, `~/.config/edgeship/config.yml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/edgeship/config.yml"))
}

pub const SYSTEM_CONFIG_PATH: &str = "/etc/edgeship/config.yml";

/// Resolves the config file path based on explicit argument or default locations.
/// Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/edgeship/config.yml
/// 3. /etc/edgeship/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_single() {
        std::env::set_var("EDGESHIP_TEST_REGION", "eu-west-1");
        let result = expand_env_vars("region: $env{EDGESHIP_TEST_REGION}").unwrap();
        assert_eq!(result, "region: eu-west-1");
        std::env::remove_var("EDGESHIP_TEST_REGION");
    }

    #[test]
    fn test_expand_env_vars_unset_left_alone() {
        let result = expand_env_vars("group: $env{EDGESHIP_TEST_UNSET}").unwrap();
        assert_eq!(result, "group: $env{EDGESHIP_TEST_UNSET}");
    }

    #[test]
    fn test_expand_env_vars_ignores_shell_syntax() {
        let result = expand_env_vars("${HOME} and $HOME").unwrap();
        assert_eq!(result, "${HOME} and $HOME");
    }

    #[test]
    fn test_unexpanded_vars_sorted_and_deduplicated() {
        let names = unexpanded_vars("$env{B} $env{A} $env{B}").unwrap();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_expand_tilde_with_path() {
        let expanded = expand_tilde(Path::new("~/edgeship/config.yml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("edgeship/config.yml"));
        }
    }

    #[test]
    fn test_expand_tilde_no_expansion() {
        assert_eq!(expand_tilde(Path::new("/etc/edgeship")), Path::new("/etc/edgeship"));
        assert_eq!(expand_tilde(Path::new("relative/path")), Path::new("relative/path"));
    }

    #[test]
    fn test_resolve_explicit_path_wins() {
        let resolved = resolve_config_path(Some(Path::new("/tmp/custom.yml")));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/custom.yml")));
    }
}
