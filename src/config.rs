use serde::{Deserialize, Serialize};
use std::env;

pub const DB_PATH_ENV: &str = "REVIEWSTORE_DB_PATH";
pub const FOREIGN_KEYS_ENV: &str = "REVIEWSTORE_FOREIGN_KEYS";

/// Where the database lives and how the connection is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Filesystem path, or `:memory:` for a private in-memory database.
    pub path: String,
    /// Turns on `PRAGMA foreign_keys`; SQLite leaves it off by default.
    pub enforce_foreign_keys: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            path: "reviewstore.db".to_string(),
            enforce_foreign_keys: true,
        }
    }
}

impl DbConfig {
    pub fn in_memory() -> Self {
        DbConfig {
            path: ":memory:".to_string(),
            ..DbConfig::default()
        }
    }

    /// Defaults overridden by `REVIEWSTORE_DB_PATH` and `REVIEWSTORE_FOREIGN_KEYS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = DbConfig::default();
        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            config.path = path;
        }
        if let Some(flag) = lookup(FOREIGN_KEYS_ENV) {
            config.enforce_foreign_keys = !matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup_defaults() {
        let config = DbConfig::from_lookup(|_| None);
        assert_eq!(config, DbConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> =
            [(DB_PATH_ENV, "/tmp/shop.db"), (FOREIGN_KEYS_ENV, "off")].into();
        let config = DbConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.path, "/tmp/shop.db");
        assert!(!config.enforce_foreign_keys);
    }

    #[test]
    fn test_blank_path_keeps_default() {
        let blank = |key: &str| (key == DB_PATH_ENV).then(|| "  ".to_string());
        let config = DbConfig::from_lookup(blank);
        assert_eq!(config.path, "reviewstore.db");
    }
}
