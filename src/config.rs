//! Deploy-time configuration for the web service.
//!
//! Values come from the environment (a `.env` file is loaded by the binary
//! beforehand); command-line flags override them.

use std::path::PathBuf;

use crate::pipeline::DEFAULT_MODEL_PATHS;

pub const DEFAULT_PORT: u16 = 8050;
pub const DEFAULT_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Tried before the default candidate paths.
    pub model_path: Option<PathBuf>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug: true,
            model_path: None,
        }
    }
}

impl ServeConfig {
    /// Reads `HOST`, `PORT`, `DEBUG` and `MODEL_PATH` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unparsable values fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            host: lookup("HOST")
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            debug: lookup("DEBUG")
                .map(|d| d.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.debug),
            model_path: lookup("MODEL_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Model locations in the order they should be tried.
    pub fn model_candidates(&self) -> Vec<PathBuf> {
        self.model_path
            .iter()
            .cloned()
            .chain(DEFAULT_MODEL_PATHS.iter().map(PathBuf::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServeConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServeConfig::default());
        assert_eq!(config.port, 8050);
        assert!(config.debug);
    }

    #[test]
    fn test_env_overrides() {
        let config = ServeConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("DEBUG", "False"),
            ("HOST", "127.0.0.1"),
            ("MODEL_PATH", "/srv/model.bin"),
        ]));
        assert_eq!(config.port, 9000);
        assert!(!config.debug);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.model_path, Some(PathBuf::from("/srv/model.bin")));
    }

    #[test]
    fn test_debug_is_case_insensitive() {
        assert!(ServeConfig::from_lookup(lookup(&[("DEBUG", "TRUE")])).debug);
        assert!(!ServeConfig::from_lookup(lookup(&[("DEBUG", "1")])).debug);
    }

    #[test]
    fn test_bad_port_falls_back() {
        let config = ServeConfig::from_lookup(lookup(&[("PORT", "eighty")]));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_model_candidates_order() {
        let config = ServeConfig {
            model_path: Some(PathBuf::from("custom.model")),
            ..Default::default()
        };
        let candidates = config.model_candidates();
        assert_eq!(candidates[0], PathBuf::from("custom.model"));
        assert_eq!(candidates[1], PathBuf::from("./car_price.model"));
        assert_eq!(candidates.len(), 4);
    }
}
