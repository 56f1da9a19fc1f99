//! Optional TOML config overlay, merged under CLI flags per the layering convention used
//! throughout the ambient stack: CLI flag > config file > built-in default.

use crate::error::ConfigError;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tic_millis: Option<u64>,
    pub verbose: Option<bool>,
}

#[cfg(feature = "config")]
#[derive(Debug, Default, serde::Deserialize)]
struct RawConfig {
    tic_millis: Option<u64>,
    verbose: Option<bool>,
}

impl Config {
    /// Loads the overlay from `path`, or returns the default (empty) overlay if no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    #[cfg(feature = "config")]
    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Config {
            tic_millis: raw.tic_millis,
            verbose: raw.verbose,
        })
    }

    #[cfg(not(feature = "config"))]
    fn parse(_text: &str, _path: &Path) -> Result<Self, ConfigError> {
        Ok(Config::default())
    }

    /// Merges a higher-priority overlay's explicit values over this one's.
    pub fn merged_with(self, higher: Config) -> Config {
        Config {
            tic_millis: higher.tic_millis.or(self.tic_millis),
            verbose: higher.verbose.or(self.verbose),
        }
    }
}

#[cfg(test)]
#[cfg(feature = "config")]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        let cfg = Config::parse("tic_millis = 35\nverbose = true\n", Path::new("test.toml")).unwrap();
        assert_eq!(cfg.tic_millis, Some(35));
        assert_eq!(cfg.verbose, Some(true));
    }

    #[test]
    fn cli_overlay_wins_on_merge() {
        let file = Config {
            tic_millis: Some(35),
            verbose: Some(false),
        };
        let cli = Config {
            tic_millis: None,
            verbose: Some(true),
        };
        let merged = file.merged_with(cli);
        assert_eq!(merged.tic_millis, Some(35));
        assert_eq!(merged.verbose, Some(true));
    }
}
