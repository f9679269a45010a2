//! TOML configuration.
//!
//! ```toml
//! [resolve]
//! match_to_file = true
//! max_candidates = 8
//!
//! [render]
//! rankdir = "TB"
//! edge_color = "rotate"
//!
//! [batch]
//! rasterizer = "dot"
//! format = "svg"
//! jobs = 4
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every section and key is optional. Command-line flags override the file.

use crate::domain::resolver::ResolveOptions;
use crate::ports::dot_exporter::RenderOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "callflow.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallflowConfig {
    pub resolve: ResolveOptions,
    pub render: RenderOptions,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Layout program fed with DOT on stdin.
    pub rasterizer: String,
    /// Image format, also the file extension.
    pub format: String,
    pub out_dir: PathBuf,
    /// Render workers; half the cores when unset.
    pub jobs: Option<usize>,
    pub finalizer_names: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rasterizer: "dot".to_string(),
            format: "png".to_string(),
            out_dir: PathBuf::from("callflow-images"),
            jobs: None,
            finalizer_names: vec!["drop".to_string(), "__del__".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. `warn` or `callflow=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl CallflowConfig {
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &content)
    }

    /// Load `explicit` if given, else `callflow.toml` in the working
    /// directory if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load_from(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::dot_exporter::{EdgeColor, RankDir};

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = CallflowConfig::from_toml(Path::new("c.toml"), "").unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.batch.rasterizer, "dot");
        assert_eq!(config.render.rankdir, RankDir::LR);
        assert_eq!(config.resolve.initializer_names, vec!["new", "__init__"]);
        assert!(config.resolve.max_candidates.is_none());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let text = r#"
            [resolve]
            match_to_file = true
            max_candidates = 3

            [render]
            rankdir = "TB"
            edge_color = "black"

            [batch]
            format = "svg"
            jobs = 2
        "#;
        let config = CallflowConfig::from_toml(Path::new("c.toml"), text).unwrap();
        assert!(config.resolve.match_to_file);
        assert_eq!(config.resolve.max_candidates.map(|n| n.get()), Some(3));
        assert_eq!(config.resolve.initializer_names.len(), 2);
        assert_eq!(config.render.rankdir, RankDir::TB);
        assert_eq!(config.render.edge_color, EdgeColor::Fixed("black".to_string()));
        assert_eq!(config.render.graph_name, "Callflow Analysis");
        assert_eq!(config.batch.format, "svg");
        assert_eq!(config.batch.jobs, Some(2));
        assert_eq!(config.batch.finalizer_names, vec!["drop", "__del__"]);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = CallflowConfig::from_toml(Path::new("bad.toml"), "[resolve\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_zero_max_candidates_is_rejected() {
        let text = "[resolve]\nmax_candidates = 0\n";
        let err = CallflowConfig::from_toml(Path::new("c.toml"), text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callflow.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(CallflowConfig::load(Some(&path)).unwrap().logging.level, "debug");
        assert!(matches!(
            CallflowConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
