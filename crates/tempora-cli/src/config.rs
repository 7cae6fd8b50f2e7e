//! Application configuration, loaded from a RON file.
//!
//! Every field has a default, so a file only needs the settings it changes:
//!
//! ```ron
//! (
//!     convergence: (max_half_cycles: 200),
//!     stm: (retry: (max_attempts: 16)),
//! )
//! ```

use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use tempora_stm::StmConfig;
use tempora_timeline::ConvergenceConfig;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporaConfig {
    pub convergence: ConvergenceConfig,
    pub stm: StmConfig,
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("RON serialize error: {0}")]
    Serialize(#[from] ron::Error),
}

impl TemporaConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&text)
    }

    /// Load `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(TemporaConfig::from_ron("()").unwrap(), TemporaConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = TemporaConfig::from_ron(
            "(convergence: (max_half_cycles: 12), stm: (retry: (max_attempts: 3)))",
        )
        .unwrap();
        assert_eq!(config.convergence.max_half_cycles, 12);
        assert!(config.convergence.unify_on_convergence);
        assert_eq!(config.stm.retry.max_attempts, 3);
        assert_eq!(config.stm.retry.max_delay_ms, 50);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(convergence: (fold_cycles: true, unify_on_convergence: false))").unwrap();

        let config = TemporaConfig::load(file.path()).unwrap();
        assert!(config.convergence.fold_cycles);
        assert!(!config.convergence.unify_on_convergence);
    }

    #[test]
    fn test_pretty_output_parses_back() {
        let mut config = TemporaConfig::default();
        config.stm.fallback_abort_threshold = None;
        let text = config.to_ron().unwrap();
        assert_eq!(TemporaConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TemporaConfig::load(&dir.path().join("absent.ron")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let err = TemporaConfig::from_ron("(convergence: (max_half_cycles: \"lots\"))").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
