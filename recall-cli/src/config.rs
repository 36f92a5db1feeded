//! CLI configuration: a small TOML file layered under flags and env.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// `recall.toml` contents. Every field is optional; flags win over file
/// values, file values win over defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub mode: Option<String>,
    /// Env file passed through to the engine
    pub env_file: Option<PathBuf>,
    /// Default user for scope construction
    pub user: Option<String>,
    /// Default session for scope construction
    pub session: Option<String>,
}

impl CliConfig {
    /// Load from a path, or return defaults when the file is absent.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from("recall.toml"),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = CliConfig::load(Some(Path::new("/nonexistent/recall.toml"))).expect("load");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn parses_toml_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recall.toml");
        std::fs::write(&path, "data_dir = \"/tmp/recall\"\nmode = \"narrative\"\n")
            .expect("write");
        let config = CliConfig::load(Some(&path)).expect("load");
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/recall")));
        assert_eq!(config.mode.as_deref(), Some("narrative"));
    }
}
