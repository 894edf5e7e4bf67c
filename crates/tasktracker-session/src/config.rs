//! Session configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Label of the placeholder project shown before memberships are provisioned
pub const DEFAULT_PROJECT_NAME: &str = "My Project";

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File that was read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Content is not valid TOML for this schema
    #[error("invalid session config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are unusable
    #[error("invalid session config: {0}")]
    Invalid(String),
}

/// Session layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Label of the placeholder project
    pub default_project_name: String,
    /// Show the navigation label as view title
    pub show_project_title: bool,
}

impl SessionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With placeholder project label
    #[inline]
    #[must_use]
    pub fn with_default_project_name(mut self, name: impl Into<String>) -> Self {
        self.default_project_name = name.into();
        self
    }

    /// With title display toggled
    #[inline]
    #[must_use]
    pub fn with_project_title(mut self, show: bool) -> Self {
        self.show_project_title = show;
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` for malformed TOML
    /// - `ConfigError::Invalid` for a blank project label
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - anything `from_toml_str` reports
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_project_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_project_name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_project_name: DEFAULT_PROJECT_NAME.to_string(),
            show_project_title: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_use_my_project() {
        let config = SessionConfig::new();
        assert_eq!(config.default_project_name, "My Project");
        assert!(config.show_project_title);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SessionConfig::from_toml_str("show_project_title = false").unwrap();
        assert_eq!(config.default_project_name, DEFAULT_PROJECT_NAME);
        assert!(!config.show_project_title);
    }

    #[test]
    fn blank_label_is_rejected() {
        let err = SessionConfig::from_toml_str("default_project_name = \"  \"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_project_name = \"Inbox\"").unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_project_name, "Inbox");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SessionConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
