//! Logging configuration
//!
//! Per-component log levels and output destinations for a stitching run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for daily rolling JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in logs (impacts performance)
    pub include_file_location: bool,

    /// Phase correlation and pairwise registration
    pub registration_level: String,

    /// Global tile optimization
    pub optimization_level: String,

    /// Fusion into the output mosaic
    pub fusion_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            registration_level: "info".to_string(),
            optimization_level: "info".to_string(),
            fusion_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose logging, including every pair and every optimizer restart
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            registration_level: "trace".to_string(),
            optimization_level: "debug".to_string(),
            fusion_level: "debug".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, level) in [
            ("global_level", &self.global_level),
            ("registration_level", &self.registration_level),
            ("optimization_level", &self.optimization_level),
            ("fusion_level", &self.fusion_level),
        ] {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Get the effective log level for a specific component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "registration" | "algorithms" => &self.registration_level,
            "optimization" => &self.optimization_level,
            "fusion" => &self.fusion_level,
            _ => &self.global_level,
        }
    }

    /// Filter directives for the crate and its three stitching stages.
    pub fn filter_directives(&self) -> String {
        let krate = env!("CARGO_PKG_NAME").replace('-', "_");
        format!(
            "{krate}={},{krate}::algorithms={},{krate}::optimization={},{krate}::fusion={}",
            self.global_level, self.registration_level, self.optimization_level, self.fusion_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.global_level, "info");
        assert!(config.console_output);
        assert!(config.log_directory.is_none());
        assert!(!config.include_file_location);
    }

    #[test]
    fn test_development_config() {
        let config = LoggingConfig::development();
        assert_eq!(config.global_level, "debug");
        assert_eq!(config.registration_level, "trace");
        assert!(config.include_file_location);
        assert!(config.log_directory.is_some());
    }

    #[test]
    fn test_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.global_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.global_level = "debug".to_string();
        config.fusion_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_level_selection() {
        let config = LoggingConfig::development();
        assert_eq!(config.get_component_level("registration"), "trace");
        assert_eq!(config.get_component_level("optimization"), "debug");
        assert_eq!(config.get_component_level("unknown"), "debug");
    }

    #[test]
    fn test_filter_directives_name_every_stage() {
        let directives = LoggingConfig::default().filter_directives();
        assert!(directives.starts_with("tile_stitching=info"));
        assert!(directives.contains("tile_stitching::optimization=info"));
        assert!(directives.contains("tile_stitching::fusion=info"));
    }
}
