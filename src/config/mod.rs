use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::StitchError;
use crate::logging::LoggingConfig;

/// How overlapping tiles are combined into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    LinearBlending,
    Average,
    Median,
    Max,
    Min,
    /// Every input image becomes its own block of output channels.
    Overlay,
    /// Compute tile positions only.
    None,
}

impl FusionMethod {
    pub fn name(self) -> &'static str {
        match self {
            FusionMethod::LinearBlending => "linear_blending",
            FusionMethod::Average => "average",
            FusionMethod::Median => "median",
            FusionMethod::Max => "max",
            FusionMethod::Min => "min",
            FusionMethod::Overlay => "overlay",
            FusionMethod::None => "none",
        }
    }
}

/// Which timepoints of a time-lapse are registered against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TimeSelect {
    /// Register the first timepoint and reuse its positions for all others.
    ApplyFirstToAll,
    Adjacent,
    AllToAll,
}

/// Parameters of a stitching run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchingParameters {
    pub dimensionality: usize,
    /// 1-based channel used for registration of the first image, 0 = average of all.
    pub channel1: usize,
    pub channel2: usize,
    /// Number of phase-correlation peaks to verify by cross-correlation.
    pub check_peaks: usize,
    pub subpixel_accuracy: bool,
    /// When false the manual offsets (or the layout positions) are taken as is.
    pub compute_overlap: bool,
    pub fusion_method: FusionMethod,
    pub fused_name: String,
    pub reg_threshold: f32,
    pub relative_threshold: f64,
    pub absolute_threshold: f64,
    pub x_offset: f32,
    pub y_offset: f32,
    pub z_offset: f32,
    pub time_select: TimeSelect,
    /// Register independent pairs on the rayon pool.
    pub parallel_pairs: bool,
    /// Index of the tile that anchors the global optimization.
    pub fixed_tile: usize,
}

impl Default for StitchingParameters {
    fn default() -> Self {
        Self {
            dimensionality: 2,
            channel1: 0,
            channel2: 0,
            check_peaks: 5,
            subpixel_accuracy: false,
            compute_overlap: true,
            fusion_method: FusionMethod::LinearBlending,
            fused_name: "Fused".to_string(),
            reg_threshold: 0.3,
            relative_threshold: 2.5,
            absolute_threshold: 3.5,
            x_offset: 0.0,
            y_offset: 0.0,
            z_offset: 0.0,
            time_select: TimeSelect::ApplyFirstToAll,
            parallel_pairs: true,
            fixed_tile: 0,
        }
    }
}

impl StitchingParameters {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(2..=3).contains(&self.dimensionality) {
            errors.push(format!("dimensionality must be 2 or 3, got {}", self.dimensionality));
        }

        if self.check_peaks == 0 {
            errors.push("check_peaks must be at least 1".to_string());
        }

        if !(-1.0..=1.0).contains(&self.reg_threshold) {
            errors.push(format!("reg_threshold must lie in [-1, 1], got {}", self.reg_threshold));
        }

        if !(self.relative_threshold > 0.0) {
            errors.push("relative_threshold must be positive".to_string());
        }

        if !(self.absolute_threshold > 0.0) {
            errors.push("absolute_threshold must be positive".to_string());
        }

        if ![self.x_offset, self.y_offset, self.z_offset].iter().all(|v| v.is_finite()) {
            errors.push("manual offsets must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `validate` as a typed error.
    pub fn check(&self) -> crate::Result<()> {
        self.validate()
            .map_err(|errors| StitchError::Configuration(errors.join("; ")).into())
    }

    /// The manual shift of the second image, `dimensionality` components.
    pub fn manual_offset(&self) -> Vec<f32> {
        let offset = [self.x_offset, self.y_offset, self.z_offset];
        offset
            .iter()
            .take(self.dimensionality)
            .map(|&v| if self.subpixel_accuracy { v } else { v.round() })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub stitching: StitchingParameters,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> crate::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.stitching.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConfigFormat {
    Json,
    Toml,
}

pub fn load_config_or_default(config_path: Option<&str>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    tracing::warn!("Configuration validation errors in '{}':", path);
                    for error in errors {
                        tracing::warn!("  - {}", error);
                    }
                    tracing::warn!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                tracing::warn!("Failed to load config from '{}': {}", path, e);
                tracing::warn!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let params = StitchingParameters::default();
        assert_eq!(params.check_peaks, 5);
        assert_eq!(params.reg_threshold, 0.3);
        assert_eq!(params.relative_threshold, 2.5);
        assert_eq!(params.absolute_threshold, 3.5);
        assert_eq!(params.fusion_method, FusionMethod::LinearBlending);
        assert_eq!(params.time_select, TimeSelect::ApplyFirstToAll);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let params = StitchingParameters {
            dimensionality: 4,
            check_peaks: 0,
            absolute_threshold: -1.0,
            ..StitchingParameters::default()
        };
        let errors = params.validate().unwrap_err();
        assert_eq!(errors.len(), 3);

        let err = params.check().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StitchError>(),
            Some(StitchError::Configuration(_))
        ));
    }

    #[test]
    fn test_manual_offset_rounding() {
        let mut params = StitchingParameters {
            x_offset: 10.6,
            y_offset: -3.2,
            z_offset: 7.0,
            ..StitchingParameters::default()
        };
        assert_eq!(params.manual_offset(), vec![11.0, -3.0]);

        params.subpixel_accuracy = true;
        params.dimensionality = 3;
        assert_eq!(params.manual_offset(), vec![10.6, -3.2, 7.0]);
    }

    #[test]
    fn test_toml_and_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.stitching.fusion_method = FusionMethod::Median;
        config.stitching.time_select = TimeSelect::AllToAll;

        let toml_path = dir.path().join("stitching.toml");
        config.save_to_file(&toml_path, ConfigFormat::Toml).unwrap();
        assert_eq!(Config::load_from_file(&toml_path).unwrap(), config);

        let json_path = dir.path().join("stitching.json");
        config.save_to_file(&json_path, ConfigFormat::Json).unwrap();
        assert_eq!(Config::load_from_file(&json_path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[stitching]\nfusion_method = \"max\"\ncheck_peaks = 8\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.stitching.fusion_method, FusionMethod::Max);
        assert_eq!(config.stitching.check_peaks, 8);
        assert_eq!(config.stitching.reg_threshold, 0.3);
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[stitching]\ncheck_peaks = 0\n").unwrap();

        let config = load_config_or_default(path.to_str());
        assert_eq!(config, Config::default());
    }
}
