//! Engine configuration.
//!
//! One `EngineConfig` is built at startup (from JSON or defaults) and passed
//! by reference into each engine component. Nothing here is global.

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Top-level configuration handed to every engine component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub annotation: AnnotationConfig,
    pub liftover: LiftoverConfig,
    pub import: ImportConfig,
    pub toolkit: ToolkitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnotationConfig {
    /// Root under which feature partitions are written, one directory per
    /// (taxon, assembly, release).
    pub data_dir: PathBuf,
    /// Prefix of the synthetic intergenic gene id.
    pub intergenic_prefix: String,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("annotation"),
            intergenic_prefix: "INTERGENIC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftoverConfig {
    /// Largest tolerated unmapped fraction for a standalone liftover.
    pub unmapped_threshold: f64,
}

impl Default for LiftoverConfig {
    fn default() -> Self {
        Self {
            unmapped_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Tolerated fraction of dropped records for a direct import.
    pub record_error_budget: f64,
    /// Tolerated fraction of dropped records once the caller confirmed liftover.
    pub liftover_record_error_budget: f64,
    /// Unmapped-fraction threshold applied by liftover during import.
    pub liftover_unmapped_threshold: f64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            record_error_budget: 0.05,
            liftover_record_error_budget: 0.3,
            liftover_unmapped_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolkitConfig {
    /// Directory for staged interval files; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    /// Skip sorting staged inputs and verify their order instead.
    pub assume_sorted: bool,
}

impl EngineConfig {
    /// Load a JSON configuration file. Missing sections take their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fractions = [
            ("liftover.unmapped_threshold", self.liftover.unmapped_threshold),
            ("import.record_error_budget", self.import.record_error_budget),
            (
                "import.liftover_record_error_budget",
                self.import.liftover_record_error_budget,
            ),
            (
                "import.liftover_unmapped_threshold",
                self.import.liftover_unmapped_threshold,
            ),
        ];
        for (field, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.liftover.unmapped_threshold, 0.3);
        assert_eq!(config.import.record_error_budget, 0.05);
        assert_eq!(config.import.liftover_record_error_budget, 0.3);
        assert_eq!(config.import.liftover_unmapped_threshold, 0.05);
        assert!(!config.toolkit.assume_sorted);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(
            r#"{"annotation": {"intergenic_prefix": "IG_"}, "toolkit": {"assume_sorted": true}}"#,
        )
        .unwrap();
        assert_eq!(config.annotation.intergenic_prefix, "IG_");
        assert_eq!(config.annotation.data_dir, PathBuf::from("annotation"));
        assert!(config.toolkit.assume_sorted);
        assert_eq!(config.liftover.unmapped_threshold, 0.3);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"liftover": {"unmapped_threshold": 1.5}}"#),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"import": {"budget": 0.1}}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_from_path() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"import": {{"record_error_budget": 0.1}}}}"#).unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.import.record_error_budget, 0.1);
    }
}
