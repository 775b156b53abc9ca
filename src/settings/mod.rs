// Layered configuration
//
// Sources, later ones winning:
// 1. Built-in defaults (serde defaults on every section)
// 2. TOML file: `--config PATH`, else `<config dir>/config.toml`
// 3. Environment: `SEVE_` prefix, `__` between nested keys
//    e.g. SEVE_ENGINE__PROGRAM=/usr/bin/python3

use crate::WipePattern;
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_PREFIX: &str = "SEVE";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the Engine is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Interpreter or executable
    pub program: String,
    /// Script handling list/scan/locate/search, passed as first argument
    pub scanner_script: Option<PathBuf>,
    /// Script handling drive info and wipes
    pub wipe_script: Option<PathBuf>,
    /// Arguments placed before every scanner command
    pub scanner_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Bundled dependency directory, prepended to `library_path_var`
    pub library_path: Option<PathBuf>,
    pub library_path_var: String,
    /// `KEY=VALUE` entries added to the child environment
    pub extra_env: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            scanner_script: None,
            wipe_script: None,
            scanner_args: Vec::new(),
            working_dir: None,
            library_path: None,
            library_path_var: "PYTHONPATH".to_string(),
            extra_env: vec!["PYTHONIOENCODING=utf-8".to_string()],
        }
    }
}

impl EngineSettings {
    /// Parsed `extra_env`; entries without `=` are skipped.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.extra_env
            .iter()
            .filter_map(|entry| {
                let (key, value) = entry.split_once('=')?;
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Cosmetic easing of the displayed progress. Never feeds back into the
/// authoritative target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub ease_min_step: f64,
    pub ease_factor: f64,
    pub stall_count_min: u32,
    pub stall_count_max: u32,
    pub stall_ms_min: u64,
    pub stall_ms_max: u64,
    /// Stalls are placed between these fractions of the bar
    pub stall_window_start: f64,
    pub stall_window_end: f64,
    pub tick_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            ease_min_step: 0.02,
            ease_factor: 0.2,
            stall_count_min: 3,
            stall_count_max: 4,
            stall_ms_min: 250,
            stall_ms_max: 700,
            stall_window_start: 0.08,
            stall_window_end: 0.80,
            tick_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationSettings {
    pub relaunch_program: String,
}

impl Default for ElevationSettings {
    fn default() -> Self {
        Self {
            relaunch_program: "pkexec".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Daily rolling log files go here when set
    pub directory: Option<PathBuf>,
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateSettings {
    pub issuer: String,
    pub max_listed_files: usize,
    /// Mixed into the certificate signature; keep it private
    pub signing_key: String,
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            issuer: "SEVE Clear".to_string(),
            max_listed_files: 300,
            signing_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub engine: EngineSettings,
    pub free_space_pattern: WipePattern,
    /// Allow scans of disjoint drives to run side by side
    pub allow_concurrent_scans: bool,
    pub scan_parallelism: usize,
    /// Engine stdout/stderr of destructive and search runs are kept here
    pub diagnostics_dir: Option<PathBuf>,
    pub progress: ProgressSettings,
    pub elevation: ElevationSettings,
    pub logging: LoggingSettings,
    pub certificate: CertificateSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            free_space_pattern: WipePattern::Zeros,
            allow_concurrent_scans: false,
            scan_parallelism: num_cpus::get().max(1),
            diagnostics_dir: None,
            progress: ProgressSettings::default(),
            elevation: ElevationSettings::default(),
            logging: LoggingSettings::default(),
            certificate: CertificateSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then the config file, then `SEVE_*` variables.
    pub fn load(explicit_file: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();

        match explicit_file {
            Some(path) => {
                if !path.exists() {
                    return Err(SettingsError::Invalid(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(
                        File::from(path).format(FileFormat::Toml).required(false),
                    );
                }
            }
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: PipelineConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a TOML document on top of the defaults, ignoring the
    /// environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, SettingsError> {
        let loaded: PipelineConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.engine.program.trim().is_empty() {
            return Err(SettingsError::Invalid("engine.program must not be empty".into()));
        }
        if self.scan_parallelism == 0 {
            return Err(SettingsError::Invalid("scan_parallelism must be at least 1".into()));
        }
        let p = &self.progress;
        if p.stall_count_min > p.stall_count_max || p.stall_ms_min > p.stall_ms_max {
            return Err(SettingsError::Invalid(
                "progress stall ranges must have min <= max".into(),
            ));
        }
        if !(0.0..=1.0).contains(&p.stall_window_start)
            || !(0.0..=1.0).contains(&p.stall_window_end)
            || p.stall_window_start > p.stall_window_end
        {
            return Err(SettingsError::Invalid(
                "progress stall window must lie within 0..=1".into(),
            ));
        }
        if self.certificate.max_listed_files == 0 {
            return Err(SettingsError::Invalid(
                "certificate.max_listed_files must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "seve", "seve-clear")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.engine.program, "python3");
        assert_eq!(config.free_space_pattern, WipePattern::Zeros);
        assert!(!config.allow_concurrent_scans);
        assert!(config.scan_parallelism >= 1);
        assert_eq!(config.elevation.relaunch_program, "pkexec");
        assert_eq!(config.certificate.max_listed_files, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_nested_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            free_space_pattern = "random"
            allow_concurrent_scans = true

            [engine]
            program = "/opt/seve/python"
            wipe_script = "/opt/seve/wipe_utils.py"
            extra_env = ["PYTHONIOENCODING=utf-8", "SEVE_MODE=test"]

            [progress]
            stall_ms_max = 900
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.program, "/opt/seve/python");
        assert_eq!(
            config.engine.wipe_script.as_deref(),
            Some(Path::new("/opt/seve/wipe_utils.py"))
        );
        assert_eq!(config.free_space_pattern, WipePattern::Random);
        assert!(config.allow_concurrent_scans);
        assert_eq!(config.progress.stall_ms_max, 900);
        // Untouched fields keep their defaults
        assert_eq!(config.progress.stall_ms_min, 250);
        assert_eq!(config.engine.library_path_var, "PYTHONPATH");
        assert_eq!(
            config.engine.env_pairs(),
            vec![
                ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
                ("SEVE_MODE".to_string(), "test".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let err = PipelineConfig::from_toml_str("[progress]\nstall_count_min = 5\nstall_count_max = 2\n")
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));

        let err = PipelineConfig::from_toml_str("scan_parallelism = 0\n").unwrap_err();
        assert!(err.to_string().contains("scan_parallelism"));
    }

    #[test]
    fn test_env_pairs_skip_malformed() {
        let engine = EngineSettings {
            extra_env: vec!["NOEQUALS".into(), "=x".into(), "A=b=c".into()],
            ..EngineSettings::default()
        };
        assert_eq!(engine.env_pairs(), vec![("A".to_string(), "b=c".to_string())]);
    }

    #[test]
    #[serial]
    fn test_load_layers_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[engine]\nprogram = \"from-file\"\nworking_dir = \"/srv/seve\"").unwrap();

        std::env::set_var("SEVE_ENGINE__PROGRAM", "from-env");
        let loaded = PipelineConfig::load(Some(file.path()));
        std::env::remove_var("SEVE_ENGINE__PROGRAM");

        let config = loaded.unwrap();
        assert_eq!(config.engine.program, "from-env");
        assert_eq!(config.engine.working_dir.as_deref(), Some(Path::new("/srv/seve")));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/seve.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
