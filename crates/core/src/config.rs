//! Engine configuration loaded from `ember.toml`.
//!
//! Every section falls back to defaults, so a partial file (or no file at
//! all) is valid:
//!
//! ```toml
//! [window]
//! title = "Ember"
//! width = 1280
//!
//! [renderer]
//! validation = true
//! clear_color = [0.0, 0.0, 0.2, 1.0]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// File name looked up in the working directory by [`EngineConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "ember.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub logging: LoggingConfig,
}

/// Initial window placement and title.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            x: 100,
            y: 100,
            width: 800,
            height: 600,
        }
    }
}

/// Renderer and device-selection settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Name reported to the driver in the application info.
    pub application_name: String,
    /// `None` enables validation in debug builds only.
    pub validation: Option<bool>,
    /// Reject integrated, virtual and CPU devices.
    pub require_discrete_gpu: bool,
    /// Reject devices without a compute-capable queue family.
    pub require_compute_queue: bool,
    /// RGBA clear color of the main render pass.
    pub clear_color: [f32; 4],
    /// Upper bound on a single frame-fence wait before the device is
    /// considered lost.
    pub fence_timeout_ms: u64,
}

impl RendererConfig {
    /// Resolves [`Self::validation`] against the build profile.
    pub fn validation_enabled(&self) -> bool {
        self.validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Fence timeout in nanoseconds, as the Vulkan wait calls expect it.
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Ember".to_string(),
            validation: None,
            require_discrete_gpu: false,
            require_compute_queue: false,
            clear_color: [0.0, 0.0, 0.2, 1.0],
            fence_timeout_ms: 5_000,
        }
    }
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    pub thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,ember_rhi=debug,ember_renderer=debug".to_string(),
            thread_ids: false,
        }
    }
}

/// Where the configuration in a [`LoadedConfig`] came from.
#[derive(Debug)]
pub enum ConfigSource {
    /// Parsed from this file.
    File(PathBuf),
    /// No file existed; defaults are in use.
    Defaults,
    /// The file existed but could not be read or parsed; defaults are in
    /// use.
    Fallback { path: PathBuf, error: Error },
}

impl ConfigSource {
    /// Reports the outcome of loading. Call once logging is installed.
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {:?}", path),
            ConfigSource::Defaults => {
                info!("No {} found, using default configuration", DEFAULT_CONFIG_FILE)
            }
            ConfigSource::Fallback { path, error } => {
                warn!("Failed to load {:?}: {}. Using defaults.", path, error)
            }
        }
    }
}

/// Result of [`EngineConfig::load`]. Loading never fails and never logs;
/// the logging configuration itself comes from here.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub source: ConfigSource,
}

impl EngineConfig {
    /// Loads [`DEFAULT_CONFIG_FILE`] from the working directory, using
    /// defaults if it is missing or cannot be parsed.
    pub fn load() -> LoadedConfig {
        Self::load_or_default(DEFAULT_CONFIG_FILE)
    }

    /// Loads `path`, falling back to defaults on any failure. The failure
    /// is kept in [`ConfigSource::Fallback`].
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> LoadedConfig {
        let path = path.as_ref();

        if !path.exists() {
            return LoadedConfig {
                config: Self::default(),
                source: ConfigSource::Defaults,
            };
        }

        match Self::read(path) {
            Ok(config) => LoadedConfig {
                config,
                source: ConfigSource::File(path.to_path_buf()),
            },
            Err(error) => LoadedConfig {
                config: Self::default(),
                source: ConfigSource::Fallback {
                    path: path.to_path_buf(),
                    error,
                },
            },
        }
    }

    /// Loads configuration from `path`. A missing file yields defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.renderer.clear_color, [0.0, 0.0, 0.2, 1.0]);
    }

    #[test]
    fn test_partial_sections_keep_remaining_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [window]
            title = "Demo"
            width = 1280

            [renderer]
            validation = false
            require_discrete_gpu = true
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Demo");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert!(!config.renderer.validation_enabled());
        assert!(config.renderer.require_discrete_gpu);
        assert_eq!(config.renderer.fence_timeout_ms, 5_000);
    }

    #[test]
    fn test_validation_defaults_to_build_profile() {
        let config = RendererConfig::default();
        assert_eq!(config.validation_enabled(), cfg!(debug_assertions));

        let forced = RendererConfig {
            validation: Some(true),
            ..Default::default()
        };
        assert!(forced.validation_enabled());
    }

    #[test]
    fn test_fence_timeout_conversion_saturates() {
        let config = RendererConfig {
            fence_timeout_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.fence_timeout_ns(), u64::MAX);
        assert_eq!(RendererConfig::default().fence_timeout_ns(), 5_000_000_000);
    }

    #[test]
    fn test_malformed_document_is_config_error() {
        let result = EngineConfig::from_toml("[window]\nwidth = \"wide\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = EngineConfig::load_from_path("does/not/exist/ember.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    fn write_temp_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_or_default_reports_missing_file() {
        let loaded = EngineConfig::load_or_default("does/not/exist/ember.toml");
        assert_eq!(loaded.config, EngineConfig::default());
        assert!(matches!(loaded.source, ConfigSource::Defaults));
    }

    #[test]
    fn test_load_or_default_keeps_parse_error_for_later() {
        let path = write_temp_config("ember-malformed", "[window]\nwidth = \"wide\"");

        let loaded = EngineConfig::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.config, EngineConfig::default());
        match loaded.source {
            ConfigSource::Fallback { path: failed, error } => {
                assert_eq!(failed, path);
                assert!(matches!(error, Error::Config(_)));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_load_or_default_reads_valid_file() {
        let path = write_temp_config("ember-valid", "[window]\nwidth = 640\n");

        let loaded = EngineConfig::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.config.window.width, 640);
        assert!(matches!(loaded.source, ConfigSource::File(ref p) if *p == path));
    }
}
