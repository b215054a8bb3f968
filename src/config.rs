//! Engine configuration.
//!
//! Animation timing, layout overrides and analysis tolerances can be given
//! in YAML or JSON. Every field has a default, so an empty document is a
//! valid configuration.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! animation:
//!   speed: 1.5          # > 1 plays faster
//!   travel_ms: 800      # time for a token to cross one wire
//!   pulse_ms: 300       # transform/merge highlight
//!   highlight_ms: 500   # arrival and wire highlight
//!   watchdog_ms: 60000  # 0 disables the watchdog
//!
//! layout:
//!   scale: 1.0
//!   components:
//!     - { id: PC, x: 40, y: 300, width: 40, height: 80 }
//!   vertical_lines:
//!     pc_out: 100
//!
//! analysis:
//!   shared_segment_tolerance: 2.0
//!
//! log_level: info
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::component::{ComponentRect, Layout};
use crate::types::Millis;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Timing parameters of an animation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationParams {
    /// Global speed multiplier. Every duration is divided by it.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Travel time of a token along one wire, before speed scaling
    #[serde(default = "default_travel_ms")]
    pub travel_ms: Millis,

    /// Highlight length for transforms, splits and merges
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: Millis,

    /// Highlight length for arrivals and wires
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: Millis,

    /// Wall-clock budget for one run; 0 disables the watchdog
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: Millis,
}

fn default_speed() -> f64 {
    1.0
}

fn default_travel_ms() -> Millis {
    800
}

fn default_pulse_ms() -> Millis {
    300
}

fn default_highlight_ms() -> Millis {
    500
}

fn default_watchdog_ms() -> Millis {
    60_000
}

impl Default for AnimationParams {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            travel_ms: default_travel_ms(),
            pulse_ms: default_pulse_ms(),
            highlight_ms: default_highlight_ms(),
            watchdog_ms: default_watchdog_ms(),
        }
    }
}

impl AnimationParams {
    /// Applies the speed multiplier to a nominal duration.
    pub fn scale(&self, ms: Millis) -> Millis {
        (ms as f64 / self.speed).round() as Millis
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ConfigError::Validation(format!(
                "animation.speed must be positive, got {}",
                self.speed
            )));
        }
        if self.travel_ms == 0 {
            tracing::warn!("animation.travel_ms is 0, tokens will jump between components");
        }
        Ok(())
    }
}

/// Layout parameters: scale plus optional overrides of the standard layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Rectangles at scale 1.0 that replace or extend the standard ones
    #[serde(default)]
    pub components: Vec<ComponentRect>,

    /// Extra or moved vertical routing lines at scale 1.0
    #[serde(default)]
    pub vertical_lines: BTreeMap<String, f64>,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            components: Vec::new(),
            vertical_lines: BTreeMap::new(),
        }
    }
}

impl LayoutParams {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::Validation(format!(
                "layout.scale must be positive, got {}",
                self.scale
            )));
        }

        let mut ids = HashSet::new();
        for rect in &self.components {
            if !ids.insert(rect.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate component ID: {}",
                    rect.id
                )));
            }
            if rect.width <= 0.0 || rect.height <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Component {} has a non-positive size",
                    rect.id
                )));
            }
        }
        Ok(())
    }
}

/// Parameters of the shared-segment analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Endpoint distance (px) under which two segments count as shared
    #[serde(default = "default_tolerance")]
    pub shared_segment_tolerance: f64,
}

fn default_tolerance() -> f64 {
    2.0
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            shared_segment_tolerance: default_tolerance(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Complete engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub animation: AnimationParams,

    #[serde(default)]
    pub layout: LayoutParams,

    #[serde(default)]
    pub analysis: AnalysisParams,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            animation: AnimationParams::default(),
            layout: LayoutParams::default(),
            analysis: AnalysisParams::default(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(&std::fs::read_to_string(path)?),
            "json" => Self::from_json(&std::fs::read_to_string(path)?),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.animation.validate()?;
        self.layout.validate()?;

        let tolerance = self.analysis.shared_segment_tolerance;
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "analysis.shared_segment_tolerance must be >= 0, got {}",
                tolerance
            )));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown log level: {}",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Builds the layout described by this configuration: the standard
    /// layout at `layout.scale` with the configured overrides applied.
    pub fn build_layout(&self) -> Layout {
        let scale = self.layout.scale;
        let mut layout = Layout::standard(scale);
        for rect in &self.layout.components {
            layout.insert_rect(rect.scaled(scale));
        }
        for (name, x) in &self.layout.vertical_lines {
            layout.set_line(name.clone(), x * scale);
        }
        layout
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating EngineConfig programmatically.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.config.animation.speed = speed;
        self
    }

    pub fn travel_ms(mut self, ms: Millis) -> Self {
        self.config.animation.travel_ms = ms;
        self
    }

    pub fn pulse_ms(mut self, ms: Millis) -> Self {
        self.config.animation.pulse_ms = ms;
        self
    }

    pub fn highlight_ms(mut self, ms: Millis) -> Self {
        self.config.animation.highlight_ms = ms;
        self
    }

    /// Sets the watchdog budget; 0 disables it.
    pub fn watchdog_ms(mut self, ms: Millis) -> Self {
        self.config.animation.watchdog_ms = ms;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.config.layout.scale = scale;
        self
    }

    /// Adds a component rectangle (at scale 1.0).
    pub fn add_component(mut self, rect: ComponentRect) -> Self {
        self.config.layout.components.push(rect);
        self
    }

    /// Adds a vertical routing line (at scale 1.0).
    pub fn vertical_line(mut self, name: impl Into<String>, x: f64) -> Self {
        self.config.layout.vertical_lines.insert(name.into(), x);
        self
    }

    pub fn shared_segment_tolerance(mut self, tolerance: f64) -> Self {
        self.config.analysis.shared_segment_tolerance = tolerance;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::new();
        assert_eq!(config.animation.speed, 1.0);
        assert_eq!(config.animation.travel_ms, 800);
        assert_eq!(config.layout.scale, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = EngineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
animation:
  speed: 2.0
  watchdog_ms: 0
layout:
  scale: 1.5
  components:
    - { id: Extra, x: 10, y: 10, width: 20, height: 20 }
  vertical_lines:
    pc_out: 110
log_level: debug
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.animation.speed, 2.0);
        assert_eq!(config.animation.watchdog_ms, 0);
        assert_eq!(config.animation.pulse_ms, 300);
        assert_eq!(config.layout.components.len(), 1);

        let layout = config.build_layout();
        assert_eq!(layout.rect("Extra").unwrap().width, 30.0);
        assert_eq!(layout.line("pc_out"), Some(165.0));
        assert!(layout.rect("ALUMain").is_some());
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "animation": {"speed": 0.5, "travel_ms": 400},
            "analysis": {"shared_segment_tolerance": 0.5}
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.animation.travel_ms, 400);
        assert_eq!(config.animation.scale(400), 800);
        assert_eq!(config.analysis.shared_segment_tolerance, 0.5);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EngineConfig::from_yaml("animation: { speed: 0 }").is_err());
        assert!(EngineConfig::from_yaml("layout: { scale: -1 }").is_err());
        assert!(EngineConfig::from_yaml("log_level: loud").is_err());
        assert!(EngineConfigBuilder::new()
            .shared_segment_tolerance(-0.1)
            .build()
            .is_err());
    }

    #[test]
    fn test_validation_duplicate_component() {
        let result = EngineConfigBuilder::new()
            .add_component(ComponentRect::new("A", 0.0, 0.0, 1.0, 1.0))
            .add_component(ComponentRect::new("A", 5.0, 0.0, 1.0, 1.0))
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_format() {
        let result = EngineConfig::from_file("engine.toml");
        assert!(matches!(result, Err(ConfigError::UnknownFormat(ext)) if ext == "toml"));
    }

    #[test]
    fn test_builder_and_roundtrip() {
        let config = EngineConfigBuilder::new()
            .speed(3.0)
            .watchdog_ms(5_000)
            .vertical_line("extra", 12.0)
            .build()
            .unwrap();

        let yaml = config.to_yaml().unwrap();
        let restored = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(restored, config);
        assert_eq!(restored.animation.scale(3000), 1000);
    }
}
