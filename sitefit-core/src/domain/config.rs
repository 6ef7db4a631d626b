//! Per-job crawl engine options

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine options accepted with a job submission
///
/// Unknown keys are rejected so a typo never silently falls back to a
/// default. Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    pub cycles: u32,
    /// Search radius around the parcel, meters
    pub buffer: f64,
    pub max_neighbors: u32,
    pub workers: u32,
    pub score_workers: u32,
    /// Degrees between candidate rotations
    pub rotation_step: f64,
    pub full_rotation: bool,
    pub offset_step_scale: f64,
    pub offset_step: Option<f64>,
    pub auto_offset: bool,
    pub auto_offset_scale: f64,
    pub offset_range: Option<f64>,
    pub setback: f64,
    pub min_composite: f64,
    pub render_cycle: bool,
    pub render_best: bool,
    pub render_composite: bool,
    pub skip_roads: bool,
    /// Derive the frontage from the footprint when none is given
    pub auto_front: bool,
    /// Frontage heading in degrees, 0 = +X, counter-clockwise
    pub front_angle: Option<f64>,
    pub frontage_perpendicular: bool,
    pub log_level: EngineLogLevel,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            cycles: 6,
            buffer: 80.0,
            max_neighbors: 50,
            workers: 6,
            score_workers: 1,
            rotation_step: 15.0,
            full_rotation: false,
            offset_step_scale: 0.2,
            offset_step: None,
            auto_offset: true,
            auto_offset_scale: 2.0,
            offset_range: None,
            setback: 3.0,
            min_composite: 0.0,
            render_cycle: true,
            render_best: true,
            render_composite: true,
            skip_roads: false,
            auto_front: true,
            front_angle: None,
            frontage_perpendicular: false,
            log_level: EngineLogLevel::Info,
        }
    }
}

/// Engine log verbosity, passed through as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngineLogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for EngineLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("config field `{field}` {requirement}")]
    OutOfRange {
        field: &'static str,
        requirement: &'static str,
    },

    #[error("`offset_range` requires `auto_offset` to be false")]
    OffsetRangeWithAutoOffset,

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn require(ok: bool, field: &'static str, requirement: &'static str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, requirement })
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require((1..=100).contains(&self.cycles), "cycles", "must be between 1 and 100")?;
        require(positive(self.buffer), "buffer", "must be greater than 0")?;
        require(self.max_neighbors >= 1, "max_neighbors", "must be at least 1")?;
        require(self.workers >= 1, "workers", "must be at least 1")?;
        require(self.score_workers >= 1, "score_workers", "must be at least 1")?;
        require(
            positive(self.rotation_step) && self.rotation_step <= 360.0,
            "rotation_step",
            "must be in (0, 360]",
        )?;
        require(
            positive(self.offset_step_scale),
            "offset_step_scale",
            "must be greater than 0",
        )?;
        require(
            self.offset_step.is_none_or(positive),
            "offset_step",
            "must be greater than 0",
        )?;
        require(
            positive(self.auto_offset_scale),
            "auto_offset_scale",
            "must be greater than 0",
        )?;
        require(
            self.offset_range.is_none_or(positive),
            "offset_range",
            "must be greater than 0",
        )?;
        require(
            self.setback.is_finite() && self.setback >= 0.0,
            "setback",
            "must be 0 or greater",
        )?;
        require(self.min_composite.is_finite(), "min_composite", "must be finite")?;
        require(
            self.front_angle.is_none_or(f64::is_finite),
            "front_angle",
            "must be finite",
        )?;

        if self.offset_range.is_some() && self.auto_offset {
            return Err(ConfigError::OffsetRangeWithAutoOffset);
        }
        Ok(())
    }

    /// Parses a JSON object, rejecting unknown keys and invalid values
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `key=value` style overrides on top of this configuration
    ///
    /// Values are read as JSON when they parse as JSON (`6`, `false`,
    /// `"INFO"`) and as plain strings otherwise (`INFO`).
    pub fn with_overrides<'a, I>(&self, overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut value =
            serde_json::to_value(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let Some(fields) = value.as_object_mut() else {
            return Err(ConfigError::Invalid("config is not an object".to_string()));
        };

        for (key, raw) in overrides {
            let parsed = serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            fields.insert(key.to_string(), parsed);
        }
        Self::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_is_default() {
        let config = CrawlConfig::from_json(json!({})).unwrap();
        assert_eq!(config, CrawlConfig::default());
    }

    #[test]
    fn test_rejects_unknown_key() {
        let err = CrawlConfig::from_json(json!({ "cycels": 3 })).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("cycels")));
    }

    #[test]
    fn test_range_checks() {
        let err = CrawlConfig::from_json(json!({ "cycles": 0 })).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "cycles", .. }));

        let err = CrawlConfig::from_json(json!({ "rotation_step": 400.0 })).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "rotation_step", .. }));

        let err = CrawlConfig::from_json(json!({ "offset_step": -1.0 })).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "offset_step", .. }));
    }

    #[test]
    fn test_offset_range_needs_manual_offsets() {
        let err = CrawlConfig::from_json(json!({ "offset_range": 10.0 })).unwrap_err();
        assert_eq!(err, ConfigError::OffsetRangeWithAutoOffset);

        let config =
            CrawlConfig::from_json(json!({ "offset_range": 10.0, "auto_offset": false })).unwrap();
        assert_eq!(config.offset_range, Some(10.0));
    }

    #[test]
    fn test_log_level_wire_form() {
        let config = CrawlConfig::from_json(json!({ "log_level": "DEBUG" })).unwrap();
        assert_eq!(config.log_level, EngineLogLevel::Debug);
        assert!(CrawlConfig::from_json(json!({ "log_level": "debug" })).is_err());
    }

    #[test]
    fn test_overrides() {
        let base = CrawlConfig::default();
        let config = base
            .with_overrides([("cycles", "12"), ("render_best", "false"), ("log_level", "WARNING")])
            .unwrap();
        assert_eq!(config.cycles, 12);
        assert!(!config.render_best);
        assert_eq!(config.log_level, EngineLogLevel::Warning);

        assert!(base.with_overrides([("nope", "1")]).is_err());
        assert!(base.with_overrides([("cycles", "many")]).is_err());
    }
}
