//! Configuration for poolsim
//!
//! Every knob of a simulation run lives in [`SimConfig`], loaded from TOML:
//!
//! ```toml
//! [estimator]
//! window_sec = 20.0
//!
//! [controller]
//! control_period_sec = 10.0
//! horizon_sec = 10.0
//! slo_rejection_rate = 0.01
//! pool_min = 1
//! pool_max = 24
//! mode = "predictive"
//! trial_rng = "shared"
//!
//! [model]
//! bph = 10.0
//! initial_pool = 8
//!
//! [run]
//! seed = 777
//! ```
//!
//! Missing sections and fields fall back to the defaults above.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::state::EntryWeights;

// =============================================================================
// Enums
// =============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// How the controller looks into the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Forward-simulate the real arrivals inside the horizon.
    #[default]
    Predictive,
    /// Forward-simulate a Poisson stream drawn from the estimated rates.
    Estimated,
    /// Never resize: keep the current total.
    NoLookahead,
}

impl ControlMode {
    pub const ALL: [Self; 3] = [Self::Predictive, Self::Estimated, Self::NoLookahead];
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Predictive => write!(f, "predictive"),
            Self::Estimated => write!(f, "estimated"),
            Self::NoLookahead => write!(f, "no_lookahead"),
        }
    }
}

impl std::str::FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "predictive" | "default" => Ok(Self::Predictive),
            "estimated" => Ok(Self::Estimated),
            "no_lookahead" | "nofuture" => Ok(Self::NoLookahead),
            _ => Err(format!(
                "unknown control mode: {s}. Expected one of: predictive, estimated, no_lookahead"
            )),
        }
    }
}

/// Where controller trials draw their randomness from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrialRngPolicy {
    /// Trials consume the live generator in scan order.
    #[default]
    Shared,
    /// Each trial gets its own generator seeded from (seed, epoch, candidate).
    Independent,
}

impl std::fmt::Display for TrialRngPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Independent => write!(f, "independent"),
        }
    }
}

impl std::str::FromStr for TrialRngPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "independent" => Ok(Self::Independent),
            _ => Err(format!(
                "unknown trial rng policy: {s}. Expected one of: shared, independent"
            )),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Sliding-window rate estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Trailing window width in seconds
    pub window_sec: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self { window_sec: 20.0 }
    }
}

/// Admission controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds between control epochs
    pub control_period_sec: f64,
    /// Lookahead window of each prediction
    pub horizon_sec: f64,
    /// Highest acceptable predicted rejection fraction
    pub slo_rejection_rate: f64,
    /// Lower bound on the idle pool after a resize
    pub pool_min: u32,
    /// Upper bound on the idle pool after a resize
    pub pool_max: u32,
    pub mode: ControlMode,
    pub trial_rng: TrialRngPolicy,
    /// Evaluate candidates concurrently (independent trial RNG only)
    pub parallel_trials: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            control_period_sec: 10.0,
            horizon_sec: 10.0,
            slo_rejection_rate: 0.01,
            pool_min: 1,
            pool_max: 24,
            mode: ControlMode::Predictive,
            trial_rng: TrialRngPolicy::Shared,
            parallel_trials: false,
        }
    }
}

/// Service model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Service-rate divisor: phase `j` completes at `j * n_j / bph`
    pub bph: f64,
    /// Idle units at the start of a run
    pub initial_pool: u32,
    pub weights: EntryWeights,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            bph: 10.0,
            initial_pool: 8,
            weights: EntryWeights::default(),
        }
    }
}

/// Run-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed of the live random stream
    pub seed: u64,
    /// Log progress every N arrivals (0 disables)
    pub progress_every: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 777,
            progress_every: 50,
        }
    }
}

// =============================================================================
// Top level
// =============================================================================

/// Complete simulation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub estimator: EstimatorConfig,
    pub controller: ControllerConfig,
    pub model: ModelConfig,
    pub run: RunConfig,
    pub logging: LogConfig,
}

impl SimConfig {
    /// Load and validate a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadFailed(path.display().to_string(), e.to_string())
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    /// Check every field the simulator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("window_sec", self.estimator.window_sec)?;
        positive("control_period_sec", self.controller.control_period_sec)?;
        positive("horizon_sec", self.controller.horizon_sec)?;
        positive("bph", self.model.bph)?;

        let slo = self.controller.slo_rejection_rate;
        if !(0.0..=1.0).contains(&slo) {
            return Err(ConfigError::SloOutOfRange(slo));
        }

        if self.controller.pool_min > self.controller.pool_max {
            return Err(ConfigError::PoolBounds {
                min: self.controller.pool_min,
                max: self.controller.pool_max,
            });
        }

        self.model.weights.validate()?;

        if self.controller.parallel_trials && self.controller.trial_rng == TrialRngPolicy::Shared
        {
            return Err(ConfigError::ParallelSharedRng);
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = SimConfig::default();
        config.validate().unwrap();
        assert_eq!(config.controller.pool_max, 24);
        assert_eq!(config.run.seed, 777);
        assert_eq!(config.model.initial_pool, 8);
    }

    #[test]
    fn empty_toml_is_default() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config.controller, ControllerConfig::default());
        assert_eq!(config.estimator, EstimatorConfig::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            [controller]
            pool_max = 12
            mode = "no_lookahead"
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.pool_max, 12);
        assert_eq!(config.controller.mode, ControlMode::NoLookahead);
        assert_eq!(config.controller.horizon_sec, 10.0);
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = SimConfig::default();
        config.controller.trial_rng = TrialRngPolicy::Independent;
        config.controller.parallel_trials = true;
        config.model.weights.class2 = [0.0, 1.0, 0.0, 1.0];
        let text = config.to_toml().unwrap();
        let parsed = SimConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.controller, config.controller);
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.run, config.run);
    }

    #[test]
    fn rejects_non_positive_fields() {
        let mut config = SimConfig::default();
        config.controller.horizon_sec = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "horizon_sec",
                ..
            })
        ));

        let mut config = SimConfig::default();
        config.model.bph = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "bph", .. })
        ));
    }

    #[test]
    fn rejects_slo_outside_unit_interval() {
        let mut config = SimConfig::default();
        config.controller.slo_rejection_rate = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::SloOutOfRange(1.5)));
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let mut config = SimConfig::default();
        config.controller.pool_min = 30;
        assert_eq!(
            config.validate(),
            Err(ConfigError::PoolBounds { min: 30, max: 24 })
        );
    }

    #[test]
    fn parallel_trials_need_independent_rng() {
        let mut config = SimConfig::default();
        config.controller.parallel_trials = true;
        assert_eq!(config.validate(), Err(ConfigError::ParallelSharedRng));
        config.controller.trial_rng = TrialRngPolicy::Independent;
        config.validate().unwrap();
    }

    #[test]
    fn parse_failure_is_reported() {
        let err = SimConfig::from_toml_str("[controller\npool_max = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed(_)));
    }

    #[test]
    fn mode_aliases_parse() {
        assert_eq!("default".parse::<ControlMode>().unwrap(), ControlMode::Predictive);
        assert!("custom".parse::<ControlMode>().is_err());
        assert_eq!("nofuture".parse::<ControlMode>().unwrap(), ControlMode::NoLookahead);
        assert_eq!("no-lookahead".parse::<ControlMode>().unwrap(), ControlMode::NoLookahead);
        assert!("sometimes".parse::<ControlMode>().is_err());
        for mode in ControlMode::ALL {
            assert_eq!(mode.to_string().parse::<ControlMode>().unwrap(), mode);
        }
    }

    #[test]
    fn log_format_parse_and_display() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn load_from_missing_file() {
        let err = SimConfig::load_from(Path::new("/nonexistent/poolsim.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed(..)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poolsim.toml");
        std::fs::write(&path, "[run]\nseed = 9\n").unwrap();
        let config = SimConfig::load_from(&path).unwrap();
        assert_eq!(config.run.seed, 9);
    }
}
