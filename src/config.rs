//! TOML configuration for the diagnosis pipeline.
//!
//! Layered the usual way: a file named by `INCIDENTGATE_CONFIG`, then
//! `/etc/incidentgate/incidentgate.toml`, then compiled-in defaults. Every
//! section is optional and falls back to its defaults field by field.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "INCIDENTGATE_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/incidentgate/incidentgate.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration. A run works from a snapshot of this value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub hypotheses: HypothesisConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded pipeline configuration");
        Ok(config)
    }

    /// Try `INCIDENTGATE_CONFIG`, then the system path, then defaults.
    /// A file that exists but fails to load is skipped with a warning.
    pub fn load_or_default() -> Self {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let system = Some(PathBuf::from(SYSTEM_CONFIG_PATH)).filter(|p| p.exists());

        for path in explicit.into_iter().chain(system) {
            match Self::load(&path) {
                Ok(cfg) => return cfg,
                Err(e) => warn!(path = %path.display(), error = %e, "config file skipped"),
            }
        }

        debug!("no usable config file, using compiled-in defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("thresholds.confidence", t.confidence),
            ("thresholds.request_more_data", t.request_more_data),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if t.request_more_data > t.confidence {
            bail!(
                "thresholds.request_more_data ({}) must not exceed thresholds.confidence ({})",
                t.request_more_data,
                t.confidence
            );
        }
        if self.correlation.lookahead == 0 {
            bail!("correlation.lookahead must be at least 1");
        }
        if self.hypotheses.max == 0 {
            bail!("hypotheses.max must be at least 1");
        }
        if self.timeouts.collector_secs == 0 || self.timeouts.pipeline_secs == 0 {
            bail!("timeouts must be non-zero");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Decision gate cutoffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Minimum overall confidence to answer.
    pub confidence: f64,
    /// Minimum overall confidence to ask for more data instead of refusing.
    pub request_more_data: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            confidence: 0.70,
            request_more_data: 0.50,
        }
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// Timeline correlator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Maximum distance (seconds) for two events to correlate at all.
    pub window_secs: u64,
    /// Pairs outside the causal table only correlate below this distance.
    pub generic_window_secs: u64,
    /// How many following events each event is compared against.
    pub lookahead: usize,
    /// Adjacent events further apart than this are reported as a gap.
    pub large_gap_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            generic_window_secs: 120,
            lookahead: 4,
            large_gap_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// Hypotheses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypothesisConfig {
    /// Most hypotheses verified per run, after ranking by plausibility.
    pub max: usize,
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self { max: 5 }
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Collection deadlines. Expiry degrades to empty evidence, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-collector budget (seconds).
    pub collector_secs: u64,
    /// Budget for the whole collection stage (seconds).
    pub pipeline_secs: u64,
}

impl TimeoutConfig {
    pub fn collector(&self) -> Duration {
        Duration::from_secs(self.collector_secs)
    }

    pub fn pipeline(&self) -> Duration {
        Duration::from_secs(self.pipeline_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            collector_secs: 30,
            pipeline_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
