//! Error types for poolsim-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a suggested command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for poolsim-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Arrival stream errors
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Broken simulation invariant (logic defect, never recovered)
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Config(err) => Some(err.remediation()),
            Self::Input(err) => Some(err.remediation()),
            Self::Invariant(_) => Some(
                Remediation::new(
                    "The simulator reached an impossible state. This is a bug, not bad input.",
                )
                .command("Re-run with tracing", "RUST_LOG=poolsim_core=trace poolsim run ...")
                .alternative("Report the seed, config and arrival file that reproduce it."),
            ),
            Self::Io(_) => Some(
                Remediation::new("Check file paths and permissions, then retry.")
                    .alternative("Verify the output directory exists and is writable."),
            ),
            Self::Json(_) => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(String),

    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("slo_rejection_rate must lie in [0, 1], got {0}")]
    SloOutOfRange(f64),

    #[error("pool_min ({min}) exceeds pool_max ({max})")]
    PoolBounds { min: u32, max: u32 },

    #[error("entry weights for class {class} must be finite and non-negative")]
    NegativeWeight { class: u8 },

    #[error("entry weights for class {class} sum to zero; arrivals would have no route")]
    DegenerateWeights { class: u8 },

    #[error("parallel_trials requires trial_rng = \"independent\"")]
    ParallelSharedRng,
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check the path and permissions."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ParseFailed(_) => Remediation::new("Config parse failed. Fix the TOML syntax.")
                .command("Print defaults", "poolsim default-config")
                .alternative("Start from the default config and edit one field at a time."),
            Self::SerializeFailed(_) => {
                Remediation::new("Failed to serialize configuration. Check config values.")
            }
            Self::NotPositive { field, .. } => {
                Remediation::new(format!("Set {field} to a positive, finite number."))
                    .command("Print defaults", "poolsim default-config")
            }
            Self::SloOutOfRange(_) => Remediation::new(
                "slo_rejection_rate is a fraction of arrivals; use a value such as 0.01.",
            ),
            Self::PoolBounds { .. } => {
                Remediation::new("Lower pool_min or raise pool_max so that min <= max.")
            }
            Self::NegativeWeight { class } | Self::DegenerateWeights { class } => {
                Remediation::new(format!(
                    "Give class {class} at least one positive phase-entry weight."
                ))
                .alternative("Weights are relative; [1, 1, 1, 1] routes uniformly.")
            }
            Self::ParallelSharedRng => Remediation::new(
                "Set trial_rng = \"independent\" or disable parallel_trials.",
            )
            .alternative("A shared stream makes each trial depend on the previous one."),
        }
    }
}

/// Arrival stream errors detected at the core boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("arrival {index} at t={time} precedes previous arrival at t={previous}")]
    OutOfOrder {
        index: usize,
        time: f64,
        previous: f64,
    },

    #[error("arrival {index} has non-finite time {time}")]
    NonFiniteTime { index: usize, time: f64 },
}

impl InputError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::OutOfOrder { .. } => Remediation::new(
                "Arrival streams must be sorted by time. Fix the upstream generator.",
            )
            .command("Sort a CSV", "(head -n1 arrivals.csv; tail -n+2 arrivals.csv | sort -t, -k1,1g)")
            .alternative("Regenerate the stream with `poolsim generate`."),
            Self::NonFiniteTime { .. } => {
                Remediation::new("Remove NaN or infinite timestamps from the arrival stream.")
            }
        }
    }
}

/// A conservation or non-negativity check failed inside the simulator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("token underflow: {place} would drop below zero")]
    Underflow { place: &'static str },

    #[error("token count overflow in {place}")]
    Overflow { place: &'static str },

    #[error("conservation broken: total {before} became {after} across a phase completion")]
    Conservation { before: u64, after: u64 },
}
