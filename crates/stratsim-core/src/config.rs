//! Run and engine configuration.
//!
//! [`SimulationConfig`] is the per-run surface supplied with the inputs;
//! [`EngineConfig`] is the process-wide surface the orchestrator is built with.
//! Both deserialize from partial documents (missing fields take defaults).

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Upper bound on candidates per run.
pub const MAX_SIMULATIONS: u32 = 100;
/// Upper bound on rounds per candidate.
pub const MAX_ROUNDS: u32 = 6;
/// Upper bound on selected candidates per run.
pub const MAX_TOP_CANDIDATES: u32 = 5;

/// Kind of strategy document being drafted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// Country strategic opportunities programme.
    #[default]
    Cosop,
    /// Project concept note.
    Pcn,
    /// Project design report.
    Pdr,
}

impl OutputType {
    pub fn label(&self) -> &'static str {
        match self {
            OutputType::Cosop => "COSOP",
            OutputType::Pcn => "PCN",
            OutputType::Pdr => "PDR",
        }
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutputType::Cosop => "cosop",
            OutputType::Pcn => "pcn",
            OutputType::Pdr => "pdr",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OutputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosop" => Ok(OutputType::Cosop),
            "pcn" => Ok(OutputType::Pcn),
            "pdr" => Ok(OutputType::Pdr),
            other => Err(format!("unknown output type: {other}")),
        }
    }
}

/// Per-run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of independent candidates (1..=100).
    pub num_simulations: u32,
    /// Writer/reviewer rounds per candidate (1..=6).
    pub max_rounds: u32,
    /// Candidates kept after ranking (1..=5, and no more than `num_simulations`).
    pub top_candidates: u32,
    pub output_type: OutputType,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_simulations: 3,
            max_rounds: 2,
            top_candidates: 1,
            output_type: OutputType::Cosop,
        }
    }
}

impl SimulationConfig {
    /// Clamp every field into its allowed range.
    pub fn clamped(&self) -> Self {
        let num_simulations = self.num_simulations.clamp(1, MAX_SIMULATIONS);
        Self {
            num_simulations,
            max_rounds: self.max_rounds.clamp(1, MAX_ROUNDS),
            top_candidates: self
                .top_candidates
                .clamp(1, MAX_TOP_CANDIDATES.min(num_simulations)),
            output_type: self.output_type,
        }
    }
}

/// Process-wide engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum candidates executing at once, independent of the requested count.
    pub worker_capacity: usize,
    /// Evidence chunks retrieved per agent turn.
    pub evidence_top_k: usize,
    /// Buffered events per broadcast subscriber before it starts lagging.
    pub broadcast_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_capacity: 4,
            evidence_top_k: 6,
            broadcast_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_upper_bounds() {
        let cfg = SimulationConfig {
            num_simulations: 500,
            max_rounds: 20,
            top_candidates: 9,
            output_type: OutputType::Pdr,
        }
        .clamped();
        assert_eq!(cfg.num_simulations, 100);
        assert_eq!(cfg.max_rounds, 6);
        assert_eq!(cfg.top_candidates, 5);
        assert_eq!(cfg.output_type, OutputType::Pdr);
    }

    #[test]
    fn test_clamp_lower_bounds_and_top_within_simulations() {
        let cfg = SimulationConfig {
            num_simulations: 2,
            max_rounds: 0,
            top_candidates: 4,
            output_type: OutputType::Cosop,
        }
        .clamped();
        assert_eq!(cfg.num_simulations, 2);
        assert_eq!(cfg.max_rounds, 1);
        assert_eq!(cfg.top_candidates, 2);

        let cfg = SimulationConfig {
            num_simulations: 0,
            ..SimulationConfig::default()
        }
        .clamped();
        assert_eq!(cfg.num_simulations, 1);
        assert_eq!(cfg.top_candidates, 1);
    }

    #[test]
    fn test_output_type_parse() {
        assert_eq!("PCN".parse::<OutputType>().unwrap(), OutputType::Pcn);
        assert!("memo".parse::<OutputType>().is_err());
        assert_eq!(OutputType::Cosop.to_string(), "cosop");
        assert_eq!(OutputType::Pdr.label(), "PDR");
    }

    #[test]
    fn test_partial_engine_config_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"worker_capacity": 8}"#).unwrap();
        assert_eq!(cfg.worker_capacity, 8);
        assert_eq!(cfg.evidence_top_k, 6);
        assert_eq!(cfg.retry, RetryPolicy::default());
    }
}
