//! Pipeline configuration loaded from TOML.
//!
//! Every field has a default, so an empty file yields the standard
//! plan → design → implement → test pipeline:
//!
//! ```toml
//! phases = ["plan", "design", "implement", "test"]
//!
//! [correction]
//! max_iterations = 3
//! escalation_threshold = 0.5
//! mode = "autonomous"
//!
//! [gates.implement]
//! flavor = "review_only"
//! high_fail_threshold = 5
//!
//! [aggregator]
//! max_file_bytes = 524288
//! min_text_len = 20
//!
//! [logging]
//! json = false
//! level = "info"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Level;

use forgegate_core::quality_gate::DEFAULT_REVIEW_HIGH_FAIL_THRESHOLD;
use forgegate_core::{AggregatorConfig, Phase, QualityGate, Reviewer};

use crate::correction::CorrectionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::PhasePlan;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    #[default]
    PipelineWide,
    ReviewOnly,
}

/// Gate settings for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Defaults to `"{phase}_gate"`.
    pub name: Option<String>,
    pub flavor: GateKind,
    /// Only read by review-only gates.
    pub high_fail_threshold: u32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            name: None,
            flavor: GateKind::PipelineWide,
            high_fail_threshold: DEFAULT_REVIEW_HIGH_FAIL_THRESHOLD,
        }
    }
}

impl GateSettings {
    /// Implementation review tolerates a few High findings; every other
    /// phase is gated pipeline-wide.
    pub fn default_for(phase: Phase) -> Self {
        match phase {
            Phase::Implement => Self {
                flavor: GateKind::ReviewOnly,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    pub fn to_gate(&self, phase: Phase) -> QualityGate {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("{phase}_gate"));
        match self.flavor {
            GateKind::PipelineWide => QualityGate::pipeline_wide(name),
            GateKind::ReviewOnly => QualityGate::review_only(name, self.high_fail_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub phases: Vec<Phase>,
    pub correction: CorrectionConfig,
    /// Keyed by phase name (`plan`, `design`, ...).
    pub gates: BTreeMap<String, GateSettings>,
    pub aggregator: AggregatorConfig,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            phases: Phase::standard_sequence(),
            correction: CorrectionConfig::default(),
            gates: BTreeMap::new(),
            aggregator: AggregatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> PipelineResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| PipelineError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.phases.is_empty() {
            return Err(PipelineError::Config("at least one phase is required".into()));
        }
        for (i, phase) in self.phases.iter().enumerate() {
            if self.phases[..i].contains(phase) {
                return Err(PipelineError::Config(format!("phase {phase} listed twice")));
            }
        }
        if self.correction.max_iterations == 0 {
            return Err(PipelineError::Config(
                "correction.max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.correction.escalation_threshold) {
            return Err(PipelineError::Config(format!(
                "correction.escalation_threshold must be within [0, 1], got {}",
                self.correction.escalation_threshold
            )));
        }
        for (phase, settings) in &self.gates {
            if !Phase::standard_sequence()
                .iter()
                .any(|p| p.to_string() == *phase)
            {
                return Err(PipelineError::Config(format!("gates.{phase}: unknown phase")));
            }
            if settings.flavor == GateKind::ReviewOnly && settings.high_fail_threshold == 0 {
                return Err(PipelineError::Config(format!(
                    "gates.{phase}.high_fail_threshold must be at least 1"
                )));
            }
        }
        self.log_level()?;
        Ok(())
    }

    /// Gate for `phase`, falling back to the phase default.
    pub fn gate_for(&self, phase: Phase) -> QualityGate {
        self.gates
            .get(&phase.to_string())
            .cloned()
            .unwrap_or_else(|| GateSettings::default_for(phase))
            .to_gate(phase)
    }

    /// One plan per configured phase, reviewers supplied by the caller.
    pub fn phase_plans<F>(&self, mut reviewers_for: F) -> Vec<PhasePlan>
    where
        F: FnMut(Phase) -> Vec<Arc<dyn Reviewer>>,
    {
        self.phases
            .iter()
            .map(|&phase| {
                PhasePlan::new(phase, self.gate_for(phase)).with_reviewers(reviewers_for(phase))
            })
            .collect()
    }

    pub fn log_level(&self) -> PipelineResult<Level> {
        self.logging
            .level
            .parse::<Level>()
            .map_err(|_| PipelineError::Config(format!("unknown log level '{}'", self.logging.level)))
    }

    /// Install the global subscriber from `[logging]`.
    pub fn init_tracing(&self) -> PipelineResult<()> {
        forgegate_core::telemetry::init_tracing(self.logging.json, self.log_level()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::AutonomyMode;
    use forgegate_core::{GateFlavor, Verdict};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.phases, Phase::standard_sequence());
        assert_eq!(config.correction.max_iterations, 3);
        assert_eq!(config.correction.mode, AutonomyMode::Autonomous);
    }

    #[test]
    fn test_default_gates_per_phase() {
        let config = PipelineConfig::default();
        let design = config.gate_for(Phase::Design);
        let implement = config.gate_for(Phase::Implement);
        assert_eq!(design.name, "design_gate");
        assert_eq!(design.flavor, GateFlavor::PipelineWide);
        assert_eq!(
            implement.flavor,
            GateFlavor::ReviewOnly {
                high_fail_threshold: 5
            }
        );
    }

    #[test]
    fn test_gate_overrides_from_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            phases = ["design", "implement"]

            [gates.design]
            name = "architecture_review"
            flavor = "review_only"
            high_fail_threshold = 2

            [correction]
            mode = "supervised"
            "#,
        )
        .unwrap();

        let gate = config.gate_for(Phase::Design);
        assert_eq!(gate.name, "architecture_review");
        let counts = forgegate_core::SeverityCounts {
            high: 1,
            ..Default::default()
        };
        assert_eq!(gate.evaluate(&counts), Verdict::NeedsRevision);
        assert_eq!(config.correction.mode, AutonomyMode::Supervised);
        assert_eq!(config.correction.max_iterations, 3);
        assert_eq!(config.phase_plans(|_| Vec::new()).len(), 2);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        for bad in [
            "phases = []",
            r#"phases = ["plan", "plan"]"#,
            "[correction]\nmax_iterations = 0",
            "[correction]\nescalation_threshold = 1.5",
            "[logging]\nlevel = \"loud\"",
            "[gates.plan]\nflavor = \"review_only\"\nhigh_fail_threshold = 0",
            "phases = [\"deploy\"]",
            "[gates.deploy]\nflavor = \"pipeline_wide\"",
        ] {
            let err = PipelineConfig::from_toml_str(bad).unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = PipelineConfig::load("/nonexistent/forgegate.toml").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
