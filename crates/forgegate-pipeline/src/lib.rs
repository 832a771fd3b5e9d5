//! forgegate pipeline
//!
//! Runs ordered phases (plan → design → implement → test) through review,
//! quality gates, a bounded correction loop and human overrides.

pub mod config;
pub mod correction;
pub mod error;
pub mod fakes;
pub mod orchestrator;

pub use config::{GateKind, GateSettings, LoggingConfig, PipelineConfig};

pub use correction::{
    AutonomyMode, ChangeApplier, CorrectionConfig, CorrectionLoop, CorrectionOutcome, Diagnoser,
    FixProposer, InMemoryApplier, LoopState, LoopStatus, TestRunner, Transition, CORRECTION_GATE,
    DEFAULT_MAX_ITERATIONS,
};

pub use error::{CorrectionError, PipelineError, PipelineResult};

pub use orchestrator::{
    ArtifactProducer, CorrectionToolkit, ExecutionLogEntry, ExecutionResult, PhaseOutcome,
    PhasePlan, PhaseStatus, PipelineOrchestrator,
};
