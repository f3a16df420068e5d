//! Convergence phases and the run summary.

use serde::{Deserialize, Serialize};

/// Convergence phases, in execution order.
///
/// Each phase re-checks its own precondition at call time; a satisfied
/// postcondition makes the phase a pure read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Validate,
    LocateGateway,
    SecretStore,
    Certificate,
    Access,
    Listener,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Validate,
        Phase::LocateGateway,
        Phase::SecretStore,
        Phase::Certificate,
        Phase::Access,
        Phase::Listener,
    ];
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Validate => write!(f, "validate"),
            Phase::LocateGateway => write!(f, "locate-gateway"),
            Phase::SecretStore => write!(f, "secret-store"),
            Phase::Certificate => write!(f, "certificate"),
            Phase::Access => write!(f, "access"),
            Phase::Listener => write!(f, "listener"),
        }
    }
}

/// What a phase did to its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Postcondition already held; the phase issued only reads.
    Unchanged,
    Created,
    Updated,
    Rotated,
}

impl Outcome {
    pub fn mutated(&self) -> bool {
        !matches!(self, Outcome::Unchanged)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Unchanged => write!(f, "unchanged"),
            Outcome::Created => write!(f, "created"),
            Outcome::Updated => write!(f, "updated"),
            Outcome::Rotated => write!(f, "rotated"),
        }
    }
}

/// Per-phase result line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub outcome: Outcome,
    pub detail: String,
}

/// Result of one convergence run.
///
/// Deliberately free of timestamps and durations: two runs against the
/// same converged state produce equal summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub scope: String,
    pub gateway: String,
    pub secret_store: String,
    pub secret_ref: String,
    pub principal: String,
    pub listener: String,
    pub reports: Vec<PhaseReport>,
    /// Whether any phase mutated provider state.
    pub changed: bool,
}

impl Summary {
    pub fn report(&self, phase: Phase) -> Option<&PhaseReport> {
        self.reports.iter().find(|r| r.phase == phase)
    }
}
