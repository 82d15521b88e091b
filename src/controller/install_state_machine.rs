//! State machine for a single version installation.
//!
//! The lifecycle manager updates the bundle version, catalog, subscription,
//! install plan and CSV asynchronously. Each stage is observed independently
//! and recorded here; no stage may be skipped.
//!
//! ```text
//! Requested -> Published -> CatalogVisible -> Subscribed
//!           -> PlanGenerated -> PlanApproved -> Installed
//! ```
//!
//! `Failed` is reachable from every non-terminal phase.

use tracing::{info, warn};

use super::error::{Error, Result};

// ============================================================================
// Install Phases
// ============================================================================

/// Progress of one version installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstallPhase {
    /// Bundle version requested, not yet present.
    #[default]
    Requested,
    /// Bundle version reached `Present`.
    Published,
    /// Package manifest offers the installable version.
    CatalogVisible,
    /// Subscription created.
    Subscribed,
    /// Subscription references an install plan.
    PlanGenerated,
    /// Install plan approved.
    PlanApproved,
    /// CSV reached `Succeeded`.
    Installed,
    /// A stage failed.
    Failed,
}

impl InstallPhase {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallPhase::Installed | InstallPhase::Failed)
    }
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallPhase::Requested => write!(f, "Requested"),
            InstallPhase::Published => write!(f, "Published"),
            InstallPhase::CatalogVisible => write!(f, "CatalogVisible"),
            InstallPhase::Subscribed => write!(f, "Subscribed"),
            InstallPhase::PlanGenerated => write!(f, "PlanGenerated"),
            InstallPhase::PlanApproved => write!(f, "PlanApproved"),
            InstallPhase::Installed => write!(f, "Installed"),
            InstallPhase::Failed => write!(f, "Failed"),
        }
    }
}

// ============================================================================
// Install Events
// ============================================================================

/// Observations that advance an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEvent {
    /// Bundle version reported `Present`.
    BundlePresent,
    /// A package manifest channel entry names the version.
    CatalogEntryFound,
    /// Subscription was created.
    SubscriptionCreated,
    /// Subscription status names an install plan.
    InstallPlanGenerated,
    /// Install plan is approved.
    InstallPlanApproved,
    /// CSV reached `Succeeded`.
    CsvSucceeded,
    /// A stage failed or timed out.
    StepFailed,
}

impl std::fmt::Display for InstallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallEvent::BundlePresent => write!(f, "BundlePresent"),
            InstallEvent::CatalogEntryFound => write!(f, "CatalogEntryFound"),
            InstallEvent::SubscriptionCreated => write!(f, "SubscriptionCreated"),
            InstallEvent::InstallPlanGenerated => write!(f, "InstallPlanGenerated"),
            InstallEvent::InstallPlanApproved => write!(f, "InstallPlanApproved"),
            InstallEvent::CsvSucceeded => write!(f, "CsvSucceeded"),
            InstallEvent::StepFailed => write!(f, "StepFailed"),
        }
    }
}

// ============================================================================
// Transition Context
// ============================================================================

/// Data observed alongside an event, used to evaluate guards.
#[derive(Debug, Clone, Default)]
pub struct InstallTransitionContext {
    /// Installable version id read from the bundle version status.
    pub version_id: Option<String>,
    /// Install plan name read from the subscription status.
    pub install_plan: Option<String>,
}

impl InstallTransitionContext {
    /// Context carrying the installable version id.
    pub fn with_version(version_id: impl Into<String>) -> Self {
        Self {
            version_id: Some(version_id.into()),
            ..Default::default()
        }
    }

    /// Context carrying the install plan name.
    pub fn with_install_plan(name: impl Into<String>) -> Self {
        Self {
            install_plan: Some(name.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// Install Transition
// ============================================================================

/// Represents a single state transition.
#[derive(Debug, Clone)]
pub struct InstallTransition {
    /// Source phase.
    pub from: InstallPhase,

    /// Target phase.
    pub to: InstallPhase,

    /// Event that triggers this transition.
    pub event: InstallEvent,

    /// Human-readable description.
    pub description: &'static str,
}

// ============================================================================
// Install State Machine
// ============================================================================

/// State machine for validating installation phase transitions.
#[derive(Debug, Clone)]
pub struct InstallStateMachine {
    transitions: Vec<InstallTransition>,
}

impl Default for InstallStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallStateMachine {
    /// Create a new state machine with all valid transitions.
    pub fn new() -> Self {
        let forward = [
            (
                InstallPhase::Requested,
                InstallPhase::Published,
                InstallEvent::BundlePresent,
                "Bundle version is present",
            ),
            (
                InstallPhase::Published,
                InstallPhase::CatalogVisible,
                InstallEvent::CatalogEntryFound,
                "Catalog offers the installable version",
            ),
            (
                InstallPhase::CatalogVisible,
                InstallPhase::Subscribed,
                InstallEvent::SubscriptionCreated,
                "Subscription created with manual approval",
            ),
            (
                InstallPhase::Subscribed,
                InstallPhase::PlanGenerated,
                InstallEvent::InstallPlanGenerated,
                "Install plan generated for the subscription",
            ),
            (
                InstallPhase::PlanGenerated,
                InstallPhase::PlanApproved,
                InstallEvent::InstallPlanApproved,
                "Install plan approved",
            ),
            (
                InstallPhase::PlanApproved,
                InstallPhase::Installed,
                InstallEvent::CsvSucceeded,
                "Installed service version succeeded",
            ),
        ];

        let mut transitions: Vec<InstallTransition> = forward
            .into_iter()
            .map(|(from, to, event, description)| InstallTransition {
                from,
                to,
                event,
                description,
            })
            .collect();

        for from in [
            InstallPhase::Requested,
            InstallPhase::Published,
            InstallPhase::CatalogVisible,
            InstallPhase::Subscribed,
            InstallPhase::PlanGenerated,
            InstallPhase::PlanApproved,
        ] {
            transitions.push(InstallTransition {
                from,
                to: InstallPhase::Failed,
                event: InstallEvent::StepFailed,
                description: "Installation step failed",
            });
        }

        Self { transitions }
    }

    /// Attempt to transition from `from` on `event`.
    ///
    /// Returns the transition if valid and its guard holds, None otherwise.
    pub fn transition(
        &self,
        from: InstallPhase,
        event: InstallEvent,
        ctx: &InstallTransitionContext,
    ) -> Option<InstallTransition> {
        let transition = self
            .transitions
            .iter()
            .find(|t| t.from == from && t.event == event)?;

        if !self.evaluate_guards(transition, ctx) {
            return None;
        }

        Some(transition.clone())
    }

    fn evaluate_guards(&self, transition: &InstallTransition, ctx: &InstallTransitionContext) -> bool {
        match (transition.from, transition.to) {
            // Present without an installable version id is not progress
            (InstallPhase::Requested, InstallPhase::Published) => {
                ctx.version_id.as_deref().is_some_and(|v| !v.is_empty())
            }

            (InstallPhase::Subscribed, InstallPhase::PlanGenerated) => {
                ctx.install_plan.as_deref().is_some_and(|p| !p.is_empty())
            }

            _ => true,
        }
    }

    /// Check if a phase transition is valid (without guards).
    pub fn can_transition(&self, from: InstallPhase, to: InstallPhase) -> bool {
        if from == to {
            return true;
        }

        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    /// Get the list of valid next phases from a given phase.
    pub fn valid_transitions(&self, from: InstallPhase) -> Vec<InstallPhase> {
        self.transitions
            .iter()
            .filter(|t| t.from == from)
            .map(|t| t.to)
            .collect()
    }
}

// ============================================================================
// Install Tracker
// ============================================================================

/// Tracks one version installation through the state machine.
///
/// A fresh tracker is created for every version, so a phase observed for a
/// previous request can never short-circuit a new one.
#[derive(Debug, Clone)]
pub struct InstallTracker {
    machine: InstallStateMachine,
    phase: InstallPhase,
    history: Vec<InstallPhase>,
    subject: String,
}

impl InstallTracker {
    /// Start tracking the installation of `subject` (e.g. the bundle tag).
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            machine: InstallStateMachine::new(),
            phase: InstallPhase::Requested,
            history: vec![InstallPhase::Requested],
            subject: subject.into(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    /// Every phase entered so far, starting with `Requested`.
    pub fn history(&self) -> &[InstallPhase] {
        &self.history
    }

    /// Advance on `event`; rejects skipped or out-of-order stages.
    pub fn advance(
        &mut self,
        event: InstallEvent,
        ctx: &InstallTransitionContext,
    ) -> Result<InstallPhase> {
        let Some(transition) = self.machine.transition(self.phase, event, ctx) else {
            warn!(
                subject = %self.subject,
                phase = %self.phase,
                event = %event,
                "Rejected install transition"
            );
            return Err(Error::InvalidTransition {
                from: self.phase.to_string(),
                event: event.to_string(),
            });
        };

        info!(
            subject = %self.subject,
            from = %transition.from,
            to = %transition.to,
            "{}",
            transition.description
        );
        self.phase = transition.to;
        self.history.push(transition.to);
        Ok(self.phase)
    }

    /// Record a failure; a no-op once terminal.
    pub fn fail(&mut self, reason: &str) {
        if self.phase.is_terminal() {
            return;
        }
        warn!(subject = %self.subject, phase = %self.phase, reason = %reason, "Installation failed");
        self.phase = InstallPhase::Failed;
        self.history.push(InstallPhase::Failed);
    }
}
