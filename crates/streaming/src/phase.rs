use thiserror::Error;

/// Lifecycle of one overlay inside its request coordinator.
///
/// ```text
/// Idle → EligibleNoData → Fetching → Staging → Committed
///                             ↑                    │ bbox change
///                             └────────────────────┘
/// ```
/// Leaving the zoom range drops any state back to `EligibleNoData`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OverlayPhase {
    #[default]
    Idle,
    EligibleNoData,
    Fetching,
    Staging,
    Committed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    BecameEligible,
    BecameIneligible,
    FetchStarted,
    DataReceived,
    Commit,
    /// Failure or cancellation of the pending fetch or load.
    Aborted { has_layer: bool },
    Reset,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("invalid overlay transition from {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: OverlayPhase,
    pub event: PhaseEvent,
}

impl OverlayPhase {
    pub fn advance(self, event: PhaseEvent) -> Result<OverlayPhase, InvalidTransition> {
        use OverlayPhase::*;
        use PhaseEvent::*;

        let next = match (self, event) {
            (_, Reset) => Idle,
            (Idle, BecameEligible) => EligibleNoData,
            (Idle, BecameIneligible) => Idle,
            (phase, BecameEligible) => phase,
            (_, BecameIneligible) => EligibleNoData,
            (EligibleNoData | Fetching | Staging | Committed, FetchStarted) => Fetching,
            (Fetching, DataReceived) => Staging,
            (Staging, Commit) => Committed,
            (Fetching | Staging, Aborted { has_layer: true }) => Committed,
            (Fetching | Staging, Aborted { has_layer: false }) => EligibleNoData,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, OverlayPhase::Fetching | OverlayPhase::Staging)
    }

    pub fn is_eligible(&self) -> bool {
        !matches!(self, OverlayPhase::Idle)
    }
}
