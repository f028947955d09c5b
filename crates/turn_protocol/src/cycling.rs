//! Pure model/parameter cycling.
//!
//! Every operation is a total function of (state, direction) that returns a
//! new value; nothing here consults the network or persisted state.

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Discrete deliberation level requested from a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
    XHigh,
}

impl ReasoningEffort {
    pub const ALL: [Self; 5] = [Self::Minimal, Self::Low, Self::Medium, Self::High, Self::XHigh];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::XHigh => "xhigh",
        }
    }

    fn rank(self) -> i8 {
        match self {
            Self::Minimal => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::XHigh => 4,
        }
    }
}

/// One (provider, model) candidate and the effort levels it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub provider_id: String,
    pub model_id: String,
    pub supported_efforts: Vec<ReasoningEffort>,
}

impl ModelCandidate {
    /// Candidate accepting every effort level.
    #[must_use]
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            supported_efforts: ReasoningEffort::ALL.to_vec(),
        }
    }

    #[must_use]
    pub fn with_efforts(mut self, efforts: Vec<ReasoningEffort>) -> Self {
        self.supported_efforts = efforts;
        self
    }
}

/// The active (provider, model, effort) triple handed to transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider_id: String,
    pub model_id: String,
    pub effort: ReasoningEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    Forward,
    Backward,
}

/// Immutable cycling state over candidates and effort levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    candidates: Vec<ModelCandidate>,
    model_index: usize,
    efforts: Vec<ReasoningEffort>,
    effort_index: usize,
}

impl CycleState {
    /// Creates cycling state over at least one candidate, starting at the
    /// first candidate and `Medium` effort.
    pub fn new(candidates: Vec<ModelCandidate>) -> SdkResult<Self> {
        if candidates.is_empty() {
            return Err(SdkError::config(
                "model cycling requires at least one candidate",
            ));
        }

        let efforts = ReasoningEffort::ALL.to_vec();
        let effort_index = efforts
            .iter()
            .position(|effort| *effort == ReasoningEffort::Medium)
            .unwrap_or(0);

        Ok(Self {
            candidates,
            model_index: 0,
            efforts,
            effort_index,
        })
    }

    #[must_use]
    pub fn cycle_model(&self, direction: CycleDirection) -> Self {
        let mut next = self.clone();
        next.model_index = step(self.model_index, self.candidates.len(), direction);
        next
    }

    #[must_use]
    pub fn cycle_effort(&self, direction: CycleDirection) -> Self {
        let mut next = self.clone();
        next.effort_index = step(self.effort_index, self.efforts.len(), direction);
        next
    }

    #[must_use]
    pub fn selected(&self) -> &ModelCandidate {
        &self.candidates[self.model_index]
    }

    /// The effort the user has dialed in, before clamping.
    #[must_use]
    pub fn requested_effort(&self) -> ReasoningEffort {
        self.efforts[self.effort_index]
    }

    /// The active selection with the effort clamped to the nearest level the
    /// selected model supports. Ties resolve toward the lower level.
    #[must_use]
    pub fn selection(&self) -> ModelSelection {
        let candidate = self.selected();
        ModelSelection {
            provider_id: candidate.provider_id.clone(),
            model_id: candidate.model_id.clone(),
            effort: clamp_effort(self.requested_effort(), &candidate.supported_efforts),
        }
    }
}

fn step(index: usize, len: usize, direction: CycleDirection) -> usize {
    match direction {
        CycleDirection::Forward => (index + 1) % len,
        CycleDirection::Backward => (index + len - 1) % len,
    }
}

fn clamp_effort(requested: ReasoningEffort, supported: &[ReasoningEffort]) -> ReasoningEffort {
    if supported.contains(&requested) || supported.is_empty() {
        return requested;
    }

    let mut best = supported[0];
    let mut best_key = (i8::MAX, i8::MAX);
    for effort in supported {
        let distance = (effort.rank() - requested.rank()).abs();
        let key = (distance, effort.rank());
        if key < best_key {
            best_key = key;
            best = *effort;
        }
    }

    best
}
