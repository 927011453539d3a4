//! Step registry and navigation controller.
//!
//! The wizard is strictly linear: the registry fixes the order of steps and
//! the only transitions are one step forward or one step back.

use serde::{Deserialize, Serialize};

use crate::error::NavigationError;

/// Opaque step identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step(String);

impl Step {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Step {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Step {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known step ids.
pub mod step_ids {
    pub const HOUSEHOLD: &str = "household";
    pub const FAMILY_MEMBERS: &str = "family_members";
    pub const FAMILY_DEMOGRAPHICS: &str = "family_demographics";
    pub const REVIEW: &str = "review";
}

/// Position of `step` in `steps`.
pub fn current_step_index(step: &Step, steps: &[Step]) -> Result<usize, NavigationError> {
    steps
        .iter()
        .position(|s| s == step)
        .ok_or_else(|| NavigationError::StepNotFound {
            step: step.to_string(),
        })
}

/// Progress bar value for `step`: `(index + 1) / len * 100`.
pub fn progress_percent(step: &Step, steps: &[Step]) -> Result<f64, NavigationError> {
    let index = current_step_index(step, steps)?;
    Ok((index + 1) as f64 / steps.len() as f64 * 100.0)
}

/// Ordered, non-empty, duplicate-free list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

impl StepRegistry {
    pub fn new<I, S>(steps: I) -> Result<Self, NavigationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        let steps: Vec<Step> = steps.into_iter().map(Into::into).collect();
        if steps.is_empty() {
            return Err(NavigationError::EmptyRegistry);
        }
        for (i, step) in steps.iter().enumerate() {
            if steps[..i].contains(step) {
                return Err(NavigationError::DuplicateStep {
                    step: step.to_string(),
                });
            }
        }
        Ok(Self { steps })
    }

    pub fn index_of(&self, step: &Step) -> Result<usize, NavigationError> {
        current_step_index(step, &self.steps)
    }

    pub fn progress_percent(&self, step: &Step) -> Result<f64, NavigationError> {
        progress_percent(step, &self.steps)
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn first(&self) -> &Step {
        &self.steps[0]
    }

    pub fn last(&self) -> &Step {
        &self.steps[self.steps.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn as_slice(&self) -> &[Step] {
        &self.steps
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self {
            steps: vec![
                Step::from(step_ids::HOUSEHOLD),
                Step::from(step_ids::FAMILY_MEMBERS),
                Step::from(step_ids::FAMILY_DEMOGRAPHICS),
                Step::from(step_ids::REVIEW),
            ],
        }
    }
}

/// Which way to move through the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Next,
    Previous,
}

/// Current position of one wizard run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub current: Step,
}

impl WizardState {
    /// Position the wizard at the registry's first step.
    pub fn start(registry: &StepRegistry) -> Self {
        Self {
            current: registry.first().clone(),
        }
    }

    pub fn index(&self, registry: &StepRegistry) -> Result<usize, NavigationError> {
        registry.index_of(&self.current)
    }

    pub fn progress(&self, registry: &StepRegistry) -> Result<f64, NavigationError> {
        registry.progress_percent(&self.current)
    }

    pub fn is_final(&self, registry: &StepRegistry) -> bool {
        &self.current == registry.last()
    }

    /// Move one step forward. Fails at the last step.
    pub fn advance(&mut self, registry: &StepRegistry) -> Result<&Step, NavigationError> {
        let index = self.index(registry)?;
        let next = registry
            .get(index + 1)
            .ok_or_else(|| NavigationError::AtLastStep {
                step: self.current.to_string(),
            })?;
        self.current = next.clone();
        Ok(&self.current)
    }

    /// Move one step back. Fails at the first step.
    pub fn retreat(&mut self, registry: &StepRegistry) -> Result<&Step, NavigationError> {
        let index = self.index(registry)?;
        if index == 0 {
            return Err(NavigationError::AtFirstStep {
                step: self.current.to_string(),
            });
        }
        self.current = registry.as_slice()[index - 1].clone();
        Ok(&self.current)
    }

    pub fn navigate(
        &mut self,
        registry: &StepRegistry,
        direction: Direction,
    ) -> Result<&Step, NavigationError> {
        match direction {
            Direction::Next => self.advance(registry),
            Direction::Previous => self.retreat(registry),
        }
    }
}
