//! One wizard run that owns its form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IntakeError;

use super::binder::{self, FieldValue};
use super::model::{FamilyMember, IntakeForm};
use super::path::FieldPath;
use super::render::{RenderedStep, RendererSet};
use super::steps::{Direction, Step, StepRegistry, WizardState};

/// Lifecycle of a session. Submitted sessions are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Submitted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "submitted" => Ok(Self::Submitted),
            other => Err(format!("Unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeSession {
    pub id: Uuid,
    pub form: IntakeForm,
    pub wizard: WizardState,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl IntakeSession {
    /// Fresh session positioned at the registry's first step.
    pub fn new(registry: &StepRegistry) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            form: IntakeForm::new(),
            wizard: WizardState::start(registry),
            status: SessionStatus::InProgress,
            created_at: now,
            updated_at: now,
            submitted_at: None,
        }
    }

    pub fn current_step(&self) -> &Step {
        &self.wizard.current
    }

    pub fn is_submitted(&self) -> bool {
        self.status == SessionStatus::Submitted
    }

    fn ensure_editable(&self) -> Result<(), IntakeError> {
        if self.is_submitted() {
            return Err(IntakeError::AlreadySubmitted { id: self.id });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn add_member(&mut self, key: &str, first_name: &str) -> Result<(), IntakeError> {
        self.ensure_editable()?;
        self.form
            .add_member(key, FamilyMember::new(first_name.trim()))?;
        self.touch();
        Ok(())
    }

    pub fn remove_member(&mut self, key: &str) -> Result<FamilyMember, IntakeError> {
        self.ensure_editable()?;
        let removed = self.form.remove_member(key)?;
        self.touch();
        Ok(removed)
    }

    /// Apply one field edit addressed by a dotted path.
    pub fn apply_field(
        &mut self,
        path: &str,
        value: Option<&FieldValue>,
    ) -> Result<FieldPath, IntakeError> {
        self.ensure_editable()?;
        let parsed = binder::apply_path(&mut self.form, path, value)?;
        self.touch();
        Ok(parsed)
    }

    pub fn navigate(
        &mut self,
        registry: &StepRegistry,
        direction: Direction,
    ) -> Result<Step, IntakeError> {
        self.ensure_editable()?;
        let step = self.wizard.navigate(registry, direction)?.clone();
        self.touch();
        Ok(step)
    }

    pub fn render(
        &self,
        renderers: &RendererSet,
        registry: &StepRegistry,
    ) -> Result<RenderedStep, IntakeError> {
        renderers.render(&self.form, registry, &self.wizard.current)
    }

    /// Hand off the completed form. Only allowed from the final step of a
    /// form with at least one member.
    pub fn submit(&mut self, registry: &StepRegistry) -> Result<(), IntakeError> {
        self.ensure_editable()?;
        if !self.wizard.is_final(registry) {
            return Err(IntakeError::Incomplete {
                reason: format!(
                    "wizard is at step {}, submission happens at {}",
                    self.wizard.current,
                    registry.last()
                ),
            });
        }
        if self.form.is_empty() {
            return Err(IntakeError::Incomplete {
                reason: "no family members were added".into(),
            });
        }
        let now = Utc::now();
        self.status = SessionStatus::Submitted;
        self.submitted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NavigationError;

    fn at_last_step(session: &mut IntakeSession, registry: &StepRegistry) {
        while session.navigate(registry, Direction::Next).is_ok() {}
    }

    #[test]
    fn new_session_starts_at_first_step() {
        let registry = StepRegistry::default();
        let session = IntakeSession::new(&registry);
        assert_eq!(session.current_step(), registry.first());
        assert_eq!(session.status, SessionStatus::InProgress);
        assert!(session.form.is_empty());
    }

    #[test]
    fn submit_requires_final_step_and_members() {
        let registry = StepRegistry::default();
        let mut session = IntakeSession::new(&registry);
        session.add_member("m1", "Alice").unwrap();

        assert!(matches!(
            session.submit(&registry),
            Err(IntakeError::Incomplete { .. })
        ));

        at_last_step(&mut session, &registry);
        session.remove_member("m1").unwrap();
        assert!(matches!(
            session.submit(&registry),
            Err(IntakeError::Incomplete { .. })
        ));

        session.add_member("m1", "Alice").unwrap();
        session.submit(&registry).unwrap();
        assert!(session.is_submitted());
        assert!(session.submitted_at.is_some());
    }

    #[test]
    fn submitted_session_is_read_only() {
        let registry = StepRegistry::new(["only"]).unwrap();
        let mut session = IntakeSession::new(&registry);
        session.add_member("m1", "Alice").unwrap();
        session.submit(&registry).unwrap();

        let id = session.id;
        let frozen = session.clone();
        let errors = [
            session.add_member("m2", "Bob").unwrap_err(),
            session.remove_member("m1").unwrap_err(),
            session
                .apply_field("m1.demographics.DOB", Some(&"01/02/2003".into()))
                .unwrap_err(),
            session.navigate(&registry, Direction::Next).unwrap_err(),
            session.submit(&registry).unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, IntakeError::AlreadySubmitted { id: e } if e == id));
        }
        assert_eq!(session, frozen);
    }

    #[test]
    fn navigation_errors_pass_through() {
        let registry = StepRegistry::default();
        let mut session = IntakeSession::new(&registry);
        let err = session.navigate(&registry, Direction::Previous).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Navigation(NavigationError::AtFirstStep { .. })
        ));
    }

    #[test]
    fn apply_field_updates_form() {
        let registry = StepRegistry::default();
        let mut session = IntakeSession::new(&registry);
        session.add_member("m1", " Alice ").unwrap();
        assert_eq!(session.form.member("m1").unwrap().first_name(), "Alice");

        let path = session
            .apply_field("m1.demographics.income_source.job", Some(&true.into()))
            .unwrap();
        assert_eq!(path.member, "m1");
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn session_serde_roundtrip() {
        let registry = StepRegistry::default();
        let mut session = IntakeSession::new(&registry);
        session.add_member("m1", "Alice").unwrap();
        session
            .apply_field("m1.demographics.DOB", Some(&"05/06/1999".into()))
            .unwrap();

        let json = serde_json::to_string(&session).unwrap();
        let parsed: IntakeSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn status_string_round_trip() {
        for status in [SessionStatus::InProgress, SessionStatus::Submitted] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
        assert!("done".parse::<SessionStatus>().is_err());
    }
}
