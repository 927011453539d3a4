//! Step renderers turn the form into a renderable description of one step.
//!
//! Renderers only read the form. Display defaults (such as the placeholder
//! birth date) live in the rendered output and are never written back.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::IntakeError;

use super::model::{FamilyMember, Gender, IncomeSource, IntakeForm};
use super::path::{field_path, DemographicField};
use super::steps::{step_ids, Step, StepRegistry};

/// Birth date shown when a member has none on record.
pub const DEFAULT_DOB_DISPLAY: &str = "01/01/2020";

/// One step, ready to hand to the navigation shell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedStep {
    pub step: Step,
    pub title: String,
    pub step_index: usize,
    pub step_count: usize,
    pub progress_percent: f64,
    pub content: StepContent,
}

/// Step-specific content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepContent {
    FamilyDemographics {
        gender_options: Vec<&'static str>,
        sections: Vec<MemberSection>,
    },
    Review {
        members: Vec<MemberSummary>,
    },
    /// No renderer is registered for this step; the shell draws it itself.
    External,
}

/// A checkbox for one income source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncomeSourceOption {
    pub key: &'static str,
    pub label: &'static str,
    pub checked: bool,
    pub field_path: String,
}

/// The demographics inputs for one member, labelled with their first name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSection {
    pub member_key: String,
    pub label: String,
    pub gender: Option<Gender>,
    pub gender_path: String,
    pub date_of_birth: String,
    pub date_of_birth_is_default: bool,
    pub date_of_birth_path: String,
    /// Zero-padded to four digits.
    pub ssn_last4: Option<String>,
    pub ssn_path: String,
    pub monthly_income: Option<Decimal>,
    pub monthly_income_path: String,
    pub income_sources: Vec<IncomeSourceOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub member_key: String,
    pub label: String,
    pub answered: usize,
    pub income_sources: Vec<&'static str>,
}

/// Renders one kind of step.
pub trait StepRenderer: Send + Sync {
    fn title(&self) -> &'static str;

    fn render(&self, form: &IntakeForm) -> Result<StepContent, IntakeError>;
}

/// Section label, which requires a first name.
fn member_label(key: &str, member: &FamilyMember) -> Result<String, IntakeError> {
    let name = member.first_name().trim();
    if name.is_empty() {
        return Err(IntakeError::MissingFirstName {
            member: key.to_string(),
        });
    }
    Ok(name.to_string())
}

/// The family demographics step.
pub struct FamilyDemographics;

impl FamilyDemographics {
    fn section(key: &str, member: &FamilyMember) -> Result<MemberSection, IntakeError> {
        let d = &member.demographics;
        let path = |field: DemographicField| field_path(key, &field.suffix());

        let income_sources = IncomeSource::ALL
            .into_iter()
            .map(|source| IncomeSourceOption {
                key: source.key(),
                label: source.label(),
                checked: d.income_source.get(source),
                field_path: path(DemographicField::IncomeSource(source)),
            })
            .collect();

        Ok(MemberSection {
            member_key: key.to_string(),
            label: member_label(key, member)?,
            gender: d.gender,
            gender_path: path(DemographicField::Gender),
            date_of_birth: d
                .dob
                .clone()
                .unwrap_or_else(|| DEFAULT_DOB_DISPLAY.to_string()),
            date_of_birth_is_default: d.dob.is_none(),
            date_of_birth_path: path(DemographicField::DateOfBirth),
            ssn_last4: d.ssn.map(|n| format!("{n:04}")),
            ssn_path: path(DemographicField::Ssn),
            monthly_income: d.employer,
            monthly_income_path: path(DemographicField::Employer),
            income_sources,
        })
    }
}

impl StepRenderer for FamilyDemographics {
    fn title(&self) -> &'static str {
        "Family Demographics"
    }

    fn render(&self, form: &IntakeForm) -> Result<StepContent, IntakeError> {
        let sections = form
            .members()
            .map(|(key, member)| Self::section(key, member))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StepContent::FamilyDemographics {
            gender_options: Gender::ALL.iter().map(Gender::label).collect(),
            sections,
        })
    }
}

/// Read-only household summary shown before submission.
pub struct Review;

impl StepRenderer for Review {
    fn title(&self) -> &'static str {
        "Review"
    }

    fn render(&self, form: &IntakeForm) -> Result<StepContent, IntakeError> {
        let members = form
            .members()
            .map(|(key, member)| -> Result<MemberSummary, IntakeError> {
                Ok(MemberSummary {
                    member_key: key.to_string(),
                    label: member_label(key, member)?,
                    answered: member.demographics.answered_count(),
                    income_sources: member
                        .demographics
                        .income_source
                        .selected()
                        .iter()
                        .map(IncomeSource::label)
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StepContent::Review { members })
    }
}

/// Renderers keyed by step.
#[derive(Clone, Default)]
pub struct RendererSet {
    renderers: HashMap<Step, Arc<dyn StepRenderer>>,
}

impl RendererSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Family demographics and review renderers on their standard step ids.
    pub fn standard() -> Self {
        let mut set = Self::new();
        set.register(step_ids::FAMILY_DEMOGRAPHICS, Arc::new(FamilyDemographics));
        set.register(step_ids::REVIEW, Arc::new(Review));
        set
    }

    pub fn register(&mut self, step: impl Into<Step>, renderer: Arc<dyn StepRenderer>) {
        self.renderers.insert(step.into(), renderer);
    }

    /// Render `step` with its progress through `registry`.
    pub fn render(
        &self,
        form: &IntakeForm,
        registry: &StepRegistry,
        step: &Step,
    ) -> Result<RenderedStep, IntakeError> {
        let step_index = registry.index_of(step)?;
        let progress_percent = registry.progress_percent(step)?;

        let (title, content) = match self.renderers.get(step) {
            Some(renderer) => (renderer.title().to_string(), renderer.render(form)?),
            None => (step.to_string(), StepContent::External),
        };

        Ok(RenderedStep {
            step: step.clone(),
            title,
            step_index,
            step_count: registry.len(),
            progress_percent,
            content,
        })
    }
}
