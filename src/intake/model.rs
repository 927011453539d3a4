//! Intake form data model: the household and one record per family member.

use std::collections::BTreeMap;
use std::str::FromStr;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::IntakeError;

/// Gender options offered on the demographics step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    #[serde(rename = "Decline to Answer")]
    DeclineToAnswer,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::DeclineToAnswer];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::DeclineToAnswer => "Decline to Answer",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Gender {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Self::Male),
            "Female" => Ok(Self::Female),
            "Decline to Answer" | "Decline-to-Answer" => Ok(Self::DeclineToAnswer),
            other => Err(IntakeError::InvalidValue {
                field: "gender".into(),
                reason: format!("{other:?} is not one of Male, Female, Decline to Answer"),
            }),
        }
    }
}

/// A household income type. The serialized form is the data key used in
/// field paths (`job`, `TANF`, `child_support`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IncomeSource {
    #[serde(rename = "job")]
    Job,
    #[serde(rename = "TANF")]
    Tanf,
    #[serde(rename = "SSI")]
    Ssi,
    #[serde(rename = "SSDI")]
    Ssdi,
    #[serde(rename = "child_support")]
    ChildSupport,
    #[serde(rename = "other")]
    Other,
}

impl IncomeSource {
    /// Display order of the income-source checkboxes.
    pub const ALL: [IncomeSource; 6] = [
        IncomeSource::Job,
        IncomeSource::Tanf,
        IncomeSource::Ssi,
        IncomeSource::Ssdi,
        IncomeSource::ChildSupport,
        IncomeSource::Other,
    ];

    /// Key used in dotted field paths and in the serialized form.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Tanf => "TANF",
            Self::Ssi => "SSI",
            Self::Ssdi => "SSDI",
            Self::ChildSupport => "child_support",
            Self::Other => "other",
        }
    }

    /// Human-readable checkbox label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Job => "Job",
            Self::Tanf => "TANF",
            Self::Ssi => "SSI",
            Self::Ssdi => "SSDI",
            Self::ChildSupport => "Child Support",
            Self::Other => "Other",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl std::fmt::Display for IncomeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Income-source flags for one member. A key that was never set reads as
/// `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncomeSources(BTreeMap<IncomeSource, bool>);

impl IncomeSources {
    pub fn get(&self, source: IncomeSource) -> bool {
        self.0.get(&source).copied().unwrap_or(false)
    }

    /// Whether the key has ever been set, independent of its value.
    pub fn is_set(&self, source: IncomeSource) -> bool {
        self.0.contains_key(&source)
    }

    pub fn set(&mut self, source: IncomeSource, value: bool) {
        self.0.insert(source, value);
    }

    /// Flip one key and return its new value.
    pub fn toggle(&mut self, source: IncomeSource) -> bool {
        let value = !self.get(source);
        self.0.insert(source, value);
        value
    }

    /// Sources currently flagged `true`, in display order.
    pub fn selected(&self) -> Vec<IncomeSource> {
        IncomeSource::ALL
            .into_iter()
            .filter(|s| self.get(*s))
            .collect()
    }
}

/// Demographic answers for one family member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub first_name: String,
    /// Date of birth, `MM/DD/YYYY`.
    #[serde(rename = "DOB", default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// Monthly income from employment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer: Option<Decimal>,
    /// Last four digits of the social security number.
    #[serde(rename = "SSN", default, skip_serializing_if = "Option::is_none")]
    pub ssn: Option<u16>,
    #[serde(default)]
    pub income_source: IncomeSources,
}

impl Demographics {
    /// Number of optional demographic questions that have an answer.
    pub fn answered_count(&self) -> usize {
        [
            self.dob.is_some(),
            self.gender.is_some(),
            self.employer.is_some(),
            self.ssn.is_some(),
            !self.income_source.selected().is_empty(),
        ]
        .into_iter()
        .filter(|answered| *answered)
        .count()
    }
}

/// One member of the household.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub demographics: Demographics,
}

impl FamilyMember {
    pub fn new(first_name: impl Into<String>) -> Self {
        Self {
            demographics: Demographics {
                first_name: first_name.into(),
                ..Default::default()
            },
        }
    }

    pub fn first_name(&self) -> &str {
        &self.demographics.first_name
    }
}

/// The whole intake form. Members keep insertion order, which is also the
/// order they are rendered in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeForm {
    #[serde(rename = "familyMember", default)]
    pub family_member: IndexMap<String, FamilyMember>,
}

impl IntakeForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member at the end of the display order.
    pub fn add_member(
        &mut self,
        key: impl Into<String>,
        member: FamilyMember,
    ) -> Result<(), IntakeError> {
        let key = key.into();
        if key.is_empty() || key.contains('.') {
            return Err(IntakeError::InvalidValue {
                field: "member key".into(),
                reason: format!("{key:?} must be non-empty and must not contain '.'"),
            });
        }
        if member.first_name().trim().is_empty() {
            return Err(IntakeError::MissingFirstName { member: key });
        }
        if self.family_member.contains_key(&key) {
            return Err(IntakeError::DuplicateMember { member: key });
        }
        self.family_member.insert(key, member);
        Ok(())
    }

    /// Remove a member, keeping the relative order of the others.
    pub fn remove_member(&mut self, key: &str) -> Result<FamilyMember, IntakeError> {
        self.family_member
            .shift_remove(key)
            .ok_or_else(|| IntakeError::MemberNotFound {
                member: key.to_string(),
            })
    }

    pub fn member(&self, key: &str) -> Result<&FamilyMember, IntakeError> {
        self.family_member
            .get(key)
            .ok_or_else(|| IntakeError::MemberNotFound {
                member: key.to_string(),
            })
    }

    pub fn member_mut(&mut self, key: &str) -> Result<&mut FamilyMember, IntakeError> {
        self.family_member
            .get_mut(key)
            .ok_or_else(|| IntakeError::MemberNotFound {
                member: key.to_string(),
            })
    }

    /// Members in display order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &FamilyMember)> {
        self.family_member.iter().map(|(k, m)| (k.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.family_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.family_member.is_empty()
    }
}
