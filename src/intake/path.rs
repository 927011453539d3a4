//! Dotted field paths: `memberKey.section.field[.subkey]`.
//!
//! Rendered inputs are named with these paths and the binder resolves them
//! back to a typed field, so both sides must agree on this exact scheme.

use std::str::FromStr;

use crate::error::IntakeError;

use super::model::IncomeSource;

/// The only section a member record exposes to the binder.
pub const DEMOGRAPHICS_SECTION: &str = "demographics";

/// Shape of a field, which decides how a raw value is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    Text,
    Date,
    Number,
    Enumerated,
    BooleanSet,
}

/// A single addressable field on a member's demographics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemographicField {
    FirstName,
    DateOfBirth,
    Gender,
    /// Monthly income from employment.
    Employer,
    /// SSN, last four digits.
    Ssn,
    IncomeSource(IncomeSource),
}

impl DemographicField {
    pub fn category(&self) -> FieldCategory {
        match self {
            Self::FirstName => FieldCategory::Text,
            Self::DateOfBirth => FieldCategory::Date,
            Self::Gender => FieldCategory::Enumerated,
            Self::Employer | Self::Ssn => FieldCategory::Number,
            Self::IncomeSource(_) => FieldCategory::BooleanSet,
        }
    }

    /// Path suffix after the member key, e.g. `demographics.DOB`.
    pub fn suffix(&self) -> String {
        let field = match self {
            Self::FirstName => "first_name",
            Self::DateOfBirth => "DOB",
            Self::Gender => "gender",
            Self::Employer => "employer",
            Self::Ssn => "SSN",
            Self::IncomeSource(source) => {
                return format!("{DEMOGRAPHICS_SECTION}.income_source.{}", source.key());
            }
        };
        format!("{DEMOGRAPHICS_SECTION}.{field}")
    }
}

impl std::fmt::Display for DemographicField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// A parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub member: String,
    pub field: DemographicField,
}

impl FieldPath {
    pub fn new(member: impl Into<String>, field: DemographicField) -> Self {
        Self {
            member: member.into(),
            field,
        }
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.member, self.field.suffix())
    }
}

impl FromStr for FieldPath {
    type Err = IntakeError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| IntakeError::MalformedPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(malformed("empty segment"));
        }
        let (member, section, rest) = match segments.as_slice() {
            [member, section, rest @ ..] if !rest.is_empty() => (*member, *section, rest),
            _ => return Err(malformed("expected memberKey.section.field")),
        };
        if section != DEMOGRAPHICS_SECTION {
            return Err(malformed(&format!("unknown section {section:?}")));
        }

        let field = match rest {
            ["first_name"] => DemographicField::FirstName,
            ["DOB"] => DemographicField::DateOfBirth,
            ["gender"] => DemographicField::Gender,
            ["employer"] => DemographicField::Employer,
            ["SSN"] => DemographicField::Ssn,
            ["income_source", key] => IncomeSource::from_key(key)
                .map(DemographicField::IncomeSource)
                .ok_or_else(|| malformed(&format!("unknown income source {key:?}")))?,
            ["income_source"] => return Err(malformed("income_source needs a source key")),
            _ => return Err(malformed(&format!("unknown field {:?}", rest.join(".")))),
        };

        Ok(Self {
            member: member.to_string(),
            field,
        })
    }
}

/// Build the input name for a member field, e.g.
/// `field_path("m1", "demographics.DOB")` → `m1.demographics.DOB`.
pub fn field_path(member: &str, suffix: &str) -> String {
    format!("{member}.{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> Result<FieldPath, IntakeError> {
        path.parse()
    }

    #[test]
    fn parses_every_field() {
        let cases = [
            ("m1.demographics.first_name", DemographicField::FirstName),
            ("m1.demographics.DOB", DemographicField::DateOfBirth),
            ("m1.demographics.gender", DemographicField::Gender),
            ("m1.demographics.employer", DemographicField::Employer),
            ("m1.demographics.SSN", DemographicField::Ssn),
            (
                "m1.demographics.income_source.child_support",
                DemographicField::IncomeSource(IncomeSource::ChildSupport),
            ),
            (
                "m1.demographics.income_source.TANF",
                DemographicField::IncomeSource(IncomeSource::Tanf),
            ),
        ];
        for (path, field) in cases {
            let parsed = parse(path).unwrap();
            assert_eq!(parsed.member, "m1");
            assert_eq!(parsed.field, field);
            assert_eq!(parsed.to_string(), path, "display should round trip");
        }
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in [
            "",
            "m1",
            "m1.demographics",
            "m1..DOB",
            ".demographics.DOB",
            "m1.demographics.DOB.",
            "m1.contact.DOB",
            "m1.demographics.dob",
            "m1.demographics.income_source",
            "m1.demographics.income_source.lottery",
            "m1.demographics.DOB.extra",
            "m1.demographics.income_source.job.extra",
        ] {
            assert!(
                matches!(parse(path), Err(IntakeError::MalformedPath { .. })),
                "{path:?} should be malformed"
            );
        }
    }

    #[test]
    fn field_categories() {
        assert_eq!(DemographicField::DateOfBirth.category(), FieldCategory::Date);
        assert_eq!(DemographicField::Employer.category(), FieldCategory::Number);
        assert_eq!(DemographicField::Ssn.category(), FieldCategory::Number);
        assert_eq!(DemographicField::Gender.category(), FieldCategory::Enumerated);
        assert_eq!(
            DemographicField::IncomeSource(IncomeSource::Job).category(),
            FieldCategory::BooleanSet
        );
    }

    #[test]
    fn field_path_helper_matches_parser() {
        let name = field_path("kid", &DemographicField::IncomeSource(IncomeSource::Ssdi).suffix());
        assert_eq!(name, "kid.demographics.income_source.SSDI");
        let parsed = parse(&name).unwrap();
        assert_eq!(parsed, FieldPath::new("kid", DemographicField::IncomeSource(IncomeSource::Ssdi)));
    }
}
