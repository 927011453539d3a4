//! Field binder: validated, typed updates to a member's demographics.
//!
//! Each update function takes the form it mutates explicitly and touches
//! exactly one field. Values are validated before anything is written, so a
//! rejected update leaves the form unchanged.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IntakeError;

use super::model::{Demographics, Gender, IncomeSource, IntakeForm};
use super::path::{DemographicField, FieldPath};

/// `MM/DD/YYYY`. Only the shape is checked, not calendar validity.
static DATE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}/[0-9]{2}/[0-9]{4}$").expect("date pattern is valid"));

/// Largest value the last-four SSN field can hold.
const MAX_SSN_LAST4: u16 = 9999;

/// A raw value as it arrives from an input element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Number(v.into())
    }
}

fn invalid(field: DemographicField, reason: impl Into<String>) -> IntakeError {
    IntakeError::InvalidValue {
        field: field.suffix(),
        reason: reason.into(),
    }
}

fn demographics_mut<'a>(
    form: &'a mut IntakeForm,
    member: &str,
) -> Result<&'a mut Demographics, IntakeError> {
    Ok(&mut form.member_mut(member)?.demographics)
}

pub fn set_first_name(form: &mut IntakeForm, member: &str, name: &str) -> Result<(), IntakeError> {
    let demographics = demographics_mut(form, member)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(IntakeError::MissingFirstName {
            member: member.to_string(),
        });
    }
    demographics.first_name = name.to_string();
    Ok(())
}

/// Store a `MM/DD/YYYY` date verbatim. `None` clears the field.
pub fn set_date_of_birth(
    form: &mut IntakeForm,
    member: &str,
    date: Option<&str>,
) -> Result<(), IntakeError> {
    let demographics = demographics_mut(form, member)?;
    if let Some(date) = date {
        if !DATE_FORMAT.is_match(date) {
            return Err(invalid(
                DemographicField::DateOfBirth,
                format!("{date:?} is not in MM/DD/YYYY format"),
            ));
        }
    }
    demographics.dob = date.map(str::to_string);
    Ok(())
}

/// Monthly employment income. Must not be negative.
pub fn set_monthly_income(
    form: &mut IntakeForm,
    member: &str,
    amount: Option<Decimal>,
) -> Result<(), IntakeError> {
    let demographics = demographics_mut(form, member)?;
    if let Some(amount) = amount {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(invalid(
                DemographicField::Employer,
                format!("{amount} is negative"),
            ));
        }
    }
    demographics.employer = amount;
    Ok(())
}

/// Last four SSN digits, `0..=9999`.
pub fn set_ssn_last4(
    form: &mut IntakeForm,
    member: &str,
    last4: Option<u16>,
) -> Result<(), IntakeError> {
    let demographics = demographics_mut(form, member)?;
    if let Some(last4) = last4 {
        if last4 > MAX_SSN_LAST4 {
            return Err(invalid(
                DemographicField::Ssn,
                format!("{last4} has more than four digits"),
            ));
        }
    }
    demographics.ssn = last4;
    Ok(())
}

pub fn set_gender(
    form: &mut IntakeForm,
    member: &str,
    gender: Option<Gender>,
) -> Result<(), IntakeError> {
    demographics_mut(form, member)?.gender = gender;
    Ok(())
}

/// Set one income-source flag; the other flags are left alone.
pub fn set_income_source(
    form: &mut IntakeForm,
    member: &str,
    source: IncomeSource,
    value: bool,
) -> Result<(), IntakeError> {
    demographics_mut(form, member)?
        .income_source
        .set(source, value);
    Ok(())
}

/// Flip one income-source flag and return its new value.
pub fn toggle_income_source(
    form: &mut IntakeForm,
    member: &str,
    source: IncomeSource,
) -> Result<bool, IntakeError> {
    Ok(demographics_mut(form, member)?.income_source.toggle(source))
}

fn coerce_decimal(field: DemographicField, value: &FieldValue) -> Result<Decimal, IntakeError> {
    let text = match value {
        FieldValue::Number(n) => n.to_string(),
        FieldValue::Text(s) => s.trim().to_string(),
        FieldValue::Bool(_) => return Err(invalid(field, "expected a number")),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid(field, format!("{text:?} is not a number")))
}

fn coerce_ssn(value: &FieldValue) -> Result<u16, IntakeError> {
    let field = DemographicField::Ssn;
    let digits = match value {
        FieldValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(field, format!("{n} is not a non-negative integer")))?,
        FieldValue::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(field, format!("{s:?} is not a non-negative integer")))?,
        FieldValue::Bool(_) => return Err(invalid(field, "expected a number")),
    };
    u16::try_from(digits).map_err(|_| invalid(field, format!("{digits} has more than four digits")))
}

fn expect_text(field: DemographicField, value: &FieldValue) -> Result<&str, IntakeError> {
    match value {
        FieldValue::Text(s) => Ok(s.as_str()),
        _ => Err(invalid(field, "expected text")),
    }
}

/// Apply a raw value to the field addressed by `path`.
///
/// `None` clears optional fields. Numeric fields accept numbers or numeric
/// strings; income-source flags require a boolean.
pub fn apply(
    form: &mut IntakeForm,
    path: &FieldPath,
    value: Option<&FieldValue>,
) -> Result<(), IntakeError> {
    let member = path.member.as_str();
    let field = path.field;

    match (field, value) {
        (DemographicField::FirstName, Some(v)) => set_first_name(form, member, expect_text(field, v)?)?,
        (DemographicField::FirstName, None) => {
            return Err(IntakeError::MissingFirstName {
                member: member.to_string(),
            });
        }
        (DemographicField::DateOfBirth, Some(v)) => {
            let date = expect_text(field, v)?.trim();
            // A cleared date picker reports an empty string.
            let date = (!date.is_empty()).then_some(date);
            set_date_of_birth(form, member, date)?
        }
        (DemographicField::DateOfBirth, None) => set_date_of_birth(form, member, None)?,
        (DemographicField::Gender, Some(v)) => {
            let gender = Gender::from_str(expect_text(field, v)?)?;
            set_gender(form, member, Some(gender))?
        }
        (DemographicField::Gender, None) => set_gender(form, member, None)?,
        (DemographicField::Employer, Some(v)) => {
            let amount = coerce_decimal(field, v)?;
            set_monthly_income(form, member, Some(amount))?
        }
        (DemographicField::Employer, None) => set_monthly_income(form, member, None)?,
        (DemographicField::Ssn, Some(v)) => set_ssn_last4(form, member, Some(coerce_ssn(v)?))?,
        (DemographicField::Ssn, None) => set_ssn_last4(form, member, None)?,
        (DemographicField::IncomeSource(source), Some(FieldValue::Bool(b))) => {
            set_income_source(form, member, source, *b)?
        }
        (DemographicField::IncomeSource(_), _) => {
            return Err(invalid(field, "expected true or false"));
        }
    }

    debug!(member, field = %field, "Field updated");
    Ok(())
}

/// Parse `path` and apply `value` to it.
pub fn apply_path(
    form: &mut IntakeForm,
    path: &str,
    value: Option<&FieldValue>,
) -> Result<FieldPath, IntakeError> {
    let parsed: FieldPath = path.parse()?;
    apply(form, &parsed, value)?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::model::FamilyMember;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn household() -> IntakeForm {
        let mut form = IntakeForm::new();
        form.add_member("m1", FamilyMember::new("Alice")).unwrap();
        form.add_member("m2", FamilyMember::new("Bob")).unwrap();
        form
    }

    fn filled_household() -> IntakeForm {
        let mut form = household();
        for key in ["m1", "m2"] {
            set_date_of_birth(&mut form, key, Some("03/04/1985")).unwrap();
            set_gender(&mut form, key, Some(Gender::Female)).unwrap();
            set_monthly_income(&mut form, key, Some(dec!(900))).unwrap();
            set_ssn_last4(&mut form, key, Some(1234)).unwrap();
            set_income_source(&mut form, key, IncomeSource::Ssi, true).unwrap();
        }
        form
    }

    #[test]
    fn set_income_source_sets_only_one_key() {
        let mut form = household();
        set_income_source(&mut form, "m1", IncomeSource::Job, true).unwrap();

        let sources = &form.member("m1").unwrap().demographics.income_source;
        assert!(sources.get(IncomeSource::Job));
        for other in IncomeSource::ALL.into_iter().filter(|s| *s != IncomeSource::Job) {
            assert!(!sources.is_set(other), "{other} should be unset");
        }
    }

    #[test]
    fn dob_edit_is_isolated() {
        let mut form = filled_household();
        let before = form.clone();

        apply_path(&mut form, "m1.demographics.DOB", Some(&"12/25/2001".into())).unwrap();

        let m1 = &form.member("m1").unwrap().demographics;
        let old = &before.member("m1").unwrap().demographics;
        assert_eq!(m1.dob.as_deref(), Some("12/25/2001"));
        assert_eq!(m1.gender, old.gender);
        assert_eq!(m1.employer, old.employer);
        assert_eq!(m1.ssn, old.ssn);
        assert_eq!(m1.income_source, old.income_source);
        assert_eq!(form.member("m2").unwrap(), before.member("m2").unwrap());
    }

    #[test]
    fn date_is_stored_verbatim_without_calendar_check() {
        let mut form = household();
        set_date_of_birth(&mut form, "m1", Some("02/31/2020")).unwrap();
        assert_eq!(
            form.member("m1").unwrap().demographics.dob.as_deref(),
            Some("02/31/2020")
        );
    }

    #[test]
    fn bad_date_format_is_rejected_without_change() {
        let mut form = filled_household();
        let before = form.clone();
        for bad in [
            "2020-01-01",
            "1/1/2020",
            "01/01/20",
            "tomorrow",
            "٠١/٠١/٢٠٢٠",
        ] {
            let err = set_date_of_birth(&mut form, "m1", Some(bad)).unwrap_err();
            assert!(matches!(err, IntakeError::InvalidValue { .. }), "{bad}");
        }
        assert_eq!(form, before);
    }

    #[test]
    fn empty_date_text_clears() {
        let mut form = filled_household();
        apply_path(&mut form, "m1.demographics.DOB", Some(&"".into())).unwrap();
        assert!(form.member("m1").unwrap().demographics.dob.is_none());
    }

    #[test]
    fn numeric_fields_coerce_strings_and_numbers() {
        let mut form = household();
        apply_path(&mut form, "m1.demographics.employer", Some(&"1200.50".into())).unwrap();
        assert_eq!(
            form.member("m1").unwrap().demographics.employer,
            Some(dec!(1200.50))
        );
        apply_path(&mut form, "m1.demographics.employer", Some(&FieldValue::from(800))).unwrap();
        assert_eq!(form.member("m1").unwrap().demographics.employer, Some(dec!(800)));

        apply_path(&mut form, "m1.demographics.SSN", Some(&"0042".into())).unwrap();
        assert_eq!(form.member("m1").unwrap().demographics.ssn, Some(42));
        apply_path(&mut form, "m1.demographics.SSN", Some(&FieldValue::from(9999))).unwrap();
        assert_eq!(form.member("m1").unwrap().demographics.ssn, Some(9999));

        apply_path(&mut form, "m1.demographics.SSN", None).unwrap();
        assert!(form.member("m1").unwrap().demographics.ssn.is_none());
    }

    #[test]
    fn numeric_validation() {
        let mut form = household();
        let before = form.clone();
        let rejected = [
            ("m1.demographics.employer", FieldValue::from(-5)),
            ("m1.demographics.employer", FieldValue::from("lots")),
            ("m1.demographics.employer", FieldValue::from(true)),
            ("m1.demographics.SSN", FieldValue::from(10000)),
            ("m1.demographics.SSN", FieldValue::from(-1)),
            ("m1.demographics.SSN", FieldValue::from("12a4")),
        ];
        for (path, value) in rejected {
            let err = apply_path(&mut form, path, Some(&value)).unwrap_err();
            assert!(
                matches!(err, IntakeError::InvalidValue { .. }),
                "{path} = {value:?} gave {err}"
            );
        }
        assert_eq!(form, before);
    }

    #[test]
    fn zero_income_is_allowed() {
        let mut form = household();
        set_monthly_income(&mut form, "m1", Some(dec!(0))).unwrap();
        assert_eq!(form.member("m1").unwrap().demographics.employer, Some(dec!(0)));
    }

    #[test]
    fn gender_is_checked_against_closed_set() {
        let mut form = household();
        apply_path(&mut form, "m2.demographics.gender", Some(&"Decline to Answer".into())).unwrap();
        assert_eq!(
            form.member("m2").unwrap().demographics.gender,
            Some(Gender::DeclineToAnswer)
        );
        let err = apply_path(&mut form, "m2.demographics.gender", Some(&"Other".into())).unwrap_err();
        assert!(matches!(err, IntakeError::InvalidValue { .. }));
        assert_eq!(
            form.member("m2").unwrap().demographics.gender,
            Some(Gender::DeclineToAnswer)
        );
    }

    #[test]
    fn income_source_requires_bool() {
        let mut form = household();
        apply_path(
            &mut form,
            "m1.demographics.income_source.child_support",
            Some(&true.into()),
        )
        .unwrap();
        assert!(form
            .member("m1")
            .unwrap()
            .demographics
            .income_source
            .get(IncomeSource::ChildSupport));

        for value in [None, Some(FieldValue::from("yes"))] {
            let err = apply_path(&mut form, "m1.demographics.income_source.job", value.as_ref())
                .unwrap_err();
            assert!(matches!(err, IntakeError::InvalidValue { .. }));
        }
    }

    #[test]
    fn first_name_cannot_be_blanked() {
        let mut form = household();
        apply_path(&mut form, "m1.demographics.first_name", Some(&" Alicia ".into())).unwrap();
        assert_eq!(form.member("m1").unwrap().first_name(), "Alicia");
        for value in [None, Some(FieldValue::from("   "))] {
            let err = apply_path(&mut form, "m1.demographics.first_name", value.as_ref())
                .unwrap_err();
            assert!(matches!(err, IntakeError::MissingFirstName { .. }));
        }
        assert_eq!(form.member("m1").unwrap().first_name(), "Alicia");
    }

    #[test]
    fn unknown_member_fails_without_touching_others() {
        let mut form = filled_household();
        let before = form.clone();
        let err = apply_path(&mut form, "m9.demographics.DOB", Some(&"01/01/2000".into()))
            .unwrap_err();
        assert!(matches!(err, IntakeError::MemberNotFound { ref member } if member == "m9"));
        assert_eq!(form, before);
    }

    #[test]
    fn malformed_path_is_surfaced() {
        let mut form = household();
        let before = form.clone();
        let err = apply_path(&mut form, "m1.demographics", Some(&"x".into())).unwrap_err();
        assert!(matches!(err, IntakeError::MalformedPath { .. }));
        assert_eq!(form, before);
    }

    #[test]
    fn field_value_deserializes_untagged() {
        let v: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, FieldValue::Bool(true));
        let v: FieldValue = serde_json::from_str("12.5").unwrap();
        assert!(matches!(v, FieldValue::Number(_)));
        let v: FieldValue = serde_json::from_str("\"01/01/2020\"").unwrap();
        assert_eq!(v, FieldValue::Text("01/01/2020".into()));
    }

    fn arb_source() -> impl Strategy<Value = IncomeSource> {
        prop::sample::select(IncomeSource::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn double_toggle_restores_value(
            source in arb_source(),
            preset in prop::option::of(any::<bool>()),
        ) {
            let mut form = household();
            if let Some(v) = preset {
                set_income_source(&mut form, "m1", source, v).unwrap();
            }
            let original = form.member("m1").unwrap().demographics.income_source.get(source);
            toggle_income_source(&mut form, "m1", source).unwrap();
            toggle_income_source(&mut form, "m1", source).unwrap();
            let after = form.member("m1").unwrap().demographics.income_source.get(source);
            prop_assert_eq!(after, original);
        }

        #[test]
        fn dob_edits_never_leak(month in 1u32..=12, day in 1u32..=28, year in 1900u32..2030) {
            let mut form = filled_household();
            let before = form.clone();
            let date = format!("{month:02}/{day:02}/{year}");
            set_date_of_birth(&mut form, "m2", Some(&date)).unwrap();

            let mut expected = before.clone();
            expected.member_mut("m2").unwrap().demographics.dob = Some(date);
            prop_assert_eq!(form, expected);
        }
    }
}
