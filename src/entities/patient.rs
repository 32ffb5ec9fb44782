use std::fmt;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::Gender;

/// Shortest accepted patient identifier.
#[cfg(feature = "regulated")]
pub const MIN_PATIENT_ID_LEN: usize = 8;
#[cfg(not(feature = "regulated"))]
pub const MIN_PATIENT_ID_LEN: usize = 1;

pub const MAX_AGE: i32 = 150;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Patient identifier is empty")]
    EmptyPatientId,

    #[error("Patient identifier {id:?} is shorter than {min} characters")]
    PatientIdTooShort { id: String, min: usize },

    #[error("Age {0} is outside 0..=150")]
    AgeOutOfRange(i32),

    #[error("Gender {0:?} is not one of M, F")]
    InvalidGender(String),
}

/// An anonymised patient.
///
/// Equality is identity: two patients with the same identifier are equal.
#[derive(Clone, Debug)]
pub struct Patient {
    patient_id: String,
    age: Option<u8>,
    gender: Option<Gender>,
    created_at: NaiveDateTime,
}

/// On-disk shape of a [`Patient`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_id: String,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl Patient {
    /// # Errors
    ///
    /// Returns error if the identifier is blank or too short, the age is
    /// outside `0..=150`, or the gender is not `M` or `F`
    pub fn new(
        patient_id: impl Into<String>,
        age: Option<i32>,
        gender: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let patient_id = patient_id.into();
        if patient_id.trim().is_empty() {
            return Err(ValidationError::EmptyPatientId);
        }
        if patient_id.chars().count() < MIN_PATIENT_ID_LEN {
            return Err(ValidationError::PatientIdTooShort {
                id: patient_id,
                min: MIN_PATIENT_ID_LEN,
            });
        }

        let age = match age {
            Some(age) if (0..=MAX_AGE).contains(&age) => Some(age as u8),
            Some(age) => return Err(ValidationError::AgeOutOfRange(age)),
            None => None,
        };

        let gender = gender
            .map(|code| {
                code.parse::<Gender>()
                    .map_err(ValidationError::InvalidGender)
            })
            .transpose()?;

        Ok(Self {
            patient_id,
            age,
            gender,
            created_at: Local::now().naive_local(),
        })
    }

    pub fn with_created_at(mut self, created_at: NaiveDateTime) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn age(&self) -> Option<u8> {
        self.age
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn display_name(&self) -> &str {
        &self.patient_id
    }

    pub fn to_record(&self) -> PatientRecord {
        PatientRecord {
            patient_id: self.patient_id.clone(),
            age: self.age.map(i32::from),
            gender: self.gender.map(|g| g.code().to_string()),
            created_at: Some(self.created_at),
        }
    }

    /// Rebuild a patient, re-running construction checks. A record without
    /// `created_at` gets the current time.
    pub fn from_record(record: PatientRecord) -> Result<Self, ValidationError> {
        let patient = Self::new(record.patient_id, record.age, record.gender.as_deref())?;
        Ok(match record.created_at {
            Some(created_at) => patient.with_created_at(created_at),
            None => patient,
        })
    }
}

impl PartialEq for Patient {
    fn eq(&self, other: &Self) -> bool {
        self.patient_id == other.patient_id
    }
}

impl Eq for Patient {}

impl fmt::Display for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Patient {}", self.patient_id)?;
        match (self.age, self.gender) {
            (Some(age), Some(gender)) => write!(f, " ({age}, {gender})"),
            (Some(age), None) => write!(f, " ({age})"),
            (None, Some(gender)) => write!(f, " ({gender})"),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_patient_round_trips_through_record() {
        let patient = Patient::new("SUMA_001", Some(45), Some("M")).unwrap();
        assert_eq!(patient.patient_id(), "SUMA_001");
        assert_eq!(patient.age(), Some(45));
        assert_eq!(patient.gender(), Some(Gender::Male));

        let record = patient.to_record();
        assert_eq!(record.age, Some(45));
        assert_eq!(record.gender.as_deref(), Some("M"));

        let restored = Patient::from_record(record).unwrap();
        assert_eq!(restored.patient_id(), patient.patient_id());
        assert_eq!(restored.age(), patient.age());
        assert_eq!(restored.gender(), patient.gender());
        assert_eq!(restored.created_at(), patient.created_at());
    }

    #[test]
    fn age_bounds_are_inclusive() {
        assert!(Patient::new("SUMA_001", Some(0), Some("F")).is_ok());
        assert!(Patient::new("SUMA_001", Some(150), Some("F")).is_ok());
        assert_eq!(
            Patient::new("SUMA_001", Some(-5), Some("M")).unwrap_err(),
            ValidationError::AgeOutOfRange(-5)
        );
        assert_eq!(
            Patient::new("SUMA_001", Some(151), Some("M")).unwrap_err(),
            ValidationError::AgeOutOfRange(151)
        );
    }

    #[test]
    fn invalid_gender_is_rejected() {
        assert_eq!(
            Patient::new("SUMA_001", Some(45), Some("X")).unwrap_err(),
            ValidationError::InvalidGender("X".to_string())
        );
    }

    #[test]
    fn blank_id_is_rejected() {
        assert_eq!(
            Patient::new("", Some(45), Some("M")).unwrap_err(),
            ValidationError::EmptyPatientId
        );
        assert_eq!(
            Patient::new("   ", None, None).unwrap_err(),
            ValidationError::EmptyPatientId
        );
    }

    #[cfg(feature = "regulated")]
    #[test]
    fn short_id_is_rejected_in_regulated_builds() {
        assert!(matches!(
            Patient::new("P1", Some(45), Some("M")),
            Err(ValidationError::PatientIdTooShort { min: 8, .. })
        ));
    }

    #[test]
    fn equality_is_by_identifier() {
        let a = Patient::new("SUMA_001", Some(45), Some("M")).unwrap();
        let b = Patient::new("SUMA_001", Some(45), Some("M")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn display_includes_age_and_gender() {
        let patient = Patient::new("SUMA_001", Some(45), Some("M")).unwrap();
        let text = patient.to_string();
        assert!(text.contains("SUMA_001"));
        assert!(text.contains("45"));
        assert!(text.contains('M'));
    }
}
