use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::enums::TreatmentStatus;

/// One treatment session of a patient. `treatment_id` is unique only
/// within the patient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub patient_id: String,
    pub treatment_id: String,
    #[serde(default)]
    pub date: Option<NaiveDateTime>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub mri_pre_folder: Option<PathBuf>,
    #[serde(default)]
    pub mri_post_folder: Option<PathBuf>,
    #[serde(default)]
    pub ct_folder: Option<PathBuf>,
    #[serde(default = "now")]
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub status: TreatmentStatus,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Treatment {
    pub fn new(patient_id: impl Into<String>, treatment_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            treatment_id: treatment_id.into(),
            date: None,
            notes: None,
            mri_pre_folder: None,
            mri_post_folder: None,
            ct_folder: None,
            created_at: now(),
            status: TreatmentStatus::Created,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{}_{}", self.patient_id, self.treatment_id)
    }

    /// Directory holding this treatment's files below a store root.
    pub fn data_folder(&self, root: &Path) -> PathBuf {
        root.join(&self.patient_id).join(&self.treatment_id)
    }

    /// Both identifiers are present and not blank.
    pub fn validate(&self) -> bool {
        !self.patient_id.trim().is_empty() && !self.treatment_id.trim().is_empty()
    }

    /// All three input folders are set and exist right now.
    pub fn has_required_folders(&self) -> bool {
        [&self.mri_pre_folder, &self.mri_post_folder, &self.ct_folder]
            .into_iter()
            .all(|folder| folder.as_deref().is_some_and(Path::exists))
    }
}
