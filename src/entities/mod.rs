//! Patient, treatment and analysis-result records.
//!
//! Patients validate on construction and cannot exist in an invalid state.
//! Treatments are plain records checked on demand with
//! [`Treatment::validate`]. Neither performs I/O except
//! [`Treatment::has_required_folders`], which looks at the filesystem.

pub mod analysis_result;
pub mod patient;
pub mod treatment;

pub use analysis_result::{AnalysisMetadata, AnalysisResult};
pub use patient::{MIN_PATIENT_ID_LEN, Patient, PatientRecord, ValidationError};
pub use treatment::Treatment;
