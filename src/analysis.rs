//! The seam between volume loading and the relaxometry mathematics.
//!
//! The quantitative maps are produced by an [`AnalysisCapability`] supplied
//! by the caller. [`run_treatment_analysis`] drives one treatment through
//! loading, analysis and persistence, keeping the stored treatment status in
//! step. It runs synchronously; cancellation means abandoning the call.

use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, info_span};

use crate::entities::{AnalysisResult, Treatment};
use crate::enums::TreatmentStatus;
use crate::store::RepositoryStore;
use crate::volume::Volume;
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Treatment {0} has a blank patient or treatment identifier")]
    InvalidTreatment(String),

    #[error("Treatment {treatment} has no {input} folder")]
    MissingFolder {
        treatment: String,
        input: &'static str,
    },

    #[error("Failed to load {input} volume: {source}")]
    Load {
        input: &'static str,
        #[source]
        source: VolumeLoaderError,
    },

    #[error("Analysis failed: {0}")]
    Capability(String),

    #[error("Result is for {found}, expected {expected}")]
    IdentifierMismatch { expected: String, found: String },

    #[error("Failed to persist result for {0}")]
    Persist(String),

    #[error("Failed to record status {status} for treatment {treatment}")]
    StatusNotSaved {
        treatment: String,
        status: TreatmentStatus,
    },
}

/// Volumes handed to an analysis, all produced by [`VolumeLoader`]. The CT
/// volume has a single echo column.
pub struct AnalysisInput<'a> {
    pub patient_id: &'a str,
    pub treatment_id: &'a str,
    pub pre: &'a Volume,
    pub post: &'a Volume,
    pub ct: Option<&'a Volume>,
}

/// Turns pre/post MRI volumes (and optionally CT) into an analysis result.
pub trait AnalysisCapability {
    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<AnalysisResult, AnalysisError>;
}

impl<F> AnalysisCapability for F
where
    F: Fn(&AnalysisInput<'_>) -> Result<AnalysisResult, AnalysisError>,
{
    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<AnalysisResult, AnalysisError> {
        self(input)
    }
}

/// Load the treatment's volumes, run the analysis and store the result.
///
/// The treatment is saved as `processing` before loading and as `completed`
/// or `failed` afterwards. Statistics are filled in when the result is
/// complete.
///
/// # Errors
///
/// Returns error if the treatment is invalid or lacks its MRI folders, a
/// volume fails to load, the capability fails, or the result cannot be saved.
/// A successful analysis whose `completed` status cannot be stored is
/// reported as [`AnalysisError::StatusNotSaved`]; the result itself is kept
pub fn run_treatment_analysis(
    store: &RepositoryStore,
    treatment: &mut Treatment,
    capability: &impl AnalysisCapability,
) -> Result<AnalysisResult, AnalysisError> {
    let span = info_span!(
        "analysis",
        patient_id = %treatment.patient_id,
        treatment_id = %treatment.treatment_id
    );
    let _guard = span.enter();

    if !treatment.validate() {
        return Err(AnalysisError::InvalidTreatment(treatment.display_name()));
    }

    treatment.status = TreatmentStatus::Processing;
    if !store.save_treatment(treatment) {
        treatment.status = TreatmentStatus::Failed;
        return Err(AnalysisError::StatusNotSaved {
            treatment: treatment.display_name(),
            status: TreatmentStatus::Processing,
        });
    }

    let outcome = analyze_treatment(store, treatment, capability);

    treatment.status = match &outcome {
        Ok(_) => TreatmentStatus::Completed,
        Err(e) => {
            error!(error = %e, "Analysis failed");
            TreatmentStatus::Failed
        }
    };
    if !store.save_treatment(treatment) && outcome.is_ok() {
        return Err(AnalysisError::StatusNotSaved {
            treatment: treatment.display_name(),
            status: treatment.status,
        });
    }

    outcome
}

fn analyze_treatment(
    store: &RepositoryStore,
    treatment: &Treatment,
    capability: &impl AnalysisCapability,
) -> Result<AnalysisResult, AnalysisError> {
    let started = Instant::now();

    let pre = load_input(treatment, treatment.mri_pre_folder.as_deref(), "pre-MRI")?;
    let post = load_input(treatment, treatment.mri_post_folder.as_deref(), "post-MRI")?;
    let ct = match treatment.ct_folder.as_deref() {
        Some(folder) => {
            info!(folder = %folder.display(), "Loading CT volume");
            let ct = VolumeLoader::load_single_echo(folder)
                .map_err(|source| AnalysisError::Load { input: "CT", source })?;
            Some(ct)
        }
        None => None,
    };

    let input = AnalysisInput {
        patient_id: &treatment.patient_id,
        treatment_id: &treatment.treatment_id,
        pre: &pre,
        post: &post,
        ct: ct.as_ref(),
    };
    let mut result = capability.analyze(&input)?;

    if result.patient_id != treatment.patient_id || result.treatment_id != treatment.treatment_id {
        return Err(AnalysisError::IdentifierMismatch {
            expected: treatment.display_name(),
            found: format!("{}_{}", result.patient_id, result.treatment_id),
        });
    }

    result.analysis_duration = Some(started.elapsed().as_secs_f64());
    if result.is_complete() {
        result.stats = result.summary_stats();
    }

    if !store.save_analysis_result(&result) {
        return Err(AnalysisError::Persist(treatment.display_name()));
    }
    info!(
        duration = ?result.analysis_duration,
        complete = result.is_complete(),
        "Analysis finished"
    );

    Ok(result)
}

fn load_input(
    treatment: &Treatment,
    folder: Option<&Path>,
    input: &'static str,
) -> Result<Volume, AnalysisError> {
    let folder = folder.ok_or_else(|| AnalysisError::MissingFolder {
        treatment: treatment.display_name(),
        input,
    })?;
    info!(input, folder = %folder.display(), "Loading input volume");
    VolumeLoader::load(folder).map_err(|source| AnalysisError::Load { input, source })
}
