//! Directory-tree persistence for patients, treatments and analysis results.
//!
//! ```text
//! <root>/<patient_id>/patient_info.json
//! <root>/<patient_id>/<treatment_id>/treatment_info.json
//! <root>/<patient_id>/<treatment_id>/analyzed_maps.npz
//! <root>/<patient_id>/<treatment_id>/analysis_metadata.json
//! <root>/<patient_id>/<treatment_id>/raw_dicom/
//! <root>/Reports/<patient_id>_<treatment_id>_report.pdf
//! ```
//!
//! Every public operation of [`RepositoryStore`] logs its own failures and
//! reports them as `false`, `None` or an empty list. The store holds no state
//! besides its paths and takes no locks; callers serialize writers to the
//! same treatment directory.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use ndarray::{IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WriteNpzError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::entities::{
    AnalysisMetadata, AnalysisResult, Patient, PatientRecord, Treatment, ValidationError,
};
use crate::enums::MapKind;

pub const PATIENT_FILE: &str = "patient_info.json";
pub const TREATMENT_FILE: &str = "treatment_info.json";
pub const MAPS_FILE: &str = "analyzed_maps.npz";
pub const METADATA_FILE: &str = "analysis_metadata.json";
pub const RAW_DICOM_DIR: &str = "raw_dicom";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Array write error: {0}")]
    WriteNpz(#[from] WriteNpzError),

    #[error("Array read error: {0}")]
    ReadNpz(#[from] ReadNpzError),

    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("Identifier {0:?} is not a single path component")]
    InvalidIdentifier(String),
}

impl PersistenceError {
    /// Pipeline stage a failure belongs to, for diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            PersistenceError::Io { .. } | PersistenceError::WriteNpz(_) => "persist",
            PersistenceError::Json { .. } | PersistenceError::ReadNpz(_) => "parse",
            PersistenceError::Validation(_) | PersistenceError::InvalidIdentifier(_) => "validate",
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A `(patient, treatment)` pair found on disk.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreatmentRef {
    pub patient_id: String,
    pub treatment_id: String,
}

impl TreatmentRef {
    pub fn display_name(&self) -> String {
        format!("{}_{}", self.patient_id, self.treatment_id)
    }
}

pub struct RepositoryStore {
    root: PathBuf,
    reports_dir_name: String,
}

impl RepositoryStore {
    /// Open a store, creating the root and reports directories if needed.
    pub fn new(config: StoreConfig) -> Self {
        let store = Self {
            root: config.data_root,
            reports_dir_name: config.reports_dir_name,
        };
        store.ensure_directories();
        store
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(StoreConfig::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(&self.reports_dir_name)
    }

    pub fn ensure_directories(&self) -> bool {
        let reports_dir = self.reports_dir();
        match fs::create_dir_all(&reports_dir) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    path = %reports_dir.display(),
                    stage = "persist",
                    error = %e,
                    "Failed to create store directories"
                );
                false
            }
        }
    }

    // ---- patients ----

    pub fn save_patient(&self, patient: &Patient) -> bool {
        self.try_save_patient(patient)
            .inspect_err(|e| {
                error!(
                    patient_id = patient.patient_id(),
                    stage = e.stage(),
                    error = %e,
                    "Error saving patient"
                );
            })
            .is_ok()
    }

    fn try_save_patient(&self, patient: &Patient) -> Result<(), PersistenceError> {
        let folder = self.patient_dir(patient.patient_id())?;
        create_dir(&folder)?;
        write_json(&folder.join(PATIENT_FILE), &patient.to_record())?;
        debug!(patient_id = patient.patient_id(), "Saved patient");
        Ok(())
    }

    /// Load a patient. A patient without a stored file is returned with only
    /// its identifier set.
    pub fn load_patient(&self, patient_id: &str) -> Option<Patient> {
        self.try_load_patient(patient_id)
            .inspect_err(|e| {
                error!(patient_id, stage = e.stage(), error = %e, "Error loading patient");
            })
            .ok()
    }

    fn try_load_patient(&self, patient_id: &str) -> Result<Patient, PersistenceError> {
        let path = self.patient_dir(patient_id)?.join(PATIENT_FILE);
        if !path.exists() {
            debug!(patient_id, "No stored patient record, using defaults");
            return Ok(Patient::new(patient_id, None, None)?);
        }
        let record: PatientRecord = read_json(&path)?;
        Ok(Patient::from_record(record)?)
    }

    /// Patient directories below the root, sorted, excluding reports.
    pub fn get_all_patient_ids(&self) -> Vec<String> {
        match list_dirs(&self.root) {
            Ok(mut ids) => {
                ids.retain(|id| *id != self.reports_dir_name);
                ids
            }
            Err(e) => {
                error!(stage = "discovery", error = %e, "Error listing patients");
                Vec::new()
            }
        }
    }

    // ---- treatments ----

    pub fn save_treatment(&self, treatment: &Treatment) -> bool {
        self.try_save_treatment(treatment)
            .inspect_err(|e| {
                error!(
                    patient_id = %treatment.patient_id,
                    treatment_id = %treatment.treatment_id,
                    stage = e.stage(),
                    error = %e,
                    "Error saving treatment"
                );
            })
            .is_ok()
    }

    fn try_save_treatment(&self, treatment: &Treatment) -> Result<(), PersistenceError> {
        let folder = self.treatment_dir(&treatment.patient_id, &treatment.treatment_id)?;
        create_dir(&folder)?;
        write_json(&folder.join(TREATMENT_FILE), treatment)
    }

    /// `None` if the treatment was never saved or cannot be read.
    pub fn load_treatment(&self, patient_id: &str, treatment_id: &str) -> Option<Treatment> {
        self.try_load_treatment(patient_id, treatment_id)
            .inspect_err(|e| {
                error!(
                    patient_id,
                    treatment_id,
                    stage = e.stage(),
                    error = %e,
                    "Error loading treatment"
                );
            })
            .ok()
            .flatten()
    }

    fn try_load_treatment(
        &self,
        patient_id: &str,
        treatment_id: &str,
    ) -> Result<Option<Treatment>, PersistenceError> {
        let path = self.treatment_dir(patient_id, treatment_id)?.join(TREATMENT_FILE);
        if !path.exists() {
            debug!(patient_id, treatment_id, "Treatment not found");
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Treatment directories of one patient, sorted.
    pub fn get_patient_treatments(&self, patient_id: &str) -> Vec<String> {
        match self.patient_dir(patient_id).and_then(|dir| list_dirs(&dir)) {
            Ok(ids) => ids,
            Err(e) => {
                error!(patient_id, stage = "discovery", error = %e, "Error listing treatments");
                Vec::new()
            }
        }
    }

    pub fn get_all_treatments(&self) -> Vec<TreatmentRef> {
        self.get_all_patient_ids()
            .into_iter()
            .flat_map(|patient_id| {
                self.get_patient_treatments(&patient_id)
                    .into_iter()
                    .map(move |treatment_id| TreatmentRef {
                        patient_id: patient_id.clone(),
                        treatment_id,
                    })
            })
            .collect()
    }

    // ---- analysis results ----

    /// Write the scalar fields to a metadata record and the present maps to a
    /// compressed container.
    ///
    /// The container is written last and removed again if writing it fails,
    /// so [`RepositoryStore::has_analysis_result`] only reports results whose
    /// metadata is on disk.
    pub fn save_analysis_result(&self, result: &AnalysisResult) -> bool {
        self.try_save_analysis_result(result)
            .inspect_err(|e| {
                error!(
                    patient_id = %result.patient_id,
                    treatment_id = %result.treatment_id,
                    stage = e.stage(),
                    error = %e,
                    "Error saving analysis result"
                );
            })
            .is_ok()
    }

    fn try_save_analysis_result(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
        let folder = self.treatment_dir(&result.patient_id, &result.treatment_id)?;
        create_dir(&folder)?;

        write_json(&folder.join(METADATA_FILE), &result.metadata())?;

        let maps_path = folder.join(MAPS_FILE);
        write_maps(&maps_path, result).inspect_err(|_| match fs::remove_file(&maps_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %maps_path.display(), error = %e, "Failed to remove partial maps");
            }
        })?;

        info!(
            patient_id = %result.patient_id,
            treatment_id = %result.treatment_id,
            maps = result.maps().count(),
            "Saved analysis result"
        );
        Ok(())
    }

    /// `None` if no array container exists. A missing metadata record leaves
    /// the scalar fields at their defaults.
    pub fn load_analysis_result(
        &self,
        patient_id: &str,
        treatment_id: &str,
    ) -> Option<AnalysisResult> {
        self.try_load_analysis_result(patient_id, treatment_id)
            .inspect_err(|e| {
                error!(
                    patient_id,
                    treatment_id,
                    stage = e.stage(),
                    error = %e,
                    "Error loading analysis result"
                );
            })
            .ok()
            .flatten()
    }

    fn try_load_analysis_result(
        &self,
        patient_id: &str,
        treatment_id: &str,
    ) -> Result<Option<AnalysisResult>, PersistenceError> {
        let folder = self.treatment_dir(patient_id, treatment_id)?;
        let maps_path = folder.join(MAPS_FILE);
        if !maps_path.exists() {
            debug!(patient_id, treatment_id, "No analysis result stored");
            return Ok(None);
        }

        let mut result = AnalysisResult::new(patient_id, treatment_id);
        read_maps(&maps_path, &mut result)?;

        let metadata_path = folder.join(METADATA_FILE);
        if metadata_path.exists() {
            let metadata: AnalysisMetadata = read_json(&metadata_path)?;
            result.apply_metadata(metadata);
        } else {
            warn!(patient_id, treatment_id, "Analysis metadata missing, using defaults");
        }

        Ok(Some(result))
    }

    pub fn has_analysis_result(&self, patient_id: &str, treatment_id: &str) -> bool {
        self.treatment_dir(patient_id, treatment_id)
            .is_ok_and(|folder| folder.join(MAPS_FILE).is_file())
    }

    // ---- layout ----

    /// Ensure the treatment directory and its raw input directory exist.
    pub fn create_treatment_folder_structure(
        &self,
        patient_id: &str,
        treatment_id: &str,
    ) -> Option<PathBuf> {
        let create = || -> Result<PathBuf, PersistenceError> {
            let folder = self.treatment_dir(patient_id, treatment_id)?;
            create_dir(&folder.join(RAW_DICOM_DIR))?;
            Ok(folder)
        };
        create()
            .inspect_err(|e| {
                error!(
                    patient_id,
                    treatment_id,
                    stage = e.stage(),
                    error = %e,
                    "Error creating treatment folders"
                );
            })
            .ok()
    }

    /// Reserved location of the exported report for a treatment.
    pub fn report_path(&self, patient_id: &str, treatment_id: &str) -> PathBuf {
        self.reports_dir()
            .join(format!("{patient_id}_{treatment_id}_report.pdf"))
    }

    fn patient_dir(&self, patient_id: &str) -> Result<PathBuf, PersistenceError> {
        Ok(self.root.join(path_component(patient_id)?))
    }

    fn treatment_dir(
        &self,
        patient_id: &str,
        treatment_id: &str,
    ) -> Result<PathBuf, PersistenceError> {
        Ok(self
            .patient_dir(patient_id)?
            .join(path_component(treatment_id)?))
    }
}

fn path_component(id: &str) -> Result<&str, PersistenceError> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(id),
        _ => Err(PersistenceError::InvalidIdentifier(id.to_string())),
    }
}

fn create_dir(path: &Path) -> Result<(), PersistenceError> {
    fs::create_dir_all(path).map_err(|e| PersistenceError::io(path, e))
}

fn list_dirs(path: &Path) -> Result<Vec<String>, PersistenceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| PersistenceError::io(path, e))? {
        let entry = entry.map_err(|e| PersistenceError::io(path, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => warn!(?name, "Skipping directory with non UTF-8 name"),
        }
    }
    names.sort();
    Ok(names)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let file = File::create(path).map_err(|e| PersistenceError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| PersistenceError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let file = File::open(path).map_err(|e| PersistenceError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_maps(path: &Path, result: &AnalysisResult) -> Result<(), PersistenceError> {
    let file = File::create(path).map_err(|e| PersistenceError::io(path, e))?;
    let mut npz = NpzWriter::new_compressed(BufWriter::new(file));
    for (kind, array) in result.maps() {
        npz.add_array(kind.name(), array)?;
    }
    npz.finish()?
        .flush()
        .map_err(|e| PersistenceError::io(path, e))
}

fn read_maps(path: &Path, result: &mut AnalysisResult) -> Result<(), PersistenceError> {
    let file = File::open(path).map_err(|e| PersistenceError::io(path, e))?;
    let mut npz = NpzReader::new(BufReader::new(file))?;

    for entry in npz.names()? {
        let name = entry.strip_suffix(".npy").unwrap_or(&entry);
        let Some(kind) = MapKind::from_name(name) else {
            warn!(path = %path.display(), name, "Ignoring unknown array");
            continue;
        };

        // Arrays written by other tools may be single precision.
        let array = match npz.by_name::<OwnedRepr<f64>, IxDyn>(&entry) {
            Ok(array) => array,
            Err(ReadNpzError::Npy(_)) => npz
                .by_name::<OwnedRepr<f32>, IxDyn>(&entry)?
                .mapv(f64::from),
            Err(e) => return Err(e.into()),
        };
        result.set_map(kind, array);
    }

    Ok(())
}
