use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::enums::MapKind;

pub const DEFAULT_ANALYSIS_VERSION: &str = "1.0.0";

/// Derived maps and statistics for one patient/treatment pair.
///
/// Each named map is either absent or owned by the result; there is no
/// "present but empty" state distinct from an array of zero length.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisResult {
    pub patient_id: String,
    pub treatment_id: String,
    maps: BTreeMap<MapKind, ArrayD<f64>>,
    pub analysis_date: NaiveDateTime,
    /// Seconds.
    pub analysis_duration: Option<f64>,
    pub analysis_version: String,
    pub stats: BTreeMap<String, f64>,
}

/// Scalar fields persisted next to the array container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub patient_id: String,
    pub treatment_id: String,
    #[serde(default)]
    pub analysis_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub analysis_duration: Option<f64>,
    #[serde(default = "default_version")]
    pub analysis_version: String,
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    #[serde(default)]
    pub is_complete: bool,
}

fn default_version() -> String {
    DEFAULT_ANALYSIS_VERSION.to_string()
}

impl AnalysisResult {
    pub fn new(patient_id: impl Into<String>, treatment_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            treatment_id: treatment_id.into(),
            maps: BTreeMap::new(),
            analysis_date: Local::now().naive_local(),
            analysis_duration: None,
            analysis_version: default_version(),
            stats: BTreeMap::new(),
        }
    }

    pub fn with_map(mut self, kind: MapKind, array: ArrayD<f64>) -> Self {
        self.set_map(kind, array);
        self
    }

    pub fn set_map(&mut self, kind: MapKind, array: ArrayD<f64>) -> Option<ArrayD<f64>> {
        self.maps.insert(kind, array)
    }

    pub fn take_map(&mut self, kind: MapKind) -> Option<ArrayD<f64>> {
        self.maps.remove(&kind)
    }

    pub fn map(&self, kind: MapKind) -> Option<&ArrayD<f64>> {
        self.maps.get(&kind)
    }

    /// Present maps in [`MapKind`] order.
    pub fn maps(&self) -> impl Iterator<Item = (MapKind, &ArrayD<f64>)> {
        self.maps.iter().map(|(kind, array)| (*kind, array))
    }

    pub fn display_name(&self) -> String {
        format!("{}_{}_results", self.patient_id, self.treatment_id)
    }

    /// Pre/post TE0 maps, their delta and the CT volume are all present.
    pub fn is_complete(&self) -> bool {
        MapKind::REQUIRED
            .iter()
            .all(|kind| self.maps.contains_key(kind))
    }

    /// Mean, standard deviation and range of the delta maps, ignoring NaN.
    /// Empty unless the result is complete.
    pub fn summary_stats(&self) -> BTreeMap<String, f64> {
        let mut stats = BTreeMap::new();
        if !self.is_complete() {
            return stats;
        }

        if let Some(summary) = self.map(MapKind::DeltaTe0).and_then(Summary::of) {
            stats.insert("delta_te0_mean".to_string(), summary.mean);
            stats.insert("delta_te0_std".to_string(), summary.std);
            stats.insert("delta_te0_min".to_string(), summary.min);
            stats.insert("delta_te0_max".to_string(), summary.max);
        }
        if let Some(summary) = self.map(MapKind::DeltaIron).and_then(Summary::of) {
            stats.insert("delta_iron_mean".to_string(), summary.mean);
            stats.insert("delta_iron_std".to_string(), summary.std);
        }

        stats
    }

    pub fn metadata(&self) -> AnalysisMetadata {
        AnalysisMetadata {
            patient_id: self.patient_id.clone(),
            treatment_id: self.treatment_id.clone(),
            analysis_date: Some(self.analysis_date),
            analysis_duration: self.analysis_duration,
            analysis_version: self.analysis_version.clone(),
            stats: self.stats.clone(),
            is_complete: self.is_complete(),
        }
    }

    /// Overwrite scalar fields from persisted metadata. Identifiers and maps
    /// are left untouched.
    pub fn apply_metadata(&mut self, metadata: AnalysisMetadata) {
        if let Some(date) = metadata.analysis_date {
            self.analysis_date = date;
        }
        self.analysis_duration = metadata.analysis_duration;
        self.analysis_version = metadata.analysis_version;
        self.stats = metadata.stats;
    }
}

struct Summary {
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
}

impl Summary {
    /// Population statistics over the non-NaN entries; `None` if there are none.
    fn of(array: &ArrayD<f64>) -> Option<Self> {
        let values: Vec<f64> = array.iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            mean,
            std: variance.sqrt(),
            min,
            max,
        })
    }
}
