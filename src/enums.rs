use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" => Ok(Gender::Male),
            "F" => Ok(Gender::Female),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Processing state of a treatment session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentStatus {
    #[default]
    Created,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for TreatmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TreatmentStatus::Created => "created",
            TreatmentStatus::Processing => "processing",
            TreatmentStatus::Completed => "completed",
            TreatmentStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The named arrays an analysis result may carry.
///
/// The [`MapKind::name`] of each variant is the key used inside the
/// persisted array container, so renaming one breaks existing files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKind {
    Te0Pre,
    Te0Post,
    DeltaTe0,
    IronPre,
    IronPost,
    DeltaIron,
    R2Pre,
    R2Post,
    Ct,
    AlignmentMatrix,
}

impl MapKind {
    pub const ALL: [MapKind; 10] = [
        MapKind::Te0Pre,
        MapKind::Te0Post,
        MapKind::DeltaTe0,
        MapKind::IronPre,
        MapKind::IronPost,
        MapKind::DeltaIron,
        MapKind::R2Pre,
        MapKind::R2Post,
        MapKind::Ct,
        MapKind::AlignmentMatrix,
    ];

    /// Maps that must all be present before a result counts as complete.
    pub const REQUIRED: [MapKind; 4] = [
        MapKind::Te0Pre,
        MapKind::Te0Post,
        MapKind::DeltaTe0,
        MapKind::Ct,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MapKind::Te0Pre => "te0_pre_map",
            MapKind::Te0Post => "te0_post_map",
            MapKind::DeltaTe0 => "delta_te0_map",
            MapKind::IronPre => "iron_pre_map",
            MapKind::IronPost => "iron_post_map",
            MapKind::DeltaIron => "delta_iron_map",
            MapKind::R2Pre => "r2_pre_map",
            MapKind::R2Post => "r2_post_map",
            MapKind::Ct => "ct_data",
            MapKind::AlignmentMatrix => "alignment_matrix",
        }
    }

    pub fn from_name(name: &str) -> Option<MapKind> {
        MapKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_parses_only_m_and_f() {
        assert_eq!("M".parse::<Gender>(), Ok(Gender::Male));
        assert_eq!("F".parse::<Gender>(), Ok(Gender::Female));
        assert!("X".parse::<Gender>().is_err());
        assert!("m".parse::<Gender>().is_err());
    }

    #[test]
    fn map_names_resolve_back_to_kinds() {
        for kind in MapKind::ALL {
            assert_eq!(MapKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(MapKind::from_name("unknown_map"), None);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TreatmentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
