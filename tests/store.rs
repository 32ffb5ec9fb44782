use std::fs;

use chrono::NaiveDate;
use ndarray::{ArrayD, IxDyn, arr2};
use suma_volume::store::{MAPS_FILE, METADATA_FILE, RAW_DICOM_DIR};
use suma_volume::{
    AnalysisResult, Gender, MapKind, Patient, RepositoryStore, StoreConfig, Treatment,
    TreatmentRef, TreatmentStatus,
};
use tempfile::TempDir;

fn store() -> (TempDir, RepositoryStore) {
    let dir = TempDir::new().unwrap();
    let store = RepositoryStore::with_root(dir.path().join("Patient_data"));
    (dir, store)
}

fn volume_map(seed: f64) -> ArrayD<f64> {
    ArrayD::from_shape_fn(IxDyn(&[3, 2, 2]), |idx| {
        seed + (idx[0] * 4 + idx[1] * 2 + idx[2]) as f64 * 0.1
    })
}

#[test]
fn new_store_creates_root_and_reports() {
    let (_dir, store) = store();
    assert!(store.root().is_dir());
    assert!(store.reports_dir().is_dir());
    assert!(store.get_all_patient_ids().is_empty());
}

#[test]
fn patient_round_trip() {
    let (_dir, store) = store();
    let created = NaiveDate::from_ymd_opt(2025, 1, 26)
        .unwrap()
        .and_hms_micro_opt(9, 30, 0, 123_456)
        .unwrap();
    let patient = Patient::new("SUMA_001", Some(45), Some("F"))
        .unwrap()
        .with_created_at(created);

    assert!(store.save_patient(&patient));
    let loaded = store.load_patient("SUMA_001").unwrap();

    assert_eq!(loaded.patient_id(), "SUMA_001");
    assert_eq!(loaded.age(), Some(45));
    assert_eq!(loaded.gender(), Some(Gender::Female));
    assert_eq!(loaded.created_at(), created);
}

#[test]
fn unknown_patient_loads_with_defaults() {
    let (_dir, store) = store();
    let patient = store.load_patient("SUMA_404").unwrap();
    assert_eq!(patient.patient_id(), "SUMA_404");
    assert_eq!(patient.age(), None);
    assert_eq!(patient.gender(), None);
}

#[test]
fn corrupt_patient_file_yields_none() {
    let (_dir, store) = store();
    let folder = store.root().join("SUMA_002");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("patient_info.json"), "{ not json").unwrap();

    assert!(store.load_patient("SUMA_002").is_none());
}

#[test]
fn stored_patient_with_invalid_age_yields_none() {
    let (_dir, store) = store();
    let folder = store.root().join("SUMA_003");
    fs::create_dir_all(&folder).unwrap();
    fs::write(
        folder.join("patient_info.json"),
        r#"{"patient_id": "SUMA_003", "age": 212, "gender": "M", "created_at": null}"#,
    )
    .unwrap();

    assert!(store.load_patient("SUMA_003").is_none());
}

#[test]
fn treatment_round_trip_and_missing_treatment() {
    let (dir, store) = store();
    let mut treatment = Treatment::new("SUMA_001", "T1");
    treatment.date = NaiveDate::from_ymd_opt(2025, 2, 3)
        .unwrap()
        .and_hms_opt(8, 0, 0);
    treatment.notes = Some("Follow-up after chelation".to_string());
    treatment.mri_pre_folder = Some(dir.path().join("pre"));
    treatment.mri_post_folder = Some(dir.path().join("post"));
    treatment.ct_folder = Some(dir.path().join("ct"));
    treatment.status = TreatmentStatus::Completed;

    assert!(store.save_treatment(&treatment));
    assert_eq!(store.load_treatment("SUMA_001", "T1"), Some(treatment));
    assert_eq!(store.load_treatment("SUMA_001", "T9"), None);
}

#[test]
fn listings_are_sorted_and_skip_reports() {
    let (_dir, store) = store();
    for (patient, treatment) in [("SUMA_010", "T2"), ("SUMA_002", "T1"), ("SUMA_010", "T1")] {
        assert!(store.save_treatment(&Treatment::new(patient, treatment)));
    }
    fs::write(store.root().join("stray.txt"), "x").unwrap();

    assert_eq!(store.get_all_patient_ids(), vec!["SUMA_002", "SUMA_010"]);
    assert_eq!(store.get_patient_treatments("SUMA_010"), vec!["T1", "T2"]);
    assert!(store.get_patient_treatments("SUMA_999").is_empty());

    let all = store.get_all_treatments();
    assert_eq!(
        all,
        vec![
            TreatmentRef { patient_id: "SUMA_002".into(), treatment_id: "T1".into() },
            TreatmentRef { patient_id: "SUMA_010".into(), treatment_id: "T1".into() },
            TreatmentRef { patient_id: "SUMA_010".into(), treatment_id: "T2".into() },
        ]
    );
    assert_eq!(all[2].display_name(), "SUMA_010_T2");
}

#[test]
fn custom_reports_directory_is_excluded() {
    let dir = TempDir::new().unwrap();
    let store = RepositoryStore::new(StoreConfig {
        data_root: dir.path().to_path_buf(),
        reports_dir_name: "exports".to_string(),
    });
    assert!(store.save_patient(&Patient::new("SUMA_001", None, None).unwrap()));

    assert_eq!(store.get_all_patient_ids(), vec!["SUMA_001"]);
    assert_eq!(
        store.report_path("SUMA_001", "T1"),
        dir.path().join("exports").join("SUMA_001_T1_report.pdf")
    );
}

#[test]
fn analysis_result_round_trip_keeps_present_maps_only() {
    let (_dir, store) = store();
    let mut result = AnalysisResult::new("SUMA_001", "T1")
        .with_map(MapKind::Te0Pre, volume_map(1.0))
        .with_map(MapKind::Te0Post, volume_map(2.0))
        .with_map(MapKind::DeltaTe0, volume_map(-1.0))
        .with_map(MapKind::R2Pre, volume_map(0.5))
        .with_map(MapKind::Ct, volume_map(40.0))
        .with_map(
            MapKind::AlignmentMatrix,
            arr2(&[
                [1.0, 0.0, 0.0, 2.5],
                [0.0, 1.0, 0.0, -1.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ])
            .into_dyn(),
        );
    let mut delta = volume_map(-1.0);
    delta[[0, 0, 0]] = f64::NAN;
    result.set_map(MapKind::DeltaTe0, delta);
    result.analysis_duration = Some(12.5);
    result.analysis_version = "2.1.0".to_string();
    result.stats = result.summary_stats();

    assert!(!store.has_analysis_result("SUMA_001", "T1"));
    assert!(store.save_analysis_result(&result));
    assert!(store.has_analysis_result("SUMA_001", "T1"));

    let loaded = store.load_analysis_result("SUMA_001", "T1").unwrap();

    for kind in MapKind::ALL {
        match (result.map(kind), loaded.map(kind)) {
            (Some(saved), Some(restored)) => {
                assert_eq!(saved.shape(), restored.shape(), "{}", kind.name());
                assert!(
                    saved.iter().zip(restored.iter()).all(|(a, b)| a.to_bits() == b.to_bits()),
                    "{} differs",
                    kind.name()
                );
            }
            (None, None) => {}
            (saved, restored) => panic!(
                "{}: saved present {}, loaded present {}",
                kind.name(),
                saved.is_some(),
                restored.is_some()
            ),
        }
    }
    assert_eq!(loaded.analysis_date, result.analysis_date);
    assert_eq!(loaded.analysis_duration, Some(12.5));
    assert_eq!(loaded.analysis_version, "2.1.0");
    assert_eq!(loaded.stats.len(), result.stats.len());
    for (name, value) in &result.stats {
        assert!((loaded.stats[name] - value).abs() < 1e-12, "{name}");
    }
    assert!(loaded.is_complete());
}

#[test]
fn metadata_record_describes_the_result() {
    let (_dir, store) = store();
    let result =
        AnalysisResult::new("SUMA_001", "T1").with_map(MapKind::Te0Pre, volume_map(1.0));
    assert!(store.save_analysis_result(&result));

    let path = store.root().join("SUMA_001").join("T1").join(METADATA_FILE);
    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(metadata["patient_id"], "SUMA_001");
    assert_eq!(metadata["analysis_version"], "1.0.0");
    assert_eq!(metadata["is_complete"], false);
    assert!(metadata["analysis_date"].is_string());
}

#[test]
fn result_without_metadata_falls_back_to_defaults() {
    let (_dir, store) = store();
    let mut result =
        AnalysisResult::new("SUMA_001", "T1").with_map(MapKind::IronPre, volume_map(3.0));
    result.analysis_version = "9.9.9".to_string();
    result.analysis_duration = Some(1.0);
    assert!(store.save_analysis_result(&result));
    fs::remove_file(store.root().join("SUMA_001").join("T1").join(METADATA_FILE)).unwrap();

    let loaded = store.load_analysis_result("SUMA_001", "T1").unwrap();

    assert_eq!(loaded.map(MapKind::IronPre), result.map(MapKind::IronPre));
    assert_eq!(loaded.analysis_version, "1.0.0");
    assert_eq!(loaded.analysis_duration, None);
    assert!(loaded.stats.is_empty());
}

#[test]
fn metadata_without_arrays_is_not_a_result() {
    let (_dir, store) = store();
    let result = AnalysisResult::new("SUMA_001", "T1").with_map(MapKind::Ct, volume_map(0.0));
    assert!(store.save_analysis_result(&result));
    fs::remove_file(store.root().join("SUMA_001").join("T1").join(MAPS_FILE)).unwrap();

    assert!(!store.has_analysis_result("SUMA_001", "T1"));
    assert!(store.load_analysis_result("SUMA_001", "T1").is_none());
}

#[test]
fn corrupt_array_container_yields_none() {
    let (_dir, store) = store();
    let folder = store.root().join("SUMA_001").join("T1");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join(MAPS_FILE), b"definitely not a zip archive").unwrap();

    assert!(store.has_analysis_result("SUMA_001", "T1"));
    assert!(store.load_analysis_result("SUMA_001", "T1").is_none());
}

#[test]
fn treatment_folder_structure_is_idempotent() {
    let (_dir, store) = store();
    let first = store.create_treatment_folder_structure("SUMA_001", "T1").unwrap();
    let second = store.create_treatment_folder_structure("SUMA_001", "T1").unwrap();

    assert_eq!(first, second);
    assert!(first.join(RAW_DICOM_DIR).is_dir());
    assert_eq!(store.get_patient_treatments("SUMA_001"), vec!["T1"]);
}

#[test]
fn identifiers_cannot_escape_the_root() {
    let (_dir, store) = store();
    let outside = Treatment::new("..", "T1");

    assert!(!store.save_treatment(&outside));
    assert!(store.create_treatment_folder_structure("SUMA_001", "../T1").is_none());
    assert!(!store.has_analysis_result("a/b", "T1"));
}

#[test]
fn unwritable_metadata_leaves_no_result_behind() {
    let (_dir, store) = store();
    let folder = store.root().join("SUMA_001").join("T1");
    fs::create_dir_all(folder.join(METADATA_FILE)).unwrap();
    let result =
        AnalysisResult::new("SUMA_001", "T1").with_map(MapKind::Te0Pre, volume_map(1.0));

    assert!(!store.save_analysis_result(&result));
    assert!(!store.has_analysis_result("SUMA_001", "T1"));
    assert!(!folder.join(MAPS_FILE).exists());
    assert!(store.load_analysis_result("SUMA_001", "T1").is_none());
}
