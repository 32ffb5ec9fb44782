//! # SUMA volume library
//!
//! This crate assembles multi-echo MRI acquisitions into four-dimensional
//! volumes and persists the quantitative maps derived from them.
//!
//! Volumes are loaded from a directory that is searched recursively. Each
//! file is parsed with dicom-rs and only used if it carries all of:
//!  - Echo Time
//!  - Slice Location
//!  - Rows and Columns
//!  - Pixel Spacing
//!  - Slice Thickness
//!
//! Anything else in the folder is skipped with a warning. Images are placed
//! into a `(rows, columns, slice, echo)` array by the sorted position of
//! their slice location and echo time. Echo time zero is a reference
//! acquisition and is left out of the echo axis. Series without echoes,
//! such as CT, load through [`VolumeLoader::load_single_echo`], which does
//! not require Echo Time and yields a single echo column.
//!
//!  DICOM files are assumed to have the following attributes:
//!   - Single frame (always the first frame is used)
//!   - The same in-plane dimensions (a mismatch fails the load)
//!
//! Analysis results, patients and treatments are stored below one root
//! directory by [`RepositoryStore`], which never returns an error: it logs
//! and answers `false`, `None` or an empty list.
//!
//! # Examples
//!
//! ## Loading a volume and storing an analysis
//!
//! ```no_run
//! # use suma_volume::{AnalysisResult, MapKind, RepositoryStore, StoreConfig, VolumeLoader};
//! let volume = VolumeLoader::load("dicom/pre").expect("should have loaded files from directory");
//! let (rows, columns, slices, echoes) = volume.dim();
//! println!("{rows}x{columns}, {slices} slices, echo times {:?}", volume.echo_times());
//!
//! let store = RepositoryStore::new(StoreConfig::from_env());
//! let result = AnalysisResult::new("SUMA_001", "T1")
//!     .with_map(MapKind::Te0Pre, volume.data().mapv(f64::from).into_dyn());
//! assert!(store.save_analysis_result(&result));
//! ```

pub mod analysis;
pub mod config;
pub mod entities;
pub mod enums;
pub mod store;
pub mod volume;
pub mod volume_index;
pub mod volume_loader;

pub use analysis::{AnalysisCapability, AnalysisError, AnalysisInput, run_treatment_analysis};
pub use config::StoreConfig;
pub use entities::{AnalysisResult, Patient, Treatment, ValidationError};
pub use enums::{Gender, MapKind, TreatmentStatus};
pub use store::{PersistenceError, RepositoryStore, TreatmentRef};
pub use volume::{AxisMismatch, Volume};
pub use volume_index::VolumeIndex;
pub use volume_loader::{EchoMode, ScanFile, ScanFileError, VolumeLoader, VolumeLoaderError};
