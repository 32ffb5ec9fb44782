use crate::{
    volume::{AxisMismatch, Volume},
    volume_index::{SINGLE_ECHO_TIME, VolumeIndex},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use jwalk::{Parallelism, WalkDir};
use ndarray::{Array2, Array4, s};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("No non-zero echo times found")]
    NoNonZeroEchoTimes,

    #[error("Image {path} is {found:?} (rows, columns), expected {expected:?}")]
    InconsistentDimensions {
        path: PathBuf,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error(transparent)]
    Shape(#[from] AxisMismatch),
}

/// How the echo axis of a volume is formed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EchoMode {
    /// Multi-echo MR: every image carries an EchoTime and zero-echo
    /// reference images are left out.
    #[default]
    MultiEcho,
    /// CT and other single-echo series: EchoTime is not required and every
    /// image lands on the one echo column.
    SingleEcho,
}

/// Why a single file did not qualify for the volume. Never fatal for a load.
#[derive(Debug, Error)]
pub enum ScanFileError {
    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Missing required attributes: {0:?}")]
    MissingAttributes(Vec<&'static str>),

    #[error("Attribute {0} is not a finite number")]
    NonFinite(&'static str),

    #[error("Pixel data error: {0}")]
    PixelData(String),
}

/// One parsed single-frame image with the attributes the volume needs.
#[derive(Clone, Debug)]
pub struct ScanFile {
    pub path: PathBuf,
    /// Milliseconds. [`SINGLE_ECHO_TIME`] for single-echo series.
    pub echo_time: f64,
    /// Millimetres along the scan axis.
    pub slice_location: f64,
    pub rows: usize,
    pub columns: usize,
    pub pixel_spacing: (f64, f64),
    pub slice_thickness: f64,
    /// Stored pixel values, shape `(rows, columns)`.
    pub pixels: Array2<f32>,
}

impl ScanFile {
    pub fn open(path: impl AsRef<Path>, mode: EchoMode) -> Result<Self, ScanFileError> {
        let path = path.as_ref();
        let dicom_object = open_file(path)?;
        Self::from_dicom_object(path, &dicom_object, mode)
    }

    /// Extract the required attributes and the first frame from a DICOM
    /// object.
    ///
    /// # Errors
    ///
    /// Returns error listing every absent attribute, or if pixel data cannot
    /// be decoded into a `(rows, columns)` grid
    pub fn from_dicom_object(
        path: impl Into<PathBuf>,
        dicom_object: &FileDicomObject<InMemDicomObject>,
        mode: EchoMode,
    ) -> Result<Self, ScanFileError> {
        let echo_time = match mode {
            EchoMode::MultiEcho => Self::get_float(dicom_object, tags::ECHO_TIME),
            EchoMode::SingleEcho => Some(SINGLE_ECHO_TIME),
        };
        let slice_location = Self::get_float(dicom_object, tags::SLICE_LOCATION);
        let rows = Self::get_size(dicom_object, tags::ROWS);
        let columns = Self::get_size(dicom_object, tags::COLUMNS);
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()
            .and_then(|element| element.to_multi_float64().ok())
            .and_then(|spacing| Some((*spacing.first()?, *spacing.get(1)?)));
        let slice_thickness = Self::get_float(dicom_object, tags::SLICE_THICKNESS);

        let (
            Some(echo_time),
            Some(slice_location),
            Some(rows),
            Some(columns),
            Some(pixel_spacing),
            Some(slice_thickness),
        ) = (
            echo_time,
            slice_location,
            rows,
            columns,
            pixel_spacing,
            slice_thickness,
        )
        else {
            let missing = [
                ("EchoTime", echo_time.is_none()),
                ("SliceLocation", slice_location.is_none()),
                ("Rows", rows.is_none()),
                ("Columns", columns.is_none()),
                ("PixelSpacing", pixel_spacing.is_none()),
                ("SliceThickness", slice_thickness.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, is_missing)| is_missing.then_some(name))
            .collect();
            return Err(ScanFileError::MissingAttributes(missing));
        };

        for (name, value) in [
            ("EchoTime", echo_time),
            ("SliceLocation", slice_location),
            ("PixelSpacing", pixel_spacing.0),
            ("PixelSpacing", pixel_spacing.1),
            ("SliceThickness", slice_thickness),
        ] {
            if !value.is_finite() {
                return Err(ScanFileError::NonFinite(name));
            }
        }

        let pixels = Self::decode_image(dicom_object)?;
        if pixels.dim() != (rows, columns) {
            return Err(ScanFileError::PixelData(format!(
                "decoded {:?}, header declares {:?}",
                pixels.dim(),
                (rows, columns)
            )));
        }

        Ok(Self {
            path: path.into(),
            echo_time,
            slice_location,
            rows,
            columns,
            pixel_spacing,
            slice_thickness,
            pixels,
        })
    }

    fn get_float(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn get_size(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<usize> {
        dicom_object
            .element(tag)
            .ok()?
            .to_int::<u16>()
            .ok()
            .map(usize::from)
    }

    fn decode_image(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Array2<f32>, ScanFileError> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| ScanFileError::PixelData(e.to_string()))?;
        // Stored values, as acquired: no rescale and no windowing.
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|e| ScanFileError::PixelData(e.to_string()))
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a multi-echo volume from every DICOM file below `path`.
    ///
    /// Files that cannot be parsed or lack a required attribute are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if the path is missing or not a directory, if no file
    /// qualifies, if every echo time is zero, or if image dimensions differ
    pub fn load(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        Self::load_with_mode(path.as_ref(), EchoMode::MultiEcho)
    }

    /// Load a series without an echo dimension, such as CT, as a volume with
    /// one echo column. EchoTime is neither required nor read.
    ///
    /// # Errors
    ///
    /// Same as [`VolumeLoader::load`], except that echo times are never
    /// rejected
    pub fn load_single_echo(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        Self::load_with_mode(path.as_ref(), EchoMode::SingleEcho)
    }

    fn load_with_mode(path: &Path, mode: EchoMode) -> Result<Volume, VolumeLoaderError> {
        info!(path = %path.display(), ?mode, "Loading DICOM series");

        if !path.exists() {
            return Err(VolumeLoaderError::NotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(VolumeLoaderError::NotADirectory(path.to_path_buf()));
        }

        let paths = Self::discover_files(path);
        debug!(path = %path.display(), files = paths.len(), "Discovered candidate files");

        Self::load_from_file_paths(&paths, mode).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to load volume");
        })
    }

    /// Load a volume from an explicit list of files
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        mode: EchoMode,
    ) -> Result<Volume, VolumeLoaderError> {
        let scans: Vec<_> = paths
            .iter()
            .filter_map(|path| {
                let path = path.as_ref();
                match ScanFile::open(path, mode) {
                    Ok(scan) => {
                        debug!(path = %path.display(), "Read DICOM file");
                        Some(scan)
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping file");
                        None
                    }
                }
            })
            .collect();

        Self::assemble(scans, mode)
    }

    /// Arrange parsed scans into a volume.
    ///
    /// Dimensions, pixel spacing and slice thickness come from the first
    /// scan. When two scans share a `(slice, echo)` coordinate the later one
    /// wins and the discarded file is logged.
    pub fn assemble(scans: Vec<ScanFile>, mode: EchoMode) -> Result<Volume, VolumeLoaderError> {
        let Some(first) = scans.first() else {
            return Err(VolumeLoaderError::NoValidImages);
        };
        info!(count = scans.len(), "Found valid DICOM files");

        let slice_locations = scans.iter().map(|scan| scan.slice_location);
        let index = match mode {
            EchoMode::MultiEcho => VolumeIndex::from_acquisitions(
                scans.iter().map(|scan| scan.echo_time),
                slice_locations,
            ),
            EchoMode::SingleEcho => VolumeIndex::single_echo(slice_locations),
        };
        if index.num_echoes() == 0 {
            return Err(VolumeLoaderError::NoNonZeroEchoTimes);
        }
        info!(echo_times = ?index.echo_times(), slices = index.num_slices(), "Built volume index");

        let (rows, columns) = (first.rows, first.columns);
        let pixel_spacing = first.pixel_spacing;
        let slice_thickness = first.slice_thickness;
        info!(
            rows,
            columns,
            ?pixel_spacing,
            slice_thickness,
            "Volume constants taken from {}",
            first.path.display()
        );

        Self::validate_dimensions(&scans, (rows, columns))?;
        Self::check_spacing(&scans, pixel_spacing, slice_thickness);

        let volume_array = Self::build_volume_array(&scans, &index, (rows, columns));
        let volume = Volume::new(volume_array, index, pixel_spacing, slice_thickness)?;

        let empty_planes = volume.empty_planes();
        if !empty_planes.is_empty() {
            warn!(
                ?empty_planes,
                "Volume contains all-zero (slice, echo) planes, some slices might be missing"
            );
        }

        Ok(volume)
    }

    fn discover_files(root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .parallelism(Parallelism::Serial)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Failed to read directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path())
            .collect()
    }

    fn validate_dimensions(
        scans: &[ScanFile],
        expected: (usize, usize),
    ) -> Result<(), VolumeLoaderError> {
        match scans.iter().find(|scan| scan.pixels.dim() != expected) {
            Some(scan) => Err(VolumeLoaderError::InconsistentDimensions {
                path: scan.path.clone(),
                expected,
                found: scan.pixels.dim(),
            }),
            None => Ok(()),
        }
    }

    fn check_spacing(scans: &[ScanFile], pixel_spacing: (f64, f64), slice_thickness: f64) {
        for scan in scans {
            if scan.pixel_spacing != pixel_spacing || scan.slice_thickness != slice_thickness {
                warn!(
                    path = %scan.path.display(),
                    pixel_spacing = ?scan.pixel_spacing,
                    slice_thickness = scan.slice_thickness,
                    "Spacing differs from the first file; volume-wide values are kept"
                );
            }
        }
    }

    fn build_volume_array(
        scans: &[ScanFile],
        index: &VolumeIndex,
        (rows, columns): (usize, usize),
    ) -> Array4<f32> {
        let (num_slices, num_echoes) = (index.num_slices(), index.num_echoes());
        let mut volume = Array4::<f32>::zeros((rows, columns, num_slices, num_echoes));
        let mut written: Vec<Option<&Path>> = vec![None; num_slices * num_echoes];

        for scan in scans {
            let Some((slice, echo)) = index.coordinate(scan.echo_time, scan.slice_location) else {
                debug!(path = %scan.path.display(), "Skipping zero echo time reference image");
                continue;
            };

            if let Some(previous) = written[slice * num_echoes + echo].replace(&scan.path) {
                warn!(
                    discarded = %previous.display(),
                    kept = %scan.path.display(),
                    slice,
                    echo,
                    "Duplicate acquisition, earlier image overwritten"
                );
            }

            volume.slice_mut(s![.., .., slice, echo]).assign(&scan.pixels);
            debug!(path = %scan.path.display(), slice, echo, "Loaded image");
        }

        volume
    }
}
