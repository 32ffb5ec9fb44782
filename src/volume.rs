use crate::volume_index::VolumeIndex;

use ndarray::Array4;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::s;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Volume has {found} entries along the {axis} axis, index describes {expected}")]
pub struct AxisMismatch {
    pub axis: &'static str,
    pub expected: usize,
    pub found: usize,
}

/// A multi-echo MRI acquisition assembled into one array of shape
/// `(rows, columns, slices, echoes)`.
///
/// Created once per load and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Volume {
    data: Array4<f32>,
    index: VolumeIndex,
    pixel_spacing: (f64, f64),
    slice_thickness: f64,
}

impl Volume {
    /// # Errors
    ///
    /// Returns error if the slice or echo extent of `data` disagrees with
    /// `index`
    pub fn new(
        data: Array4<f32>,
        index: VolumeIndex,
        pixel_spacing: (f64, f64),
        slice_thickness: f64,
    ) -> Result<Self, AxisMismatch> {
        let (_, _, slices, echoes) = data.dim();
        for (axis, expected, found) in [
            ("slice", index.num_slices(), slices),
            ("echo", index.num_echoes(), echoes),
        ] {
            if expected != found {
                return Err(AxisMismatch {
                    axis,
                    expected,
                    found,
                });
            }
        }
        Ok(Self {
            data,
            index,
            pixel_spacing,
            slice_thickness,
        })
    }

    /// Get the dimensions of the volume (rows, columns, slices, echoes)
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    /// Echo times in milliseconds, ascending, zero excluded.
    pub fn echo_times(&self) -> &[f64] {
        self.index.echo_times()
    }

    /// Slice locations in millimetres, ascending.
    pub fn slice_locations(&self) -> &[f64] {
        self.index.slice_locations()
    }

    /// In-plane pixel spacing in millimetres (row, column).
    pub fn pixel_spacing(&self) -> (f64, f64) {
        self.pixel_spacing
    }

    pub fn slice_thickness(&self) -> f64 {
        self.slice_thickness
    }

    /// The 2-D image acquired at one slice and echo.
    pub fn echo_image(&self, slice: usize, echo: usize) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_plane(slice, echo) {
            return None;
        }
        Some(self.data.slice(s![.., .., slice, echo]))
    }

    /// Signal of one voxel across all echoes, the curve a relaxometry fit
    /// consumes.
    pub fn echo_series(
        &self,
        row: usize,
        column: usize,
        slice: usize,
    ) -> Option<ArrayView1<'_, f32>> {
        let (rows, columns, slices, _) = self.dim();
        if row >= rows || column >= columns || slice >= slices {
            return None;
        }
        Some(self.data.slice(s![row, column, slice, ..]))
    }

    /// `(slice, echo)` planes whose every pixel is zero.
    ///
    /// A zero pixel is a legitimate measurement, so this is advisory: a
    /// fully zero plane usually means no file supplied it.
    pub fn empty_planes(&self) -> Vec<(usize, usize)> {
        let (_, _, slices, echoes) = self.dim();
        (0..slices)
            .flat_map(|slice| (0..echoes).map(move |echo| (slice, echo)))
            .filter(|&(slice, echo)| {
                self.data
                    .slice(s![.., .., slice, echo])
                    .iter()
                    .all(|&v| v == 0.0)
            })
            .collect()
    }

    fn is_valid_plane(&self, slice: usize, echo: usize) -> bool {
        let (_, _, slices, echoes) = self.dim();
        slice < slices && echo < echoes
    }
}
