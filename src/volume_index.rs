use std::cmp::Ordering;

/// Echo time reported by a single-echo volume such as CT.
pub const SINGLE_ECHO_TIME: f64 = 0.0;

/// Maps acquisition parameters to coordinates along the two non-spatial
/// axes of a [`Volume`](crate::volume::Volume).
///
/// Both axes are the sorted, de-duplicated values seen across the input
/// files. An echo time of exactly zero marks a reference acquisition and
/// never gets an index. Spacing between axis values is not assumed to be
/// uniform.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeIndex {
    echo_times: Vec<f64>,
    slice_locations: Vec<f64>,
}

impl VolumeIndex {
    /// Build the index from every observed echo time and slice location.
    ///
    /// Values must be finite; the loader rejects files that are not.
    pub fn from_acquisitions(
        echo_times: impl IntoIterator<Item = f64>,
        slice_locations: impl IntoIterator<Item = f64>,
    ) -> Self {
        let mut echo_times = Self::sorted_distinct(echo_times);
        echo_times.retain(|&t| t != 0.0);

        Self {
            echo_times,
            slice_locations: Self::sorted_distinct(slice_locations),
        }
    }

    /// Build the index of an acquisition without an echo dimension (CT).
    ///
    /// The echo axis holds one entry, [`SINGLE_ECHO_TIME`], which every image
    /// maps to.
    pub fn single_echo(slice_locations: impl IntoIterator<Item = f64>) -> Self {
        Self {
            echo_times: vec![SINGLE_ECHO_TIME],
            slice_locations: Self::sorted_distinct(slice_locations),
        }
    }

    fn sorted_distinct(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
        let mut values: Vec<f64> = values.into_iter().collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        values.dedup_by(|a, b| a == b);
        values
    }

    fn position(axis: &[f64], value: f64) -> Option<usize> {
        axis.binary_search_by(|probe| probe.partial_cmp(&value).unwrap_or(Ordering::Less))
            .ok()
    }

    pub fn echo_index(&self, echo_time: f64) -> Option<usize> {
        Self::position(&self.echo_times, echo_time)
    }

    pub fn slice_index(&self, slice_location: f64) -> Option<usize> {
        Self::position(&self.slice_locations, slice_location)
    }

    /// `(slice, echo)` coordinate of an acquisition, if both values are on
    /// the axes.
    pub fn coordinate(&self, echo_time: f64, slice_location: f64) -> Option<(usize, usize)> {
        Some((
            self.slice_index(slice_location)?,
            self.echo_index(echo_time)?,
        ))
    }

    pub fn num_echoes(&self) -> usize {
        self.echo_times.len()
    }

    pub fn num_slices(&self) -> usize {
        self.slice_locations.len()
    }

    pub fn echo_times(&self) -> &[f64] {
        &self.echo_times
    }

    pub fn slice_locations(&self) -> &[f64] {
        &self.slice_locations
    }
}
