//! Shape signature types: raw features, normalization diagnostics,
//! scalar descriptors and property histograms.
//!
//! Missing numeric values are represented by the non-finite [`MISSING`]
//! sentinel and never by zero.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Sentinel for a value that is not available
pub const MISSING: f64 = f64::NAN;

/// Number of bins in every property histogram
pub const HISTOGRAM_BINS: usize = 20;

/// Whether a value carries data (i.e. is not the missing sentinel)
#[inline]
pub fn is_present(value: f64) -> bool {
    value.is_finite()
}

/// Raw geometric measurements of a canonical mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFeatures {
    pub vertex_count: usize,
    pub face_count: usize,
    pub surface_area: f64,
    /// Only defined for watertight meshes
    pub volume: f64,
    pub hull_surface_area: f64,
    pub hull_volume: f64,
    pub bbox_min: [f64; 3],
    pub bbox_max: [f64; 3],
    pub is_watertight: bool,
    /// Largest distance between two convex hull vertices
    pub diameter: f64,
}

impl Default for RawFeatures {
    fn default() -> Self {
        Self {
            vertex_count: 0,
            face_count: 0,
            surface_area: MISSING,
            volume: MISSING,
            hull_surface_area: MISSING,
            hull_volume: MISSING,
            bbox_min: [MISSING; 3],
            bbox_max: [MISSING; 3],
            is_watertight: false,
            diameter: MISSING,
        }
    }
}

impl RawFeatures {
    /// Volume of the axis-aligned bounding box
    pub fn bbox_volume(&self) -> f64 {
        (0..3)
            .map(|i| self.bbox_max[i] - self.bbox_min[i])
            .product()
    }
}

/// Per-shape record of what pose normalization did
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationDiagnostics {
    /// Distance of the input centroid from the origin before translation
    pub distance_to_center: f64,
    /// Uniform scale factor that was applied
    pub scale_factor: f64,
    /// Mean |cos| between the canonical axes and the principal axes of the output, 1 when aligned
    pub alignment_score: f64,
    /// Number of axes whose flip moment is non-negative in the output
    pub oriented_axes: usize,
    /// PCA eigenvalues of the canonical shape, sorted descending
    pub eigenvalues: [f64; 3],
}

/// Scalar descriptors, in their fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Descriptor {
    SurfaceArea,
    Compactness,
    Rectangularity,
    Diameter,
    Eccentricity,
    Convexity,
    MajorEccentricity,
    MinorEccentricity,
}

/// Number of scalar descriptors
pub const DESCRIPTOR_COUNT: usize = 8;

impl Descriptor {
    pub const ALL: [Descriptor; DESCRIPTOR_COUNT] = [
        Descriptor::SurfaceArea,
        Descriptor::Compactness,
        Descriptor::Rectangularity,
        Descriptor::Diameter,
        Descriptor::Eccentricity,
        Descriptor::Convexity,
        Descriptor::MajorEccentricity,
        Descriptor::MinorEccentricity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Descriptor::SurfaceArea => "surface_area",
            Descriptor::Compactness => "compactness",
            Descriptor::Rectangularity => "rectangularity",
            Descriptor::Diameter => "diameter",
            Descriptor::Eccentricity => "eccentricity",
            Descriptor::Convexity => "convexity",
            Descriptor::MajorEccentricity => "major_eccentricity",
            Descriptor::MinorEccentricity => "minor_eccentricity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-order descriptor values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DescriptorVector {
    pub values: [f64; DESCRIPTOR_COUNT],
}

impl DescriptorVector {
    /// A vector with every descriptor missing
    pub fn missing() -> Self {
        Self {
            values: [MISSING; DESCRIPTOR_COUNT],
        }
    }

    pub fn from_values(values: [f64; DESCRIPTOR_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, descriptor: Descriptor) -> f64 {
        self.values[descriptor.index()]
    }

    pub fn set(&mut self, descriptor: Descriptor, value: f64) {
        self.values[descriptor.index()] = value;
    }

    /// (descriptor, value) pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (Descriptor, f64)> + '_ {
        Descriptor::ALL.into_iter().map(move |d| (d, self.get(d)))
    }

    /// Whether every descriptor is present
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| is_present(*v))
    }
}

/// Mean and standard deviation of one descriptor over the reference corpus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DescriptorParams {
    pub mean: f64,
    pub std: f64,
}

/// Sampled shape properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Property {
    /// Distance from the centroid to a surface point
    D1,
    /// Distance between two surface points
    D2,
    /// Square root of the area of a triangle of surface points
    D3,
    /// Cube root of the volume of a tetrahedron of surface points
    D4,
    /// Angle between three surface points
    A3,
}

/// Number of sampled properties
pub const PROPERTY_COUNT: usize = 5;

impl Property {
    pub const ALL: [Property; PROPERTY_COUNT] =
        [Property::D1, Property::D2, Property::D3, Property::D4, Property::A3];

    pub fn name(self) -> &'static str {
        match self {
            Property::D1 => "D1",
            Property::D2 => "D2",
            Property::D3 => "D3",
            Property::D4 => "D4",
            Property::A3 => "A3",
        }
    }

    /// Number of surface points one sample consumes
    pub fn arity(self) -> usize {
        match self {
            Property::D1 => 1,
            Property::D2 => 2,
            Property::D3 | Property::A3 => 3,
            Property::D4 => 4,
        }
    }

    /// Value range for a shape whose bounding box has unit max extent
    pub fn range(self) -> (f64, f64) {
        match self {
            Property::D1 => (0.0, 3.0_f64.sqrt() / 2.0),
            Property::D2 => (0.0, 3.0_f64.sqrt()),
            Property::D3 => (0.0, 1.0),
            Property::D4 => (0.0, (1.0_f64 / 3.0).cbrt()),
            Property::A3 => (0.0, PI),
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Normalized frequencies over fixed bin edges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bins: [f64; HISTOGRAM_BINS],
}

impl Histogram {
    /// A histogram flagged as missing
    pub fn missing() -> Self {
        Self {
            bins: [MISSING; HISTOGRAM_BINS],
        }
    }

    /// Bin index of `value` within `range`; out-of-range values land in the edge bins
    pub fn bin_index(value: f64, range: (f64, f64)) -> usize {
        let (lo, hi) = range;
        let t = (value - lo) / (hi - lo);
        if !(t > 0.0) {
            return 0;
        }
        ((t * HISTOGRAM_BINS as f64) as usize).min(HISTOGRAM_BINS - 1)
    }

    /// Normalize raw counts by their total; `None` when nothing was counted
    pub fn from_counts(counts: &[u64; HISTOGRAM_BINS]) -> Option<Self> {
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return None;
        }
        let mut bins = [0.0; HISTOGRAM_BINS];
        for (bin, &count) in bins.iter_mut().zip(counts.iter()) {
            *bin = count as f64 / total as f64;
        }
        Some(Self { bins })
    }

    pub fn is_missing(&self) -> bool {
        self.bins.iter().any(|b| !is_present(*b))
    }

    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }
}

/// The five property histograms of one shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyHistogramSet {
    pub histograms: [Histogram; PROPERTY_COUNT],
}

impl PropertyHistogramSet {
    pub fn missing() -> Self {
        Self {
            histograms: [Histogram::missing(); PROPERTY_COUNT],
        }
    }

    pub fn get(&self, property: Property) -> &Histogram {
        &self.histograms[property.index()]
    }

    pub fn set(&mut self, property: Property, histogram: Histogram) {
        self.histograms[property.index()] = histogram;
    }

    /// (property, histogram) pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (Property, &Histogram)> + '_ {
        Property::ALL.into_iter().map(move |p| (p, self.get(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_features_are_missing_not_zero() {
        let f = RawFeatures::default();
        assert!(!is_present(f.surface_area));
        assert!(!is_present(f.volume));
        assert!(!is_present(f.diameter));
        assert!(!is_present(f.bbox_volume()));
    }

    #[test]
    fn test_descriptor_names_roundtrip() {
        for d in Descriptor::ALL {
            assert_eq!(Descriptor::from_name(d.name()), Some(d));
        }
        assert_eq!(Descriptor::ALL[Descriptor::Convexity.index()], Descriptor::Convexity);
        assert_eq!(Descriptor::from_name("volume"), None);
    }

    #[test]
    fn test_bin_index_clamps() {
        let range = (0.0, 1.0);
        assert_eq!(Histogram::bin_index(-0.5, range), 0);
        assert_eq!(Histogram::bin_index(0.0, range), 0);
        assert_eq!(Histogram::bin_index(0.051, range), 1);
        assert_eq!(Histogram::bin_index(1.0, range), HISTOGRAM_BINS - 1);
        assert_eq!(Histogram::bin_index(7.0, range), HISTOGRAM_BINS - 1);
        assert_eq!(Histogram::bin_index(f64::NAN, range), 0);
    }

    #[test]
    fn test_histogram_from_counts() {
        let mut counts = [0u64; HISTOGRAM_BINS];
        counts[0] = 1;
        counts[5] = 3;
        let h = Histogram::from_counts(&counts).unwrap();
        assert_relative_eq!(h.total(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(h.bins[5], 0.75);
        assert!(!h.is_missing());
        assert!(Histogram::from_counts(&[0; HISTOGRAM_BINS]).is_none());
    }

    #[test]
    fn test_property_ranges() {
        let (_, d4) = Property::D4.range();
        assert_relative_eq!(d4.powi(3), 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(Property::A3.arity(), 3);
        assert!(PropertyHistogramSet::missing().get(Property::D2).is_missing());
    }
}
