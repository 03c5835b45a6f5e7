//! Scalar shape descriptors and their corpus normalization

use log::debug;
use shapecrate_core::{
    is_present, Descriptor, DescriptorParams, DescriptorVector, Error, NormalizationDiagnostics,
    RawFeatures, Result, DESCRIPTOR_COUNT, MISSING,
};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Ratio of two measurements, missing unless both are present and the
/// denominator is meaningfully positive
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if is_present(numerator) && is_present(denominator) && denominator > f64::EPSILON {
        numerator / denominator
    } else {
        MISSING
    }
}

/// Turns raw features into dimensionless descriptors
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorComputer;

impl DescriptorComputer {
    pub fn new() -> Self {
        Self
    }

    /// Raw (not yet corpus-normalized) descriptors.
    ///
    /// Descriptors that need a volume are missing for open meshes, and the
    /// eccentricities are missing for flat shapes whose smallest principal
    /// variance vanishes.
    pub fn compute(
        &self,
        features: &RawFeatures,
        diagnostics: &NormalizationDiagnostics,
    ) -> DescriptorVector {
        let area = features.surface_area;
        let volume = features.volume;
        let [major, mid, minor] = diagnostics.eigenvalues;
        // Flat shapes report a round-off minor variance
        let minor = if minor > 1e-12 * major { minor } else { MISSING };

        let mut descriptors = DescriptorVector::missing();
        descriptors.set(Descriptor::SurfaceArea, area);
        descriptors.set(
            Descriptor::Compactness,
            ratio(area.powi(3), 36.0 * PI * volume * volume),
        );
        descriptors.set(
            Descriptor::Rectangularity,
            ratio(volume, features.bbox_volume()),
        );
        descriptors.set(Descriptor::Diameter, features.diameter);
        descriptors.set(Descriptor::Eccentricity, ratio(major, minor));
        descriptors.set(Descriptor::Convexity, ratio(volume, features.hull_volume));
        descriptors.set(Descriptor::MajorEccentricity, ratio(major, mid));
        descriptors.set(Descriptor::MinorEccentricity, ratio(mid, minor));
        descriptors
    }
}

/// Per-descriptor z-score parameters, fitted once on the reference corpus
/// and applied unchanged to every corpus shape and query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorStats {
    pub params: [DescriptorParams; DESCRIPTOR_COUNT],
}

impl Default for DescriptorStats {
    /// Identity parameters
    fn default() -> Self {
        Self {
            params: [DescriptorParams { mean: 0.0, std: 1.0 }; DESCRIPTOR_COUNT],
        }
    }
}

impl DescriptorStats {
    /// Fit population mean and standard deviation per descriptor over the
    /// present values.
    ///
    /// A descriptor with no present value gets a missing mean, so it stays
    /// missing after normalization. A constant descriptor gets unit std.
    pub fn fit(vectors: &[DescriptorVector]) -> Result<Self> {
        if vectors.is_empty() {
            return Err(Error::CorpusEmpty);
        }

        let mut stats = Self::default();
        for descriptor in Descriptor::ALL {
            let values: Vec<f64> = vectors
                .iter()
                .map(|v| v.get(descriptor))
                .filter(|v| is_present(*v))
                .collect();
            if values.is_empty() {
                stats.params[descriptor.index()] = DescriptorParams { mean: MISSING, std: 1.0 };
                continue;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            stats.params[descriptor.index()] = DescriptorParams {
                mean,
                std: if std > 1e-12 * mean.abs().max(1.0) { std } else { 1.0 },
            };
        }

        debug!("fitted descriptor statistics over {} shapes", vectors.len());
        Ok(stats)
    }

    pub fn get(&self, descriptor: Descriptor) -> DescriptorParams {
        self.params[descriptor.index()]
    }

    /// Z-score `raw` with these parameters; missing values stay missing
    pub fn normalize(&self, raw: &DescriptorVector) -> DescriptorVector {
        let mut out = DescriptorVector::missing();
        for (descriptor, value) in raw.iter() {
            let DescriptorParams { mean, std } = self.get(descriptor);
            if is_present(value) && is_present(mean) {
                out.set(descriptor, (value - mean) / std);
            }
        }
        out
    }

    /// Parameters keyed by descriptor name, as persisted
    pub fn to_map(&self) -> BTreeMap<String, DescriptorParams> {
        Descriptor::ALL
            .into_iter()
            .map(|d| (d.name().to_string(), self.get(d)))
            .collect()
    }

    /// Inverse of [`DescriptorStats::to_map`]; every descriptor must be present
    pub fn from_map(map: &BTreeMap<String, DescriptorParams>) -> Result<Self> {
        let mut stats = Self::default();
        for descriptor in Descriptor::ALL {
            let params = map.get(descriptor.name()).ok_or_else(|| {
                Error::InvalidData(format!("no parameters for descriptor {}", descriptor.name()))
            })?;
            stats.params[descriptor.index()] = *params;
        }
        if let Some(unknown) = map.keys().find(|k| Descriptor::from_name(k).is_none()) {
            return Err(Error::InvalidData(format!("unknown descriptor {}", unknown)));
        }
        Ok(stats)
    }
}
