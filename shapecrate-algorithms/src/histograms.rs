//! Shape distributions: histograms of random surface-point properties

use crate::sampling::SurfaceSampler;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shapecrate_core::{
    tetrahedron_volume, triangle_area, CanonicalGeometry, Histogram, Point3d, Property,
    PropertyHistogramSet, HISTOGRAM_BINS,
};

/// Configuration for [`PropertyHistogramComputer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Accepted samples per property
    pub samples: usize,
    /// Seed of the sampling RNG; each property uses `seed + property index`
    pub seed: u64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            samples: 10_000,
            seed: 0x5eed,
        }
    }
}

impl HistogramConfig {
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Value of `property` for one tuple of surface points, `None` if undefined
pub fn property_value(property: Property, points: &[Point3d; 4], centroid: &Point3d) -> Option<f64> {
    let [p, q, r, s] = points;
    match property {
        Property::D1 => Some((p - centroid).norm()),
        Property::D2 => Some((p - q).norm()),
        Property::D3 => Some(triangle_area(p, q, r).sqrt()),
        Property::D4 => Some(tetrahedron_volume(p, q, r, s).abs().cbrt()),
        Property::A3 => {
            let u = p - q;
            let v = r - q;
            let (nu, nv) = (u.norm(), v.norm());
            if nu < 1e-12 || nv < 1e-12 {
                return None;
            }
            Some((u.dot(&v) / (nu * nv)).clamp(-1.0, 1.0).acos())
        }
    }
}

/// Monte-Carlo shape-distribution histograms
#[derive(Debug, Clone, Default)]
pub struct PropertyHistogramComputer {
    config: HistogramConfig,
}

impl PropertyHistogramComputer {
    pub fn new(config: HistogramConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    /// Histograms of all five properties of `geometry`.
    ///
    /// Geometry with no surface to sample yields missing histograms.
    pub fn compute(&self, geometry: &CanonicalGeometry) -> PropertyHistogramSet {
        let mesh = geometry.mesh();
        let Some(sampler) = SurfaceSampler::new(mesh) else {
            warn!("mesh has no surface area, histograms left missing");
            return PropertyHistogramSet::missing();
        };
        let centroid = mesh.surface_centroid();

        let histograms: Vec<Histogram> = Property::ALL
            .par_iter()
            .map(|&property| self.compute_property(property, &sampler, &centroid))
            .collect();

        let mut set = PropertyHistogramSet::missing();
        for (property, histogram) in Property::ALL.into_iter().zip(histograms) {
            set.set(property, histogram);
        }
        set
    }

    fn compute_property(
        &self,
        property: Property,
        sampler: &SurfaceSampler,
        centroid: &Point3d,
    ) -> Histogram {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(property.index() as u64));
        let range = property.range();
        let max_attempts = self.config.samples.saturating_mul(4);

        let mut counts = [0u64; HISTOGRAM_BINS];
        let mut accepted = 0;
        let mut attempts = 0;
        while accepted < self.config.samples && attempts < max_attempts {
            attempts += 1;
            let points: [Point3d; 4] = sampler.sample_n(&mut rng);
            if let Some(value) = property_value(property, &points, centroid) {
                counts[Histogram::bin_index(value, range)] += 1;
                accepted += 1;
            }
        }

        if accepted < self.config.samples {
            debug!(
                "{}: accepted {} of {} samples after {} attempts",
                property.name(),
                accepted,
                self.config.samples,
                attempts
            );
        }
        Histogram::from_counts(&counts).unwrap_or_else(Histogram::missing)
    }
}
