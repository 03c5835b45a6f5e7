//! Per-shape processing: normalization, features, descriptors and histograms

use crate::descriptors::{DescriptorComputer, DescriptorStats};
use crate::features::FeatureExtractor;
use crate::histograms::{HistogramConfig, PropertyHistogramComputer};
use crate::normalization::{Normalizer, NormalizerConfig};
use log::debug;
use serde::{Deserialize, Serialize};
use shapecrate_core::{Result, Shape, ShapeId, TriangleMesh};

/// Configuration for the per-shape pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pose normalization settings
    pub normalizer: NormalizerConfig,
    /// Shape distribution sampling settings
    pub histograms: HistogramConfig,
}

impl PipelineConfig {
    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_histograms(mut self, histograms: HistogramConfig) -> Self {
        self.histograms = histograms;
        self
    }
}

/// Turns a raw mesh into a [`Shape`] carrying its full signature.
///
/// The feature cache is shared by every shape processed through one
/// pipeline, so it can be used from several threads at once.
#[derive(Debug, Default)]
pub struct ShapePipeline {
    normalizer: Normalizer,
    extractor: FeatureExtractor,
    descriptors: DescriptorComputer,
    histograms: PropertyHistogramComputer,
}

impl ShapePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config.normalizer),
            extractor: FeatureExtractor::new(),
            descriptors: DescriptorComputer::new(),
            histograms: PropertyHistogramComputer::new(config.histograms),
        }
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Normalize `mesh` and compute everything except the corpus-normalized
    /// descriptors, which need fitted statistics (see [`ShapePipeline::apply_stats`]).
    ///
    /// Raw features of `id` are served from the extractor cache while the
    /// canonical geometry behind the identifier is unchanged.
    pub fn process(&self, id: ShapeId, label: impl Into<String>, mesh: &TriangleMesh) -> Result<Shape> {
        let (geometry, diagnostics) = self.normalizer.normalize(mesh)?;

        let features = self.extractor.extract(&id, &geometry);
        let raw_descriptors = self.descriptors.compute(&features, &diagnostics);
        let histograms = self.histograms.compute(&geometry);

        debug!(
            "processed {}: {} vertices, {} faces, watertight {}",
            id, features.vertex_count, features.face_count, features.is_watertight
        );

        let mut shape = Shape::new(id, label);
        shape.geometry = Some(geometry);
        shape.diagnostics = Some(diagnostics);
        shape.features = Some(features);
        shape.raw_descriptors = Some(raw_descriptors);
        shape.histograms = Some(histograms);
        Ok(shape)
    }

    /// Fill in the corpus-normalized descriptors of `shape`
    pub fn apply_stats(shape: &mut Shape, stats: &DescriptorStats) {
        shape.descriptors = shape.raw_descriptors.as_ref().map(|raw| stats.normalize(raw));
    }
}
