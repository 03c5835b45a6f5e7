//! Retrieval configuration and channel weights

use crate::ann::AnnConfig;
use serde::{Deserialize, Serialize};
use shapecrate_algorithms::PipelineConfig;
use shapecrate_core::{Descriptor, Error, Property, Result, DESCRIPTOR_COUNT, PROPERTY_COUNT};
use std::collections::BTreeMap;
use std::path::Path;

/// One non-negative weight per descriptor and per histogram channel.
///
/// Serialized as two tables keyed by channel name; channels left out of a
/// table keep unit weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightTable", into = "WeightTable")]
pub struct WeightVector {
    pub descriptors: [f64; DESCRIPTOR_COUNT],
    pub histograms: [f64; PROPERTY_COUNT],
}

impl Default for WeightVector {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl WeightVector {
    /// Every channel weighted `weight`
    pub fn uniform(weight: f64) -> Self {
        Self {
            descriptors: [weight; DESCRIPTOR_COUNT],
            histograms: [weight; PROPERTY_COUNT],
        }
    }

    pub fn descriptor(&self, descriptor: Descriptor) -> f64 {
        self.descriptors[descriptor.index()]
    }

    pub fn histogram(&self, property: Property) -> f64 {
        self.histograms[property.index()]
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor, weight: f64) -> Self {
        self.descriptors[descriptor.index()] = weight;
        self
    }

    pub fn with_histogram(mut self, property: Property, weight: f64) -> Self {
        self.histograms[property.index()] = weight;
        self
    }

    /// Check that every weight is finite and non-negative
    pub fn validate(&self) -> Result<()> {
        let bad = self
            .descriptors
            .iter()
            .chain(self.histograms.iter())
            .find(|w| !(w.is_finite() && **w >= 0.0));
        match bad {
            Some(w) => Err(Error::InvalidData(format!(
                "weights must be finite and non-negative, got {}",
                w
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct WeightTable {
    descriptors: BTreeMap<String, f64>,
    histograms: BTreeMap<String, f64>,
}

impl TryFrom<WeightTable> for WeightVector {
    type Error = String;

    fn try_from(table: WeightTable) -> std::result::Result<Self, Self::Error> {
        let mut weights = WeightVector::default();
        for (name, weight) in table.descriptors {
            let descriptor =
                Descriptor::from_name(&name).ok_or_else(|| format!("unknown descriptor {:?}", name))?;
            weights.descriptors[descriptor.index()] = weight;
        }
        for (name, weight) in table.histograms {
            let property = Property::ALL
                .into_iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| format!("unknown histogram {:?}", name))?;
            weights.histograms[property.index()] = weight;
        }
        Ok(weights)
    }
}

impl From<WeightVector> for WeightTable {
    fn from(weights: WeightVector) -> Self {
        Self {
            descriptors: Descriptor::ALL
                .into_iter()
                .map(|d| (d.name().to_string(), weights.descriptor(d)))
                .collect(),
            histograms: Property::ALL
                .into_iter()
                .map(|p| (p.name().to_string(), weights.histogram(p)))
                .collect(),
        }
    }
}

/// Everything a [`Retriever`](crate::Retriever) is configured with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of results
    pub k: usize,
    /// Build the approximate index on the first approximate query.
    /// When off, the index must be built explicitly first.
    pub build_index_lazily: bool,
    /// Default channel weights
    pub weights: WeightVector,
    /// Per-shape processing
    pub pipeline: PipelineConfig,
    /// Approximate index parameters
    pub ann: AnnConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 10,
            build_index_lazily: true,
            weights: WeightVector::default(),
            pipeline: PipelineConfig::default(),
            ann: AnnConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_weights(mut self, weights: WeightVector) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }

    pub fn with_lazy_index(mut self, lazy: bool) -> Self {
        self.build_index_lazily = lazy;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Parse a TOML document; omitted keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::InvalidData(format!("config: {}", e)))?;
        config.weights.validate()?;
        Ok(config)
    }

    /// Read a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::InvalidData(format!("config: {}", e)))
    }
}
