//! Persisted corpus store
//!
//! A store is a directory of TOML documents. Each feature group is one
//! table keyed by shape identifier, and descriptor normalization
//! parameters live in a sidecar keyed by descriptor name:
//!
//! | file | contents |
//! |---|---|
//! | `shapes.toml` | class label |
//! | `mesh_features.toml` | counts, surface area, volume, watertightness, diameter |
//! | `hull_features.toml` | hull surface area and volume |
//! | `bounding_box.toml` | canonical AABB |
//! | `diagnostics.toml` | normalization diagnostics |
//! | `descriptors.toml` | raw descriptors by name |
//! | `histograms.toml` | property histograms by property name |
//! | `params.toml` | descriptor mean and std |
//!
//! Missing values are written as `nan`.

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shapecrate_core::{
    Descriptor, DescriptorParams, DescriptorVector, Error, Histogram, NormalizationDiagnostics,
    Property, PropertyHistogramSet, RawFeatures, Result, Shape, ShapeId, HISTOGRAM_BINS,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const SHAPES: &str = "shapes.toml";
const MESH_FEATURES: &str = "mesh_features.toml";
const HULL_FEATURES: &str = "hull_features.toml";
const BOUNDING_BOX: &str = "bounding_box.toml";
const DIAGNOSTICS: &str = "diagnostics.toml";
const DESCRIPTORS: &str = "descriptors.toml";
const HISTOGRAMS: &str = "histograms.toml";
const PARAMS: &str = "params.toml";

type Table<T> = BTreeMap<String, T>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShapeRow {
    label: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct MeshFeatureRow {
    vertex_count: usize,
    face_count: usize,
    surface_area: f64,
    volume: f64,
    is_watertight: bool,
    diameter: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct HullFeatureRow {
    surface_area: f64,
    volume: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct BoundingBoxRow {
    min: [f64; 3],
    max: [f64; 3],
}

/// Directory-backed store of shape signatures
#[derive(Debug, Clone)]
pub struct CorpusStore {
    root: PathBuf,
}

impl CorpusStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the store holds a corpus
    pub fn exists(&self) -> bool {
        self.root.join(SHAPES).is_file()
    }

    fn write_table<T: Serialize>(&self, name: &str, table: &T) -> Result<()> {
        let text = toml::to_string(table)
            .map_err(|e| Error::Store(format!("serializing {}: {}", name, e)))?;
        fs::write(self.root.join(name), text)?;
        Ok(())
    }

    fn read_table<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Ok(T::default());
        }
        let text = fs::read_to_string(&path)?;
        toml::from_str(&text).map_err(|e| Error::Store(format!("reading {}: {}", name, e)))
    }

    /// Write every table, replacing what the store held before
    pub fn save_shapes<'a, I>(&self, shapes: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Shape>,
    {
        fs::create_dir_all(&self.root)?;

        let mut rows: Table<ShapeRow> = Table::new();
        let mut mesh_features: Table<MeshFeatureRow> = Table::new();
        let mut hull_features: Table<HullFeatureRow> = Table::new();
        let mut bounding_boxes: Table<BoundingBoxRow> = Table::new();
        let mut diagnostics: Table<NormalizationDiagnostics> = Table::new();
        let mut descriptors: Table<BTreeMap<String, f64>> = Table::new();
        let mut histograms: Table<BTreeMap<String, Vec<f64>>> = Table::new();

        for shape in shapes {
            let key = shape.id.key();
            rows.insert(
                key.clone(),
                ShapeRow {
                    label: shape.label.clone(),
                },
            );
            if let Some(f) = &shape.features {
                mesh_features.insert(
                    key.clone(),
                    MeshFeatureRow {
                        vertex_count: f.vertex_count,
                        face_count: f.face_count,
                        surface_area: f.surface_area,
                        volume: f.volume,
                        is_watertight: f.is_watertight,
                        diameter: f.diameter,
                    },
                );
                hull_features.insert(
                    key.clone(),
                    HullFeatureRow {
                        surface_area: f.hull_surface_area,
                        volume: f.hull_volume,
                    },
                );
                bounding_boxes.insert(
                    key.clone(),
                    BoundingBoxRow {
                        min: f.bbox_min,
                        max: f.bbox_max,
                    },
                );
            }
            if let Some(d) = &shape.diagnostics {
                diagnostics.insert(key.clone(), *d);
            }
            if let Some(raw) = &shape.raw_descriptors {
                descriptors.insert(
                    key.clone(),
                    raw.iter().map(|(d, v)| (d.name().to_string(), v)).collect(),
                );
            }
            if let Some(set) = &shape.histograms {
                histograms.insert(
                    key,
                    set.iter()
                        .map(|(p, h)| (p.name().to_string(), h.bins.to_vec()))
                        .collect(),
                );
            }
        }

        self.write_table(SHAPES, &rows)?;
        self.write_table(MESH_FEATURES, &mesh_features)?;
        self.write_table(HULL_FEATURES, &hull_features)?;
        self.write_table(BOUNDING_BOX, &bounding_boxes)?;
        self.write_table(DIAGNOSTICS, &diagnostics)?;
        self.write_table(DESCRIPTORS, &descriptors)?;
        self.write_table(HISTOGRAMS, &histograms)?;

        info!("saved {} shapes to {}", rows.len(), self.root.display());
        Ok(())
    }

    /// Read every stored shape, ordered by identifier.
    ///
    /// Stored shapes carry no geometry and no normalized descriptors; those
    /// are filled in again from the parameters sidecar by the caller.
    pub fn load_shapes(&self) -> Result<Vec<Shape>> {
        if !self.exists() {
            return Err(Error::Store(format!(
                "no corpus stored at {}",
                self.root.display()
            )));
        }

        let rows: Table<ShapeRow> = self.read_table(SHAPES)?;
        let mesh_features: Table<MeshFeatureRow> = self.read_table(MESH_FEATURES)?;
        let hull_features: Table<HullFeatureRow> = self.read_table(HULL_FEATURES)?;
        let bounding_boxes: Table<BoundingBoxRow> = self.read_table(BOUNDING_BOX)?;
        let mut diagnostics: Table<NormalizationDiagnostics> = self.read_table(DIAGNOSTICS)?;
        let descriptors: Table<BTreeMap<String, f64>> = self.read_table(DESCRIPTORS)?;
        let histograms: Table<BTreeMap<String, Vec<f64>>> = self.read_table(HISTOGRAMS)?;

        let mut shapes = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            let mut shape = Shape::new(ShapeId::from(key.as_str()), row.label);

            if let Some(m) = mesh_features.get(&key) {
                let mut features = RawFeatures {
                    vertex_count: m.vertex_count,
                    face_count: m.face_count,
                    surface_area: m.surface_area,
                    volume: m.volume,
                    is_watertight: m.is_watertight,
                    diameter: m.diameter,
                    ..RawFeatures::default()
                };
                if let Some(h) = hull_features.get(&key) {
                    features.hull_surface_area = h.surface_area;
                    features.hull_volume = h.volume;
                }
                if let Some(b) = bounding_boxes.get(&key) {
                    features.bbox_min = b.min;
                    features.bbox_max = b.max;
                }
                shape.features = Some(features);
            }
            shape.diagnostics = diagnostics.remove(&key);
            if let Some(values) = descriptors.get(&key) {
                shape.raw_descriptors = Some(descriptor_vector(&key, values)?);
            }
            if let Some(bins) = histograms.get(&key) {
                shape.histograms = Some(histogram_set(&key, bins)?);
            }
            shapes.push(shape);
        }

        debug!("loaded {} shapes from {}", shapes.len(), self.root.display());
        Ok(shapes)
    }

    /// Write the descriptor parameters sidecar
    pub fn save_params(&self, params: &BTreeMap<String, DescriptorParams>) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        self.write_table(PARAMS, params)
    }

    /// Read the descriptor parameters sidecar, `None` if it was never written
    pub fn load_params(&self) -> Result<Option<BTreeMap<String, DescriptorParams>>> {
        if !self.root.join(PARAMS).is_file() {
            return Ok(None);
        }
        self.read_table(PARAMS).map(Some)
    }
}

fn descriptor_vector(key: &str, values: &BTreeMap<String, f64>) -> Result<DescriptorVector> {
    let mut vector = DescriptorVector::missing();
    for (name, value) in values {
        let descriptor = Descriptor::from_name(name).ok_or_else(|| {
            Error::Store(format!("{}: unknown descriptor {:?}", key, name))
        })?;
        vector.set(descriptor, *value);
    }
    Ok(vector)
}

fn histogram_set(key: &str, bins: &BTreeMap<String, Vec<f64>>) -> Result<PropertyHistogramSet> {
    let mut set = PropertyHistogramSet::missing();
    for property in Property::ALL {
        let Some(values) = bins.get(property.name()) else {
            continue;
        };
        let bins: [f64; HISTOGRAM_BINS] = values.as_slice().try_into().map_err(|_| {
            Error::Store(format!(
                "{}: histogram {} has {} bins, expected {}",
                key,
                property.name(),
                values.len(),
                HISTOGRAM_BINS
            ))
        })?;
        set.set(property, Histogram { bins });
    }
    Ok(set)
}
