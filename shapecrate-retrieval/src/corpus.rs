//! Reference corpus and its batch construction

use crate::cancel::CancellationToken;
use log::{info, warn};
use rayon::prelude::*;
use shapecrate_algorithms::{DescriptorStats, PipelineConfig, ShapePipeline};
use shapecrate_core::{Error, Result, Shape, ShapeId, TriangleMesh};
use shapecrate_io::{is_mesh_file, CorpusStore, FileGeometryAccessor, GeometryAccessor};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shapes keyed by identifier, plus the descriptor statistics fitted on them.
///
/// Every mutation bumps [`Corpus::revision`], which derived structures such
/// as the approximate index use to detect that they are stale.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    shapes: BTreeMap<ShapeId, Shape>,
    stats: Option<DescriptorStats>,
    revision: u64,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corpus of `shapes` with statistics fitted on their raw descriptors
    pub fn from_shapes(shapes: Vec<Shape>) -> Result<Self> {
        let mut corpus = Self::new();
        for shape in shapes {
            corpus.insert(shape);
        }
        corpus.fit_stats()?;
        Ok(corpus)
    }

    /// Add `shape`, superseding any shape with the same identifier.
    ///
    /// If statistics were fitted already, the shape's descriptors are
    /// normalized with them; the statistics themselves are not refitted.
    pub fn insert(&mut self, mut shape: Shape) -> Option<Shape> {
        if let Some(stats) = &self.stats {
            ShapePipeline::apply_stats(&mut shape, stats);
        }
        self.revision += 1;
        self.shapes.insert(shape.id.clone(), shape)
    }

    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        self.shapes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Shapes in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &Shape> + '_ {
        self.shapes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ShapeId> + '_ {
        self.shapes.keys()
    }

    pub fn stats(&self) -> Option<&DescriptorStats> {
        self.stats.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Fit descriptor statistics on the raw descriptors of every shape and
    /// renormalize all of them
    pub fn fit_stats(&mut self) -> Result<DescriptorStats> {
        let raw: Vec<_> = self
            .shapes
            .values()
            .filter_map(|s| s.raw_descriptors)
            .collect();
        let stats = DescriptorStats::fit(&raw)?;
        self.set_stats(stats);
        Ok(stats)
    }

    /// Replace the statistics and renormalize every shape with them
    pub fn set_stats(&mut self, stats: DescriptorStats) {
        for shape in self.shapes.values_mut() {
            ShapePipeline::apply_stats(shape, &stats);
        }
        self.stats = Some(stats);
        self.revision += 1;
    }

    /// Class label of every shape
    pub fn labels(&self) -> BTreeMap<ShapeId, String> {
        self.shapes
            .iter()
            .map(|(id, s)| (id.clone(), s.label.clone()))
            .collect()
    }

    /// Number of shapes per class label
    pub fn class_sizes(&self) -> BTreeMap<String, usize> {
        let mut sizes = BTreeMap::new();
        for shape in self.shapes.values() {
            *sizes.entry(shape.label.clone()).or_insert(0) += 1;
        }
        sizes
    }

    /// Persist every shape and the statistics sidecar
    pub fn save(&self, store: &CorpusStore) -> Result<()> {
        store.save_shapes(self.iter())?;
        if let Some(stats) = &self.stats {
            store.save_params(&stats.to_map())?;
        }
        Ok(())
    }

    /// Load a persisted corpus, reusing the stored statistics when present
    pub fn load(store: &CorpusStore) -> Result<Self> {
        let shapes = store.load_shapes()?;
        let mut corpus = Self::new();
        for shape in shapes {
            corpus.insert(shape);
        }
        match store.load_params()? {
            Some(params) => corpus.set_stats(DescriptorStats::from_map(&params)?),
            None if !corpus.is_empty() => {
                corpus.fit_stats()?;
            }
            None => {}
        }
        Ok(corpus)
    }
}

/// A shape that could not be added to the corpus
#[derive(Debug, Clone)]
pub struct BuildFailure {
    pub id: ShapeId,
    pub reason: String,
}

/// Outcome of a corpus build
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Number of shapes added
    pub processed: usize,
    /// Shapes that were skipped, in identifier order
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds a [`Corpus`] from mesh files or in-memory meshes, processing
/// shapes in parallel
pub struct CorpusBuilder {
    pipeline: ShapePipeline,
    accessor: Arc<dyn GeometryAccessor>,
}

impl CorpusBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            pipeline: ShapePipeline::new(config),
            accessor: Arc::new(FileGeometryAccessor),
        }
    }

    pub fn with_accessor(mut self, accessor: Arc<dyn GeometryAccessor>) -> Self {
        self.accessor = accessor;
        self
    }

    pub fn pipeline(&self) -> &ShapePipeline {
        &self.pipeline
    }

    /// Mesh files below `root`, sorted by path
    pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if is_mesh_file(&path) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Class label of a file: its parent directory, empty at the root
    pub fn label_for(root: &Path, path: &Path) -> String {
        match path.parent() {
            Some(parent) if parent != root => parent
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Build from every mesh file below `root`.
    ///
    /// Files that fail to load or normalize are recorded in the report and
    /// skipped.
    pub fn build_from_directory(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Corpus, BuildReport)> {
        let files = Self::discover(root)?;
        info!("building corpus from {} files under {}", files.len(), root.display());

        let outcomes = files
            .par_iter()
            .map(|path| {
                cancel.check()?;
                let id = ShapeId::from_path(path, Some(root));
                let label = Self::label_for(root, path);
                Ok(self
                    .accessor
                    .load(path)
                    .and_then(|mesh| self.pipeline.process(id.clone(), label, &mesh))
                    .map_err(|err| BuildFailure {
                        id,
                        reason: err.to_string(),
                    }))
            })
            .collect::<Result<Vec<_>>>()?;

        self.finish(outcomes)
    }

    /// Build from meshes already in memory
    pub fn build_from_meshes(
        &self,
        meshes: Vec<(ShapeId, String, TriangleMesh)>,
        cancel: &CancellationToken,
    ) -> Result<(Corpus, BuildReport)> {
        let outcomes = meshes
            .into_par_iter()
            .map(|(id, label, mesh)| {
                cancel.check()?;
                Ok(self
                    .pipeline
                    .process(id.clone(), label, &mesh)
                    .map_err(|err| BuildFailure {
                        id,
                        reason: err.to_string(),
                    }))
            })
            .collect::<Result<Vec<_>>>()?;

        self.finish(outcomes)
    }

    fn finish(
        &self,
        outcomes: Vec<std::result::Result<Shape, BuildFailure>>,
    ) -> Result<(Corpus, BuildReport)> {
        let mut report = BuildReport::default();
        let mut shapes = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(shape) => shapes.push(shape),
                Err(failure) => {
                    warn!("skipping {}: {}", failure.id, failure.reason);
                    report.failures.push(failure);
                }
            }
        }
        report.failures.sort_by(|a, b| a.id.cmp(&b.id));

        if shapes.is_empty() {
            return Err(Error::CorpusEmpty);
        }
        report.processed = shapes.len();
        let corpus = Corpus::from_shapes(shapes)?;
        info!(
            "corpus built: {} shapes, {} skipped",
            report.processed,
            report.failures.len()
        );
        Ok((corpus, report))
    }
}
