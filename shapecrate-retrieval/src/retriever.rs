//! Query entry point: process a query mesh and rank the corpus against it

use crate::ann::{signature_vector, HnswIndex, ShapeIndex};
use crate::cancel::CancellationToken;
use crate::config::{RetrievalConfig, WeightVector};
use crate::corpus::Corpus;
use crate::distance::{DistanceEngine, Match};
use log::{debug, info};
use shapecrate_algorithms::{DescriptorStats, ShapePipeline};
use shapecrate_core::{Error, Result, Shape, ShapeId};
use shapecrate_io::{FileGeometryAccessor, GeometryAccessor};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

struct CachedIndex {
    weights: WeightVector,
    revision: u64,
    index: Arc<HnswIndex>,
}

/// Ranks a reference corpus against query meshes.
///
/// Exact queries scan the corpus. Approximate queries go through an HNSW
/// index built for one weight vector and corpus revision; candidates it
/// returns are re-scored with the exact distance before truncation.
pub struct Retriever {
    config: RetrievalConfig,
    corpus: Corpus,
    pipeline: ShapePipeline,
    accessor: Arc<dyn GeometryAccessor>,
    engine: DistanceEngine,
    index: Mutex<Option<CachedIndex>>,
}

impl Retriever {
    /// Wrap a non-empty corpus, fitting descriptor statistics if it has none
    pub fn new(mut corpus: Corpus, config: RetrievalConfig) -> Result<Self> {
        if corpus.is_empty() {
            return Err(Error::CorpusEmpty);
        }
        config.weights.validate()?;
        if corpus.stats().is_none() {
            corpus.fit_stats()?;
        }
        Ok(Self {
            pipeline: ShapePipeline::new(config.pipeline),
            config,
            corpus,
            accessor: Arc::new(FileGeometryAccessor),
            engine: DistanceEngine::new(),
            index: Mutex::new(None),
        })
    }

    pub fn with_accessor(mut self, accessor: Arc<dyn GeometryAccessor>) -> Self {
        self.accessor = accessor;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Add or replace a corpus shape; any built index becomes stale
    pub fn insert(&mut self, shape: Shape) -> Option<Shape> {
        self.corpus.insert(shape)
    }

    /// Replace the descriptor statistics; any built index becomes stale
    pub fn set_stats(&mut self, stats: DescriptorStats) {
        self.corpus.set_stats(stats);
    }

    /// Drop the cached index
    pub fn invalidate_index(&self) {
        *self.lock_index() = None;
    }

    fn lock_index(&self) -> MutexGuard<'_, Option<CachedIndex>> {
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load and process a query mesh, normalizing its descriptors with the
    /// corpus statistics.
    ///
    /// Query features are not kept in the pipeline's feature cache.
    pub fn prepare(&self, path: &Path) -> Result<Shape> {
        let mesh = self.accessor.load(path)?;
        let id = ShapeId::from_path(path, None);
        let processed = self.pipeline.process(id.clone(), "", &mesh);
        self.pipeline.extractor().cache().invalidate(&id, None);
        let mut shape = processed?;
        if let Some(stats) = self.corpus.stats() {
            ShapePipeline::apply_stats(&mut shape, stats);
        }
        Ok(shape)
    }

    /// Rank the corpus against the mesh at `path`.
    ///
    /// `cancel` aborts this query only; later queries are unaffected.
    pub fn query(
        &self,
        path: &Path,
        weights: &WeightVector,
        k: usize,
        use_ann: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>> {
        let shape = self.prepare(path)?;
        cancel.check()?;
        self.query_shape(&shape, weights, k, use_ann, cancel)
    }

    /// [`Retriever::query`] with the configured weights and `k`
    pub fn query_default(
        &self,
        path: &Path,
        use_ann: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>> {
        self.query(path, &self.config.weights, self.config.k, use_ann, cancel)
    }

    /// Rank the corpus against an already processed shape
    pub fn query_shape(
        &self,
        shape: &Shape,
        weights: &WeightVector,
        k: usize,
        use_ann: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>> {
        if !use_ann {
            return self.engine.query(shape, &self.corpus, weights, k, cancel);
        }

        weights.validate()?;
        let (descriptors, histograms) = match (&shape.descriptors, &shape.histograms) {
            (Some(d), Some(h)) => (d, h),
            _ => {
                return Err(Error::InvalidData(format!(
                    "shape {} has no normalized signature",
                    shape.id
                )))
            }
        };
        let index = self.index_for(weights)?;
        let vector = signature_vector(descriptors, histograms, weights);

        let pool = k.max(self.config.ann.ef_search);
        let candidates = index.search(&vector, pool)?;
        cancel.check()?;
        let shapes = candidates.iter().filter_map(|m| self.corpus.get(&m.id));
        let ranked = self.engine.rank(shape, shapes, weights, k)?;
        debug!(
            "approximate query for {}: {} candidates, kept {}",
            shape.id,
            candidates.len(),
            ranked.len()
        );
        Ok(ranked)
    }

    /// Whether an index for `weights` over the current corpus is built
    pub fn is_index_ready(&self, weights: &WeightVector) -> bool {
        self.lock_index()
            .as_ref()
            .is_some_and(|cached| self.is_current(cached, weights))
    }

    fn is_current(&self, cached: &CachedIndex, weights: &WeightVector) -> bool {
        cached.weights == *weights && cached.revision == self.corpus.revision()
    }

    /// Build and cache the approximate index for `weights`
    pub fn build_index(&self, weights: &WeightVector) -> Result<()> {
        weights.validate()?;
        let mut slot = self.lock_index();
        if !slot.as_ref().is_some_and(|cached| self.is_current(cached, weights)) {
            *slot = Some(self.build_cached(weights)?);
        }
        Ok(())
    }

    fn build_cached(&self, weights: &WeightVector) -> Result<CachedIndex> {
        let entries = self
            .corpus
            .iter()
            .map(|shape| match (&shape.descriptors, &shape.histograms) {
                (Some(d), Some(h)) => Ok((shape.id.clone(), signature_vector(d, h, weights))),
                _ => Err(Error::InvalidData(format!(
                    "shape {} has no normalized signature",
                    shape.id
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        let index = HnswIndex::build(entries, self.config.ann)?;
        info!(
            "approximate index ready: {} shapes, {} levels",
            index.len(),
            index.levels()
        );
        Ok(CachedIndex {
            weights: *weights,
            revision: self.corpus.revision(),
            index: Arc::new(index),
        })
    }

    fn index_for(&self, weights: &WeightVector) -> Result<Arc<HnswIndex>> {
        let mut slot = self.lock_index();
        if let Some(cached) = slot.as_ref() {
            if self.is_current(cached, weights) {
                return Ok(Arc::clone(&cached.index));
            }
        }
        if !self.config.build_index_lazily {
            return Err(Error::IndexNotReady);
        }
        let cached = self.build_cached(weights)?;
        let index = Arc::clone(&cached.index);
        *slot = Some(cached);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusBuilder;
    use shapecrate_algorithms::{HistogramConfig, PipelineConfig};
    use shapecrate_core::{box_mesh, Descriptor, Point3f, TriangleMesh};

    fn pipeline_config() -> PipelineConfig {
        PipelineConfig::default().with_histograms(HistogramConfig::default().with_samples(500))
    }

    fn corpus() -> Corpus {
        let origin = Point3f::new(0.0, 0.0, 0.0);
        let meshes: Vec<(ShapeId, String, TriangleMesh)> = [
            ("slab/a.off", "slab", Point3f::new(4.0, 2.0, 0.2)),
            ("slab/b.off", "slab", Point3f::new(5.0, 2.0, 0.3)),
            ("rod/a.off", "rod", Point3f::new(6.0, 0.5, 0.4)),
            ("cube/a.off", "cube", Point3f::new(1.0, 1.0, 1.0)),
        ]
        .into_iter()
        .map(|(key, label, max)| (ShapeId::from(key), label.to_string(), box_mesh(origin, max)))
        .collect();
        CorpusBuilder::new(pipeline_config())
            .build_from_meshes(meshes, &CancellationToken::new())
            .unwrap()
            .0
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig::default().with_pipeline(pipeline_config())
    }

    #[test]
    fn test_empty_corpus_rejected() {
        assert!(matches!(
            Retriever::new(Corpus::new(), config()),
            Err(Error::CorpusEmpty)
        ));
    }

    #[test]
    fn test_corpus_member_ranks_first() {
        let retriever = Retriever::new(corpus(), config()).unwrap();
        let member = retriever.corpus().get(&ShapeId::from("rod/a.off")).unwrap();
        let result = retriever
            .query_shape(member, &WeightVector::default(), 3, false, &token())
            .unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].id, member.id);
        assert_eq!(result[0].distance, 0.0);
    }

    #[test]
    fn test_ann_matches_exact_on_small_corpus() {
        let retriever = Retriever::new(corpus(), config()).unwrap();
        let weights = WeightVector::default();
        assert!(!retriever.is_index_ready(&weights));

        for shape in retriever.corpus().iter() {
            let exact = retriever.query_shape(shape, &weights, 4, false, &token()).unwrap();
            let approx = retriever.query_shape(shape, &weights, 4, true, &token()).unwrap();
            assert_eq!(exact, approx);
        }
        assert!(retriever.is_index_ready(&weights));
    }

    #[test]
    fn test_index_not_ready_without_lazy_build() {
        let retriever = Retriever::new(corpus(), config().with_lazy_index(false)).unwrap();
        let weights = WeightVector::default();
        let shape = retriever.corpus().iter().next().unwrap().clone();

        assert!(matches!(
            retriever.query_shape(&shape, &weights, 2, true, &token()),
            Err(Error::IndexNotReady)
        ));

        retriever.build_index(&weights).unwrap();
        assert!(retriever.query_shape(&shape, &weights, 2, true, &token()).is_ok());

        // A different weight vector needs its own index
        let other = weights.with_descriptor(Descriptor::Diameter, 3.0);
        assert!(matches!(
            retriever.query_shape(&shape, &other, 2, true, &token()),
            Err(Error::IndexNotReady)
        ));
    }

    #[test]
    fn test_index_invalidated_by_corpus_change() {
        let mut retriever = Retriever::new(corpus(), config()).unwrap();
        let weights = WeightVector::default();
        retriever.build_index(&weights).unwrap();
        assert!(retriever.is_index_ready(&weights));

        let mut extra = retriever
            .corpus()
            .get(&ShapeId::from("cube/a.off"))
            .unwrap()
            .clone();
        extra.id = ShapeId::from("cube/b.off");
        retriever.insert(extra);
        assert!(!retriever.is_index_ready(&weights));

        retriever.build_index(&weights).unwrap();
        assert!(retriever.is_index_ready(&weights));
        retriever.invalidate_index();
        assert!(!retriever.is_index_ready(&weights));
    }

    #[test]
    fn test_query_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.obj");
        FileGeometryAccessor
            .save(
                &path,
                &box_mesh(Point3f::new(-3.0, 1.0, 1.0), Point3f::new(9.0, 2.0, 1.8)),
            )
            .unwrap();

        let retriever = Retriever::new(corpus(), config()).unwrap();
        let result = retriever.query_default(&path, false, &token()).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result[0].id, ShapeId::from("rod/a.off"));
    }

    #[test]
    fn test_query_missing_file() {
        let retriever = Retriever::new(corpus(), config()).unwrap();
        let result = retriever.query_default(Path::new("/nonexistent/q.off"), false, &token());
        assert!(matches!(result, Err(Error::GeometryLoad { .. })));
    }

    #[test]
    fn test_cancel_aborts_only_its_own_query() {
        let retriever = Retriever::new(corpus(), config()).unwrap();
        let shape = retriever.corpus().iter().next().unwrap().clone();
        let weights = WeightVector::default();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            retriever.query_shape(&shape, &weights, 2, false, &cancel),
            Err(Error::Cancelled)
        ));
        assert!(matches!(
            retriever.query_shape(&shape, &weights, 2, true, &cancel),
            Err(Error::Cancelled)
        ));

        let later = retriever.query_shape(&shape, &weights, 2, false, &token()).unwrap();
        assert_eq!(later[0].id, shape.id);
        assert!(retriever.query_shape(&shape, &weights, 2, true, &token()).is_ok());
    }

    #[test]
    fn test_query_features_are_not_retained() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(corpus(), config()).unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("q{}.off", i));
            let max = Point3f::new(2.0 + i as f32, 1.0, 0.5);
            FileGeometryAccessor
                .save(&path, &box_mesh(Point3f::new(0.0, 0.0, 0.0), max))
                .unwrap();
            let shape = retriever.prepare(&path).unwrap();
            assert!(shape.has_signature());
            assert!(retriever.pipeline.extractor().cache().is_empty());
        }
    }
}
