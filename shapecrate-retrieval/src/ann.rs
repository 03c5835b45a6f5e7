//! Approximate nearest-neighbor search over signature vectors
//!
//! A native HNSW (hierarchical navigable small world) graph: every node gets
//! a random top level, upper levels are sparse express lanes and level 0
//! links every node to its closest neighbors. Level assignment is driven by a
//! seeded RNG and nodes are inserted in identifier order, so a build over the
//! same corpus and weights always yields the same graph.

use crate::config::WeightVector;
use crate::distance::{rank_order, Match};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use shapecrate_core::{
    is_present, DescriptorVector, Error, PropertyHistogramSet, Result, ShapeId, DESCRIPTOR_COUNT,
    HISTOGRAM_BINS, PROPERTY_COUNT,
};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

/// Length of a signature vector
pub const SIGNATURE_DIMENSION: usize = DESCRIPTOR_COUNT + PROPERTY_COUNT * HISTOGRAM_BINS;

/// HNSW construction and search parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
    /// Links per node on upper levels; level 0 keeps twice as many
    pub max_connections: usize,
    /// Candidate list size while inserting
    pub ef_construction: usize,
    /// Candidate list size while searching
    pub ef_search: usize,
    /// Seed for level assignment
    pub seed: u64,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 100,
            ef_search: 64,
            seed: 42,
        }
    }
}

impl AnnConfig {
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_ef_search(mut self, ef_search: usize) -> Self {
        self.ef_search = ef_search;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Weighted descriptors followed by weighted, flattened histogram bins.
/// Missing channels become zeros.
pub fn signature_vector(
    descriptors: &DescriptorVector,
    histograms: &PropertyHistogramSet,
    weights: &WeightVector,
) -> Vec<f64> {
    let mut vector = Vec::with_capacity(SIGNATURE_DIMENSION);
    for (&value, &w) in descriptors.values.iter().zip(weights.descriptors.iter()) {
        vector.push(if is_present(value) { w * value } else { 0.0 });
    }
    for (histogram, &w) in histograms.histograms.iter().zip(weights.histograms.iter()) {
        if histogram.is_missing() {
            vector.extend(std::iter::repeat(0.0).take(HISTOGRAM_BINS));
        } else {
            vector.extend(histogram.bins.iter().map(|b| w * b));
        }
    }
    vector
}

/// Common interface of vector indexes over corpus shapes
pub trait ShapeIndex: Send + Sync {
    /// Up to `k` entries closest to `vector`, ascending by Euclidean distance
    fn search(&self, vector: &[f64], k: usize) -> Result<Vec<Match>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn check_entries(entries: &[(ShapeId, Vec<f64>)]) -> Result<usize> {
    let dimension = match entries.first() {
        Some((_, v)) => v.len(),
        None => return Err(Error::CorpusEmpty),
    };
    if let Some((id, v)) = entries.iter().find(|(_, v)| v.len() != dimension) {
        return Err(Error::InvalidData(format!(
            "vector for {} has dimension {}, expected {}",
            id,
            v.len(),
            dimension
        )));
    }
    Ok(dimension)
}

fn check_query(vector: &[f64], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::InvalidData(format!(
            "query vector has dimension {}, index expects {}",
            vector.len(),
            dimension
        )));
    }
    Ok(())
}

/// Exhaustive scan over the same vectors, the exact counterpart of
/// [`HnswIndex`]
pub struct FlatIndex {
    ids: Vec<ShapeId>,
    vectors: Vec<Vec<f64>>,
    dimension: usize,
}

impl FlatIndex {
    pub fn build(entries: Vec<(ShapeId, Vec<f64>)>) -> Result<Self> {
        let dimension = check_entries(&entries)?;
        let (ids, vectors) = entries.into_iter().unzip();
        Ok(Self {
            ids,
            vectors,
            dimension,
        })
    }
}

impl ShapeIndex for FlatIndex {
    fn search(&self, vector: &[f64], k: usize) -> Result<Vec<Match>> {
        check_query(vector, self.dimension)?;
        let mut matches: Vec<Match> = self
            .ids
            .iter()
            .zip(&self.vectors)
            .map(|(id, v)| Match::new(id.clone(), squared_distance(vector, v).sqrt()))
            .collect();
        matches.sort_by(rank_order);
        matches.truncate(k);
        Ok(matches)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f64,
    node: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Immutable HNSW graph over corpus signature vectors
pub struct HnswIndex {
    config: AnnConfig,
    ids: Vec<ShapeId>,
    vectors: Vec<Vec<f64>>,
    /// `links[node][level]`
    links: Vec<Vec<Vec<usize>>>,
    entry_point: usize,
    max_level: usize,
    dimension: usize,
}

impl HnswIndex {
    /// Build the graph, inserting entries in the order given
    pub fn build(entries: Vec<(ShapeId, Vec<f64>)>, config: AnnConfig) -> Result<Self> {
        let dimension = check_entries(&entries)?;
        let (ids, vectors): (Vec<ShapeId>, Vec<Vec<f64>>) = entries.into_iter().unzip();

        let m = config.max_connections.max(2);
        let level_scale = 1.0 / (m as f64).ln();
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut index = Self {
            config,
            ids,
            vectors,
            links: Vec::new(),
            entry_point: 0,
            max_level: 0,
            dimension,
        };

        for node in 0..index.vectors.len() {
            // 1 - U lies in (0, 1]
            let u: f64 = 1.0 - rng.gen::<f64>();
            let level = (-u.ln() * level_scale).floor() as usize;
            index.insert(node, level);
        }

        debug!(
            "built HNSW index: {} nodes, {} levels, dimension {}",
            index.len(),
            index.max_level + 1,
            dimension
        );
        Ok(index)
    }

    pub fn config(&self) -> &AnnConfig {
        &self.config
    }

    /// Number of levels in the graph
    pub fn levels(&self) -> usize {
        self.max_level + 1
    }

    fn max_links(&self, level: usize) -> usize {
        let m = self.config.max_connections.max(2);
        if level == 0 {
            2 * m
        } else {
            m
        }
    }

    fn distance_to(&self, query: &[f64], node: usize) -> f64 {
        squared_distance(query, &self.vectors[node])
    }

    fn insert(&mut self, node: usize, level: usize) {
        self.links.push(vec![Vec::new(); level + 1]);
        if node == 0 {
            self.entry_point = 0;
            self.max_level = level;
            return;
        }

        let query = self.vectors[node].clone();
        let mut entry = self.entry_point;
        for lc in ((level + 1)..=self.max_level).rev() {
            entry = self.greedy_closest(&query, entry, lc);
        }

        let mut entries = vec![entry];
        for lc in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(&query, &entries, self.config.ef_construction.max(1), lc);
            let neighbors: Vec<usize> = found
                .iter()
                .take(self.max_links(lc))
                .map(|c| c.node)
                .collect();

            for &neighbor in &neighbors {
                self.links[neighbor][lc].push(node);
                if self.links[neighbor][lc].len() > self.max_links(lc) {
                    self.prune(neighbor, lc);
                }
            }
            self.links[node][lc] = neighbors;
            entries = found.into_iter().map(|c| c.node).collect();
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = node;
        }
    }

    /// Keep only the closest links of `node` on `level`
    fn prune(&mut self, node: usize, level: usize) {
        let base = &self.vectors[node];
        let mut ranked: Vec<Candidate> = self.links[node][level]
            .iter()
            .map(|&other| Candidate {
                distance: squared_distance(base, &self.vectors[other]),
                node: other,
            })
            .collect();
        ranked.sort();
        ranked.truncate(self.max_links(level));
        self.links[node][level] = ranked.into_iter().map(|c| c.node).collect();
    }

    fn greedy_closest(&self, query: &[f64], start: usize, level: usize) -> usize {
        let mut current = start;
        let mut best = self.distance_to(query, current);
        loop {
            let mut improved = false;
            for &next in &self.links[current][level] {
                let d = self.distance_to(query, next);
                if d < best {
                    best = d;
                    current = next;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first search on one level; the result is ascending by distance
    fn search_layer(&self, query: &[f64], entries: &[usize], ef: usize, level: usize) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = entries.iter().copied().collect();
        let mut frontier = BinaryHeap::new();
        let mut best = BinaryHeap::new();

        for &node in entries {
            let c = Candidate {
                distance: self.distance_to(query, node),
                node,
            };
            frontier.push(Reverse(c));
            best.push(c);
        }
        while best.len() > ef {
            best.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if let Some(worst) = best.peek() {
                if best.len() >= ef && current.distance > worst.distance {
                    break;
                }
            }
            for &next in &self.links[current.node][level] {
                if !visited.insert(next) {
                    continue;
                }
                let c = Candidate {
                    distance: self.distance_to(query, next),
                    node: next,
                };
                let admit = match best.peek() {
                    Some(worst) => best.len() < ef || c.distance < worst.distance,
                    None => true,
                };
                if admit {
                    frontier.push(Reverse(c));
                    best.push(c);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }
}

impl ShapeIndex for HnswIndex {
    fn search(&self, vector: &[f64], k: usize) -> Result<Vec<Match>> {
        check_query(vector, self.dimension)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut entry = self.entry_point;
        for level in (1..=self.max_level).rev() {
            entry = self.greedy_closest(vector, entry, level);
        }
        let found = self.search_layer(vector, &[entry], self.config.ef_search.max(k), 0);

        let mut matches: Vec<Match> = found
            .into_iter()
            .map(|c| Match::new(self.ids[c.node].clone(), c.distance.sqrt()))
            .collect();
        matches.sort_by(rank_order);
        matches.truncate(k);
        Ok(matches)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
