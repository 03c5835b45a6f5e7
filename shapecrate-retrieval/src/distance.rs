//! Weighted signature dissimilarity and brute-force ranking

use crate::cancel::CancellationToken;
use crate::config::WeightVector;
use crate::corpus::Corpus;
use log::debug;
use rayon::prelude::*;
use shapecrate_core::{
    is_present, DescriptorVector, Error, Histogram, PropertyHistogramSet, Result, Shape, ShapeId,
    HISTOGRAM_BINS,
};
use std::cmp::Ordering;

/// One ranked result
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: ShapeId,
    pub distance: f64,
}

impl Match {
    pub fn new(id: ShapeId, distance: f64) -> Self {
        Self { id, distance }
    }
}

/// Ascending distance, ties by identifier
pub fn rank_order(a: &Match, b: &Match) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

/// Earth mover's distance between two histograms over the same bins, with
/// ground distance `((i - j) / n)^2`.
///
/// The ground distance is convex in `i - j`, so on a line the monotone
/// coupling (fill target bins left to right from source bins left to right)
/// is an optimal transport plan.
pub fn emd(p: &Histogram, q: &Histogram) -> f64 {
    let n = HISTOGRAM_BINS as f64;
    let (mut i, mut j) = (0, 0);
    let (mut supply, mut demand) = (p.bins[0], q.bins[0]);
    let mut cost = 0.0;

    loop {
        let flow = supply.min(demand);
        let gap = (i as f64 - j as f64) / n;
        cost += flow * gap * gap;
        supply -= flow;
        demand -= flow;

        if supply <= 0.0 {
            i += 1;
            if i == HISTOGRAM_BINS {
                break;
            }
            supply = p.bins[i];
        }
        if demand <= 0.0 {
            j += 1;
            if j == HISTOGRAM_BINS {
                break;
            }
            demand = q.bins[j];
        }
    }
    cost
}

/// Weighted dissimilarity between signatures.
///
/// `total = scalar + histogram` where `scalar` is the weighted Euclidean
/// distance over descriptors and `histogram` the weighted sum of per-property
/// EMDs. Channels missing on either side are left out and the remaining
/// weights rescaled to the full weight mass of their group; a group with no
/// comparable channel contributes zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceEngine;

impl DistanceEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn scalar_distance(
        &self,
        q: &DescriptorVector,
        c: &DescriptorVector,
        weights: &WeightVector,
    ) -> f64 {
        let mut sum = 0.0;
        let mut present_mass = 0.0;
        let mut total_mass = 0.0;
        for ((&a, &b), &w) in q.values.iter().zip(c.values.iter()).zip(weights.descriptors.iter()) {
            total_mass += w * w;
            if is_present(a) && is_present(b) {
                let d = w * (a - b);
                sum += d * d;
                present_mass += w * w;
            }
        }
        if present_mass <= 0.0 {
            return 0.0;
        }
        (sum * total_mass / present_mass).sqrt()
    }

    pub fn histogram_distance(
        &self,
        q: &PropertyHistogramSet,
        c: &PropertyHistogramSet,
        weights: &WeightVector,
    ) -> f64 {
        let mut sum = 0.0;
        let mut present_mass = 0.0;
        let mut total_mass = 0.0;
        for ((a, b), &w) in q.histograms.iter().zip(c.histograms.iter()).zip(weights.histograms.iter()) {
            total_mass += w;
            if !a.is_missing() && !b.is_missing() {
                sum += w * emd(a, b);
                present_mass += w;
            }
        }
        if present_mass <= 0.0 {
            return 0.0;
        }
        sum * total_mass / present_mass
    }

    /// Total dissimilarity; symmetric and zero on identical signatures
    pub fn distance(
        &self,
        q_descriptors: &DescriptorVector,
        q_histograms: &PropertyHistogramSet,
        c_descriptors: &DescriptorVector,
        c_histograms: &PropertyHistogramSet,
        weights: &WeightVector,
    ) -> f64 {
        self.scalar_distance(q_descriptors, c_descriptors, weights)
            + self.histogram_distance(q_histograms, c_histograms, weights)
    }

    /// Distance between two processed shapes
    pub fn shape_distance(&self, a: &Shape, b: &Shape, weights: &WeightVector) -> Result<f64> {
        let (ad, ah) = signature(a)?;
        let (bd, bh) = signature(b)?;
        Ok(self.distance(ad, ah, bd, bh, weights))
    }

    /// The `k` corpus shapes closest to `query`, scanning the whole corpus
    pub fn query(
        &self,
        query: &Shape,
        corpus: &Corpus,
        weights: &WeightVector,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>> {
        if corpus.is_empty() {
            return Err(Error::CorpusEmpty);
        }
        weights.validate()?;
        let (qd, qh) = signature(query)?;

        let candidates: Vec<&Shape> = corpus.iter().collect();
        let mut matches = candidates
            .par_iter()
            .map(|shape| {
                cancel.check()?;
                let (cd, ch) = signature(shape)?;
                Ok(Match::new(shape.id.clone(), self.distance(qd, qh, cd, ch, weights)))
            })
            .collect::<Result<Vec<_>>>()?;

        matches.sort_by(rank_order);
        matches.truncate(k);
        debug!(
            "ranked {} corpus shapes for {}, kept {}",
            candidates.len(),
            query.id,
            matches.len()
        );
        Ok(matches)
    }

    /// Re-rank a candidate subset with the exact distance
    pub fn rank<'a, I>(
        &self,
        query: &Shape,
        candidates: I,
        weights: &WeightVector,
        k: usize,
    ) -> Result<Vec<Match>>
    where
        I: IntoIterator<Item = &'a Shape>,
    {
        let (qd, qh) = signature(query)?;
        let mut matches = candidates
            .into_iter()
            .map(|shape| {
                let (cd, ch) = signature(shape)?;
                Ok(Match::new(shape.id.clone(), self.distance(qd, qh, cd, ch, weights)))
            })
            .collect::<Result<Vec<_>>>()?;
        matches.sort_by(rank_order);
        matches.truncate(k);
        Ok(matches)
    }

    /// All-against-all distances over the corpus, rows in identifier order
    pub fn pairwise(
        &self,
        corpus: &Corpus,
        weights: &WeightVector,
        cancel: &CancellationToken,
    ) -> Result<DistanceMatrix> {
        weights.validate()?;
        let shapes: Vec<&Shape> = corpus.iter().collect();
        let signatures = shapes
            .iter()
            .map(|s| signature(s))
            .collect::<Result<Vec<_>>>()?;
        let n = shapes.len();

        // Upper triangle per row, mirrored afterwards
        let rows = (0..n)
            .into_par_iter()
            .map(|i| {
                cancel.check()?;
                let (qd, qh) = signatures[i];
                Ok(((i + 1)..n)
                    .map(|j| {
                        let (cd, ch) = signatures[j];
                        self.distance(qd, qh, cd, ch, weights)
                    })
                    .collect::<Vec<f64>>())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut values = vec![0.0; n * n];
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, d) in row.into_iter().enumerate() {
                let j = i + 1 + offset;
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }
        Ok(DistanceMatrix {
            ids: shapes.iter().map(|s| s.id.clone()).collect(),
            values,
        })
    }
}

fn signature(shape: &Shape) -> Result<(&DescriptorVector, &PropertyHistogramSet)> {
    match (&shape.descriptors, &shape.histograms) {
        (Some(d), Some(h)) => Ok((d, h)),
        _ => Err(Error::InvalidData(format!(
            "shape {} has no normalized signature",
            shape.id
        ))),
    }
}

/// Square, symmetric matrix of corpus distances
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    ids: Vec<ShapeId>,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn ids(&self) -> &[ShapeId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.ids.len() + j]
    }

    /// Row `i` as matches, ascending
    pub fn ranked_row(&self, i: usize) -> Vec<Match> {
        let mut row: Vec<Match> = self
            .ids
            .iter()
            .enumerate()
            .map(|(j, id)| Match::new(id.clone(), self.get(i, j)))
            .collect();
        row.sort_by(rank_order);
        row
    }
}
