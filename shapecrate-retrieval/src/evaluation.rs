//! Classification-style accuracy of ranked retrieval
//!
//! Every query is treated as a binary classifier over the corpus: shapes it
//! returns are predicted to share its class. A query's own corpus entry
//! counts like any other result.

use crate::cancel::CancellationToken;
use crate::config::WeightVector;
use crate::distance::Match;
use crate::retriever::Retriever;
use log::{debug, info};
use rayon::prelude::*;
use shapecrate_core::{Error, Result, ShapeId, MISSING};
use std::collections::BTreeMap;
use std::ops::{AddAssign, Div};

/// Confusion counts; fractional once averaged over queries
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfusionCounts {
    pub true_positives: f64,
    pub false_positives: f64,
    pub true_negatives: f64,
    pub false_negatives: f64,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        MISSING
    }
}

impl ConfusionCounts {
    /// Counts of one query returning `retrieved` results, `relevant` of
    /// them in its class of `class_size` within a corpus of `corpus_size`
    pub fn from_query(retrieved: usize, relevant: usize, class_size: usize, corpus_size: usize) -> Self {
        let tp = relevant as f64;
        let fp = (retrieved - relevant) as f64;
        let fn_ = class_size.saturating_sub(relevant) as f64;
        Self {
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            true_negatives: corpus_size as f64 - tp - fp - fn_,
        }
    }

    pub fn total(&self) -> f64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }
}

impl AddAssign for ConfusionCounts {
    fn add_assign(&mut self, other: Self) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.true_negatives += other.true_negatives;
        self.false_negatives += other.false_negatives;
    }
}

impl Div<f64> for ConfusionCounts {
    type Output = Self;

    fn div(self, n: f64) -> Self {
        Self {
            true_positives: self.true_positives / n,
            false_positives: self.false_positives / n,
            true_negatives: self.true_negatives / n,
            false_negatives: self.false_negatives / n,
        }
    }
}

/// Per-class row of an evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    /// Number of corpus shapes with this label
    pub class_size: usize,
    /// Number of queries averaged into `counts`
    pub queries: usize,
    pub counts: ConfusionCounts,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub corpus_size: usize,
    /// Rows in label order
    pub classes: Vec<ClassMetrics>,
    /// Mean of per-class accuracies
    pub accuracy: f64,
    /// Queries left out because their label is unknown
    pub skipped: usize,
}

impl EvaluationReport {
    pub fn class(&self, label: &str) -> Option<&ClassMetrics> {
        self.classes.iter().find(|c| c.label == label)
    }
}

/// Turns ranked results into per-class metrics
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    k: usize,
}

impl Evaluator {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Metrics for `results` (query -> ranked matches) given the label of
    /// every corpus shape. Queries missing from `labels` or labelled with the
    /// empty string are skipped; a retrieved shape missing from `labels` is
    /// `InvalidData`, since the corpus size would no longer bound the counts.
    pub fn evaluate(
        &self,
        results: &BTreeMap<ShapeId, Vec<Match>>,
        labels: &BTreeMap<ShapeId, String>,
    ) -> Result<EvaluationReport> {
        if labels.is_empty() {
            return Err(Error::CorpusEmpty);
        }
        let corpus_size = labels.len();
        let mut class_sizes: BTreeMap<&str, usize> = BTreeMap::new();
        for label in labels.values().filter(|l| !l.is_empty()) {
            *class_sizes.entry(label.as_str()).or_insert(0) += 1;
        }

        let mut sums: BTreeMap<&str, (ConfusionCounts, usize)> = BTreeMap::new();
        let mut skipped = 0;
        for (query, matches) in results {
            let label = match labels.get(query).map(String::as_str) {
                Some(label) if !label.is_empty() => label,
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            let retrieved = matches.len().min(self.k);
            if let Some(unknown) = matches[..retrieved]
                .iter()
                .find(|m| !labels.contains_key(&m.id))
            {
                return Err(Error::InvalidData(format!(
                    "query {} retrieved {}, which is not in the corpus",
                    query, unknown.id
                )));
            }
            let relevant = matches[..retrieved]
                .iter()
                .filter(|m| labels.get(&m.id).map(String::as_str) == Some(label))
                .count();
            let counts =
                ConfusionCounts::from_query(retrieved, relevant, class_sizes[label], corpus_size);
            let entry = sums.entry(label).or_default();
            entry.0 += counts;
            entry.1 += 1;
        }

        if sums.is_empty() {
            return Err(Error::InvalidData(
                "no query with a known label to evaluate".to_string(),
            ));
        }

        let classes: Vec<ClassMetrics> = sums
            .into_iter()
            .map(|(label, (sum, queries))| {
                let counts = sum / queries as f64;
                ClassMetrics {
                    label: label.to_string(),
                    class_size: class_sizes[label],
                    queries,
                    precision: counts.precision(),
                    recall: counts.recall(),
                    specificity: counts.specificity(),
                    accuracy: counts.accuracy(),
                    counts,
                }
            })
            .collect();
        let accuracy = classes.iter().map(|c| c.accuracy).sum::<f64>() / classes.len() as f64;
        debug!(
            "evaluated {} classes, {} queries skipped",
            classes.len(),
            skipped
        );

        Ok(EvaluationReport {
            corpus_size,
            classes,
            accuracy,
            skipped,
        })
    }

    /// Query every corpus shape against the corpus and evaluate the results
    pub fn evaluate_retriever(
        &self,
        retriever: &Retriever,
        weights: &WeightVector,
        use_ann: bool,
        cancel: &CancellationToken,
    ) -> Result<EvaluationReport> {
        let corpus = retriever.corpus();
        if use_ann {
            retriever.build_index(weights)?;
        }
        let shapes: Vec<_> = corpus.iter().collect();
        let results = shapes
            .par_iter()
            .map(|shape| {
                cancel.check()?;
                let matches = retriever.query_shape(shape, weights, self.k, use_ann, cancel)?;
                Ok((shape.id.clone(), matches))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let report = self.evaluate(&results, &corpus.labels())?;
        info!(
            "evaluation over {} shapes at k = {}: accuracy {:.4}",
            report.corpus_size, self.k, report.accuracy
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn labels() -> BTreeMap<ShapeId, String> {
        [("a1", "a"), ("a2", "a"), ("b1", "b"), ("b2", "b"), ("u", "")]
            .into_iter()
            .map(|(id, l)| (ShapeId::from(id), l.to_string()))
            .collect()
    }

    fn ranked(ids: &[&str]) -> Vec<Match> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Match::new(ShapeId::from(*id), i as f64))
            .collect()
    }

    #[test]
    fn test_rows_sum_to_corpus_size() {
        let results: BTreeMap<ShapeId, Vec<Match>> = [
            ("a1", ranked(&["a1", "a2"])),
            ("a2", ranked(&["a2", "b1"])),
            ("b1", ranked(&["b1", "u"])),
            ("b2", ranked(&["b2", "b1"])),
        ]
        .into_iter()
        .map(|(q, m)| (ShapeId::from(q), m))
        .collect();

        let report = Evaluator::new(2).evaluate(&results, &labels()).unwrap();
        assert_eq!(report.corpus_size, 5);
        assert_eq!(report.classes.len(), 2);
        for class in &report.classes {
            assert_relative_eq!(class.counts.total(), 5.0, epsilon = 1e-12);
        }

        // Class a: queries with TP 2 and 1
        let a = report.class("a").unwrap();
        assert_eq!(a.queries, 2);
        assert_relative_eq!(a.counts.true_positives, 1.5);
        assert_relative_eq!(a.counts.false_positives, 0.5);
        assert_relative_eq!(a.counts.false_negatives, 0.5);
        assert_relative_eq!(a.counts.true_negatives, 2.5);
        assert_relative_eq!(a.precision, 0.75);
        assert_relative_eq!(a.recall, 0.75);
        assert_relative_eq!(a.accuracy, 4.0 / 5.0);

        let mean = report.classes.iter().map(|c| c.accuracy).sum::<f64>() / 2.0;
        assert_relative_eq!(report.accuracy, mean);
    }

    #[test]
    fn test_unknown_labels_skipped() {
        let results: BTreeMap<ShapeId, Vec<Match>> = [
            (ShapeId::from("u"), ranked(&["u"])),
            (ShapeId::from("a1"), ranked(&["a1"])),
        ]
        .into_iter()
        .collect();
        let report = Evaluator::new(1).evaluate(&results, &labels()).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.classes.len(), 1);
        let a = report.class("a").unwrap();
        assert_relative_eq!(a.precision, 1.0);
        assert_relative_eq!(a.recall, 0.5);
        assert_relative_eq!(a.specificity, 1.0);
    }

    #[test]
    fn test_results_truncated_to_k() {
        let results: BTreeMap<ShapeId, Vec<Match>> =
            [(ShapeId::from("a1"), ranked(&["a1", "b1", "b2"]))]
                .into_iter()
                .collect();
        let report = Evaluator::new(1).evaluate(&results, &labels()).unwrap();
        assert_relative_eq!(report.class("a").unwrap().counts.false_positives, 0.0);
    }

    #[test]
    fn test_nothing_to_evaluate() {
        let results: BTreeMap<ShapeId, Vec<Match>> =
            [(ShapeId::from("u"), ranked(&["u"]))].into_iter().collect();
        assert!(matches!(
            Evaluator::new(1).evaluate(&results, &labels()),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            Evaluator::new(1).evaluate(&results, &BTreeMap::new()),
            Err(Error::CorpusEmpty)
        ));
    }

    #[test]
    fn test_result_outside_corpus_rejected() {
        let results: BTreeMap<ShapeId, Vec<Match>> =
            [(ShapeId::from("a1"), ranked(&["a1", "zz", "yy"]))]
                .into_iter()
                .collect();
        assert!(matches!(
            Evaluator::new(3).evaluate(&results, &labels()),
            Err(Error::InvalidData(_))
        ));

        // Beyond k the extra results are never looked at
        let report = Evaluator::new(1).evaluate(&results, &labels()).unwrap();
        let a = report.class("a").unwrap();
        assert_relative_eq!(a.counts.total(), 5.0, epsilon = 1e-12);
        assert!(a.counts.true_negatives >= 0.0);
    }

    #[test]
    fn test_undefined_ratio_is_missing() {
        let counts = ConfusionCounts::from_query(1, 1, 1, 1);
        assert!(counts.specificity().is_nan());
        assert_relative_eq!(counts.accuracy(), 1.0);
    }
}
