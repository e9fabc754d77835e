//! Nearest-neighbour identity matching against the gallery.

use crate::gallery::GalleryEntry;
use crate::types::{Embedding, Identity};

/// Result of matching a query embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Index of the closest gallery entry, if the gallery was non-empty.
    pub best_index: Option<usize>,
    /// Distance to the closest entry (`f32::INFINITY` for an empty gallery).
    pub distance: f32,
    /// The closest entry is also within tolerance.
    pub matched: bool,
}

impl MatchOutcome {
    /// Resolve the outcome to an identity label.
    pub fn identity(&self, gallery: &[GalleryEntry]) -> Identity {
        match self.best_index {
            Some(idx) if self.matched => Identity::Known(gallery[idx].name.clone()),
            _ => Identity::Unknown,
        }
    }
}

/// Strategy for comparing a query embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &[GalleryEntry]) -> MatchOutcome;
}

/// Euclidean nearest-neighbour matcher with a fixed tolerance.
///
/// The closest entry wins; on equal distances the earliest entry in gallery
/// order is kept. A match additionally requires `distance <= tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub tolerance: f32,
}

impl EuclideanMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// Whether two embeddings are close enough to be the same person.
    pub fn is_match(&self, distance: f32) -> bool {
        distance <= self.tolerance
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, gallery: &[GalleryEntry]) -> MatchOutcome {
        let mut best_distance = f32::INFINITY;
        let mut best_index: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let distance = query.euclidean_distance(&entry.embedding);
            // Strict comparison keeps the first of several equal minima.
            if distance < best_distance || (best_index.is_none() && distance.is_infinite()) {
                best_distance = distance;
                best_index = Some(i);
            }
        }

        MatchOutcome {
            best_index,
            distance: best_distance,
            matched: best_index.is_some() && self.is_match(best_distance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            name: name.into(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_exact_match() {
        let gallery = vec![
            entry("alice", vec![1.0, 0.0, 0.0]),
            entry("bob", vec![0.0, 1.0, 0.0]),
        ];
        let query = Embedding::new(vec![0.0, 1.0, 0.0]);
        let outcome = EuclideanMatcher::new(0.6).compare(&query, &gallery);
        assert!(outcome.matched);
        assert_eq!(outcome.best_index, Some(1));
        assert_eq!(outcome.distance, 0.0);
        assert_eq!(outcome.identity(&gallery), Identity::Known("bob".into()));
    }

    #[test]
    fn test_closest_but_outside_tolerance() {
        let gallery = vec![entry("alice", vec![0.0, 0.0])];
        let query = Embedding::new(vec![3.0, 4.0]);
        let outcome = EuclideanMatcher::new(0.6).compare(&query, &gallery);
        assert_eq!(outcome.best_index, Some(0));
        assert!(!outcome.matched);
        assert_eq!(outcome.identity(&gallery), Identity::Unknown);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let gallery = vec![entry("alice", vec![0.0, 0.0])];
        let query = Embedding::new(vec![0.0, 0.5]);
        let outcome = EuclideanMatcher::new(0.5).compare(&query, &gallery);
        assert!(outcome.matched);
    }

    #[test]
    fn test_tie_prefers_first_entry() {
        let gallery = vec![
            entry("first", vec![1.0, 0.0]),
            entry("second", vec![1.0, 0.0]),
            entry("third", vec![-1.0, 0.0]),
        ];
        let query = Embedding::new(vec![1.0, 0.1]);
        let outcome = EuclideanMatcher::new(0.6).compare(&query, &gallery);
        assert_eq!(outcome.identity(&gallery), Identity::Known("first".into()));
    }

    #[test]
    fn test_only_argmin_is_considered() {
        // Both entries are within tolerance; the closer one must win even
        // though it comes later in gallery order.
        let gallery = vec![
            entry("near", vec![0.3, 0.0]),
            entry("nearest", vec![0.1, 0.0]),
        ];
        let query = Embedding::new(vec![0.0, 0.0]);
        let outcome = EuclideanMatcher::new(0.6).compare(&query, &gallery);
        assert_eq!(outcome.identity(&gallery), Identity::Known("nearest".into()));
    }

    #[test]
    fn test_empty_gallery() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let outcome = EuclideanMatcher::new(0.6).compare(&query, &[]);
        assert!(!outcome.matched);
        assert_eq!(outcome.best_index, None);
        assert!(outcome.distance.is_infinite());
        assert_eq!(outcome.identity(&[]), Identity::Unknown);
    }

    #[test]
    fn test_dimension_mismatch_never_matches() {
        let gallery = vec![entry("alice", vec![1.0, 0.0, 0.0])];
        let query = Embedding::new(vec![1.0, 0.0]);
        let outcome = EuclideanMatcher::new(10.0).compare(&query, &gallery);
        assert!(!outcome.matched);
    }
}
