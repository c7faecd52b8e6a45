//! Ranking and optional relevance filtering of retrieved documents

use crate::config::RetrievalConfig;
use crate::models::RetrievedDocument;
use std::cmp::Ordering;

pub struct SourceRanker {
    min_relevance: Option<f64>,
}

impl SourceRanker {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            min_relevance: config.min_relevance,
        }
    }

    /// Descending by relevance, stable on ties; then the threshold filter
    /// if one is configured.
    pub fn rank(&self, mut documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        documents.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(Ordering::Equal)
        });

        match self.min_relevance {
            Some(threshold) => documents
                .into_iter()
                .filter(|d| d.relevance >= threshold)
                .collect(),
            None => documents,
        }
    }
}

impl Default for SourceRanker {
    fn default() -> Self {
        Self::new(&RetrievalConfig::default())
    }
}
