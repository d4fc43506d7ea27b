//! In-memory vector index over embedded fragments.
//!
//! The index is built wholesale from a corpus snapshot and never mutated;
//! corpus changes invalidate it and the next query rebuilds from scratch.
//! Search is brute-force cosine similarity over all stored vectors, which is
//! fine at upload-corpus scale and keeps ranking exactly the embedding
//! similarity metric.

use anyhow::{bail, Result};

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Fragment;

/// A similarity-searchable index: one embedding per fragment.
pub struct VectorIndex {
    entries: Vec<(Fragment, Vec<f32>)>,
}

impl VectorIndex {
    /// Embed `fragments` and build an index over the resulting vectors.
    ///
    /// Returns `Ok(None)` for empty input — an absent index, never an
    /// empty-but-present one. An embedding failure leaves no index behind.
    pub async fn build(
        fragments: Vec<Fragment>,
        embedder: &dyn Embedder,
    ) -> Result<Option<VectorIndex>> {
        if fragments.is_empty() {
            return Ok(None);
        }

        let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != fragments.len() {
            bail!(
                "Embedder returned {} vectors for {} fragments",
                vectors.len(),
                fragments.len()
            );
        }

        Ok(Some(VectorIndex {
            entries: fragments.into_iter().zip(vectors).collect(),
        }))
    }

    /// Return the top-`k` fragments by cosine similarity to `query_vec`,
    /// most similar first.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<&Fragment> {
        let mut scored: Vec<(f32, &Fragment)> = self
            .entries
            .iter()
            .map(|(fragment, vec)| (cosine_similarity(query_vec, vec), fragment))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored.into_iter().map(|(_, f)| f).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Maps each text to a fixed vector by looking at its first word.
    struct TableEmbedder;

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.split_whitespace().next() {
                    Some("alpha") => vec![1.0, 0.0, 0.0],
                    Some("beta") => vec![0.0, 1.0, 0.0],
                    _ => vec![0.0, 0.0, 1.0],
                })
                .collect())
        }
    }

    fn fragment(text: &str, source: &str, page: usize) -> Fragment {
        Fragment {
            text: text.to_string(),
            source: source.to_string(),
            page,
        }
    }

    #[tokio::test]
    async fn build_empty_input_yields_no_index() {
        let built = VectorIndex::build(Vec::new(), &TableEmbedder).await.unwrap();
        assert!(built.is_none());
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let fragments = vec![
            fragment("alpha text", "a.pdf", 1),
            fragment("beta text", "b.pdf", 2),
            fragment("gamma text", "c.pdf", 3),
        ];
        let index = VectorIndex::build(fragments, &TableEmbedder)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.search(&[0.0, 1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "b.pdf");
    }

    #[tokio::test]
    async fn search_k_larger_than_index_returns_all() {
        let fragments = vec![fragment("alpha", "a.pdf", 1)];
        let index = VectorIndex::build(fragments, &TableEmbedder)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).len(), 1);
    }
}
