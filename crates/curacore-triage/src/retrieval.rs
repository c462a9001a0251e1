//! Top-k chunk retrieval over the corpus index.

use std::sync::Arc;

use curacore_config::RetrievalConfig;
use curacore_corpus::{CorpusError, CorpusIndex};
use curacore_llm::SharedEmbedder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, TriageError};

/// A chunk returned by the retriever, most relevant first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub distance: f32,
}

/// Embeds queries and looks them up in the corpus.
///
/// The embedder must be the one the corpus was built with; [`Retriever::new`]
/// refuses anything else.
pub struct Retriever {
    embedder: SharedEmbedder,
    index: Option<Arc<CorpusIndex>>,
    k: usize,
    max_distance: Option<f32>,
}

impl Retriever {
    pub fn new(embedder: SharedEmbedder, index: Arc<CorpusIndex>, config: &RetrievalConfig) -> Result<Self> {
        check_embedding_space(&embedder, &index)?;
        Ok(Self {
            embedder,
            index: Some(index),
            k: config.k,
            max_distance: config.max_distance,
        })
    }

    /// A retriever with no corpus. Every search comes back empty.
    pub fn ungrounded(embedder: SharedEmbedder) -> Self {
        Self {
            embedder,
            index: None,
            k: RetrievalConfig::default().k,
            max_distance: None,
        }
    }

    /// Default number of chunks per search.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn index(&self) -> Option<&Arc<CorpusIndex>> {
        self.index.as_ref()
    }

    /// The `k` nearest chunks to `query`, ascending by distance.
    ///
    /// An empty corpus yields an empty result, not an error.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let Some(index) = &self.index else {
            return Err(TriageError::retrieval("no corpus index configured"));
        };

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| TriageError::retrieval(format!("query embedding failed: {}", e)))?;

        let index = Arc::clone(index);
        let max_distance = self.max_distance;
        let hits = tokio::task::spawn_blocking(move || index.query(&embedding, k, max_distance))
            .await
            .map_err(|e| TriageError::retrieval(format!("search task failed: {}", e)))?
            .map_err(|e| TriageError::retrieval(e.to_string()))?;

        debug!(k, found = hits.len(), "Retrieved reference chunks");
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.text,
                source: hit.source,
                distance: hit.distance,
            })
            .collect())
    }

    /// [`search`](Self::search) with the configured `k`, degrading any
    /// failure to "no grounding available".
    pub async fn search_or_empty(&self, query: &str) -> Vec<RetrievedChunk> {
        match self.search(query, self.k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Retrieval unavailable, continuing without grounding");
                Vec::new()
            }
        }
    }
}

/// Query and corpus must share one embedding model and dimensionality.
pub fn check_embedding_space(embedder: &SharedEmbedder, index: &CorpusIndex) -> Result<()> {
    if embedder.dimensions() != index.dimensions() || embedder.name() != index.embedder() {
        return Err(TriageError::Corpus(CorpusError::EmbeddingMismatch {
            collection: index.collection().to_string(),
            stored_embedder: index.embedder().to_string(),
            stored_dims: index.dimensions(),
            requested_embedder: embedder.name().to_string(),
            requested_dims: embedder.dimensions(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curacore_corpus::IndexedChunk;
    use curacore_llm::{Embedder, MockEmbedder};

    async fn seeded_index(embedder: &MockEmbedder, texts: &[&str]) -> Arc<CorpusIndex> {
        let index =
            CorpusIndex::open_in_memory("medical_docs", embedder.dimensions(), embedder.name())
                .unwrap();
        let mut chunks = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let embedding = embedder.embed(text).await.unwrap();
            chunks.push(IndexedChunk::new("guide.txt", i, *text, embedding));
        }
        index.upsert(&chunks).unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_search_ranks_by_distance() {
        let embedder = MockEmbedder::new(64);
        let index = seeded_index(
            &embedder,
            &[
                "fever and headache treatment",
                "sprained ankle care",
                "managing a high fever in adults",
                "skin rash and itching",
            ],
        )
        .await;
        let retriever = Retriever::new(Arc::new(embedder), index, &RetrievalConfig::default()).unwrap();

        let chunks = retriever.search("fever headache", 3).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "fever and headache treatment");
        assert!(chunks.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_search_at_most_k_and_empty_corpus() {
        let embedder = MockEmbedder::new(64);
        let index = seeded_index(&embedder, &[]).await;
        let retriever = Retriever::new(Arc::new(embedder), index, &RetrievalConfig::default()).unwrap();
        assert!(retriever.search("anything", 3).await.unwrap().is_empty());

        let embedder = MockEmbedder::new(64);
        let index = seeded_index(&embedder, &["a b", "c d"]).await;
        let retriever = Retriever::new(Arc::new(embedder), index, &RetrievalConfig::default()).unwrap();
        assert_eq!(retriever.search("a", 1).await.unwrap().len(), 1);
        assert_eq!(retriever.search("a", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_embedding_space_mismatch_rejected() {
        let index = Arc::new(CorpusIndex::open_in_memory("c", 32, "mock").unwrap());
        let result = Retriever::new(
            Arc::new(MockEmbedder::new(64)),
            index,
            &RetrievalConfig::default(),
        );
        assert!(matches!(
            result,
            Err(TriageError::Corpus(CorpusError::EmbeddingMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_ungrounded_degrades_to_empty() {
        let retriever = Retriever::ungrounded(Arc::new(MockEmbedder::new(8)));
        assert!(matches!(
            retriever.search("fever", 3).await,
            Err(TriageError::RetrievalUnavailable(_))
        ));
        assert!(retriever.search_or_empty("fever").await.is_empty());
    }
}
