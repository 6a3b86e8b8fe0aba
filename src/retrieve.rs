//! Query-time retrieval pipeline.
//!
//! The [`Retriever`] owns everything the request path needs: the
//! embedding provider, the normalizer, the reranker, and an atomically
//! swappable snapshot of the loaded index. Queries go through the exact
//! normalization the indexed documents went through, so lexical rules
//! unify spelling on both sides of the similarity comparison.
//!
//! Reranking is best-effort: if the cross-encoder endpoint is down or
//! misbehaves, the retriever logs a warning and returns results in
//! vector-similarity order instead of failing the request.

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::config::Config;
use crate::embedding::{create_provider, embed_query, l2_normalize, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::SearchIndex;
use crate::models::RetrievalResult;
use crate::normalize::Normalizer;
use crate::rerank::{create_reranker, Reranker};

pub struct Retriever {
    provider: Box<dyn EmbeddingProvider>,
    normalizer: Normalizer,
    reranker: Box<dyn Reranker>,
    index: RwLock<Arc<SearchIndex>>,
    config: Config,
}

impl Retriever {
    /// Load the persisted index and assemble the full query pipeline.
    ///
    /// Fails fast on missing artifacts or an index whose dimension does
    /// not match the configured embedding model.
    pub fn open(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)
            .map_err(|e| RagError::Configuration(e.to_string()))?;
        let normalizer = Normalizer::new(&config.normalize)
            .map_err(|e| RagError::Configuration(e.to_string()))?;
        let reranker = create_reranker(&config.rerank)?;

        let index = SearchIndex::load(&config.paths.index, &config.paths.meta, provider.as_ref())?;

        Ok(Self {
            provider,
            normalizer,
            reranker,
            index: RwLock::new(Arc::new(index)),
            config: config.clone(),
        })
    }

    /// Assemble a retriever from explicit parts. Lets embedding hosts
    /// supply their own provider or reranker implementations.
    pub fn from_parts(
        provider: Box<dyn EmbeddingProvider>,
        normalizer: Normalizer,
        reranker: Box<dyn Reranker>,
        index: SearchIndex,
        config: Config,
    ) -> Self {
        Self {
            provider,
            normalizer,
            reranker,
            index: RwLock::new(Arc::new(index)),
            config,
        }
    }

    /// Re-read the artifacts from disk and swap the snapshot in place.
    /// In-flight queries keep the snapshot they already hold.
    pub fn reload(&self) -> Result<()> {
        let fresh = SearchIndex::load(
            &self.config.paths.index,
            &self.config.paths.meta,
            self.provider.as_ref(),
        )?;
        let mut guard = self
            .index
            .write()
            .map_err(|_| RagError::Retrieval(anyhow!("index lock poisoned")))?;
        *guard = Arc::new(fresh);
        Ok(())
    }

    fn snapshot(&self) -> Result<Arc<SearchIndex>> {
        let guard = self
            .index
            .read()
            .map_err(|_| RagError::Retrieval(anyhow!("index lock poisoned")))?;
        Ok(Arc::clone(&guard))
    }

    /// Retrieve the `top_k` most relevant chunks for a query.
    ///
    /// `history` is prior conversation text; when present it is
    /// prepended to the query before embedding so follow-up questions
    /// carry their referents. Blank queries return an empty result
    /// rather than an error.
    pub async fn retrieve(
        &self,
        query: &str,
        history: Option<&str>,
        top_k: usize,
        use_rerank: bool,
    ) -> Result<Vec<RetrievalResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let full_query = match history.map(str::trim).filter(|h| !h.is_empty()) {
            Some(history) => format!("{} {}", history, query),
            None => query.to_string(),
        };
        let normalized = self.normalizer.normalize(&full_query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let mut vector = embed_query(self.provider.as_ref(), &normalized)
            .await
            .map_err(RagError::Retrieval)?;
        if vector.len() != self.provider.dims() {
            return Err(RagError::Retrieval(anyhow!(
                "provider returned dim {} for a dim-{} model",
                vector.len(),
                self.provider.dims()
            )));
        }
        l2_normalize(&mut vector);

        let snapshot = self.snapshot()?;
        let hits = snapshot
            .hnsw
            .search_with_ef(&vector, top_k, self.config.index.ef_search);

        let mut results: Vec<RetrievalResult> = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            let Some(meta) = lookup_meta(&snapshot, id) else {
                warn!(chunk_id = id, "search hit has no metadata record");
                continue;
            };
            results.push(RetrievalResult {
                chunk_id: id,
                source: meta.source.clone(),
                section: meta.section.clone(),
                text: meta.text.clone(),
                score,
                rerank_score: None,
            });
        }

        if use_rerank && self.reranker.is_enabled() && !results.is_empty() {
            self.apply_rerank(&normalized, &mut results).await;
        }

        debug!(query_len = query.len(), hits = results.len(), "retrieve");
        Ok(results)
    }

    /// Score results with the cross-encoder and reorder. Any failure
    /// leaves the vector-similarity order intact.
    async fn apply_rerank(&self, query: &str, results: &mut [RetrievalResult]) {
        let texts: Vec<String> = results.iter().map(|r| r.text.clone()).collect();
        match self.reranker.predict(query, &texts).await {
            Ok(scores) => {
                for (result, score) in results.iter_mut().zip(scores) {
                    result.rerank_score = Some(score);
                }
                results.sort_by(|a, b| b.effective_score().total_cmp(&a.effective_score()));
            }
            Err(e) => {
                warn!(error = %e, "rerank failed; returning vector-order results");
            }
        }
    }

    /// Chunk count in the current snapshot.
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.meta.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Ids are dense positions into the metadata array; fall back to a scan
/// if the artifacts disagree.
fn lookup_meta(index: &SearchIndex, id: i64) -> Option<&crate::models::ChunkMeta> {
    if id >= 0 {
        if let Some(meta) = index.meta.get(id as usize) {
            if meta.id == id {
                return Some(meta);
            }
        }
    }
    index.meta.iter().find(|m| m.id == id)
}

/// Run the search CLI command and print results.
pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    no_rerank: bool,
    history: Option<&str>,
) -> Result<()> {
    let retriever = Retriever::open(config)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let results = retriever.retrieve(query, history, top_k, !no_rerank).await?;

    if results.is_empty() {
        println!("no results");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let section = result.section.as_deref().unwrap_or("-");
        match result.rerank_score {
            Some(rerank) => println!(
                "{}. [{:.4} | rerank {:.4}] {} :: {}",
                rank + 1,
                result.score,
                rerank,
                result.source,
                section
            ),
            None => println!(
                "{}. [{:.4}] {} :: {}",
                rank + 1,
                result.score,
                result.source,
                section
            ),
        }
        println!("   {}", result.text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeConfig;
    use crate::hnsw::{HnswIndex, HnswParams};
    use crate::models::ChunkMeta;
    use crate::rerank::DisabledReranker;
    use async_trait::async_trait;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    /// Deterministic bag-of-words projection. Texts sharing tokens get
    /// similar vectors, which is enough to exercise ranking.
    struct BagProvider {
        dims: usize,
    }

    impl BagProvider {
        fn embed_one(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; self.dims];
            for token in text.to_lowercase().split_whitespace() {
                let mut hasher = DefaultHasher::new();
                token.hash(&mut hasher);
                v[(hasher.finish() % self.dims as u64) as usize] += 1.0;
            }
            l2_normalize(&mut v);
            v
        }
    }

    #[async_trait]
    impl EmbeddingProvider for BagProvider {
        fn model_name(&self) -> &str {
            "bag-of-words"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| self.embed_one(t)).collect())
        }
    }

    /// Reranker that always reverses the candidate order.
    struct ReversingReranker;

    #[async_trait]
    impl Reranker for ReversingReranker {
        fn is_enabled(&self) -> bool {
            true
        }
        async fn predict(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>> {
            Ok((0..texts.len()).map(|i| i as f32).collect())
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        fn is_enabled(&self) -> bool {
            true
        }
        async fn predict(&self, _query: &str, _texts: &[String]) -> Result<Vec<f32>> {
            Err(RagError::RerankUnavailable("endpoint down".to_string()))
        }
    }

    fn test_config() -> Config {
        toml::from_str(
            r#"
[paths]
index = "unused.bin"
meta = "unused.json"
"#,
        )
        .unwrap()
    }

    async fn build_retriever(texts: &[&str], reranker: Box<dyn Reranker>) -> Retriever {
        let provider = BagProvider { dims: 64 };
        let params = HnswParams {
            m: 8,
            ef_construction: 64,
            ef_search: 32,
        };
        let mut hnsw = HnswIndex::new(provider.dims(), params);
        let mut meta = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let v = provider.embed_one(text);
            hnsw.add(&v, i as i64).unwrap();
            meta.push(ChunkMeta {
                id: i as i64,
                source: "doc.txt".to_string(),
                section: None,
                text: text.to_string(),
            });
        }

        let normalizer = Normalizer::new(&NormalizeConfig::default()).unwrap();
        Retriever::from_parts(
            Box::new(provider),
            normalizer,
            reranker,
            SearchIndex { hnsw, meta },
            test_config(),
        )
    }

    #[tokio::test]
    async fn test_blank_query_returns_empty() {
        let retriever = build_retriever(&["some indexed text"], Box::new(DisabledReranker)).await;
        assert!(retriever.retrieve("", None, 5, true).await.unwrap().is_empty());
        assert!(retriever
            .retrieve("   \n ", None, 5, true)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_retrieves_matching_chunk_first() {
        let retriever = build_retriever(
            &[
                "hostel rooms are allotted by rank and category",
                "the library opens at eight in the morning",
                "placement statistics for the previous year",
            ],
            Box::new(DisabledReranker),
        )
        .await;

        let results = retriever
            .retrieve("when does the library open", None, 3, true)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(results[0].text.contains("library"));
        assert_eq!(results[0].source, "doc.txt");
        assert!(results[0].rerank_score.is_none());
        assert_eq!(retriever.len().unwrap(), 3);
        assert!(!retriever.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_rerank_reorders_results() {
        let retriever = build_retriever(
            &[
                "alpha beta gamma facts about admissions",
                "alpha beta delta facts about admissions",
            ],
            Box::new(ReversingReranker),
        )
        .await;

        let results = retriever
            .retrieve("alpha beta admissions", None, 2, true)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        // ReversingReranker gives the last vector-order candidate the
        // highest score.
        assert!(results[0].rerank_score.unwrap() > results[1].rerank_score.unwrap());
    }

    #[tokio::test]
    async fn test_rerank_failure_falls_back_to_vector_order() {
        let retriever = build_retriever(
            &[
                "hostel rooms are allotted by rank and category",
                "the library opens at eight in the morning",
            ],
            Box::new(FailingReranker),
        )
        .await;

        let baseline = retriever
            .retrieve("library opening hours", None, 2, false)
            .await
            .unwrap();
        let results = retriever
            .retrieve("library opening hours", None, 2, true)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.rerank_score.is_none()));
        // The failed rerank leaves the vector-similarity order intact.
        let order: Vec<i64> = results.iter().map(|r| r.chunk_id).collect();
        let base_order: Vec<i64> = baseline.iter().map(|r| r.chunk_id).collect();
        assert_eq!(order, base_order);
    }

    #[tokio::test]
    async fn test_no_rerank_flag_skips_reranker() {
        let retriever = build_retriever(
            &["alpha beta gamma", "alpha beta delta"],
            Box::new(ReversingReranker),
        )
        .await;

        let results = retriever
            .retrieve("alpha beta", None, 2, false)
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.rerank_score.is_none()));
    }

    #[tokio::test]
    async fn test_history_changes_the_embedded_query() {
        let retriever = build_retriever(
            &[
                "hostel fees are due at the start of each semester",
                "exam results are published on the portal",
            ],
            Box::new(DisabledReranker),
        )
        .await;

        // "when are they due" alone is ambiguous; history supplies the
        // hostel-fee referent.
        let results = retriever
            .retrieve("when are they due", Some("tell me about hostel fees"), 1, true)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("hostel fees"));
    }
}
