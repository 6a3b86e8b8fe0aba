//! Cross-encoder reranking over first-stage candidates.
//!
//! A reranker scores each (query, passage) pair jointly and is more
//! accurate than bi-encoder cosine similarity, at the cost of one scored
//! forward pass per candidate. It only ever reorders the candidate set
//! the vector search returned; it cannot surface a passage the first
//! stage missed.
//!
//! Rerank failures are soft by contract: callers catch
//! [`RagError::RerankUnavailable`] and fall back to vector-similarity
//! order rather than failing the request.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::RerankConfig;
use crate::error::{RagError, Result};

/// Scores query/passage pairs. Higher is more relevant; scores are
/// model-specific (cross-encoder logits, not cosine similarities) and
/// only comparable within a single call.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// True when this instance can actually score pairs.
    fn is_enabled(&self) -> bool;

    /// Score `texts` against `query`, one score per text, in input order.
    async fn predict(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}

// ============ Disabled Reranker ============

/// Placeholder used when no rerank endpoint is configured.
pub struct DisabledReranker;

#[async_trait]
impl Reranker for DisabledReranker {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn predict(&self, _query: &str, _texts: &[String]) -> Result<Vec<f32>> {
        Err(RagError::RerankUnavailable(
            "reranking is not configured".to_string(),
        ))
    }
}

// ============ HTTP Reranker ============

/// Reranker backed by an HTTP cross-encoder service.
///
/// Sends `POST {url}` with `{"query": ..., "texts": [...], "model": ...}`
/// and expects `{"scores": [...]}` back, one float per input text. TEI
/// (`/rerank`) and similar model servers speak this shape.
pub struct HttpReranker {
    url: String,
    model: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

impl HttpReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let url = config.url.clone().ok_or_else(|| {
            RagError::Configuration("rerank.url is required for the HTTP reranker".to_string())
        })?;
        Ok(Self {
            url,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn predict(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RagError::RerankUnavailable(format!("client build failed: {}", e)))?;

        let mut body = serde_json::json!({
            "query": query,
            "texts": texts,
        });
        if let Some(model) = &self.model {
            body["model"] = serde_json::Value::String(model.clone());
        }

        let response = client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::RerankUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::RerankUnavailable(format!(
                "{} returned {}: {}",
                self.url, status, body_text
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagError::RerankUnavailable(format!("invalid response: {}", e)))?;

        if parsed.scores.len() != texts.len() {
            return Err(RagError::RerankUnavailable(format!(
                "got {} scores for {} texts",
                parsed.scores.len(),
                texts.len()
            )));
        }

        Ok(parsed.scores)
    }
}

/// Build a reranker from configuration; unset `rerank.url` yields the
/// disabled placeholder.
pub fn create_reranker(config: &RerankConfig) -> Result<Box<dyn Reranker>> {
    if config.is_enabled() {
        Ok(Box::new(HttpReranker::new(config)?))
    } else {
        Ok(Box::new(DisabledReranker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_reranker_is_unavailable() {
        let reranker = DisabledReranker;
        assert!(!reranker.is_enabled());
        let err = reranker
            .predict("query", &["passage".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RerankUnavailable(_)));
    }

    #[test]
    fn test_create_reranker_from_config() {
        let disabled = create_reranker(&RerankConfig::default()).unwrap();
        assert!(!disabled.is_enabled());

        let enabled = create_reranker(&RerankConfig {
            url: Some("http://localhost:8080/rerank".to_string()),
            model: None,
            timeout_secs: 10,
        })
        .unwrap();
        assert!(enabled.is_enabled());
    }

    #[test]
    fn test_response_shape() {
        let parsed: RerankResponse =
            serde_json::from_str(r#"{"scores":[0.9,-2.5,0.1]}"#).unwrap();
        assert_eq!(parsed.scores.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_soft_error() {
        let reranker = HttpReranker::new(&RerankConfig {
            url: Some("http://127.0.0.1:1/rerank".to_string()),
            model: None,
            timeout_secs: 1,
        })
        .unwrap();

        let err = reranker
            .predict("query", &["passage".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RerankUnavailable(_)));
    }
}
