//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`OpenAiProvider`]** — calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`** — runs models locally via fastembed (feature `local-embeddings`).
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//!
//! Providers are constructed once via [`create_provider`] and injected
//! into the index builder and retriever; nothing reads ambient globals.
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Maps text to fixed-dimension float vectors.
///
/// All vectors from one provider share the dimension reported by
/// [`dims`](EmbeddingProvider::dims); the index loader checks it against
/// the persisted artifact before serving queries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// L2-normalize a vector in place so inner product equals cosine
/// similarity. Zero vectors are left unchanged.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    config: EmbeddingConfig,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            dims,
            config: config.clone(),
        })
    }
}

/// Typed shape of the OpenAI embeddings response. Anything that does not
/// deserialize into this is an explicit error, never a silently-partial
/// result.
#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = post_with_retry(
            &client,
            "https://api.openai.com/v1/embeddings",
            Some(&api_key),
            &body,
            self.config.max_retries,
        )
        .await?;

        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Invalid OpenAI embeddings response: {}", e))?;

        let mut items = parsed.data;
        items.sort_by_key(|item| item.index);
        if items.len() != texts.len() {
            bail!(
                "OpenAI returned {} embeddings for {} inputs",
                items.len(),
                texts.len()
            );
        }

        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model pulled locally
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    config: EmbeddingConfig,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            config: config.clone(),
        })
    }
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = post_with_retry(
            &client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.config.max_retries,
        )
        .await?;

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Invalid Ollama embed response: {}", e))?;

        if parsed.embeddings.len() != texts.len() {
            bail!(
                "Ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            );
        }

        Ok(parsed.embeddings)
    }
}

/// POST a JSON body with exponential-backoff retry on 429/5xx/network
/// errors. Returns the successful response; non-retryable client errors
/// fail immediately.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<reqwest::Response> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", url, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} error {}: {}", url, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("request to {} failed: {}", url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("request failed after retries")))
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed. Models are
/// downloaded on first use from Hugging Face and cached; after that,
/// embedding runs entirely offline.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "all-minilm-l6-v2" => 384,
            "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" => 768,
            "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-base" => 768,
            _ => 384,
        });

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
        })
    }

    fn fastembed_model(&self) -> Result<fastembed::EmbeddingModel> {
        match self.model_name.as_str() {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, \
                 bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5, multilingual-e5-base",
                other
            ),
        }
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.fastembed_model()?;
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut embedder = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Create the appropriate [`EmbeddingProvider`] from configuration.
///
/// | Config value | Provider |
/// |--------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAiProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_length() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0f32, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_openai_response_shape() {
        let json = r#"{"data":[{"index":1,"embedding":[0.5,0.5]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        let mut parsed: OpenAiEmbeddingResponse = serde_json::from_str(json).unwrap();
        parsed.data.sort_by_key(|item| item.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
        assert_eq!(parsed.data[1].embedding, vec![0.5, 0.5]);
    }

    #[test]
    fn test_malformed_response_is_an_error() {
        let json = r#"{"outputs":[[0.1,0.2]]}"#;
        assert!(serde_json::from_str::<OllamaEmbedResponse>(json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let result = DisabledProvider.embed(&["hello".to_string()]).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = EmbeddingConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
