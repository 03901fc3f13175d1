use copycheck_core::{EmbeddingProvider, Embeddings, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_bool(key: &str) -> bool {
    env(key)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

pub const DEFAULT_EMBED_MODEL: &str = "all-MiniLM-L6-v2";

/// Which embedding backends the environment enables (names only).
pub fn configured_embedders() -> Vec<&'static str> {
    let mut out = Vec::new();
    if env("COPYCHECK_EMBED_BASE_URL").is_some() {
        out.push("openai_compat");
    }
    if env_bool("COPYCHECK_OLLAMA_ENABLE") {
        out.push("ollama");
    }
    out
}

/// Build an embedder by name (`auto`, `openai_compat`, `ollama`, `none`).
///
/// `auto` never fails: with nothing configured it returns [`NoEmbeddings`] and scoring runs
/// lexically. Naming a backend explicitly without its configuration is an error.
pub fn embedder_from_env(name: &str, client: reqwest::Client) -> Result<Arc<dyn EmbeddingProvider>> {
    match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "openai_compat" | "openai" => Ok(Arc::new(OpenAiCompatEmbedder::from_env(client)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::from_env(client)?)),
        "none" => Ok(Arc::new(NoEmbeddings)),
        "auto" => {
            if let Ok(e) = OpenAiCompatEmbedder::from_env(client.clone()) {
                return Ok(Arc::new(e));
            }
            if let Ok(e) = OllamaEmbedder::from_env(client) {
                return Ok(Arc::new(e));
            }
            tracing::info!("no embedding backend configured; similarity will be lexical");
            Ok(Arc::new(NoEmbeddings))
        }
        other => Err(Error::NotConfigured(format!(
            "unknown embedder {other:?} (allowed: auto, openai_compat, ollama, none)"
        ))),
    }
}

/// Lexical-only operation: every batch is reported unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmbeddings;

#[async_trait::async_trait]
impl EmbeddingProvider for NoEmbeddings {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn embed(&self, _texts: &[String]) -> Embeddings {
        Embeddings::Unavailable
    }
}

/// Any server speaking the OpenAI `/v1/embeddings` shape (OpenAI, vLLM, TEI, llama.cpp, …).
#[derive(Debug, Clone)]
pub struct OpenAiCompatEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatEmbedder {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url = env("COPYCHECK_EMBED_BASE_URL").ok_or_else(|| {
            Error::NotConfigured("missing COPYCHECK_EMBED_BASE_URL".to_string())
        })?;
        Ok(Self {
            client,
            base_url,
            api_key: env("COPYCHECK_EMBED_API_KEY"),
            model: env("COPYCHECK_EMBED_MODEL").unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
        })
    }

    fn endpoint_embeddings(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let req = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };
        let mut rb = self
            .client
            .post(self.endpoint_embeddings())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }
        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Embed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Embed(format!("openai_compat embeddings HTTP {status}")));
        }
        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| Error::Embed(e.to_string()))?;

        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for (pos, item) in parsed.data.into_iter().enumerate() {
            let idx = item.index.unwrap_or(pos);
            if let (Some(slot), Some(v)) = (out.get_mut(idx), item.embedding) {
                if !v.is_empty() {
                    *slot = Some(v);
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: Option<usize>,
    embedding: Option<Vec<f32>>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiCompatEmbedder {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn embed(&self, texts: &[String]) -> Embeddings {
        if texts.is_empty() {
            return Embeddings::Available(Vec::new());
        }
        match self.request(texts).await {
            Ok(v) => Embeddings::Available(v),
            Err(e) => {
                tracing::warn!(error = %e, inputs = texts.len(), "embedding batch failed");
                Embeddings::Unavailable
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        // Opt-in: don't start calling localhost unless asked to.
        if !env_bool("COPYCHECK_OLLAMA_ENABLE") {
            return Err(Error::NotConfigured(
                "COPYCHECK_OLLAMA_ENABLE is not set (or false)".to_string(),
            ));
        }
        let base_url = env("COPYCHECK_OLLAMA_BASE_URL")
            .unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
        let model =
            env("COPYCHECK_OLLAMA_EMBED_MODEL").unwrap_or_else(|| "all-minilm".to_string());
        Ok(Self {
            client,
            base_url,
            model,
        })
    }

    fn endpoint_embed(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let req = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };
        let resp = self
            .client
            .post(self.endpoint_embed())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Embed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Embed(format!("ollama embed HTTP {status}")));
        }
        let parsed: OllamaEmbedResponse = resp
            .json()
            .await
            .map_err(|e| Error::Embed(e.to_string()))?;

        let mut out: Vec<Option<Vec<f32>>> = parsed
            .embeddings
            .into_iter()
            .map(|v| Some(v).filter(|v| !v.is_empty()))
            .collect();
        out.resize(texts.len(), None);
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn embed(&self, texts: &[String]) -> Embeddings {
        if texts.is_empty() {
            return Embeddings::Available(Vec::new());
        }
        match self.request(texts).await {
            Ok(v) => Embeddings::Available(v),
            Err(e) => {
                tracing::warn!(error = %e, inputs = texts.len(), "embedding batch failed");
                Embeddings::Unavailable
            }
        }
    }
}
