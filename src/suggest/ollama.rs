use super::{build_prompt, parse_suggestion, SchemaSuggester};
use crate::config::SuggestConfig;
use crate::error::{Error, Result};
use crate::forms::fields::FieldDescriptor;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Suggester backed by an Ollama-compatible `/api/generate` endpoint
pub struct OllamaSuggester {
    client: Client,
    base_url: Url,
    model_id: String,
    temperature: f32,
}

impl OllamaSuggester {
    pub fn new(config: &SuggestConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid suggest URL: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            model_id: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid suggest URL: {}", e)))
    }
}

#[async_trait]
impl SchemaSuggester for OllamaSuggester {
    async fn suggest(&self, description: &str) -> Result<Vec<FieldDescriptor>> {
        if description.trim().is_empty() {
            return Err(Error::Validation("Form description cannot be blank".to_string()));
        }

        let url = self.endpoint("/api/generate")?;
        let request = GenerateRequest {
            model: self.model_id.clone(),
            prompt: build_prompt(description),
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        debug!("Requesting schema suggestion from {}", url);
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Suggest(e.to_string()))?;

        let parsed = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| Error::Suggest(e.to_string()))?;

        let fields = parse_suggestion(&parsed.response)?;
        info!(
            "Model '{}' suggested {} fields",
            self.model_id,
            fields.len()
        );
        Ok(fields)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
