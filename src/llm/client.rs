use crate::error::Result;
use crate::llm::types::CompletionRequest;
use async_trait::async_trait;

/// Anything that can turn a message list into one reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[cfg(feature = "openai")]
pub use openai::{image_data_url, OpenAiClient};

#[cfg(feature = "openai")]
mod openai {
    use super::CompletionClient;
    use crate::config::CompletionConfig;
    use crate::error::{CompletionFailureKind, FarmSmartError, Result};
    use crate::llm::types::*;
    use async_trait::async_trait;
    use base64::Engine;
    use log::{debug, info};
    use reqwest::{Client, StatusCode};
    use secrecy::{ExposeSecret, SecretString};
    use std::path::Path;
    use std::time::Duration;
    use tokio::fs;

    /// Chat-completions client for OpenAI-compatible endpoints.
    #[derive(Clone)]
    pub struct OpenAiClient {
        client: Client,
        api_key: SecretString,
        api_base: String,
        text_model: String,
        vision_model: String,
        temperature: f32,
        max_tokens: u32,
    }

    impl std::fmt::Debug for OpenAiClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OpenAiClient")
                .field("api_key", &"[REDACTED]")
                .field("api_base", &self.api_base)
                .field("text_model", &self.text_model)
                .field("vision_model", &self.vision_model)
                .finish()
        }
    }

    impl OpenAiClient {
        pub fn new(config: &CompletionConfig) -> Result<Self> {
            let api_key = config.api_key.clone().ok_or_else(|| {
                FarmSmartError::Config(
                    "No API key. Set completion.api_key or OPENAI_API_KEY".to_string(),
                )
            })?;

            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| {
                    FarmSmartError::Config(format!("Failed to create HTTP client: {}", e))
                })?;

            Ok(Self {
                client,
                api_key: SecretString::from(api_key),
                api_base: config.api_base.trim_end_matches('/').to_string(),
                text_model: config.text_model.clone(),
                vision_model: config.vision_model.clone(),
                temperature: config.chat_temperature,
                max_tokens: config.max_tokens,
            })
        }

        fn model_for(&self, variant: ModelVariant) -> &str {
            match variant {
                ModelVariant::Text => &self.text_model,
                ModelVariant::Vision => &self.vision_model,
            }
        }
    }

    fn failure_kind(status: StatusCode) -> CompletionFailureKind {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionFailureKind::Auth,
            StatusCode::TOO_MANY_REQUESTS => CompletionFailureKind::RateLimit,
            _ => CompletionFailureKind::Upstream,
        }
    }

    #[async_trait]
    impl CompletionClient for OpenAiClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            let model = self.model_for(request.model);
            let payload = ChatCompletionRequest {
                model,
                messages: &request.messages,
                temperature: request.temperature.unwrap_or(self.temperature),
                max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            };

            info!(
                "Requesting completion (model: {}, messages: {})",
                model,
                request.messages.len()
            );

            let url = format!("{}/chat/completions", self.api_base);
            let res = self
                .client
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    FarmSmartError::completion(CompletionFailureKind::Network, e.to_string())
                })?;

            let status = res.status();
            if !status.is_success() {
                let body = res.text().await.unwrap_or_default();
                return Err(FarmSmartError::completion(
                    failure_kind(status),
                    format!("API error (status {}): {}", status, body),
                ));
            }

            let body: ChatCompletionResponse = res.json().await.map_err(|e| {
                FarmSmartError::completion(
                    CompletionFailureKind::Upstream,
                    format!("Malformed response body: {}", e),
                )
            })?;

            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|text| !text.trim().is_empty())
                .ok_or_else(|| {
                    FarmSmartError::completion(
                        CompletionFailureKind::EmptyResponse,
                        "No content in completion response",
                    )
                })?;

            debug!("Received {} chars from {}", content.len(), model);
            Ok(content)
        }
    }

    /// Reads a local image into a `data:` URI usable as a message image reference.
    pub async fn image_data_url(path: &Path) -> Result<String> {
        let mime_type = mime_guess::from_path(path).first_or_octet_stream();
        if mime_type.type_() != mime_guess::mime::IMAGE {
            return Err(FarmSmartError::InvalidInput(format!(
                "{} is not an image ({})",
                path.display(),
                mime_type
            )));
        }

        let bytes = fs::read(path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:{};base64,{}", mime_type, encoded))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_status_mapping() {
            assert_eq!(
                failure_kind(StatusCode::UNAUTHORIZED),
                CompletionFailureKind::Auth
            );
            assert_eq!(failure_kind(StatusCode::FORBIDDEN), CompletionFailureKind::Auth);
            assert_eq!(
                failure_kind(StatusCode::TOO_MANY_REQUESTS),
                CompletionFailureKind::RateLimit
            );
            assert_eq!(
                failure_kind(StatusCode::BAD_GATEWAY),
                CompletionFailureKind::Upstream
            );
        }

        #[test]
        fn test_missing_key_is_config_error() {
            let config = CompletionConfig {
                api_key: None,
                ..CompletionConfig::default()
            };
            assert!(matches!(
                OpenAiClient::new(&config),
                Err(FarmSmartError::Config(_))
            ));
        }

        #[tokio::test]
        async fn test_image_data_url() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("leaf.png");
            tokio::fs::write(&path, [0x89, b'P', b'N', b'G']).await.unwrap();

            let url = image_data_url(&path).await.unwrap();
            assert_eq!(url, "data:image/png;base64,iVBORw==");

            let text = dir.path().join("notes.txt");
            tokio::fs::write(&text, "hi").await.unwrap();
            assert!(image_data_url(&text).await.is_err());
        }
    }
}
