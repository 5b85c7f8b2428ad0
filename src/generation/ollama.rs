//! Ollama 生成后端
//!
//! 以 raw 模式调用 /api/generate，流式响应为按行分隔的 JSON。

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::{GenerateOptions, TokenGenerator, TokenStream};
use crate::config::GeneratorConfig;
use crate::error::{AppError, Result};

pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.ollama_url.clone(),
            model_name: config.model_name.clone(),
        })
    }

    fn request_body(&self, prompt: &str, options: &GenerateOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model_name,
            "prompt": prompt,
            "stream": stream,
            "raw": true,
            "options": {
                "num_ctx": options.num_ctx,
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
                "top_k": options.top_k,
                "top_p": options.top_p,
                "stop": options.stop,
            }
        })
    }
}

#[async_trait]
impl TokenGenerator for OllamaGenerator {
    async fn stream(&self, prompt: &str, options: &GenerateOptions) -> Result<TokenStream> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(prompt, options, true))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let (tx, rx) = mpsc::channel::<Result<String>>(32);

        // The reader task ends on its own when the receiver side is dropped,
        // which cancels the in-flight generation.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut line_buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(AppError::Generation(format!(
                                "stream interrupted: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };

                line_buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(newline) = line_buffer.find('\n') {
                    let line: String = line_buffer.drain(..=newline).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: GenerateChunk = match serde_json::from_str(line) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            warn!(error = %e, "unparseable generate chunk, skipping");
                            continue;
                        }
                    };

                    if !parsed.response.is_empty()
                        && tx.send(Ok(parsed.response)).await.is_err()
                    {
                        debug!("token receiver dropped, cancelling generation");
                        return;
                    }

                    if parsed.done {
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn complete(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(prompt, options, false))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let parsed: GenerateChunk = response.json().await?;
        Ok(parsed.response)
    }
}
