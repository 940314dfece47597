//! Wire protocols for the two provider families behind the reasoning
//! client. Selection happens via the static model catalog; this module
//! only knows how to speak each API.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use relay_core::config::LlmConfig;

use crate::client::{CompletionRequest, ProviderError, ProviderTransport, RawCompletion, ResponseShape};
use crate::models::{ModelSpec, Provider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const JSON_SHAPE_INSTRUCTION: &str =
    "Respond with a single valid JSON object and nothing else.";

pub struct HttpTransport {
    http: reqwest::Client,
    openai_api_key: Option<SecretString>,
    anthropic_api_key: Option<SecretString>,
    openai_base_url: String,
    anthropic_base_url: String,
}

impl HttpTransport {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            openai_api_key: config.openai_api_key.clone(),
            anthropic_api_key: config.anthropic_api_key.clone(),
            openai_base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            anthropic_base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call_openai(
        &self,
        spec: &ModelSpec,
        request: &CompletionRequest,
    ) -> Result<RawCompletion, ProviderError> {
        let api_key = self
            .openai_api_key
            .as_ref()
            .ok_or(ProviderError::MissingApiKey(Provider::OpenAi))?;

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": spec.api_model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.shape == ResponseShape::Json && spec.supports_json {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.openai_base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| ProviderError::Transport {
                provider: Provider::OpenAi,
                message: error.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                provider: Provider::OpenAi,
                retry_after: retry_after_hint(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: Provider::OpenAi,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OpenAiResponse = response.json().await.map_err(|error| {
            ProviderError::MalformedResponse(format!("openai response decode: {error}"))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();

        Ok(RawCompletion {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    async fn call_anthropic(
        &self,
        spec: &ModelSpec,
        request: &CompletionRequest,
    ) -> Result<RawCompletion, ProviderError> {
        let api_key = self
            .anthropic_api_key
            .as_ref()
            .ok_or(ProviderError::MissingApiKey(Provider::Anthropic))?;

        // No native JSON mode; the shape becomes a system instruction.
        let system = match (&request.system, request.shape) {
            (Some(system), ResponseShape::Json) => {
                Some(format!("{system}\n\n{JSON_SHAPE_INSTRUCTION}"))
            }
            (Some(system), ResponseShape::Text) => Some(system.clone()),
            (None, ResponseShape::Json) => Some(JSON_SHAPE_INSTRUCTION.to_string()),
            (None, ResponseShape::Text) => None,
        };

        let mut body = json!({
            "model": spec.api_model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let response = self
            .http
            .post(format!("{}/v1/messages", self.anthropic_base_url))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|error| ProviderError::Transport {
                provider: Provider::Anthropic,
                message: error.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                provider: Provider::Anthropic,
                retry_after: retry_after_hint(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: Provider::Anthropic,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|error| {
            ProviderError::MalformedResponse(format!("anthropic response decode: {error}"))
        })?;

        let text = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .unwrap_or_default();

        Ok(RawCompletion {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

#[async_trait::async_trait]
impl ProviderTransport for HttpTransport {
    async fn execute(
        &self,
        spec: &ModelSpec,
        request: &CompletionRequest,
    ) -> Result<RawCompletion, ProviderError> {
        match spec.provider {
            Provider::OpenAi => self.call_openai(spec, request).await,
            Provider::Anthropic => self.call_anthropic(spec, request).await,
        }
    }
}

fn retry_after_hint(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::{AnthropicResponse, OpenAiResponse};

    #[test]
    fn decodes_openai_completion_payload() {
        let raw = r#"{
            "choices": [{"message": {"content": "{\"action\":\"NO_ACTION\"}"}}],
            "usage": {"prompt_tokens": 210, "completion_tokens": 45}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).expect("decode");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"action\":\"NO_ACTION\"}")
        );
        assert_eq!(parsed.usage.expect("usage").prompt_tokens, 210);
    }

    #[test]
    fn decodes_anthropic_message_payload() {
        let raw = r#"{
            "content": [{"type": "text", "text": "looks fine"}],
            "usage": {"input_tokens": 120, "output_tokens": 30}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).expect("decode");
        assert_eq!(parsed.content[0].text.as_deref(), Some("looks fine"));
        assert_eq!(parsed.usage.output_tokens, 30);
    }

    #[test]
    fn tolerates_missing_usage_blocks() {
        let parsed: OpenAiResponse = serde_json::from_str(r#"{"choices": []}"#).expect("decode");
        assert!(parsed.usage.is_none());
        assert!(parsed.choices.is_empty());
    }
}
