//! AI-invocation collaborator for the tldr and translate modifiers.
//!
//! A unified blocking interface over the OpenAI chat-completions and
//! Anthropic messages APIs, with provider auto-detection from environment
//! keys. Failures are returned as [`AiError`] values; the modifier pipeline
//! converts them to inline markers so a broken AI call never aborts a
//! document.

use crate::context::AiSelection;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upper bound on one AI HTTP round trip.
pub const AI_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Model-name override consulted between the per-call override and the
/// provider default.
pub const MODEL_ENV_VAR: &str = "TEXPAND_AI_MODEL";

#[derive(Error, Debug)]
pub enum AiError {
    #[error("no AI provider configured (set OPENAI_API_KEY or ANTHROPIC_API_KEY)")]
    NoProvider,

    #[error("unknown AI provider: {0}")]
    UnknownProvider(String),

    #[error("{0} not set")]
    MissingKey(&'static str),

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("error calling {provider} API: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API returned an empty response")]
    EmptyResponse { provider: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }

    const fn key_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-haiku-20240307",
        }
    }
}

/// Result of one AI invocation, carrying the model actually used so the
/// tldr header can name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiOutput {
    pub model: String,
    pub text: String,
}

/// Synchronous AI collaborator consumed by the modifier pipeline.
pub trait AiInvoker {
    fn summarize(&self, text: &str, selection: &AiSelection) -> Result<AiOutput, AiError>;

    fn translate(
        &self,
        text: &str,
        lang: &str,
        selection: &AiSelection,
    ) -> Result<AiOutput, AiError>;
}

fn env_nonempty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

/// Fully resolved provider/model/key for one call.
struct ResolvedCall {
    provider: Provider,
    model: String,
    api_key: String,
}

fn resolve_call(selection: &AiSelection) -> Result<ResolvedCall, AiError> {
    let provider = match &selection.provider {
        Some(name) => {
            Provider::from_name(name).ok_or_else(|| AiError::UnknownProvider(name.clone()))?
        }
        None => {
            if env_nonempty(Provider::OpenAi.key_var()).is_some() {
                Provider::OpenAi
            } else if env_nonempty(Provider::Anthropic.key_var()).is_some() {
                Provider::Anthropic
            } else {
                return Err(AiError::NoProvider);
            }
        }
    };

    let api_key = selection
        .api_key
        .clone()
        .or_else(|| env_nonempty(provider.key_var()))
        .ok_or(AiError::MissingKey(provider.key_var()))?;

    let model = selection
        .model
        .clone()
        .or_else(|| env_nonempty(MODEL_ENV_VAR))
        .unwrap_or_else(|| provider.default_model().to_string());

    Ok(ResolvedCall {
        provider,
        model,
        api_key,
    })
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

/// Live implementation speaking the provider HTTP APIs.
pub struct LiveAi {
    client: reqwest::blocking::Client,
}

impl LiveAi {
    pub fn new() -> Result<Self, AiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(AI_HTTP_TIMEOUT)
            .build()
            .map_err(AiError::Client)?;
        Ok(Self { client })
    }

    fn call(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        selection: &AiSelection,
    ) -> Result<AiOutput, AiError> {
        let call = resolve_call(selection)?;
        let text = match call.provider {
            Provider::OpenAi => self.call_openai(prompt, system, max_tokens, &call)?,
            Provider::Anthropic => self.call_anthropic(prompt, system, max_tokens, &call)?,
        };
        Ok(AiOutput {
            model: call.model,
            text,
        })
    }

    fn call_openai(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        call: &ResolvedCall,
    ) -> Result<String, AiError> {
        let http = |source| AiError::Http {
            provider: call.provider.label(),
            source,
        };

        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatCompletionRequest {
            model: &call.model,
            messages,
            max_tokens,
        };

        let response: ChatCompletionResponse = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&call.api_key)
            .json(&request)
            .send()
            .map_err(http)?
            .error_for_status()
            .map_err(http)?
            .json()
            .map_err(http)?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(AiError::EmptyResponse {
                provider: call.provider.label(),
            })
    }

    fn call_anthropic(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        call: &ResolvedCall,
    ) -> Result<String, AiError> {
        let http = |source| AiError::Http {
            provider: call.provider.label(),
            source,
        };

        let request = AnthropicRequest {
            model: &call.model,
            max_tokens,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: AnthropicResponse = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &call.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .map_err(http)?
            .error_for_status()
            .map_err(http)?
            .json()
            .map_err(http)?;

        let text = response
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(AiError::EmptyResponse {
                provider: call.provider.label(),
            });
        }
        Ok(text)
    }
}

impl AiInvoker for LiveAi {
    fn summarize(&self, text: &str, selection: &AiSelection) -> Result<AiOutput, AiError> {
        let system = "You are a technical documentation assistant. Create concise summaries.";
        let prompt = format!(
            "Create a brief summary (TL;DR) of the following text.\n\
             Focus on key points and main ideas.\n\
             Use 2-5 bullet points.\n\n\
             Text to summarize:\n{text}"
        );
        self.call(&prompt, Some(system), 2000, selection)
    }

    fn translate(
        &self,
        text: &str,
        lang: &str,
        selection: &AiSelection,
    ) -> Result<AiOutput, AiError> {
        let prompt = format!(
            "Translate the following text to {lang}.\n\
             Preserve all formatting, markdown syntax, and code blocks.\n\
             Only return the translated text, nothing else.\n\n\
             Text to translate:\n{text}"
        );
        self.call(&prompt, None, 8000, selection)
    }
}

/// Deterministic stand-in for tests and `--mock-ai` runs. Never touches the
/// network or the environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockAi;

impl AiInvoker for MockAi {
    fn summarize(&self, text: &str, _selection: &AiSelection) -> Result<AiOutput, AiError> {
        Ok(AiOutput {
            model: "mock".to_string(),
            text: format!("- mock summary ({} chars)", text.trim().len()),
        })
    }

    fn translate(
        &self,
        text: &str,
        lang: &str,
        _selection: &AiSelection,
    ) -> Result<AiOutput, AiError> {
        Ok(AiOutput {
            model: "mock".to_string(),
            text: format!("[{lang}] {text}"),
        })
    }
}

/// AI collaborator that fails every call; used to exercise the modifier
/// pipeline's failure markers.
#[cfg(test)]
pub struct FailingAi;

#[cfg(test)]
impl AiInvoker for FailingAi {
    fn summarize(&self, _text: &str, _selection: &AiSelection) -> Result<AiOutput, AiError> {
        Err(AiError::NoProvider)
    }

    fn translate(
        &self,
        _text: &str,
        _lang: &str,
        _selection: &AiSelection,
    ) -> Result<AiOutput, AiError> {
        Err(AiError::NoProvider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_name() {
        assert_eq!(Provider::from_name("openai"), Some(Provider::OpenAi));
        assert_eq!(Provider::from_name("Anthropic"), Some(Provider::Anthropic));
        assert_eq!(Provider::from_name("cohere"), None);
    }

    #[test]
    fn test_resolve_call_explicit_overrides() {
        let selection = AiSelection {
            provider: Some("anthropic".to_string()),
            model: Some("claude-3-5-sonnet-20241022".to_string()),
            api_key: Some("sk-test".to_string()),
        };
        let call = resolve_call(&selection).unwrap();
        assert_eq!(call.provider, Provider::Anthropic);
        assert_eq!(call.model, "claude-3-5-sonnet-20241022");
        assert_eq!(call.api_key, "sk-test");
    }

    #[test]
    fn test_resolve_call_unknown_provider() {
        let selection = AiSelection {
            provider: Some("cohere".to_string()),
            ..AiSelection::default()
        };
        assert!(matches!(
            resolve_call(&selection),
            Err(AiError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_mock_summarize() {
        let output = MockAi.summarize("some text", &AiSelection::default()).unwrap();
        assert_eq!(output.model, "mock");
        assert!(output.text.starts_with("- mock summary"));
    }

    #[test]
    fn test_mock_translate() {
        let output = MockAi
            .translate("hello", "it", &AiSelection::default())
            .unwrap();
        assert_eq!(output.text, "[it] hello");
    }

    #[test]
    fn test_error_display() {
        let err = AiError::MissingKey("ANTHROPIC_API_KEY");
        assert_eq!(format!("{err}"), "ANTHROPIC_API_KEY not set");

        let err = AiError::UnknownProvider("cohere".to_string());
        assert_eq!(format!("{err}"), "unknown AI provider: cohere");
    }
}
