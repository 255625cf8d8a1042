//! Gemini `generateContent` backend.

use crate::model::{
    Backend, FunctionDeclaration, ModelError, ModelReply, ModelRequest, ModelResponse, ToolCall,
    Transcript, Turn, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API key. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ApiToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum ApiPart {
    Text(String),
    FunctionCall(ApiFunctionCall),
    FunctionResponse(ApiFunctionResponse),
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    args: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTool<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiToolConfig {
    function_calling_config: ApiFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCallingConfig {
    mode: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    prompt_feedback: Option<ApiPromptFeedback>,
    usage_metadata: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseContent {
    #[serde(default)]
    parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponsePart {
    text: Option<String>,
    function_call: Option<ApiResponseFunctionCall>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunctionCall {
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiBackendBuilder {
    api_key: ApiKey,
    model: String,
    base_url: String,
    system: Option<String>,
    max_output_tokens: Option<u32>,
    timeout: Option<Duration>,
}

impl GeminiBackendBuilder {
    pub fn new(api_key: impl Into<ApiKey>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system: None,
            max_output_tokens: None,
            timeout: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    /// Per-request timeout. Without one a call waits indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> GeminiBackend {
        GeminiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            system: self.system,
            max_output_tokens: self.max_output_tokens,
            timeout: self.timeout,
        }
    }
}

/// Gemini API backend.
#[derive(Debug)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    system: Option<String>,
    max_output_tokens: Option<u32>,
    timeout: Option<Duration>,
}

impl GeminiBackend {
    pub fn builder(api_key: impl Into<ApiKey>, model: impl Into<String>) -> GeminiBackendBuilder {
        GeminiBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn turn_to_api(turn: &Turn) -> ApiContent {
        let (role, part) = match turn {
            Turn::UserMessage { text } => ("user", ApiPart::Text(text.clone())),
            Turn::ModelToolRequest(call) => (
                "model",
                ApiPart::FunctionCall(ApiFunctionCall {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }),
            ),
            Turn::ToolResult(result) => {
                let key = if result.is_error { "error" } else { "result" };
                let mut response = Map::new();
                response.insert(key.to_string(), result.payload.clone());
                (
                    "function",
                    ApiPart::FunctionResponse(ApiFunctionResponse {
                        name: result.name.clone(),
                        response: Value::Object(response),
                    }),
                )
            }
            Turn::ModelAnswer { text } => ("model", ApiPart::Text(text.clone())),
        };

        ApiContent {
            role: Some(role),
            parts: vec![part],
        }
    }

    fn build_request<'a>(
        &self,
        transcript: &Transcript,
        tools: &'a [FunctionDeclaration],
    ) -> ApiRequest<'a> {
        let has_tools = !tools.is_empty();
        ApiRequest {
            contents: transcript.iter().map(Self::turn_to_api).collect(),
            tools: if has_tools {
                vec![ApiTool {
                    function_declarations: tools,
                }]
            } else {
                Vec::new()
            },
            tool_config: has_tools.then_some(ApiToolConfig {
                function_calling_config: ApiFunctionCallingConfig { mode: "AUTO" },
            }),
            system_instruction: self.system.as_ref().map(|text| ApiContent {
                role: None,
                parts: vec![ApiPart::Text(text.clone())],
            }),
            generation_config: self
                .max_output_tokens
                .map(|max_output_tokens| ApiGenerationConfig { max_output_tokens }),
        }
    }

    fn parse_response(response: ApiResponse) -> Result<ModelResponse, ModelError> {
        let usage = response
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Err(match response.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => ModelError::Blocked(reason),
                None => ModelError::InvalidResponse("response has no candidates".into()),
            });
        };

        let parts: Vec<ApiResponsePart> = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.thought)
            .collect();

        let mut calls = Vec::new();
        let mut texts = Vec::new();
        for part in parts {
            if let Some(call) = part.function_call {
                calls.push(call);
            } else if let Some(text) = part.text {
                texts.push(text);
            }
        }

        let reply = match calls.len() {
            0 if texts.is_empty() => {
                return Err(match candidate.finish_reason {
                    Some(reason) if reason != "STOP" => ModelError::Blocked(reason),
                    _ => ModelError::InvalidResponse("candidate has no content".into()),
                });
            }
            0 => ModelReply::Text(texts.concat()),
            1 => {
                let call = calls.remove(0);
                ModelReply::ToolCall(ToolCall {
                    id: call
                        .id
                        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                    name: call.name,
                    arguments: call.args,
                })
            }
            n => {
                return Err(ModelError::InvalidResponse(format!(
                    "model requested {n} tool calls at once"
                )));
            }
        };

        Ok(ModelResponse { reply, usage })
    }
}

impl fmt::Display for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gemini({})", self.model)
    }
}

impl GeminiBackend {
    fn http_request(&self, body: &ApiRequest<'_>) -> reqwest::RequestBuilder {
        let req = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose())
            .json(body);
        match self.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }
}

impl Backend for GeminiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = self.build_request(request.transcript, request.tools);

        debug!(
            model = %self.model,
            turns = api_request.contents.len(),
            tools = request.tools.len(),
            "calling generateContent"
        );

        let response = self
            .http_request(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Self::parse_response(api_response)
    }
}
