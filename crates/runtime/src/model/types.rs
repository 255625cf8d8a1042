use super::errors::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::ops::AddAssign;

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the request with its result in logs.
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// The outcome of a tool call as reported back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub payload: Value,
    /// Set when the tool ran but reported a failure.
    #[serde(default)]
    pub is_error: bool,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum Turn {
    UserMessage { text: String },
    ModelToolRequest(ToolCall),
    ToolResult(ToolResult),
    ModelAnswer { text: String },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage { text: text.into() }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self::ModelAnswer { text: text.into() }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserMessage { text } => write!(f, "user: {text}"),
            Self::ModelToolRequest(call) => {
                let args = Value::Object(call.arguments.clone());
                write!(f, "model -> {}({args})", call.name)
            }
            Self::ToolResult(result) => {
                let marker = if result.is_error { " (error)" } else { "" };
                let payload = match &result.payload {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                write!(f, "tool {}{marker}: {payload}", result.name)
            }
            Self::ModelAnswer { text } => write!(f, "model: {text}"),
        }
    }
}

/// Ordered, append-only conversation history for one query.
///
/// Replayed verbatim to the model, so turns are never edited or reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Tool calls the model made during this conversation.
    pub fn tool_requests(&self) -> impl Iterator<Item = &ToolCall> {
        self.turns.iter().filter_map(|turn| match turn {
            Turn::ModelToolRequest(call) => Some(call),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// A tool as declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// Absent for tools that take no arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// What the model answered: final text or a single tool request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCall(ToolCall),
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub transcript: &'a Transcript,
    pub tools: &'a [FunctionDeclaration],
}

/// The response from a model.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub reply: ModelReply,
    pub usage: Usage,
}

/// Trait for LLM provider backends.
///
/// Tool selection is always left to the model: implementations must neither
/// force nor disable tool use.
pub trait Backend: Send + Sync {
    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_call() -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "get_weather".into(),
            arguments: json!({"city": "London"}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn transcript_keeps_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("hi"));
        transcript.push(Turn::ModelToolRequest(weather_call()));
        transcript.push(Turn::answer("done"));

        assert_eq!(transcript.len(), 3);
        assert!(matches!(transcript.turns()[0], Turn::UserMessage { .. }));
        assert!(matches!(transcript.turns()[2], Turn::ModelAnswer { .. }));
        assert_eq!(transcript.tool_requests().count(), 1);
    }

    #[test]
    fn turn_display() {
        let result = ToolResult {
            call_id: "1".into(),
            name: "get_weather".into(),
            payload: Value::String("cloudy".into()),
            is_error: true,
        };
        assert_eq!(Turn::user("hi").to_string(), "user: hi");
        assert_eq!(
            Turn::ModelToolRequest(weather_call()).to_string(),
            r#"model -> get_weather({"city":"London"})"#
        );
        assert_eq!(
            Turn::ToolResult(result).to_string(),
            "tool get_weather (error): cloudy"
        );
    }

    #[test]
    fn turn_serializes_with_tag() {
        let json = serde_json::to_value(Turn::answer("ok")).unwrap();
        assert_eq!(json, json!({"turn": "model_answer", "text": "ok"}));
    }

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage {
            input_tokens: 10,
            output_tokens: 5,
        };
        usage += Usage {
            input_tokens: 20,
            output_tokens: 7,
        };
        assert_eq!(usage.total_tokens(), 42);
    }
}
