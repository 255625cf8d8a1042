//! Query orchestration.
//!
//! One query runs at most two model calls with at most one tool invocation
//! in between:
//!
//! ```text
//! AwaitingQuery -> FirstModelCall -> Done
//!                                 -> ToolRequested -> ExecutingTool
//!                                    -> ReportingResult -> SecondModelCall -> Done
//! ```

use crate::model::{
    Backend, FunctionDeclaration, ModelReply, ModelRequest, ModelResponse, ToolCall, ToolResult,
    Transcript, Turn, Usage,
};
use crate::schema;
use crate::tools::{ToolDescriptor, ToolHost};
use crate::{Error, Result};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingQuery,
    FirstModelCall,
    ToolRequested,
    ExecutingTool,
    ReportingResult,
    SecondModelCall,
    Done,
}

/// The final answer to a query, with the conversation that produced it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub transcript: Transcript,
    /// Summed over every model call of the query.
    pub usage: Usage,
}

/// Drives a model backend and a tool host through one query at a time.
///
/// Tool declarations are translated once, when the orchestrator is built,
/// and attached to every model call.
pub struct Orchestrator<B, H> {
    backend: B,
    host: H,
    declarations: Vec<FunctionDeclaration>,
}

impl<B: Backend, H: ToolHost> Orchestrator<B, H> {
    pub fn new(backend: B, host: H) -> Self {
        let declarations = schema::declarations(host.descriptors());
        debug!(
            tools = host.descriptors().len(),
            declared = declarations.len(),
            "tool declarations ready"
        );
        Self {
            backend,
            host,
            declarations,
        }
    }

    /// Declarations sent to the model with each call.
    pub fn declarations(&self) -> &[FunctionDeclaration] {
        &self.declarations
    }

    /// Tools the host reported at startup.
    pub fn tools(&self) -> &[ToolDescriptor] {
        self.host.descriptors()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Give back the backend and host, e.g. to shut the host down.
    pub fn into_parts(self) -> (B, H) {
        (self.backend, self.host)
    }

    /// Answer a single user query.
    ///
    /// Every query starts from an empty transcript; nothing carries over
    /// between calls.
    pub async fn process_query(&self, query: &str) -> Result<Answer> {
        let span = info_span!("query", id = %Uuid::new_v4());
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: &str) -> Result<Answer> {
        let mut transcript = Transcript::new();
        let mut usage = Usage::default();

        enter(Phase::AwaitingQuery);
        debug!(query, "received query");
        transcript.push(Turn::user(query));

        enter(Phase::FirstModelCall);
        let first = self.call_model(&transcript).await?;
        usage += first.usage;

        let call = match first.reply {
            ModelReply::Text(text) => return Ok(finish(transcript, text, usage)),
            ModelReply::ToolCall(call) => call,
        };

        enter(Phase::ToolRequested);
        info!(tool = %call.name, call_id = %call.id, "model requested tool");
        transcript.push(Turn::ModelToolRequest(call.clone()));

        if !self.tools().iter().any(|tool| tool.name == call.name) {
            warn!(tool = %call.name, "model requested unknown tool");
            return Err(Error::UnknownTool { name: call.name });
        }

        enter(Phase::ExecutingTool);
        let result = self.host.invoke(&call.name, &call.arguments).await?;
        if !result.success {
            warn!(tool = %call.name, "tool reported failure");
        }

        enter(Phase::ReportingResult);
        let ToolCall { id, name, .. } = call;
        transcript.push(Turn::ToolResult(ToolResult {
            call_id: id,
            name,
            payload: result.payload,
            is_error: !result.success,
        }));

        enter(Phase::SecondModelCall);
        let second = self.call_model(&transcript).await?;
        usage += second.usage;

        match second.reply {
            ModelReply::Text(text) => Ok(finish(transcript, text, usage)),
            ModelReply::ToolCall(call) => {
                warn!(tool = %call.name, "model requested a second tool call");
                Err(Error::UnexpectedToolCall { name: call.name })
            }
        }
    }

    async fn call_model(&self, transcript: &Transcript) -> Result<ModelResponse> {
        let response = self
            .backend
            .call(ModelRequest {
                transcript,
                tools: &self.declarations,
            })
            .await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "model replied"
        );
        Ok(response)
    }
}

fn enter(phase: Phase) {
    debug!(?phase, "phase");
}

fn finish(mut transcript: Transcript, text: String, usage: Usage) -> Answer {
    transcript.push(Turn::answer(text.clone()));
    enter(Phase::Done);
    info!(
        turns = transcript.len(),
        tokens = usage.total_tokens(),
        "query answered"
    );
    Answer {
        text,
        transcript,
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use crate::tools::{ToolError, ToolInvocationResult};
    use serde_json::{Map, Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeBackend {
        replies: Mutex<VecDeque<std::result::Result<ModelResponse, ModelError>>>,
        seen: Mutex<Vec<(Transcript, Vec<FunctionDeclaration>)>>,
    }

    impl FakeBackend {
        fn new(replies: Vec<std::result::Result<ModelResponse, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Backend for FakeBackend {
        async fn call(
            &self,
            request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            self.seen
                .lock()
                .unwrap()
                .push((request.transcript.clone(), request.tools.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected model call")
        }
    }

    struct FakeHost {
        descriptors: Vec<ToolDescriptor>,
        results: Mutex<VecDeque<std::result::Result<ToolInvocationResult, ToolError>>>,
        invoked: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl FakeHost {
        fn new(results: Vec<std::result::Result<ToolInvocationResult, ToolError>>) -> Self {
            let descriptor = |name: &str, arg: &str| ToolDescriptor {
                name: name.to_string(),
                description: format!("{name} description"),
                parameter_schema: json!({
                    "type": "object",
                    "title": format!("{name}Arguments"),
                    "properties": {arg: {"type": "string", "title": arg}},
                    "required": [arg]
                }),
            };
            Self {
                descriptors: vec![
                    descriptor("get_weather", "city"),
                    descriptor("calculate", "expression"),
                    descriptor("get_time", "city"),
                ],
                results: Mutex::new(results.into()),
                invoked: Mutex::new(Vec::new()),
            }
        }

        fn invocations(&self) -> Vec<(String, Map<String, Value>)> {
            self.invoked.lock().unwrap().clone()
        }
    }

    impl ToolHost for FakeHost {
        fn descriptors(&self) -> &[ToolDescriptor] {
            &self.descriptors
        }

        async fn invoke(
            &self,
            name: &str,
            arguments: &Map<String, Value>,
        ) -> std::result::Result<ToolInvocationResult, ToolError> {
            self.invoked
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected tool invocation")
        }
    }

    fn text(text: &str) -> std::result::Result<ModelResponse, ModelError> {
        Ok(ModelResponse {
            reply: ModelReply::Text(text.to_string()),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }

    fn tool_call(name: &str, args: Value) -> std::result::Result<ModelResponse, ModelError> {
        Ok(ModelResponse {
            reply: ModelReply::ToolCall(ToolCall {
                id: "call-1".to_string(),
                name: name.to_string(),
                arguments: args.as_object().cloned().unwrap_or_default(),
            }),
            usage: Usage {
                input_tokens: 20,
                output_tokens: 3,
            },
        })
    }

    fn tool_output(name: &str, payload: &str, success: bool) -> ToolInvocationResult {
        ToolInvocationResult {
            tool_name: name.to_string(),
            arguments: Map::new(),
            payload: Value::String(payload.to_string()),
            success,
        }
    }

    #[tokio::test]
    async fn tool_round_trip() {
        let backend = FakeBackend::new(vec![
            tool_call("get_weather", json!({"city": "London"})),
            text("It's cloudy and 18°C in London."),
        ]);
        let host = FakeHost::new(vec![Ok(tool_output(
            "get_weather",
            "It's cloudy and 18°C in London.",
            true,
        ))]);
        let orchestrator = Orchestrator::new(backend, host);

        let answer = orchestrator
            .process_query("What's the weather like in London?")
            .await
            .unwrap();

        assert_eq!(answer.text, "It's cloudy and 18°C in London.");
        assert_eq!(answer.usage.input_tokens, 30);
        assert_eq!(answer.usage.output_tokens, 8);

        let turns = answer.transcript.turns();
        assert_eq!(turns.len(), 4);
        assert!(matches!(&turns[0], Turn::UserMessage { text } if text.contains("London")));
        assert!(matches!(&turns[1], Turn::ModelToolRequest(call) if call.name == "get_weather"));
        let Turn::ToolResult(result) = &turns[2] else {
            panic!("expected tool result, got {:?}", turns[2]);
        };
        assert_eq!(result.call_id, "call-1");
        assert_eq!(result.name, "get_weather");
        assert_eq!(result.payload, json!("It's cloudy and 18°C in London."));
        assert!(!result.is_error);
        assert!(matches!(&turns[3], Turn::ModelAnswer { .. }));

        let invocations = orchestrator.host().invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].0, "get_weather");
        assert_eq!(invocations[0].1["city"], "London");

        // The second call replays the transcript up to and including the result.
        let seen = orchestrator.backend().seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.turns(), [Turn::user("What's the weather like in London?")]);
        assert_eq!(
            seen[1].0.turns(),
            [
                Turn::user("What's the weather like in London?"),
                Turn::ModelToolRequest(ToolCall {
                    id: "call-1".into(),
                    name: "get_weather".into(),
                    arguments: json!({"city": "London"}).as_object().cloned().unwrap(),
                }),
                Turn::ToolResult(ToolResult {
                    call_id: "call-1".into(),
                    name: "get_weather".into(),
                    payload: json!("It's cloudy and 18°C in London."),
                    is_error: false,
                }),
            ]
        );
    }

    #[tokio::test]
    async fn direct_answer_skips_tools() {
        let backend = FakeBackend::new(vec![text("Giraffes have 7 neck vertebrae.")]);
        let orchestrator = Orchestrator::new(backend, FakeHost::new(Vec::new()));

        let answer = orchestrator
            .process_query("Tell me a fun fact about giraffes.")
            .await
            .unwrap();

        assert_eq!(answer.text, "Giraffes have 7 neck vertebrae.");
        assert_eq!(answer.transcript.len(), 2);
        assert_eq!(answer.transcript.tool_requests().count(), 0);
        assert_eq!(orchestrator.backend().calls(), 1);
        assert!(orchestrator.host().invocations().is_empty());
    }

    #[tokio::test]
    async fn declarations_go_with_every_call() {
        let backend = FakeBackend::new(vec![
            tool_call("calculate", json!({"expression": "123 * 45 + 9"})),
            text("5544"),
        ]);
        let host = FakeHost::new(vec![Ok(tool_output("calculate", "The result is: 5544", true))]);
        let orchestrator = Orchestrator::new(backend, host);
        assert_eq!(orchestrator.declarations().len(), 3);
        assert!(
            orchestrator.declarations()[0].parameters.as_ref().unwrap()["properties"]["city"]
                .get("title")
                .is_none()
        );

        orchestrator.process_query("What is 123 * 45 + 9?").await.unwrap();

        let seen = orchestrator.backend().seen.lock().unwrap();
        for (_, tools) in seen.iter() {
            assert_eq!(tools.as_slice(), orchestrator.declarations());
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_invoked() {
        let backend = FakeBackend::new(vec![tool_call("launch_rocket", json!({}))]);
        let orchestrator = Orchestrator::new(backend, FakeHost::new(Vec::new()));

        let err = orchestrator.process_query("Go").await.unwrap_err();

        assert!(matches!(err, Error::UnknownTool { name } if name == "launch_rocket"));
        assert!(orchestrator.host().invocations().is_empty());
        assert_eq!(orchestrator.backend().calls(), 1);
    }

    #[tokio::test]
    async fn second_tool_call_is_unexpected() {
        let backend = FakeBackend::new(vec![
            tool_call("get_time", json!({"city": "Tokyo"})),
            tool_call("get_weather", json!({"city": "Tokyo"})),
        ]);
        let host = FakeHost::new(vec![Ok(tool_output("get_time", "12:00", true))]);
        let orchestrator = Orchestrator::new(backend, host);

        let err = orchestrator
            .process_query("What time is it in Tokyo?")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnexpectedToolCall { name } if name == "get_weather"));
        assert_eq!(orchestrator.host().invocations().len(), 1);
    }

    #[tokio::test]
    async fn model_failure_ends_query() {
        let backend = FakeBackend::new(vec![Err(ModelError::Api {
            status: 403,
            body: "API key not valid".into(),
        })]);
        let orchestrator = Orchestrator::new(backend, FakeHost::new(Vec::new()));

        let err = orchestrator.process_query("Hi").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Api { status: 403, .. })));
    }

    #[tokio::test]
    async fn model_failure_after_tool_ends_query() {
        let backend = FakeBackend::new(vec![
            tool_call("calculate", json!({"expression": "2 + 2"})),
            Err(ModelError::Network("connection reset".into())),
        ]);
        let host = FakeHost::new(vec![Ok(tool_output("calculate", "The result is: 4", true))]);
        let orchestrator = Orchestrator::new(backend, host);

        let err = orchestrator.process_query("What is 2 + 2?").await.unwrap_err();

        assert!(matches!(err, Error::Model(ModelError::Network(_))));
        assert_eq!(orchestrator.host().invocations().len(), 1);
        assert_eq!(orchestrator.backend().calls(), 2);
    }

    #[tokio::test]
    async fn tool_host_failure_skips_second_call() {
        let backend = FakeBackend::new(vec![tool_call("get_weather", json!({"city": "Paris"}))]);
        let host = FakeHost::new(vec![Err(ToolError::Unavailable("server exited".into()))]);
        let orchestrator = Orchestrator::new(backend, host);

        let err = orchestrator.process_query("Weather?").await.unwrap_err();

        assert!(matches!(err, Error::ToolHost(ToolError::Unavailable(_))));
        assert_eq!(orchestrator.backend().calls(), 1);
    }

    #[tokio::test]
    async fn failed_tool_result_is_reported_to_model() {
        let backend = FakeBackend::new(vec![
            tool_call("calculate", json!({"expression": "1/0"})),
            text("That expression divides by zero."),
        ]);
        let host = FakeHost::new(vec![Ok(tool_output(
            "calculate",
            "Error evaluating expression: division by zero",
            false,
        ))]);
        let orchestrator = Orchestrator::new(backend, host);

        let answer = orchestrator.process_query("What is 1/0?").await.unwrap();

        assert_eq!(answer.text, "That expression divides by zero.");
        let seen = orchestrator.backend().seen.lock().unwrap();
        let reported = seen[1].0.turns().last().cloned();
        assert!(matches!(reported, Some(Turn::ToolResult(ToolResult { is_error: true, .. }))));
    }

    #[tokio::test]
    async fn queries_do_not_share_history() {
        let backend = FakeBackend::new(vec![text("one"), text("two")]);
        let orchestrator = Orchestrator::new(backend, FakeHost::new(Vec::new()));

        orchestrator.process_query("first").await.unwrap();
        let answer = orchestrator.process_query("second").await.unwrap();

        assert_eq!(answer.transcript.len(), 2);
        assert_eq!(answer.transcript.turns()[0], Turn::user("second"));
    }
}
