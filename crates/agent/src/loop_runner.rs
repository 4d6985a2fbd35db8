//! The conversation loop: generate, parse tool calls, execute, repeat.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use turnstile_config::AgentConfig;
use turnstile_core::backend::{Backend, GenerationRequest};
use turnstile_core::chat::ChatResponse;
use turnstile_core::error::BackendError;
use turnstile_core::message::Message;
use turnstile_core::profile::Profile;
use turnstile_core::registry::ToolRegistry;

use crate::nudge::NudgePolicy;
use crate::parser::{
    build_system_prompt, extract_final_content, extract_thinking, format_tool_results,
    parse_tool_calls,
};
use crate::stream_event::{EventKind, GenerationEvent, StreamLimits};

/// Where progress events go. Send failures (the receiver hung up) are
/// ignored; the run continues to completion.
pub type EventSink = mpsc::Sender<GenerationEvent>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Drives one conversation turn against a backend.
///
/// The loop holds no per-conversation state, so one instance serves every
/// request. Callers are responsible for serializing generations.
pub struct ConversationLoop {
    backend: Arc<dyn Backend>,
    registry: Arc<ToolRegistry>,
    nudge: NudgePolicy,
    limits: StreamLimits,
}

impl ConversationLoop {
    pub fn new(backend: Arc<dyn Backend>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            registry,
            nudge: NudgePolicy::default(),
            limits: StreamLimits::default(),
        }
    }

    pub fn from_config(
        backend: Arc<dyn Backend>,
        registry: Arc<ToolRegistry>,
        config: &AgentConfig,
    ) -> Self {
        Self::new(backend, registry)
            .with_nudge_policy(NudgePolicy::from_config(config))
            .with_stream_limits(StreamLimits::from_config(config))
    }

    pub fn with_nudge_policy(mut self, nudge: NudgePolicy) -> Self {
        self.nudge = nudge;
        self
    }

    pub fn with_stream_limits(mut self, limits: StreamLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one user turn to completion.
    ///
    /// Terminates within `profile.max_tool_rounds` rounds. Running out of
    /// rounds is not an error: the last response's content is returned
    /// with `finished = false`.
    pub async fn run(
        &self,
        profile: &Profile,
        history: &[Message],
        user_message: &str,
        events: Option<&EventSink>,
    ) -> Result<ChatResponse, AgentError> {
        let system_prompt = build_system_prompt(profile);
        let max_rounds = profile.max_tool_rounds.max(1);

        let mut conversation: Vec<Message> = history.to_vec();
        conversation.push(Message::user(user_message));

        let mut all_calls = Vec::new();
        let mut all_results = Vec::new();
        let mut response = String::new();

        info!(
            profile = %profile.name,
            history = history.len(),
            max_rounds,
            "Starting conversation"
        );

        for round_index in 0..max_rounds {
            let round = round_index + 1;
            emit(events, EventKind::RoundStart { round, max_rounds }).await;

            let mut messages = Vec::with_capacity(conversation.len() + 1);
            messages.push(Message::system(system_prompt.as_str()));
            messages.extend(conversation.iter().cloned());

            emit(events, EventKind::Generating { round, max_rounds }).await;
            debug!(round, messages = messages.len(), "Generating");

            response = self
                .backend
                .generate(GenerationRequest {
                    messages,
                    max_tokens: profile.max_tokens,
                    temperature: profile.temperature,
                })
                .await?;

            if let Some(thinking) = extract_thinking(&response).filter(|t| !t.is_empty()) {
                let content = self.limits.truncate_thinking(&thinking);
                emit(events, EventKind::Thinking { content, round, max_rounds }).await;
            }

            let calls = parse_tool_calls(&response);

            if calls.is_empty() {
                let content = extract_final_content(&response);

                if self
                    .nudge
                    .should_nudge(&response, &content, round_index, profile.has_tools())
                {
                    info!(round, "Backend reasoned without acting, nudging");
                    conversation.push(Message::assistant(response.as_str()));
                    conversation.push(Message::user(self.nudge.message.as_str()));
                    continue;
                }

                info!(round, tool_calls = all_calls.len(), "Conversation finished");
                return Ok(ChatResponse {
                    content,
                    tool_calls: all_calls,
                    tool_results: all_results,
                    rounds_used: round,
                    finished: true,
                });
            }

            debug!(round, count = calls.len(), "Executing tool calls");

            let mut round_results = Vec::with_capacity(calls.len());
            for call in calls {
                emit(
                    events,
                    EventKind::ToolStart {
                        tool_name: call.name.clone(),
                        tool_args: self.limits.truncate_args(&call.arguments),
                        round,
                        max_rounds,
                    },
                )
                .await;

                let result = self.registry.execute_call(&call).await;

                emit(
                    events,
                    EventKind::ToolEnd {
                        tool_name: call.name.clone(),
                        tool_result: self.limits.truncate_result(&result.result),
                        round,
                        max_rounds,
                    },
                )
                .await;

                round_results.push(result);
                all_calls.push(call);
            }

            conversation.push(Message::assistant(response.as_str()));
            conversation.push(Message::user(format_tool_results(&round_results)));
            all_results.extend(round_results);
        }

        warn!(
            profile = %profile.name,
            max_rounds,
            tool_calls = all_calls.len(),
            "Round budget exhausted"
        );

        Ok(ChatResponse {
            content: extract_final_content(&response),
            tool_calls: all_calls,
            tool_results: all_results,
            rounds_used: max_rounds,
            finished: false,
        })
    }
}

async fn emit(events: Option<&EventSink>, kind: EventKind) {
    if let Some(sink) = events {
        let _ = sink.send(GenerationEvent::new(kind)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use turnstile_core::error::ToolError;
    use turnstile_core::message::Role;
    use turnstile_core::tool::{BlockingTool, ToolArguments};

    /// Replays canned responses in order and records every request.
    struct ScriptedBackend {
        responses: Mutex<Vec<String>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedBackend {
        fn new(responses: &[&str]) -> Arc<Self> {
            let mut responses: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> GenerationRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait::async_trait]
    impl Backend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
            self.requests.lock().unwrap().push(request);
            let next = self.responses.lock().unwrap().pop();
            next.ok_or_else(|| BackendError::Worker("script exhausted".into()))
        }
    }

    /// Always answers with a tool call.
    struct LoopingBackend;

    #[async_trait::async_trait]
    impl Backend for LoopingBackend {
        fn name(&self) -> &str {
            "looping"
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<String, BackendError> {
            Ok(r#"Still looking. <tool_call>{"name":"search","arguments":{"q":"again"}}</tool_call>"#.into())
        }
    }

    struct SearchTool;

    impl BlockingTool for SearchTool {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "Search records"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"q": {"type": "string"}}})
        }
        fn execute(&self, arguments: ToolArguments) -> Result<String, ToolError> {
            let q = arguments.get("q").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(serde_json::json!({ "hits": [q] }).to_string())
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register_blocking(Arc::new(SearchTool));
        Arc::new(registry)
    }

    fn tool_profile(rounds: u32) -> Profile {
        let registry = registry();
        Profile::new("researcher", "You research.")
            .with_tools(registry.specs())
            .with_max_tool_rounds(rounds)
    }

    async fn collect(mut rx: mpsc::Receiver<GenerationEvent>) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn zero_tool_profile_single_round() {
        let backend = ScriptedBackend::new(&["Hello! How can I help?"]);
        let agent = ConversationLoop::new(backend.clone(), registry());
        let profile = Profile::new("general", "You are helpful.").with_max_tool_rounds(1);

        let response = agent.run(&profile, &[], "Hello", None).await.unwrap();

        assert_eq!(response.content, "Hello! How can I help?");
        assert!(response.finished);
        assert_eq!(response.rounds_used, 1);
        assert!(response.tool_calls.is_empty());
        assert_eq!(backend.calls(), 1);

        let request = backend.request(0);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, "You are helpful.");
        assert_eq!(request.messages.last().unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn tool_call_then_answer_uses_two_rounds() {
        let backend = ScriptedBackend::new(&[
            r#"<tool_call>{"name":"search","arguments":{"q":"x"}}</tool_call>"#,
            "Found it: x.",
        ]);
        let agent = ConversationLoop::new(backend.clone(), registry());

        let response = agent.run(&tool_profile(8), &[], "find x", None).await.unwrap();

        assert_eq!(response.rounds_used, 2);
        assert!(response.finished);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "search");
        assert_eq!(response.tool_results[0].result, r#"{"hits":["x"]}"#);
        assert_eq!(response.content, "Found it: x.");

        // Second request: system, user, assistant tool call, tool results.
        let second = backend.request(1);
        assert_eq!(second.messages.len(), 4);
        assert!(second.messages[0].content.contains("# Tools"));
        assert_eq!(second.messages[2].role, Role::Assistant);
        assert_eq!(second.messages[3].role, Role::User);
        assert!(second.messages[3].content.starts_with("<tool_response>"));
        assert!(second.messages[3].content.contains(r#""name":"search""#));
    }

    #[tokio::test]
    async fn malformed_block_beside_valid_one() {
        let backend = ScriptedBackend::new(&[
            "<tool_call>{bad json</tool_call>\n<tool_call>{\"name\":\"search\",\"arguments\":{\"q\":\"y\"}}</tool_call>",
            "Done.",
        ]);
        let agent = ConversationLoop::new(backend, registry());

        let response = agent.run(&tool_profile(8), &[], "find y", None).await.unwrap();

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_results.len(), 1);
        assert!(response.finished);
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_not_fatal() {
        let backend = ScriptedBackend::new(&[
            r#"<tool_call>{"name":"teleport","arguments":{}}</tool_call>"#,
            "I cannot teleport.",
        ]);
        let agent = ConversationLoop::new(backend.clone(), registry());

        let response = agent.run(&tool_profile(8), &[], "go", None).await.unwrap();

        assert_eq!(response.tool_results[0].result, r#"{"error":"Unknown tool: teleport"}"#);
        assert_eq!(response.rounds_used, 2);
        assert!(backend.request(1).messages[3].content.contains("Unknown tool: teleport"));
    }

    #[tokio::test]
    async fn budget_exhaustion_is_degraded_success() {
        let agent = ConversationLoop::new(Arc::new(LoopingBackend), registry());

        let response = agent.run(&tool_profile(3), &[], "loop", None).await.unwrap();

        assert!(!response.finished);
        assert_eq!(response.rounds_used, 3);
        assert_eq!(response.tool_calls.len(), 3);
        assert_eq!(response.content, "Still looking.");
    }

    #[tokio::test]
    async fn nudges_when_backend_thinks_without_acting() {
        let backend = ScriptedBackend::new(&[
            "<think>I should search for this.</think>Ok.",
            r#"<tool_call>{"name":"search","arguments":{"q":"z"}}</tool_call>"#,
            "The answer involves z and is long enough to count as an answer.",
        ]);
        let agent = ConversationLoop::new(backend.clone(), registry());

        let response = agent.run(&tool_profile(8), &[], "what is z?", None).await.unwrap();

        assert!(response.finished);
        assert_eq!(response.rounds_used, 3);
        assert_eq!(response.tool_calls.len(), 1);

        let second = backend.request(1);
        let nudge = second.messages.last().unwrap();
        assert_eq!(nudge.role, Role::User);
        assert_eq!(nudge.content, "Now use your tools to help answer the question.");
        assert!(second.messages[2].content.contains("<think>"));
    }

    #[tokio::test]
    async fn nudge_on_last_round_exhausts_budget() {
        let backend = ScriptedBackend::new(&[
            "<think>Maybe search.</think>Ok.",
            "<think>Still thinking.</think>Ok.",
        ]);
        let agent = ConversationLoop::new(backend.clone(), registry());

        let response = agent.run(&tool_profile(2), &[], "what is z?", None).await.unwrap();

        assert!(!response.finished);
        assert_eq!(response.rounds_used, 2);
        assert_eq!(response.content, "Ok.");
        assert!(response.tool_calls.is_empty());
        assert_eq!(backend.calls(), 2);
        assert_eq!(
            backend.request(1).messages.last().unwrap().content,
            "Now use your tools to help answer the question."
        );
    }

    #[tokio::test]
    async fn no_nudge_without_tools() {
        let backend = ScriptedBackend::new(&["<think>hmm</think>Hi."]);
        let agent = ConversationLoop::new(backend.clone(), registry());
        let profile = Profile::new("general", "You are helpful.");

        let response = agent.run(&profile, &[], "Hello", None).await.unwrap();

        assert!(response.finished);
        assert_eq!(response.content, "Hi.");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn history_precedes_new_message() {
        let backend = ScriptedBackend::new(&["Paris."]);
        let agent = ConversationLoop::new(backend.clone(), registry());
        let history = vec![
            Message::user("What is the capital of Italy?"),
            Message::assistant("Rome."),
        ];
        let profile = Profile::new("general", "You are helpful.");

        agent
            .run(&profile, &history, "And of France?", None)
            .await
            .unwrap();

        let contents: Vec<_> = backend
            .request(0)
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(
            contents,
            vec![
                "You are helpful.",
                "What is the capital of Italy?",
                "Rome.",
                "And of France?"
            ]
        );
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_error() {
        let backend = ScriptedBackend::new(&[]);
        let agent = ConversationLoop::new(backend, registry());
        let profile = Profile::new("general", "You are helpful.");

        let err = agent.run(&profile, &[], "Hello", None).await.unwrap_err();
        assert!(matches!(err, AgentError::Backend(BackendError::Worker(_))));
    }

    #[tokio::test]
    async fn events_follow_round_order() {
        let backend = ScriptedBackend::new(&[
            r#"<think>need data</think><tool_call>{"name":"search","arguments":{"q":"a"}}</tool_call><tool_call>{"name":"search","arguments":{"q":"b"}}</tool_call>"#,
            "All done with a and b.",
        ]);
        let agent = ConversationLoop::new(backend, registry());
        let (tx, rx) = mpsc::channel(64);

        agent
            .run(&tool_profile(8), &[], "a and b", Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let types: Vec<_> = collect(rx).await.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "round_start",
                "generating",
                "thinking",
                "tool_start",
                "tool_end",
                "tool_start",
                "tool_end",
                "round_start",
                "generating",
            ]
        );
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_abort_run() {
        let backend = ScriptedBackend::new(&[
            r#"<tool_call>{"name":"search","arguments":{"q":"a"}}</tool_call>"#,
            "Done.",
        ]);
        let agent = ConversationLoop::new(backend, registry());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let response = agent
            .run(&tool_profile(8), &[], "a", Some(&tx))
            .await
            .unwrap();
        assert!(response.finished);
    }
}
