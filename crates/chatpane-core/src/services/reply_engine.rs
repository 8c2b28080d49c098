use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::completion_client::{ByteStream, CompletionBackend, CompletionError, CompletionRequest};
use super::persistence_gateway::PersistenceGateway;
use super::stream_decoder::ReplyDecoder;
use crate::config::EngineConfig;
use crate::error::{ChatError, ChatResult};
use crate::models::conversation::generate_id;
use crate::models::{
    AssistantMode, Conversation, DEFAULT_PERSONA_ID, GenerationState, PersonaRegistry, SharedStore,
    StreamManager, StreamTicket,
};

/// Assistant message appended when a reply cannot be produced.
pub const FALLBACK_REPLY: &str =
    "Sorry, an error occurred while generating a response. Please try again.";

const EVENT_CAPACITY: usize = 256;

/// Progress of assistant replies, for front ends that render live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// The backend accepted the request and the assistant message exists.
    Started { conv_id: String, message_id: String },
    /// `text` is the whole reply so far.
    Delta {
        conv_id: String,
        message_id: String,
        text: String,
    },
    Completed { conv_id: String, message_id: String },
    /// `message_id` is the partial assistant message, if one was created.
    Failed {
        conv_id: String,
        message_id: Option<String>,
        error: String,
    },
    Cancelled {
        conv_id: String,
        message_id: Option<String>,
    },
}

/// A reply running in the background.
#[derive(Debug)]
pub struct ReplyHandle {
    pub conv_id: String,
    pub user_message_id: String,
    task: JoinHandle<GenerationState>,
}

impl ReplyHandle {
    /// Wait for the reply to settle and return its final state.
    pub async fn wait(self) -> GenerationState {
        self.task
            .await
            .unwrap_or_else(|e| GenerationState::Failed(e.to_string()))
    }
}

#[derive(Debug)]
pub enum SendOutcome {
    /// Blank content or unknown conversation; nothing happened.
    Ignored,
    Started(ReplyHandle),
}

impl SendOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, SendOutcome::Ignored)
    }
}

/// Spacing of mid-stream upserts.
struct PersistThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl PersistThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

enum StreamEnd {
    Completed,
    Cancelled,
    Failed(CompletionError),
}

/// Sends user messages to the completion backend and streams the assistant
/// reply into the conversation store.
#[derive(Clone)]
pub struct ReplyEngine {
    store: SharedStore,
    gateway: PersistenceGateway,
    backend: Arc<dyn CompletionBackend>,
    streams: Arc<Mutex<StreamManager>>,
    registry: PersonaRegistry,
    config: EngineConfig,
    default_persona: Arc<Mutex<String>>,
    events: broadcast::Sender<ReplyEvent>,
}

impl ReplyEngine {
    pub fn new(
        store: SharedStore,
        gateway: PersistenceGateway,
        backend: Arc<dyn CompletionBackend>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            gateway,
            backend,
            streams: Arc::new(Mutex::new(StreamManager::new())),
            registry: PersonaRegistry::builtin(),
            config,
            default_persona: Arc::new(Mutex::new(DEFAULT_PERSONA_ID.to_string())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplyEvent> {
        self.events.subscribe()
    }

    /// Persona used for conversations that do not name one.
    pub fn set_default_persona(&self, persona_id: &str) {
        *self.default_persona.lock() = persona_id.to_string();
    }

    pub fn is_generating(&self, conv_id: &str) -> bool {
        self.streams.lock().is_generating(conv_id)
    }

    pub fn state(&self, conv_id: &str) -> GenerationState {
        self.streams.lock().state(conv_id)
    }

    /// Stop showing a reply as in progress. Depending on configuration the
    /// request is also aborted. Returns false if nothing was in flight.
    pub fn pause(&self, conv_id: &str) -> bool {
        self.streams
            .lock()
            .pause(conv_id, self.config.pause_cancels_stream)
    }

    /// Cancel every in-flight reply.
    pub fn stop_all(&self) {
        self.streams.lock().stop_all();
    }

    /// Append a user message and start streaming the reply to it.
    pub fn send_message(&self, conv_id: &str, content: &str) -> SendOutcome {
        match self.start_reply(conv_id, content) {
            Ok(handle) => SendOutcome::Started(handle),
            Err(e) => {
                debug!(conv_id = %conv_id, error = %e, "Send ignored");
                SendOutcome::Ignored
            }
        }
    }

    /// Send the content of an existing message again as a new message.
    pub fn resend_message(&self, conv_id: &str, message_id: &str) -> SendOutcome {
        let content = {
            let store = self.store.lock();
            store
                .get(conv_id)
                .and_then(|c| c.message(message_id))
                .map(|m| m.content.clone())
        };
        match content {
            Some(content) => self.send_message(conv_id, &content),
            None => SendOutcome::Ignored,
        }
    }

    /// Edit a message, then resend its new content. The edit reaches the
    /// backend with the snapshot written before the request.
    pub fn edit_and_resend(&self, conv_id: &str, message_id: &str, new_content: &str) -> SendOutcome {
        if new_content.trim().is_empty() {
            debug!(conv_id = %conv_id, message_id = %message_id, "Blank edit ignored");
            return SendOutcome::Ignored;
        }
        let edited = self
            .store
            .lock()
            .edit_message(conv_id, message_id, new_content);
        match edited {
            Some(_) => self.resend_message(conv_id, message_id),
            None => SendOutcome::Ignored,
        }
    }

    fn resolve_persona(&self, conversation: &Conversation) -> &'static str {
        let requested = if conversation.persona_id().is_empty() {
            self.default_persona.lock().clone()
        } else {
            conversation.persona_id().to_string()
        };
        self.registry.resolve(&requested).id
    }

    fn start_reply(&self, conv_id: &str, content: &str) -> ChatResult<ReplyHandle> {
        let (snapshot, user_message) = self
            .store
            .lock()
            .append_user_message(conv_id, content)
            .ok_or(ChatError::UserInput)?;

        let persona_id = self.resolve_persona(&snapshot);
        let request = CompletionRequest::new(snapshot.messages(), persona_id);
        let ticket = self.streams.lock().register_stream(conv_id);

        info!(conv_id = %conv_id, persona = persona_id, messages = request.messages.len(), "Requesting reply");

        let engine = self.clone();
        let task_conv_id = conv_id.to_string();
        let task = tokio::spawn(async move {
            engine.gateway.persist(&snapshot).await;
            engine
                .run_reply(&task_conv_id, request, persona_id, ticket)
                .await
        });

        Ok(ReplyHandle {
            conv_id: conv_id.to_string(),
            user_message_id: user_message.id,
            task,
        })
    }

    async fn run_reply(
        &self,
        conv_id: &str,
        request: CompletionRequest,
        persona_id: &str,
        ticket: StreamTicket,
    ) -> GenerationState {
        let cancel = ticket.cancel_token.clone();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            result = self.backend.stream_completion(request) => result,
        };

        let body = match opened {
            Ok(body) => body,
            Err(CompletionError::Cancelled) => {
                return self.settle(conv_id, &ticket, None, StreamEnd::Cancelled, persona_id).await;
            }
            Err(e) => {
                return self.settle(conv_id, &ticket, None, StreamEnd::Failed(e), persona_id).await;
            }
        };

        let message_id = generate_id();
        let created = self.store.lock().append_or_update_assistant_message(
            conv_id,
            &message_id,
            "",
            AssistantMode::Create {
                persona_id: persona_id.to_string(),
            },
        );
        if created.is_none() {
            debug!(conv_id = %conv_id, "Conversation disappeared before the reply started");
            self.streams
                .lock()
                .finalize_stream(conv_id, ticket.id, GenerationState::Cancelled);
            return GenerationState::Cancelled;
        }
        self.streams.lock().mark_streaming(conv_id, ticket.id);
        self.emit(ReplyEvent::Started {
            conv_id: conv_id.to_string(),
            message_id: message_id.clone(),
        });

        let end = self
            .read_body(conv_id, &message_id, body, &ticket)
            .await;
        self.settle(conv_id, &ticket, Some(&message_id), end, persona_id)
            .await
    }

    /// Apply the body chunk by chunk until it ends, fails or is cancelled.
    async fn read_body(
        &self,
        conv_id: &str,
        message_id: &str,
        mut body: ByteStream,
        ticket: &StreamTicket,
    ) -> StreamEnd {
        let mut decoder = ReplyDecoder::new();
        let mut throttle = PersistThrottle::new(self.config.persist_interval());

        loop {
            let next = tokio::select! {
                biased;
                _ = ticket.cancel_token.cancelled() => return StreamEnd::Cancelled,
                next = body.next() => next,
            };

            let changed = match next {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => return StreamEnd::Failed(e),
                None => {
                    if ticket.cancel_token.is_cancelled() {
                        return StreamEnd::Cancelled;
                    }
                    if decoder.finish() {
                        self.apply_text(conv_id, message_id, decoder.text(), &mut throttle)
                            .await;
                    }
                    return StreamEnd::Completed;
                }
            };

            // A chunk taken from the body can race a pause on another worker.
            if ticket.cancel_token.is_cancelled() {
                return StreamEnd::Cancelled;
            }
            if changed {
                self.apply_text(conv_id, message_id, decoder.text(), &mut throttle)
                    .await;
            }
        }
    }

    async fn apply_text(
        &self,
        conv_id: &str,
        message_id: &str,
        text: &str,
        throttle: &mut PersistThrottle,
    ) {
        let updated = self.store.lock().append_or_update_assistant_message(
            conv_id,
            message_id,
            text,
            AssistantMode::Append,
        );
        let Some(conversation) = updated else {
            debug!(conv_id = %conv_id, message_id = %message_id, "Dropping chunk for missing message");
            return;
        };

        self.emit(ReplyEvent::Delta {
            conv_id: conv_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        });

        if throttle.ready() {
            self.gateway.persist(&conversation).await;
        }
    }

    /// Record the outcome, append the apology on failure and write the
    /// final snapshot.
    async fn settle(
        &self,
        conv_id: &str,
        ticket: &StreamTicket,
        message_id: Option<&str>,
        end: StreamEnd,
        persona_id: &str,
    ) -> GenerationState {
        let (status, event) = match end {
            StreamEnd::Completed => {
                debug!(conv_id = %conv_id, "Reply completed");
                (
                    GenerationState::Completed,
                    ReplyEvent::Completed {
                        conv_id: conv_id.to_string(),
                        message_id: message_id.unwrap_or_default().to_string(),
                    },
                )
            }
            StreamEnd::Cancelled => {
                debug!(conv_id = %conv_id, "Reply cancelled");
                (
                    GenerationState::Cancelled,
                    ReplyEvent::Cancelled {
                        conv_id: conv_id.to_string(),
                        message_id: message_id.map(str::to_string),
                    },
                )
            }
            StreamEnd::Failed(e) => {
                let error = ChatError::from(e);
                warn!(conv_id = %conv_id, error = %error, "Error generating reply");
                self.store
                    .lock()
                    .append_assistant_message(conv_id, FALLBACK_REPLY, persona_id);
                (
                    GenerationState::Failed(error.to_string()),
                    ReplyEvent::Failed {
                        conv_id: conv_id.to_string(),
                        message_id: message_id.map(str::to_string),
                        error: error.to_string(),
                    },
                )
            }
        };

        let latest = self.store.lock().get(conv_id).cloned();
        if let Some(conversation) = latest {
            self.gateway.persist(&conversation).await;
        }

        let current = self
            .streams
            .lock()
            .finalize_stream(conv_id, ticket.id, status.clone());
        if current {
            self.emit(event);
        }
        status
    }

    fn emit(&self, event: ReplyEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationsStore, Role};
    use crate::repositories::InMemoryConversationRepository;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    enum Script {
        Reject(CompletionError),
        Body(Vec<Result<Bytes, CompletionError>>),
        Live(mpsc::UnboundedReceiver<Result<Bytes, CompletionError>>),
        Stream(ByteStream),
    }

    #[derive(Default)]
    struct ScriptedBackend {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn push(&self, script: Script) {
            self.scripts.lock().push_back(script);
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn stream_completion(
            &self,
            request: CompletionRequest,
        ) -> Result<ByteStream, CompletionError> {
            self.requests.lock().push(request);
            let script = self.scripts.lock().pop_front();
            match script {
                Some(Script::Reject(e)) => Err(e),
                Some(Script::Body(chunks)) => Ok(futures::stream::iter(chunks).boxed()),
                Some(Script::Live(rx)) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed()),
                Some(Script::Stream(stream)) => Ok(stream),
                None => Err(CompletionError::Status {
                    status: 503,
                    body: "no script".to_string(),
                }),
            }
        }
    }

    struct Harness {
        store: SharedStore,
        repo: InMemoryConversationRepository,
        backend: Arc<ScriptedBackend>,
        engine: ReplyEngine,
        conv_id: String,
    }

    fn harness(config: EngineConfig) -> Harness {
        let store = ConversationsStore::shared();
        let repo = InMemoryConversationRepository::new();
        let gateway = PersistenceGateway::new(Arc::new(repo.clone()));
        gateway.set_session(Some("u1".to_string()));
        let backend = Arc::new(ScriptedBackend::default());
        let engine = ReplyEngine::new(store.clone(), gateway, backend.clone(), config);
        let conv_id = store.lock().create_conversation("default");
        Harness {
            store,
            repo,
            backend,
            engine,
            conv_id,
        }
    }

    fn body(lines: &[&str]) -> Script {
        Script::Body(
            lines
                .iter()
                .map(|l| Ok(Bytes::from(l.to_string())))
                .collect(),
        )
    }

    fn started(outcome: SendOutcome) -> ReplyHandle {
        match outcome {
            SendOutcome::Started(handle) => handle,
            SendOutcome::Ignored => panic!("send was ignored"),
        }
    }

    fn contents(h: &Harness) -> Vec<(Role, String)> {
        h.store
            .lock()
            .get(&h.conv_id)
            .unwrap()
            .messages()
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    async fn wait_for_delta(events: &mut broadcast::Receiver<ReplyEvent>, expected: &str) {
        loop {
            match events.recv().await.unwrap() {
                ReplyEvent::Delta { text, .. } if text == expected => return,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_streams_reply_into_store() {
        let h = harness(EngineConfig::default());
        h.backend.push(body(&["0:\"Hi\"\n", "0:\" there\"\n"]));

        let handle = started(h.engine.send_message(&h.conv_id, "Hello"));
        assert_eq!(handle.wait().await, GenerationState::Completed);

        assert_eq!(
            contents(&h),
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Assistant, "Hi there".to_string())
            ]
        );
        let store = h.store.lock();
        let conversation = store.get(&h.conv_id).unwrap();
        assert_eq!(conversation.message_count(), 2);
        assert_eq!(conversation.preview(), "Hi there");
        assert_eq!(
            conversation.messages()[1].persona_id.as_deref(),
            Some("default")
        );
        drop(store);
        assert!(!h.engine.is_generating(&h.conv_id));
        assert_eq!(h.engine.state(&h.conv_id), GenerationState::Completed);
    }

    #[tokio::test]
    async fn test_request_carries_history_and_persona() {
        let h = harness(EngineConfig::default());
        h.store.lock().set_conversation_persona(&h.conv_id, "developer");
        h.backend.push(body(&["0:\"one\"\n"]));
        h.backend.push(body(&["0:\"two\"\n"]));

        started(h.engine.send_message(&h.conv_id, "first")).wait().await;
        started(h.engine.send_message(&h.conv_id, "second")).wait().await;

        let requests = h.backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].persona_id, "developer");
        let history: Vec<&str> = requests[1]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(history, vec!["first", "one", "second"]);
    }

    #[tokio::test]
    async fn test_unknown_persona_falls_back_to_default() {
        let h = harness(EngineConfig::default());
        h.store.lock().set_conversation_persona(&h.conv_id, "pirate");
        h.backend.push(body(&["0:\"ok\"\n"]));
        started(h.engine.send_message(&h.conv_id, "hi")).wait().await;
        assert_eq!(h.backend.requests()[0].persona_id, DEFAULT_PERSONA_ID);
    }

    #[tokio::test]
    async fn test_error_status_appends_fallback() {
        let h = harness(EngineConfig::default());
        h.backend.push(Script::Reject(CompletionError::Status {
            status: 500,
            body: "boom".to_string(),
        }));

        let state = started(h.engine.send_message(&h.conv_id, "Hello"))
            .wait()
            .await;
        assert!(matches!(state, GenerationState::Failed(_)));
        assert_eq!(
            contents(&h),
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Assistant, FALLBACK_REPLY.to_string())
            ]
        );
        assert!(!h.engine.is_generating(&h.conv_id));
    }

    #[tokio::test]
    async fn test_read_error_keeps_partial_reply() {
        let h = harness(EngineConfig::default());
        h.backend.push(Script::Body(vec![
            Ok(Bytes::from("0:\"Par\"\n")),
            Err(CompletionError::Read("connection reset".to_string())),
        ]));

        let state = started(h.engine.send_message(&h.conv_id, "Hello"))
            .wait()
            .await;
        assert!(matches!(state, GenerationState::Failed(_)));
        assert_eq!(
            contents(&h),
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Assistant, "Par".to_string()),
                (Role::Assistant, FALLBACK_REPLY.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_send_is_inert() {
        let h = harness(EngineConfig::default());
        assert!(h.engine.send_message(&h.conv_id, "   \n").is_ignored());
        assert!(h.engine.send_message("missing", "hello").is_ignored());
        assert!(contents(&h).is_empty());
        assert!(h.backend.requests().is_empty());
        assert!(!h.engine.is_generating(&h.conv_id));
        assert_eq!(h.repo.conversation_upserts(), 0);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let h = harness(EngineConfig::default());
        h.backend
            .push(body(&["0:\"A\"\n0:{bad\n", "9:\"meta\"\n0:\"B\""]));
        started(h.engine.send_message(&h.conv_id, "go")).wait().await;
        assert_eq!(contents(&h)[1].1, "AB");
    }

    #[tokio::test]
    async fn test_pause_cancels_stream() {
        let h = harness(EngineConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        h.backend.push(Script::Live(rx));
        let mut events = h.engine.subscribe();

        let handle = started(h.engine.send_message(&h.conv_id, "Hello"));
        tx.send(Ok(Bytes::from("0:\"Hi\"\n"))).unwrap();
        wait_for_delta(&mut events, "Hi").await;

        assert!(h.engine.is_generating(&h.conv_id));
        assert!(h.engine.pause(&h.conv_id));
        assert!(!h.engine.is_generating(&h.conv_id));
        let _ = tx.send(Ok(Bytes::from("0:\" there\"\n")));
        drop(tx);

        assert_eq!(handle.wait().await, GenerationState::Cancelled);
        assert_eq!(contents(&h)[1].1, "Hi");
        assert!(!h.engine.pause(&h.conv_id));
    }

    #[tokio::test]
    async fn test_pause_without_cancel_keeps_applying_chunks() {
        let h = harness(EngineConfig {
            pause_cancels_stream: false,
            ..EngineConfig::default()
        });
        let (tx, rx) = mpsc::unbounded_channel();
        h.backend.push(Script::Live(rx));
        let mut events = h.engine.subscribe();

        let handle = started(h.engine.send_message(&h.conv_id, "Hello"));
        tx.send(Ok(Bytes::from("0:\"Hi\"\n"))).unwrap();
        wait_for_delta(&mut events, "Hi").await;

        assert!(h.engine.pause(&h.conv_id));
        assert!(!h.engine.is_generating(&h.conv_id));
        tx.send(Ok(Bytes::from("0:\" there\"\n"))).unwrap();
        drop(tx);

        assert_eq!(handle.wait().await, GenerationState::Completed);
        assert_eq!(contents(&h)[1].1, "Hi there");
        assert!(!h.engine.is_generating(&h.conv_id));
    }

    #[tokio::test]
    async fn test_second_send_supersedes_first() {
        let h = harness(EngineConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        h.backend.push(Script::Live(rx));
        h.backend.push(body(&["0:\"second reply\"\n"]));
        let mut events = h.engine.subscribe();

        let first = started(h.engine.send_message(&h.conv_id, "one"));
        tx.send(Ok(Bytes::from("0:\"first\"\n"))).unwrap();
        wait_for_delta(&mut events, "first").await;

        let second = started(h.engine.send_message(&h.conv_id, "two"));
        assert_eq!(first.wait().await, GenerationState::Cancelled);
        assert_eq!(second.wait().await, GenerationState::Completed);
        assert_eq!(h.engine.state(&h.conv_id), GenerationState::Completed);
        drop(tx);
    }

    #[tokio::test]
    async fn test_final_upsert_carries_full_reply() {
        let h = harness(EngineConfig {
            persist_interval_ms: 60_000,
            ..EngineConfig::default()
        });
        h.backend
            .push(body(&["0:\"a\"\n", "0:\"b\"\n", "0:\"c\"\n", "0:\"d\"\n"]));
        started(h.engine.send_message(&h.conv_id, "go")).wait().await;

        // user snapshot, first chunk, final snapshot
        assert_eq!(h.repo.conversation_upserts(), 3);
        let rows = h.repo.messages_of(&h.conv_id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].content, "abcd");
    }

    #[tokio::test]
    async fn test_zero_interval_persists_every_chunk() {
        let h = harness(EngineConfig {
            persist_interval_ms: 0,
            ..EngineConfig::default()
        });
        h.backend.push(body(&["0:\"a\"\n", "0:\"b\"\n", "0:\"c\"\n"]));
        started(h.engine.send_message(&h.conv_id, "go")).wait().await;
        // user snapshot + three chunks + final snapshot
        assert_eq!(h.repo.conversation_upserts(), 5);
    }

    #[tokio::test]
    async fn test_resend_and_edit_and_resend() {
        let h = harness(EngineConfig::default());
        h.backend.push(body(&["0:\"r1\"\n"]));
        h.backend.push(body(&["0:\"r2\"\n"]));
        h.backend.push(body(&["0:\"r3\"\n"]));

        let first = started(h.engine.send_message(&h.conv_id, "question"));
        let user_id = first.user_message_id.clone();
        first.wait().await;

        started(h.engine.resend_message(&h.conv_id, &user_id))
            .wait()
            .await;
        started(h.engine.edit_and_resend(&h.conv_id, &user_id, "better question"))
            .wait()
            .await;

        let messages = contents(&h);
        let users: Vec<&str> = messages
            .iter()
            .filter(|(role, _)| *role == Role::User)
            .map(|(_, c)| c.as_str())
            .collect();
        assert_eq!(users, vec!["better question", "question", "better question"]);
        assert!(h.engine.resend_message(&h.conv_id, "missing").is_ignored());
    }

    #[tokio::test]
    async fn test_blank_edit_and_resend_leaves_message_untouched() {
        let h = harness(EngineConfig::default());
        h.backend.push(body(&["0:\"answer\"\n"]));
        let first = started(h.engine.send_message(&h.conv_id, "question"));
        let user_id = first.user_message_id.clone();
        first.wait().await;
        let upserts = h.repo.conversation_upserts();

        assert!(h.engine.edit_and_resend(&h.conv_id, &user_id, "   ").is_ignored());

        assert_eq!(contents(&h)[0].1, "question");
        assert_eq!(h.repo.messages_of(&h.conv_id)[0].content, "question");
        assert_eq!(h.repo.conversation_upserts(), upserts);
        assert_eq!(h.backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_read_during_pause_is_dropped() {
        let h = harness(EngineConfig::default());
        let engine = h.engine.clone();
        let conv_id = h.conv_id.clone();
        let chunks = vec![Bytes::from("0:\"Hi\"\n"), Bytes::from("0:\" there\"\n")];
        let stream = futures::stream::iter(chunks.into_iter().enumerate())
            .map(move |(i, chunk)| {
                if i == 1 {
                    engine.pause(&conv_id);
                }
                Ok(chunk)
            })
            .boxed();
        h.backend.push(Script::Stream(stream));
        let mut events = h.engine.subscribe();

        let state = started(h.engine.send_message(&h.conv_id, "Hello"))
            .wait()
            .await;
        assert_eq!(state, GenerationState::Cancelled);
        assert_eq!(contents(&h)[1].1, "Hi");
        assert_eq!(h.repo.messages_of(&h.conv_id)[1].content, "Hi");

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(ReplyEvent::Cancelled { message_id: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_events_sequence() {
        let h = harness(EngineConfig::default());
        h.backend.push(body(&["0:\"Hi\"\n"]));
        let mut events = h.engine.subscribe();
        started(h.engine.send_message(&h.conv_id, "Hello")).wait().await;

        assert!(matches!(events.recv().await.unwrap(), ReplyEvent::Started { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            ReplyEvent::Delta { text, .. } if text == "Hi"
        ));
        assert!(matches!(events.recv().await.unwrap(), ReplyEvent::Completed { .. }));
    }
}
