//! Chat session lifecycle.
//!
//! The [`SessionManager`] owns at most one live [`ChatSession`].  Every `init` and `reset` bumps
//! a generation number; the reconciler records the generation a reply was started under and
//! ignores anything that arrives after the generation has moved on.

use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::client::{ChatBackend, ChatRequest, DeltaStream, GeminiClient};
use crate::error::{Error, Result};
use crate::observability::{SESSION_INITS, SESSION_SENDS};
use crate::types::{ModelVariant, SYSTEM_INSTRUCTION, Turn};

type Connector = Box<dyn Fn() -> Result<Arc<dyn ChatBackend>> + Send + Sync>;

/// A live chat session bound to one model.
///
/// The session keeps the conversation history the API sees.  A reply is added to it only when
/// its stream finishes cleanly.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    model: ModelVariant,
    generation: u64,
    history: Arc<Mutex<Vec<Turn>>>,
}

impl ChatSession {
    /// The model this session is bound to.
    pub fn model(&self) -> ModelVariant {
        self.model
    }

    /// The generation this session was created in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A copy of the history the next send will carry.
    pub fn history(&self) -> Vec<Turn> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stream a reply to `text`.
    ///
    /// Nothing is sent until the returned stream is first polled.
    pub fn send_stream(&self, text: &str) -> DeltaStream {
        SESSION_SENDS.click();
        let user_turn = Turn::user(text);
        let mut contents = self.history();
        contents.push(user_turn.clone());
        let request = ChatRequest {
            model: self.model.api_model().to_string(),
            system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
            thinking_budget: self.model.thinking_budget(),
            contents,
        };

        let backend = Arc::clone(&self.backend);
        let deltas: DeltaStream =
            Box::pin(stream::once(async move { backend.stream_reply(request).await }).try_flatten());

        let exchange = Exchange {
            deltas,
            reply: String::new(),
            user_turn,
            history: Arc::clone(&self.history),
            finished: false,
        };
        Box::pin(stream::unfold(exchange, |mut exchange| async move {
            if exchange.finished {
                return None;
            }
            match exchange.deltas.next().await {
                Some(Ok(delta)) => {
                    exchange.reply.push_str(&delta);
                    Some((Ok(delta), exchange))
                }
                Some(Err(err)) => {
                    exchange.finished = true;
                    Some((Err(err), exchange))
                }
                None => {
                    exchange.commit();
                    None
                }
            }
        }))
    }
}

/// State of one in-flight send.
struct Exchange {
    deltas: DeltaStream,
    reply: String,
    user_turn: Turn,
    history: Arc<Mutex<Vec<Turn>>>,
    finished: bool,
}

impl Exchange {
    fn commit(self) {
        if self.reply.is_empty() {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(self.user_turn);
        history.push(Turn::model(self.reply));
    }
}

/// Owns the single live chat session.
pub struct SessionManager {
    connect: Connector,
    backend: Option<Arc<dyn ChatBackend>>,
    session: Option<ChatSession>,
    generation: u64,
}

impl SessionManager {
    /// Create a manager that builds its backend on first `init`.
    ///
    /// A successful connection is cached; a failed one is retried on the next `init`.
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ChatBackend>> + Send + Sync + 'static,
    {
        Self {
            connect: Box::new(connect),
            backend: None,
            session: None,
            generation: 0,
        }
    }

    /// Create a manager backed by the Gemini API.
    ///
    /// The credential is read when the first session is initialized.
    pub fn gemini(api_key: Option<String>) -> Self {
        Self::new(move || {
            let client = GeminiClient::new(api_key.clone())?;
            Ok(Arc::new(client) as Arc<dyn ChatBackend>)
        })
    }

    /// Create a manager around an existing backend.
    pub fn with_backend(backend: Arc<dyn ChatBackend>) -> Self {
        let connected = Arc::clone(&backend);
        Self {
            connect: Box::new(move || Ok(Arc::clone(&connected))),
            backend: Some(backend),
            session: None,
            generation: 0,
        }
    }

    fn backend(&mut self) -> Result<Arc<dyn ChatBackend>> {
        if let Some(backend) = &self.backend {
            return Ok(Arc::clone(backend));
        }
        let backend = (self.connect)()?;
        self.backend = Some(Arc::clone(&backend));
        Ok(backend)
    }

    /// Discard any existing session and start a fresh one.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the backend cannot be constructed.  No session is live
    /// afterwards in that case.
    pub fn init(&mut self, model: ModelVariant, seed_history: Vec<Turn>) -> Result<&ChatSession> {
        self.session = None;
        self.generation += 1;
        let backend = self.backend()?;
        SESSION_INITS.click();
        tracing::debug!(
            model = %model,
            generation = self.generation,
            seed_turns = seed_history.len(),
            "initialized chat session"
        );
        Ok(self.session.insert(ChatSession {
            backend,
            model,
            generation: self.generation,
            history: Arc::new(Mutex::new(seed_history)),
        }))
    }

    /// Release the current session without starting a new one.
    pub fn reset(&mut self) {
        self.session = None;
        self.generation += 1;
    }

    /// The live session, if any.
    pub fn current(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    /// The current generation number.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stream a reply from the live session.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if there is no live session.
    pub fn send_stream(&self, text: &str) -> Result<DeltaStream> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::not_initialized("send attempted with no live session"))?;
        Ok(session.send_stream(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, ScriptedBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn drain(stream: DeltaStream) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[test]
    fn send_before_init_fails() {
        let manager = SessionManager::with_backend(ScriptedBackend::new(vec![]));
        let err = manager.send_stream("hi").err().unwrap();
        assert!(err.is_not_initialized());
    }

    #[test]
    fn send_after_reset_fails() {
        let mut manager = SessionManager::with_backend(ScriptedBackend::new(vec![]));
        manager.init(ModelVariant::Pro, vec![]).unwrap();
        manager.reset();
        assert!(manager.current().is_none());
        assert!(manager.send_stream("hi").err().unwrap().is_not_initialized());
    }

    #[test]
    fn init_bumps_generation() {
        let mut manager = SessionManager::with_backend(ScriptedBackend::new(vec![]));
        let first = manager.init(ModelVariant::Pro, vec![]).unwrap().generation();
        let second = manager.init(ModelVariant::Flash, vec![]).unwrap().generation();
        assert!(second > first);
        manager.reset();
        assert!(manager.generation() > second);
    }

    #[test]
    fn missing_credential_is_configuration_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        let mut manager = SessionManager::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(Error::configuration("no key"))
        });
        let err = manager.init(ModelVariant::Pro, vec![]).err().unwrap();
        assert!(err.is_configuration());
        assert!(manager.current().is_none());
        assert!(manager.init(ModelVariant::Pro, vec![]).is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backend_is_connected_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        let backend = ScriptedBackend::new(vec![]);
        let mut manager = SessionManager::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&backend) as Arc<dyn ChatBackend>)
        });
        manager.init(ModelVariant::Pro, vec![]).unwrap();
        manager.init(ModelVariant::Flash, vec![]).unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let backend = ScriptedBackend::new(vec![Reply::Deltas(vec!["a"])]);
        let mut manager = SessionManager::with_backend(backend.clone());
        manager.init(ModelVariant::Pro, vec![]).unwrap();
        let stream = manager.send_stream("hi").unwrap();
        assert!(backend.requests().is_empty());
        assert_eq!(drain(stream).await.len(), 1);
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn thinking_variant_carries_budget() {
        let backend = ScriptedBackend::new(vec![Reply::Deltas(vec![]), Reply::Deltas(vec![])]);
        let mut manager = SessionManager::with_backend(backend.clone());
        manager.init(ModelVariant::Thinking, vec![]).unwrap();
        drain(manager.send_stream("hi").unwrap()).await;
        manager.init(ModelVariant::Pro, vec![]).unwrap();
        drain(manager.send_stream("hi").unwrap()).await;

        let requests = backend.requests();
        assert_eq!(requests[0].model, "gemini-2.5-flash");
        assert_eq!(requests[0].thinking_budget, Some(1024));
        assert_eq!(requests[0].system_instruction.as_deref(), Some(SYSTEM_INSTRUCTION));
        assert_eq!(requests[1].model, "gemini-3-pro-preview");
        assert_eq!(requests[1].thinking_budget, None);
    }

    #[tokio::test]
    async fn completed_reply_joins_history() {
        let backend = ScriptedBackend::new(vec![
            Reply::Deltas(vec!["Hel", "lo"]),
            Reply::Deltas(vec!["ok"]),
        ]);
        let mut manager = SessionManager::with_backend(backend.clone());
        manager
            .init(ModelVariant::Flash, vec![Turn::user("seed"), Turn::model("seeded")])
            .unwrap();

        let deltas = drain(manager.send_stream("hi").unwrap()).await;
        let deltas: Vec<String> = deltas.into_iter().map(|d| d.unwrap()).collect();
        assert_eq!(deltas, vec!["Hel", "lo"]);

        drain(manager.send_stream("again").unwrap()).await;
        let requests = backend.requests();
        assert_eq!(
            requests[1].contents,
            vec![
                Turn::user("seed"),
                Turn::model("seeded"),
                Turn::user("hi"),
                Turn::model("Hello"),
                Turn::user("again"),
            ]
        );
    }

    #[tokio::test]
    async fn failed_reply_leaves_history_untouched() {
        let backend = ScriptedBackend::new(vec![Reply::FailAfter(
            vec!["par"],
            Error::transport("reset", None, None),
        )]);
        let mut manager = SessionManager::with_backend(backend);
        manager.init(ModelVariant::Flash, vec![]).unwrap();

        let items = drain(manager.send_stream("hi").unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "par");
        assert!(items[1].as_ref().unwrap_err().is_transport());
        assert!(manager.current().unwrap().history().is_empty());
    }

    #[tokio::test]
    async fn rejected_call_surfaces_on_first_poll() {
        let backend = ScriptedBackend::new(vec![Reply::Reject(Error::transport(
            "denied",
            Some(403),
            None,
        ))]);
        let mut manager = SessionManager::with_backend(backend);
        manager.init(ModelVariant::Pro, vec![]).unwrap();
        let items = drain(manager.send_stream("hi").unwrap()).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().status_code(), Some(403));
    }
}
