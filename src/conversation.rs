//! The conversation controller: one session, one log, one store.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::client::DeltaStream;
use crate::error::{Error, Result};
use crate::extract::{Export, export_archive};
use crate::reconcile::{LogObserver, MessageLog, Reconciler, ReplyOutcome};
use crate::session::SessionManager;
use crate::store::{PersistOnChange, Persistence};
use crate::types::{Message, ModelVariant, seed_history};

/// A reply that has been started but not yet streamed.
///
/// The user message and placeholder are already in the log.  Dropping the task without running
/// it leaves the placeholder in progress until the next reset.
pub struct ReplyTask {
    reconciler: Reconciler,
    deltas: DeltaStream,
}

impl ReplyTask {
    /// Id of the assistant message being written.
    pub fn reply_id(&self) -> &str {
        self.reconciler.pending().id()
    }

    /// Stream the reply into the log.
    pub async fn run(self) -> ReplyOutcome {
        self.reconciler.drive(self.deltas).await
    }
}

/// Ties the session manager, the message log, and persistence together.
pub struct Conversation {
    manager: SessionManager,
    log: MessageLog,
    persistence: Persistence,
    model: ModelVariant,
    writer: JoinHandle<()>,
}

impl Conversation {
    /// Restore persisted state and start a session seeded with it.
    ///
    /// Must be called within a Tokio runtime; log changes are saved by a background task.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the session cannot be initialized.
    pub fn open(mut manager: SessionManager, persistence: Persistence) -> Result<Self> {
        let model = persistence.load_model();
        let mut messages = persistence.load_messages();
        if finalize_interrupted(&mut messages) {
            if let Err(err) = persistence.save_messages(&messages) {
                tracing::warn!(error = %err, "could not persist finalized message log");
            }
        }
        manager.init(model, seed_history(&messages))?;
        let log = MessageLog::new(manager.generation(), messages);
        let (persist, writer) = PersistOnChange::spawn(persistence.clone(), log.snapshot());
        log.subscribe(Box::new(persist));
        Ok(Self {
            manager,
            log,
            persistence,
            model,
            writer,
        })
    }

    /// Detach all observers and wait until the latest log is saved.
    pub async fn close(self) {
        self.log.unsubscribe_all();
        if let Err(err) = self.writer.await {
            tracing::error!(error = %err, "message log writer failed");
        }
    }

    /// Insert `text` and a reply placeholder, returning the task that streams the reply.
    ///
    /// # Errors
    ///
    /// `Validation` for blank input, `NotInitialized` without a live session, and `Busy` while
    /// another reply is streaming.  The log is unchanged in every case.
    pub fn start(&self, text: &str) -> Result<ReplyTask> {
        if text.trim().is_empty() {
            return Err(Error::validation(
                "message is empty",
                Some("text".to_string()),
            ));
        }
        if self.log.is_busy() {
            return Err(Error::busy("a reply is still streaming"));
        }
        let deltas = self.manager.send_stream(text)?;
        let reconciler = Reconciler::begin(&self.log, text)?;
        Ok(ReplyTask { reconciler, deltas })
    }

    /// Send `text` and stream the reply to completion.
    pub async fn submit(&self, text: &str) -> Result<ReplyOutcome> {
        Ok(self.start(text)?.run().await)
    }

    /// Select a different model.  The log is emptied and the new session starts fresh.
    ///
    /// Selecting the current model does nothing.
    pub fn switch_model(&mut self, model: ModelVariant) -> Result<()> {
        if model == self.model {
            return Ok(());
        }
        tracing::debug!(from = %self.model, to = %model, "switching model");
        self.manager.reset();
        self.model = model;
        if let Err(err) = self.persistence.save_model(model) {
            tracing::error!(error = %err, "failed to persist model selection");
        }
        self.restart()
    }

    /// Start a new chat with the current model.
    pub fn clear(&mut self) -> Result<()> {
        self.restart()
    }

    fn restart(&mut self) -> Result<()> {
        let result = self.manager.init(self.model, Vec::new()).map(|_| ());
        self.log.reset(self.manager.generation(), Vec::new());
        result
    }

    /// Package the code in the current log.
    pub fn export_code(&self) -> Result<Export> {
        export_archive(&self.log.snapshot())
    }

    /// The current log.
    pub fn messages(&self) -> Arc<Vec<Message>> {
        self.log.snapshot()
    }

    pub fn model(&self) -> ModelVariant {
        self.model
    }

    pub fn is_busy(&self) -> bool {
        self.log.is_busy()
    }

    /// Observe every subsequent log change.
    pub fn subscribe(&self, observer: Box<dyn LogObserver>) {
        self.log.subscribe(observer);
    }
}

/// Settle messages a previous run left streaming.  Returns true if anything changed.
fn finalize_interrupted(messages: &mut Vec<Message>) -> bool {
    let before = messages.len();
    messages.retain(|msg| !(msg.in_progress && msg.text.is_empty()));
    let mut changed = messages.len() != before;
    for msg in messages.iter_mut().filter(|msg| msg.in_progress) {
        msg.in_progress = false;
        changed = true;
    }
    if changed {
        tracing::debug!("finalized messages left streaming by an earlier run");
    }
    changed
}
