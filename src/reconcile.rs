//! Reconciling streamed replies into the message log.
//!
//! The log is only ever replaced whole: every mutation clones the current vector, edits the
//! clone, and swaps it in under the lock.  Readers holding a [`MessageLog::snapshot`] therefore
//! never observe a half-applied delta.  Observers are told about each new snapshot before the
//! lock is released, so they see mutations in the order they happened.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::StreamExt;

use crate::client::DeltaStream;
use crate::error::{Error, Result};
use crate::observability::{STREAM_DELTAS, STREAM_DURATION, STREAM_ERRORS, STREAM_ORPHANED_DELTAS};
use crate::types::Message;

/// Text of the notice appended when a reply fails.
pub const ERROR_NOTICE: &str = "**Error:** Something went wrong communicating with the API. Please ensure your API Key is valid.";

/// Receives every new log snapshot.
///
/// Called with the log locked; implementations must not call back into the log or block.
pub trait LogObserver: Send {
    /// The log now holds `messages`.
    fn log_changed(&mut self, messages: &Arc<Vec<Message>>);
}

struct LogInner {
    generation: u64,
    messages: Arc<Vec<Message>>,
    observers: Vec<Box<dyn LogObserver>>,
}

impl LogInner {
    fn notify(&mut self) {
        let messages = Arc::clone(&self.messages);
        for observer in self.observers.iter_mut() {
            observer.log_changed(&messages);
        }
    }
}

/// Shared handle to the ordered message log.
#[derive(Clone)]
pub struct MessageLog {
    inner: Arc<Mutex<LogInner>>,
}

impl MessageLog {
    /// Create a log holding `messages`, tagged with `generation`.
    pub fn new(generation: u64, messages: Vec<Message>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                generation,
                messages: Arc::new(messages),
                observers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current messages.
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.lock().messages)
    }

    /// The generation the log currently belongs to.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// True while some message is still streaming.
    pub fn is_busy(&self) -> bool {
        self.lock().messages.iter().any(|msg| msg.in_progress)
    }

    /// Register an observer for subsequent changes.
    pub fn subscribe(&self, observer: Box<dyn LogObserver>) {
        self.lock().observers.push(observer);
    }

    /// Drop every observer.
    pub fn unsubscribe_all(&self) {
        self.lock().observers.clear();
    }

    /// Replace the whole log and move it to `generation`.
    ///
    /// Replies started under an earlier generation are orphaned by this.
    pub fn reset(&self, generation: u64, messages: Vec<Message>) {
        let mut inner = self.lock();
        inner.generation = generation;
        inner.messages = Arc::new(messages);
        inner.notify();
    }

    /// Apply `f` to a copy of the log and swap it in.
    ///
    /// Nothing changes when `expected` names a stale generation or when `f` declines by
    /// returning `None`.
    fn modify<T>(
        &self,
        expected: Option<u64>,
        f: impl FnOnce(u64, &mut Vec<Message>) -> Option<T>,
    ) -> Option<T> {
        let mut inner = self.lock();
        if expected.is_some_and(|generation| generation != inner.generation) {
            return None;
        }
        let mut next = Vec::clone(&inner.messages);
        let out = f(inner.generation, &mut next)?;
        inner.messages = Arc::new(next);
        inner.notify();
        Some(out)
    }
}

/// Identity of a reply being streamed into the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    id: String,
    generation: u64,
}

impl PendingReply {
    /// Id of the placeholder message.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Generation the reply was started under.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// How a reply ended.
#[derive(Debug)]
pub enum ReplyOutcome {
    /// The stream ended and the message was finalized.
    Completed,
    /// The stream failed; partial text was kept and a notice appended.
    Failed(Error),
    /// The log moved to a new generation while the reply was streaming.
    Orphaned,
}

/// Applies one reply's deltas to the log.
pub struct Reconciler {
    log: MessageLog,
    pending: PendingReply,
    text: String,
}

impl Reconciler {
    /// Append the user's message and an empty in-progress placeholder in one update.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if another reply is still streaming.
    pub fn begin(log: &MessageLog, text: &str) -> Result<Self> {
        let pending = log
            .modify(None, |generation, messages| {
                if messages.iter().any(|msg| msg.in_progress) {
                    return None;
                }
                let placeholder = Message::placeholder();
                let pending = PendingReply {
                    id: placeholder.id.clone(),
                    generation,
                };
                messages.push(Message::user(text));
                messages.push(placeholder);
                Some(pending)
            })
            .ok_or_else(|| Error::busy("a reply is still streaming"))?;
        Ok(Self {
            log: log.clone(),
            pending,
            text: String::new(),
        })
    }

    /// The reply this reconciler is writing.
    pub fn pending(&self) -> &PendingReply {
        &self.pending
    }

    /// Append `delta` to the placeholder.  Returns false if the reply was orphaned.
    pub fn apply_delta(&mut self, delta: &str) -> bool {
        self.text.push_str(delta);
        let id = &self.pending.id;
        let text = &self.text;
        self.log
            .modify(Some(self.pending.generation), |_, messages| {
                let msg = messages.iter_mut().find(|msg| &msg.id == id)?;
                msg.text.clone_from(text);
                Some(())
            })
            .is_some()
    }

    /// Mark the placeholder finished.  Returns false if the reply was orphaned.
    pub fn complete(&self) -> bool {
        let id = &self.pending.id;
        self.log
            .modify(Some(self.pending.generation), |_, messages| {
                let msg = messages.iter_mut().find(|msg| &msg.id == id)?;
                msg.in_progress = false;
                Some(())
            })
            .is_some()
    }

    /// Record a failed reply.  Returns false if the reply was orphaned.
    ///
    /// An empty placeholder is removed; one with partial text is kept and finalized.  Either
    /// way a finalized notice follows it.
    pub fn fail(&self, err: &Error) -> bool {
        let id = &self.pending.id;
        let applied = self
            .log
            .modify(Some(self.pending.generation), |_, messages| {
                let index = messages.iter().position(|msg| &msg.id == id)?;
                if messages[index].text.is_empty() {
                    messages.remove(index);
                } else {
                    messages[index].in_progress = false;
                }
                messages.push(Message::notice(ERROR_NOTICE));
                Some(())
            })
            .is_some();
        if applied {
            tracing::warn!(error = %err, reply = %id, "reply stream failed");
        }
        applied
    }

    /// Consume `deltas` in order, reconciling each into the log.
    ///
    /// A reply orphaned part way is still drained to its end, but nothing more is applied.
    pub async fn drive(mut self, mut deltas: DeltaStream) -> ReplyOutcome {
        let start = Instant::now();
        let mut orphaned = false;
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    if !orphaned && self.apply_delta(&delta) {
                        STREAM_DELTAS.click();
                    } else {
                        orphaned = true;
                        STREAM_ORPHANED_DELTAS.click();
                    }
                }
                Err(err) => {
                    STREAM_ERRORS.click();
                    if orphaned || !self.fail(&err) {
                        tracing::debug!(error = %err, "orphaned reply failed");
                        return ReplyOutcome::Orphaned;
                    }
                    return ReplyOutcome::Failed(err);
                }
            }
        }
        STREAM_DURATION.add(start.elapsed().as_secs_f64());
        if orphaned || !self.complete() {
            tracing::debug!(reply = %self.pending.id, "dropped orphaned reply");
            return ReplyOutcome::Orphaned;
        }
        ReplyOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use futures::stream;

    fn deltas(items: Vec<Result<&'static str>>) -> DeltaStream {
        Box::pin(stream::iter(
            items
                .into_iter()
                .map(|item| item.map(str::to_string))
                .collect::<Vec<_>>(),
        ))
    }

    fn transport() -> Error {
        Error::transport("connection reset", None, None)
    }

    /// Records every snapshot it is shown.
    struct Recorder(Arc<Mutex<Vec<Vec<Message>>>>);

    impl LogObserver for Recorder {
        fn log_changed(&mut self, messages: &Arc<Vec<Message>>) {
            self.0.lock().unwrap().push(messages.to_vec());
        }
    }

    fn recorded(log: &MessageLog) -> Arc<Mutex<Vec<Vec<Message>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        log.subscribe(Box::new(Recorder(Arc::clone(&seen))));
        seen
    }

    #[tokio::test]
    async fn completed_reply_is_concatenation() {
        let log = MessageLog::new(1, vec![]);
        let reconciler = Reconciler::begin(&log, "hi").unwrap();
        let outcome = reconciler
            .drive(deltas(vec![Ok("fn "), Ok("main"), Ok("() {}")]))
            .await;
        assert!(matches!(outcome, ReplyOutcome::Completed));

        let messages = log.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text, "hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].text, "fn main() {}");
        assert!(!messages[1].in_progress);
    }

    #[tokio::test]
    async fn every_snapshot_is_consistent() {
        let log = MessageLog::new(1, vec![]);
        let seen = recorded(&log);
        let reconciler = Reconciler::begin(&log, "hi").unwrap();
        let id = reconciler.pending().id().to_string();
        reconciler
            .drive(deltas(vec![Ok("a"), Ok("b"), Ok("c")]))
            .await;

        let seen = seen.lock().unwrap();
        // begin, three deltas, completion
        assert_eq!(seen.len(), 5);
        let texts: Vec<&str> = seen.iter().map(|s| s[1].text.as_str()).collect();
        assert_eq!(texts, vec!["", "a", "ab", "abc", "abc"]);
        for snapshot in &seen[..4] {
            assert_eq!(snapshot.len(), 2);
            assert_eq!(snapshot[1].id, id);
            assert!(snapshot[1].in_progress);
        }
        assert!(!seen[4][1].in_progress);
        assert_eq!(seen[4][1].id, id);
    }

    #[tokio::test]
    async fn failure_before_any_delta_removes_placeholder() {
        let log = MessageLog::new(1, vec![]);
        let reconciler = Reconciler::begin(&log, "hi").unwrap();
        let outcome = reconciler.drive(deltas(vec![Err(transport())])).await;
        assert!(matches!(outcome, ReplyOutcome::Failed(ref e) if e.is_transport()));

        let messages = log.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "hi");
        assert_eq!(messages[1].text, ERROR_NOTICE);
        assert!(!messages[1].in_progress);
        assert!(!log.is_busy());
    }

    #[tokio::test]
    async fn failure_after_deltas_keeps_partial_text() {
        let log = MessageLog::new(1, vec![]);
        let reconciler = Reconciler::begin(&log, "hi").unwrap();
        let id = reconciler.pending().id().to_string();
        reconciler
            .drive(deltas(vec![Ok("par"), Ok("tial"), Err(transport())]))
            .await;

        let messages = log.snapshot();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].id, id);
        assert_eq!(messages[1].text, "partial");
        assert!(!messages[1].in_progress);
        assert_eq!(messages[2].text, ERROR_NOTICE);
        assert_eq!(messages[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn empty_stream_completes_with_empty_text() {
        let log = MessageLog::new(1, vec![]);
        let reconciler = Reconciler::begin(&log, "hi").unwrap();
        assert!(matches!(
            reconciler.drive(deltas(vec![])).await,
            ReplyOutcome::Completed
        ));
        assert!(!log.snapshot()[1].in_progress);
    }

    #[test]
    fn begin_while_streaming_is_busy() {
        let log = MessageLog::new(1, vec![]);
        let _first = Reconciler::begin(&log, "one").unwrap();
        assert!(log.is_busy());
        let err = Reconciler::begin(&log, "two").err().unwrap();
        assert!(err.is_busy());
        assert_eq!(log.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn reset_orphans_the_reply() {
        let log = MessageLog::new(1, vec![]);
        let mut reconciler = Reconciler::begin(&log, "hi").unwrap();
        assert!(reconciler.apply_delta("first"));

        log.reset(2, vec![]);
        assert!(!reconciler.apply_delta("second"));
        assert!(!reconciler.complete());
        assert!(!reconciler.fail(&transport()));
        assert!(log.snapshot().is_empty());
        assert_eq!(log.generation(), 2);
    }

    #[tokio::test]
    async fn orphaned_stream_is_drained_but_ignored() {
        let log = MessageLog::new(1, vec![]);
        let reconciler = Reconciler::begin(&log, "hi").unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<String>>();
        let stream: DeltaStream = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        let task = tokio::spawn(reconciler.drive(stream));

        tx.send(Ok("before".to_string())).unwrap();
        tokio::task::yield_now().await;
        log.reset(2, vec![Message::user("fresh")]);
        tx.send(Ok("after".to_string())).unwrap();
        drop(tx);

        assert!(matches!(task.await.unwrap(), ReplyOutcome::Orphaned));
        let messages = log.snapshot();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "fresh");
    }
}
