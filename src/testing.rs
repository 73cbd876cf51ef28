//! Scripted backend used by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::stream;
use tokio::sync::mpsc;

use crate::client::{ChatBackend, ChatRequest, DeltaStream};
use crate::{Error, Result};

/// One scripted reply.
pub(crate) enum Reply {
    /// Stream these deltas, then end.
    Deltas(Vec<&'static str>),
    /// Stream these deltas, then fail.
    FailAfter(Vec<&'static str>, Error),
    /// Reject the call before any delta.
    Reject(Error),
    /// Stream whatever the test pushes into the channel.
    Channel(mpsc::UnboundedReceiver<Result<String>>),
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// A channel-fed reply and the sender that drives it.
pub(crate) fn channel_reply() -> (mpsc::UnboundedSender<Result<String>>, Reply) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Reply::Channel(rx))
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_reply(&self, request: ChatRequest) -> Result<DeltaStream> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        let owned = |deltas: Vec<&'static str>| -> Vec<Result<String>> {
            deltas.into_iter().map(|d| Ok(d.to_string())).collect()
        };
        match reply {
            None => Ok(Box::pin(stream::empty())),
            Some(Reply::Deltas(deltas)) => Ok(Box::pin(stream::iter(owned(deltas)))),
            Some(Reply::FailAfter(deltas, err)) => {
                let mut items = owned(deltas);
                items.push(Err(err));
                Ok(Box::pin(stream::iter(items)))
            }
            Some(Reply::Reject(err)) => Err(err),
            Some(Reply::Channel(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
        }
    }
}
