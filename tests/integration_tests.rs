//! Integration tests for the spurify library.
//! The live test requires an API key in the environment and skips itself otherwise.

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{Cursor, Read};
    use std::sync::{Arc, Mutex};

    use futures::stream;
    use spurify::{
        API_KEY_ENV, ChatBackend, ChatRequest, Conversation, DeltaStream, ERROR_NOTICE, Error,
        Export, FileStore, MemoryStore, ModelVariant, Persistence, ReplyOutcome, Role,
        SessionManager,
    };

    /// Replies with canned deltas in order, then with a transport failure.
    struct Canned {
        replies: Mutex<VecDeque<Vec<&'static str>>>,
    }

    impl Canned {
        fn new(replies: Vec<Vec<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for Canned {
        async fn stream_reply(&self, _: ChatRequest) -> spurify::Result<DeltaStream> {
            let next = self.replies.lock().unwrap().pop_front();
            let items: Vec<spurify::Result<String>> = match next {
                Some(deltas) => deltas.into_iter().map(|d| Ok(d.to_string())).collect(),
                None => vec![Err(Error::transport("quota exhausted", Some(429), None))],
            };
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn persistence(dir: &std::path::Path) -> Persistence {
        Persistence::new(Arc::new(FileStore::new(dir)))
    }

    #[tokio::test]
    async fn test_conversation_survives_restart_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = Canned::new(vec![vec![
                "Here you go:\n```js\n",
                "//filename: a.js\nconsole.log(1)\n",
                "```\nand a note:\n```\nplain text\n```",
            ]]);
            let mut conversation =
                Conversation::open(SessionManager::with_backend(backend), persistence(dir.path()))
                    .unwrap();
            conversation.switch_model(ModelVariant::Flash).unwrap();
            let outcome = conversation.submit("write a script").await.unwrap();
            assert!(matches!(outcome, ReplyOutcome::Completed));
            conversation.close().await;
        }

        let conversation = Conversation::open(
            SessionManager::with_backend(Canned::new(vec![])),
            persistence(dir.path()),
        )
        .unwrap();
        assert_eq!(conversation.model(), ModelVariant::Flash);
        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[1].text.starts_with("Here you go:"));

        let Export::Archive(blob) = conversation.export_code().unwrap() else {
            panic!("expected an archive");
        };
        let mut archive = zip::ZipArchive::new(Cursor::new(blob)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("spurify_code/a.js")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "console.log(1)\n");
        assert!(archive.by_name("spurify_code/snippet_1.txt").is_ok());
    }

    #[tokio::test]
    async fn test_failure_is_recovered_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let conversation = Conversation::open(
            SessionManager::with_backend(Canned::new(vec![])),
            persistence(dir.path()),
        )
        .unwrap();
        let outcome = conversation.submit("hello").await.unwrap();
        assert!(matches!(outcome, ReplyOutcome::Failed(ref err) if err.status_code() == Some(429)));
        assert!(!conversation.is_busy());
        assert!(matches!(conversation.export_code().unwrap(), Export::Nothing));

        conversation.close().await;
        let restored = persistence(dir.path()).load_messages();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[1].text, ERROR_NOTICE);
    }

    #[tokio::test]
    async fn test_live_reply() {
        let api_key = std::env::var(API_KEY_ENV).ok();
        if api_key.is_none() {
            eprintln!("Skipping test: {API_KEY_ENV} not set");
            return;
        }

        let mut conversation = Conversation::open(
            SessionManager::gemini(api_key),
            Persistence::new(Arc::new(MemoryStore::new())),
        )
        .expect("Failed to open conversation");
        conversation.switch_model(ModelVariant::Flash).unwrap();

        let outcome = conversation
            .submit("Reply with a one-line Python hello world in a code block.")
            .await
            .unwrap();
        assert!(
            matches!(outcome, ReplyOutcome::Completed),
            "Reply should complete with a valid API key"
        );
        assert!(!conversation.messages()[1].text.is_empty());
    }
}
