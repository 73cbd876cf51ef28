//! A streaming coding-assistant chat client.
//!
//! A [`Conversation`] ties a [`SessionManager`] (one live chat session with the hosted model),
//! a [`MessageLog`] (the ordered messages, updated atomically as replies stream in), and
//! [`Persistence`] (the log and model selection, saved after every change).  Code in the
//! assistant's replies can be exported as a zip archive with [`export_archive`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use futures::stream;
//! use spurify::{
//!     ChatBackend, ChatRequest, Conversation, DeltaStream, Export, MemoryStore, Persistence,
//!     ReplyOutcome, SessionManager,
//! };
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ChatBackend for Echo {
//!     async fn stream_reply(&self, _: ChatRequest) -> spurify::Result<DeltaStream> {
//!         let deltas = vec![Ok("```rust\n".to_string()), Ok("fn main() {}\n```".to_string())];
//!         Ok(Box::pin(stream::iter(deltas)))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let manager = SessionManager::with_backend(Arc::new(Echo));
//! let persistence = Persistence::new(Arc::new(MemoryStore::new()));
//! let conversation = Conversation::open(manager, persistence).unwrap();
//!
//! let outcome = conversation.submit("write a program").await.unwrap();
//! assert!(matches!(outcome, ReplyOutcome::Completed));
//! assert_eq!(conversation.messages().len(), 2);
//! assert!(matches!(conversation.export_code().unwrap(), Export::Archive(_)));
//! # });
//! ```

// Public modules
pub mod chat;
pub mod client;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod reconcile;
pub mod session;
pub mod sse;
pub mod store;
pub mod types;
pub mod utils;

mod observability;

#[cfg(test)]
mod testing;

// Re-exports
pub use client::{API_KEY_ENV, ChatBackend, ChatRequest, DeltaStream, GeminiClient};
pub use conversation::{Conversation, ReplyTask};
pub use error::{Error, Result};
pub use extract::{ARCHIVE_NAME, Export, export_archive};
pub use observability::register_biometrics;
pub use reconcile::{ERROR_NOTICE, LogObserver, MessageLog, Reconciler, ReplyOutcome};
pub use session::{ChatSession, SessionManager};
pub use store::{FileStore, KeyValueStore, MemoryStore, Persistence};
pub use types::*;
