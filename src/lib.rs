//! `rag_chat` - chat session controller for a retrieve-then-summarize API
//!
//! Questions go through a two-phase request (retrieval, then a summary that
//! may be streamed) and land in a conversation that renderers watch through
//! snapshots.

pub mod config;
pub mod search;
pub mod session;

pub use config::SessionConfig;
pub use search::{LoggingClient, SearchClient, SearchError, SummaryLanguage, VectaraClient};
pub use session::{ChatSessionController, ConversationSnapshot, SendOptions, SendOutcome};
