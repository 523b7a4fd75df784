/// ChatLink - client-side conversation synchronization core
///
/// Maintains, per conversation, a consistent paginated view of message
/// history while new messages arrive concurrently: optimistic sends are
/// rendered before server acknowledgment, reconciled against the
/// authoritative feed, and deduplicated across overlapping fetch windows
/// (initial load, poll refresh, older-history backfill). The persistence
/// backend stays behind the `RemoteMessageStore` trait.

pub mod chat_types;
pub mod config;
pub mod conversation_cache;
pub mod error;
pub mod remote_store;
pub mod session;

pub use chat_types::{ChatEvent, ConversationSummary, CounterpartProfile, DeliveryState, Message};
pub use config::SyncConfig;
pub use error::{ChatError, Result};
pub use remote_store::RemoteMessageStore;
pub use session::ChatSession;
