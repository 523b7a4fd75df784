/// Remote message store contract
///
/// The persistence/auth backend is opaque to the sync core. Implementations
/// map these calls onto whatever hosted query/RPC layer actually stores the
/// data. Contract:
///
///   fetch_recent_messages(conversation, limit)       most recent `limit`,
///                                                    returned ascending
///   fetch_messages_page(conversation, offset, limit) page `offset` counted
///                                                    from the newest message,
///                                                    returned ascending
///   insert_message(conversation, sender, body)       assigns id + created_at
///                                                    server-side
///   fetch_conversation_list(user)                    list-view summaries
///   fetch_conversation_detail(conversation, viewer)  the other participant
///
/// Read methods fail with `ChatError::FetchFailed`, inserts with
/// `ChatError::Remote`. Backends that query newest-first must reverse before
/// returning; the cache always stores ascending.
use async_trait::async_trait;

use crate::chat_types::{ConversationSummary, CounterpartProfile, Message};
use crate::error::Result;

#[async_trait]
pub trait RemoteMessageStore: Send + Sync {
    /// Most recent `limit` messages of a conversation, ascending by created_at
    async fn fetch_recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// One backfill page, `offset` messages back from the newest, ascending
    async fn fetch_messages_page(
        &self,
        conversation_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Persist a new message; the store assigns `id` and `created_at`
    async fn insert_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<Message>;

    /// Conversations the user participates in, for the list view
    async fn fetch_conversation_list(&self, user_id: &str) -> Result<Vec<ConversationSummary>>;

    /// Profile of the other participant in a conversation
    async fn fetch_conversation_detail(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<CounterpartProfile>;
}
