/// Chat session: async façade over the conversation cache
///
/// Owns the remote store handle, the keyed cache, the refresh loop for the
/// currently open conversation, and the event stream consumed by the UI
/// layer. All cache mutations happen under one lock; network calls are
/// awaited outside it, and results are re-validated (conversation identity
/// and epoch) before being applied, so a stale in-flight fetch for a
/// conversation that was switched away from is discarded on arrival.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat_types::{
    ChatEvent, ConversationSummary, CounterpartProfile, DeliveryState, Message,
};
use crate::config::SyncConfig;
use crate::conversation_cache::ConversationCache;
use crate::error::{ChatError, Result};
use crate::remote_store::RemoteMessageStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The conversation currently on screen, with its scheduled refresh loop
struct ActiveConversation {
    conversation_id: String,
    refresh_task: JoinHandle<()>,
}

/// Session-scoped handle exposed to the UI layer
pub struct ChatSession {
    store: Arc<dyn RemoteMessageStore>,
    cache: Arc<Mutex<ConversationCache>>,
    active: Arc<Mutex<Option<ActiveConversation>>>,
    /// Bumped at the start of every open; an open that finishes after a newer
    /// one was issued must not claim the active slot
    open_seq: Arc<AtomicU64>,
    events: broadcast::Sender<ChatEvent>,
    config: SyncConfig,
}

impl ChatSession {
    pub fn new(store: Arc<dyn RemoteMessageStore>, config: SyncConfig) -> Self {
        let cache = ConversationCache::new(config.page_size, config.max_cached_conversations);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            "Created chat session (page_size: {}, refresh: {:?})",
            config.page_size, config.refresh_interval
        );

        Self {
            store,
            cache: Arc::new(Mutex::new(cache)),
            active: Arc::new(Mutex::new(None)),
            open_seq: Arc::new(AtomicU64::new(0)),
            events,
            config,
        }
    }

    /// Subscribe to cache-change events (new/delivered/failed messages)
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Open a conversation: fetch the most recent page, replace any cached
    /// entry, and start the refresh loop for it (cancelling the previous
    /// conversation's loop). Returns the initial visible log.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        if conversation_id.is_empty() {
            return Err(ChatError::InvalidArgument(
                "conversation_id is required".to_string(),
            ));
        }

        let open_seq = self.open_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.cache.lock().await.begin_open(conversation_id);
        let fetched = self
            .store
            .fetch_recent_messages(conversation_id, self.config.page_size)
            .await?;

        let messages = {
            let mut cache = self.cache.lock().await;
            if !cache.complete_open(conversation_id, epoch, fetched) {
                // A newer open superseded this one; hand back its state
                return Ok(cache.messages(conversation_id));
            }
            cache.messages(conversation_id)
        };

        if self.start_refresh_loop(conversation_id, open_seq).await {
            self.cache
                .lock()
                .await
                .set_active(Some(conversation_id));
        }

        info!(
            "Opened conversation {} ({} messages)",
            conversation_id,
            messages.len()
        );
        Ok(messages)
    }

    /// Re-fetch the recent page and merge it into the cached log. Pending
    /// optimistic entries survive; results arriving after the conversation
    /// was switched away from or reopened are discarded.
    pub async fn refresh(&self, conversation_id: &str) -> Result<()> {
        let epoch = self.cache.lock().await.epoch(conversation_id);
        let fetched = self
            .store
            .fetch_recent_messages(conversation_id, self.config.page_size)
            .await?;

        if !self.is_active(conversation_id).await {
            debug!(
                "Discarding refresh for {}: conversation no longer open",
                conversation_id
            );
            return Ok(());
        }

        let inserted = {
            let mut cache = self.cache.lock().await;
            cache
                .apply_refresh(conversation_id, epoch, fetched)
                .unwrap_or_default()
        };

        if !inserted.is_empty() {
            debug!(
                "Refresh merged {} new messages into {}",
                inserted.len(),
                conversation_id
            );
        }
        for message in inserted {
            let _ = self.events.send(ChatEvent::NewMessage { message });
        }
        Ok(())
    }

    /// Fetch the next older page and prepend-merge it. No-op (Ok(0)) when no
    /// older history remains or a backfill is already in flight. On fetch
    /// failure the cursor and heuristic are untouched, so a retry is safe.
    /// Returns the number of messages added.
    pub async fn load_older_history(&self, conversation_id: &str) -> Result<usize> {
        let Some((epoch, offset)) = self.cache.lock().await.begin_backfill(conversation_id) else {
            return Ok(0);
        };

        match self
            .store
            .fetch_messages_page(conversation_id, offset, self.config.page_size)
            .await
        {
            Ok(fetched) => {
                if !self.is_active(conversation_id).await {
                    debug!(
                        "Discarding backfill for {}: conversation no longer open",
                        conversation_id
                    );
                    self.cache
                        .lock()
                        .await
                        .abort_backfill(conversation_id, epoch);
                    return Ok(0);
                }

                let inserted = {
                    let mut cache = self.cache.lock().await;
                    cache
                        .apply_backfill(conversation_id, epoch, fetched)
                        .unwrap_or_default()
                };
                debug!(
                    "Backfill added {} older messages to {}",
                    inserted.len(),
                    conversation_id
                );
                Ok(inserted.len())
            }
            Err(e) => {
                self.cache
                    .lock()
                    .await
                    .abort_backfill(conversation_id, epoch);
                warn!("Backfill failed for {}: {}", conversation_id, e);
                Err(e)
            }
        }
    }

    /// Validate, append an optimistic entry (visible to `current_messages`
    /// before the network step), then insert remotely. On ack the placeholder
    /// is replaced by the authoritative record; on failure it is marked
    /// failed and kept visible.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<Message> {
        let trimmed = body.trim();
        if conversation_id.is_empty() || sender_id.is_empty() || trimmed.is_empty() {
            return Err(ChatError::InvalidArgument(
                "conversation_id, sender_id and a non-empty body are required".to_string(),
            ));
        }

        let client_temp_id = Uuid::new_v4();
        let optimistic = Message {
            id: None,
            client_temp_id: Some(client_temp_id),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: trimmed.to_string(),
            created_at: Utc::now(),
            delivery_state: DeliveryState::Pending,
        };

        self.cache
            .lock()
            .await
            .append_optimistic(conversation_id, optimistic.clone());
        let _ = self.events.send(ChatEvent::NewMessage {
            message: optimistic,
        });

        match self
            .store
            .insert_message(conversation_id, sender_id, trimmed)
            .await
        {
            Ok(mut confirmed) => {
                confirmed.client_temp_id = Some(client_temp_id);
                confirmed.delivery_state = DeliveryState::Confirmed;

                let matched = self.cache.lock().await.reconcile_send(
                    conversation_id,
                    client_temp_id,
                    confirmed.clone(),
                );
                if !matched {
                    debug!(
                        "No pending placeholder for acked message in {} (temp id {})",
                        conversation_id, client_temp_id
                    );
                }

                info!(
                    "Message delivered to {} (id: {:?})",
                    conversation_id, confirmed.id
                );
                let _ = self.events.send(ChatEvent::MessageDelivered {
                    message: confirmed.clone(),
                });
                Ok(confirmed)
            }
            Err(e) => {
                self.cache
                    .lock()
                    .await
                    .mark_send_failed(conversation_id, client_temp_id);
                warn!("Send failed for {}: {}", conversation_id, e);
                let _ = self.events.send(ChatEvent::MessageFailed { client_temp_id });
                Err(e)
            }
        }
    }

    /// Cancel the refresh loop for a conversation. Cached data is retained
    /// for fast re-open.
    pub async fn close_conversation(&self, conversation_id: &str) {
        let closed = {
            let mut active = self.active.lock().await;
            let is_open = active
                .as_ref()
                .map(|a| a.conversation_id == conversation_id)
                .unwrap_or(false);
            if is_open {
                if let Some(prev) = active.take() {
                    prev.refresh_task.abort();
                }
            }
            is_open
        };

        if closed {
            self.cache.lock().await.set_active(None);
            info!("Closed conversation {}", conversation_id);
        }
    }

    /// Current visible log (empty if the conversation was never opened)
    pub async fn current_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.cache.lock().await.messages(conversation_id)
    }

    /// Whether older history may remain for a conversation
    pub async fn has_more_history(&self, conversation_id: &str) -> bool {
        self.cache.lock().await.has_more_history(conversation_id)
    }

    /// Conversation list for the signed-in user (thin remote passthrough)
    pub async fn conversation_list(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        if user_id.is_empty() {
            return Err(ChatError::InvalidArgument("user_id is required".to_string()));
        }
        self.store.fetch_conversation_list(user_id).await
    }

    /// Counterpart profile for a conversation (thin remote passthrough)
    pub async fn conversation_detail(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<CounterpartProfile> {
        if conversation_id.is_empty() || viewer_id.is_empty() {
            return Err(ChatError::InvalidArgument(
                "conversation_id and viewer_id are required".to_string(),
            ));
        }
        self.store
            .fetch_conversation_detail(conversation_id, viewer_id)
            .await
    }

    /// Spawn the fixed-cadence refresh loop for a conversation, aborting the
    /// previous conversation's loop first so no two loops run past a switch.
    /// Returns false (installing nothing) when a newer open was issued while
    /// this one's fetch was in flight: the last-issued open wins the active
    /// slot, not the last one to complete.
    async fn start_refresh_loop(&self, conversation_id: &str, open_seq: u64) -> bool {
        let mut active = self.active.lock().await;
        if self.open_seq.load(Ordering::SeqCst) != open_seq {
            debug!(
                "Not starting refresh loop for {}: a newer open was issued",
                conversation_id
            );
            return false;
        }
        if let Some(prev) = active.take() {
            debug!(
                "Cancelling refresh loop for {}",
                prev.conversation_id
            );
            prev.refresh_task.abort();
        }

        let session = self.clone();
        let conv = conversation_id.to_string();
        let cadence = self.config.refresh_interval;
        let refresh_task = tokio::spawn(async move {
            let mut ticker = interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately; the open already loaded this page
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = session.refresh(&conv).await {
                    warn!("Scheduled refresh failed for {}: {}", conv, e);
                }
            }
        });

        *active = Some(ActiveConversation {
            conversation_id: conversation_id.to_string(),
            refresh_task,
        });
        true
    }

    async fn is_active(&self, conversation_id: &str) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|a| a.conversation_id == conversation_id)
            .unwrap_or(false)
    }
}

impl Clone for ChatSession {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            active: self.active.clone(),
            open_seq: self.open_seq.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }
}
