/// Per-conversation message log cache
///
/// Single source of truth for what message list the UI renders. Three
/// asynchronous data arrivals (initial fetch, periodic refresh, backward
/// pagination) plus locally-originated optimistic entries are resolved into
/// one gapless, deduplicated, chronologically ordered sequence per
/// conversation.
///
/// This module is fully synchronous; the async façade in `session` performs
/// the network calls and applies the results here under one lock. Staleness
/// across suspension points is handled with a per-conversation epoch: every
/// open bumps it, and results captured under an older epoch are discarded.
use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use crate::chat_types::{DeliveryState, Message};

/// Cached state of one conversation
struct ConversationEntry {
    /// Visible log, ascending by created_at, no duplicate identities
    messages: Vec<Message>,
    /// Backfill cursor: number of pages already consumed from the newest end
    page_cursor: usize,
    /// Heuristic: the last fetched page was full, so older history may exist.
    /// This can over- or under-report when the conversation size lands exactly
    /// on a page boundary; the remote store gives us no true remaining count.
    has_more_history: bool,
    /// Backfills are serialized per conversation; concurrent ones would
    /// duplicate offset windows
    backfill_in_flight: bool,
    /// Epoch this entry was built under
    epoch: u64,
    /// For LRU eviction
    last_touched: Instant,
}

impl ConversationEntry {
    fn empty(epoch: u64) -> Self {
        Self {
            messages: Vec::new(),
            page_cursor: 0,
            has_more_history: false,
            backfill_in_flight: false,
            epoch,
            last_touched: Instant::now(),
        }
    }
}

/// Keyed cache over all conversations touched this session
pub struct ConversationCache {
    entries: HashMap<String, ConversationEntry>,
    /// Open epochs outlive entry replacement, so they live beside the entries
    epochs: HashMap<String, u64>,
    /// The conversation currently on screen; exempt from eviction so a send
    /// into some other conversation can never blank the visible log
    active: Option<String>,
    page_size: usize,
    max_conversations: usize,
}

impl ConversationCache {
    pub fn new(page_size: usize, max_conversations: usize) -> Self {
        Self {
            entries: HashMap::new(),
            epochs: HashMap::new(),
            active: None,
            page_size: page_size.max(1),
            max_conversations: max_conversations.max(1),
        }
    }

    /// Record which conversation is on screen (None when none is open). The
    /// active conversation is never evicted.
    pub fn set_active(&mut self, conversation_id: Option<&str>) {
        self.active = conversation_id.map(str::to_string);
    }

    /// Current epoch of a conversation (0 if never opened)
    pub fn epoch(&self, conversation_id: &str) -> u64 {
        self.epochs.get(conversation_id).copied().unwrap_or(0)
    }

    /// Start an open: bump the epoch so results of any in-flight operation
    /// from before this point are discarded on arrival
    pub fn begin_open(&mut self, conversation_id: &str) -> u64 {
        let epoch = self.epochs.entry(conversation_id.to_string()).or_insert(0);
        *epoch += 1;
        *epoch
    }

    /// Finish an open: replace the entry with the freshly fetched recent page.
    /// Returns false when a newer open superseded this one.
    pub fn complete_open(
        &mut self,
        conversation_id: &str,
        epoch: u64,
        fetched: Vec<Message>,
    ) -> bool {
        if self.epoch(conversation_id) != epoch {
            debug!(
                "Discarding stale open result for {} (epoch {})",
                conversation_id, epoch
            );
            return false;
        }

        let has_more = fetched.len() == self.page_size;
        let mut entry = ConversationEntry::empty(epoch);
        entry.messages = fetched;
        entry.page_cursor = 1;
        entry.has_more_history = has_more;
        self.entries.insert(conversation_id.to_string(), entry);

        self.evict_over_capacity(conversation_id);
        true
    }

    /// Merge a refreshed recent page into the existing log. Pending optimistic
    /// entries are never removed here; they stay until `reconcile_send`.
    /// Idempotent: an unchanged remote page inserts nothing. Returns the
    /// newly inserted messages, or None when the result is stale or the
    /// conversation has no entry.
    pub fn apply_refresh(
        &mut self,
        conversation_id: &str,
        epoch: u64,
        fetched: Vec<Message>,
    ) -> Option<Vec<Message>> {
        if self.epoch(conversation_id) != epoch {
            debug!(
                "Discarding stale refresh result for {} (epoch {})",
                conversation_id, epoch
            );
            return None;
        }
        let entry = self.entries.get_mut(conversation_id)?;
        let inserted = merge_messages(&mut entry.messages, fetched);
        entry.last_touched = Instant::now();
        Some(inserted)
    }

    /// Start a backfill. Returns the (epoch, remote offset) to fetch, or None
    /// when there is no older history, no entry, or a backfill is already in
    /// flight for this conversation.
    pub fn begin_backfill(&mut self, conversation_id: &str) -> Option<(u64, usize)> {
        let entry = self.entries.get_mut(conversation_id)?;
        if !entry.has_more_history || entry.backfill_in_flight {
            return None;
        }
        entry.backfill_in_flight = true;
        entry.last_touched = Instant::now();
        Some((entry.epoch, entry.page_cursor * self.page_size))
    }

    /// Finish a backfill: prepend-merge the older page, advance the cursor,
    /// re-evaluate the full-page heuristic. Returns the newly inserted
    /// messages, or None when the result is stale.
    pub fn apply_backfill(
        &mut self,
        conversation_id: &str,
        epoch: u64,
        fetched: Vec<Message>,
    ) -> Option<Vec<Message>> {
        let page_size = self.page_size;
        let entry = self.entry_at_epoch(conversation_id, epoch)?;
        entry.backfill_in_flight = false;
        entry.has_more_history = fetched.len() == page_size;
        entry.page_cursor += 1;
        let inserted = merge_messages(&mut entry.messages, fetched);
        entry.last_touched = Instant::now();
        Some(inserted)
    }

    /// Roll back a failed or discarded backfill: only the in-flight flag is
    /// cleared, so the cursor and heuristic are untouched and a retry is safe
    pub fn abort_backfill(&mut self, conversation_id: &str, epoch: u64) {
        if let Some(entry) = self.entry_at_epoch(conversation_id, epoch) {
            entry.backfill_in_flight = false;
        }
    }

    /// Append an optimistic entry at the end of the log. Creates an empty
    /// entry if the conversation was never opened this session.
    pub fn append_optimistic(&mut self, conversation_id: &str, message: Message) {
        let epoch = self.epoch(conversation_id);
        let entry = self
            .entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationEntry::empty(epoch));
        entry.messages.push(message);
        entry.last_touched = Instant::now();
        self.evict_over_capacity(conversation_id);
    }

    /// Replace the optimistic placeholder with the authoritative record,
    /// matched by client temp id rather than position so concurrent sends
    /// cannot cross wires. If a refresh already inserted the confirmed id the
    /// placeholder is dropped instead of duplicated. Returns false when no
    /// matching pending placeholder exists.
    pub fn reconcile_send(
        &mut self,
        conversation_id: &str,
        client_temp_id: Uuid,
        confirmed: Message,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(conversation_id) else {
            return false;
        };
        let Some(pos) = entry.messages.iter().position(|m| {
            m.client_temp_id == Some(client_temp_id) && m.delivery_state == DeliveryState::Pending
        }) else {
            return false;
        };

        let already_present = confirmed.id.is_some()
            && entry
                .messages
                .iter()
                .enumerate()
                .any(|(i, m)| i != pos && m.id == confirmed.id);
        if already_present {
            entry.messages.remove(pos);
        } else {
            entry.messages[pos] = confirmed;
            // Server timestamp may differ from the provisional local one;
            // stable sort keeps the order of other pending entries intact
            entry.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        entry.last_touched = Instant::now();
        true
    }

    /// Mark the optimistic placeholder failed; it stays visible so the UI can
    /// show a failed-send indicator
    pub fn mark_send_failed(&mut self, conversation_id: &str, client_temp_id: Uuid) {
        if let Some(entry) = self.entries.get_mut(conversation_id) {
            for m in entry.messages.iter_mut() {
                if m.client_temp_id == Some(client_temp_id)
                    && m.delivery_state == DeliveryState::Pending
                {
                    m.delivery_state = DeliveryState::Failed;
                }
            }
            entry.last_touched = Instant::now();
        }
    }

    /// Visible log of a conversation (empty if never opened or evicted)
    pub fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.entries
            .get(conversation_id)
            .map(|e| e.messages.clone())
            .unwrap_or_default()
    }

    /// Whether older history may remain (full-page heuristic)
    pub fn has_more_history(&self, conversation_id: &str) -> bool {
        self.entries
            .get(conversation_id)
            .map(|e| e.has_more_history)
            .unwrap_or(false)
    }

    pub fn conversation_count(&self) -> usize {
        self.entries.len()
    }

    fn entry_at_epoch(
        &mut self,
        conversation_id: &str,
        epoch: u64,
    ) -> Option<&mut ConversationEntry> {
        let entry = self.entries.get_mut(conversation_id)?;
        if entry.epoch != epoch {
            debug!(
                "Discarding stale result for {} (epoch {})",
                conversation_id, epoch
            );
            return None;
        }
        Some(entry)
    }

    /// Drop least-recently-touched entries beyond the capacity bound. Both
    /// `keep` (the conversation being touched right now) and the active
    /// conversation are exempt.
    fn evict_over_capacity(&mut self, keep: &str) {
        while self.entries.len() > self.max_conversations {
            let active = self.active.clone();
            let victim = self
                .entries
                .iter()
                .filter(|(id, _)| {
                    id.as_str() != keep && active.as_deref() != Some(id.as_str())
                })
                .min_by_key(|(_, e)| e.last_touched)
                .map(|(id, _)| id.clone());
            match victim {
                Some(id) => {
                    debug!("Evicting cached conversation {}", id);
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }
}

/// Stable union of an existing sorted log and a freshly fetched batch, keyed
/// by remote id where present, else client temp id. Result is ascending by
/// created_at; ties keep existing entries before newly merged ones, which
/// makes the merge deterministic. Shared by refresh and backfill.
fn merge_messages(existing: &mut Vec<Message>, fetched: Vec<Message>) -> Vec<Message> {
    let mut inserted = Vec::new();
    for message in fetched {
        if existing.iter().any(|m| m.same_identity(&message)) {
            continue;
        }
        existing.push(message.clone());
        inserted.push(message);
    }
    existing.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    inserted
}
