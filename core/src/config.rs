/// Configuration for the sync core
use std::time::Duration;

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_REFRESH_MS: u64 = 3_000;
const DEFAULT_MAX_CONVERSATIONS: usize = 32;

/// Tuning knobs for the conversation cache and its refresh loop
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Messages fetched per page (initial load, refresh and backfill all use it)
    pub page_size: usize,

    /// Cadence of the refresh loop while a conversation is open
    pub refresh_interval: Duration,

    /// Bound on cached conversations; least-recently-touched entries beyond
    /// this are evicted (the open conversation is never evicted)
    pub max_cached_conversations: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_MS),
            max_cached_conversations: DEFAULT_MAX_CONVERSATIONS,
        }
    }
}

impl SyncConfig {
    /// Defaults with env overrides (nice for scripts)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = std::env::var("CHATLINK_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            config.page_size = n;
        }
        if let Some(ms) = std::env::var("CHATLINK_REFRESH_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            config.refresh_interval = Duration::from_millis(ms);
        }
        if let Some(n) = std::env::var("CHATLINK_MAX_CONVERSATIONS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            config.max_cached_conversations = n;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global, so valid and invalid overrides are
    // exercised in one test to avoid interleaving
    #[test]
    fn from_env_applies_valid_overrides_and_rejects_invalid_ones() {
        std::env::set_var("CHATLINK_PAGE_SIZE", "25");
        std::env::set_var("CHATLINK_REFRESH_MS", "1500");
        std::env::set_var("CHATLINK_MAX_CONVERSATIONS", "4");

        let config = SyncConfig::from_env();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.refresh_interval, Duration::from_millis(1500));
        assert_eq!(config.max_cached_conversations, 4);

        // Zero, garbage and unset values all fall back to the defaults
        std::env::set_var("CHATLINK_PAGE_SIZE", "0");
        std::env::set_var("CHATLINK_REFRESH_MS", "soon");
        std::env::remove_var("CHATLINK_MAX_CONVERSATIONS");

        let config = SyncConfig::from_env();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.refresh_interval, Duration::from_millis(DEFAULT_REFRESH_MS));
        assert_eq!(config.max_cached_conversations, DEFAULT_MAX_CONVERSATIONS);

        std::env::remove_var("CHATLINK_PAGE_SIZE");
        std::env::remove_var("CHATLINK_REFRESH_MS");
    }
}
